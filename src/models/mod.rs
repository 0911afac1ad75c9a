//! Domain model module declarations.

pub mod cli_status;
pub mod health;
pub mod session;
