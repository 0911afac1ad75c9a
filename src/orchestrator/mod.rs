//! Session orchestration modules.
//!
//! Covers the slot pool, managed sessions and their lifecycle, per-session
//! CLI status polling, and the watchdog that nudges idle workers and
//! recovers dead ones.

pub mod deadline;
pub mod ledger;
pub mod session;
pub mod session_manager;
pub mod slots;
pub mod status_monitor;
pub mod watchdog;
