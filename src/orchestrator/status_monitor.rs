//! Per-session agent CLI status polling.
//!
//! Runs only for CLIs that can report live status. Samples land on the
//! session so snapshots can show context usage.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Instrument};

use super::session::ManagedSession;

/// Spawn the poll loop for `session`. The task ends when `cancel` fires.
#[must_use]
pub fn spawn(
    session: Arc<ManagedSession>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let span = info_span!("status_monitor", task_id = %session.task_id());
    tokio::spawn(
        async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        debug!("status monitor cancelled");
                        break;
                    }
                    _ = ticker.tick() => {}
                }

                let cli = session.cli();
                if !cli.supports_status_query() {
                    continue;
                }
                let status = cli.query_status().await;
                if !status.is_running {
                    info!(cli = cli.name(), "agent cli reports no live session");
                }
                debug!(
                    tokens_used = status.tokens_used,
                    tokens_max = status.tokens_max,
                    "agent cli status sampled"
                );
                session.record_cli_status(status);
            }
        }
        .instrument(span),
    )
}
