//! Cron ticker — runs the materializer on its schedule.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::materializer::InvoiceMaterializer;

/// Run one sync pass and log its outcome. Returns the number of invoices created.
pub async fn run_sync(materializer: &InvoiceMaterializer) -> usize {
    match materializer.sync_all_companies().await {
        Ok(created) => created.len(),
        Err(e) => {
            error!("e-Factura sync could not start: {e}");
            0
        }
    }
}

/// Time to wait from `now` until the schedule's next fire, `None` if it never fires again.
pub fn next_delay(schedule: &cron::Schedule, now: DateTime<Utc>) -> Option<Duration> {
    let next = schedule.after(&now).next()?;
    Some((next - now).to_std().unwrap_or(Duration::ZERO))
}

/// Spawn a background task that runs a sync pass at every fire of `schedule`.
///
/// Returns a `JoinHandle` and a shutdown flag. Set the flag to stop ticking.
pub fn spawn_sync_ticker(
    materializer: Arc<InvoiceMaterializer>,
    schedule: cron::Schedule,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!(schedule = %schedule, "e-Factura sync ticker started");

        loop {
            let Some(delay) = next_delay(&schedule, Utc::now()) else {
                info!("Schedule has no upcoming fire, ticker stopping");
                return;
            };
            tokio::time::sleep(delay).await;

            if shutdown.load(Ordering::Relaxed) {
                info!("e-Factura sync ticker shutting down");
                return;
            }

            run_sync(&materializer).await;
        }
    });

    (handle, shutdown_flag)
}
