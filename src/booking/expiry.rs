use std::time::Duration;

use super::BookingService;

const SWEEP_BATCH_SIZE: i64 = 100;

/// Background loop that cancels pending bookings past their expiry
pub async fn expiry_sweeper(service: BookingService, interval: Duration) {
    tracing::info!(interval_secs = interval.as_secs(), "Starting booking expiry sweeper");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        // Drain full batches before waiting for the next tick
        loop {
            match service.sweep_expired(SWEEP_BATCH_SIZE).await {
                Ok(count) => {
                    if count > 0 {
                        tracing::info!(count, "Expired pending bookings");
                    }
                    if (count as i64) < SWEEP_BATCH_SIZE {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Error sweeping expired bookings");
                    break;
                }
            }
        }
    }
}
