//! # Expiry Sweeper
//!
//! Background task that periodically purges physically expired rows from
//! the relational backend. Reads already filter expired rows, so the sweep
//! only bounds storage growth and never changes what callers observe.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::relational::RelationalBackend;

/// Handle to a running sweeper; dropping it stops the task
#[derive(Debug)]
pub struct ExpirySweeper {
    shutdown_tx: watch::Sender<bool>,
}

impl ExpirySweeper {
    /// Spawn the sweeper on the current tokio runtime
    pub fn start(backend: RelationalBackend, interval: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "expiry sweeper started");
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        match backend.purge_expired().await {
                            Ok(0) => debug!("expiry sweep found nothing to purge"),
                            Ok(removed) => info!(removed, "purged expired rows"),
                            Err(e) => warn!(error = %e, "expiry sweep failed"),
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("expiry sweeper stopped");
        });

        Self { shutdown_tx }
    }

    /// Signal the task to stop
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}
