use crate::domain_port::RefreshTokenRepo;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Background garbage collection of refresh-token records whose expiry has
/// passed. Revoked-but-unexpired records stay put so replayed tokens keep
/// hitting a revoked record instead of a missing one. Never runs on the
/// request path.
pub struct Sweeper {
    refresh_repo: Arc<dyn RefreshTokenRepo>,
    interval: Duration,
    cancel: CancellationToken,
}

impl Sweeper {
    pub fn new(
        refresh_repo: Arc<dyn RefreshTokenRepo>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Sweeper {
            refresh_repo,
            interval,
            cancel,
        }
    }

    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("sweeper stopped");
                    return;
                }
                _ = ticker.tick() => {
                    match self.refresh_repo.purge_expired(Utc::now()).await {
                        Ok(0) => {}
                        Ok(purged) => info!(purged, "swept expired refresh tokens"),
                        Err(e) => warn!("refresh-token sweep failed: {}", e),
                    }
                }
            }
        }
    }
}
