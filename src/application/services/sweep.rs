//! Pending-payment sweep worker
//!
//! Runs [`ReconciliationEngine::sweep`] on an interval until shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::application::services::reconciliation::ReconciliationEngine;
use crate::shared::shutdown::ShutdownSignal;

#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// How often to look for stale orders
    pub interval: Duration,
    /// Age after which a pending gateway order is resolved
    pub ttl: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            ttl: Duration::from_secs(30 * 60),
        }
    }
}

pub struct SweepWorker {
    engine: Arc<ReconciliationEngine>,
    config: SweepConfig,
}

impl SweepWorker {
    pub fn new(engine: Arc<ReconciliationEngine>, config: SweepConfig) -> Self {
        Self { engine, config }
    }

    pub fn start(self, shutdown: ShutdownSignal) -> JoinHandle<()> {
        tokio::spawn(async move {
            let ttl = match chrono::Duration::from_std(self.config.ttl) {
                Ok(ttl) => ttl,
                Err(e) => {
                    warn!(error = %e, "Sweep ttl out of range, worker not started");
                    return;
                }
            };
            info!(
                interval_secs = self.config.interval.as_secs(),
                ttl_secs = self.config.ttl.as_secs(),
                "Pending payment sweep started"
            );

            let mut interval = tokio::time::interval(self.config.interval);
            // the first tick completes immediately
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = self.engine.sweep(ttl).await {
                            warn!(error = %e, "Pending payment sweep failed");
                        }
                    }
                    _ = shutdown.wait() => {
                        info!("Pending payment sweep shutting down");
                        break;
                    }
                }
            }
        })
    }
}
