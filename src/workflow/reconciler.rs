//! Periodic completion reconciliation.
//!
//! Task updates made through [`Workflow`] reconcile immediately. The periodic
//! pass catches anything that changed task state some other way, such as a
//! second server sharing the database.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::backend::Backend;

use super::Workflow;

/// Handle to the background reconciliation loop.
pub struct Reconciler {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Reconciler {
    /// Spawn a loop that reconciles every `interval`, starting immediately.
    pub fn spawn<B: Backend + 'static>(workflow: Workflow<B>, interval: Duration) -> Self {
        let (shutdown, mut stop) = watch::channel(false);

        let handle = tokio::spawn(async move {
            tracing::info!(interval_secs = interval.as_secs(), "Reconciler started");
            let mut ticker = tokio::time::interval(interval);

            loop {
                tokio::select! {
                    _ = stop.changed() => {
                        tracing::info!("Reconciler stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        match workflow.reconcile().await {
                            Ok(report) if report.is_noop() => {
                                tracing::debug!("Reconciler: nothing to complete");
                            }
                            Ok(report) => {
                                tracing::info!(
                                    completed = report.completed.len(),
                                    failures = report.failures.len(),
                                    "Reconciler: completion pass applied changes"
                                );
                            }
                            Err(e) => {
                                tracing::error!(error = %e, "Reconciler: pass failed");
                            }
                        }
                    }
                }
            }
        });

        Self { shutdown, handle }
    }

    /// Signal the loop to stop and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "Reconciler task ended abnormally");
        }
    }
}
