//! Preloaded catalog data.
//!
//! Procedures and units change rarely, so they are fetched once at startup
//! and refreshed on a timer instead of per turn. Consumers get cheap
//! snapshots; an empty catalog just means the backend hasn't answered yet.

use booking_agent_core::{FunctionCall, FunctionName};
use booking_agent_functions::{payload, FunctionRunner};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct Catalogs {
    pub procedures: Vec<String>,
    pub units: Vec<String>,
}

pub struct DataPreload {
    runner: Arc<dyn FunctionRunner>,
    catalogs: RwLock<Catalogs>,
}

impl DataPreload {
    pub fn new(runner: Arc<dyn FunctionRunner>) -> Self {
        Self {
            runner,
            catalogs: RwLock::new(Catalogs::default()),
        }
    }

    /// Fetch both catalogs. A failed listing keeps the previous snapshot
    /// for that catalog.
    pub async fn refresh(&self) {
        let procedures = self
            .runner
            .execute(&FunctionCall::bare(FunctionName::ListProcedures))
            .await;
        let units = self
            .runner
            .execute(&FunctionCall::bare(FunctionName::ListUnits))
            .await;

        let mut catalogs = self.catalogs.write();
        if procedures.success {
            catalogs.procedures = payload::names(&procedures.data);
        } else {
            tracing::warn!(error = ?procedures.error, "procedure catalog refresh failed");
        }
        if units.success {
            catalogs.units = payload::names(&units.data);
        } else {
            tracing::warn!(error = ?units.error, "unit catalog refresh failed");
        }
        tracing::debug!(
            procedures = catalogs.procedures.len(),
            units = catalogs.units.len(),
            "catalogs refreshed"
        );
    }

    pub fn snapshot(&self) -> Catalogs {
        self.catalogs.read().clone()
    }
}

/// Spawn the periodic catalog refresh. The first refresh happens
/// immediately on the first tick.
pub fn start_refresh_task(
    preload: Arc<DataPreload>,
    interval: Duration,
) -> tokio::sync::watch::Sender<bool> {
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    preload.refresh().await;
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    });

    shutdown_tx
}
