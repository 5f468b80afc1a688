//! Shared application state.

use booking_agent_agent::{DataPreload, Orchestrator, SessionStore};
use booking_agent_config::Settings;
use booking_agent_rag::FaqIndexer;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub orchestrator: Arc<Orchestrator>,
    /// Session store shared with the orchestrator, exposed for the
    /// session inspection endpoints.
    pub store: Arc<dyn SessionStore>,
    pub preload: Arc<DataPreload>,
    pub indexer: Arc<FaqIndexer>,
}

impl AppState {
    pub fn new(
        settings: Settings,
        orchestrator: Arc<Orchestrator>,
        store: Arc<dyn SessionStore>,
        preload: Arc<DataPreload>,
        indexer: Arc<FaqIndexer>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            orchestrator,
            store,
            preload,
            indexer,
        }
    }
}
