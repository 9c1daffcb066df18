use std::sync::Arc;

use crate::services::hub::QueueHub;
use crate::services::inference::InferenceBackend;
use crate::services::orchestrator::Orchestrator;
use crate::services::records::RecordStore;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
}

impl AppState {
    pub fn new(
        store: Arc<dyn RecordStore>,
        backend: Arc<dyn InferenceBackend>,
        worker_pool_size: u32,
    ) -> Self {
        let hub = Arc::new(QueueHub::new());
        Self {
            orchestrator: Orchestrator::new(hub, store, backend, worker_pool_size),
        }
    }

    pub fn hub(&self) -> &Arc<QueueHub> {
        self.orchestrator.hub()
    }
}
