//! Shared state for API handlers.

use std::sync::Arc;
use survey_service::WorkflowService;

/// State handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<WorkflowService>,
}

impl AppState {
    pub fn new(service: Arc<WorkflowService>) -> Self {
        Self { service }
    }

    /// State backed by in-memory storage, for tests and local runs.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(WorkflowService::new()))
    }
}
