//! Shared state for the REST facade

use std::sync::Arc;

use guardload_service::LoadRunner;

/// Shared application state for the API server
#[derive(Clone)]
pub struct AppState {
    /// The process-wide load runner
    pub runner: Arc<LoadRunner>,
}

impl AppState {
    pub fn new(runner: Arc<LoadRunner>) -> Self {
        Self { runner }
    }
}
