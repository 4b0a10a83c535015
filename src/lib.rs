pub mod clients;
pub mod config;
pub mod db;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use clients::{IncidentApi, MonitoringApi};
use db::Store;

/// Shared application state passed to all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub incidents: Arc<dyn IncidentApi>,
    pub monitoring: Arc<dyn MonitoringApi>,
    pub relay: config::RelaySettings,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("store", &self.store)
            .field("relay", &self.relay)
            .finish_non_exhaustive()
    }
}
