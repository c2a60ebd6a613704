//! Application state shared across request handlers.

use std::sync::Arc;

use crate::coordinator::MigrationCoordinator;
use crate::invoker::Restorer;
use crate::registry::DestinationRegistry;

/// Shared application state.
///
/// This is passed to all request handlers via Axum's state extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    coordinator: MigrationCoordinator,
    restorer: Arc<dyn Restorer>,
}

impl AppState {
    /// Create a new application state.
    pub fn new(coordinator: MigrationCoordinator, restorer: Arc<dyn Restorer>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                coordinator,
                restorer,
            }),
        }
    }

    /// The destination registry the coordinator migrates to.
    pub fn registry(&self) -> &DestinationRegistry {
        self.inner.coordinator.registry()
    }

    pub fn coordinator(&self) -> &MigrationCoordinator {
        &self.inner.coordinator
    }

    pub fn restorer(&self) -> &dyn Restorer {
        self.inner.restorer.as_ref()
    }
}
