//! Liveness plus a backend round trip.

use serde::Serialize;
use tracing::warn;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub backend: &'static str,
    pub backend_ok: bool,
    pub session_store: &'static str,
    pub version: &'static str,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.backend_ok
    }
}

pub struct HealthService {
    state: AppState,
}

impl HealthService {
    pub fn new(state: AppState) -> Self {
        HealthService { state }
    }

    pub async fn check(&self) -> HealthReport {
        let backend_ok = match self.state.backend.health_check().await {
            Ok(()) => true,
            Err(err) => {
                warn!(backend = self.state.backend.backend_name(), error = %err, "Health check failed");
                false
            }
        };

        HealthReport {
            status: if backend_ok { "healthy" } else { "degraded" },
            backend: self.state.backend.backend_name(),
            backend_ok,
            session_store: self.state.sessions.store_name(),
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}
