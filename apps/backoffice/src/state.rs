//! Shared application state.

use chrono::Duration;
use std::sync::Arc;

use retail_mail::{DispatchHandle, MailDispatcher, Mailer};
use retail_store::{Backend, IdentityServices, MemoryIdentity, MemoryTableClient};

use crate::config::ServerConfig;
use crate::session::{MemorySessionStore, SessionCookies, SessionManager, SessionStore};

/// Everything a handler needs. Cheap to clone: every field is a handle.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub backend: Backend,
    pub identity: IdentityServices,
    pub mail: DispatchHandle,
    pub sessions: SessionManager,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        backend: Backend,
        identity: IdentityServices,
        mail: DispatchHandle,
        session_store: Arc<dyn SessionStore>,
    ) -> Self {
        let cookies = SessionCookies::new(
            config.auth.session_secret.clone(),
            config.auth.cookie_name.clone(),
            config.auth.secure_cookie,
        );
        let sessions = SessionManager::new(session_store, cookies, config.session_ttl());

        AppState {
            config: Arc::new(config),
            backend,
            identity,
            mail,
            sessions,
        }
    }

    pub fn invitation_expiry(&self) -> Duration {
        self.config.invitation_expiry()
    }
}

/// An [`AppState`] wired entirely to in-process backends, plus handles to
/// inspect them.
#[derive(Debug, Clone)]
pub struct MemoryState {
    pub state: AppState,
    pub tables: MemoryTableClient,
    pub identity: MemoryIdentity,
}

impl MemoryState {
    /// Spawns a mail dispatcher on the current runtime. `with_admin`
    /// controls whether an admin identity client is available.
    pub fn build(config: ServerConfig, mailer: Arc<dyn Mailer>, with_admin: bool) -> Self {
        let (backend, tables) = Backend::in_memory();
        let identity = MemoryIdentity::new();
        let services = IdentityServices::in_memory(identity.clone(), with_admin);
        let (mail, _worker) = MailDispatcher::spawn(mailer, &config.mail);

        let state = AppState::new(
            config,
            backend,
            services,
            mail,
            Arc::new(MemorySessionStore::new()),
        );
        MemoryState {
            state,
            tables,
            identity,
        }
    }
}
