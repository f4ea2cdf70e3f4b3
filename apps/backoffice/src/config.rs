//! # Server Configuration
//!
//! Loaded once at startup:
//!
//! ```text
//! defaults ──► backoffice.toml (if present) ──► environment ──► validate()
//! ```
//!
//! The file comes from `--config <path>`, then `RETAIL_CONFIG`, then the
//! platform config directory (`~/.config/backoffice/backoffice.toml` on
//! Linux).
//!
//! ## Example
//! ```toml
//! [server]
//! bind = "0.0.0.0:8000"
//! app_url = "https://backoffice.example.com"
//!
//! [backend]
//! kind = "rest"
//! supabase_url = "https://xyz.supabase.co"
//! supabase_key = "..."
//!
//! [auth]
//! session_ttl_hours = 12
//! redis_url = "redis://127.0.0.1/"
//!
//! [invitation]
//! expiry_hours = 48
//!
//! [mail]
//! provider = "sendgrid"
//! api_key = "SG.xxxx"
//!
//! [report]
//! months = 7
//! ```

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use retail_core::{DEFAULT_INVITATION_EXPIRY_HOURS, DEFAULT_REPORT_MONTHS};
use retail_mail::{MailConfig, MailProvider};
use retail_store::{BackendConfig, BackendKind};

/// Longest report trend accepted from config or a query string.
pub const MAX_REPORT_MONTHS: u32 = 24;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Listen address.
    pub bind: String,
    /// Public base URL, used in invitation links.
    pub app_url: String,
    /// Load the demo catalogue and sales when running on the memory backend.
    pub seed_demo: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            bind: "0.0.0.0:8000".to_string(),
            app_url: "http://localhost:8000".to_string(),
            seed_demo: false,
        }
    }
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// HMAC key for session cookies. Generated at startup when empty.
    pub session_secret: String,
    pub session_ttl_hours: i64,
    /// Shared session store. Sessions stay in process memory when unset.
    pub redis_url: Option<String>,
    pub cookie_name: String,
    /// Adds `Secure` to the session cookie.
    pub secure_cookie: bool,
    /// Check role permissions on the JSON APIs.
    pub enforce_permissions: bool,
}

impl Default for AuthSettings {
    fn default() -> Self {
        AuthSettings {
            session_secret: String::new(),
            session_ttl_hours: 12,
            redis_url: None,
            cookie_name: "smartretail_session".to_string(),
            secure_cookie: false,
            enforce_permissions: false,
        }
    }
}

// The secret and the Redis URL (which may carry a password) stay out of logs.
impl fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSettings")
            .field("session_secret", &"***")
            .field("session_ttl_hours", &self.session_ttl_hours)
            .field("redis_url", &self.redis_url.as_ref().map(|_| "***"))
            .field("cookie_name", &self.cookie_name)
            .field("secure_cookie", &self.secure_cookie)
            .field("enforce_permissions", &self.enforce_permissions)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InvitationSettings {
    pub expiry_hours: i64,
    /// Without an admin identity client, accept invitations through
    /// ordinary signup (the employee must then confirm their email).
    pub allow_self_signup_fallback: bool,
}

impl Default for InvitationSettings {
    fn default() -> Self {
        InvitationSettings {
            expiry_hours: DEFAULT_INVITATION_EXPIRY_HOURS,
            allow_self_signup_fallback: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    /// Months in the profit/revenue trend.
    pub months: u32,
}

impl Default for ReportSettings {
    fn default() -> Self {
        ReportSettings {
            months: DEFAULT_REPORT_MONTHS,
        }
    }
}

// =============================================================================
// Server Config
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerSettings,
    pub backend: BackendConfig,
    pub auth: AuthSettings,
    pub invitation: InvitationSettings,
    pub mail: MailConfig,
    pub report: ReportSettings,
}

impl ServerConfig {
    /// Defaults, then the config file, then the process environment.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let path = config_path
            .or_else(|| std::env::var("RETAIL_CONFIG").ok().map(PathBuf::from))
            .or_else(Self::default_config_path);
        if let Some(path) = path {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok());
        config.ensure_session_secret();
        config.validate()?;

        Ok(config)
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "smartretail", "backoffice")
            .map(|dirs| dirs.config_dir().join("backoffice.toml"))
    }

    /// Applies environment-style overrides. `lookup` is `std::env::var` in
    /// production.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let set = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(bind) = set("RETAIL_BIND") {
            self.server.bind = bind;
        }
        if let Some(url) = set("APP_URL") {
            self.server.app_url = url;
        }
        if let Some(flag) = set("RETAIL_SEED_DEMO") {
            self.server.seed_demo = parse_flag(&flag);
        }

        if let Some(kind) = set("RETAIL_BACKEND") {
            match kind.parse::<BackendKind>() {
                Ok(kind) => {
                    debug!(?kind, "Overriding backend from environment");
                    self.backend.kind = kind;
                }
                Err(e) => warn!(error = %e, "Ignoring RETAIL_BACKEND"),
            }
        }
        if let Some(url) = set("SUPABASE_URL") {
            self.backend.supabase_url = url;
        }
        if let Some(key) = set("SUPABASE_KEY") {
            self.backend.supabase_key = key;
        }
        if let Some(key) = set("SUPABASE_SERVICE_ROLE_KEY") {
            self.backend.service_role_key = Some(key);
        }
        if let Some(url) = set("DATABASE_URL") {
            self.backend.database_url = Some(url);
        }

        if let Some(secret) = set("SESSION_SECRET") {
            self.auth.session_secret = secret;
        }
        if let Some(url) = set("REDIS_URL") {
            self.auth.redis_url = Some(url);
        }
        if let Some(flag) = set("ENFORCE_PERMISSIONS") {
            self.auth.enforce_permissions = parse_flag(&flag);
        }

        if let Some(hours) = set("INVITATION_EXPIRY_HOURS") {
            match hours.trim().parse() {
                Ok(hours) => self.invitation.expiry_hours = hours,
                Err(_) => warn!(value = %hours, "Ignoring INVITATION_EXPIRY_HOURS"),
            }
        }
        if let Some(flag) = set("ALLOW_SELF_SIGNUP_FALLBACK") {
            self.invitation.allow_self_signup_fallback = parse_flag(&flag);
        }

        if let Some(provider) = set("MAIL_PROVIDER") {
            match provider.parse::<MailProvider>() {
                Ok(provider) => self.mail.provider = provider,
                Err(e) => warn!(error = %e, "Ignoring MAIL_PROVIDER"),
            }
        }
        if let Some(key) = set("MAIL_API_KEY") {
            self.mail.api_key = key;
        }
        if let Some(from) = set("DEFAULT_FROM_EMAIL") {
            self.mail.from_email = from;
        }
        if let Some(retries) = set("EMAIL_MAX_RETRIES") {
            match retries.trim().parse() {
                Ok(retries) => self.mail.max_retries = retries,
                Err(_) => warn!(value = %retries, "Ignoring EMAIL_MAX_RETRIES"),
            }
        }

        if let Some(months) = set("REPORT_MONTHS") {
            match months.trim().parse() {
                Ok(months) => self.report.months = months,
                Err(_) => warn!(value = %months, "Ignoring REPORT_MONTHS"),
            }
        }
    }

    fn ensure_session_secret(&mut self) {
        if self.auth.session_secret.is_empty() {
            let mut bytes = [0u8; 32];
            rand::rngs::OsRng.fill_bytes(&mut bytes);
            self.auth.session_secret = URL_SAFE_NO_PAD.encode(bytes);
            warn!("SESSION_SECRET not set; generated one, sessions will not survive a restart");
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.backend.kind {
            BackendKind::Rest => {
                if self.backend.supabase_url.trim().is_empty() {
                    return Err(ConfigError::Invalid(
                        "backend.supabase_url is required for the rest backend".into(),
                    ));
                }
                if self.backend.supabase_key.trim().is_empty() {
                    return Err(ConfigError::Invalid(
                        "backend.supabase_key is required for the rest backend".into(),
                    ));
                }
            }
            BackendKind::Postgres => {
                if self.backend.database_url.is_none() {
                    return Err(ConfigError::Invalid(
                        "backend.database_url is required for the postgres backend".into(),
                    ));
                }
            }
            BackendKind::Memory => {}
        }

        if self.auth.session_secret.len() < 16 {
            return Err(ConfigError::Invalid(
                "auth.session_secret must be at least 16 characters".into(),
            ));
        }
        if self.auth.session_ttl_hours <= 0 {
            return Err(ConfigError::Invalid("auth.session_ttl_hours must be > 0".into()));
        }
        if self.invitation.expiry_hours <= 0 {
            return Err(ConfigError::Invalid("invitation.expiry_hours must be > 0".into()));
        }
        if self.report.months == 0 || self.report.months > MAX_REPORT_MONTHS {
            return Err(ConfigError::Invalid(format!(
                "report.months must be between 1 and {}",
                MAX_REPORT_MONTHS
            )));
        }
        if !self.server.app_url.starts_with("http://") && !self.server.app_url.starts_with("https://")
        {
            return Err(ConfigError::Invalid(format!(
                "server.app_url must start with http:// or https://, got: {}",
                self.server.app_url
            )));
        }

        self.mail
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn invitation_expiry(&self) -> chrono::Duration {
        chrono::Duration::hours(self.invitation.expiry_hours)
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.auth.session_ttl_hours)
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
