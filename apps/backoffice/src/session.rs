//! # Sessions
//!
//! A login creates a server-side session record and hands the browser a
//! signed cookie naming it.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  POST /login                                                            │
//! │    identity provider ──► AuthSession { user_id, email, access_token }   │
//! │         │                                                               │
//! │         ▼                                                               │
//! │    SessionStore.create(data, ttl) ──► session id (uuid)                 │
//! │         │                                                               │
//! │         ▼                                                               │
//! │    cookie = HS256 JWT { sub: session id, iat, exp, jti }                │
//! │                                                                         │
//! │  later requests                                                         │
//! │    cookie ──verify──► sub ──SessionStore.get──► SessionData             │
//! │    (bad signature, expired JWT or missing record → unauthenticated)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The access token never leaves the server. Sessions live in process
//! memory, or in Redis when several server instances share them.

use async_trait::async_trait;
use axum::http::header::COOKIE;
use axum::http::HeaderMap;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use retail_store::AuthSession;

const REDIS_KEY_PREFIX: &str = "smartretail:session:";

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session store error: {0}")]
    Store(String),

    #[error("Invalid session token: {0}")]
    Token(String),
}

impl From<redis::RedisError> for SessionError {
    fn from(err: redis::RedisError) -> Self {
        SessionError::Store(err.to_string())
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        SessionError::Store(err.to_string())
    }
}

pub type SessionResult<T> = Result<T, SessionError>;

/// What the server remembers about a signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    pub user_id: String,
    pub email: String,
    pub access_token: String,
    pub created_at: DateTime<Utc>,
}

impl From<AuthSession> for SessionData {
    fn from(auth: AuthSession) -> Self {
        SessionData {
            user_id: auth.user_id,
            email: auth.email,
            access_token: auth.access_token,
            created_at: Utc::now(),
        }
    }
}

// =============================================================================
// Stores
// =============================================================================

#[async_trait]
pub trait SessionStore: Send + Sync + std::fmt::Debug {
    /// Stores `data` for `ttl` and returns the new session id.
    async fn create(&self, data: &SessionData, ttl: Duration) -> SessionResult<String>;

    /// The live session, or `None` when unknown or expired.
    async fn get(&self, session_id: &str) -> SessionResult<Option<SessionData>>;

    async fn destroy(&self, session_id: &str) -> SessionResult<()>;

    fn store_name(&self) -> &'static str;
}

fn new_session_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Sessions in process memory. Lost on restart.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, (SessionData, DateTime<Utc>)>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, data: &SessionData, ttl: Duration) -> SessionResult<String> {
        let id = new_session_id();
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, (_, expires)| *expires > now);
        sessions.insert(id.clone(), (data.clone(), now + ttl));
        Ok(id)
    }

    async fn get(&self, session_id: &str) -> SessionResult<Option<SessionData>> {
        let now = Utc::now();
        {
            let sessions = self.sessions.read().await;
            match sessions.get(session_id) {
                Some((data, expires)) if *expires > now => return Ok(Some(data.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }
        self.sessions.write().await.remove(session_id);
        Ok(None)
    }

    async fn destroy(&self, session_id: &str) -> SessionResult<()> {
        self.sessions.write().await.remove(session_id);
        Ok(())
    }

    fn store_name(&self) -> &'static str {
        "memory"
    }
}

/// Sessions in Redis, expired by Redis itself.
#[derive(Clone)]
pub struct RedisSessionStore {
    conn: ConnectionManager,
}

impl std::fmt::Debug for RedisSessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisSessionStore").finish_non_exhaustive()
    }
}

impl RedisSessionStore {
    pub async fn connect(redis_url: &str) -> SessionResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let mut conn = ConnectionManager::new(client).await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("Connected to Redis session store");
        Ok(RedisSessionStore { conn })
    }

    fn key(session_id: &str) -> String {
        format!("{}{}", REDIS_KEY_PREFIX, session_id)
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn create(&self, data: &SessionData, ttl: Duration) -> SessionResult<String> {
        let id = new_session_id();
        let payload = serde_json::to_string(data)?;
        let seconds = ttl.num_seconds().max(1) as u64;
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(Self::key(&id), payload, seconds).await?;
        Ok(id)
    }

    async fn get(&self, session_id: &str) -> SessionResult<Option<SessionData>> {
        let mut conn = self.conn.clone();
        let payload: Option<String> = conn.get(Self::key(session_id)).await?;
        match payload {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn destroy(&self, session_id: &str) -> SessionResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(Self::key(session_id)).await?;
        Ok(())
    }

    fn store_name(&self) -> &'static str {
        "redis"
    }
}

// =============================================================================
// Cookies
// =============================================================================

/// Session cookie claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Session id
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

/// Signs, verifies and formats the session cookie.
#[derive(Clone)]
pub struct SessionCookies {
    secret: String,
    name: String,
    secure: bool,
}

impl std::fmt::Debug for SessionCookies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCookies")
            .field("name", &self.name)
            .field("secure", &self.secure)
            .finish_non_exhaustive()
    }
}

impl SessionCookies {
    pub fn new(secret: impl Into<String>, name: impl Into<String>, secure: bool) -> Self {
        SessionCookies {
            secret: secret.into(),
            name: name.into(),
            secure,
        }
    }

    pub fn issue(&self, session_id: &str, ttl: Duration) -> SessionResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: session_id.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| SessionError::Token(format!("Failed to sign session: {}", e)))
    }

    pub fn verify(&self, token: &str) -> SessionResult<Claims> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|e| SessionError::Token(e.to_string()))
    }

    /// `Set-Cookie` value carrying `token`.
    pub fn set_cookie(&self, token: &str, ttl: Duration) -> String {
        let mut cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            self.name,
            token,
            ttl.num_seconds()
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// `Set-Cookie` value that removes the cookie.
    pub fn clear_cookie(&self) -> String {
        let mut cookie = format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", self.name);
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// The session cookie's value from the request headers.
    pub fn read(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.name)
            .map(|(_, value)| value.to_string())
            .filter(|value| !value.is_empty())
    }
}

// =============================================================================
// Manager
// =============================================================================

/// A session resolved from a request.
#[derive(Debug, Clone)]
pub struct ActiveSession {
    pub id: String,
    pub data: SessionData,
}

#[derive(Debug, Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    cookies: SessionCookies,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, cookies: SessionCookies, ttl: Duration) -> Self {
        SessionManager {
            store,
            cookies,
            ttl,
        }
    }

    /// Records a login and returns the `Set-Cookie` value for it.
    pub async fn start(&self, auth: AuthSession) -> SessionResult<String> {
        let data = SessionData::from(auth);
        let id = self.store.create(&data, self.ttl).await?;
        let token = self.cookies.issue(&id, self.ttl)?;
        info!(email = %data.email, store = self.store.store_name(), "Session started");
        Ok(self.cookies.set_cookie(&token, self.ttl))
    }

    /// The session named by the request's cookie, if it is still valid.
    pub async fn resolve(&self, headers: &HeaderMap) -> SessionResult<Option<ActiveSession>> {
        let Some(token) = self.cookies.read(headers) else {
            return Ok(None);
        };
        let claims = match self.cookies.verify(&token) {
            Ok(claims) => claims,
            Err(e) => {
                debug!(error = %e, "Rejected session cookie");
                return Ok(None);
            }
        };
        Ok(self
            .store
            .get(&claims.sub)
            .await?
            .map(|data| ActiveSession {
                id: claims.sub,
                data,
            }))
    }

    /// Destroys the request's session, if any, and returns the `Set-Cookie`
    /// value that clears the cookie.
    pub async fn end(&self, headers: &HeaderMap) -> SessionResult<String> {
        if let Some(session) = self.resolve(headers).await? {
            self.store.destroy(&session.id).await?;
            info!(email = %session.data.email, "Session ended");
        }
        Ok(self.cookies.clear_cookie())
    }

    pub fn store_name(&self) -> &'static str {
        self.store.store_name()
    }
}
