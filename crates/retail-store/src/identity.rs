//! # Identity Provider
//!
//! Accounts and passwords live with the hosted identity service, not in
//! the `employees` table. Two capabilities are split into two traits
//! because they need different credentials:
//!
//! ```text
//! ┌──────────────────────────┐        ┌───────────────────────────────┐
//! │ IdentityProvider         │        │ IdentityAdmin                 │
//! │ (public / anon key)      │        │ (service-role key, optional)  │
//! │  sign_in_with_password   │        │  create_user(email_confirm)   │
//! │  sign_up                 │        │                               │
//! └──────────────────────────┘        └───────────────────────────────┘
//!            │                                      │
//!            ▼                                      ▼
//!   POST /auth/v1/token?grant_type=password  POST /auth/v1/admin/users
//!   POST /auth/v1/signup
//! ```
//!
//! Without an admin client, invitation acceptance can only fall back to
//! ordinary signup, which leaves the address unconfirmed.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use crate::error::IdentityError;

pub type IdentityResult<T> = Result<T, IdentityError>;

// =============================================================================
// Types
// =============================================================================

/// A signed-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub user_id: String,
    pub email: String,
    pub access_token: String,
}

/// An account as the provider reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: String,
    pub email: String,
    pub email_confirmed: bool,
}

/// Registration payload. `metadata` is stored with the account.
#[derive(Debug, Clone, Serialize)]
pub struct NewAccount {
    pub email: String,
    pub password: String,
    pub metadata: Value,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync + std::fmt::Debug {
    async fn sign_in_with_password(&self, email: &str, password: &str)
        -> IdentityResult<AuthSession>;

    /// Ordinary self-service signup. The provider may require the address
    /// to be confirmed before the account can sign in.
    async fn sign_up(&self, account: &NewAccount) -> IdentityResult<AuthUser>;
}

#[async_trait]
pub trait IdentityAdmin: Send + Sync + std::fmt::Debug {
    /// Creates an account directly, optionally with the email already
    /// confirmed.
    async fn create_user(&self, account: &NewAccount, email_confirm: bool)
        -> IdentityResult<AuthUser>;
}

/// The identity capabilities available to the server.
#[derive(Debug, Clone)]
pub struct IdentityServices {
    pub provider: Arc<dyn IdentityProvider>,
    pub admin: Option<Arc<dyn IdentityAdmin>>,
}

impl IdentityServices {
    /// GoTrue clients for `base_url`. The admin client exists only when a
    /// service-role key is given.
    pub fn gotrue(
        base_url: &str,
        api_key: &str,
        service_role_key: Option<&str>,
    ) -> IdentityResult<Self> {
        let provider = Arc::new(GoTrueClient::new(base_url, api_key)?);
        let admin = match service_role_key.filter(|k| !k.is_empty()) {
            Some(key) => {
                Some(Arc::new(GoTrueClient::new(base_url, key)?) as Arc<dyn IdentityAdmin>)
            }
            None => None,
        };
        Ok(IdentityServices { provider, admin })
    }

    /// In-memory provider acting as both the public and the admin client.
    pub fn in_memory(identity: MemoryIdentity, with_admin: bool) -> Self {
        let shared = Arc::new(identity);
        IdentityServices {
            provider: shared.clone(),
            admin: with_admin.then(|| shared as Arc<dyn IdentityAdmin>),
        }
    }
}

// =============================================================================
// GoTrue REST Client
// =============================================================================

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Client for the hosted identity service's REST API.
#[derive(Debug, Clone)]
pub struct GoTrueClient {
    http: reqwest::Client,
    base: Url,
    key: String,
}

#[derive(Debug, Deserialize)]
struct GoTrueUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    email_confirmed_at: Option<String>,
    #[serde(default)]
    confirmed_at: Option<String>,
}

impl From<GoTrueUser> for AuthUser {
    fn from(u: GoTrueUser) -> Self {
        AuthUser {
            user_id: u.id,
            email: u.email.unwrap_or_default(),
            email_confirmed: u.email_confirmed_at.is_some() || u.confirmed_at.is_some(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    user: GoTrueUser,
}

/// Signup answers with the user, or with `{user, session}` when
/// confirmation is disabled.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignupResponse {
    Wrapped { user: GoTrueUser },
    Bare(GoTrueUser),
}

impl GoTrueClient {
    pub fn new(base_url: &str, key: &str) -> IdentityResult<Self> {
        let base = Url::parse(base_url).map_err(|e| IdentityError::Provider {
            status: 0,
            message: format!("bad identity url: {}", e),
        })?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| IdentityError::Network(e.to_string()))?;
        Ok(GoTrueClient {
            http,
            base,
            key: key.to_string(),
        })
    }

    fn endpoint(&self, path: &[&str]) -> IdentityResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| IdentityError::Provider {
                status: 0,
                message: "identity url cannot be a base".to_string(),
            })?
            .pop_if_empty()
            .extend(["auth", "v1"])
            .extend(path);
        Ok(url)
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        url: Url,
        body: &Value,
    ) -> IdentityResult<T> {
        let response = self
            .http
            .post(url)
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(IdentityError::classify(status.as_u16(), &error_message(&text)));
        }
        Ok(response.json::<T>().await?)
    }
}

/// GoTrue reports errors under several keys depending on the endpoint.
fn error_message(body: &str) -> String {
    let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    ["error_description", "msg", "message", "error"]
        .iter()
        .find_map(|k| parsed.get(*k).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| body.chars().take(200).collect())
}

#[async_trait]
impl IdentityProvider for GoTrueClient {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> IdentityResult<AuthSession> {
        let mut url = self.endpoint(&["token"])?;
        url.query_pairs_mut().append_pair("grant_type", "password");

        let token: TokenResponse = self
            .post(url, &json!({ "email": email, "password": password }))
            .await?;
        debug!(user_id = %token.user.id, "Identity sign-in succeeded");

        Ok(AuthSession {
            user_id: token.user.id,
            email: token.user.email.unwrap_or_else(|| email.to_string()),
            access_token: token.access_token,
        })
    }

    async fn sign_up(&self, account: &NewAccount) -> IdentityResult<AuthUser> {
        let url = self.endpoint(&["signup"])?;
        let response: SignupResponse = self
            .post(
                url,
                &json!({
                    "email": account.email,
                    "password": account.password,
                    "data": account.metadata,
                }),
            )
            .await?;
        Ok(match response {
            SignupResponse::Wrapped { user } | SignupResponse::Bare(user) => user.into(),
        })
    }
}

#[async_trait]
impl IdentityAdmin for GoTrueClient {
    async fn create_user(
        &self,
        account: &NewAccount,
        email_confirm: bool,
    ) -> IdentityResult<AuthUser> {
        let url = self.endpoint(&["admin", "users"])?;
        let user: GoTrueUser = self
            .post(
                url,
                &json!({
                    "email": account.email,
                    "password": account.password,
                    "email_confirm": email_confirm,
                    "user_metadata": account.metadata,
                }),
            )
            .await?;
        info!(email = %account.email, "Identity account created via admin API");
        Ok(user.into())
    }
}

// =============================================================================
// In-Memory Provider
// =============================================================================

#[derive(Debug, Clone)]
struct StoredAccount {
    user_id: String,
    email: String,
    password_hash: String,
    confirmed: bool,
    metadata: Value,
}

/// Argon2-backed accounts kept in memory, for tests and local runs.
#[derive(Debug, Clone)]
pub struct MemoryIdentity {
    accounts: Arc<Mutex<HashMap<String, StoredAccount>>>,
    confirm_on_signup: bool,
}

impl Default for MemoryIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIdentity {
    /// Signups start unconfirmed, like the hosted service.
    pub fn new() -> Self {
        MemoryIdentity {
            accounts: Arc::new(Mutex::new(HashMap::new())),
            confirm_on_signup: false,
        }
    }

    pub fn confirm_on_signup(mut self, confirm: bool) -> Self {
        self.confirm_on_signup = confirm;
        self
    }

    /// Marks an address confirmed. Returns false for unknown addresses.
    pub async fn confirm_email(&self, email: &str) -> bool {
        match self.accounts.lock().await.get_mut(&email.to_lowercase()) {
            Some(account) => {
                account.confirmed = true;
                true
            }
            None => false,
        }
    }

    /// Metadata recorded for an address.
    pub async fn metadata(&self, email: &str) -> Option<Value> {
        self.accounts
            .lock()
            .await
            .get(&email.to_lowercase())
            .map(|a| a.metadata.clone())
    }

    async fn register(&self, account: &NewAccount, confirmed: bool) -> IdentityResult<AuthUser> {
        let key = account.email.trim().to_lowercase();
        let password_hash = hash_password(&account.password)?;

        let mut accounts = self.accounts.lock().await;
        if accounts.contains_key(&key) {
            return Err(IdentityError::AlreadyRegistered);
        }

        let stored = StoredAccount {
            user_id: Uuid::new_v4().to_string(),
            email: account.email.trim().to_string(),
            password_hash,
            confirmed,
            metadata: account.metadata.clone(),
        };
        let user = AuthUser {
            user_id: stored.user_id.clone(),
            email: stored.email.clone(),
            email_confirmed: confirmed,
        };
        accounts.insert(key, stored);
        Ok(user)
    }
}

fn hash_password(password: &str) -> IdentityResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| IdentityError::Provider {
            status: 500,
            message: format!("Failed to hash password: {}", e),
        })
}

fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentity {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> IdentityResult<AuthSession> {
        let account = self
            .accounts
            .lock()
            .await
            .get(&email.trim().to_lowercase())
            .cloned()
            .ok_or(IdentityError::InvalidCredentials)?;

        if !verify_password(password, &account.password_hash) {
            return Err(IdentityError::InvalidCredentials);
        }
        if !account.confirmed {
            return Err(IdentityError::EmailNotConfirmed);
        }

        Ok(AuthSession {
            user_id: account.user_id,
            email: account.email,
            access_token: Uuid::new_v4().to_string(),
        })
    }

    async fn sign_up(&self, account: &NewAccount) -> IdentityResult<AuthUser> {
        self.register(account, self.confirm_on_signup).await
    }
}

#[async_trait]
impl IdentityAdmin for MemoryIdentity {
    async fn create_user(
        &self,
        account: &NewAccount,
        email_confirm: bool,
    ) -> IdentityResult<AuthUser> {
        self.register(account, email_confirm).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(email: &str) -> NewAccount {
        NewAccount {
            email: email.to_string(),
            password: "Secret123".to_string(),
            metadata: json!({ "role": "Sales" }),
        }
    }

    #[tokio::test]
    async fn test_admin_created_account_can_sign_in() {
        let identity = MemoryIdentity::new();
        let user = identity.create_user(&account("aina@shop.my"), true).await.unwrap();
        assert!(user.email_confirmed);

        let session = identity
            .sign_in_with_password("Aina@Shop.my", "Secret123")
            .await
            .unwrap();
        assert_eq!(session.user_id, user.user_id);
    }

    #[tokio::test]
    async fn test_signup_requires_confirmation() {
        let identity = MemoryIdentity::new();
        identity.sign_up(&account("aina@shop.my")).await.unwrap();

        assert_eq!(
            identity
                .sign_in_with_password("aina@shop.my", "Secret123")
                .await
                .unwrap_err(),
            IdentityError::EmailNotConfirmed
        );

        assert!(identity.confirm_email("aina@shop.my").await);
        assert!(identity
            .sign_in_with_password("aina@shop.my", "Secret123")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_wrong_password_and_duplicates() {
        let identity = MemoryIdentity::new();
        identity.create_user(&account("aina@shop.my"), true).await.unwrap();

        assert_eq!(
            identity
                .sign_in_with_password("aina@shop.my", "wrong")
                .await
                .unwrap_err(),
            IdentityError::InvalidCredentials
        );
        assert_eq!(
            identity
                .create_user(&account("aina@shop.my"), true)
                .await
                .unwrap_err(),
            IdentityError::AlreadyRegistered
        );
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(
            error_message(r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#),
            "Invalid login credentials"
        );
        assert_eq!(error_message(r#"{"msg":"User already registered"}"#), "User already registered");
        assert_eq!(error_message("plain"), "plain");
    }

    #[test]
    fn test_endpoints() {
        let client = GoTrueClient::new("https://demo.supabase.co/", "anon").unwrap();
        assert_eq!(
            client.endpoint(&["admin", "users"]).unwrap().as_str(),
            "https://demo.supabase.co/auth/v1/admin/users"
        );
    }
}
