//! # Invitation Module
//!
//! One-time tokens that let an invited employee set a password.
//!
//! ## State Machine
//! ```text
//!                 add employee / resend
//!   ┌──────────┐ ───────────────────────► ┌───────────┐
//!   │ NoToken  │                          │  Pending  │◄──────┐
//!   └──────────┘                          └─────┬─────┘       │ resend
//!                                               │             │ (new token,
//!                 now - sent_at > expiry        │             │  sent_at reset)
//!                ┌──────────────────────────────┤             │
//!                ▼                              │ submit      │
//!          ┌───────────┐                        │ (password   │
//!          │  Expired  │────────────────────────┼─────────────┘
//!          └───────────┘                        ▼ ok)
//!                                         ┌───────────┐
//!                                         │ Accepted  │  token cleared
//!                                         └───────────┘
//! ```
//!
//! Only `Pending` may be accepted. Resend is refused once the employee is
//! both `active` and accepted; every other state gets a fresh token.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::Serialize;
use std::fmt;

use crate::error::{CoreError, CoreResult};
use crate::types::EmployeeStatus;

/// Random bytes behind every token (encodes to 43 URL-safe characters).
pub const TOKEN_BYTES: usize = 32;

// =============================================================================
// Token
// =============================================================================

/// A freshly generated invitation token.
#[derive(Clone, PartialEq, Eq)]
pub struct InvitationToken(String);

impl InvitationToken {
    /// Draws a token from the operating system RNG.
    pub fn generate() -> Self {
        Self::generate_with(&mut rand::rngs::OsRng)
    }

    pub fn generate_with<R: RngCore + ?Sized>(rng: &mut R) -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        rng.fill_bytes(&mut bytes);
        InvitationToken(URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

// Tokens are credentials; keep them out of Debug output and logs.
impl fmt::Debug for InvitationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("InvitationToken(..)")
    }
}

/// Builds the link mailed to the employee.
pub fn accept_url(app_url: &str, token: &str) -> String {
    format!("{}/invitation/accept/{}/", app_url.trim_end_matches('/'), token)
}

// =============================================================================
// State
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvitationState {
    NoToken,
    Pending,
    Expired,
    Accepted,
}

impl fmt::Display for InvitationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            InvitationState::NoToken => "not issued",
            InvitationState::Pending => "pending",
            InvitationState::Expired => "expired",
            InvitationState::Accepted => "already used",
        };
        f.write_str(text)
    }
}

/// The invitation columns of an employee row.
#[derive(Debug, Clone, Copy)]
pub struct InvitationRecord<'a> {
    pub token: Option<&'a str>,
    pub sent_at: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
}

impl InvitationRecord<'_> {
    /// Classifies the record at `now`.
    ///
    /// A token without `sent_at` never expires; acceptance always wins over
    /// expiry.
    pub fn state(&self, now: DateTime<Utc>, expiry: Duration) -> InvitationState {
        if self.accepted_at.is_some() {
            return InvitationState::Accepted;
        }
        if self.token.map_or(true, str::is_empty) {
            return InvitationState::NoToken;
        }
        match self.sent_at {
            Some(sent_at) if now.signed_duration_since(sent_at) > expiry => {
                InvitationState::Expired
            }
            _ => InvitationState::Pending,
        }
    }

    pub fn expires_at(&self, expiry: Duration) -> Option<DateTime<Utc>> {
        self.sent_at.map(|sent_at| sent_at + expiry)
    }

    /// Succeeds only for a pending invitation.
    pub fn ensure_acceptable(&self, now: DateTime<Utc>, expiry: Duration) -> CoreResult<()> {
        match self.state(now, expiry) {
            InvitationState::Pending => Ok(()),
            other => Err(CoreError::Invitation(other)),
        }
    }

    /// Refuses a resend for an employee who already finished onboarding.
    pub fn ensure_resendable(&self, status: EmployeeStatus) -> CoreResult<()> {
        if status == EmployeeStatus::Active && self.accepted_at.is_some() {
            return Err(CoreError::Invitation(InvitationState::Accepted));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sent() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
    }

    fn pending(token: &str) -> InvitationRecord<'_> {
        InvitationRecord {
            token: Some(token),
            sent_at: Some(sent()),
            accepted_at: None,
        }
    }

    #[test]
    fn test_token_shape() {
        let token = InvitationToken::generate();
        assert_eq!(token.as_str().len(), 43);
        assert!(token
            .as_str()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_ne!(token, InvitationToken::generate());
        assert_eq!(format!("{:?}", token), "InvitationToken(..)");
    }

    #[test]
    fn test_seeded_tokens_are_deterministic() {
        let a = InvitationToken::generate_with(&mut StdRng::seed_from_u64(7));
        let b = InvitationToken::generate_with(&mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
    }

    #[test]
    fn test_expiry_boundary() {
        let record = pending("tok");
        let expiry = Duration::hours(48);

        assert_eq!(record.state(sent(), expiry), InvitationState::Pending);
        assert_eq!(
            record.state(sent() + Duration::hours(48), expiry),
            InvitationState::Pending
        );
        assert_eq!(
            record.state(sent() + Duration::hours(48) + Duration::seconds(1), expiry),
            InvitationState::Expired
        );
        assert!(record
            .ensure_acceptable(sent() + Duration::hours(49), expiry)
            .is_err());
        assert_eq!(record.expires_at(expiry), Some(sent() + Duration::hours(48)));
    }

    #[test]
    fn test_configurable_expiry() {
        let record = pending("tok");
        let now = sent() + Duration::hours(3);
        assert_eq!(record.state(now, Duration::hours(2)), InvitationState::Expired);
        assert_eq!(record.state(now, Duration::hours(4)), InvitationState::Pending);
    }

    #[test]
    fn test_accepted_and_missing_token() {
        let accepted = InvitationRecord {
            token: None,
            sent_at: Some(sent()),
            accepted_at: Some(sent() + Duration::hours(1)),
        };
        assert_eq!(
            accepted.state(sent() + Duration::days(30), Duration::hours(48)),
            InvitationState::Accepted
        );

        let blank = InvitationRecord {
            token: Some(""),
            sent_at: None,
            accepted_at: None,
        };
        assert_eq!(blank.state(sent(), Duration::hours(48)), InvitationState::NoToken);

        let unsent = InvitationRecord {
            token: Some("tok"),
            sent_at: None,
            accepted_at: None,
        };
        assert_eq!(
            unsent.state(sent() + Duration::days(365), Duration::hours(48)),
            InvitationState::Pending
        );
    }

    #[test]
    fn test_resend_rules() {
        let done = InvitationRecord {
            token: None,
            sent_at: Some(sent()),
            accepted_at: Some(sent()),
        };
        assert!(done.ensure_resendable(EmployeeStatus::Active).is_err());
        // deactivated staff can be re-invited
        assert!(done.ensure_resendable(EmployeeStatus::Inactive).is_ok());
        assert!(pending("tok").ensure_resendable(EmployeeStatus::Pending).is_ok());
    }

    #[test]
    fn test_accept_url() {
        assert_eq!(
            accept_url("https://shop.example.com/", "abc"),
            "https://shop.example.com/invitation/accept/abc/"
        );
    }
}
