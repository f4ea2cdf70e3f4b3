//! # Email Messages
//!
//! The provider-neutral message and the invitation email built from an
//! employee row.

use serde::Serialize;

use retail_core::invitation::accept_url;
use retail_core::types::Role;
use retail_core::COMPANY_NAME;

use crate::error::{MailError, MailResult};

/// A single-recipient email. The sender comes from the mailer config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

impl EmailMessage {
    /// Rejects messages no provider would accept.
    pub fn validate(&self) -> MailResult<()> {
        if !self.to.contains('@') {
            return Err(MailError::InvalidMessage(format!(
                "recipient '{}' is not an email address",
                self.to
            )));
        }
        if self.subject.trim().is_empty() {
            return Err(MailError::InvalidMessage("subject is empty".into()));
        }
        if self.text.is_empty() && self.html.is_empty() {
            return Err(MailError::InvalidMessage("message has no body".into()));
        }
        Ok(())
    }
}

// =============================================================================
// Invitation Email
// =============================================================================

pub const INVITATION_SUBJECT: &str = "Welcome to SmartRetail - Complete Your Registration";

/// Everything the invitation email mentions.
#[derive(Debug, Clone)]
pub struct InvitationEmail<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub employee_id: &'a str,
    pub role: Role,
    pub token: &'a str,
    pub app_url: &'a str,
    pub expiry_hours: i64,
}

impl InvitationEmail<'_> {
    pub fn link(&self) -> String {
        accept_url(self.app_url, self.token)
    }

    pub fn build(&self) -> EmailMessage {
        let link = self.link();

        let text = format!(
            "Hello {name},\n\
             \n\
             Welcome to {company}!\n\
             \n\
             You have been added as a {role} to our system.\n\
             \n\
             Your Employee ID: {id}\n\
             \n\
             To complete your registration and set your password, please click the link below:\n\
             \n\
             {link}\n\
             \n\
             This link will expire in {hours} hours.\n\
             \n\
             If you did not expect this invitation, please ignore this email.\n\
             \n\
             Best regards,\n\
             {company} Team",
            name = self.name,
            company = COMPANY_NAME,
            role = self.role,
            id = self.employee_id,
            link = link,
            hours = self.expiry_hours,
        );

        let html = format!(
            r#"<!DOCTYPE html>
<html>
<body style="font-family: Arial, sans-serif; color: #1f2933;">
  <h2>Welcome to {company}!</h2>
  <p>Hello {name},</p>
  <p>You have been added as a <strong>{role}</strong> to our system.</p>
  <p>Your Employee ID: <strong>{id}</strong></p>
  <p>To complete your registration and set your password, click the button below:</p>
  <p><a href="{link}" style="background: #2563eb; color: #ffffff; padding: 10px 18px; border-radius: 4px; text-decoration: none;">Complete Registration</a></p>
  <p>Or copy this link into your browser:<br>{link}</p>
  <p>This link will expire in {hours} hours.</p>
  <p style="color: #6b7280;">If you did not expect this invitation, please ignore this email.</p>
  <p>Best regards,<br>{company} Team</p>
</body>
</html>"#,
            company = COMPANY_NAME,
            name = escape_html(self.name),
            role = self.role,
            id = escape_html(self.employee_id),
            link = escape_html(&link),
            hours = self.expiry_hours,
        );

        EmailMessage {
            to: self.email.to_string(),
            subject: INVITATION_SUBJECT.to_string(),
            html,
            text,
        }
    }
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
