//! # retail-mail: Outbound Email for SmartRetail
//!
//! Invitation email goes out through one [`Mailer`] interface. The provider
//! is chosen from configuration, and a [`MailDispatcher`] worker sends
//! queued messages so request handlers never wait on a mail provider.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          retail-mail                                    │
//! │                                                                         │
//! │  InvitationEmail ──build()──► EmailMessage                              │
//! │                                   │                                     │
//! │                                   ▼                                     │
//! │  DispatchHandle ──enqueue──► bounded queue ──► MailDispatcher           │
//! │       │                                           │                     │
//! │       └──status(id)──► DeliveryLedger ◄───────────┤                     │
//! │                                                   ▼                     │
//! │                                   Arc<dyn Mailer>                       │
//! │                                   sendgrid | resend | log               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mailer = retail_mail::build_mailer(&config.mail)?;
//! let (mail, _worker) = MailDispatcher::spawn(mailer, &config.mail);
//!
//! let delivery = mail.enqueue(invitation.build()).await?;
//! let record = mail.status(delivery.id).await;
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod message;
pub mod provider;

pub use config::{MailConfig, MailProvider};
pub use dispatch::{
    Delivery, DeliveryId, DeliveryLedger, DeliveryRecord, DeliveryState, DispatchHandle,
    MailDispatcher,
};
pub use error::{MailError, MailResult};
pub use message::{EmailMessage, InvitationEmail, INVITATION_SUBJECT};
pub use provider::{
    build_mailer, DeliveryReceipt, LogMailer, Mailer, RecordingMailer, ResendMailer,
    SendGridMailer, Sender,
};
