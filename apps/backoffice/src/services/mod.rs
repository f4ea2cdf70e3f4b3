//! Service layer: one service per back-office area.
//!
//! Services hold an [`AppState`](crate::state::AppState) clone, talk to the
//! repositories, identity provider and mail dispatcher, and return
//! serializable responses. HTTP concerns stay in `handlers`.

pub mod auth;
pub mod dashboard;
pub mod employees;
pub mod health;
pub mod inventory;
pub mod invitations;
pub mod reports;
pub mod sales;
