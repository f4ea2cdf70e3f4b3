//! # SmartRetail Back-Office
//!
//! JSON HTTP server for a small retail shop: staff, stock, sales and the
//! sales report.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Back-Office Server                               │
//! │                                                                         │
//! │  Browser ──► axum Router ──► handlers ──► services                      │
//! │                  │               │            │                         │
//! │             TraceLayer    RequestContext      ├──► retail-store         │
//! │                          (session cookie)     │    (rest/postgres/mem)  │
//! │                                               ├──► identity provider    │
//! │                                               └──► retail-mail          │
//! │                                                    (dispatch queue)     │
//! │                                                                         │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────────┐│
//! │  │  Auth          │  │  Inventory     │  │  Employees                 ││
//! │  │ • login/logout │  │ • list         │  │ • add + invitation         ││
//! │  │ • me           │  │ • add stock    │  │ • update / delete          ││
//! │  │ • invitations  │  │ • update/delete│  │ • resend / delivery status ││
//! │  └────────────────┘  └────────────────┘  └────────────────────────────┘│
//! │  ┌────────────────┐  ┌────────────────┐                                │
//! │  │  Sales         │  │  Dashboard     │                                │
//! │  │ • create/delete│  │ • metrics      │                                │
//! │  │ • get / list   │  │ • report       │                                │
//! │  └────────────────┘  └────────────────┘                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration
//! A TOML file (`RETAIL_CONFIG` or the platform config dir) overridden by
//! environment variables, see [`config::ServerConfig`].

pub mod config;
pub mod context;
pub mod error;
pub mod handlers;
pub mod services;
pub mod session;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

pub use config::ServerConfig;
pub use error::{ApiError, ApiResult, ErrorCode};
pub use state::{AppState, MemoryState};

/// Every route of the back-office.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/me", get(handlers::auth::me))
        .route("/metrics", get(handlers::reports::metrics))
        .route("/report", get(handlers::reports::report))
        .route("/products", get(handlers::inventory::list))
        .route("/stock/add", post(handlers::inventory::add_stock))
        .route("/product/update", post(handlers::inventory::update))
        .route("/product/delete", post(handlers::inventory::delete))
        .route("/employees", get(handlers::employees::list))
        .route("/employee/add", post(handlers::employees::add))
        .route("/employee/update", post(handlers::employees::update))
        .route("/employee/delete", post(handlers::employees::delete))
        .route(
            "/employee/resend-invitation",
            post(handlers::employees::resend_invitation),
        )
        .route(
            "/employee/invitation-status/{delivery_id}",
            get(handlers::employees::invitation_status),
        )
        .route("/sales", get(handlers::sales::list))
        .route("/sale/create", post(handlers::sales::create))
        .route("/sale/get", get(handlers::sales::get))
        .route("/sale/delete", post(handlers::sales::delete));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/login", post(handlers::auth::login))
        .route("/logout", post(handlers::auth::logout))
        .route("/invitation/accept/{token}", get(handlers::invitations::inspect))
        // Mailed links end with a slash.
        .route("/invitation/accept/{token}/", get(handlers::invitations::inspect))
        .route("/invitation/submit/{token}", post(handlers::invitations::submit))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
