//! The opsgate boundary service: one HTTP entry point multiplexing the agent
//! prompt pipeline, payment checkout, payment webhooks, file upload/download,
//! and connect-account/payout operations. Handlers are independent modules
//! unified by a thin dispatch table plus shared CORS and auth extraction.

pub mod agent_api;
pub mod auth;
pub mod bootstrap;
pub mod checkout;
pub mod connect;
pub mod error;
pub mod files;
pub mod forward;
pub mod health;
pub mod payments;
pub mod routes;
pub mod state;
pub mod storage;
pub mod webhook;

pub use bootstrap::bootstrap_with_config;
pub use routes::router;
pub use state::AppState;
