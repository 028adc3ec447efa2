//! REST boundary for the Haven survey verification workflow.
//!
//! A thin `axum` layer over [`survey_service::WorkflowService`]. The API
//! performs no authentication itself: caller identity and role arrive in
//! the `x-haven-caller-id` / `x-haven-caller-role` headers injected by
//! the upstream auth layer, and a missing or malformed pair is a 401.

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod router;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, DaemonError, DaemonResult};
pub use router::create_router;
pub use state::AppState;
