//! Vidlift API Library
//!
//! This crate provides the HTTP surface of the transfer coordinator: session and part
//! handlers, object access, the signed-URL endpoint used by local and memory backends,
//! and application setup.

mod handlers;
mod telemetry;

pub mod error;
pub mod setup;
pub mod state;

pub use error::{ErrorResponse, HttpAppError};
pub use state::AppState;
pub use telemetry::init_telemetry;
