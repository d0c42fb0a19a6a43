//! Data models for the transfer coordinator
//!
//! Sessions, parts, outcomes and the request/response DTOs of the HTTP surface.

mod part;
pub mod requests;
mod session;
mod transfer;

pub use part::*;
pub use requests::*;
pub use session::*;
pub use transfer::*;
