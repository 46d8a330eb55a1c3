//! Session HTTP API
//!
//! Request/response bodies shared by the coordinator server and the
//! reqwest-based client.

mod client;
mod types;

pub use client::{ApiError, SessionApiClient};
pub use types::*;
