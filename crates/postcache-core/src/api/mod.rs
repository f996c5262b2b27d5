//! Platform client module.
//!
//! `Platform` is the capability the orchestrator drives: a per-request token
//! jar plus login, identity check, and post submission. `HttpConnector` hands
//! out reqwest-backed `HttpPlatform` clients; tests supply scripted ones.

pub mod client;
pub mod error;
pub mod models;
pub mod platform;

pub use client::{HttpConnector, HttpPlatform};
pub use error::PlatformError;
pub use models::{PostResult, PostSummary, Profile};
pub use platform::{Platform, PlatformConnector};
