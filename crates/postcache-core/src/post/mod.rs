//! Posting on behalf of an account.
//!
//! `PostOrchestrator` drives one request through load, validate, login,
//! submit, and persist. `IdentityLocks` keeps concurrent requests for the
//! same account from racing each other's session writes.

pub mod locks;
pub mod orchestrator;
pub mod request;

pub use locks::IdentityLocks;
pub use orchestrator::{PostOrchestrator, SessionStatus};
pub use request::PostRequest;
