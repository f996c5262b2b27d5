//! Account identity, credentials, and session handling.
//!
//! A `Session` is the token set a platform hands out after login. The
//! `SessionValidator` checks one without side effects; the `Authenticator`
//! replaces it with a fresh one from `Credentials`.

pub mod authenticator;
pub mod credentials;
pub mod identity;
pub mod session;
pub mod validator;

pub use authenticator::Authenticator;
pub use credentials::Credentials;
pub use identity::AccountIdentity;
pub use session::{Session, SessionToken};
pub use validator::{SessionCheck, SessionValidator};
