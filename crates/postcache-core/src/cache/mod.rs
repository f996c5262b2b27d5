//! Session persistence.
//!
//! `SessionStore` keeps one serialized session per account identity on top of
//! any `KeyValueStore` backend:
//! - `MemoryStore`: process-local, used by tests and embedders
//! - `FileStore`: one JSON file per identity, optionally encrypted with `SessionCipher`
//! - `KeyringStore`: OS keychain entries

pub mod crypto;
pub mod file;
pub mod keychain;
pub mod memory;
pub mod store;

pub use crypto::SessionCipher;
pub use file::FileStore;
pub use keychain::KeyringStore;
pub use memory::MemoryStore;
pub use store::{KeyValueStore, SessionStore, StoreError};
