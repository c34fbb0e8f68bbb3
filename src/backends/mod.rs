//! # Remote Secret Stores
//!
//! The [`SecretBackend`] trait and its implementations:
//!
//! - [`VaultBackend`]: HashiCorp Vault over HTTP (KV v2, database roles, AppRole/userpass login)
//! - [`InMemoryBackend`]: canned responses with call counters for tests

pub mod backend;
pub mod memory;
pub mod vault;

pub use backend::{AuthMethod, SecretBackend};
pub use memory::InMemoryBackend;
pub use vault::VaultBackend;
