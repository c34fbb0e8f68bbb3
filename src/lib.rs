//! # vault-resolver
//!
//! Resolves hierarchical configuration keys into secrets fetched on demand from
//! HashiCorp Vault, caches them in memory, and hands them out through a typed
//! lookup interface.
//!
//! ## Architecture
//!
//! ```text
//! resolve(key, type) → SecretCache ──hit──→ value
//!                          │ miss
//!                          ↓
//!                    FetchRegistry → FetchOperation → SecretBackend (session token)
//!                                                         ↓
//!                                     decode → store → value
//!
//! ResourceReader::read("secret/app?version=2") → AddressStrategy → SecretBackend
//! ```
//!
//! ## Core Components
//!
//! - **Session State**: bearer token and endpoint owned by one resolver instance
//! - **Address Strategies**: parse textual addresses for KV secrets and database roles
//! - **Fetch Registry**: maps configuration keys to remote fetch operations
//! - **Typed Cache**: per key-and-context values with single-flight fetches, snapshots and watch streams
//! - **Resolution Engine**: `SecretResolver`, the entry point tying the above together
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use vault_resolver::{ConfigKey, KvSecret, ResolverConfig, Result, SecretResolver};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ResolverConfig::from_env()?;
//!     let resolver = SecretResolver::connect(&config).await?;
//!
//!     let key = ConfigKey::new(["database", "password"]);
//!     resolver.register_kv(key.clone(), KvSecret::new("secret", "app/db").field("password"));
//!
//!     let password: Option<String> = resolver.resolve_as(&key).await?;
//!     println!("resolved: {}", password.is_some());
//!     Ok(())
//! }
//! ```

pub mod address;
pub mod backends;
pub mod cache;
pub mod config;
pub mod engine;
pub mod errors;
pub mod key;
pub mod observability;
pub mod reader;
pub mod registry;
pub mod session;
pub mod types;
pub mod value;

// Re-export commonly used types and traits
pub use address::{AddressStrategy, KvAddressStrategy, RoleAddressStrategy, SecretLocation, SecretShape};
pub use backends::{AuthMethod, InMemoryBackend, SecretBackend, VaultBackend};
pub use cache::{CacheEntry, CacheOptions, CacheSnapshot, SecretCache};
pub use config::ResolverConfig;
pub use engine::{DatabaseCredentials, KvSecret, RoleCredential, RoleKind, SecretResolver};
pub use errors::{ResolverError, Result};
pub use key::{ConfigKey, ContextValue};
pub use observability::init_tracing;
pub use reader::ResourceReader;
pub use registry::{fetch_fn, FetchOperation, FetchRegistry};
pub use types::SecretString;
pub use value::{ConfigValue, TypedValue, ValueType};

/// Library version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
