//! # Configuration Management
//!
//! Resolver configuration, loaded from a file and `VAULT_RESOLVER__*`
//! environment variables with the `config` crate, or from the conventional
//! `VAULT_ADDR`/`VAULT_TOKEN` variables.

mod settings;

pub use settings::{AuthConfig, CacheConfig, ObservabilityConfig, ResolverConfig, VaultConfig};
