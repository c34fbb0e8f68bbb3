//! Round trip against a running Vault dev server.
//!
//! Requires `VAULT_ADDR` and `VAULT_TOKEN`, and a KV v2 engine mounted at `secret/`
//! holding `secret/vault-resolver-test` with a `password` field:
//!
//! ```text
//! vault kv put secret/vault-resolver-test password=live-pw
//! cargo test --features live-vault-tests --test live_vault
//! ```

#![cfg(feature = "live-vault-tests")]

use vault_resolver::{ConfigKey, KvSecret, ResolverConfig, Result, SecretResolver};

#[tokio::test]
async fn test_resolve_kv_secret_from_dev_server() -> Result<()> {
    let config = ResolverConfig::from_env()?;
    let resolver = SecretResolver::connect(&config).await?;

    let key = ConfigKey::new(["live", "password"]);
    resolver.register_kv(key.clone(), KvSecret::new("secret", "vault-resolver-test").field("password"));

    let password = resolver.resolve_as::<String>(&key).await?;
    assert_eq!(password.as_deref(), Some("live-pw"));
    assert_eq!(resolver.snapshot().len(), 1);
    Ok(())
}
