//! # Configuration Settings
//!
//! Defines the configuration structure for the secret resolver.

use crate::backends::AuthMethod;
use crate::cache::CacheOptions;
use crate::errors::{ResolverError, Result};
use crate::types::SecretString;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;
use validator::Validate;

const ENV_PREFIX: &str = "VAULT_RESOLVER";
const ENV_SEPARATOR: &str = "__";

/// Main resolver configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
#[serde(default)]
pub struct ResolverConfig {
    /// Remote store connection
    #[validate(nested)]
    pub vault: VaultConfig,

    /// Login performed by `SecretResolver::connect`; none leaves the session unauthenticated
    pub auth: Option<AuthConfig>,

    /// Cache behaviour
    pub cache: CacheConfig,

    /// Logging configuration
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl ResolverConfig {
    /// Load configuration from defaults, an optional file and `VAULT_RESOLVER__*` variables.
    ///
    /// Nested fields use `__` in variable names, e.g. `VAULT_RESOLVER__VAULT__ADDRESS`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator(ENV_SEPARATOR)
                .separator(ENV_SEPARATOR),
        );

        let config: ResolverConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration from the conventional `VAULT_ADDR`, `VAULT_NAMESPACE` and `VAULT_TOKEN` variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(address) = std::env::var("VAULT_ADDR") {
            config.vault.address = address;
        }
        config.vault.namespace = std::env::var("VAULT_NAMESPACE").ok().filter(|ns| !ns.is_empty());
        if let Ok(token) = std::env::var("VAULT_TOKEN") {
            config.auth = Some(AuthConfig::Token { token: SecretString::new(token) });
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(ResolverError::from)?;
        self.validate_custom()?;
        Ok(())
    }

    fn validate_custom(&self) -> Result<()> {
        self.vault.endpoint()?;

        if let Some(auth) = &self.auth {
            auth.validate_fields()?;
        }

        if self.observability.log_level.trim().is_empty() {
            return Err(ResolverError::validation_field("Log level cannot be blank", "observability.log_level"));
        }

        Ok(())
    }
}

/// Remote store connection settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct VaultConfig {
    /// Base URL of the store, e.g. `https://vault.example.com:8200`
    #[validate(length(min = 1, message = "Vault address cannot be empty"))]
    pub address: String,

    /// Enterprise namespace sent as `X-Vault-Namespace`
    pub namespace: Option<String>,

    /// Per-request timeout in seconds
    #[validate(range(min = 1, max = 300, message = "Timeout must be between 1 and 300 seconds"))]
    pub timeout_seconds: u64,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self { address: "http://127.0.0.1:8200".to_string(), namespace: None, timeout_seconds: 30 }
    }
}

impl VaultConfig {
    /// Parsed base URL; only `http` and `https` are accepted
    pub fn endpoint(&self) -> Result<Url> {
        let url = Url::parse(&self.address).map_err(|e| {
            ResolverError::validation_field(format!("Invalid Vault address '{}': {}", self.address, e), "vault.address")
        })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ResolverError::validation_field(
                format!("Vault address must use http or https, not '{}'", other),
                "vault.address",
            )),
        }
    }

    /// Get the request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Login method and credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum AuthConfig {
    Token {
        token: SecretString,
    },
    #[serde(rename = "approle")]
    AppRole {
        #[serde(default = "default_approle_mount")]
        mount: String,
        role_id: String,
        secret_id: SecretString,
    },
    Userpass {
        #[serde(default = "default_userpass_mount")]
        mount: String,
        username: String,
        password: SecretString,
    },
}

fn default_approle_mount() -> String {
    "approle".to_string()
}

fn default_userpass_mount() -> String {
    "userpass".to_string()
}

impl AuthConfig {
    pub fn method_name(&self) -> &'static str {
        match self {
            Self::Token { .. } => "token",
            Self::AppRole { .. } => "approle",
            Self::Userpass { .. } => "userpass",
        }
    }

    pub fn to_method(&self) -> AuthMethod {
        match self {
            Self::Token { token } => AuthMethod::Token(token.clone()),
            Self::AppRole { mount, role_id, secret_id } => AuthMethod::AppRole {
                mount: mount.clone(),
                role_id: role_id.clone(),
                secret_id: secret_id.clone(),
            },
            Self::Userpass { mount, username, password } => AuthMethod::Userpass {
                mount: mount.clone(),
                username: username.clone(),
                password: password.clone(),
            },
        }
    }

    fn validate_fields(&self) -> Result<()> {
        let required: Vec<(&str, bool)> = match self {
            Self::Token { token } => vec![("auth.token", token.is_empty())],
            Self::AppRole { mount, role_id, secret_id } => vec![
                ("auth.mount", mount.trim().is_empty()),
                ("auth.role_id", role_id.trim().is_empty()),
                ("auth.secret_id", secret_id.is_empty()),
            ],
            Self::Userpass { mount, username, password } => vec![
                ("auth.mount", mount.trim().is_empty()),
                ("auth.username", username.trim().is_empty()),
                ("auth.password", password.is_empty()),
            ],
        };

        match required.into_iter().find(|(_, missing)| *missing) {
            Some((field, _)) => Err(ResolverError::validation_field(
                format!("{} login requires a non-empty value", self.method_name()),
                field,
            )),
            None => Ok(()),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Coalesce concurrent fetches of the same key into one remote call
    pub coalesce_inflight: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { coalesce_inflight: true }
    }
}

impl CacheConfig {
    pub fn to_options(&self) -> CacheOptions {
        CacheOptions { coalesce_inflight: self.coalesce_inflight }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level or filter directive, overridden by `RUST_LOG`
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logs: bool,

    /// Service name reported at startup
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { log_level: "info".to_string(), json_logs: false, service_name: "vault-resolver".to_string() }
    }
}
