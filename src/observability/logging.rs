//! # Structured Logging
//!
//! Span macros and startup logging for the resolver. Spans carry a fresh
//! `operation_id` so the log lines of one resolution or remote fetch can be
//! grouped. Secret values and tokens are never recorded as fields.

/// Create a tracing span for one key resolution.
///
/// ```rust,ignore
/// let span = resolve_span!(key, value_type = %ValueType::Int);
/// ```
#[macro_export]
macro_rules! resolve_span {
    ($key:expr) => {
        tracing::debug_span!(
            "resolve",
            key = %$key,
            operation_id = %uuid::Uuid::new_v4()
        )
    };
    ($key:expr, $($field:tt)*) => {
        tracing::debug_span!(
            "resolve",
            key = %$key,
            operation_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Create a tracing span for one remote fetch
#[macro_export]
macro_rules! fetch_span {
    ($mount:expr, $shape:expr) => {
        tracing::info_span!(
            "remote_fetch",
            mount = %$mount,
            shape = %$shape,
            operation_id = %uuid::Uuid::new_v4()
        )
    };
    ($mount:expr, $shape:expr, $($field:tt)*) => {
        tracing::info_span!(
            "remote_fetch",
            mount = %$mount,
            shape = %$shape,
            operation_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Log configuration at startup. Credentials are reported by method only.
pub fn log_config_info(config: &crate::config::ResolverConfig) {
    tracing::info!(
        vault_address = %config.vault.address,
        namespace = config.vault.namespace.as_deref().unwrap_or("-"),
        auth_method = config.auth.as_ref().map(|auth| auth.method_name()).unwrap_or("none"),
        coalesce_inflight = config.cache.coalesce_inflight,
        service_name = %config.observability.service_name,
        "Secret resolver configuration"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthConfig, ResolverConfig};
    use crate::types::SecretString;
    use tracing_test::traced_test;

    #[test]
    fn test_macros_compile() {
        let _span = resolve_span!("database.password");
        let _span = resolve_span!("database.port", value_type = "int");
        let _span = fetch_span!("secret", "kv");
        let _span = fetch_span!("database", "static_role", role = "alice");
    }

    #[traced_test]
    #[test]
    fn test_log_config_info_never_logs_token() {
        let config = ResolverConfig {
            auth: Some(AuthConfig::Token { token: SecretString::new("hvs.never-log-me") }),
            ..Default::default()
        };

        log_config_info(&config);

        assert!(logs_contain("auth_method=\"token\"") || logs_contain("auth_method=token"));
        assert!(!logs_contain("hvs.never-log-me"));
    }
}
