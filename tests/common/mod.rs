//! Shared fixtures: a wiremock server standing in for the Vault HTTP API.

#![allow(dead_code)]

use serde_json::{json, Value};
use url::Url;
use vault_resolver::{ResolverConfig, SecretResolver, VaultBackend};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TOKEN: &str = "hvs.integration-token";

pub struct VaultMock {
    pub server: MockServer,
}

impl VaultMock {
    pub async fn start() -> Self {
        Self { server: MockServer::start().await }
    }

    pub fn endpoint(&self) -> Url {
        Url::parse(&self.server.uri()).expect("mock server uri")
    }

    pub fn config(&self) -> ResolverConfig {
        let mut config = ResolverConfig::default();
        config.vault.address = self.server.uri();
        config.vault.timeout_seconds = 5;
        config
    }

    /// Resolver against the mock, already holding [`TOKEN`]
    pub fn resolver(&self) -> SecretResolver {
        let resolver = SecretResolver::from_config(&self.config()).expect("resolver");
        resolver.set_token(TOKEN);
        resolver
    }

    /// Unauthenticated resolver with a Vault backend and no namespace
    pub fn bare_resolver(&self) -> SecretResolver {
        let backend = VaultBackend::new(None, std::time::Duration::from_secs(5)).expect("backend");
        SecretResolver::new(std::sync::Arc::new(backend), self.endpoint())
    }

    /// Latest version of a KV v2 secret, expected `times` times
    pub async fn kv(&self, mount: &str, key: &str, data: Value, times: u64) {
        Mock::given(method("GET"))
            .and(path(format!("/v1/{}/data/{}", mount, key)))
            .and(header("authorization", format!("Bearer {}", TOKEN).as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(kv_body(data, 1)))
            .expect(times)
            .mount(&self.server)
            .await;
    }

    /// A specific version of a KV v2 secret
    pub async fn kv_version(&self, mount: &str, key: &str, version: u64, data: Value) {
        Mock::given(method("GET"))
            .and(path(format!("/v1/{}/data/{}", mount, key)))
            .and(query_param("version", version.to_string().as_str()))
            .and(header("authorization", format!("Bearer {}", TOKEN).as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(kv_body(data, version)))
            .mount(&self.server)
            .await;
    }

    pub async fn static_creds(&self, mount: &str, role: &str, username: &str, password: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/v1/{}/static-creds/{}", mount, role)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "request_id": "0f4c7bd2-4a62-4a8b-8d5a-7c1b5d2c9f10",
                "data": {
                    "username": username,
                    "password": password,
                    "last_vault_rotation": "2024-05-01T10:00:00Z",
                    "rotation_period": 86400,
                    "ttl": 3600
                }
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn dynamic_creds(&self, mount: &str, role: &str, username: &str, password: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/v1/{}/creds/{}", mount, role)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "lease_id": format!("{}/creds/{}/2f6a614c", mount, role),
                "lease_duration": 3600,
                "renewable": true,
                "data": { "username": username, "password": password }
            })))
            .mount(&self.server)
            .await;
    }

    /// Any request to `request_path` fails with `status` and Vault's `errors` body
    pub async fn error(&self, request_path: &str, status: u16, errors: &[&str]) {
        Mock::given(path(request_path))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({ "errors": errors })))
            .mount(&self.server)
            .await;
    }
}

pub fn kv_body(data: Value, version: u64) -> Value {
    json!({
        "request_id": "b7c1e9a4-1d2e-4f3a-9b8c-0a1b2c3d4e5f",
        "lease_duration": 0,
        "renewable": false,
        "data": {
            "data": data,
            "metadata": {
                "created_time": "2024-05-01T10:00:00Z",
                "deletion_time": "",
                "destroyed": false,
                "version": version
            }
        }
    })
}
