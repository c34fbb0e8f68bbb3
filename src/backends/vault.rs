//! HashiCorp Vault backend over HTTP.
//!
//! Reads KV v2 secrets and database role credentials through the Vault HTTP
//! API and performs AppRole and userpass logins. Response bodies are returned
//! untouched; the resolver's engine helpers normalize them.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::backend::{AuthMethod, SecretBackend};
use crate::address::SecretLocation;
use crate::config::VaultConfig;
use crate::errors::{ResolverError, Result};
use crate::types::SecretString;

const API_PREFIX: &str = "v1";
const NAMESPACE_HEADER: &str = "X-Vault-Namespace";

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<String>,
}

#[derive(Deserialize)]
struct LoginResponse {
    auth: LoginAuth,
}

#[derive(Deserialize)]
struct LoginAuth {
    client_token: SecretString,
}

/// Vault HTTP API client
#[derive(Clone)]
pub struct VaultBackend {
    client: Client,
    namespace: Option<String>,
}

impl std::fmt::Debug for VaultBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultBackend")
            .field("namespace", &self.namespace)
            .field("client", &"[reqwest::Client]")
            .finish()
    }
}

impl VaultBackend {
    /// Create a backend with the given namespace and request timeout
    pub fn new(namespace: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            ResolverError::config_with_source("Failed to build HTTP client", Box::new(e))
        })?;
        Ok(Self { client, namespace })
    }

    pub fn from_config(config: &VaultConfig) -> Result<Self> {
        Self::new(config.namespace.clone(), config.timeout())
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// `{endpoint}/v1/{segments..}`, each segment percent-encoded
    fn url<'a, I>(endpoint: &Url, segments: I) -> Result<Url>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut url = endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| ResolverError::config(format!("Vault address '{}' cannot carry a path", endpoint)))?
            .pop_if_empty()
            .push(API_PREFIX)
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.namespace {
            Some(namespace) => builder.header(NAMESPACE_HEADER, namespace),
            None => builder,
        }
    }

    async fn send(path: &str, builder: RequestBuilder) -> Result<Bytes> {
        let response = builder.send().await.map_err(|e| {
            warn!(path = %path, error = %e, "Vault request failed to send");
            ResolverError::transport(format!("Request to '{}' failed: {}", path, e))
        })?;
        Self::handle_response(path, response).await
    }

    /// Map the response status onto the remote error kinds
    async fn handle_response(path: &str, response: Response) -> Result<Bytes> {
        let status = response.status();
        debug!(path = %path, status = %status, "Vault response");

        if status.is_success() {
            return response
                .bytes()
                .await
                .map_err(|e| ResolverError::transport(format!("Failed to read response from '{}': {}", path, e)));
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(path = %path, status = %status, error = %e, "Failed to read Vault error body");
                format!("failed to read response body: {}", e)
            }
        };
        let errors = serde_json::from_str::<ErrorBody>(&body).map(|b| b.errors).unwrap_or_default();
        warn!(path = %path, status = %status, "Vault rejected request");

        Err(classify(path, status, errors, body))
    }

    async fn login(&self, path: &str, url: Url, body: serde_json::Value) -> Result<SecretString> {
        let payload = Self::send(path, self.request(Method::POST, url).json(&body)).await?;
        let login: LoginResponse = serde_json::from_slice(&payload)
            .map_err(|e| ResolverError::invalid_response(path, format!("missing auth.client_token: {}", e)))?;
        info!(path = %path, "Vault login succeeded");
        Ok(login.auth.client_token)
    }
}

/// Non-empty `/`-separated segments of a mount or secret path
fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

fn classify(path: &str, status: StatusCode, errors: Vec<String>, body: String) -> ResolverError {
    let detail = if errors.is_empty() { body } else { errors.join("; ") };
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ResolverError::unauthorized(if detail.is_empty() { status.to_string() } else { detail })
        }
        StatusCode::NOT_FOUND => ResolverError::not_found(path),
        StatusCode::BAD_REQUEST if errors.is_empty() && !detail.is_empty() => ResolverError::bad_request(vec![detail]),
        StatusCode::BAD_REQUEST => ResolverError::bad_request(errors),
        other => ResolverError::server_error(other.as_u16(), detail),
    }
}

#[async_trait]
impl SecretBackend for VaultBackend {
    async fn authenticate(&self, endpoint: &Url, method: &AuthMethod) -> Result<SecretString> {
        match method {
            AuthMethod::Token(token) => Ok(token.clone()),
            AuthMethod::AppRole { mount, role_id, secret_id } => {
                let path = format!("auth/{}/login", mount.trim_matches('/'));
                let url = Self::url(endpoint, ["auth"].into_iter().chain(segments(mount)).chain(["login"]))?;
                self.login(&path, url, json!({ "role_id": role_id, "secret_id": secret_id.expose_secret() }))
                    .await
            }
            AuthMethod::Userpass { mount, username, password } => {
                let path = format!("auth/{}/login/{}", mount.trim_matches('/'), username);
                let url = Self::url(
                    endpoint,
                    ["auth"].into_iter().chain(segments(mount)).chain(["login", username.as_str()]),
                )?;
                self.login(&path, url, json!({ "password": password.expose_secret() })).await
            }
        }
    }

    async fn fetch(&self, endpoint: &Url, token: &SecretString, location: &SecretLocation) -> Result<Bytes> {
        let path = location.request_path();
        let mut url = Self::url(endpoint, segments(&path))?;
        if let Some(version) = location.version() {
            url.query_pairs_mut().append_pair("version", &version.to_string());
        }

        debug!(path = %path, version = ?location.version(), "Reading secret from Vault");
        Self::send(&path, self.request(Method::GET, url).bearer_auth(token.expose_secret())).await
    }

    fn backend_type(&self) -> &'static str {
        "vault"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_api_prefix() {
        let endpoint = Url::parse("http://127.0.0.1:8200/").unwrap();
        let url = VaultBackend::url(&endpoint, segments("secret/data/app")).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8200/v1/secret/data/app");

        let nested = Url::parse("https://vault.example.com/proxy/").unwrap();
        let url = VaultBackend::url(&nested, segments("database/creds/web")).unwrap();
        assert_eq!(url.as_str(), "https://vault.example.com/proxy/v1/database/creds/web");
    }

    #[test]
    fn test_url_escapes_reserved_characters_in_names() {
        let endpoint = Url::parse("http://127.0.0.1:8200").unwrap();

        let location = SecretLocation::kv("secret", "app#prod", None);
        let url = VaultBackend::url(&endpoint, segments(&location.request_path())).unwrap();
        assert_eq!(url.path(), "/v1/secret/data/app%23prod");
        assert_eq!(url.fragment(), None);

        let location = SecretLocation::kv("secret", "team?x/db", None);
        let url = VaultBackend::url(&endpoint, segments(&location.request_path())).unwrap();
        assert_eq!(url.path(), "/v1/secret/data/team%3Fx/db");
        assert_eq!(url.query(), None);

        let url = VaultBackend::url(&endpoint, ["auth", "userpass", "login", "ops/admin"]).unwrap();
        assert_eq!(url.path(), "/v1/auth/userpass/login/ops%2Fadmin");
    }

    #[test]
    fn test_bad_request_without_errors_keeps_body() {
        let bad = classify("p", StatusCode::BAD_REQUEST, vec![], "failed to read response body: eof".to_string());
        assert!(matches!(bad, ResolverError::RemoteBadRequest { ref errors } if errors == &["failed to read response body: eof"]));

        let empty = classify("p", StatusCode::BAD_REQUEST, vec![], String::new());
        assert!(matches!(empty, ResolverError::RemoteBadRequest { ref errors } if errors.is_empty()));
    }

    #[test]
    fn test_classify_statuses() {
        let denied = classify("p", StatusCode::FORBIDDEN, vec!["permission denied".to_string()], String::new());
        assert!(matches!(denied, ResolverError::RemoteUnauthorized { ref message } if message == "permission denied"));

        let missing = classify("secret/data/app", StatusCode::NOT_FOUND, vec![], String::new());
        assert!(matches!(missing, ResolverError::RemoteNotFound { ref path } if path == "secret/data/app"));

        let bad = classify("p", StatusCode::BAD_REQUEST, vec!["invalid version".to_string()], String::new());
        assert!(matches!(bad, ResolverError::RemoteBadRequest { ref errors } if errors == &["invalid version"]));

        let sealed = classify("p", StatusCode::SERVICE_UNAVAILABLE, vec!["Vault is sealed".to_string()], String::new());
        assert!(matches!(sealed, ResolverError::RemoteServerError { status: 503, .. }));

        let teapot = classify("p", StatusCode::IM_A_TEAPOT, vec![], "short and stout".to_string());
        assert!(matches!(teapot, ResolverError::RemoteServerError { status: 418, ref message } if message == "short and stout"));
    }

    #[test]
    fn test_debug_hides_client() {
        let backend = VaultBackend::new(Some("team-a".to_string()), Duration::from_secs(5)).unwrap();
        let debug = format!("{:?}", backend);
        assert!(debug.contains("team-a"));
        assert_eq!(backend.backend_type(), "vault");
    }
}
