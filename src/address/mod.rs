//! Secret address parsing.
//!
//! An [`AddressStrategy`] turns a textual secret address such as
//! `secret/app/api_key?version=2` or `database/static-creds/alice` into a
//! [`SecretLocation`]. Strategies answer `Ok(None)` for addresses outside their
//! mount, so several can be tried in order. An address inside the mount that
//! fails to parse is an error and stops the search.

mod kv;
mod role;

pub use kv::KvAddressStrategy;
pub use role::{RoleAddressStrategy, DYNAMIC_SEPARATOR, STATIC_SEPARATOR};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::errors::{ResolverError, Result};

/// Engine shape of a secret
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretShape {
    /// Versioned key/value secret
    Kv,
    /// Credential bound to a pre-existing account
    StaticRole,
    /// Credential generated on each request
    DynamicRole,
}

impl SecretShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kv => "kv",
            Self::StaticRole => "static_role",
            Self::DynamicRole => "dynamic_role",
        }
    }

    pub fn is_role(&self) -> bool {
        matches!(self, Self::StaticRole | Self::DynamicRole)
    }
}

impl FromStr for SecretShape {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "kv" => Ok(Self::Kv),
            "static_role" => Ok(Self::StaticRole),
            "dynamic_role" => Ok(Self::DynamicRole),
            _ => Err(format!("Unknown secret shape: {}", s)),
        }
    }
}

impl fmt::Display for SecretShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parameters for one remote fetch: mount, key or role name, shape and version
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecretLocation {
    mount: String,
    name: String,
    shape: SecretShape,
    version: Option<u64>,
}

impl SecretLocation {
    /// A key/value secret; `version` of `None` requests the latest revision
    pub fn kv(mount: impl AsRef<str>, key: impl AsRef<str>, version: Option<u64>) -> Self {
        Self {
            mount: normalize_path(mount.as_ref()),
            name: normalize_path(key.as_ref()),
            shape: SecretShape::Kv,
            version,
        }
    }

    pub fn static_role(mount: impl AsRef<str>, role: impl AsRef<str>) -> Self {
        Self::role(mount, role, SecretShape::StaticRole)
    }

    pub fn dynamic_role(mount: impl AsRef<str>, role: impl AsRef<str>) -> Self {
        Self::role(mount, role, SecretShape::DynamicRole)
    }

    fn role(mount: impl AsRef<str>, role: impl AsRef<str>, shape: SecretShape) -> Self {
        Self {
            mount: normalize_path(mount.as_ref()),
            name: normalize_path(role.as_ref()),
            shape,
            version: None,
        }
    }

    pub fn mount(&self) -> &str {
        &self.mount
    }

    /// Secret key for [`SecretShape::Kv`], role name otherwise
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> SecretShape {
        self.shape
    }

    pub fn version(&self) -> Option<u64> {
        self.version
    }

    /// Path of the engine endpoint below the API root, e.g. `secret/data/app`
    pub fn request_path(&self) -> String {
        let segment = match self.shape {
            SecretShape::Kv => "data",
            SecretShape::StaticRole => "static-creds",
            SecretShape::DynamicRole => "creds",
        };
        format!("{}/{}/{}", self.mount, segment, self.name)
    }
}

impl fmt::Display for SecretLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.request_path())?;
        if let Some(version) = self.version {
            write!(f, "?version={}", version)?;
        }
        Ok(())
    }
}

/// A parser for one secret shape.
///
/// Implementations return `Ok(None)` when the address is not theirs and
/// `Err(ResolverError::InvalidAddress)` when it is theirs but malformed.
pub trait AddressStrategy: Send + Sync + fmt::Debug {
    fn parse(&self, address: &str) -> Result<Option<SecretLocation>>;

    /// Short name used in logs
    fn name(&self) -> &'static str;
}

/// Try `strategies` in order; the first match or the first structural error wins
pub fn parse_address(
    strategies: &[Arc<dyn AddressStrategy>],
    address: &str,
) -> Result<Option<SecretLocation>> {
    for strategy in strategies {
        if let Some(location) = strategy.parse(address)? {
            tracing::debug!(strategy = strategy.name(), location = %location, "Parsed secret address");
            return Ok(Some(location));
        }
    }
    Ok(None)
}

pub(crate) fn normalize_path(path: &str) -> String {
    path.trim_matches('/').to_string()
}

/// Split an address into its path and optional query string
pub(crate) fn split_query(address: &str) -> (&str, Option<&str>) {
    match address.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (address, None),
    }
}

/// Remainder of `path` after `mount`, matching whole segments only
pub(crate) fn strip_mount<'a>(path: &'a str, mount: &str) -> Option<&'a str> {
    let path = path.trim_start_matches('/');
    if mount.is_empty() {
        return Some(path);
    }
    let rest = path.strip_prefix(mount)?;
    if rest.is_empty() || rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

pub(crate) fn invalid(address: &str, reason: impl Into<String>) -> ResolverError {
    ResolverError::invalid_address(address, reason)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_paths() {
        assert_eq!(SecretLocation::kv("secret", "app/api", Some(3)).request_path(), "secret/data/app/api");
        assert_eq!(
            SecretLocation::static_role("database", "alice").request_path(),
            "database/static-creds/alice"
        );
        assert_eq!(SecretLocation::dynamic_role("/database/", "bob").request_path(), "database/creds/bob");
    }

    #[test]
    fn test_location_display_includes_version() {
        assert_eq!(SecretLocation::kv("secret", "app", Some(2)).to_string(), "secret/data/app?version=2");
        assert_eq!(SecretLocation::kv("secret", "app", None).to_string(), "secret/data/app");
    }

    #[test]
    fn test_strip_mount_respects_segments() {
        assert_eq!(strip_mount("secret/app", "secret"), Some("/app"));
        assert_eq!(strip_mount("/secret", "secret"), Some(""));
        assert_eq!(strip_mount("secrets/app", "secret"), None);
        assert_eq!(strip_mount("kv/app", "secret"), None);
        assert_eq!(strip_mount("team/kv/app", "team/kv"), Some("/app"));
    }

    #[test]
    fn test_shape_roundtrip() {
        for shape in [SecretShape::Kv, SecretShape::StaticRole, SecretShape::DynamicRole] {
            assert_eq!(shape.as_str().parse::<SecretShape>().unwrap(), shape);
        }
        assert!("ldap".parse::<SecretShape>().is_err());
    }

    #[test]
    fn test_first_matching_strategy_wins() {
        let strategies: Vec<Arc<dyn AddressStrategy>> = vec![
            Arc::new(RoleAddressStrategy::new("database")),
            Arc::new(KvAddressStrategy::new("secret")),
        ];

        let kv = parse_address(&strategies, "secret/app?version=2").unwrap().unwrap();
        assert_eq!(kv, SecretLocation::kv("secret", "app", Some(2)));

        let role = parse_address(&strategies, "database/creds/bob").unwrap().unwrap();
        assert_eq!(role, SecretLocation::dynamic_role("database", "bob"));

        assert!(parse_address(&strategies, "pki/issue/web").unwrap().is_none());
    }

    #[test]
    fn test_structural_error_stops_search() {
        // Both strategies own the same mount; the role parser fails first
        let strategies: Vec<Arc<dyn AddressStrategy>> = vec![
            Arc::new(RoleAddressStrategy::new("shared")),
            Arc::new(KvAddressStrategy::new("shared")),
        ];

        let err = parse_address(&strategies, "shared/app/config").unwrap_err();
        assert!(matches!(err, ResolverError::InvalidAddress { .. }));
    }
}
