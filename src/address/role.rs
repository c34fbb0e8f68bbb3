//! Role credential addresses: `<mount>/static-creds/<role>` and `<mount>/creds/<role>`

use super::{invalid, normalize_path, split_query, strip_mount, AddressStrategy, SecretLocation};
use crate::errors::Result;

pub const STATIC_SEPARATOR: &str = "/static-creds/";
pub const DYNAMIC_SEPARATOR: &str = "/creds/";

/// Parses static and dynamic role addresses below one mount
#[derive(Debug, Clone)]
pub struct RoleAddressStrategy {
    mount: String,
}

impl RoleAddressStrategy {
    pub fn new(mount: impl AsRef<str>) -> Self {
        Self { mount: normalize_path(mount.as_ref()) }
    }

    pub fn mount(&self) -> &str {
        &self.mount
    }
}

impl AddressStrategy for RoleAddressStrategy {
    fn parse(&self, address: &str) -> Result<Option<SecretLocation>> {
        let (path, query) = split_query(address);
        let Some(rest) = strip_mount(path, &self.mount) else {
            return Ok(None);
        };

        if query.is_some() {
            return Err(invalid(address, "role addresses take no query parameters"));
        }

        let static_hits = rest.matches(STATIC_SEPARATOR).count();
        let dynamic_hits = rest.matches(DYNAMIC_SEPARATOR).count();
        let separator = match (static_hits, dynamic_hits) {
            (1, 0) => STATIC_SEPARATOR,
            (0, 1) => DYNAMIC_SEPARATOR,
            (0, 0) => {
                return Err(invalid(
                    address,
                    format!("expected '{}' or '{}' after the mount", STATIC_SEPARATOR, DYNAMIC_SEPARATOR),
                ))
            }
            _ => return Err(invalid(address, "more than one role separator")),
        };

        let Some((prefix, role)) = rest.split_once(separator) else {
            return Err(invalid(address, "missing role separator"));
        };
        if !prefix.is_empty() {
            return Err(invalid(address, format!("unexpected path '{}' before the role separator", prefix)));
        }

        let role = role.trim_end_matches('/');
        if role.is_empty() {
            return Err(invalid(address, "empty role name"));
        }
        if role.contains('/') {
            return Err(invalid(address, format!("role name '{}' must be a single path segment", role)));
        }

        let location = if separator == STATIC_SEPARATOR {
            SecretLocation::static_role(&self.mount, role)
        } else {
            SecretLocation::dynamic_role(&self.mount, role)
        };
        Ok(Some(location))
    }

    fn name(&self) -> &'static str {
        "role"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::SecretShape;
    use crate::errors::ResolverError;

    fn strategy() -> RoleAddressStrategy {
        RoleAddressStrategy::new("database")
    }

    #[test]
    fn test_static_role() {
        let location = strategy().parse("database/static-creds/alice").unwrap().unwrap();
        assert_eq!(location.mount(), "database");
        assert_eq!(location.name(), "alice");
        assert_eq!(location.shape(), SecretShape::StaticRole);
        assert_eq!(location.version(), None);
    }

    #[test]
    fn test_dynamic_role() {
        let location = strategy().parse("database/creds/bob").unwrap().unwrap();
        assert_eq!(location.name(), "bob");
        assert_eq!(location.shape(), SecretShape::DynamicRole);
    }

    #[test]
    fn test_unknown_suffix_is_structural_error() {
        let err = strategy().parse("database/unknown/charlie").unwrap_err();
        assert!(matches!(err, ResolverError::InvalidAddress { .. }));
    }

    #[test]
    fn test_malformed_role_addresses() {
        for address in [
            "database",
            "database/static-creds/",
            "database/creds/",
            "database/static-creds/a/creds/b",
            "database/creds/a/creds/b",
            "database/nested/creds/bob",
            "database/creds/team/bob",
            "database/creds/bob?version=1",
        ] {
            let result = strategy().parse(address);
            assert!(
                matches!(result, Err(ResolverError::InvalidAddress { .. })),
                "expected structural error for {}",
                address
            );
        }
    }

    #[test]
    fn test_other_mounts_do_not_match() {
        assert!(strategy().parse("secret/creds/bob").unwrap().is_none());
        assert!(strategy().parse("databases/creds/bob").unwrap().is_none());
    }

    #[test]
    fn test_nested_mount() {
        let strategy = RoleAddressStrategy::new("teams/payments/db");
        let location = strategy.parse("teams/payments/db/static-creds/ledger").unwrap().unwrap();
        assert_eq!(location.mount(), "teams/payments/db");
        assert_eq!(location.name(), "ledger");
    }
}
