//! Key/value secret addresses: `<mount>/<key>[?version=N]`

use super::{invalid, normalize_path, split_query, strip_mount, AddressStrategy, SecretLocation};
use crate::errors::Result;

const VERSION_PARAM: &str = "version";

/// Parses addresses of versioned key/value secrets below one mount
#[derive(Debug, Clone)]
pub struct KvAddressStrategy {
    mount: String,
}

impl KvAddressStrategy {
    pub fn new(mount: impl AsRef<str>) -> Self {
        Self { mount: normalize_path(mount.as_ref()) }
    }

    pub fn mount(&self) -> &str {
        &self.mount
    }
}

impl AddressStrategy for KvAddressStrategy {
    fn parse(&self, address: &str) -> Result<Option<SecretLocation>> {
        let (path, query) = split_query(address);
        let Some(rest) = strip_mount(path, &self.mount) else {
            return Ok(None);
        };

        let key = rest.trim_matches('/');
        if key.is_empty() {
            return Err(invalid(address, format!("empty key after mount '{}'", self.mount)));
        }

        let version = match query {
            Some(query) => Some(parse_version(address, query)?),
            None => None,
        };

        Ok(Some(SecretLocation::kv(&self.mount, key, version)))
    }

    fn name(&self) -> &'static str {
        "kv"
    }
}

fn parse_version(address: &str, query: &str) -> Result<u64> {
    let Some((name, value)) = query.split_once('=') else {
        return Err(invalid(address, format!("malformed query '{}'", query)));
    };
    if name != VERSION_PARAM {
        return Err(invalid(address, format!("unsupported query parameter '{}'", name)));
    }
    value
        .parse::<u64>()
        .map_err(|_| invalid(address, format!("version '{}' is not a non-negative integer", value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::SecretShape;
    use crate::errors::ResolverError;

    #[test]
    fn test_parses_versioned_address() {
        let strategy = KvAddressStrategy::new("secret");
        let location = strategy.parse("secret/app/api_key?version=2").unwrap().unwrap();

        assert_eq!(location.mount(), "secret");
        assert_eq!(location.name(), "app/api_key");
        assert_eq!(location.shape(), SecretShape::Kv);
        assert_eq!(location.version(), Some(2));
    }

    #[test]
    fn test_parses_latest_version() {
        let strategy = KvAddressStrategy::new("/secret/");
        let location = strategy.parse("/secret/app/").unwrap().unwrap();
        assert_eq!(location.name(), "app");
        assert_eq!(location.version(), None);
    }

    #[test]
    fn test_other_mounts_do_not_match() {
        let strategy = KvAddressStrategy::new("secret");
        assert!(strategy.parse("kv/app").unwrap().is_none());
        assert!(strategy.parse("secrets/app").unwrap().is_none());
    }

    #[test]
    fn test_empty_key_is_structural_error() {
        let strategy = KvAddressStrategy::new("secret");
        for address in ["secret", "secret/", "secret?version=2", "secret//"] {
            let err = strategy.parse(address).unwrap_err();
            assert!(matches!(err, ResolverError::InvalidAddress { .. }), "{}", address);
        }
    }

    #[test]
    fn test_bad_queries_are_structural_errors() {
        let strategy = KvAddressStrategy::new("secret");
        for address in ["secret/app?version=", "secret/app?version=two", "secret/app?v=2", "secret/app?version"] {
            assert!(strategy.parse(address).is_err(), "{}", address);
        }
    }
}
