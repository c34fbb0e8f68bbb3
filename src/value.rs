//! Typed secret values and payload decoding.
//!
//! Fetch operations return raw bytes. The cache decodes them into a
//! [`ConfigValue`] of the requested [`ValueType`]: plain strings are UTF-8
//! passthrough, scalars are parsed from their textual form and arrays are
//! decoded from JSON.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use std::fmt;

/// The type a caller asks a secret to be decoded into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    String,
    Int,
    Double,
    Bool,
    Bytes,
    StringArray,
    IntArray,
    DoubleArray,
    BoolArray,
    BytesArray,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Int => "int",
            ValueType::Double => "double",
            ValueType::Bool => "bool",
            ValueType::Bytes => "bytes",
            ValueType::StringArray => "string_array",
            ValueType::IntArray => "int_array",
            ValueType::DoubleArray => "double_array",
            ValueType::BoolArray => "bool_array",
            ValueType::BytesArray => "bytes_array",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded secret value.
///
/// `Debug` never prints the contents; every value produced by the resolver is secret.
#[derive(Clone, PartialEq)]
pub enum ConfigValue {
    String(String),
    Int(i64),
    Double(f64),
    Bool(bool),
    Bytes(Vec<u8>),
    StringArray(Vec<String>),
    IntArray(Vec<i64>),
    DoubleArray(Vec<f64>),
    BoolArray(Vec<bool>),
    BytesArray(Vec<Vec<u8>>),
}

impl ConfigValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            ConfigValue::String(_) => ValueType::String,
            ConfigValue::Int(_) => ValueType::Int,
            ConfigValue::Double(_) => ValueType::Double,
            ConfigValue::Bool(_) => ValueType::Bool,
            ConfigValue::Bytes(_) => ValueType::Bytes,
            ConfigValue::StringArray(_) => ValueType::StringArray,
            ConfigValue::IntArray(_) => ValueType::IntArray,
            ConfigValue::DoubleArray(_) => ValueType::DoubleArray,
            ConfigValue::BoolArray(_) => ValueType::BoolArray,
            ConfigValue::BytesArray(_) => ValueType::BytesArray,
        }
    }

    /// Decode a raw payload as `value_type`.
    ///
    /// The error is a human readable reason; callers attach the key.
    pub fn decode(payload: &[u8], value_type: ValueType) -> Result<Self, String> {
        match value_type {
            ValueType::String => utf8(payload).map(|s| ConfigValue::String(s.to_string())),
            ValueType::Bytes => Ok(ConfigValue::Bytes(payload.to_vec())),
            ValueType::Int => {
                let text = utf8(payload)?.trim();
                text.parse::<i64>()
                    .map(ConfigValue::Int)
                    .map_err(|e| format!("'{}' is not an integer: {}", text, e))
            }
            ValueType::Double => {
                let text = utf8(payload)?.trim();
                text.parse::<f64>()
                    .map(ConfigValue::Double)
                    .map_err(|e| format!("'{}' is not a number: {}", text, e))
            }
            ValueType::Bool => match utf8(payload)?.trim() {
                "true" => Ok(ConfigValue::Bool(true)),
                "false" => Ok(ConfigValue::Bool(false)),
                other => Err(format!("'{}' is not a boolean", other)),
            },
            ValueType::StringArray => json_array(payload).map(ConfigValue::StringArray),
            ValueType::IntArray => json_array(payload).map(ConfigValue::IntArray),
            ValueType::DoubleArray => json_array(payload).map(ConfigValue::DoubleArray),
            ValueType::BoolArray => json_array(payload).map(ConfigValue::BoolArray),
            ValueType::BytesArray => {
                let encoded: Vec<String> = json_array(payload)?;
                encoded
                    .iter()
                    .enumerate()
                    .map(|(index, item)| {
                        STANDARD
                            .decode(item)
                            .map_err(|e| format!("element {} is not valid base64: {}", index, e))
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(ConfigValue::BytesArray)
            }
        }
    }
}

fn utf8(payload: &[u8]) -> Result<&str, String> {
    std::str::from_utf8(payload).map_err(|e| format!("payload is not valid UTF-8: {}", e))
}

fn json_array<T: DeserializeOwned>(payload: &[u8]) -> Result<Vec<T>, String> {
    serde_json::from_slice(payload).map_err(|e| format!("payload is not the expected JSON array: {}", e))
}

impl fmt::Debug for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConfigValue::{}([REDACTED])", self.value_type())
    }
}

/// Rust types a secret can be resolved into directly
pub trait TypedValue: Sized {
    /// The value type requested from the cache
    const VALUE_TYPE: ValueType;

    /// Unwrap a decoded value; `None` when the variant does not match
    fn from_value(value: ConfigValue) -> Option<Self>;
}

macro_rules! typed_value {
    ($ty:ty, $variant:ident) => {
        impl TypedValue for $ty {
            const VALUE_TYPE: ValueType = ValueType::$variant;

            fn from_value(value: ConfigValue) -> Option<Self> {
                match value {
                    ConfigValue::$variant(inner) => Some(inner),
                    _ => None,
                }
            }
        }
    };
}

typed_value!(String, String);
typed_value!(i64, Int);
typed_value!(f64, Double);
typed_value!(bool, Bool);
typed_value!(Vec<u8>, Bytes);
typed_value!(Vec<String>, StringArray);
typed_value!(Vec<i64>, IntArray);
typed_value!(Vec<f64>, DoubleArray);
typed_value!(Vec<bool>, BoolArray);
typed_value!(Vec<Vec<u8>>, BytesArray);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_is_utf8_passthrough() {
        let value = ConfigValue::decode(b" s3cr3t \n", ValueType::String).unwrap();
        assert_eq!(value, ConfigValue::String(" s3cr3t \n".to_string()));

        let err = ConfigValue::decode(&[0xff, 0xfe], ValueType::String).unwrap_err();
        assert!(err.contains("UTF-8"));
    }

    #[test]
    fn test_scalar_decoding() {
        assert_eq!(ConfigValue::decode(b"5432", ValueType::Int).unwrap(), ConfigValue::Int(5432));
        assert_eq!(ConfigValue::decode(b" -7\n", ValueType::Int).unwrap(), ConfigValue::Int(-7));
        assert_eq!(ConfigValue::decode(b"0.25", ValueType::Double).unwrap(), ConfigValue::Double(0.25));
        assert_eq!(ConfigValue::decode(b"true", ValueType::Bool).unwrap(), ConfigValue::Bool(true));
        assert_eq!(ConfigValue::decode(b"false", ValueType::Bool).unwrap(), ConfigValue::Bool(false));
    }

    #[test]
    fn test_scalar_decode_failures() {
        assert!(ConfigValue::decode(b"not-a-number", ValueType::Int).is_err());
        assert!(ConfigValue::decode(b"1.5", ValueType::Int).is_err());
        assert!(ConfigValue::decode(b"yes", ValueType::Bool).is_err());
        assert!(ConfigValue::decode(b"", ValueType::Double).is_err());
    }

    #[test]
    fn test_array_decoding() {
        assert_eq!(
            ConfigValue::decode(br#"["a","b"]"#, ValueType::StringArray).unwrap(),
            ConfigValue::StringArray(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(
            ConfigValue::decode(b"[1, 2, 3]", ValueType::IntArray).unwrap(),
            ConfigValue::IntArray(vec![1, 2, 3])
        );
        assert_eq!(
            ConfigValue::decode(b"[true, false]", ValueType::BoolArray).unwrap(),
            ConfigValue::BoolArray(vec![true, false])
        );
        assert!(ConfigValue::decode(br#"["a", 1]"#, ValueType::StringArray).is_err());
        assert!(ConfigValue::decode(b"{}", ValueType::DoubleArray).is_err());
    }

    #[test]
    fn test_bytes_array_decodes_base64_elements() {
        let value = ConfigValue::decode(br#"["aGVsbG8=", ""]"#, ValueType::BytesArray).unwrap();
        assert_eq!(value, ConfigValue::BytesArray(vec![b"hello".to_vec(), Vec::new()]));

        let err = ConfigValue::decode(br#"["***"]"#, ValueType::BytesArray).unwrap_err();
        assert!(err.contains("element 0"));
    }

    #[test]
    fn test_debug_redacts_contents() {
        let value = ConfigValue::String("hunter2".to_string());
        let debug = format!("{:?}", value);
        assert_eq!(debug, "ConfigValue::string([REDACTED])");
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_typed_value_unwraps_matching_variant() {
        assert_eq!(<i64 as TypedValue>::VALUE_TYPE, ValueType::Int);
        assert_eq!(i64::from_value(ConfigValue::Int(3)), Some(3));
        assert_eq!(i64::from_value(ConfigValue::String("3".to_string())), None);
        assert_eq!(
            Vec::<String>::from_value(ConfigValue::StringArray(vec!["x".to_string()])),
            Some(vec!["x".to_string()])
        );
    }
}
