//! Hierarchical configuration keys.
//!
//! A [`ConfigKey`] is an ordered list of path components plus a context map of
//! scalar attributes (for example `version = 2`). Keys are encoded into a flat
//! dot-separated string for cache storage and logging. A literal `.` inside a
//! component is escaped as `\.` and `\` as `\\`, so distinct component lists
//! never share an encoding.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

const SEPARATOR: char = '.';
const ESCAPE: char = '\\';
/// Encoding of the key with no components
const EMPTY_KEY: &str = "\\";

/// Context attribute name carrying a KV secret version.
pub const VERSION_CONTEXT: &str = "version";

/// A scalar context attribute
#[derive(Debug, Clone)]
pub enum ContextValue {
    String(String),
    Int(i64),
    Double(f64),
    Bool(bool),
}

impl ContextValue {
    /// Integer view of the attribute, if it holds one
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }
}

// Doubles compare by bit pattern so context maps can key hash maps.
impl PartialEq for ContextValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Double(a), Self::Double(b)) => a.to_bits() == b.to_bits(),
            (Self::Bool(a), Self::Bool(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ContextValue {}

impl Hash for ContextValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::String(value) => value.hash(state),
            Self::Int(value) => value.hash(state),
            Self::Double(value) => value.to_bits().hash(state),
            Self::Bool(value) => value.hash(state),
        }
    }
}

impl fmt::Display for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(value) => f.write_str(value),
            Self::Int(value) => write!(f, "{}", value),
            Self::Double(value) => write!(f, "{}", value),
            Self::Bool(value) => write!(f, "{}", value),
        }
    }
}

impl From<&str> for ContextValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ContextValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for ContextValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for ContextValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for ContextValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for ContextValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<bool> for ContextValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Context attributes of a key, ordered by name
pub type Context = BTreeMap<String, ContextValue>;

/// A configuration key: path components plus context.
///
/// Two keys are equal iff both their components and their context match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ConfigKey {
    components: Vec<String>,
    context: Context,
}

impl ConfigKey {
    /// Create a key from its path components
    pub fn new<I, S>(components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { components: components.into_iter().map(Into::into).collect(), context: Context::new() }
    }

    /// Parse an encoded key back into its components.
    ///
    /// Inverse of [`ConfigKey::encode`]; the result carries no context.
    pub fn parse(encoded: &str) -> Self {
        if encoded == EMPTY_KEY {
            return Self::default();
        }

        let mut components = Vec::new();
        let mut current = String::new();
        let mut chars = encoded.chars();

        while let Some(c) = chars.next() {
            match c {
                ESCAPE => match chars.next() {
                    Some(escaped) => current.push(escaped),
                    None => current.push(ESCAPE),
                },
                SEPARATOR => components.push(std::mem::take(&mut current)),
                other => current.push(other),
            }
        }
        components.push(current);

        Self { components, context: Context::new() }
    }

    /// Add a context attribute, replacing any previous value under the same name
    pub fn with_context(mut self, name: impl Into<String>, value: impl Into<ContextValue>) -> Self {
        self.context.insert(name.into(), value.into());
        self
    }

    /// Shorthand for `with_context("version", version)`
    pub fn with_version(self, version: u32) -> Self {
        self.with_context(VERSION_CONTEXT, version)
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// The `version` context attribute, when it is a non-negative integer
    pub fn version(&self) -> Option<u64> {
        self.context
            .get(VERSION_CONTEXT)
            .and_then(ContextValue::as_int)
            .and_then(|v| u64::try_from(v).ok())
    }

    /// Flat, dot-separated encoding of the components.
    ///
    /// A key without components encodes as a lone escape character, which no
    /// escaped component sequence can produce.
    pub fn encode(&self) -> String {
        if self.components.is_empty() {
            return EMPTY_KEY.to_string();
        }

        let mut encoded = String::new();
        for (index, component) in self.components.iter().enumerate() {
            if index > 0 {
                encoded.push(SEPARATOR);
            }
            for c in component.chars() {
                if c == SEPARATOR || c == ESCAPE {
                    encoded.push(ESCAPE);
                }
                encoded.push(c);
            }
        }
        encoded
    }

    /// Canonical `name=value` rendering of the context, sorted by name
    pub fn encode_context(&self) -> String {
        render_context(&self.context)
    }
}

pub(crate) fn render_context(context: &Context) -> String {
    context.iter().map(|(name, value)| format!("{}={}", name, value)).collect::<Vec<_>>().join(",")
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())?;
        if !self.context.is_empty() {
            write!(f, "[{}]", self.encode_context())?;
        }
        Ok(())
    }
}
