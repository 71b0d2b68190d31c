//! Features and the places their values come from.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Display name used for authentication-nonce features without an explicit name.
pub const AUTH_FEATURE_NAME: &str = "auth";

/// Where a feature's value is looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldSource {
    /// Query-string or form-body parameter
    Param,
    /// Inbound request header
    Header,
    /// Transaction environment, then the process environment
    Env,
    /// Cookie from the inbound `Cookie` header
    Cookie,
    /// Component of the parsed request URI
    Uri,
    /// Request timestamp rendered with a preset or strftime format
    Time,
    /// The key itself, verbatim
    Literal,
    /// Request metadata such as method or protocol
    Request,
    /// A fresh anti-replay nonce derived from the key
    Auth,
}

impl FieldSource {
    /// Returns the canonical configuration keyword.
    pub fn keyword(self) -> &'static str {
        match self {
            FieldSource::Param => "cgi",
            FieldSource::Header => "header",
            FieldSource::Env => "env",
            FieldSource::Cookie => "cookie",
            FieldSource::Uri => "uri",
            FieldSource::Time => "time",
            FieldSource::Literal => "literal",
            FieldSource::Request => "request",
            FieldSource::Auth => "auth",
        }
    }
}

impl fmt::Display for FieldSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl FromStr for FieldSource {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cgi" => Ok(FieldSource::Param),
            "header" => Ok(FieldSource::Header),
            "env" => Ok(FieldSource::Env),
            "cookie" => Ok(FieldSource::Cookie),
            "uri" | "url" => Ok(FieldSource::Uri),
            "time" => Ok(FieldSource::Time),
            "literal" => Ok(FieldSource::Literal),
            "request" => Ok(FieldSource::Request),
            "auth" => Ok(FieldSource::Auth),
            _ => Err(ConfigError::UnknownFieldSource(s.to_string())),
        }
    }
}

/// Identity of a field for cleaner lookup: its source and lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldKey {
    /// Where the value comes from
    pub source: FieldSource,
    /// What to look up
    pub key: String,
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.key)
    }
}

/// One data point to extract and transmit.
///
/// A feature declaration is written either as `key` or as `name=key`; only the
/// first `=` splits, so `when=%Y-%m-%d` names a time format.
///
/// # Examples
///
/// ```
/// use classify_relay::field::{Feature, FieldSource};
///
/// let ua = Feature::new(FieldSource::Header, "agent=User-Agent");
/// assert_eq!(ua.name(), "agent");
/// assert_eq!(ua.key(), "User-Agent");
///
/// let host = Feature::new(FieldSource::Header, "Host");
/// assert_eq!(host.name(), "Host");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feature {
    source: FieldSource,
    name: String,
    key: String,
}

impl Feature {
    /// Creates a feature from a `key` or `name=key` declaration.
    pub fn new(source: FieldSource, decl: &str) -> Self {
        let (name, key) = match decl.split_once('=') {
            Some((name, key)) => (name.to_string(), key.to_string()),
            None if source == FieldSource::Auth => (AUTH_FEATURE_NAME.to_string(), decl.to_string()),
            None => (decl.to_string(), decl.to_string()),
        };
        Self { source, name, key }
    }

    /// Returns where the value comes from.
    pub fn source(&self) -> FieldSource {
        self.source
    }

    /// Returns the name shown in keyed output formats.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the lookup key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the identity used to find this feature's cleaners.
    pub fn field_key(&self) -> FieldKey {
        FieldKey {
            source: self.source,
            key: self.key.clone(),
        }
    }
}

/// A feature's values for one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureValue {
    /// Display name of the feature
    pub name: String,
    /// Value as extracted, `None` when the source had nothing
    pub raw: Option<String>,
    /// Value after cleaning, `None` when there was no raw value
    pub clean: Option<String>,
}

impl FeatureValue {
    /// Creates a value whose raw and clean forms are identical.
    pub fn new(name: impl Into<String>, value: Option<String>) -> Self {
        Self {
            name: name.into(),
            raw: value.clone(),
            clean: value,
        }
    }
}
