//! Scope configuration as a TOML document.
//!
//! The document form carries the same directives as [`ScopeBuilder`], but
//! grouped per processor instead of positionally:
//!
//! ```toml
//! format = "csv"
//! default_field_cleaner = { kind = "regex", target = "s/^\\s+//" }
//!
//! [[field_cleaners]]
//! kind = "regex"
//! target = "s/[0-9]+/N/g"
//! source = "header"
//! fields = ["User-Agent"]
//!
//! [[classifiers]]
//! kind = "ip"
//! target = "127.0.0.1:9000"
//! features = [{ source = "header", fields = ["User-Agent"] }]
//! responses = [{ class = "bot", kind = "header", action = "X-Bot=1" }]
//!
//! [[responses]]
//! class = "bot"
//! kind = "http"
//! action = "403"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::backend::BackendOptions;
use crate::error::ConfigError;
use crate::scope::{Scope, ScopeBuilder};

fn default_true() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    5000
}

/// A backend reference: kind keyword and target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendRef {
    /// `regex`, `proc`, `ip` or `sock` (and aliases)
    pub kind: String,
    /// Pattern, program, `host:port` or socket path
    pub target: String,
}

/// Fields from one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldGroup {
    /// Field source keyword
    pub source: String,
    /// `key` or `name=key` entries
    pub fields: Vec<String>,
}

/// A cleaner applied to specific fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldCleanerConfig {
    /// Backend kind keyword
    pub kind: String,
    /// Backend target
    pub target: String,
    /// Field source keyword
    pub source: String,
    /// Fields the cleaner applies to
    pub fields: Vec<String>,
}

/// A class response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseConfig {
    /// Class string the response is bound to
    pub class: String,
    /// Response kind keyword
    pub kind: String,
    /// Action; `target [template]` for forwarding kinds
    pub action: String,
    /// Features sent by a forwarding response
    #[serde(default)]
    pub features: Vec<FieldGroup>,
    /// Labels sent by a forwarding response
    #[serde(default)]
    pub labels: Vec<FieldGroup>,
    /// Output format for a forwarding response
    #[serde(default)]
    pub format: Option<String>,
}

/// A preprocessor or classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Backend kind keyword
    pub kind: String,
    /// Backend target
    pub target: String,
    /// Features sent to the processor
    #[serde(default)]
    pub features: Vec<FieldGroup>,
    /// Labels sent ahead of the features
    #[serde(default)]
    pub labels: Vec<FieldGroup>,
    /// Output format overriding the scope's
    #[serde(default)]
    pub format: Option<String>,
    /// Classifier-only response table; overrides the scope's when present.
    ///
    /// Rejected with a diagnostic on a preprocessor, whose replies are
    /// never classes.
    #[serde(default)]
    pub responses: Vec<ResponseConfig>,
}

/// A whole scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeConfig {
    /// Run anything at all
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Scope output format keyword
    #[serde(default)]
    pub format: Option<String>,
    /// Socket connect/read/write timeout
    #[serde(default = "default_timeout_ms")]
    pub io_timeout_ms: u64,
    /// Subprocess exchange lock wait
    #[serde(default = "default_timeout_ms")]
    pub lock_timeout_ms: u64,
    /// Cleaner for fields without their own
    #[serde(default)]
    pub default_field_cleaner: Option<BackendRef>,
    /// Cleaner for finished feature strings
    #[serde(default)]
    pub output_cleaner: Option<BackendRef>,
    /// Per-field cleaners, chained in order
    #[serde(default)]
    pub field_cleaners: Vec<FieldCleanerConfig>,
    /// Preprocessors in order
    #[serde(default)]
    pub preprocessors: Vec<ProcessorConfig>,
    /// Classifiers in order
    #[serde(default)]
    pub classifiers: Vec<ProcessorConfig>,
    /// Scope-level class responses
    #[serde(default)]
    pub responses: Vec<ResponseConfig>,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: None,
            io_timeout_ms: default_timeout_ms(),
            lock_timeout_ms: default_timeout_ms(),
            default_field_cleaner: None,
            output_cleaner: None,
            field_cleaners: Vec::new(),
            preprocessors: Vec::new(),
            classifiers: Vec::new(),
            responses: Vec::new(),
        }
    }
}

impl ScopeConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Reads and parses a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&contents)?;
        tracing::info!(path = %path.display(), "loaded scope configuration");
        Ok(config)
    }

    /// Returns the backend timeouts this document asks for.
    pub fn backend_options(&self) -> BackendOptions {
        BackendOptions {
            io_timeout: std::time::Duration::from_millis(self.io_timeout_ms),
            lock_timeout: std::time::Duration::from_millis(self.lock_timeout_ms),
        }
    }

    /// Resolves the document into a scope.
    ///
    /// Problems in individual entries end up in [`Scope::diagnostics`].
    pub fn resolve(&self) -> Scope {
        self.apply(ScopeBuilder::with_options(self.backend_options()))
            .build()
    }

    /// Feeds the document into an existing builder.
    pub fn apply(&self, builder: ScopeBuilder) -> ScopeBuilder {
        let mut builder = builder.enabled(self.enabled);
        if let Some(format) = &self.format {
            builder = builder.output_format(format);
        }
        if let Some(cleaner) = &self.default_field_cleaner {
            builder = builder.default_field_cleaner(&cleaner.kind, &cleaner.target);
        }
        if let Some(cleaner) = &self.output_cleaner {
            builder = builder.output_cleaner(&cleaner.kind, &cleaner.target);
        }
        for cleaner in &self.field_cleaners {
            builder = builder.field_cleaner(&cleaner.kind, &cleaner.target, &cleaner.source, &cleaner.fields);
        }

        for processor in &self.preprocessors {
            if !processor.responses.is_empty() {
                builder = builder.problem(ConfigError::ResponsesOnPreprocessor(processor.target.clone()));
            }
            builder = with_fields(builder, &processor.features, &processor.labels, processor.format.as_deref())
                .preprocessor(&processor.kind, &processor.target);
        }
        for processor in &self.classifiers {
            for response in &processor.responses {
                builder = add_response(builder, response);
            }
            builder = with_fields(builder, &processor.features, &processor.labels, processor.format.as_deref())
                .classifier(&processor.kind, &processor.target);
        }
        for response in &self.responses {
            builder = add_response(builder, response);
        }
        builder
    }
}

fn with_fields(
    builder: ScopeBuilder,
    features: &[FieldGroup],
    labels: &[FieldGroup],
    format: Option<&str>,
) -> ScopeBuilder {
    let mut builder = builder.clear_fields();
    for group in features {
        builder = builder.features(&group.source, &group.fields);
    }
    for group in labels {
        builder = builder.labels(&group.source, &group.fields);
    }
    if let Some(format) = format {
        builder = builder.processor_format(format);
    }
    builder
}

fn add_response(builder: ScopeBuilder, response: &ResponseConfig) -> ScopeBuilder {
    let forwards = response
        .kind
        .parse::<crate::response::ResponseKind>()
        .is_ok_and(|kind| kind.backend_kind().is_some());
    let builder = if forwards {
        with_fields(builder, &response.features, &response.labels, response.format.as_deref())
    } else {
        builder
    };
    builder.class_response(&response.class, &response.kind, &response.action)
}
