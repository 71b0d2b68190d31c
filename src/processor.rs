//! Processors: a backend plus everything bound to it at resolution time.

use std::fmt;
use std::sync::Arc;

use crate::backend::{Backend, BackendKey};
use crate::field::Feature;
use crate::format::OutputFormat;
use crate::logging::TxLog;
use crate::response::ResponseTable;

/// What a processor is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Transforms one field value
    Cleaner,
    /// Receives a feature string, reply ignored
    Preprocessor,
    /// Receives a feature string, reply is a class
    Classifier,
    /// Receives an interpolated feature string from a class response
    Forward,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Cleaner => write!(f, "cleaner"),
            Role::Preprocessor => write!(f, "preprocessor"),
            Role::Classifier => write!(f, "classifier"),
            Role::Forward => write!(f, "class response"),
        }
    }
}

/// A named transformation or sink.
///
/// A processor whose backend failed to open keeps `backend: None` and acts
/// as a no-op: [`transform`](Self::transform) passes values through and
/// [`exchange`](Self::exchange) returns `None`.
#[derive(Debug)]
pub struct Processor {
    role: Role,
    key: BackendKey,
    backend: Option<Arc<Backend>>,
    features: Vec<Feature>,
    labels: Vec<Feature>,
    format: OutputFormat,
    default_cleaner: Option<Arc<Processor>>,
    output_cleaner: Option<Arc<Processor>>,
    responses: ResponseTable,
}

impl Processor {
    pub(crate) fn new(role: Role, key: BackendKey, backend: Option<Arc<Backend>>) -> Self {
        Self {
            role,
            key,
            backend,
            features: Vec::new(),
            labels: Vec::new(),
            format: OutputFormat::default(),
            default_cleaner: None,
            output_cleaner: None,
            responses: ResponseTable::new(),
        }
    }

    pub(crate) fn with_fields(mut self, features: Vec<Feature>, labels: Vec<Feature>) -> Self {
        self.features = features;
        self.labels = labels;
        self
    }

    pub(crate) fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub(crate) fn with_cleaners(
        mut self,
        default_cleaner: Option<Arc<Processor>>,
        output_cleaner: Option<Arc<Processor>>,
    ) -> Self {
        self.default_cleaner = default_cleaner;
        self.output_cleaner = output_cleaner;
        self
    }

    pub(crate) fn with_responses(mut self, responses: ResponseTable) -> Self {
        self.responses = responses;
        self
    }

    /// Returns the processor's role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns the backend identity this processor was declared with.
    pub fn key(&self) -> &BackendKey {
        &self.key
    }

    /// Returns the live backend, if it opened.
    pub fn backend(&self) -> Option<&Arc<Backend>> {
        self.backend.as_ref()
    }

    /// Returns the features sent to this processor.
    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    /// Returns the labels sent ahead of the features.
    pub fn labels(&self) -> &[Feature] {
        &self.labels
    }

    /// Returns the output format captured at declaration.
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Returns the default field cleaner captured at declaration.
    pub fn default_cleaner(&self) -> Option<&Arc<Processor>> {
        self.default_cleaner.as_ref()
    }

    /// Returns the output cleaner captured at declaration.
    pub fn output_cleaner(&self) -> Option<&Arc<Processor>> {
        self.output_cleaner.as_ref()
    }

    /// Returns the classifier's own class-response table.
    pub fn responses(&self) -> &ResponseTable {
        &self.responses
    }

    /// Runs `value` through the backend, falling back to `value` on failure.
    pub fn transform(&self, value: &str, log: &TxLog<'_>) -> String {
        self.exchange(value, log).unwrap_or_else(|| value.to_string())
    }

    /// Sends `payload` and returns the reply.
    ///
    /// Failures are logged here and come back as `None`.
    pub fn exchange(&self, payload: &str, log: &TxLog<'_>) -> Option<String> {
        let backend = self.backend.as_ref()?;
        match backend.send(payload) {
            Ok(reply) => Some(reply),
            Err(e) => {
                log.warn(format_args!("{} {}: {}", self.role, self.key, e));
                None
            }
        }
    }
}
