use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::backend::{Backend, BackendKey, BackendKind, BackendOptions, BackendRegistry, ExchangeLock};
use crate::error::ConfigError;
use crate::field::{Feature, FieldKey, FieldSource};
use crate::format::OutputFormat;
use crate::processor::{Processor, Role};
use crate::response::{Response, ResponseKind, ResponseTable, DEFAULT_TEMPLATE};

/// Resolves configuration directives into a [`Scope`].
///
/// Directives are applied in the order they are called, with the same
/// positional rules as the directive set they mirror:
///
/// - `features` and `labels` accumulate until a preprocessor, classifier or
///   forwarding class response is declared, which binds them. The next
///   `features`/`labels` call after a binding starts fresh lists.
/// - `field_cleaner` also adds its fields to the pending features.
/// - Class responses declared before a classifier become that classifier's
///   own table. Those declared after the last classifier form the
///   scope-level table.
///
/// Problems never abort resolution. Each one is logged, recorded in
/// [`Scope::diagnostics`], and leaves a processor without a backend (or, for
/// an unknown keyword, skips the directive).
///
/// # Examples
///
/// ```
/// use classify_relay::ScopeBuilder;
///
/// let scope = ScopeBuilder::new()
///     .output_format("csv")
///     .features("header", ["User-Agent"])
///     .class_response("bot", "header", "X-Bot=1")
///     .classifier("ip", "127.0.0.1:9000")
///     .build();
///
/// assert!(scope.diagnostics().is_empty());
/// assert_eq!(scope.classifiers().len(), 1);
/// ```
#[derive(Debug)]
pub struct ScopeBuilder {
    enabled: bool,
    format: OutputFormat,
    next_format: Option<OutputFormat>,
    registry: BackendRegistry,
    default_cleaner: Option<Arc<Processor>>,
    output_cleaner: Option<Arc<Processor>>,
    field_cleaners: BTreeMap<FieldKey, Vec<Arc<Processor>>>,
    features: Vec<Feature>,
    labels: Vec<Feature>,
    fields_bound: bool,
    preprocessors: Vec<Arc<Processor>>,
    classifiers: Vec<Arc<Processor>>,
    responses: ResponseTable,
    diagnostics: Vec<ConfigError>,
}

impl Default for ScopeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeBuilder {
    /// Creates an enabled builder with default timeouts.
    pub fn new() -> Self {
        Self::with_options(BackendOptions::default())
    }

    /// Creates an enabled builder whose backends use `options`.
    pub fn with_options(options: BackendOptions) -> Self {
        Self {
            enabled: true,
            format: OutputFormat::default(),
            next_format: None,
            registry: BackendRegistry::new(options),
            default_cleaner: None,
            output_cleaner: None,
            field_cleaners: BTreeMap::new(),
            features: Vec::new(),
            labels: Vec::new(),
            fields_bound: false,
            preprocessors: Vec::new(),
            classifiers: Vec::new(),
            responses: ResponseTable::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Turns the whole scope on or off.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the scope's output format keyword.
    pub fn output_format(mut self, format: &str) -> Self {
        match format.parse() {
            Ok(format) => self.format = format,
            Err(e) => self.note(e),
        }
        self
    }

    /// Sets the output format of the next declared processor only.
    pub fn processor_format(mut self, format: &str) -> Self {
        match format.parse() {
            Ok(format) => self.next_format = Some(format),
            Err(e) => self.note(e),
        }
        self
    }

    /// Sets the cleaner applied to fields that have no cleaner of their own.
    ///
    /// Processors declared afterwards capture it.
    pub fn default_field_cleaner(mut self, kind: &str, target: &str) -> Self {
        if let Some(cleaner) = self.cleaner(kind, target) {
            self.default_cleaner = Some(cleaner);
        }
        self
    }

    /// Sets the cleaner applied to every finished feature string.
    ///
    /// Processors declared afterwards capture it.
    pub fn output_cleaner(mut self, kind: &str, target: &str) -> Self {
        if let Some(cleaner) = self.cleaner(kind, target) {
            self.output_cleaner = Some(cleaner);
        }
        self
    }

    /// Appends a cleaner to the chain of each listed field and adds the
    /// fields to the pending features (once, however many cleaners a field
    /// gets).
    pub fn field_cleaner<I, S>(mut self, kind: &str, target: &str, source: &str, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let Some(source) = self.source(source) else {
            return self;
        };
        let cleaner = self.cleaner(kind, target);
        self.reset_if_bound();
        for field in fields {
            let feature = Feature::new(source, field.as_ref());
            if let Some(cleaner) = &cleaner {
                self.field_cleaners
                    .entry(feature.field_key())
                    .or_default()
                    .push(Arc::clone(cleaner));
            }
            if !self.features.contains(&feature) {
                self.features.push(feature);
            }
        }
        self
    }

    /// Adds features to the pending list.
    pub fn features<I, S>(mut self, source: &str, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if let Some(source) = self.source(source) {
            self.reset_if_bound();
            self.features
                .extend(fields.into_iter().map(|f| Feature::new(source, f.as_ref())));
        }
        self
    }

    /// Adds labels to the pending list.
    pub fn labels<I, S>(mut self, source: &str, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if let Some(source) = self.source(source) {
            self.reset_if_bound();
            self.labels
                .extend(fields.into_iter().map(|f| Feature::new(source, f.as_ref())));
        }
        self
    }

    /// Declares a preprocessor bound to the pending features and labels.
    pub fn preprocessor(mut self, kind: &str, target: &str) -> Self {
        if let Some(processor) = self.bound_processor(Role::Preprocessor, kind, target) {
            self.preprocessors.push(Arc::new(processor));
        }
        self
    }

    /// Declares a classifier bound to the pending features, labels and
    /// class responses.
    ///
    /// The pending responses belong to this directive even when its kind is
    /// unknown; they are then dropped along with it.
    pub fn classifier(mut self, kind: &str, target: &str) -> Self {
        let processor = self.bound_processor(Role::Classifier, kind, target);
        let responses = std::mem::take(&mut self.responses);
        match processor {
            Some(processor) => self.classifiers.push(Arc::new(processor.with_responses(responses))),
            None if !responses.is_empty() => {
                tracing::debug!(kind, target, "dropping responses of unusable classifier");
            }
            None => {}
        }
        self
    }

    /// Declares a response to `class`.
    ///
    /// For the forwarding kinds (`ip`, `proc`, `sock`) the action is
    /// `target [template]`; the template defaults to `%f`.
    pub fn class_response(mut self, class: &str, kind: &str, action: &str) -> Self {
        let kind: ResponseKind = match kind.parse() {
            Ok(kind) => kind,
            Err(e) => {
                self.note(e);
                return self;
            }
        };
        let action = action.trim();
        if action.is_empty() {
            self.note(ConfigError::MissingAction(class.to_string()));
            return self;
        }

        let response = match kind.backend_kind() {
            Some(backend_kind) => {
                let (target, template) = match action.split_once(char::is_whitespace) {
                    Some((target, template)) => (target, template.trim()),
                    None => (action, ""),
                };
                let template = if template.is_empty() { DEFAULT_TEMPLATE } else { template };
                let processor = self.bound_processor(Role::Forward, backend_kind.keyword(), target);
                processor.map(|processor| Response::Forward {
                    processor: Arc::new(processor),
                    template: template.to_string(),
                })
            }
            None => Response::from_action(kind, action),
        };
        if let Some(response) = response {
            self.responses.push(class, response);
        }
        self
    }

    /// Registers a ready-made backend for `key`.
    ///
    /// Later directives naming the same kind and target use it instead of
    /// opening their own.
    pub fn install_backend(mut self, key: BackendKey, backend: Backend) -> Self {
        self.registry.insert(key, backend);
        self
    }

    /// Returns the exchange lock shared by this scope's subprocess backends.
    pub fn exchange_lock(&self) -> ExchangeLock {
        self.registry.exchange_lock().clone()
    }

    /// Returns the timeouts backends are opened with.
    pub fn options(&self) -> BackendOptions {
        *self.registry.options()
    }

    /// Records a problem found outside the directive methods.
    pub(crate) fn problem(mut self, error: ConfigError) -> Self {
        self.note(error);
        self
    }

    /// Drops pending features and labels so the next processor starts empty.
    pub(crate) fn clear_fields(mut self) -> Self {
        self.features.clear();
        self.labels.clear();
        self.fields_bound = false;
        self
    }

    /// Freezes the configuration.
    pub fn build(self) -> Scope {
        Scope {
            enabled: self.enabled,
            format: self.format,
            default_cleaner: self.default_cleaner,
            output_cleaner: self.output_cleaner,
            field_cleaners: self.field_cleaners,
            preprocessors: self.preprocessors,
            classifiers: self.classifiers,
            responses: self.responses,
            backends: self.registry,
            diagnostics: self.diagnostics,
        }
    }

    fn note(&mut self, error: ConfigError) {
        tracing::warn!(error = %error, "configuration problem");
        self.diagnostics.push(error);
    }

    fn source(&mut self, source: &str) -> Option<FieldSource> {
        match source.parse() {
            Ok(source) => Some(source),
            Err(e) => {
                self.note(e);
                None
            }
        }
    }

    fn reset_if_bound(&mut self) {
        if self.fields_bound {
            self.features.clear();
            self.labels.clear();
            self.fields_bound = false;
        }
    }

    /// Opens the backend for a processor; `None` only for an unknown kind.
    fn open(&mut self, role: Role, kind: &str, target: &str) -> Option<(BackendKey, Option<Arc<Backend>>)> {
        let kind: BackendKind = match kind.parse() {
            Ok(kind) => kind,
            Err(e) => {
                self.note(e);
                return None;
            }
        };
        let key = BackendKey::new(kind, target.trim());

        if kind == BackendKind::Pattern && matches!(role, Role::Preprocessor | Role::Classifier) {
            self.note(ConfigError::NotAllowed {
                kind: kind.to_string(),
                role: role.to_string(),
            });
            return Some((key, None));
        }
        match self.registry.get_or_open(key.clone()) {
            Ok(backend) => Some((key, Some(backend))),
            Err(e) => {
                self.note(e);
                Some((key, None))
            }
        }
    }

    fn cleaner(&mut self, kind: &str, target: &str) -> Option<Arc<Processor>> {
        let (key, backend) = self.open(Role::Cleaner, kind, target)?;
        Some(Arc::new(Processor::new(Role::Cleaner, key, backend)))
    }

    /// Binds the pending fields, format and cleaners to a new processor.
    ///
    /// The directive consumes them even when its kind is unknown.
    fn bound_processor(&mut self, role: Role, kind: &str, target: &str) -> Option<Processor> {
        let opened = self.open(role, kind, target);
        self.fields_bound = true;
        let format = self.next_format.take().unwrap_or(self.format);
        let (key, backend) = opened?;
        Some(
            Processor::new(role, key, backend)
                .with_fields(self.features.clone(), self.labels.clone())
                .with_format(format)
                .with_cleaners(self.default_cleaner.clone(), self.output_cleaner.clone()),
        )
    }
}

/// A fully resolved configuration scope.
///
/// Immutable once built and safe to share across request threads behind an
/// `Arc`.
#[derive(Debug)]
pub struct Scope {
    enabled: bool,
    format: OutputFormat,
    default_cleaner: Option<Arc<Processor>>,
    output_cleaner: Option<Arc<Processor>>,
    field_cleaners: BTreeMap<FieldKey, Vec<Arc<Processor>>>,
    preprocessors: Vec<Arc<Processor>>,
    classifiers: Vec<Arc<Processor>>,
    responses: ResponseTable,
    backends: BackendRegistry,
    diagnostics: Vec<ConfigError>,
}

impl Scope {
    /// Returns a builder.
    pub fn builder() -> ScopeBuilder {
        ScopeBuilder::new()
    }

    /// Returns false if the scope should do nothing.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the scope's output format.
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Returns the scope-wide default field cleaner.
    pub fn default_cleaner(&self) -> Option<&Arc<Processor>> {
        self.default_cleaner.as_ref()
    }

    /// Returns the scope-wide output cleaner.
    pub fn output_cleaner(&self) -> Option<&Arc<Processor>> {
        self.output_cleaner.as_ref()
    }

    /// Returns the cleaner chain for a field, if it has one.
    pub fn field_cleaners(&self, key: &FieldKey) -> Option<&[Arc<Processor>]> {
        self.field_cleaners.get(key).map(Vec::as_slice)
    }

    /// Returns the preprocessors in declaration order.
    pub fn preprocessors(&self) -> &[Arc<Processor>] {
        &self.preprocessors
    }

    /// Returns the classifiers in declaration order.
    pub fn classifiers(&self) -> &[Arc<Processor>] {
        &self.classifiers
    }

    /// Returns the scope-level class-response table.
    pub fn responses(&self) -> &ResponseTable {
        &self.responses
    }

    /// Returns the number of distinct backends opened for this scope.
    pub fn backend_count(&self) -> usize {
        self.backends.len()
    }

    /// Returns every problem found while resolving the scope.
    pub fn diagnostics(&self) -> &[ConfigError] {
        &self.diagnostics
    }

    /// Renders a human-readable dump of the configuration.
    pub fn describe(&self) -> String {
        Description(self).to_string()
    }
}

struct Description<'a>(&'a Scope);

impl Description<'_> {
    fn processor(&self, f: &mut fmt::Formatter<'_>, indent: &str, processor: &Processor) -> fmt::Result {
        write!(f, "{}{} {} [{}]", indent, processor.role(), processor.key(), processor.format())?;
        if processor.backend().is_none() {
            write!(f, " (inactive)")?;
        }
        writeln!(f)?;
        for (kind, fields) in [("label", processor.labels()), ("feature", processor.features())] {
            for field in fields {
                write!(f, "{}  {} {}", indent, kind, field.field_key())?;
                if field.name() != field.key() {
                    write!(f, " as {}", field.name())?;
                }
                if let Some(chain) = self.0.field_cleaners(&field.field_key()) {
                    let names: Vec<String> = chain.iter().map(|c| c.key().to_string()).collect();
                    write!(f, " cleaned by {}", names.join(", "))?;
                }
                writeln!(f)?;
            }
        }
        self.responses(f, &format!("{}  ", indent), processor.responses())
    }

    fn responses(&self, f: &mut fmt::Formatter<'_>, indent: &str, table: &ResponseTable) -> fmt::Result {
        for (class, responses) in table.iter() {
            for response in responses {
                writeln!(f, "{}on '{}': {}", indent, class, response)?;
                if let Response::Forward { processor, .. } = response {
                    self.processor(f, &format!("{}  ", indent), processor)?;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Description<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scope = self.0;
        writeln!(f, "enabled: {}", if scope.enabled { "yes" } else { "no" })?;
        writeln!(f, "output format: {}", scope.format)?;
        if let Some(cleaner) = &scope.default_cleaner {
            writeln!(f, "default field cleaner: {}", cleaner.key())?;
        }
        if let Some(cleaner) = &scope.output_cleaner {
            writeln!(f, "output cleaner: {}", cleaner.key())?;
        }
        for processor in scope.preprocessors.iter().chain(&scope.classifiers) {
            self.processor(f, "", processor)?;
        }
        if !scope.responses.is_empty() {
            writeln!(f, "scope responses:")?;
            self.responses(f, "  ", &scope.responses)?;
        }
        for problem in &scope.diagnostics {
            writeln!(f, "problem: {}", problem)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{Method, Transaction};

    #[test]
    fn scope_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Scope>();
    }

    #[test]
    fn features_bind_to_next_processor_then_reset() {
        let scope = ScopeBuilder::new()
            .features("header", ["User-Agent"])
            .labels("literal", ["v1"])
            .classifier("ip", "127.0.0.1:9001")
            .classifier("ip", "127.0.0.1:9002")
            .features("cookie", ["sid"])
            .classifier("ip", "127.0.0.1:9003")
            .build();

        let classifiers = scope.classifiers();
        assert_eq!(classifiers[0].features().len(), 1);
        assert_eq!(classifiers[0].labels().len(), 1);
        // No new declaration in between: the second shares the same lists.
        assert_eq!(classifiers[1].features(), classifiers[0].features());
        assert_eq!(classifiers[2].features().len(), 1);
        assert_eq!(classifiers[2].features()[0].source(), FieldSource::Cookie);
        assert!(classifiers[2].labels().is_empty());
    }

    #[test]
    fn responses_before_classifier_are_its_own() {
        let scope = ScopeBuilder::new()
            .class_response("bot", "http", "403")
            .classifier("ip", "127.0.0.1:9001")
            .classifier("ip", "127.0.0.1:9002")
            .class_response("bot", "header", "X-Bot=1")
            .build();

        assert!(scope.classifiers()[0].responses().get("bot").is_some());
        assert!(scope.classifiers()[1].responses().is_empty());
        assert_eq!(scope.responses().get("bot").map(|r| r.len()), Some(1));
    }

    #[test]
    fn backends_are_shared_per_target() {
        let scope = ScopeBuilder::new()
            .field_cleaner("regex", "s/ //g", "header", ["A", "B"])
            .field_cleaner("regex", "s/ //g", "header", ["C"])
            .default_field_cleaner("regex", "s/x/y/")
            .build();

        assert_eq!(scope.backend_count(), 2);
        let a = scope.field_cleaners(&Feature::new(FieldSource::Header, "A").field_key()).unwrap();
        let c = scope.field_cleaners(&Feature::new(FieldSource::Header, "C").field_key()).unwrap();
        let (Some(a), Some(c)) = (a[0].backend(), c[0].backend()) else {
            panic!("cleaners should have backends");
        };
        assert!(Arc::ptr_eq(a, c));
    }

    #[test]
    fn field_cleaners_chain_in_order() {
        let scope = ScopeBuilder::new()
            .field_cleaner("regex", "s/a/b/", "cgi", ["q"])
            .field_cleaner("regex", "s/b/c/", "cgi", ["q"])
            .build();
        let chain = scope.field_cleaners(&Feature::new(FieldSource::Param, "q").field_key()).unwrap();
        let targets: Vec<&str> = chain.iter().map(|c| c.key().target.as_str()).collect();
        assert_eq!(targets, ["s/a/b/", "s/b/c/"]);
    }

    #[test]
    fn field_cleaner_adds_pending_features() {
        let scope = ScopeBuilder::new()
            .field_cleaner("regex", "s/x//", "header", ["ua=User-Agent"])
            .preprocessor("ip", "127.0.0.1:9000")
            .build();
        let features = scope.preprocessors()[0].features();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].name(), "ua");
    }

    #[test]
    fn problems_are_collected_not_fatal() {
        let scope = ScopeBuilder::new()
            .output_format("yaml")
            .features("body", ["x"])
            .preprocessor("carrier-pigeon", "coop")
            .classifier("ip", "localhost")
            .classifier("regex", "m/x/")
            .class_response("bot", "mail", "x")
            .class_response("bot", "header", "   ")
            .default_field_cleaner("regex", "s/(/x/")
            .build();

        let diagnostics = scope.diagnostics();
        assert_eq!(diagnostics.len(), 8);
        assert_eq!(
            &diagnostics[..7],
            &[
                ConfigError::UnknownOutputFormat("yaml".to_string()),
                ConfigError::UnknownFieldSource("body".to_string()),
                ConfigError::UnknownBackendKind("carrier-pigeon".to_string()),
                ConfigError::BadAddress("localhost".to_string()),
                ConfigError::NotAllowed {
                    kind: "regex".to_string(),
                    role: "classifier".to_string(),
                },
                ConfigError::UnknownResponseKind("mail".to_string()),
                ConfigError::MissingAction("bot".to_string()),
            ]
        );
        assert!(matches!(&diagnostics[7], ConfigError::BadPattern { pattern, .. } if pattern == "s/(/x/"));
        assert!(scope.preprocessors().is_empty());
        assert_eq!(scope.classifiers().len(), 2);
        assert!(scope.classifiers().iter().all(|c| c.backend().is_none()));
        assert!(scope.default_cleaner().unwrap().backend().is_none());
    }

    #[test]
    fn forward_response_parses_target_and_template() {
        let scope = ScopeBuilder::new()
            .features("literal", ["x"])
            .class_response("bot", "ip", "127.0.0.1:7000   class=%c %f")
            .class_response("bot", "ip", "127.0.0.1:7000")
            .build();

        let responses = scope.responses().get("bot").unwrap();
        match &responses[0] {
            Response::Forward { processor, template } => {
                assert_eq!(template, "class=%c %f");
                assert_eq!(processor.role(), Role::Forward);
                assert_eq!(processor.features().len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
        match &responses[1] {
            Response::Forward { template, .. } => assert_eq!(template, "%f"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(scope.backend_count(), 1);
    }

    #[test]
    fn processors_capture_cleaners_and_format() {
        let scope = ScopeBuilder::new()
            .default_field_cleaner("regex", "s/a/b/")
            .preprocessor("ip", "127.0.0.1:9000")
            .output_cleaner("regex", "s/c/d/")
            .processor_format("json")
            .classifier("ip", "127.0.0.1:9001")
            .classifier("ip", "127.0.0.1:9002")
            .build();

        let pre = &scope.preprocessors()[0];
        assert!(pre.default_cleaner().is_some());
        assert!(pre.output_cleaner().is_none());
        assert_eq!(pre.format(), OutputFormat::Raw);

        let first = &scope.classifiers()[0];
        assert!(first.output_cleaner().is_some());
        assert_eq!(first.format(), OutputFormat::JsonObject);
        assert_eq!(scope.classifiers()[1].format(), OutputFormat::Raw);
    }

    #[test]
    fn later_scope_settings_do_not_reach_earlier_processors() {
        let scope = ScopeBuilder::new()
            .features("literal", ["v"])
            .preprocessor("ip", "127.0.0.1:9000")
            .output_cleaner("regex", "s/^/cleaned:/")
            .default_field_cleaner("regex", "s/v/w/")
            .output_format("json")
            .features("literal", ["v"])
            .classifier("ip", "127.0.0.1:9001")
            .build();
        let tx = Transaction::new("r", Method::Get, "/");

        let pre = &scope.preprocessors()[0];
        assert_eq!(crate::pipeline::feature_string(&scope, &tx, pre), "v");

        let classifier = &scope.classifiers()[0];
        assert_eq!(
            crate::pipeline::feature_string(&scope, &tx, classifier),
            r#"cleaned:{"1":"w"}"#
        );
    }

    #[test]
    fn unknown_classifier_kind_keeps_its_responses() {
        let scope = ScopeBuilder::new()
            .features("literal", ["v"])
            .class_response("bot", "http", "403")
            .classifier("carrier-pigeon", "coop")
            .classifier("ip", "127.0.0.1:9002")
            .class_response("human", "http", "200")
            .build();

        assert_eq!(
            scope.diagnostics(),
            &[ConfigError::UnknownBackendKind("carrier-pigeon".to_string())]
        );
        assert_eq!(scope.classifiers().len(), 1);
        let survivor = &scope.classifiers()[0];
        assert!(survivor.responses().is_empty());
        assert!(scope.responses().get("bot").is_none());
        assert!(scope.responses().get("human").is_some());
    }

    #[test]
    fn unknown_preprocessor_kind_consumes_its_format() {
        let scope = ScopeBuilder::new()
            .processor_format("json")
            .features("literal", ["v"])
            .preprocessor("carrier-pigeon", "coop")
            .classifier("ip", "127.0.0.1:9002")
            .build();

        assert!(scope.preprocessors().is_empty());
        let classifier = &scope.classifiers()[0];
        assert_eq!(classifier.features().len(), 1);
        assert_eq!(classifier.format(), OutputFormat::Raw);
    }

    #[test]
    fn describe_lists_configuration() {
        let scope = ScopeBuilder::new()
            .output_format("csv")
            .field_cleaner("regex", "s/ //g", "header", ["ua=User-Agent"])
            .class_response("bot", "header", "X-Bot=1")
            .classifier("ip", "127.0.0.1:9000")
            .class_response("human", "http", "200")
            .build();

        let text = scope.describe();
        assert!(text.contains("output format: csv"));
        assert!(text.contains("classifier ip 127.0.0.1:9000"));
        assert!(text.contains("feature header:User-Agent as ua cleaned by regex s/ //g"));
        assert!(text.contains("on 'bot': header X-Bot=1"));
        assert!(text.contains("scope responses:"));
        assert!(text.contains("on 'human': http 200"));
    }

    #[test]
    fn disabled_scope() {
        assert!(!ScopeBuilder::new().enabled(false).build().is_enabled());
        assert!(Scope::builder().build().is_enabled());
    }
}
