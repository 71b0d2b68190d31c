//! The per-transaction pipeline: extract, clean, format, send, act.
//!
//! Nothing here keeps state between transactions. Each entry point takes the
//! resolved [`Scope`] and one transaction; query and form parameters are
//! decoded at most once per call through a fresh [`ParamCache`].

use crate::extract::{extract, ParamCache};
use crate::field::{Feature, FeatureValue};
use crate::format::format_features;
use crate::logging::TxLog;
use crate::processor::Processor;
use crate::response::{self, Status};
use crate::scope::Scope;
use crate::transaction::Transaction;

/// User-Agent marker of the host's own keep-alive connections.
pub const INTERNAL_DUMMY_AGENT: &str = "(internal dummy connection)";

/// Extracts and cleans one feature.
fn clean_feature(
    scope: &Scope,
    tx: &Transaction,
    cache: &mut ParamCache,
    processor: &Processor,
    feature: &Feature,
    log: &TxLog<'_>,
) -> FeatureValue {
    let raw = extract(tx, cache, feature.source(), feature.key());
    let Some(raw_value) = raw.as_deref() else {
        log.debug(format_args!("{} is absent", feature.field_key()));
        return FeatureValue::new(feature.name(), None);
    };

    let clean = match scope.field_cleaners(&feature.field_key()) {
        Some(chain) => chain
            .iter()
            .fold(raw_value.to_string(), |value, cleaner| cleaner.transform(&value, log)),
        None => match processor.default_cleaner() {
            Some(cleaner) => cleaner.transform(raw_value, log),
            None => raw_value.to_string(),
        },
    };
    log.debug(format_args!("{}: '{}' -> '{}'", feature.field_key(), raw_value, clean));

    FeatureValue {
        name: feature.name().to_string(),
        raw,
        clean: Some(clean),
    }
}

/// Extracts and cleans a processor's labels, then its features.
pub fn clean_features(
    scope: &Scope,
    tx: &Transaction,
    cache: &mut ParamCache,
    processor: &Processor,
    log: &TxLog<'_>,
) -> Vec<FeatureValue> {
    processor
        .labels()
        .iter()
        .chain(processor.features())
        .map(|feature| clean_feature(scope, tx, cache, processor, feature, log))
        .collect()
}

pub(crate) fn build_feature_string(
    scope: &Scope,
    tx: &Transaction,
    cache: &mut ParamCache,
    processor: &Processor,
    log: &TxLog<'_>,
) -> String {
    let values = clean_features(scope, tx, cache, processor, log);
    let rendered = format_features(
        values.iter().map(|v| (v.name.as_str(), v.clean.as_deref())),
        processor.format(),
    );
    match processor.output_cleaner() {
        Some(cleaner) => cleaner.transform(&rendered, log),
        None => rendered,
    }
}

/// Renders the feature string `processor` would be sent for `tx`.
///
/// # Examples
///
/// ```
/// use classify_relay::pipeline::feature_string;
/// use classify_relay::transaction::{Method, Transaction};
/// use classify_relay::ScopeBuilder;
///
/// let scope = ScopeBuilder::new()
///     .output_format("csv")
///     .features("header", ["User-Agent"])
///     .classifier("ip", "127.0.0.1:9000")
///     .build();
///
/// let mut tx = Transaction::new("req-1", Method::Get, "/");
/// tx.headers_in_mut().set("User-Agent", "curl/8.0");
///
/// assert_eq!(feature_string(&scope, &tx, &scope.classifiers()[0]), "\"curl/8.0\",");
/// ```
pub fn feature_string(scope: &Scope, tx: &Transaction, processor: &Processor) -> String {
    let log = TxLog::for_transaction(tx);
    build_feature_string(scope, tx, &mut ParamCache::new(), processor, &log)
}

fn is_internal_dummy(tx: &Transaction) -> bool {
    tx.headers_in()
        .get("User-Agent")
        .is_some_and(|agent| agent.contains(INTERNAL_DUMMY_AGENT))
}

fn preprocess(scope: &Scope, tx: &Transaction, cache: &mut ParamCache, log: &TxLog<'_>) {
    if is_internal_dummy(tx) {
        log.debug(format_args!("internal dummy connection, skipping preprocessors"));
        return;
    }
    for (i, processor) in scope.preprocessors().iter().enumerate() {
        log.debug(format_args!("start preprocessor {}: {}", i, processor.key()));
        let features = build_feature_string(scope, tx, cache, processor, log);
        let reply = processor.exchange(&features, log);
        log.debug(format_args!(
            "finish preprocessor {}: {}",
            i,
            reply.as_deref().unwrap_or("<no reply>")
        ));
    }
}

fn classify(scope: &Scope, tx: &mut Transaction, cache: &mut ParamCache, log: &TxLog<'_>) -> Status {
    let mut status = Status::Unchanged;
    for (i, processor) in scope.classifiers().iter().enumerate() {
        log.debug(format_args!("start classifier {}: {}", i, processor.key()));
        let features = build_feature_string(scope, tx, cache, processor, log);
        status = match processor.exchange(&features, log) {
            Some(class) => {
                log.info(format_args!("classifier {} answered '{}'", processor.key(), class));
                response::apply(scope, tx, cache, processor, &class, log)
            }
            None => Status::Unchanged,
        };
        log.debug(format_args!("finish classifier {}: {:?}", i, status));
    }
    status
}

/// Runs every preprocessor in order, discarding their replies.
///
/// Skipped for the host's internal keep-alive connections and for disabled
/// scopes.
pub fn run_preprocessors(scope: &Scope, tx: &Transaction) {
    if !scope.is_enabled() {
        return;
    }
    let log = TxLog::for_transaction(tx);
    preprocess(scope, tx, &mut ParamCache::new(), &log);
}

/// Runs every classifier in order and applies the responses to its class.
///
/// The returned status is the one produced for the last classifier, even
/// when an earlier classifier produced a different one.
pub fn run_classifiers(scope: &Scope, tx: &mut Transaction) -> Status {
    if !scope.is_enabled() {
        return Status::Unchanged;
    }
    let request_id = tx.request_id().to_string();
    let log = TxLog::new(&request_id);
    classify(scope, tx, &mut ParamCache::new(), &log)
}

/// Runs preprocessors then classifiers, sharing one parameter cache.
///
/// A status override is also recorded on the transaction.
pub fn run(scope: &Scope, tx: &mut Transaction) -> Status {
    if !scope.is_enabled() {
        return Status::Unchanged;
    }
    let request_id = tx.request_id().to_string();
    let log = TxLog::new(&request_id);
    let mut cache = ParamCache::new();

    preprocess(scope, tx, &mut cache, &log);
    let status = classify(scope, tx, &mut cache, &log);
    if let Status::Code(code) = status {
        tx.set_status(code);
    }
    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::ScopeBuilder;
    use crate::transaction::Method;

    fn tx() -> Transaction {
        let mut tx = Transaction::new("req-1", Method::Get, "/search?q=Hello+World&lang=en");
        tx.headers_in_mut().set("User-Agent", "Mozilla/5.0");
        tx
    }

    #[test]
    fn labels_come_before_features() {
        let scope = ScopeBuilder::new()
            .processor_format("json")
            .features("cgi", ["q"])
            .labels("literal", ["v1"])
            .preprocessor("ip", "127.0.0.1:9000")
            .build();
        assert_eq!(
            feature_string(&scope, &tx(), &scope.preprocessors()[0]),
            r#"{"1":"v1","2":"Hello World"}"#
        );
    }

    #[test]
    fn field_chain_then_output_cleaner() {
        let scope = ScopeBuilder::new()
            .field_cleaner("regex", "s/Hello/Bye/", "cgi", ["q"])
            .field_cleaner("regex", "s/ /_/g", "cgi", ["q"])
            .features("cgi", ["lang"])
            .output_cleaner("regex", "s/^/>/")
            .preprocessor("ip", "127.0.0.1:9000")
            .build();
        assert_eq!(
            feature_string(&scope, &tx(), &scope.preprocessors()[0]),
            ">Bye_World en"
        );
    }

    #[test]
    fn default_cleaner_only_for_fields_without_chain() {
        let scope = ScopeBuilder::new()
            .default_field_cleaner("regex", "s/.*/x/")
            .field_cleaner("regex", "s/o/0/g", "header", ["User-Agent"])
            .features("cgi", ["lang"])
            .preprocessor("ip", "127.0.0.1:9000")
            .build();
        assert_eq!(
            feature_string(&scope, &tx(), &scope.preprocessors()[0]),
            "M0zilla/5.0 x"
        );
    }

    #[test]
    fn absent_fields_skip_cleaning() {
        let scope = ScopeBuilder::new()
            .default_field_cleaner("regex", "s/^$/EMPTY/")
            .features("header", ["Referer"])
            .processor_format("jsonfields")
            .preprocessor("ip", "127.0.0.1:9000")
            .build();
        let mut cache = ParamCache::new();
        let log = TxLog::new("t");
        let values = clean_features(&scope, &tx(), &mut cache, &scope.preprocessors()[0], &log);
        assert_eq!(values, vec![FeatureValue::new("Referer", None)]);
        assert_eq!(
            feature_string(&scope, &tx(), &scope.preprocessors()[0]),
            r#"{"Referer":""}"#
        );
    }

    #[test]
    fn unreachable_classifier_leaves_transaction_alone() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let scope = ScopeBuilder::new()
            .features("cgi", ["q"])
            .class_response("", "http", "500")
            .classifier("ip", &addr)
            .build();
        let mut tx = tx();
        assert_eq!(run(&scope, &mut tx), Status::Unchanged);
        assert_eq!(tx.status(), None);
        assert!(tx.headers_out().is_empty());
    }

    #[test]
    fn disabled_scope_does_nothing() {
        let scope = ScopeBuilder::new()
            .enabled(false)
            .class_response("x", "http", "403")
            .build();
        let mut tx = tx();
        assert_eq!(run_classifiers(&scope, &mut tx), Status::Unchanged);
        run_preprocessors(&scope, &tx);
        assert_eq!(run(&scope, &mut tx), Status::Unchanged);
    }

    #[test]
    fn internal_dummy_detection() {
        let mut dummy = Transaction::new("r", Method::Options, "*");
        dummy
            .headers_in_mut()
            .set("User-Agent", "Apache/2.4.58 (Unix) (internal dummy connection)");
        assert!(is_internal_dummy(&dummy));
        assert!(!is_internal_dummy(&tx()));
    }
}
