//! Property tests for classify-relay.
//!
//! These check the encodings and cleaning invariants across arbitrary
//! feature values rather than hand-picked ones.

use std::collections::HashMap;

use classify_relay::extract::ParamCache;
use classify_relay::format::{format_features, OutputFormat};
use classify_relay::pipeline;
use classify_relay::response;
use classify_relay::transaction::{Method, Transaction};
use classify_relay::{ScopeBuilder, TxLog};
use proptest::prelude::*;

// Strategy: every output format
fn arb_format() -> impl Strategy<Value = OutputFormat> {
    prop_oneof![
        Just(OutputFormat::Raw),
        Just(OutputFormat::Quoted),
        Just(OutputFormat::Csv),
        Just(OutputFormat::JsonArray),
        Just(OutputFormat::JsonObject),
        Just(OutputFormat::JsonFields),
    ]
}

// Strategy: feature values without control characters
fn arb_value() -> impl Strategy<Value = String> {
    prop::string::string_regex("\\PC{0,24}").unwrap()
}

// Strategy: header-safe feature values
fn arb_header_value() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z0-9 ./;:=_()-]{0,30}").unwrap()
}

/// Reverses the backslash escaping of the quoted encodings.
fn unescape(escaped: &str) -> String {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

proptest! {
    /// Property: an empty feature list renders as the format's empty container
    #[test]
    fn proptest_empty_feature_list(format in arb_format()) {
        let rendered = format_features(std::iter::empty(), format);
        let expected = match format {
            OutputFormat::JsonArray => "[]",
            OutputFormat::JsonObject | OutputFormat::JsonFields => "{}",
            OutputFormat::Raw | OutputFormat::Quoted | OutputFormat::Csv => "",
        };
        prop_assert_eq!(rendered, expected);
    }

    /// Property: a single value survives every escaping encoding
    #[test]
    fn proptest_single_value_escaping(name in "[a-z]{1,8}", value in arb_value()) {
        let field = [(name.as_str(), Some(value.as_str()))];

        let quoted = format_features(field, OutputFormat::Quoted);
        prop_assert!(quoted.starts_with('"') && quoted.ends_with('"'));
        prop_assert_eq!(unescape(&quoted[1..quoted.len() - 1]), value.clone());

        let csv = format_features(field, OutputFormat::Csv);
        prop_assert!(csv.starts_with('"') && csv.ends_with("\","));
        prop_assert_eq!(unescape(&csv[1..csv.len() - 2]), value.clone());

        let array: Vec<String> = serde_json::from_str(&format_features(field, OutputFormat::JsonArray)).unwrap();
        prop_assert_eq!(array, vec![value.clone()]);

        let object: HashMap<String, String> =
            serde_json::from_str(&format_features(field, OutputFormat::JsonObject)).unwrap();
        prop_assert_eq!(object.get("1"), Some(&value));

        let fields: HashMap<String, String> =
            serde_json::from_str(&format_features(field, OutputFormat::JsonFields)).unwrap();
        prop_assert_eq!(fields.get(&name), Some(&value));
    }

    /// Property: JSON arrays keep every value in order, absent values as ""
    #[test]
    fn proptest_json_array_preserves_order(values in prop::collection::vec(prop::option::of(arb_value()), 0..8)) {
        let rendered = format_features(
            values.iter().map(|v| ("f", v.as_deref())),
            OutputFormat::JsonArray,
        );
        let parsed: Vec<String> = serde_json::from_str(&rendered).unwrap();
        let expected: Vec<String> = values.into_iter().map(Option::unwrap_or_default).collect();
        prop_assert_eq!(parsed, expected);
    }

    /// Property: a chain of identity substitutions leaves the value as extracted
    ///
    /// Holds for any chain length, including no chain at all.
    #[test]
    fn proptest_identity_chain_keeps_raw_value(value in arb_header_value(), links in 0usize..6) {
        // field_cleaner also declares the feature, so only a bare chain needs it.
        let mut builder = ScopeBuilder::new();
        if links == 0 {
            builder = builder.features("header", ["X-Sample"]);
        }
        for _ in 0..links {
            builder = builder.field_cleaner("regex", "s/^//", "header", ["X-Sample"]);
        }
        let scope = builder.classifier("ip", "127.0.0.1:1").build();
        prop_assert!(scope.diagnostics().is_empty());

        let mut tx = Transaction::new("req", Method::Get, "/");
        tx.headers_in_mut().set("X-Sample", value.clone());

        let classifier = &scope.classifiers()[0];
        let cleaned = pipeline::clean_features(&scope, &tx, &mut ParamCache::new(), classifier, &TxLog::new("req"));
        prop_assert_eq!(cleaned.len(), 1);
        prop_assert_eq!(cleaned[0].clean.as_deref(), Some(value.as_str()));
        prop_assert_eq!(cleaned[0].raw.as_deref(), Some(value.as_str()));
        prop_assert_eq!(pipeline::feature_string(&scope, &tx, classifier), value);
    }

    /// Property: injecting the same parameter twice adds it once
    #[test]
    fn proptest_inject_is_idempotent(
        existing in prop::option::of("[a-z]{1,6}=[0-9]{1,4}"),
        action in "[a-z]{1,6}=[0-9]{1,4}"
    ) {
        let scope = ScopeBuilder::new()
            .class_response("bot", "cgi", &action)
            .classifier("ip", "127.0.0.1:1")
            .build();
        let classifier = &scope.classifiers()[0];
        let log = TxLog::new("req");

        let uri = match &existing {
            Some(query) => format!("/page?{}", query),
            None => "/page".to_string(),
        };
        let mut tx = Transaction::new("req", Method::Get, &uri);
        response::apply(&scope, &mut tx, &mut ParamCache::new(), classifier, "bot", &log);
        let once = tx.query().map(str::to_string);
        response::apply(&scope, &mut tx, &mut ParamCache::new(), classifier, "bot", &log);

        prop_assert_eq!(tx.query().map(str::to_string), once.clone());
        let query = once.unwrap();
        prop_assert!(query.split('&').any(|segment| segment == action));
    }
}
