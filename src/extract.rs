//! Field extraction: read one named value out of a transaction.
//!
//! Extraction never fails. A source that has nothing for the key, or that
//! cannot be read, yields `None`, which formats as an empty string.

use std::collections::HashMap;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use url::form_urlencoded;

use crate::field::FieldSource;
use crate::transaction::Transaction;

/// Longest rendered time value, in bytes; longer renderings come out empty.
pub const TIME_FORMAT_MAX: usize = 128;

/// Per-transaction cache of decoded query or form parameters.
///
/// Parameters are decoded on the first parameter lookup and reused for the
/// rest of the transaction. Create a fresh cache for every transaction.
#[derive(Debug, Default)]
pub struct ParamCache {
    params: Option<HashMap<String, String>>,
}

impl ParamCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true once parameters have been decoded.
    pub fn is_loaded(&self) -> bool {
        self.params.is_some()
    }

    fn get(&mut self, tx: &Transaction, name: &str) -> Option<String> {
        let params = self.params.get_or_insert_with(|| decode_params(tx));
        params.get(name).cloned()
    }
}

/// URL query for read-style requests, the form body for write-style ones.
fn decode_params(tx: &Transaction) -> HashMap<String, String> {
    let encoded = if tx.method().is_write() {
        tx.body().unwrap_or_default()
    } else {
        tx.query().unwrap_or_default()
    };
    let mut params = HashMap::new();
    for (name, value) in form_urlencoded::parse(encoded.as_bytes()) {
        params
            .entry(name.into_owned())
            .or_insert_with(|| value.into_owned());
    }
    params
}

/// Reads the value for `key` from `source`.
///
/// # Examples
///
/// ```
/// use classify_relay::extract::{extract, ParamCache};
/// use classify_relay::field::FieldSource;
/// use classify_relay::transaction::{Method, Transaction};
///
/// let mut tx = Transaction::new("req-1", Method::Get, "/?q=rust");
/// tx.headers_in_mut().set("Cookie", "a=1; sid=abc");
/// let mut cache = ParamCache::new();
///
/// assert_eq!(extract(&tx, &mut cache, FieldSource::Param, "q").as_deref(), Some("rust"));
/// assert_eq!(extract(&tx, &mut cache, FieldSource::Cookie, "sid").as_deref(), Some("abc"));
/// assert_eq!(extract(&tx, &mut cache, FieldSource::Literal, "v2").as_deref(), Some("v2"));
/// ```
pub fn extract(
    tx: &Transaction,
    cache: &mut ParamCache,
    source: FieldSource,
    key: &str,
) -> Option<String> {
    match source {
        FieldSource::Param => cache.get(tx, key),
        FieldSource::Header => tx.headers_in().get(key).map(str::to_string),
        FieldSource::Env => tx
            .env_var(key)
            .map(str::to_string)
            .or_else(|| std::env::var(key).ok()),
        FieldSource::Cookie => cookie(tx.headers_in().get("Cookie")?, key),
        FieldSource::Uri => uri_component(tx, key),
        FieldSource::Time => time_value(tx.time(), key),
        FieldSource::Literal => Some(key.to_string()),
        FieldSource::Request => request_field(tx, key),
        FieldSource::Auth => Some(auth_nonce(key, tx.time())),
    }
}

/// Finds cookie `name` in a `Cookie` header value.
pub(crate) fn cookie(header: &str, name: &str) -> Option<String> {
    header
        .split(';')
        .map(str::trim_start)
        .find_map(|pair| pair.strip_prefix(name)?.strip_prefix('='))
        .map(str::to_string)
}

fn uri_component(tx: &Transaction, key: &str) -> Option<String> {
    let uri = tx.uri();
    let part = match key {
        "fragment" => &uri.fragment,
        "hostinfo" => &uri.hostinfo,
        "hostname" => &uri.hostname,
        "port" | "port_str" => &uri.port,
        "path" => &uri.path,
        "password" => &uri.password,
        "query" => &uri.query,
        "scheme" => &uri.scheme,
        "user" => &uri.user,
        _ => return None,
    };
    part.clone()
}

fn request_field(tx: &Transaction, key: &str) -> Option<String> {
    let request = tx.request();
    let field = match key.to_ascii_lowercase().as_str() {
        "method" => return Some(tx.method().to_string()),
        "args" => return tx.query().map(str::to_string),
        "content_type" => &request.content_type,
        "content_encoding" => &request.content_encoding,
        "filename" => &request.filename,
        "handler" => &request.handler,
        "hostname" => &request.hostname,
        "protocol" => &request.protocol,
        "path_info" => &request.path_info,
        "range" => &request.range,
        "status_line" => &request.status_line,
        "the_request" => &request.the_request,
        "unparsed_uri" => &request.unparsed_uri,
        "uri" => &request.uri,
        "vlist_validator" => &request.vlist_validator,
        _ => return None,
    };
    field.clone()
}

/// Renders the request time for a preset name or a strftime format.
fn time_value(time: DateTime<Utc>, key: &str) -> Option<String> {
    match key {
        "millis" => return Some(time.timestamp_millis().to_string()),
        "epoch" => return Some(time.timestamp().to_string()),
        "ctime" => return Some(time.format("%a %b %d %H:%M:%S %Y").to_string()),
        "rfc822" => return Some(time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()),
        _ => {}
    }

    // A `name=` prefix never contains a conversion, so `%Y=%m` stays whole.
    let format = match key.split_once('=') {
        Some((name, format)) if !name.contains('%') => format,
        _ => key,
    };
    let items = StrftimeItems::new(format);
    if items.clone().any(|item| matches!(item, Item::Error)) {
        tracing::debug!(format, "invalid time format");
        return None;
    }
    let rendered = time.format_with_items(items).to_string();
    if rendered.len() >= TIME_FORMAT_MAX {
        return Some(String::new());
    }
    Some(rendered)
}

/// Builds `nonce=<sha256(sha256(key) + salt)>:<salt>`.
///
/// The salt is 32 random bytes in hex; if the system RNG is unavailable it
/// falls back to a Lehmer step over the request time in milliseconds.
pub(crate) fn auth_nonce(key: &str, time: DateTime<Utc>) -> String {
    let key_digest = hex::encode(Sha256::digest(key.as_bytes()));

    let mut salt_bytes = [0u8; 32];
    let salt = match OsRng.try_fill_bytes(&mut salt_bytes) {
        Ok(()) => hex::encode(salt_bytes),
        Err(e) => {
            tracing::warn!(error = %e, "no random source for nonce salt, deriving from request time");
            let millis = time.timestamp_millis().unsigned_abs();
            ((millis.wrapping_mul(48271)) % 2_147_483_647).to_string()
        }
    };

    let both = hex::encode(Sha256::digest(format!("{}{}", key_digest, salt).as_bytes()));
    format!("nonce={}:{}", both, salt)
}
