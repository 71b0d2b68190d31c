//! Class responses: what a classifier's answer does to the transaction.
//!
//! A [`ResponseTable`] maps class strings to ordered lists of [`Response`]s.
//! [`apply`] runs the list for one class against a transaction. Every
//! response is independent: a malformed or failing one is skipped and the
//! rest still run.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::backend::BackendKind;
use crate::error::ConfigError;
use crate::extract::ParamCache;
use crate::logging::TxLog;
use crate::pipeline;
use crate::processor::Processor;
use crate::scope::Scope;
use crate::transaction::Transaction;

/// Template used by forwarding responses that give no arguments.
pub const DEFAULT_TEMPLATE: &str = "%f";

/// Outcome of classification for the host's response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    /// Leave the status alone
    #[default]
    Unchanged,
    /// Override the status with this code
    Code(u16),
}

impl Status {
    /// Returns the override code, if any.
    pub fn code(self) -> Option<u16> {
        match self {
            Status::Unchanged => None,
            Status::Code(code) => Some(code),
        }
    }
}

/// Class-response keyword as configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseKind {
    /// `cgi`: inject a query parameter
    Param,
    /// `header`: set a header
    Header,
    /// `env`: set an environment variable
    Env,
    /// `cookie`: set or replace a cookie
    Cookie,
    /// `http`: override the response status
    Status,
    /// `redirect`: recognised, does nothing
    Redirect,
    /// `ip`: forward to a TCP peer
    Tcp,
    /// `proc`: forward to a subprocess
    Subprocess,
    /// `sock`: forward to a Unix socket
    Unix,
}

impl ResponseKind {
    /// Returns the canonical configuration keyword.
    pub fn keyword(self) -> &'static str {
        match self {
            ResponseKind::Param => "cgi",
            ResponseKind::Header => "header",
            ResponseKind::Env => "env",
            ResponseKind::Cookie => "cookie",
            ResponseKind::Status => "http",
            ResponseKind::Redirect => "redirect",
            ResponseKind::Tcp => "ip",
            ResponseKind::Subprocess => "proc",
            ResponseKind::Unix => "sock",
        }
    }

    /// Returns the backend a forwarding kind sends through.
    pub fn backend_kind(self) -> Option<BackendKind> {
        match self {
            ResponseKind::Tcp => Some(BackendKind::Tcp),
            ResponseKind::Subprocess => Some(BackendKind::Subprocess),
            ResponseKind::Unix => Some(BackendKind::Unix),
            _ => None,
        }
    }
}

impl fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl FromStr for ResponseKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cgi" => Ok(ResponseKind::Param),
            "header" => Ok(ResponseKind::Header),
            "env" => Ok(ResponseKind::Env),
            "cookie" => Ok(ResponseKind::Cookie),
            "http" => Ok(ResponseKind::Status),
            "redirect" => Ok(ResponseKind::Redirect),
            "ip" => Ok(ResponseKind::Tcp),
            "proc" => Ok(ResponseKind::Subprocess),
            "sock" => Ok(ResponseKind::Unix),
            _ => Err(ConfigError::UnknownResponseKind(s.to_string())),
        }
    }
}

/// One action bound to a class.
#[derive(Debug, Clone)]
pub enum Response {
    /// Append `name=value` to the query string and its CGI mirrors
    InjectParam(String),
    /// Set an inbound and outbound header
    SetHeader {
        /// Header name
        name: String,
        /// Header value, empty when the action had no `=`
        value: String,
    },
    /// Set a transaction environment variable
    SetEnv {
        /// Variable name
        name: String,
        /// Variable value, empty when the action had no `=`
        value: String,
    },
    /// Replace a cookie in the inbound and outbound cookie headers
    SetCookie(String),
    /// Override the response status; the action must parse as an integer
    EmitStatus(String),
    /// Reserved for host-side follow-up
    Redirect(String),
    /// Send an interpolated feature string to another processor
    Forward {
        /// Bound processor
        processor: Arc<Processor>,
        /// `%`-template for the payload
        template: String,
    },
}

impl Response {
    /// Builds a non-forwarding response from its kind and action.
    ///
    /// Forwarding kinds need a processor and are built by the scope builder.
    pub fn from_action(kind: ResponseKind, action: &str) -> Option<Self> {
        let (name, value) = match action.split_once('=') {
            Some((name, value)) => (name.to_string(), value.to_string()),
            None => (action.to_string(), String::new()),
        };
        let response = match kind {
            ResponseKind::Param => Response::InjectParam(action.to_string()),
            ResponseKind::Header => Response::SetHeader { name, value },
            ResponseKind::Env => Response::SetEnv { name, value },
            ResponseKind::Cookie => Response::SetCookie(action.to_string()),
            ResponseKind::Status => Response::EmitStatus(action.to_string()),
            ResponseKind::Redirect => Response::Redirect(action.to_string()),
            ResponseKind::Tcp | ResponseKind::Subprocess | ResponseKind::Unix => return None,
        };
        Some(response)
    }

    /// Returns the kind keyword this response was configured with.
    pub fn kind(&self) -> ResponseKind {
        match self {
            Response::InjectParam(_) => ResponseKind::Param,
            Response::SetHeader { .. } => ResponseKind::Header,
            Response::SetEnv { .. } => ResponseKind::Env,
            Response::SetCookie(_) => ResponseKind::Cookie,
            Response::EmitStatus(_) => ResponseKind::Status,
            Response::Redirect(_) => ResponseKind::Redirect,
            Response::Forward { processor, .. } => match processor.key().kind {
                BackendKind::Subprocess => ResponseKind::Subprocess,
                BackendKind::Unix => ResponseKind::Unix,
                BackendKind::Tcp | BackendKind::Pattern => ResponseKind::Tcp,
            },
        }
    }

    /// Applies this response; returns a status only for [`Response::EmitStatus`].
    fn apply(
        &self,
        scope: &Scope,
        tx: &mut Transaction,
        cache: &mut ParamCache,
        class: &str,
        log: &TxLog<'_>,
    ) -> Option<u16> {
        match self {
            Response::InjectParam(action) => inject_param(tx, action),
            Response::SetHeader { name, value } => {
                tx.headers_in_mut().set(name.clone(), value.clone());
                tx.headers_out_mut().set(name.clone(), value.clone());
            }
            Response::SetEnv { name, value } => {
                if !tx.set_env_var(name.clone(), value.clone()) {
                    log.debug(format_args!("no environment table, {} not set", name));
                }
            }
            Response::SetCookie(action) => {
                if !set_cookie(tx, action) {
                    log.debug(format_args!("skipping malformed cookie response '{}'", action));
                }
            }
            Response::EmitStatus(action) => match leading_status(action) {
                Some(code) => return Some(code),
                None => log.warn(format_args!("status response '{}' is not a status code", action)),
            },
            Response::Redirect(_) => {}
            Response::Forward { processor, template } => {
                let features = pipeline::build_feature_string(scope, tx, cache, processor, log);
                let payload = expand(template, &features, class);
                log.debug(format_args!("interpolated args for {}: {}", processor.key(), payload));
                if let Some(reply) = processor.exchange(&payload, log) {
                    log.debug(format_args!("{} replied: {}", processor.key(), reply));
                }
            }
        }
        None
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::InjectParam(a) | Response::SetCookie(a) | Response::EmitStatus(a) | Response::Redirect(a) => {
                write!(f, "{} {}", self.kind(), a)
            }
            Response::SetHeader { name, value } | Response::SetEnv { name, value } => {
                write!(f, "{} {}={}", self.kind(), name, value)
            }
            Response::Forward { processor, template } => {
                write!(f, "{} {} {}", self.kind(), processor.key().target, template)
            }
        }
    }
}

/// Class strings mapped to their ordered responses.
#[derive(Debug, Clone, Default)]
pub struct ResponseTable {
    classes: BTreeMap<String, Vec<Response>>,
}

impl ResponseTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a response to `class`'s list.
    pub fn push(&mut self, class: impl Into<String>, response: Response) {
        self.classes.entry(class.into()).or_default().push(response);
    }

    /// Returns the responses for `class`.
    pub fn get(&self, class: &str) -> Option<&[Response]> {
        self.classes.get(class).map(Vec::as_slice)
    }

    /// Iterates over classes in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Response])> {
        self.classes.iter().map(|(c, r)| (c.as_str(), r.as_slice()))
    }

    /// Returns the number of classes.
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Returns true if no class has a response.
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Applies the responses for `class` to `tx`.
///
/// The classifier's own table is used when it has one, otherwise the
/// scope's. Responses run in declaration order. The first status response
/// that parses decides the returned status; later responses still run.
pub fn apply(
    scope: &Scope,
    tx: &mut Transaction,
    cache: &mut ParamCache,
    classifier: &Processor,
    class: &str,
    log: &TxLog<'_>,
) -> Status {
    let table = if classifier.responses().is_empty() {
        scope.responses()
    } else {
        classifier.responses()
    };
    let Some(responses) = table.get(class) else {
        log.debug(format_args!("no responses for class '{}'", class));
        return Status::Unchanged;
    };

    let mut status = Status::Unchanged;
    for response in responses {
        log.debug(format_args!("class '{}': {}", class, response));
        if let Some(code) = response.apply(scope, tx, cache, class, log) {
            if status == Status::Unchanged {
                status = Status::Code(code);
            }
        }
    }
    status
}

/// Expands `%f`/`%F` to the feature string and `%c`/`%C` to the class.
///
/// Any other `%x` becomes `x`, so `%%` is a literal percent sign. A lone
/// trailing `%` is dropped.
///
/// # Examples
///
/// ```
/// use classify_relay::response::expand;
///
/// assert_eq!(expand("class=%c data=%f", "\"curl\",", "bot"), "class=bot data=\"curl\",");
/// assert_eq!(expand("100%% %C", "", "human"), "100% human");
/// ```
pub fn expand(template: &str, features: &str, class: &str) -> String {
    let mut out = String::with_capacity(template.len() + features.len() + class.len());
    let mut chars = template.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('f') | Some('F') => out.push_str(features),
            Some('c') | Some('C') => out.push_str(class),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Reads the status code at the start of `action`, so `403 Forbidden` is 403.
fn leading_status(action: &str) -> Option<u16> {
    let action = action.trim_start();
    let end = action
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(action.len());
    action[..end].parse().ok()
}

/// True if `action` appears in `haystack` as whole `&`-separated segments.
fn has_segment(haystack: &str, action: &str) -> bool {
    if action.is_empty() {
        return true;
    }
    haystack.match_indices(action).any(|(at, _)| {
        let before = haystack[..at].chars().next_back();
        let after = haystack[at + action.len()..].chars().next();
        matches!(before, None | Some('&') | Some('?')) && matches!(after, None | Some('&'))
    })
}

fn inject_param(tx: &mut Transaction, action: &str) {
    let query = tx.query().unwrap_or_default();
    if query.is_empty() {
        tx.set_query(action);
    } else if !has_segment(query, action) {
        let query = format!("{}&{}", query, action);
        tx.set_query(query);
    }

    if !tx.has_env() {
        return;
    }
    // Missing or empty mirrors become the action itself.
    let qs = tx.env_var("QUERY_STRING").unwrap_or_default();
    let updated = if qs.is_empty() {
        Some(action.to_string())
    } else if !has_segment(qs, action) {
        Some(format!("{}&{}", qs, action))
    } else {
        None
    };
    if let Some(updated) = updated {
        tx.set_env_var("QUERY_STRING", updated);
    }

    let uri = tx.env_var("REQUEST_URI").unwrap_or_default();
    let updated = if uri.is_empty() {
        Some(action.to_string())
    } else if !has_segment(uri, action) {
        let conj = if uri.contains('?') { '&' } else { '?' };
        Some(format!("{}{}{}", uri, conj, action))
    } else {
        None
    };
    if let Some(updated) = updated {
        tx.set_env_var("REQUEST_URI", updated);
    }
}

/// Drops cookie `name` from a cookie header value.
fn without_cookie(header: &str, name: &str) -> Vec<String> {
    header
        .split(';')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .filter(|pair| pair.split_once('=').map(|(n, _)| n.trim()) != Some(name))
        .map(str::to_string)
        .collect()
}

fn replace_cookie(header: Option<&str>, name: &str, action: &str) -> String {
    let mut pairs = header.map(|h| without_cookie(h, name)).unwrap_or_default();
    pairs.push(action.to_string());
    pairs.join("; ")
}

/// Returns false when `action` is not `name=value;...`.
fn set_cookie(tx: &mut Transaction, action: &str) -> bool {
    let (Some(eq), Some(semi)) = (action.find('='), action.find(';')) else {
        return false;
    };
    if eq > semi {
        return false;
    }
    let name = action[..eq].trim();

    let outbound = replace_cookie(tx.headers_out().get("Set-Cookie"), name, action);
    tx.headers_out_mut().set("Set-Cookie", outbound);
    let inbound = replace_cookie(tx.headers_in().get("Cookie"), name, action);
    tx.headers_in_mut().set("Cookie", inbound);
    true
}
