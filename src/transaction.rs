//! The host-side view of one request.
//!
//! A [`Transaction`] holds simple, owned data so that it does not couple the
//! pipeline to any server framework. Hosts fill it from their own request
//! type, run the pipeline, then copy the mutated headers, environment, query
//! string and status back.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use url::Url;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// HTTP GET method
    Get,
    /// HTTP HEAD method
    Head,
    /// HTTP POST method
    Post,
    /// HTTP PUT method
    Put,
    /// HTTP DELETE method
    Delete,
    /// HTTP PATCH method
    Patch,
    /// HTTP OPTIONS method
    Options,
}

impl Method {
    /// Returns `true` for methods whose parameters travel in the body.
    pub fn is_write(self) -> bool {
        matches!(self, Method::Post | Method::Put | Method::Patch)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Head => write!(f, "HEAD"),
            Method::Post => write!(f, "POST"),
            Method::Put => write!(f, "PUT"),
            Method::Delete => write!(f, "DELETE"),
            Method::Patch => write!(f, "PATCH"),
            Method::Options => write!(f, "OPTIONS"),
        }
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "HEAD" => Ok(Method::Head),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "PATCH" => Ok(Method::Patch),
            "OPTIONS" => Ok(Method::Options),
            other => Err(format!("unsupported method '{}'", other)),
        }
    }
}

/// An ordered header table with case-insensitive names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty header table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value of the first header called `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Replaces every header called `name` with a single entry.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(&name))
        {
            Some(first) => {
                self.entries[first].1 = value;
                let mut index = 0;
                self.entries.retain(|(k, _)| {
                    let keep = index <= first || !k.eq_ignore_ascii_case(&name);
                    index += 1;
                    keep
                });
            }
            None => self.entries.push((name, value)),
        }
    }

    /// Appends a header without touching existing entries of the same name.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Removes every header called `name`.
    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    /// Iterates over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Components of the request URI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UriParts {
    /// `http`, `https`, ...
    pub scheme: Option<String>,
    /// `user:password@host:port` as written
    pub hostinfo: Option<String>,
    /// User name from the authority
    pub user: Option<String>,
    /// Password from the authority
    pub password: Option<String>,
    /// Host name
    pub hostname: Option<String>,
    /// Port as written
    pub port: Option<String>,
    /// Path component
    pub path: Option<String>,
    /// Query string without the leading `?`
    pub query: Option<String>,
    /// Fragment without the leading `#`
    pub fragment: Option<String>,
}

impl UriParts {
    /// Splits a request URI into its parts.
    ///
    /// Absolute URIs are parsed fully; origin-form targets such as
    /// `/search?q=x` only yield path, query and fragment.
    pub fn parse(uri: &str) -> Self {
        if let Ok(url) = Url::parse(uri) {
            let user = Some(url.username().to_string()).filter(|u| !u.is_empty());
            let hostname = url.host_str().map(str::to_string);
            let port = url.port().map(|p| p.to_string());
            let hostinfo = hostname.as_ref().map(|host| {
                let mut info = String::new();
                if let Some(user) = &user {
                    info.push_str(user);
                    if let Some(password) = url.password() {
                        info.push(':');
                        info.push_str(password);
                    }
                    info.push('@');
                }
                info.push_str(host);
                if let Some(port) = &port {
                    info.push(':');
                    info.push_str(port);
                }
                info
            });
            return Self {
                scheme: Some(url.scheme().to_string()),
                hostinfo,
                user,
                password: url.password().map(str::to_string),
                hostname,
                port,
                path: Some(url.path().to_string()),
                query: url.query().map(str::to_string),
                fragment: url.fragment().map(str::to_string),
            };
        }

        let (rest, fragment) = match uri.split_once('#') {
            Some((rest, fragment)) => (rest, Some(fragment.to_string())),
            None => (uri, None),
        };
        let (path, query) = match rest.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (rest, None),
        };
        Self {
            path: Some(path.to_string()),
            query,
            fragment,
            ..Self::default()
        }
    }
}

/// Request metadata the host knows about the transaction.
///
/// Everything is optional: a field the host leaves unset extracts as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestInfo {
    /// Content-Type of the request body
    pub content_type: Option<String>,
    /// Content-Encoding of the request body
    pub content_encoding: Option<String>,
    /// Filesystem path the request maps to
    pub filename: Option<String>,
    /// Name of the handler serving the request
    pub handler: Option<String>,
    /// Virtual host name
    pub hostname: Option<String>,
    /// Protocol, e.g. `HTTP/1.1`
    pub protocol: Option<String>,
    /// Extra path after the mapped resource
    pub path_info: Option<String>,
    /// Range header as interpreted by the host
    pub range: Option<String>,
    /// Response status line, e.g. `200 OK`
    pub status_line: Option<String>,
    /// The raw request line
    pub the_request: Option<String>,
    /// The request URI exactly as received
    pub unparsed_uri: Option<String>,
    /// The decoded request path
    pub uri: Option<String>,
    /// Variant-list validator token
    pub vlist_validator: Option<String>,
}

/// One request flowing through the pipeline.
///
/// # Examples
///
/// ```
/// use classify_relay::transaction::{Method, Transaction};
///
/// let mut tx = Transaction::new("req-1", Method::Get, "/search?q=rust");
/// tx.headers_in_mut().set("User-Agent", "curl/8.0");
///
/// assert_eq!(tx.query(), Some("q=rust"));
/// assert_eq!(tx.headers_in().get("user-agent"), Some("curl/8.0"));
/// ```
#[derive(Debug, Clone)]
pub struct Transaction {
    request_id: String,
    method: Method,
    request: RequestInfo,
    uri: UriParts,
    headers_in: Headers,
    headers_out: Headers,
    env: Option<BTreeMap<String, String>>,
    body: Option<String>,
    time: DateTime<Utc>,
    status: Option<u16>,
}

impl Transaction {
    /// Creates a transaction for `method` on `uri`, timestamped now.
    pub fn new(request_id: impl Into<String>, method: Method, uri: &str) -> Self {
        let parts = UriParts::parse(uri);
        let request = RequestInfo {
            uri: parts.path.clone(),
            unparsed_uri: Some(uri.to_string()),
            the_request: Some(format!("{} {} HTTP/1.1", method, uri)),
            protocol: Some("HTTP/1.1".to_string()),
            ..RequestInfo::default()
        };
        Self {
            request_id: request_id.into(),
            method,
            request,
            uri: parts,
            headers_in: Headers::new(),
            headers_out: Headers::new(),
            env: None,
            body: None,
            time: Utc::now(),
            status: None,
        }
    }

    /// Sets the request timestamp.
    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = time;
        self
    }

    /// Sets a form-encoded request body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Gives the transaction a CGI-style environment table.
    ///
    /// `REQUEST_METHOD`, `REQUEST_URI` and `QUERY_STRING` are synthesised
    /// from the request so that parameter injection can keep them in step.
    pub fn with_cgi_env(mut self) -> Self {
        let mut env = BTreeMap::new();
        env.insert("REQUEST_METHOD".to_string(), self.method.to_string());
        if let Some(uri) = &self.request.unparsed_uri {
            env.insert("REQUEST_URI".to_string(), uri.clone());
        }
        env.insert(
            "QUERY_STRING".to_string(),
            self.uri.query.clone().unwrap_or_default(),
        );
        self.env = Some(env);
        self
    }

    /// Returns the request ID.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Returns the request method.
    pub fn method(&self) -> Method {
        self.method
    }

    /// Returns the request metadata.
    pub fn request(&self) -> &RequestInfo {
        &self.request
    }

    /// Returns the request metadata for the host to fill in.
    pub fn request_mut(&mut self) -> &mut RequestInfo {
        &mut self.request
    }

    /// Returns the parsed URI.
    pub fn uri(&self) -> &UriParts {
        &self.uri
    }

    /// Returns the inbound headers.
    pub fn headers_in(&self) -> &Headers {
        &self.headers_in
    }

    /// Returns the inbound headers for modification.
    pub fn headers_in_mut(&mut self) -> &mut Headers {
        &mut self.headers_in
    }

    /// Returns the outbound headers.
    pub fn headers_out(&self) -> &Headers {
        &self.headers_out
    }

    /// Returns the outbound headers for modification.
    pub fn headers_out_mut(&mut self) -> &mut Headers {
        &mut self.headers_out
    }

    /// Returns the request body, if any.
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    /// Returns the request timestamp.
    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    /// Returns the query string without the leading `?`.
    pub fn query(&self) -> Option<&str> {
        self.uri.query.as_deref()
    }

    /// Replaces the query string.
    pub fn set_query(&mut self, query: impl Into<String>) {
        self.uri.query = Some(query.into());
    }

    /// Returns true if the transaction carries an environment table.
    pub fn has_env(&self) -> bool {
        self.env.is_some()
    }

    /// Looks up a variable in the transaction's environment table.
    pub fn env_var(&self, name: &str) -> Option<&str> {
        self.env.as_ref()?.get(name).map(String::as_str)
    }

    /// Sets an environment variable.
    ///
    /// Returns `false` without doing anything when the transaction has no
    /// environment table.
    pub fn set_env_var(&mut self, name: impl Into<String>, value: impl Into<String>) -> bool {
        match self.env.as_mut() {
            Some(env) => {
                env.insert(name.into(), value.into());
                true
            }
            None => false,
        }
    }

    /// Removes an environment variable, returning its old value.
    pub fn remove_env_var(&mut self, name: &str) -> Option<String> {
        self.env.as_mut()?.remove(name)
    }

    /// Returns the overridden response status, if any.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Overrides the response status.
    pub fn set_status(&mut self, status: u16) {
        self.status = Some(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_display_and_parse() {
        assert_eq!(format!("{}", Method::Get), "GET");
        assert_eq!(format!("{}", Method::Post), "POST");
        assert_eq!("patch".parse::<Method>(), Ok(Method::Patch));
        assert!("BREW".parse::<Method>().is_err());
    }

    #[test]
    fn write_methods() {
        assert!(Method::Post.is_write());
        assert!(Method::Put.is_write());
        assert!(!Method::Get.is_write());
        assert!(!Method::Head.is_write());
    }

    #[test]
    fn headers_are_case_insensitive() {
        let mut headers = Headers::new();
        headers.set("User-Agent", "curl/8.0");

        assert_eq!(headers.get("user-agent"), Some("curl/8.0"));
        assert_eq!(headers.get("USER-AGENT"), Some("curl/8.0"));
        assert_eq!(headers.get("Accept"), None);
    }

    #[test]
    fn headers_set_replaces_all_duplicates() {
        let mut headers = Headers::new();
        headers.add("X-Tag", "a");
        headers.add("Accept", "*/*");
        headers.add("x-tag", "b");

        headers.set("X-TAG", "c");

        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("x-tag"), Some("c"));
        assert_eq!(headers.get("accept"), Some("*/*"));
    }

    #[test]
    fn headers_remove() {
        let mut headers = Headers::new();
        headers.set("Cookie", "a=1");
        headers.remove("cookie");
        assert!(headers.is_empty());
    }

    #[test]
    fn uri_parts_from_absolute_uri() {
        let parts = UriParts::parse("https://alice:pw@example.com:8443/a/b?x=1&y=2#top");

        assert_eq!(parts.scheme.as_deref(), Some("https"));
        assert_eq!(parts.user.as_deref(), Some("alice"));
        assert_eq!(parts.password.as_deref(), Some("pw"));
        assert_eq!(parts.hostname.as_deref(), Some("example.com"));
        assert_eq!(parts.port.as_deref(), Some("8443"));
        assert_eq!(parts.hostinfo.as_deref(), Some("alice:pw@example.com:8443"));
        assert_eq!(parts.path.as_deref(), Some("/a/b"));
        assert_eq!(parts.query.as_deref(), Some("x=1&y=2"));
        assert_eq!(parts.fragment.as_deref(), Some("top"));
    }

    #[test]
    fn uri_parts_from_origin_form() {
        let parts = UriParts::parse("/search?q=rust#r");

        assert_eq!(parts.scheme, None);
        assert_eq!(parts.hostname, None);
        assert_eq!(parts.path.as_deref(), Some("/search"));
        assert_eq!(parts.query.as_deref(), Some("q=rust"));
        assert_eq!(parts.fragment.as_deref(), Some("r"));
    }

    #[test]
    fn transaction_defaults() {
        let tx = Transaction::new("req-1", Method::Get, "/index.html");

        assert_eq!(tx.request_id(), "req-1");
        assert_eq!(tx.query(), None);
        assert_eq!(tx.request().uri.as_deref(), Some("/index.html"));
        assert_eq!(tx.request().the_request.as_deref(), Some("GET /index.html HTTP/1.1"));
        assert!(!tx.has_env());
        assert_eq!(tx.status(), None);
    }

    #[test]
    fn cgi_env_mirrors_query() {
        let tx = Transaction::new("req-1", Method::Get, "/p?x=1").with_cgi_env();

        assert_eq!(tx.env_var("QUERY_STRING"), Some("x=1"));
        assert_eq!(tx.env_var("REQUEST_URI"), Some("/p?x=1"));
        assert_eq!(tx.env_var("REQUEST_METHOD"), Some("GET"));
    }

    #[test]
    fn set_env_var_requires_table() {
        let mut tx = Transaction::new("req-1", Method::Get, "/");
        assert!(!tx.set_env_var("A", "1"));
        assert_eq!(tx.env_var("A"), None);

        let mut tx = tx.with_cgi_env();
        assert!(tx.set_env_var("A", "1"));
        assert_eq!(tx.env_var("A"), Some("1"));
    }

    #[test]
    fn remove_env_var() {
        let mut tx = Transaction::new("req-1", Method::Get, "/p?x=1").with_cgi_env();
        assert_eq!(tx.remove_env_var("QUERY_STRING"), Some("x=1".to_string()));
        assert_eq!(tx.env_var("QUERY_STRING"), None);
        assert_eq!(tx.remove_env_var("QUERY_STRING"), None);
    }
}
