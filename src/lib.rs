//! Request classification by external decision processes.
//!
//! This crate pulls named features out of a request, cleans each one through
//! a chain of processors, encodes the set as one line of text, and ships it
//! to an external classifier over a subprocess pipe, a TCP connection or a
//! Unix-domain socket. The single class string that comes back selects an
//! ordered list of responses that rewrite the request: inject a query
//! parameter, set a header, cookie or environment variable, override the
//! status, or forward another feature string elsewhere.
//!
//! The crate trains nothing and hosts no model. It is the plumbing between a
//! request and an opaque classifier.
//!
//! # Core Types
//!
//! - [`ScopeBuilder`]: resolves directives into a [`Scope`], collecting
//!   problems instead of failing
//! - [`Scope`]: the immutable, shareable configuration for one routing scope
//! - [`Transaction`]: the host's request, read by extraction and written by
//!   class responses
//! - [`Backend`](backend::Backend): the pattern, subprocess, TCP and
//!   Unix-socket transports
//! - [`Status`]: the status override produced by classification
//!
//! # Failure model
//!
//! Nothing a feature, processor or response does can abort the pipeline.
//! Backend failures are logged through `tracing` with the transaction's
//! request id and the value passes through unchanged.
//!
//! # Examples
//!
//! ```
//! use classify_relay::pipeline;
//! use classify_relay::transaction::{Method, Transaction};
//! use classify_relay::{ScopeBuilder, Status};
//!
//! let scope = ScopeBuilder::new()
//!     .output_format("csv")
//!     .field_cleaner("regex", "s/[0-9.]+//g", "header", ["User-Agent"])
//!     .class_response("bot", "header", "X-Bot=1")
//!     .classifier("ip", "127.0.0.1:1")
//!     .build();
//!
//! let mut tx = Transaction::new("req-1", Method::Get, "/");
//! tx.headers_in_mut().set("User-Agent", "curl/8.0");
//!
//! let sent = pipeline::feature_string(&scope, &tx, &scope.classifiers()[0]);
//! assert_eq!(sent, "\"curl/\",");
//!
//! // With nothing listening, classification degrades to a no-op.
//! assert_eq!(pipeline::run(&scope, &mut tx), Status::Unchanged);
//! assert_eq!(tx.headers_out().get("X-Bot"), None);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod config;
mod error;
pub mod extract;
pub mod field;
pub mod format;
mod logging;
pub mod pipeline;
pub mod processor;
pub mod response;
pub mod scope;
pub mod transaction;

pub use backend::BackendKind;
pub use config::ScopeConfig;
pub use error::{BackendError, BackendErrorKind, ConfigError, Error};
pub use field::FieldSource;
pub use format::OutputFormat;
pub use logging::TxLog;
pub use response::Status;
pub use scope::{Scope, ScopeBuilder};
pub use transaction::Transaction;
