use std::fmt;

use crate::transaction::Transaction;

/// A transaction-scoped logging handle.
///
/// Every message carries the transaction's request id as a structured
/// `request_id` field so a host's subscriber can correlate pipeline,
/// backend and action events for one request.
///
/// The library installs no subscriber; what is recorded and where is up to
/// the host.
#[derive(Debug, Clone, Copy)]
pub struct TxLog<'a> {
    request_id: &'a str,
}

impl<'a> TxLog<'a> {
    /// Creates a logger for `request_id`.
    pub fn new(request_id: &'a str) -> Self {
        Self { request_id }
    }

    /// Creates a logger for `tx`.
    pub fn for_transaction(tx: &'a Transaction) -> Self {
        Self::new(tx.request_id())
    }

    /// Returns the request ID associated with this logger.
    pub fn request_id(&self) -> &str {
        self.request_id
    }

    /// Logs an info-level message with request ID.
    ///
    /// ```
    /// # use classify_relay::TxLog;
    /// let log = TxLog::new("req-7");
    /// log.info(format_args!("classifier answered {}", "bot"));
    /// ```
    pub fn info(&self, args: fmt::Arguments<'_>) {
        tracing::info!(request_id = %self.request_id, "{}", args);
    }

    /// Logs a warning-level message with request ID.
    pub fn warn(&self, args: fmt::Arguments<'_>) {
        tracing::warn!(request_id = %self.request_id, "{}", args);
    }

    /// Logs a debug-level message with request ID.
    pub fn debug(&self, args: fmt::Arguments<'_>) {
        tracing::debug!(request_id = %self.request_id, "{}", args);
    }
}
