use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;

use super::tcp::MAX_REPLY;
use crate::error::{BackendError, BackendErrorKind, ConfigError};

/// A Unix-domain stream socket, connected afresh for every send.
///
/// Reads and writes are bounded by the I/O timeout.
#[derive(Debug, Clone)]
pub struct UnixBackend {
    target: String,
    path: PathBuf,
    timeout: Duration,
}

impl UnixBackend {
    /// Creates a backend for the socket at `path`.
    pub fn new(path: &str, timeout: Duration) -> Result<Self, ConfigError> {
        if path.trim().is_empty() {
            return Err(ConfigError::EmptySocketPath);
        }
        Ok(Self {
            target: path.to_string(),
            path: PathBuf::from(path),
            timeout,
        })
    }

    /// Returns the socket path as configured.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Connects, writes `payload` and a newline, reads the reply.
    pub fn send(&self, payload: &str) -> Result<String, BackendError> {
        let mut stream =
            UnixStream::connect(&self.path).map_err(|e| self.error(BackendErrorKind::Connect, &e))?;
        stream
            .set_read_timeout(Some(self.timeout))
            .and_then(|_| stream.set_write_timeout(Some(self.timeout)))
            .map_err(|e| self.error(BackendErrorKind::Connect, &e))?;

        let mut framed = String::with_capacity(payload.len() + 1);
        framed.push_str(payload);
        framed.push('\n');
        stream
            .write_all(framed.as_bytes())
            .map_err(|e| self.error(BackendErrorKind::Send, &e))?;

        let mut buf = [0u8; MAX_REPLY];
        let n = stream
            .read(&mut buf)
            .map_err(|e| self.error(BackendErrorKind::Receive, &e))?;
        if n == 0 {
            return Err(BackendError::new(
                BackendErrorKind::Closed,
                format!("{} closed the connection without replying", self.target),
            ));
        }
        Ok(String::from_utf8_lossy(&buf[..n]).trim_end_matches(&['\r', '\n'][..]).to_string())
    }

    fn error(&self, kind: BackendErrorKind, e: &io::Error) -> BackendError {
        let kind = match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => BackendErrorKind::Timeout,
            _ => kind,
        };
        BackendError::new(kind, format!("{}: {}", self.target, e))
    }
}
