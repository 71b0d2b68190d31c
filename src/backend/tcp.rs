use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::error::{BackendError, BackendErrorKind, ConfigError};

/// Largest reply read from a socket peer.
pub(crate) const MAX_REPLY: usize = 8192;

/// A `host:port` peer, connected afresh for every send.
///
/// The payload is followed by a blank line. The reply is a single read with
/// trailing newlines removed.
#[derive(Debug, Clone)]
pub struct TcpBackend {
    target: String,
    addrs: Vec<SocketAddr>,
    timeout: Duration,
}

impl TcpBackend {
    /// Resolves `target`, which must be `host:port`.
    pub fn resolve(target: &str, timeout: Duration) -> Result<Self, ConfigError> {
        let bad = || ConfigError::BadAddress(target.to_string());

        let (host, port) = target.rsplit_once(':').ok_or_else(bad)?;
        if host.is_empty() || port.parse::<u16>().is_err() {
            return Err(bad());
        }
        let addrs: Vec<SocketAddr> = target.to_socket_addrs().map_err(|_| bad())?.collect();
        if addrs.is_empty() {
            return Err(bad());
        }

        Ok(Self {
            target: target.to_string(),
            addrs,
            timeout,
        })
    }

    /// Returns the target as configured.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Connects, writes `payload` and a blank line, reads the reply.
    pub fn send(&self, payload: &str) -> Result<String, BackendError> {
        let mut stream = self.connect()?;
        stream
            .set_read_timeout(Some(self.timeout))
            .and_then(|_| stream.set_write_timeout(Some(self.timeout)))
            .map_err(|e| self.error(BackendErrorKind::Connect, &e))?;

        let mut framed = String::with_capacity(payload.len() + 2);
        framed.push_str(payload);
        framed.push_str("\n\n");
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

    fn connect(&self) -> Result<TcpStream, BackendError> {
        let mut last = None;
        for addr in &self.addrs {
            match TcpStream::connect_timeout(addr, self.timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => last = Some(e),
            }
        }
        let e = last.unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no address"));
        Err(self.error(BackendErrorKind::Connect, &e))
    }

    fn error(&self, kind: BackendErrorKind, e: &io::Error) -> BackendError {
        let kind = match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => BackendErrorKind::Timeout,
            _ => kind,
        };
        BackendError::new(kind, format!("{}: {}", self.target, e))
    }
}
