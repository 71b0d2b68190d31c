//! Processor backends: the four ways a processor exchanges text with its target.
//!
//! Every backend takes one line of text and answers with one line of text.
//! [`Backend::Pattern`] transforms in-process. The other three talk to an
//! external program:
//!
//! | Backend | Transport | Concurrency |
//! |---------|-----------|-------------|
//! | [`Backend::Subprocess`] | long-lived child over stdin/stdout | one exchange at a time per scope |
//! | [`Backend::Tcp`] | fresh connection per send | unrestricted |
//! | [`Backend::Unix`] | fresh connection per send | unrestricted |
//!
//! A subprocess pipe carries no request ids, so all subprocess exchanges in a
//! scope share one [`ExchangeLock`]. Socket backends open a connection per
//! call and never take it. [`Backend::requires_serialization`] reports which
//! side of that line a backend is on.
//!
//! Backends are created once per distinct [`BackendKey`] by a
//! [`BackendRegistry`], which is frozen into the scope after resolution.

mod pattern;
mod subprocess;
mod tcp;
#[cfg(unix)]
mod unix;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};

use crate::error::{BackendError, ConfigError};

pub use pattern::PatternBackend;
pub use subprocess::{ChildChannel, LineChannel, SubprocessBackend};
pub use tcp::TcpBackend;
#[cfg(unix)]
pub use unix::UnixBackend;

/// Default bound for socket I/O and for waiting on the exchange lock.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Transport used by a processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BackendKind {
    /// In-process match or substitution
    Pattern,
    /// Long-lived child process over stdin/stdout
    Subprocess,
    /// TCP `host:port`
    Tcp,
    /// Unix-domain stream socket path
    Unix,
}

impl BackendKind {
    /// Returns the canonical configuration keyword.
    pub fn keyword(self) -> &'static str {
        match self {
            BackendKind::Pattern => "regex",
            BackendKind::Subprocess => "proc",
            BackendKind::Tcp => "ip",
            BackendKind::Unix => "sock",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "regex" | "pat" => Ok(BackendKind::Pattern),
            "proc" | "script" => Ok(BackendKind::Subprocess),
            "ip" => Ok(BackendKind::Tcp),
            "sock" | "socket" => Ok(BackendKind::Unix),
            _ => Err(ConfigError::UnknownBackendKind(s.to_string())),
        }
    }
}

/// Identity of a backend within a scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BackendKey {
    /// Transport
    pub kind: BackendKind,
    /// Pattern, program path, `host:port` or socket path
    pub target: String,
}

impl BackendKey {
    /// Creates a key.
    pub fn new(kind: BackendKind, target: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
        }
    }
}

impl fmt::Display for BackendKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.target)
    }
}

/// Timeouts applied to backend exchanges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendOptions {
    /// Connect, read and write bound for socket backends
    pub io_timeout: Duration,
    /// How long a subprocess exchange waits for the scope's exchange lock
    pub lock_timeout: Duration,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            io_timeout: DEFAULT_TIMEOUT,
            lock_timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// The scope-wide lock serialising subprocess exchanges.
///
/// Clones share the same lock.
#[derive(Debug, Clone, Default)]
pub struct ExchangeLock {
    inner: Arc<Mutex<()>>,
}

impl ExchangeLock {
    /// Creates a new, unlocked lock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits up to `timeout` for the lock.
    pub fn acquire(&self, timeout: Duration) -> Option<MutexGuard<'_, ()>> {
        self.inner.try_lock_for(timeout)
    }
}

/// A live backend.
#[derive(Debug)]
pub enum Backend {
    /// See [`PatternBackend`]
    Pattern(PatternBackend),
    /// See [`SubprocessBackend`]
    Subprocess(SubprocessBackend),
    /// See [`TcpBackend`]
    Tcp(TcpBackend),
    /// See [`UnixBackend`]
    #[cfg(unix)]
    Unix(UnixBackend),
}

impl Backend {
    /// Establishes the backend named by `key`.
    ///
    /// Patterns are compiled, programs are started and `host:port` targets
    /// are resolved here. Socket connections are made per send.
    pub fn open(key: &BackendKey, options: &BackendOptions, lock: &ExchangeLock) -> Result<Self, ConfigError> {
        match key.kind {
            BackendKind::Pattern => PatternBackend::compile(&key.target).map(Backend::Pattern),
            BackendKind::Subprocess => {
                SubprocessBackend::spawn(&key.target, lock.clone(), options.lock_timeout)
                    .map(Backend::Subprocess)
            }
            BackendKind::Tcp => TcpBackend::resolve(&key.target, options.io_timeout).map(Backend::Tcp),
            #[cfg(unix)]
            BackendKind::Unix => UnixBackend::new(&key.target, options.io_timeout).map(Backend::Unix),
            #[cfg(not(unix))]
            BackendKind::Unix => Err(ConfigError::NotAllowed {
                kind: key.kind.to_string(),
                role: "backend on this platform".to_string(),
            }),
        }
    }

    /// Returns the transport kind.
    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Pattern(_) => BackendKind::Pattern,
            Backend::Subprocess(_) => BackendKind::Subprocess,
            Backend::Tcp(_) => BackendKind::Tcp,
            #[cfg(unix)]
            Backend::Unix(_) => BackendKind::Unix,
        }
    }

    /// Returns the configured target.
    pub fn target(&self) -> &str {
        match self {
            Backend::Pattern(b) => b.expression(),
            Backend::Subprocess(b) => b.program(),
            Backend::Tcp(b) => b.target(),
            #[cfg(unix)]
            Backend::Unix(b) => b.target(),
        }
    }

    /// Returns true if exchanges must hold the scope's exchange lock.
    pub fn requires_serialization(&self) -> bool {
        matches!(self, Backend::Subprocess(_))
    }

    /// Sends one payload and returns the reply.
    ///
    /// # Examples
    ///
    /// ```
    /// use classify_relay::backend::{Backend, BackendKey, BackendKind, BackendOptions, ExchangeLock};
    ///
    /// let key = BackendKey::new(BackendKind::Pattern, "s/bot/BOT/g");
    /// let backend = Backend::open(&key, &BackendOptions::default(), &ExchangeLock::new()).unwrap();
    ///
    /// assert_eq!(backend.send("a bot, another bot").unwrap(), "a BOT, another BOT");
    /// assert!(!backend.requires_serialization());
    /// ```
    pub fn send(&self, payload: &str) -> Result<String, BackendError> {
        match self {
            Backend::Pattern(b) => Ok(b.apply(payload)),
            Backend::Subprocess(b) => b.send(payload),
            Backend::Tcp(b) => b.send(payload),
            #[cfg(unix)]
            Backend::Unix(b) => b.send(payload),
        }
    }
}

/// Creates each distinct backend once and hands out shared handles.
///
/// Owned by the scope builder during resolution; the resulting map is
/// read-only once the scope is built.
#[derive(Debug, Default)]
pub struct BackendRegistry {
    backends: HashMap<BackendKey, Arc<Backend>>,
    options: BackendOptions,
    lock: ExchangeLock,
}

impl BackendRegistry {
    /// Creates an empty registry.
    pub fn new(options: BackendOptions) -> Self {
        Self {
            backends: HashMap::new(),
            options,
            lock: ExchangeLock::new(),
        }
    }

    /// Returns the backend for `key`, opening it on first use.
    ///
    /// Failures are not cached; a later reference tries again.
    pub fn get_or_open(&mut self, key: BackendKey) -> Result<Arc<Backend>, ConfigError> {
        if let Some(backend) = self.backends.get(&key) {
            return Ok(Arc::clone(backend));
        }
        let backend = Arc::new(Backend::open(&key, &self.options, &self.lock)?);
        tracing::debug!(backend = %key, "backend opened");
        self.backends.insert(key, Arc::clone(&backend));
        Ok(backend)
    }

    /// Registers an already-built backend under `key`, replacing any other.
    pub fn insert(&mut self, key: BackendKey, backend: Backend) -> Arc<Backend> {
        let backend = Arc::new(backend);
        self.backends.insert(key, Arc::clone(&backend));
        backend
    }

    /// Returns the timeouts backends are opened with.
    pub fn options(&self) -> &BackendOptions {
        &self.options
    }

    /// Returns the scope's subprocess exchange lock.
    pub fn exchange_lock(&self) -> &ExchangeLock {
        &self.lock
    }

    /// Returns the number of distinct backends.
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Returns true if no backend has been opened.
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
