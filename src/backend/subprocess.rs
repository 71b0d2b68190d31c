use std::fmt;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::Duration;

use parking_lot::Mutex;

use super::ExchangeLock;
use crate::error::{BackendError, BackendErrorKind, ConfigError};

/// Size of each read from a child's stdout.
const READ_CHUNK: usize = 1024;

/// A line-oriented, bidirectional byte stream to a long-lived peer.
///
/// [`ChildChannel`] is the production implementation. Tests substitute
/// their own to observe exchanges.
pub trait LineChannel: Send {
    /// Writes `line` followed by a newline and flushes.
    fn write_line(&mut self, line: &str) -> io::Result<()>;

    /// Reads up to and including the next newline.
    ///
    /// Returns `Ok(None)` once the peer has closed its end.
    fn read_line(&mut self) -> io::Result<Option<String>>;
}

/// A child process with piped stdin and stdout.
///
/// The child is killed when the channel is dropped.
pub struct ChildChannel {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl ChildChannel {
    /// Starts `program` in its own directory.
    pub fn spawn(program: &str) -> io::Result<Self> {
        let mut command = Command::new(program);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        if let Some(dir) = Path::new(program).parent().filter(|d| !d.as_os_str().is_empty()) {
            command.current_dir(dir);
        }

        let mut child = command.spawn()?;
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "child stdio not captured"));
        };
        Ok(Self {
            child,
            stdin,
            stdout: BufReader::with_capacity(READ_CHUNK, stdout),
        })
    }

    /// Returns the operating-system process id.
    pub fn id(&self) -> u32 {
        self.child.id()
    }
}

impl LineChannel for ChildChannel {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.stdin.write_all(line.as_bytes())?;
        self.stdin.write_all(b"\n")?;
        self.stdin.flush()
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        match self.stdout.read_line(&mut line)? {
            0 => Ok(None),
            _ => Ok(Some(line)),
        }
    }
}

impl Drop for ChildChannel {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl fmt::Debug for ChildChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildChannel")
            .field("pid", &self.child.id())
            .finish()
    }
}

/// A long-lived program answering one line per line.
///
/// Every exchange holds the scope's [`ExchangeLock`] from write to read, so
/// replies cannot be handed to the wrong caller. Once the program closes
/// its stdout or a write fails, the channel is dropped and further sends
/// fail with [`BackendErrorKind::NotStarted`].
pub struct SubprocessBackend {
    program: String,
    channel: Mutex<Option<Box<dyn LineChannel>>>,
    lock: ExchangeLock,
    lock_timeout: Duration,
}

impl SubprocessBackend {
    /// Starts `program`.
    pub fn spawn(program: &str, lock: ExchangeLock, lock_timeout: Duration) -> Result<Self, ConfigError> {
        let channel = ChildChannel::spawn(program).map_err(|e| ConfigError::SpawnFailed {
            program: program.to_string(),
            reason: e.to_string(),
        })?;
        tracing::info!(program, pid = channel.id(), "started subprocess backend");
        Ok(Self::with_channel(program, Box::new(channel), lock, lock_timeout))
    }

    /// Wraps an existing channel.
    pub fn with_channel(
        program: impl Into<String>,
        channel: Box<dyn LineChannel>,
        lock: ExchangeLock,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            channel: Mutex::new(Some(channel)),
            lock,
            lock_timeout,
        }
    }

    /// Returns the program path.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Returns false once the program has gone away.
    pub fn is_alive(&self) -> bool {
        self.channel.lock().is_some()
    }

    /// Writes `payload` and waits for the program's reply line.
    ///
    /// The trailing line ending is stripped from the reply.
    pub fn send(&self, payload: &str) -> Result<String, BackendError> {
        if payload.contains('\n') {
            return Err(BackendError::new(
                BackendErrorKind::EmbeddedNewline,
                format!("payload for {} contains a newline", self.program),
            ));
        }

        let _exchange = self.lock.acquire(self.lock_timeout).ok_or_else(|| {
            BackendError::new(
                BackendErrorKind::Lock,
                format!("exchange lock not acquired within {:?}", self.lock_timeout),
            )
        })?;
        let mut slot = self.channel.lock();
        let Some(channel) = slot.as_mut() else {
            return Err(BackendError::new(
                BackendErrorKind::NotStarted,
                format!("{} is not running", self.program),
            ));
        };

        if let Err(e) = channel.write_line(payload) {
            *slot = None;
            return Err(BackendError::new(
                BackendErrorKind::Send,
                format!("write to {} failed: {}", self.program, e),
            ));
        }
        match channel.read_line() {
            Ok(Some(line)) => Ok(line.trim_end_matches(&['\r', '\n'][..]).to_string()),
            Ok(None) => {
                *slot = None;
                Err(BackendError::new(
                    BackendErrorKind::Closed,
                    format!("{} closed its output", self.program),
                ))
            }
            Err(e) => Err(BackendError::new(
                BackendErrorKind::Receive,
                format!("read from {} failed: {}", self.program, e),
            )),
        }
    }
}

impl fmt::Debug for SubprocessBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubprocessBackend")
            .field("program", &self.program)
            .field("lock_timeout", &self.lock_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// Replays canned replies and records what was written.
    struct Scripted {
        replies: VecDeque<io::Result<Option<String>>>,
        written: Arc<Mutex<Vec<String>>>,
    }

    impl LineChannel for Scripted {
        fn write_line(&mut self, line: &str) -> io::Result<()> {
            self.written.lock().push(line.to_string());
            Ok(())
        }

        fn read_line(&mut self) -> io::Result<Option<String>> {
            self.replies.pop_front().unwrap_or(Ok(None))
        }
    }

    fn scripted(replies: Vec<io::Result<Option<String>>>) -> (SubprocessBackend, Arc<Mutex<Vec<String>>>) {
        let written = Arc::new(Mutex::new(Vec::new()));
        let channel = Scripted {
            replies: replies.into(),
            written: Arc::clone(&written),
        };
        let backend = SubprocessBackend::with_channel(
            "scripted",
            Box::new(channel),
            ExchangeLock::new(),
            Duration::from_millis(50),
        );
        (backend, written)
    }

    #[test]
    fn strips_line_endings() {
        let (backend, written) = scripted(vec![Ok(Some("bot\r\n".to_string())), Ok(Some("human\n".to_string()))]);
        assert_eq!(backend.send("one").unwrap(), "bot");
        assert_eq!(backend.send("two").unwrap(), "human");
        assert_eq!(*written.lock(), vec!["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn newline_payload_never_reaches_channel() {
        let (backend, written) = scripted(vec![Ok(Some("x\n".to_string()))]);
        let err = backend.send("a\nb").unwrap_err();
        assert_eq!(err.kind(), BackendErrorKind::EmbeddedNewline);
        assert!(written.lock().is_empty());
    }

    #[test]
    fn closed_output_retires_channel() {
        let (backend, _) = scripted(vec![Ok(None)]);
        assert_eq!(backend.send("x").unwrap_err().kind(), BackendErrorKind::Closed);
        assert!(!backend.is_alive());
        assert_eq!(backend.send("x").unwrap_err().kind(), BackendErrorKind::NotStarted);
    }

    #[test]
    fn read_errors_keep_channel() {
        let (backend, _) = scripted(vec![
            Err(io::Error::new(io::ErrorKind::Interrupted, "signal")),
            Ok(Some("ok\n".to_string())),
        ]);
        assert_eq!(backend.send("x").unwrap_err().kind(), BackendErrorKind::Receive);
        assert_eq!(backend.send("y").unwrap(), "ok");
    }

    #[test]
    fn held_lock_times_out() {
        let (backend, written) = scripted(vec![Ok(Some("x\n".to_string()))]);
        let _held = backend.lock.acquire(Duration::from_millis(10)).unwrap();
        assert_eq!(backend.send("x").unwrap_err().kind(), BackendErrorKind::Lock);
        assert!(written.lock().is_empty());
    }

    #[test]
    fn spawn_failure_is_config_error() {
        let err = SubprocessBackend::spawn(
            "/nonexistent/classifier-binary",
            ExchangeLock::new(),
            Duration::from_millis(10),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::SpawnFailed { .. }));
    }
}
