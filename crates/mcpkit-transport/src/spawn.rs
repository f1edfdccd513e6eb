//! Subprocess transport for MCP clients.
//!
//! [`CommandTransport`] launches an MCP server as a child process and speaks
//! newline-delimited JSON over its stdin and stdout. The child's stderr is
//! inherited so server logs stay visible.
//!
//! Closing the transport shuts the child down in stages: stdin is closed,
//! the child gets a grace period to exit on its own, then it is asked to
//! terminate and given the same period again, and finally it is killed.
//!
//! # Example
//!
//! ```no_run
//! use mcpkit_transport::spawn::CommandTransport;
//!
//! # async fn example() -> Result<(), mcpkit_transport::TransportError> {
//! let transport = CommandTransport::builder("my-server")
//!     .arg("--verbose")
//!     .env("DEBUG", "1")
//!     .spawn()?;
//! # Ok(())
//! # }
//! ```

use std::ffi::OsStr;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use mcpkit_core::protocol::Message;
use tokio::process::{Child, ChildStdin, ChildStdout};
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::runtime::AsyncMutex;
use crate::stdio::IoTransport;
use crate::traits::{Transport, TransportMetadata};

/// How long a child gets to exit at each shutdown stage.
pub const DEFAULT_CLOSE_GRACE: Duration = Duration::from_secs(5);

/// A transport that communicates with a spawned child process.
pub struct CommandTransport {
    io: IoTransport<ChildStdout, ChildStdin>,
    child: AsyncMutex<Child>,
    grace: Duration,
    command: String,
}

impl CommandTransport {
    /// Spawn `program` with `args` and connect to it.
    pub fn spawn<S, I, A>(program: S, args: I) -> Result<Self, TransportError>
    where
        S: AsRef<OsStr>,
        I: IntoIterator<Item = A>,
        A: AsRef<OsStr>,
    {
        CommandTransportBuilder::new(program).args(args).spawn()
    }

    /// Create a builder for more advanced configuration.
    #[must_use]
    pub fn builder<S: AsRef<OsStr>>(program: S) -> CommandTransportBuilder {
        CommandTransportBuilder::new(program)
    }

    /// Get the process ID of the spawned child.
    ///
    /// Returns `None` if the process has already been reaped.
    pub async fn pid(&self) -> Option<u32> {
        self.child.lock().await.id()
    }

    /// Get the command line used to spawn this process.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Check if the child process is still running.
    pub async fn is_running(&self) -> bool {
        let mut child = self.child.lock().await;
        matches!(child.try_wait(), Ok(None))
    }

    /// Close the transport and wait for the child to exit.
    pub async fn shutdown(&self) -> Result<ExitStatus, TransportError> {
        self.io.close().await?;
        let mut child = self.child.lock().await;

        if let Ok(status) = tokio::time::timeout(self.grace, child.wait()).await {
            return Ok(status?);
        }

        debug!(command = %self.command, "child ignored stdin close, terminating");
        terminate(&mut child);
        if let Ok(status) = tokio::time::timeout(self.grace, child.wait()).await {
            return Ok(status?);
        }

        warn!(command = %self.command, "child ignored terminate, killing");
        child.kill().await?;
        Ok(child.wait().await?)
    }
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn terminate(child: &mut Child) {
    if let Some(pid) = child.id() {
        // SAFETY: pid names our own unreaped child, so the signal cannot hit
        // an unrelated process.
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    let _ = child.start_kill();
}

impl Transport for CommandTransport {
    type Error = TransportError;

    async fn send(&self, msg: Message) -> Result<(), Self::Error> {
        self.io.send(msg).await
    }

    async fn recv(&self) -> Result<Option<Message>, Self::Error> {
        self.io.recv().await
    }

    async fn close(&self) -> Result<(), Self::Error> {
        if !self.io.is_connected() {
            return Ok(());
        }
        let status = self.shutdown().await?;
        info!(command = %self.command, %status, "server process exited");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.io.is_connected()
    }

    fn metadata(&self) -> TransportMetadata {
        self.io.metadata()
    }
}

/// Builder for creating command transports with custom configuration.
///
/// # Example
///
/// ```no_run
/// use mcpkit_transport::spawn::CommandTransportBuilder;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), mcpkit_transport::TransportError> {
/// let transport = CommandTransportBuilder::new("my-server")
///     .arg("--config")
///     .arg("config.json")
///     .env("LOG_LEVEL", "debug")
///     .working_dir("/path/to/server")
///     .close_grace(Duration::from_secs(1))
///     .spawn()?;
/// # Ok(())
/// # }
/// ```
pub struct CommandTransportBuilder {
    program: PathBuf,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    current_dir: Option<PathBuf>,
    clear_env: bool,
    grace: Duration,
    batch_size: usize,
}

impl CommandTransportBuilder {
    /// Create a new builder for the given program.
    #[must_use]
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self {
            program: PathBuf::from(program.as_ref()),
            args: Vec::new(),
            envs: Vec::new(),
            current_dir: None,
            clear_env: false,
            grace: DEFAULT_CLOSE_GRACE,
            batch_size: 0,
        }
    }

    /// Add a single argument.
    #[must_use]
    pub fn arg<S: AsRef<str>>(mut self, arg: S) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    /// Add multiple arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(
            args.into_iter()
                .map(|s| s.as_ref().to_string_lossy().into_owned()),
        );
        self
    }

    /// Set an environment variable.
    #[must_use]
    pub fn env<K: AsRef<str>, V: AsRef<str>>(mut self, key: K, value: V) -> Self {
        self.envs
            .push((key.as_ref().to_string(), value.as_ref().to_string()));
        self
    }

    /// Set the working directory for the child process.
    #[must_use]
    pub fn working_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Clear the inherited environment before adding new variables.
    #[must_use]
    pub const fn clear_env(mut self) -> Self {
        self.clear_env = true;
        self
    }

    /// Set how long the child gets to exit at each shutdown stage.
    #[must_use]
    pub const fn close_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Batch outgoing requests and notifications (see [`IoTransport`]).
    #[must_use]
    pub const fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Spawn the process and create the transport.
    pub fn spawn(self) -> Result<CommandTransport, TransportError> {
        let mut command = tokio::process::Command::new(&self.program);

        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        if self.clear_env {
            command.env_clear();
        }
        for (key, value) in &self.envs {
            command.env(key, value);
        }
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| {
            TransportError::connection(format!(
                "Failed to spawn process '{}': {e}",
                self.program.display()
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::connection("Failed to capture child stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::connection("Failed to capture child stdout"))?;

        let pid = child
            .id()
            .map_or_else(|| "unknown".to_string(), |id| id.to_string());
        let command_str = format!("{} {}", self.program.display(), self.args.join(" "));
        debug!(command = %command_str, pid = %pid, "spawned server process");

        let io = IoTransport::new(stdout, stdin)
            .with_batch_size(self.batch_size)
            .with_metadata(
                TransportMetadata::new("command")
                    .remote_addr(format!("pid:{pid}"))
                    .local_addr("parent")
                    .connected_now(),
            );

        Ok(CommandTransport {
            io,
            child: AsyncMutex::new(child),
            grace: self.grace,
            command: command_str,
        })
    }
}
