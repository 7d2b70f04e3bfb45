//! Engine process supervision
//!
//! Spawns a UCI engine (Stockfish or compatible) as a subprocess and owns its
//! standard streams for the lifetime of the session.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::interpreter::RawEvaluation;
use super::protocol::UciChannel;
use super::{Engine, EngineError, Launcher, SearchRequest};
use crate::config::EngineConfig;

/// Resolves the configured engine path to an executable file.
///
/// A path with a directory part must point at an executable; a bare name is
/// looked up on `PATH`.
pub fn resolve_binary(path: &Path) -> Result<PathBuf, EngineError> {
    let not_found = || EngineError::BinaryNotFound(path.display().to_string());

    if path.as_os_str().is_empty() {
        return Err(not_found());
    }

    if path.is_absolute() || path.components().count() > 1 {
        return if is_executable(path) {
            Ok(path.to_path_buf())
        } else {
            Err(not_found())
        };
    }

    let search_path = std::env::var_os("PATH").ok_or_else(not_found)?;
    std::env::split_paths(&search_path)
        .flat_map(|dir| {
            let plain = dir.join(path);
            let with_suffix = dir.join(format!(
                "{}{}",
                path.display(),
                std::env::consts::EXE_SUFFIX
            ));
            [plain, with_suffix]
        })
        .find(|candidate| is_executable(candidate))
        .ok_or_else(not_found)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// A running engine process and the UCI channel over its pipes
pub struct ProcessEngine {
    child: Child,
    channel: UciChannel<BufReader<ChildStdout>, ChildStdin>,
    stderr_task: Option<JoinHandle<()>>,
    quit_grace: Duration,
    name: String,
}

impl ProcessEngine {
    /// Spawns the engine. No UCI commands are sent yet.
    pub async fn start(config: &EngineConfig) -> Result<Self, EngineError> {
        let binary = resolve_binary(&config.path)?;
        info!(path = %binary.display(), "starting engine");

        let mut child = Command::new(&binary)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::LaunchFailed(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::LaunchFailed("Failed to open stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::LaunchFailed("Failed to open stdout".into()))?;
        let stderr_task = child.stderr.take().map(|stderr| tokio::spawn(drain_stderr(stderr)));

        if let Some(status) = child.try_wait()? {
            return Err(EngineError::LaunchFailed(format!(
                "engine exited immediately ({})",
                status
            )));
        }

        Ok(Self {
            child,
            channel: UciChannel::new(BufReader::new(stdout), stdin),
            stderr_task,
            quit_grace: config.quit_grace(),
            name: String::new(),
        })
    }

    /// Name reported during the handshake
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Operating system process id, while the process is running
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Sends a command, or silently drops it if the process has exited.
    pub async fn send_command(&mut self, command: &str) -> Result<(), EngineError> {
        if !self.is_alive() {
            debug!(command, "engine not running, command dropped");
            return Ok(());
        }
        self.channel.send_command(command).await
    }
}

/// Forwards engine stderr to the log so the pipe never fills up.
async fn drain_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: "engine_stderr", "{}", line);
    }
}

#[async_trait]
impl Engine for ProcessEngine {
    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    async fn search(&mut self, request: &SearchRequest) -> Result<RawEvaluation, EngineError> {
        if !self.is_alive() {
            return Err(EngineError::Disconnected);
        }
        let search = self.channel.run_search(request).await?;
        search.evaluate().await
    }

    async fn terminate(&mut self) {
        if self.is_alive() {
            if let Err(err) = self.send_command("quit").await {
                debug!(%err, "quit not delivered");
            }

            match tokio::time::timeout(self.quit_grace, self.child.wait()).await {
                Ok(Ok(status)) => info!(%status, "engine exited"),
                Ok(Err(err)) => warn!(%err, "failed waiting for engine"),
                Err(_) => {
                    warn!(grace = ?self.quit_grace, "engine ignored quit, killing it");
                    if let Err(err) = self.child.kill().await {
                        warn!(%err, "failed to kill engine");
                    }
                }
            }
        }

        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

/// Starts engine processes and runs the startup handshake on them.
pub struct ProcessLauncher {
    config: EngineConfig,
}

impl ProcessLauncher {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Launcher for ProcessLauncher {
    type Engine = ProcessEngine;

    async fn launch(&self) -> Result<ProcessEngine, EngineError> {
        let mut engine = ProcessEngine::start(&self.config).await?;

        let limit = self.config.handshake_timeout();
        let options = self.config.options();
        let handshake = tokio::time::timeout(limit, engine.channel.handshake(&options)).await;

        let result = match handshake {
            Ok(Ok(name)) => Ok(name),
            Ok(Err(EngineError::Disconnected)) => Err(EngineError::LaunchFailed(
                "engine exited during handshake".into(),
            )),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(EngineError::ProtocolTimeout(limit)),
        };

        match result {
            Ok(name) => {
                info!(engine = %name, pid = ?engine.id(), "engine ready");
                engine.name = name;
                Ok(engine)
            }
            Err(err) => {
                engine.terminate().await;
                Err(err)
            }
        }
    }
}
