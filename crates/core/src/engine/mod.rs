//! Chess engine integration
//!
//! Drives a UCI engine such as Stockfish: process lifecycle in [`process`],
//! the line protocol in [`protocol`], and the pure reduction of engine output
//! into an evaluation in [`interpreter`].

pub mod interpreter;
pub mod process;
pub mod protocol;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use interpreter::{interpret, Interpreter, RawEvaluation};
pub use process::{resolve_binary, ProcessEngine, ProcessLauncher};
pub use protocol::{classify_line, Bound, EngineEvent, Search, UciChannel};

/// Error type for engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// The configured path does not resolve to an executable
    #[error("Engine binary not found: {0}")]
    BinaryNotFound(String),
    /// The process could not be created, or died during startup
    #[error("Failed to launch engine: {0}")]
    LaunchFailed(String),
    /// The engine did not reach the expected marker in time
    #[error("Engine did not answer within {0:?}")]
    ProtocolTimeout(Duration),
    /// A line that should carry a score or move could not be parsed
    #[error("Malformed engine output: {0}")]
    MalformedOutput(String),
    /// A dead engine could not be brought back
    #[error("Engine could not be restarted: {0}")]
    RestartExhausted(#[source] Box<EngineError>),
    /// The engine closed its output stream
    #[error("Engine closed its output stream")]
    Disconnected,
    /// The analyzer is shutting down and abandoned the search
    #[error("Engine is shutting down")]
    ShuttingDown,
    /// Reading from or writing to the engine failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Whether the analyzer may answer with a neutral result instead of failing.
    ///
    /// Only raw I/O failures are surfaced to callers.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, EngineError::Io(_))
    }
}

/// One search: a position and how deep to look.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    fen: String,
    depth: u32,
}

impl SearchRequest {
    /// Creates a request. A depth of zero is raised to one.
    pub fn new(fen: impl Into<String>, depth: u32) -> Self {
        Self {
            fen: fen.into(),
            depth: depth.max(1),
        }
    }

    pub fn fen(&self) -> &str {
        &self.fen
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }
}

/// A running engine session the analyzer can search with.
#[async_trait]
pub trait Engine: Send {
    /// Whether the underlying engine can still take commands.
    fn is_alive(&mut self) -> bool;

    /// Runs one search to completion and interprets its output.
    async fn search(&mut self, request: &SearchRequest) -> Result<RawEvaluation, EngineError>;

    /// Stops the engine. Safe to call on an engine that already exited.
    async fn terminate(&mut self);
}

/// Creates ready-to-search engine sessions (process start plus handshake).
#[async_trait]
pub trait Launcher: Send + Sync {
    type Engine: Engine;

    async fn launch(&self) -> Result<Self::Engine, EngineError>;
}
