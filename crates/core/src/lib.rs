//! Chess Evaluation Core Library
//!
//! Drives a UCI engine and turns its output into evaluations with
//! commentary. [`Analyzer`] is the entry point.

pub mod analysis;
pub mod analyzer;
pub mod commentary;
pub mod config;
pub mod engine;
pub mod error;
pub mod perspective;
pub mod smoother;

pub use analysis::{Candidate, PositionEvaluation, QuickAnalysis};
pub use analyzer::{Analyzer, DEFAULT_SESSION};
pub use config::Config;
pub use engine::{Engine, EngineError, Launcher, ProcessLauncher, RawEvaluation, SearchRequest};
pub use error::{Error, Result};
pub use perspective::Perspective;
