//! Configuration loading
//!
//! Settings come from a TOML file with four optional sections. Every field has
//! a default, so an empty file (or no file at all) is a valid configuration.
//!
//! ```toml
//! [engine]
//! path = "/usr/local/bin/stockfish"
//! threads = 2
//! hash_mb = 128
//! multi_pv = 3
//!
//! [analysis]
//! perspective = "white"
//! default_depth = 20
//!
//! [smoothing]
//! jump_threshold = 2.5
//!
//! [server]
//! bind = "127.0.0.1:8000"
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::perspective::Perspective;

/// Overrides the engine binary path.
pub const ENGINE_PATH_VAR: &str = "CHESS_EVAL_ENGINE";
/// Overrides the server bind address.
pub const BIND_VAR: &str = "CHESS_EVAL_BIND";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub analysis: AnalysisConfig,
    pub smoothing: SmoothingConfig,
    pub server: ServerConfig,
}

/// How to launch and configure the engine process
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Path to the engine binary, or a bare name looked up on `PATH`
    pub path: PathBuf,
    pub threads: u32,
    pub hash_mb: u32,
    /// Number of ranked lines the engine reports per search
    pub multi_pv: u32,
    pub analyse_mode: bool,
    pub handshake_timeout_secs: u64,
    /// How long `quit` may take before the process is killed
    pub quit_grace_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("stockfish"),
            threads: 2,
            hash_mb: 128,
            multi_pv: 3,
            analyse_mode: true,
            handshake_timeout_secs: 10,
            quit_grace_ms: 2000,
        }
    }
}

impl EngineConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn quit_grace(&self) -> Duration {
        Duration::from_millis(self.quit_grace_ms)
    }

    /// `setoption` pairs sent once during the startup handshake
    pub fn options(&self) -> Vec<(&'static str, String)> {
        vec![
            ("MultiPV", self.multi_pv.to_string()),
            ("Threads", self.threads.to_string()),
            ("Hash", self.hash_mb.to_string()),
            ("UCI_AnalyseMode", self.analyse_mode.to_string()),
        ]
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub perspective: Perspective,
    pub default_depth: u32,
    pub max_depth: u32,
    /// Upper bound on one search, from `go` to `bestmove`
    pub search_timeout_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            perspective: Perspective::White,
            default_depth: 20,
            max_depth: 60,
            search_timeout_secs: 120,
        }
    }
}

impl AnalysisConfig {
    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Pawn-unit swing above which a trade check is made
    pub jump_threshold: f64,
    /// Weight of the previous score when a trade is damped
    pub previous_weight: f64,
    /// Sessions remembered before the oldest is evicted
    pub history_capacity: usize,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            jump_threshold: 2.5,
            previous_weight: 0.7,
            history_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
        }
    }
}

impl Config {
    /// Reads and validates a TOML file, then applies environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml(&text)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file means defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) if p.exists() => Self::load(p),
            _ => {
                let mut config = Self::default();
                config.apply_overrides(|key| std::env::var(key).ok());
                config.validate()?;
                Ok(config)
            }
        }
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `CHESS_EVAL_*` overrides through the given lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENGINE_PATH_VAR).filter(|p| !p.trim().is_empty()) {
            self.engine.path = PathBuf::from(path);
        }
        if let Some(bind) = lookup(BIND_VAR).filter(|b| !b.trim().is_empty()) {
            self.server.bind = bind;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.engine.multi_pv == 0 {
            return Err(Error::Config("engine.multi_pv must be at least 1".into()));
        }
        if self.analysis.default_depth == 0 {
            return Err(Error::Config("analysis.default_depth must be at least 1".into()));
        }
        if self.analysis.max_depth < self.analysis.default_depth {
            return Err(Error::Config(format!(
                "analysis.max_depth ({}) is below default_depth ({})",
                self.analysis.max_depth, self.analysis.default_depth
            )));
        }
        if !(0.0..=1.0).contains(&self.smoothing.previous_weight) {
            return Err(Error::Config("smoothing.previous_weight must be within 0..=1".into()));
        }
        if self.smoothing.jump_threshold.is_nan() || self.smoothing.jump_threshold < 0.0 {
            return Err(Error::Config("smoothing.jump_threshold must be non-negative".into()));
        }
        if self.smoothing.history_capacity == 0 {
            return Err(Error::Config("smoothing.history_capacity must be at least 1".into()));
        }
        Ok(())
    }
}
