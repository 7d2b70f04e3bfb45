//! Analysis facade
//!
//! [`Analyzer`] owns the single engine session and serializes every search
//! through one async mutex. Engine failures degrade to neutral results; only
//! I/O errors reach the caller.

use shakmaty::{Color, Position};
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::analysis::{PositionEvaluation, QuickAnalysis, DEEP_LINE_LIMIT, QUICK_MOVE_LIMIT};
use crate::commentary;
use crate::config::{AnalysisConfig, Config, SmoothingConfig};
use crate::engine::{Engine, EngineError, Launcher, ProcessLauncher, RawEvaluation, SearchRequest};
use crate::error::Result;
use crate::perspective::Perspective;
use crate::smoother::{parse_position, Smoother};

/// Session key used by [`Analyzer::analyze_deep`]
pub const DEFAULT_SESSION: &str = "default";

struct State<E> {
    engine: Option<E>,
    smoother: Smoother,
    closed: bool,
}

pub struct Analyzer<L: Launcher = ProcessLauncher> {
    launcher: L,
    analysis: AnalysisConfig,
    state: Mutex<State<L::Engine>>,
    stop: watch::Sender<bool>,
}

impl Analyzer<ProcessLauncher> {
    /// Builds an analyzer that runs the configured engine binary.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            ProcessLauncher::new(config.engine.clone()),
            config.analysis.clone(),
            config.smoothing.clone(),
        )
    }
}

impl<L: Launcher> Analyzer<L> {
    pub fn new(launcher: L, analysis: AnalysisConfig, smoothing: SmoothingConfig) -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            launcher,
            analysis,
            state: Mutex::new(State {
                engine: None,
                smoother: Smoother::new(smoothing),
                closed: false,
            }),
            stop,
        }
    }

    pub fn default_depth(&self) -> u32 {
        self.analysis.default_depth
    }

    /// Launches the engine ahead of the first request.
    ///
    /// Returns whether an engine is running afterwards.
    pub async fn start(&self) -> bool {
        let mut state = self.state.lock().await;
        let running = self.ensure_engine(&mut state).await.is_some();
        if !running {
            warn!("engine unavailable at startup, will retry on first request");
        }
        running
    }

    /// Quick analysis: headline score and up to three candidate moves.
    pub async fn analyze(&self, fen: &str, depth: u32) -> Result<QuickAnalysis> {
        let searched = {
            let mut state = self.state.lock().await;
            self.search_locked(&mut state, fen, depth).await?
        };
        let Some((raw, turn)) = searched else {
            return Ok(QuickAnalysis::default());
        };

        let raw = self.analysis.perspective.orient(raw, turn);
        Ok(QuickAnalysis {
            evaluation: raw.score.unwrap_or(0.0),
            best_move: raw.best_move,
            top_moves: raw.candidates.into_iter().take(QUICK_MOVE_LIMIT).collect(),
            is_mate: raw.is_mate,
            mate_in: raw.mate_in,
        })
    }

    /// Deep analysis in the default session.
    pub async fn analyze_deep(&self, fen: &str, depth: u32) -> Result<PositionEvaluation> {
        self.analyze_deep_in(DEFAULT_SESSION, fen, depth).await
    }

    /// Deep analysis with trade smoothing against the session's last score.
    pub async fn analyze_deep_in(
        &self,
        session: &str,
        fen: &str,
        depth: u32,
    ) -> Result<PositionEvaluation> {
        let perspective = self.analysis.perspective;

        let mut state = self.state.lock().await;
        let Some((raw, turn)) = self.search_locked(&mut state, fen, depth).await? else {
            return Ok(PositionEvaluation::unavailable(perspective));
        };

        let output_sign = perspective.sign(turn);
        // Engine scores are side-to-move relative; history is kept White-relative
        let white_sign = Perspective::White.sign(turn);

        let (score, is_trade) = match raw.score {
            Some(engine_score) if !raw.is_mate => {
                let smoothed = state.smoother.smooth(
                    session,
                    engine_score * f64::from(white_sign),
                    &raw.principal_line,
                    fen.trim(),
                );
                let to_output = f64::from(white_sign * output_sign);
                (Some(smoothed.score * to_output), smoothed.is_trade)
            }
            other => (other.map(|s| s * f64::from(output_sign)), false),
        };
        drop(state);

        let mate_in = raw.mate_in.map(|n| n * output_sign);
        let evaluation = PositionEvaluation {
            score,
            best_move: raw.best_move,
            principal_line: raw.principal_line.into_iter().take(DEEP_LINE_LIMIT).collect(),
            is_mate: raw.is_mate,
            mate_in,
            commentary: commentary::describe(score, raw.is_mate, mate_in, is_trade, perspective),
            is_trade,
        };
        debug!(session, summary = %evaluation.summary(), "deep analysis complete");
        Ok(evaluation)
    }

    /// True while a search holds the engine, else whether the engine is alive.
    pub fn health_check(&self) -> bool {
        match self.state.try_lock() {
            Ok(mut state) => state.engine.as_mut().is_some_and(|engine| engine.is_alive()),
            Err(_) => true,
        }
    }

    /// Stops the engine for good. Later calls return neutral results.
    pub async fn shutdown(&self) {
        self.stop.send_replace(true);

        let mut state = self.state.lock().await;
        state.closed = true;
        if let Some(mut engine) = state.engine.take() {
            info!("stopping engine");
            engine.terminate().await;
        }
    }

    /// Returns a live engine, launching one if needed. At most one launch per call.
    async fn ensure_engine<'a>(&self, state: &'a mut State<L::Engine>) -> Option<&'a mut L::Engine> {
        if state.closed {
            return None;
        }

        let alive = state.engine.as_mut().is_some_and(|engine| engine.is_alive());
        if !alive {
            if let Some(mut dead) = state.engine.take() {
                warn!("engine is not running, restarting");
                dead.terminate().await;
            }

            match self.launcher.launch().await {
                Ok(engine) => state.engine = Some(engine),
                Err(err) => {
                    let err = EngineError::RestartExhausted(Box::new(err));
                    warn!(%err, "engine unavailable");
                    return None;
                }
            }
        }

        state.engine.as_mut()
    }

    /// Runs one search under the lock. `Ok(None)` means "answer neutrally".
    async fn search_locked(
        &self,
        state: &mut State<L::Engine>,
        fen: &str,
        depth: u32,
    ) -> Result<Option<(RawEvaluation, Color)>> {
        let Some(position) = parse_position(fen) else {
            warn!(fen, "rejecting invalid FEN");
            return Ok(None);
        };
        let turn = position.turn();
        let request = SearchRequest::new(fen.trim(), depth.min(self.analysis.max_depth).max(1));

        let Some(engine) = self.ensure_engine(state).await else {
            return Ok(None);
        };

        let limit = self.analysis.search_timeout();
        let outcome = tokio::select! {
            result = tokio::time::timeout(limit, engine.search(&request)) => {
                result.unwrap_or(Err(EngineError::ProtocolTimeout(limit)))
            }
            _ = stopped(self.stop.subscribe()) => Err(EngineError::ShuttingDown),
        };

        match outcome {
            Ok(raw) => {
                if !raw.has_evaluation() {
                    debug!(fen, best_move = %raw.best_move, "engine reported no score");
                }
                Ok(Some((raw, turn)))
            }
            Err(err) => {
                if let Some(mut engine) = state.engine.take() {
                    engine.terminate().await;
                }
                if err.is_recoverable() {
                    warn!(%err, fen, "search failed, answering neutrally");
                    Ok(None)
                } else {
                    error!(%err, fen, "search failed");
                    Err(err.into())
                }
            }
        }
    }
}

/// Resolves once shutdown has been requested.
async fn stopped(mut stop: watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopped| *stopped).await;
}
