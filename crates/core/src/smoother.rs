//! Continuity smoothing across consecutive evaluations
//!
//! During a piece exchange the engine's score swings hard for one ply and
//! swings back on the recapture. When a large jump coincides with a
//! capture-recapture at the head of the principal line, the new score is
//! blended with the session's previous one.

use shakmaty::fen::Fen;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Position};
use std::collections::HashMap;
use tracing::debug;

use crate::config::SmoothingConfig;

/// Parses a FEN into a legal standard-chess position.
pub fn parse_position(fen: &str) -> Option<Chess> {
    let parsed: Fen = fen.trim().parse().ok()?;
    parsed.into_position(CastlingMode::Standard).ok()
}

/// Whether the first two moves of `line` are a capture and a recapture.
///
/// Any parse or legality failure counts as "not a trade".
pub fn is_trade_sequence(fen: &str, line: &[String]) -> bool {
    let (Some(first), Some(second)) = (line.first(), line.get(1)) else {
        return false;
    };
    let Some(position) = parse_position(fen) else {
        return false;
    };

    let Some(capture) = legal_move(&position, first).filter(|m| m.is_capture()) else {
        return false;
    };
    let Ok(after) = position.play(capture) else {
        return false;
    };

    legal_move(&after, second).is_some_and(|m| m.is_capture())
}

fn legal_move(position: &Chess, uci: &str) -> Option<shakmaty::Move> {
    let parsed: UciMove = uci.parse().ok()?;
    parsed.to_move(position).ok()
}

/// Last raw score per session, bounded by evicting the least recently used.
#[derive(Debug)]
pub struct EvaluationHistory {
    entries: HashMap<String, (f64, u64)>,
    capacity: usize,
    clock: u64,
}

impl EvaluationHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
            clock: 0,
        }
    }

    pub fn get(&self, session: &str) -> Option<f64> {
        self.entries.get(session).map(|(score, _)| *score)
    }

    pub fn record(&mut self, session: &str, score: f64) {
        self.clock += 1;

        if !self.entries.contains_key(session) && self.entries.len() >= self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, (_, stamp))| *stamp)
                .map(|(key, _)| key.clone());
            if let Some(key) = oldest {
                debug!(session = %key, "evicting evaluation history");
                self.entries.remove(&key);
            }
        }

        self.entries.insert(session.to_string(), (score, self.clock));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Score after smoothing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Smoothed {
    pub score: f64,
    pub is_trade: bool,
}

#[derive(Debug)]
pub struct Smoother {
    config: SmoothingConfig,
    history: EvaluationHistory,
}

impl Smoother {
    pub fn new(config: SmoothingConfig) -> Self {
        let history = EvaluationHistory::new(config.history_capacity);
        Self { config, history }
    }

    /// Smooths `raw` against the session's previous score and records `raw`.
    ///
    /// Scores are White-relative so consecutive positions compare directly.
    pub fn smooth(&mut self, session: &str, raw: f64, line: &[String], fen: &str) -> Smoothed {
        let smoothed = match self.history.get(session) {
            Some(previous)
                if (raw - previous).abs() > self.config.jump_threshold
                    && is_trade_sequence(fen, line) =>
            {
                let weight = self.config.previous_weight;
                let score = weight * previous + (1.0 - weight) * raw;
                debug!(session, previous, raw, score, "damping trade swing");
                Smoothed { score, is_trade: true }
            }
            _ => Smoothed { score: raw, is_trade: false },
        };

        self.history.record(session, raw);
        smoothed
    }

    /// Last raw score recorded for a session
    pub fn previous(&self, session: &str) -> Option<f64> {
        self.history.get(session)
    }
}
