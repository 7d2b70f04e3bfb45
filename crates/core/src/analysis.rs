//! Types for representing analysis results

use serde::Serialize;
use std::fmt;

use crate::commentary;
use crate::perspective::Perspective;

/// Candidate moves reported by a quick analysis
pub const QUICK_MOVE_LIMIT: usize = 3;
/// Moves of the principal line reported by a deep analysis
pub const DEEP_LINE_LIMIT: usize = 5;

/// First move of one ranked engine line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    /// The move in UCI notation (e.g., "e2e4")
    #[serde(rename = "move")]
    pub mv: String,
    /// Pawn units, absent for mating lines
    pub evaluation: Option<f64>,
    pub mate_in: Option<i32>,
}

/// Result of a quick analysis
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QuickAnalysis {
    /// Pawn units; `0.0` when the engine gave no score
    pub evaluation: f64,
    pub best_move: String,
    pub top_moves: Vec<Candidate>,
    pub is_mate: bool,
    pub mate_in: Option<i32>,
}

/// Result of a deep analysis
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionEvaluation {
    /// Pawn units after trade smoothing; `None` when no evaluation exists
    #[serde(rename = "evaluation")]
    pub score: Option<f64>,
    pub best_move: String,
    /// Principal variation (best line of play)
    #[serde(rename = "best_line")]
    pub principal_line: Vec<String>,
    pub is_mate: bool,
    pub mate_in: Option<i32>,
    #[serde(rename = "comment")]
    pub commentary: String,
    pub is_trade: bool,
}

impl PositionEvaluation {
    /// The neutral answer given when no engine result is available.
    pub fn unavailable(perspective: Perspective) -> Self {
        Self {
            score: None,
            best_move: String::new(),
            principal_line: Vec::new(),
            is_mate: false,
            mate_in: None,
            commentary: commentary::describe(None, false, None, false, perspective),
            is_trade: false,
        }
    }

    /// Returns a brief summary of the analysis
    pub fn summary(&self) -> String {
        format!(
            "Eval: {} | Best: {} | PV: {}",
            self,
            if self.best_move.is_empty() { "-" } else { &self.best_move },
            self.principal_line.join(" ")
        )
    }
}

impl fmt::Display for PositionEvaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.is_mate, self.mate_in, self.score) {
            (true, Some(moves), _) => write!(f, "M{}", moves),
            (_, _, Some(score)) if score >= 0.0 => write!(f, "+{:.2}", score),
            (_, _, Some(score)) => write!(f, "{:.2}", score),
            _ => write!(f, "?"),
        }
    }
}
