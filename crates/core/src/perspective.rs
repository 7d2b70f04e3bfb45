//! Score orientation
//!
//! UCI engines report every score from the side to move. A [`Perspective`]
//! decides whose point of view the analyzer reports instead.

use serde::{Deserialize, Serialize};
use shakmaty::Color;

use crate::engine::RawEvaluation;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Perspective {
    /// Positive scores favour White, whoever is to move
    #[default]
    White,
    /// Positive scores favour the side to move (the engine's own convention)
    SideToMove,
}

impl Perspective {
    /// Factor that turns an engine score into this perspective.
    pub fn sign(self, turn: Color) -> i32 {
        match (self, turn) {
            (Perspective::White, Color::Black) => -1,
            _ => 1,
        }
    }

    /// Names for the side a positive score favours, and its opponent.
    pub fn labels(self) -> (&'static str, &'static str) {
        match self {
            Perspective::White => ("White", "Black"),
            Perspective::SideToMove => ("The side to move", "The opponent"),
        }
    }

    /// Re-orients every score and mate count of an engine evaluation.
    pub fn orient(self, mut raw: RawEvaluation, turn: Color) -> RawEvaluation {
        if self.sign(turn) == 1 {
            return raw;
        }

        raw.score = raw.score.map(|s| -s);
        raw.mate_in = raw.mate_in.map(|n| -n);
        for candidate in &mut raw.candidates {
            candidate.evaluation = candidate.evaluation.map(|s| -s);
            candidate.mate_in = candidate.mate_in.map(|n| -n);
        }
        raw
    }
}
