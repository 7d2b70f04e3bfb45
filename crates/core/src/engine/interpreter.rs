//! Reduction of one search's events into an evaluation
//!
//! The interpreter does no I/O: it is fed [`EngineEvent`]s and keeps the
//! running state of the search. Quick and deep analysis share it.

use std::collections::BTreeMap;
use std::ops::ControlFlow;

use super::protocol::EngineEvent;
use crate::analysis::Candidate;

/// What one search produced, in the engine's own score convention.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEvaluation {
    /// Pawn units; `None` when the engine never reported an exact score
    pub score: Option<f64>,
    pub is_mate: bool,
    pub mate_in: Option<i32>,
    /// Empty when the engine had no move (mate or stalemate on the board)
    pub best_move: String,
    pub principal_line: Vec<String>,
    /// First move of each ranked line, best first
    pub candidates: Vec<Candidate>,
}

impl RawEvaluation {
    /// Whether any score or mate was observed.
    pub fn has_evaluation(&self) -> bool {
        self.score.is_some() || self.is_mate
    }
}

#[derive(Debug, Clone, Copy)]
enum LineScore {
    Pawns(f64),
    Mate(i32),
}

/// Running state of one search.
#[derive(Debug, Default)]
pub struct Interpreter {
    score: Option<f64>,
    is_mate: bool,
    mate_in: Option<i32>,
    best_move: Option<String>,
    principal_line: Vec<String>,
    line_scores: BTreeMap<u32, LineScore>,
    candidates: BTreeMap<u32, Candidate>,
    done: bool,
}

impl Interpreter {
    /// Applies one event. Breaks once the best move has been seen.
    pub fn apply(&mut self, event: EngineEvent) -> ControlFlow<()> {
        if self.done {
            return ControlFlow::Break(());
        }

        match event {
            // Bounded scores are provisional
            EngineEvent::ScoreCentipawns { bound: Some(_), .. } => {}
            EngineEvent::ScoreCentipawns { rank, value, bound: None } => {
                let pawns = f64::from(value) / 100.0;
                self.line_scores.insert(rank, LineScore::Pawns(pawns));
                if rank == 1 {
                    self.score = Some(pawns);
                }
            }
            EngineEvent::ScoreMate { rank, mate_in } => {
                self.line_scores.insert(rank, LineScore::Mate(mate_in));
                if rank == 1 {
                    self.is_mate = true;
                    self.mate_in = Some(mate_in);
                }
            }
            EngineEvent::PrincipalVariation { rank, moves } => {
                let Some(first) = moves.first() else {
                    return ControlFlow::Continue(());
                };

                let (evaluation, mate_in) = match self.line_scores.get(&rank) {
                    Some(LineScore::Pawns(pawns)) => (Some(*pawns), None),
                    Some(LineScore::Mate(n)) => (None, Some(*n)),
                    None => (None, None),
                };
                self.candidates.insert(
                    rank,
                    Candidate {
                        mv: first.clone(),
                        evaluation,
                        mate_in,
                    },
                );

                if rank == 1 {
                    // Estimate until bestmove arrives; tracks the deepest line
                    self.best_move = Some(first.clone());
                    self.principal_line = moves;
                }
            }
            EngineEvent::BestMove(mv) => {
                if self.best_move.is_none() {
                    self.best_move = mv;
                }
                self.done = true;
                return ControlFlow::Break(());
            }
            EngineEvent::Other => {}
        }

        ControlFlow::Continue(())
    }

    pub fn finish(self) -> RawEvaluation {
        RawEvaluation {
            score: self.score,
            is_mate: self.is_mate,
            mate_in: self.mate_in,
            best_move: self.best_move.unwrap_or_default(),
            principal_line: self.principal_line,
            candidates: self.candidates.into_values().collect(),
        }
    }
}

/// Runs a whole event sequence through a fresh interpreter.
pub fn interpret<I>(events: I) -> RawEvaluation
where
    I: IntoIterator<Item = EngineEvent>,
{
    let mut interpreter = Interpreter::default();
    for event in events {
        if interpreter.apply(event).is_break() {
            break;
        }
    }
    interpreter.finish()
}
