//! Human-readable commentary for a final evaluation

use crate::perspective::Perspective;

/// Prefix added when the score was damped during a trade
pub const TRADE_NOTICE: &str = "Position is in the middle of a trading sequence. ";

const NO_EVALUATION: &str = "No evaluation is available for this position.";

/// Describes an evaluation in one or two sentences.
///
/// `score` and `mate_in` are already in `perspective`, so a positive value
/// favours the first of its [`Perspective::labels`].
pub fn describe(
    score: Option<f64>,
    is_mate: bool,
    mate_in: Option<i32>,
    is_trade: bool,
    perspective: Perspective,
) -> String {
    let (ahead, behind) = perspective.labels();

    if is_mate {
        return match mate_in {
            Some(0) => "The position is checkmate.".to_string(),
            Some(n) => {
                let side = if n > 0 { ahead } else { behind };
                let moves = n.unsigned_abs();
                let unit = if moves == 1 { "move" } else { "moves" };
                format!("{} has a forced mate in {} {}.", side, moves, unit)
            }
            None => format!("{} has a forced mate.", ahead),
        };
    }

    let Some(score) = score else {
        return NO_EVALUATION.to_string();
    };

    let side = if score > 0.0 { ahead } else { behind };
    let magnitude = score.abs();
    let assessment = if magnitude < 0.5 {
        "The position is approximately equal.".to_string()
    } else if magnitude < 1.5 {
        format!("{} has a slight advantage.", side)
    } else if magnitude < 3.0 {
        format!("{} has a clear advantage.", side)
    } else {
        format!("{} has a winning position.", side)
    };

    if is_trade {
        format!("{}{}", TRADE_NOTICE, assessment)
    } else {
        assessment
    }
}
