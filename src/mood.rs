// Dominant mood extraction from expression scores

use crate::models::{Expression, ExpressionScores};
use serde::{Deserialize, Serialize};

/// Which label wins when two expressions share the highest score
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// The label enumerated first keeps the lead
    #[default]
    PreferEarlier,
    /// A later label with an equal score takes the lead
    PreferLater,
}

/// Returns the expression with the highest score.
///
/// Scans in enumeration order keeping a running best. NaN scores are
/// skipped. Returns `None` when no score is usable.
pub fn dominant_mood(scores: &ExpressionScores, tie_break: TieBreak) -> Option<Expression> {
    let mut best: Option<(Expression, f32)> = None;

    for (expression, score) in scores.iter() {
        if score.is_nan() {
            continue;
        }
        let replace = match best {
            None => true,
            Some((_, best_score)) => match tie_break {
                TieBreak::PreferEarlier => score > best_score,
                TieBreak::PreferLater => score >= best_score,
            },
        };
        if replace {
            best = Some((expression, score));
        }
    }

    best.map(|(expression, _)| expression)
}
