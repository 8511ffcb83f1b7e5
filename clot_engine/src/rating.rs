//! Elo-style rating calculator.
//!
//! Ratings are whole numbers. Updates are computed in floating point and
//! truncated toward zero when stored, so a 1000 vs 1000 result moves the
//! winner to 1016 and the loser to 984 with the default K-factor.

/// Default K-factor applied to every rated result.
pub const DEFAULT_K_FACTOR: f64 = 32.0;

/// Rating given to a team that has never played.
pub const DEFAULT_INITIAL_RATING: i32 = 1000;

/// Expected score of `rating_a` against `rating_b`.
///
/// `expected_score(a, b) + expected_score(b, a)` is always 1.
pub fn expected_score(rating_a: i32, rating_b: i32) -> f64 {
    let diff = f64::from(rating_b) - f64::from(rating_a);
    1.0 / (1.0 + 10f64.powf(diff / 400.0))
}

/// New rating given the old rating, the expected score and the actual score.
///
/// # Arguments
///
/// * `old` - Rating before the result
/// * `expected` - Output of [`expected_score`] against the opponent
/// * `actual` - 1.0 for a win, 0.0 for a loss
/// * `k_factor` - Maximum swing of a single result
pub fn new_rating(old: i32, expected: f64, actual: f64, k_factor: f64) -> f64 {
    f64::from(old) + k_factor * (actual - expected)
}

/// Outcome of a rated result, both sides computed from pre-update ratings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatingChange {
    pub winner: i32,
    pub loser: i32,
}

/// Applies one decided result to both ratings simultaneously.
///
/// Both new ratings are derived from the ratings captured before either side
/// is mutated.
pub fn rate_result(winner: i32, loser: i32, k_factor: f64) -> RatingChange {
    let winner_expected = expected_score(winner, loser);
    let loser_expected = expected_score(loser, winner);

    RatingChange {
        winner: new_rating(winner, winner_expected, 1.0, k_factor) as i32,
        loser: new_rating(loser, loser_expected, 0.0, k_factor) as i32,
    }
}
