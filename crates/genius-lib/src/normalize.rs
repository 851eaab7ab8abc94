//! Min-max normalization of one cycle's raw scores

use crate::score::RawScore;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_SCORE: u64 = 100;

/// Integer score handed back to the host scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeScore {
    pub node_name: String,
    pub score: u64,
}

/// Rescale raw scores linearly into `[0, max_score]`
///
/// The lowest raw score maps to 0 and the highest to `max_score`. When every
/// score is equal, including a single candidate, all map to `max_score`.
/// Input order is preserved.
pub fn normalize_scores(raw: &[RawScore], max_score: u64) -> Vec<NodeScore> {
    let values: Vec<f64> = raw.iter().map(|r| finite_or_zero(r.score)).collect();
    normalize_values(&values, max_score)
        .into_iter()
        .zip(raw)
        .map(|(score, r)| NodeScore {
            node_name: r.node_name.clone(),
            score,
        })
        .collect()
}

/// Same as [`normalize_scores`] over bare values
pub fn normalize_values(values: &[f64], max_score: u64) -> Vec<u64> {
    let Some(min) = values.iter().copied().reduce(f64::min) else {
        return Vec::new();
    };
    let max = values.iter().copied().fold(min, f64::max);
    let range = max - min;

    if range <= 0.0 {
        return vec![max_score; values.len()];
    }

    let scale = max_score as f64;
    values
        .iter()
        .map(|v| {
            let scaled = ((v - min) * scale / range).round();
            (scaled.max(0.0) as u64).min(max_score)
        })
        .collect()
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::ScoreBreakdown;

    fn raw(node: &str, score: f64) -> RawScore {
        RawScore {
            node_name: node.to_string(),
            score,
            breakdown: ScoreBreakdown::default(),
        }
    }

    #[test]
    fn test_two_candidates() {
        let scores = normalize_scores(&[raw("a", 10.0), raw("b", 30.0)], 100);
        assert_eq!(scores[0], NodeScore { node_name: "a".into(), score: 0 });
        assert_eq!(scores[1], NodeScore { node_name: "b".into(), score: 100 });
    }

    #[test]
    fn test_bounds_hold() {
        let values = [3.2, 17.9, 4.4, 11.0, 17.9, 3.2001];
        let scores = normalize_values(&values, 100);

        assert_eq!(scores.iter().copied().max(), Some(100));
        assert_eq!(scores.iter().copied().min(), Some(0));
        assert!(scores.iter().all(|s| *s <= 100));
    }

    #[test]
    fn test_midpoint_rounds() {
        assert_eq!(normalize_values(&[0.0, 5.0, 10.0], 100), vec![0, 50, 100]);
        assert_eq!(normalize_values(&[0.0, 1.0, 3.0], 10), vec![0, 3, 10]);
    }

    #[test]
    fn test_equal_scores_are_maximal() {
        assert_eq!(normalize_values(&[7.5, 7.5, 7.5], 100), vec![100, 100, 100]);
        assert_eq!(normalize_values(&[42.0], 100), vec![100]);
    }

    #[test]
    fn test_empty_input() {
        assert!(normalize_values(&[], 100).is_empty());
        assert!(normalize_scores(&[], 100).is_empty());
    }

    #[test]
    fn test_non_finite_scores_count_as_zero() {
        let scores = normalize_scores(&[raw("a", f64::NAN), raw("b", 4.0)], 100);
        assert_eq!(scores[0].score, 0);
        assert_eq!(scores[1].score, 100);
    }
}
