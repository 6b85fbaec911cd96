//! Score series arithmetic shared by every recommendation flow.
//!
//! A [`ScoreSeries`] maps movie ids to scores. Flows build one series per
//! signal (query match, collaborative affinity, popularity), rescale them with
//! [`normalize`], blend them with [`combine`] and order the result with
//! [`rank`]. Series are keyed by a `BTreeMap` so iteration order, and therefore
//! every floating-point sum built from it, is the same on every call.

use std::collections::BTreeMap;

/// Value assigned to every entry of a constant series by [`normalize`]
pub const DEGENERATE_SCORE: f64 = 0.5;

/// Movie id → score, iterated in ascending id order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreSeries(BTreeMap<String, f64>);

impl ScoreSeries {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Inserts a score, ignoring non-finite values
    pub fn insert(&mut self, id: impl Into<String>, score: f64) {
        let id = id.into();
        if !score.is_finite() {
            tracing::warn!(movie_id = %id, score, "Ignoring non-finite score");
            return;
        }
        self.0.insert(id, score);
    }

    pub fn get(&self, id: &str) -> Option<f64> {
        self.0.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, f64)> {
        self.0.iter().map(|(id, score)| (id, *score))
    }

    fn min_max(&self) -> Option<(f64, f64)> {
        let mut values = self.0.values().copied();
        let first = values.next()?;
        Some(values.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for ScoreSeries {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        let mut series = ScoreSeries::new();
        for (id, score) in iter {
            series.insert(id, score);
        }
        series
    }
}

/// Min-max rescales a series onto [0, 1].
///
/// The minimum maps to exactly 0.0 and the maximum to exactly 1.0. A constant
/// series (including a single entry) has no range to scale, so every entry
/// maps to [`DEGENERATE_SCORE`].
pub fn normalize(scores: &ScoreSeries) -> ScoreSeries {
    let Some((min, max)) = scores.min_max() else {
        return ScoreSeries::new();
    };

    let range = max - min;
    if range == 0.0 {
        return scores
            .iter()
            .map(|(id, _)| (id.clone(), DEGENERATE_SCORE))
            .collect();
    }

    scores
        .iter()
        .map(|(id, score)| {
            let scaled = if score == max {
                1.0
            } else {
                (score - min) / range
            };
            (id.clone(), scaled)
        })
        .collect()
}

/// Weighted sum of several series over the ids present in all of them.
///
/// Ids missing from any part are dropped with a warning: the content and
/// collaborative indexes are kept in sync by ingestion, so a gap means lag,
/// not a reason to fail the request.
pub fn combine(parts: &[(&ScoreSeries, f64)]) -> ScoreSeries {
    let Some(((first, _), rest)) = parts.split_first() else {
        return ScoreSeries::new();
    };

    let mut combined = ScoreSeries::new();
    let mut dropped: Vec<&str> = Vec::new();

    for id in first.ids() {
        if rest.iter().all(|(series, _)| series.contains(id)) {
            let score = parts
                .iter()
                .map(|(series, weight)| weight * series.get(id).unwrap_or_default())
                .sum();
            combined.insert(id.clone(), score);
        } else {
            dropped.push(id);
        }
    }

    for (series, _) in rest {
        dropped.extend(
            series
                .ids()
                .filter(|id| !first.contains(id))
                .map(String::as_str),
        );
    }

    if !dropped.is_empty() {
        dropped.sort_unstable();
        dropped.dedup();
        tracing::warn!(
            dropped_count = dropped.len(),
            dropped = ?dropped,
            "Candidates missing from at least one score series"
        );
    }

    combined
}

/// Orders a series by descending score, ties broken by ascending id
pub fn rank(series: &ScoreSeries) -> Vec<(String, f64)> {
    let mut ranked: Vec<(String, f64)> = series
        .iter()
        .map(|(id, score)| (id.clone(), score))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
}

/// Cosine similarity in [-1, 1]; `None` for mismatched, empty or zero vectors
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> Option<f64> {
    if left.len() != right.len() || left.is_empty() {
        return None;
    }

    let mut dot = 0.0_f64;
    let mut left_norm_sq = 0.0_f64;
    let mut right_norm_sq = 0.0_f64;

    for (a, b) in left.iter().zip(right.iter()) {
        let (a, b) = (f64::from(*a), f64::from(*b));
        dot += a * b;
        left_norm_sq += a * a;
        right_norm_sq += b * b;
    }

    let denom = left_norm_sq.sqrt() * right_norm_sq.sqrt();
    if denom <= f64::EPSILON {
        return None;
    }

    Some((dot / denom).clamp(-1.0, 1.0))
}

/// Mean cosine similarity of `candidate` against every vector in `seeds`.
///
/// Seeds the candidate cannot be compared with (dimension mismatch, zero
/// vector) are skipped; `None` when no seed is comparable.
pub fn mean_cosine_similarity(candidate: &[f32], seeds: &[&[f32]]) -> Option<f64> {
    let (sum, count) = seeds
        .iter()
        .filter_map(|seed| cosine_similarity(candidate, seed))
        .fold((0.0, 0usize), |(sum, count), sim| (sum + sim, count + 1));

    (count > 0).then(|| sum / count as f64)
}
