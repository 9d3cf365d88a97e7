//! Quantifier-guided dominance degree (QGDD) and rankings.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::owa::owa;
use crate::preference::PreferenceMatrix;

/// Dominance scores and the ranking derived from them.
#[derive(Debug, Clone, PartialEq)]
pub struct Dominance {
    /// QGDD per alternative.
    pub scores: Vec<f64>,
    /// Alternative indices, best first.
    pub ranking: Vec<usize>,
}

/// QGDD per alternative: the OWA reduction of its row with `w_alt`.
///
/// The row includes the diagonal entry, matching the reduction over all
/// `n` alternatives that `w_alt` (length `n`) is built for.
pub fn qgdd(matrix: &PreferenceMatrix, w_alt: &[f64]) -> Vec<f64> {
    let n = matrix.nrows();
    let mut row = Vec::with_capacity(matrix.ncols());
    (0..n)
        .map(|i| {
            row.clear();
            row.extend((0..matrix.ncols()).map(|j| matrix[(i, j)]));
            owa(&row, w_alt)
        })
        .collect()
}

/// Indices sorted by descending score. Stable: ties keep index order.
pub fn ranking_from_scores(scores: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(Ordering::Equal));
    order
}

pub fn dominance(matrix: &PreferenceMatrix, w_alt: &[f64]) -> Dominance {
    let scores = qgdd(matrix, w_alt);
    let ranking = ranking_from_scores(&scores);
    Dominance { scores, ranking }
}

/// Xsol: every alternative tied with the one at rank position 0.
pub fn solution_set(dominance: &Dominance) -> BTreeSet<usize> {
    let Some(&best) = dominance.ranking.first() else {
        return BTreeSet::new();
    };
    let top = dominance.scores[best];
    dominance
        .ranking
        .iter()
        .copied()
        .take_while(|&alt| dominance.scores[alt] == top)
        .collect()
}
