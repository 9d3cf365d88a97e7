//! Ranking divergence and consensus degrees.
//!
//! Divergence is measured on rank positions: for each alternative, the
//! position it holds in the collective ranking minus the position it holds
//! in the expert's ranking. A negative difference means the expert ranks the
//! alternative lower than the group does.

use std::collections::BTreeSet;

use crate::error::CrpError;
use crate::owa::round_to;

/// Decimal places kept on consensus degrees.
pub const DEGREE_DECIMALS: u32 = 2;

/// Position of every alternative within `ranking`.
fn positions(ranking: &[usize]) -> Vec<usize> {
    let mut pos = vec![0; ranking.len()];
    for (idx, &alt) in ranking.iter().enumerate() {
        if let Some(slot) = pos.get_mut(alt) {
            *slot = idx;
        }
    }
    pos
}

/// `collective_position - expert_position` per alternative, ascending id.
pub fn ranking_difference(collective: &[usize], expert: &[usize]) -> Vec<i64> {
    let pc = positions(collective);
    let pe = positions(expert);
    pc.iter()
        .zip(&pe)
        .map(|(&c, &e)| c as i64 - e as i64)
        .collect()
}

/// One row of [`ranking_difference`] per expert ranking.
pub fn ranking_differences(collective: &[usize], experts: &[Vec<usize>]) -> Vec<Vec<i64>> {
    experts
        .iter()
        .map(|expert| ranking_difference(collective, expert))
        .collect()
}

/// Per-expert-per-alternative degree `(|diff| / (n_alt - 1))^b`, 2 dp.
///
/// Larger values mean larger positional error.
pub fn degree_exp_alt(
    differences: &[Vec<i64>],
    n_alt: usize,
    b: f64,
) -> Result<Vec<Vec<f64>>, CrpError> {
    if n_alt < 2 {
        return Err(CrpError::TooFewAlternatives { got: n_alt });
    }
    let denom = (n_alt - 1) as f64;
    Ok(differences
        .iter()
        .map(|row| {
            row.iter()
                .map(|&d| round_to((d.unsigned_abs() as f64 / denom).powf(b), DEGREE_DECIMALS))
                .collect()
        })
        .collect())
}

/// Per-alternative degree `1 - mean_over_experts(degree)`, 2 dp.
pub fn degree_alt(degree_exp_alt: &[Vec<f64>], n_alt: usize) -> Vec<f64> {
    let n_exp = degree_exp_alt.len();
    (0..n_alt)
        .map(|a| {
            if n_exp == 0 {
                return 1.0;
            }
            let sum = degree_exp_alt.iter().fold(0.0, |acc, row| acc + row[a]);
            round_to(1.0 - sum / n_exp as f64, DEGREE_DECIMALS)
        })
        .collect()
}

/// OR-like combination `(1 - beta) * mean(values in xsol) + beta * mean(rest)`.
///
/// An empty subset contributes 0.
pub fn or_like(values: &[f64], beta: f64, xsol: &BTreeSet<usize>) -> f64 {
    let mut sol_sum = 0.0;
    let mut sol_n = 0usize;
    for &i in xsol {
        if let Some(v) = values.get(i) {
            sol_sum += v;
            sol_n += 1;
        }
    }
    let mut rest_sum = 0.0;
    let mut rest_n = 0usize;
    for (i, v) in values.iter().enumerate() {
        if !xsol.contains(&i) {
            rest_sum += v;
            rest_n += 1;
        }
    }
    let sol_avg = if sol_n > 0 { sol_sum / sol_n as f64 } else { 0.0 };
    let rest_avg = if rest_n > 0 {
        rest_sum / rest_n as f64
    } else {
        0.0
    };
    (1.0 - beta) * sol_avg + beta * rest_avg
}

/// Everything the measurement stage derives in one round.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusMeasure {
    /// `n_experts x n_alt` positional differences.
    pub differences: Vec<Vec<i64>>,
    /// `n_experts x n_alt` positional error degrees.
    pub degree_exp_alt: Vec<Vec<f64>>,
    /// Consensus degree per alternative.
    pub degree_alt: Vec<f64>,
    /// Group consensus scalar, unrounded.
    pub cm: f64,
}

pub fn measure(
    collective_ranking: &[usize],
    expert_rankings: &[Vec<usize>],
    xsol: &BTreeSet<usize>,
    b: f64,
    beta: f64,
) -> Result<ConsensusMeasure, CrpError> {
    let n_alt = collective_ranking.len();
    let differences = ranking_differences(collective_ranking, expert_rankings);
    let degree_exp_alt = degree_exp_alt(&differences, n_alt, b)?;
    let degree_alt = degree_alt(&degree_exp_alt, n_alt);
    let cm = or_like(&degree_alt, beta, xsol);
    Ok(ConsensusMeasure {
        differences,
        degree_exp_alt,
        degree_alt,
        cm,
    })
}
