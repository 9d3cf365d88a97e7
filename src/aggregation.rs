//! Two-stage OWA aggregation of expert preferences into a collective matrix.
//!
//! Stage one reduces each expert's per-criterion matrices cell by cell with
//! the criterion weights; stage two reduces the per-expert matrices cell by
//! cell with the expert weights. Both stages are explicit loops so that sort
//! order and summation order are fixed.

use nalgebra::DMatrix;

use crate::error::CrpError;
use crate::owa::owa;
use crate::preference::{PreferenceMatrix, PreferenceSet};

/// Result of aggregating one preference set.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    /// One criterion-reduced matrix per expert.
    pub per_expert: Vec<PreferenceMatrix>,
    pub collective: PreferenceMatrix,
}

/// Aggregate the expert matrices of `set`. Pure: the caller stores
/// `collective` into the set's collective slot.
pub fn aggregate(
    set: &PreferenceSet,
    w_criteria: &[f64],
    w_experts: &[f64],
) -> Result<Aggregation, CrpError> {
    if w_criteria.len() != set.n_criteria() {
        return Err(CrpError::CriterionWeightMismatch {
            expected: set.n_criteria(),
            got: w_criteria.len(),
        });
    }
    let per_expert: Vec<PreferenceMatrix> = set
        .experts()
        .iter()
        .map(|criteria| aggregate_criteria(criteria, w_criteria))
        .collect();
    let collective = aggregate_experts(&per_expert, w_experts);
    Ok(Aggregation {
        per_expert,
        collective,
    })
}

/// Stage one: OWA over criteria for every cell of one expert.
pub fn aggregate_criteria(criteria: &[PreferenceMatrix], w_criteria: &[f64]) -> PreferenceMatrix {
    let n = criteria.first().map(|m| m.nrows()).unwrap_or(0);
    let mut out = DMatrix::zeros(n, n);
    let mut values = Vec::with_capacity(criteria.len());
    for i in 0..n {
        for j in 0..n {
            values.clear();
            values.extend(criteria.iter().map(|m| m[(i, j)]));
            out[(i, j)] = owa(&values, w_criteria);
        }
    }
    out
}

/// Stage two: OWA over experts for every cell.
pub fn aggregate_experts(per_expert: &[PreferenceMatrix], w_experts: &[f64]) -> PreferenceMatrix {
    let n = per_expert.first().map(|m| m.nrows()).unwrap_or(0);
    let mut out = DMatrix::zeros(n, n);
    let mut values = Vec::with_capacity(per_expert.len());
    for i in 0..n {
        for j in 0..n {
            values.clear();
            values.extend(per_expert.iter().map(|m| m[(i, j)]));
            out[(i, j)] = owa(&values, w_experts);
        }
    }
    out
}
