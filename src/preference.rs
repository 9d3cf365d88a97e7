//! Preference relations and the per-run preference set.
//!
//! Each expert supplies one `n x n` fuzzy preference matrix per criterion,
//! entry `[i][j]` in `[0,1]` being the strength with which alternative `i`
//! is preferred over `j`. Ingestion turns the keyed input into a fixed-shape
//! set: experts and criteria get dense indices, and all downstream code works
//! on indices only.

use std::collections::{BTreeMap, HashMap};

use nalgebra::DMatrix;

use crate::error::CrpError;

pub type PreferenceMatrix = DMatrix<f64>;

/// Keyed input: expert id -> criterion id -> row-major matrix.
pub type ExpertMatrices = BTreeMap<String, BTreeMap<String, Vec<Vec<f64>>>>;

/// All preference matrices of one run plus the collective slot.
///
/// Slots `0..n_experts` hold experts, slot `n_experts` holds the collective.
/// Only feedback application mutates expert matrices; the collective is
/// overwritten by aggregation at the start of every round.
#[derive(Debug, Clone, PartialEq)]
pub struct PreferenceSet {
    expert_ids: Vec<String>,
    expert_index: HashMap<String, usize>,
    criterion_ids: Vec<String>,
    n_alternatives: usize,
    /// `experts[e][c]` is expert `e`'s matrix under criterion `c`.
    experts: Vec<Vec<PreferenceMatrix>>,
    collective: PreferenceMatrix,
}

impl PreferenceSet {
    /// Build from already-indexed matrices, validating shape and range.
    pub fn from_matrices(
        expert_ids: Vec<String>,
        criterion_ids: Vec<String>,
        experts: Vec<Vec<PreferenceMatrix>>,
    ) -> Result<Self, CrpError> {
        if experts.is_empty() || expert_ids.is_empty() {
            return Err(CrpError::NoExperts);
        }
        if experts.len() != expert_ids.len() {
            return Err(CrpError::SlotCountMismatch {
                expected: expert_ids.len(),
                got: experts.len(),
            });
        }

        let mut expert_index = HashMap::with_capacity(expert_ids.len());
        for (idx, id) in expert_ids.iter().enumerate() {
            expert_index.insert(id.clone(), idx);
        }

        let mut n_alternatives = None;
        for (e, criteria) in experts.iter().enumerate() {
            let expert_id = &expert_ids[e];
            if criteria.is_empty() {
                return Err(CrpError::NoCriteria {
                    expert_id: expert_id.clone(),
                });
            }
            if criteria.len() != criterion_ids.len() {
                return Err(CrpError::CriterionCountMismatch {
                    expert_id: expert_id.clone(),
                    expected: criterion_ids.len(),
                    got: criteria.len(),
                });
            }
            for (c, m) in criteria.iter().enumerate() {
                let criterion_id = &criterion_ids[c];
                if m.nrows() != m.ncols() {
                    return Err(CrpError::NonSquareMatrix {
                        expert_id: expert_id.clone(),
                        criterion_id: criterion_id.clone(),
                        rows: m.nrows(),
                        cols: m.ncols(),
                    });
                }
                let expected = *n_alternatives.get_or_insert(m.nrows());
                if m.nrows() != expected {
                    return Err(CrpError::DimensionMismatch {
                        expert_id: expert_id.clone(),
                        criterion_id: criterion_id.clone(),
                        expected,
                        got: m.nrows(),
                    });
                }
                check_range(expert_id, criterion_id, m)?;
            }
        }

        let n = n_alternatives.unwrap_or(0);
        Ok(Self {
            expert_ids,
            expert_index,
            criterion_ids,
            n_alternatives: n,
            experts,
            collective: DMatrix::zeros(n, n),
        })
    }

    /// Ingest the keyed input. Experts and criteria are indexed in key order.
    pub fn from_expert_map(input: &ExpertMatrices) -> Result<Self, CrpError> {
        let mut iter = input.iter();
        let (first_id, first_criteria) = iter.next().ok_or(CrpError::NoExperts)?;
        if first_criteria.is_empty() {
            return Err(CrpError::NoCriteria {
                expert_id: first_id.clone(),
            });
        }
        let criterion_ids: Vec<String> = first_criteria.keys().cloned().collect();

        let mut expert_ids = Vec::with_capacity(input.len());
        let mut experts = Vec::with_capacity(input.len());
        for (expert_id, criteria) in input {
            let got: Vec<String> = criteria.keys().cloned().collect();
            if got != criterion_ids {
                return Err(CrpError::CriteriaMismatch {
                    expert_id: expert_id.clone(),
                    expected: criterion_ids.clone(),
                    got,
                });
            }
            let mut mats = Vec::with_capacity(criteria.len());
            for (criterion_id, rows) in criteria {
                mats.push(matrix_from_rows(expert_id, criterion_id, rows)?);
            }
            expert_ids.push(expert_id.clone());
            experts.push(mats);
        }

        Self::from_matrices(expert_ids, criterion_ids, experts)
    }

    pub fn n_experts(&self) -> usize {
        self.experts.len()
    }

    pub fn n_alternatives(&self) -> usize {
        self.n_alternatives
    }

    pub fn n_criteria(&self) -> usize {
        self.criterion_ids.len()
    }

    /// Expert slots plus the collective slot.
    pub fn slot_count(&self) -> usize {
        self.experts.len() + 1
    }

    pub fn expert_ids(&self) -> &[String] {
        &self.expert_ids
    }

    pub fn criterion_ids(&self) -> &[String] {
        &self.criterion_ids
    }

    pub fn expert_index(&self, expert_id: &str) -> Option<usize> {
        self.expert_index.get(expert_id).copied()
    }

    /// Expert `e`'s matrices, one per criterion.
    pub fn expert(&self, e: usize) -> &[PreferenceMatrix] {
        &self.experts[e]
    }

    pub(crate) fn expert_mut(&mut self, e: usize) -> &mut [PreferenceMatrix] {
        &mut self.experts[e]
    }

    pub fn experts(&self) -> &[Vec<PreferenceMatrix>] {
        &self.experts
    }

    pub fn collective(&self) -> &PreferenceMatrix {
        &self.collective
    }

    pub fn set_collective(&mut self, collective: PreferenceMatrix) {
        self.collective = collective;
    }
}

fn matrix_from_rows(
    expert_id: &str,
    criterion_id: &str,
    rows: &[Vec<f64>],
) -> Result<PreferenceMatrix, CrpError> {
    let n = rows.len();
    for row in rows {
        if row.len() != n {
            return Err(CrpError::NonSquareMatrix {
                expert_id: expert_id.to_string(),
                criterion_id: criterion_id.to_string(),
                rows: n,
                cols: row.len(),
            });
        }
    }
    Ok(DMatrix::from_fn(n, n, |i, j| rows[i][j]))
}

fn check_range(
    expert_id: &str,
    criterion_id: &str,
    m: &PreferenceMatrix,
) -> Result<(), CrpError> {
    for i in 0..m.nrows() {
        for j in 0..m.ncols() {
            let value = m[(i, j)];
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(CrpError::EntryOutOfRange {
                    expert_id: expert_id.to_string(),
                    criterion_id: criterion_id.to_string(),
                    row: i,
                    col: j,
                    value,
                });
            }
        }
    }
    Ok(())
}

/// Row-major copy of a matrix, each entry passed through `map`.
pub fn to_rows(m: &PreferenceMatrix, map: impl Fn(f64) -> f64) -> Vec<Vec<f64>> {
    (0..m.nrows())
        .map(|i| (0..m.ncols()).map(|j| map(m[(i, j)])).collect())
        .collect()
}
