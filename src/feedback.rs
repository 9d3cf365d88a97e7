//! Feedback generation for experts far from the group opinion.
//!
//! When the group consensus falls short of the threshold, the experts whose
//! rankings sit farthest from the collective ranking receive a direction per
//! alternative (raise, keep or lower its preference row). Expert reaction is
//! simulated: each suggested change is accepted with a fixed probability and
//! at a magnitude drawn uniformly from `[0, change_scale]`.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::consensus::{or_like, ConsensusMeasure};
use crate::error::CrpError;
use crate::preference::PreferenceSet;

/// Suggested change to an expert's preferences for one alternative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Increase,
    Keep,
    Decrease,
}

impl Direction {
    /// Direction that moves an alternative toward its collective position,
    /// given `collective_position - expert_position`.
    pub fn from_difference(diff: i64) -> Self {
        match diff {
            d if d < 0 => Direction::Increase,
            0 => Direction::Keep,
            _ => Direction::Decrease,
        }
    }

    pub fn sign(self) -> f64 {
        match self {
            Direction::Increase => 1.0,
            Direction::Keep => 0.0,
            Direction::Decrease => -1.0,
        }
    }

    pub fn is_change(self) -> bool {
        !matches!(self, Direction::Keep)
    }
}

/// Simulated expert behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorConfig {
    /// Probability that a single suggested change is accepted.
    #[serde(default = "default_acceptance_probability")]
    pub acceptance_probability: f64,
    /// Upper bound of the uniformly drawn change magnitude.
    #[serde(default = "default_change_scale")]
    pub change_scale: f64,
}

fn default_acceptance_probability() -> f64 {
    1.0
}

fn default_change_scale() -> f64 {
    0.2
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            acceptance_probability: default_acceptance_probability(),
            change_scale: default_change_scale(),
        }
    }
}

impl BehaviorConfig {
    pub fn validate(&self) -> Result<(), CrpError> {
        let p = self.acceptance_probability;
        if !p.is_finite() || !(0.0..=1.0).contains(&p) {
            return Err(CrpError::InvalidAcceptanceProbability { p });
        }
        let scale = self.change_scale;
        if !scale.is_finite() || scale < 0.0 {
            return Err(CrpError::InvalidChangeScale { scale });
        }
        Ok(())
    }
}

/// Random draws used to simulate expert reactions.
pub trait BehaviorSource {
    /// `true` with probability `p`.
    fn draw_bernoulli(&mut self, p: f64) -> bool;
    /// Uniform draw from `[low, high]`.
    fn draw_uniform(&mut self, low: f64, high: f64) -> f64;
}

/// [`BehaviorSource`] backed by a seedable `StdRng`.
#[derive(Debug, Clone)]
pub struct SeededBehavior {
    rng: StdRng,
}

impl SeededBehavior {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Seeded when `seed` is given, system entropy otherwise.
    pub fn new(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::from_seed(seed),
            None => Self::from_entropy(),
        }
    }
}

impl BehaviorSource for SeededBehavior {
    fn draw_bernoulli(&mut self, p: f64) -> bool {
        self.rng.gen_bool(p.clamp(0.0, 1.0))
    }

    fn draw_uniform(&mut self, low: f64, high: f64) -> f64 {
        if high <= low {
            return low;
        }
        self.rng.gen_range(low..=high)
    }
}

/// Proximity of each expert to the collective solution.
///
/// Each expert's positional error degrees become `1 - value` and are
/// combined with the same OR-like split used for the group consensus.
pub fn proximity(degree_exp_alt: &[Vec<f64>], beta: f64, xsol: &BTreeSet<usize>) -> Vec<f64> {
    degree_exp_alt
        .iter()
        .map(|row| {
            let closeness: Vec<f64> = row.iter().map(|v| 1.0 - v).collect();
            or_like(&closeness, beta, xsol)
        })
        .collect()
}

/// Experts whose proximity is at or below the median-position value.
///
/// The threshold is the value at index `len / 2` of the ascending order, and
/// the comparison is inclusive, so ties can select more than half.
pub fn farthest_experts(proximity: &[f64]) -> BTreeSet<usize> {
    if proximity.is_empty() {
        return BTreeSet::new();
    }
    let mut ordered = proximity.to_vec();
    ordered.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let threshold = ordered[ordered.len() / 2];
    proximity
        .iter()
        .enumerate()
        .filter(|&(_, &p)| p <= threshold)
        .map(|(i, _)| i)
        .collect()
}

/// One direction per alternative for every selected expert.
pub fn change_directives(
    farthest: &BTreeSet<usize>,
    differences: &[Vec<i64>],
) -> BTreeMap<usize, Vec<Direction>> {
    farthest
        .iter()
        .filter_map(|&e| {
            differences.get(e).map(|row| {
                let dirs = row.iter().map(|&d| Direction::from_difference(d)).collect();
                (e, dirs)
            })
        })
        .collect()
}

/// Accepted magnitude per suggested change, in draw order.
///
/// All acceptance flags are drawn before any magnitude.
pub fn simulate_acceptance(
    count: usize,
    cfg: &BehaviorConfig,
    source: &mut dyn BehaviorSource,
) -> Vec<f64> {
    let flags: Vec<bool> = (0..count)
        .map(|_| source.draw_bernoulli(cfg.acceptance_probability))
        .collect();
    let magnitudes: Vec<f64> = (0..count)
        .map(|_| source.draw_uniform(0.0, cfg.change_scale))
        .collect();
    flags
        .into_iter()
        .zip(magnitudes)
        .map(|(accepted, m)| if accepted { m } else { 0.0 })
        .collect()
}

/// Apply accepted magnitudes to the selected experts' matrices.
///
/// For expert `e` and alternative `i` with a non-keep direction, every
/// off-diagonal entry `[i][j]` of each of `e`'s criterion matrices moves by
/// the signed magnitude and is clamped to `[0,1]`. Returns the number of
/// changes applied with a non-zero magnitude.
pub fn apply_changes(
    set: &mut PreferenceSet,
    directives: &BTreeMap<usize, Vec<Direction>>,
    accepted: &[f64],
) -> usize {
    let n_alt = set.n_alternatives();
    let mut draws = accepted.iter().copied();
    let mut applied = 0;
    for (&expert, dirs) in directives {
        for (i, &dir) in dirs.iter().enumerate() {
            if !dir.is_change() {
                continue;
            }
            let Some(magnitude) = draws.next() else {
                return applied;
            };
            if magnitude == 0.0 {
                continue;
            }
            let delta = dir.sign() * magnitude;
            for m in set.expert_mut(expert) {
                for j in (0..n_alt).filter(|&j| j != i) {
                    m[(i, j)] = (m[(i, j)] + delta).clamp(0.0, 1.0);
                }
            }
            applied += 1;
        }
    }
    applied
}

/// Record of one feedback step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackRound {
    pub proximity: Vec<f64>,
    pub farthest: BTreeSet<usize>,
    pub directives: BTreeMap<usize, Vec<Direction>>,
    /// Accepted magnitude per suggested change, zero when rejected.
    pub accepted: Vec<f64>,
    /// Changes with a non-zero accepted magnitude.
    pub applied: usize,
}

impl FeedbackRound {
    /// Apply the accepted changes to `set`. Returns the number applied.
    pub fn apply(&self, set: &mut PreferenceSet) -> usize {
        apply_changes(set, &self.directives, &self.accepted)
    }
}

/// Select the farthest experts, derive directions and simulate acceptance.
///
/// Nothing is written to the preference set here; see [`FeedbackRound::apply`].
pub fn plan_feedback(
    measure: &ConsensusMeasure,
    xsol: &BTreeSet<usize>,
    beta: f64,
    cfg: &BehaviorConfig,
    source: &mut dyn BehaviorSource,
) -> FeedbackRound {
    let proximity = proximity(&measure.degree_exp_alt, beta, xsol);
    let farthest = farthest_experts(&proximity);
    let directives = change_directives(&farthest, &measure.differences);
    let count = directives
        .values()
        .flatten()
        .filter(|d| d.is_change())
        .count();
    let accepted = simulate_acceptance(count, cfg, source);
    let applied = accepted.iter().filter(|&&m| m != 0.0).count();
    tracing::debug!(
        farthest = ?farthest,
        suggested = count,
        applied,
        "feedback planned"
    );
    FeedbackRound {
        proximity,
        farthest,
        directives,
        accepted,
        applied,
    }
}
