//! Offline evaluation harness for the consensus loop.
//!
//! Runs synthetic groups of experts through the actual round loop, with
//! simulated acceptance standing in for real experts' reactions.

use std::time::Instant;

use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::feedback::{BehaviorConfig, SeededBehavior};
use crate::owa::LinguisticQuantifier;
use crate::preference::{PreferenceMatrix, PreferenceSet};
use crate::process::{run_consensus_with, CrpParams, RunError};

// =============================================================================
// Synthetic case definitions
// =============================================================================

/// How expert opinions are spread around the shared utilities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpinionSpread {
    /// Each expert perturbs the shared utilities by up to `noise`.
    Noisy { noise: f64 },
    /// Half the experts invert the shared utilities, then perturb by `noise`.
    Polarized { noise: f64 },
}

#[derive(Debug, Clone)]
pub struct SyntheticScenario {
    pub name: &'static str,
    pub n_experts: usize,
    pub n_alternatives: usize,
    pub spread: OpinionSpread,
    pub params: CrpParams,
    /// Seed for matrix generation; the behavior seed lives in `params`.
    pub seed: u64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct EvaluationResult {
    pub scenario_name: String,
    pub n_experts: usize,
    pub n_alternatives: usize,
    pub rounds: u32,
    pub converged: bool,
    pub initial_cm: f64,
    pub final_cm: f64,
    pub cm_trajectory: Vec<f64>,
    pub changes_applied: usize,
    pub final_ranking: Vec<usize>,
    pub latency_ms: u128,
}

// =============================================================================
// Public API
// =============================================================================

pub fn synthetic_scenarios() -> Vec<SyntheticScenario> {
    let multi_round = |cl: f64, max_rounds: u32, seed: u64| CrpParams {
        cl,
        max_rounds,
        rng_seed: Some(seed),
        ..CrpParams::default()
    };

    vec![
        SyntheticScenario {
            name: "aligned_5x4",
            n_experts: 5,
            n_alternatives: 4,
            spread: OpinionSpread::Noisy { noise: 0.05 },
            params: multi_round(0.85, 10, 101),
            seed: 1,
        },
        SyntheticScenario {
            name: "noisy_8x5",
            n_experts: 8,
            n_alternatives: 5,
            spread: OpinionSpread::Noisy { noise: 0.4 },
            params: multi_round(0.85, 20, 102),
            seed: 2,
        },
        SyntheticScenario {
            name: "polarized_6x4",
            n_experts: 6,
            n_alternatives: 4,
            spread: OpinionSpread::Polarized { noise: 0.1 },
            params: multi_round(0.8, 25, 103),
            seed: 3,
        },
        SyntheticScenario {
            name: "at_least_half_7x6",
            n_experts: 7,
            n_alternatives: 6,
            spread: OpinionSpread::Noisy { noise: 0.3 },
            params: CrpParams {
                ag_lq: LinguisticQuantifier::at_least_half(),
                ex_lq: LinguisticQuantifier::at_least_half(),
                b: 0.7,
                beta: 0.5,
                ..multi_round(0.8, 15, 104)
            },
            seed: 4,
        },
        SyntheticScenario {
            name: "reluctant_experts_6x5",
            n_experts: 6,
            n_alternatives: 5,
            spread: OpinionSpread::Noisy { noise: 0.35 },
            params: CrpParams {
                behavior: BehaviorConfig {
                    acceptance_probability: 0.5,
                    change_scale: 0.1,
                },
                ..multi_round(0.85, 30, 105)
            },
            seed: 5,
        },
        SyntheticScenario {
            name: "single_round_reference_4x3",
            n_experts: 4,
            n_alternatives: 3,
            spread: OpinionSpread::Noisy { noise: 0.3 },
            params: multi_round(0.85, 1, 106),
            seed: 6,
        },
    ]
}

/// Run every scenario, or only the one named `filter`.
pub fn run_synthetic_suite(filter: Option<&str>) -> Result<Vec<EvaluationResult>, RunError> {
    let scenarios = synthetic_scenarios();
    let selected: Vec<SyntheticScenario> = match filter {
        Some(name) => scenarios.into_iter().filter(|s| s.name == name).collect(),
        None => scenarios,
    };

    selected.iter().map(run_scenario).collect()
}

pub fn run_scenario(scenario: &SyntheticScenario) -> Result<EvaluationResult, RunError> {
    let started = Instant::now();
    let mut set = synthetic_preferences(scenario)?;
    let mut source = SeededBehavior::new(scenario.params.rng_seed);
    let outcome = run_consensus_with(&mut set, &scenario.params, &mut source, None)?;

    let cm_trajectory: Vec<f64> = outcome.history.iter().map(|r| r.cm).collect();
    Ok(EvaluationResult {
        scenario_name: scenario.name.to_string(),
        n_experts: scenario.n_experts,
        n_alternatives: scenario.n_alternatives,
        rounds: outcome.rounds,
        converged: outcome.converged(),
        initial_cm: cm_trajectory.first().copied().unwrap_or(0.0),
        final_cm: outcome.cm(),
        changes_applied: outcome.history.iter().map(|r| r.changes_applied).sum(),
        cm_trajectory,
        final_ranking: outcome.collective_ranking().to_vec(),
        latency_ms: started.elapsed().as_millis(),
    })
}

/// Reciprocal single-criterion preferences for the scenario's experts.
pub fn synthetic_preferences(scenario: &SyntheticScenario) -> Result<PreferenceSet, RunError> {
    let mut rng = StdRng::seed_from_u64(scenario.seed);
    let n = scenario.n_alternatives;
    let shared: Vec<f64> = (0..n).map(|_| rng.gen_range(0.0..1.0)).collect();

    let mut experts = Vec::with_capacity(scenario.n_experts);
    for e in 0..scenario.n_experts {
        let (invert, noise) = match scenario.spread {
            OpinionSpread::Noisy { noise } => (false, noise),
            OpinionSpread::Polarized { noise } => (e % 2 == 1, noise),
        };
        let utilities: Vec<f64> = shared
            .iter()
            .map(|&u| {
                let base = if invert { 1.0 - u } else { u };
                base + rng.gen_range(-noise..=noise)
            })
            .collect();
        experts.push(vec![reciprocal_from_utilities(&utilities)]);
    }

    let ids = (0..scenario.n_experts).map(|e| format!("expert_{e}")).collect();
    PreferenceSet::from_matrices(ids, vec!["overall".to_string()], experts).map_err(RunError::from)
}

fn reciprocal_from_utilities(utilities: &[f64]) -> PreferenceMatrix {
    let n = utilities.len();
    DMatrix::from_fn(n, n, |i, j| {
        if i == j {
            0.5
        } else {
            (0.5 + 0.5 * (utilities[i] - utilities[j])).clamp(0.0, 1.0)
        }
    })
}
