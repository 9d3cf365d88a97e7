//! Request/response types for a consensus run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::feedback::{BehaviorConfig, Direction, SeededBehavior};
use crate::owa::LinguisticQuantifier;
use crate::preference::{to_rows, ExpertMatrices, PreferenceSet};
use crate::process::{run_consensus_with, CrpOutcome, CrpParams, RunError};
use crate::trace::TraceSink;

/// Key used for `collective_evaluations` when several criteria were merged.
pub const AGGREGATE_KEY: &str = "aggregate";

/// Quantifiers and consensus parameters of the model.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelParameters {
    pub ag_lq: LinguisticQuantifier,
    pub ex_lq: LinguisticQuantifier,
    pub b: f64,
    pub beta: f64,
}

/// Input of one run.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrpRequest {
    /// Expert id -> criterion id -> `n x n` preference matrix.
    pub matrices: ExpertMatrices,
    pub consensus_threshold: f64,
    pub model_parameters: ModelParameters,
    /// Defaults to equal weights over the supplied criteria.
    #[serde(default)]
    pub criteria_weights: Option<Vec<f64>>,
    #[serde(default)]
    pub max_rounds: Option<u32>,
    #[serde(default)]
    pub rng_seed: Option<u64>,
    #[serde(default)]
    pub behavior: Option<BehaviorConfig>,
}

impl CrpRequest {
    /// Run parameters for a set with `n_criteria` criteria.
    pub fn params(&self, n_criteria: usize) -> CrpParams {
        let defaults = CrpParams::default();
        let w_crit = self.criteria_weights.clone().unwrap_or_else(|| {
            let n = n_criteria.max(1);
            vec![1.0 / n as f64; n]
        });
        CrpParams {
            cl: self.consensus_threshold,
            ag_lq: self.model_parameters.ag_lq,
            ex_lq: self.model_parameters.ex_lq,
            b: self.model_parameters.b,
            beta: self.model_parameters.beta,
            w_crit,
            max_rounds: self.max_rounds.unwrap_or(defaults.max_rounds),
            behavior: self.behavior.clone().unwrap_or(defaults.behavior),
            rng_seed: self.rng_seed,
        }
    }
}

/// Results of a successful run.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CrpResults {
    /// One ranking per expert in id order, then the collective ranking last.
    pub alternatives_rankings: Vec<Vec<usize>>,
    /// Collective ranking, best first.
    pub collective_ranking: Vec<usize>,
    pub expert_rankings: BTreeMap<String, Vec<usize>>,
    /// Group consensus, 2 dp.
    pub cm: f64,
    /// Collective dominance per alternative, 6 dp.
    pub collective_scores: Vec<f64>,
    /// Collective matrix, 2 dp, keyed by criterion id.
    pub collective_evaluations: BTreeMap<String, Vec<Vec<f64>>>,
    pub rounds: u32,
    pub converged: bool,
    /// Directions from the last feedback step, per targeted expert.
    pub suggestions: BTreeMap<String, Vec<Direction>>,
    /// Expert matrices after feedback, ready for another run.
    pub expert_evaluations: ExpertMatrices,
}

impl CrpResults {
    pub fn from_outcome(set: &PreferenceSet, outcome: &CrpOutcome) -> Self {
        let ids = set.expert_ids();
        let rankings = outcome.rankings();
        let expert_rankings: BTreeMap<String, Vec<usize>> =
            ids.iter().cloned().zip(rankings.iter().cloned()).collect();

        let key = match set.criterion_ids() {
            [only] => only.clone(),
            _ => AGGREGATE_KEY.to_string(),
        };
        let mut collective_evaluations = BTreeMap::new();
        collective_evaluations.insert(key, outcome.collective_matrix_rounded());

        let suggestions: BTreeMap<String, Vec<Direction>> = outcome
            .feedback
            .as_ref()
            .map(|fb| {
                fb.directives
                    .iter()
                    .map(|(&e, dirs)| (ids[e].clone(), dirs.clone()))
                    .collect()
            })
            .unwrap_or_default();

        let expert_evaluations: ExpertMatrices = ids
            .iter()
            .enumerate()
            .map(|(e, id)| {
                let per_criterion: BTreeMap<String, Vec<Vec<f64>>> = set
                    .criterion_ids()
                    .iter()
                    .cloned()
                    .zip(set.expert(e).iter().map(|m| to_rows(m, |v| v)))
                    .collect();
                (id.clone(), per_criterion)
            })
            .collect();

        Self {
            alternatives_rankings: rankings,
            collective_ranking: outcome.collective_ranking().to_vec(),
            expert_rankings,
            cm: outcome.cm_rounded(),
            collective_scores: outcome.collective_scores_rounded(),
            collective_evaluations,
            rounds: outcome.rounds,
            converged: outcome.converged(),
            suggestions,
            expert_evaluations,
        }
    }
}

/// Envelope returned to callers.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CrpResponse {
    pub success: bool,
    pub msg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<CrpResults>,
}

impl CrpResponse {
    pub fn from_result(result: Result<CrpResults, RunError>) -> Self {
        match result {
            Ok(results) => Self {
                success: true,
                msg: "Consensus process executed successfully".to_string(),
                results: Some(results),
            },
            Err(e) => Self::failure(e),
        }
    }

    pub fn failure(error: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            msg: format!("Error executing consensus process: {error}"),
            results: None,
        }
    }
}

/// Ingest, run and shape one request. Each call owns a fresh preference set.
pub fn execute(req: &CrpRequest, trace: Option<&dyn TraceSink>) -> Result<CrpResults, RunError> {
    let mut set = PreferenceSet::from_expert_map(&req.matrices)?;
    let params = req.params(set.n_criteria());
    let mut source = SeededBehavior::new(params.rng_seed);
    let outcome = run_consensus_with(&mut set, &params, &mut source, trace)?;
    Ok(CrpResults::from_outcome(&set, &outcome))
}
