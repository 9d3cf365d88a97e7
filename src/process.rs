//! Consensus-reaching process: the bounded round loop.
//!
//! Each round runs AGGREGATE -> RANK -> MEASURE. If the group consensus `cm`
//! reaches the threshold the run terminates as converged; otherwise feedback
//! is generated and applied to the farthest experts, the round counter
//! advances, and the run either loops or stops at the round limit.
//!
//! The preference set is owned by the caller and passed in by mutable
//! reference. Rounds run on a working copy that replaces the caller's set
//! only when the run succeeds, so a failed run (bad parameters or a failed
//! trace write) leaves the set untouched.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::aggregation::aggregate;
use crate::consensus::{measure, ConsensusMeasure};
use crate::dominance::{dominance, solution_set, Dominance};
use crate::error::{CrpError, ErrorKind};
use crate::feedback::{
    plan_feedback, BehaviorConfig, BehaviorSource, FeedbackRound, SeededBehavior,
};
use crate::owa::{owa_weights, round_to, LinguisticQuantifier};
use crate::preference::{to_rows, PreferenceMatrix, PreferenceSet};
use crate::trace::{now_epoch_ms, RoundTrace, TraceError, TraceSink};

/// Decimal places on the reported consensus scalar.
pub const CM_DECIMALS: u32 = 2;
/// Decimal places on reported collective dominance scores.
pub const SCORE_DECIMALS: u32 = 6;
/// Decimal places on the reported collective matrix.
pub const MATRIX_DECIMALS: u32 = 2;

// ---------------------------------------------------------------------
//  Parameters
// ---------------------------------------------------------------------

/// Parameters of one consensus run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrpParams {
    /// Consensus threshold in `[0,1]`.
    pub cl: f64,
    /// Quantifier for the expert aggregation weights.
    pub ag_lq: LinguisticQuantifier,
    /// Quantifier for the alternative ranking weights.
    pub ex_lq: LinguisticQuantifier,
    /// Consensus rigor exponent. Typical values: 0.5, 0.7, 0.9, 1.0.
    pub b: f64,
    /// OR-like bias toward alternatives outside the solution set, in `[0,1]`.
    pub beta: f64,
    /// OWA weights over criteria, one per criterion.
    pub w_crit: Vec<f64>,
    /// Upper bound on rounds; feedback counts toward the round it follows.
    pub max_rounds: u32,
    pub behavior: BehaviorConfig,
    /// Seed for simulated expert behavior. `None` seeds from system entropy.
    pub rng_seed: Option<u64>,
}

impl Default for CrpParams {
    fn default() -> Self {
        Self {
            cl: 0.85,
            ag_lq: LinguisticQuantifier::most(),
            ex_lq: LinguisticQuantifier::as_many_as_possible(),
            b: 1.0,
            beta: 0.8,
            w_crit: vec![1.0],
            max_rounds: 1,
            behavior: BehaviorConfig::default(),
            rng_seed: None,
        }
    }
}

impl CrpParams {
    pub fn validate(&self, n_alternatives: usize, n_criteria: usize) -> Result<(), CrpError> {
        if !self.cl.is_finite() || !(0.0..=1.0).contains(&self.cl) {
            return Err(CrpError::InvalidThreshold { cl: self.cl });
        }
        self.ag_lq.validate()?;
        self.ex_lq.validate()?;
        if !self.b.is_finite() || self.b <= 0.0 {
            return Err(CrpError::InvalidRigor { b: self.b });
        }
        if !self.beta.is_finite() || !(0.0..=1.0).contains(&self.beta) {
            return Err(CrpError::InvalidBeta { beta: self.beta });
        }
        if self.w_crit.len() != n_criteria {
            return Err(CrpError::CriterionWeightMismatch {
                expected: n_criteria,
                got: self.w_crit.len(),
            });
        }
        for (index, &weight) in self.w_crit.iter().enumerate() {
            if !weight.is_finite() || weight < 0.0 {
                return Err(CrpError::InvalidCriterionWeight { index, weight });
            }
        }
        if self.max_rounds == 0 {
            return Err(CrpError::ZeroRounds);
        }
        if n_alternatives < 2 {
            return Err(CrpError::TooFewAlternatives {
                got: n_alternatives,
            });
        }
        self.behavior.validate()
    }
}

// ---------------------------------------------------------------------
//  Outcome
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    Converged,
    RoundLimit,
}

impl Termination {
    pub fn as_str(self) -> &'static str {
        match self {
            Termination::Converged => "converged",
            Termination::RoundLimit => "round_limit",
        }
    }
}

/// Summary of one executed round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundReport {
    /// Zero-based round index.
    pub round: u32,
    pub cm: f64,
    pub collective_ranking: Vec<usize>,
    pub solution_set: BTreeSet<usize>,
    pub feedback_applied: bool,
    pub changes_applied: usize,
}

/// State measured in one round, before any feedback.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundState {
    /// Dominance per expert, then the collective last.
    pub dominance: Vec<Dominance>,
    pub solution_set: BTreeSet<usize>,
    pub measure: ConsensusMeasure,
}

impl RoundState {
    pub fn collective(&self) -> &Dominance {
        &self.dominance[self.dominance.len() - 1]
    }

    pub fn expert_rankings(&self) -> Vec<Vec<usize>> {
        self.dominance[..self.dominance.len() - 1]
            .iter()
            .map(|d| d.ranking.clone())
            .collect()
    }
}

/// Terminal output of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct CrpOutcome {
    /// State measured in the last executed round.
    pub last: RoundState,
    /// Feedback of the last round, if it ran.
    pub feedback: Option<FeedbackRound>,
    pub collective_matrix: PreferenceMatrix,
    pub rounds: u32,
    pub termination: Termination,
    pub history: Vec<RoundReport>,
}

impl CrpOutcome {
    pub fn converged(&self) -> bool {
        self.termination == Termination::Converged
    }

    /// Rankings per entity: experts in index order, collective last.
    pub fn rankings(&self) -> Vec<Vec<usize>> {
        self.last.dominance.iter().map(|d| d.ranking.clone()).collect()
    }

    pub fn collective_ranking(&self) -> &[usize] {
        &self.last.collective().ranking
    }

    pub fn cm(&self) -> f64 {
        self.last.measure.cm
    }

    pub fn cm_rounded(&self) -> f64 {
        round_to(self.cm(), CM_DECIMALS)
    }

    pub fn collective_scores_rounded(&self) -> Vec<f64> {
        self.last
            .collective()
            .scores
            .iter()
            .map(|&s| round_to(s, SCORE_DECIMALS))
            .collect()
    }

    pub fn collective_matrix_rounded(&self) -> Vec<Vec<f64>> {
        to_rows(&self.collective_matrix, |v| round_to(v, MATRIX_DECIMALS))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Crp(#[from] CrpError),
    #[error("trace error: {0}")]
    Trace(#[from] TraceError),
}

impl RunError {
    /// Kind of the underlying model error, if any.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            RunError::Crp(e) => Some(e.kind()),
            RunError::Trace(_) => None,
        }
    }
}

// ---------------------------------------------------------------------
//  Round loop
// ---------------------------------------------------------------------

/// OWA weight vectors fixed for a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunWeights {
    pub w_experts: Vec<f64>,
    pub w_alternatives: Vec<f64>,
}

impl RunWeights {
    pub fn new(set: &PreferenceSet, params: &CrpParams) -> Result<Self, CrpError> {
        Ok(Self {
            w_experts: owa_weights(set.n_experts(), params.ag_lq)?,
            w_alternatives: owa_weights(set.n_alternatives(), params.ex_lq)?,
        })
    }
}

/// AGGREGATE, RANK and MEASURE for the current expert matrices.
///
/// Refreshes the collective slot of `set`; expert matrices are untouched.
pub fn measure_round(
    set: &mut PreferenceSet,
    params: &CrpParams,
    weights: &RunWeights,
) -> Result<RoundState, CrpError> {
    let agg = aggregate(set, &params.w_crit, &weights.w_experts)?;
    set.set_collective(agg.collective);

    let mut ranked: Vec<Dominance> = agg
        .per_expert
        .iter()
        .map(|m| dominance(m, &weights.w_alternatives))
        .collect();
    ranked.push(dominance(set.collective(), &weights.w_alternatives));

    let collective = &ranked[ranked.len() - 1];
    let xsol = solution_set(collective);
    let expert_rankings: Vec<Vec<usize>> = ranked[..ranked.len() - 1]
        .iter()
        .map(|d| d.ranking.clone())
        .collect();
    let measured = measure(
        &collective.ranking,
        &expert_rankings,
        &xsol,
        params.b,
        params.beta,
    )?;

    Ok(RoundState {
        dominance: ranked,
        solution_set: xsol,
        measure: measured,
    })
}

/// Run the consensus loop with a behavior source seeded from `params`.
pub fn run_consensus(set: &mut PreferenceSet, params: &CrpParams) -> Result<CrpOutcome, RunError> {
    let mut source = SeededBehavior::new(params.rng_seed);
    run_consensus_with(set, params, &mut source, None)
}

/// Run the consensus loop with an explicit behavior source and optional trace.
pub fn run_consensus_with(
    set: &mut PreferenceSet,
    params: &CrpParams,
    source: &mut dyn BehaviorSource,
    trace: Option<&dyn TraceSink>,
) -> Result<CrpOutcome, RunError> {
    params.validate(set.n_alternatives(), set.n_criteria())?;
    let weights = RunWeights::new(set, params)?;
    tracing::debug!(
        n_experts = set.n_experts(),
        n_alternatives = set.n_alternatives(),
        w_experts = ?weights.w_experts,
        w_alternatives = ?weights.w_alternatives,
        "consensus run starting"
    );

    // Rounds run on a copy; the caller's set is replaced only on success.
    let mut work = set.clone();
    let mut history = Vec::new();
    let mut round: u32 = 0;
    loop {
        let state = measure_round(&mut work, params, &weights)?;
        let cm = state.measure.cm;
        tracing::debug!(
            round,
            cm,
            ranking = ?state.collective().ranking,
            "round measured"
        );

        let (feedback, termination) = if cm >= params.cl {
            (None, Some(Termination::Converged))
        } else {
            let fb = plan_feedback(
                &state.measure,
                &state.solution_set,
                params.beta,
                &params.behavior,
                source,
            );
            let limit = (round + 1 >= params.max_rounds).then_some(Termination::RoundLimit);
            (Some(fb), limit)
        };

        if let Some(sink) = trace {
            sink.record(round_trace(&work, params, round, &state, feedback.as_ref(), termination))?;
        }
        let collective_matrix = work.collective().clone();
        if let Some(fb) = &feedback {
            fb.apply(&mut work);
        }
        history.push(RoundReport {
            round,
            cm,
            collective_ranking: state.collective().ranking.clone(),
            solution_set: state.solution_set.clone(),
            feedback_applied: feedback.is_some(),
            changes_applied: feedback.as_ref().map(|f| f.applied).unwrap_or(0),
        });
        round += 1;

        if let Some(termination) = termination {
            tracing::info!(
                rounds = round,
                cm = round_to(cm, CM_DECIMALS),
                termination = termination.as_str(),
                "consensus run finished"
            );
            *set = work;
            return Ok(CrpOutcome {
                collective_matrix,
                last: state,
                feedback,
                rounds: round,
                termination,
                history,
            });
        }
    }
}

fn round_trace(
    set: &PreferenceSet,
    params: &CrpParams,
    round: u32,
    state: &RoundState,
    feedback: Option<&FeedbackRound>,
    termination: Option<Termination>,
) -> RoundTrace {
    let ids = set.expert_ids();
    let expert_rankings: BTreeMap<String, Vec<usize>> = ids
        .iter()
        .cloned()
        .zip(state.expert_rankings())
        .collect();
    let (farthest_experts, directives, accepted_magnitudes, changes_applied) = match feedback {
        Some(fb) => (
            fb.farthest.iter().map(|&e| ids[e].clone()).collect(),
            fb.directives
                .iter()
                .map(|(&e, dirs)| (ids[e].clone(), dirs.clone()))
                .collect(),
            fb.accepted.clone(),
            fb.applied,
        ),
        None => (Vec::new(), BTreeMap::new(), Vec::new(), 0),
    };
    RoundTrace {
        timestamp_ms: now_epoch_ms(),
        round,
        n_experts: set.n_experts(),
        n_alternatives: set.n_alternatives(),
        cm: state.measure.cm,
        threshold: params.cl,
        collective_ranking: state.collective().ranking.clone(),
        collective_scores: state.collective().scores.clone(),
        solution_set: state.solution_set.iter().copied().collect(),
        expert_rankings,
        degree_alt: state.measure.degree_alt.clone(),
        farthest_experts,
        directives,
        accepted_magnitudes,
        changes_applied,
        termination: termination.map(|t| t.as_str().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::Direction;
    use nalgebra::DMatrix;

    struct FixedBehavior(f64);

    impl BehaviorSource for FixedBehavior {
        fn draw_bernoulli(&mut self, _p: f64) -> bool {
            true
        }

        fn draw_uniform(&mut self, _low: f64, _high: f64) -> f64 {
            self.0
        }
    }

    fn two_by_two() -> PreferenceSet {
        PreferenceSet::from_matrices(
            vec!["a".into(), "b".into()],
            vec!["c".into()],
            vec![
                vec![DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 0.0, 0.0])],
                vec![DMatrix::from_row_slice(2, 2, &[0.0, 0.0, 1.0, 0.0])],
            ],
        )
        .unwrap()
    }

    fn uniform_params() -> CrpParams {
        CrpParams {
            cl: 1.0,
            ag_lq: LinguisticQuantifier::new(0.0, 1.0),
            ex_lq: LinguisticQuantifier::new(0.0, 1.0),
            b: 1.0,
            beta: 0.5,
            w_crit: vec![1.0],
            max_rounds: 1,
            behavior: BehaviorConfig::default(),
            rng_seed: Some(1),
        }
    }

    #[test]
    fn tie_scenario_measures_and_triggers_feedback() {
        let mut set = two_by_two();
        let out = run_consensus_with(&mut set, &uniform_params(), &mut FixedBehavior(0.1), None)
            .unwrap();

        assert_eq!(out.rounds, 1);
        assert_eq!(out.termination, Termination::RoundLimit);
        assert_eq!(out.last.collective().scores, vec![0.25, 0.25]);
        assert_eq!(out.collective_ranking(), &[0, 1]);
        assert_eq!(out.last.solution_set, BTreeSet::from([0, 1]));
        assert_eq!(out.last.measure.degree_alt, vec![0.5, 0.5]);
        assert_eq!(out.cm(), 0.25);

        let fb = out.feedback.as_ref().unwrap();
        assert_eq!(fb.farthest, BTreeSet::from([0, 1]));
        assert_eq!(fb.directives[&0], vec![Direction::Keep, Direction::Keep]);
        assert_eq!(
            fb.directives[&1],
            vec![Direction::Increase, Direction::Decrease]
        );

        // Expert a untouched, expert b moved toward the group.
        assert_eq!(set.expert(0)[0], DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 0.0, 0.0]));
        let b = &set.expert(1)[0];
        assert!((b[(0, 1)] - 0.1).abs() < 1e-12);
        assert!((b[(1, 0)] - 0.9).abs() < 1e-12);
        // Collective slot keeps the pre-feedback aggregate.
        assert_eq!(out.collective_matrix_rounded(), vec![vec![0.0, 0.5], vec![0.5, 0.0]]);
    }

    #[test]
    fn consensus_reached_skips_feedback() {
        let m = DMatrix::from_row_slice(2, 2, &[0.5, 0.8, 0.2, 0.5]);
        let mut set = PreferenceSet::from_matrices(
            vec!["a".into(), "b".into()],
            vec!["c".into()],
            vec![vec![m.clone()], vec![m.clone()]],
        )
        .unwrap();
        let before = set.experts().to_vec();
        let out = run_consensus(&mut set, &uniform_params()).unwrap();

        assert!(out.converged());
        assert_eq!(out.cm_rounded(), 1.0);
        assert!(out.feedback.is_none());
        assert_eq!(set.experts(), before.as_slice());
        assert_eq!(set.collective(), &m);
    }

    #[test]
    fn invalid_parameters_leave_set_untouched() {
        let mut set = two_by_two();
        let before = set.clone();
        let mut params = uniform_params();
        params.beta = 1.5;
        let err = run_consensus(&mut set, &params).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::ParameterDomain));
        assert_eq!(set, before);
    }

    #[test]
    fn round_limit_bounds_the_loop() {
        let mut set = two_by_two();
        let mut params = uniform_params();
        params.max_rounds = 3;
        let out = run_consensus_with(&mut set, &params, &mut FixedBehavior(0.0), None).unwrap();
        // Zero magnitudes never move anyone, so every round measures the same.
        assert_eq!(out.rounds, 3);
        assert_eq!(out.history.len(), 3);
        assert!(out.history.iter().all(|r| r.cm == 0.25 && r.feedback_applied));
        assert!(out.history.iter().all(|r| r.changes_applied == 0));
    }

    #[test]
    fn params_validation_covers_domains() {
        let p = CrpParams::default();
        assert!(p.validate(3, 1).is_ok());
        assert_eq!(p.validate(1, 1), Err(CrpError::TooFewAlternatives { got: 1 }));
        assert!(matches!(
            p.validate(3, 2),
            Err(CrpError::CriterionWeightMismatch { .. })
        ));

        let mut bad = p.clone();
        bad.b = 0.0;
        assert!(matches!(bad.validate(3, 1), Err(CrpError::InvalidRigor { .. })));

        let mut bad = p.clone();
        bad.ag_lq = LinguisticQuantifier::new(0.8, 0.3);
        assert!(matches!(
            bad.validate(3, 1),
            Err(CrpError::DegenerateQuantifier { .. })
        ));

        let mut bad = p.clone();
        bad.max_rounds = 0;
        assert_eq!(bad.validate(3, 1), Err(CrpError::ZeroRounds));

        let mut bad = p;
        bad.cl = -0.1;
        assert!(matches!(bad.validate(3, 1), Err(CrpError::InvalidThreshold { .. })));
    }

    #[test]
    fn params_deserialize_with_defaults() {
        let p: CrpParams = serde_json::from_str(r#"{"cl": 0.7, "ex_lq": [0.0, 0.5]}"#).unwrap();
        assert_eq!(p.cl, 0.7);
        assert_eq!(p.ex_lq, LinguisticQuantifier::at_least_half());
        assert_eq!(p.ag_lq, LinguisticQuantifier::most());
        assert_eq!(p.max_rounds, 1);
        assert_eq!(p.behavior.change_scale, 0.2);
    }

    /// Fails every record from `fail_at` onwards.
    struct FailingSink {
        fail_at: u32,
    }

    impl TraceSink for FailingSink {
        fn record(&self, event: RoundTrace) -> Result<(), TraceError> {
            if event.round >= self.fail_at {
                Err(TraceError::Closed)
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn trace_failure_leaves_set_untouched() {
        for fail_at in [0, 1] {
            let mut set = two_by_two();
            let before = set.clone();
            let mut params = uniform_params();
            params.max_rounds = 3;
            let sink = FailingSink { fail_at };
            let err = run_consensus_with(&mut set, &params, &mut FixedBehavior(0.1), Some(&sink))
                .unwrap_err();
            assert!(matches!(err, RunError::Trace(TraceError::Closed)));
            assert_eq!(err.kind(), None);
            assert_eq!(set, before, "fail_at={fail_at}");
        }
    }

    #[test]
    fn collective_is_recomputed_every_round() {
        let mut set = two_by_two();
        let mut params = uniform_params();
        params.max_rounds = 2;
        let out = run_consensus_with(&mut set, &params, &mut FixedBehavior(0.1), None).unwrap();
        assert_eq!(out.rounds, 2);

        // Expert matrices as they stood at the start of round 1.
        let moved = PreferenceSet::from_matrices(
            vec!["a".into(), "b".into()],
            vec!["c".into()],
            vec![
                vec![DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 0.0, 0.0])],
                vec![DMatrix::from_row_slice(2, 2, &[0.0, 0.1, 0.9, 0.0])],
            ],
        )
        .unwrap();
        let weights = RunWeights::new(&moved, &params).unwrap();
        let expected = aggregate(&moved, &params.w_crit, &weights.w_experts)
            .unwrap()
            .collective;

        assert!((&out.collective_matrix - &expected).amax() < 1e-12);
        assert!((out.collective_matrix[(0, 1)] - 0.55).abs() < 1e-12);
        assert_ne!(
            out.collective_matrix_rounded(),
            vec![vec![0.0, 0.5], vec![0.5, 0.0]]
        );

        assert_eq!(out.history[0].cm, 0.25);
        assert_eq!(out.history[0].solution_set, BTreeSet::from([0, 1]));
        assert_eq!(out.history[1].cm, 0.5);
        assert_eq!(out.history[1].solution_set, BTreeSet::from([0]));
        assert_eq!(out.history[1].collective_ranking, vec![0, 1]);
    }
}
