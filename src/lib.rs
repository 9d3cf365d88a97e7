#![forbid(unsafe_code)]

//! # consensus-harness
//!
//! Group decision making over fuzzy pairwise preferences.
//!
//! Several experts each state, per criterion, how strongly they prefer one
//! alternative over another as a value in `[0,1]`. The harness folds those
//! matrices into a collective one with OWA operators driven by linguistic
//! quantifiers, ranks alternatives by quantifier-guided dominance, and
//! measures how far every expert's ranking sits from the collective ranking.
//! While consensus stays below the threshold, the experts farthest from the
//! group receive per-alternative change directives and the loop runs again.
//!
//! Entry points:
//! - [`run_consensus`] / [`run_consensus_with`] for a validated [`PreferenceSet`].
//! - [`execute`] for the JSON request/response envelope used by the CLI.
//! - [`evaluation::run_synthetic_suite`] for offline scenario runs.

pub mod aggregation;
pub mod consensus;
pub mod dominance;
pub mod error;
pub mod evaluation;
pub mod feedback;
pub mod owa;
pub mod preference;
pub mod process;
pub mod trace;
pub mod types;

pub use aggregation::{aggregate, Aggregation};
pub use consensus::{measure, ranking_difference, ConsensusMeasure};
pub use dominance::{dominance, qgdd, ranking_from_scores, solution_set, Dominance};
pub use error::{CrpError, ErrorKind};
pub use feedback::{BehaviorConfig, BehaviorSource, Direction, FeedbackRound, SeededBehavior};
pub use owa::{owa, owa_weights, LinguisticQuantifier};
pub use preference::{ExpertMatrices, PreferenceMatrix, PreferenceSet};
pub use process::{
    run_consensus, run_consensus_with, CrpOutcome, CrpParams, RoundReport, RunError, Termination,
};
pub use trace::{JsonlTraceSink, RoundTrace, TraceError, TraceSink, TraceWorker};
pub use types::{execute, CrpRequest, CrpResponse, CrpResults};
