//! Piecewise-exponential simulation of time-to-event trials with stratified
//! weighted log-rank and MaxCombo tests.
//!
//! The pipeline runs leaf to root: rate tables drive the variate generators,
//! the trial simulator produces subjects, cuts turn them into analysis data,
//! the counting process summarizes risk sets and the tests consume it. The
//! drivers in [`design`] repeat that cycle over many seeded replicates.

pub mod constants;
pub mod data_cut;
pub mod design;
pub mod error;
pub mod hypothesis;
pub mod simulation;
pub mod surv_analysis;
pub mod utilities;

#[cfg(feature = "python")]
mod python;


pub use data_cut::cut::{
    cut_data_by_date, cut_data_by_event, get_cut_date_by_event, CalendarRecord, CutObservation,
};
pub use design::analysis_cut::AnalysisCut;
pub use design::fixed_design::{simulate_fixed_design, FixedCutTiming, FixedDesignConfig};
pub use design::group_sequential::{simulate_group_sequential, GroupSequentialConfig};
pub use design::replicate::{AnalysisRecord, ReplicateFailure, SimulationResult};
pub use design::summary::AnalysisSummary;
pub use design::test_spec::{TestOutput, TestPlan, TestSpec};
pub use error::{Result, TrialSimError};
pub use hypothesis::maxcombo::{maxcombo, MaxComboResult};
pub use hypothesis::mvn::{CancelToken, MvnIntegration, MvnProbability};
pub use hypothesis::weighted_logrank::{weighted_logrank, WlrResult};
pub use hypothesis::weights::WeightFunction;
pub use simulation::fail_rate::{FailRatePeriod, FailRateSpec};
pub use simulation::piecewise::{rpwexp, rpwexp_enroll};
pub use simulation::randomization::randomize_by_fixed_block;
pub use simulation::rate_table::{PiecewiseRate, RatePeriod, RateTable};
pub use simulation::trial::{simulate_trial, StratumShare, Subject, TrialDesign};
pub use surv_analysis::counting_process::{counting_process, CountingProcess, CountingProcessRow};
pub use utilities::validation::ValidationError;
