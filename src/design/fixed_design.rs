use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use super::group_sequential::{default_block, default_control, default_experimental};
use super::replicate::{analyze, load_json, run_replicates, ReplicateOutcome, SimulationResult};
use super::test_spec::TestSpec;
use crate::data_cut::cut::get_cut_date_by_event;
use crate::error::Result;
use crate::simulation::fail_rate::FailRateSpec;
use crate::simulation::rate_table::RateTable;
use crate::simulation::trial::{simulate_trial, StratumShare, Subject, TrialDesign};
use crate::utilities::validation::{validate_parameter, ValidationError};

/// How the single analysis of a fixed design is timed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixedCutTiming {
    /// At `total_duration`.
    PlannedDuration,
    /// When `target_events` events have been observed.
    TargetEvents,
    /// Once the last enrolled subject has the planned minimum follow-up,
    /// `total_duration` minus the enrollment duration.
    MinFollowUp,
    /// The later of `PlannedDuration` and `TargetEvents`.
    MaxDurationEvents,
    /// The later of `TargetEvents` and `MinFollowUp`.
    MaxEventsFollowUp,
}

impl FixedCutTiming {
    fn needs_target(self) -> bool {
        matches!(
            self,
            FixedCutTiming::TargetEvents
                | FixedCutTiming::MaxDurationEvents
                | FixedCutTiming::MaxEventsFollowUp
        )
    }

    fn needs_followup(self) -> bool {
        matches!(
            self,
            FixedCutTiming::MinFollowUp | FixedCutTiming::MaxEventsFollowUp
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixedDesignConfig {
    pub n_sim: usize,
    pub sample_size: usize,
    #[serde(default = "StratumShare::single")]
    pub strata: Vec<StratumShare>,
    #[serde(default = "default_block")]
    pub block: Vec<String>,
    pub enroll_rate: RateTable,
    pub fail_rate: FailRateSpec,
    pub total_duration: f64,
    #[serde(default)]
    pub target_events: Option<usize>,
    pub timing: FixedCutTiming,
    pub test: TestSpec,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub n_threads: usize,
    #[serde(default = "default_control")]
    pub control_label: String,
    #[serde(default = "default_experimental")]
    pub experimental_label: String,
}

impl FixedDesignConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        load_json(path)
    }

    /// Planned follow-up of the last enrolled subject.
    pub fn min_followup(&self) -> Result<f64> {
        let enroll_duration = self.enroll_rate.ungrouped("enroll_rate")?.total_duration();
        Ok(self.total_duration - enroll_duration)
    }

    pub fn validate(&self) -> Result<TrialDesign> {
        validate_parameter(self.total_duration, "total_duration")?;
        if self.timing.needs_target() && self.target_events.is_none() {
            return Err(ValidationError::InvalidValue {
                field: "target_events",
                message: format!("required by timing {:?}", self.timing),
            }
            .into());
        }
        if self.timing.needs_followup() {
            let followup = self.min_followup()?;
            if followup.is_nan() || followup < 0.0 {
                return Err(ValidationError::InvalidValue {
                    field: "total_duration",
                    message: format!("shorter than the enrollment period (follow-up {followup})"),
                }
                .into());
            }
        }
        self.test.validate()?;

        let (fail_rate, dropout_rate) = self
            .fail_rate
            .to_rate_tables(&self.control_label, &self.experimental_label)?;
        let design = TrialDesign {
            n: self.sample_size,
            strata: self.strata.clone(),
            block: self.block.clone(),
            enroll_rate: self.enroll_rate.clone(),
            fail_rate,
            dropout_rate,
        };
        design.validate()?;
        Ok(design)
    }

    fn cut_date(&self, subjects: &[Subject], min_followup: f64) -> f64 {
        let by_events = || get_cut_date_by_event(subjects, self.target_events.unwrap_or(0));
        let by_followup = || {
            subjects
                .iter()
                .map(|s| s.enroll_time)
                .fold(0.0, f64::max)
                + min_followup
        };
        match self.timing {
            FixedCutTiming::PlannedDuration => self.total_duration,
            FixedCutTiming::TargetEvents => by_events(),
            FixedCutTiming::MinFollowUp => by_followup(),
            FixedCutTiming::MaxDurationEvents => self.total_duration.max(by_events()),
            FixedCutTiming::MaxEventsFollowUp => by_events().max(by_followup()),
        }
    }
}

/// Simulates `n_sim` trials with a single analysis each. Records carry
/// `analysis == 1`.
pub fn simulate_fixed_design(config: &FixedDesignConfig) -> Result<SimulationResult> {
    let design = config.validate()?;
    let min_followup = if config.timing.needs_followup() {
        config.min_followup()?
    } else {
        0.0
    };
    info!(
        "fixed design simulation: {} replicates of {} subjects, timing {:?}",
        config.n_sim, config.sample_size, config.timing
    );

    let result = run_replicates(config.n_sim, config.seed, config.n_threads, |sim_id, rng| {
        let mut outcome = ReplicateOutcome::default();
        let record = simulate_trial(&design, rng).and_then(|subjects| {
            let date = config.cut_date(&subjects, min_followup);
            analyze(
                &subjects,
                date,
                &config.experimental_label,
                &config.test,
                sim_id,
                1,
            )
        });
        match record {
            Ok(record) => outcome.records.push(record),
            Err(err) => outcome.fail(sim_id, Some(1), &err),
        }
        outcome
    })?;

    info!(
        "fixed design simulation finished in {:.2}s: {} records, {} failed replicates",
        result.wall_s,
        result.records.len(),
        result.failures.len()
    );
    Ok(result)
}
