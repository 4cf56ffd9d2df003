use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::analysis_cut::AnalysisCut;
use super::replicate::{analyze, load_json, run_replicates, ReplicateOutcome, SimulationResult};
use super::test_spec::{TestPlan, TestSpec};
use crate::constants::{DEFAULT_CONTROL_LABEL, DEFAULT_EXPERIMENTAL_LABEL};
use crate::error::{Result, TrialSimError};
use crate::simulation::fail_rate::FailRateSpec;
use crate::simulation::rate_table::RateTable;
use crate::simulation::trial::{simulate_trial, StratumShare, TrialDesign};
use crate::utilities::validation::{validate_non_empty, validate_parameter};

pub(crate) fn default_control() -> String {
    DEFAULT_CONTROL_LABEL.to_string()
}

pub(crate) fn default_experimental() -> String {
    DEFAULT_EXPERIMENTAL_LABEL.to_string()
}

pub(crate) fn default_block() -> Vec<String> {
    vec![
        default_control(),
        default_control(),
        default_experimental(),
        default_experimental(),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupSequentialConfig {
    pub n_sim: usize,
    pub sample_size: usize,
    #[serde(default = "StratumShare::single")]
    pub strata: Vec<StratumShare>,
    #[serde(default = "default_block")]
    pub block: Vec<String>,
    pub enroll_rate: RateTable,
    pub fail_rate: FailRateSpec,
    /// Upper bound on every analysis date.
    #[serde(default)]
    pub total_duration: Option<f64>,
    pub cuts: Vec<AnalysisCut>,
    pub tests: TestPlan,
    #[serde(default)]
    pub seed: u64,
    /// Zero uses the global rayon pool.
    #[serde(default)]
    pub n_threads: usize,
    #[serde(default = "default_control")]
    pub control_label: String,
    #[serde(default = "default_experimental")]
    pub experimental_label: String,
}

impl GroupSequentialConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        load_json(path)
    }

    pub fn trial_design(&self) -> Result<TrialDesign> {
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

    /// Checks the whole configuration and returns the resolved design and
    /// per-analysis tests.
    pub fn validate(&self) -> Result<(TrialDesign, Vec<TestSpec>)> {
        validate_non_empty(&self.cuts, "cuts")?;
        for cut in &self.cuts {
            cut.validate()?;
        }
        if let Some(total) = self.total_duration {
            validate_parameter(total, "total_duration")?;
        }
        let tests = self.tests.resolve(self.cuts.len())?;
        Ok((self.trial_design()?, tests))
    }
}

/// Simulates `n_sim` group-sequential trials.
///
/// Every replicate runs all analyses in order; there is no early stopping.
/// An error inside a replicate ends that replicate and is reported in
/// [`SimulationResult::failures`] while the others continue. Configuration
/// errors are returned before any replicate runs.
pub fn simulate_group_sequential(config: &GroupSequentialConfig) -> Result<SimulationResult> {
    let (design, tests) = config.validate()?;
    info!(
        "group sequential simulation: {} replicates of {} subjects, {} analyses",
        config.n_sim,
        config.sample_size,
        config.cuts.len()
    );

    let result = run_replicates(config.n_sim, config.seed, config.n_threads, |sim_id, rng| {
        let mut outcome = ReplicateOutcome::default();
        let subjects = match simulate_trial(&design, rng) {
            Ok(s) => s,
            Err(err) => {
                outcome.fail(sim_id, None, &err);
                return outcome;
            }
        };

        let mut previous = None;
        for (k, (cut, test)) in config.cuts.iter().zip(&tests).enumerate() {
            let analysis = k + 1;
            let record = cut
                .analysis_date(&subjects, previous)
                .map_err(TrialSimError::from)
                .map(|date| config.total_duration.map_or(date, |total| date.min(total)))
                .and_then(|date| {
                    analyze(&subjects, date, &config.experimental_label, test, sim_id, analysis)
                });
            match record {
                Ok(record) => {
                    previous = Some(record.cut_date);
                    outcome.records.push(record);
                }
                Err(err) => {
                    outcome.fail(sim_id, Some(analysis), &err);
                    break;
                }
            }
        }
        debug!("replicate {sim_id} finished {} analyses", outcome.records.len());
        outcome
    })?;

    info!(
        "group sequential simulation finished in {:.2}s: {} records, {} failed replicates",
        result.wall_s,
        result.records.len(),
        result.failures.len()
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypothesis::weights::WeightFunction;
    use crate::simulation::fail_rate::FailRatePeriod;

    pub(crate) fn delayed_effect_config(n_sim: usize) -> GroupSequentialConfig {
        let lambda = 2.0_f64.ln() / 12.0;
        GroupSequentialConfig {
            n_sim,
            sample_size: 200,
            strata: StratumShare::single(),
            block: default_block(),
            enroll_rate: RateTable::from_durations(&[12.0], &[200.0 / 12.0]).unwrap(),
            fail_rate: FailRateSpec::new(vec![
                FailRatePeriod {
                    stratum: "All".into(),
                    duration: 3.0,
                    fail_rate: lambda,
                    hr: 1.0,
                    dropout_rate: 0.001,
                },
                FailRatePeriod {
                    stratum: "All".into(),
                    duration: 100.0,
                    fail_rate: lambda,
                    hr: 0.6,
                    dropout_rate: 0.001,
                },
            ])
            .unwrap(),
            total_duration: None,
            cuts: vec![
                AnalysisCut::at_events(60),
                AnalysisCut {
                    target_event: Some(100),
                    min_time_after_previous_analysis: Some(3.0),
                    ..AnalysisCut::default()
                },
                AnalysisCut::at_time(36.0),
            ],
            tests: TestPlan::Uniform(TestSpec::log_rank()),
            seed: 2024,
            n_threads: 0,
            control_label: default_control(),
            experimental_label: default_experimental(),
        }
    }

    #[test]
    fn test_records_per_analysis() {
        let config = delayed_effect_config(6);
        let result = simulate_group_sequential(&config).unwrap();
        assert!(result.failures.is_empty(), "{:?}", result.failures);
        assert_eq!(result.records.len(), 18);
        for chunk in result.records.chunks(3) {
            assert!(chunk.iter().all(|r| r.sim_id == chunk[0].sim_id));
            assert_eq!(
                chunk.iter().map(|r| r.analysis).collect::<Vec<_>>(),
                vec![1, 2, 3]
            );
            assert!(chunk[0].events >= 60);
            assert!(chunk[1].cut_date >= chunk[0].cut_date + 3.0);
            assert!(chunk[1].events >= 100);
            assert!(chunk[2].cut_date >= 36.0);
            assert!(chunk.iter().all(|r| r.treatment_events <= r.events));
        }
    }

    #[test]
    fn test_thread_count_does_not_change_results() {
        let mut config = delayed_effect_config(5);
        config.n_threads = 1;
        let single = simulate_group_sequential(&config).unwrap();
        config.n_threads = 3;
        let multi = simulate_group_sequential(&config).unwrap();
        assert_eq!(single.records, multi.records);
    }

    #[test]
    fn test_total_duration_caps_dates() {
        let mut config = delayed_effect_config(3);
        config.total_duration = Some(20.0);
        let result = simulate_group_sequential(&config).unwrap();
        assert!(result.records.iter().all(|r| r.cut_date <= 20.0));
        assert!(result
            .records
            .iter()
            .filter(|r| r.analysis == 3)
            .all(|r| r.cut_date == 20.0));
    }

    #[test]
    fn test_failures_are_isolated() {
        let mut config = delayed_effect_config(4);
        // Nothing can be tested at a cut before anyone has an event.
        config.cuts.insert(0, AnalysisCut::at_time(0.01));
        config.tests = TestPlan::Uniform(TestSpec::Wlr {
            weight: WeightFunction::log_rank(),
        });
        let result = simulate_group_sequential(&config).unwrap();
        assert_eq!(result.failures.len(), 4);
        assert!(result.failures.iter().all(|f| f.analysis == Some(1)));
        assert!(result.records.is_empty());
    }

    #[test]
    fn test_successful_replicates_survive_failing_neighbours() {
        let mut config = delayed_effect_config(40);
        // About 0.7 expected events by 1.2, so roughly half the replicates
        // have nothing to test at the first cut.
        config.cuts.insert(0, AnalysisCut::at_time(1.2));
        let result = simulate_group_sequential(&config).unwrap();
        assert!(!result.failures.is_empty());
        assert!(result.failures.len() < 40);
        assert!(result.failures.iter().all(|f| f.analysis == Some(1)));

        let failed: Vec<usize> = result.failures.iter().map(|f| f.sim_id).collect();
        for sim_id in 1..=40 {
            let analyses: Vec<usize> = result
                .records
                .iter()
                .filter(|r| r.sim_id == sim_id)
                .map(|r| r.analysis)
                .collect();
            if failed.contains(&sim_id) {
                assert!(analyses.is_empty(), "replicate {sim_id}");
            } else {
                assert_eq!(analyses, vec![1, 2, 3, 4], "replicate {sim_id}");
            }
        }
        assert_eq!(result.records.len(), 4 * (40 - failed.len()));

        let summary = result.summarize(0.025).unwrap();
        assert!(summary.iter().all(|s| s.n_records + s.n_failures == 40));
    }

    #[test]
    fn test_per_analysis_length_checked_up_front() {
        let mut config = delayed_effect_config(2);
        config.tests = TestPlan::PerAnalysis(vec![TestSpec::log_rank()]);
        let err = simulate_group_sequential(&config).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config = delayed_effect_config(2);
        let text = serde_json::to_string(&config).unwrap();
        assert_eq!(GroupSequentialConfig::from_json_str(&text).unwrap(), config);
        assert!(GroupSequentialConfig::from_json_str("{\"n_sim\": 1}").is_err());
    }
}
