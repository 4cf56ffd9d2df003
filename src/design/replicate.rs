//! Replicate bookkeeping shared by the simulation drivers.

use std::path::Path;
use std::time::Instant;

use log::{debug, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::test_spec::{TestOutput, TestSpec};
use crate::data_cut::cut::cut_data_by_date;
use crate::error::{Result, TrialSimError};
use crate::simulation::trial::Subject;
use crate::surv_analysis::counting_process::counting_process;

/// One analysis of one replicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub sim_id: usize,
    pub analysis: usize,
    pub cut_date: f64,
    pub n: usize,
    pub events: usize,
    pub treatment_events: usize,
    pub output: TestOutput,
}

/// A replicate that stopped early. `analysis` is `None` when the trial
/// itself could not be simulated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicateFailure {
    pub sim_id: usize,
    pub analysis: Option<usize>,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub n_sim: usize,
    pub records: Vec<AnalysisRecord>,
    pub failures: Vec<ReplicateFailure>,
    pub wall_s: f64,
}

#[derive(Debug, Default)]
pub(crate) struct ReplicateOutcome {
    pub records: Vec<AnalysisRecord>,
    pub failure: Option<ReplicateFailure>,
}

impl ReplicateOutcome {
    pub fn fail(&mut self, sim_id: usize, analysis: Option<usize>, err: &TrialSimError) {
        warn!(
            "replicate {sim_id} stopped at analysis {}: {err}",
            analysis.map_or_else(|| "simulation".to_string(), |a| a.to_string())
        );
        self.failure = Some(ReplicateFailure {
            sim_id,
            analysis,
            error: err.to_string(),
        });
    }
}

/// Cuts `subjects` at `cut_date` and runs `test` on the result.
pub(crate) fn analyze(
    subjects: &[Subject],
    cut_date: f64,
    experimental: &str,
    test: &TestSpec,
    sim_id: usize,
    analysis: usize,
) -> Result<AnalysisRecord> {
    let cut = cut_data_by_date(subjects, cut_date);
    let events = cut.iter().filter(|o| o.event).count();
    let treatment_events = cut
        .iter()
        .filter(|o| o.event && o.treatment == experimental)
        .count();
    let table = counting_process(&cut, experimental)?;
    let output = test.run(&table)?;
    debug!(
        "replicate {sim_id} analysis {analysis}: cut {cut_date:.3}, n {}, events {events}, p {:.4}",
        cut.len(),
        output.p_value()
    );
    Ok(AnalysisRecord {
        sim_id,
        analysis,
        cut_date,
        n: cut.len(),
        events,
        treatment_events,
        output,
    })
}

/// Runs `n_sim` replicates, replicate `i` (0-based) drawing from
/// `StdRng::seed_from_u64(seed + i)`. Output order does not depend on the
/// thread count.
pub(crate) fn run_replicates<F>(
    n_sim: usize,
    seed: u64,
    n_threads: usize,
    replicate: F,
) -> Result<SimulationResult>
where
    F: Fn(usize, &mut StdRng) -> ReplicateOutcome + Sync,
{
    let start = Instant::now();
    let run = || -> Vec<ReplicateOutcome> {
        (0..n_sim)
            .into_par_iter()
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));
                replicate(i + 1, &mut rng)
            })
            .collect()
    };

    let outcomes = if n_threads > 0 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .build()
            .map_err(|e| TrialSimError::Config(format!("failed to create thread pool: {e}")))?;
        pool.install(run)
    } else {
        run()
    };

    let mut result = SimulationResult {
        n_sim,
        ..SimulationResult::default()
    };
    for outcome in outcomes {
        result.records.extend(outcome.records);
        result.failures.extend(outcome.failure);
    }
    result.wall_s = start.elapsed().as_secs_f64();
    Ok(result)
}

pub(crate) fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}
