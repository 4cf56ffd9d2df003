use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::replicate::SimulationResult;
use crate::utilities::statistical::mean;
use crate::utilities::validation::ValidationError;

/// Operating characteristics of one analysis across replicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub analysis: usize,
    /// Replicates with a record at this analysis.
    pub n_records: usize,
    /// Replicates without a record here because they stopped at or before
    /// this analysis.
    pub n_failures: usize,
    pub mean_cut_date: f64,
    pub mean_n: f64,
    pub mean_events: f64,
    /// Share of records with `p_value < alpha`.
    pub rejection_rate: f64,
}

impl SimulationResult {
    /// Per-analysis summary in analysis order. A failure ends its replicate,
    /// so it counts against its own analysis and every later one; replicates
    /// that could not be simulated at all count against every analysis.
    pub fn summarize(&self, alpha: f64) -> Result<Vec<AnalysisSummary>, ValidationError> {
        if !(0.0..=1.0).contains(&alpha) {
            return Err(ValidationError::InvalidValue {
                field: "alpha",
                message: format!("must be in [0, 1], got {alpha}"),
            });
        }

        let mut by_analysis: BTreeMap<usize, Vec<_>> = BTreeMap::new();
        for record in &self.records {
            by_analysis.entry(record.analysis).or_default().push(record);
        }
        for failure in &self.failures {
            if let Some(analysis) = failure.analysis {
                by_analysis.entry(analysis).or_default();
            }
        }

        Ok(by_analysis
            .into_iter()
            .map(|(analysis, records)| {
                let cut_dates: Vec<f64> = records.iter().map(|r| r.cut_date).collect();
                let n: Vec<f64> = records.iter().map(|r| r.n as f64).collect();
                let events: Vec<f64> = records.iter().map(|r| r.events as f64).collect();
                let rejected = records
                    .iter()
                    .filter(|r| r.output.p_value() < alpha)
                    .count();
                AnalysisSummary {
                    analysis,
                    n_records: records.len(),
                    n_failures: self
                        .failures
                        .iter()
                        .filter(|f| f.analysis.is_none_or(|stopped| stopped <= analysis))
                        .count(),
                    mean_cut_date: mean(&cut_dates),
                    mean_n: mean(&n),
                    mean_events: mean(&events),
                    rejection_rate: if records.is_empty() {
                        f64::NAN
                    } else {
                        rejected as f64 / records.len() as f64
                    },
                }
            })
            .collect())
    }
}
