use serde::{Deserialize, Serialize};

use super::weights::WeightFunction;
use crate::error::{Result, TrialSimError};
use crate::surv_analysis::counting_process::CountingProcess;
use crate::utilities::statistical::normal_cdf;

/// Stratified weighted log-rank statistic.
///
/// `z` is negative when the treatment arm has fewer events than expected and
/// `p_value` is the lower tail `Phi(z)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WlrResult {
    pub weight: WeightFunction,
    pub z: f64,
    pub p_value: f64,
    /// `sum(w * (O - E))`.
    pub score: f64,
    pub std_error: f64,
    pub n_rows: usize,
}

pub fn weighted_logrank(table: &CountingProcess, weight: &WeightFunction) -> Result<WlrResult> {
    let weights = weight.row_weights(table);
    weighted_logrank_with_weights(table, *weight, &weights)
}

pub(crate) fn weighted_logrank_with_weights(
    table: &CountingProcess,
    weight: WeightFunction,
    weights: &[f64],
) -> Result<WlrResult> {
    if table.is_empty() {
        return Err(TrialSimError::degenerate(
            "counting process has no rows with both arms at risk",
        ));
    }
    if weights.iter().all(|&w| w == 0.0) {
        return Err(TrialSimError::degenerate(format!(
            "all weights are zero for {}",
            weight.label()
        )));
    }

    let (score, variance) = table
        .rows
        .iter()
        .zip(weights)
        .fold((0.0, 0.0), |(score, variance), (row, &w)| {
            (score + w * row.o_minus_e, variance + w * w * row.var_o_minus_e)
        });
    if variance <= 0.0 || !variance.is_finite() {
        return Err(TrialSimError::degenerate(format!(
            "variance of {} statistic is {variance}",
            weight.label()
        )));
    }

    let std_error = variance.sqrt();
    let z = score / std_error;
    Ok(WlrResult {
        weight,
        z,
        p_value: normal_cdf(z),
        score,
        std_error,
        n_rows: table.len(),
    })
}
