use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::mvn::MvnIntegration;
use super::weighted_logrank::{weighted_logrank_with_weights, WlrResult};
use super::weights::WeightFunction;
use crate::error::Result;
use crate::surv_analysis::counting_process::CountingProcess;
use crate::utilities::validation::validate_non_empty;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaxComboResult {
    pub tests: Vec<WlrResult>,
    pub correlation: Array2<f64>,
    /// `max(-z)` over the configurations.
    pub statistic: f64,
    pub p_value: f64,
    pub integration_error: f64,
    pub converged: bool,
}

impl MaxComboResult {
    pub fn z(&self) -> Vec<f64> {
        self.tests.iter().map(|t| t.z).collect()
    }
}

/// MaxCombo test over `weights`.
///
/// The statistics are jointly normal with correlation
/// `sum(w_i w_j V) / sqrt(sum(w_i^2 V) sum(w_j^2 V))` and the p-value is
/// `1 - P(-Z_i <= statistic for all i)`.
pub fn maxcombo(
    table: &CountingProcess,
    weights: &[WeightFunction],
    integration: &MvnIntegration,
) -> Result<MaxComboResult> {
    validate_non_empty(weights, "weights")?;
    let row_weights: Vec<Vec<f64>> = weights.iter().map(|w| w.row_weights(table)).collect();
    let tests = weights
        .iter()
        .zip(&row_weights)
        .map(|(w, rw)| weighted_logrank_with_weights(table, *w, rw))
        .collect::<Result<Vec<_>>>()?;

    let k = weights.len();
    let mut correlation = Array2::<f64>::eye(k);
    for i in 0..k {
        for j in 0..i {
            let covariance: f64 = table
                .rows
                .iter()
                .zip(row_weights[i].iter().zip(&row_weights[j]))
                .map(|(row, (wi, wj))| wi * wj * row.var_o_minus_e)
                .sum();
            let r = covariance / (tests[i].std_error * tests[j].std_error);
            correlation[[i, j]] = r;
            correlation[[j, i]] = r;
        }
    }

    let statistic = tests
        .iter()
        .map(|t| -t.z)
        .fold(f64::NEG_INFINITY, f64::max);

    if k == 1 {
        return Ok(MaxComboResult {
            p_value: tests[0].p_value,
            tests,
            correlation,
            statistic,
            integration_error: 0.0,
            converged: true,
        });
    }

    let probability = integration.cdf(&vec![statistic; k], &correlation)?;
    Ok(MaxComboResult {
        tests,
        correlation,
        statistic,
        p_value: (1.0 - probability.value).clamp(0.0, 1.0),
        integration_error: probability.error,
        converged: probability.converged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrialSimError;
    use crate::hypothesis::weighted_logrank::weighted_logrank;
    use crate::surv_analysis::counting_process::CountingProcessRow;

    fn table() -> CountingProcess {
        let rows = [(1.0, 1.0, 0.0, 10.0, 5.0), (2.0, 2.0, 0.0, 9.0, 5.0), (4.0, 1.0, 1.0, 7.0, 5.0), (6.0, 1.0, 0.0, 5.0, 4.0)];
        let mut s = 1.0;
        let rows = rows
            .iter()
            .map(|&(tte, events, treatment_events, n_risk, n_risk_treatment)| {
                let row = CountingProcessRow {
                    stratum: "All".to_string(),
                    tte,
                    events,
                    treatment_events,
                    n_risk,
                    n_risk_treatment,
                    s,
                    o_minus_e: treatment_events - events * n_risk_treatment / n_risk,
                    var_o_minus_e: events * (n_risk - events) * n_risk_treatment * (n_risk - n_risk_treatment)
                        / (n_risk * n_risk * (n_risk - 1.0)),
                };
                s *= 1.0 - events / n_risk;
                row
            })
            .collect();
        CountingProcess { rows }
    }

    #[test]
    fn test_single_configuration_matches_wlr() {
        let t = table();
        let weight = WeightFunction::fh(0.0, 0.5).unwrap();
        let combo = maxcombo(&t, &[weight], &MvnIntegration::default()).unwrap();
        let single = weighted_logrank(&t, &weight).unwrap();
        assert_eq!(combo.tests[0], single);
        assert_eq!(combo.p_value, single.p_value);
        assert_eq!(combo.statistic, -single.z);
        assert_eq!(combo.correlation, Array2::<f64>::eye(1));
    }

    #[test]
    fn test_duplicate_configuration_is_perfectly_correlated() {
        let t = table();
        let lr = WeightFunction::log_rank();
        let combo = maxcombo(&t, &[lr, lr], &MvnIntegration::default()).unwrap();
        assert!((combo.correlation[[0, 1]] - 1.0).abs() < 1e-12);
        assert!((combo.p_value - combo.tests[0].p_value).abs() < 1e-4);
    }

    #[test]
    fn test_combo_p_bounds() {
        let t = table();
        let weights = [
            WeightFunction::log_rank(),
            WeightFunction::fh(0.0, 1.0).unwrap(),
            WeightFunction::fh(1.0, 0.0).unwrap(),
        ];
        let combo = maxcombo(&t, &weights, &MvnIntegration::default()).unwrap();
        let smallest = combo
            .tests
            .iter()
            .map(|r| r.p_value)
            .fold(f64::INFINITY, f64::min);
        // Bonferroni bounds for the max of the oriented statistics.
        assert!(combo.p_value >= smallest - 1e-4);
        assert!(combo.p_value <= 3.0 * smallest + 1e-4);
        for i in 0..3 {
            assert_eq!(combo.correlation[[i, i]], 1.0);
        }
    }

    #[test]
    fn test_empty_weights_and_degenerate_config() {
        let t = table();
        assert!(maxcombo(&t, &[], &MvnIntegration::default())
            .unwrap_err()
            .is_configuration());
        let weights = [WeightFunction::log_rank(), WeightFunction::early_zero(100.0).unwrap()];
        assert!(matches!(
            maxcombo(&t, &weights, &MvnIntegration::default()),
            Err(TrialSimError::DegenerateStatistic { .. })
        ));
    }
}
