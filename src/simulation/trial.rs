//! Subject-level simulation of a stratified two-arm (or multi-arm) trial.

use std::collections::HashMap;

use log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::piecewise::{rpwexp_enroll, rpwexp_one};
use super::randomization::randomize_by_fixed_block;
use super::rate_table::{PiecewiseRate, RateTable};
use crate::error::Result;
use crate::utilities::validation::{validate_non_empty, validate_probabilities, ValidationError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StratumShare {
    pub stratum: String,
    pub p: f64,
}

impl StratumShare {
    pub fn new(stratum: impl Into<String>, p: f64) -> Self {
        Self {
            stratum: stratum.into(),
            p,
        }
    }

    pub fn single() -> Vec<Self> {
        vec![Self::new("All", 1.0)]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialDesign {
    pub n: usize,
    pub strata: Vec<StratumShare>,
    pub block: Vec<String>,
    pub enroll_rate: RateTable,
    pub fail_rate: RateTable,
    pub dropout_rate: RateTable,
}

/// One simulated participant. `cte` is the calendar time of the first
/// terminal event (failure or dropout); `fail` is true when failure came
/// first, ties going to the failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub id: usize,
    pub stratum: String,
    pub treatment: String,
    pub enroll_time: f64,
    pub fail_time: f64,
    pub dropout_time: f64,
    pub cte: f64,
    pub fail: bool,
}

impl Subject {
    pub fn new(
        id: usize,
        stratum: String,
        treatment: String,
        enroll_time: f64,
        fail_time: f64,
        dropout_time: f64,
    ) -> Self {
        let fail = fail_time <= dropout_time;
        let cte = enroll_time + fail_time.min(dropout_time);
        Self {
            id,
            stratum,
            treatment,
            enroll_time,
            fail_time,
            dropout_time,
            cte,
            fail,
        }
    }
}

struct ResolvedRates {
    enroll: PiecewiseRate,
    by_group: HashMap<(String, String), (PiecewiseRate, PiecewiseRate)>,
}

impl TrialDesign {
    pub fn treatments(&self) -> Vec<String> {
        let mut labels: Vec<String> = Vec::new();
        for label in &self.block {
            if !labels.contains(label) {
                labels.push(label.clone());
            }
        }
        labels
    }

    /// Checks every table and label before any random draw.
    pub fn validate(&self) -> Result<()> {
        self.resolve().map(|_| ())
    }

    fn resolve(&self) -> Result<ResolvedRates> {
        validate_non_empty(&self.strata, "strata")?;
        let probs: Vec<f64> = self.strata.iter().map(|s| s.p).collect();
        validate_probabilities(&probs, "strata")?;
        validate_non_empty(&self.block, "block")?;

        let enroll = self.enroll_rate.ungrouped("enroll_rate")?;
        let mut by_group = HashMap::new();
        for share in &self.strata {
            for treatment in self.treatments() {
                let fail = self
                    .fail_rate
                    .group("fail_rate", &share.stratum, &treatment)?;
                let dropout = self
                    .dropout_rate
                    .group("dropout_rate", &share.stratum, &treatment)?;
                by_group.insert((share.stratum.clone(), treatment), (fail, dropout));
            }
        }
        Ok(ResolvedRates { enroll, by_group })
    }
}

/// Simulates `design.n` subjects.
///
/// Draw order is fixed so a seed reproduces the trial: strata (one uniform
/// per subject), enrollment arrivals, block randomization per stratum in the
/// order strata are listed, then failure and dropout per subject in
/// enrollment order. Subject ids follow arrival order.
pub fn simulate_trial<R: Rng>(design: &TrialDesign, rng: &mut R) -> Result<Vec<Subject>> {
    let rates = design.resolve()?;
    let n = design.n;

    let mut cumulative = Vec::with_capacity(design.strata.len());
    let mut total = 0.0;
    for share in &design.strata {
        total += share.p;
        cumulative.push(total);
    }
    let stratum_index: Vec<usize> = (0..n)
        .map(|_| {
            let u: f64 = rng.random::<f64>() * total;
            cumulative
                .iter()
                .position(|&c| u < c)
                .unwrap_or(cumulative.len() - 1)
        })
        .collect();

    let enroll_times = rpwexp_enroll(n, &rates.enroll, rng);

    let mut treatments: Vec<String> = vec![String::new(); n];
    for (k, _) in design.strata.iter().enumerate() {
        let members: Vec<usize> = (0..n).filter(|&i| stratum_index[i] == k).collect();
        let assigned = randomize_by_fixed_block(members.len(), &design.block, rng)?;
        for (i, label) in members.into_iter().zip(assigned) {
            treatments[i] = label;
        }
    }

    let mut subjects = Vec::with_capacity(n);
    for (i, (treatment, enroll_time)) in treatments.into_iter().zip(enroll_times).enumerate() {
        let stratum = design.strata[stratum_index[i]].stratum.clone();
        let (fail_rate, dropout_rate) = rates
            .by_group
            .get(&(stratum.clone(), treatment.clone()))
            .ok_or_else(|| ValidationError::MissingRateGroup {
                field: "fail_rate",
                stratum: stratum.clone(),
                treatment: treatment.clone(),
            })?;
        let fail_time = rpwexp_one(fail_rate, rng);
        let dropout_time = rpwexp_one(dropout_rate, rng);
        subjects.push(Subject::new(
            i + 1,
            stratum,
            treatment,
            enroll_time,
            fail_time,
            dropout_time,
        ));
    }

    debug!(
        "simulated {} subjects across {} strata, last enrollment at {:.3}",
        subjects.len(),
        design.strata.len(),
        subjects.last().map_or(0.0, |s| s.enroll_time)
    );
    Ok(subjects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::fail_rate::{FailRatePeriod, FailRateSpec};
    use crate::TrialSimError;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn two_arm_block() -> Vec<String> {
        ["control", "control", "experimental", "experimental"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn two_strata_design(n: usize) -> TrialDesign {
        let spec = FailRateSpec::new(vec![
            FailRatePeriod {
                stratum: "Low".to_string(),
                duration: 6.0,
                fail_rate: 0.03,
                hr: 0.8,
                dropout_rate: 0.001,
            },
            FailRatePeriod {
                stratum: "High".to_string(),
                duration: 6.0,
                fail_rate: 0.08,
                hr: 0.6,
                dropout_rate: 0.001,
            },
        ])
        .unwrap();
        let (fail_rate, dropout_rate) = spec.to_rate_tables("control", "experimental").unwrap();
        TrialDesign {
            n,
            strata: vec![StratumShare::new("Low", 0.4), StratumShare::new("High", 0.6)],
            block: two_arm_block(),
            enroll_rate: RateTable::from_durations(&[2.0, 10.0], &[10.0, 30.0]).unwrap(),
            fail_rate,
            dropout_rate,
        }
    }

    #[test]
    fn test_subject_terminal_event() {
        let s = Subject::new(1, "All".into(), "control".into(), 2.0, 5.0, 3.0);
        assert!(!s.fail);
        assert_eq!(s.cte, 5.0);
        let tie = Subject::new(2, "All".into(), "control".into(), 0.0, 4.0, 4.0);
        assert!(tie.fail);
    }

    #[test]
    fn test_simulate_trial_shape() {
        let design = two_strata_design(400);
        let mut rng = StdRng::seed_from_u64(42);
        let subjects = simulate_trial(&design, &mut rng).unwrap();
        assert_eq!(subjects.len(), 400);
        assert!(subjects.windows(2).all(|w| w[0].enroll_time <= w[1].enroll_time));
        assert!(subjects.iter().enumerate().all(|(i, s)| s.id == i + 1));
        for s in &subjects {
            assert!(s.fail_time.is_finite() && s.fail_time >= 0.0);
            assert!(s.dropout_time.is_finite() && s.dropout_time >= 0.0);
            assert!((s.cte - (s.enroll_time + s.fail_time.min(s.dropout_time))).abs() < 1e-12);
        }
        let n_low = subjects.iter().filter(|s| s.stratum == "Low").count();
        assert!((100..=220).contains(&n_low), "n_low {n_low}");
    }

    #[test]
    fn test_block_balance_within_stratum() {
        let design = two_strata_design(200);
        let mut rng = StdRng::seed_from_u64(7);
        let subjects = simulate_trial(&design, &mut rng).unwrap();
        for stratum in ["Low", "High"] {
            let labels: Vec<&str> = subjects
                .iter()
                .filter(|s| s.stratum == stratum)
                .map(|s| s.treatment.as_str())
                .collect();
            let n_control = labels.iter().filter(|&&t| t == "control").count();
            let n_experimental = labels.len() - n_control;
            assert!(n_control.abs_diff(n_experimental) <= 2);
        }
    }

    #[test]
    fn test_simulate_trial_reproducible() {
        let design = two_strata_design(50);
        let a = simulate_trial(&design, &mut StdRng::seed_from_u64(9)).unwrap();
        let b = simulate_trial(&design, &mut StdRng::seed_from_u64(9)).unwrap();
        let c = simulate_trial(&design, &mut StdRng::seed_from_u64(10)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_missing_rate_group_fails_fast() {
        let mut design = two_strata_design(10);
        design.strata = vec![StratumShare::new("Low", 0.5), StratumShare::new("Medium", 0.5)];
        let err = simulate_trial(&design, &mut StdRng::seed_from_u64(1)).unwrap_err();
        assert!(matches!(
            err,
            TrialSimError::Validation(ValidationError::MissingRateGroup { ref stratum, .. })
                if stratum == "Medium"
        ));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_unknown_block_label_fails_fast() {
        let mut design = two_strata_design(10);
        design.block = vec!["control".to_string(), "placebo".to_string()];
        assert!(design.validate().is_err());
    }

    #[test]
    fn test_bad_stratum_probabilities() {
        let mut design = two_strata_design(10);
        design.strata[0].p = 0.5;
        let err = design.validate().unwrap_err();
        assert!(matches!(
            err,
            TrialSimError::Validation(ValidationError::ProbabilitySum { .. })
        ));
    }

    #[test]
    fn test_stratified_enrollment_rejected() {
        let mut design = two_strata_design(10);
        design.enroll_rate = design.fail_rate.clone();
        assert!(design.validate().is_err());
    }

    #[test]
    fn test_zero_rate_gives_infinite_times() {
        let design = TrialDesign {
            n: 20,
            strata: StratumShare::single(),
            block: two_arm_block(),
            enroll_rate: RateTable::from_durations(&[1.0], &[10.0]).unwrap(),
            fail_rate: RateTable::from_durations(&[1.0], &[0.0]).unwrap(),
            dropout_rate: RateTable::from_durations(&[1.0], &[0.0]).unwrap(),
        };
        let subjects = simulate_trial(&design, &mut StdRng::seed_from_u64(3)).unwrap();
        assert!(subjects.iter().all(|s| s.cte.is_infinite()));
    }
}
