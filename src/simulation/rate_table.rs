use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::utilities::validation::{
    validate_finite, validate_length, validate_no_nan, validate_non_empty, validate_non_negative,
    ValidationError,
};

/// One period of a piecewise-constant rate function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatePeriod {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stratum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub treatment: Option<String>,
    pub period: usize,
    pub duration: f64,
    pub rate: f64,
}

/// Validated piecewise-constant rates keyed by stratum and treatment.
///
/// The stratum and treatment columns are all-or-none: a table either labels
/// every period with a stratum or none of them, and likewise for treatment.
/// An unlabeled column matches every stratum (or treatment) on lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<RatePeriod>", into = "Vec<RatePeriod>")]
pub struct RateTable {
    periods: Vec<RatePeriod>,
}

/// Rates for a single (stratum, treatment) group, ready for variate
/// generation. The last period is extended indefinitely.
#[derive(Debug, Clone, PartialEq)]
pub struct PiecewiseRate {
    durations: Vec<f64>,
    rates: Vec<f64>,
}

impl RateTable {
    pub fn new(periods: Vec<RatePeriod>) -> Result<Self, ValidationError> {
        validate_non_empty(&periods, "rate_table")?;

        let durations: Vec<f64> = periods.iter().map(|p| p.duration).collect();
        let rates: Vec<f64> = periods.iter().map(|p| p.rate).collect();
        validate_no_nan(&durations, "duration")?;
        validate_finite(&rates, "rate")?;
        validate_non_negative(&rates, "rate")?;
        for (i, &d) in durations.iter().enumerate() {
            if d <= 0.0 {
                return Err(ValidationError::InvalidValue {
                    field: "duration",
                    message: format!("must be > 0, got {d} at index {i}"),
                });
            }
        }

        let labeled_strata = periods.iter().filter(|p| p.stratum.is_some()).count();
        if labeled_strata != 0 && labeled_strata != periods.len() {
            return Err(ValidationError::InvalidValue {
                field: "stratum",
                message: "either every period or no period must carry a stratum".to_string(),
            });
        }
        let labeled_treatments = periods.iter().filter(|p| p.treatment.is_some()).count();
        if labeled_treatments != 0 && labeled_treatments != periods.len() {
            return Err(ValidationError::InvalidValue {
                field: "treatment",
                message: "either every period or no period must carry a treatment".to_string(),
            });
        }

        let groups = periods
            .iter()
            .into_group_map_by(|p| (p.stratum.clone(), p.treatment.clone()));
        for ((stratum, treatment), group) in groups {
            let label = group_label(stratum.as_deref(), treatment.as_deref());
            for (position, p) in group.iter().enumerate() {
                if p.period != position + 1 {
                    return Err(ValidationError::NonContiguousPeriods {
                        field: "period",
                        group: label,
                        position,
                        found: p.period,
                    });
                }
                if p.duration.is_infinite() && position + 1 != group.len() {
                    return Err(ValidationError::InvalidValue {
                        field: "duration",
                        message: format!("only the final period of {label} may be unbounded"),
                    });
                }
            }
        }

        Ok(Self { periods })
    }

    /// Ungrouped table from parallel duration and rate columns.
    pub fn from_durations(durations: &[f64], rates: &[f64]) -> Result<Self, ValidationError> {
        validate_length(durations.len(), rates.len(), "rate")?;
        let periods = durations
            .iter()
            .zip(rates)
            .enumerate()
            .map(|(i, (&duration, &rate))| RatePeriod {
                stratum: None,
                treatment: None,
                period: i + 1,
                duration,
                rate,
            })
            .collect();
        Self::new(periods)
    }

    pub fn periods(&self) -> &[RatePeriod] {
        &self.periods
    }

    pub fn is_stratified(&self) -> bool {
        self.periods.iter().any(|p| p.stratum.is_some())
    }

    pub fn is_by_treatment(&self) -> bool {
        self.periods.iter().any(|p| p.treatment.is_some())
    }

    pub fn strata(&self) -> Vec<String> {
        self.periods
            .iter()
            .filter_map(|p| p.stratum.clone())
            .unique()
            .collect()
    }

    pub fn treatments(&self) -> Vec<String> {
        self.periods
            .iter()
            .filter_map(|p| p.treatment.clone())
            .unique()
            .collect()
    }

    /// Periods applying to `stratum` and `treatment`.
    pub fn group(
        &self,
        field: &'static str,
        stratum: &str,
        treatment: &str,
    ) -> Result<PiecewiseRate, ValidationError> {
        let (durations, rates): (Vec<f64>, Vec<f64>) = self
            .periods
            .iter()
            .filter(|p| p.stratum.as_deref().map_or(true, |s| s == stratum))
            .filter(|p| p.treatment.as_deref().map_or(true, |t| t == treatment))
            .map(|p| (p.duration, p.rate))
            .unzip();
        if durations.is_empty() {
            return Err(ValidationError::MissingRateGroup {
                field,
                stratum: stratum.to_string(),
                treatment: treatment.to_string(),
            });
        }
        Ok(PiecewiseRate { durations, rates })
    }

    /// The whole table as one rate function; only valid for tables without
    /// stratum or treatment columns.
    pub fn ungrouped(&self, field: &'static str) -> Result<PiecewiseRate, ValidationError> {
        if self.is_stratified() || self.is_by_treatment() {
            return Err(ValidationError::InvalidValue {
                field,
                message: "expected a table without stratum or treatment columns".to_string(),
            });
        }
        Ok(PiecewiseRate {
            durations: self.periods.iter().map(|p| p.duration).collect(),
            rates: self.periods.iter().map(|p| p.rate).collect(),
        })
    }
}

impl TryFrom<Vec<RatePeriod>> for RateTable {
    type Error = ValidationError;

    fn try_from(periods: Vec<RatePeriod>) -> Result<Self, Self::Error> {
        RateTable::new(periods)
    }
}

impl From<RateTable> for Vec<RatePeriod> {
    fn from(table: RateTable) -> Self {
        table.periods
    }
}

impl PiecewiseRate {
    pub fn durations(&self) -> &[f64] {
        &self.durations
    }

    pub fn rates(&self) -> &[f64] {
        &self.rates
    }

    /// Sum of the stated durations (the final extension is not counted).
    pub fn total_duration(&self) -> f64 {
        self.durations.iter().sum()
    }

    pub fn is_all_zero(&self) -> bool {
        self.rates.iter().all(|&r| r == 0.0)
    }

    pub fn cumulative_hazard(&self, t: f64) -> f64 {
        let last = self.rates.len() - 1;
        let mut t0 = 0.0;
        let mut h0 = 0.0;
        for (i, (&d, &r)) in self.durations.iter().zip(&self.rates).enumerate() {
            if i == last || t <= t0 + d {
                return h0 + r * (t - t0).max(0.0);
            }
            h0 += r * d;
            t0 += d;
        }
        h0
    }

    /// Inverse of the cumulative hazard. Zero-rate periods accumulate no
    /// hazard, so values pass straight through them; a value beyond the
    /// reach of a zero final rate maps to `+inf`.
    pub fn invert_cumulative_hazard(&self, h: f64) -> f64 {
        let last = self.rates.len() - 1;
        let mut t0 = 0.0;
        let mut h0 = 0.0;
        for (i, (&d, &r)) in self.durations.iter().zip(&self.rates).enumerate() {
            if i == last {
                return if r > 0.0 {
                    t0 + (h - h0) / r
                } else {
                    f64::INFINITY
                };
            }
            let h1 = if r > 0.0 { h0 + r * d } else { h0 };
            if r > 0.0 && h <= h1 {
                return t0 + (h - h0) / r;
            }
            t0 += d;
            h0 = h1;
        }
        f64::INFINITY
    }
}

fn group_label(stratum: Option<&str>, treatment: Option<&str>) -> String {
    format!(
        "(stratum={}, treatment={})",
        stratum.unwrap_or("*"),
        treatment.unwrap_or("*")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn period(stratum: &str, treatment: &str, period: usize, duration: f64, rate: f64) -> RatePeriod {
        RatePeriod {
            stratum: Some(stratum.to_string()),
            treatment: Some(treatment.to_string()),
            period,
            duration,
            rate,
        }
    }

    #[test]
    fn test_from_durations() {
        let table = RateTable::from_durations(&[1.0, 2.0], &[2.0, 5.0]).unwrap();
        assert_eq!(table.periods().len(), 2);
        assert!(!table.is_stratified());
        let rate = table.ungrouped("enroll_rate").unwrap();
        assert_eq!(rate.durations(), &[1.0, 2.0]);
        assert_abs_diff_eq!(rate.total_duration(), 3.0);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(RateTable::from_durations(&[1.0], &[-1.0]).is_err());
        assert!(RateTable::from_durations(&[0.0], &[1.0]).is_err());
        assert!(RateTable::from_durations(&[1.0, 2.0], &[1.0]).is_err());
        assert!(RateTable::from_durations(&[f64::INFINITY, 1.0], &[1.0, 1.0]).is_err());
        assert!(RateTable::from_durations(&[1.0, f64::INFINITY], &[1.0, 1.0]).is_ok());
        assert!(RateTable::new(vec![]).is_err());
    }

    #[test]
    fn test_rejects_non_contiguous_periods() {
        let err = RateTable::new(vec![
            period("a", "control", 1, 1.0, 0.1),
            period("a", "control", 3, 1.0, 0.1),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            ValidationError::NonContiguousPeriods { found: 3, position: 1, .. }
        ));
    }

    #[test]
    fn test_rejects_mixed_labels() {
        let mut unlabeled = period("a", "control", 1, 1.0, 0.1);
        unlabeled.stratum = None;
        let err = RateTable::new(vec![period("b", "control", 1, 1.0, 0.1), unlabeled]);
        assert!(matches!(
            err,
            Err(ValidationError::InvalidValue { field: "stratum", .. })
        ));
    }

    #[test]
    fn test_group_lookup() {
        let table = RateTable::new(vec![
            period("a", "control", 1, 3.0, 0.1),
            period("a", "experimental", 1, 3.0, 0.05),
            period("a", "control", 2, 100.0, 0.2),
            period("a", "experimental", 2, 100.0, 0.1),
        ])
        .unwrap();
        let control = table.group("fail_rate", "a", "control").unwrap();
        assert_eq!(control.rates(), &[0.1, 0.2]);
        assert_eq!(table.strata(), vec!["a".to_string()]);
        assert_eq!(table.treatments().len(), 2);
        let err = table.group("fail_rate", "b", "control").unwrap_err();
        assert!(matches!(err, ValidationError::MissingRateGroup { .. }));
        assert!(table.ungrouped("enroll_rate").is_err());
    }

    #[test]
    fn test_unlabeled_column_matches_everything() {
        let table = RateTable::new(vec![RatePeriod {
            stratum: Some("a".to_string()),
            treatment: None,
            period: 1,
            duration: 1.0,
            rate: 0.3,
        }])
        .unwrap();
        assert!(table.group("dropout_rate", "a", "anything").is_ok());
        assert!(table.group("dropout_rate", "b", "anything").is_err());
    }

    #[test]
    fn test_cumulative_hazard_inverse() {
        let rate = RateTable::from_durations(&[1.0, 2.0, 1.0], &[2.0, 0.0, 5.0])
            .unwrap()
            .ungrouped("x")
            .unwrap();
        assert_abs_diff_eq!(rate.cumulative_hazard(0.5), 1.0);
        assert_abs_diff_eq!(rate.cumulative_hazard(2.0), 2.0);
        assert_abs_diff_eq!(rate.cumulative_hazard(4.0), 7.0);
        assert_abs_diff_eq!(rate.invert_cumulative_hazard(1.0), 0.5);
        // Zero-rate period is skipped: hazard 2.5 lands 0.1 into the third period.
        assert_abs_diff_eq!(rate.invert_cumulative_hazard(2.5), 3.1, epsilon = 1e-12);
        // Last period extended.
        assert_abs_diff_eq!(rate.invert_cumulative_hazard(12.0), 5.0, epsilon = 1e-12);
        for &h in &[0.3, 1.7, 2.2, 9.0] {
            let t = rate.invert_cumulative_hazard(h);
            assert_abs_diff_eq!(rate.cumulative_hazard(t), h, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_zero_final_rate_is_infinite() {
        let rate = RateTable::from_durations(&[1.0, 1.0], &[1.0, 0.0])
            .unwrap()
            .ungrouped("x")
            .unwrap();
        assert_abs_diff_eq!(rate.invert_cumulative_hazard(0.5), 0.5);
        assert_eq!(rate.invert_cumulative_hazard(1.5), f64::INFINITY);
    }

    #[test]
    fn test_serde_round_trip_validates() {
        let json = r#"[{"period":1,"duration":2.0,"rate":0.5},{"period":3,"duration":1.0,"rate":0.1}]"#;
        assert!(serde_json::from_str::<RateTable>(json).is_err());
        let json = r#"[{"period":1,"duration":2.0,"rate":0.5},{"period":2,"duration":1.0,"rate":0.1}]"#;
        let table: RateTable = serde_json::from_str(json).unwrap();
        assert_eq!(table.periods().len(), 2);
    }
}
