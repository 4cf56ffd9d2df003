use serde::{Deserialize, Serialize};

use super::rate_table::{RatePeriod, RateTable};
use crate::utilities::validation::{validate_non_empty, ValidationError};

fn default_stratum() -> String {
    "All".to_string()
}

/// Design-level failure assumptions: a control failure rate, the hazard
/// ratio of the experimental arm, and a dropout rate shared by both arms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailRatePeriod {
    #[serde(default = "default_stratum")]
    pub stratum: String,
    pub duration: f64,
    pub fail_rate: f64,
    pub hr: f64,
    #[serde(default)]
    pub dropout_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<FailRatePeriod>", into = "Vec<FailRatePeriod>")]
pub struct FailRateSpec {
    periods: Vec<FailRatePeriod>,
}

impl FailRateSpec {
    pub fn new(periods: Vec<FailRatePeriod>) -> Result<Self, ValidationError> {
        validate_non_empty(&periods, "fail_rate")?;
        for (i, p) in periods.iter().enumerate() {
            if !p.hr.is_finite() || p.hr <= 0.0 {
                return Err(ValidationError::InvalidValue {
                    field: "hr",
                    message: format!("must be finite and > 0, got {} at index {i}", p.hr),
                });
            }
        }
        let spec = Self { periods };
        // Duration and rate checks live in RateTable::new.
        spec.to_rate_tables("control", "experimental")?;
        Ok(spec)
    }

    pub fn periods(&self) -> &[FailRatePeriod] {
        &self.periods
    }

    pub fn strata(&self) -> Vec<String> {
        let mut strata: Vec<String> = Vec::new();
        for p in &self.periods {
            if !strata.contains(&p.stratum) {
                strata.push(p.stratum.clone());
            }
        }
        strata
    }

    /// Per-arm failure table and dropout table. Periods are numbered in
    /// order of appearance within each stratum.
    pub fn to_rate_tables(
        &self,
        control: &str,
        experimental: &str,
    ) -> Result<(RateTable, RateTable), ValidationError> {
        let mut fail = Vec::with_capacity(2 * self.periods.len());
        let mut dropout = Vec::with_capacity(2 * self.periods.len());
        for stratum in self.strata() {
            let rows = self.periods.iter().filter(|p| p.stratum == stratum);
            for (i, p) in rows.enumerate() {
                for (arm, rate) in [(control, p.fail_rate), (experimental, p.fail_rate * p.hr)] {
                    fail.push(RatePeriod {
                        stratum: Some(stratum.clone()),
                        treatment: Some(arm.to_string()),
                        period: i + 1,
                        duration: p.duration,
                        rate,
                    });
                    dropout.push(RatePeriod {
                        stratum: Some(stratum.clone()),
                        treatment: Some(arm.to_string()),
                        period: i + 1,
                        duration: p.duration,
                        rate: p.dropout_rate,
                    });
                }
            }
        }
        Ok((RateTable::new(fail)?, RateTable::new(dropout)?))
    }
}

impl TryFrom<Vec<FailRatePeriod>> for FailRateSpec {
    type Error = ValidationError;

    fn try_from(periods: Vec<FailRatePeriod>) -> Result<Self, Self::Error> {
        FailRateSpec::new(periods)
    }
}

impl From<FailRateSpec> for Vec<FailRatePeriod> {
    fn from(spec: FailRateSpec) -> Self {
        spec.periods
    }
}
