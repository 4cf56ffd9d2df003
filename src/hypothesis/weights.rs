use serde::{Deserialize, Serialize};

use crate::surv_analysis::counting_process::{CountingProcess, CountingProcessRow};
use crate::utilities::validation::{validate_parameter, ValidationError};

/// Weighting scheme of a weighted log-rank statistic.
///
/// Build through [`WeightFunction::fh`], [`WeightFunction::log_rank`],
/// [`WeightFunction::mb`] or [`WeightFunction::early_zero`]; the factories
/// validate parameters. Deserialized values are validated on the same path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", try_from = "RawWeight")]
pub enum WeightFunction {
    /// `s^rho * (1 - s)^gamma`.
    FlemingHarrington { rho: f64, gamma: f64 },
    /// `min(1 / s, cap)` with a per-stratum cap of `min(w_max, 1 / s*)`.
    ModestlyWeighted { delay: f64, w_max: f64 },
    /// Zero before `early_period`, one from then on.
    EarlyZero { early_period: f64 },
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawWeight {
    FlemingHarrington {
        #[serde(default)]
        rho: f64,
        #[serde(default)]
        gamma: f64,
    },
    ModestlyWeighted {
        #[serde(default)]
        delay: f64,
        #[serde(default)]
        w_max: Option<f64>,
    },
    EarlyZero {
        early_period: f64,
    },
}

impl TryFrom<RawWeight> for WeightFunction {
    type Error = ValidationError;

    fn try_from(raw: RawWeight) -> Result<Self, Self::Error> {
        match raw {
            RawWeight::FlemingHarrington { rho, gamma } => WeightFunction::fh(rho, gamma),
            RawWeight::ModestlyWeighted { delay, w_max } => {
                WeightFunction::mb(delay, w_max.unwrap_or(f64::INFINITY))
            }
            RawWeight::EarlyZero { early_period } => WeightFunction::early_zero(early_period),
        }
    }
}

impl WeightFunction {
    pub fn fh(rho: f64, gamma: f64) -> Result<Self, ValidationError> {
        validate_parameter(rho, "rho")?;
        validate_parameter(gamma, "gamma")?;
        Ok(WeightFunction::FlemingHarrington { rho, gamma })
    }

    pub fn log_rank() -> Self {
        WeightFunction::FlemingHarrington {
            rho: 0.0,
            gamma: 0.0,
        }
    }

    /// `w_max` may be `+inf` for an uncapped weight.
    pub fn mb(delay: f64, w_max: f64) -> Result<Self, ValidationError> {
        validate_parameter(delay, "delay")?;
        if w_max.is_nan() || w_max < 1.0 {
            return Err(ValidationError::InvalidValue {
                field: "w_max",
                message: format!("must be >= 1, got {w_max}"),
            });
        }
        Ok(WeightFunction::ModestlyWeighted { delay, w_max })
    }

    pub fn early_zero(early_period: f64) -> Result<Self, ValidationError> {
        validate_parameter(early_period, "early_period")?;
        Ok(WeightFunction::EarlyZero { early_period })
    }

    /// Weight at left-continuous survival `s` and time `t`. The modestly
    /// weighted scheme is evaluated with `w_max` as its cap here; use
    /// [`WeightFunction::row_weights`] for the per-stratum cap.
    pub fn weight(&self, s: f64, t: f64) -> f64 {
        match *self {
            WeightFunction::FlemingHarrington { rho, gamma } => fh_weight(s, rho, gamma),
            WeightFunction::ModestlyWeighted { w_max, .. } => mb_weight(s, w_max),
            WeightFunction::EarlyZero { early_period } => {
                if t < early_period {
                    0.0
                } else {
                    1.0
                }
            }
        }
    }

    /// One weight per row of `table`.
    pub fn row_weights(&self, table: &CountingProcess) -> Vec<f64> {
        match *self {
            WeightFunction::ModestlyWeighted { delay, w_max } => {
                let mut weights = Vec::with_capacity(table.len());
                for stratum_rows in table.rows.chunk_by(|a, b| a.stratum == b.stratum) {
                    let cap = stratum_cap(stratum_rows, delay, w_max);
                    weights.extend(stratum_rows.iter().map(|r| mb_weight(r.s, cap)));
                }
                weights
            }
            _ => table.rows.iter().map(|r| self.weight(r.s, r.tte)).collect(),
        }
    }

    pub fn label(&self) -> String {
        match *self {
            WeightFunction::FlemingHarrington { rho, gamma } => format!("FH({rho}, {gamma})"),
            WeightFunction::ModestlyWeighted { delay, w_max } => format!("MB({delay}, {w_max})"),
            WeightFunction::EarlyZero { early_period } => format!("EZ({early_period})"),
        }
    }
}

#[inline]
fn fh_weight(s: f64, rho: f64, gamma: f64) -> f64 {
    // 0^0 is 1, which keeps fh(0, 0) at exactly one.
    s.powf(rho) * (1.0 - s).powf(gamma)
}

#[inline]
fn mb_weight(s: f64, cap: f64) -> f64 {
    if s <= 0.0 {
        return cap;
    }
    (1.0 / s).min(cap)
}

fn stratum_cap(rows: &[CountingProcessRow], delay: f64, w_max: f64) -> f64 {
    match rows.iter().find(|r| r.tte >= delay) {
        Some(r) if r.s > 0.0 => w_max.min(1.0 / r.s),
        _ => w_max,
    }
}
