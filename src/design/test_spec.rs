use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::hypothesis::maxcombo::{maxcombo, MaxComboResult};
use crate::hypothesis::mvn::MvnIntegration;
use crate::hypothesis::weighted_logrank::{weighted_logrank, WlrResult};
use crate::hypothesis::weights::WeightFunction;
use crate::surv_analysis::counting_process::CountingProcess;
use crate::utilities::validation::{validate_length, validate_non_empty, ValidationError};

/// Test applied at an analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "test", rename_all = "snake_case")]
pub enum TestSpec {
    Wlr {
        weight: WeightFunction,
    },
    MaxCombo {
        weights: Vec<WeightFunction>,
        #[serde(default)]
        integration: MvnIntegration,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "test", rename_all = "snake_case")]
pub enum TestOutput {
    Wlr(WlrResult),
    MaxCombo(MaxComboResult),
}

impl TestSpec {
    pub fn log_rank() -> Self {
        TestSpec::Wlr {
            weight: WeightFunction::log_rank(),
        }
    }

    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if let TestSpec::MaxCombo {
            weights,
            integration,
        } = self
        {
            validate_non_empty(weights, "weights")?;
            integration.validate()?;
        }
        Ok(())
    }

    pub fn run(&self, table: &CountingProcess) -> Result<TestOutput> {
        match self {
            TestSpec::Wlr { weight } => Ok(TestOutput::Wlr(weighted_logrank(table, weight)?)),
            TestSpec::MaxCombo {
                weights,
                integration,
            } => Ok(TestOutput::MaxCombo(maxcombo(table, weights, integration)?)),
        }
    }
}

impl TestOutput {
    pub fn p_value(&self) -> f64 {
        match self {
            TestOutput::Wlr(r) => r.p_value,
            TestOutput::MaxCombo(r) => r.p_value,
        }
    }

    /// One z per weight configuration.
    pub fn z(&self) -> Vec<f64> {
        match self {
            TestOutput::Wlr(r) => vec![r.z],
            TestOutput::MaxCombo(r) => r.z(),
        }
    }
}

/// Tests for a sequence of analyses: one test for all of them, or one per
/// analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestPlan {
    Uniform(TestSpec),
    PerAnalysis(Vec<TestSpec>),
}

impl TestPlan {
    /// The test of every analysis, in order.
    pub fn resolve(&self, n_analyses: usize) -> std::result::Result<Vec<TestSpec>, ValidationError> {
        let tests = match self {
            TestPlan::Uniform(test) => vec![test.clone(); n_analyses],
            TestPlan::PerAnalysis(tests) => {
                validate_length(n_analyses, tests.len(), "tests")?;
                tests.clone()
            }
        };
        for test in &tests {
            test.validate()?;
        }
        Ok(tests)
    }
}

impl From<TestSpec> for TestPlan {
    fn from(test: TestSpec) -> Self {
        TestPlan::Uniform(test)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_resolution() {
        let plan = TestPlan::from(TestSpec::log_rank());
        assert_eq!(plan.resolve(3).unwrap().len(), 3);
        let per = TestPlan::PerAnalysis(vec![TestSpec::log_rank(), TestSpec::log_rank()]);
        assert_eq!(per.resolve(2).unwrap().len(), 2);
        assert!(matches!(
            per.resolve(3),
            Err(ValidationError::LengthMismatch { field: "tests", .. })
        ));
    }

    #[test]
    fn test_empty_maxcombo_rejected() {
        let plan = TestPlan::Uniform(TestSpec::MaxCombo {
            weights: vec![],
            integration: MvnIntegration::default(),
        });
        assert!(plan.resolve(1).is_err());
    }

    #[test]
    fn test_plan_from_json() {
        let json = r#"{
            "per_analysis": [
                {"test": "wlr", "weight": {"type": "fleming_harrington", "rho": 0, "gamma": 0}},
                {"test": "max_combo", "weights": [
                    {"type": "fleming_harrington", "rho": 0, "gamma": 0},
                    {"type": "fleming_harrington", "rho": 0, "gamma": 0.5}
                ]}
            ]
        }"#;
        let plan: TestPlan = serde_json::from_str(json).unwrap();
        let tests = plan.resolve(2).unwrap();
        assert_eq!(tests[0], TestSpec::log_rank());
        match &tests[1] {
            TestSpec::MaxCombo {
                weights,
                integration,
            } => {
                assert_eq!(weights.len(), 2);
                assert_eq!(*integration, MvnIntegration::default());
            }
            other => panic!("unexpected test {other:?}"),
        }
    }
}
