//! Python bindings, built with the `python` feature.

mod convert;

use std::time::Duration;

use pyo3::prelude::*;

use crate::constants::{
    DEFAULT_ALPHA, DEFAULT_EXPERIMENTAL_LABEL, DEFAULT_MVN_ABS_EPS, DEFAULT_MVN_MAX_POINTS,
    DEFAULT_MVN_REL_EPS, DEFAULT_MVN_SEED,
};
use crate::data_cut::cut::{self, CutObservation};
use crate::design::fixed_design::{simulate_fixed_design, FixedDesignConfig};
use crate::design::group_sequential::{default_block, simulate_group_sequential, GroupSequentialConfig};
use crate::design::replicate::SimulationResult;
use crate::hypothesis::maxcombo::{maxcombo as maxcombo_test, MaxComboResult};
use crate::hypothesis::mvn::MvnIntegration;
use crate::hypothesis::weighted_logrank::{weighted_logrank, WlrResult};
use crate::hypothesis::weights::WeightFunction;
use crate::simulation::piecewise;
use crate::simulation::randomization;
use crate::simulation::rate_table::RateTable;
use crate::simulation::trial::{simulate_trial, StratumShare, Subject, TrialDesign};
use crate::surv_analysis::counting_process::{counting_process as build_counting_process, CountingProcess};
use convert::{extract_optional_vec_string, extract_vec_f64, make_rng};

#[derive(Debug, Clone)]
#[pyclass(name = "WeightFunction")]
pub struct PyWeightFunction {
    inner: WeightFunction,
}

#[pymethods]
impl PyWeightFunction {
    #[staticmethod]
    #[pyo3(signature = (rho=0.0, gamma=0.0))]
    fn fh(rho: f64, gamma: f64) -> PyResult<Self> {
        Ok(Self {
            inner: WeightFunction::fh(rho, gamma)?,
        })
    }

    #[staticmethod]
    fn log_rank() -> Self {
        Self {
            inner: WeightFunction::log_rank(),
        }
    }

    #[staticmethod]
    #[pyo3(signature = (delay, w_max=f64::INFINITY))]
    fn mb(delay: f64, w_max: f64) -> PyResult<Self> {
        Ok(Self {
            inner: WeightFunction::mb(delay, w_max)?,
        })
    }

    #[staticmethod]
    fn early_zero(early_period: f64) -> PyResult<Self> {
        Ok(Self {
            inner: WeightFunction::early_zero(early_period)?,
        })
    }

    #[getter]
    fn label(&self) -> String {
        self.inner.label()
    }

    fn __repr__(&self) -> String {
        format!("WeightFunction({})", self.inner.label())
    }
}

#[derive(Debug, Clone)]
#[pyclass]
pub struct TrialOutput {
    #[pyo3(get)]
    pub id: Vec<usize>,
    #[pyo3(get)]
    pub stratum: Vec<String>,
    #[pyo3(get)]
    pub treatment: Vec<String>,
    #[pyo3(get)]
    pub enroll_time: Vec<f64>,
    #[pyo3(get)]
    pub fail_time: Vec<f64>,
    #[pyo3(get)]
    pub dropout_time: Vec<f64>,
    #[pyo3(get)]
    pub cte: Vec<f64>,
    #[pyo3(get)]
    pub fail: Vec<bool>,
    subjects: Vec<Subject>,
}

impl From<Vec<Subject>> for TrialOutput {
    fn from(subjects: Vec<Subject>) -> Self {
        Self {
            id: subjects.iter().map(|s| s.id).collect(),
            stratum: subjects.iter().map(|s| s.stratum.clone()).collect(),
            treatment: subjects.iter().map(|s| s.treatment.clone()).collect(),
            enroll_time: subjects.iter().map(|s| s.enroll_time).collect(),
            fail_time: subjects.iter().map(|s| s.fail_time).collect(),
            dropout_time: subjects.iter().map(|s| s.dropout_time).collect(),
            cte: subjects.iter().map(|s| s.cte).collect(),
            fail: subjects.iter().map(|s| s.fail).collect(),
            subjects,
        }
    }
}

#[pymethods]
impl TrialOutput {
    fn __len__(&self) -> usize {
        self.subjects.len()
    }
}

#[derive(Debug, Clone)]
#[pyclass]
pub struct CutOutput {
    #[pyo3(get)]
    pub id: Vec<usize>,
    #[pyo3(get)]
    pub stratum: Vec<String>,
    #[pyo3(get)]
    pub treatment: Vec<String>,
    #[pyo3(get)]
    pub enroll_time: Vec<f64>,
    #[pyo3(get)]
    pub tte: Vec<f64>,
    #[pyo3(get)]
    pub event: Vec<bool>,
    observations: Vec<CutObservation>,
}

impl From<Vec<CutObservation>> for CutOutput {
    fn from(observations: Vec<CutObservation>) -> Self {
        Self {
            id: observations.iter().map(|o| o.id).collect(),
            stratum: observations.iter().map(|o| o.stratum.clone()).collect(),
            treatment: observations.iter().map(|o| o.treatment.clone()).collect(),
            enroll_time: observations.iter().map(|o| o.enroll_time).collect(),
            tte: observations.iter().map(|o| o.tte).collect(),
            event: observations.iter().map(|o| o.event).collect(),
            observations,
        }
    }
}

#[pymethods]
impl CutOutput {
    fn __len__(&self) -> usize {
        self.observations.len()
    }
}

#[derive(Debug, Clone)]
#[pyclass]
pub struct CountingProcessOutput {
    #[pyo3(get)]
    pub stratum: Vec<String>,
    #[pyo3(get)]
    pub tte: Vec<f64>,
    #[pyo3(get)]
    pub events: Vec<f64>,
    #[pyo3(get)]
    pub treatment_events: Vec<f64>,
    #[pyo3(get)]
    pub n_risk: Vec<f64>,
    #[pyo3(get)]
    pub n_risk_treatment: Vec<f64>,
    #[pyo3(get)]
    pub s: Vec<f64>,
    #[pyo3(get)]
    pub o_minus_e: Vec<f64>,
    #[pyo3(get)]
    pub var_o_minus_e: Vec<f64>,
    table: CountingProcess,
}

impl From<CountingProcess> for CountingProcessOutput {
    fn from(table: CountingProcess) -> Self {
        let rows = &table.rows;
        Self {
            stratum: rows.iter().map(|r| r.stratum.clone()).collect(),
            tte: rows.iter().map(|r| r.tte).collect(),
            events: rows.iter().map(|r| r.events).collect(),
            treatment_events: rows.iter().map(|r| r.treatment_events).collect(),
            n_risk: rows.iter().map(|r| r.n_risk).collect(),
            n_risk_treatment: rows.iter().map(|r| r.n_risk_treatment).collect(),
            s: rows.iter().map(|r| r.s).collect(),
            o_minus_e: rows.iter().map(|r| r.o_minus_e).collect(),
            var_o_minus_e: rows.iter().map(|r| r.var_o_minus_e).collect(),
            table,
        }
    }
}

#[derive(Debug, Clone)]
#[pyclass]
pub struct WlrOutput {
    #[pyo3(get)]
    pub weight: String,
    #[pyo3(get)]
    pub z: f64,
    #[pyo3(get)]
    pub p_value: f64,
    #[pyo3(get)]
    pub score: f64,
    #[pyo3(get)]
    pub std_error: f64,
}

impl From<WlrResult> for WlrOutput {
    fn from(result: WlrResult) -> Self {
        Self {
            weight: result.weight.label(),
            z: result.z,
            p_value: result.p_value,
            score: result.score,
            std_error: result.std_error,
        }
    }
}

#[derive(Debug, Clone)]
#[pyclass]
pub struct MaxComboOutput {
    #[pyo3(get)]
    pub weights: Vec<String>,
    #[pyo3(get)]
    pub z: Vec<f64>,
    #[pyo3(get)]
    pub correlation: Vec<Vec<f64>>,
    #[pyo3(get)]
    pub statistic: f64,
    #[pyo3(get)]
    pub p_value: f64,
    #[pyo3(get)]
    pub integration_error: f64,
    #[pyo3(get)]
    pub converged: bool,
}

impl From<MaxComboResult> for MaxComboOutput {
    fn from(result: MaxComboResult) -> Self {
        Self {
            weights: result.tests.iter().map(|t| t.weight.label()).collect(),
            z: result.z(),
            correlation: result
                .correlation
                .outer_iter()
                .map(|row| row.to_vec())
                .collect(),
            statistic: result.statistic,
            p_value: result.p_value,
            integration_error: result.integration_error,
            converged: result.converged,
        }
    }
}

#[derive(Debug, Clone)]
#[pyclass]
pub struct SimulationOutput {
    #[pyo3(get)]
    pub sim_id: Vec<usize>,
    #[pyo3(get)]
    pub analysis: Vec<usize>,
    #[pyo3(get)]
    pub cut_date: Vec<f64>,
    #[pyo3(get)]
    pub n: Vec<usize>,
    #[pyo3(get)]
    pub events: Vec<usize>,
    #[pyo3(get)]
    pub treatment_events: Vec<usize>,
    #[pyo3(get)]
    pub z: Vec<Vec<f64>>,
    #[pyo3(get)]
    pub p_value: Vec<f64>,
    #[pyo3(get)]
    pub failures: Vec<(usize, Option<usize>, String)>,
    #[pyo3(get)]
    pub wall_s: f64,
    result: SimulationResult,
}

impl From<SimulationResult> for SimulationOutput {
    fn from(result: SimulationResult) -> Self {
        let records = &result.records;
        Self {
            sim_id: records.iter().map(|r| r.sim_id).collect(),
            analysis: records.iter().map(|r| r.analysis).collect(),
            cut_date: records.iter().map(|r| r.cut_date).collect(),
            n: records.iter().map(|r| r.n).collect(),
            events: records.iter().map(|r| r.events).collect(),
            treatment_events: records.iter().map(|r| r.treatment_events).collect(),
            z: records.iter().map(|r| r.output.z()).collect(),
            p_value: records.iter().map(|r| r.output.p_value()).collect(),
            failures: result
                .failures
                .iter()
                .map(|f| (f.sim_id, f.analysis, f.error.clone()))
                .collect(),
            wall_s: result.wall_s,
            result,
        }
    }
}

#[derive(Debug, Clone)]
#[pyclass]
pub struct SummaryOutput {
    #[pyo3(get)]
    pub analysis: Vec<usize>,
    #[pyo3(get)]
    pub n_records: Vec<usize>,
    #[pyo3(get)]
    pub n_failures: Vec<usize>,
    #[pyo3(get)]
    pub mean_cut_date: Vec<f64>,
    #[pyo3(get)]
    pub mean_n: Vec<f64>,
    #[pyo3(get)]
    pub mean_events: Vec<f64>,
    #[pyo3(get)]
    pub rejection_rate: Vec<f64>,
}

#[pymethods]
impl SimulationOutput {
    #[pyo3(signature = (alpha=DEFAULT_ALPHA))]
    fn summarize(&self, alpha: f64) -> PyResult<SummaryOutput> {
        let summary = self.result.summarize(alpha)?;
        Ok(SummaryOutput {
            analysis: summary.iter().map(|s| s.analysis).collect(),
            n_records: summary.iter().map(|s| s.n_records).collect(),
            n_failures: summary.iter().map(|s| s.n_failures).collect(),
            mean_cut_date: summary.iter().map(|s| s.mean_cut_date).collect(),
            mean_n: summary.iter().map(|s| s.mean_n).collect(),
            mean_events: summary.iter().map(|s| s.mean_events).collect(),
            rejection_rate: summary.iter().map(|s| s.rejection_rate).collect(),
        })
    }

    /// Full records, including per-test detail, as JSON.
    fn to_json(&self) -> PyResult<String> {
        serde_json::to_string(&self.result)
            .map_err(|e| pyo3::exceptions::PyRuntimeError::new_err(e.to_string()))
    }
}

fn rate_table(duration: &Bound<'_, PyAny>, rate: &Bound<'_, PyAny>) -> PyResult<RateTable> {
    Ok(RateTable::from_durations(
        &extract_vec_f64(duration)?,
        &extract_vec_f64(rate)?,
    )?)
}

fn parse_rate_table(json: &str) -> PyResult<RateTable> {
    serde_json::from_str(json).map_err(|e| crate::error::TrialSimError::from(e).into())
}

#[pyfunction]
#[pyo3(signature = (n, duration, rate, seed=None))]
pub fn rpwexp(
    n: usize,
    duration: &Bound<'_, PyAny>,
    rate: &Bound<'_, PyAny>,
    seed: Option<u64>,
) -> PyResult<Vec<f64>> {
    let rate = rate_table(duration, rate)?.ungrouped("rate")?;
    Ok(piecewise::rpwexp(n, &rate, &mut make_rng(seed)))
}

#[pyfunction]
#[pyo3(signature = (n, duration, rate, seed=None))]
pub fn rpwexp_enroll(
    n: usize,
    duration: &Bound<'_, PyAny>,
    rate: &Bound<'_, PyAny>,
    seed: Option<u64>,
) -> PyResult<Vec<f64>> {
    let rate = rate_table(duration, rate)?.ungrouped("enroll_rate")?;
    Ok(piecewise::rpwexp_enroll(n, &rate, &mut make_rng(seed)))
}

#[pyfunction]
#[pyo3(signature = (n, block=None, seed=None))]
pub fn randomize_by_fixed_block(
    n: usize,
    block: Option<&Bound<'_, PyAny>>,
    seed: Option<u64>,
) -> PyResult<Vec<String>> {
    let block = extract_optional_vec_string(block)?.unwrap_or_else(default_block);
    Ok(randomization::randomize_by_fixed_block(
        n,
        &block,
        &mut make_rng(seed),
    )?)
}

/// Simulates one trial. Rate tables are JSON lists of
/// `{"stratum", "treatment", "period", "duration", "rate"}` records; the
/// stratum and treatment keys may be left out.
#[pyfunction]
#[allow(clippy::too_many_arguments)]
#[pyo3(signature = (n, enroll_rate, fail_rate, dropout_rate, strata=None, strata_p=None, block=None, seed=None))]
pub fn sim_pw_surv(
    py: Python<'_>,
    n: usize,
    enroll_rate: &str,
    fail_rate: &str,
    dropout_rate: &str,
    strata: Option<&Bound<'_, PyAny>>,
    strata_p: Option<&Bound<'_, PyAny>>,
    block: Option<&Bound<'_, PyAny>>,
    seed: Option<u64>,
) -> PyResult<TrialOutput> {
    let strata = match (extract_optional_vec_string(strata)?, strata_p) {
        (Some(names), Some(p)) => {
            let p = extract_vec_f64(p)?;
            crate::utilities::validation::validate_length(names.len(), p.len(), "strata_p")?;
            names
                .into_iter()
                .zip(p)
                .map(|(name, p)| StratumShare::new(name, p))
                .collect()
        }
        (None, None) => StratumShare::single(),
        _ => {
            return Err(pyo3::exceptions::PyValueError::new_err(
                "strata and strata_p must be given together",
            ))
        }
    };
    let design = TrialDesign {
        n,
        strata,
        block: extract_optional_vec_string(block)?.unwrap_or_else(default_block),
        enroll_rate: parse_rate_table(enroll_rate)?,
        fail_rate: parse_rate_table(fail_rate)?,
        dropout_rate: parse_rate_table(dropout_rate)?,
    };
    let subjects = py.allow_threads(|| simulate_trial(&design, &mut make_rng(seed)))?;
    Ok(subjects.into())
}

#[pyfunction]
pub fn cut_data_by_date(data: PyRef<'_, TrialOutput>, cut_date: f64) -> CutOutput {
    cut::cut_data_by_date(&data.subjects, cut_date).into()
}

#[pyfunction]
pub fn get_cut_date_by_event(data: PyRef<'_, TrialOutput>, target_event: usize) -> f64 {
    cut::get_cut_date_by_event(&data.subjects, target_event)
}

#[pyfunction]
pub fn cut_data_by_event(data: PyRef<'_, TrialOutput>, target_event: usize) -> CutOutput {
    cut::cut_data_by_event(&data.subjects, target_event).into()
}

#[pyfunction]
#[pyo3(signature = (data, treatment=DEFAULT_EXPERIMENTAL_LABEL))]
pub fn counting_process(data: PyRef<'_, CutOutput>, treatment: &str) -> PyResult<CountingProcessOutput> {
    Ok(build_counting_process(&data.observations, treatment)?.into())
}

#[pyfunction]
#[pyo3(signature = (table, weight=None))]
pub fn wlr(
    table: PyRef<'_, CountingProcessOutput>,
    weight: Option<PyRef<'_, PyWeightFunction>>,
) -> PyResult<WlrOutput> {
    let weight = weight.map_or_else(WeightFunction::log_rank, |w| w.inner);
    Ok(weighted_logrank(&table.table, &weight)?.into())
}

#[pyfunction]
#[pyo3(signature = (
    table,
    weights,
    max_points=DEFAULT_MVN_MAX_POINTS,
    abs_eps=DEFAULT_MVN_ABS_EPS,
    rel_eps=DEFAULT_MVN_REL_EPS,
    timeout_s=None,
    seed=DEFAULT_MVN_SEED
))]
pub fn maxcombo(
    py: Python<'_>,
    table: PyRef<'_, CountingProcessOutput>,
    weights: Vec<PyRef<'_, PyWeightFunction>>,
    max_points: usize,
    abs_eps: f64,
    rel_eps: f64,
    timeout_s: Option<f64>,
    seed: u64,
) -> PyResult<MaxComboOutput> {
    let weights: Vec<WeightFunction> = weights.iter().map(|w| w.inner).collect();
    let mut integration = MvnIntegration {
        max_points,
        abs_eps,
        rel_eps,
        seed,
        ..MvnIntegration::default()
    };
    if let Some(timeout) = timeout_s {
        let timeout = Duration::try_from_secs_f64(timeout)
            .map_err(|e| pyo3::exceptions::PyValueError::new_err(format!("timeout_s: {e}")))?;
        integration = integration.with_timeout(timeout);
    }
    let table = table.table.clone();
    let result = py.allow_threads(|| maxcombo_test(&table, &weights, &integration))?;
    Ok(result.into())
}

/// Group-sequential simulation from a JSON configuration.
#[pyfunction]
pub fn sim_gs_n(py: Python<'_>, config: &str) -> PyResult<SimulationOutput> {
    let config = GroupSequentialConfig::from_json_str(config)?;
    let result = py.allow_threads(|| simulate_group_sequential(&config))?;
    Ok(result.into())
}

/// Fixed-design simulation from a JSON configuration.
#[pyfunction]
pub fn sim_fixed_n(py: Python<'_>, config: &str) -> PyResult<SimulationOutput> {
    let config = FixedDesignConfig::from_json_str(config)?;
    let result = py.allow_threads(|| simulate_fixed_design(&config))?;
    Ok(result.into())
}

#[pymodule]
#[pyo3(name = "trialsim")]
fn trialsim_module(_py: Python, m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(rpwexp, m)?)?;
    m.add_function(wrap_pyfunction!(rpwexp_enroll, m)?)?;
    m.add_function(wrap_pyfunction!(randomize_by_fixed_block, m)?)?;
    m.add_function(wrap_pyfunction!(sim_pw_surv, m)?)?;
    m.add_function(wrap_pyfunction!(cut_data_by_date, m)?)?;
    m.add_function(wrap_pyfunction!(get_cut_date_by_event, m)?)?;
    m.add_function(wrap_pyfunction!(cut_data_by_event, m)?)?;
    m.add_function(wrap_pyfunction!(counting_process, m)?)?;
    m.add_function(wrap_pyfunction!(wlr, m)?)?;
    m.add_function(wrap_pyfunction!(maxcombo, m)?)?;
    m.add_function(wrap_pyfunction!(sim_gs_n, m)?)?;
    m.add_function(wrap_pyfunction!(sim_fixed_n, m)?)?;
    m.add_class::<PyWeightFunction>()?;
    m.add_class::<TrialOutput>()?;
    m.add_class::<CutOutput>()?;
    m.add_class::<CountingProcessOutput>()?;
    m.add_class::<WlrOutput>()?;
    m.add_class::<MaxComboOutput>()?;
    m.add_class::<SimulationOutput>()?;
    m.add_class::<SummaryOutput>()?;
    Ok(())
}
