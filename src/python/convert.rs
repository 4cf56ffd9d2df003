use numpy::PyReadonlyArray1;
use pyo3::exceptions::{PyRuntimeError, PyTypeError, PyValueError};
use pyo3::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::TrialSimError;
use crate::utilities::validation::ValidationError;

impl From<ValidationError> for PyErr {
    fn from(err: ValidationError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}

impl From<TrialSimError> for PyErr {
    fn from(err: TrialSimError) -> PyErr {
        if err.is_configuration() {
            PyValueError::new_err(err.to_string())
        } else {
            PyRuntimeError::new_err(err.to_string())
        }
    }
}

fn type_name(obj: &Bound<'_, PyAny>) -> String {
    obj.get_type()
        .name()
        .map(|s| s.to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Accepts a numpy array, a pandas or polars Series, or a list of floats.
#[allow(clippy::collapsible_if)]
pub fn extract_vec_f64(obj: &Bound<'_, PyAny>) -> PyResult<Vec<f64>> {
    if let Ok(arr) = obj.extract::<PyReadonlyArray1<'_, f64>>() {
        return Ok(arr.as_slice()?.to_vec());
    }
    if let Ok(list) = obj.extract::<Vec<f64>>() {
        return Ok(list);
    }
    if let Ok(values) = obj.getattr("values") {
        if let Ok(arr) = values.extract::<PyReadonlyArray1<'_, f64>>() {
            return Ok(arr.as_slice()?.to_vec());
        }
    }
    if let Ok(to_numpy) = obj.getattr("to_numpy") {
        if let Ok(arr_obj) = to_numpy.call0() {
            if let Ok(arr) = arr_obj.extract::<PyReadonlyArray1<'_, f64>>() {
                return Ok(arr.as_slice()?.to_vec());
            }
        }
    }
    Err(PyTypeError::new_err(format!(
        "Cannot convert '{}' to float array. Expected: numpy array, pandas Series, polars Series, or list of floats.",
        type_name(obj)
    )))
}

/// Accepts a list of strings or anything with a `tolist()` method, such as
/// a numpy object array or a pandas Series of labels.
pub fn extract_vec_string(obj: &Bound<'_, PyAny>) -> PyResult<Vec<String>> {
    if let Ok(list) = obj.extract::<Vec<String>>() {
        return Ok(list);
    }
    if let Ok(list) = obj.call_method0("tolist") {
        if let Ok(labels) = list.extract::<Vec<String>>() {
            return Ok(labels);
        }
    }
    Err(PyTypeError::new_err(format!(
        "Cannot convert '{}' to a list of labels. Expected: list of str, numpy array or pandas Series.",
        type_name(obj)
    )))
}

pub fn extract_optional_vec_string(obj: Option<&Bound<'_, PyAny>>) -> PyResult<Option<Vec<String>>> {
    match obj {
        Some(o) => Ok(Some(extract_vec_string(o)?)),
        None => Ok(None),
    }
}

/// Seeded generator, or one seeded from the operating system.
pub fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}
