//! Python bindings for hosting the pipeline from a Python invocation wrapper

use crate::config::PipelineConfig;
use crate::core::index::IndexComputer;
use crate::core::pipeline::build_default_pipeline;
use crate::types::{BandSample, FieldError, GeoTransform, RasterBand, BAND_NODATA};
use numpy::{PyReadonlyArray2, ToPyArray};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use serde_json::Value;

fn to_py_err(err: FieldError) -> PyErr {
    match err {
        FieldError::InvalidInput(_) | FieldError::Parse(_) | FieldError::IncomparableBands(_) => {
            PyValueError::new_err(err.to_string())
        }
        _ => PyRuntimeError::new_err(err.to_string()),
    }
}

/// Wrap a bare numpy band with a unit pixel grid
fn numpy_to_band(arr: PyReadonlyArray2<BandSample>) -> RasterBand<BandSample> {
    RasterBand {
        data: arr.as_array().to_owned(),
        transform: GeoTransform::from_array([0.0, 1.0, 0.0, 0.0, 0.0, -1.0]),
        epsg: None,
        nodata: Some(BAND_NODATA),
    }
}

/// Run one invocation with configuration from `FIELDSAT_*` variables.
/// Returns the event JSON unchanged on success.
#[pyfunction]
fn handle_invocation(py: Python, event_json: String) -> PyResult<String> {
    let event: Value = serde_json::from_str(&event_json)
        .map_err(|e| PyValueError::new_err(format!("Invalid event JSON: {}", e)))?;

    let result = py.allow_threads(|| {
        let config = PipelineConfig::from_env()?;
        let pipeline = build_default_pipeline(config)?;
        pipeline.handle(&event)
    });

    let output = result.map_err(to_py_err)?;
    serde_json::to_string(&output).map_err(|e| PyRuntimeError::new_err(e.to_string()))
}

/// `(b - a) / (b + a)` over two uint16 arrays of equal shape
#[pyfunction]
fn normalized_difference(
    py: Python,
    a: PyReadonlyArray2<BandSample>,
    b: PyReadonlyArray2<BandSample>,
    nodata: f32,
) -> PyResult<PyObject> {
    let band_a = numpy_to_band(a);
    let band_b = numpy_to_band(b);

    let index = py
        .allow_threads(|| IndexComputer::normalized_difference(&band_a, &band_b, nodata))
        .map_err(to_py_err)?;

    Ok(index.data.to_pyarray(py).into())
}

#[pymodule]
fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(handle_invocation, m)?)?;
    m.add_function(wrap_pyfunction!(normalized_difference, m)?)?;
    m.add("BAND_NODATA", BAND_NODATA)?;
    m.add("INDEX_NODATA", crate::types::INDEX_NODATA)?;
    Ok(())
}
