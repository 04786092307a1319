//! Python bindings over numpy arrays

use crate::config::YearFrequencyDenominator;
use crate::core::{ConfusionEvaluator, PeriodClassifier, PeriodTarget, ReferenceRaster};
use crate::types::{FloodError, PeriodMask, Raster, RasterGrid, YearSeries};
use chrono::{TimeZone, Utc};
use numpy::{IntoPyArray, PyArray2, PyReadonlyArray2};
use pyo3::exceptions::{PyKeyError, PyOSError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;

fn to_py_err(err: FloodError) -> PyErr {
    match err {
        FloodError::NotFound(_) => PyErr::new::<PyKeyError, _>(err.to_string()),
        FloodError::Configuration(_) | FloodError::Json(_) => PyErr::new::<PyValueError, _>(err.to_string()),
        FloodError::Io(_) => PyErr::new::<PyOSError, _>(err.to_string()),
        _ => PyErr::new::<PyRuntimeError, _>(err.to_string()),
    }
}

fn year_series(
    grid: RasterGrid,
    year: i32,
    masks: Vec<PyReadonlyArray2<'_, bool>>,
) -> PyResult<YearSeries> {
    let start = Utc
        .with_ymd_and_hms(year, 1, 1, 0, 0, 0)
        .single()
        .ok_or_else(|| PyErr::new::<PyValueError, _>(format!("Invalid year: {}", year)))?;

    let periods = masks
        .into_iter()
        .enumerate()
        .map(|(period_index, mask)| -> PyResult<PeriodMask> {
            let water = Raster::new(grid, mask.as_array().to_owned()).map_err(to_py_err)?;
            Ok(PeriodMask {
                year,
                period_index,
                start,
                has_new_data: true,
                water,
            })
        })
        .collect::<PyResult<Vec<_>>>()?;

    Ok(YearSeries { year, periods })
}

/// Classify one period from a baseline raster and per-year lists of water masks.
///
/// Returns `(classification, flood)` arrays.
#[pyfunction]
#[pyo3(signature = (baseline, years, selected_year, selected_period, week_freq, year_freq, selected_year_denominator=false))]
#[allow(clippy::too_many_arguments)]
fn classify_period<'py>(
    py: Python<'py>,
    baseline: PyReadonlyArray2<'py, u8>,
    years: Vec<(i32, Vec<PyReadonlyArray2<'py, bool>>)>,
    selected_year: i32,
    selected_period: usize,
    week_freq: f64,
    year_freq: f64,
    selected_year_denominator: bool,
) -> PyResult<(&'py PyArray2<u8>, &'py PyArray2<bool>)> {
    let baseline = baseline.as_array().to_owned();
    let (rows, cols) = baseline.dim();
    let grid = RasterGrid::with_pixel_size(rows, cols, 1.0);
    let baseline = Raster::new(grid, baseline).map_err(to_py_err)?;

    let series = years
        .into_iter()
        .map(|(year, masks)| year_series(grid, year, masks))
        .collect::<PyResult<Vec<_>>>()?;

    let denominator = if selected_year_denominator {
        YearFrequencyDenominator::SelectedYear
    } else {
        YearFrequencyDenominator::AllYears
    };

    let result = PeriodClassifier::new(&baseline, &series)
        .with_denominator(denominator)
        .classify(PeriodTarget::new(selected_year, selected_period), week_freq, year_freq)
        .map_err(to_py_err)?;

    Ok((
        result.classification.into_data().into_pyarray(py),
        result.flood.into_data().into_pyarray(py),
    ))
}

/// Confusion counts `(tp, fp, fn, tn)` of a predicted flood mask against a reference
#[pyfunction]
fn confusion_counts(
    predicted: PyReadonlyArray2<'_, bool>,
    reference: PyReadonlyArray2<'_, bool>,
) -> PyResult<(u64, u64, u64, u64)> {
    let predicted = predicted.as_array().to_owned();
    let (rows, cols) = predicted.dim();
    let grid = RasterGrid::with_pixel_size(rows, cols, 1.0);

    let predicted = Raster::new(grid, predicted).map_err(to_py_err)?;
    let reference = Raster::new(grid, reference.as_array().to_owned()).map_err(to_py_err)?;
    let reference = ReferenceRaster::new(reference);

    let counts = ConfusionEvaluator::new(&reference)
        .evaluate(&predicted)
        .map_err(to_py_err)?;
    Ok((
        counts.true_positive,
        counts.false_positive,
        counts.false_negative,
        counts.true_negative,
    ))
}

/// Python module definition
#[pymodule]
fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(classify_period, m)?)?;
    m.add_function(wrap_pyfunction!(confusion_counts, m)?)?;
    Ok(())
}
