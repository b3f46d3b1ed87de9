use std::str::FromStr;

use nalgebra::DMatrix;
use numpy::{PyArray1, PyArray2, PyReadonlyArray1};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::error::BehaviourError;
use crate::finite_strain::{
    compute_cauchy_stress_from_second_piola_kirchhoff_stress, compute_green_lagrange_strain,
    compute_logarithmic_strain_and_derivative,
    compute_second_piola_kirchhoff_stress_from_cauchy_stress,
};
use crate::hypothesis::{ElasticSymmetry, ModellingHypothesis, OrthotropicAxesConvention};
use crate::stiffness::compute_stiffness_tensor;

fn value_error(e: BehaviourError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

fn parse<T: FromStr>(what: &str, name: &str) -> PyResult<T> {
    T::from_str(name).map_err(|_| PyValueError::new_err(format!("unknown {what} '{name}'")))
}

fn deformation_gradient<'a>(f: &'a PyReadonlyArray1<f64>) -> PyResult<&'a [f64]> {
    let f = f.as_slice()?;
    if f.len() != 9 {
        return Err(PyValueError::new_err(format!(
            "the deformation gradient must hold 9 values in column-major order, got {}",
            f.len()
        )));
    }
    Ok(f)
}

fn stensor<'a>(
    s: &'a PyReadonlyArray1<f64>,
    hypothesis: ModellingHypothesis,
) -> PyResult<&'a [f64]> {
    let s = s.as_slice()?;
    if s.len() < hypothesis.stensor_size() {
        return Err(PyValueError::new_err(format!(
            "expected {} stress components for hypothesis '{}', got {}",
            hypothesis.stensor_size(),
            hypothesis,
            s.len()
        )));
    }
    Ok(s)
}

fn to_pyarray2<'py>(py: Python<'py>, m: &DMatrix<f64>) -> PyResult<&'py PyArray2<f64>> {
    let rows: Vec<Vec<f64>> = m
        .row_iter()
        .map(|row| row.iter().copied().collect())
        .collect();
    Ok(PyArray2::from_vec2(py, &rows)?)
}

/// Elastic stiffness `σ = C : ε` in the internal convention.
#[pyfunction]
#[pyo3(signature = (symmetry, hypothesis, props, convention = "Default", altered = true))]
fn stiffness_tensor<'py>(
    py: Python<'py>,
    symmetry: &str,
    hypothesis: &str,
    props: PyReadonlyArray1<f64>,
    convention: &str,
    altered: bool,
) -> PyResult<&'py PyArray2<f64>> {
    let symmetry: ElasticSymmetry = parse("elastic symmetry", symmetry)?;
    let hypothesis: ModellingHypothesis = parse("modelling hypothesis", hypothesis)?;
    let convention: OrthotropicAxesConvention = parse("orthotropic axes convention", convention)?;
    let k = compute_stiffness_tensor(symmetry, hypothesis, convention, props.as_slice()?, altered)
        .map_err(value_error)?;
    to_pyarray2(py, &k)
}

#[pyfunction]
fn green_lagrange_strain<'py>(
    py: Python<'py>,
    f: PyReadonlyArray1<f64>,
    hypothesis: &str,
) -> PyResult<&'py PyArray1<f64>> {
    let hypothesis: ModellingHypothesis = parse("modelling hypothesis", hypothesis)?;
    let e = compute_green_lagrange_strain(deformation_gradient(&f)?, hypothesis);
    Ok(PyArray1::from_slice(py, e.as_slice()))
}

/// Returns the logarithmic strain and its derivative with respect to the
/// Green-Lagrange strain.
#[pyfunction]
fn logarithmic_strain<'py>(
    py: Python<'py>,
    f: PyReadonlyArray1<f64>,
    hypothesis: &str,
) -> PyResult<(&'py PyArray1<f64>, &'py PyArray2<f64>)> {
    let hypothesis: ModellingHypothesis = parse("modelling hypothesis", hypothesis)?;
    let (e, p) = compute_logarithmic_strain_and_derivative(deformation_gradient(&f)?, hypothesis);
    Ok((PyArray1::from_slice(py, e.as_slice()), to_pyarray2(py, &p)?))
}

#[pyfunction]
#[pyo3(signature = (stress, f, hypothesis, fzz = 1.0))]
fn second_piola_kirchhoff_stress<'py>(
    py: Python<'py>,
    stress: PyReadonlyArray1<f64>,
    f: PyReadonlyArray1<f64>,
    hypothesis: &str,
    fzz: f64,
) -> PyResult<&'py PyArray1<f64>> {
    let hypothesis: ModellingHypothesis = parse("modelling hypothesis", hypothesis)?;
    let s = compute_second_piola_kirchhoff_stress_from_cauchy_stress(
        stensor(&stress, hypothesis)?,
        deformation_gradient(&f)?,
        hypothesis,
        fzz,
    );
    Ok(PyArray1::from_slice(py, s.as_slice()))
}

#[pyfunction]
#[pyo3(signature = (sk2, f, hypothesis, fzz = 1.0))]
fn cauchy_stress<'py>(
    py: Python<'py>,
    sk2: PyReadonlyArray1<f64>,
    f: PyReadonlyArray1<f64>,
    hypothesis: &str,
    fzz: f64,
) -> PyResult<&'py PyArray1<f64>> {
    let hypothesis: ModellingHypothesis = parse("modelling hypothesis", hypothesis)?;
    let s = compute_cauchy_stress_from_second_piola_kirchhoff_stress(
        stensor(&sk2, hypothesis)?,
        deformation_gradient(&f)?,
        hypothesis,
        fzz,
    );
    Ok(PyArray1::from_slice(py, s.as_slice()))
}

#[pymodule]
fn tfel_behaviour(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(stiffness_tensor, m)?)?;
    m.add_function(wrap_pyfunction!(green_lagrange_strain, m)?)?;
    m.add_function(wrap_pyfunction!(logarithmic_strain, m)?)?;
    m.add_function(wrap_pyfunction!(second_piola_kirchhoff_stress, m)?)?;
    m.add_function(wrap_pyfunction!(cauchy_stress, m)?)?;
    Ok(())
}
