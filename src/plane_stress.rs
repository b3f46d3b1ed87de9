//! Plane stress computations performed with a behaviour written for the
//! generalised plane strain hypothesis.
//!
//! The axial strain increment is found by a secant method so that the
//! axial stress vanishes. The axial strain itself is stored as the last
//! state variable, hidden from the wrapped behaviour.
use log::trace;

use crate::error::{BehaviourError, Result};
use crate::hypothesis::ElasticSymmetry;

const AXIAL_STRESS_TOLERANCE: f64 = 1e-12;
const MAXIMUM_NUMBER_OF_CALLS: usize = 50;

/// `Δεzz ≈ c1·Δεxx + c2·Δεyy - c3·σzz`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneStressCoefficients {
    pub c1: f64,
    pub c2: f64,
    pub c3: f64,
}

impl PlaneStressCoefficients {
    pub fn isotropic(young: f64, nu: f64) -> Self {
        let c1 = -nu / (1.0 - nu);
        Self {
            c1,
            c2: c1,
            c3: 1.0 / young,
        }
    }

    /// Coefficients of an orthotropic behaviour, computed from the normal
    /// block of the compliance tensor.
    pub fn orthotropic(e1: f64, e2: f64, e3: f64, nu12: f64, nu23: f64, nu13: f64) -> Self {
        let s11 = 1.0 / e1;
        let s22 = 1.0 / e2;
        let s33 = 1.0 / e3;
        let s12 = -nu12 / e1;
        let s13 = -nu13 / e1;
        let s23 = -nu23 / e2;
        let det = s11 * s22 * s33 + 2.0 * s23 * s13 * s12
            - s11 * s23 * s23
            - s22 * s13 * s13
            - s33 * s12 * s12;
        let c22 = (s11 * s22 - s12 * s12) / det;
        let c20 = (s12 * s23 - s13 * s22) / det;
        let c21 = (s12 * s13 - s11 * s23) / det;
        Self {
            c1: -c20 / c22,
            c2: -c21 / c22,
            c3: s33,
        }
    }

    /// Reads `[E, ν]` or `[E1, E2, E3, ν12, ν23, ν13, ...]`.
    pub fn from_material_properties(symmetry: ElasticSymmetry, props: &[f64]) -> Result<Self> {
        let expected = match symmetry {
            ElasticSymmetry::Isotropic => 2,
            ElasticSymmetry::Orthotropic => 6,
        };
        if props.len() < expected {
            return Err(BehaviourError::InvalidMaterialProperties {
                context: "PlaneStressCoefficients::from_material_properties",
                symmetry,
                hypothesis: crate::hypothesis::ModellingHypothesis::PlaneStress,
                expected,
                got: props.len(),
            });
        }
        Ok(match symmetry {
            ElasticSymmetry::Isotropic => Self::isotropic(props[0], props[1]),
            ElasticSymmetry::Orthotropic => {
                Self::orthotropic(props[0], props[1], props[2], props[3], props[4], props[5])
            }
        })
    }
}

/// Result of a plane stress integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneStressOutcome {
    /// `false` if the wrapped behaviour reported a failure.
    pub success: bool,
    /// Number of calls to the wrapped behaviour.
    pub calls: usize,
}

/// Arguments of one call to the generalised plane strain behaviour.
pub struct GeneralisedPlaneStrainStep<'a> {
    /// Total strain at the beginning of the step, the axial strain being
    /// read from the last state variable.
    pub strain: &'a [f64; 4],
    pub strain_increment: &'a [f64; 4],
    /// Stress at the beginning of the step on input, at the end on output.
    pub stress: &'a mut [f64; 4],
    /// State variables without the axial strain.
    pub state_variables: &'a mut [f64],
}

#[derive(Debug, Clone, Copy)]
pub struct PlaneStressReducer {
    coefficients: PlaneStressCoefficients,
}

impl PlaneStressReducer {
    pub fn new(coefficients: PlaneStressCoefficients) -> Self {
        Self { coefficients }
    }

    pub fn coefficients(&self) -> &PlaneStressCoefficients {
        &self.coefficients
    }

    /// Integrates a plane stress step.
    ///
    /// `stress` and `statev` hold the values at the beginning of the step and
    /// are only updated on success. The last entry of `statev` is the axial
    /// strain. `call` integrates the generalised plane strain behaviour and
    /// returns `false` on failure.
    pub fn integrate<F>(
        &self,
        strain: &[f64],
        strain_increment: &[f64],
        stress: &mut [f64],
        statev: &mut [f64],
        mut call: F,
    ) -> Result<PlaneStressOutcome>
    where
        F: FnMut(GeneralisedPlaneStrainStep<'_>) -> bool,
    {
        for (what, len) in [
            ("strain", strain.len()),
            ("strain increment", strain_increment.len()),
            ("stress", stress.len()),
        ] {
            if len != 4 {
                return Err(BehaviourError::InvalidBufferSize {
                    context: "PlaneStressReducer::integrate",
                    what,
                    expected: 4,
                    got: len,
                });
            }
        }
        let Some((&axial_strain, internal_variables)) = statev.split_last() else {
            return Err(BehaviourError::InvalidBufferSize {
                context: "PlaneStressReducer::integrate",
                what: "state variables",
                expected: 1,
                got: 0,
            });
        };
        let PlaneStressCoefficients { c1, c2, c3 } = self.coefficients;
        let mut eto = [0.0; 4];
        eto.copy_from_slice(strain);
        eto[2] = axial_strain;
        let mut s = [0.0; 4];
        let mut v = internal_variables.to_vec();
        let mut calls = 0;
        let mut step = |dez: f64, s: &mut [f64; 4], v: &mut Vec<f64>| {
            let mut deto = [0.0; 4];
            deto.copy_from_slice(strain_increment);
            deto[2] = dez;
            s.copy_from_slice(stress);
            v.copy_from_slice(internal_variables);
            calls += 1;
            call(GeneralisedPlaneStrainStep {
                strain: &eto,
                strain_increment: &deto,
                stress: s,
                state_variables: v,
            })
        };
        let mut dez = -c3 * stress[2] + c1 * strain_increment[0] + c2 * strain_increment[1];
        if !step(dez, &mut s, &mut v) {
            return Ok(PlaneStressOutcome { success: false, calls });
        }
        let (mut x1, mut f1) = (dez, s[2]);
        trace!("plane stress: Δεzz = {}, σzz = {}", dez, s[2]);
        if (c3 * s[2]).abs() > AXIAL_STRESS_TOLERANCE {
            dez -= c3 * s[2];
            if !step(dez, &mut s, &mut v) {
                return Ok(PlaneStressOutcome { success: false, calls });
            }
            trace!("plane stress: Δεzz = {}, σzz = {}", dez, s[2]);
        }
        let mut n = 2;
        while (c3 * s[2]).abs() > AXIAL_STRESS_TOLERANCE && n < MAXIMUM_NUMBER_OF_CALLS {
            let (x0, f0) = (x1, f1);
            x1 = dez;
            f1 = s[2];
            dez -= (x1 - x0) / (f1 - f0) * s[2];
            if !step(dez, &mut s, &mut v) {
                return Ok(PlaneStressOutcome { success: false, calls });
            }
            trace!("plane stress: Δεzz = {}, σzz = {}", dez, s[2]);
            n += 1;
        }
        if (c3 * s[2]).abs() > AXIAL_STRESS_TOLERANCE {
            return Err(BehaviourError::PlaneStressMaximumNumberOfIterationsReached {
                iterations: calls,
            });
        }
        stress.copy_from_slice(&s);
        stress[2] = 0.0;
        let last = statev.len() - 1;
        statev[..last].copy_from_slice(&v);
        statev[last] += dez;
        Ok(PlaneStressOutcome { success: true, calls })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stiffness::isotropic_stiffness_3d;

    const YOUNG: f64 = 200e9;
    const NU: f64 = 0.3;

    /// Generalised plane strain linear elasticity, engineering shear strains.
    fn elastic(step: GeneralisedPlaneStrainStep<'_>) -> bool {
        let d = isotropic_stiffness_3d(YOUNG, NU);
        for i in 0..4 {
            let mut ds = 0.0;
            for j in 0..4 {
                let f = if j == 3 { 0.5 * std::f64::consts::SQRT_2 } else { 1.0 };
                let g = if i == 3 { 0.5 * std::f64::consts::SQRT_2 } else { 1.0 };
                ds += g * d[(i, j)] * f * step.strain_increment[j];
            }
            step.stress[i] += ds;
        }
        true
    }

    #[test]
    fn elastic_behaviour_converges_in_a_single_call() {
        let reducer = PlaneStressReducer::new(PlaneStressCoefficients::isotropic(YOUNG, NU));
        let mut stress = [0.0; 4];
        let mut statev = [0.0];
        let outcome = reducer
            .integrate(&[0.0; 4], &[1e-3, 0.0, 0.0, 0.0], &mut stress, &mut statev, elastic)
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.calls, 1);
        assert_eq!(stress[2], 0.0);
        let sxx = YOUNG / (1.0 - NU * NU) * 1e-3;
        assert!((stress[0] - sxx).abs() < 1e-9 * sxx);
        assert!((stress[1] - NU * sxx).abs() < 1e-9 * sxx);
        assert!((statev[0] + NU / (1.0 - NU) * 1e-3).abs() < 1e-15);
    }

    #[test]
    fn axial_strain_accumulates_over_steps() {
        let reducer = PlaneStressReducer::new(PlaneStressCoefficients::isotropic(YOUNG, NU));
        let mut stress = [0.0; 4];
        let mut statev = [0.0];
        let mut strain = [0.0; 4];
        let de = [5e-4, 2e-4, 0.0, 1e-4];
        for _ in 0..2 {
            let outcome = reducer
                .integrate(&strain, &de, &mut stress, &mut statev, elastic)
                .unwrap();
            assert!(outcome.success);
            for (e, d) in strain.iter_mut().zip(de.iter()) {
                *e += d;
            }
        }
        let expected = -NU / (1.0 - NU) * 2.0 * (de[0] + de[1]);
        assert!((statev[0] - expected).abs() < 1e-15);
    }

    #[test]
    fn iteration_cap_is_reported_after_fifty_calls() {
        let reducer = PlaneStressReducer::new(PlaneStressCoefficients::isotropic(YOUNG, NU));
        let mut calls = 0;
        let probe = |step: GeneralisedPlaneStrainStep<'_>| {
            calls += 1;
            step.stress[2] = 1e6;
            true
        };
        let mut stress = [0.0; 4];
        let mut statev = [0.0];
        let r = reducer.integrate(&[0.0; 4], &[1e-3, 0.0, 0.0, 0.0], &mut stress, &mut statev, probe);
        assert!(matches!(
            r,
            Err(BehaviourError::PlaneStressMaximumNumberOfIterationsReached { iterations: 50 })
        ));
        assert_eq!(calls, 50);
        assert_eq!(statev[0], 0.0);
    }

    #[test]
    fn failure_of_the_wrapped_behaviour_is_not_an_error() {
        let reducer = PlaneStressReducer::new(PlaneStressCoefficients::isotropic(YOUNG, NU));
        let mut stress = [1.0; 4];
        let mut statev = [0.0, 0.0];
        let outcome = reducer
            .integrate(&[0.0; 4], &[0.0; 4], &mut stress, &mut statev, |_| false)
            .unwrap();
        assert_eq!(outcome, PlaneStressOutcome { success: false, calls: 1 });
        assert_eq!(stress, [1.0; 4]);
    }

    #[test]
    fn orthotropic_coefficients_reduce_to_isotropic_ones() {
        let iso = PlaneStressCoefficients::isotropic(YOUNG, NU);
        let ortho = PlaneStressCoefficients::orthotropic(YOUNG, YOUNG, YOUNG, NU, NU, NU);
        assert!((iso.c1 - ortho.c1).abs() < 1e-12);
        assert!((iso.c2 - ortho.c2).abs() < 1e-12);
        assert!((iso.c3 - ortho.c3).abs() < 1e-24);
    }
}
