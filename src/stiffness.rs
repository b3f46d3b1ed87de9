//! Elastic stiffness tensors in the internal convention: `σ = C : ε` with
//! shear components scaled by √2, so that the shear diagonal holds `2μ`.
use nalgebra::{DMatrix, Matrix3, SMatrix};

use crate::error::{BehaviourError, Result};
use crate::hypothesis::{ElasticSymmetry, ModellingHypothesis, OrthotropicAxesConvention};

/// The nine engineering moduli of an orthotropic material.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrthotropicModuli {
    pub e1: f64,
    pub e2: f64,
    pub e3: f64,
    pub nu12: f64,
    pub nu23: f64,
    pub nu13: f64,
    pub g12: f64,
    pub g23: f64,
    pub g13: f64,
}

impl OrthotropicModuli {
    /// Reads `[E1, E2, E3, ν12, ν23, ν13, G12, G23, G13]`, missing shear
    /// moduli being left to zero.
    pub fn from_slice(props: &[f64]) -> Self {
        let get = |i: usize| props.get(i).copied().unwrap_or(0.0);
        Self {
            e1: get(0),
            e2: get(1),
            e3: get(2),
            nu12: get(3),
            nu23: get(4),
            nu13: get(5),
            g12: get(6),
            g23: get(7),
            g13: get(8),
        }
    }

    /// Relabels the material directions according to `convention`.
    pub fn apply_convention(
        self,
        convention: OrthotropicAxesConvention,
        hypothesis: ModellingHypothesis,
    ) -> Result<Self> {
        use ModellingHypothesis::*;
        match convention {
            OrthotropicAxesConvention::Default => Ok(self),
            OrthotropicAxesConvention::Pipe => match hypothesis {
                PlaneStrain | GeneralisedPlaneStrain | PlaneStress => Ok(Self {
                    e2: self.e3,
                    e3: self.e2,
                    nu12: self.nu13,
                    nu13: self.nu12,
                    nu23: self.nu23 * self.e3 / self.e2,
                    ..self
                }),
                _ => Ok(self),
            },
            OrthotropicAxesConvention::Plate => {
                if hypothesis.space_dimension() == 1 || hypothesis.is_axisymmetrical() {
                    Err(BehaviourError::UnsupportedOrthotropicAxesConvention {
                        context: "OrthotropicModuli::apply_convention",
                        convention,
                        hypothesis,
                    })
                } else {
                    Ok(self)
                }
            }
        }
    }

    /// Normal block of the compliance tensor.
    pub fn normal_compliance(&self) -> Matrix3<f64> {
        let s12 = -self.nu12 / self.e1;
        let s13 = -self.nu13 / self.e1;
        let s23 = -self.nu23 / self.e2;
        Matrix3::new(
            1.0 / self.e1,
            s12,
            s13,
            s12,
            1.0 / self.e2,
            s23,
            s13,
            s23,
            1.0 / self.e3,
        )
    }

    /// Normal block of the stiffness tensor.
    pub fn normal_stiffness(&self) -> Result<Matrix3<f64>> {
        self.normal_compliance()
            .try_inverse()
            .ok_or(BehaviourError::SingularMatrix {
                context: "OrthotropicModuli::normal_stiffness",
            })
    }
}

pub fn lame_coefficients(young: f64, nu: f64) -> (f64, f64) {
    let mu = young / (2.0 * (1.0 + nu));
    let lambda = young * nu / ((1.0 + nu) * (1.0 - 2.0 * nu));
    (lambda, mu)
}

pub fn isotropic_stiffness_3d(young: f64, nu: f64) -> SMatrix<f64, 6, 6> {
    let (lambda, mu) = lame_coefficients(young, nu);
    let mut d = SMatrix::<f64, 6, 6>::zeros();
    for i in 0..3 {
        for j in 0..3 {
            d[(i, j)] = lambda;
        }
        d[(i, i)] = lambda + 2.0 * mu;
        d[(i + 3, i + 3)] = 2.0 * mu;
    }
    d
}

/// Stiffness of the plane strain, generalised plane strain and
/// axisymmetrical hypotheses.
pub fn isotropic_stiffness_2d(young: f64, nu: f64) -> SMatrix<f64, 4, 4> {
    isotropic_stiffness_3d(young, nu).fixed_view::<4, 4>(0, 0).into_owned()
}

/// Plane stress stiffness with `σzz = 0` built in.
pub fn isotropic_stiffness_plane_stress(young: f64, nu: f64) -> SMatrix<f64, 4, 4> {
    let c = young / (1.0 - nu * nu);
    let mut d = SMatrix::<f64, 4, 4>::zeros();
    d[(0, 0)] = c;
    d[(1, 1)] = c;
    d[(0, 1)] = c * nu;
    d[(1, 0)] = c * nu;
    d[(3, 3)] = young / (1.0 + nu);
    d
}

pub fn orthotropic_stiffness_3d(moduli: &OrthotropicModuli) -> Result<SMatrix<f64, 6, 6>> {
    let normal = moduli.normal_stiffness()?;
    let mut d = SMatrix::<f64, 6, 6>::zeros();
    d.fixed_view_mut::<3, 3>(0, 0).copy_from(&normal);
    d[(3, 3)] = 2.0 * moduli.g12;
    d[(4, 4)] = 2.0 * moduli.g13;
    d[(5, 5)] = 2.0 * moduli.g23;
    Ok(d)
}

/// Plane stress orthotropic stiffness from `[E1, E2, ν12, G12]`.
pub fn orthotropic_stiffness_plane_stress(props: &[f64]) -> SMatrix<f64, 4, 4> {
    let (e1, e2, nu12, g12) = (props[0], props[1], props[2], props[3]);
    let nu21 = nu12 * e2 / e1;
    let c = 1.0 / (1.0 - nu12 * nu21);
    let mut d = SMatrix::<f64, 4, 4>::zeros();
    d[(0, 0)] = c * e1;
    d[(1, 1)] = c * e2;
    d[(0, 1)] = c * nu21 * e1;
    d[(1, 0)] = c * nu12 * e2;
    d[(3, 3)] = 2.0 * g12;
    d
}

/// Eliminates the out-of-plane normal component `k` from a stiffness
/// matrix: `C_ij - C_ik C_kj / C_kk`, the `k` row and column being zero.
pub fn condense_out_of_plane(d: &DMatrix<f64>, k: usize) -> DMatrix<f64> {
    let n = d.nrows();
    let mut r = DMatrix::<f64>::zeros(n, n);
    for i in 0..n {
        for j in 0..n {
            if i != k && j != k {
                r[(i, j)] = d[(i, j)] - d[(i, k)] * d[(k, j)] / d[(k, k)];
            }
        }
    }
    r
}

/// Index of the component that vanishes under a plane stress hypothesis.
fn out_of_plane_component(hypothesis: ModellingHypothesis) -> usize {
    if hypothesis.space_dimension() == 1 {
        1
    } else {
        2
    }
}

/// Minimal number of leading material properties read by
/// [`compute_stiffness_tensor`].
pub fn number_of_elastic_properties(
    symmetry: ElasticSymmetry,
    hypothesis: ModellingHypothesis,
    altered: bool,
) -> usize {
    match symmetry {
        ElasticSymmetry::Isotropic => 2,
        ElasticSymmetry::Orthotropic => match hypothesis.space_dimension() {
            1 => 6,
            2 if altered && hypothesis == ModellingHypothesis::PlaneStress => 4,
            2 => 7,
            _ => 9,
        },
    }
}

/// Builds the elastic stiffness of a behaviour from its material
/// properties, in the material frame.
///
/// For plane stress hypotheses, `altered` selects the tensor with the
/// `σzz = 0` condition built in. The unaltered tensor is the plane strain
/// one and must only be used by behaviours that eliminate `εzz` themselves.
pub fn compute_stiffness_tensor(
    symmetry: ElasticSymmetry,
    hypothesis: ModellingHypothesis,
    convention: OrthotropicAxesConvention,
    props: &[f64],
    altered: bool,
) -> Result<DMatrix<f64>> {
    let expected = number_of_elastic_properties(symmetry, hypothesis, altered);
    if props.len() < expected {
        return Err(BehaviourError::InvalidMaterialProperties {
            context: "compute_stiffness_tensor",
            symmetry,
            hypothesis,
            expected,
            got: props.len(),
        });
    }
    let n = hypothesis.stensor_size();
    let plane_stress = altered && hypothesis.is_plane_stress();
    let d = match symmetry {
        ElasticSymmetry::Isotropic => {
            if plane_stress && hypothesis == ModellingHypothesis::PlaneStress {
                let d = isotropic_stiffness_plane_stress(props[0], props[1]);
                DMatrix::from_column_slice(4, 4, d.as_slice())
            } else if n == 4 {
                let d = isotropic_stiffness_2d(props[0], props[1]);
                let d = DMatrix::from_column_slice(4, 4, d.as_slice());
                if plane_stress {
                    condense_out_of_plane(&d, out_of_plane_component(hypothesis))
                } else {
                    d
                }
            } else {
                let d = isotropic_stiffness_3d(props[0], props[1]);
                let d = d.view((0, 0), (n, n)).into_owned();
                if plane_stress {
                    condense_out_of_plane(&d, out_of_plane_component(hypothesis))
                } else {
                    d
                }
            }
        }
        ElasticSymmetry::Orthotropic => {
            if plane_stress && hypothesis == ModellingHypothesis::PlaneStress {
                let d = orthotropic_stiffness_plane_stress(props);
                DMatrix::from_column_slice(4, 4, d.as_slice())
            } else {
                let moduli = OrthotropicModuli::from_slice(&props[..expected])
                    .apply_convention(convention, hypothesis)?;
                let d = orthotropic_stiffness_3d(&moduli)?;
                let d = d.view((0, 0), (n, n)).into_owned();
                if plane_stress {
                    condense_out_of_plane(&d, out_of_plane_component(hypothesis))
                } else {
                    d
                }
            }
        }
    };
    Ok(d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use matrixcompare::assert_matrix_eq;

    const YOUNG: f64 = 200e9;
    const NU: f64 = 0.3;

    #[test]
    fn isotropic_tridimensional() {
        let d = compute_stiffness_tensor(
            ElasticSymmetry::Isotropic,
            ModellingHypothesis::Tridimensional,
            OrthotropicAxesConvention::Default,
            &[YOUNG, NU],
            true,
        )
        .unwrap();
        let (lambda, mu) = lame_coefficients(YOUNG, NU);
        assert!((d[(0, 0)] - (lambda + 2.0 * mu)).abs() < 1e-3);
        assert!((d[(0, 1)] - lambda).abs() < 1e-3);
        assert!((d[(3, 3)] - 2.0 * mu).abs() < 1e-3);
        assert_eq!(d[(0, 3)], 0.0);
    }

    #[test]
    fn altered_plane_stress_matches_condensation() {
        let altered = compute_stiffness_tensor(
            ElasticSymmetry::Isotropic,
            ModellingHypothesis::PlaneStress,
            OrthotropicAxesConvention::Default,
            &[YOUNG, NU],
            true,
        )
        .unwrap();
        let unaltered = compute_stiffness_tensor(
            ElasticSymmetry::Isotropic,
            ModellingHypothesis::PlaneStress,
            OrthotropicAxesConvention::Default,
            &[YOUNG, NU],
            false,
        )
        .unwrap();
        assert!(unaltered[(2, 2)] > 0.0);
        let condensed = condense_out_of_plane(&unaltered, 2);
        assert_matrix_eq!(altered, condensed, comp = abs, tol = 1e-2);
    }

    #[test]
    fn orthotropic_with_isotropic_moduli_is_isotropic() {
        let g = YOUNG / (2.0 * (1.0 + NU));
        let props = [YOUNG, YOUNG, YOUNG, NU, NU, NU, g, g, g];
        let d = compute_stiffness_tensor(
            ElasticSymmetry::Orthotropic,
            ModellingHypothesis::Tridimensional,
            OrthotropicAxesConvention::Default,
            &props,
            false,
        )
        .unwrap();
        let iso = isotropic_stiffness_3d(YOUNG, NU);
        assert_matrix_eq!(d, iso, comp = abs, tol = 1.0);

        let ps = compute_stiffness_tensor(
            ElasticSymmetry::Orthotropic,
            ModellingHypothesis::PlaneStress,
            OrthotropicAxesConvention::Default,
            &[YOUNG, YOUNG, NU, g],
            true,
        )
        .unwrap();
        let iso_ps = isotropic_stiffness_plane_stress(YOUNG, NU);
        assert_matrix_eq!(ps, iso_ps, comp = abs, tol = 1.0);
    }

    #[test]
    fn pipe_convention_swaps_second_and_third_directions() {
        let m = OrthotropicModuli::from_slice(&[1.0, 2.0, 3.0, 0.1, 0.2, 0.3, 4.0]);
        let p = m
            .apply_convention(OrthotropicAxesConvention::Pipe, ModellingHypothesis::PlaneStrain)
            .unwrap();
        assert_eq!((p.e2, p.e3), (3.0, 2.0));
        assert_eq!((p.nu12, p.nu13), (0.3, 0.1));
        assert!((p.nu23 - 0.2 * 3.0 / 2.0).abs() < 1e-15);
        let q = m
            .apply_convention(OrthotropicAxesConvention::Pipe, ModellingHypothesis::Tridimensional)
            .unwrap();
        assert_eq!(q, m);
    }

    #[test]
    fn plate_convention_is_not_available_in_axisymmetry() {
        let m = OrthotropicModuli::from_slice(&[1.0, 2.0, 3.0, 0.1, 0.2, 0.3, 4.0]);
        assert!(m
            .apply_convention(OrthotropicAxesConvention::Plate, ModellingHypothesis::Axisymmetrical)
            .is_err());
        assert!(m
            .apply_convention(OrthotropicAxesConvention::Plate, ModellingHypothesis::PlaneStrain)
            .is_ok());
    }

    #[test]
    fn too_few_properties_is_an_error() {
        let r = compute_stiffness_tensor(
            ElasticSymmetry::Orthotropic,
            ModellingHypothesis::Tridimensional,
            OrthotropicAxesConvention::Default,
            &[1.0, 2.0],
            false,
        );
        assert!(matches!(
            r,
            Err(BehaviourError::InvalidMaterialProperties { expected: 9, got: 2, .. })
        ));
    }

    #[test]
    fn plane_strain_is_the_leading_block_of_the_tridimensional_stiffness() {
        let d = compute_stiffness_tensor(
            ElasticSymmetry::Isotropic,
            ModellingHypothesis::PlaneStrain,
            OrthotropicAxesConvention::Default,
            &[YOUNG, NU],
            false,
        )
        .unwrap();
        let d3 = isotropic_stiffness_3d(YOUNG, NU);
        assert_eq!((d.nrows(), d.ncols()), (4, 4));
        for i in 0..4 {
            for j in 0..4 {
                assert_eq!(d[(i, j)], d3[(i, j)]);
            }
        }
    }
}
