//! Conversions between solver-native flat arrays and the internal
//! representation.
//!
//! UMAT-like solvers store symmetric tensors in the internal component
//! order but without the √2 factor: stresses carry the tensorial shear
//! `σ12` and strains the engineering shear `γ12 = 2ε12`. Their tangent
//! operators are Fortran column-major matrices linking the two.
use nalgebra::{DMatrix, Matrix3, SMatrix};

use crate::hypothesis::ModellingHypothesis;
use crate::mandel::{INV_SQRT2, SQRT2};

/// Multiplies the shear components (index 3 and above) by √2.
pub fn scale_shear(values: &mut [f64]) {
    for v in values.iter_mut().skip(3) {
        *v *= SQRT2;
    }
}

/// Divides the shear components (index 3 and above) by √2.
pub fn descale_shear(values: &mut [f64]) {
    for v in values.iter_mut().skip(3) {
        *v *= INV_SQRT2;
    }
}

fn shear_factor(i: usize) -> f64 {
    if i >= 3 {
        SQRT2
    } else {
        1.0
    }
}

/// Converts a tangent operator returned by a UMAT-like function
/// (Fortran column-major, engineering shear strains) to the internal
/// convention.
pub fn normalise_tangent_operator(native: &[f64], ntens: usize) -> DMatrix<f64> {
    debug_assert_eq!(native.len(), ntens * ntens);
    let mut k = DMatrix::from_column_slice(ntens, ntens, native);
    for j in 0..ntens {
        for i in 0..ntens {
            k[(i, j)] *= shear_factor(i) * shear_factor(j);
        }
    }
    k
}

/// Inverse of [`normalise_tangent_operator`].
pub fn denormalise_tangent_operator(k: &DMatrix<f64>) -> DMatrix<f64> {
    let mut native = k.clone();
    for j in 0..k.ncols() {
        for i in 0..k.nrows() {
            native[(i, j)] /= shear_factor(i) * shear_factor(j);
        }
    }
    native
}

/// Rotation of 2D stiffness matrices from the material frame to the
/// global frame, in the Cast3M convention.
#[derive(Debug, Clone, Copy)]
pub struct RotationMatrix2D {
    mn: SMatrix<f64, 3, 3>,
}

impl RotationMatrix2D {
    /// `v` is the first material direction, `drot` the element to global
    /// rotation as a column-major 3x3 array.
    pub fn new(v: &[f64], drot: &[f64]) -> Self {
        let a0 = drot[0] * v[0] + drot[3] * v[1];
        let a1 = drot[1] * v[0] + drot[4] * v[1];
        let a2 = -a1;
        let a3 = a0;
        let mn = SMatrix::<f64, 3, 3>::new(
            a0 * a0,
            a1 * a1,
            a0 * a1,
            a2 * a2,
            a3 * a3,
            a2 * a3,
            a0 * a2,
            a1 * a3,
            a0 * a3 + a1 * a2,
        );
        Self { mn }
    }

    /// `D_global = Nᵗ·D·N`. `D` links engineering shear strains to
    /// tensorial shear stresses.
    pub fn rotate_stiffness_matrix_backward(&self, d: &SMatrix<f64, 4, 4>) -> SMatrix<f64, 4, 4> {
        let mut n = SMatrix::<f64, 4, 4>::zeros();
        for i in 0..2 {
            for j in 0..2 {
                n[(i, j)] = self.mn[(i, j)];
            }
            n[(3, i)] = 2.0 * self.mn[(2, i)];
            n[(i, 3)] = self.mn[(i, 2)];
        }
        n[(2, 2)] = 1.0;
        n[(3, 3)] = self.mn[(2, 2)];
        n.transpose() * d * n
    }
}

/// 3D counterpart of [`RotationMatrix2D`].
#[derive(Debug, Clone, Copy)]
pub struct RotationMatrix3D {
    mn: SMatrix<f64, 6, 6>,
}

impl RotationMatrix3D {
    /// `v` holds the first and second material directions.
    pub fn new(v: &[f64], drot: &[f64]) -> Self {
        let mut a = [0.0; 9];
        for k in 0..3 {
            a[k] = drot[k] * v[0] + drot[k + 3] * v[1] + drot[k + 6] * v[2];
            a[k + 3] = drot[k] * v[3] + drot[k + 3] * v[4] + drot[k + 6] * v[5];
        }
        // third direction
        a[6] = a[1] * a[5] - a[4] * a[2];
        a[7] = a[2] * a[3] - a[5] * a[0];
        a[8] = a[0] * a[4] - a[3] * a[1];
        let mut mn = SMatrix::<f64, 6, 6>::zeros();
        for (row, p) in [0, 3, 6].into_iter().enumerate() {
            mn[(row, 0)] = a[p] * a[p];
            mn[(row, 1)] = a[p + 1] * a[p + 1];
            mn[(row, 2)] = a[p + 2] * a[p + 2];
            mn[(row, 3)] = a[p] * a[p + 1];
            mn[(row, 4)] = a[p + 2] * a[p];
            mn[(row, 5)] = a[p + 1] * a[p + 2];
        }
        // shear rows, built from the pairs of directions (1,2), (3,1), (2,3)
        for (row, p, q) in [(3, 0, 3), (4, 6, 0), (5, 3, 6)] {
            mn[(row, 0)] = a[p] * a[q];
            mn[(row, 1)] = a[p + 1] * a[q + 1];
            mn[(row, 2)] = a[p + 2] * a[q + 2];
            mn[(row, 3)] = a[p] * a[q + 1] + a[p + 1] * a[q];
            mn[(row, 4)] = a[p + 2] * a[q] + a[p] * a[q + 2];
            mn[(row, 5)] = a[p + 1] * a[q + 2] + a[p + 2] * a[q + 1];
        }
        Self { mn }
    }

    pub fn rotate_stiffness_matrix_backward(&self, d: &SMatrix<f64, 6, 6>) -> SMatrix<f64, 6, 6> {
        let mut n = self.mn;
        for i in 3..6 {
            for j in 0..3 {
                n[(i, j)] *= 2.0;
            }
        }
        n.transpose() * d * n
    }
}

/// Rotates a stiffness matrix expressed in the internal convention from
/// the material frame to the global frame, going through the Cast3M
/// convention used by the rotation matrices.
///
/// `v` holds the material direction(s) read from the material properties.
pub fn rotate_stiffness_to_global(
    k: &DMatrix<f64>,
    hypothesis: ModellingHypothesis,
    v: &[f64],
    drot: &[f64],
) -> DMatrix<f64> {
    let native = denormalise_tangent_operator(k);
    let rotated = match hypothesis.space_dimension() {
        2 => {
            let d = SMatrix::<f64, 4, 4>::from_column_slice(native.as_slice());
            let r = RotationMatrix2D::new(v, drot).rotate_stiffness_matrix_backward(&d);
            DMatrix::from_column_slice(4, 4, r.as_slice())
        }
        3 => {
            let d = SMatrix::<f64, 6, 6>::from_column_slice(native.as_slice());
            let r = RotationMatrix3D::new(v, drot).rotate_stiffness_matrix_backward(&d);
            DMatrix::from_column_slice(6, 6, r.as_slice())
        }
        _ => native,
    };
    normalise_tangent_operator(rotated.as_slice(), k.nrows())
}

/// Internal component index of each native component of an
/// Abaqus-explicit symmetric tensor. The native order is
/// `(11, 22, 33, 12, 23, 31)`; plane stress omits `33`.
pub fn abaqus_explicit_components(hypothesis: ModellingHypothesis) -> &'static [usize] {
    match hypothesis {
        ModellingHypothesis::PlaneStress => &[0, 1, 3],
        ModellingHypothesis::Tridimensional => &[0, 1, 2, 3, 5, 4],
        _ => &[0, 1, 2, 3],
    }
}

/// Abaqus-explicit deformation gradient layout:
/// `(11, 22, 33, 12, 23, 31, 21, 32, 13)` in 3D and `(11, 22, 33, 12, 21)`
/// otherwise.
pub fn abaqus_explicit_deformation_gradient(
    f: &Matrix3<f64>,
    hypothesis: ModellingHypothesis,
) -> [f64; 9] {
    if hypothesis == ModellingHypothesis::Tridimensional {
        [
            f.m11, f.m22, f.m33, f.m12, f.m23, f.m31, f.m21, f.m32, f.m13,
        ]
    } else {
        [f.m11, f.m22, f.m33, f.m12, f.m21, 0.0, 0.0, 0.0, 0.0]
    }
}

/// Expresses an operator acting on symmetric strains as an operator acting
/// on the deformation gradient, for the reduced layout of `hypothesis`.
///
/// Each shear column is split evenly between `Fij` and `Fji`.
pub fn deformation_gradient_operator(d: &SMatrix<f64, 6, 6>, hypothesis: ModellingHypothesis) -> DMatrix<f64> {
    let n = hypothesis.stensor_size();
    let mut m = DMatrix::zeros(n, hypothesis.tensor_size());
    for i in 0..n {
        for j in 0..3 {
            m[(i, j)] = d[(i, j)];
        }
        for (p, (a, b)) in [(3, (3, 4)), (4, (5, 6)), (5, (7, 8))].into_iter().take(n - 3) {
            m[(i, a)] = d[(i, p)] * INV_SQRT2;
            m[(i, b)] = d[(i, p)] * INV_SQRT2;
        }
    }
    m
}

/// Internal component index of each LS-DYNA component, LS-DYNA storing
/// `(xx, yy, zz, xy, yz, zx)`.
pub fn lsdyna_components(hypothesis: ModellingHypothesis) -> &'static [usize] {
    match hypothesis {
        ModellingHypothesis::Tridimensional => &[0, 1, 2, 3, 5, 4],
        _ => &[0, 1, 2, 3],
    }
}

/// Cyrano orders 1D tensors `(rr, θθ, zz)` where the internal order is
/// `(rr, zz, θθ)`.
pub fn swap_cyrano_components(values: &mut [f64]) {
    values.swap(1, 2);
}

/// Permutes a 3x3 Cyrano tangent operator to the internal component order.
pub fn cyrano_tangent_operator(native: &[f64]) -> DMatrix<f64> {
    let d = DMatrix::from_column_slice(3, 3, native);
    let p = [0, 2, 1];
    DMatrix::from_fn(3, 3, |i, j| d[(p[i], p[j])])
}

#[cfg(test)]
mod tests {
    use super::*;
    use matrixcompare::assert_matrix_eq;
    use proptest::prelude::*;

    fn test_matrix<const N: usize>() -> SMatrix<f64, N, N> {
        SMatrix::<f64, N, N>::from_fn(|i, j| 1.0 + (i * N + j) as f64 + if i == j { 10.0 } else { 0.0 })
    }

    proptest! {
        #[test]
        fn voigt_scaling_round_trip(values in proptest::collection::vec(-1e3f64..1e3, 6)) {
            let mut v = values.clone();
            scale_shear(&mut v);
            prop_assert_eq!(&v[..3], &values[..3]);
            descale_shear(&mut v);
            for (a, b) in v.iter().zip(values.iter()) {
                prop_assert!((a - b).abs() <= 1e-12 * b.abs().max(1.0));
            }
        }

        #[test]
        fn tangent_normalisation_round_trip(values in proptest::collection::vec(-1e3f64..1e3, 16)) {
            let k = normalise_tangent_operator(&values, 4);
            let back = denormalise_tangent_operator(&k);
            for (a, b) in back.iter().zip(values.iter()) {
                prop_assert!((a - b).abs() <= 1e-12 * b.abs().max(1.0));
            }
        }
    }

    #[test]
    fn identity_rotation_leaves_2d_stiffness_unchanged() {
        let id = Matrix3::<f64>::identity();
        let d = test_matrix::<4>();
        let r = RotationMatrix2D::new(&[1.0, 0.0], id.as_slice());
        assert_matrix_eq!(r.rotate_stiffness_matrix_backward(&d), d, comp = abs, tol = 1e-14);
    }

    #[test]
    fn identity_rotation_leaves_3d_stiffness_unchanged() {
        let id = Matrix3::<f64>::identity();
        let d = test_matrix::<6>();
        let r = RotationMatrix3D::new(&[1.0, 0.0, 0.0, 0.0, 1.0, 0.0], id.as_slice());
        assert_matrix_eq!(r.rotate_stiffness_matrix_backward(&d), d, comp = abs, tol = 1e-14);
    }

    #[test]
    fn quarter_turn_swaps_in_plane_directions() {
        // orthotropic-like material frame stiffness, engineering convention
        let mut d = SMatrix::<f64, 4, 4>::zeros();
        d[(0, 0)] = 3.0;
        d[(1, 1)] = 1.0;
        d[(2, 2)] = 2.0;
        d[(3, 3)] = 0.5;
        let id = Matrix3::<f64>::identity();
        let r = RotationMatrix2D::new(&[0.0, 1.0], id.as_slice());
        let g = r.rotate_stiffness_matrix_backward(&d);
        assert!((g[(0, 0)] - 1.0).abs() < 1e-14);
        assert!((g[(1, 1)] - 3.0).abs() < 1e-14);
        assert!((g[(2, 2)] - 2.0).abs() < 1e-14);
        assert!((g[(3, 3)] - 0.5).abs() < 1e-14);
    }

    #[test]
    fn rotation_to_global_matches_change_of_basis() {
        use crate::mandel::change_basis_operator;
        use crate::stiffness::{orthotropic_stiffness_3d, OrthotropicModuli};
        let moduli = OrthotropicModuli::from_slice(&[
            200.0, 100.0, 50.0, 0.3, 0.2, 0.25, 40.0, 30.0, 20.0,
        ]);
        let k = orthotropic_stiffness_3d(&moduli).unwrap();
        let theta: f64 = 0.4;
        let (c, s) = (theta.cos(), theta.sin());
        let v = [c, s, 0.0, -s, c, 0.0];
        let id = Matrix3::<f64>::identity();
        let kd = DMatrix::from_column_slice(6, 6, k.as_slice());
        let g = rotate_stiffness_to_global(&kd, ModellingHypothesis::Tridimensional, &v, id.as_slice());
        // columns of r are the material axes expressed in the global frame
        let r = Matrix3::new(c, -s, 0.0, s, c, 0.0, 0.0, 0.0, 1.0);
        let expected = change_basis_operator(&k, &r.transpose());
        assert_matrix_eq!(g, expected, comp = abs, tol = 1e-10);
    }

    #[test]
    fn cyrano_permutation() {
        let native = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
        let k = cyrano_tangent_operator(&native);
        let d = DMatrix::from_column_slice(3, 3, &native);
        assert_eq!(k[(1, 1)], d[(2, 2)]);
        assert_eq!(k[(1, 0)], d[(2, 0)]);
        assert_eq!(k[(0, 2)], d[(0, 1)]);
    }
}
