//! Stress and strain measures of finite strain behaviours.
//!
//! Deformation gradients are given as Fortran column-major 3x3 arrays.
//! Stresses use the solver-native convention (tensorial shear, no √2)
//! and strains the engineering one (shear components doubled).
use nalgebra::{DMatrix, DVector, Matrix2, Matrix3, SMatrix, SVector, SymmetricEigen, Vector3};

use crate::error::{BehaviourError, Result};
use crate::hypothesis::ModellingHypothesis;
use crate::mandel::{tensor_to_mandel, INV_SQRT2, SQRT2};

const EIGENVALUE_TOLERANCE: f64 = 1e-12;

/// Builds the deformation gradient from a Fortran column-major array.
pub fn deformation_gradient_from_fortran(f: &[f64]) -> Matrix3<f64> {
    Matrix3::from_column_slice(&f[..9])
}

fn check_stensor_size(ntens: usize) {
    debug_assert!(
        matches!(ntens, 3 | 4 | 6),
        "invalid number of stress components ({})",
        ntens
    );
}

fn effective_deformation_gradient(f: &[f64], hypothesis: ModellingHypothesis, fzz: f64) -> Matrix3<f64> {
    let mut m = deformation_gradient_from_fortran(f);
    if hypothesis == ModellingHypothesis::PlaneStress {
        m.m33 = fzz;
    }
    m
}

/// Inverse and determinant from the cofactors of `f`.
pub fn inverse_and_determinant(f: &Matrix3<f64>) -> (Matrix3<f64>, f64) {
    let j = f.m11 * (f.m22 * f.m33 - f.m23 * f.m32) - f.m12 * (f.m21 * f.m33 - f.m23 * f.m31)
        + f.m13 * (f.m21 * f.m32 - f.m22 * f.m31);
    let ij = 1.0 / j;
    let inv = Matrix3::new(
        ij * (f.m22 * f.m33 - f.m23 * f.m32),
        ij * (f.m13 * f.m32 - f.m12 * f.m33),
        ij * (f.m12 * f.m23 - f.m13 * f.m22),
        ij * (f.m23 * f.m31 - f.m21 * f.m33),
        ij * (f.m11 * f.m33 - f.m13 * f.m31),
        ij * (f.m13 * f.m21 - f.m11 * f.m23),
        ij * (f.m21 * f.m32 - f.m22 * f.m31),
        ij * (f.m12 * f.m31 - f.m11 * f.m32),
        ij * (f.m11 * f.m22 - f.m12 * f.m21),
    );
    (inv, j)
}

fn native_stress_to_matrix(s: &[f64]) -> Matrix3<f64> {
    let get = |i: usize| s.get(i).copied().unwrap_or(0.0);
    Matrix3::new(
        get(0),
        get(3),
        get(4),
        get(3),
        get(1),
        get(5),
        get(4),
        get(5),
        get(2),
    )
}

fn matrix_to_native_stress(m: &Matrix3<f64>, ntens: usize) -> DVector<f64> {
    let all = [m.m11, m.m22, m.m33, m.m12, m.m13, m.m23];
    DVector::from_column_slice(&all[..ntens])
}

/// Green-Lagrange strain `½(FᵗF - I)` with engineering shear components.
/// The out-of-plane component is zero under plane stress.
pub fn compute_green_lagrange_strain(f: &[f64], hypothesis: ModellingHypothesis) -> DVector<f64> {
    let ntens = hypothesis.stensor_size();
    check_stensor_size(ntens);
    let mut e = DVector::zeros(ntens);
    e[0] = 0.5 * (f[0] * f[0] + f[1] * f[1] + f[2] * f[2] - 1.0);
    e[1] = 0.5 * (f[3] * f[3] + f[4] * f[4] + f[5] * f[5] - 1.0);
    if hypothesis != ModellingHypothesis::PlaneStress {
        e[2] = 0.5 * (f[6] * f[6] + f[7] * f[7] + f[8] * f[8] - 1.0);
    }
    if ntens >= 4 {
        e[3] = f[2] * f[5] + f[1] * f[4] + f[0] * f[3];
    }
    if ntens == 6 {
        e[4] = f[2] * f[8] + f[1] * f[7] + f[0] * f[6];
        e[5] = f[5] * f[8] + f[4] * f[7] + f[3] * f[6];
    }
    e
}

/// `S = J·F⁻¹·σ·F⁻ᵗ`. `fzz` replaces `F33` under plane stress.
pub fn compute_second_piola_kirchhoff_stress_from_cauchy_stress(
    stress: &[f64],
    f: &[f64],
    hypothesis: ModellingHypothesis,
    fzz: f64,
) -> DVector<f64> {
    let ntens = hypothesis.stensor_size();
    check_stensor_size(ntens);
    let fm = effective_deformation_gradient(f, hypothesis, fzz);
    let (inv, j) = inverse_and_determinant(&fm);
    let s = native_stress_to_matrix(&stress[..ntens]);
    let sk2 = (inv * s * inv.transpose()) * j;
    let mut r = matrix_to_native_stress(&sk2, ntens);
    if hypothesis == ModellingHypothesis::PlaneStress {
        r[2] = 0.0;
    }
    r
}

/// `σ = J⁻¹·F·S·Fᵗ`.
pub fn compute_cauchy_stress_from_second_piola_kirchhoff_stress(
    sk2: &[f64],
    f: &[f64],
    hypothesis: ModellingHypothesis,
    fzz: f64,
) -> DVector<f64> {
    let ntens = hypothesis.stensor_size();
    check_stensor_size(ntens);
    let fm = effective_deformation_gradient(f, hypothesis, fzz);
    let (_, j) = inverse_and_determinant(&fm);
    let s = native_stress_to_matrix(&sk2[..ntens]);
    let sig = (fm * s * fm.transpose()) / j;
    let mut r = matrix_to_native_stress(&sig, ntens);
    if hypothesis == ModellingHypothesis::PlaneStress {
        r[2] = 0.0;
    }
    r
}

/// Polar decomposition `F = R·U`.
pub fn polar_decomposition(f: &Matrix3<f64>) -> (Matrix3<f64>, Matrix3<f64>) {
    let c = f.transpose() * f;
    let eigen = SymmetricEigen::new(c);
    let v = eigen.eigenvectors;
    let sqrt_l = eigen.eigenvalues.map(f64::sqrt);
    let u = v * Matrix3::from_diagonal(&sqrt_l) * v.transpose();
    let iu = v * Matrix3::from_diagonal(&sqrt_l.map(|x| 1.0 / x)) * v.transpose();
    (f * iu, u)
}

/// Logarithm of a symmetric positive definite stretch tensor.
pub fn logarithm_of_stretch(u: &Matrix3<f64>) -> Matrix3<f64> {
    let eigen = SymmetricEigen::new(*u);
    let v = eigen.eigenvectors;
    v * Matrix3::from_diagonal(&eigen.eigenvalues.map(f64::ln)) * v.transpose()
}

fn eigen_tensor(v: &Vector3<f64>) -> SVector<f64, 6> {
    tensor_to_mandel(&(v * v.transpose()))
}

/// `(vᵢ⊗vⱼ + vⱼ⊗vᵢ)/√2`, of unit norm for orthonormal vectors.
fn symmetric_diadic_product(vi: &Vector3<f64>, vj: &Vector3<f64>) -> SVector<f64, 6> {
    let m = vi * vj.transpose();
    tensor_to_mandel(&(m + m.transpose())) * INV_SQRT2
}

fn outer(a: &SVector<f64, 6>, b: &SVector<f64, 6>) -> SMatrix<f64, 6, 6> {
    a * b.transpose()
}

/// Logarithmic strain `E = ½ Σ log(λᵢ) nᵢ⊗nᵢ` and its derivative
/// `P = ∂E/∂(½C)` with respect to the Green-Lagrange strain, where `λᵢ`
/// and `nᵢ` are the eigenvalues and eigen-tensors of `C = FᵗF`.
///
/// `E` has engineering shear components. `P` is expressed in the internal
/// convention. At `F = I`, `E = 0` and `P` is the identity.
pub fn compute_logarithmic_strain_and_derivative(
    f: &[f64],
    hypothesis: ModellingHypothesis,
) -> (DVector<f64>, DMatrix<f64>) {
    let ntens = hypothesis.stensor_size();
    check_stensor_size(ntens);
    match ntens {
        3 => logarithmic_strain_1d(f),
        4 => logarithmic_strain_2d(f, hypothesis),
        _ => logarithmic_strain_3d(f),
    }
}

fn logarithmic_strain_1d(f: &[f64]) -> (DVector<f64>, DMatrix<f64>) {
    let d = [f[0], f[4], f[8]];
    let e = DVector::from_iterator(3, d.iter().map(|x| x.ln()));
    let p = DMatrix::from_diagonal(&DVector::from_iterator(3, d.iter().map(|x| 1.0 / (x * x))));
    (e, p)
}

fn truncate(e: &SVector<f64, 6>, p: &SMatrix<f64, 6, 6>, n: usize) -> (DVector<f64>, DMatrix<f64>) {
    let mut e = DVector::from_column_slice(&e.as_slice()[..n]);
    for v in e.iter_mut().skip(3) {
        *v *= SQRT2;
    }
    (e, p.view((0, 0), (n, n)).into_owned())
}

fn logarithmic_strain_2d(f: &[f64], hypothesis: ModellingHypothesis) -> (DVector<f64>, DMatrix<f64>) {
    let plane_stress = hypothesis == ModellingHypothesis::PlaneStress;
    let mut fm = deformation_gradient_from_fortran(f);
    fm.m13 = 0.0;
    fm.m23 = 0.0;
    fm.m31 = 0.0;
    fm.m32 = 0.0;
    if plane_stress {
        fm.m33 = 1.0;
    }
    let c = fm.transpose() * fm;
    let in_plane = SymmetricEigen::new(Matrix2::new(c.m11, c.m12, c.m21, c.m22));
    let vp = [in_plane.eigenvalues[0], in_plane.eigenvalues[1], c.m33];
    let log_vp = [vp[0].ln(), vp[1].ln(), if plane_stress { 0.0 } else { vp[2].ln() }];
    let w0 = in_plane.eigenvectors.column(0);
    let w1 = in_plane.eigenvectors.column(1);
    let v0 = Vector3::new(w0[0], w0[1], 0.0);
    let v1 = Vector3::new(w1[0], w1[1], 0.0);
    let v2 = Vector3::z();
    let (n0, n1, n2) = (eigen_tensor(&v0), eigen_tensor(&v1), eigen_tensor(&v2));
    let mut e = (n0 * log_vp[0] + n1 * log_vp[1] + n2 * log_vp[2]) * 0.5;
    if plane_stress {
        e[2] = 0.0;
    }
    let n01 = symmetric_diadic_product(&v0, &v1);
    let shear = if (vp[0] - vp[1]).abs() > EIGENVALUE_TOLERANCE {
        (log_vp[0] - log_vp[1]) / (vp[0] - vp[1])
    } else {
        1.0 / vp[0]
    };
    let p = outer(&n0, &n0) / vp[0]
        + outer(&n1, &n1) / vp[1]
        + outer(&n2, &n2) / vp[2]
        + outer(&n01, &n01) * shear;
    truncate(&e, &p, 4)
}

fn logarithmic_strain_3d(f: &[f64]) -> (DVector<f64>, DMatrix<f64>) {
    let fm = deformation_gradient_from_fortran(f);
    let eigen = SymmetricEigen::new(fm.transpose() * fm);
    let vp = eigen.eigenvalues;
    let log_vp = vp.map(f64::ln);
    let v: [Vector3<f64>; 3] = [
        eigen.eigenvectors.column(0).into_owned(),
        eigen.eigenvectors.column(1).into_owned(),
        eigen.eigenvectors.column(2).into_owned(),
    ];
    let n = [eigen_tensor(&v[0]), eigen_tensor(&v[1]), eigen_tensor(&v[2])];
    let e = (n[0] * log_vp[0] + n[1] * log_vp[1] + n[2] * log_vp[2]) * 0.5;
    let equal = |i: usize, j: usize| (vp[i] - vp[j]).abs() < EIGENVALUE_TOLERANCE;
    let m = |i: usize, j: usize| symmetric_diadic_product(&v[i], &v[j]);
    let p = if equal(0, 1) && equal(0, 2) {
        let vpm = (vp[0] + vp[1] + vp[2]) / 3.0;
        SMatrix::<f64, 6, 6>::identity() / vpm
    } else if equal(0, 1) || equal(0, 2) || equal(1, 2) {
        // (a, b) is the pair of equal eigenvalues, c the remaining one
        let (a, b, c) = if equal(0, 1) {
            (0, 1, 2)
        } else if equal(0, 2) {
            (0, 2, 1)
        } else {
            (1, 2, 0)
        };
        let vpm = (vp[a] + vp[b]) / 2.0;
        let mab = m(a, b);
        let (mac, mbc) = (m(a, c), m(b, c));
        (outer(&n[a], &n[a]) + outer(&n[b], &n[b]) + outer(&mab, &mab)) / vpm
            + outer(&n[c], &n[c]) / vp[c]
            + (outer(&mac, &mac) + outer(&mbc, &mbc)) * ((log_vp[a] - log_vp[c]) / (vpm - vp[c]))
    } else {
        let mut p = SMatrix::<f64, 6, 6>::zeros();
        for i in 0..3 {
            p += outer(&n[i], &n[i]) / vp[i];
            p += eigen_tensor_derivative(&v, &vp, i) * log_vp[i];
        }
        p
    };
    truncate(&e, &p, 6)
}

/// `∂nᵢ/∂C = Σ_{j≠i} mᵢⱼ⊗mᵢⱼ / (λᵢ - λⱼ)` for distinct eigenvalues.
fn eigen_tensor_derivative(v: &[Vector3<f64>; 3], vp: &Vector3<f64>, i: usize) -> SMatrix<f64, 6, 6> {
    let mut d = SMatrix::<f64, 6, 6>::zeros();
    for j in (0..3).filter(|&j| j != i) {
        let mij = symmetric_diadic_product(&v[i], &v[j]);
        d += outer(&mij, &mij) / (vp[i] - vp[j]);
    }
    d
}

/// Dual stress of the logarithmic strain, `T = S : P⁻¹`.
pub fn compute_dual_stress_of_logarithmic_strain_from_cauchy_stress(
    stress: &[f64],
    p: &DMatrix<f64>,
    f: &[f64],
    hypothesis: ModellingHypothesis,
    fzz: f64,
) -> Result<DVector<f64>> {
    let mut sk2 = compute_second_piola_kirchhoff_stress_from_cauchy_stress(stress, f, hypothesis, fzz);
    for v in sk2.iter_mut().skip(3) {
        *v *= SQRT2;
    }
    let ip = p.clone().try_inverse().ok_or(BehaviourError::SingularMatrix {
        context: "compute_dual_stress_of_logarithmic_strain_from_cauchy_stress",
    })?;
    let mut t = ip.transpose() * sk2;
    for v in t.iter_mut().skip(3) {
        *v *= INV_SQRT2;
    }
    Ok(t)
}

/// Inverse of [`compute_dual_stress_of_logarithmic_strain_from_cauchy_stress`]:
/// `S = T : P`, then `σ = J⁻¹·F·S·Fᵗ`.
pub fn compute_cauchy_stress_from_dual_stress_of_logarithmic_strain(
    t: &[f64],
    p: &DMatrix<f64>,
    f: &[f64],
    hypothesis: ModellingHypothesis,
    fzz: f64,
) -> DVector<f64> {
    let mut tv = DVector::from_column_slice(t);
    for v in tv.iter_mut().skip(3) {
        *v *= SQRT2;
    }
    let mut sk2 = p.transpose() * tv;
    for v in sk2.iter_mut().skip(3) {
        *v *= INV_SQRT2;
    }
    compute_cauchy_stress_from_second_piola_kirchhoff_stress(sk2.as_slice(), f, hypothesis, fzz)
}
