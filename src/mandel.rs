//! Internal tensor representation.
//!
//! Symmetric tensors are stored as `(xx, yy, zz, xy, xz, yz)` with the
//! off-diagonal components multiplied by √2, so that the double contraction
//! of two tensors is the dot product of their vectors. Reduced hypotheses
//! keep the leading components (3 in 1D, 4 in 2D).
//!
//! Non-symmetric tensors (deformation gradients) are stored as
//! `(F11, F22, F33, F12, F21, F13, F31, F23, F32)`, truncated to 5
//! components in 2D and 3 in 1D.
use nalgebra::{Matrix3, SMatrix, SVector};

pub const SQRT2: f64 = std::f64::consts::SQRT_2;
pub const INV_SQRT2: f64 = std::f64::consts::FRAC_1_SQRT_2;

pub const MANDEL_IDENTITY: SVector<f64, 6> = SVector::<f64, 6>::new(1.0, 1.0, 1.0, 0.0, 0.0, 0.0);

pub fn tensor_to_mandel(tensor: &Matrix3<f64>) -> SVector<f64, 6> {
    SVector::<f64, 6>::new(
        tensor.m11,
        tensor.m22,
        tensor.m33,
        SQRT2 * tensor.m12,
        SQRT2 * tensor.m13,
        SQRT2 * tensor.m23,
    )
}

pub fn mandel_to_tensor(mandel: &SVector<f64, 6>) -> Matrix3<f64> {
    Matrix3::<f64>::new(
        mandel[0],
        INV_SQRT2 * mandel[3],
        INV_SQRT2 * mandel[4],
        INV_SQRT2 * mandel[3],
        mandel[1],
        INV_SQRT2 * mandel[5],
        INV_SQRT2 * mandel[4],
        INV_SQRT2 * mandel[5],
        mandel[2],
    )
}

pub fn trace(mandel: &SVector<f64, 6>) -> f64 {
    mandel[0] + mandel[1] + mandel[2]
}

/// Embeds the leading components of a reduced symmetric tensor into a 3D one.
pub fn stensor_from_slice(values: &[f64]) -> SVector<f64, 6> {
    debug_assert!(matches!(values.len(), 3 | 4 | 6));
    let mut s = SVector::<f64, 6>::zeros();
    s.as_mut_slice()[..values.len()].copy_from_slice(values);
    s
}

/// Writes the leading components of a 3D symmetric tensor.
pub fn stensor_to_slice(s: &SVector<f64, 6>, out: &mut [f64]) {
    let n = out.len();
    out.copy_from_slice(&s.as_slice()[..n]);
}

/// Builds a 3x3 matrix from a (possibly reduced) non-symmetric tensor.
pub fn tensor_from_slice(values: &[f64]) -> Matrix3<f64> {
    let mut f = Matrix3::<f64>::zeros();
    f.m11 = values[0];
    f.m22 = values[1];
    f.m33 = values[2];
    if values.len() >= 5 {
        f.m12 = values[3];
        f.m21 = values[4];
    }
    if values.len() == 9 {
        f.m13 = values[5];
        f.m31 = values[6];
        f.m23 = values[7];
        f.m32 = values[8];
    }
    f
}

pub fn tensor_to_slice(f: &Matrix3<f64>, out: &mut [f64]) {
    out[0] = f.m11;
    out[1] = f.m22;
    out[2] = f.m33;
    if out.len() >= 5 {
        out[3] = f.m12;
        out[4] = f.m21;
    }
    if out.len() == 9 {
        out[5] = f.m13;
        out[6] = f.m31;
        out[7] = f.m23;
        out[8] = f.m32;
    }
}

/// Identity tensor in the reduced non-symmetric layout.
pub fn tensor_identity(size: usize) -> Vec<f64> {
    let mut id = vec![0.0; size];
    id[..3].fill(1.0);
    id
}

/// Expresses `s` in the basis whose vectors are the columns of `r`: `rᵗ·s·r`.
pub fn change_basis(s: &SVector<f64, 6>, r: &Matrix3<f64>) -> SVector<f64, 6> {
    let t = mandel_to_tensor(s);
    tensor_to_mandel(&(r.transpose() * t * r))
}

/// Matrix `Q` such that `change_basis(s, r) = Q·s`. `Q` is orthogonal.
pub fn change_basis_matrix(r: &Matrix3<f64>) -> SMatrix<f64, 6, 6> {
    let mut q = SMatrix::<f64, 6, 6>::zeros();
    for k in 0..6 {
        let mut e = SVector::<f64, 6>::zeros();
        e[k] = 1.0;
        q.set_column(k, &change_basis(&e, r));
    }
    q
}

/// Change of basis of a fourth order operator mapping symmetric tensors
/// to symmetric tensors, consistent with [`change_basis`].
pub fn change_basis_operator(d: &SMatrix<f64, 6, 6>, r: &Matrix3<f64>) -> SMatrix<f64, 6, 6> {
    let q = change_basis_matrix(r);
    q * d * q.transpose()
}

/// [`change_basis`] applied in place to a reduced symmetric tensor.
///
/// For 2D hypotheses `r` must leave the third axis unchanged.
pub fn change_basis_in_place(values: &mut [f64], r: &Matrix3<f64>) {
    let s = change_basis(&stensor_from_slice(values), r);
    stensor_to_slice(&s, values);
}

#[cfg(test)]
mod tests {
    use super::*;
    use matrixcompare::assert_matrix_eq;
    use nalgebra::Rotation3;

    #[test]
    fn mandel_contraction_is_the_dot_product() {
        let a = Matrix3::new(1.0, 2.0, 3.0, 2.0, 4.0, 5.0, 3.0, 5.0, 6.0);
        let b = Matrix3::new(-1.0, 0.5, 0.25, 0.5, 2.0, 1.5, 0.25, 1.5, 3.0);
        let expected = a.component_mul(&b).sum();
        let got = tensor_to_mandel(&a).dot(&tensor_to_mandel(&b));
        assert!((expected - got).abs() < 1e-12);
        assert_matrix_eq!(mandel_to_tensor(&tensor_to_mandel(&a)), a, comp = abs, tol = 1e-14);
    }

    #[test]
    fn change_basis_matrix_is_orthogonal() {
        let r = Rotation3::from_euler_angles(0.3, -0.7, 1.1).into_inner();
        let q = change_basis_matrix(&r);
        assert_matrix_eq!(
            q * q.transpose(),
            SMatrix::<f64, 6, 6>::identity(),
            comp = abs,
            tol = 1e-12
        );
        let s = SVector::<f64, 6>::new(1.0, -2.0, 3.0, 0.5, 0.1, -0.3);
        let back = change_basis(&change_basis(&s, &r), &r.transpose());
        assert_matrix_eq!(back, s, comp = abs, tol = 1e-12);
    }

    #[test]
    fn reduced_tensors_round_trip() {
        let f = [1.1, 0.9, 1.0, 0.05, -0.02];
        let mut out = [0.0; 5];
        tensor_to_slice(&tensor_from_slice(&f), &mut out);
        assert_eq!(f, out);
        assert_eq!(tensor_identity(5), vec![1.0, 1.0, 1.0, 0.0, 0.0]);
    }
}
