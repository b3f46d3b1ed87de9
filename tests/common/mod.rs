use std::os::raw::{c_char, c_int};

use tfel_behaviour::stiffness::lame_coefficients;

pub const YOUNG: f64 = 200e9;
pub const POISSON: f64 = 0.3;

/// Isotropic linear elasticity following the UMAT convention, reading
/// `props = [E, ν]`. Shear strains are engineering ones, the tangent
/// operator is returned in column-major order.
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn elastic_umat(
    stress: *mut f64,
    _statev: *mut f64,
    ddsdde: *mut f64,
    _sse: *mut f64,
    _spd: *mut f64,
    _scd: *mut f64,
    _rpl: *mut f64,
    _ddsddt: *mut f64,
    _drplde: *mut f64,
    _drpldt: *mut f64,
    _stran: *const f64,
    dstran: *const f64,
    _time: *const f64,
    _dtime: *const f64,
    _temp: *const f64,
    _dtemp: *const f64,
    _predef: *const f64,
    _dpred: *const f64,
    _cmname: *const c_char,
    _ndi: *const i32,
    _nshr: *const i32,
    ntens: *const i32,
    _nstatv: *const i32,
    props: *const f64,
    _nprops: *const i32,
    _coords: *const f64,
    _drot: *const f64,
    _pnewdt: *mut f64,
    _celent: *const f64,
    _dfgrd0: *const f64,
    _dfgrd1: *const f64,
    _noel: *const i32,
    _npt: *const i32,
    _layer: *const i32,
    _kspt: *const i32,
    _kstep: *const i32,
    _kinc: *mut i32,
    _hidden_len: c_int,
) {
    let n = *ntens as usize;
    let (lambda, mu) = lame_coefficients(*props, *props.add(1));
    let stress = std::slice::from_raw_parts_mut(stress, n);
    let dstran = std::slice::from_raw_parts(dstran, n);
    let d = std::slice::from_raw_parts_mut(ddsdde, n * n);
    d.fill(0.0);
    for i in 0..n {
        for j in 0..n {
            if i < 3 && j < 3 {
                d[i + n * j] = lambda + if i == j { 2.0 * mu } else { 0.0 };
            } else if i == j {
                d[i + n * j] = mu;
            }
        }
    }
    for i in 0..n {
        for j in 0..n {
            stress[i] += d[i + n * j] * dstran[j];
        }
    }
}
