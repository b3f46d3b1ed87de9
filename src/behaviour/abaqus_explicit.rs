//! Behaviours following the Abaqus/Explicit `VUMAT` convention.
//!
//! The function integrates in the corotational frame given by the polar
//! decomposition of the deformation gradient. The tangent operator is
//! never computed by the function: the elastic stiffness is probed once by
//! the packaging step and cached in the state.
use std::ptr;
use std::sync::Arc;

use log::debug;
use nalgebra::{DMatrix, Matrix3, SMatrix};

use super::{
    check_integration_buffers, Behaviour, BehaviourDescription, BehaviourWorkSpace, CurrentState,
    IntegrationOutcome, IntegrationStage, PackagingValue,
};
use crate::convention::{
    abaqus_explicit_components, abaqus_explicit_deformation_gradient, deformation_gradient_operator,
};
use crate::error::{BehaviourError, Result};
use crate::finite_strain::polar_decomposition;
use crate::hypothesis::{ModellingHypothesis, SolverConvention, StiffnessMatrixType};
use crate::loader::DynamicLibrary;
use crate::mandel::{
    change_basis, change_basis_operator, stensor_from_slice, stensor_to_slice, tensor_from_slice,
    tensor_to_mandel, INV_SQRT2, SQRT2,
};

/// Name of the packaging information holding the elastic stiffness.
pub const INITIAL_ELASTIC_STIFFNESS: &str = "InitialElasticStiffness";

pub type AbaqusExplicitFunction = unsafe extern "C" fn(
    nblock: *const i32,
    ndir: *const i32,
    nshr: *const i32,
    nstatev: *const i32,
    nfieldv: *const i32,
    nprops: *const i32,
    lanneal: *const i32,
    step_time: *const f64,
    total_time: *const f64,
    dt: *const f64,
    cmname: *const std::os::raw::c_char,
    coord_mp: *const f64,
    char_length: *const f64,
    props: *const f64,
    density: *const f64,
    strain_inc: *const f64,
    rel_spin_inc: *const f64,
    temp_old: *const f64,
    stretch_old: *const f64,
    defgrad_old: *const f64,
    field_old: *const f64,
    stress_old: *const f64,
    state_old: *const f64,
    ener_intern_old: *const f64,
    ener_inelas_old: *const f64,
    temp_new: *const f64,
    stretch_new: *const f64,
    defgrad_new: *const f64,
    field_new: *const f64,
    stress_new: *mut f64,
    state_new: *mut f64,
    ener_intern_new: *mut f64,
    ener_inelas_new: *mut f64,
    hidden_len: std::os::raw::c_int,
);

/// Arrays exchanged with one call.
struct VumatCall {
    ndir: i32,
    nshr: i32,
    times: f64,
    dt: f64,
    strain_inc: [f64; 6],
    stretch_old: [f64; 6],
    stretch_new: [f64; 6],
    defgrad_old: [f64; 9],
    defgrad_new: [f64; 9],
    stress_old: [f64; 6],
    stress_new: [f64; 6],
}

impl VumatCall {
    fn new(ndir: i32, nshr: i32, times: f64) -> Self {
        Self {
            ndir,
            nshr,
            times,
            dt: 0.0,
            strain_inc: [0.0; 6],
            stretch_old: [1.0, 1.0, 1.0, 0.0, 0.0, 0.0],
            stretch_new: [1.0, 1.0, 1.0, 0.0, 0.0, 0.0],
            defgrad_old: [1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            defgrad_new: [1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            stress_old: [0.0; 6],
            stress_new: [0.0; 6],
        }
    }
}

pub struct AbaqusExplicitBehaviour {
    description: BehaviourDescription,
    function: AbaqusExplicitFunction,
    orthotropy_managed_by_behaviour: bool,
    _library: Option<Arc<DynamicLibrary>>,
}

impl AbaqusExplicitBehaviour {
    /// The first material property is the mass density.
    pub fn new(description: BehaviourDescription, function: AbaqusExplicitFunction) -> Self {
        Self {
            description,
            function,
            orthotropy_managed_by_behaviour: false,
            _library: None,
        }
    }

    /// The behaviour rotates the tensors itself, reading the material axes
    /// from its first internal state variables.
    pub fn with_orthotropy_managed_by_behaviour(mut self, managed: bool) -> Self {
        self.orthotropy_managed_by_behaviour = managed;
        self
    }

    pub fn with_library(mut self, library: Arc<DynamicLibrary>) -> Self {
        self._library = Some(library);
        self
    }

    fn unsupported_hypothesis(&self) -> BehaviourError {
        BehaviourError::UnsupportedHypothesis {
            context: "AbaqusExplicitBehaviour",
            hypothesis: self.description.hypothesis,
        }
    }

    fn number_of_shear_components(&self) -> Result<i32> {
        use ModellingHypothesis::*;
        match self.description.hypothesis {
            PlaneStress | Axisymmetrical | PlaneStrain => Ok(1),
            Tridimensional => Ok(3),
            _ => Err(self.unsupported_hypothesis()),
        }
    }

    /// Copies the material properties following the density and the
    /// external state variables at the end of the step.
    fn prepare_workspace(&self, s: &CurrentState, wk: &mut BehaviourWorkSpace) -> Result<f64> {
        let Some((&density, props)) = s.mprops1.split_first() else {
            return Err(BehaviourError::MissingMaterialProperty("MassDensity".to_string()));
        };
        if props.len() > wk.mps.len() {
            return Err(BehaviourError::InvalidBufferSize {
                context: "AbaqusExplicitBehaviour",
                what: "material properties",
                expected: wk.mps.len() + 1,
                got: s.mprops1.len(),
            });
        }
        if props.is_empty() {
            wk.mps[0] = 0.0;
        } else {
            wk.mps[..props.len()].copy_from_slice(props);
        }
        for ((ev, e0), de) in wk.evs.iter_mut().zip(&s.esv0).zip(&s.desv) {
            *ev = e0 + de;
        }
        Ok(density)
    }

    /// Stores the material axes in the first internal state variables.
    fn export_orthotropic_axes(&self, s: &mut CurrentState) -> Result<()> {
        if !self.orthotropy_managed_by_behaviour {
            return Ok(());
        }
        let axes = if self.description.hypothesis == ModellingHypothesis::Tridimensional {
            vec![s.r.m11, s.r.m21, s.r.m31, s.r.m12, s.r.m22, s.r.m32]
        } else {
            vec![s.r.m11, s.r.m21]
        };
        if s.iv0.len() < axes.len() {
            return Err(BehaviourError::InvalidBufferSize {
                context: "AbaqusExplicitBehaviour",
                what: "internal state variables holding the material axes",
                expected: axes.len(),
                got: s.iv0.len(),
            });
        }
        s.iv0[..axes.len()].copy_from_slice(&axes);
        Ok(())
    }

    fn call(&self, s: &mut CurrentState, wk: &mut BehaviourWorkSpace, density: f64, c: &mut VumatCall) {
        let nblock: i32 = 1;
        let nstatv = s.iv1.len() as i32;
        let nfieldv = s.esv0.len() as i32 - 1;
        let nprops = s.mprops1.len() as i32 - 1;
        let (state_old, state_new) = if nstatv == 0 {
            (ptr::null(), ptr::null_mut())
        } else {
            (s.iv0.as_ptr(), s.iv1.as_mut_ptr())
        };
        let (field_old, field_new) = if nfieldv == 0 {
            (ptr::null(), ptr::null())
        } else {
            (s.esv0[1..].as_ptr(), wk.evs[1..].as_ptr())
        };
        // SAFETY: tensors are stored in fixed size arrays large enough for
        // the 3D case, the other buffers were sized by `allocate`
        unsafe {
            (self.function)(
                &nblock,
                &c.ndir,
                &c.nshr,
                &nstatv,
                &nfieldv,
                &nprops,
                ptr::null(),
                &c.times,
                &c.times,
                &c.dt,
                ptr::null(),
                ptr::null(),
                ptr::null(),
                wk.mps.as_ptr(),
                &density,
                c.strain_inc.as_ptr(),
                ptr::null(),
                s.esv0.as_ptr(),
                c.stretch_old.as_ptr(),
                c.defgrad_old.as_ptr(),
                field_old,
                c.stress_old.as_ptr(),
                state_old,
                &s.se0,
                &s.de0,
                wk.evs.as_ptr(),
                c.stretch_new.as_ptr(),
                c.defgrad_new.as_ptr(),
                field_new,
                c.stress_new.as_mut_ptr(),
                state_new,
                &mut s.se1,
                &mut s.de1,
                0,
            );
        }
    }

    /// Elastic stiffness probed by unit strain increments, expressed in the
    /// global frame with respect to the deformation gradient.
    fn probe_elastic_stiffness(&self, s: &mut CurrentState, wk: &mut BehaviourWorkSpace) -> Result<DMatrix<f64>> {
        let hypothesis = self.description.hypothesis;
        let nshr = self.number_of_shear_components()?;
        let ndir = if hypothesis == ModellingHypothesis::PlaneStress { 2 } else { 3 };
        let density = self.prepare_workspace(s, wk)?;
        self.export_orthotropic_axes(s)?;
        let components = abaqus_explicit_components(hypothesis);
        let scale = |i: usize| if i >= 3 { SQRT2 } else { 1.0 };
        let mut k = SMatrix::<f64, 6, 6>::zeros();
        for j in 0..(ndir + nshr) as usize {
            let mut c = VumatCall::new(ndir, nshr, 0.0);
            c.strain_inc[j] = 1.0;
            self.call(s, wk, density, &mut c);
            let cj = components[j];
            for (i, &ci) in components.iter().enumerate() {
                k[(ci, cj)] = c.stress_new[i] * scale(ci) / scale(cj);
            }
        }
        let n = hypothesis.stensor_size();
        debug!(
            "AbaqusExplicitBehaviour::do_packaging_step: stiffness matrix{}",
            k.view((0, 0), (n, n))
        );
        let d = change_basis_operator(&k, &s.r.transpose());
        let m = deformation_gradient_operator(&d, hypothesis);
        Ok(m)
    }

    fn cached_stiffness(&self, context: &'static str, s: &CurrentState) -> Result<DMatrix<f64>> {
        s.packaging_info
            .matrix(INITIAL_ELASTIC_STIFFNESS)
            .cloned()
            .ok_or(BehaviourError::MissingPackagingInfo {
                context,
                name: INITIAL_ELASTIC_STIFFNESS,
            })
    }
}

/// Symmetric tensor in the Abaqus-explicit layout, tensorial shear.
fn export_stensor(values: &nalgebra::SVector<f64, 6>, hypothesis: ModellingHypothesis, out: &mut [f64; 6]) {
    let n = hypothesis.stensor_size();
    for (k, &i) in abaqus_explicit_components(ModellingHypothesis::Tridimensional)
        .iter()
        .take(n)
        .enumerate()
    {
        out[k] = if i >= 3 { values[i] * INV_SQRT2 } else { values[i] };
    }
}

impl Behaviour for AbaqusExplicitBehaviour {
    fn description(&self) -> &BehaviourDescription {
        &self.description
    }

    fn solver_convention(&self) -> SolverConvention {
        SolverConvention::AbaqusExplicit
    }

    fn do_packaging_step(&self, s: &mut CurrentState, wk: &mut BehaviourWorkSpace) -> Result<bool> {
        check_integration_buffers(self, "AbaqusExplicitBehaviour::do_packaging_step", s, wk)?;
        let m = self.probe_elastic_stiffness(s, wk)?;
        s.packaging_info
            .insert(INITIAL_ELASTIC_STIFFNESS, PackagingValue::Matrix(m));
        wk.stage = IntegrationStage::Packaged;
        Ok(true)
    }

    fn compute_prediction_operator(
        &self,
        wk: &mut BehaviourWorkSpace,
        s: &CurrentState,
        ktype: StiffnessMatrixType,
    ) -> Result<bool> {
        if ktype != StiffnessMatrixType::Elastic {
            return Ok(false);
        }
        wk.kt = self.cached_stiffness("AbaqusExplicitBehaviour::compute_prediction_operator", s)?;
        Ok(true)
    }

    fn integrate(
        &self,
        s: &mut CurrentState,
        wk: &mut BehaviourWorkSpace,
        dt: f64,
        ktype: StiffnessMatrixType,
    ) -> Result<IntegrationOutcome> {
        const CONTEXT: &str = "AbaqusExplicitBehaviour::integrate";
        check_integration_buffers(self, CONTEXT, s, wk)?;
        if ktype != StiffnessMatrixType::Elastic {
            return Err(BehaviourError::UnsupportedStiffnessMatrixType {
                context: CONTEXT,
                stiffness: ktype,
            });
        }
        wk.k = self.cached_stiffness(CONTEXT, s)?;
        let hypothesis = self.description.hypothesis;
        let nshr = self.number_of_shear_components()?;
        let density = self.prepare_workspace(s, wk)?;
        self.export_orthotropic_axes(s)?;
        s.iv1.clone_from(&s.iv0);
        let mut f0 = tensor_from_slice(&s.e0);
        let mut f1 = tensor_from_slice(&s.e1);
        let mut s0 = stensor_from_slice(&s.s0);
        if !self.orthotropy_managed_by_behaviour {
            let r: Matrix3<f64> = s.r;
            f0 = r.transpose() * f0 * r;
            f1 = r.transpose() * f1 * r;
            s0 = change_basis(&s0, &r);
        }
        let (_, u0) = polar_decomposition(&f0);
        let (r1, u1) = polar_decomposition(&f1);
        let mut c = VumatCall::new(3, nshr, 1.0);
        c.dt = dt;
        c.defgrad_old = abaqus_explicit_deformation_gradient(&f0, hypothesis);
        c.defgrad_new = abaqus_explicit_deformation_gradient(&f1, hypothesis);
        export_stensor(&tensor_to_mandel(&u0), hypothesis, &mut c.stretch_old);
        export_stensor(&tensor_to_mandel(&u1), hypothesis, &mut c.stretch_new);
        let s0 = change_basis(&s0, &r1);
        export_stensor(&s0, hypothesis, &mut c.stress_old);
        c.stress_new = c.stress_old;
        self.call(s, wk, density, &mut c);
        let mut sig = nalgebra::SVector::<f64, 6>::zeros();
        for (k, &i) in abaqus_explicit_components(ModellingHypothesis::Tridimensional)
            .iter()
            .take(hypothesis.stensor_size())
            .enumerate()
        {
            sig[i] = if i >= 3 { c.stress_new[k] * SQRT2 } else { c.stress_new[k] };
        }
        if hypothesis == ModellingHypothesis::PlaneStress {
            sig[2] = 0.0;
        }
        let mut sig = change_basis(&sig, &r1.transpose());
        if !self.orthotropy_managed_by_behaviour {
            sig = change_basis(&sig, &s.r.transpose());
        }
        stensor_to_slice(&sig, &mut s.s1);
        wk.stage = IntegrationStage::Integrated;
        Ok(IntegrationOutcome::success(1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stiffness::isotropic_stiffness_3d;
    use matrixcompare::assert_matrix_eq;
    use nalgebra::{Rotation3, SVector, Vector3};
    use std::os::raw::{c_char, c_int};

    const YOUNG: f64 = 200e9;
    const NU: f64 = 0.3;

    /// Isotropic elasticity, `props = [E, ν]`. Uses the strain increment
    /// during the packaging step (`totalTime = 0`) and the Biot strain
    /// `U - I` afterwards.
    unsafe extern "C" fn elastic_vumat(
        _nblock: *const i32,
        ndir: *const i32,
        nshr: *const i32,
        _nstatev: *const i32,
        _nfieldv: *const i32,
        _nprops: *const i32,
        _lanneal: *const i32,
        _step_time: *const f64,
        total_time: *const f64,
        _dt: *const f64,
        _cmname: *const c_char,
        _coord_mp: *const f64,
        _char_length: *const f64,
        props: *const f64,
        _density: *const f64,
        strain_inc: *const f64,
        _rel_spin_inc: *const f64,
        _temp_old: *const f64,
        _stretch_old: *const f64,
        _defgrad_old: *const f64,
        _field_old: *const f64,
        _stress_old: *const f64,
        _state_old: *const f64,
        _ener_intern_old: *const f64,
        _ener_inelas_old: *const f64,
        _temp_new: *const f64,
        stretch_new: *const f64,
        _defgrad_new: *const f64,
        _field_new: *const f64,
        stress_new: *mut f64,
        _state_new: *mut f64,
        _ener_intern_new: *mut f64,
        _ener_inelas_new: *mut f64,
        _hidden_len: c_int,
    ) {
        let (ndir, nshr) = (*ndir as usize, *nshr as usize);
        let (young, nu) = (*props, *props.add(1));
        let mut e = [0.0; 6];
        if *total_time == 0.0 {
            e[..ndir + nshr].copy_from_slice(std::slice::from_raw_parts(strain_inc, ndir + nshr));
        } else {
            e[..ndir + nshr].copy_from_slice(std::slice::from_raw_parts(stretch_new, ndir + nshr));
            for v in e.iter_mut().take(ndir) {
                *v -= 1.0;
            }
        }
        let stress = std::slice::from_raw_parts_mut(stress_new, ndir + nshr);
        let mu = young / (2.0 * (1.0 + nu));
        let tr: f64 = e[..ndir].iter().sum();
        let lambda = if ndir == 2 {
            young * nu / (1.0 - nu * nu)
        } else {
            young * nu / ((1.0 + nu) * (1.0 - 2.0 * nu))
        };
        for i in 0..ndir {
            stress[i] = lambda * tr + 2.0 * mu * e[i];
        }
        for i in ndir..ndir + nshr {
            stress[i] = 2.0 * mu * e[i];
        }
    }

    fn prepare(hypothesis: ModellingHypothesis) -> (AbaqusExplicitBehaviour, CurrentState, BehaviourWorkSpace) {
        let d = BehaviourDescription::new("Elasticity", hypothesis).with_material_properties([
            "MassDensity",
            "YoungModulus",
            "PoissonRatio",
        ]);
        let b = AbaqusExplicitBehaviour::new(d, elastic_vumat);
        let mut s = CurrentState::default();
        let mut wk = BehaviourWorkSpace::default();
        b.allocate(&mut wk).unwrap();
        b.allocate_state(&mut s).unwrap();
        s.mprops1 = vec![7800.0, YOUNG, NU];
        s.esv0 = vec![293.15];
        (b, s, wk)
    }

    #[test]
    fn packaging_probes_the_elastic_stiffness() {
        let (b, mut s, mut wk) = prepare(ModellingHypothesis::Tridimensional);
        assert!(b.do_packaging_step(&mut s, &mut wk).unwrap());
        assert_eq!(wk.stage(), IntegrationStage::Packaged);
        let m = s.packaging_info.matrix(INITIAL_ELASTIC_STIFFNESS).unwrap().clone();
        assert_eq!((m.nrows(), m.ncols()), (6, 9));
        let d = isotropic_stiffness_3d(YOUNG, NU);
        let d = DMatrix::from_column_slice(6, 6, d.as_slice());
        assert_matrix_eq!(m.columns(0, 3), d.columns(0, 3), comp = abs, tol = 1e-3);
        let mu = YOUNG / (2.0 * (1.0 + NU));
        assert!((m[(3, 3)] - SQRT2 * mu).abs() < 1e-3);
        assert!((m[(3, 4)] - SQRT2 * mu).abs() < 1e-3);
        assert!((m[(5, 7)] - SQRT2 * mu).abs() < 1e-3);
        // a second packaging step gives the same operator
        b.do_packaging_step(&mut s, &mut wk).unwrap();
        assert_eq!(s.packaging_info.matrix(INITIAL_ELASTIC_STIFFNESS), Some(&m));
    }

    #[test]
    fn plane_stress_packaging_has_a_vanishing_axial_row() {
        let (b, mut s, mut wk) = prepare(ModellingHypothesis::PlaneStress);
        b.do_packaging_step(&mut s, &mut wk).unwrap();
        let m = s.packaging_info.matrix(INITIAL_ELASTIC_STIFFNESS).unwrap();
        assert_eq!((m.nrows(), m.ncols()), (4, 5));
        assert!(m.row(2).iter().all(|v| *v == 0.0));
        assert!((m[(0, 0)] - YOUNG / (1.0 - NU * NU)).abs() < 1e-3);
    }

    #[test]
    fn prediction_requires_the_packaging_step() {
        let (b, mut s, mut wk) = prepare(ModellingHypothesis::PlaneStrain);
        assert!(matches!(
            b.compute_prediction_operator(&mut wk, &s, StiffnessMatrixType::Elastic),
            Err(BehaviourError::MissingPackagingInfo { .. })
        ));
        b.do_packaging_step(&mut s, &mut wk).unwrap();
        assert!(b
            .compute_prediction_operator(&mut wk, &s, StiffnessMatrixType::Elastic)
            .unwrap());
        assert!(!b
            .compute_prediction_operator(&mut wk, &s, StiffnessMatrixType::Tangent)
            .unwrap());
    }

    #[test]
    fn integration_in_the_corotational_frame() {
        let (b, mut s, mut wk) = prepare(ModellingHypothesis::Tridimensional);
        b.do_packaging_step(&mut s, &mut wk).unwrap();
        let angle = std::f64::consts::FRAC_PI_6;
        let q = *Rotation3::from_axis_angle(&Vector3::z_axis(), angle).matrix();
        let f1 = q * Matrix3::from_diagonal(&Vector3::new(1.0 + 1e-3, 1.0, 1.0));
        s.e1 = vec![f1.m11, f1.m22, f1.m33, f1.m12, f1.m21, f1.m13, f1.m31, f1.m23, f1.m32];
        let outcome = b
            .integrate(&mut s, &mut wk, 1.0, StiffnessMatrixType::Elastic)
            .unwrap();
        assert!(outcome.success);
        let lambda = YOUNG * NU / ((1.0 + NU) * (1.0 - 2.0 * NU));
        let mu = YOUNG / (2.0 * (1.0 + NU));
        let local = Matrix3::from_diagonal(&Vector3::new(
            (lambda + 2.0 * mu) * 1e-3,
            lambda * 1e-3,
            lambda * 1e-3,
        ));
        let expected: SVector<f64, 6> = tensor_to_mandel(&(q * local * q.transpose()));
        let s1 = SVector::<f64, 6>::from_column_slice(&s.s1);
        assert_matrix_eq!(s1, expected, comp = abs, tol = 1e-2);
        assert_eq!(wk.stage(), IntegrationStage::Integrated);
    }

    #[test]
    fn only_the_elastic_operator_is_available() {
        let (b, mut s, mut wk) = prepare(ModellingHypothesis::Tridimensional);
        b.do_packaging_step(&mut s, &mut wk).unwrap();
        assert!(matches!(
            b.integrate(&mut s, &mut wk, 1.0, StiffnessMatrixType::ConsistentTangent),
            Err(BehaviourError::UnsupportedStiffnessMatrixType { .. })
        ));
    }
}
