//! Behaviours following the Cast3M UMAT calling convention.
use std::os::raw::{c_char, c_int};
use std::ptr;
use std::sync::Arc;

use log::{debug, warn};
use nalgebra::{DMatrix, SMatrix};

use super::{
    check_integration_buffers, tangent_operator_flag, Behaviour, BehaviourDescription,
    BehaviourWorkSpace, CurrentState, IntegrationOutcome, IntegrationStage,
};
use crate::convention::{
    deformation_gradient_operator, descale_shear, normalise_tangent_operator,
    rotate_stiffness_to_global, scale_shear,
};
use crate::error::{BehaviourError, Result};
use crate::finite_strain::{
    compute_cauchy_stress_from_dual_stress_of_logarithmic_strain,
    compute_cauchy_stress_from_second_piola_kirchhoff_stress,
    compute_dual_stress_of_logarithmic_strain_from_cauchy_stress, compute_green_lagrange_strain,
    compute_logarithmic_strain_and_derivative,
    compute_second_piola_kirchhoff_stress_from_cauchy_stress,
};
use crate::hypothesis::{ElasticSymmetry, ModellingHypothesis, SolverConvention, StiffnessMatrixType};
use crate::loader::DynamicLibrary;
use crate::mandel::tensor_from_slice;
use crate::plane_stress::{GeneralisedPlaneStrainStep, PlaneStressCoefficients, PlaneStressReducer};
use crate::stiffness::{compute_stiffness_tensor, condense_out_of_plane, number_of_elastic_properties};

/// Cast3M UMAT function. Strings are passed with a trailing hidden length.
pub type UmatFunction = unsafe extern "C" fn(
    stress: *mut f64,
    statev: *mut f64,
    ddsdde: *mut f64,
    sse: *mut f64,
    spd: *mut f64,
    scd: *mut f64,
    rpl: *mut f64,
    ddsddt: *mut f64,
    drplde: *mut f64,
    drpldt: *mut f64,
    stran: *const f64,
    dstran: *const f64,
    time: *const f64,
    dtime: *const f64,
    temp: *const f64,
    dtemp: *const f64,
    predef: *const f64,
    dpred: *const f64,
    cmname: *const c_char,
    ndi: *const i32,
    nshr: *const i32,
    ntens: *const i32,
    nstatv: *const i32,
    props: *const f64,
    nprops: *const i32,
    coords: *const f64,
    drot: *const f64,
    pnewdt: *mut f64,
    celent: *const f64,
    dfgrd0: *const f64,
    dfgrd1: *const f64,
    noel: *const i32,
    npt: *const i32,
    layer: *const i32,
    kspt: *const i32,
    kstep: *const i32,
    kinc: *mut i32,
    hidden_len: c_int,
);

/// How a finite strain computation drives the function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UmatFiniteStrainStrategy {
    /// The function handles finite strains itself and receives the
    /// deformation gradients.
    #[default]
    Native,
    /// A small strain function driven by the Green-Lagrange strain and
    /// the second Piola-Kirchhoff stress.
    FiniteRotationSmallStrain,
    /// A small strain function driven by the logarithmic strain and its
    /// dual stress.
    LogarithmicStrain,
}

/// Arguments of one call. Tensors are in the solver convention.
struct UmatCall<'a> {
    stress: &'a mut [f64],
    statev: &'a mut [f64],
    ddsdde: &'a mut [f64],
    stran: Option<&'a [f64]>,
    dstran: Option<&'a [f64]>,
    dfgrd: Option<(&'a [f64], &'a [f64])>,
    dt: f64,
    ndi: i32,
    pnewdt: f64,
    /// Initial value of `kinc` and the value meaning success.
    kinc: (i32, i32),
}

pub struct UmatBehaviour {
    description: BehaviourDescription,
    convention: SolverConvention,
    function: UmatFunction,
    finite_strain_strategy: UmatFiniteStrainStrategy,
    generic_plane_stress: bool,
    _library: Option<Arc<DynamicLibrary>>,
}

impl UmatBehaviour {
    pub fn small_strain(description: BehaviourDescription, function: UmatFunction) -> Self {
        Self {
            description,
            convention: SolverConvention::Umat,
            function,
            finite_strain_strategy: UmatFiniteStrainStrategy::Native,
            generic_plane_stress: false,
            _library: None,
        }
    }

    pub fn finite_strain(description: BehaviourDescription, function: UmatFunction) -> Self {
        Self {
            convention: SolverConvention::UmatFiniteStrain,
            ..Self::small_strain(description, function)
        }
    }

    pub fn with_finite_strain_strategy(mut self, strategy: UmatFiniteStrainStrategy) -> Self {
        self.finite_strain_strategy = strategy;
        self
    }

    /// Under the plane stress hypothesis, calls the function as a
    /// generalised plane strain behaviour and finds the axial strain
    /// ensuring a vanishing axial stress. The axial strain is the last
    /// internal state variable.
    pub fn with_generic_plane_stress(mut self, generic: bool) -> Self {
        self.generic_plane_stress = generic;
        self
    }

    /// Keeps the library providing the function loaded.
    pub fn with_library(mut self, library: Arc<DynamicLibrary>) -> Self {
        self._library = Some(library);
        self
    }

    fn uses_generic_plane_stress(&self) -> bool {
        self.generic_plane_stress && self.description.hypothesis == ModellingHypothesis::PlaneStress
    }

    fn ndi(&self) -> Result<i32> {
        let hypothesis = self.description.hypothesis;
        hypothesis.umat_ndi().ok_or(BehaviourError::UnsupportedHypothesis {
            context: "UmatBehaviour",
            hypothesis,
        })
    }

    fn kinc_convention(&self) -> Result<(i32, i32)> {
        self.convention
            .kinc_convention()
            .ok_or(BehaviourError::UnsupportedSolverConvention(self.convention))
    }

    fn call(&self, s: &CurrentState, mut c: UmatCall<'_>) -> (bool, f64) {
        let ntens = c.stress.len() as i32;
        let nstatv = c.statev.len() as i32;
        let nprops = s.mprops1.len() as i32;
        let drot: [f64; 9] = {
            let mut d = [0.0; 9];
            d.copy_from_slice(s.r.as_slice());
            d
        };
        let (dfgrd0, dfgrd1) = c
            .dfgrd
            .map_or((ptr::null(), ptr::null()), |(f0, f1)| (f0.as_ptr(), f1.as_ptr()));
        let (mut kinc, success) = c.kinc;
        // SAFETY: every buffer is sized after the hypothesis and outlives the call
        unsafe {
            (self.function)(
                c.stress.as_mut_ptr(),
                c.statev.as_mut_ptr(),
                c.ddsdde.as_mut_ptr(),
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null_mut(),
                c.stran.map_or(ptr::null(), |e| e.as_ptr()),
                c.dstran.map_or(ptr::null(), |e| e.as_ptr()),
                ptr::null(),
                &c.dt,
                s.esv0.as_ptr(),
                s.desv.as_ptr(),
                s.esv0[1..].as_ptr(),
                s.desv[1..].as_ptr(),
                ptr::null(),
                &c.ndi,
                ptr::null(),
                &ntens,
                &nstatv,
                s.mprops1.as_ptr(),
                &nprops,
                ptr::null(),
                drot.as_ptr(),
                &mut c.pnewdt,
                ptr::null(),
                dfgrd0,
                dfgrd1,
                ptr::null(),
                ptr::null(),
                ptr::null(),
                ptr::null(),
                ptr::null(),
                &mut kinc,
                0,
            );
        }
        if kinc != success {
            warn!(
                "behaviour '{}' reported a failure (kinc = {})",
                self.description.name, kinc
            );
        }
        (kinc == success, c.pnewdt)
    }

    /// Calls a small strain function, through the generic plane stress
    /// handling if requested. `stress` holds the stress at the beginning of
    /// the step on input and at the end on output, in the solver convention.
    /// Internal state variables are written in `wk.ivs`.
    fn call_small_strain(
        &self,
        s: &CurrentState,
        wk: &mut BehaviourWorkSpace,
        stran: &[f64],
        dstran: &[f64],
        stress: &mut [f64],
        dt: f64,
        flag: f64,
    ) -> Result<(bool, f64)> {
        // the generalised plane strain operator can not be condensed here
        debug_assert!(flag == 0.0 || !self.uses_generic_plane_stress());
        let ntens = stress.len();
        wk.d.fill(0.0);
        wk.d[(0, 0)] = flag;
        if !s.iv0.is_empty() {
            wk.ivs[..s.iv0.len()].copy_from_slice(&s.iv0);
        }
        let kinc = self.kinc_convention()?;
        if !self.uses_generic_plane_stress() {
            return Ok(self.call(
                s,
                UmatCall {
                    stress,
                    statev: &mut wk.ivs,
                    ddsdde: &mut wk.d.as_mut_slice()[..ntens * ntens],
                    stran: Some(stran),
                    dstran: Some(dstran),
                    dfgrd: None,
                    dt,
                    ndi: self.ndi()?,
                    pnewdt: 1.0,
                    kinc,
                },
            ));
        }
        let nisv = self.description.internal_state_variables;
        if nisv == 0 {
            // the axial strain is stored in the last internal state variable
            return Err(BehaviourError::InvalidBufferSize {
                context: "UmatBehaviour: generic plane stress handling",
                what: "internal state variables (the axial strain is required)",
                expected: 1,
                got: 0,
            });
        }
        let coefficients =
            PlaneStressCoefficients::from_material_properties(self.description.symmetry, &s.mprops1)?;
        let reducer = PlaneStressReducer::new(coefficients);
        let gps = ModellingHypothesis::GeneralisedPlaneStrain
            .umat_ndi()
            .unwrap_or(-3);
        let mut ndt = 1.0;
        let mut ddsdde = [0.0; 16];
        let outcome = reducer.integrate(stran, dstran, stress, &mut wk.ivs[..nisv], |step: GeneralisedPlaneStrainStep<'_>| {
            let mut dummy = [0.0];
            let statev = if step.state_variables.is_empty() {
                &mut dummy[..]
            } else {
                step.state_variables
            };
            ddsdde.fill(0.0);
            let (ok, r) = self.call(
                s,
                UmatCall {
                    stress: step.stress,
                    statev,
                    ddsdde: &mut ddsdde,
                    stran: Some(&step.strain[..]),
                    dstran: Some(&step.strain_increment[..]),
                    dfgrd: None,
                    dt,
                    ndi: gps,
                    pnewdt: 1.0,
                    kinc,
                },
            );
            ndt = r;
            ok
        })?;
        Ok((outcome.success, ndt))
    }

    /// Operator computed from the material properties, rotated to the
    /// global frame for orthotropic behaviours.
    fn elastic_stiffness(&self, s: &CurrentState, rotate: bool) -> Result<DMatrix<f64>> {
        let desc = &self.description;
        let hypothesis = desc.hypothesis;
        let generic = self.uses_generic_plane_stress();
        let altered = hypothesis == ModellingHypothesis::PlaneStress && !generic;
        let k = if generic {
            // condensed generalised plane strain stiffness of the wrapped behaviour
            let k = compute_stiffness_tensor(
                desc.symmetry,
                ModellingHypothesis::GeneralisedPlaneStrain,
                desc.orthotropic_axes_convention,
                &s.mprops1,
                false,
            )?;
            condense_out_of_plane(&k, 2)
        } else {
            compute_stiffness_tensor(
                desc.symmetry,
                hypothesis,
                desc.orthotropic_axes_convention,
                &s.mprops1,
                altered,
            )?
        };
        debug!("elastic stiffness of behaviour '{}' in the material frame: {}", desc.name, k);
        if !rotate || desc.symmetry == ElasticSymmetry::Isotropic || hypothesis.space_dimension() == 1 {
            return Ok(k);
        }
        let offset = number_of_elastic_properties(desc.symmetry, hypothesis, altered);
        let nv = if hypothesis.space_dimension() == 2 { 2 } else { 6 };
        if s.mprops1.len() < offset + nv {
            return Err(BehaviourError::InvalidMaterialProperties {
                context: "UmatBehaviour::elastic_stiffness",
                symmetry: desc.symmetry,
                hypothesis,
                expected: offset + nv,
                got: s.mprops1.len(),
            });
        }
        Ok(rotate_stiffness_to_global(
            &k,
            hypothesis,
            &s.mprops1[offset..offset + nv],
            s.r.as_slice(),
        ))
    }

    /// Elastic operator of a finite strain behaviour, with respect to the
    /// deformation gradient.
    fn finite_strain_elastic_operator(&self, s: &CurrentState) -> Result<DMatrix<f64>> {
        let k = self.elastic_stiffness(s, false)?;
        let n = k.nrows();
        let mut d = SMatrix::<f64, 6, 6>::zeros();
        d.view_mut((0, 0), (n, n)).copy_from(&k);
        Ok(deformation_gradient_operator(&d, self.description.hypothesis))
    }

    /// One small strain step. `integration` selects the end of step
    /// operators over the prediction ones.
    fn small_strain_step(
        &self,
        s: &mut CurrentState,
        wk: &mut BehaviourWorkSpace,
        dt: f64,
        ktype: StiffnessMatrixType,
        integration: bool,
    ) -> Result<(IntegrationOutcome, Option<DMatrix<f64>>)> {
        let flag = tangent_operator_flag("UmatBehaviour::integrate", ktype, integration)?;
        if self.uses_generic_plane_stress()
            && !matches!(
                ktype,
                StiffnessMatrixType::NoStiffness | StiffnessMatrixType::ElasticFromMaterialProperties
            )
        {
            return Err(BehaviourError::UnsupportedStiffnessMatrixType {
                context: "UmatBehaviour: generic plane stress handling",
                stiffness: ktype,
            });
        }
        let ntens = self.thermodynamic_forces_size();
        let mut stran = s.e0.clone();
        let mut dstran: Vec<f64> = s.e1.iter().zip(s.e0.iter()).map(|(e1, e0)| e1 - e0).collect();
        scale_shear(&mut stran);
        scale_shear(&mut dstran);
        let mut stress = s.s0.clone();
        descale_shear(&mut stress);
        let (ok, ndt) = self.call_small_strain(s, wk, &stran, &dstran, &mut stress, dt, flag)?;
        if !ok {
            return Ok((IntegrationOutcome::failure(ndt), None));
        }
        let nisv = s.iv1.len();
        s.iv1.copy_from_slice(&wk.ivs[..nisv]);
        let k = match ktype {
            StiffnessMatrixType::NoStiffness => None,
            StiffnessMatrixType::ElasticFromMaterialProperties => Some(self.elastic_stiffness(s, true)?),
            _ => Some(normalise_tangent_operator(&wk.d.as_slice()[..ntens * ntens], ntens)),
        };
        scale_shear(&mut stress);
        s.s1.copy_from_slice(&stress);
        Ok((IntegrationOutcome::success(ndt), k))
    }

    fn check_finite_strain_operator(ktype: StiffnessMatrixType) -> Result<()> {
        use StiffnessMatrixType::*;
        match ktype {
            NoStiffness | Elastic | ElasticFromMaterialProperties => Ok(()),
            stiffness => Err(BehaviourError::UnsupportedStiffnessMatrixType {
                context: "UmatBehaviour: finite strain",
                stiffness,
            }),
        }
    }

    fn finite_strain_step(
        &self,
        s: &mut CurrentState,
        wk: &mut BehaviourWorkSpace,
        dt: f64,
        ktype: StiffnessMatrixType,
    ) -> Result<IntegrationOutcome> {
        Self::check_finite_strain_operator(ktype)?;
        let hypothesis = self.description.hypothesis;
        let f0 = tensor_from_slice(&s.e0);
        let f1 = tensor_from_slice(&s.e1);
        let (f0, f1) = (f0.as_slice(), f1.as_slice());
        // axial gradient used under plane stress
        let (fzz0, fzz1) = (f0[8], f1[8]);
        let mut stress = s.s0.clone();
        descale_shear(&mut stress);
        let (ok, ndt) = match self.finite_strain_strategy {
            UmatFiniteStrainStrategy::Native => {
                wk.d.fill(0.0);
                if !s.iv0.is_empty() {
                    wk.ivs[..s.iv0.len()].copy_from_slice(&s.iv0);
                }
                let ntens = stress.len();
                self.call(
                    s,
                    UmatCall {
                        stress: &mut stress,
                        statev: &mut wk.ivs,
                        ddsdde: &mut wk.d.as_mut_slice()[..ntens * ntens],
                        stran: None,
                        dstran: None,
                        dfgrd: Some((f0, f1)),
                        dt,
                        ndi: self.ndi()?,
                        pnewdt: f64::MAX,
                        kinc: self.kinc_convention()?,
                    },
                )
            }
            UmatFiniteStrainStrategy::FiniteRotationSmallStrain => {
                let e0 = compute_green_lagrange_strain(f0, hypothesis);
                let e1 = compute_green_lagrange_strain(f1, hypothesis);
                let de = &e1 - &e0;
                let mut sk2 = compute_second_piola_kirchhoff_stress_from_cauchy_stress(
                    &stress, f0, hypothesis, fzz0,
                );
                let r = self.call_small_strain(
                    s,
                    wk,
                    e0.as_slice(),
                    de.as_slice(),
                    sk2.as_mut_slice(),
                    dt,
                    0.0,
                )?;
                if r.0 {
                    let sig = compute_cauchy_stress_from_second_piola_kirchhoff_stress(
                        sk2.as_slice(),
                        f1,
                        hypothesis,
                        fzz1,
                    );
                    stress.copy_from_slice(sig.as_slice());
                }
                r
            }
            UmatFiniteStrainStrategy::LogarithmicStrain => {
                let (e0, p0) = compute_logarithmic_strain_and_derivative(f0, hypothesis);
                let (e1, p1) = compute_logarithmic_strain_and_derivative(f1, hypothesis);
                let de = &e1 - &e0;
                let mut t = compute_dual_stress_of_logarithmic_strain_from_cauchy_stress(
                    &stress, &p0, f0, hypothesis, fzz0,
                )?;
                let r = self.call_small_strain(
                    s,
                    wk,
                    e0.as_slice(),
                    de.as_slice(),
                    t.as_mut_slice(),
                    dt,
                    0.0,
                )?;
                if r.0 {
                    let sig = compute_cauchy_stress_from_dual_stress_of_logarithmic_strain(
                        t.as_slice(),
                        &p1,
                        f1,
                        hypothesis,
                        fzz1,
                    );
                    stress.copy_from_slice(sig.as_slice());
                }
                r
            }
        };
        if !ok {
            return Ok(IntegrationOutcome::failure(ndt));
        }
        if ktype != StiffnessMatrixType::NoStiffness {
            wk.k = self.finite_strain_elastic_operator(s)?;
        }
        let nisv = s.iv1.len();
        s.iv1.copy_from_slice(&wk.ivs[..nisv]);
        scale_shear(&mut stress);
        s.s1.copy_from_slice(&stress);
        Ok(IntegrationOutcome::success(ndt))
    }
}

impl Behaviour for UmatBehaviour {
    fn description(&self) -> &BehaviourDescription {
        &self.description
    }

    fn solver_convention(&self) -> SolverConvention {
        self.convention
    }

    fn driving_variables_size(&self) -> usize {
        match self.convention {
            SolverConvention::UmatFiniteStrain => self.hypothesis().tensor_size(),
            _ => self.hypothesis().stensor_size(),
        }
    }

    fn compute_prediction_operator(
        &self,
        wk: &mut BehaviourWorkSpace,
        s: &CurrentState,
        ktype: StiffnessMatrixType,
    ) -> Result<bool> {
        check_integration_buffers(self, "UmatBehaviour::compute_prediction_operator", s, wk)?;
        if self.convention == SolverConvention::UmatFiniteStrain {
            Self::check_finite_strain_operator(ktype)?;
            if ktype == StiffnessMatrixType::NoStiffness {
                return Err(BehaviourError::UnsupportedStiffnessMatrixType {
                    context: "UmatBehaviour::compute_prediction_operator",
                    stiffness: ktype,
                });
            }
            wk.kt = self.finite_strain_elastic_operator(s)?;
            return Ok(true);
        }
        if ktype == StiffnessMatrixType::ElasticFromMaterialProperties {
            wk.kt = self.elastic_stiffness(s, true)?;
            return Ok(true);
        }
        let mut tmp = s.clone();
        tmp.e1.clone_from(&s.e0);
        tmp.iv1.clone_from(&s.iv0);
        tmp.desv.fill(0.0);
        let (outcome, k) = self.small_strain_step(&mut tmp, wk, 1.0, ktype, false)?;
        if let Some(k) = k {
            wk.kt = k;
        }
        Ok(outcome.success)
    }

    fn integrate(
        &self,
        s: &mut CurrentState,
        wk: &mut BehaviourWorkSpace,
        dt: f64,
        ktype: StiffnessMatrixType,
    ) -> Result<IntegrationOutcome> {
        check_integration_buffers(self, "UmatBehaviour::integrate", s, wk)?;
        let outcome = match self.convention {
            SolverConvention::Umat => {
                let (outcome, k) = self.small_strain_step(s, wk, dt, ktype, true)?;
                if let Some(k) = k {
                    wk.k = k;
                }
                outcome
            }
            SolverConvention::UmatFiniteStrain => self.finite_strain_step(s, wk, dt, ktype)?,
            convention => return Err(BehaviourError::UnsupportedSolverConvention(convention)),
        };
        if outcome.success {
            wk.stage = IntegrationStage::Integrated;
        }
        Ok(outcome)
    }
}
