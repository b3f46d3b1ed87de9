//! Behaviours following the Cyrano fuel performance code convention.
//!
//! Only the 1D axisymmetrical hypotheses are available. Cyrano orders the
//! components `(rr, θθ, zz)`.
use std::ptr;
use std::sync::Arc;

use log::warn;

use super::{
    check_integration_buffers, tangent_operator_flag, Behaviour, BehaviourDescription,
    BehaviourWorkSpace, CurrentState, IntegrationOutcome, IntegrationStage,
};
use crate::convention::{cyrano_tangent_operator, swap_cyrano_components};
use crate::error::{BehaviourError, Result};
use crate::hypothesis::{ModellingHypothesis, SolverConvention, StiffnessMatrixType};
use crate::loader::DynamicLibrary;
use crate::stiffness::compute_stiffness_tensor;

pub type CyranoFunction = unsafe extern "C" fn(
    ntens: *const i32,
    dtime: *const f64,
    drot: *const f64,
    ddsoe: *mut f64,
    stran: *const f64,
    dstran: *const f64,
    temp: *const f64,
    dtemp: *const f64,
    props: *const f64,
    nprops: *const i32,
    predef: *const f64,
    dpred: *const f64,
    statev: *mut f64,
    nstatv: *const i32,
    stress: *mut f64,
    ndi: *const i32,
    kinc: *mut i32,
);

pub struct CyranoBehaviour {
    description: BehaviourDescription,
    function: CyranoFunction,
    _library: Option<Arc<DynamicLibrary>>,
}

impl CyranoBehaviour {
    pub fn new(description: BehaviourDescription, function: CyranoFunction) -> Self {
        Self {
            description,
            function,
            _library: None,
        }
    }

    pub fn with_library(mut self, library: Arc<DynamicLibrary>) -> Self {
        self._library = Some(library);
        self
    }

    fn ndi(&self) -> Result<i32> {
        match self.description.hypothesis {
            ModellingHypothesis::AxisymmetricalGeneralisedPlaneStrain => Ok(1),
            ModellingHypothesis::AxisymmetricalGeneralisedPlaneStress => Ok(2),
            hypothesis => Err(BehaviourError::UnsupportedHypothesis {
                context: "CyranoBehaviour",
                hypothesis,
            }),
        }
    }

    fn elastic_stiffness(&self, s: &CurrentState) -> Result<nalgebra::DMatrix<f64>> {
        let desc = &self.description;
        compute_stiffness_tensor(
            desc.symmetry,
            desc.hypothesis,
            desc.orthotropic_axes_convention,
            &s.mprops1,
            false,
        )
    }

    fn step(
        &self,
        s: &mut CurrentState,
        wk: &mut BehaviourWorkSpace,
        dt: f64,
        ktype: StiffnessMatrixType,
        integration: bool,
    ) -> Result<(bool, Option<nalgebra::DMatrix<f64>>)> {
        let ndi = self.ndi()?;
        let flag = tangent_operator_flag("CyranoBehaviour::integrate", ktype, integration)?;
        let ntens: i32 = 3;
        let nprops = s.mprops1.len() as i32;
        wk.d.fill(0.0);
        wk.d[(0, 0)] = flag;
        if !s.iv0.is_empty() {
            wk.ivs[..s.iv0.len()].copy_from_slice(&s.iv0);
        }
        let nstatv = wk.ivs.len() as i32;
        let drot = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        let mut ue0 = [0.0; 3];
        let mut ude = [0.0; 3];
        let mut s1 = [0.0; 3];
        for i in 0..3 {
            ue0[i] = s.e0[i];
            ude[i] = s.e1[i] - s.e0[i];
            s1[i] = s.s0[i];
        }
        swap_cyrano_components(&mut s1);
        swap_cyrano_components(&mut ue0);
        swap_cyrano_components(&mut ude);
        let (mut kinc, success) = SolverConvention::Cyrano
            .kinc_convention()
            .ok_or(BehaviourError::UnsupportedSolverConvention(SolverConvention::Cyrano))?;
        // SAFETY: all arrays hold the three components of a 1D tensor and
        // the state variables buffer holds `nstatv` values
        unsafe {
            (self.function)(
                &ntens,
                &dt,
                drot.as_ptr(),
                wk.d.as_mut_slice().as_mut_ptr(),
                ue0.as_ptr(),
                ude.as_ptr(),
                s.esv0.as_ptr(),
                s.desv.as_ptr(),
                if s.mprops1.is_empty() { ptr::null() } else { s.mprops1.as_ptr() },
                &nprops,
                s.esv0[1..].as_ptr(),
                s.desv[1..].as_ptr(),
                wk.ivs.as_mut_ptr(),
                &nstatv,
                s1.as_mut_ptr(),
                &ndi,
                &mut kinc,
            );
        }
        if kinc != success {
            warn!(
                "behaviour '{}' reported a failure (kinc = {})",
                self.description.name, kinc
            );
            return Ok((false, None));
        }
        let nisv = s.iv1.len();
        s.iv1.copy_from_slice(&wk.ivs[..nisv]);
        swap_cyrano_components(&mut s1);
        s.s1.copy_from_slice(&s1);
        let k = match ktype {
            StiffnessMatrixType::NoStiffness => None,
            StiffnessMatrixType::ElasticFromMaterialProperties => Some(self.elastic_stiffness(s)?),
            _ => Some(cyrano_tangent_operator(wk.d.as_slice())),
        };
        Ok((true, k))
    }
}

impl Behaviour for CyranoBehaviour {
    fn description(&self) -> &BehaviourDescription {
        &self.description
    }

    fn solver_convention(&self) -> SolverConvention {
        SolverConvention::Cyrano
    }

    fn compute_prediction_operator(
        &self,
        wk: &mut BehaviourWorkSpace,
        s: &CurrentState,
        ktype: StiffnessMatrixType,
    ) -> Result<bool> {
        check_integration_buffers(self, "CyranoBehaviour::compute_prediction_operator", s, wk)?;
        if ktype == StiffnessMatrixType::ElasticFromMaterialProperties {
            self.ndi()?;
            wk.kt = self.elastic_stiffness(s)?;
            return Ok(true);
        }
        let mut tmp = s.clone();
        tmp.e1.clone_from(&s.e0);
        tmp.iv1.clone_from(&s.iv0);
        tmp.desv.fill(0.0);
        let (ok, k) = self.step(&mut tmp, wk, 1.0, ktype, false)?;
        if let Some(k) = k {
            wk.kt = k;
        }
        Ok(ok)
    }

    fn integrate(
        &self,
        s: &mut CurrentState,
        wk: &mut BehaviourWorkSpace,
        dt: f64,
        ktype: StiffnessMatrixType,
    ) -> Result<IntegrationOutcome> {
        check_integration_buffers(self, "CyranoBehaviour::integrate", s, wk)?;
        let (ok, k) = self.step(s, wk, dt, ktype, true)?;
        if !ok {
            return Ok(IntegrationOutcome::failure(1.0));
        }
        if let Some(k) = k {
            wk.k = k;
        }
        wk.stage = IntegrationStage::Integrated;
        Ok(IntegrationOutcome::success(1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `σ_rr += E·Δε_rr` in Cyrano order, with a tangent operator whose
    /// entries encode their native position.
    unsafe extern "C" fn probe(
        _ntens: *const i32,
        _dtime: *const f64,
        _drot: *const f64,
        ddsoe: *mut f64,
        _stran: *const f64,
        dstran: *const f64,
        _temp: *const f64,
        _dtemp: *const f64,
        props: *const f64,
        _nprops: *const i32,
        _predef: *const f64,
        _dpred: *const f64,
        statev: *mut f64,
        _nstatv: *const i32,
        stress: *mut f64,
        _ndi: *const i32,
        _kinc: *mut i32,
    ) {
        let dstran = std::slice::from_raw_parts(dstran, 3);
        let stress = std::slice::from_raw_parts_mut(stress, 3);
        let young = *props;
        for i in 0..3 {
            stress[i] += young * dstran[i];
        }
        *statev += 1.0;
        let d = std::slice::from_raw_parts_mut(ddsoe, 9);
        for (i, v) in d.iter_mut().enumerate() {
            *v = i as f64;
        }
    }

    fn prepare(hypothesis: ModellingHypothesis) -> (CyranoBehaviour, CurrentState, BehaviourWorkSpace) {
        let d = BehaviourDescription::new("Probe", hypothesis)
            .with_material_properties(["YoungModulus", "PoissonRatio"])
            .with_internal_state_variables(1);
        let b = CyranoBehaviour::new(d, probe);
        let mut s = CurrentState::default();
        let mut wk = BehaviourWorkSpace::default();
        b.allocate(&mut wk).unwrap();
        b.allocate_state(&mut s).unwrap();
        s.mprops1 = vec![100.0, 0.3];
        (b, s, wk)
    }

    #[test]
    fn components_are_swapped_around_the_call() {
        let (b, mut s, mut wk) =
            prepare(ModellingHypothesis::AxisymmetricalGeneralisedPlaneStrain);
        s.s0 = vec![1.0, 2.0, 3.0];
        s.e1 = vec![1.0, 2.0, 3.0];
        let outcome = b
            .integrate(&mut s, &mut wk, 1.0, StiffnessMatrixType::ConsistentTangent)
            .unwrap();
        assert!(outcome.success);
        assert_eq!(s.s1, vec![101.0, 202.0, 303.0]);
        assert_eq!(s.iv1, vec![1.0]);
        // native (i, j) holds i + 3j
        let expected = [[0.0, 6.0, 3.0], [2.0, 8.0, 5.0], [1.0, 7.0, 4.0]];
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(wk.k[(i, j)], expected[i][j]);
            }
        }
    }

    #[test]
    fn elastic_prediction_from_material_properties() {
        let (b, s, mut wk) = prepare(ModellingHypothesis::AxisymmetricalGeneralisedPlaneStress);
        assert!(b
            .compute_prediction_operator(&mut wk, &s, StiffnessMatrixType::ElasticFromMaterialProperties)
            .unwrap());
        let lambda = 100.0 * 0.3 / (1.3 * 0.4);
        assert!((wk.kt[(0, 1)] - lambda).abs() < 1e-12);
    }

    #[test]
    fn other_hypotheses_are_rejected() {
        let d = BehaviourDescription::new("Probe", ModellingHypothesis::PlaneStrain);
        let b = CyranoBehaviour::new(d, probe);
        let mut s = CurrentState::default();
        let mut wk = BehaviourWorkSpace::default();
        b.allocate(&mut wk).unwrap();
        b.allocate_state(&mut s).unwrap();
        assert!(matches!(
            b.integrate(&mut s, &mut wk, 1.0, StiffnessMatrixType::NoStiffness),
            Err(BehaviourError::UnsupportedHypothesis { .. })
        ));
    }
}
