//! Behaviours following the LS-DYNA user material convention.
//!
//! The function receives the increment of the logarithmic strain in the
//! corotational frame and updates the stress. Brick elements are handled
//! by the tridimensional function and shell elements by the plane stress
//! one.
use std::sync::Arc;

use log::debug;
use nalgebra::{DMatrix, SMatrix, SVector};

use super::{
    check_integration_buffers, Behaviour, BehaviourDescription, BehaviourWorkSpace, CurrentState,
    IntegrationOutcome, IntegrationStage,
};
use crate::convention::{deformation_gradient_operator, lsdyna_components};
use crate::error::{BehaviourError, Result};
use crate::finite_strain::{logarithm_of_stretch, polar_decomposition};
use crate::hypothesis::{ModellingHypothesis, SolverConvention, StiffnessMatrixType};
use crate::loader::DynamicLibrary;
use crate::mandel::{
    change_basis, change_basis_operator, stensor_from_slice, stensor_to_slice, tensor_from_slice,
    tensor_to_mandel, INV_SQRT2, SQRT2,
};
use crate::stiffness::compute_stiffness_tensor;

/// `f(m, de, sig, hisv, dt)`
pub type LsDynaFunction = unsafe extern "C" fn(
    m: *const f64,
    de: *const f64,
    sig: *mut f64,
    hisv: *mut f64,
    dt: *const f64,
);

pub struct LsDynaBehaviour {
    description: BehaviourDescription,
    function: LsDynaFunction,
    _library: Option<Arc<DynamicLibrary>>,
}

impl LsDynaBehaviour {
    pub fn new(description: BehaviourDescription, function: LsDynaFunction) -> Self {
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

    fn check_hypothesis(&self) -> Result<ModellingHypothesis> {
        match self.description.hypothesis {
            h @ (ModellingHypothesis::Tridimensional | ModellingHypothesis::PlaneStress) => Ok(h),
            hypothesis => Err(BehaviourError::UnsupportedHypothesis {
                context: "LsDynaBehaviour",
                hypothesis,
            }),
        }
    }

    /// Elastic operator in the global frame, with respect to the
    /// deformation gradient.
    fn elastic_stiffness(&self, s: &CurrentState) -> Result<DMatrix<f64>> {
        let desc = &self.description;
        let hypothesis = self.check_hypothesis()?;
        let k = compute_stiffness_tensor(
            desc.symmetry,
            hypothesis,
            desc.orthotropic_axes_convention,
            &s.mprops1,
            true,
        )?;
        debug!("elastic stiffness of behaviour '{}' in the material frame: {}", desc.name, k);
        let n = k.nrows();
        let mut d = SMatrix::<f64, 6, 6>::zeros();
        d.view_mut((0, 0), (n, n)).copy_from(&k);
        let d = change_basis_operator(&d, &s.r.transpose());
        Ok(deformation_gradient_operator(&d, hypothesis))
    }
}

impl Behaviour for LsDynaBehaviour {
    fn description(&self) -> &BehaviourDescription {
        &self.description
    }

    fn solver_convention(&self) -> SolverConvention {
        SolverConvention::LsDyna
    }

    fn compute_prediction_operator(
        &self,
        wk: &mut BehaviourWorkSpace,
        s: &CurrentState,
        ktype: StiffnessMatrixType,
    ) -> Result<bool> {
        match ktype {
            StiffnessMatrixType::Elastic | StiffnessMatrixType::ElasticFromMaterialProperties => {
                wk.kt = self.elastic_stiffness(s)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn integrate(
        &self,
        s: &mut CurrentState,
        wk: &mut BehaviourWorkSpace,
        dt: f64,
        ktype: StiffnessMatrixType,
    ) -> Result<IntegrationOutcome> {
        const CONTEXT: &str = "LsDynaBehaviour::integrate";
        check_integration_buffers(self, CONTEXT, s, wk)?;
        let hypothesis = self.check_hypothesis()?;
        match ktype {
            StiffnessMatrixType::NoStiffness => {}
            StiffnessMatrixType::Elastic | StiffnessMatrixType::ElasticFromMaterialProperties => {
                wk.k = self.elastic_stiffness(s)?;
            }
            stiffness => {
                return Err(BehaviourError::UnsupportedStiffnessMatrixType {
                    context: CONTEXT,
                    stiffness,
                })
            }
        }
        let r = s.r;
        let f0 = r.transpose() * tensor_from_slice(&s.e0) * r;
        let f1 = r.transpose() * tensor_from_slice(&s.e1) * r;
        let (_, u0) = polar_decomposition(&f0);
        let (r1, u1) = polar_decomposition(&f1);
        let de = tensor_to_mandel(&(logarithm_of_stretch(&u1) - logarithm_of_stretch(&u0)));
        let s0 = change_basis(&change_basis(&stensor_from_slice(&s.s0), &r), &r1);
        let components = lsdyna_components(hypothesis);
        let mut ade = [0.0; 6];
        let mut sig = [0.0; 6];
        for (k, &i) in components.iter().enumerate() {
            // engineering shear strains, tensorial shear stresses
            ade[k] = if i >= 3 { de[i] * SQRT2 } else { de[i] };
            sig[k] = if i >= 3 { s0[i] * INV_SQRT2 } else { s0[i] };
        }
        if !s.iv0.is_empty() {
            wk.ivs[..s.iv0.len()].copy_from_slice(&s.iv0);
        }
        let m: &[f64] = if s.mprops1.is_empty() { &[0.0] } else { &s.mprops1 };
        // SAFETY: tensors are stored in arrays sized for the 3D case and
        // `hisv` holds at least one value
        unsafe {
            (self.function)(m.as_ptr(), ade.as_ptr(), sig.as_mut_ptr(), wk.ivs.as_mut_ptr(), &dt);
        }
        let mut s1 = SVector::<f64, 6>::zeros();
        for (k, &i) in components.iter().enumerate() {
            s1[i] = if i >= 3 { sig[k] * SQRT2 } else { sig[k] };
        }
        if hypothesis == ModellingHypothesis::PlaneStress {
            s1[2] = 0.0;
        }
        let s1 = change_basis(&change_basis(&s1, &r1.transpose()), &r.transpose());
        stensor_to_slice(&s1, &mut s.s1);
        let nisv = s.iv1.len();
        s.iv1.copy_from_slice(&wk.ivs[..nisv]);
        wk.stage = IntegrationStage::Integrated;
        Ok(IntegrationOutcome::success(1.0))
    }
}
