//! Uniform integration contract over externally compiled behaviours.
//!
//! A behaviour is first allocated on a [`BehaviourWorkSpace`], may perform a
//! one-time packaging step on its [`CurrentState`], then integrates time
//! steps. Contract violations are reported as errors while a failed
//! integration is an ordinary [`IntegrationOutcome`].
use std::collections::HashMap;

use nalgebra::{DMatrix, Matrix3};

use crate::error::{BehaviourError, Result};
use crate::hypothesis::{
    ElasticSymmetry, ModellingHypothesis, OrthotropicAxesConvention, SolverConvention,
    StiffnessMatrixType,
};
use crate::mandel::tensor_identity;

pub mod abaqus_explicit;
pub mod cyrano;
pub mod lsdyna;
pub mod umat;

pub use abaqus_explicit::{AbaqusExplicitBehaviour, AbaqusExplicitFunction};
pub use cyrano::{CyranoBehaviour, CyranoFunction};
pub use lsdyna::{LsDynaBehaviour, LsDynaFunction};
pub use umat::{UmatBehaviour, UmatFiniteStrainStrategy, UmatFunction};

/// Static information about an external behaviour.
#[derive(Debug, Clone, PartialEq)]
pub struct BehaviourDescription {
    /// Name passed to the solver functions (`cmname`).
    pub name: String,
    pub hypothesis: ModellingHypothesis,
    pub symmetry: ElasticSymmetry,
    pub orthotropic_axes_convention: OrthotropicAxesConvention,
    pub material_properties: Vec<String>,
    pub internal_state_variables: usize,
    /// The first external state variable is the temperature.
    pub external_state_variables: Vec<String>,
}

impl BehaviourDescription {
    pub fn new(name: impl Into<String>, hypothesis: ModellingHypothesis) -> Self {
        Self {
            name: name.into(),
            hypothesis,
            symmetry: ElasticSymmetry::default(),
            orthotropic_axes_convention: OrthotropicAxesConvention::default(),
            material_properties: Vec::new(),
            internal_state_variables: 0,
            external_state_variables: vec!["Temperature".to_string()],
        }
    }

    pub fn with_symmetry(mut self, symmetry: ElasticSymmetry) -> Self {
        self.symmetry = symmetry;
        self
    }

    pub fn with_orthotropic_axes_convention(mut self, convention: OrthotropicAxesConvention) -> Self {
        self.orthotropic_axes_convention = convention;
        self
    }

    pub fn with_material_properties<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.material_properties = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_internal_state_variables(mut self, n: usize) -> Self {
        self.internal_state_variables = n;
        self
    }

    /// Additional external state variables, after the temperature.
    pub fn with_external_state_variables<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.external_state_variables.truncate(1);
        self.external_state_variables
            .extend(names.into_iter().map(Into::into));
        self
    }
}

/// A value cached by the packaging step.
#[derive(Debug, Clone, PartialEq)]
pub enum PackagingValue {
    Matrix(DMatrix<f64>),
    Real(f64),
}

/// String-keyed side channel of values computed once per state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackagingInfo(HashMap<String, PackagingValue>);

impl PackagingInfo {
    pub fn insert(&mut self, name: impl Into<String>, value: PackagingValue) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&PackagingValue> {
        self.0.get(name)
    }

    pub fn matrix(&self, name: &str) -> Option<&DMatrix<f64>> {
        match self.0.get(name) {
            Some(PackagingValue::Matrix(m)) => Some(m),
            _ => None,
        }
    }

    pub fn real(&self, name: &str) -> Option<f64> {
        match self.0.get(name) {
            Some(PackagingValue::Real(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }
}

/// State of an integration point.
///
/// Symmetric tensors follow the internal convention of [`crate::mandel`].
/// Driving variables are strains for small strain behaviours and
/// deformation gradients for finite strain ones.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentState {
    pub e0: Vec<f64>,
    pub e1: Vec<f64>,
    pub s0: Vec<f64>,
    pub s1: Vec<f64>,
    pub iv0: Vec<f64>,
    pub iv1: Vec<f64>,
    pub esv0: Vec<f64>,
    pub desv: Vec<f64>,
    pub mprops1: Vec<f64>,
    /// Columns are the material axes in the global frame.
    pub r: Matrix3<f64>,
    pub se0: f64,
    pub se1: f64,
    pub de0: f64,
    pub de1: f64,
    pub packaging_info: PackagingInfo,
    allocated: bool,
}

impl Default for CurrentState {
    fn default() -> Self {
        Self {
            e0: Vec::new(),
            e1: Vec::new(),
            s0: Vec::new(),
            s1: Vec::new(),
            iv0: Vec::new(),
            iv1: Vec::new(),
            esv0: Vec::new(),
            desv: Vec::new(),
            mprops1: Vec::new(),
            r: Matrix3::identity(),
            se0: 0.0,
            se1: 0.0,
            de0: 0.0,
            de1: 0.0,
            packaging_info: PackagingInfo::default(),
            allocated: false,
        }
    }
}

impl CurrentState {
    pub fn is_allocated(&self) -> bool {
        self.allocated
    }

    /// Makes the values at the end of the step the new initial values.
    pub fn update(&mut self) {
        self.e0.clone_from(&self.e1);
        self.s0.clone_from(&self.s1);
        self.iv0.clone_from(&self.iv1);
        for (e, de) in self.esv0.iter_mut().zip(self.desv.iter_mut()) {
            *e += *de;
            *de = 0.0;
        }
        self.se0 = self.se1;
        self.de0 = self.de1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntegrationStage {
    #[default]
    Uninitialized,
    Allocated,
    Packaged,
    Integrated,
}

/// Scratch buffers of a behaviour, sized once by [`Behaviour::allocate`].
#[derive(Debug, Clone, PartialEq)]
pub struct BehaviourWorkSpace {
    pub mps: Vec<f64>,
    pub ivs: Vec<f64>,
    pub evs: Vec<f64>,
    /// Tangent operator in the solver convention.
    pub d: DMatrix<f64>,
    /// Prediction operator.
    pub kt: DMatrix<f64>,
    /// Tangent operator computed by the last integration.
    pub k: DMatrix<f64>,
    stage: IntegrationStage,
}

impl Default for BehaviourWorkSpace {
    fn default() -> Self {
        Self {
            mps: Vec::new(),
            ivs: Vec::new(),
            evs: Vec::new(),
            d: DMatrix::zeros(0, 0),
            kt: DMatrix::zeros(0, 0),
            k: DMatrix::zeros(0, 0),
            stage: IntegrationStage::Uninitialized,
        }
    }
}

impl BehaviourWorkSpace {
    pub fn stage(&self) -> IntegrationStage {
        self.stage
    }

    fn ensure_allocated(&self) -> Result<()> {
        if self.stage == IntegrationStage::Uninitialized {
            return Err(BehaviourError::WorkSpaceNotAllocated);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntegrationOutcome {
    pub success: bool,
    /// Suggested scaling of the time step, meaningful on failure.
    pub time_step_scaling: f64,
}

impl IntegrationOutcome {
    pub fn success(time_step_scaling: f64) -> Self {
        Self {
            success: true,
            time_step_scaling,
        }
    }

    pub fn failure(time_step_scaling: f64) -> Self {
        Self {
            success: false,
            time_step_scaling,
        }
    }
}

pub trait Behaviour {
    fn description(&self) -> &BehaviourDescription;

    fn solver_convention(&self) -> SolverConvention;

    fn hypothesis(&self) -> ModellingHypothesis {
        self.description().hypothesis
    }

    fn driving_variables_size(&self) -> usize {
        if self.solver_convention().is_finite_strain() {
            self.hypothesis().tensor_size()
        } else {
            self.hypothesis().stensor_size()
        }
    }

    fn thermodynamic_forces_size(&self) -> usize {
        self.hypothesis().stensor_size()
    }

    /// Identity for deformation gradients, zero for strains.
    fn driving_variables_default_initial_values(&self) -> Vec<f64> {
        if self.solver_convention().is_finite_strain() {
            tensor_identity(self.driving_variables_size())
        } else {
            vec![0.0; self.driving_variables_size()]
        }
    }

    fn number_of_material_properties(&self) -> usize {
        self.description().material_properties.len()
    }

    /// Sizes the workspace. Must be called once per workspace.
    fn allocate(&self, wk: &mut BehaviourWorkSpace) -> Result<()> {
        if wk.stage != IntegrationStage::Uninitialized {
            return Err(BehaviourError::WorkSpaceAlreadyAllocated);
        }
        let desc = self.description();
        let ndv = self.driving_variables_size();
        let nth = self.thermodynamic_forces_size();
        wk.d = DMatrix::zeros(nth, nth);
        wk.kt = DMatrix::zeros(nth, ndv);
        wk.k = DMatrix::zeros(nth, ndv);
        wk.mps = vec![0.0; self.number_of_material_properties().max(1)];
        wk.ivs = vec![0.0; desc.internal_state_variables.max(1)];
        wk.evs = vec![0.0; desc.external_state_variables.len()];
        wk.stage = IntegrationStage::Allocated;
        Ok(())
    }

    /// Sizes a state and sets the default initial values.
    fn allocate_state(&self, s: &mut CurrentState) -> Result<()> {
        if s.allocated {
            return Err(BehaviourError::StateAlreadyAllocated);
        }
        let desc = self.description();
        let nth = self.thermodynamic_forces_size();
        s.e0 = self.driving_variables_default_initial_values();
        s.e1 = s.e0.clone();
        s.s0 = vec![0.0; nth];
        s.s1 = vec![0.0; nth];
        s.iv0 = vec![0.0; desc.internal_state_variables];
        s.iv1 = vec![0.0; desc.internal_state_variables];
        s.esv0 = vec![0.0; desc.external_state_variables.len()];
        s.desv = vec![0.0; desc.external_state_variables.len()];
        s.mprops1 = vec![0.0; self.number_of_material_properties()];
        s.r = Matrix3::identity();
        s.allocated = true;
        Ok(())
    }

    /// One-time computations before the first integration. Returns `false`
    /// if the behaviour has nothing to do.
    fn do_packaging_step(&self, _s: &mut CurrentState, wk: &mut BehaviourWorkSpace) -> Result<bool> {
        wk.ensure_allocated()?;
        Ok(false)
    }

    /// Computes the prediction operator in `wk.kt`. Returns `false` if the
    /// requested operator is not available.
    fn compute_prediction_operator(
        &self,
        wk: &mut BehaviourWorkSpace,
        s: &CurrentState,
        ktype: StiffnessMatrixType,
    ) -> Result<bool>;

    /// Integrates the step from the state at `t` to `t + dt`, computing the
    /// requested operator in `wk.k`.
    fn integrate(
        &self,
        s: &mut CurrentState,
        wk: &mut BehaviourWorkSpace,
        dt: f64,
        ktype: StiffnessMatrixType,
    ) -> Result<IntegrationOutcome>;
}

/// The behaviour adapters, one per solver calling convention.
pub enum BehaviourAdapter {
    Umat(UmatBehaviour),
    Cyrano(CyranoBehaviour),
    AbaqusExplicit(AbaqusExplicitBehaviour),
    LsDyna(LsDynaBehaviour),
}

impl BehaviourAdapter {
    fn inner(&self) -> &dyn Behaviour {
        match self {
            Self::Umat(b) => b,
            Self::Cyrano(b) => b,
            Self::AbaqusExplicit(b) => b,
            Self::LsDyna(b) => b,
        }
    }
}

impl From<UmatBehaviour> for BehaviourAdapter {
    fn from(b: UmatBehaviour) -> Self {
        Self::Umat(b)
    }
}

impl From<CyranoBehaviour> for BehaviourAdapter {
    fn from(b: CyranoBehaviour) -> Self {
        Self::Cyrano(b)
    }
}

impl From<AbaqusExplicitBehaviour> for BehaviourAdapter {
    fn from(b: AbaqusExplicitBehaviour) -> Self {
        Self::AbaqusExplicit(b)
    }
}

impl From<LsDynaBehaviour> for BehaviourAdapter {
    fn from(b: LsDynaBehaviour) -> Self {
        Self::LsDyna(b)
    }
}

impl Behaviour for BehaviourAdapter {
    fn description(&self) -> &BehaviourDescription {
        self.inner().description()
    }

    fn solver_convention(&self) -> SolverConvention {
        self.inner().solver_convention()
    }

    fn driving_variables_size(&self) -> usize {
        self.inner().driving_variables_size()
    }

    fn thermodynamic_forces_size(&self) -> usize {
        self.inner().thermodynamic_forces_size()
    }

    fn number_of_material_properties(&self) -> usize {
        self.inner().number_of_material_properties()
    }

    fn allocate(&self, wk: &mut BehaviourWorkSpace) -> Result<()> {
        self.inner().allocate(wk)
    }

    fn allocate_state(&self, s: &mut CurrentState) -> Result<()> {
        self.inner().allocate_state(s)
    }

    fn do_packaging_step(&self, s: &mut CurrentState, wk: &mut BehaviourWorkSpace) -> Result<bool> {
        self.inner().do_packaging_step(s, wk)
    }

    fn compute_prediction_operator(
        &self,
        wk: &mut BehaviourWorkSpace,
        s: &CurrentState,
        ktype: StiffnessMatrixType,
    ) -> Result<bool> {
        self.inner().compute_prediction_operator(wk, s, ktype)
    }

    fn integrate(
        &self,
        s: &mut CurrentState,
        wk: &mut BehaviourWorkSpace,
        dt: f64,
        ktype: StiffnessMatrixType,
    ) -> Result<IntegrationOutcome> {
        self.inner().integrate(s, wk, dt, ktype)
    }
}

fn check_size(context: &'static str, what: &'static str, expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(BehaviourError::InvalidBufferSize {
            context,
            what,
            expected,
            got,
        });
    }
    Ok(())
}

/// Checks the sizes of the workspace and of the state against the
/// behaviour description.
fn check_integration_buffers<B: Behaviour + ?Sized>(
    b: &B,
    context: &'static str,
    s: &CurrentState,
    wk: &BehaviourWorkSpace,
) -> Result<()> {
    wk.ensure_allocated()?;
    let desc = b.description();
    let ndv = b.driving_variables_size();
    let nth = b.thermodynamic_forces_size();
    check_size(context, "tangent operator rows", nth, wk.k.nrows())?;
    check_size(context, "tangent operator columns", ndv, wk.k.ncols())?;
    check_size(context, "driving variables at the beginning of the step", ndv, s.e0.len())?;
    check_size(context, "driving variables at the end of the step", ndv, s.e1.len())?;
    check_size(context, "thermodynamic forces at the beginning of the step", nth, s.s0.len())?;
    check_size(context, "thermodynamic forces at the end of the step", nth, s.s1.len())?;
    let nisv = desc.internal_state_variables;
    check_size(context, "internal state variables at the beginning of the step", nisv, s.iv0.len())?;
    check_size(context, "internal state variables at the end of the step", nisv, s.iv1.len())?;
    check_size(context, "internal state variables workspace", nisv.max(1), wk.ivs.len())?;
    let nesv = desc.external_state_variables.len();
    check_size(context, "external state variables", nesv, s.esv0.len())?;
    check_size(context, "external state variables increments", nesv, s.desv.len())?;
    if nesv == 0 {
        return Err(BehaviourError::InvalidBufferSize {
            context,
            what: "external state variables (the temperature is required)",
            expected: 1,
            got: 0,
        });
    }
    Ok(())
}

/// Value of `DDSDDE(1,1)` requesting an operator from a UMAT-like function.
/// `integration` distinguishes the end of step operators (positive codes)
/// from the prediction ones (negative codes).
fn tangent_operator_flag(
    context: &'static str,
    ktype: StiffnessMatrixType,
    integration: bool,
) -> Result<f64> {
    use StiffnessMatrixType::*;
    let flag = match (ktype, integration) {
        (NoStiffness | ElasticFromMaterialProperties, true) => 0.0,
        (Elastic, true) => 1.0,
        (Secant, true) => 2.0,
        (Tangent, true) => 3.0,
        (ConsistentTangent, true) => 4.0,
        (Elastic, false) => -1.0,
        (Secant, false) => -2.0,
        (Tangent, false) => -3.0,
        (stiffness, false) => {
            return Err(BehaviourError::UnsupportedStiffnessMatrixType { context, stiffness })
        }
    };
    Ok(flag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tangent_operator_flags() {
        use StiffnessMatrixType::*;
        let codes: Vec<f64> = [Elastic, Secant, Tangent, ConsistentTangent]
            .iter()
            .map(|k| tangent_operator_flag("test", *k, true).unwrap())
            .collect();
        assert_eq!(codes, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(tangent_operator_flag("test", Tangent, false).unwrap(), -3.0);
        assert!(tangent_operator_flag("test", ConsistentTangent, false).is_err());
        assert_eq!(tangent_operator_flag("test", NoStiffness, true).unwrap(), 0.0);
    }

    #[test]
    fn packaging_info_is_typed() {
        let mut info = PackagingInfo::default();
        info.insert("K", PackagingValue::Matrix(DMatrix::identity(2, 2)));
        info.insert("rho", PackagingValue::Real(7800.0));
        assert!(info.matrix("K").is_some());
        assert!(info.matrix("rho").is_none());
        assert_eq!(info.real("rho"), Some(7800.0));
        assert!(!info.contains("missing"));
    }

    #[test]
    fn state_update_moves_end_of_step_values() {
        let mut s = CurrentState {
            e1: vec![1.0, 2.0, 3.0],
            s1: vec![4.0, 5.0, 6.0],
            esv0: vec![293.15],
            desv: vec![10.0],
            ..Default::default()
        };
        s.update();
        assert_eq!(s.e0, s.e1);
        assert_eq!(s.s0, vec![4.0, 5.0, 6.0]);
        assert_eq!(s.esv0, vec![303.15]);
        assert_eq!(s.desv, vec![0.0]);
    }
}
