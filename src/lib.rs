//! Integration of externally compiled mechanical behaviours.
//!
//! A behaviour compiled into a shared library exposes a function following
//! the calling convention of a solver (UMAT, Cyrano, Abaqus/Explicit,
//! LS-DYNA). The adapters of [`behaviour`] drive such a function through a
//! single contract: allocation of the workspace, optional packaging,
//! prediction operator and integration over a time step.
pub mod behaviour;
pub mod convention;
pub mod error;
pub mod finite_strain;
pub mod hypothesis;
pub mod loader;
pub mod mandel;
pub mod plane_stress;
pub mod properties;
pub mod stiffness;

#[cfg(feature = "python")]
mod python;

pub use behaviour::{
    Behaviour, BehaviourAdapter, BehaviourDescription, BehaviourWorkSpace, CurrentState,
    IntegrationOutcome,
};
pub use error::{BehaviourError, LoaderError, Result};
pub use hypothesis::{
    ElasticSymmetry, ModellingHypothesis, OrthotropicAxesConvention, SolverConvention,
    StiffnessMatrixType,
};
pub use loader::LoaderRegistry;
pub use properties::MaterialProperties;
