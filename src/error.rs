use std::path::PathBuf;

use thiserror::Error;

use crate::hypothesis::{
    ElasticSymmetry, ModellingHypothesis, OrthotropicAxesConvention, SolverConvention,
    StiffnessMatrixType,
};

pub type Result<T, E = BehaviourError> = std::result::Result<T, E>;

/// Contract violations reported by the integration core.
///
/// A behaviour that merely fails to integrate a step is not an error: it is
/// reported through [`crate::behaviour::IntegrationOutcome`].
#[derive(Debug, Error)]
pub enum BehaviourError {
    #[error("{context}: unsupported modelling hypothesis '{hypothesis}'")]
    UnsupportedHypothesis {
        context: &'static str,
        hypothesis: ModellingHypothesis,
    },
    #[error("{context}: unsupported stiffness matrix type '{stiffness}'")]
    UnsupportedStiffnessMatrixType {
        context: &'static str,
        stiffness: StiffnessMatrixType,
    },
    #[error("{context}: the orthotropic axes convention '{convention}' is not available for hypothesis '{hypothesis}'")]
    UnsupportedOrthotropicAxesConvention {
        context: &'static str,
        convention: OrthotropicAxesConvention,
        hypothesis: ModellingHypothesis,
    },
    #[error("{context}: the memory has not been allocated correctly ({what}: expected {expected}, got {got})")]
    InvalidBufferSize {
        context: &'static str,
        what: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("{context}: invalid number of material properties for a {symmetry} behaviour under '{hypothesis}' (expected at least {expected}, got {got})")]
    InvalidMaterialProperties {
        context: &'static str,
        symmetry: ElasticSymmetry,
        hypothesis: ModellingHypothesis,
        expected: usize,
        got: usize,
    },
    #[error("missing material property '{0}'")]
    MissingMaterialProperty(String),
    #[error("the workspace has already been allocated")]
    WorkSpaceAlreadyAllocated,
    #[error("the workspace has not been allocated")]
    WorkSpaceNotAllocated,
    #[error("the state has already been allocated")]
    StateAlreadyAllocated,
    #[error("{context}: no packaging information named '{name}'. Was the packaging step done ?")]
    MissingPackagingInfo {
        context: &'static str,
        name: &'static str,
    },
    #[error("{0} behaviours are not handled by this adapter")]
    UnsupportedSolverConvention(SolverConvention),
    #[error("plane stress handling: maximum number of iterations reached ({iterations})")]
    PlaneStressMaximumNumberOfIterationsReached { iterations: usize },
    #[error("{context}: singular matrix")]
    SingularMatrix { context: &'static str },
}

/// Failures of the dynamic library loader.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("unable to open file '{path}'")]
    KeyFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid line '{line}' in file '{path}', expected 3 tokens")]
    InvalidLine { path: PathBuf, line: usize },
    #[error("invalid identifier ({token}) at line '{line}'")]
    InvalidIdentifier { token: String, line: usize },
    #[error("a behaviour has already been associated to material identifier '{0}'")]
    AlreadyAssociated(u32),
    #[error("unable to load library '{library}' (tried {})", .attempts.join(", "))]
    LibraryNotFound {
        library: String,
        attempts: Vec<String>,
    },
    #[error("could not load behaviour '{function}' in library '{library}' (neither '{function}_3D' nor '{function}_PSTRESS' was found)")]
    SymbolsNotFound { library: String, function: String },
    #[error("symbol '{symbol}' not found in library '{library}'")]
    SymbolNotFound {
        library: String,
        symbol: String,
        #[source]
        source: libloading::Error,
    },
    #[error("no behaviour associated with identifier '{0}'")]
    NoBehaviour(u32),
    #[error("no '{element}' behaviour associated with identifier '{id}'")]
    MissingElementBehaviour { id: u32, element: &'static str },
    #[error("unsupported element type '{0}'")]
    UnsupportedElementType(String),
}
