use strum_macros::{Display, EnumIter, EnumString};

/// Kinematic reduction of a computation. Fixes the space dimension and
/// every array size handled by the behaviour adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
pub enum ModellingHypothesis {
    AxisymmetricalGeneralisedPlaneStrain,
    AxisymmetricalGeneralisedPlaneStress,
    Axisymmetrical,
    PlaneStress,
    PlaneStrain,
    GeneralisedPlaneStrain,
    Tridimensional,
}

impl ModellingHypothesis {
    pub fn space_dimension(&self) -> usize {
        match self {
            Self::AxisymmetricalGeneralisedPlaneStrain
            | Self::AxisymmetricalGeneralisedPlaneStress => 1,
            Self::Axisymmetrical
            | Self::PlaneStress
            | Self::PlaneStrain
            | Self::GeneralisedPlaneStrain => 2,
            Self::Tridimensional => 3,
        }
    }

    /// Number of components of a symmetric tensor.
    pub fn stensor_size(&self) -> usize {
        match self.space_dimension() {
            1 => 3,
            2 => 4,
            _ => 6,
        }
    }

    /// Number of components of a non-symmetric tensor (deformation gradient).
    pub fn tensor_size(&self) -> usize {
        match self.space_dimension() {
            1 => 3,
            2 => 5,
            _ => 9,
        }
    }

    /// The `ndi` code passed to UMAT-like functions.
    pub fn umat_ndi(&self) -> Option<i32> {
        match self {
            Self::AxisymmetricalGeneralisedPlaneStrain => Some(14),
            Self::Axisymmetrical => Some(0),
            Self::PlaneStress => Some(-2),
            Self::PlaneStrain => Some(-1),
            Self::GeneralisedPlaneStrain => Some(-3),
            Self::Tridimensional => Some(2),
            Self::AxisymmetricalGeneralisedPlaneStress => None,
        }
    }

    pub fn is_plane_stress(&self) -> bool {
        matches!(
            self,
            Self::PlaneStress | Self::AxisymmetricalGeneralisedPlaneStress
        )
    }

    pub fn is_axisymmetrical(&self) -> bool {
        matches!(
            self,
            Self::Axisymmetrical
                | Self::AxisymmetricalGeneralisedPlaneStrain
                | Self::AxisymmetricalGeneralisedPlaneStress
        )
    }
}

/// Relabelling of the material directions used by some solvers for
/// orthotropic behaviours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, EnumIter)]
pub enum OrthotropicAxesConvention {
    #[default]
    Default,
    Pipe,
    Plate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, EnumIter)]
pub enum ElasticSymmetry {
    #[default]
    Isotropic,
    Orthotropic,
}

/// Calling convention of an externally compiled behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
pub enum SolverConvention {
    Umat,
    UmatFiniteStrain,
    AbaqusExplicit,
    LsDyna,
    Cyrano,
}

impl SolverConvention {
    /// Value of `kinc` before the call and the value meaning success,
    /// for the conventions that use such a flag.
    pub fn kinc_convention(&self) -> Option<(i32, i32)> {
        match self {
            Self::Umat | Self::UmatFiniteStrain | Self::Cyrano => Some((1, 1)),
            Self::AbaqusExplicit | Self::LsDyna => None,
        }
    }

    pub fn is_finite_strain(&self) -> bool {
        matches!(
            self,
            Self::UmatFiniteStrain | Self::AbaqusExplicit | Self::LsDyna
        )
    }
}

/// Operator requested from a behaviour together with the stress update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
pub enum StiffnessMatrixType {
    NoStiffness,
    Elastic,
    ElasticFromMaterialProperties,
    Secant,
    Tangent,
    ConsistentTangent,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn sizes_follow_space_dimension() {
        for h in ModellingHypothesis::iter() {
            let n = h.space_dimension();
            assert_eq!(h.stensor_size(), [3, 4, 6][n - 1]);
            assert_eq!(h.tensor_size(), [3, 5, 9][n - 1]);
        }
    }

    #[test]
    fn hypotheses_parse_from_their_names() {
        assert_eq!(
            ModellingHypothesis::from_str("PlaneStress").unwrap(),
            ModellingHypothesis::PlaneStress
        );
        assert_eq!(ModellingHypothesis::Tridimensional.to_string(), "Tridimensional");
        assert!(ModellingHypothesis::from_str("Plane").is_err());
    }

    #[test]
    fn umat_codes() {
        use ModellingHypothesis::*;
        let codes: Vec<_> = [
            AxisymmetricalGeneralisedPlaneStrain,
            Axisymmetrical,
            PlaneStress,
            PlaneStrain,
            GeneralisedPlaneStrain,
            Tridimensional,
        ]
        .iter()
        .map(|h| h.umat_ndi().unwrap())
        .collect();
        assert_eq!(codes, vec![14, 0, -2, -1, -3, 2]);
        assert_eq!(AxisymmetricalGeneralisedPlaneStress.umat_ndi(), None);
    }

    #[test]
    fn only_implicit_interfaces_use_kinc() {
        use SolverConvention::*;
        for c in [Umat, UmatFiniteStrain, Cyrano] {
            assert_eq!(c.kinc_convention(), Some((1, 1)));
        }
        assert_eq!(AbaqusExplicit.kinc_convention(), None);
        assert_eq!(LsDyna.kinc_convention(), None);
    }
}
