//! Named material properties.
//!
//! Behaviours receive their material properties as a flat array whose
//! layout depends on the elastic symmetry and on the modelling hypothesis.
//! [`MaterialProperties`] describes this layout and builds the array from
//! named parameters.
use std::collections::HashMap;

use crate::error::{BehaviourError, Result};
use crate::hypothesis::{ElasticSymmetry, ModellingHypothesis};
use crate::stiffness::number_of_elastic_properties;

const ISOTROPIC: [&str; 2] = ["YoungModulus", "PoissonRatio"];

const ORTHOTROPIC: [&str; 9] = [
    "YoungModulus1",
    "YoungModulus2",
    "YoungModulus3",
    "PoissonRatio12",
    "PoissonRatio23",
    "PoissonRatio13",
    "ShearModulus12",
    "ShearModulus23",
    "ShearModulus13",
];

const ORTHOTROPIC_PLANE_STRESS: [&str; 4] = [
    "YoungModulus1",
    "YoungModulus2",
    "PoissonRatio12",
    "ShearModulus12",
];

const DIRECTIONS_2D: [&str; 2] = ["V1X", "V1Y"];
const DIRECTIONS_3D: [&str; 6] = ["V1X", "V1Y", "V1Z", "V2X", "V2Y", "V2Z"];

/// Layout of the material properties array of a behaviour.
///
/// ```
/// use std::collections::HashMap;
/// use tfel_behaviour::hypothesis::{ElasticSymmetry, ModellingHypothesis};
/// use tfel_behaviour::properties::MaterialProperties;
///
/// let layout = MaterialProperties::new(ElasticSymmetry::Isotropic, ModellingHypothesis::Tridimensional);
/// let parameters = HashMap::from([
///     ("YoungModulus".to_string(), 200e9),
///     ("PoissonRatio".to_string(), 0.3),
/// ]);
/// assert_eq!(layout.from_parameters(&parameters).unwrap(), vec![200e9, 0.3]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialProperties {
    symmetry: ElasticSymmetry,
    hypothesis: ModellingHypothesis,
    altered: bool,
    mass_density: bool,
    orientation: bool,
    extra: Vec<String>,
}

impl MaterialProperties {
    pub fn new(symmetry: ElasticSymmetry, hypothesis: ModellingHypothesis) -> Self {
        Self {
            symmetry,
            hypothesis,
            altered: true,
            mass_density: false,
            orientation: false,
            extra: Vec::new(),
        }
    }

    /// Selects the reduced plane stress schema of orthotropic behaviours
    /// (`true` by default). Behaviours eliminating `εzz` themselves use the
    /// generalised plane strain schema.
    pub fn with_altered_plane_stress(mut self, altered: bool) -> Self {
        self.altered = altered;
        self
    }

    /// Prepends the mass density, as required by explicit solvers.
    pub fn with_mass_density(mut self) -> Self {
        self.mass_density = true;
        self
    }

    /// Appends the direction cosines of the material axes after the
    /// elastic properties.
    pub fn with_orientation(mut self) -> Self {
        self.orientation = true;
        self
    }

    /// Appends behaviour specific properties after the elastic ones.
    pub fn with_properties<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra.extend(names.into_iter().map(Into::into));
        self
    }

    fn elastic_names(&self) -> &'static [&'static str] {
        let n = number_of_elastic_properties(self.symmetry, self.hypothesis, self.altered);
        match self.symmetry {
            ElasticSymmetry::Isotropic => &ISOTROPIC,
            ElasticSymmetry::Orthotropic if n == 4 => &ORTHOTROPIC_PLANE_STRESS,
            ElasticSymmetry::Orthotropic => &ORTHOTROPIC[..n],
        }
    }

    fn direction_names(&self) -> &'static [&'static str] {
        if !self.orientation {
            return &[];
        }
        match self.hypothesis.space_dimension() {
            2 => &DIRECTIONS_2D,
            3 => &DIRECTIONS_3D,
            _ => &[],
        }
    }

    /// Names of the material properties, in order.
    pub fn names(&self) -> Vec<&str> {
        let density = self.mass_density.then_some("MassDensity");
        density
            .into_iter()
            .chain(self.elastic_names().iter().copied())
            .chain(self.direction_names().iter().copied())
            .chain(self.extra.iter().map(String::as_str))
            .collect()
    }

    pub fn len(&self) -> usize {
        usize::from(self.mass_density)
            + self.elastic_names().len()
            + self.direction_names().len()
            + self.extra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Offset of the first direction cosine in the array handed to the
    /// behaviour, if any.
    pub fn orientation_offset(&self) -> Option<usize> {
        if self.direction_names().is_empty() {
            return None;
        }
        Some(usize::from(self.mass_density) + self.elastic_names().len())
    }

    /// Offset and size of each property.
    pub fn parameters(&self) -> HashMap<String, (usize, usize)> {
        self.names()
            .into_iter()
            .enumerate()
            .map(|(i, name)| (name.to_string(), (i, 1)))
            .collect()
    }

    /// Builds the flat material properties array. Unknown parameters are
    /// ignored.
    pub fn from_parameters(&self, parameters: &HashMap<String, f64>) -> Result<Vec<f64>> {
        self.names()
            .into_iter()
            .map(|name| {
                parameters
                    .get(name)
                    .copied()
                    .ok_or_else(|| BehaviourError::MissingMaterialProperty(name.to_string()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parameters(values: &[(&str, f64)]) -> HashMap<String, f64> {
        values.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn orthotropic_schemas_depend_on_the_hypothesis() {
        let names = |h, altered| {
            MaterialProperties::new(ElasticSymmetry::Orthotropic, h)
                .with_altered_plane_stress(altered)
                .names()
                .len()
        };
        assert_eq!(names(ModellingHypothesis::AxisymmetricalGeneralisedPlaneStrain, true), 6);
        assert_eq!(names(ModellingHypothesis::PlaneStrain, true), 7);
        assert_eq!(names(ModellingHypothesis::PlaneStress, true), 4);
        assert_eq!(names(ModellingHypothesis::PlaneStress, false), 7);
        assert_eq!(names(ModellingHypothesis::Tridimensional, true), 9);
    }

    #[test]
    fn explicit_layout_with_orientation() {
        let layout =
            MaterialProperties::new(ElasticSymmetry::Orthotropic, ModellingHypothesis::PlaneStress)
                .with_mass_density()
                .with_orientation();
        assert_eq!(
            layout.names(),
            vec![
                "MassDensity",
                "YoungModulus1",
                "YoungModulus2",
                "PoissonRatio12",
                "ShearModulus12",
                "V1X",
                "V1Y"
            ]
        );
        assert_eq!(layout.len(), 7);
        assert_eq!(layout.orientation_offset(), Some(5));
        assert_eq!(layout.parameters()["ShearModulus12"], (4, 1));
    }

    #[test]
    fn behaviour_specific_properties_follow_the_elastic_ones() {
        let layout =
            MaterialProperties::new(ElasticSymmetry::Isotropic, ModellingHypothesis::Tridimensional)
                .with_orientation()
                .with_properties(["YieldStress"]);
        let p = parameters(&[
            ("YoungModulus", 200e9),
            ("PoissonRatio", 0.3),
            ("V1X", 1.0),
            ("V1Y", 0.0),
            ("V1Z", 0.0),
            ("V2X", 0.0),
            ("V2Y", 1.0),
            ("V2Z", 0.0),
            ("YieldStress", 150e6),
            ("Unused", -1.0),
        ]);
        let values = layout.from_parameters(&p).unwrap();
        assert_eq!(values, vec![200e9, 0.3, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 150e6]);
    }

    #[test]
    fn missing_parameters_are_reported_by_name() {
        let layout =
            MaterialProperties::new(ElasticSymmetry::Isotropic, ModellingHypothesis::PlaneStrain);
        let p = parameters(&[("YoungModulus", 200e9)]);
        match layout.from_parameters(&p) {
            Err(BehaviourError::MissingMaterialProperty(name)) => assert_eq!(name, "PoissonRatio"),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn no_direction_cosines_in_one_dimension() {
        let layout = MaterialProperties::new(
            ElasticSymmetry::Orthotropic,
            ModellingHypothesis::AxisymmetricalGeneralisedPlaneStrain,
        )
        .with_orientation();
        assert_eq!(layout.orientation_offset(), None);
        assert!(!layout.is_empty());
    }
}
