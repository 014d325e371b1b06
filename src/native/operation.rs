//! Purpose: Coordinate operations, their methods and parameter values.
//! Exports: `CoordinateOperation`, `OperationKind`, `SingleOperation`, `OperationMethod`,
//! `MethodFormula`, `ParameterValue`, parameter code constants.
//! Role: Built by the catalog, readers and the operation factory; compiled by `pj`.
//! Invariants: Inverting twice yields an operation equivalent to the original.

use std::sync::Arc;

use super::object::{
    BaseObject, Capability, CapabilitySet, Crs, Metadata, PredefinedUnit, UnitKind,
    UnitOfMeasure, any_impls,
};
use super::{NativeError, NativeResult};

pub const LATITUDE_OF_NATURAL_ORIGIN: u32 = 8801;
pub const LONGITUDE_OF_NATURAL_ORIGIN: u32 = 8802;
pub const SCALE_FACTOR_AT_NATURAL_ORIGIN: u32 = 8805;
pub const FALSE_EASTING: u32 = 8806;
pub const FALSE_NORTHING: u32 = 8807;
pub const X_AXIS_TRANSLATION: u32 = 8605;
pub const Y_AXIS_TRANSLATION: u32 = 8606;
pub const Z_AXIS_TRANSLATION: u32 = 8607;

/// Numeric kernels the compiled pipelines know how to run.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum MethodFormula {
    PseudoMercator,
    TransverseMercator,
    GeographicGeocentric,
    GeocentricTranslation,
    /// Axis order or unit change only; the pipeline normalisation does the work.
    Identity,
    /// Datum change with no known parameters.
    Ballpark,
    /// Method the kernels do not implement.
    Unknown,
}

impl MethodFormula {
    pub fn from_epsg(code: u32) -> Self {
        match code {
            1024 => MethodFormula::PseudoMercator,
            9807 => MethodFormula::TransverseMercator,
            9602 => MethodFormula::GeographicGeocentric,
            9603 | 1031 => MethodFormula::GeocentricTranslation,
            9843 | 9844 | 1068 | 1069 => MethodFormula::Identity,
            _ => MethodFormula::Unknown,
        }
    }

    /// Finds a formula from a method name, ignoring case and separators.
    pub fn from_name(name: &str) -> Self {
        let key: String = name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match key.as_str() {
            "popularvisualisationpseudomercator"
            | "popularvisualisationpseudomercatorvariant"
            | "pseudomercator"
            | "mercatorauxiliarysphere" => {
                MethodFormula::PseudoMercator
            }
            "transversemercator" => MethodFormula::TransverseMercator,
            "geographicgeocentricconversions" | "geographicgeocentric" => {
                MethodFormula::GeographicGeocentric
            }
            "geocentrictranslationsgeog2ddomain" | "geocentrictranslationsgeocentricdomain"
            | "geocentrictranslations" => MethodFormula::GeocentricTranslation,
            "axisorderreversal2d" | "axisorderreversalgeographic3d" | "changeofverticalunit"
            | "identity" | "null" => MethodFormula::Identity,
            "ballparkgeographicoffset" | "ballparkgeocentrictranslation" | "ballpark" => {
                MethodFormula::Ballpark
            }
            _ => MethodFormula::Unknown,
        }
    }

    pub fn is_projection(self) -> bool {
        matches!(
            self,
            MethodFormula::PseudoMercator | MethodFormula::TransverseMercator
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OperationMethod {
    pub meta: Metadata,
    pub formula: MethodFormula,
}

impl OperationMethod {
    pub fn new(meta: Metadata, formula: MethodFormula) -> Self {
        Self { meta, formula }
    }

    /// Method with its EPSG name and identifier.
    pub fn epsg(code: u32) -> Arc<Self> {
        let name = match code {
            1024 => "Popular Visualisation Pseudo Mercator",
            9807 => "Transverse Mercator",
            9602 => "Geographic/geocentric conversions",
            9603 => "Geocentric translations (geog2D domain)",
            1031 => "Geocentric translations (geocentric domain)",
            9843 => "Axis Order Reversal (2D)",
            _ => "Unknown method",
        };
        Arc::new(Self {
            meta: Metadata::named(name).with_id("EPSG", code),
            formula: MethodFormula::from_epsg(code),
        })
    }

    pub fn ballpark(name: &str) -> Arc<Self> {
        Arc::new(Self {
            meta: Metadata::named(name),
            formula: MethodFormula::Ballpark,
        })
    }
}

impl BaseObject for OperationMethod {
    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::of(&[
            Capability::IdentifiedObject,
            Capability::OperationMethod,
            Capability::WktExportable,
            Capability::JsonExportable,
            Capability::Comparable,
        ])
    }

    fn metadata(&self) -> Option<&Metadata> {
        Some(&self.meta)
    }

    any_impls!();
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParameterValue {
    pub name: String,
    pub code: Option<u32>,
    pub value: f64,
    pub unit: Arc<UnitOfMeasure>,
}

impl ParameterValue {
    pub fn epsg(code: u32, value: f64, unit: Arc<UnitOfMeasure>) -> Self {
        Self {
            name: parameter_name(code).to_string(),
            code: Some(code),
            value,
            unit,
        }
    }

    /// Value in metres, radians or unity.
    pub fn si_value(&self) -> f64 {
        self.value * self.unit.to_si
    }
}

pub fn parameter_name(code: u32) -> &'static str {
    match code {
        LATITUDE_OF_NATURAL_ORIGIN => "Latitude of natural origin",
        LONGITUDE_OF_NATURAL_ORIGIN => "Longitude of natural origin",
        SCALE_FACTOR_AT_NATURAL_ORIGIN => "Scale factor at natural origin",
        FALSE_EASTING => "False easting",
        FALSE_NORTHING => "False northing",
        X_AXIS_TRANSLATION => "X-axis translation",
        Y_AXIS_TRANSLATION => "Y-axis translation",
        Z_AXIS_TRANSLATION => "Z-axis translation",
        _ => "Unknown parameter",
    }
}

/// Maps a parameter name back to its EPSG code.
pub fn parameter_code(name: &str) -> Option<u32> {
    let key: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    let code = match key.as_str() {
        "latitudeofnaturalorigin" | "latitudeoforigin" => LATITUDE_OF_NATURAL_ORIGIN,
        "longitudeofnaturalorigin" | "centralmeridian" => LONGITUDE_OF_NATURAL_ORIGIN,
        "scalefactoratnaturalorigin" | "scalefactor" => SCALE_FACTOR_AT_NATURAL_ORIGIN,
        "falseeasting" => FALSE_EASTING,
        "falsenorthing" => FALSE_NORTHING,
        "xaxistranslation" => X_AXIS_TRANSLATION,
        "yaxistranslation" => Y_AXIS_TRANSLATION,
        "zaxistranslation" => Z_AXIS_TRANSLATION,
        _ => return None,
    };
    Some(code)
}

/// Parameter codes a formula reads, with the value used when one is missing.
fn formula_parameters(formula: MethodFormula) -> &'static [(u32, f64)] {
    match formula {
        MethodFormula::PseudoMercator => &[
            (LATITUDE_OF_NATURAL_ORIGIN, 0.0),
            (LONGITUDE_OF_NATURAL_ORIGIN, 0.0),
            (FALSE_EASTING, 0.0),
            (FALSE_NORTHING, 0.0),
        ],
        MethodFormula::TransverseMercator => &[
            (LATITUDE_OF_NATURAL_ORIGIN, 0.0),
            (LONGITUDE_OF_NATURAL_ORIGIN, 0.0),
            (SCALE_FACTOR_AT_NATURAL_ORIGIN, 1.0),
            (FALSE_EASTING, 0.0),
            (FALSE_NORTHING, 0.0),
        ],
        MethodFormula::GeocentricTranslation => &[
            (X_AXIS_TRANSLATION, 0.0),
            (Y_AXIS_TRANSLATION, 0.0),
            (Z_AXIS_TRANSLATION, 0.0),
        ],
        _ => &[],
    }
}

/// Orders parameters the way the formula lists them, filling gaps with defaults.
/// Methods the kernels do not know keep their parameters as read.
pub fn canonical_parameters(
    formula: MethodFormula,
    parameters: Vec<ParameterValue>,
) -> Vec<ParameterValue> {
    if formula == MethodFormula::Unknown {
        return parameters;
    }
    formula_parameters(formula)
        .iter()
        .map(|&(code, default)| {
            parameters
                .iter()
                .find(|p| p.code == Some(code))
                .cloned()
                .map(|p| ParameterValue {
                    name: parameter_name(code).to_string(),
                    ..p
                })
                .unwrap_or_else(|| ParameterValue::epsg(code, default, parameter_default_unit(code)))
        })
        .collect()
}

/// Default unit for a parameter given without one.
pub fn parameter_default_unit(code: u32) -> Arc<UnitOfMeasure> {
    match code {
        LATITUDE_OF_NATURAL_ORIGIN | LONGITUDE_OF_NATURAL_ORIGIN => PredefinedUnit::Degree.unit(),
        SCALE_FACTOR_AT_NATURAL_ORIGIN => PredefinedUnit::ScaleUnity.unit(),
        _ => PredefinedUnit::Metre.unit(),
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SingleOperation {
    pub method: Arc<OperationMethod>,
    pub parameters: Vec<ParameterValue>,
    pub inverted: bool,
}

impl SingleOperation {
    pub fn new(method: Arc<OperationMethod>, parameters: Vec<ParameterValue>) -> Self {
        Self {
            method,
            parameters,
            inverted: false,
        }
    }

    pub fn parameter(&self, code: u32) -> Option<&ParameterValue> {
        self.parameters.iter().find(|p| p.code == Some(code))
    }

    /// SI value of a parameter, or `default` when absent.
    pub fn si(&self, code: u32, default: f64) -> f64 {
        self.parameter(code).map_or(default, ParameterValue::si_value)
    }

    pub fn formula(&self) -> MethodFormula {
        self.method.formula
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum OperationKind {
    Conversion(SingleOperation),
    Transformation(SingleOperation),
    Concatenated(Vec<Arc<CoordinateOperation>>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct CoordinateOperation {
    pub meta: Metadata,
    pub kind: OperationKind,
    pub source: Option<Arc<Crs>>,
    pub target: Option<Arc<Crs>>,
    /// Positional accuracy in metres, `None` when unknown.
    pub accuracy: Option<f64>,
    pub version: Option<String>,
}

impl CoordinateOperation {
    pub fn conversion(meta: Metadata, single: SingleOperation) -> Self {
        Self {
            meta,
            kind: OperationKind::Conversion(single),
            source: None,
            target: None,
            accuracy: Some(0.0),
            version: None,
        }
    }

    pub fn transformation(
        meta: Metadata,
        single: SingleOperation,
        source: Arc<Crs>,
        target: Arc<Crs>,
        accuracy: Option<f64>,
    ) -> Self {
        Self {
            meta,
            kind: OperationKind::Transformation(single),
            source: Some(source),
            target: Some(target),
            accuracy,
            version: None,
        }
    }

    /// Same operation bound to explicit source and target CRSs.
    pub fn between(&self, source: Arc<Crs>, target: Arc<Crs>) -> Self {
        Self {
            source: Some(source),
            target: Some(target),
            ..self.clone()
        }
    }

    pub fn single(&self) -> Option<&SingleOperation> {
        match &self.kind {
            OperationKind::Conversion(single) | OperationKind::Transformation(single) => {
                Some(single)
            }
            OperationKind::Concatenated(_) => None,
        }
    }

    pub fn method(&self) -> Option<&Arc<OperationMethod>> {
        self.single().map(|single| &single.method)
    }

    pub fn is_ballpark(&self) -> bool {
        match &self.kind {
            OperationKind::Concatenated(steps) => steps.iter().any(|s| s.is_ballpark()),
            _ => self
                .method()
                .is_some_and(|m| m.formula == MethodFormula::Ballpark),
        }
    }

    /// Number of single operations once concatenations are flattened.
    pub fn step_count(&self) -> usize {
        match &self.kind {
            OperationKind::Concatenated(steps) => steps.iter().map(|s| s.step_count()).sum(),
            _ => 1,
        }
    }

    /// Operation running in the opposite direction.
    pub fn inverse(&self) -> NativeResult<CoordinateOperation> {
        let kind = match &self.kind {
            OperationKind::Conversion(single) => {
                OperationKind::Conversion(invert_single(single, &self.meta.name)?)
            }
            OperationKind::Transformation(single) => {
                OperationKind::Transformation(invert_single(single, &self.meta.name)?)
            }
            OperationKind::Concatenated(steps) => {
                let mut inverted = Vec::with_capacity(steps.len());
                for step in steps.iter().rev() {
                    inverted.push(Arc::new(step.inverse()?));
                }
                OperationKind::Concatenated(inverted)
            }
        };
        let name = match self.meta.name.strip_prefix("Inverse of ") {
            Some(original) => original.to_string(),
            None => format!("Inverse of {}", self.meta.name),
        };
        Ok(CoordinateOperation {
            meta: Metadata {
                name,
                identifiers: Vec::new(),
                ..self.meta.clone()
            },
            kind,
            source: self.target.clone(),
            target: self.source.clone(),
            accuracy: self.accuracy,
            version: self.version.clone(),
        })
    }
}

fn invert_single(single: &SingleOperation, name: &str) -> NativeResult<SingleOperation> {
    if single.method.formula == MethodFormula::Unknown {
        return Err(NativeError::NoInverse(format!(
            "Inverse of operation '{name}' using method '{}' is not available",
            single.method.meta.name
        )));
    }
    Ok(SingleOperation {
        inverted: !single.inverted,
        ..single.clone()
    })
}

impl BaseObject for CoordinateOperation {
    fn capabilities(&self) -> CapabilitySet {
        let base = CapabilitySet::of(&[
            Capability::IdentifiedObject,
            Capability::CoordinateOperation,
            Capability::WktExportable,
            Capability::JsonExportable,
            Capability::ProjStringExportable,
            Capability::Comparable,
        ]);
        match &self.kind {
            OperationKind::Conversion(_) => base
                .with(Capability::SingleOperation)
                .with(Capability::Conversion),
            OperationKind::Transformation(_) => base
                .with(Capability::SingleOperation)
                .with(Capability::Transformation),
            OperationKind::Concatenated(_) => base.with(Capability::ConcatenatedOperation),
        }
    }

    fn metadata(&self) -> Option<&Metadata> {
        Some(&self.meta)
    }

    any_impls!();
}

/// Unit suitable for a parameter value read from text with the given kind.
pub fn unit_for_kind(kind: UnitKind) -> Arc<UnitOfMeasure> {
    match kind {
        UnitKind::Angular => PredefinedUnit::Degree.unit(),
        UnitKind::Scale => PredefinedUnit::ScaleUnity.unit(),
        UnitKind::Time => PredefinedUnit::Second.unit(),
        UnitKind::Linear | UnitKind::None => PredefinedUnit::Metre.unit(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tm_conversion() -> CoordinateOperation {
        let single = SingleOperation::new(
            OperationMethod::epsg(9807),
            vec![
                ParameterValue::epsg(LONGITUDE_OF_NATURAL_ORIGIN, 3.0, PredefinedUnit::Degree.unit()),
                ParameterValue::epsg(
                    SCALE_FACTOR_AT_NATURAL_ORIGIN,
                    0.9996,
                    PredefinedUnit::ScaleUnity.unit(),
                ),
                ParameterValue::epsg(FALSE_EASTING, 500000.0, PredefinedUnit::Metre.unit()),
            ],
        );
        CoordinateOperation::conversion(Metadata::named("UTM zone 31N"), single)
    }

    #[test]
    fn inverse_twice_restores_the_operation() {
        let conversion = tm_conversion();
        let inverse = conversion.inverse().expect("inverse");
        assert_eq!(inverse.meta.name, "Inverse of UTM zone 31N");
        assert!(inverse.single().expect("single").inverted);
        let back = inverse.inverse().expect("inverse of inverse");
        assert_eq!(back.meta.name, conversion.meta.name);
        assert_eq!(back.kind, conversion.kind);
    }

    #[test]
    fn unknown_method_has_no_inverse() {
        let single = SingleOperation::new(OperationMethod::epsg(9999), Vec::new());
        let conversion = CoordinateOperation::conversion(Metadata::named("mystery"), single);
        let err = conversion.inverse().unwrap_err();
        assert!(matches!(err, NativeError::NoInverse(_)));
    }

    #[test]
    fn parameter_lookup_uses_si_values() {
        let conversion = tm_conversion();
        let single = conversion.single().expect("single");
        assert!((single.si(LONGITUDE_OF_NATURAL_ORIGIN, 0.0) - 3f64.to_radians()).abs() < 1e-15);
        assert_eq!(single.si(FALSE_NORTHING, 0.0), 0.0);
        assert_eq!(parameter_code("central_meridian"), Some(LONGITUDE_OF_NATURAL_ORIGIN));
    }

    #[test]
    fn canonical_parameters_fill_gaps_and_drop_extras() {
        let read = vec![
            ParameterValue::epsg(FALSE_EASTING, 10.0, PredefinedUnit::Metre.unit()),
            ParameterValue::epsg(SCALE_FACTOR_AT_NATURAL_ORIGIN, 1.0, PredefinedUnit::ScaleUnity.unit()),
        ];
        let params = canonical_parameters(MethodFormula::PseudoMercator, read);
        let codes: Vec<_> = params.iter().filter_map(|p| p.code).collect();
        assert_eq!(
            codes,
            vec![LATITUDE_OF_NATURAL_ORIGIN, LONGITUDE_OF_NATURAL_ORIGIN, FALSE_EASTING, FALSE_NORTHING]
        );
        assert_eq!(params[2].value, 10.0);
    }

    #[test]
    fn capabilities_follow_the_operation_kind() {
        let conversion = tm_conversion();
        let caps = conversion.capabilities();
        assert!(caps.contains(Capability::Conversion));
        assert!(!caps.contains(Capability::Transformation));
        assert_eq!(conversion.step_count(), 1);
    }
}
