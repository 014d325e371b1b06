//! Purpose: Geodetic object model with runtime-discoverable capability sets.
//! Exports: `BaseObject`, `NativeRef`, `Capability`, `CapabilitySet`, `Metadata`, `Extent`,
//! and the concrete identifier/unit/axis/cs/ellipsoid/meridian/datum/CRS types.
//! Role: Objects overlap categories (a geographic CRS is also a geodetic CRS); callers learn
//! membership only through `capabilities()`.
//! Invariants: Capability sets are closed upward: every refinement carries its parents' bits.
//! Invariants: Objects are immutable once shared.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, LazyLock};

use super::operation::CoordinateOperation;

/// Shared reference to a native object. Two words wide.
pub type NativeRef = Arc<dyn BaseObject>;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum Capability {
    IdentifiedObject,
    Identifier,
    UnitOfMeasure,
    Axis,
    CoordinateSystem,
    CartesianCs,
    SphericalCs,
    EllipsoidalCs,
    VerticalCs,
    TemporalCs,
    Ellipsoid,
    PrimeMeridian,
    Datum,
    GeodeticReferenceFrame,
    VerticalReferenceFrame,
    TemporalDatum,
    EngineeringDatum,
    Crs,
    SingleCrs,
    DerivedCrs,
    GeodeticCrs,
    GeographicCrs,
    Geocentric,
    ProjectedCrs,
    VerticalCrs,
    TemporalCrs,
    EngineeringCrs,
    CompoundCrs,
    CoordinateOperation,
    SingleOperation,
    Conversion,
    Transformation,
    ConcatenatedOperation,
    OperationMethod,
    WktExportable,
    JsonExportable,
    ProjStringExportable,
    Comparable,
}

impl Capability {
    pub const ALL: [Capability; 38] = [
        Capability::IdentifiedObject,
        Capability::Identifier,
        Capability::UnitOfMeasure,
        Capability::Axis,
        Capability::CoordinateSystem,
        Capability::CartesianCs,
        Capability::SphericalCs,
        Capability::EllipsoidalCs,
        Capability::VerticalCs,
        Capability::TemporalCs,
        Capability::Ellipsoid,
        Capability::PrimeMeridian,
        Capability::Datum,
        Capability::GeodeticReferenceFrame,
        Capability::VerticalReferenceFrame,
        Capability::TemporalDatum,
        Capability::EngineeringDatum,
        Capability::Crs,
        Capability::SingleCrs,
        Capability::DerivedCrs,
        Capability::GeodeticCrs,
        Capability::GeographicCrs,
        Capability::Geocentric,
        Capability::ProjectedCrs,
        Capability::VerticalCrs,
        Capability::TemporalCrs,
        Capability::EngineeringCrs,
        Capability::CompoundCrs,
        Capability::CoordinateOperation,
        Capability::SingleOperation,
        Capability::Conversion,
        Capability::Transformation,
        Capability::ConcatenatedOperation,
        Capability::OperationMethod,
        Capability::WktExportable,
        Capability::JsonExportable,
        Capability::ProjStringExportable,
        Capability::Comparable,
    ];

    const fn bit(self) -> u64 {
        1u64 << (self as u8)
    }
}

/// Set of categories an object satisfies.
#[derive(Clone, Copy, Default, Eq, PartialEq, Hash)]
pub struct CapabilitySet(u64);

impl CapabilitySet {
    pub const EMPTY: CapabilitySet = CapabilitySet(0);

    pub const fn of(caps: &[Capability]) -> Self {
        let mut bits = 0u64;
        let mut i = 0;
        while i < caps.len() {
            bits |= caps[i].bit();
            i += 1;
        }
        CapabilitySet(bits)
    }

    pub const fn with(self, cap: Capability) -> Self {
        CapabilitySet(self.0 | cap.bit())
    }

    pub const fn union(self, other: CapabilitySet) -> Self {
        CapabilitySet(self.0 | other.0)
    }

    pub const fn contains(self, cap: Capability) -> bool {
        self.0 & cap.bit() != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Capability> {
        Capability::ALL
            .into_iter()
            .filter(move |cap| self.contains(*cap))
    }
}

impl fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

const IDENTIFIED: CapabilitySet = CapabilitySet::of(&[
    Capability::IdentifiedObject,
    Capability::WktExportable,
    Capability::JsonExportable,
    Capability::Comparable,
]);

const DESCRIBED: CapabilitySet = CapabilitySet::of(&[
    Capability::IdentifiedObject,
    Capability::JsonExportable,
    Capability::Comparable,
]);

/// Common interface of every native object.
pub trait BaseObject: Any + Send + Sync + fmt::Debug {
    fn capabilities(&self) -> CapabilitySet;

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    /// Name, identifiers and usage, for identified objects only.
    fn metadata(&self) -> Option<&Metadata> {
        None
    }
}

macro_rules! any_impls {
    () => {
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }

        fn into_any(
            self: std::sync::Arc<Self>,
        ) -> std::sync::Arc<dyn std::any::Any + Send + Sync> {
            self
        }
    };
}
pub(crate) use any_impls;

/// Equivalent of a checked pointer cast.
pub fn downcast<T: BaseObject>(object: &NativeRef) -> Option<Arc<T>> {
    Arc::clone(object).into_any().downcast::<T>().ok()
}

/// Address of the object's data, stable for as long as one strong reference lives.
pub fn identity(object: &NativeRef) -> usize {
    Arc::as_ptr(object) as *const () as usize
}

/// Upcast helper for concrete objects.
pub fn as_native<T: BaseObject>(object: &Arc<T>) -> NativeRef {
    Arc::clone(object) as NativeRef
}

/// Geographic bounding box in degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Extent {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl Extent {
    pub const WORLD: Extent = Extent {
        west: -180.0,
        south: -90.0,
        east: 180.0,
        north: 90.0,
    };

    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.north > self.south && self.east > self.west
    }

    pub fn area(&self) -> f64 {
        if !self.is_valid() {
            return 0.0;
        }
        (self.east - self.west) * (self.north - self.south)
    }

    pub fn intersection(&self, other: &Extent) -> Option<Extent> {
        let out = Extent {
            west: self.west.max(other.west),
            south: self.south.max(other.south),
            east: self.east.min(other.east),
            north: self.north.min(other.north),
        };
        out.is_valid().then_some(out)
    }

    pub fn contains(&self, other: &Extent) -> bool {
        self.west <= other.west
            && self.south <= other.south
            && self.east >= other.east
            && self.north >= other.north
    }
}

/// Name, identifiers and usage shared by identified objects.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Metadata {
    pub name: String,
    pub identifiers: Vec<Arc<Identifier>>,
    pub remarks: Option<String>,
    pub scope: Option<String>,
    pub area: Option<Extent>,
    pub deprecated: bool,
}

impl Metadata {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, authority: &str, code: impl ToString) -> Self {
        self.identifiers
            .push(Arc::new(Identifier::new(authority, code.to_string())));
        self
    }

    pub fn with_area(mut self, area: Extent) -> Self {
        self.area = Some(area);
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Code of the first EPSG identifier, if numeric.
    pub fn epsg_code(&self) -> Option<u32> {
        self.identifiers
            .iter()
            .find(|id| id.code_space.eq_ignore_ascii_case("EPSG"))
            .and_then(|id| id.code.parse().ok())
    }

    pub fn first_identifier(&self) -> Option<&Arc<Identifier>> {
        self.identifiers.first()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Identifier {
    pub code_space: String,
    pub code: String,
    pub version: Option<String>,
    pub authority_title: Option<String>,
}

impl Identifier {
    pub fn new(code_space: &str, code: impl Into<String>) -> Self {
        Self {
            code_space: code_space.to_string(),
            code: code.into(),
            version: None,
            authority_title: None,
        }
    }
}

impl BaseObject for Identifier {
    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::of(&[Capability::Identifier])
    }

    any_impls!();
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UnitKind {
    Angular,
    Linear,
    Scale,
    Time,
    None,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UnitOfMeasure {
    pub name: String,
    pub kind: UnitKind,
    pub to_si: f64,
    pub code: Option<(String, String)>,
}

impl UnitOfMeasure {
    pub fn new(name: &str, kind: UnitKind, to_si: f64) -> Self {
        Self {
            name: name.to_string(),
            kind,
            to_si,
            code: None,
        }
    }

    fn epsg(mut self, code: u32) -> Self {
        self.code = Some(("EPSG".to_string(), code.to_string()));
        self
    }
}

impl BaseObject for UnitOfMeasure {
    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::of(&[
            Capability::UnitOfMeasure,
            Capability::WktExportable,
            Capability::JsonExportable,
            Capability::Comparable,
        ])
    }

    any_impls!();
}

/// Units every reader and the catalog agree on.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PredefinedUnit {
    ScaleUnity,
    PartsPerMillion,
    Metre,
    Radian,
    Microradian,
    Degree,
    ArcSecond,
    Grad,
    Second,
    Year,
}

static UNITS: LazyLock<[Arc<UnitOfMeasure>; 10]> = LazyLock::new(|| {
    [
        Arc::new(UnitOfMeasure::new("unity", UnitKind::Scale, 1.0).epsg(9201)),
        Arc::new(UnitOfMeasure::new("parts per million", UnitKind::Scale, 1e-6).epsg(9202)),
        Arc::new(UnitOfMeasure::new("metre", UnitKind::Linear, 1.0).epsg(9001)),
        Arc::new(UnitOfMeasure::new("radian", UnitKind::Angular, 1.0).epsg(9101)),
        Arc::new(UnitOfMeasure::new("microradian", UnitKind::Angular, 1e-6).epsg(9109)),
        Arc::new(
            UnitOfMeasure::new("degree", UnitKind::Angular, std::f64::consts::PI / 180.0)
                .epsg(9122),
        ),
        Arc::new(
            UnitOfMeasure::new(
                "arc-second",
                UnitKind::Angular,
                std::f64::consts::PI / (180.0 * 3600.0),
            )
            .epsg(9104),
        ),
        Arc::new(
            UnitOfMeasure::new("grad", UnitKind::Angular, std::f64::consts::PI / 200.0).epsg(9105),
        ),
        Arc::new(UnitOfMeasure::new("second", UnitKind::Time, 1.0).epsg(1040)),
        Arc::new(UnitOfMeasure::new("year", UnitKind::Time, 31_556_925.445).epsg(1029)),
    ]
});

impl PredefinedUnit {
    pub fn unit(self) -> Arc<UnitOfMeasure> {
        Arc::clone(&UNITS[self as usize])
    }

    /// Finds a predefined unit by name or alias, ignoring case.
    pub fn lookup(name: &str) -> Option<Arc<UnitOfMeasure>> {
        let lower = name.trim().to_ascii_lowercase();
        let unit = match lower.as_str() {
            "unity" | "scale unity" => PredefinedUnit::ScaleUnity,
            "parts per million" | "ppm" => PredefinedUnit::PartsPerMillion,
            "metre" | "meter" | "m" => PredefinedUnit::Metre,
            "radian" | "rad" => PredefinedUnit::Radian,
            "microradian" => PredefinedUnit::Microradian,
            "degree" | "deg" | "degree (supplier to define representation)" => {
                PredefinedUnit::Degree
            }
            "arc-second" | "arc second" => PredefinedUnit::ArcSecond,
            "grad" | "gon" => PredefinedUnit::Grad,
            "second" | "s" => PredefinedUnit::Second,
            "year" | "calendar year" => PredefinedUnit::Year,
            _ => return None,
        };
        Some(unit.unit())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AxisDirection {
    North,
    South,
    East,
    West,
    Up,
    Down,
    GeocentricX,
    GeocentricY,
    GeocentricZ,
    Future,
    Past,
    Unspecified,
}

impl AxisDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            AxisDirection::North => "north",
            AxisDirection::South => "south",
            AxisDirection::East => "east",
            AxisDirection::West => "west",
            AxisDirection::Up => "up",
            AxisDirection::Down => "down",
            AxisDirection::GeocentricX => "geocentricX",
            AxisDirection::GeocentricY => "geocentricY",
            AxisDirection::GeocentricZ => "geocentricZ",
            AxisDirection::Future => "future",
            AxisDirection::Past => "past",
            AxisDirection::Unspecified => "unspecified",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        let dir = match text.trim().to_ascii_lowercase().as_str() {
            "north" => AxisDirection::North,
            "south" => AxisDirection::South,
            "east" => AxisDirection::East,
            "west" => AxisDirection::West,
            "up" => AxisDirection::Up,
            "down" => AxisDirection::Down,
            "geocentricx" | "other" => AxisDirection::GeocentricX,
            "geocentricy" => AxisDirection::GeocentricY,
            "geocentricz" => AxisDirection::GeocentricZ,
            "future" => AxisDirection::Future,
            "past" => AxisDirection::Past,
            "unspecified" => AxisDirection::Unspecified,
            _ => return None,
        };
        Some(dir)
    }

    pub fn is_northing(self) -> bool {
        matches!(self, AxisDirection::North | AxisDirection::South)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Axis {
    pub meta: Metadata,
    pub abbreviation: String,
    pub direction: AxisDirection,
    pub unit: Arc<UnitOfMeasure>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
}

impl Axis {
    pub fn new(
        name: &str,
        abbreviation: &str,
        direction: AxisDirection,
        unit: Arc<UnitOfMeasure>,
    ) -> Self {
        Self {
            meta: Metadata::named(name),
            abbreviation: abbreviation.to_string(),
            direction,
            unit,
            minimum: None,
            maximum: None,
        }
    }
}

impl BaseObject for Axis {
    fn capabilities(&self) -> CapabilitySet {
        DESCRIBED.with(Capability::Axis)
    }

    fn metadata(&self) -> Option<&Metadata> {
        Some(&self.meta)
    }

    any_impls!();
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CsKind {
    Cartesian,
    Spherical,
    Ellipsoidal,
    Vertical,
    Temporal,
}

impl CsKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CsKind::Cartesian => "Cartesian",
            CsKind::Spherical => "spherical",
            CsKind::Ellipsoidal => "ellipsoidal",
            CsKind::Vertical => "vertical",
            CsKind::Temporal => "temporal",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        let kind = match text.trim().to_ascii_lowercase().as_str() {
            "cartesian" => CsKind::Cartesian,
            "spherical" => CsKind::Spherical,
            "ellipsoidal" => CsKind::Ellipsoidal,
            "vertical" => CsKind::Vertical,
            "temporal" | "temporaldatetime" | "temporalcount" | "temporalmeasure" => {
                CsKind::Temporal
            }
            _ => return None,
        };
        Some(kind)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CoordinateSystem {
    pub meta: Metadata,
    pub kind: CsKind,
    pub axes: Vec<Arc<Axis>>,
}

impl CoordinateSystem {
    pub fn new(kind: CsKind, axes: Vec<Arc<Axis>>) -> Self {
        Self {
            meta: Metadata::default(),
            kind,
            axes,
        }
    }

    pub fn dimension(&self) -> usize {
        self.axes.len()
    }

    /// Latitude-first ellipsoidal, or northing-first Cartesian.
    pub fn is_northing_first(&self) -> bool {
        self.axes
            .first()
            .is_some_and(|axis| axis.direction.is_northing())
    }
}

impl BaseObject for CoordinateSystem {
    fn capabilities(&self) -> CapabilitySet {
        let specific = match self.kind {
            CsKind::Cartesian => Capability::CartesianCs,
            CsKind::Spherical => Capability::SphericalCs,
            CsKind::Ellipsoidal => Capability::EllipsoidalCs,
            CsKind::Vertical => Capability::VerticalCs,
            CsKind::Temporal => Capability::TemporalCs,
        };
        DESCRIBED
            .with(Capability::CoordinateSystem)
            .with(specific)
    }

    fn metadata(&self) -> Option<&Metadata> {
        Some(&self.meta)
    }

    any_impls!();
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EllipsoidShape {
    InverseFlattening(f64),
    SemiMinor(f64),
    Sphere,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Ellipsoid {
    pub meta: Metadata,
    pub semi_major: f64,
    pub unit: Arc<UnitOfMeasure>,
    pub shape: EllipsoidShape,
}

impl Ellipsoid {
    pub fn semi_major_metre(&self) -> f64 {
        self.semi_major * self.unit.to_si
    }

    pub fn semi_minor(&self) -> f64 {
        match self.shape {
            EllipsoidShape::SemiMinor(b) => b,
            EllipsoidShape::Sphere => self.semi_major,
            EllipsoidShape::InverseFlattening(rf) if rf == 0.0 => self.semi_major,
            EllipsoidShape::InverseFlattening(rf) => self.semi_major * (1.0 - 1.0 / rf),
        }
    }

    /// Zero for a sphere.
    pub fn inverse_flattening(&self) -> f64 {
        match self.shape {
            EllipsoidShape::InverseFlattening(rf) => rf,
            EllipsoidShape::Sphere => 0.0,
            EllipsoidShape::SemiMinor(b) if b == self.semi_major => 0.0,
            EllipsoidShape::SemiMinor(b) => self.semi_major / (self.semi_major - b),
        }
    }

    pub fn is_sphere(&self) -> bool {
        self.inverse_flattening() == 0.0
    }

    pub fn ivf_definitive(&self) -> bool {
        matches!(self.shape, EllipsoidShape::InverseFlattening(_))
    }

    pub fn eccentricity_squared(&self) -> f64 {
        let rf = self.inverse_flattening();
        if rf == 0.0 {
            return 0.0;
        }
        let f = 1.0 / rf;
        f * (2.0 - f)
    }
}

impl BaseObject for Ellipsoid {
    fn capabilities(&self) -> CapabilitySet {
        IDENTIFIED
            .with(Capability::Ellipsoid)
            .with(Capability::ProjStringExportable)
    }

    fn metadata(&self) -> Option<&Metadata> {
        Some(&self.meta)
    }

    any_impls!();
}

#[derive(Clone, Debug, PartialEq)]
pub struct PrimeMeridian {
    pub meta: Metadata,
    pub longitude: f64,
    pub unit: Arc<UnitOfMeasure>,
}

impl PrimeMeridian {
    pub fn longitude_degrees(&self) -> f64 {
        (self.longitude * self.unit.to_si).to_degrees()
    }
}

impl BaseObject for PrimeMeridian {
    fn capabilities(&self) -> CapabilitySet {
        IDENTIFIED
            .with(Capability::PrimeMeridian)
            .with(Capability::ProjStringExportable)
    }

    fn metadata(&self) -> Option<&Metadata> {
        Some(&self.meta)
    }

    any_impls!();
}

#[derive(Clone, Debug, PartialEq)]
pub enum DatumKind {
    GeodeticReferenceFrame {
        ellipsoid: Arc<Ellipsoid>,
        prime_meridian: Arc<PrimeMeridian>,
    },
    VerticalReferenceFrame,
    TemporalDatum {
        origin: String,
    },
    EngineeringDatum,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Datum {
    pub meta: Metadata,
    pub anchor: Option<String>,
    pub kind: DatumKind,
}

impl Datum {
    pub fn ellipsoid(&self) -> Option<&Arc<Ellipsoid>> {
        match &self.kind {
            DatumKind::GeodeticReferenceFrame { ellipsoid, .. } => Some(ellipsoid),
            _ => None,
        }
    }

    pub fn prime_meridian(&self) -> Option<&Arc<PrimeMeridian>> {
        match &self.kind {
            DatumKind::GeodeticReferenceFrame { prime_meridian, .. } => Some(prime_meridian),
            _ => None,
        }
    }
}

impl BaseObject for Datum {
    fn capabilities(&self) -> CapabilitySet {
        let specific = match self.kind {
            DatumKind::GeodeticReferenceFrame { .. } => Capability::GeodeticReferenceFrame,
            DatumKind::VerticalReferenceFrame => Capability::VerticalReferenceFrame,
            DatumKind::TemporalDatum { .. } => Capability::TemporalDatum,
            DatumKind::EngineeringDatum => Capability::EngineeringDatum,
        };
        IDENTIFIED.with(Capability::Datum).with(specific)
    }

    fn metadata(&self) -> Option<&Metadata> {
        Some(&self.meta)
    }

    any_impls!();
}

#[derive(Clone, Debug, PartialEq)]
pub enum CrsKind {
    Geographic {
        datum: Arc<Datum>,
        cs: Arc<CoordinateSystem>,
    },
    /// Geodetic CRS with a Cartesian (geocentric) or spherical coordinate system.
    Geodetic {
        datum: Arc<Datum>,
        cs: Arc<CoordinateSystem>,
    },
    Projected {
        base: Arc<Crs>,
        conversion: Arc<CoordinateOperation>,
        cs: Arc<CoordinateSystem>,
    },
    Vertical {
        datum: Arc<Datum>,
        cs: Arc<CoordinateSystem>,
    },
    Temporal {
        datum: Arc<Datum>,
        cs: Arc<CoordinateSystem>,
    },
    Engineering {
        datum: Arc<Datum>,
        cs: Arc<CoordinateSystem>,
    },
    Compound {
        components: Vec<Arc<Crs>>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Crs {
    pub meta: Metadata,
    pub kind: CrsKind,
}

impl Crs {
    pub fn new(meta: Metadata, kind: CrsKind) -> Self {
        Self { meta, kind }
    }

    /// Datum of a single CRS; projected CRSs report their base datum.
    pub fn datum(&self) -> Option<&Arc<Datum>> {
        match &self.kind {
            CrsKind::Geographic { datum, .. }
            | CrsKind::Geodetic { datum, .. }
            | CrsKind::Vertical { datum, .. }
            | CrsKind::Temporal { datum, .. }
            | CrsKind::Engineering { datum, .. } => Some(datum),
            CrsKind::Projected { base, .. } => base.datum(),
            CrsKind::Compound { .. } => None,
        }
    }

    pub fn coordinate_system(&self) -> Option<&Arc<CoordinateSystem>> {
        match &self.kind {
            CrsKind::Geographic { cs, .. }
            | CrsKind::Geodetic { cs, .. }
            | CrsKind::Projected { cs, .. }
            | CrsKind::Vertical { cs, .. }
            | CrsKind::Temporal { cs, .. }
            | CrsKind::Engineering { cs, .. } => Some(cs),
            CrsKind::Compound { .. } => None,
        }
    }

    pub fn base_crs(&self) -> Option<&Arc<Crs>> {
        match &self.kind {
            CrsKind::Projected { base, .. } => Some(base),
            _ => None,
        }
    }

    pub fn ellipsoid(&self) -> Option<&Arc<Ellipsoid>> {
        self.datum().and_then(|datum| datum.ellipsoid())
    }

    pub fn is_geographic(&self) -> bool {
        matches!(self.kind, CrsKind::Geographic { .. })
    }

    pub fn is_geocentric(&self) -> bool {
        match &self.kind {
            CrsKind::Geodetic { cs, .. } => cs.kind == CsKind::Cartesian && cs.dimension() == 3,
            _ => false,
        }
    }

    /// Number of axes, summed over compound components.
    pub fn dimension(&self) -> usize {
        match &self.kind {
            CrsKind::Compound { components } => components.iter().map(|c| c.dimension()).sum(),
            _ => self.coordinate_system().map_or(0, |cs| cs.dimension()),
        }
    }
}

impl BaseObject for Crs {
    fn capabilities(&self) -> CapabilitySet {
        let base = IDENTIFIED.with(Capability::Crs);
        let single = base.with(Capability::SingleCrs);
        match &self.kind {
            CrsKind::Geographic { .. } => single
                .with(Capability::GeodeticCrs)
                .with(Capability::GeographicCrs)
                .with(Capability::ProjStringExportable),
            CrsKind::Geodetic { .. } => {
                let caps = single
                    .with(Capability::GeodeticCrs)
                    .with(Capability::ProjStringExportable);
                if self.is_geocentric() {
                    caps.with(Capability::Geocentric)
                } else {
                    caps
                }
            }
            CrsKind::Projected { .. } => single
                .with(Capability::DerivedCrs)
                .with(Capability::ProjectedCrs)
                .with(Capability::ProjStringExportable),
            CrsKind::Vertical { .. } => single
                .with(Capability::VerticalCrs)
                .with(Capability::ProjStringExportable),
            CrsKind::Temporal { .. } => single.with(Capability::TemporalCrs),
            CrsKind::Engineering { .. } => single.with(Capability::EngineeringCrs),
            CrsKind::Compound { .. } => base
                .with(Capability::CompoundCrs)
                .with(Capability::ProjStringExportable),
        }
    }

    fn metadata(&self) -> Option<&Metadata> {
        Some(&self.meta)
    }

    any_impls!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wgs84_ellipsoid() -> Arc<Ellipsoid> {
        Arc::new(Ellipsoid {
            meta: Metadata::named("WGS 84").with_id("EPSG", 7030),
            semi_major: 6378137.0,
            unit: PredefinedUnit::Metre.unit(),
            shape: EllipsoidShape::InverseFlattening(298.257223563),
        })
    }

    #[test]
    fn capability_set_membership() {
        let set = CapabilitySet::of(&[Capability::Crs, Capability::GeodeticCrs]);
        assert!(set.contains(Capability::Crs));
        assert!(!set.contains(Capability::ProjectedCrs));
        assert_eq!(set.iter().count(), 2);
        assert!(CapabilitySet::EMPTY.is_empty());
    }

    #[test]
    fn ellipsoid_derived_quantities() {
        let ellipsoid = wgs84_ellipsoid();
        assert!((ellipsoid.semi_minor() - 6356752.314245).abs() < 1e-3);
        assert!(!ellipsoid.is_sphere());
        assert!(ellipsoid.ivf_definitive());
        assert!((ellipsoid.eccentricity_squared() - 0.00669437999014).abs() < 1e-12);
    }

    #[test]
    fn downcast_and_identity_follow_the_shared_object() {
        let ellipsoid = wgs84_ellipsoid();
        let native = as_native(&ellipsoid);
        assert_eq!(identity(&native), Arc::as_ptr(&ellipsoid) as usize);
        let back = downcast::<Ellipsoid>(&native).expect("ellipsoid");
        assert!(Arc::ptr_eq(&back, &ellipsoid));
        assert!(downcast::<Datum>(&native).is_none());
    }

    #[test]
    fn extent_intersection_and_containment() {
        let europe = Extent::new(-16.1, 25.71, 48.24, 84.73);
        let inner = Extent::new(0.0, 40.0, 10.0, 50.0);
        assert!(europe.contains(&inner));
        assert_eq!(europe.intersection(&inner), Some(inner));
        assert!(Extent::new(50.0, 0.0, 60.0, 10.0).intersection(&europe).is_none());
    }
}
