//! WKT text to native objects.

use std::sync::Arc;

use tracing::debug;

use super::tree::{self, WktNode, WktValue};
use super::{canonical_datum_name, canonical_esri_name};
use crate::native::object::{
    Axis, AxisDirection, CoordinateSystem, Crs, CrsKind, CsKind, Datum, DatumKind, Ellipsoid,
    EllipsoidShape, Extent, Identifier, Metadata, NativeRef, PredefinedUnit, PrimeMeridian,
    UnitKind, UnitOfMeasure, as_native,
};
use crate::native::operation::{
    CoordinateOperation, LATITUDE_OF_NATURAL_ORIGIN, LONGITUDE_OF_NATURAL_ORIGIN, MethodFormula,
    OperationKind, OperationMethod, ParameterValue, SCALE_FACTOR_AT_NATURAL_ORIGIN,
    SingleOperation, canonical_parameters, parameter_code, parameter_default_unit,
};
use crate::native::{NativeError, NativeResult};

const GEOGRAPHIC: &[&str] = &["GEOGCRS", "GEOGRAPHICCRS", "BASEGEOGCRS"];
const GEODETIC: &[&str] = &["GEODCRS", "GEODETICCRS", "BASEGEODCRS"];
const PROJECTED: &[&str] = &["PROJCRS", "PROJECTEDCRS"];
const VERTICAL: &[&str] = &["VERTCRS", "VERTICALCRS", "VERT_CS", "VERTCS"];
const TEMPORAL: &[&str] = &["TIMECRS"];
const ENGINEERING: &[&str] = &["ENGCRS", "ENGINEERINGCRS", "LOCAL_CS"];
const COMPOUND: &[&str] = &["COMPOUNDCRS", "COMPD_CS"];
const GEODETIC_DATUM: &[&str] = &["DATUM", "TRF", "GEODETICDATUM", "ENSEMBLE"];
const VERTICAL_DATUM: &[&str] = &["VDATUM", "VRF", "VERTICALDATUM", "VERT_DATUM"];
const TEMPORAL_DATUM: &[&str] = &["TDATUM", "TIMEDATUM"];
const ENGINEERING_DATUM: &[&str] = &["EDATUM", "ENGINEERINGDATUM", "LOCAL_DATUM"];
const ELLIPSOID: &[&str] = &["ELLIPSOID", "SPHEROID"];
const PRIME_MERIDIAN: &[&str] = &["PRIMEM", "PRIMEMERIDIAN"];
const UNITS: &[&str] = &[
    "UNIT",
    "ANGLEUNIT",
    "LENGTHUNIT",
    "SCALEUNIT",
    "TIMEUNIT",
    "TEMPORALQUANTITY",
    "PARAMETRICUNIT",
];
const IDS: &[&str] = &["ID", "AUTHORITY"];

/// Keywords understood or deliberately ignored.
const KNOWN: &[&str] = &[
    "GEOGCRS",
    "GEOGRAPHICCRS",
    "BASEGEOGCRS",
    "GEODCRS",
    "GEODETICCRS",
    "BASEGEODCRS",
    "GEOGCS",
    "GEOCCS",
    "PROJCRS",
    "PROJECTEDCRS",
    "PROJCS",
    "VERTCRS",
    "VERTICALCRS",
    "VERT_CS",
    "VERTCS",
    "TIMECRS",
    "ENGCRS",
    "ENGINEERINGCRS",
    "LOCAL_CS",
    "COMPOUNDCRS",
    "COMPD_CS",
    "DATUM",
    "TRF",
    "GEODETICDATUM",
    "ENSEMBLE",
    "MEMBER",
    "ENSEMBLEACCURACY",
    "VDATUM",
    "VRF",
    "VERTICALDATUM",
    "VERT_DATUM",
    "TDATUM",
    "TIMEDATUM",
    "TIMEORIGIN",
    "CALENDAR",
    "EDATUM",
    "ENGINEERINGDATUM",
    "LOCAL_DATUM",
    "ANCHOR",
    "ANCHOREPOCH",
    "ELLIPSOID",
    "SPHEROID",
    "PRIMEM",
    "PRIMEMERIDIAN",
    "UNIT",
    "ANGLEUNIT",
    "LENGTHUNIT",
    "SCALEUNIT",
    "TIMEUNIT",
    "TEMPORALQUANTITY",
    "PARAMETRICUNIT",
    "CS",
    "AXIS",
    "ORDER",
    "MERIDIAN",
    "BEARING",
    "AXISMINVALUE",
    "AXISMAXVALUE",
    "RANGEMEANING",
    "ID",
    "AUTHORITY",
    "URI",
    "CITATION",
    "USAGE",
    "SCOPE",
    "AREA",
    "BBOX",
    "VERTICALEXTENT",
    "TIMEEXTENT",
    "REMARK",
    "CONVERSION",
    "DERIVINGCONVERSION",
    "METHOD",
    "PROJECTION",
    "PARAMETER",
    "PARAMETERFILE",
    "COORDINATEOPERATION",
    "CONCATENATEDOPERATION",
    "STEP",
    "SOURCECRS",
    "TARGETCRS",
    "INTERPOLATIONCRS",
    "OPERATIONACCURACY",
    "VERSION",
    "TOWGS84",
    "EXTENSION",
];

/// Parses WKT text, returning the object and any warnings about ignored content.
pub fn read(text: &str, strict: bool) -> NativeResult<(NativeRef, Vec<String>)> {
    let root = tree::parse(text)?;
    let mut nodes = Vec::new();
    root.walk(&mut nodes);
    let mut warnings = Vec::new();
    for node in nodes {
        if !node.is(KNOWN) {
            let message = format!("Unknown keyword {}", node.keyword);
            if strict {
                return Err(NativeError::Parse(message));
            }
            debug!(keyword = %node.keyword, "ignoring unknown WKT keyword");
            warnings.push(message);
        }
    }
    let object = Reader.object(&root)?;
    Ok((object, warnings))
}

struct Reader;

fn is_crs(node: &WktNode) -> bool {
    node.is(GEOGRAPHIC)
        || node.is(GEODETIC)
        || node.is(&["GEOGCS", "GEOCCS", "PROJCS"])
        || node.is(PROJECTED)
        || node.is(VERTICAL)
        || node.is(TEMPORAL)
        || node.is(ENGINEERING)
        || node.is(COMPOUND)
}

fn missing(parent: &WktNode, what: &str) -> NativeError {
    NativeError::Parse(format!("{} is missing {what}", parent.keyword))
}

fn identifier(node: &WktNode) -> Option<Identifier> {
    let mut values = node.values.iter();
    let authority = match values.next()? {
        WktValue::Text(text) => text.clone(),
        _ => return None,
    };
    let code = match values.next()? {
        WktValue::Text(text) => text.clone(),
        WktValue::Number(n) => tree::format_number(*n),
        _ => return None,
    };
    let mut id = Identifier::new(&authority, code);
    id.version = node.find(&["VERSION"]).and_then(|v| {
        v.name()
            .map(str::to_string)
            .or_else(|| v.numbers().first().map(|n| tree::format_number(*n)))
    });
    id.authority_title = node.find(&["CITATION"]).and_then(|c| c.name().map(str::to_string));
    Some(id)
}

fn bbox(node: &WktNode) -> Option<Extent> {
    let n = node.numbers();
    (n.len() == 4).then(|| Extent::new(n[1], n[0], n[3], n[2]))
}

fn metadata_named(node: &WktNode, name: String) -> Metadata {
    let mut meta = Metadata::named(name);
    for id in node.find_all(IDS) {
        if let Some(id) = identifier(id) {
            meta.identifiers.push(Arc::new(id));
        }
    }
    meta.remarks = node
        .find(&["REMARK"])
        .and_then(|r| r.name().map(str::to_string));
    let usage = node.find(&["USAGE"]).unwrap_or(node);
    meta.scope = usage
        .find(&["SCOPE"])
        .and_then(|s| s.name().map(str::to_string));
    meta.area = usage.find(&["BBOX"]).and_then(bbox);
    meta
}

fn metadata(node: &WktNode) -> Metadata {
    metadata_named(node, node.name().unwrap_or_default().to_string())
}

fn unit(node: &WktNode, default_kind: UnitKind) -> NativeResult<Arc<UnitOfMeasure>> {
    let kind = match node.keyword.to_ascii_uppercase().as_str() {
        "ANGLEUNIT" => UnitKind::Angular,
        "LENGTHUNIT" => UnitKind::Linear,
        "SCALEUNIT" => UnitKind::Scale,
        "TIMEUNIT" | "TEMPORALQUANTITY" => UnitKind::Time,
        "PARAMETRICUNIT" => UnitKind::None,
        _ => default_kind,
    };
    let name = node.name().ok_or_else(|| missing(node, "a unit name"))?;
    let factor = node.numbers().first().copied().unwrap_or(1.0);
    if let Some(predefined) = PredefinedUnit::lookup(name)
        && predefined.kind == kind
        && (predefined.to_si - factor).abs() <= 1e-12 * factor.abs().max(1e-300)
    {
        return Ok(predefined);
    }
    let mut unit = UnitOfMeasure::new(name, kind, factor);
    unit.code = node
        .find(IDS)
        .and_then(identifier)
        .map(|id| (id.code_space, id.code));
    Ok(Arc::new(unit))
}

fn child_unit(node: &WktNode, default_kind: UnitKind) -> NativeResult<Option<Arc<UnitOfMeasure>>> {
    node.find(UNITS).map(|u| unit(u, default_kind)).transpose()
}

fn split_axis_name(raw: &str) -> (String, String) {
    let raw = raw.trim();
    if raw.ends_with(')')
        && let Some(open) = raw.rfind('(')
    {
        let name = raw[..open].trim().to_string();
        let abbreviation = raw[open + 1..raw.len() - 1].trim().to_string();
        return (name, abbreviation);
    }
    (raw.to_string(), String::new())
}

fn default_abbreviation(name: &str) -> &'static str {
    let lower = name.to_ascii_lowercase();
    if lower.contains("latitude") {
        "Lat"
    } else if lower.contains("longitude") {
        "Lon"
    } else if lower.contains("easting") {
        "E"
    } else if lower.contains("northing") {
        "N"
    } else if lower.contains("height") {
        "h"
    } else {
        ""
    }
}

fn default_axis_name(abbreviation: &str) -> &'static str {
    match abbreviation {
        "E" | "X" => "Easting",
        "N" | "Y" => "Northing",
        "Lat" | "lat" => "Geodetic latitude",
        "Lon" | "lon" => "Geodetic longitude",
        "H" => "Gravity-related height",
        "h" => "Ellipsoidal height",
        "T" => "Time",
        _ => "",
    }
}

fn axis(
    node: &WktNode,
    default_unit: &Arc<UnitOfMeasure>,
    kind: UnitKind,
) -> NativeResult<(Axis, Option<f64>)> {
    let (mut name, mut abbreviation) = split_axis_name(node.name().unwrap_or_default());
    if name.is_empty() {
        name = default_axis_name(&abbreviation).to_string();
    }
    if abbreviation.is_empty() {
        abbreviation = default_abbreviation(&name).to_string();
    }
    let word = node
        .first_word()
        .ok_or_else(|| missing(node, "an axis direction"))?;
    let direction = AxisDirection::parse(word).unwrap_or(AxisDirection::Unspecified);
    let unit = child_unit(node, kind)?.unwrap_or_else(|| Arc::clone(default_unit));
    let mut axis = Axis::new(&name, &abbreviation, direction, unit);
    axis.minimum = node
        .find(&["AXISMINVALUE"])
        .and_then(|n| n.numbers().first().copied());
    axis.maximum = node
        .find(&["AXISMAXVALUE"])
        .and_then(|n| n.numbers().first().copied());
    let order = node
        .find(&["ORDER"])
        .and_then(|n| n.numbers().first().copied());
    Ok((axis, order))
}

/// Axes used when the text gives none.
#[derive(Clone, Copy)]
enum DefaultAxes {
    LongitudeLatitude,
    LatitudeLongitude,
    EastingNorthing,
    Geocentric,
    Height,
    Time,
}

impl DefaultAxes {
    fn build(self, unit: &Arc<UnitOfMeasure>) -> Vec<Arc<Axis>> {
        let axis = |name: &str, abbr: &str, dir: AxisDirection| {
            Arc::new(Axis::new(name, abbr, dir, Arc::clone(unit)))
        };
        match self {
            DefaultAxes::LongitudeLatitude => vec![
                axis("Geodetic longitude", "Lon", AxisDirection::East),
                axis("Geodetic latitude", "Lat", AxisDirection::North),
            ],
            DefaultAxes::LatitudeLongitude => vec![
                axis("Geodetic latitude", "Lat", AxisDirection::North),
                axis("Geodetic longitude", "Lon", AxisDirection::East),
            ],
            DefaultAxes::EastingNorthing => vec![
                axis("Easting", "E", AxisDirection::East),
                axis("Northing", "N", AxisDirection::North),
            ],
            DefaultAxes::Geocentric => vec![
                axis("Geocentric X", "X", AxisDirection::GeocentricX),
                axis("Geocentric Y", "Y", AxisDirection::GeocentricY),
                axis("Geocentric Z", "Z", AxisDirection::GeocentricZ),
            ],
            DefaultAxes::Height => vec![axis("Gravity-related height", "H", AxisDirection::Up)],
            DefaultAxes::Time => vec![axis("Time", "T", AxisDirection::Future)],
        }
    }
}

fn coordinate_system(
    node: &WktNode,
    kind: CsKind,
    unit_kind: UnitKind,
    fallback_unit: Arc<UnitOfMeasure>,
    defaults: DefaultAxes,
) -> NativeResult<Arc<CoordinateSystem>> {
    let kind = match node.find(&["CS"]) {
        Some(cs) => cs
            .first_word()
            .and_then(CsKind::parse)
            .ok_or_else(|| missing(cs, "a known coordinate system type"))?,
        None => kind,
    };
    let unit = child_unit(node, unit_kind)?.unwrap_or(fallback_unit);
    let mut axes = Vec::new();
    for axis_node in node.find_all(&["AXIS"]) {
        axes.push(axis(axis_node, &unit, unit_kind)?);
    }
    if axes.iter().all(|(_, order)| order.is_some()) {
        axes.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    }
    let mut axes: Vec<Arc<Axis>> = axes.into_iter().map(|(a, _)| Arc::new(a)).collect();
    if axes.is_empty() {
        axes = defaults.build(&unit);
    }
    Ok(Arc::new(CoordinateSystem::new(kind, axes)))
}

impl Reader {
    fn object(&self, node: &WktNode) -> NativeResult<NativeRef> {
        if is_crs(node) {
            return Ok(as_native(&self.crs(node)?));
        }
        if node.is(GEODETIC_DATUM)
            || node.is(VERTICAL_DATUM)
            || node.is(TEMPORAL_DATUM)
            || node.is(ENGINEERING_DATUM)
        {
            return Ok(as_native(&self.datum(node, None)?));
        }
        if node.is(ELLIPSOID) {
            return Ok(as_native(&self.ellipsoid(node)?));
        }
        if node.is(PRIME_MERIDIAN) {
            return Ok(as_native(&self.prime_meridian(node, None)?));
        }
        if node.is(UNITS) {
            return Ok(as_native(&unit(node, UnitKind::None)?));
        }
        if node.is(&["METHOD", "PROJECTION"]) {
            return Ok(as_native(&self.method(node)?.0));
        }
        if node.is(&["CONVERSION", "DERIVINGCONVERSION", "COORDINATEOPERATION", "CONCATENATEDOPERATION"]) {
            return Ok(as_native(&Arc::new(self.operation(node)?)));
        }
        Err(NativeError::Parse(format!(
            "Unsupported WKT object {}",
            node.keyword
        )))
    }

    fn crs(&self, node: &WktNode) -> NativeResult<Arc<Crs>> {
        let crs = if node.is(GEOGRAPHIC) || node.is(GEODETIC) {
            self.geodetic(node)?
        } else if node.is(&["GEOGCS"]) {
            self.wkt1_geographic(node)?
        } else if node.is(&["GEOCCS"]) {
            self.wkt1_geocentric(node)?
        } else if node.is(PROJECTED) {
            self.projected(node)?
        } else if node.is(&["PROJCS"]) {
            self.wkt1_projected(node)?
        } else if node.is(VERTICAL) {
            self.single(node, VERTICAL_DATUM, CsKind::Vertical, DefaultAxes::Height)?
        } else if node.is(TEMPORAL) {
            self.single(node, TEMPORAL_DATUM, CsKind::Temporal, DefaultAxes::Time)?
        } else if node.is(ENGINEERING) {
            self.single(
                node,
                ENGINEERING_DATUM,
                CsKind::Cartesian,
                DefaultAxes::EastingNorthing,
            )?
        } else if node.is(COMPOUND) {
            let mut components = Vec::new();
            for child in node.children().filter(|c| is_crs(c)) {
                components.push(self.crs(child)?);
            }
            if components.len() < 2 {
                return Err(missing(node, "at least two components"));
            }
            Crs::new(metadata(node), CrsKind::Compound { components })
        } else {
            return Err(NativeError::Parse(format!(
                "{} is not a coordinate reference system",
                node.keyword
            )));
        };
        Ok(Arc::new(crs))
    }

    fn ellipsoid(&self, node: &WktNode) -> NativeResult<Arc<Ellipsoid>> {
        let semi_major = node.number_at(0)?;
        let second = node.number_at(1)?;
        let unit = child_unit(node, UnitKind::Linear)?.unwrap_or_else(|| PredefinedUnit::Metre.unit());
        let shape = if second == 0.0 {
            EllipsoidShape::Sphere
        } else {
            EllipsoidShape::InverseFlattening(second)
        };
        let name = canonical_esri_name(node.name().unwrap_or_default());
        Ok(Arc::new(Ellipsoid {
            meta: metadata_named(node, name),
            semi_major,
            unit,
            shape,
        }))
    }

    fn prime_meridian(
        &self,
        node: &WktNode,
        default_unit: Option<&Arc<UnitOfMeasure>>,
    ) -> NativeResult<Arc<PrimeMeridian>> {
        let unit = match child_unit(node, UnitKind::Angular)? {
            Some(unit) => unit,
            None => default_unit.cloned().unwrap_or_else(|| PredefinedUnit::Degree.unit()),
        };
        Ok(Arc::new(PrimeMeridian {
            meta: metadata(node),
            longitude: node.number_at(0)?,
            unit,
        }))
    }

    fn greenwich(&self) -> Arc<PrimeMeridian> {
        Arc::new(PrimeMeridian {
            meta: Metadata::named("Greenwich").with_id("EPSG", 8901),
            longitude: 0.0,
            unit: PredefinedUnit::Degree.unit(),
        })
    }

    fn datum(
        &self,
        node: &WktNode,
        prime_meridian: Option<Arc<PrimeMeridian>>,
    ) -> NativeResult<Arc<Datum>> {
        let name = canonical_datum_name(node.name().unwrap_or_default());
        let meta = metadata_named(node, name);
        let anchor = node
            .find(&["ANCHOR"])
            .and_then(|a| a.name().map(str::to_string));
        let kind = if node.is(GEODETIC_DATUM) {
            let ellipsoid = node
                .find(ELLIPSOID)
                .ok_or_else(|| missing(node, "ELLIPSOID"))?;
            DatumKind::GeodeticReferenceFrame {
                ellipsoid: self.ellipsoid(ellipsoid)?,
                prime_meridian: prime_meridian.unwrap_or_else(|| self.greenwich()),
            }
        } else if node.is(VERTICAL_DATUM) {
            DatumKind::VerticalReferenceFrame
        } else if node.is(TEMPORAL_DATUM) {
            let origin = node
                .find(&["TIMEORIGIN"])
                .and_then(|o| {
                    o.name()
                        .map(str::to_string)
                        .or_else(|| o.numbers().first().map(|n| tree::format_number(*n)))
                })
                .unwrap_or_default();
            DatumKind::TemporalDatum { origin }
        } else {
            DatumKind::EngineeringDatum
        };
        Ok(Arc::new(Datum { meta, anchor, kind }))
    }

    fn geodetic(&self, node: &WktNode) -> NativeResult<Crs> {
        let pm_node = node.find(PRIME_MERIDIAN);
        let pm = pm_node
            .map(|pm| self.prime_meridian(pm, None))
            .transpose()?;
        let datum_node = node
            .find(GEODETIC_DATUM)
            .ok_or_else(|| missing(node, "DATUM"))?;
        let datum = self.datum(datum_node, pm.clone())?;
        let meta = metadata(node);
        let has_cs = node.find(&["CS"]).is_some();
        let geographic = node.is(GEOGRAPHIC);
        if !has_cs {
            if !node.is(&["BASEGEOGCRS", "BASEGEODCRS"]) {
                return Err(missing(node, "CS"));
            }
            let unit = match child_unit(node, UnitKind::Angular)? {
                Some(unit) => unit,
                None => pm.map_or_else(|| PredefinedUnit::Degree.unit(), |pm| Arc::clone(&pm.unit)),
            };
            let cs = Arc::new(CoordinateSystem::new(
                CsKind::Ellipsoidal,
                DefaultAxes::LatitudeLongitude.build(&unit),
            ));
            return Ok(Crs::new(meta, CrsKind::Geographic { datum, cs }));
        }
        let cs = coordinate_system(
            node,
            CsKind::Ellipsoidal,
            UnitKind::Angular,
            PredefinedUnit::Degree.unit(),
            DefaultAxes::LatitudeLongitude,
        )?;
        let kind = if geographic || cs.kind == CsKind::Ellipsoidal {
            CrsKind::Geographic { datum, cs }
        } else {
            CrsKind::Geodetic { datum, cs }
        };
        Ok(Crs::new(meta, kind))
    }

    fn wkt1_geographic(&self, node: &WktNode) -> NativeResult<Crs> {
        let unit = child_unit(node, UnitKind::Angular)?.unwrap_or_else(|| PredefinedUnit::Degree.unit());
        let pm = node
            .find(PRIME_MERIDIAN)
            .map(|pm| self.prime_meridian(pm, Some(&unit)))
            .transpose()?;
        let datum_node = node.find(&["DATUM"]).ok_or_else(|| missing(node, "DATUM"))?;
        let datum = self.datum(datum_node, pm)?;
        let cs = coordinate_system(
            node,
            CsKind::Ellipsoidal,
            UnitKind::Angular,
            unit,
            DefaultAxes::LongitudeLatitude,
        )?;
        let name = canonical_esri_name(node.name().unwrap_or_default());
        Ok(Crs::new(
            metadata_named(node, name),
            CrsKind::Geographic { datum, cs },
        ))
    }

    fn wkt1_geocentric(&self, node: &WktNode) -> NativeResult<Crs> {
        let unit = child_unit(node, UnitKind::Linear)?.unwrap_or_else(|| PredefinedUnit::Metre.unit());
        let pm = node
            .find(PRIME_MERIDIAN)
            .map(|pm| self.prime_meridian(pm, None))
            .transpose()?;
        let datum_node = node.find(&["DATUM"]).ok_or_else(|| missing(node, "DATUM"))?;
        let datum = self.datum(datum_node, pm)?;
        // WKT1 geocentric axes use OTHER for X and Y; the order is fixed.
        let cs = Arc::new(CoordinateSystem::new(
            CsKind::Cartesian,
            DefaultAxes::Geocentric.build(&unit),
        ));
        Ok(Crs::new(metadata(node), CrsKind::Geodetic { datum, cs }))
    }

    fn projected(&self, node: &WktNode) -> NativeResult<Crs> {
        let base_node = node
            .find(&["BASEGEOGCRS", "BASEGEODCRS"])
            .ok_or_else(|| missing(node, "BASEGEOGCRS"))?;
        let base = Arc::new(self.geodetic(base_node)?);
        let conversion_node = node
            .find(&["CONVERSION", "DERIVINGCONVERSION"])
            .ok_or_else(|| missing(node, "CONVERSION"))?;
        let conversion = Arc::new(self.operation(conversion_node)?);
        let cs = coordinate_system(
            node,
            CsKind::Cartesian,
            UnitKind::Linear,
            PredefinedUnit::Metre.unit(),
            DefaultAxes::EastingNorthing,
        )?;
        Ok(Crs::new(
            metadata(node),
            CrsKind::Projected {
                base,
                conversion,
                cs,
            },
        ))
    }

    fn wkt1_projected(&self, node: &WktNode) -> NativeResult<Crs> {
        let base_node = node.find(&["GEOGCS"]).ok_or_else(|| missing(node, "GEOGCS"))?;
        let base = Arc::new(self.wkt1_geographic(base_node)?);
        let linear = child_unit(node, UnitKind::Linear)?.unwrap_or_else(|| PredefinedUnit::Metre.unit());
        let angular = base
            .coordinate_system()
            .and_then(|cs| cs.axes.first())
            .map_or_else(|| PredefinedUnit::Degree.unit(), |a| Arc::clone(&a.unit));
        let projection = node
            .find(&["PROJECTION"])
            .ok_or_else(|| missing(node, "PROJECTION"))?;
        let projection_name = projection.name().unwrap_or_default();
        let pseudo_mercator = projection_name.eq_ignore_ascii_case("Mercator_1SP")
            && node.find_all(&["EXTENSION"]).any(|ext| {
                ext.values.iter().any(|v| {
                    matches!(v, WktValue::Text(t) if t.contains("+nadgrids=@null")
                        || t.contains("+a=6378137 +b=6378137"))
                })
            });
        let formula = if pseudo_mercator {
            MethodFormula::PseudoMercator
        } else {
            MethodFormula::from_name(projection_name)
        };
        let method = match formula {
            MethodFormula::PseudoMercator => OperationMethod::epsg(1024),
            MethodFormula::TransverseMercator => OperationMethod::epsg(9807),
            _ => Arc::new(OperationMethod::new(
                Metadata::named(projection_name.replace('_', " ")),
                MethodFormula::Unknown,
            )),
        };
        let mut parameters = Vec::new();
        for param in node.find_all(&["PARAMETER"]) {
            let name = param.name().unwrap_or_default();
            let value = param.number_at(0)?;
            let code = parameter_code(name);
            let unit = match code {
                Some(LATITUDE_OF_NATURAL_ORIGIN | LONGITUDE_OF_NATURAL_ORIGIN) => Arc::clone(&angular),
                Some(SCALE_FACTOR_AT_NATURAL_ORIGIN) => PredefinedUnit::ScaleUnity.unit(),
                _ => Arc::clone(&linear),
            };
            parameters.push(ParameterValue {
                name: name.to_string(),
                code,
                value,
                unit,
            });
        }
        let parameters = canonical_parameters(formula, parameters);
        let crs_name = canonical_esri_name(node.name().unwrap_or_default());
        let conversion_name = crs_name
            .split_once(" / ")
            .map_or("unnamed", |(_, rest)| rest)
            .to_string();
        let conversion = Arc::new(CoordinateOperation::conversion(
            Metadata::named(conversion_name),
            SingleOperation::new(method, parameters),
        ));
        let cs = coordinate_system(
            node,
            CsKind::Cartesian,
            UnitKind::Linear,
            linear,
            DefaultAxes::EastingNorthing,
        )?;
        Ok(Crs::new(
            metadata_named(node, crs_name),
            CrsKind::Projected {
                base,
                conversion,
                cs,
            },
        ))
    }

    fn single(
        &self,
        node: &WktNode,
        datum_keywords: &[&str],
        cs_kind: CsKind,
        defaults: DefaultAxes,
    ) -> NativeResult<Crs> {
        let datum_node = node
            .find(datum_keywords)
            .ok_or_else(|| missing(node, datum_keywords[0]))?;
        let datum = self.datum(datum_node, None)?;
        let (unit_kind, fallback) = match cs_kind {
            CsKind::Temporal => (UnitKind::Time, PredefinedUnit::Second.unit()),
            _ => (UnitKind::Linear, PredefinedUnit::Metre.unit()),
        };
        let cs = coordinate_system(node, cs_kind, unit_kind, fallback, defaults)?;
        let name = canonical_esri_name(node.name().unwrap_or_default());
        let meta = metadata_named(node, name);
        let kind = match cs_kind {
            CsKind::Vertical => CrsKind::Vertical { datum, cs },
            CsKind::Temporal => CrsKind::Temporal { datum, cs },
            _ => CrsKind::Engineering { datum, cs },
        };
        Ok(Crs::new(meta, kind))
    }

    /// Returns the method and whether its name marks an inverse.
    fn method(&self, node: &WktNode) -> NativeResult<(Arc<OperationMethod>, bool)> {
        let raw = node.name().unwrap_or_default();
        let (name, inverted) = match raw.strip_prefix("Inverse of ") {
            Some(rest) => (rest, true),
            None => (raw, false),
        };
        let id = node.find(IDS).and_then(identifier);
        let code = id.as_ref().and_then(|id| id.code.parse::<u32>().ok());
        let formula = match code.map(MethodFormula::from_epsg) {
            Some(formula) if formula != MethodFormula::Unknown => formula,
            _ => MethodFormula::from_name(name),
        };
        let mut meta = Metadata::named(name);
        if let (Some(id), Some(code)) = (id, code) {
            let authority = id
                .code_space
                .strip_prefix("INVERSE(")
                .and_then(|a| a.strip_suffix(')'))
                .unwrap_or(&id.code_space)
                .to_string();
            meta = meta.with_id(&authority, code);
        }
        Ok((Arc::new(OperationMethod::new(meta, formula)), inverted))
    }

    fn parameters(&self, node: &WktNode) -> NativeResult<Vec<ParameterValue>> {
        let mut out = Vec::new();
        for param in node.find_all(&["PARAMETER"]) {
            let name = param.name().unwrap_or_default().to_string();
            let code = param
                .find(IDS)
                .and_then(identifier)
                .and_then(|id| id.code.parse().ok())
                .or_else(|| parameter_code(&name));
            let kind = code.map_or(UnitKind::None, |c| parameter_default_unit(c).kind);
            let unit = match child_unit(param, kind)? {
                Some(unit) => unit,
                None => code.map_or_else(|| PredefinedUnit::Metre.unit(), parameter_default_unit),
            };
            out.push(ParameterValue {
                name,
                code,
                value: param.number_at(0)?,
                unit,
            });
        }
        Ok(out)
    }

    fn wrapped_crs(&self, node: &WktNode, keyword: &str) -> NativeResult<Option<Arc<Crs>>> {
        node.find(&[keyword])
            .map(|wrapper| {
                let inner = wrapper
                    .children()
                    .find(|c| is_crs(c))
                    .ok_or_else(|| missing(wrapper, "a CRS"))?;
                self.crs(inner)
            })
            .transpose()
    }

    fn operation(&self, node: &WktNode) -> NativeResult<CoordinateOperation> {
        let meta = metadata(node);
        let source = self.wrapped_crs(node, "SOURCECRS")?;
        let target = self.wrapped_crs(node, "TARGETCRS")?;
        let accuracy = node
            .find(&["OPERATIONACCURACY"])
            .and_then(|a| a.numbers().first().copied());
        let version = node.find(&["VERSION"]).and_then(|v| v.name().map(str::to_string));
        let kind = if node.is(&["CONCATENATEDOPERATION"]) {
            let mut steps = Vec::new();
            for step in node.find_all(&["STEP"]) {
                let inner = step
                    .children()
                    .next()
                    .ok_or_else(|| missing(step, "an operation"))?;
                steps.push(Arc::new(self.operation(inner)?));
            }
            if steps.is_empty() {
                return Err(missing(node, "STEP"));
            }
            OperationKind::Concatenated(steps)
        } else {
            let method_node = node.find(&["METHOD"]).ok_or_else(|| missing(node, "METHOD"))?;
            let (method, inverted) = self.method(method_node)?;
            let parameters = canonical_parameters(method.formula, self.parameters(node)?);
            let single = SingleOperation {
                method,
                parameters,
                inverted,
            };
            if node.is(&["COORDINATEOPERATION"]) {
                if source.is_none() || target.is_none() {
                    return Err(missing(node, "SOURCECRS and TARGETCRS"));
                }
                OperationKind::Transformation(single)
            } else {
                OperationKind::Conversion(single)
            }
        };
        let accuracy = match (&kind, accuracy) {
            (OperationKind::Conversion(_), None) => Some(0.0),
            (_, accuracy) => accuracy,
        };
        Ok(CoordinateOperation {
            meta,
            kind,
            source,
            target,
            accuracy,
            version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::object::{BaseObject, Capability, downcast};

    const WGS84: &str = r#"GEOGCRS["WGS 84",
        DATUM["World Geodetic System 1984",
            ELLIPSOID["WGS 84",6378137,298.257223563,LENGTHUNIT["metre",1]]],
        PRIMEM["Greenwich",0,ANGLEUNIT["degree",0.0174532925199433]],
        CS[ellipsoidal,2],
            AXIS["geodetic latitude (Lat)",north,ORDER[1],ANGLEUNIT["degree",0.0174532925199433]],
            AXIS["geodetic longitude (Lon)",east,ORDER[2],ANGLEUNIT["degree",0.0174532925199433]],
        USAGE[SCOPE["Horizontal component of 3D system."],AREA["World."],BBOX[-90,-180,90,180]],
        ID["EPSG",4326]]"#;

    #[test]
    fn reads_wkt2_geographic_crs() {
        let (object, warnings) = read(WGS84, true).expect("read");
        assert!(warnings.is_empty());
        let crs = downcast::<Crs>(&object).expect("crs");
        assert_eq!(crs.meta.name, "WGS 84");
        assert_eq!(crs.meta.epsg_code(), Some(4326));
        assert_eq!(crs.meta.area, Some(Extent::WORLD));
        let cs = crs.coordinate_system().expect("cs");
        assert!(cs.is_northing_first());
        assert_eq!(cs.axes[0].abbreviation, "Lat");
        assert!(object.capabilities().contains(Capability::GeographicCrs));
    }

    #[test]
    fn unknown_keywords_warn_unless_strict() {
        let text = r#"ELLIPSOID["Test",6378137,298.25,LENGTHUNIT["metre",1],FLAVOUR["x"]]"#;
        let (object, warnings) = read(text, false).expect("lenient");
        assert_eq!(warnings, vec!["Unknown keyword FLAVOUR".to_string()]);
        assert!(downcast::<Ellipsoid>(&object).is_some());
        assert!(matches!(read(text, true), Err(NativeError::Parse(_))));
    }

    #[test]
    fn wkt1_geographic_defaults_to_longitude_first() {
        let text = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;
        let (object, _) = read(text, false).expect("read");
        let crs = downcast::<Crs>(&object).expect("crs");
        assert_eq!(crs.meta.name, "WGS 84");
        assert_eq!(
            crs.datum().expect("datum").meta.name,
            "World Geodetic System 1984"
        );
        assert!(!crs.coordinate_system().expect("cs").is_northing_first());
    }

    #[test]
    fn transformation_requires_source_and_target() {
        let text = r#"COORDINATEOPERATION["x",METHOD["Geocentric translations (geog2D domain)",ID["EPSG",9603]]]"#;
        assert!(matches!(read(text, false), Err(NativeError::Parse(_))));
    }

    #[test]
    fn inverse_method_names_mark_inverted_conversions() {
        let text = r#"CONVERSION["Inverse of UTM zone 31N",
            METHOD["Inverse of Transverse Mercator",ID["INVERSE(EPSG)",9807]],
            PARAMETER["Longitude of natural origin",3,ANGLEUNIT["degree",0.0174532925199433],ID["EPSG",8802]]]"#;
        let (object, _) = read(text, true).expect("read");
        let op = downcast::<CoordinateOperation>(&object).expect("operation");
        let single = op.single().expect("single");
        assert!(single.inverted);
        assert_eq!(single.method.formula, MethodFormula::TransverseMercator);
        assert_eq!(single.method.meta.epsg_code(), Some(9807));
        assert_eq!(single.parameters.len(), 5);
    }
}
