//! Purpose: PROJ-string reader and writer.
//! Exports: `write`, `read`, `ProjVersion`, `ellipsoid_params`.
//! Role: Backs the PROJ_4 / PROJ_5 conventions and `+proj=` user input.
//! Invariants: CRS strings end with `+no_defs +type=crs`.
//! Invariants: Operations render as pipelines and only in PROJ_5.

use std::sync::Arc;

use super::object::{
    Axis, AxisDirection, CoordinateSystem, Crs, CrsKind, CsKind, Datum, DatumKind, Ellipsoid,
    EllipsoidShape, Metadata, NativeRef, PredefinedUnit, PrimeMeridian, as_native,
};
use super::operation::{
    CoordinateOperation, FALSE_EASTING, FALSE_NORTHING, LATITUDE_OF_NATURAL_ORIGIN,
    LONGITUDE_OF_NATURAL_ORIGIN, MethodFormula, OperationMethod, ParameterValue,
    SCALE_FACTOR_AT_NATURAL_ORIGIN, SingleOperation,
};
use super::pj::Pipeline;
use super::wkt::format_number;
use super::{NativeError, NativeResult};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProjVersion {
    Proj4,
    Proj5,
}

/// PROJ ellipsoid keyword, full name, EPSG code, semi-major axis, inverse flattening.
const ELLIPSOIDS: &[(&str, &str, u32, f64, f64)] = &[
    ("WGS84", "WGS 84", 7030, 6378137.0, 298.257223563),
    ("GRS80", "GRS 1980", 7019, 6378137.0, 298.257222101),
    ("intl", "International 1924", 7022, 6378388.0, 297.0),
];

const WGS84_DATUM: &str = "World Geodetic System 1984";

pub fn write(object: &NativeRef, version: ProjVersion) -> NativeResult<String> {
    let any = object.as_any();
    if let Some(crs) = any.downcast_ref::<Crs>() {
        let body = crs_body(crs)?;
        return Ok(format!("{body} +no_defs +type=crs"));
    }
    if let Some(op) = any.downcast_ref::<CoordinateOperation>() {
        if version == ProjVersion::Proj4 {
            return Err(NativeError::NotExportable(
                "Coordinate operations cannot be exported as PROJ.4 strings".into(),
            ));
        }
        return Pipeline::compile(op)?.proj_string();
    }
    if let Some(ellipsoid) = any.downcast_ref::<Ellipsoid>() {
        return Ok(ellipsoid_params(ellipsoid));
    }
    if let Some(pm) = any.downcast_ref::<PrimeMeridian>() {
        return Ok(format!("+pm={}", format_number(pm.longitude_degrees())));
    }
    Err(NativeError::NotExportable(
        "Object type not exportable to PROJ string".into(),
    ))
}

/// `+ellps=` for ellipsoids PROJ knows by name, `+R=` or `+a= +rf=` otherwise.
pub fn ellipsoid_params(ellipsoid: &Ellipsoid) -> String {
    let a = ellipsoid.semi_major_metre();
    let rf = ellipsoid.inverse_flattening();
    let by_code = ellipsoid.meta.epsg_code();
    if let Some((keyword, ..)) = ELLIPSOIDS.iter().find(|(_, name, code, ea, erf)| {
        by_code == Some(*code)
            || (*name == ellipsoid.meta.name && *ea == a && (erf - rf).abs() < 1e-9)
    }) {
        return format!("+ellps={keyword}");
    }
    if ellipsoid.is_sphere() {
        return format!("+R={}", format_number(a));
    }
    format!("+a={} +rf={}", format_number(a), format_number(rf))
}

fn datum_params(datum: &Datum) -> NativeResult<String> {
    let ellipsoid = datum.ellipsoid().ok_or_else(|| {
        NativeError::NotExportable(format!("Datum {} has no ellipsoid", datum.meta.name))
    })?;
    let mut out = if datum.meta.epsg_code() == Some(6326) || datum.meta.name == WGS84_DATUM {
        "+datum=WGS84".to_string()
    } else {
        ellipsoid_params(ellipsoid)
    };
    if let Some(pm) = datum.prime_meridian()
        && pm.longitude != 0.0
    {
        out.push_str(&format!(" +pm={}", format_number(pm.longitude_degrees())));
    }
    Ok(out)
}

fn crs_body(crs: &Crs) -> NativeResult<String> {
    match &crs.kind {
        CrsKind::Geographic { datum, .. } => Ok(format!("+proj=longlat {}", datum_params(datum)?)),
        CrsKind::Geodetic { datum, .. } if crs.is_geocentric() => Ok(format!(
            "+proj=geocent {} +units=m",
            datum_params(datum)?
        )),
        CrsKind::Projected {
            base, conversion, ..
        } => {
            let single = conversion.single().ok_or_else(|| {
                NativeError::NotExportable("Projected CRS has no single conversion".into())
            })?;
            let base_datum = base.datum().ok_or_else(|| {
                NativeError::NotExportable("Base CRS has no datum".into())
            })?;
            projection_body(single, base_datum)
        }
        CrsKind::Vertical { .. } => Ok("+vunits=m".to_string()),
        CrsKind::Compound { components } => {
            let mut parts = Vec::with_capacity(components.len());
            for component in components {
                parts.push(crs_body(component)?);
            }
            Ok(parts.join(" "))
        }
        _ => Err(NativeError::NotExportable(format!(
            "{} cannot be exported as a PROJ string",
            crs.meta.name
        ))),
    }
}

/// UTM zone for Transverse Mercator parameters that match one, with the south flag.
pub(crate) fn utm_zone(single: &SingleOperation) -> Option<(u32, bool)> {
    let lat0 = single.si(LATITUDE_OF_NATURAL_ORIGIN, 0.0);
    let lon0 = single.si(LONGITUDE_OF_NATURAL_ORIGIN, 0.0).to_degrees();
    let k = single.si(SCALE_FACTOR_AT_NATURAL_ORIGIN, 1.0);
    let x0 = single.si(FALSE_EASTING, 0.0);
    let y0 = single.si(FALSE_NORTHING, 0.0);
    let zone = (lon0 + 183.0) / 6.0;
    let south = if y0 == 0.0 {
        false
    } else if y0 == 10_000_000.0 {
        true
    } else {
        return None;
    };
    let valid = lat0 == 0.0
        && k == 0.9996
        && x0 == 500_000.0
        && (zone - zone.round()).abs() < 1e-9
        && (1.0..=60.0).contains(&zone.round());
    valid.then(|| (zone.round() as u32, south))
}

fn projection_body(single: &SingleOperation, datum: &Datum) -> NativeResult<String> {
    let num = |code: u32, default: f64| format_number(single.si(code, default));
    let deg = |code: u32| format_number(single.si(code, 0.0).to_degrees());
    match single.formula() {
        MethodFormula::PseudoMercator => {
            let ellipsoid = datum.ellipsoid().ok_or_else(|| {
                NativeError::NotExportable("Base datum has no ellipsoid".into())
            })?;
            let a = format_number(ellipsoid.semi_major_metre());
            Ok(format!(
                "+proj=merc +a={a} +b={a} +lat_ts=0 +lon_0={} +x_0={} +y_0={} +k=1 +units=m +nadgrids=@null +wktext",
                deg(LONGITUDE_OF_NATURAL_ORIGIN),
                num(FALSE_EASTING, 0.0),
                num(FALSE_NORTHING, 0.0),
            ))
        }
        MethodFormula::TransverseMercator => {
            let datum = datum_params(datum)?;
            if let Some((zone, south)) = utm_zone(single) {
                let south = if south { " +south" } else { "" };
                return Ok(format!("+proj=utm +zone={zone}{south} {datum} +units=m"));
            }
            Ok(format!(
                "+proj=tmerc +lat_0={} +lon_0={} +k={} +x_0={} +y_0={} {datum} +units=m",
                deg(LATITUDE_OF_NATURAL_ORIGIN),
                deg(LONGITUDE_OF_NATURAL_ORIGIN),
                num(SCALE_FACTOR_AT_NATURAL_ORIGIN, 1.0),
                num(FALSE_EASTING, 0.0),
                num(FALSE_NORTHING, 0.0),
            ))
        }
        _ => Err(NativeError::NotExportable(format!(
            "Method {} cannot be exported as a PROJ string",
            single.method.meta.name
        ))),
    }
}

/// Keys understood by the reader; anything else is reported as a warning.
const KNOWN_KEYS: &[&str] = &[
    "proj", "datum", "ellps", "a", "b", "rf", "R", "pm", "lat_0", "lon_0", "lat_ts", "k", "k_0",
    "x_0", "y_0", "zone", "south", "units", "vunits", "no_defs", "type", "wktext", "nadgrids",
    "towgs84", "axis",
];

struct Params<'a> {
    pairs: Vec<(&'a str, Option<&'a str>)>,
}

impl<'a> Params<'a> {
    fn parse(text: &'a str) -> NativeResult<Self> {
        let mut pairs = Vec::new();
        for token in text.split_whitespace() {
            let token = token.strip_prefix('+').ok_or_else(|| {
                NativeError::Parse(format!("Unexpected token \"{token}\" in PROJ string"))
            })?;
            if token == "step" || token == "inv" {
                return Err(NativeError::Parse(
                    "PROJ pipelines are not accepted as object definitions".into(),
                ));
            }
            match token.split_once('=') {
                Some((key, value)) => pairs.push((key, Some(value))),
                None => pairs.push((token, None)),
            }
        }
        Ok(Self { pairs })
    }

    fn get(&self, key: &str) -> Option<&'a str> {
        self.pairs
            .iter()
            .find(|(k, _)| *k == key)
            .and_then(|(_, v)| *v)
    }

    fn has(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| *k == key)
    }

    fn number(&self, key: &str) -> NativeResult<Option<f64>> {
        self.get(key)
            .map(|v| {
                v.parse::<f64>().map_err(|_| {
                    NativeError::Parse(format!("Invalid value for +{key}: \"{v}\""))
                })
            })
            .transpose()
    }
}

fn greenwich() -> Arc<PrimeMeridian> {
    Arc::new(PrimeMeridian {
        meta: Metadata::named("Greenwich").with_id("EPSG", 8901),
        longitude: 0.0,
        unit: PredefinedUnit::Degree.unit(),
    })
}

fn known_ellipsoid(keyword: &str) -> Option<Arc<Ellipsoid>> {
    ELLIPSOIDS
        .iter()
        .find(|(k, ..)| *k == keyword)
        .map(|(_, name, code, a, rf)| {
            Arc::new(Ellipsoid {
                meta: Metadata::named(*name).with_id("EPSG", code),
                semi_major: *a,
                unit: PredefinedUnit::Metre.unit(),
                shape: EllipsoidShape::InverseFlattening(*rf),
            })
        })
}

fn ellipsoid_from(params: &Params<'_>) -> NativeResult<Arc<Ellipsoid>> {
    if let Some(keyword) = params.get("ellps") {
        return known_ellipsoid(keyword)
            .ok_or_else(|| NativeError::Parse(format!("Unknown ellipsoid \"{keyword}\"")));
    }
    let shape_and_a = if let Some(r) = params.number("R")? {
        Some((r, EllipsoidShape::Sphere))
    } else if let Some(a) = params.number("a")? {
        let shape = match (params.number("rf")?, params.number("b")?) {
            (Some(rf), _) => EllipsoidShape::InverseFlattening(rf),
            (None, Some(b)) if b == a => EllipsoidShape::Sphere,
            (None, Some(b)) => EllipsoidShape::SemiMinor(b),
            (None, None) => EllipsoidShape::Sphere,
        };
        Some((a, shape))
    } else {
        None
    };
    match shape_and_a {
        Some((a, shape)) => Ok(Arc::new(Ellipsoid {
            meta: Metadata::named("unknown"),
            semi_major: a,
            unit: PredefinedUnit::Metre.unit(),
            shape,
        })),
        None => known_ellipsoid("WGS84")
            .ok_or_else(|| NativeError::Other("WGS 84 ellipsoid missing".into())),
    }
}

fn datum_from(params: &Params<'_>) -> NativeResult<Arc<Datum>> {
    let prime_meridian = match params.number("pm")? {
        Some(lon) if lon != 0.0 => Arc::new(PrimeMeridian {
            meta: Metadata::named("unknown"),
            longitude: lon,
            unit: PredefinedUnit::Degree.unit(),
        }),
        _ => greenwich(),
    };
    let (meta, ellipsoid) = match params.get("datum") {
        Some("WGS84") => (
            Metadata::named(WGS84_DATUM).with_id("EPSG", 6326),
            known_ellipsoid("WGS84")
                .ok_or_else(|| NativeError::Other("WGS 84 ellipsoid missing".into()))?,
        ),
        Some(other) => {
            return Err(NativeError::Parse(format!("Unknown datum \"{other}\"")));
        }
        None => {
            let ellipsoid = ellipsoid_from(params)?;
            let name = format!("Unknown based on {} ellipsoid", ellipsoid.meta.name);
            (Metadata::named(name), ellipsoid)
        }
    };
    Ok(Arc::new(Datum {
        meta,
        anchor: None,
        kind: DatumKind::GeodeticReferenceFrame {
            ellipsoid,
            prime_meridian,
        },
    }))
}

fn lon_lat_cs() -> Arc<CoordinateSystem> {
    let degree = PredefinedUnit::Degree.unit();
    Arc::new(CoordinateSystem::new(
        CsKind::Ellipsoidal,
        vec![
            Arc::new(Axis::new("Longitude", "lon", AxisDirection::East, degree.clone())),
            Arc::new(Axis::new("Latitude", "lat", AxisDirection::North, degree)),
        ],
    ))
}

fn easting_northing_cs() -> Arc<CoordinateSystem> {
    let metre = PredefinedUnit::Metre.unit();
    Arc::new(CoordinateSystem::new(
        CsKind::Cartesian,
        vec![
            Arc::new(Axis::new("Easting", "E", AxisDirection::East, metre.clone())),
            Arc::new(Axis::new("Northing", "N", AxisDirection::North, metre)),
        ],
    ))
}

fn check_units(params: &Params<'_>) -> NativeResult<()> {
    match params.get("units") {
        None | Some("m") => Ok(()),
        Some(other) => Err(NativeError::Parse(format!("Unsupported unit \"{other}\""))),
    }
}

fn projected(
    base_datum: Arc<Datum>,
    method: u32,
    parameters: Vec<ParameterValue>,
    conversion_name: String,
) -> Crs {
    let base = Arc::new(Crs::new(
        Metadata::named("unknown"),
        CrsKind::Geographic {
            datum: base_datum,
            cs: lon_lat_cs(),
        },
    ));
    let conversion = CoordinateOperation::conversion(
        Metadata::named(conversion_name),
        SingleOperation::new(OperationMethod::epsg(method), parameters),
    );
    Crs::new(
        Metadata::named("unknown"),
        CrsKind::Projected {
            base,
            conversion: Arc::new(conversion),
            cs: easting_northing_cs(),
        },
    )
}

fn parameter(code: u32, value: f64) -> ParameterValue {
    let unit = match code {
        LATITUDE_OF_NATURAL_ORIGIN | LONGITUDE_OF_NATURAL_ORIGIN => PredefinedUnit::Degree.unit(),
        SCALE_FACTOR_AT_NATURAL_ORIGIN => PredefinedUnit::ScaleUnity.unit(),
        _ => PredefinedUnit::Metre.unit(),
    };
    ParameterValue::epsg(code, value, unit)
}

/// Parses a `+proj=` CRS definition, returning the object and warnings for ignored keys.
pub fn read(text: &str) -> NativeResult<(NativeRef, Vec<String>)> {
    let params = Params::parse(text)?;
    let mut warnings = Vec::new();
    for (key, _) in &params.pairs {
        if !KNOWN_KEYS.contains(key) {
            warnings.push(format!("Unknown parameter +{key}"));
        }
    }
    if params.has("towgs84") {
        warnings.push("+towgs84 is ignored".to_string());
    }
    if let Some(axis) = params.get("axis")
        && axis != "enu"
    {
        return Err(NativeError::Parse(format!("Unsupported +axis={axis}")));
    }
    let proj = params
        .get("proj")
        .ok_or_else(|| NativeError::Parse("Missing +proj".into()))?;
    let crs = match proj {
        "pipeline" => {
            return Err(NativeError::Parse(
                "PROJ pipelines are not accepted as object definitions".into(),
            ));
        }
        "longlat" | "latlong" | "lonlat" | "latlon" => Crs::new(
            Metadata::named("unknown"),
            CrsKind::Geographic {
                datum: datum_from(&params)?,
                cs: lon_lat_cs(),
            },
        ),
        "geocent" | "cart" => {
            check_units(&params)?;
            let metre = PredefinedUnit::Metre.unit();
            let cs = CoordinateSystem::new(
                CsKind::Cartesian,
                vec![
                    Arc::new(Axis::new("Geocentric X", "X", AxisDirection::GeocentricX, metre.clone())),
                    Arc::new(Axis::new("Geocentric Y", "Y", AxisDirection::GeocentricY, metre.clone())),
                    Arc::new(Axis::new("Geocentric Z", "Z", AxisDirection::GeocentricZ, metre)),
                ],
            );
            Crs::new(
                Metadata::named("unknown"),
                CrsKind::Geodetic {
                    datum: datum_from(&params)?,
                    cs: Arc::new(cs),
                },
            )
        }
        "merc" | "webmerc" => {
            check_units(&params)?;
            let spherical = proj == "webmerc"
                || params.get("nadgrids") == Some("@null")
                || params.number("R")?.is_some()
                || matches!((params.number("a")?, params.number("b")?), (Some(a), Some(b)) if a == b);
            if !spherical {
                return Err(NativeError::Parse(
                    "Only spherical web-mercator is accepted for +proj=merc".into(),
                ));
            }
            let datum = known_ellipsoid("WGS84")
                .map(|ellipsoid| Datum {
                    meta: Metadata::named(WGS84_DATUM).with_id("EPSG", 6326),
                    anchor: None,
                    kind: DatumKind::GeodeticReferenceFrame {
                        ellipsoid,
                        prime_meridian: greenwich(),
                    },
                })
                .ok_or_else(|| NativeError::Other("WGS 84 ellipsoid missing".into()))?;
            let parameters = vec![
                parameter(LATITUDE_OF_NATURAL_ORIGIN, 0.0),
                parameter(LONGITUDE_OF_NATURAL_ORIGIN, params.number("lon_0")?.unwrap_or(0.0)),
                parameter(FALSE_EASTING, params.number("x_0")?.unwrap_or(0.0)),
                parameter(FALSE_NORTHING, params.number("y_0")?.unwrap_or(0.0)),
            ];
            projected(Arc::new(datum), 1024, parameters, "unknown".to_string())
        }
        "tmerc" => {
            check_units(&params)?;
            let k = match params.number("k")? {
                Some(k) => k,
                None => params.number("k_0")?.unwrap_or(1.0),
            };
            let parameters = vec![
                parameter(LATITUDE_OF_NATURAL_ORIGIN, params.number("lat_0")?.unwrap_or(0.0)),
                parameter(LONGITUDE_OF_NATURAL_ORIGIN, params.number("lon_0")?.unwrap_or(0.0)),
                parameter(SCALE_FACTOR_AT_NATURAL_ORIGIN, k),
                parameter(FALSE_EASTING, params.number("x_0")?.unwrap_or(0.0)),
                parameter(FALSE_NORTHING, params.number("y_0")?.unwrap_or(0.0)),
            ];
            projected(datum_from(&params)?, 9807, parameters, "unknown".to_string())
        }
        "utm" => {
            check_units(&params)?;
            let zone = params
                .number("zone")?
                .filter(|z| z.fract() == 0.0 && (1.0..=60.0).contains(z))
                .ok_or_else(|| NativeError::Parse("+proj=utm needs +zone in 1..60".into()))?;
            let south = params.has("south");
            let parameters = vec![
                parameter(LATITUDE_OF_NATURAL_ORIGIN, 0.0),
                parameter(LONGITUDE_OF_NATURAL_ORIGIN, zone * 6.0 - 183.0),
                parameter(SCALE_FACTOR_AT_NATURAL_ORIGIN, 0.9996),
                parameter(FALSE_EASTING, 500_000.0),
                parameter(FALSE_NORTHING, if south { 10_000_000.0 } else { 0.0 }),
            ];
            let name = format!("UTM zone {}{}", zone as u32, if south { "S" } else { "N" });
            projected(datum_from(&params)?, 9807, parameters, name)
        }
        other => {
            return Err(NativeError::Parse(format!("Unsupported projection +proj={other}")));
        }
    };
    Ok((as_native(&Arc::new(crs)), warnings))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crs_of(object: &NativeRef) -> &Crs {
        object.as_any().downcast_ref::<Crs>().expect("crs")
    }

    #[test]
    fn geographic_and_geocentric_strings() {
        let (geog, warnings) = read("+proj=longlat +datum=WGS84 +no_defs +type=crs").expect("read");
        assert!(warnings.is_empty());
        assert_eq!(
            write(&geog, ProjVersion::Proj5).expect("write"),
            "+proj=longlat +datum=WGS84 +no_defs +type=crs"
        );
        let (geocent, _) = read("+proj=geocent +ellps=GRS80 +units=m").expect("read");
        assert!(crs_of(&geocent).is_geocentric());
        assert_eq!(
            write(&geocent, ProjVersion::Proj4).expect("write"),
            "+proj=geocent +ellps=GRS80 +units=m +no_defs +type=crs"
        );
    }

    #[test]
    fn utm_round_trips_through_its_zone() {
        let (utm, _) = read("+proj=utm +zone=31 +datum=WGS84").expect("read");
        let crs = crs_of(&utm);
        assert!(matches!(crs.kind, CrsKind::Projected { .. }));
        assert_eq!(
            write(&utm, ProjVersion::Proj5).expect("write"),
            "+proj=utm +zone=31 +datum=WGS84 +units=m +no_defs +type=crs"
        );
    }

    #[test]
    fn spherical_mercator_is_pseudo_mercator() {
        let (merc, _) = read(
            "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m +nadgrids=@null +wktext +no_defs",
        )
        .expect("read");
        let CrsKind::Projected { conversion, .. } = &crs_of(&merc).kind else {
            panic!("expected a projected CRS");
        };
        assert_eq!(
            conversion.method().expect("method").formula,
            MethodFormula::PseudoMercator
        );
        assert!(read("+proj=merc +ellps=WGS84").is_err());
    }

    #[test]
    fn pipelines_and_unknown_keys() {
        assert!(matches!(
            read("+proj=pipeline +step +proj=axisswap +order=2,1"),
            Err(NativeError::Parse(_))
        ));
        let (_, warnings) = read("+proj=longlat +ellps=intl +foo=bar").expect("read");
        assert_eq!(warnings, vec!["Unknown parameter +foo".to_string()]);
    }
}
