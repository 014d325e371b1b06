//! Purpose: PROJJSON-style JSON reader and writer.
//! Exports: `write`, `read`, `SCHEMA`.
//! Role: Backs the JSON convention and JSON user input.
//! Invariants: Output of `write` is accepted by `read` and yields an equivalent object.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value, json};

use super::object::{
    Axis, AxisDirection, BaseObject, CoordinateSystem, Crs, CrsKind, CsKind, Datum, DatumKind,
    Ellipsoid, EllipsoidShape, Extent, Identifier, Metadata, NativeRef, PredefinedUnit,
    PrimeMeridian, UnitKind, UnitOfMeasure, as_native,
};
use super::operation::{
    CoordinateOperation, MethodFormula, OperationKind, OperationMethod, ParameterValue,
    SingleOperation, canonical_parameters, parameter_code, parameter_default_unit,
};
use super::{NativeError, NativeResult};

pub const SCHEMA: &str = "https://proj.org/schemas/v0.7/projjson.schema.json";

pub fn write(object: &NativeRef, multiline: bool, indentation: usize) -> NativeResult<String> {
    let mut value = to_value(object)?;
    if let Value::Object(map) = &mut value {
        let mut rooted = Map::new();
        rooted.insert("$schema".to_string(), Value::String(SCHEMA.to_string()));
        rooted.append(map);
        value = Value::Object(rooted);
    }
    render(&value, multiline, indentation)
}

fn render(value: &Value, multiline: bool, indentation: usize) -> NativeResult<String> {
    if !multiline {
        return serde_json::to_string(value).map_err(|e| NativeError::Other(e.to_string()));
    }
    let indent = vec![b' '; indentation];
    let formatter = serde_json::ser::PrettyFormatter::with_indent(&indent);
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value
        .serialize(&mut serializer)
        .map_err(|e| NativeError::Other(e.to_string()))?;
    String::from_utf8(out).map_err(|e| NativeError::Other(e.to_string()))
}

fn to_value(object: &NativeRef) -> NativeResult<Value> {
    let any = object.as_any();
    if let Some(crs) = any.downcast_ref::<Crs>() {
        return Ok(crs_value(crs, true));
    }
    if let Some(op) = any.downcast_ref::<CoordinateOperation>() {
        return Ok(operation_value(op));
    }
    if let Some(datum) = any.downcast_ref::<Datum>() {
        return Ok(datum_value(datum));
    }
    if let Some(ellipsoid) = any.downcast_ref::<Ellipsoid>() {
        return Ok(ellipsoid_value(ellipsoid));
    }
    if let Some(pm) = any.downcast_ref::<PrimeMeridian>() {
        return Ok(meridian_value(pm));
    }
    if let Some(cs) = any.downcast_ref::<CoordinateSystem>() {
        return Ok(cs_value(cs));
    }
    if let Some(axis) = any.downcast_ref::<Axis>() {
        return Ok(axis_value(axis));
    }
    if let Some(method) = any.downcast_ref::<OperationMethod>() {
        return Ok(method_value(method, false));
    }
    if let Some(unit) = any.downcast_ref::<UnitOfMeasure>() {
        return Ok(unit_object(unit));
    }
    Err(NativeError::NotExportable(format!(
        "Object type {:?} cannot be exported as JSON",
        object.capabilities()
    )))
}

fn id_value(id: &Identifier) -> Value {
    let code = match id.code.parse::<u64>() {
        Ok(n) => json!(n),
        Err(_) => json!(id.code),
    };
    let mut map = Map::new();
    map.insert("authority".into(), json!(id.code_space));
    map.insert("code".into(), code);
    if let Some(version) = &id.version {
        map.insert("version".into(), json!(version));
    }
    Value::Object(map)
}

fn typed(kind: &str, meta: &Metadata) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("type".into(), json!(kind));
    map.insert("name".into(), json!(meta.name));
    map
}

fn finish(map: &mut Map<String, Value>, meta: &Metadata) {
    if let Some(scope) = &meta.scope {
        map.insert("scope".into(), json!(scope));
    }
    if let Some(area) = &meta.area {
        map.insert(
            "bbox".into(),
            json!({
                "south_latitude": area.south,
                "west_longitude": area.west,
                "north_latitude": area.north,
                "east_longitude": area.east,
            }),
        );
    }
    match meta.identifiers.as_slice() {
        [] => {}
        [id] => {
            map.insert("id".into(), id_value(id));
        }
        ids => {
            map.insert(
                "ids".into(),
                Value::Array(ids.iter().map(|id| id_value(id)).collect()),
            );
        }
    }
    if let Some(remarks) = &meta.remarks {
        map.insert("remarks".into(), json!(remarks));
    }
}

fn unit_object(unit: &UnitOfMeasure) -> Value {
    let kind = match unit.kind {
        UnitKind::Angular => "AngularUnit",
        UnitKind::Linear => "LinearUnit",
        UnitKind::Scale => "ScaleUnit",
        UnitKind::Time => "TimeUnit",
        UnitKind::None => "Unit",
    };
    let mut map = Map::new();
    map.insert("type".into(), json!(kind));
    map.insert("name".into(), json!(unit.name));
    map.insert("conversion_factor".into(), json!(unit.to_si));
    if let Some((authority, code)) = &unit.code {
        map.insert(
            "id".into(),
            id_value(&Identifier::new(authority, code.clone())),
        );
    }
    Value::Object(map)
}

/// Short string form for the three common units.
fn unit_value(unit: &UnitOfMeasure) -> Value {
    for predefined in [
        PredefinedUnit::Degree,
        PredefinedUnit::Metre,
        PredefinedUnit::ScaleUnity,
    ] {
        if *predefined.unit() == *unit {
            return json!(unit.name);
        }
    }
    unit_object(unit)
}

fn measure(value: f64, unit: &UnitOfMeasure, default: &UnitOfMeasure) -> Value {
    if unit == default {
        json!(value)
    } else {
        json!({ "value": value, "unit": unit_value(unit) })
    }
}

fn ellipsoid_value(e: &Ellipsoid) -> Value {
    let mut map = typed("Ellipsoid", &e.meta);
    let metre = PredefinedUnit::Metre.unit();
    match e.shape {
        EllipsoidShape::Sphere => {
            map.insert("radius".into(), measure(e.semi_major, &e.unit, &metre));
        }
        EllipsoidShape::SemiMinor(b) => {
            map.insert("semi_major_axis".into(), measure(e.semi_major, &e.unit, &metre));
            map.insert("semi_minor_axis".into(), measure(b, &e.unit, &metre));
        }
        EllipsoidShape::InverseFlattening(rf) => {
            map.insert("semi_major_axis".into(), measure(e.semi_major, &e.unit, &metre));
            map.insert("inverse_flattening".into(), json!(rf));
        }
    }
    finish(&mut map, &e.meta);
    Value::Object(map)
}

fn meridian_value(pm: &PrimeMeridian) -> Value {
    let mut map = typed("PrimeMeridian", &pm.meta);
    map.insert(
        "longitude".into(),
        measure(pm.longitude, &pm.unit, &PredefinedUnit::Degree.unit()),
    );
    finish(&mut map, &pm.meta);
    Value::Object(map)
}

fn datum_value(datum: &Datum) -> Value {
    let kind = match datum.kind {
        DatumKind::GeodeticReferenceFrame { .. } => "GeodeticReferenceFrame",
        DatumKind::VerticalReferenceFrame => "VerticalReferenceFrame",
        DatumKind::TemporalDatum { .. } => "TemporalDatum",
        DatumKind::EngineeringDatum => "EngineeringDatum",
    };
    let mut map = typed(kind, &datum.meta);
    if let Some(anchor) = &datum.anchor {
        map.insert("anchor".into(), json!(anchor));
    }
    match &datum.kind {
        DatumKind::GeodeticReferenceFrame {
            ellipsoid,
            prime_meridian,
        } => {
            map.insert("ellipsoid".into(), ellipsoid_value(ellipsoid));
            map.insert("prime_meridian".into(), meridian_value(prime_meridian));
        }
        DatumKind::TemporalDatum { origin } => {
            map.insert("calendar".into(), json!("proleptic Gregorian"));
            map.insert("time_origin".into(), json!(origin));
        }
        _ => {}
    }
    finish(&mut map, &datum.meta);
    Value::Object(map)
}

fn axis_value(axis: &Axis) -> Value {
    let mut map = typed("Axis", &axis.meta);
    map.insert("abbreviation".into(), json!(axis.abbreviation));
    map.insert("direction".into(), json!(axis.direction.as_str()));
    map.insert("unit".into(), unit_value(&axis.unit));
    if let Some(min) = axis.minimum {
        map.insert("minimum_value".into(), json!(min));
    }
    if let Some(max) = axis.maximum {
        map.insert("maximum_value".into(), json!(max));
    }
    Value::Object(map)
}

fn cs_value(cs: &CoordinateSystem) -> Value {
    let axes: Vec<Value> = cs
        .axes
        .iter()
        .map(|axis| {
            let mut value = axis_value(axis);
            if let Value::Object(map) = &mut value {
                map.remove("type");
            }
            value
        })
        .collect();
    let mut map = Map::new();
    map.insert("type".into(), json!("CoordinateSystem"));
    map.insert("subtype".into(), json!(cs.kind.as_str()));
    map.insert("axis".into(), Value::Array(axes));
    finish(&mut map, &cs.meta);
    Value::Object(map)
}

fn crs_value(crs: &Crs, with_type: bool) -> Value {
    let kind = match crs.kind {
        CrsKind::Geographic { .. } => "GeographicCRS",
        CrsKind::Geodetic { .. } => "GeodeticCRS",
        CrsKind::Projected { .. } => "ProjectedCRS",
        CrsKind::Vertical { .. } => "VerticalCRS",
        CrsKind::Temporal { .. } => "TemporalCRS",
        CrsKind::Engineering { .. } => "EngineeringCRS",
        CrsKind::Compound { .. } => "CompoundCRS",
    };
    let mut map = typed(kind, &crs.meta);
    if !with_type {
        map.remove("type");
    }
    match &crs.kind {
        CrsKind::Projected {
            base,
            conversion,
            cs,
        } => {
            map.insert("base_crs".into(), crs_value(base, false));
            map.insert("conversion".into(), operation_value(conversion));
            map.insert("coordinate_system".into(), cs_value(cs));
        }
        CrsKind::Compound { components } => {
            map.insert(
                "components".into(),
                Value::Array(components.iter().map(|c| crs_value(c, true)).collect()),
            );
        }
        CrsKind::Geographic { datum, cs }
        | CrsKind::Geodetic { datum, cs }
        | CrsKind::Vertical { datum, cs }
        | CrsKind::Temporal { datum, cs }
        | CrsKind::Engineering { datum, cs } => {
            map.insert("datum".into(), datum_value(datum));
            map.insert("coordinate_system".into(), cs_value(cs));
        }
    }
    finish(&mut map, &crs.meta);
    Value::Object(map)
}

fn method_value(method: &OperationMethod, inverted: bool) -> Value {
    let name = if inverted {
        format!("Inverse of {}", method.meta.name)
    } else {
        method.meta.name.clone()
    };
    let mut map = Map::new();
    map.insert("type".into(), json!("OperationMethod"));
    map.insert("name".into(), json!(name));
    if let Some(id) = method.meta.first_identifier() {
        let mut id = (**id).clone();
        if inverted {
            id.code_space = format!("INVERSE({})", id.code_space);
        }
        map.insert("id".into(), id_value(&id));
    }
    Value::Object(map)
}

fn parameter_value(param: &ParameterValue) -> Value {
    let mut map = Map::new();
    map.insert("name".into(), json!(param.name));
    map.insert("value".into(), json!(param.value));
    map.insert("unit".into(), unit_value(&param.unit));
    if let Some(code) = param.code {
        map.insert("id".into(), json!({ "authority": "EPSG", "code": code }));
    }
    Value::Object(map)
}

fn single_into(map: &mut Map<String, Value>, single: &SingleOperation) {
    let mut method = method_value(&single.method, single.inverted);
    if let Value::Object(m) = &mut method {
        m.remove("type");
    }
    map.insert("method".into(), method);
    map.insert(
        "parameters".into(),
        Value::Array(single.parameters.iter().map(parameter_value).collect()),
    );
}

fn operation_value(op: &CoordinateOperation) -> Value {
    let kind = match op.kind {
        OperationKind::Conversion(_) => "Conversion",
        OperationKind::Transformation(_) => "Transformation",
        OperationKind::Concatenated(_) => "ConcatenatedOperation",
    };
    let mut map = typed(kind, &op.meta);
    if let Some(version) = &op.version {
        map.insert("operation_version".into(), json!(version));
    }
    if let Some(source) = &op.source {
        map.insert("source_crs".into(), crs_value(source, true));
    }
    if let Some(target) = &op.target {
        map.insert("target_crs".into(), crs_value(target, true));
    }
    match &op.kind {
        OperationKind::Conversion(single) | OperationKind::Transformation(single) => {
            single_into(&mut map, single);
        }
        OperationKind::Concatenated(steps) => {
            map.insert(
                "steps".into(),
                Value::Array(steps.iter().map(|s| operation_value(s)).collect()),
            );
        }
    }
    if !matches!(op.kind, OperationKind::Conversion(_))
        && let Some(accuracy) = op.accuracy
    {
        map.insert("accuracy".into(), json!(accuracy.to_string()));
    }
    finish(&mut map, &op.meta);
    Value::Object(map)
}

/// Parses JSON text produced by `write` or by another PROJJSON producer.
pub fn read(text: &str) -> NativeResult<NativeRef> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| NativeError::Parse(format!("Parsing error: {e}")))?;
    let kind = str_field(&value, "type")?;
    let object = match kind {
        "GeographicCRS" | "GeodeticCRS" | "ProjectedCRS" | "VerticalCRS" | "TemporalCRS"
        | "EngineeringCRS" | "CompoundCRS" => as_native(&read_crs(&value, None)?),
        "GeodeticReferenceFrame"
        | "VerticalReferenceFrame"
        | "TemporalDatum"
        | "EngineeringDatum"
        | "DatumEnsemble" => as_native(&read_datum(&value)?),
        "Ellipsoid" => as_native(&read_ellipsoid(&value)?),
        "PrimeMeridian" => as_native(&read_meridian(&value)?),
        "CoordinateSystem" => as_native(&read_cs(&value)?),
        "Conversion" | "Transformation" | "ConcatenatedOperation" => {
            as_native(&Arc::new(read_operation(&value)?))
        }
        "OperationMethod" => as_native(&read_method(&value)?.0),
        "LinearUnit" | "AngularUnit" | "ScaleUnit" | "TimeUnit" | "Unit" => {
            as_native(&read_unit(&value, UnitKind::None)?)
        }
        other => {
            return Err(NativeError::Parse(format!(
                "Unsupported JSON object type {other}"
            )));
        }
    };
    Ok(object)
}

fn field<'a>(value: &'a Value, key: &str) -> NativeResult<&'a Value> {
    value
        .get(key)
        .ok_or_else(|| NativeError::Parse(format!("Missing \"{key}\" member")))
}

fn str_field<'a>(value: &'a Value, key: &str) -> NativeResult<&'a str> {
    field(value, key)?
        .as_str()
        .ok_or_else(|| NativeError::Parse(format!("\"{key}\" is not a string")))
}

fn f64_field(value: &Value, key: &str) -> NativeResult<f64> {
    let v = field(value, key)?;
    v.as_f64()
        .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
        .ok_or_else(|| NativeError::Parse(format!("\"{key}\" is not a number")))
}

fn read_id(value: &Value) -> NativeResult<Identifier> {
    let authority = str_field(value, "authority")?;
    let code = match field(value, "code")? {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        _ => return Err(NativeError::Parse("\"code\" must be a string or number".into())),
    };
    let mut id = Identifier::new(authority, code);
    id.version = value.get("version").map(|v| match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    });
    Ok(id)
}

fn read_meta(value: &Value) -> NativeResult<Metadata> {
    let mut meta = Metadata::named(value.get("name").and_then(Value::as_str).unwrap_or_default());
    if let Some(id) = value.get("id") {
        meta.identifiers.push(Arc::new(read_id(id)?));
    }
    if let Some(Value::Array(ids)) = value.get("ids") {
        for id in ids {
            meta.identifiers.push(Arc::new(read_id(id)?));
        }
    }
    meta.scope = value.get("scope").and_then(Value::as_str).map(str::to_string);
    meta.remarks = value.get("remarks").and_then(Value::as_str).map(str::to_string);
    if let Some(bbox) = value.get("bbox") {
        meta.area = Some(Extent::new(
            f64_field(bbox, "west_longitude")?,
            f64_field(bbox, "south_latitude")?,
            f64_field(bbox, "east_longitude")?,
            f64_field(bbox, "north_latitude")?,
        ));
    }
    Ok(meta)
}

fn read_unit(value: &Value, default_kind: UnitKind) -> NativeResult<Arc<UnitOfMeasure>> {
    if let Value::String(name) = value {
        return PredefinedUnit::lookup(name)
            .ok_or_else(|| NativeError::Parse(format!("Unknown unit \"{name}\"")));
    }
    let kind = match value.get("type").and_then(Value::as_str) {
        Some("AngularUnit") => UnitKind::Angular,
        Some("LinearUnit") => UnitKind::Linear,
        Some("ScaleUnit") => UnitKind::Scale,
        Some("TimeUnit") => UnitKind::Time,
        _ => default_kind,
    };
    let name = str_field(value, "name")?;
    let factor = f64_field(value, "conversion_factor")?;
    let mut unit = UnitOfMeasure::new(name, kind, factor);
    if let Some(id) = value.get("id") {
        let id = read_id(id)?;
        unit.code = Some((id.code_space, id.code));
    }
    Ok(Arc::new(unit))
}

/// A bare number in the default unit, or `{value, unit}`.
fn read_measure(
    value: &Value,
    default: PredefinedUnit,
) -> NativeResult<(f64, Arc<UnitOfMeasure>)> {
    if let Some(n) = value.as_f64() {
        return Ok((n, default.unit()));
    }
    let n = f64_field(value, "value")?;
    let unit = read_unit(field(value, "unit")?, default.unit().kind)?;
    Ok((n, unit))
}

fn read_ellipsoid(value: &Value) -> NativeResult<Arc<Ellipsoid>> {
    let meta = read_meta(value)?;
    let (semi_major, unit, shape) = if let Some(radius) = value.get("radius") {
        let (r, unit) = read_measure(radius, PredefinedUnit::Metre)?;
        (r, unit, EllipsoidShape::Sphere)
    } else {
        let (a, unit) = read_measure(field(value, "semi_major_axis")?, PredefinedUnit::Metre)?;
        let shape = match value.get("semi_minor_axis") {
            Some(b) => EllipsoidShape::SemiMinor(read_measure(b, PredefinedUnit::Metre)?.0),
            None => EllipsoidShape::InverseFlattening(f64_field(value, "inverse_flattening")?),
        };
        (a, unit, shape)
    };
    Ok(Arc::new(Ellipsoid {
        meta,
        semi_major,
        unit,
        shape,
    }))
}

fn read_meridian(value: &Value) -> NativeResult<Arc<PrimeMeridian>> {
    let (longitude, unit) = read_measure(field(value, "longitude")?, PredefinedUnit::Degree)?;
    Ok(Arc::new(PrimeMeridian {
        meta: read_meta(value)?,
        longitude,
        unit,
    }))
}

fn read_datum(value: &Value) -> NativeResult<Arc<Datum>> {
    let meta = read_meta(value)?;
    let anchor = value.get("anchor").and_then(Value::as_str).map(str::to_string);
    let kind = match str_field(value, "type")? {
        "GeodeticReferenceFrame" | "DatumEnsemble" => {
            let prime_meridian = match value.get("prime_meridian") {
                Some(pm) => read_meridian(pm)?,
                None => Arc::new(PrimeMeridian {
                    meta: Metadata::named("Greenwich").with_id("EPSG", 8901),
                    longitude: 0.0,
                    unit: PredefinedUnit::Degree.unit(),
                }),
            };
            DatumKind::GeodeticReferenceFrame {
                ellipsoid: read_ellipsoid(field(value, "ellipsoid")?)?,
                prime_meridian,
            }
        }
        "VerticalReferenceFrame" => DatumKind::VerticalReferenceFrame,
        "TemporalDatum" => DatumKind::TemporalDatum {
            origin: value
                .get("time_origin")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        },
        _ => DatumKind::EngineeringDatum,
    };
    Ok(Arc::new(Datum { meta, anchor, kind }))
}

fn read_axis(value: &Value) -> NativeResult<Arc<Axis>> {
    let direction_text = str_field(value, "direction")?;
    let direction = AxisDirection::parse(direction_text).ok_or_else(|| {
        NativeError::Parse(format!("Unknown axis direction \"{direction_text}\""))
    })?;
    let unit = match value.get("unit") {
        Some(unit) => read_unit(unit, UnitKind::None)?,
        None => PredefinedUnit::Metre.unit(),
    };
    let mut axis = Axis::new(
        value.get("name").and_then(Value::as_str).unwrap_or_default(),
        value
            .get("abbreviation")
            .and_then(Value::as_str)
            .unwrap_or_default(),
        direction,
        unit,
    );
    axis.minimum = value.get("minimum_value").and_then(Value::as_f64);
    axis.maximum = value.get("maximum_value").and_then(Value::as_f64);
    Ok(Arc::new(axis))
}

fn read_cs(value: &Value) -> NativeResult<Arc<CoordinateSystem>> {
    let subtype = str_field(value, "subtype")?;
    let kind = CsKind::parse(subtype)
        .ok_or_else(|| NativeError::Parse(format!("Unknown coordinate system \"{subtype}\"")))?;
    let axes = match field(value, "axis")? {
        Value::Array(items) => items.iter().map(read_axis).collect::<NativeResult<Vec<_>>>()?,
        _ => return Err(NativeError::Parse("\"axis\" must be an array".into())),
    };
    let mut cs = CoordinateSystem::new(kind, axes);
    cs.meta = read_meta(value)?;
    Ok(Arc::new(cs))
}

fn read_crs(value: &Value, implied: Option<&str>) -> NativeResult<Arc<Crs>> {
    let meta = read_meta(value)?;
    let kind_name = value
        .get("type")
        .and_then(Value::as_str)
        .or(implied)
        .ok_or_else(|| NativeError::Parse("Missing \"type\" member".into()))?;
    let kind = match kind_name {
        "ProjectedCRS" => CrsKind::Projected {
            base: read_crs(field(value, "base_crs")?, Some("GeodeticCRS"))?,
            conversion: Arc::new(read_operation(field(value, "conversion")?)?),
            cs: read_cs(field(value, "coordinate_system")?)?,
        },
        "CompoundCRS" => {
            let components = match field(value, "components")? {
                Value::Array(items) => items
                    .iter()
                    .map(|c| read_crs(c, None))
                    .collect::<NativeResult<Vec<_>>>()?,
                _ => return Err(NativeError::Parse("\"components\" must be an array".into())),
            };
            CrsKind::Compound { components }
        }
        other => {
            let datum_value = value
                .get("datum")
                .or_else(|| value.get("datum_ensemble"))
                .ok_or_else(|| NativeError::Parse("Missing \"datum\" member".into()))?;
            let datum = if datum_value.get("type").is_some() {
                read_datum(datum_value)?
            } else {
                let mut typed = datum_value.clone();
                if let Value::Object(map) = &mut typed {
                    let implied_datum = match other {
                        "VerticalCRS" => "VerticalReferenceFrame",
                        "TemporalCRS" => "TemporalDatum",
                        "EngineeringCRS" => "EngineeringDatum",
                        _ => "GeodeticReferenceFrame",
                    };
                    map.insert("type".into(), json!(implied_datum));
                }
                read_datum(&typed)?
            };
            let cs = read_cs(field(value, "coordinate_system")?)?;
            match other {
                "GeographicCRS" => CrsKind::Geographic { datum, cs },
                "GeodeticCRS" if cs.kind == CsKind::Ellipsoidal => {
                    CrsKind::Geographic { datum, cs }
                }
                "GeodeticCRS" => CrsKind::Geodetic { datum, cs },
                "VerticalCRS" => CrsKind::Vertical { datum, cs },
                "TemporalCRS" => CrsKind::Temporal { datum, cs },
                "EngineeringCRS" => CrsKind::Engineering { datum, cs },
                unknown => {
                    return Err(NativeError::Parse(format!("Unsupported CRS type {unknown}")));
                }
            }
        }
    };
    Ok(Arc::new(Crs::new(meta, kind)))
}

fn read_method(value: &Value) -> NativeResult<(Arc<OperationMethod>, bool)> {
    let raw = str_field(value, "name")?;
    let (name, inverted) = match raw.strip_prefix("Inverse of ") {
        Some(rest) => (rest, true),
        None => (raw, false),
    };
    let mut meta = Metadata::named(name);
    let mut formula = MethodFormula::from_name(name);
    if let Some(id) = value.get("id") {
        let mut id = read_id(id)?;
        if let Some(inner) = id
            .code_space
            .strip_prefix("INVERSE(")
            .and_then(|a| a.strip_suffix(')'))
        {
            id.code_space = inner.to_string();
        }
        if let Ok(code) = id.code.parse::<u32>() {
            let by_code = MethodFormula::from_epsg(code);
            if by_code != MethodFormula::Unknown {
                formula = by_code;
            }
        }
        meta.identifiers.push(Arc::new(id));
    }
    Ok((Arc::new(OperationMethod::new(meta, formula)), inverted))
}

fn read_parameter(value: &Value) -> NativeResult<ParameterValue> {
    let name = str_field(value, "name")?.to_string();
    let code = match value.get("id") {
        Some(id) => read_id(id)?.code.parse().ok(),
        None => parameter_code(&name),
    };
    let unit = match value.get("unit") {
        Some(unit) => read_unit(unit, UnitKind::None)?,
        None => code.map_or_else(|| PredefinedUnit::Metre.unit(), parameter_default_unit),
    };
    Ok(ParameterValue {
        name,
        code,
        value: f64_field(value, "value")?,
        unit,
    })
}

fn read_operation(value: &Value) -> NativeResult<CoordinateOperation> {
    let meta = read_meta(value)?;
    let source = value
        .get("source_crs")
        .map(|v| read_crs(v, None))
        .transpose()?;
    let target = value
        .get("target_crs")
        .map(|v| read_crs(v, None))
        .transpose()?;
    let kind_name = value.get("type").and_then(Value::as_str).unwrap_or("Conversion");
    let kind = if kind_name == "ConcatenatedOperation" {
        let steps = match field(value, "steps")? {
            Value::Array(items) => items
                .iter()
                .map(|s| read_operation(s).map(Arc::new))
                .collect::<NativeResult<Vec<_>>>()?,
            _ => return Err(NativeError::Parse("\"steps\" must be an array".into())),
        };
        OperationKind::Concatenated(steps)
    } else {
        let (method, inverted) = read_method(field(value, "method")?)?;
        let parameters = match value.get("parameters") {
            Some(Value::Array(items)) => items
                .iter()
                .map(read_parameter)
                .collect::<NativeResult<Vec<_>>>()?,
            _ => Vec::new(),
        };
        let single = SingleOperation {
            parameters: canonical_parameters(method.formula, parameters),
            method,
            inverted,
        };
        if kind_name == "Transformation" {
            OperationKind::Transformation(single)
        } else {
            OperationKind::Conversion(single)
        }
    };
    let accuracy = match value.get("accuracy") {
        Some(Value::String(s)) => s.parse().ok(),
        Some(other) => other.as_f64(),
        None if matches!(kind, OperationKind::Conversion(_)) => Some(0.0),
        None => None,
    };
    Ok(CoordinateOperation {
        meta,
        kind,
        source,
        target,
        accuracy,
        version: value
            .get("operation_version")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::wkt;

    const ED50: &str = r#"GEOGCRS["ED50",
        DATUM["European Datum 1950",ELLIPSOID["International 1924",6378388,297,LENGTHUNIT["metre",1]]],
        PRIMEM["Greenwich",0,ANGLEUNIT["degree",0.0174532925199433]],
        CS[ellipsoidal,2],
            AXIS["geodetic latitude (Lat)",north,ORDER[1],ANGLEUNIT["degree",0.0174532925199433]],
            AXIS["geodetic longitude (Lon)",east,ORDER[2],ANGLEUNIT["degree",0.0174532925199433]],
        USAGE[SCOPE["Geodesy."],BBOX[25.71,-16.1,84.73,48.61]],
        ID["EPSG",4230]]"#;

    #[test]
    fn json_output_carries_schema_and_reads_back_equal() {
        let (object, _) = wkt::read(ED50, true).expect("wkt");
        let text = write(&object, false, 0).expect("json");
        assert!(text.starts_with(&format!("{{\"$schema\":\"{SCHEMA}\",\"type\":\"GeographicCRS\"")));
        let back = read(&text).expect("read");
        let a = object.as_any().downcast_ref::<Crs>().expect("crs");
        let b = back.as_any().downcast_ref::<Crs>().expect("crs");
        assert_eq!(a, b);
    }

    #[test]
    fn pretty_output_uses_requested_indentation() {
        let (object, _) = wkt::read(
            r#"ELLIPSOID["GRS 1980",6378137,298.257222101,LENGTHUNIT["metre",1]]"#,
            true,
        )
        .expect("wkt");
        let text = write(&object, true, 2).expect("json");
        assert!(text.contains("\n  \"type\": \"Ellipsoid\""));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(read("{\"type\":"), Err(NativeError::Parse(_))));
        assert!(matches!(
            read(r#"{"type":"Spaceship"}"#),
            Err(NativeError::Parse(_))
        ));
    }
}
