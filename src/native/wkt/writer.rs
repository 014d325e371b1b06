//! Native objects to WKT text.

use std::sync::Arc;

use super::tree::{WktNode, format_number};
use super::{esri_datum_name, esri_name, gdal_datum_name};
use crate::native::object::{
    Axis, AxisDirection, BaseObject, CoordinateSystem, Crs, CrsKind, CsKind, Datum, DatumKind,
    Ellipsoid, Identifier, Metadata, NativeRef, PrimeMeridian, UnitKind, UnitOfMeasure,
};
use crate::native::operation::{
    CoordinateOperation, FALSE_EASTING, FALSE_NORTHING, LATITUDE_OF_NATURAL_ORIGIN,
    LONGITUDE_OF_NATURAL_ORIGIN, MethodFormula, OperationKind, OperationMethod, ParameterValue,
    SCALE_FACTOR_AT_NATURAL_ORIGIN, SingleOperation,
};
use crate::native::{NativeError, NativeResult};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WktVersion {
    Wkt2_2019,
    Wkt2_2015,
    Wkt1Gdal,
    Wkt1Esri,
}

#[derive(Clone, Copy, Debug)]
pub struct WktStyle {
    pub version: WktVersion,
    pub simplified: bool,
    pub multiline: bool,
    pub indentation: usize,
    /// Refuse objects that would produce invalid text, such as empty names.
    pub strict: bool,
}

impl Default for WktStyle {
    fn default() -> Self {
        Self {
            version: WktVersion::Wkt2_2019,
            simplified: false,
            multiline: true,
            indentation: 4,
            strict: true,
        }
    }
}

pub fn write(object: &NativeRef, style: &WktStyle) -> NativeResult<String> {
    let writer = Writer { style: *style };
    let any = object.as_any();
    let node = if let Some(crs) = any.downcast_ref::<Crs>() {
        writer.crs(crs, true)?
    } else if let Some(op) = any.downcast_ref::<CoordinateOperation>() {
        writer.operation(op, true)?
    } else if let Some(datum) = any.downcast_ref::<Datum>() {
        writer.datum(datum, true)?
    } else if let Some(ellipsoid) = any.downcast_ref::<Ellipsoid>() {
        writer.ellipsoid(ellipsoid, true)?
    } else if let Some(pm) = any.downcast_ref::<PrimeMeridian>() {
        writer.prime_meridian(pm, true)?
    } else if let Some(unit) = any.downcast_ref::<UnitOfMeasure>() {
        writer.unit(unit, true)
    } else if let Some(method) = any.downcast_ref::<OperationMethod>() {
        writer.require_wkt2("operation methods")?;
        writer.method(method, false, true)?
    } else {
        return Err(NativeError::NotExportable(format!(
            "Object type {:?} cannot be exported as WKT",
            object.capabilities()
        )));
    };
    Ok(node.render(style.multiline, style.indentation))
}

struct Writer {
    style: WktStyle,
}

/// Parameter code, GDAL name, ESRI name.
type Wkt1Parameters = &'static [(u32, &'static str, &'static str)];

const TM_PARAMETERS: Wkt1Parameters = &[
    (LATITUDE_OF_NATURAL_ORIGIN, "latitude_of_origin", "Latitude_Of_Origin"),
    (LONGITUDE_OF_NATURAL_ORIGIN, "central_meridian", "Central_Meridian"),
    (SCALE_FACTOR_AT_NATURAL_ORIGIN, "scale_factor", "Scale_Factor"),
    (FALSE_EASTING, "false_easting", "False_Easting"),
    (FALSE_NORTHING, "false_northing", "False_Northing"),
];

const GDAL_MERCATOR_PARAMETERS: Wkt1Parameters = &[
    (LONGITUDE_OF_NATURAL_ORIGIN, "central_meridian", ""),
    (SCALE_FACTOR_AT_NATURAL_ORIGIN, "scale_factor", ""),
    (FALSE_EASTING, "false_easting", ""),
    (FALSE_NORTHING, "false_northing", ""),
];

const ESRI_AUXILIARY_SPHERE_PARAMETERS: Wkt1Parameters = &[
    (FALSE_EASTING, "", "False_Easting"),
    (FALSE_NORTHING, "", "False_Northing"),
    (LONGITUDE_OF_NATURAL_ORIGIN, "", "Central_Meridian"),
];

impl Writer {
    fn wkt2(&self) -> bool {
        matches!(
            self.style.version,
            WktVersion::Wkt2_2019 | WktVersion::Wkt2_2015
        )
    }

    fn esri(&self) -> bool {
        self.style.version == WktVersion::Wkt1Esri
    }

    fn v2019(&self) -> bool {
        self.style.version == WktVersion::Wkt2_2019
    }

    fn require_wkt2(&self, what: &str) -> NativeResult<()> {
        if self.wkt2() {
            Ok(())
        } else {
            Err(NativeError::NotExportable(format!(
                "WKT1 cannot express {what}"
            )))
        }
    }

    fn name<'a>(&self, meta: &'a Metadata, what: &str) -> NativeResult<&'a str> {
        if self.style.strict && meta.name.trim().is_empty() {
            return Err(NativeError::NotExportable(format!(
                "{what} has no name; strict WKT output requires one"
            )));
        }
        Ok(&meta.name)
    }

    fn num(&self, node: WktNode, value: f64) -> WktNode {
        if self.esri() {
            let mut text = format_number(value);
            if !text.contains('.') && !text.contains('e') {
                text.push_str(".0");
            }
            node.word(text)
        } else {
            node.number(value)
        }
    }

    fn id(&self, id: &Identifier) -> WktNode {
        if self.wkt2() {
            let node = WktNode::new("ID").text(&id.code_space);
            match id.code.parse::<u64>() {
                Ok(code) => node.number(code as f64),
                Err(_) => node.text(&id.code),
            }
        } else {
            WktNode::new("AUTHORITY")
                .text(&id.code_space)
                .text(&id.code)
        }
    }

    /// Identifier, usage and remarks, in the order the grammar expects.
    fn finish(&self, node: &mut WktNode, meta: &Metadata, root: bool, with_id: bool) {
        if self.esri() {
            return;
        }
        if self.wkt2() && root && (meta.scope.is_some() || meta.area.is_some()) {
            let scope = WktNode::new("SCOPE").text(meta.scope.as_deref().unwrap_or("unknown"));
            let bbox = meta.area.map(|a| {
                WktNode::new("BBOX")
                    .number(a.south)
                    .number(a.west)
                    .number(a.north)
                    .number(a.east)
            });
            if self.v2019() {
                let mut usage = WktNode::new("USAGE").child(scope);
                usage.push_opt(bbox);
                node.push(usage);
            } else {
                node.push(scope);
                node.push_opt(bbox);
            }
        }
        let with_id = with_id && (root || !self.style.simplified || !self.wkt2());
        if with_id && let Some(id) = meta.first_identifier() {
            node.push(self.id(id));
        }
        if self.wkt2() && root && let Some(remark) = &meta.remarks {
            node.push(WktNode::new("REMARK").text(remark));
        }
    }

    fn unit_keyword(&self, kind: UnitKind) -> &'static str {
        if !self.wkt2() || self.style.simplified {
            return "UNIT";
        }
        match kind {
            UnitKind::Angular => "ANGLEUNIT",
            UnitKind::Linear => "LENGTHUNIT",
            UnitKind::Scale => "SCALEUNIT",
            UnitKind::Time => "TIMEUNIT",
            UnitKind::None => "UNIT",
        }
    }

    fn unit(&self, unit: &UnitOfMeasure, with_id: bool) -> WktNode {
        let name = if self.esri() {
            match unit.name.as_str() {
                "metre" => "Meter".to_string(),
                "degree" => "Degree".to_string(),
                other => esri_name(other),
            }
        } else {
            unit.name.clone()
        };
        let node = WktNode::new(self.unit_keyword(unit.kind)).text(name);
        let mut node = self.num(node, unit.to_si);
        let gdal_id = !self.wkt2() && !self.esri();
        if (with_id || gdal_id)
            && let Some((authority, code)) = &unit.code
        {
            node.push(self.id(&Identifier::new(authority, code.clone())));
        }
        node
    }

    fn ellipsoid(&self, ellipsoid: &Ellipsoid, root: bool) -> NativeResult<WktNode> {
        let name = self.name(&ellipsoid.meta, "Ellipsoid")?;
        let (keyword, name) = match self.style.version {
            WktVersion::Wkt1Esri => ("SPHEROID", esri_name(name)),
            WktVersion::Wkt1Gdal => ("SPHEROID", name.to_string()),
            _ => ("ELLIPSOID", name.to_string()),
        };
        let node = WktNode::new(keyword).text(name);
        let node = self.num(node, ellipsoid.semi_major);
        let mut node = self.num(node, ellipsoid.inverse_flattening());
        if self.wkt2() && !(self.style.simplified && ellipsoid.unit.to_si == 1.0) {
            node.push(self.unit(&ellipsoid.unit, false));
        }
        self.finish(&mut node, &ellipsoid.meta, root, root || !self.wkt2());
        Ok(node)
    }

    fn prime_meridian(&self, pm: &PrimeMeridian, root: bool) -> NativeResult<WktNode> {
        let name = self.name(&pm.meta, "Prime meridian")?;
        let node = WktNode::new("PRIMEM").text(name);
        let mut node = self.num(node, pm.longitude);
        if self.wkt2() && !(self.style.simplified && pm.unit.name == "degree") {
            node.push(self.unit(&pm.unit, false));
        }
        self.finish(&mut node, &pm.meta, root, root || !self.wkt2());
        Ok(node)
    }

    fn datum(&self, datum: &Datum, root: bool) -> NativeResult<WktNode> {
        let name = self.name(&datum.meta, "Datum")?;
        let mut node = match &datum.kind {
            DatumKind::GeodeticReferenceFrame { ellipsoid, .. } => {
                let name = match self.style.version {
                    WktVersion::Wkt1Gdal => gdal_datum_name(name),
                    WktVersion::Wkt1Esri => esri_datum_name(name),
                    _ => name.to_string(),
                };
                WktNode::new("DATUM")
                    .text(name)
                    .child(self.ellipsoid(ellipsoid, false)?)
            }
            DatumKind::VerticalReferenceFrame => match self.style.version {
                WktVersion::Wkt1Gdal => WktNode::new("VERT_DATUM")
                    .text(gdal_datum_name(name))
                    .number(2005.0),
                WktVersion::Wkt1Esri => WktNode::new("VDATUM").text(esri_datum_name(name)),
                _ => WktNode::new("VDATUM").text(name),
            },
            DatumKind::TemporalDatum { origin } => {
                self.require_wkt2("temporal datums")?;
                let mut node = WktNode::new("TDATUM").text(name);
                if self.v2019() {
                    node.push(WktNode::new("CALENDAR").text("proleptic Gregorian"));
                }
                node.child(WktNode::new("TIMEORIGIN").text(origin))
            }
            DatumKind::EngineeringDatum => match self.style.version {
                WktVersion::Wkt1Gdal => WktNode::new("LOCAL_DATUM").text(name).number(32767.0),
                WktVersion::Wkt1Esri => {
                    return Err(NativeError::NotExportable(
                        "ESRI WKT cannot express engineering datums".to_string(),
                    ));
                }
                _ => WktNode::new("EDATUM").text(name),
            },
        };
        if self.wkt2()
            && let Some(anchor) = &datum.anchor
        {
            node.push(WktNode::new("ANCHOR").text(anchor));
        }
        self.finish(&mut node, &datum.meta, root, root || !self.wkt2());
        Ok(node)
    }

    fn axis(&self, axis: &Axis, order: usize, with_unit: bool) -> WktNode {
        let label = match (axis.meta.name.is_empty(), axis.abbreviation.is_empty()) {
            (false, false) => format!("{} ({})", axis.meta.name, axis.abbreviation),
            (true, false) => format!("({})", axis.abbreviation),
            _ => axis.meta.name.clone(),
        };
        let mut node = WktNode::new("AXIS")
            .text(label)
            .word(axis.direction.as_str());
        if !self.style.simplified {
            node.push(WktNode::new("ORDER").number(order as f64));
        }
        if with_unit {
            node.push(self.unit(&axis.unit, false));
        }
        if self.v2019() {
            if let Some(min) = axis.minimum {
                node.push(WktNode::new("AXISMINVALUE").number(min));
            }
            if let Some(max) = axis.maximum {
                node.push(WktNode::new("AXISMAXVALUE").number(max));
            }
        }
        node
    }

    /// Appends `CS[...]` and the axes to a WKT2 CRS node.
    fn coordinate_system(&self, node: &mut WktNode, cs: &CoordinateSystem) {
        node.push(
            WktNode::new("CS")
                .word(cs.kind.as_str())
                .number(cs.dimension() as f64),
        );
        let shared_unit = cs
            .axes
            .first()
            .filter(|first| cs.axes.iter().all(|a| a.unit == first.unit))
            .map(|first| Arc::clone(&first.unit));
        let per_axis = !(self.style.simplified && shared_unit.is_some());
        for (i, axis) in cs.axes.iter().enumerate() {
            node.push(self.axis(axis, i + 1, per_axis));
        }
        if !per_axis && let Some(unit) = shared_unit {
            node.push(self.unit(&unit, false));
        }
    }

    fn crs(&self, crs: &Crs, root: bool) -> NativeResult<WktNode> {
        if !self.wkt2() {
            return self.wkt1_crs(crs, root);
        }
        let name = self.name(&crs.meta, "CRS")?;
        let mut node = match &crs.kind {
            CrsKind::Geographic { datum, cs } | CrsKind::Geodetic { datum, cs } => {
                let keyword = if crs.is_geographic() && self.v2019() {
                    "GEOGCRS"
                } else {
                    "GEODCRS"
                };
                let mut node = WktNode::new(keyword)
                    .text(name)
                    .child(self.datum(datum, false)?);
                if let Some(pm) = datum.prime_meridian() {
                    node.push(self.prime_meridian(pm, false)?);
                }
                self.coordinate_system(&mut node, cs);
                node
            }
            CrsKind::Projected {
                base,
                conversion,
                cs,
            } => {
                let mut node = WktNode::new("PROJCRS")
                    .text(name)
                    .child(self.base_crs(base)?)
                    .child(self.operation(conversion, false)?);
                self.coordinate_system(&mut node, cs);
                node
            }
            CrsKind::Vertical { datum, cs }
            | CrsKind::Temporal { datum, cs }
            | CrsKind::Engineering { datum, cs } => {
                let keyword = match crs.kind {
                    CrsKind::Vertical { .. } => "VERTCRS",
                    CrsKind::Temporal { .. } => "TIMECRS",
                    _ => "ENGCRS",
                };
                let mut node = WktNode::new(keyword)
                    .text(name)
                    .child(self.datum(datum, false)?);
                self.coordinate_system(&mut node, cs);
                node
            }
            CrsKind::Compound { components } => {
                let mut node = WktNode::new("COMPOUNDCRS").text(name);
                for component in components {
                    node.push(self.crs(component, false)?);
                }
                node
            }
        };
        self.finish(&mut node, &crs.meta, root, true);
        Ok(node)
    }

    /// Base of a projected CRS; the CS is written only when it is not latitude, longitude.
    fn base_crs(&self, base: &Crs) -> NativeResult<WktNode> {
        let (datum, cs) = match &base.kind {
            CrsKind::Geographic { datum, cs } | CrsKind::Geodetic { datum, cs } => (datum, cs),
            _ => {
                return Err(NativeError::NotExportable(
                    "Projected CRS base must be geodetic".to_string(),
                ));
            }
        };
        let keyword = if base.is_geographic() && self.v2019() {
            "BASEGEOGCRS"
        } else {
            "BASEGEODCRS"
        };
        let name = self.name(&base.meta, "Base CRS")?;
        let mut node = WktNode::new(keyword)
            .text(name)
            .child(self.datum(datum, false)?);
        if let Some(pm) = datum.prime_meridian() {
            node.push(self.prime_meridian(pm, false)?);
        }
        let default_order = cs.kind == CsKind::Ellipsoidal
            && cs.dimension() == 2
            && cs.is_northing_first()
            && cs.axes.iter().all(|a| a.unit.name == "degree");
        if !default_order {
            self.coordinate_system(&mut node, cs);
        }
        self.finish(&mut node, &base.meta, false, true);
        Ok(node)
    }

    fn method(&self, method: &OperationMethod, inverted: bool, root: bool) -> NativeResult<WktNode> {
        let name = self.name(&method.meta, "Operation method")?;
        let name = if inverted {
            format!("Inverse of {name}")
        } else {
            name.to_string()
        };
        let mut node = WktNode::new("METHOD").text(name);
        if let Some(id) = method.meta.first_identifier()
            && (root || !self.style.simplified)
        {
            let id = if inverted {
                Identifier::new(&format!("INVERSE({})", id.code_space), id.code.clone())
            } else {
                (**id).clone()
            };
            node.push(self.id(&id));
        }
        Ok(node)
    }

    fn parameter(&self, param: &ParameterValue) -> WktNode {
        let mut node = WktNode::new("PARAMETER")
            .text(&param.name)
            .number(param.value);
        node.push(self.unit(&param.unit, false));
        if let Some(code) = param.code
            && !self.style.simplified
        {
            node.push(self.id(&Identifier::new("EPSG", code.to_string())));
        }
        node
    }

    fn single(&self, node: &mut WktNode, single: &SingleOperation) -> NativeResult<()> {
        node.push(self.method(&single.method, single.inverted, false)?);
        for param in &single.parameters {
            node.push(self.parameter(param));
        }
        Ok(())
    }

    fn wrapped(&self, keyword: &str, crs: &Crs) -> NativeResult<WktNode> {
        Ok(WktNode::new(keyword).child(self.crs(crs, false)?))
    }

    fn operation(&self, op: &CoordinateOperation, root: bool) -> NativeResult<WktNode> {
        self.require_wkt2("coordinate operations")?;
        let name = self.name(&op.meta, "Coordinate operation")?;
        let keyword = match op.kind {
            OperationKind::Conversion(_) => "CONVERSION",
            OperationKind::Transformation(_) => "COORDINATEOPERATION",
            OperationKind::Concatenated(_) => {
                if !self.v2019() {
                    return Err(NativeError::NotExportable(
                        "WKT2:2015 cannot express concatenated operations".to_string(),
                    ));
                }
                "CONCATENATEDOPERATION"
            }
        };
        let mut node = WktNode::new(keyword).text(name);
        if let Some(version) = &op.version {
            node.push(WktNode::new("VERSION").text(version));
        }
        if let Some(source) = &op.source {
            node.push(self.wrapped("SOURCECRS", source)?);
        }
        if let Some(target) = &op.target {
            node.push(self.wrapped("TARGETCRS", target)?);
        }
        match &op.kind {
            OperationKind::Conversion(single) | OperationKind::Transformation(single) => {
                self.single(&mut node, single)?;
            }
            OperationKind::Concatenated(steps) => {
                for step in steps {
                    node.push(WktNode::new("STEP").child(self.operation(step, false)?));
                }
            }
        }
        if let (false, Some(accuracy)) = (matches!(op.kind, OperationKind::Conversion(_)), op.accuracy)
        {
            node.push(WktNode::new("OPERATIONACCURACY").number(accuracy));
        }
        self.finish(&mut node, &op.meta, root, true);
        Ok(node)
    }

    fn wkt1_axis(&self, axis: &Axis) -> WktNode {
        let name = match axis.direction {
            AxisDirection::North | AxisDirection::South if axis.unit.kind == UnitKind::Angular => {
                "Latitude"
            }
            AxisDirection::East | AxisDirection::West if axis.unit.kind == UnitKind::Angular => {
                "Longitude"
            }
            AxisDirection::East | AxisDirection::West => "Easting",
            AxisDirection::North | AxisDirection::South => "Northing",
            AxisDirection::Up | AxisDirection::Down => "Gravity-related height",
            AxisDirection::GeocentricX => "Geocentric X",
            AxisDirection::GeocentricY => "Geocentric Y",
            AxisDirection::GeocentricZ => "Geocentric Z",
            _ => axis.meta.name.as_str(),
        };
        let direction = match axis.direction {
            AxisDirection::GeocentricX | AxisDirection::GeocentricY => "OTHER".to_string(),
            AxisDirection::GeocentricZ => "NORTH".to_string(),
            other => other.as_str().to_ascii_uppercase(),
        };
        WktNode::new("AXIS").text(name).word(direction)
    }

    fn wkt1_tail(&self, node: &mut WktNode, cs: &CoordinateSystem) {
        if let Some(first) = cs.axes.first() {
            node.push(self.unit(&first.unit, false));
        }
        if !self.esri() {
            for axis in &cs.axes {
                node.push(self.wkt1_axis(axis));
            }
        }
    }

    fn wkt1_geodetic_body(&self, keyword: &str, name: String, datum: &Datum) -> NativeResult<WktNode> {
        let mut node = WktNode::new(keyword)
            .text(name)
            .child(self.datum(datum, false)?);
        if let Some(pm) = datum.prime_meridian() {
            node.push(self.prime_meridian(pm, false)?);
        }
        Ok(node)
    }

    fn wkt1_crs(&self, crs: &Crs, root: bool) -> NativeResult<WktNode> {
        let name = self.name(&crs.meta, "CRS")?;
        let esri_only = |what: &str| {
            NativeError::NotExportable(format!("ESRI WKT cannot express {what}"))
        };
        let mut node = match &crs.kind {
            CrsKind::Geographic { datum, cs } => {
                let name = if self.esri() {
                    format!("GCS_{}", esri_name(name))
                } else {
                    name.to_string()
                };
                let mut node = self.wkt1_geodetic_body("GEOGCS", name, datum)?;
                self.wkt1_tail(&mut node, cs);
                node
            }
            CrsKind::Geodetic { datum, cs } => {
                if self.esri() {
                    return Err(esri_only("geocentric CRSs"));
                }
                if !crs.is_geocentric() {
                    return Err(NativeError::NotExportable(
                        "WKT1 cannot express non-geocentric geodetic CRSs".to_string(),
                    ));
                }
                let mut node = self.wkt1_geodetic_body("GEOCCS", name.to_string(), datum)?;
                self.wkt1_tail(&mut node, cs);
                node
            }
            CrsKind::Projected {
                base,
                conversion,
                cs,
            } => {
                let name = if self.esri() {
                    esri_name(name)
                } else {
                    name.to_string()
                };
                let mut node = WktNode::new("PROJCS")
                    .text(name)
                    .child(self.wkt1_crs(base, false)?);
                let single = conversion.single().ok_or_else(|| {
                    NativeError::NotExportable("Projection must be a single conversion".to_string())
                })?;
                let pseudo_mercator = single.method.formula == MethodFormula::PseudoMercator;
                self.wkt1_projection(&mut node, single)?;
                if let Some(first) = cs.axes.first() {
                    node.push(self.unit(&first.unit, false));
                }
                if !self.esri() {
                    for axis in &cs.axes {
                        node.push(self.wkt1_axis(axis));
                    }
                    if pseudo_mercator {
                        node.push(
                            WktNode::new("EXTENSION").text("PROJ4").text(
                                "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m +nadgrids=@null +wktext +no_defs",
                            ),
                        );
                    }
                }
                node
            }
            CrsKind::Vertical { datum, cs } => {
                let mut node = if self.esri() {
                    WktNode::new("VERTCS")
                        .text(esri_name(name))
                        .child(self.datum(datum, false)?)
                        .child(self.num(WktNode::new("PARAMETER").text("Vertical_Shift"), 0.0))
                        .child(self.num(WktNode::new("PARAMETER").text("Direction"), 1.0))
                } else {
                    WktNode::new("VERT_CS")
                        .text(name)
                        .child(self.datum(datum, false)?)
                };
                self.wkt1_tail(&mut node, cs);
                node
            }
            CrsKind::Engineering { datum, cs } => {
                if self.esri() {
                    return Err(esri_only("engineering CRSs"));
                }
                let mut node = WktNode::new("LOCAL_CS")
                    .text(name)
                    .child(self.datum(datum, false)?);
                self.wkt1_tail(&mut node, cs);
                node
            }
            CrsKind::Temporal { .. } => {
                return Err(NativeError::NotExportable(
                    "WKT1 cannot express temporal CRSs".to_string(),
                ));
            }
            CrsKind::Compound { components } => {
                if self.esri() {
                    return Err(esri_only("compound CRSs"));
                }
                let mut node = WktNode::new("COMPD_CS").text(name);
                for component in components {
                    node.push(self.wkt1_crs(component, false)?);
                }
                node
            }
        };
        self.finish(&mut node, &crs.meta, root, true);
        Ok(node)
    }

    fn wkt1_projection(&self, node: &mut WktNode, single: &SingleOperation) -> NativeResult<()> {
        if single.inverted {
            return Err(NativeError::NotExportable(
                "WKT1 cannot express inverse projections".to_string(),
            ));
        }
        let esri = self.esri();
        let (projection, names) = match single.method.formula {
            MethodFormula::TransverseMercator => ("Transverse_Mercator", TM_PARAMETERS),
            MethodFormula::PseudoMercator if esri => {
                ("Mercator_Auxiliary_Sphere", ESRI_AUXILIARY_SPHERE_PARAMETERS)
            }
            MethodFormula::PseudoMercator => ("Mercator_1SP", GDAL_MERCATOR_PARAMETERS),
            _ => {
                node.push(WktNode::new("PROJECTION").text(esri_name(&single.method.meta.name)));
                for param in &single.parameters {
                    let name = esri_name(&param.name);
                    let param_node = WktNode::new("PARAMETER").text(name);
                    node.push(self.num(param_node, param.value));
                }
                return Ok(());
            }
        };
        let mut projection_node = WktNode::new("PROJECTION").text(projection);
        if !esri && let Some(id) = single.method.meta.first_identifier() {
            projection_node.push(self.id(id));
        }
        node.push(projection_node);
        for &(code, gdal, esri_label) in names {
            let value = match single.parameter(code) {
                Some(param) => param.value,
                None if code == SCALE_FACTOR_AT_NATURAL_ORIGIN => 1.0,
                None => 0.0,
            };
            let label = if esri { esri_label } else { gdal };
            node.push(self.num(WktNode::new("PARAMETER").text(label), value));
        }
        if esri && single.method.formula == MethodFormula::PseudoMercator {
            node.push(self.num(WktNode::new("PARAMETER").text("Standard_Parallel_1"), 0.0));
            node.push(self.num(WktNode::new("PARAMETER").text("Auxiliary_Sphere_Type"), 0.0));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::wkt::read;

    const UTM: &str = r#"PROJCRS["WGS 84 / UTM zone 31N",
        BASEGEOGCRS["WGS 84",
            DATUM["World Geodetic System 1984",ELLIPSOID["WGS 84",6378137,298.257223563]],
            PRIMEM["Greenwich",0,ANGLEUNIT["degree",0.0174532925199433]],
            ID["EPSG",4326]],
        CONVERSION["UTM zone 31N",
            METHOD["Transverse Mercator",ID["EPSG",9807]],
            PARAMETER["Longitude of natural origin",3,ANGLEUNIT["degree",0.0174532925199433],ID["EPSG",8802]],
            PARAMETER["Scale factor at natural origin",0.9996,SCALEUNIT["unity",1],ID["EPSG",8805]],
            PARAMETER["False easting",500000,LENGTHUNIT["metre",1],ID["EPSG",8806]]],
        CS[Cartesian,2],
            AXIS["(E)",east,ORDER[1],LENGTHUNIT["metre",1]],
            AXIS["(N)",north,ORDER[2],LENGTHUNIT["metre",1]],
        ID["EPSG",32631]]"#;

    fn style(version: WktVersion) -> WktStyle {
        WktStyle {
            version,
            multiline: false,
            ..WktStyle::default()
        }
    }

    #[test]
    fn wkt2_output_reads_back_identically() {
        let (object, _) = read(UTM, true).expect("read");
        let text = write(&object, &style(WktVersion::Wkt2_2019)).expect("write");
        assert!(text.starts_with(r#"PROJCRS["WGS 84 / UTM zone 31N",BASEGEOGCRS["WGS 84""#));
        assert!(text.ends_with(r#"ID["EPSG",32631]]"#));
        let (again, _) = read(&text, true).expect("re-read");
        let first = object.as_any().downcast_ref::<Crs>().expect("crs");
        let second = again.as_any().downcast_ref::<Crs>().expect("crs");
        assert_eq!(first, second);
    }

    #[test]
    fn wkt1_gdal_uses_legacy_keywords() {
        let (object, _) = read(UTM, true).expect("read");
        let text = write(&object, &style(WktVersion::Wkt1Gdal)).expect("write");
        assert!(text.starts_with(r#"PROJCS["WGS 84 / UTM zone 31N",GEOGCS["WGS 84",DATUM["WGS_1984""#));
        assert!(text.contains(r#"PROJECTION["Transverse_Mercator",AUTHORITY["EPSG","9807"]]"#));
        assert!(text.contains(r#"PARAMETER["central_meridian",3]"#));
        assert!(text.ends_with(r#"AUTHORITY["EPSG","32631"]]"#));
    }

    #[test]
    fn esri_output_has_no_authorities_and_decimal_numbers() {
        let (object, _) = read(UTM, true).expect("read");
        let text = write(&object, &style(WktVersion::Wkt1Esri)).expect("write");
        assert!(text.starts_with(r#"PROJCS["WGS_1984_UTM_Zone_31N",GEOGCS["GCS_WGS_1984""#));
        assert!(text.contains(r#"PARAMETER["False_Easting",500000.0]"#));
        assert!(!text.contains("AUTHORITY"));
    }

    #[test]
    fn strict_output_rejects_empty_names() {
        let text = r#"ELLIPSOID["",6378137,298.257223563,LENGTHUNIT["metre",1]]"#;
        let (object, _) = read(text, true).expect("read");
        let err = write(&object, &style(WktVersion::Wkt2_2019)).unwrap_err();
        assert!(matches!(err, NativeError::NotExportable(_)));
        let lenient = WktStyle {
            strict: false,
            ..style(WktVersion::Wkt2_2019)
        };
        assert!(write(&object, &lenient).is_ok());
    }

    #[test]
    fn multiline_output_indents_children() {
        let text = r#"ELLIPSOID["WGS 84",6378137,298.257223563,LENGTHUNIT["metre",1]]"#;
        let (object, _) = read(text, true).expect("read");
        let out = write(&object, &WktStyle::default()).expect("write");
        assert_eq!(
            out,
            "ELLIPSOID[\"WGS 84\",6378137,298.257223563,\n    LENGTHUNIT[\"metre\",1]]"
        );
    }
}
