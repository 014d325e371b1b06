//! Purpose: Compiled coordinate operations.
//! Exports: `Pipeline`, error number constants.
//! Role: Turns a `CoordinateOperation` with source and target CRSs into numeric kernels.
//! Invariants: Coordinates between kernels are normalised: longitude/latitude in radians,
//! heights and projected/geocentric coordinates in metres, east/north/up positive.
//! Invariants: A failing point is overwritten with infinities; the others are unaffected.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

use tracing::debug;

use super::context::NativeContext;
use super::object::{AxisDirection, Crs, CrsKind, Ellipsoid, UnitKind, UnitOfMeasure};
use super::operation::{
    CoordinateOperation, FALSE_EASTING, FALSE_NORTHING, LATITUDE_OF_NATURAL_ORIGIN,
    LONGITUDE_OF_NATURAL_ORIGIN, MethodFormula, OperationKind, SCALE_FACTOR_AT_NATURAL_ORIGIN,
    SingleOperation, X_AXIS_TRANSLATION, Y_AXIS_TRANSLATION, Z_AXIS_TRANSLATION,
};
use super::projstr::{ellipsoid_params, utm_zone};
use super::wkt::format_number;
use super::{NativeError, NativeResult};

pub const ERR_COORD_TRANSFM: i32 = 2048;
pub const ERR_INVALID_COORD: i32 = 2049;
pub const ERR_OUTSIDE_PROJECTION_DOMAIN: i32 = 2050;
pub const ERR_NO_OPERATION: i32 = 2051;
pub const ERR_OTHER: i32 = 4096;
pub const ERR_API_MISUSE: i32 = 4097;
pub const ERR_NO_INVERSE_OP: i32 = 4098;

const MAX_ORDINATES: usize = 4;
const LATITUDE_TOLERANCE: f64 = 1e-12;

#[derive(Clone, Copy, Debug)]
struct AxisMap {
    slot: usize,
    sign: f64,
    factor: f64,
}

/// How coordinates in one CRS map onto the normalised slots.
#[derive(Clone, Debug)]
struct Frame {
    axes: Vec<AxisMap>,
    geographic: bool,
    prime_meridian: f64,
    swapped: bool,
    angular: Option<&'static str>,
}

fn horizontal(crs: &Crs) -> &Crs {
    match &crs.kind {
        CrsKind::Compound { components } => components.first().map_or(crs, |c| horizontal(c)),
        _ => crs,
    }
}

fn angular_keyword(unit: &UnitOfMeasure) -> Option<&'static str> {
    let degree = std::f64::consts::PI / 180.0;
    if unit.kind != UnitKind::Angular || unit.to_si == 1.0 {
        None
    } else if (unit.to_si - degree).abs() < 1e-15 {
        Some("deg")
    } else if (unit.to_si - PI / 200.0).abs() < 1e-15 {
        Some("grad")
    } else {
        Some("rad")
    }
}

impl Frame {
    fn of(crs: &Crs) -> NativeResult<Self> {
        let mut axes = Vec::new();
        collect_axes(crs, &mut axes)?;
        let head = horizontal(crs);
        let geographic = head.is_geographic();
        let prime_meridian = if geographic {
            head.datum()
                .and_then(|d| d.prime_meridian())
                .map_or(0.0, |pm| pm.longitude * pm.unit.to_si)
        } else {
            0.0
        };
        let first = head.coordinate_system().and_then(|cs| cs.axes.first());
        Ok(Self {
            axes,
            geographic,
            prime_meridian,
            swapped: head
                .coordinate_system()
                .is_some_and(|cs| cs.is_northing_first()),
            angular: first
                .filter(|_| geographic)
                .and_then(|axis| angular_keyword(&axis.unit)),
        })
    }

    fn dimension(&self) -> usize {
        self.axes.len()
    }

    fn normalize(&self, point: &[f64], out: &mut [f64; MAX_ORDINATES]) -> Result<(), i32> {
        for (i, value) in point.iter().enumerate() {
            match self.axes.get(i) {
                Some(axis) => out[axis.slot] = value * axis.factor * axis.sign,
                None => out[i] = *value,
            }
        }
        if self.geographic {
            if out[1].abs() > FRAC_PI_2 + LATITUDE_TOLERANCE {
                return Err(ERR_INVALID_COORD);
            }
            out[0] += self.prime_meridian;
        }
        Ok(())
    }

    fn denormalize(&self, mut c: [f64; MAX_ORDINATES], point: &mut [f64]) {
        if self.geographic {
            c[0] = adjust_longitude(c[0] - self.prime_meridian);
        }
        for (i, value) in point.iter_mut().enumerate() {
            *value = match self.axes.get(i) {
                Some(axis) => c[axis.slot] * axis.sign / axis.factor,
                None => c[i],
            };
        }
    }

    /// PROJ steps taking user coordinates to the normalised form.
    fn entry_steps(&self) -> Vec<String> {
        let mut steps = Vec::new();
        if self.swapped {
            steps.push("+proj=axisswap +order=2,1".to_string());
        }
        if let Some(unit) = self.angular {
            steps.push(format!("+proj=unitconvert +xy_in={unit} +xy_out=rad"));
        }
        steps
    }

    /// PROJ steps taking normalised coordinates back to user form.
    fn exit_steps(&self) -> Vec<String> {
        let mut steps = Vec::new();
        if let Some(unit) = self.angular {
            steps.push(format!("+proj=unitconvert +xy_in=rad +xy_out={unit}"));
        }
        if self.swapped {
            steps.push("+proj=axisswap +order=2,1".to_string());
        }
        steps
    }
}

fn collect_axes(crs: &Crs, out: &mut Vec<AxisMap>) -> NativeResult<()> {
    if let CrsKind::Compound { components } = &crs.kind {
        for component in components {
            collect_axes(component, out)?;
        }
        return Ok(());
    }
    let cs = crs.coordinate_system().ok_or_else(|| {
        NativeError::InvalidArgument(format!("{} has no coordinate system", crs.meta.name))
    })?;
    for axis in &cs.axes {
        let position = out.len();
        let (slot, sign) = match axis.direction {
            AxisDirection::East | AxisDirection::GeocentricX => (0, 1.0),
            AxisDirection::West => (0, -1.0),
            AxisDirection::North | AxisDirection::GeocentricY => (1, 1.0),
            AxisDirection::South => (1, -1.0),
            AxisDirection::Up | AxisDirection::GeocentricZ => (2, 1.0),
            AxisDirection::Down => (2, -1.0),
            AxisDirection::Future => (3, 1.0),
            AxisDirection::Past => (3, -1.0),
            AxisDirection::Unspecified => (position.min(MAX_ORDINATES - 1), 1.0),
        };
        out.push(AxisMap {
            slot,
            sign,
            factor: axis.unit.to_si,
        });
    }
    Ok(())
}

fn adjust_longitude(lon: f64) -> f64 {
    if lon.abs() <= PI {
        return lon;
    }
    let wrapped = (lon + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped == -PI && lon > 0.0 { PI } else { wrapped }
}

/// Transverse Mercator series after Snyder (USGS PP 1395).
#[derive(Clone, Debug)]
struct TransverseMercator {
    a: f64,
    e2: f64,
    ep2: f64,
    k0: f64,
    lat0: f64,
    lon0: f64,
    x0: f64,
    y0: f64,
    m0: f64,
}

impl TransverseMercator {
    fn new(single: &SingleOperation, ellipsoid: &Ellipsoid) -> Self {
        let a = ellipsoid.semi_major_metre();
        let e2 = ellipsoid.eccentricity_squared();
        let lat0 = single.si(LATITUDE_OF_NATURAL_ORIGIN, 0.0);
        let mut tm = Self {
            a,
            e2,
            ep2: e2 / (1.0 - e2),
            k0: single.si(SCALE_FACTOR_AT_NATURAL_ORIGIN, 1.0),
            lat0,
            lon0: single.si(LONGITUDE_OF_NATURAL_ORIGIN, 0.0),
            x0: single.si(FALSE_EASTING, 0.0),
            y0: single.si(FALSE_NORTHING, 0.0),
            m0: 0.0,
        };
        tm.m0 = tm.meridian_arc(lat0);
        tm
    }

    fn meridian_arc(&self, phi: f64) -> f64 {
        let e2 = self.e2;
        let e4 = e2 * e2;
        let e6 = e4 * e2;
        self.a
            * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
                - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
                + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
                - (35.0 * e6 / 3072.0) * (6.0 * phi).sin())
    }

    fn forward(&self, c: &mut [f64; MAX_ORDINATES]) -> Result<(), i32> {
        let (lon, phi) = (c[0], c[1]);
        let dlon = adjust_longitude(lon - self.lon0);
        if dlon.abs() > FRAC_PI_2 {
            return Err(ERR_OUTSIDE_PROJECTION_DOMAIN);
        }
        let (sin, cos) = phi.sin_cos();
        let n = self.a / (1.0 - self.e2 * sin * sin).sqrt();
        let t = (sin / cos).powi(2);
        let cc = self.ep2 * cos * cos;
        let aa = dlon * cos;
        let m = self.meridian_arc(phi);
        let x = self.k0
            * n
            * (aa
                + (1.0 - t + cc) * aa.powi(3) / 6.0
                + (5.0 - 18.0 * t + t * t + 72.0 * cc - 58.0 * self.ep2) * aa.powi(5) / 120.0);
        let y = self.k0
            * (m - self.m0
                + n * (sin / cos)
                    * (aa * aa / 2.0
                        + (5.0 - t + 9.0 * cc + 4.0 * cc * cc) * aa.powi(4) / 24.0
                        + (61.0 - 58.0 * t + t * t + 600.0 * cc - 330.0 * self.ep2)
                            * aa.powi(6)
                            / 720.0));
        c[0] = x + self.x0;
        c[1] = y + self.y0;
        Ok(())
    }

    fn inverse(&self, c: &mut [f64; MAX_ORDINATES]) -> Result<(), i32> {
        let e2 = self.e2;
        let x = c[0] - self.x0;
        let m = self.m0 + (c[1] - self.y0) / self.k0;
        let mu = m / (self.a * (1.0 - e2 / 4.0 - 3.0 * e2 * e2 / 64.0 - 5.0 * e2.powi(3) / 256.0));
        let root = (1.0 - e2).sqrt();
        let e1 = (1.0 - root) / (1.0 + root);
        let phi1 = mu
            + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
            + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
            + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
            + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();
        if phi1.abs() >= FRAC_PI_2 {
            return Err(ERR_OUTSIDE_PROJECTION_DOMAIN);
        }
        let (sin1, cos1) = phi1.sin_cos();
        let tan1 = sin1 / cos1;
        let c1 = self.ep2 * cos1 * cos1;
        let t1 = tan1 * tan1;
        let w = 1.0 - e2 * sin1 * sin1;
        let n1 = self.a / w.sqrt();
        let r1 = self.a * (1.0 - e2) / w.powf(1.5);
        let d = x / (n1 * self.k0);
        let phi = phi1
            - (n1 * tan1 / r1)
                * (d * d / 2.0
                    - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * self.ep2) * d.powi(4)
                        / 24.0
                    + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1
                        - 252.0 * self.ep2
                        - 3.0 * c1 * c1)
                        * d.powi(6)
                        / 720.0);
        let lon = self.lon0
            + (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
                + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * self.ep2 + 24.0 * t1 * t1)
                    * d.powi(5)
                    / 120.0)
                / cos1;
        c[0] = lon;
        c[1] = phi;
        Ok(())
    }
}

#[derive(Clone, Debug)]
enum Kernel {
    WebMercator { a: f64, lon0: f64, x0: f64, y0: f64 },
    TransverseMercator(Box<TransverseMercator>),
    Cartesian { a: f64, e2: f64 },
    Helmert { tx: f64, ty: f64, tz: f64 },
}

impl Kernel {
    fn forward(&self, c: &mut [f64; MAX_ORDINATES]) -> Result<(), i32> {
        match self {
            Kernel::WebMercator { a, lon0, x0, y0 } => {
                if c[1].abs() >= FRAC_PI_2 - LATITUDE_TOLERANCE {
                    return Err(ERR_OUTSIDE_PROJECTION_DOMAIN);
                }
                c[0] = a * adjust_longitude(c[0] - lon0) + x0;
                c[1] = a * (FRAC_PI_4 + c[1] / 2.0).tan().ln() + y0;
                Ok(())
            }
            Kernel::TransverseMercator(tm) => tm.forward(c),
            Kernel::Cartesian { a, e2 } => {
                let (lon, lat, h) = (c[0], c[1], c[2]);
                let (sin, cos) = lat.sin_cos();
                let n = a / (1.0 - e2 * sin * sin).sqrt();
                c[0] = (n + h) * cos * lon.cos();
                c[1] = (n + h) * cos * lon.sin();
                c[2] = (n * (1.0 - e2) + h) * sin;
                Ok(())
            }
            Kernel::Helmert { tx, ty, tz } => {
                c[0] += tx;
                c[1] += ty;
                c[2] += tz;
                Ok(())
            }
        }
    }

    fn inverse(&self, c: &mut [f64; MAX_ORDINATES]) -> Result<(), i32> {
        match self {
            Kernel::WebMercator { a, lon0, x0, y0 } => {
                c[0] = (c[0] - x0) / a + lon0;
                c[1] = ((c[1] - y0) / a).sinh().atan();
                Ok(())
            }
            Kernel::TransverseMercator(tm) => tm.inverse(c),
            Kernel::Cartesian { a, e2 } => {
                let (x, y, z) = (c[0], c[1], c[2]);
                let p = x.hypot(y);
                if p == 0.0 && z == 0.0 {
                    return Err(ERR_INVALID_COORD);
                }
                let lon = y.atan2(x);
                let mut lat = z.atan2(p * (1.0 - e2));
                for _ in 0..10 {
                    let sin = lat.sin();
                    let n = a / (1.0 - e2 * sin * sin).sqrt();
                    let next = (z + e2 * n * sin).atan2(p);
                    if (next - lat).abs() < 1e-14 {
                        lat = next;
                        break;
                    }
                    lat = next;
                }
                let (sin, cos) = lat.sin_cos();
                let h = p * cos + z * sin - a * (1.0 - e2 * sin * sin).sqrt();
                c[0] = lon;
                c[1] = lat;
                c[2] = h;
                Ok(())
            }
            Kernel::Helmert { tx, ty, tz } => {
                c[0] -= tx;
                c[1] -= ty;
                c[2] -= tz;
                Ok(())
            }
        }
    }

    fn is_cartesian(&self) -> bool {
        matches!(self, Kernel::Cartesian { .. })
    }
}

#[derive(Clone, Debug)]
struct Step {
    kernel: Kernel,
    inverse: bool,
    text: String,
}

impl Step {
    fn apply(&self, c: &mut [f64; MAX_ORDINATES]) -> Result<(), i32> {
        if self.inverse {
            self.kernel.inverse(c)
        } else {
            self.kernel.forward(c)
        }
    }

    fn render(&self) -> String {
        if self.inverse {
            format!("+inv {}", self.text)
        } else {
            self.text.clone()
        }
    }
}

/// A compiled operation, optionally bound to a context that receives its error numbers.
#[derive(Debug)]
pub struct Pipeline {
    name: String,
    source: Frame,
    target: Frame,
    steps: Vec<Step>,
    preserve_height: bool,
    sink: Option<Arc<AtomicI32>>,
}

impl Pipeline {
    pub fn compile(op: &CoordinateOperation) -> NativeResult<Self> {
        let (Some(source), Some(target)) = (&op.source, &op.target) else {
            return Err(NativeError::InvalidArgument(format!(
                "Operation {} has no source and target CRS",
                op.meta.name
            )));
        };
        let mut steps = Vec::new();
        push_steps(op, Some(source), Some(target), &mut steps)?;
        let source = Frame::of(source)?;
        let target = Frame::of(target)?;
        let preserve_height = source.dimension() < 3
            && target.dimension() < 3
            && steps.iter().any(|s| s.kernel.is_cartesian());
        debug!(operation = %op.meta.name, steps = steps.len(), "compiled pipeline");
        Ok(Self {
            name: op.meta.name.clone(),
            source,
            target,
            steps,
            preserve_height,
            sink: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Binds or unbinds the context receiving error numbers.
    pub fn assign(&mut self, context: Option<&NativeContext>) {
        self.sink = context.map(NativeContext::errno_sink);
    }

    pub fn is_assigned(&self) -> bool {
        self.sink.is_some()
    }

    /// Transforms `count` points of `dimension` ordinates laid out from `offset`.
    /// Returns the error number of the last failing point, 0 when every point succeeded.
    pub fn transform(
        &self,
        dimension: usize,
        coordinates: &mut [f64],
        offset: usize,
        count: usize,
    ) -> NativeResult<i32> {
        if dimension == 0 {
            return Err(NativeError::InvalidArgument(
                "Dimension must be at least 1".into(),
            ));
        }
        let needed = count
            .checked_mul(dimension)
            .and_then(|n| n.checked_add(offset))
            .ok_or_else(|| NativeError::OutOfRange("Coordinate range overflows".into()))?;
        if needed > coordinates.len() {
            return Err(NativeError::OutOfRange(format!(
                "{count} points of dimension {dimension} from offset {offset} exceed {} values",
                coordinates.len()
            )));
        }
        let used = dimension.min(MAX_ORDINATES);
        let mut errno = 0;
        for point in coordinates[offset..needed].chunks_exact_mut(dimension) {
            let point = &mut point[..used];
            if let Err(code) = self.point(point) {
                point.fill(f64::INFINITY);
                errno = code;
            }
        }
        if errno != 0
            && let Some(sink) = &self.sink
        {
            sink.store(errno, Ordering::Relaxed);
        }
        Ok(errno)
    }

    fn point(&self, point: &mut [f64]) -> Result<(), i32> {
        if point.iter().any(|v| !v.is_finite()) {
            return Err(ERR_INVALID_COORD);
        }
        let mut c = [0.0; MAX_ORDINATES];
        self.source.normalize(point, &mut c)?;
        let height = c[2];
        for step in &self.steps {
            step.apply(&mut c)?;
        }
        if self.preserve_height {
            c[2] = height;
        }
        if c.iter().any(|v| v.is_nan()) {
            return Err(ERR_COORD_TRANSFM);
        }
        self.target.denormalize(c, point);
        Ok(())
    }

    /// PROJ pipeline text equivalent to this compiled operation.
    pub fn proj_string(&self) -> NativeResult<String> {
        let entry = self.source.entry_steps();
        let exit = self.target.exit_steps();
        if self.steps.is_empty() && entry == self.target.entry_steps() {
            return Ok("+proj=noop".to_string());
        }
        let mut parts = entry;
        if self.preserve_height {
            parts.push("+proj=push +v_3".to_string());
        }
        parts.extend(self.steps.iter().map(Step::render));
        if self.preserve_height {
            parts.push("+proj=pop +v_3".to_string());
        }
        parts.extend(exit);
        Ok(match parts.as_slice() {
            [] => "+proj=noop".to_string(),
            [only] => only.clone(),
            _ => {
                let steps: Vec<String> = parts.iter().map(|p| format!("+step {p}")).collect();
                format!("+proj=pipeline {}", steps.join(" "))
            }
        })
    }
}

fn push_steps(
    op: &CoordinateOperation,
    source: Option<&Crs>,
    target: Option<&Crs>,
    out: &mut Vec<Step>,
) -> NativeResult<()> {
    let source = op.source.as_deref().or(source);
    let target = op.target.as_deref().or(target);
    match &op.kind {
        OperationKind::Concatenated(steps) => {
            let last = steps.len().saturating_sub(1);
            for (i, step) in steps.iter().enumerate() {
                let s = if i == 0 { source } else { None };
                let t = if i == last { target } else { None };
                push_steps(step, s, t, out)?;
            }
            Ok(())
        }
        OperationKind::Conversion(single) | OperationKind::Transformation(single) => {
            single_steps(&op.meta.name, single, source, target, out)
        }
    }
}

fn ellipsoid_of<'a>(crs: Option<&'a Crs>) -> Option<&'a Arc<Ellipsoid>> {
    crs.and_then(|crs| horizontal(crs).ellipsoid())
}

fn required_ellipsoid<'a>(crs: Option<&'a Crs>, name: &str) -> NativeResult<&'a Arc<Ellipsoid>> {
    ellipsoid_of(crs).ok_or_else(|| {
        NativeError::InvalidArgument(format!("Cannot find the ellipsoid used by {name}"))
    })
}

fn is_geocentric(crs: Option<&Crs>) -> bool {
    crs.is_some_and(|crs| horizontal(crs).is_geocentric())
}

fn cartesian(ellipsoid: &Ellipsoid, inverse: bool) -> Step {
    Step {
        kernel: Kernel::Cartesian {
            a: ellipsoid.semi_major_metre(),
            e2: ellipsoid.eccentricity_squared(),
        },
        inverse,
        text: format!("+proj=cart {}", ellipsoid_params(ellipsoid)),
    }
}

fn single_steps(
    name: &str,
    single: &SingleOperation,
    source: Option<&Crs>,
    target: Option<&Crs>,
    out: &mut Vec<Step>,
) -> NativeResult<()> {
    match single.formula() {
        MethodFormula::PseudoMercator => {
            let ellipsoid = required_ellipsoid(source.or(target), name)?;
            let lon0 = single.si(LONGITUDE_OF_NATURAL_ORIGIN, 0.0);
            let x0 = single.si(FALSE_EASTING, 0.0);
            let y0 = single.si(FALSE_NORTHING, 0.0);
            out.push(Step {
                kernel: Kernel::WebMercator {
                    a: ellipsoid.semi_major_metre(),
                    lon0,
                    x0,
                    y0,
                },
                inverse: single.inverted,
                text: format!(
                    "+proj=webmerc +lat_0=0 +lon_0={} +x_0={} +y_0={} {}",
                    format_number(lon0.to_degrees()),
                    format_number(x0),
                    format_number(y0),
                    ellipsoid_params(ellipsoid)
                ),
            });
        }
        MethodFormula::TransverseMercator => {
            let ellipsoid = required_ellipsoid(source.or(target), name)?;
            let tm = TransverseMercator::new(single, ellipsoid);
            let text = match utm_zone(single) {
                Some((zone, south)) => format!(
                    "+proj=utm +zone={zone}{} {}",
                    if south { " +south" } else { "" },
                    ellipsoid_params(ellipsoid)
                ),
                None => format!(
                    "+proj=tmerc +lat_0={} +lon_0={} +k={} +x_0={} +y_0={} {}",
                    format_number(tm.lat0.to_degrees()),
                    format_number(tm.lon0.to_degrees()),
                    format_number(tm.k0),
                    format_number(tm.x0),
                    format_number(tm.y0),
                    ellipsoid_params(ellipsoid)
                ),
            };
            out.push(Step {
                kernel: Kernel::TransverseMercator(Box::new(tm)),
                inverse: single.inverted,
                text,
            });
        }
        MethodFormula::GeographicGeocentric => {
            let ellipsoid = required_ellipsoid(source.or(target), name)?;
            let inverse = if is_geocentric(source) {
                true
            } else if is_geocentric(target) {
                false
            } else {
                single.inverted
            };
            out.push(cartesian(ellipsoid, inverse));
        }
        MethodFormula::GeocentricTranslation => {
            let sign = if single.inverted { -1.0 } else { 1.0 };
            if !is_geocentric(source) {
                out.push(cartesian(required_ellipsoid(source, name)?, false));
            }
            let (tx, ty, tz) = (
                sign * single.si(X_AXIS_TRANSLATION, 0.0),
                sign * single.si(Y_AXIS_TRANSLATION, 0.0),
                sign * single.si(Z_AXIS_TRANSLATION, 0.0),
            );
            out.push(Step {
                kernel: Kernel::Helmert { tx, ty, tz },
                inverse: false,
                text: format!(
                    "+proj=helmert +x={} +y={} +z={}",
                    format_number(tx),
                    format_number(ty),
                    format_number(tz)
                ),
            });
            if !is_geocentric(target) {
                out.push(cartesian(required_ellipsoid(target, name)?, true));
            }
        }
        MethodFormula::Identity | MethodFormula::Ballpark => {}
        MethodFormula::Unknown => {
            return Err(NativeError::Transform {
                code: ERR_NO_OPERATION,
                message: format!(
                    "Operation {name} uses method {} which cannot be instantiated",
                    single.method.meta.name
                ),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::object::{Metadata, NativeRef, PredefinedUnit, downcast};
    use crate::native::operation::{OperationMethod, ParameterValue};
    use crate::native::{projstr, wkt};

    const WGS84_LAT_LON: &str = r#"GEOGCRS["WGS 84",
        DATUM["World Geodetic System 1984",ELLIPSOID["WGS 84",6378137,298.257223563]],
        CS[ellipsoidal,2],
            AXIS["geodetic latitude (Lat)",north,ANGLEUNIT["degree",0.0174532925199433]],
            AXIS["geodetic longitude (Lon)",east,ANGLEUNIT["degree",0.0174532925199433]],
        ID["EPSG",4326]]"#;

    fn crs(text: &str) -> Arc<Crs> {
        let object: NativeRef = if text.starts_with('+') {
            projstr::read(text).expect("proj").0
        } else {
            wkt::read(text, true).expect("wkt").0
        };
        downcast::<Crs>(&object).expect("crs")
    }

    fn projection(source: &Arc<Crs>, projected: &Arc<Crs>) -> CoordinateOperation {
        let CrsKind::Projected { conversion, .. } = &projected.kind else {
            panic!("expected a projected CRS");
        };
        conversion.between(Arc::clone(source), Arc::clone(projected))
    }

    #[test]
    fn web_mercator_from_latitude_first_degrees() {
        let geog = crs(WGS84_LAT_LON);
        let merc = crs("+proj=merc +a=6378137 +b=6378137 +nadgrids=@null");
        let pipeline = Pipeline::compile(&projection(&geog, &merc)).expect("compile");
        let mut coords = [45.0, 10.0, 0.0, 0.0];
        assert_eq!(pipeline.transform(2, &mut coords, 0, 2).expect("transform"), 0);
        assert!((coords[0] - 1113194.9079327357).abs() < 1e-6);
        assert!((coords[1] - 5621521.486192066).abs() < 1e-6);
        assert!(coords[2].abs() < 1e-6 && coords[3].abs() < 1e-6);
        assert_eq!(
            pipeline.proj_string().expect("proj"),
            "+proj=pipeline +step +proj=axisswap +order=2,1 \
             +step +proj=unitconvert +xy_in=deg +xy_out=rad \
             +step +proj=webmerc +lat_0=0 +lon_0=0 +x_0=0 +y_0=0 +ellps=WGS84"
        );
    }

    #[test]
    fn failing_points_become_infinite_and_report_to_the_context() {
        let geog = crs(WGS84_LAT_LON);
        let merc = crs("+proj=merc +a=6378137 +b=6378137 +nadgrids=@null");
        let mut pipeline = Pipeline::compile(&projection(&geog, &merc)).expect("compile");
        let context = NativeContext::new(Vec::new());
        pipeline.assign(Some(&context));
        let mut coords = [90.0, 0.0, 0.0, 10.0];
        let errno = pipeline.transform(2, &mut coords, 0, 2).expect("transform");
        assert_eq!(errno, ERR_OUTSIDE_PROJECTION_DOMAIN);
        assert_eq!(context.errno(), ERR_OUTSIDE_PROJECTION_DOMAIN);
        assert!(coords[0].is_infinite() && coords[1].is_infinite());
        assert!((coords[2] - 1113194.9079327357).abs() < 1e-6);
        assert!(coords[3].abs() < 1e-6);
        pipeline.assign(None);
        assert!(!pipeline.is_assigned());
    }

    #[test]
    fn utm_on_the_central_meridian_and_round_trip() {
        let geog = crs("+proj=longlat +datum=WGS84");
        let utm = crs("+proj=utm +zone=31 +datum=WGS84");
        let op = projection(&geog, &utm);
        let pipeline = Pipeline::compile(&op).expect("compile");
        let mut coords = [3.0, 45.0];
        pipeline.transform(2, &mut coords, 0, 1).expect("transform");
        assert!((coords[0] - 500000.0).abs() < 1e-6);
        assert!((coords[1] - 4982950.400).abs() < 1e-2);

        let inverse = Pipeline::compile(&op.inverse().expect("inverse")).expect("compile");
        let mut coords = [5.5, 48.2];
        pipeline.transform(2, &mut coords, 0, 1).expect("forward");
        inverse.transform(2, &mut coords, 0, 1).expect("inverse");
        assert!((coords[0] - 5.5).abs() < 1e-7);
        assert!((coords[1] - 48.2).abs() < 1e-7);
    }

    #[test]
    fn geocentric_translation_wraps_cartesian_steps() {
        let ed50 = crs("+proj=longlat +ellps=intl");
        let wgs84 = crs("+proj=longlat +datum=WGS84");
        let single = SingleOperation::new(
            OperationMethod::epsg(9603),
            vec![
                ParameterValue::epsg(X_AXIS_TRANSLATION, -87.0, PredefinedUnit::Metre.unit()),
                ParameterValue::epsg(Y_AXIS_TRANSLATION, -98.0, PredefinedUnit::Metre.unit()),
                ParameterValue::epsg(Z_AXIS_TRANSLATION, -121.0, PredefinedUnit::Metre.unit()),
            ],
        );
        assert_eq!(single.formula(), MethodFormula::GeocentricTranslation);
        let op = CoordinateOperation::transformation(
            Metadata::named("ED50 to WGS 84 (1)"),
            single,
            ed50,
            wgs84,
            Some(10.0),
        );
        let pipeline = Pipeline::compile(&op).expect("compile");
        assert_eq!(
            pipeline.proj_string().expect("proj"),
            "+proj=pipeline +step +proj=unitconvert +xy_in=deg +xy_out=rad \
             +step +proj=push +v_3 +step +proj=cart +ellps=intl \
             +step +proj=helmert +x=-87 +y=-98 +z=-121 \
             +step +inv +proj=cart +ellps=WGS84 +step +proj=pop +v_3 \
             +step +proj=unitconvert +xy_in=rad +xy_out=deg"
        );
        let mut coords = [2.0, 49.0, 123.0];
        pipeline.transform(3, &mut coords, 0, 1).expect("transform");
        assert!((coords[0] - 2.0).abs() < 0.01 && (coords[0] - 2.0).abs() > 1e-5);
        assert_eq!(coords[2], 123.0);

        let back = Pipeline::compile(&op.inverse().expect("inverse")).expect("compile");
        back.transform(3, &mut coords, 0, 1).expect("transform");
        assert!((coords[0] - 2.0).abs() < 1e-8);
        assert!((coords[1] - 49.0).abs() < 1e-8);
    }

    #[test]
    fn operations_without_crs_or_method_do_not_compile() {
        let single = SingleOperation::new(OperationMethod::epsg(9807), Vec::new());
        let conversion = CoordinateOperation::conversion(Metadata::named("bare"), single);
        assert!(matches!(
            Pipeline::compile(&conversion),
            Err(NativeError::InvalidArgument(_))
        ));
        let geog = crs("+proj=longlat +datum=WGS84");
        let unknown = CoordinateOperation::conversion(
            Metadata::named("mystery"),
            SingleOperation::new(OperationMethod::epsg(9999), Vec::new()),
        )
        .between(Arc::clone(&geog), geog);
        assert!(matches!(
            Pipeline::compile(&unknown),
            Err(NativeError::Transform { code: ERR_NO_OPERATION, .. })
        ));
    }

    #[test]
    fn invalid_ranges_are_rejected() {
        let geog = crs("+proj=longlat +datum=WGS84");
        let identity = CoordinateOperation::conversion(
            Metadata::named("null"),
            SingleOperation::new(OperationMethod::epsg(9843), Vec::new()),
        )
        .between(Arc::clone(&geog), Arc::clone(&geog));
        let pipeline = Pipeline::compile(&identity).expect("compile");
        assert_eq!(pipeline.proj_string().expect("proj"), "+proj=noop");
        let mut coords = [1.0, 2.0, 3.0];
        assert!(pipeline.transform(0, &mut coords, 0, 1).is_err());
        assert!(matches!(
            pipeline.transform(2, &mut coords, 2, 1),
            Err(NativeError::OutOfRange(_))
        ));
        assert_eq!(pipeline.transform(2, &mut coords, 1, 1).expect("ok"), 0);
        assert_eq!(coords[0], 1.0);
        assert!((coords[1] - 2.0).abs() < 1e-12 && (coords[2] - 3.0).abs() < 1e-12);
    }
}
