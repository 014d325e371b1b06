//! Purpose: Managed wrapper around one native geodetic object.
//! Exports: `GeoObject`.
//! Role: What managed callers hold; every object-valued property goes back through the runtime.
//! Invariants: A wrapper owns exactly one indirection block; reads after `release` fail with
//! `InvalidHandle`.
//! Invariants: Object-valued properties return the registered wrapper when one is alive.

use std::fmt;
use std::sync::Arc;

use crate::core::context::Context;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::handle::SharedPointer;
use crate::core::identity::{NativeIdentity, Releasable};
use crate::core::resolve::TypeTag;
use crate::core::translate::translate;
use crate::native::compare::{Criterion, is_equivalent};
use crate::native::object::{
    Axis, CoordinateSystem, Crs, CrsKind, Datum, Ellipsoid, Metadata, PrimeMeridian,
    UnitOfMeasure, as_native, downcast,
};
use crate::native::operation::{CoordinateOperation, OperationKind};
use crate::native::{BaseObject, NativeRef};

use super::format::{Convention, FormatOptions, format_native};
use super::runtime::Runtime;

pub struct GeoObject {
    pointer: SharedPointer<dyn BaseObject>,
    tag: TypeTag,
    identity: NativeIdentity,
}

impl fmt::Debug for GeoObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeoObject")
            .field("tag", &self.tag)
            .field("identity", &format_args!("{:#x}", self.identity))
            .field("released", &self.pointer.is_released())
            .finish()
    }
}

fn not_applicable(what: &str, tag: TypeTag) -> Error {
    Error::new(ErrorKind::Usage).with_message(format!("{tag:?} has no {what}"))
}

impl Releasable for GeoObject {
    fn is_released(&self) -> bool {
        self.pointer.is_released()
    }
}

impl GeoObject {
    pub(crate) fn new(pointer: SharedPointer<dyn BaseObject>, tag: TypeTag, identity: NativeIdentity) -> Self {
        Self {
            pointer,
            tag,
            identity,
        }
    }

    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    /// Native identity this wrapper was registered under.
    pub fn identity(&self) -> NativeIdentity {
        self.identity
    }

    pub fn handle(&self) -> u64 {
        self.pointer.handle()
    }

    pub fn is_released(&self) -> bool {
        self.pointer.is_released()
    }

    /// Releases the native object early; the wrapper becomes unusable.
    pub fn release(&self) {
        self.pointer.release();
    }

    /// Strong reference to the native object.
    pub fn native(&self) -> Result<NativeRef> {
        self.pointer.get()
    }

    fn downcast<T: BaseObject>(&self) -> Result<Option<Arc<T>>> {
        Ok(downcast::<T>(&self.native()?))
    }

    fn with_metadata<R>(&self, read: impl FnOnce(&Metadata) -> R) -> Result<Option<R>> {
        let native = self.native()?;
        Ok(native.metadata().map(read))
    }

    pub fn name(&self) -> Result<Option<String>> {
        if let Some(unit) = self.downcast::<UnitOfMeasure>()? {
            return Ok(Some(unit.name.clone()));
        }
        self.with_metadata(|meta| meta.name.clone())
    }

    /// First identifier as `AUTHORITY:CODE`.
    pub fn identifier(&self) -> Result<Option<String>> {
        if let Some(unit) = self.downcast::<UnitOfMeasure>()? {
            return Ok(unit.code.as_ref().map(|(auth, code)| format!("{auth}:{code}")));
        }
        Ok(self
            .with_metadata(|meta| {
                meta.first_identifier()
                    .map(|id| format!("{}:{}", id.code_space, id.code))
            })?
            .flatten())
    }

    pub fn identifiers(&self, runtime: &Runtime) -> Result<Vec<Arc<GeoObject>>> {
        let ids = self
            .with_metadata(|meta| meta.identifiers.iter().map(as_native).collect::<Vec<_>>())?
            .unwrap_or_default();
        runtime.wrap_all(ids, TypeTag::Identifier)
    }

    pub fn remarks(&self) -> Result<Option<String>> {
        Ok(self.with_metadata(|meta| meta.remarks.clone())?.flatten())
    }

    pub fn scope(&self) -> Result<Option<String>> {
        Ok(self.with_metadata(|meta| meta.scope.clone())?.flatten())
    }

    pub fn is_deprecated(&self) -> Result<bool> {
        Ok(self.with_metadata(|meta| meta.deprecated)?.unwrap_or(false))
    }

    /// Datum of a CRS; projected CRSs report their base datum.
    pub fn datum(&self, runtime: &Runtime) -> Result<Option<Arc<GeoObject>>> {
        let datum = self
            .downcast::<Crs>()?
            .and_then(|crs| crs.datum().map(as_native));
        runtime.wrap_optional(datum, TypeTag::Datum)
    }

    /// Ellipsoid of a geodetic datum or CRS.
    pub fn ellipsoid(&self, runtime: &Runtime) -> Result<Option<Arc<GeoObject>>> {
        let native = self.native()?;
        let ellipsoid = if let Some(crs) = downcast::<Crs>(&native) {
            crs.ellipsoid().map(as_native)
        } else {
            downcast::<Datum>(&native).and_then(|d| d.ellipsoid().map(as_native))
        };
        runtime.wrap_optional(ellipsoid, TypeTag::Ellipsoid)
    }

    pub fn prime_meridian(&self, runtime: &Runtime) -> Result<Option<Arc<GeoObject>>> {
        let native = self.native()?;
        let datum = match downcast::<Crs>(&native) {
            Some(crs) => crs.datum().cloned(),
            None => downcast::<Datum>(&native),
        };
        let meridian = datum.and_then(|d| d.prime_meridian().map(as_native));
        runtime.wrap_optional(meridian, TypeTag::PrimeMeridian)
    }

    pub fn coordinate_system(&self, runtime: &Runtime) -> Result<Option<Arc<GeoObject>>> {
        let cs = self
            .downcast::<Crs>()?
            .and_then(|crs| crs.coordinate_system().map(as_native));
        runtime.wrap_optional(cs, TypeTag::CoordinateSystem)
    }

    pub fn base_crs(&self, runtime: &Runtime) -> Result<Option<Arc<GeoObject>>> {
        let base = self
            .downcast::<Crs>()?
            .and_then(|crs| crs.base_crs().map(as_native));
        runtime.wrap_optional(base, TypeTag::CoordinateReferenceSystem)
    }

    pub fn deriving_conversion(&self, runtime: &Runtime) -> Result<Option<Arc<GeoObject>>> {
        let conversion = self.downcast::<Crs>()?.and_then(|crs| match &crs.kind {
            CrsKind::Projected { conversion, .. } => Some(as_native(conversion)),
            _ => None,
        });
        runtime.wrap_optional(conversion, TypeTag::Conversion)
    }

    pub fn method(&self, runtime: &Runtime) -> Result<Option<Arc<GeoObject>>> {
        let method = self
            .downcast::<CoordinateOperation>()?
            .and_then(|op| op.method().map(as_native));
        runtime.wrap_optional(method, TypeTag::OperationMethod)
    }

    /// Axes of a coordinate system, or of a CRS's coordinate system.
    pub fn axes(&self, runtime: &Runtime) -> Result<Vec<Arc<GeoObject>>> {
        let native = self.native()?;
        let cs = match downcast::<Crs>(&native) {
            Some(crs) => crs.coordinate_system().cloned(),
            None => downcast::<CoordinateSystem>(&native),
        };
        let axes = cs
            .map(|cs| cs.axes.iter().map(as_native).collect::<Vec<_>>())
            .unwrap_or_default();
        runtime.wrap_all(axes, TypeTag::Axis)
    }

    pub fn components(&self, runtime: &Runtime) -> Result<Vec<Arc<GeoObject>>> {
        let components = match self.downcast::<Crs>()? {
            Some(crs) => match &crs.kind {
                CrsKind::Compound { components } => components.iter().map(as_native).collect(),
                _ => Vec::new(),
            },
            None => Vec::new(),
        };
        runtime.wrap_all(components, TypeTag::CoordinateReferenceSystem)
    }

    /// Steps of a concatenated operation.
    pub fn steps(&self, runtime: &Runtime) -> Result<Vec<Arc<GeoObject>>> {
        let steps = match self.downcast::<CoordinateOperation>()? {
            Some(op) => match &op.kind {
                OperationKind::Concatenated(steps) => steps.iter().map(as_native).collect(),
                _ => Vec::new(),
            },
            None => Vec::new(),
        };
        runtime.wrap_all(steps, TypeTag::CoordinateOperation)
    }

    pub fn source_crs(&self, runtime: &Runtime) -> Result<Option<Arc<GeoObject>>> {
        let source = self
            .downcast::<CoordinateOperation>()?
            .and_then(|op| op.source.as_ref().map(as_native));
        runtime.wrap_optional(source, TypeTag::CoordinateReferenceSystem)
    }

    pub fn target_crs(&self, runtime: &Runtime) -> Result<Option<Arc<GeoObject>>> {
        let target = self
            .downcast::<CoordinateOperation>()?
            .and_then(|op| op.target.as_ref().map(as_native));
        runtime.wrap_optional(target, TypeTag::CoordinateReferenceSystem)
    }

    /// Positional accuracy of an operation in metres.
    pub fn accuracy(&self) -> Result<Option<f64>> {
        let op = self
            .downcast::<CoordinateOperation>()?
            .ok_or_else(|| not_applicable("accuracy", self.tag))?;
        Ok(op.accuracy)
    }

    fn ellipsoid_value<R>(&self, what: &str, read: impl FnOnce(&Ellipsoid) -> R) -> Result<R> {
        let ellipsoid = self
            .downcast::<Ellipsoid>()?
            .ok_or_else(|| not_applicable(what, self.tag))?;
        Ok(read(&ellipsoid))
    }

    pub fn semi_major_axis(&self) -> Result<f64> {
        self.ellipsoid_value("semi-major axis", |e| e.semi_major)
    }

    pub fn semi_minor_axis(&self) -> Result<f64> {
        self.ellipsoid_value("semi-minor axis", Ellipsoid::semi_minor)
    }

    pub fn inverse_flattening(&self) -> Result<f64> {
        self.ellipsoid_value("inverse flattening", Ellipsoid::inverse_flattening)
    }

    pub fn is_sphere(&self) -> Result<bool> {
        self.ellipsoid_value("sphere flag", Ellipsoid::is_sphere)
    }

    pub fn ivf_definitive(&self) -> Result<bool> {
        self.ellipsoid_value("inverse flattening", Ellipsoid::ivf_definitive)
    }

    /// Prime meridian longitude in degrees east of Greenwich.
    pub fn greenwich_longitude(&self) -> Result<f64> {
        let meridian = self
            .downcast::<PrimeMeridian>()?
            .ok_or_else(|| not_applicable("Greenwich longitude", self.tag))?;
        Ok(meridian.longitude_degrees())
    }

    fn axis(&self) -> Result<Arc<Axis>> {
        self.downcast::<Axis>()?
            .ok_or_else(|| not_applicable("axis range", self.tag))
    }

    /// Axis minimum, negative infinity when unbounded.
    pub fn axis_minimum(&self) -> Result<f64> {
        Ok(self.axis()?.minimum.unwrap_or(f64::NEG_INFINITY))
    }

    /// Axis maximum, positive infinity when unbounded.
    pub fn axis_maximum(&self) -> Result<f64> {
        Ok(self.axis()?.maximum.unwrap_or(f64::INFINITY))
    }

    /// Operation running the other way.
    pub fn inverse(&self, runtime: &Runtime) -> Result<Arc<GeoObject>> {
        let op = self.downcast::<CoordinateOperation>()?.ok_or_else(|| {
            Error::new(ErrorKind::NonInvertibleOperation)
                .with_message(format!("{:?} is not a coordinate operation", self.tag))
        })?;
        let inverse = op
            .inverse()
            .map_err(|err| translate(err, ErrorKind::NonInvertibleOperation))?;
        runtime.wrap(&as_native(&Arc::new(inverse)), TypeTag::CoordinateOperation)
    }

    pub fn is_equivalent_to(&self, other: &GeoObject, criterion: Criterion) -> Result<bool> {
        Ok(is_equivalent(&self.native()?, &other.native()?, criterion))
    }

    /// Text of the object in `convention`; a destroyed context is rejected.
    pub fn format(
        &self,
        context: Option<&Context>,
        convention: Convention,
        options: &FormatOptions,
    ) -> Result<String> {
        if let Some(context) = context {
            context.native()?;
        }
        format_native(&self.native()?, convention, options)
    }
}
