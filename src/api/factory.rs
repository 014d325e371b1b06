//! Purpose: Catalog and operation factories exposed to managed callers.
//! Exports: `AuthorityFactory`, `OperationFactory`, `OperationOptions`, policy enums.
//! Role: Chooses the native catalog call for a requested category and wraps the result.
//! Invariants: A category the catalog cannot produce is `UnsupportedCategory`; a code of
//! the wrong category is `ObjectNotFoundInCatalog`.

use std::sync::Arc;

use crate::core::context::Context;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::resolve::TypeTag;
use crate::core::translate::translate;
use crate::native::catalog::{self, Category};
use crate::native::factory::{OperationContext, create_operations};
use crate::native::object::{Crs, Extent, as_native, downcast};
use crate::native::Capability;

pub use crate::native::factory::{
    GridAvailabilityUse, IntermediateCrsUse, SourceTargetExtentUse, SpatialCriterion,
};

use super::object::GeoObject;
use super::runtime::Runtime;

/// Objects of one authority, backed by a context's database.
#[derive(Clone, Debug)]
pub struct AuthorityFactory {
    inner: Arc<catalog::AuthorityFactory>,
}

/// Native catalog call and wrapper tag for a requested type.
pub(crate) fn catalog_request(tag: TypeTag) -> Option<(Option<Capability>, TypeTag)> {
    use TypeTag::*;
    let request = match tag {
        Any => (None, Any),
        PrimeMeridian => (Some(Capability::PrimeMeridian), PrimeMeridian),
        Ellipsoid => (Some(Capability::Ellipsoid), Ellipsoid),
        GeodeticReferenceFrame => (Some(Capability::GeodeticReferenceFrame), Datum),
        VerticalReferenceFrame => (Some(Capability::VerticalReferenceFrame), Datum),
        TemporalDatum | EngineeringDatum | Datum => (Some(Capability::Datum), Datum),
        UnitOfMeasure => (Some(Capability::UnitOfMeasure), UnitOfMeasure),
        CoordinateSystem | CartesianCs | SphericalCs | EllipsoidalCs | VerticalCs | TemporalCs => {
            (Some(Capability::CoordinateSystem), CoordinateSystem)
        }
        GeocentricCrs | GeodeticCrs => (Some(Capability::GeodeticCrs), GeodeticCrs),
        GeographicCrs => (Some(Capability::GeographicCrs), GeographicCrs),
        VerticalCrs => (Some(Capability::VerticalCrs), VerticalCrs),
        ProjectedCrs => (Some(Capability::ProjectedCrs), ProjectedCrs),
        CompoundCrs => (Some(Capability::CompoundCrs), CompoundCrs),
        TemporalCrs | EngineeringCrs | CoordinateReferenceSystem => {
            (Some(Capability::Crs), CoordinateReferenceSystem)
        }
        Conversion => (Some(Capability::Conversion), Conversion),
        CoordinateOperation => (Some(Capability::CoordinateOperation), CoordinateOperation),
        Identifier | Axis | OperationMethod | Transformation => return None,
    };
    Some(request)
}

impl AuthorityFactory {
    pub fn new(context: &Context, authority: &str) -> Result<Self> {
        Ok(Self {
            inner: context.factory(authority)?,
        })
    }

    pub fn authority(&self) -> &str {
        self.inner.authority()
    }

    /// Catalog object `code` of the requested type.
    pub fn create_object(&self, runtime: &Runtime, tag: TypeTag, code: &str) -> Result<Arc<GeoObject>> {
        let (capability, coarse) = catalog_request(tag).ok_or_else(|| {
            Error::new(ErrorKind::UnsupportedCategory).with_message("Unsupported object type.")
        })?;
        let object = match capability {
            None => self.inner.create_object(code),
            Some(capability) => self.inner.create(code, capability),
        }
        .map_err(|err| translate(err, ErrorKind::Internal))?;
        runtime.wrap(&object, coarse)
    }

    /// Name the catalog gives to `code`.
    pub fn description_text(&self, code: &str) -> Result<String> {
        self.inner
            .description_text(code)
            .map_err(|err| translate(err, ErrorKind::Internal))
    }

    pub fn codes(&self, category: Option<Category>) -> Vec<String> {
        self.inner.codes(category)
    }
}

/// Search settings for `OperationFactory`.
#[derive(Clone, Debug)]
pub struct OperationOptions {
    /// West, south, east, north in degrees; used when north > south or east > west.
    pub area_of_interest: Option<[f64; 4]>,
    /// Maximum accuracy in metres; 0 keeps every operation.
    pub desired_accuracy: f64,
    pub source_target_extent_use: SourceTargetExtentUse,
    pub spatial_criterion: SpatialCriterion,
    pub grid_availability_use: GridAvailabilityUse,
    pub intermediate_crs_use: IntermediateCrsUse,
    pub discard_superseded: bool,
}

impl Default for OperationOptions {
    fn default() -> Self {
        let native = OperationContext::default();
        Self {
            area_of_interest: None,
            desired_accuracy: native.desired_accuracy,
            source_target_extent_use: native.source_target_extent_use,
            spatial_criterion: native.spatial_criterion,
            grid_availability_use: native.grid_availability_use,
            intermediate_crs_use: native.intermediate_crs_use,
            discard_superseded: native.discard_superseded,
        }
    }
}

impl OperationOptions {
    pub fn with_area_of_interest(mut self, west: f64, south: f64, east: f64, north: f64) -> Self {
        self.area_of_interest = Some([west, south, east, north]);
        self
    }

    pub fn with_desired_accuracy(mut self, metres: f64) -> Self {
        self.desired_accuracy = metres;
        self
    }

    pub fn with_intermediate_crs_use(mut self, usage: IntermediateCrsUse) -> Self {
        self.intermediate_crs_use = usage;
        self
    }

    pub fn with_spatial_criterion(mut self, criterion: SpatialCriterion) -> Self {
        self.spatial_criterion = criterion;
        self
    }

    pub(crate) fn to_native(&self) -> OperationContext {
        let area_of_interest = self.area_of_interest.and_then(|[west, south, east, north]| {
            (north > south || east > west).then(|| Extent::new(west, south, east, north))
        });
        OperationContext {
            area_of_interest,
            desired_accuracy: self.desired_accuracy.max(0.0),
            source_target_extent_use: self.source_target_extent_use,
            spatial_criterion: self.spatial_criterion,
            grid_availability_use: self.grid_availability_use,
            intermediate_crs_use: self.intermediate_crs_use,
            discard_superseded: self.discard_superseded,
        }
    }
}

/// Finds coordinate operations between CRSs.
#[derive(Clone, Copy, Debug, Default)]
pub struct OperationFactory;

fn crs_of(object: &GeoObject, role: &str) -> Result<Arc<Crs>> {
    downcast::<Crs>(&object.native()?).ok_or_else(|| {
        Error::new(ErrorKind::Usage).with_message(format!("{role} is not a coordinate reference system"))
    })
}

impl OperationFactory {
    /// Every operation found, best first.
    pub fn create_operations(
        runtime: &Runtime,
        context: &Context,
        source: &GeoObject,
        target: &GeoObject,
        options: &OperationOptions,
    ) -> Result<Vec<Arc<GeoObject>>> {
        let source = crs_of(source, "source")?;
        let target = crs_of(target, "target")?;
        let database = context.database()?;
        let operations = create_operations(&source, &target, &options.to_native(), &database)
            .map_err(|err| translate(err, ErrorKind::Internal))?;
        runtime.wrap_all(operations.iter().map(as_native), TypeTag::CoordinateOperation)
    }

    /// Best operation, or `None` when no operation connects the two CRSs.
    pub fn create_operation(
        runtime: &Runtime,
        context: &Context,
        source: &GeoObject,
        target: &GeoObject,
        options: &OperationOptions,
    ) -> Result<Option<Arc<GeoObject>>> {
        let source = crs_of(source, "source")?;
        let target = crs_of(target, "target")?;
        let database = context.database()?;
        let operations = create_operations(&source, &target, &options.to_native(), &database)
            .map_err(|err| translate(err, ErrorKind::Internal))?;
        runtime.wrap_optional(operations.first().map(as_native), TypeTag::CoordinateOperation)
    }
}
