//! Purpose: Long-lived compiled coordinate operation applied to coordinate arrays.
//! Exports: `Transform`.
//! Role: Compiled once from an operation wrapper, then bound to whichever context runs it.
//! Invariants: Any failing point fails the whole call with its diagnostic number; the other
//! points are still transformed.

use crate::core::context::Context;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::translate::translate;
use crate::native::NativeRef;
use crate::native::object::downcast;
use crate::native::operation::CoordinateOperation;
use crate::native::pj::{
    ERR_COORD_TRANSFM, ERR_INVALID_COORD, ERR_NO_INVERSE_OP, ERR_NO_OPERATION,
    ERR_OUTSIDE_PROJECTION_DOMAIN, Pipeline,
};

use super::object::GeoObject;

fn diagnostic_text(code: i32) -> &'static str {
    match code {
        ERR_INVALID_COORD => "Invalid coordinate",
        ERR_OUTSIDE_PROJECTION_DOMAIN => "Coordinate to transform falls outside projection domain",
        ERR_NO_OPERATION => "No operation matching criteria found for coordinate",
        ERR_NO_INVERSE_OP => "No inverse operation",
        ERR_COORD_TRANSFM => "Generic error of coordinate transformation",
        _ => "Unknown error",
    }
}

#[derive(Debug)]
pub struct Transform {
    pipeline: Pipeline,
}

impl Transform {
    /// Compiles a coordinate operation wrapper.
    pub fn new(operation: &GeoObject) -> Result<Self> {
        Self::compile(&operation.native()?)
    }

    pub(crate) fn compile(operation: &NativeRef) -> Result<Self> {
        let op = downcast::<CoordinateOperation>(operation).ok_or_else(|| {
            Error::new(ErrorKind::Usage).with_message("object is not a coordinate operation")
        })?;
        let pipeline = Pipeline::compile(&op).map_err(|err| translate(err, ErrorKind::Internal))?;
        Ok(Self { pipeline })
    }

    pub fn name(&self) -> &str {
        self.pipeline.name()
    }

    /// Binds the context receiving diagnostics, or unbinds with `None`.
    pub fn assign(&mut self, context: Option<&Context>) -> Result<()> {
        match context {
            Some(context) => {
                let native = context.native()?;
                self.pipeline.assign(Some(&native));
            }
            None => self.pipeline.assign(None),
        }
        Ok(())
    }

    pub fn is_assigned(&self) -> bool {
        self.pipeline.is_assigned()
    }

    /// Transforms `count` points of `dimension` ordinates starting at `offset`, in place.
    pub fn transform(
        &self,
        dimension: usize,
        coordinates: &mut [f64],
        offset: usize,
        count: usize,
    ) -> Result<()> {
        let code = self
            .pipeline
            .transform(dimension, coordinates, offset, count)
            .map_err(|err| translate(err, ErrorKind::Usage))?;
        if code != 0 {
            return Err(Error::new(ErrorKind::NumericTransformFailure)
                .with_message(diagnostic_text(code))
                .with_diagnostic(code));
        }
        Ok(())
    }

    /// PROJ pipeline text of the compiled operation.
    pub fn proj_string(&self) -> Result<String> {
        self.pipeline
            .proj_string()
            .map_err(|err| translate(err, ErrorKind::UnformattableObject))
    }
}

#[cfg(test)]
mod tests {
    use super::Transform;
    use crate::api::{OperationFactory, OperationOptions, Runtime};
    use crate::core::context::{Context, ContextConfig};
    use crate::core::error::ErrorKind;
    use crate::native::pj::ERR_INVALID_COORD;

    fn mercator(runtime: &Runtime, context: &Context) -> Transform {
        let source = context.create_from_user_input(runtime, "EPSG:4326").unwrap();
        let target = context.create_from_user_input(runtime, "EPSG:3857").unwrap();
        let op = OperationFactory::create_operation(
            runtime,
            context,
            &source,
            &target,
            &OperationOptions::default(),
        )
        .unwrap()
        .expect("operation");
        Transform::new(&op).unwrap()
    }

    #[test]
    fn projects_latitude_longitude_to_web_mercator() {
        let runtime = Runtime::new();
        let context = Context::create(ContextConfig::new()).unwrap();
        let transform = mercator(&runtime, &context);
        let mut coords = [0.0, 0.0, 49.0, 2.0];
        transform.transform(2, &mut coords, 0, 2).unwrap();
        assert!(coords[0].abs() < 1e-6 && coords[1].abs() < 1e-6);
        assert!((coords[2] - 222_638.981_586_547).abs() < 1e-3);
        assert!((coords[3] - 6_274_861.394_006_575).abs() < 1e-3);
    }

    #[test]
    fn failing_point_reports_diagnostic_to_bound_context() {
        let runtime = Runtime::new();
        let context = Context::create(ContextConfig::new()).unwrap();
        let mut transform = mercator(&runtime, &context);
        transform.assign(Some(&context)).unwrap();
        assert!(transform.is_assigned());

        let mut coords = [f64::NAN, 0.0, 10.0, 10.0];
        let err = transform.transform(2, &mut coords, 0, 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NumericTransformFailure);
        assert_eq!(err.diagnostic(), Some(ERR_INVALID_COORD));
        assert_eq!(context.native().unwrap().errno(), ERR_INVALID_COORD);
        assert!(coords[2].is_finite() && coords[2] > 0.0);

        transform.assign(None).unwrap();
        assert!(!transform.is_assigned());
    }

    #[test]
    fn range_past_buffer_is_usage_error() {
        let runtime = Runtime::new();
        let context = Context::create(ContextConfig::new()).unwrap();
        let transform = mercator(&runtime, &context);
        let mut coords = [0.0; 4];
        let err = transform.transform(2, &mut coords, 2, 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn non_operation_object_is_rejected() {
        let runtime = Runtime::new();
        let context = Context::create(ContextConfig::new()).unwrap();
        let crs = context.create_from_user_input(&runtime, "EPSG:4326").unwrap();
        let err = Transform::new(&crs).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);
    }
}
