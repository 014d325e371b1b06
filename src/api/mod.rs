//! Purpose: Managed-facing Rust API of the bridge.
//! Exports: `Runtime`, `GeoObject`, factories, `Transform`, formats and the core error types.
//! Role: Public surface used by Rust callers and by the C ABI.
//! Invariants: Every native object reaches callers as an `Arc<GeoObject>` from a `Runtime`.
//! Invariants: Errors are `core::error::Error` values; native errors never escape.

mod factory;
mod format;
mod object;
mod runtime;
mod transform;

pub use crate::core::context::{Context, ContextConfig, ContextPool, PooledContext};
pub use crate::core::error::{Error, ErrorKind, Result, to_status_code};
pub use crate::core::resolve::TypeTag;
pub use crate::native::catalog::Category;
pub use crate::native::compare::Criterion;
pub use factory::{
    AuthorityFactory, GridAvailabilityUse, IntermediateCrsUse, OperationFactory,
    OperationOptions, SourceTargetExtentUse, SpatialCriterion,
};
pub use format::{Convention, FormatOptions, Parsed, ReferencingFormat};
pub use object::GeoObject;
pub use runtime::Runtime;
pub use transform::Transform;

pub(crate) use factory::catalog_request;
pub(crate) use format::format_native;
