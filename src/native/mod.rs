//! Purpose: Reference-counted geodetic object library the bridge sits on top of.
//! Exports: Object model, catalog database, readers/writers, operation factory, compiled pipelines.
//! Role: Plays the external native library; it knows nothing about handles or wrappers.
//! Invariants: Every object crossing into the bridge is an `Arc<dyn BaseObject>` (`NativeRef`).
//! Invariants: Failures are reported as `NativeError`; translation happens in `core::translate`.

pub mod catalog;
pub mod compare;
pub mod context;
pub mod factory;
pub mod input;
pub mod json;
pub mod object;
pub mod operation;
pub mod pj;
pub mod projstr;
pub mod wkt;

use std::fmt;

pub use catalog::{AuthorityFactory, Database};
pub use context::NativeContext;
pub use object::{BaseObject, Capability, CapabilitySet, NativeRef};

/// Failure raised inside the native library.
#[derive(Clone, Debug, PartialEq)]
pub enum NativeError {
    /// Catalog lookup miss.
    NoSuchAuthorityCode {
        authority: String,
        code: String,
        message: String,
    },
    /// Input text could not be understood.
    Parse(String),
    /// The object does not support the requested output grammar.
    NotExportable(String),
    /// The operation has no inverse.
    NoInverse(String),
    /// Numeric failure while applying an operation; `code` is the diagnostic number.
    Transform { code: i32, message: String },
    /// Argument outside its accepted domain.
    InvalidArgument(String),
    /// Index outside a vector property.
    OutOfRange(String),
    /// Anything else.
    Other(String),
}

impl NativeError {
    pub fn message(&self) -> &str {
        match self {
            NativeError::NoSuchAuthorityCode { message, .. } => message,
            NativeError::Parse(message)
            | NativeError::NotExportable(message)
            | NativeError::NoInverse(message)
            | NativeError::InvalidArgument(message)
            | NativeError::OutOfRange(message)
            | NativeError::Other(message) => message,
            NativeError::Transform { message, .. } => message,
        }
    }

    pub(crate) fn no_such_code(authority: &str, code: &str, what: &str) -> Self {
        NativeError::NoSuchAuthorityCode {
            authority: authority.to_string(),
            code: code.to_string(),
            message: format!("{what} not found: {authority}:{code}"),
        }
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for NativeError {}

pub type NativeResult<T> = Result<T, NativeError>;
