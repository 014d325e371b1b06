//! Purpose: Convert native failures into the managed error taxonomy.
//! Exports: `translate`, `PendingFailure`.
//! Role: Every native call the bridge makes reports failure through here.
//! Invariants: The native message is preserved verbatim.
//! Invariants: A pending failure is never overwritten; the first one wins.

use super::error::{Error, ErrorKind};
use crate::native::NativeError;

/// Maps a native failure; `fallback` is used for failures with no specific kind.
pub fn translate(err: NativeError, fallback: ErrorKind) -> Error {
    let kind = match &err {
        NativeError::NoSuchAuthorityCode { .. } => ErrorKind::ObjectNotFoundInCatalog,
        NativeError::Parse(_) => ErrorKind::MalformedInput,
        NativeError::NotExportable(_) => ErrorKind::UnformattableObject,
        NativeError::NoInverse(_) => ErrorKind::NonInvertibleOperation,
        NativeError::Transform { .. } => ErrorKind::NumericTransformFailure,
        NativeError::InvalidArgument(_) | NativeError::OutOfRange(_) => ErrorKind::Usage,
        NativeError::Other(_) => fallback,
    };
    let mut out = Error::new(kind).with_message(err.message());
    match &err {
        NativeError::NoSuchAuthorityCode {
            authority, code, ..
        } => {
            out = out.with_authority(authority.as_str()).with_code(code.as_str());
        }
        NativeError::Transform { code, .. } => out = out.with_diagnostic(*code),
        _ => {}
    }
    out.with_source(err)
}

/// First-failure-wins slot for calls that may fail more than once.
#[derive(Debug, Default)]
pub struct PendingFailure {
    slot: Option<Error>,
}

impl PendingFailure {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pending(&self) -> bool {
        self.slot.is_some()
    }

    pub fn raise(&mut self, err: Error) {
        if self.slot.is_none() {
            self.slot = Some(err);
        }
    }

    pub fn translate(&mut self, err: NativeError, fallback: ErrorKind) {
        if self.slot.is_none() {
            self.slot = Some(translate(err, fallback));
        }
    }

    pub fn take(&mut self) -> Option<Error> {
        self.slot.take()
    }

    /// `Ok(value)` unless a failure is pending.
    pub fn finish<T>(mut self, value: T) -> Result<T, Error> {
        match self.take() {
            Some(err) => Err(err),
            None => Ok(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn catalog_misses_keep_structured_fields() {
        let err = translate(
            NativeError::NoSuchAuthorityCode {
                authority: "EPSG".into(),
                code: "99999".into(),
                message: "crs not found: EPSG:99999".into(),
            },
            ErrorKind::Internal,
        );
        assert_eq!(err.kind(), ErrorKind::ObjectNotFoundInCatalog);
        assert_eq!(err.authority(), Some("EPSG"));
        assert_eq!(err.code(), Some("99999"));
        assert_eq!(err.message(), Some("crs not found: EPSG:99999"));
        assert!(err.source().is_some());
    }

    #[test]
    fn each_native_failure_has_a_kind() {
        let cases = [
            (NativeError::Parse("x".into()), ErrorKind::MalformedInput),
            (NativeError::NotExportable("x".into()), ErrorKind::UnformattableObject),
            (NativeError::NoInverse("x".into()), ErrorKind::NonInvertibleOperation),
            (NativeError::InvalidArgument("x".into()), ErrorKind::Usage),
            (NativeError::OutOfRange("x".into()), ErrorKind::Usage),
            (NativeError::Other("x".into()), ErrorKind::UnsupportedCategory),
        ];
        for (native, kind) in cases {
            assert_eq!(translate(native, ErrorKind::UnsupportedCategory).kind(), kind);
        }
        let err = translate(
            NativeError::Transform {
                code: 2049,
                message: "Invalid coordinate".into(),
            },
            ErrorKind::Internal,
        );
        assert_eq!(err.kind(), ErrorKind::NumericTransformFailure);
        assert_eq!(err.diagnostic(), Some(2049));
    }

    #[test]
    fn first_failure_wins() {
        let mut pending = PendingFailure::new();
        pending.translate(NativeError::Parse("first".into()), ErrorKind::Internal);
        pending.raise(Error::new(ErrorKind::Usage).with_message("second"));
        pending.translate(NativeError::Other("third".into()), ErrorKind::Internal);
        let err = pending.finish(()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
        assert_eq!(err.message(), Some("first"));
        assert_eq!(PendingFailure::new().finish(5).expect("clean"), 5);
    }
}
