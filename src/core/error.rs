use std::error::Error as StdError;
use std::fmt;

/// Closed taxonomy of failures surfaced to managed callers.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    Internal,
    Usage,
    ObjectNotFoundInCatalog,
    MalformedInput,
    InvalidHandle,
    UnsupportedCategory,
    NonInvertibleOperation,
    NumericTransformFailure,
    UnformattableObject,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    authority: Option<String>,
    code: Option<String>,
    diagnostic: Option<i32>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            authority: None,
            code: None,
            diagnostic: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Catalog authority of a failed lookup.
    pub fn authority(&self) -> Option<&str> {
        self.authority.as_deref()
    }

    /// Catalog code of a failed lookup.
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// Native diagnostic number of a numeric transform failure.
    pub fn diagnostic(&self) -> Option<i32> {
        self.diagnostic
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = Some(authority.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_diagnostic(mut self, diagnostic: i32) -> Self {
        self.diagnostic = Some(diagnostic);
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        match (&self.authority, &self.code) {
            (Some(authority), Some(code)) => write!(f, " (object: {authority}:{code})")?,
            (None, Some(code)) => write!(f, " (code: {code})")?,
            _ => {}
        }
        if let Some(diagnostic) = self.diagnostic {
            write!(f, " (diagnostic: {diagnostic})")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Stable integer for each kind, shared with the C ABI.
pub fn to_status_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Usage => 2,
        ErrorKind::ObjectNotFoundInCatalog => 3,
        ErrorKind::MalformedInput => 4,
        ErrorKind::InvalidHandle => 5,
        ErrorKind::UnsupportedCategory => 6,
        ErrorKind::NonInvertibleOperation => 7,
        ErrorKind::NumericTransformFailure => 8,
        ErrorKind::UnformattableObject => 9,
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, ErrorKind, to_status_code};

    #[test]
    fn status_code_mapping_is_stable() {
        let cases = [
            (ErrorKind::Internal, 1),
            (ErrorKind::Usage, 2),
            (ErrorKind::ObjectNotFoundInCatalog, 3),
            (ErrorKind::MalformedInput, 4),
            (ErrorKind::InvalidHandle, 5),
            (ErrorKind::UnsupportedCategory, 6),
            (ErrorKind::NonInvertibleOperation, 7),
            (ErrorKind::NumericTransformFailure, 8),
            (ErrorKind::UnformattableObject, 9),
        ];

        for (kind, code) in cases {
            assert_eq!(to_status_code(kind), code);
        }
    }

    #[test]
    fn display_carries_catalog_fields() {
        let err = Error::new(ErrorKind::ObjectNotFoundInCatalog)
            .with_message("crs not found: EPSG:1")
            .with_authority("EPSG")
            .with_code("1");
        assert_eq!(
            err.to_string(),
            "ObjectNotFoundInCatalog: crs not found: EPSG:1 (object: EPSG:1)"
        );
        let err = Error::new(ErrorKind::NumericTransformFailure).with_diagnostic(2049);
        assert_eq!(err.to_string(), "NumericTransformFailure (diagnostic: 2049)");
    }
}
