//! Purpose: Text conventions for formatting and parsing geodetic objects.
//! Exports: `Convention`, `FormatOptions`, `ReferencingFormat`, `Parsed`.
//! Role: Front end over the native WKT, PROJ-string and JSON readers and writers.
//! Invariants: Convention codes are stable; the C ABI passes them as integers.
//! Invariants: Formatting failures surface as `UnformattableObject`.

use std::sync::Arc;

use crate::core::context::Context;
use crate::core::error::{ErrorKind, Result};
use crate::core::resolve::TypeTag;
use crate::core::translate::translate;
use crate::native::projstr::{self, ProjVersion};
use crate::native::wkt::{self, WktStyle, WktVersion};
use crate::native::input::{self, Grammar};
use crate::native::{NativeRef, NativeResult, json};

use super::object::GeoObject;
use super::runtime::Runtime;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[repr(i32)]
pub enum Convention {
    Wkt2_2019 = 0,
    Wkt2_2015 = 1,
    Wkt2_2019Simplified = 2,
    Wkt2_2015Simplified = 3,
    Wkt1Gdal = 4,
    Wkt1Esri = 5,
    Proj5 = 6,
    Proj4 = 7,
    Json = 8,
}

impl Convention {
    pub const ALL: [Convention; 9] = [
        Convention::Wkt2_2019,
        Convention::Wkt2_2015,
        Convention::Wkt2_2019Simplified,
        Convention::Wkt2_2015Simplified,
        Convention::Wkt1Gdal,
        Convention::Wkt1Esri,
        Convention::Proj5,
        Convention::Proj4,
        Convention::Json,
    ];

    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|index| Self::ALL.get(index).copied())
    }

    pub fn is_wkt(self) -> bool {
        self.wkt_version().is_some()
    }

    fn grammar(self) -> Grammar {
        match self {
            Convention::Proj5 | Convention::Proj4 => Grammar::ProjString,
            Convention::Json => Grammar::Json,
            _ => Grammar::Wkt,
        }
    }

    fn wkt_version(self) -> Option<(WktVersion, bool)> {
        match self {
            Convention::Wkt2_2019 => Some((WktVersion::Wkt2_2019, false)),
            Convention::Wkt2_2015 => Some((WktVersion::Wkt2_2015, false)),
            Convention::Wkt2_2019Simplified => Some((WktVersion::Wkt2_2019, true)),
            Convention::Wkt2_2015Simplified => Some((WktVersion::Wkt2_2015, true)),
            Convention::Wkt1Gdal => Some((WktVersion::Wkt1Gdal, false)),
            Convention::Wkt1Esri => Some((WktVersion::Wkt1Esri, false)),
            Convention::Proj5 | Convention::Proj4 | Convention::Json => None,
        }
    }
}

/// Layout options shared by the text conventions.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FormatOptions {
    pub multiline: bool,
    pub indentation: usize,
    /// Refuse output that would not read back, such as unnamed objects.
    pub strict: bool,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            multiline: true,
            indentation: 4,
            strict: true,
        }
    }
}

impl FormatOptions {
    pub fn single_line() -> Self {
        Self {
            multiline: false,
            ..Self::default()
        }
    }

    pub fn with_indentation(mut self, indentation: usize) -> Self {
        self.indentation = indentation;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

fn write(object: &NativeRef, convention: Convention, options: &FormatOptions) -> NativeResult<String> {
    if let Some((version, simplified)) = convention.wkt_version() {
        let style = WktStyle {
            version,
            simplified,
            multiline: options.multiline,
            indentation: options.indentation,
            strict: options.strict,
        };
        return wkt::write(object, &style);
    }
    match convention {
        Convention::Proj5 => projstr::write(object, ProjVersion::Proj5),
        Convention::Proj4 => projstr::write(object, ProjVersion::Proj4),
        _ => json::write(object, options.multiline, options.indentation),
    }
}

pub(crate) fn format_native(
    object: &NativeRef,
    convention: Convention,
    options: &FormatOptions,
) -> Result<String> {
    write(object, convention, options).map_err(|err| translate(err, ErrorKind::UnformattableObject))
}

/// Object read from text, with the reader's non-fatal warnings.
#[derive(Debug)]
pub struct Parsed {
    pub object: Arc<GeoObject>,
    pub warnings: Vec<String>,
}

/// Parser for text in one convention.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReferencingFormat;

impl ReferencingFormat {
    /// Reads `text` written in `convention`; `strict` rejects unknown WKT keywords.
    /// Text in another grammar is `MalformedInput`.
    pub fn parse(
        runtime: &Runtime,
        context: &Context,
        text: &str,
        convention: Convention,
        strict: bool,
    ) -> Result<Parsed> {
        context.native()?;
        let (object, warnings) = input::read_grammar(text, convention.grammar(), strict)
            .map_err(|err| translate(err, ErrorKind::MalformedInput))?;
        let object = runtime.wrap(&object, TypeTag::Any)?;
        Ok(Parsed { object, warnings })
    }
}

impl Context {
    /// Object described by `text`: a catalog reference, URN, WKT, JSON, PROJ string or name.
    pub fn create_from_user_input(&self, runtime: &Runtime, text: &str) -> Result<Arc<GeoObject>> {
        let database = self.database()?;
        let (object, _warnings) = input::create_from_user_input(text, &database)
            .map_err(|err| translate(err, ErrorKind::MalformedInput))?;
        runtime.wrap(&object, TypeTag::Any)
    }
}
