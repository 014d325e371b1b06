//! Purpose: Turn free-form user text into a native object.
//! Exports: `create_from_user_input`, `Grammar`, `read_grammar`.
//! Role: Dispatches between catalog references, URNs, JSON, PROJ strings, WKT and names.
//! Invariants: Catalog definitions nest through here; nesting depth is bounded.

use super::catalog::Database;
use super::object::NativeRef;
use super::{NativeError, NativeResult, json, projstr, wkt};

const MAX_NESTING: usize = 4;

/// Text grammars with a dedicated reader.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Grammar {
    Wkt,
    Json,
    ProjString,
}

impl Grammar {
    fn accepts(self, text: &str) -> bool {
        match self {
            Grammar::Wkt => looks_like_wkt(text),
            Grammar::Json => text.starts_with('{'),
            Grammar::ProjString => text.starts_with("+proj=") || text.starts_with("proj="),
        }
    }
}

/// Reads `text` with the reader of `grammar` only; `strict` applies to WKT.
pub fn read_grammar(
    text: &str,
    grammar: Grammar,
    strict: bool,
) -> NativeResult<(NativeRef, Vec<String>)> {
    let text = text.trim();
    if !grammar.accepts(text) {
        return Err(NativeError::Parse(format!("input is not {grammar:?} text")));
    }
    match grammar {
        Grammar::Wkt => wkt::read(text, strict),
        Grammar::Json => json::read(text).map(|object| (object, Vec::new())),
        Grammar::ProjString => projstr::read(text),
    }
}

/// Parses `text`, returning the object and any non-fatal reader warnings.
pub fn create_from_user_input(
    text: &str,
    database: &Database,
) -> NativeResult<(NativeRef, Vec<String>)> {
    create_at(text, database, 0)
}

pub(crate) fn create_at(
    text: &str,
    database: &Database,
    depth: usize,
) -> NativeResult<(NativeRef, Vec<String>)> {
    if depth > MAX_NESTING {
        return Err(NativeError::Parse(
            "catalog definitions nest too deeply".to_string(),
        ));
    }
    let text = text.trim();
    if text.is_empty() {
        return Err(NativeError::Parse("empty input".to_string()));
    }
    if text.starts_with('{') {
        return json::read(text).map(|object| (object, Vec::new()));
    }
    if text.starts_with("+proj=") || text.starts_with("proj=") {
        return projstr::read(text);
    }
    if let Some((authority, code)) = parse_urn(text) {
        return database
            .lookup_at(authority, code, depth)
            .map(|object| (object, Vec::new()));
    }
    if let Some((authority, code)) = parse_reference(text) {
        return database
            .lookup_at(authority, code, depth)
            .map(|object| (object, Vec::new()));
    }
    if looks_like_wkt(text) {
        return wkt::read(text, false);
    }
    match database.find_by_name(text)? {
        Some(object) => Ok((object, Vec::new())),
        None => Err(NativeError::Parse(format!(
            "unrecognized format / unknown name: {text}"
        ))),
    }
}

/// `urn:ogc:def:<type>:<authority>:[<version>]:<code>`.
fn parse_urn(text: &str) -> Option<(&str, &str)> {
    let lower = text.get(..12)?;
    if !lower.eq_ignore_ascii_case("urn:ogc:def:") {
        return None;
    }
    let parts: Vec<&str> = text[12..].split(':').collect();
    match parts.as_slice() {
        [_, authority, _, code] | [_, authority, code]
            if !authority.is_empty() && !code.is_empty() =>
        {
            Some((authority, code))
        }
        _ => None,
    }
}

/// `AUTH:CODE` with no whitespace and no brackets.
fn parse_reference(text: &str) -> Option<(&str, &str)> {
    let (authority, code) = text.split_once(':')?;
    let plain = |s: &str| {
        !s.is_empty()
            && s.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
    };
    (plain(authority) && plain(code)).then_some((authority, code))
}

fn looks_like_wkt(text: &str) -> bool {
    let keyword_len = text
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(text.len());
    keyword_len > 0 && matches!(text[keyword_len..].trim_start().chars().next(), Some('[' | '('))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::object::{Crs, identity};

    #[test]
    fn grammar_reader_refuses_other_forms() {
        let wkt = r#"ELLIPSOID["GRS 1980",6378137,298.257222101,LENGTHUNIT["metre",1]]"#;
        assert!(read_grammar(wkt, Grammar::Wkt, true).is_ok());
        assert!(matches!(
            read_grammar(wkt, Grammar::Json, false),
            Err(NativeError::Parse(_))
        ));
        assert!(matches!(
            read_grammar("EPSG:4326", Grammar::Wkt, false),
            Err(NativeError::Parse(_))
        ));
        assert!(read_grammar("+proj=longlat +ellps=WGS84", Grammar::ProjString, false).is_ok());
    }

    #[test]
    fn references_and_urns_reach_the_catalog() {
        let database = Database::builtin();
        let (plain, _) = create_from_user_input("EPSG:4326", &database).expect("code");
        let (urn, _) =
            create_from_user_input("urn:ogc:def:crs:EPSG::4326", &database).expect("urn");
        let (versioned, _) =
            create_from_user_input("urn:ogc:def:crs:EPSG:10.0:4326", &database).expect("urn");
        assert_eq!(identity(&plain), identity(&urn));
        assert_eq!(identity(&plain), identity(&versioned));
    }

    #[test]
    fn names_wkt_and_proj_strings() {
        let database = Database::builtin();
        let (by_name, _) = create_from_user_input("ETRS89", &database).expect("name");
        let crs = crate::native::object::downcast::<Crs>(&by_name).expect("crs");
        assert_eq!(crs.meta.epsg_code(), Some(4258));

        let (wkt_object, _) =
            create_from_user_input(r#"ELLIPSOID["Bessel 1841",6377397.155,299.1528128]"#, &database)
                .expect("wkt");
        assert_eq!(wkt_object.metadata().map(|m| m.name.as_str()), Some("Bessel 1841"));

        let (proj_object, _) =
            create_from_user_input("+proj=longlat +datum=WGS84 +no_defs", &database)
                .expect("proj");
        assert!(crate::native::object::downcast::<Crs>(&proj_object).is_some());
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let database = Database::builtin();
        for text in ["", "not a crs", "EPSG 4326", "GEOGCRS[", "{\"type\":"] {
            assert!(
                matches!(create_from_user_input(text, &database), Err(NativeError::Parse(_))),
                "{text:?}"
            );
        }
        assert!(matches!(
            create_from_user_input("EPSG:0", &database),
            Err(NativeError::NoSuchAuthorityCode { .. })
        ));
    }
}
