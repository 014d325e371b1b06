//! Purpose: Well-known text reader and writer.
//! Exports: `read`, `write`, `WktStyle`, `WktVersion`, `WktNode`.
//! Role: Builds objects from WKT2 (2015, 2019) and WKT1 (GDAL, ESRI) text and writes them back.
//! Invariants: Writing then reading yields an object equivalent to the original.
//! Invariants: WKT1 flavours cannot express coordinate operations.

mod reader;
mod tree;
mod writer;

pub use reader::read;
pub use tree::{WktNode, WktValue, format_number, parse};
pub use writer::{WktStyle, WktVersion, write};

/// Canonical name, GDAL WKT1 name, ESRI name.
const DATUM_NAMES: &[(&str, &str, &str)] = &[
    ("World Geodetic System 1984", "WGS_1984", "D_WGS_1984"),
    (
        "European Terrestrial Reference System 1989",
        "European_Terrestrial_Reference_System_1989",
        "D_ETRS_1989",
    ),
    ("European Datum 1950", "European_Datum_1950", "D_European_1950"),
    ("EGM2008 geoid", "EGM2008_geoid", "EGM2008_Geoid"),
];

/// Canonical name, ESRI name, for CRS and ellipsoid names.
const ESRI_NAMES: &[(&str, &str)] = &[
    ("WGS 84 / Pseudo-Mercator", "WGS_1984_Web_Mercator_Auxiliary_Sphere"),
    ("WGS 84", "WGS_1984"),
    ("GRS 1980", "GRS_1980"),
    ("International 1924", "International_1924"),
    ("ETRS89", "ETRS_1989"),
    ("ED50", "European_1950"),
    ("EGM2008 height", "EGM2008_Geoid"),
];

fn underscored(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_end_matches('_').to_string()
}

pub(crate) fn gdal_datum_name(name: &str) -> String {
    DATUM_NAMES
        .iter()
        .find(|(canonical, ..)| *canonical == name)
        .map_or_else(|| underscored(name), |(_, gdal, _)| gdal.to_string())
}

pub(crate) fn esri_datum_name(name: &str) -> String {
    DATUM_NAMES
        .iter()
        .find(|(canonical, ..)| *canonical == name)
        .map_or_else(|| format!("D_{}", esri_name(name)), |(.., esri)| esri.to_string())
}

pub(crate) fn esri_name(name: &str) -> String {
    if let Some((_, esri)) = ESRI_NAMES.iter().find(|(canonical, _)| *canonical == name) {
        return esri.to_string();
    }
    let mut text = name.to_string();
    for (canonical, esri) in ESRI_NAMES {
        if let Some(rest) = text.strip_prefix(&format!("{canonical} / ")) {
            text = format!("{esri}_{rest}");
            break;
        }
    }
    underscored(&text.replace(" zone ", " Zone "))
}

/// Reverses the WKT1 datum name mappings.
pub(crate) fn canonical_datum_name(name: &str) -> String {
    if let Some((canonical, ..)) = DATUM_NAMES
        .iter()
        .find(|(canonical, gdal, esri)| *canonical == name || *gdal == name || *esri == name)
    {
        return canonical.to_string();
    }
    name.strip_prefix("D_").unwrap_or(name).replace('_', " ")
}

/// Reverses the ESRI CRS and ellipsoid name mappings.
pub(crate) fn canonical_esri_name(name: &str) -> String {
    let bare = name.strip_prefix("GCS_").unwrap_or(name);
    if let Some((canonical, _)) = ESRI_NAMES.iter().find(|(_, esri)| *esri == bare) {
        return canonical.to_string();
    }
    if bare.contains(' ') {
        return bare.to_string();
    }
    bare.replace('_', " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datum_names_map_both_ways() {
        let canonical = "World Geodetic System 1984";
        assert_eq!(gdal_datum_name(canonical), "WGS_1984");
        assert_eq!(esri_datum_name(canonical), "D_WGS_1984");
        assert_eq!(canonical_datum_name("WGS_1984"), canonical);
        assert_eq!(canonical_datum_name("D_WGS_1984"), canonical);
        assert_eq!(canonical_datum_name("D_Some_Local_Datum"), "Some Local Datum");
    }

    #[test]
    fn esri_names_for_projected_systems() {
        assert_eq!(esri_name("WGS 84 / UTM zone 31N"), "WGS_1984_UTM_Zone_31N");
        assert_eq!(
            esri_name("WGS 84 / Pseudo-Mercator"),
            "WGS_1984_Web_Mercator_Auxiliary_Sphere"
        );
        assert_eq!(canonical_esri_name("GCS_WGS_1984"), "WGS 84");
    }
}
