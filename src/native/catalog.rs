//! Purpose: Authority catalog: built-in EPSG subset plus JSON catalog files.
//! Exports: `Database`, `AuthorityFactory`, `Category`, `CatalogOperation`, `CATALOG_SUFFIX`.
//! Role: Native stand-in for the external catalog database; one per context unless shared.
//! Invariants: Lookups of the same code through one database return the same object.
//! Invariants: Catalog files that fail to parse are skipped with a warning, never fatal.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Deserialize;
use tracing::{debug, warn};

use super::context::NativeContext;
use super::input;
use super::object::{BaseObject, Capability, NativeRef, UnitOfMeasure, as_native, downcast};
use super::operation::{CoordinateOperation, OperationKind};
use super::{NativeError, NativeResult};

pub const CATALOG_SUFFIX: &str = ".catalog.json";

static NEXT_DATABASE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Ellipsoid,
    PrimeMeridian,
    Datum,
    Crs,
    CoordinateOperation,
    Unit,
    CoordinateSystem,
}

impl Category {
    pub fn capability(self) -> Capability {
        match self {
            Category::Ellipsoid => Capability::Ellipsoid,
            Category::PrimeMeridian => Capability::PrimeMeridian,
            Category::Datum => Capability::Datum,
            Category::Crs => Capability::Crs,
            Category::CoordinateOperation => Capability::CoordinateOperation,
            Category::Unit => Capability::UnitOfMeasure,
            Category::CoordinateSystem => Capability::CoordinateSystem,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Category::Ellipsoid => "ellipsoid",
            Category::PrimeMeridian => "prime meridian",
            Category::Datum => "datum",
            Category::Crs => "crs",
            Category::CoordinateOperation => "coordinate operation",
            Category::Unit => "unit of measure",
            Category::CoordinateSystem => "coordinate system",
        }
    }
}

#[derive(Clone, Debug)]
struct Entry {
    code: String,
    category: Category,
    name: Option<String>,
    definition: Cow<'static, str>,
    superseded: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CodeText {
    Text(String),
    Number(u64),
}

impl CodeText {
    fn into_string(self) -> String {
        match self {
            CodeText::Text(text) => text,
            CodeText::Number(n) => n.to_string(),
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
    authority: String,
    entries: Vec<FileEntry>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct FileEntry {
    code: CodeText,
    category: Category,
    definition: String,
    #[serde(default)]
    superseded: bool,
    #[serde(default)]
    name: Option<String>,
}

/// Catalog transformation with its catalog status.
#[derive(Clone, Debug)]
pub struct CatalogOperation {
    pub operation: Arc<CoordinateOperation>,
    pub superseded: bool,
}

macro_rules! degree {
    () => {
        r#"ANGLEUNIT["degree",0.0174532925199433]"#
    };
}

macro_rules! metre {
    () => {
        r#"LENGTHUNIT["metre",1]"#
    };
}

macro_rules! greenwich {
    () => {
        concat!(r#"PRIMEM["Greenwich",0,"#, degree!(), "]")
    };
}

macro_rules! wgs84_datum {
    () => {
        concat!(
            r#"DATUM["World Geodetic System 1984",ELLIPSOID["WGS 84",6378137,298.257223563,"#,
            metre!(),
            "]]"
        )
    };
}

macro_rules! etrs89_datum {
    () => {
        concat!(
            r#"DATUM["European Terrestrial Reference System 1989",ELLIPSOID["GRS 1980",6378137,298.257222101,"#,
            metre!(),
            "]]"
        )
    };
}

macro_rules! ed50_datum {
    () => {
        concat!(
            r#"DATUM["European Datum 1950",ELLIPSOID["International 1924",6378388,297,"#,
            metre!(),
            "]]"
        )
    };
}

macro_rules! lat_lon_cs {
    () => {
        concat!(
            r#"CS[ellipsoidal,2],AXIS["geodetic latitude (Lat)",north,ORDER[1],"#,
            degree!(),
            r#"],AXIS["geodetic longitude (Lon)",east,ORDER[2],"#,
            degree!(),
            "]"
        )
    };
}

macro_rules! geographic {
    ($name:literal, $datum:expr, $code:literal) => {
        concat!(
            r#"GEOGCRS[""#,
            $name,
            r#"","#,
            $datum,
            ",",
            greenwich!(),
            ",",
            lat_lon_cs!(),
            r#",ID["EPSG","#,
            $code,
            "]]"
        )
    };
}

macro_rules! egm2008_height {
    () => {
        concat!(
            r#"VERTCRS["EGM2008 height",VDATUM["EGM2008 geoid"],CS[vertical,1],AXIS["gravity-related height (H)",up,"#,
            metre!(),
            r#"],ID["EPSG",3855]]"#
        )
    };
}

macro_rules! parameter {
    ($name:literal, $value:literal, $unit:expr, $code:literal) => {
        concat!(
            r#"PARAMETER[""#,
            $name,
            r#"","#,
            $value,
            ",",
            $unit,
            r#",ID["EPSG","#,
            $code,
            "]]"
        )
    };
}

macro_rules! pseudo_mercator_conversion {
    () => {
        concat!(
            r#"CONVERSION["Popular Visualisation Pseudo-Mercator",METHOD["Popular Visualisation Pseudo Mercator",ID["EPSG",1024]],"#,
            parameter!("Latitude of natural origin", "0", degree!(), "8801"),
            ",",
            parameter!("Longitude of natural origin", "0", degree!(), "8802"),
            ",",
            parameter!("False easting", "0", metre!(), "8806"),
            ",",
            parameter!("False northing", "0", metre!(), "8807"),
            r#",ID["EPSG",3856]]"#
        )
    };
}

macro_rules! utm_31n_conversion {
    () => {
        concat!(
            r#"CONVERSION["UTM zone 31N",METHOD["Transverse Mercator",ID["EPSG",9807]],"#,
            parameter!("Latitude of natural origin", "0", degree!(), "8801"),
            ",",
            parameter!("Longitude of natural origin", "3", degree!(), "8802"),
            ",",
            parameter!("Scale factor at natural origin", "0.9996", r#"SCALEUNIT["unity",1]"#, "8805"),
            ",",
            parameter!("False easting", "500000", metre!(), "8806"),
            ",",
            parameter!("False northing", "0", metre!(), "8807"),
            r#",ID["EPSG",16031]]"#
        )
    };
}

macro_rules! translation {
    ($name:literal, $source:expr, $tx:literal, $ty:literal, $tz:literal, $accuracy:literal, $usage:literal, $code:literal) => {
        concat!(
            r#"COORDINATEOPERATION[""#,
            $name,
            r#"",SOURCECRS["#,
            $source,
            "],TARGETCRS[",
            geographic!("WGS 84", wgs84_datum!(), "4326"),
            r#"],METHOD["Geocentric translations (geog2D domain)",ID["EPSG",9603]],"#,
            parameter!("X-axis translation", $tx, metre!(), "8605"),
            ",",
            parameter!("Y-axis translation", $ty, metre!(), "8606"),
            ",",
            parameter!("Z-axis translation", $tz, metre!(), "8607"),
            ",OPERATIONACCURACY[",
            $accuracy,
            "],",
            $usage,
            r#",ID["EPSG","#,
            $code,
            "]]"
        )
    };
}

/// Code, category, name, definition.
const BUILTIN: &[(&str, Category, &str, &str)] = &[
    (
        "7030",
        Category::Ellipsoid,
        "WGS 84",
        concat!(r#"ELLIPSOID["WGS 84",6378137,298.257223563,"#, metre!(), r#",ID["EPSG",7030]]"#),
    ),
    (
        "7019",
        Category::Ellipsoid,
        "GRS 1980",
        concat!(r#"ELLIPSOID["GRS 1980",6378137,298.257222101,"#, metre!(), r#",ID["EPSG",7019]]"#),
    ),
    (
        "7022",
        Category::Ellipsoid,
        "International 1924",
        concat!(r#"ELLIPSOID["International 1924",6378388,297,"#, metre!(), r#",ID["EPSG",7022]]"#),
    ),
    (
        "8901",
        Category::PrimeMeridian,
        "Greenwich",
        concat!(r#"PRIMEM["Greenwich",0,"#, degree!(), r#",ID["EPSG",8901]]"#),
    ),
    (
        "6326",
        Category::Datum,
        "World Geodetic System 1984",
        concat!(
            r#"DATUM["World Geodetic System 1984",ELLIPSOID["WGS 84",6378137,298.257223563,"#,
            metre!(),
            r#"],ID["EPSG",6326]]"#
        ),
    ),
    (
        "6258",
        Category::Datum,
        "European Terrestrial Reference System 1989",
        concat!(
            r#"DATUM["European Terrestrial Reference System 1989",ELLIPSOID["GRS 1980",6378137,298.257222101,"#,
            metre!(),
            r#"],ID["EPSG",6258]]"#
        ),
    ),
    (
        "6230",
        Category::Datum,
        "European Datum 1950",
        concat!(
            r#"DATUM["European Datum 1950",ELLIPSOID["International 1924",6378388,297,"#,
            metre!(),
            r#"],ID["EPSG",6230]]"#
        ),
    ),
    (
        "1027",
        Category::Datum,
        "EGM2008 geoid",
        r#"VDATUM["EGM2008 geoid",ID["EPSG",1027]]"#,
    ),
    (
        "4326",
        Category::Crs,
        "WGS 84",
        concat!(
            r#"GEOGCRS["WGS 84","#,
            wgs84_datum!(),
            ",",
            greenwich!(),
            ",",
            lat_lon_cs!(),
            r#",USAGE[SCOPE["Horizontal component of 3D system."],AREA["World."],BBOX[-90,-180,90,180]],ID["EPSG",4326]]"#
        ),
    ),
    (
        "4978",
        Category::Crs,
        "WGS 84",
        concat!(
            r#"GEODCRS["WGS 84","#,
            wgs84_datum!(),
            ",",
            greenwich!(),
            r#",CS[Cartesian,3],AXIS["(X)",geocentricX,ORDER[1],"#,
            metre!(),
            r#"],AXIS["(Y)",geocentricY,ORDER[2],"#,
            metre!(),
            r#"],AXIS["(Z)",geocentricZ,ORDER[3],"#,
            metre!(),
            r#"],USAGE[SCOPE["Geodesy."],AREA["World."],BBOX[-90,-180,90,180]],ID["EPSG",4978]]"#
        ),
    ),
    (
        "4258",
        Category::Crs,
        "ETRS89",
        concat!(
            r#"GEOGCRS["ETRS89","#,
            etrs89_datum!(),
            ",",
            greenwich!(),
            ",",
            lat_lon_cs!(),
            r#",USAGE[SCOPE["Horizontal component of 3D system."],AREA["Europe - onshore and offshore."],BBOX[32.88,-16.1,84.73,40.18]],ID["EPSG",4258]]"#
        ),
    ),
    (
        "4230",
        Category::Crs,
        "ED50",
        concat!(
            r#"GEOGCRS["ED50","#,
            ed50_datum!(),
            ",",
            greenwich!(),
            ",",
            lat_lon_cs!(),
            r#",USAGE[SCOPE["Geodesy."],AREA["Europe - west."],BBOX[25.71,-16.1,84.73,48.61]],ID["EPSG",4230]]"#
        ),
    ),
    (
        "3857",
        Category::Crs,
        "WGS 84 / Pseudo-Mercator",
        concat!(
            r#"PROJCRS["WGS 84 / Pseudo-Mercator",BASEGEOGCRS["WGS 84","#,
            wgs84_datum!(),
            ",",
            greenwich!(),
            r#",ID["EPSG",4326]],"#,
            pseudo_mercator_conversion!(),
            r#",CS[Cartesian,2],AXIS["easting (X)",east,ORDER[1],"#,
            metre!(),
            r#"],AXIS["northing (Y)",north,ORDER[2],"#,
            metre!(),
            r#"],USAGE[SCOPE["Web mapping and visualisation."],AREA["World between 85.06°S and 85.06°N."],BBOX[-85.06,-180,85.06,180]],ID["EPSG",3857]]"#
        ),
    ),
    (
        "32631",
        Category::Crs,
        "WGS 84 / UTM zone 31N",
        concat!(
            r#"PROJCRS["WGS 84 / UTM zone 31N",BASEGEOGCRS["WGS 84","#,
            wgs84_datum!(),
            ",",
            greenwich!(),
            r#",ID["EPSG",4326]],"#,
            utm_31n_conversion!(),
            r#",CS[Cartesian,2],AXIS["(E)",east,ORDER[1],"#,
            metre!(),
            r#"],AXIS["(N)",north,ORDER[2],"#,
            metre!(),
            r#"],USAGE[SCOPE["Navigation and medium accuracy spatial referencing."],AREA["Between 0°E and 6°E, northern hemisphere."],BBOX[0,0,84,6]],ID["EPSG",32631]]"#
        ),
    ),
    ("3855", Category::Crs, "EGM2008 height", egm2008_height!()),
    (
        "9518",
        Category::Crs,
        "WGS 84 + EGM2008 height",
        concat!(
            r#"COMPOUNDCRS["WGS 84 + EGM2008 height","#,
            geographic!("WGS 84", wgs84_datum!(), "4326"),
            ",",
            egm2008_height!(),
            r#",USAGE[SCOPE["Geodesy."],AREA["World."],BBOX[-90,-180,90,180]],ID["EPSG",9518]]"#
        ),
    ),
    (
        "3856",
        Category::CoordinateOperation,
        "Popular Visualisation Pseudo-Mercator",
        pseudo_mercator_conversion!(),
    ),
    (
        "16031",
        Category::CoordinateOperation,
        "UTM zone 31N",
        utm_31n_conversion!(),
    ),
    (
        "1133",
        Category::CoordinateOperation,
        "ED50 to WGS 84 (1)",
        translation!(
            "ED50 to WGS 84 (1)",
            geographic!("ED50", ed50_datum!(), "4230"),
            "-87",
            "-98",
            "-121",
            "10",
            r#"USAGE[SCOPE["Approximation for medium and low accuracy applications."],AREA["Europe - west."],BBOX[34.88,-10.56,71.21,31.59]]"#,
            "1133"
        ),
    ),
    (
        "1275",
        Category::CoordinateOperation,
        "ED50 to WGS 84 (17)",
        translation!(
            "ED50 to WGS 84 (17)",
            geographic!("ED50", ed50_datum!(), "4230"),
            "-84",
            "-97",
            "-117",
            "2",
            r#"USAGE[SCOPE["Approximation at the 2m level."],AREA["France - onshore."],BBOX[41.15,-9.86,51.56,10.38]]"#,
            "1275"
        ),
    ),
    (
        "1149",
        Category::CoordinateOperation,
        "ETRS89 to WGS 84 (1)",
        translation!(
            "ETRS89 to WGS 84 (1)",
            geographic!("ETRS89", etrs89_datum!(), "4258"),
            "0",
            "0",
            "0",
            "1",
            r#"USAGE[SCOPE["Approximation at the 1m level."],AREA["Europe - onshore and offshore."],BBOX[32.88,-16.1,84.73,40.18]]"#,
            "1149"
        ),
    ),
    (
        "9001",
        Category::Unit,
        "metre",
        r#"LENGTHUNIT["metre",1,ID["EPSG",9001]]"#,
    ),
    (
        "9101",
        Category::Unit,
        "radian",
        r#"ANGLEUNIT["radian",1,ID["EPSG",9101]]"#,
    ),
    (
        "9102",
        Category::Unit,
        "degree",
        r#"ANGLEUNIT["degree",0.0174532925199433,ID["EPSG",9102]]"#,
    ),
    (
        "9122",
        Category::Unit,
        "degree (supplier to define representation)",
        r#"ANGLEUNIT["degree (supplier to define representation)",0.0174532925199433,ID["EPSG",9122]]"#,
    ),
    (
        "9201",
        Category::Unit,
        "unity",
        r#"SCALEUNIT["unity",1,ID["EPSG",9201]]"#,
    ),
    (
        "6422",
        Category::CoordinateSystem,
        "Ellipsoidal 2D CS. Axes: latitude, longitude. Orientations: north, east. UoM: degree",
        r#"{"type":"CoordinateSystem","subtype":"ellipsoidal","axis":[{"name":"Geodetic latitude","abbreviation":"Lat","direction":"north","unit":"degree"},{"name":"Geodetic longitude","abbreviation":"Lon","direction":"east","unit":"degree"}],"id":{"authority":"EPSG","code":6422}}"#,
    ),
    (
        "6500",
        Category::CoordinateSystem,
        "Cartesian 3D CS (geocentric). Axes: geocentric X,Y,Z. Orientations: X and Y in equatorial plane, X positive through intersection with prime meridian, Y through 0°N 90°E. Z axis parallel to mean earth rotation axis and positive towards North Pole. UoM: m.",
        r#"{"type":"CoordinateSystem","subtype":"Cartesian","axis":[{"name":"Geocentric X","abbreviation":"X","direction":"geocentricX","unit":"metre"},{"name":"Geocentric Y","abbreviation":"Y","direction":"geocentricY","unit":"metre"},{"name":"Geocentric Z","abbreviation":"Z","direction":"geocentricZ","unit":"metre"}],"id":{"authority":"EPSG","code":6500}}"#,
    ),
    (
        "4400",
        Category::CoordinateSystem,
        "Cartesian 2D CS. Axes: easting, northing (E,N). Orientations: east, north. UoM: m.",
        r#"{"type":"CoordinateSystem","subtype":"Cartesian","axis":[{"name":"Easting","abbreviation":"E","direction":"east","unit":"metre"},{"name":"Northing","abbreviation":"N","direction":"north","unit":"metre"}],"id":{"authority":"EPSG","code":4400}}"#,
    ),
    (
        "6499",
        Category::CoordinateSystem,
        "Vertical CS. Axis: height (H). Orientation: up. UoM: m.",
        r#"{"type":"CoordinateSystem","subtype":"vertical","axis":[{"name":"Gravity-related height","abbreviation":"H","direction":"up","unit":"metre"}],"id":{"authority":"EPSG","code":6499}}"#,
    ),
];

/// Catalog database shared by the authority factories of one or more contexts.
#[derive(Debug)]
pub struct Database {
    id: u64,
    authorities: Vec<(String, Vec<Entry>)>,
    search_paths: Vec<PathBuf>,
    memo: Mutex<HashMap<(String, String), NativeRef>>,
}

impl Database {
    /// Built-in catalog only.
    pub fn builtin() -> Self {
        let entries = BUILTIN
            .iter()
            .map(|(code, category, name, definition)| Entry {
                code: code.to_string(),
                category: *category,
                name: Some(name.to_string()),
                definition: Cow::Borrowed(*definition),
                superseded: false,
            })
            .collect();
        Self {
            id: NEXT_DATABASE_ID.fetch_add(1, Ordering::Relaxed),
            authorities: vec![("EPSG".to_string(), entries)],
            search_paths: Vec::new(),
            memo: Mutex::new(HashMap::new()),
        }
    }

    /// Built-in catalog extended with the catalog files found in the context's search paths.
    pub fn open(context: &NativeContext) -> Self {
        let mut database = Self::builtin();
        database.search_paths = context.search_paths().to_vec();
        for dir in context.search_paths() {
            for path in catalog_files(dir) {
                match load_file(&path) {
                    Ok(file) => database.merge(file),
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "skipping catalog file");
                    }
                }
            }
        }
        debug!(
            database = database.id,
            authorities = database.authorities.len(),
            "opened catalog database"
        );
        database
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    pub fn authorities(&self) -> Vec<&str> {
        self.authorities.iter().map(|(a, _)| a.as_str()).collect()
    }

    fn merge(&mut self, file: CatalogFile) {
        let authority = file.authority;
        let index = match self
            .authorities
            .iter()
            .position(|(a, _)| a.eq_ignore_ascii_case(&authority))
        {
            Some(index) => index,
            None => {
                self.authorities.push((authority, Vec::new()));
                self.authorities.len() - 1
            }
        };
        let entries = &mut self.authorities[index].1;
        for entry in file.entries {
            let entry = Entry {
                code: entry.code.into_string(),
                category: entry.category,
                name: entry.name,
                definition: Cow::Owned(entry.definition),
                superseded: entry.superseded,
            };
            entries.retain(|e| e.code != entry.code);
            entries.push(entry);
        }
    }

    fn entries(&self, authority: &str) -> Option<(&str, &[Entry])> {
        self.authorities
            .iter()
            .find(|(a, _)| a.eq_ignore_ascii_case(authority))
            .map(|(a, entries)| (a.as_str(), entries.as_slice()))
    }

    fn entry(&self, authority: &str, code: &str) -> Option<(&str, &Entry)> {
        let (authority, entries) = self.entries(authority)?;
        entries
            .iter()
            .find(|e| e.code == code)
            .map(|entry| (authority, entry))
    }

    pub fn has_authority(&self, authority: &str) -> bool {
        self.entries(authority).is_some()
    }

    pub fn category_of(&self, authority: &str, code: &str) -> Option<Category> {
        self.entry(authority, code).map(|(_, e)| e.category)
    }

    /// Object registered under `authority:code`, built once and then shared.
    pub fn lookup(&self, authority: &str, code: &str) -> NativeResult<NativeRef> {
        self.lookup_at(authority, code, 0)
    }

    pub(crate) fn lookup_at(
        &self,
        authority: &str,
        code: &str,
        depth: usize,
    ) -> NativeResult<NativeRef> {
        let (authority, entry) = self
            .entry(authority, code)
            .ok_or_else(|| NativeError::no_such_code(authority, code, "Object"))?;
        let key = (authority.to_string(), entry.code.clone());
        if let Some(object) = self.memo().get(&key) {
            return Ok(Arc::clone(object));
        }
        let object = self.build(authority, entry, depth)?;
        let mut memo = self.memo();
        Ok(Arc::clone(memo.entry(key).or_insert(object)))
    }

    fn memo(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), NativeRef>> {
        self.memo.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn build(&self, authority: &str, entry: &Entry, depth: usize) -> NativeResult<NativeRef> {
        let (object, _) = input::create_at(&entry.definition, self, depth + 1)?;
        if !object.capabilities().contains(entry.category.capability()) {
            return Err(NativeError::Parse(format!(
                "Definition of {authority}:{} is not a {}",
                entry.code,
                entry.category.label()
            )));
        }
        if let Some(unit) = downcast::<UnitOfMeasure>(&object) {
            let code = Some((authority.to_string(), entry.code.clone()));
            if unit.code != code {
                let unit = UnitOfMeasure {
                    code,
                    ..(*unit).clone()
                };
                return Ok(as_native(&Arc::new(unit)));
            }
        }
        Ok(object)
    }

    /// First object whose name matches exactly, searching every authority.
    pub fn find_by_name(&self, name: &str) -> NativeResult<Option<NativeRef>> {
        for (authority, entries) in &self.authorities {
            for entry in entries {
                let matches = match &entry.name {
                    Some(entry_name) => entry_name == name,
                    None => self
                        .lookup(authority, &entry.code)?
                        .metadata()
                        .is_some_and(|meta| meta.name == name),
                };
                if matches {
                    return self.lookup(authority, &entry.code).map(Some);
                }
            }
        }
        Ok(None)
    }

    /// Every catalog operation that is a transformation with known source and target CRSs.
    pub fn transformations(&self) -> NativeResult<Vec<CatalogOperation>> {
        let mut out = Vec::new();
        for (authority, entries) in &self.authorities {
            for entry in entries
                .iter()
                .filter(|e| e.category == Category::CoordinateOperation)
            {
                let object = self.lookup(authority, &entry.code)?;
                let Some(operation) = downcast::<CoordinateOperation>(&object) else {
                    continue;
                };
                let usable = !matches!(operation.kind, OperationKind::Conversion(_))
                    && operation.source.is_some()
                    && operation.target.is_some();
                if usable {
                    out.push(CatalogOperation {
                        operation,
                        superseded: entry.superseded,
                    });
                }
            }
        }
        Ok(out)
    }
}

fn catalog_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(read) = fs::read_dir(dir) else {
        debug!(dir = %dir.display(), "catalog search path not readable");
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = read
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(CATALOG_SUFFIX))
        })
        .collect();
    files.sort();
    files
}

fn load_file(path: &Path) -> Result<CatalogFile, String> {
    let text = fs::read_to_string(path).map_err(|e| e.to_string())?;
    serde_json::from_str(&text).map_err(|e| e.to_string())
}

/// Per-authority view of a database.
#[derive(Debug)]
pub struct AuthorityFactory {
    authority: String,
    database: Arc<Database>,
}

impl AuthorityFactory {
    pub fn new(database: Arc<Database>, authority: &str) -> NativeResult<Self> {
        if !database.has_authority(authority) {
            return Err(NativeError::NoSuchAuthorityCode {
                authority: authority.to_string(),
                code: String::new(),
                message: format!("Unknown authority {authority}"),
            });
        }
        Ok(Self {
            authority: authority.to_string(),
            database,
        })
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.database
    }

    /// Object of any category.
    pub fn create_object(&self, code: &str) -> NativeResult<NativeRef> {
        self.database.lookup(&self.authority, code)
    }

    /// Object of the given category; other categories are reported as missing codes.
    pub fn create(&self, code: &str, required: Capability) -> NativeResult<NativeRef> {
        let what = describe(required);
        let object = self
            .database
            .lookup(&self.authority, code)
            .map_err(|err| match err {
                NativeError::NoSuchAuthorityCode { .. } => {
                    NativeError::no_such_code(&self.authority, code, what)
                }
                other => other,
            })?;
        if !object.capabilities().contains(required) {
            return Err(NativeError::no_such_code(&self.authority, code, what));
        }
        Ok(object)
    }

    /// Name of the object registered under `code`.
    pub fn description_text(&self, code: &str) -> NativeResult<String> {
        if let Some((_, entry)) = self.database.entry(&self.authority, code)
            && let Some(name) = &entry.name
        {
            return Ok(name.clone());
        }
        let object = self.create_object(code)?;
        Ok(object
            .metadata()
            .map(|meta| meta.name.clone())
            .unwrap_or_default())
    }

    /// Codes registered in the given category, in catalog order.
    pub fn codes(&self, category: Option<Category>) -> Vec<String> {
        self.database
            .entries(&self.authority)
            .map(|(_, entries)| {
                entries
                    .iter()
                    .filter(|e| category.is_none_or(|c| c == e.category))
                    .map(|e| e.code.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn describe(capability: Capability) -> &'static str {
    match capability {
        Capability::Ellipsoid => "ellipsoid",
        Capability::PrimeMeridian => "prime meridian",
        Capability::Datum
        | Capability::GeodeticReferenceFrame
        | Capability::VerticalReferenceFrame
        | Capability::TemporalDatum
        | Capability::EngineeringDatum => "datum",
        Capability::UnitOfMeasure => "unit of measure",
        Capability::CoordinateSystem
        | Capability::CartesianCs
        | Capability::SphericalCs
        | Capability::EllipsoidalCs
        | Capability::VerticalCs
        | Capability::TemporalCs => "coordinate system",
        Capability::CoordinateOperation
        | Capability::Conversion
        | Capability::Transformation
        | Capability::SingleOperation
        | Capability::ConcatenatedOperation => "coordinate operation",
        Capability::OperationMethod => "operation method",
        Capability::Crs
        | Capability::SingleCrs
        | Capability::DerivedCrs
        | Capability::GeodeticCrs
        | Capability::GeographicCrs
        | Capability::Geocentric
        | Capability::ProjectedCrs
        | Capability::VerticalCrs
        | Capability::TemporalCrs
        | Capability::EngineeringCrs
        | Capability::CompoundCrs => "crs",
        _ => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::object::{Crs, Ellipsoid, identity};

    #[test]
    fn every_builtin_definition_builds_in_its_category() {
        let database = Database::builtin();
        let factory = AuthorityFactory::new(Arc::new(database), "EPSG").expect("factory");
        for code in factory.codes(None) {
            let object = factory
                .create_object(&code)
                .unwrap_or_else(|e| panic!("EPSG:{code}: {e}"));
            let name = object.metadata().map(|m| m.name.clone()).unwrap_or_default();
            if let Some(meta) = object.metadata()
                && !meta.identifiers.is_empty()
            {
                assert_eq!(meta.epsg_code().map(|c| c.to_string()), Some(code.clone()));
            }
            assert!(name.is_empty() || factory.description_text(&code).is_ok());
        }
    }

    #[test]
    fn repeated_lookups_share_one_object() {
        let database = Database::builtin();
        let a = database.lookup("EPSG", "4326").expect("4326");
        let b = database.lookup("epsg", "4326").expect("4326");
        assert_eq!(identity(&a), identity(&b));
        let other = Database::builtin().lookup("EPSG", "4326").expect("4326");
        assert_ne!(identity(&a), identity(&other));
    }

    #[test]
    fn wrong_category_is_a_missing_code() {
        let factory = AuthorityFactory::new(Arc::new(Database::builtin()), "EPSG").expect("factory");
        let ellipsoid = factory.create("7030", Capability::Ellipsoid).expect("ellipsoid");
        let ellipsoid = downcast::<Ellipsoid>(&ellipsoid).expect("downcast");
        assert_eq!(ellipsoid.semi_major, 6378137.0);
        let err = factory.create("7030", Capability::Crs).unwrap_err();
        assert_eq!(
            err,
            NativeError::NoSuchAuthorityCode {
                authority: "EPSG".into(),
                code: "7030".into(),
                message: "crs not found: EPSG:7030".into(),
            }
        );
        assert!(matches!(
            factory.create_object("999999"),
            Err(NativeError::NoSuchAuthorityCode { .. })
        ));
        assert!(AuthorityFactory::new(Arc::new(Database::builtin()), "NOPE").is_err());
    }

    #[test]
    fn units_keep_their_catalog_code() {
        let database = Database::builtin();
        let unit = database.lookup("EPSG", "9102").expect("unit");
        let unit = downcast::<UnitOfMeasure>(&unit).expect("unit");
        assert_eq!(unit.code, Some(("EPSG".into(), "9102".into())));
    }

    #[test]
    fn names_and_transformations() {
        let database = Database::builtin();
        let found = database
            .find_by_name("WGS 84 / UTM zone 31N")
            .expect("search")
            .expect("found");
        assert!(downcast::<Crs>(&found).is_some());
        assert!(database.find_by_name("Atlantis").expect("search").is_none());
        let codes: Vec<u32> = database
            .transformations()
            .expect("transformations")
            .iter()
            .filter_map(|t| t.operation.meta.epsg_code())
            .collect();
        assert_eq!(codes, vec![1133, 1275, 1149]);
    }
}
