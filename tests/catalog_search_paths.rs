// Catalog files found on context search paths.
use std::fs;
use std::path::Path;

use projbridge::api::{
    AuthorityFactory, Category, Context, ContextConfig, ErrorKind, Runtime, TypeTag,
};

const TEST_CRS: &str = concat!(
    r#"GEOGCRS["Test geographic",DATUM["Test datum",ELLIPSOID["Test ellipsoid",6378000,300,LENGTHUNIT["metre",1]]],"#,
    r#"PRIMEM["Greenwich",0,ANGLEUNIT["degree",0.0174532925199433]],CS[ellipsoidal,2],"#,
    r#"AXIS["geodetic latitude (Lat)",north,ORDER[1],ANGLEUNIT["degree",0.0174532925199433]],"#,
    r#"AXIS["geodetic longitude (Lon)",east,ORDER[2],ANGLEUNIT["degree",0.0174532925199433]],"#,
    r#"ID["TEST",1]]"#
);

fn write_catalog(dir: &Path, file: &str, body: &serde_json::Value) {
    fs::write(dir.join(file), serde_json::to_vec_pretty(body).expect("json")).expect("write");
}

fn fixture() -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    write_catalog(
        dir.path(),
        "a.catalog.json",
        &serde_json::json!({
            "authority": "TEST",
            "entries": [
                { "code": 1, "category": "crs", "definition": TEST_CRS },
                { "code": "E1", "category": "ellipsoid", "definition": "EPSG:7030", "name": "old" },
            ]
        }),
    );
    write_catalog(
        dir.path(),
        "b.catalog.json",
        &serde_json::json!({
            "authority": "test",
            "entries": [
                { "code": "E1", "category": "ellipsoid", "definition": "EPSG:7019", "name": "GRS 1980" },
            ]
        }),
    );
    fs::write(dir.path().join("broken.catalog.json"), "{ not json").expect("write");
    fs::write(dir.path().join("notes.json"), "{}").expect("write");
    dir
}

#[test]
fn search_path_catalogs_add_an_authority() {
    let dir = fixture();
    let context =
        Context::create(ContextConfig::new().with_search_path(dir.path())).expect("context");
    let runtime = Runtime::new();

    let crs = context
        .create_from_user_input(&runtime, "TEST:1")
        .expect("TEST:1");
    assert_eq!(crs.tag(), TypeTag::GeographicCrs);
    assert_eq!(crs.name().expect("name").as_deref(), Some("Test geographic"));
    let ellipsoid = crs.ellipsoid(&runtime).expect("ellipsoid").expect("has ellipsoid");
    assert_eq!(ellipsoid.semi_major_axis().expect("a"), 6_378_000.0);

    let factory = AuthorityFactory::new(&context, "TEST").expect("factory");
    assert_eq!(factory.codes(Some(Category::Crs)), vec!["1".to_string()]);
    assert_eq!(factory.description_text("E1").expect("name"), "GRS 1980");
    let overridden = factory
        .create_object(&runtime, TypeTag::Ellipsoid, "E1")
        .expect("E1");
    assert_eq!(overridden.name().expect("name").as_deref(), Some("GRS 1980"));
}

#[test]
fn contexts_without_the_path_do_not_see_it() {
    let context = Context::create(ContextConfig::new()).expect("context");
    let runtime = Runtime::new();
    let err = context
        .create_from_user_input(&runtime, "TEST:1")
        .expect_err("unknown authority");
    assert_eq!(err.kind(), ErrorKind::ObjectNotFoundInCatalog);
}

#[test]
fn search_path_list_is_split_like_path() {
    let dir = fixture();
    let other = tempfile::tempdir().expect("tempdir");
    let config = ContextConfig::new().with_search_paths([other.path(), dir.path()]);
    let context = Context::create(config).expect("context");
    let database = context.database().expect("database");
    assert!(database.has_authority("TEST"));
    assert_eq!(database.search_paths().len(), 2);
}
