// End-to-end bridge scenarios through the public Rust API.
use std::sync::Arc;

use projbridge::api::{
    AuthorityFactory, Context, ContextConfig, Convention, Criterion, ErrorKind, FormatOptions,
    OperationFactory, OperationOptions, ReferencingFormat, Runtime, Transform, TypeTag,
};

fn setup() -> (Runtime, Context) {
    let context = Context::create(ContextConfig::new()).expect("context");
    (Runtime::new(), context)
}

#[test]
fn same_native_object_gives_same_wrapper() {
    let (runtime, context) = setup();
    let first = context
        .create_from_user_input(&runtime, "EPSG:4326")
        .expect("4326");
    let second = context
        .create_from_user_input(&runtime, "urn:ogc:def:crs:EPSG::4326")
        .expect("4326 urn");
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.tag(), TypeTag::GeographicCrs);

    let datum = first.datum(&runtime).expect("datum").expect("has datum");
    let ellipsoid = datum.ellipsoid(&runtime).expect("ellipsoid").expect("has ellipsoid");
    let again = first
        .ellipsoid(&runtime)
        .expect("ellipsoid")
        .expect("has ellipsoid");
    assert!(Arc::ptr_eq(&ellipsoid, &again));
}

#[test]
fn dropped_wrapper_is_rebuilt_on_next_request() {
    let (runtime, context) = setup();
    let first = context
        .create_from_user_input(&runtime, "EPSG:3857")
        .expect("3857");
    let identity = first.identity();
    drop(first);
    let second = context
        .create_from_user_input(&runtime, "EPSG:3857")
        .expect("3857");
    assert_eq!(second.identity(), identity);
    assert_eq!(second.tag(), TypeTag::ProjectedCrs);
}

#[test]
fn released_wrapper_reports_invalid_handle() {
    let (runtime, context) = setup();
    let crs = context
        .create_from_user_input(&runtime, "EPSG:4326")
        .expect("4326");
    crs.release();
    crs.release();
    assert!(crs.is_released());
    let err = crs.name().expect_err("stale");
    assert_eq!(err.kind(), ErrorKind::InvalidHandle);
    let err = crs
        .format(None, Convention::Wkt2_2019, &FormatOptions::default())
        .expect_err("stale");
    assert_eq!(err.kind(), ErrorKind::InvalidHandle);
}

#[test]
fn released_wrapper_is_replaced_on_next_request() {
    let (runtime, context) = setup();
    let stale = context
        .create_from_user_input(&runtime, "EPSG:4326")
        .expect("4326");
    let identity = stale.identity();
    stale.release();

    let fresh = context
        .create_from_user_input(&runtime, "EPSG:4326")
        .expect("4326 again");
    assert!(!Arc::ptr_eq(&stale, &fresh));
    assert!(!fresh.is_released());
    assert_eq!(fresh.identity(), identity);
    assert_eq!(fresh.name().expect("name").as_deref(), Some("WGS 84"));
    assert_eq!(runtime.live_objects(), 1);

    let again = context
        .create_from_user_input(&runtime, "EPSG:4326")
        .expect("4326 third");
    assert!(Arc::ptr_eq(&fresh, &again));
}

#[test]
fn transient_wrappers_do_not_accumulate() {
    let (runtime, context) = setup();
    let factory = AuthorityFactory::new(&context, "EPSG").expect("factory");
    for _ in 0..500 {
        for code in ["4326", "3857", "32631"] {
            let object = factory
                .create_object(&runtime, TypeTag::Any, code)
                .expect("catalog object");
            object.release();
        }
    }
    assert_eq!(runtime.live_objects(), 0);
    assert!(runtime.registered_entries() < 64);
}

#[test]
fn catalog_ellipsoid_lookup() {
    let (runtime, context) = setup();
    let factory = AuthorityFactory::new(&context, "EPSG").expect("factory");
    let ellipsoid = factory
        .create_object(&runtime, TypeTag::Ellipsoid, "7030")
        .expect("7030");
    assert_eq!(ellipsoid.tag(), TypeTag::Ellipsoid);
    assert_eq!(ellipsoid.name().expect("name").as_deref(), Some("WGS 84"));
    assert_eq!(ellipsoid.identifier().expect("id").as_deref(), Some("EPSG:7030"));
    assert_eq!(ellipsoid.semi_major_axis().expect("a"), 6_378_137.0);
    assert!((ellipsoid.inverse_flattening().expect("rf") - 298.257_223_563).abs() < 1e-9);
    assert!(!ellipsoid.is_sphere().expect("sphere"));
}

#[test]
fn catalog_code_of_wrong_category_is_not_found() {
    let (runtime, context) = setup();
    let factory = AuthorityFactory::new(&context, "EPSG").expect("factory");
    let err = factory
        .create_object(&runtime, TypeTag::CoordinateReferenceSystem, "7030")
        .expect_err("not a crs");
    assert_eq!(err.kind(), ErrorKind::ObjectNotFoundInCatalog);
    assert_eq!(err.authority(), Some("EPSG"));
    assert_eq!(err.code(), Some("7030"));

    let err = factory
        .create_object(&runtime, TypeTag::Axis, "7030")
        .expect_err("unsupported");
    assert_eq!(err.kind(), ErrorKind::UnsupportedCategory);

    let err = AuthorityFactory::new(&context, "NOPE").expect_err("unknown authority");
    assert_eq!(err.kind(), ErrorKind::ObjectNotFoundInCatalog);
}

#[test]
fn geographic_to_web_mercator_operation() {
    let (runtime, context) = setup();
    let source = context
        .create_from_user_input(&runtime, "EPSG:4326")
        .expect("4326");
    let target = context
        .create_from_user_input(&runtime, "EPSG:3857")
        .expect("3857");
    let operation = OperationFactory::create_operation(
        &runtime,
        &context,
        &source,
        &target,
        &OperationOptions::default(),
    )
    .expect("search")
    .expect("operation");
    assert_eq!(operation.identifier().expect("id").as_deref(), Some("EPSG:3856"));
    let operation_source = operation.source_crs(&runtime).expect("source").expect("has source");
    assert!(Arc::ptr_eq(&operation_source, &source));

    let transform = Transform::new(&operation).expect("transform");
    let mut coords = [49.0, 2.0];
    transform.transform(2, &mut coords, 0, 1).expect("apply");
    assert!((coords[0] - 222_638.981_586_547).abs() < 1e-3);
    assert!((coords[1] - 6_274_861.394_006_577).abs() < 1e-3);
}

#[test]
fn area_of_interest_ranks_regional_transformation_first() {
    let (runtime, context) = setup();
    let source = context
        .create_from_user_input(&runtime, "EPSG:4230")
        .expect("ED50");
    let target = context
        .create_from_user_input(&runtime, "EPSG:4326")
        .expect("WGS 84");
    let options = OperationOptions::default().with_area_of_interest(2.0, 46.0, 3.0, 47.0);
    let operations =
        OperationFactory::create_operations(&runtime, &context, &source, &target, &options)
            .expect("search");
    let ids: Vec<_> = operations
        .iter()
        .map(|op| op.identifier().expect("id"))
        .collect();
    assert_eq!(
        ids,
        vec![Some("EPSG:1275".to_string()), Some("EPSG:1133".to_string())]
    );
}

#[test]
fn wkt_round_trip_gives_equivalent_object() {
    let (runtime, context) = setup();
    let crs = context
        .create_from_user_input(&runtime, "EPSG:32631")
        .expect("utm");
    for convention in [Convention::Wkt2_2019, Convention::Wkt2_2015, Convention::Json] {
        let text = crs
            .format(Some(&context), convention, &FormatOptions::default())
            .expect("format");
        let parsed =
            ReferencingFormat::parse(&runtime, &context, &text, convention, true).expect("parse");
        assert!(!Arc::ptr_eq(&parsed.object, &crs));
        assert!(
            parsed
                .object
                .is_equivalent_to(&crs, Criterion::Equivalent)
                .expect("compare"),
            "{convention:?}"
        );
        assert_eq!(parsed.object.name().expect("name"), crs.name().expect("name"));
    }
}

#[test]
fn parse_honours_convention_and_strictness() {
    let (runtime, context) = setup();
    let text = r#"ELLIPSOID["Test",6378137,298.25,LENGTHUNIT["metre",1],FLAVOUR["x"]]"#;

    let err = ReferencingFormat::parse(&runtime, &context, text, Convention::Wkt2_2019, true)
        .expect_err("strict");
    assert_eq!(err.kind(), ErrorKind::MalformedInput);
    assert!(err.message().expect("message").contains("FLAVOUR"));

    let parsed = ReferencingFormat::parse(&runtime, &context, text, Convention::Wkt2_2019, false)
        .expect("lenient");
    assert_eq!(parsed.warnings, vec!["Unknown keyword FLAVOUR".to_string()]);
    assert_eq!(parsed.object.tag(), TypeTag::Ellipsoid);

    for convention in [Convention::Json, Convention::Proj4] {
        let err = ReferencingFormat::parse(&runtime, &context, text, convention, false)
            .expect_err("wrong grammar");
        assert_eq!(err.kind(), ErrorKind::MalformedInput, "{convention:?}");
    }
    let err = ReferencingFormat::parse(&runtime, &context, "EPSG:4326", Convention::Wkt1Gdal, false)
        .expect_err("reference is not wkt");
    assert_eq!(err.kind(), ErrorKind::MalformedInput);
}

#[test]
fn contexts_cache_database_and_factories() {
    let context = Context::create(ContextConfig::new()).expect("context");
    let database = context.database().expect("database");
    assert!(Arc::ptr_eq(&database, &context.database().expect("database")));
    let factory = context.factory("EPSG").expect("factory");
    assert!(Arc::ptr_eq(&factory, &context.factory("epsg").expect("factory")));

    let sibling = Context::create(ContextConfig::new()).expect("sibling");
    sibling.share_database_from(&context).expect("share");
    assert!(Arc::ptr_eq(&database, &sibling.database().expect("database")));

    context.destroy();
    let err = context.database().expect_err("destroyed");
    assert_eq!(err.kind(), ErrorKind::InvalidHandle);
    assert!(Arc::ptr_eq(&database, &sibling.database().expect("database")));
}

#[test]
fn unparseable_input_is_malformed() {
    let (runtime, context) = setup();
    for text in ["", "GEOGCRS[\"broken\"", "no such thing anywhere"] {
        let err = context
            .create_from_user_input(&runtime, text)
            .expect_err("malformed");
        assert_eq!(err.kind(), ErrorKind::MalformedInput, "{text:?}");
    }
    assert_eq!(runtime.live_objects(), 0);
    assert!(runtime.registered_entries() < 64);
}
