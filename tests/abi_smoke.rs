// C ABI smoke test with a minimal managed runtime built from callbacks.
use std::ffi::{CStr, CString, c_void};
use std::ptr;
use std::sync::Mutex;

use projbridge::abi::*;
use projbridge::api::{ErrorKind, TypeTag, to_status_code};

/// Stand-in for a managed heap: token `n` is entry `n - 1`.
#[derive(Default)]
struct Registry {
    entries: Mutex<Vec<(usize, u64)>>,
    refuse: bool,
}

impl Registry {
    fn handle(&self, token: u64) -> u64 {
        self.entries.lock().unwrap()[token as usize - 1].1
    }

    fn release_all(&self) {
        for (_, handle) in self.entries.lock().unwrap().drain(..) {
            pjb_object_release(handle);
        }
    }
}

extern "C" fn find_wrapper(user_data: *mut c_void, identity: usize) -> u64 {
    let registry = unsafe { &*(user_data as *const Registry) };
    let entries = registry.entries.lock().unwrap();
    entries
        .iter()
        .position(|(id, _)| *id == identity)
        .map_or(0, |index| index as u64 + 1)
}

extern "C" fn wrap_object(user_data: *mut c_void, _type_code: i32, handle: u64) -> u64 {
    let registry = unsafe { &*(user_data as *const Registry) };
    if registry.refuse {
        return 0;
    }
    let mut entries = registry.entries.lock().unwrap();
    entries.push((pjb_object_identity(handle), handle));
    entries.len() as u64
}

fn new_runtime(registry: &Registry) -> *mut pjb_runtime {
    let mut runtime = ptr::null_mut();
    let mut err = ptr::null_mut();
    let rc = pjb_runtime_new(
        registry as *const Registry as *mut c_void,
        Some(find_wrapper),
        Some(wrap_object),
        &mut runtime,
        &mut err,
    );
    assert_eq!(rc, 0);
    runtime
}

fn new_context() -> *mut pjb_context {
    let mut context = ptr::null_mut();
    let mut err = ptr::null_mut();
    assert_eq!(pjb_context_new(ptr::null(), &mut context, &mut err), 0);
    context
}

fn from_user_input(
    runtime: *mut pjb_runtime,
    context: *mut pjb_context,
    text: &str,
    err: &mut *mut pjb_error,
) -> Result<u64, i32> {
    let text = CString::new(text).unwrap();
    let mut token = 0;
    match pjb_create_from_user_input(runtime, context, text.as_ptr(), &mut token, err) {
        0 => Ok(token),
        rc => Err(rc),
    }
}

fn text(ptr: *mut std::os::raw::c_char) -> Option<String> {
    (!ptr.is_null()).then(|| unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}

#[test]
fn objects_round_trip_through_callbacks() {
    let registry = Registry::default();
    let runtime = new_runtime(&registry);
    let context = new_context();
    let mut err = ptr::null_mut();

    let first = from_user_input(runtime, context, "EPSG:4326", &mut err).expect("4326");
    let second = from_user_input(runtime, context, "EPSG:4326", &mut err).expect("4326");
    assert_eq!(first, second);
    assert_eq!(registry.entries.lock().unwrap().len(), 1);

    let handle = registry.handle(first);
    assert_eq!(pjb_object_type(handle), TypeTag::GeographicCrs.code());
    assert_eq!(pjb_object_type(0), -1);
    assert_eq!(pjb_object_identity(0), 0);

    let mut buf = pjb_buf {
        data: ptr::null_mut(),
        len: 0,
    };
    assert_eq!(pjb_object_format(context, handle, 0, 0, 4, 1, &mut buf, &mut err), 0);
    let wkt = unsafe { std::slice::from_raw_parts(buf.data, buf.len) };
    assert!(std::str::from_utf8(wkt).unwrap().starts_with(r#"GEOGCRS["WGS 84""#));
    pjb_buf_free(&mut buf);
    assert!(buf.data.is_null());

    assert_eq!(pjb_object_format(context, handle, 0, 1, 2, 1, &mut buf, &mut err), 0);
    let wkt = unsafe { std::slice::from_raw_parts(buf.data, buf.len) };
    let wkt = std::str::from_utf8(wkt).unwrap();
    assert!(wkt.lines().skip(1).any(|line| line.starts_with("  ") && !line.starts_with("   ")));
    assert!(wkt.lines().all(|line| (line.len() - line.trim_start().len()) % 2 == 0));
    pjb_buf_free(&mut buf);

    registry.release_all();
    pjb_context_free(context);
    pjb_runtime_free(runtime);
}

#[test]
fn catalog_miss_reports_structured_error() {
    let registry = Registry::default();
    let runtime = new_runtime(&registry);
    let context = new_context();
    let mut err = ptr::null_mut();
    let (authority, code) = (CString::new("EPSG").unwrap(), CString::new("7030").unwrap());
    let mut token = 0;
    let rc = pjb_create_catalog_object(
        runtime,
        context,
        authority.as_ptr(),
        TypeTag::ProjectedCrs.code(),
        code.as_ptr(),
        &mut token,
        &mut err,
    );
    assert_eq!(rc, -1);
    assert!(!err.is_null());
    let error = unsafe { &*err };
    assert_eq!(error.kind, to_status_code(ErrorKind::ObjectNotFoundInCatalog));
    assert_eq!(text(error.authority).as_deref(), Some("EPSG"));
    assert_eq!(text(error.code).as_deref(), Some("7030"));
    pjb_error_free(err);

    pjb_context_free(context);
    pjb_runtime_free(runtime);
}

#[test]
fn first_reported_error_is_kept() {
    let registry = Registry::default();
    let runtime = new_runtime(&registry);
    let context = new_context();
    let mut err = ptr::null_mut();

    assert!(from_user_input(runtime, context, "not a crs at all", &mut err).is_err());
    assert!(from_user_input(runtime, ptr::null_mut(), "EPSG:4326", &mut err).is_err());
    let error = unsafe { &*err };
    assert_eq!(error.kind, to_status_code(ErrorKind::MalformedInput));
    pjb_error_free(err);

    pjb_context_free(context);
    pjb_runtime_free(runtime);
}

#[test]
fn null_output_pointer_fails_before_any_work() {
    let registry = Registry::default();
    let runtime = new_runtime(&registry);
    let context = new_context();
    let mut err = ptr::null_mut();

    let text = CString::new("EPSG:4326").unwrap();
    let rc = pjb_create_from_user_input(runtime, context, text.as_ptr(), ptr::null_mut(), &mut err);
    assert_eq!(rc, -1);
    assert_eq!(unsafe { &*err }.kind, to_status_code(ErrorKind::Usage));
    assert!(registry.entries.lock().unwrap().is_empty());
    pjb_error_free(err);

    let mut err = ptr::null_mut();
    assert_eq!(pjb_context_new(ptr::null(), ptr::null_mut(), &mut err), -1);
    assert_eq!(unsafe { &*err }.kind, to_status_code(ErrorKind::Usage));
    pjb_error_free(err);

    let mut err = ptr::null_mut();
    let rc = pjb_runtime_new(
        ptr::null_mut(),
        Some(find_wrapper),
        Some(wrap_object),
        ptr::null_mut(),
        &mut err,
    );
    assert_eq!(rc, -1);
    assert_eq!(unsafe { &*err }.kind, to_status_code(ErrorKind::Usage));
    pjb_error_free(err);

    pjb_context_free(context);
    pjb_runtime_free(runtime);
}

#[test]
fn refused_wrapper_leaves_nothing_registered() {
    let registry = Registry {
        refuse: true,
        ..Registry::default()
    };
    let runtime = new_runtime(&registry);
    let context = new_context();
    let mut err = ptr::null_mut();
    assert!(from_user_input(runtime, context, "EPSG:4326", &mut err).is_err());
    let error = unsafe { &*err };
    assert_eq!(error.kind, to_status_code(ErrorKind::Internal));
    pjb_error_free(err);
    assert!(registry.entries.lock().unwrap().is_empty());

    pjb_context_free(context);
    pjb_runtime_free(runtime);
}

#[test]
fn transform_through_the_abi() {
    let registry = Registry::default();
    let runtime = new_runtime(&registry);
    let context = new_context();
    let mut err = ptr::null_mut();

    let source = from_user_input(runtime, context, "EPSG:4326", &mut err).expect("4326");
    let target = from_user_input(runtime, context, "EPSG:3857", &mut err).expect("3857");
    let mut operation = 0;
    let rc = pjb_create_operation(
        runtime,
        context,
        registry.handle(source),
        registry.handle(target),
        ptr::null(),
        0.0,
        &mut operation,
        &mut err,
    );
    assert_eq!(rc, 0);
    assert_ne!(operation, 0);

    let mut transform = ptr::null_mut();
    assert_eq!(pjb_transform_new(registry.handle(operation), &mut transform, &mut err), 0);
    assert_eq!(pjb_transform_assign(transform, context, &mut err), 0);
    let mut coords = [0.0, 0.0, 45.0, 10.0];
    let rc = pjb_transform_apply(transform, 2, coords.as_mut_ptr(), coords.len(), 2, 1, &mut err);
    assert_eq!(rc, 0);
    assert_eq!(&coords[..2], &[0.0, 0.0]);
    assert!((coords[2] - 1_113_194.907_932_735_7).abs() < 1e-6);

    let rc = pjb_transform_apply(transform, 2, coords.as_mut_ptr(), coords.len(), 2, 2, &mut err);
    assert_eq!(rc, -1);
    assert_eq!(unsafe { &*err }.kind, to_status_code(ErrorKind::Usage));
    pjb_error_free(err);

    pjb_transform_free(transform);
    registry.release_all();
    pjb_context_free(context);
    pjb_runtime_free(runtime);
}
