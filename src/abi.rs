//! Purpose: C ABI bridge for managed runtimes (libprojbridge).
//! Exports: C-callable runtime/context/object/transform functions and buffer/error helpers.
//! Role: Stable ABI surface; the managed side supplies wrapper lookup and construction callbacks.
//! Invariants: Objects cross as 64-bit block handles; 0 is the empty handle.
//! Invariants: A handle passed to `wrap_object` belongs to the managed side once it returns nonzero.
//! Invariants: A null output pointer fails before any object or wrapper is created.
//! Invariants: Error kinds map 1:1 with `core::error::to_status_code`; the first error reported
//! through an out-parameter is kept.
#![allow(clippy::result_large_err, non_camel_case_types)]

use std::ffi::{CStr, CString, c_void};
use std::os::raw::c_char;
use std::ptr;

use crate::api::{
    Convention, FormatOptions, OperationOptions, Transform, catalog_request, format_native,
};
use crate::core::block::{self, RawHandle};
use crate::core::context::{Context, ContextConfig};
use crate::core::error::{Error, ErrorKind, Result, to_status_code};
use crate::core::identity::{ManagedRuntime, NativeIdentity, specific_wrapper};
use crate::core::resolve::{TypeTag, resolve};
use crate::core::translate::{PendingFailure, translate};
use crate::native::factory::create_operations;
use crate::native::object::{Crs, as_native, downcast, identity};
use crate::native::{BaseObject, NativeRef, input};

/// Returns the managed token registered for a native identity, or 0.
pub type pjb_find_wrapper_fn = extern "C" fn(user_data: *mut c_void, identity: usize) -> u64;

/// Builds a managed wrapper owning `handle`; returns its token, or 0 on failure.
pub type pjb_wrap_object_fn =
    extern "C" fn(user_data: *mut c_void, type_code: i32, handle: u64) -> u64;

#[repr(C)]
pub struct pjb_runtime {
    user_data: *mut c_void,
    find_wrapper: pjb_find_wrapper_fn,
    wrap_object: pjb_wrap_object_fn,
}

#[repr(C)]
pub struct pjb_context {
    context: Context,
}

#[repr(C)]
pub struct pjb_transform {
    transform: Transform,
}

#[repr(C)]
pub struct pjb_buf {
    pub data: *mut u8,
    pub len: usize,
}

#[repr(C)]
pub struct pjb_error {
    pub kind: i32,
    pub message: *mut c_char,
    pub authority: *mut c_char,
    pub code: *mut c_char,
    pub diagnostic: i32,
    pub has_diagnostic: u8,
}

impl ManagedRuntime for pjb_runtime {
    type Wrapper = u64;

    fn find_wrapper(&self, identity: NativeIdentity) -> Result<Option<u64>> {
        let token = (self.find_wrapper)(self.user_data, identity);
        Ok((token != 0).then_some(token))
    }

    fn wrap_object(&self, tag: TypeTag, handle: RawHandle) -> Result<u64> {
        match (self.wrap_object)(self.user_data, tag.code(), handle) {
            0 => Err(Error::new(ErrorKind::Internal)
                .with_message(format!("managed runtime could not wrap {tag:?}"))),
            token => Ok(token),
        }
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn pjb_log_init() {
    crate::logging::init_tracing();
}

#[unsafe(no_mangle)]
pub extern "C" fn pjb_runtime_new(
    user_data: *mut c_void,
    find_wrapper: Option<pjb_find_wrapper_fn>,
    wrap_object: Option<pjb_wrap_object_fn>,
    out_runtime: *mut *mut pjb_runtime,
    out_err: *mut *mut pjb_error,
) -> i32 {
    let (Some(find_wrapper), Some(wrap_object)) = (find_wrapper, wrap_object) else {
        return fail(
            out_err,
            Error::new(ErrorKind::Usage).with_message("runtime callbacks must not be null"),
        );
    };
    deliver(out_runtime, out_err, || {
        Ok(Box::into_raw(Box::new(pjb_runtime {
            user_data,
            find_wrapper,
            wrap_object,
        })))
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn pjb_runtime_free(runtime: *mut pjb_runtime) {
    if runtime.is_null() {
        return;
    }
    unsafe {
        drop(Box::from_raw(runtime));
    }
}

/// `search_path` may be null; paths from `PROJBRIDGE_SEARCH_PATHS` are always included.
#[unsafe(no_mangle)]
pub extern "C" fn pjb_context_new(
    search_path: *const c_char,
    out_context: *mut *mut pjb_context,
    out_err: *mut *mut pjb_error,
) -> i32 {
    deliver(out_context, out_err, || {
        let mut config = ContextConfig::from_env();
        if !search_path.is_null() {
            config = config.with_search_path(c_str(search_path, "search_path")?);
        }
        let context = Context::create(config)?;
        Ok(Box::into_raw(Box::new(pjb_context { context })))
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn pjb_context_free(context: *mut pjb_context) {
    if context.is_null() {
        return;
    }
    unsafe {
        drop(Box::from_raw(context));
    }
}

/// Makes `context` use the catalog database of `sibling`.
#[unsafe(no_mangle)]
pub extern "C" fn pjb_context_share_database(
    context: *mut pjb_context,
    sibling: *mut pjb_context,
    out_err: *mut *mut pjb_error,
) -> i32 {
    let result = (|| -> Result<_> {
        let context = borrow(context, "context")?;
        let sibling = borrow(sibling, "sibling")?;
        context.context.share_database_from(&sibling.context)
    })();
    match result {
        Ok(()) => 0,
        Err(err) => fail(out_err, err),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn pjb_create_from_user_input(
    runtime: *mut pjb_runtime,
    context: *mut pjb_context,
    text: *const c_char,
    out_object: *mut u64,
    out_err: *mut *mut pjb_error,
) -> i32 {
    deliver(out_object, out_err, || {
        let runtime = borrow(runtime, "runtime")?;
        let context = borrow(context, "context")?;
        let text = c_str(text, "text")?;
        let database = context.context.database()?;
        let (object, _warnings) = input::create_from_user_input(text, &database)
            .map_err(|err| translate(err, ErrorKind::MalformedInput))?;
        specific_wrapper(runtime, &object, TypeTag::Any)
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn pjb_create_catalog_object(
    runtime: *mut pjb_runtime,
    context: *mut pjb_context,
    authority: *const c_char,
    type_code: i32,
    code: *const c_char,
    out_object: *mut u64,
    out_err: *mut *mut pjb_error,
) -> i32 {
    deliver(out_object, out_err, || {
        let runtime = borrow(runtime, "runtime")?;
        let context = borrow(context, "context")?;
        let authority = c_str(authority, "authority")?;
        let code = c_str(code, "code")?;
        let tag = TypeTag::from_code(type_code).ok_or_else(|| {
            Error::new(ErrorKind::Usage).with_message(format!("unknown type code {type_code}"))
        })?;
        let (capability, coarse) = catalog_request(tag).ok_or_else(|| {
            Error::new(ErrorKind::UnsupportedCategory).with_message("Unsupported object type.")
        })?;
        let factory = context.context.factory(authority)?;
        let object = match capability {
            None => factory.create_object(code),
            Some(capability) => factory.create(code, capability),
        }
        .map_err(|err| translate(err, ErrorKind::Internal))?;
        specific_wrapper(runtime, &object, coarse)
    })
}

/// Best operation from `source` to `target`; writes 0 when none exists.
/// `area_of_interest` is null or four degrees: west, south, east, north.
#[unsafe(no_mangle)]
pub extern "C" fn pjb_create_operation(
    runtime: *mut pjb_runtime,
    context: *mut pjb_context,
    source: u64,
    target: u64,
    area_of_interest: *const f64,
    desired_accuracy: f64,
    out_object: *mut u64,
    out_err: *mut *mut pjb_error,
) -> i32 {
    deliver(out_object, out_err, || {
        let runtime = borrow(runtime, "runtime")?;
        let context = borrow(context, "context")?;
        let mut pending = PendingFailure::new();
        for (handle, role) in [(source, "source"), (target, "target")] {
            if handle == 0 {
                pending.raise(
                    Error::new(ErrorKind::InvalidHandle).with_message(format!("{role} handle is empty")),
                );
            }
        }
        pending.finish(())?;
        let source = crs_of(source, "source")?;
        let target = crs_of(target, "target")?;
        let mut options = OperationOptions::default().with_desired_accuracy(desired_accuracy);
        if !area_of_interest.is_null() {
            let area = unsafe { std::slice::from_raw_parts(area_of_interest, 4) };
            options = options.with_area_of_interest(area[0], area[1], area[2], area[3]);
        }
        let database = context.context.database()?;
        let operations = create_operations(&source, &target, &options.to_native(), &database)
            .map_err(|err| translate(err, ErrorKind::Internal))?;
        match operations.first() {
            Some(best) => {
                specific_wrapper(runtime, &as_native(best), TypeTag::CoordinateOperation)
            }
            None => Ok(0),
        }
    })
}

/// Formats `object` with a convention code; `context` may be null.
/// `indentation` applies to multiline output; nonzero `strict` refuses text that would not read back.
#[unsafe(no_mangle)]
pub extern "C" fn pjb_object_format(
    context: *mut pjb_context,
    object: u64,
    convention: i32,
    multiline: u8,
    indentation: usize,
    strict: u8,
    out_buf: *mut pjb_buf,
    out_err: *mut *mut pjb_error,
) -> i32 {
    let result = (|| -> Result<_> {
        if !context.is_null() {
            borrow(context, "context")?.context.native()?;
        }
        let convention = Convention::from_code(convention).ok_or_else(|| {
            Error::new(ErrorKind::Usage).with_message(format!("unknown convention {convention}"))
        })?;
        let options = FormatOptions {
            multiline: multiline != 0,
            indentation,
            strict: strict != 0,
        };
        let text = format_native(&native_object(object)?, convention, &options)?;
        write_buf(out_buf, text.into_bytes())
    })();
    match result {
        Ok(()) => 0,
        Err(err) => fail(out_err, err),
    }
}

/// Native identity behind a live handle; 0 for the empty handle.
#[unsafe(no_mangle)]
pub extern "C" fn pjb_object_identity(object: u64) -> usize {
    native_object(object).map(|native| identity(&native)).unwrap_or(0)
}

/// Most specific type code of a live handle; -1 for the empty handle.
#[unsafe(no_mangle)]
pub extern "C" fn pjb_object_type(object: u64) -> i32 {
    native_object(object)
        .map(|native| resolve(native.capabilities(), TypeTag::Any).code())
        .unwrap_or(-1)
}

/// Releases a handle received through `wrap_object`. No-op for 0.
#[unsafe(no_mangle)]
pub extern "C" fn pjb_object_release(object: u64) {
    unsafe { block::release::<dyn BaseObject>(object) };
}

#[unsafe(no_mangle)]
pub extern "C" fn pjb_transform_new(
    operation: u64,
    out_transform: *mut *mut pjb_transform,
    out_err: *mut *mut pjb_error,
) -> i32 {
    deliver(out_transform, out_err, || {
        let transform = Transform::compile(&native_object(operation)?)?;
        Ok(Box::into_raw(Box::new(pjb_transform { transform })))
    })
}

/// Binds `transform` to `context`, or unbinds it when `context` is null.
#[unsafe(no_mangle)]
pub extern "C" fn pjb_transform_assign(
    transform: *mut pjb_transform,
    context: *mut pjb_context,
    out_err: *mut *mut pjb_error,
) -> i32 {
    let result = (|| -> Result<_> {
        let transform = borrow(transform, "transform")?;
        if context.is_null() {
            return transform.transform.assign(None);
        }
        let context = borrow(context, "context")?;
        transform.transform.assign(Some(&context.context))
    })();
    match result {
        Ok(()) => 0,
        Err(err) => fail(out_err, err),
    }
}

/// Transforms `count` points of `dimension` ordinates from `offset` within `len` values.
#[unsafe(no_mangle)]
pub extern "C" fn pjb_transform_apply(
    transform: *mut pjb_transform,
    dimension: usize,
    coordinates: *mut f64,
    len: usize,
    offset: usize,
    count: usize,
    out_err: *mut *mut pjb_error,
) -> i32 {
    let result = (|| -> Result<_> {
        let transform = borrow(transform, "transform")?;
        if coordinates.is_null() {
            return Err(Error::new(ErrorKind::Usage).with_message("coordinates is null"));
        }
        let coordinates = unsafe { std::slice::from_raw_parts_mut(coordinates, len) };
        transform.transform.transform(dimension, coordinates, offset, count)
    })();
    match result {
        Ok(()) => 0,
        Err(err) => fail(out_err, err),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn pjb_transform_free(transform: *mut pjb_transform) {
    if transform.is_null() {
        return;
    }
    unsafe {
        drop(Box::from_raw(transform));
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn pjb_buf_free(buf: *mut pjb_buf) {
    if buf.is_null() {
        return;
    }
    unsafe {
        let buf = &mut *buf;
        if !buf.data.is_null() && buf.len != 0 {
            drop(Vec::from_raw_parts(buf.data, buf.len, buf.len));
        }
        buf.data = ptr::null_mut();
        buf.len = 0;
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn pjb_error_free(err: *mut pjb_error) {
    if err.is_null() {
        return;
    }
    unsafe {
        let err = Box::from_raw(err);
        for text in [err.message, err.authority, err.code] {
            if !text.is_null() {
                drop(CString::from_raw(text));
            }
        }
    }
}

fn borrow<'a, T>(handle: *mut T, name: &str) -> Result<&'a mut T> {
    if handle.is_null() {
        return Err(Error::new(ErrorKind::Usage).with_message(format!("{name} is null")));
    }
    unsafe { Ok(&mut *handle) }
}

fn c_str<'a>(input: *const c_char, name: &str) -> Result<&'a str> {
    if input.is_null() {
        return Err(Error::new(ErrorKind::Usage).with_message(format!("{name} is null")));
    }
    unsafe { CStr::from_ptr(input) }.to_str().map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("{name} is not valid UTF-8"))
            .with_source(err)
    })
}

fn native_object(handle: u64) -> Result<NativeRef> {
    if handle == 0 {
        return Err(Error::new(ErrorKind::InvalidHandle).with_message("object handle is empty"));
    }
    Ok(unsafe { block::unwrap::<dyn BaseObject>(handle) })
}

fn crs_of(handle: u64, role: &str) -> Result<std::sync::Arc<Crs>> {
    downcast::<Crs>(&native_object(handle)?).ok_or_else(|| {
        Error::new(ErrorKind::Usage).with_message(format!("{role} is not a coordinate reference system"))
    })
}

fn write_buf(out_buf: *mut pjb_buf, bytes: Vec<u8>) -> Result<()> {
    if out_buf.is_null() {
        return Err(Error::new(ErrorKind::Usage).with_message("out_buf is null"));
    }
    unsafe {
        let buf = &mut *out_buf;
        let mut data = bytes.into_boxed_slice();
        buf.len = data.len();
        buf.data = data.as_mut_ptr();
        std::mem::forget(data);
    }
    Ok(())
}

/// Runs `work` only when `out` can receive its value.
fn deliver<T>(
    out: *mut T,
    out_err: *mut *mut pjb_error,
    work: impl FnOnce() -> Result<T>,
) -> i32 {
    if out.is_null() {
        return fail(
            out_err,
            Error::new(ErrorKind::Usage).with_message("output pointer is null"),
        );
    }
    match work() {
        Ok(value) => {
            unsafe { out.write(value) };
            0
        }
        Err(err) => fail(out_err, err),
    }
}

fn fail(out_err: *mut *mut pjb_error, err: Error) -> i32 {
    if out_err.is_null() {
        return -1;
    }
    if unsafe { !(*out_err).is_null() } {
        return -1;
    }
    let error = Box::new(pjb_error {
        kind: to_status_code(err.kind()),
        message: to_c_string(err.message().unwrap_or("")),
        authority: err.authority().map(to_c_string).unwrap_or(ptr::null_mut()),
        code: err.code().map(to_c_string).unwrap_or(ptr::null_mut()),
        diagnostic: err.diagnostic().unwrap_or(0),
        has_diagnostic: u8::from(err.diagnostic().is_some()),
    });
    unsafe {
        *out_err = Box::into_raw(error);
    }
    -1
}

fn to_c_string(input: &str) -> *mut c_char {
    CString::new(input)
        .map(|s| s.into_raw())
        .unwrap_or(ptr::null_mut())
}
