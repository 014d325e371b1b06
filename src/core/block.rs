//! Purpose: Indirection blocks letting a 64-bit handle stand in for a shared native reference.
//! Exports: `RawHandle`, `wrap`, `unwrap`, `release`.
//! Role: Lowest layer of the bridge; everything that hands a native object across goes here.
//! Invariants: A block owns exactly one strong count from `wrap` until `release`.
//! Invariants: Handle 0 is the empty handle and is never dereferenced.
//! Invariants: `unwrap` and `release` must be called with the pointee type used by `wrap`.

use std::alloc::{Layout, alloc, dealloc};
use std::sync::Arc;

/// Address of an indirection block; 0 means empty.
pub type RawHandle = u64;

const _: () = assert!(size_of::<*mut u8>() <= size_of::<RawHandle>());

/// Allocates a block holding a new strong reference to `object`.
/// Returns 0 when allocation fails, leaving the strong count unchanged.
pub fn wrap<T: ?Sized>(object: &Arc<T>) -> RawHandle {
    let layout = Layout::new::<Arc<T>>();
    // Arc<T> is never zero-sized.
    let block = unsafe { alloc(layout) }.cast::<Arc<T>>();
    if block.is_null() {
        return 0;
    }
    unsafe { block.write(Arc::clone(object)) };
    block as usize as RawHandle
}

/// Clones the reference stored in a live block; the block keeps its own count.
///
/// # Safety
/// `handle` must come from `wrap::<T>` and must not have been released.
pub unsafe fn unwrap<T: ?Sized>(handle: RawHandle) -> Arc<T> {
    let block = handle as usize as *const Arc<T>;
    unsafe { Arc::clone(&*block) }
}

/// Drops the stored reference and frees the block. No-op for 0.
///
/// # Safety
/// `handle` must be 0 or come from `wrap::<T>`, and must be released at most once.
pub unsafe fn release<T: ?Sized>(handle: RawHandle) {
    if handle == 0 {
        return;
    }
    let block = handle as usize as *mut Arc<T>;
    unsafe {
        block.drop_in_place();
        dealloc(block.cast::<u8>(), Layout::new::<Arc<T>>());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::object::{Metadata, PrimeMeridian, PredefinedUnit, as_native};
    use crate::native::NativeRef;

    fn meridian() -> NativeRef {
        as_native(&Arc::new(PrimeMeridian {
            meta: Metadata::named("Paris"),
            longitude: 2.5969213,
            unit: PredefinedUnit::Grad.unit(),
        }))
    }

    #[test]
    fn wrap_holds_one_count_until_release() {
        let object = meridian();
        let handle = wrap(&object);
        assert_ne!(handle, 0);
        assert_eq!(Arc::strong_count(&object), 2);

        let again = unsafe { unwrap::<dyn crate::native::BaseObject>(handle) };
        assert!(Arc::ptr_eq(&again, &object));
        assert_eq!(Arc::strong_count(&object), 3);
        drop(again);

        unsafe { release::<dyn crate::native::BaseObject>(handle) };
        assert_eq!(Arc::strong_count(&object), 1);
    }

    #[test]
    fn releasing_the_empty_handle_does_nothing() {
        unsafe { release::<dyn crate::native::BaseObject>(0) };
    }

    #[test]
    fn sized_payloads_round_trip() {
        let value = Arc::new(42u64);
        let handle = wrap(&value);
        assert_eq!(*unsafe { unwrap::<u64>(handle) }, 42);
        unsafe { release::<u64>(handle) };
        assert_eq!(Arc::strong_count(&value), 1);
    }
}
