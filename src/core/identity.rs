//! Purpose: Keep one managed wrapper per live native object.
//! Exports: `NativeIdentity`, `ManagedRuntime`, `Releasable`, `specific_wrapper`, `SharedObjects`.
//! Role: Every native object returned to managed code passes through `specific_wrapper`.
//! Invariants: An existing wrapper is returned as-is; no block is allocated for it.
//! Invariants: A block handed to a failing `wrap_object` is released before the error returns.
//! Invariants: `SharedObjects` never keeps a wrapper alive; entries are weak.
//! Invariants: A released wrapper is never handed out again; the next request builds a new one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::debug;

use super::block::{self, RawHandle};
use super::error::{Error, ErrorKind, Result};
use super::resolve::{TypeTag, resolve};
use crate::native::{BaseObject, NativeRef};
use crate::native::object::identity;

/// Address-based identity of a native object.
pub type NativeIdentity = usize;

/// The managed side of the bridge.
pub trait ManagedRuntime {
    type Wrapper;

    /// Wrapper already registered for the native object, if any.
    fn find_wrapper(&self, identity: NativeIdentity) -> Result<Option<Self::Wrapper>>;

    /// Builds a wrapper of the given type owning `handle`.
    /// On `Err` the handle still belongs to the caller.
    fn wrap_object(&self, tag: TypeTag, handle: RawHandle) -> Result<Self::Wrapper>;
}

/// Returns the wrapper for `object`, creating it with the most specific type when new.
pub fn specific_wrapper<R>(runtime: &R, object: &NativeRef, coarse: TypeTag) -> Result<R::Wrapper>
where
    R: ManagedRuntime + ?Sized,
{
    let id = identity(object);
    if let Some(existing) = runtime.find_wrapper(id)? {
        return Ok(existing);
    }
    let tag = resolve(object.capabilities(), coarse);
    let handle = block::wrap(object);
    if handle == 0 {
        return Err(Error::new(ErrorKind::Internal).with_message("cannot allocate an indirection block"));
    }
    match runtime.wrap_object(tag, handle) {
        Ok(wrapper) => Ok(wrapper),
        Err(err) => {
            debug!(identity = id, ?tag, error = %err, "wrapper construction failed; releasing block");
            unsafe { block::release::<dyn BaseObject>(handle) };
            Err(err)
        }
    }
}

/// Wrappers whose native object can be let go before the wrapper itself is dropped.
pub trait Releasable {
    fn is_released(&self) -> bool;
}

const MIN_WATERMARK: usize = 64;

#[derive(Debug)]
struct Table<W> {
    entries: HashMap<NativeIdentity, Weak<W>>,
    /// Size at which the next insert sweeps out dead entries.
    watermark: usize,
}

/// Weak identity table from native objects to their wrappers.
#[derive(Debug)]
pub struct SharedObjects<W> {
    table: Mutex<Table<W>>,
}

impl<W> Default for SharedObjects<W> {
    fn default() -> Self {
        Self {
            table: Mutex::new(Table {
                entries: HashMap::new(),
                watermark: MIN_WATERMARK,
            }),
        }
    }
}

fn live<W: Releasable>(weak: &Weak<W>) -> Option<Arc<W>> {
    weak.upgrade().filter(|wrapper| !wrapper.is_released())
}

impl<W: Releasable> SharedObjects<W> {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, Table<W>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registered wrapper, unless it was dropped or released.
    pub fn get(&self, identity: NativeIdentity) -> Option<Arc<W>> {
        let mut table = self.table();
        let found = table.entries.get(&identity).and_then(live);
        if found.is_none() {
            table.entries.remove(&identity);
        }
        found
    }

    /// Registers `wrapper` unless a live one exists; returns whichever is registered.
    pub fn put_if_absent(&self, identity: NativeIdentity, wrapper: &Arc<W>) -> Arc<W> {
        let mut table = self.table();
        if let Some(existing) = table.entries.get(&identity).and_then(live) {
            return existing;
        }
        table.entries.insert(identity, Arc::downgrade(wrapper));
        if table.entries.len() >= table.watermark {
            table.entries.retain(|_, weak| live(weak).is_some());
            table.watermark = (table.entries.len() * 2).max(MIN_WATERMARK);
        }
        Arc::clone(wrapper)
    }

    /// Drops entries whose wrapper has gone away or was released.
    pub fn purge(&self) {
        self.table().entries.retain(|_, weak| live(weak).is_some());
    }

    /// Number of live wrappers.
    pub fn len(&self) -> usize {
        self.table()
            .entries
            .values()
            .filter(|weak| live(weak).is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries held, dead ones included.
    pub fn capacity_used(&self) -> usize {
        self.table().entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::object::{Ellipsoid, EllipsoidShape, Metadata, PredefinedUnit, as_native};
    use std::cell::{Cell, RefCell};

    #[derive(Debug)]
    struct Wrapper {
        tag: TypeTag,
        handle: Cell<RawHandle>,
    }

    impl Wrapper {
        fn release(&self) {
            unsafe { block::release::<dyn BaseObject>(self.handle.replace(0)) };
        }
    }

    impl Releasable for Wrapper {
        fn is_released(&self) -> bool {
            self.handle.get() == 0
        }
    }

    impl Drop for Wrapper {
        fn drop(&mut self) {
            self.release();
        }
    }

    #[derive(Default)]
    struct FakeRuntime {
        table: SharedObjects<Wrapper>,
        fail_lookup: bool,
        fail_wrap: bool,
        wraps: Cell<usize>,
        last: RefCell<Option<NativeIdentity>>,
    }

    impl ManagedRuntime for FakeRuntime {
        type Wrapper = Arc<Wrapper>;

        fn find_wrapper(&self, identity: NativeIdentity) -> Result<Option<Arc<Wrapper>>> {
            if self.fail_lookup {
                return Err(Error::new(ErrorKind::Internal).with_message("lookup failed"));
            }
            *self.last.borrow_mut() = Some(identity);
            Ok(self.table.get(identity))
        }

        fn wrap_object(&self, tag: TypeTag, handle: RawHandle) -> Result<Arc<Wrapper>> {
            self.wraps.set(self.wraps.get() + 1);
            if self.fail_wrap {
                return Err(Error::new(ErrorKind::Internal).with_message("constructor failed"));
            }
            let native = unsafe { block::unwrap::<dyn BaseObject>(handle) };
            let wrapper = Arc::new(Wrapper {
                tag,
                handle: Cell::new(handle),
            });
            Ok(self.table.put_if_absent(identity(&native), &wrapper))
        }
    }

    fn ellipsoid() -> NativeRef {
        as_native(&Arc::new(Ellipsoid {
            meta: Metadata::named("Clarke 1866"),
            semi_major: 6378206.4,
            unit: PredefinedUnit::Metre.unit(),
            shape: EllipsoidShape::InverseFlattening(294.978698213898),
        }))
    }

    #[test]
    fn second_request_returns_the_same_wrapper() {
        let runtime = FakeRuntime::default();
        let object = ellipsoid();
        let first = specific_wrapper(&runtime, &object, TypeTag::Any).expect("wrap");
        let second = specific_wrapper(&runtime, &object, TypeTag::Any).expect("wrap");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.tag, TypeTag::Ellipsoid);
        assert_eq!(runtime.wraps.get(), 1);
        assert_eq!(Arc::strong_count(&object), 2);
        assert_eq!(*runtime.last.borrow(), Some(identity(&object)));

        drop((first, second));
        assert_eq!(Arc::strong_count(&object), 1);
        assert!(runtime.table.is_empty());
    }

    #[test]
    fn failed_construction_releases_the_block() {
        let runtime = FakeRuntime {
            fail_wrap: true,
            ..FakeRuntime::default()
        };
        let object = ellipsoid();
        let err = specific_wrapper(&runtime, &object, TypeTag::Any).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(runtime.wraps.get(), 1);
        assert_eq!(Arc::strong_count(&object), 1);
    }

    #[test]
    fn lookup_failure_propagates_without_allocating() {
        let runtime = FakeRuntime {
            fail_lookup: true,
            ..FakeRuntime::default()
        };
        let object = ellipsoid();
        let err = specific_wrapper(&runtime, &object, TypeTag::Any).unwrap_err();
        assert_eq!(err.message(), Some("lookup failed"));
        assert_eq!(runtime.wraps.get(), 0);
        assert_eq!(Arc::strong_count(&object), 1);
    }

    #[derive(Debug, Default)]
    struct Slot(Cell<bool>);

    impl Releasable for Slot {
        fn is_released(&self) -> bool {
            self.0.get()
        }
    }

    #[test]
    fn put_if_absent_keeps_the_first_live_wrapper() {
        let table = SharedObjects::new();
        let a = Arc::new(Slot::default());
        let b = Arc::new(Slot::default());
        assert!(Arc::ptr_eq(&table.put_if_absent(7, &a), &a));
        assert!(Arc::ptr_eq(&table.put_if_absent(7, &b), &a));
        drop(a);
        assert!(table.get(7).is_none());
        assert!(Arc::ptr_eq(&table.put_if_absent(7, &b), &b));
        table.purge();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn released_wrapper_is_replaced_while_still_held() {
        let table = SharedObjects::new();
        let stale = Arc::new(Slot::default());
        table.put_if_absent(7, &stale);
        stale.0.set(true);
        assert!(table.get(7).is_none());
        let fresh = Arc::new(Slot::default());
        assert!(Arc::ptr_eq(&table.put_if_absent(7, &fresh), &fresh));
        assert!(Arc::ptr_eq(&table.get(7).expect("fresh"), &fresh));
        assert_eq!(Arc::strong_count(&stale), 1);
    }

    #[test]
    fn dead_entries_are_swept_as_the_table_grows() {
        let table = SharedObjects::new();
        for identity in 0..10_000 {
            let wrapper = Arc::new(Slot::default());
            table.put_if_absent(identity, &wrapper);
        }
        assert_eq!(table.len(), 0);
        assert!(table.capacity_used() <= MIN_WATERMARK);

        let kept: Vec<_> = (0..200).map(|_| Arc::new(Slot::default())).collect();
        for (identity, wrapper) in kept.iter().enumerate() {
            table.put_if_absent(identity, wrapper);
        }
        for identity in 200..10_000 {
            table.put_if_absent(identity, &Arc::new(Slot::default()));
        }
        assert_eq!(table.len(), 200);
        assert!(table.capacity_used() <= 2 * 200 + MIN_WATERMARK);
    }

    #[test]
    fn released_wrapper_is_rebuilt_by_specific_wrapper() {
        let runtime = FakeRuntime::default();
        let object = ellipsoid();
        let first = specific_wrapper(&runtime, &object, TypeTag::Any).expect("wrap");
        first.release();
        assert_eq!(Arc::strong_count(&object), 1);

        let second = specific_wrapper(&runtime, &object, TypeTag::Any).expect("wrap");
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(!second.is_released());
        assert_eq!(runtime.wraps.get(), 2);
        assert_eq!(Arc::strong_count(&object), 2);
        assert!(Arc::ptr_eq(&runtime.table.get(identity(&object)).expect("live"), &second));
    }
}
