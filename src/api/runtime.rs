//! Purpose: Rust-side managed runtime: wrapper registry and wrapper construction.
//! Exports: `Runtime`.
//! Role: Default `ManagedRuntime`; holds the identity table for `GeoObject` wrappers.
//! Invariants: A wrapper is built only for a handle whose object carries the tag's capability.
//! Invariants: When two wrappers race for one object, the first registered one is kept.
//! Invariants: A released wrapper is replaced on the next request for its object.

use std::sync::Arc;

use crate::core::block::{self, RawHandle};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::handle::SharedPointer;
use crate::core::identity::{ManagedRuntime, NativeIdentity, SharedObjects, specific_wrapper};
use crate::core::resolve::TypeTag;
use crate::native::object::identity;
use crate::native::{BaseObject, NativeRef};

use super::object::GeoObject;

/// Registry of live wrappers; one per set of callers sharing object identity.
#[derive(Debug, Default)]
pub struct Runtime {
    objects: SharedObjects<GeoObject>,
}

impl Runtime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrapper for `object`, reusing the registered one if it is still alive.
    pub fn wrap(&self, object: &NativeRef, coarse: TypeTag) -> Result<Arc<GeoObject>> {
        specific_wrapper(self, object, coarse)
    }

    pub(crate) fn wrap_optional(
        &self,
        object: Option<NativeRef>,
        coarse: TypeTag,
    ) -> Result<Option<Arc<GeoObject>>> {
        object.map(|object| self.wrap(&object, coarse)).transpose()
    }

    pub(crate) fn wrap_all(
        &self,
        objects: impl IntoIterator<Item = NativeRef>,
        coarse: TypeTag,
    ) -> Result<Vec<Arc<GeoObject>>> {
        objects
            .into_iter()
            .map(|object| self.wrap(&object, coarse))
            .collect()
    }

    /// Number of wrappers currently alive.
    pub fn live_objects(&self) -> usize {
        self.objects.len()
    }

    /// Entries held by the identity table, including dead ones not swept yet.
    pub fn registered_entries(&self) -> usize {
        self.objects.capacity_used()
    }
}

impl ManagedRuntime for Runtime {
    type Wrapper = Arc<GeoObject>;

    fn find_wrapper(&self, identity: NativeIdentity) -> Result<Option<Arc<GeoObject>>> {
        Ok(self.objects.get(identity))
    }

    fn wrap_object(&self, tag: TypeTag, handle: RawHandle) -> Result<Arc<GeoObject>> {
        if handle == 0 {
            return Err(Error::new(ErrorKind::InvalidHandle).with_message("cannot wrap the empty handle"));
        }
        let native = unsafe { block::unwrap::<dyn BaseObject>(handle) };
        if let Some(cap) = tag.required_capability()
            && !native.capabilities().contains(cap)
        {
            return Err(Error::new(ErrorKind::UnsupportedCategory)
                .with_message(format!("object cannot be wrapped as {tag:?}")));
        }
        let id = identity(&native);
        drop(native);
        let pointer = unsafe { SharedPointer::<dyn BaseObject>::from_raw(handle) };
        let wrapper = Arc::new(GeoObject::new(pointer, tag, id));
        Ok(self.objects.put_if_absent(id, &wrapper))
    }
}
