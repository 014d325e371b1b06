//! Purpose: Ownership cells holding indirection-block handles.
//! Exports: `HandleCell`, `SharedPointer`.
//! Role: The only place a handle field is read, written or zeroed.
//! Invariants: A cell moves Empty(0) -> Live(addr) -> Empty(0); re-wrapping a live cell is refused.
//! Invariants: Release reads and zeroes the cell in one `swap`, so a block is released once.
//! Invariants: Reading while another thread releases the same cell is the caller's race to avoid.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::block::{self, RawHandle};
use super::error::{Error, ErrorKind, Result};

/// Atomic handle field, 0 when empty.
#[derive(Debug, Default)]
pub struct HandleCell(AtomicU64);

impl HandleCell {
    pub const fn empty() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn raw(&self) -> RawHandle {
        self.0.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.raw() == 0
    }

    /// Live handle, or `InvalidHandle` when the cell is empty.
    pub fn live(&self) -> Result<RawHandle> {
        match self.raw() {
            0 => Err(Error::new(ErrorKind::InvalidHandle).with_message("handle already released")),
            handle => Ok(handle),
        }
    }

    /// Stores `handle` into an empty cell.
    pub fn install(&self, handle: RawHandle) -> Result<()> {
        if handle == 0 {
            return Err(Error::new(ErrorKind::InvalidHandle).with_message("cannot install the empty handle"));
        }
        self.0
            .compare_exchange(0, handle, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| Error::new(ErrorKind::Usage).with_message("handle cell is already live"))
    }

    /// Empties the cell, returning what it held.
    pub fn take(&self) -> RawHandle {
        self.0.swap(0, Ordering::AcqRel)
    }
}

/// Handle owning one strong reference to a native `T` through an indirection block.
pub struct SharedPointer<T: ?Sized> {
    cell: HandleCell,
    _owns: PhantomData<Arc<T>>,
}

impl<T: ?Sized> SharedPointer<T> {
    /// Wraps a new strong reference to `object`.
    pub fn new(object: &Arc<T>) -> Result<Self> {
        let handle = block::wrap(object);
        if handle == 0 {
            return Err(Error::new(ErrorKind::Internal).with_message("cannot allocate an indirection block"));
        }
        Ok(Self {
            cell: HandleCell(AtomicU64::new(handle)),
            _owns: PhantomData,
        })
    }

    /// Adopts a handle produced by `block::wrap::<T>`.
    ///
    /// # Safety
    /// `handle` must be 0 or a live block of `Arc<T>` that nothing else will release.
    pub unsafe fn from_raw(handle: RawHandle) -> Self {
        Self {
            cell: HandleCell(AtomicU64::new(handle)),
            _owns: PhantomData,
        }
    }

    pub fn handle(&self) -> RawHandle {
        self.cell.raw()
    }

    pub fn is_released(&self) -> bool {
        self.cell.is_empty()
    }

    /// New strong reference to the native object.
    pub fn get(&self) -> Result<Arc<T>> {
        let handle = self.cell.live()?;
        Ok(unsafe { block::unwrap::<T>(handle) })
    }

    /// Releases the block; later calls do nothing.
    pub fn release(&self) {
        let handle = self.cell.take();
        unsafe { block::release::<T>(handle) };
    }

    /// Gives up ownership of the block without releasing it.
    pub fn into_raw(self) -> RawHandle {
        let handle = self.cell.take();
        std::mem::forget(self);
        handle
    }
}

impl<T: ?Sized> Drop for SharedPointer<T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T: ?Sized> fmt::Debug for SharedPointer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedPointer")
            .field("handle", &format_args!("{:#x}", self.handle()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_is_idempotent_and_reads_fail_afterwards() {
        let value = Arc::new(String::from("ellipsoid"));
        let pointer = SharedPointer::new(&value).expect("wrap");
        assert_eq!(Arc::strong_count(&value), 2);
        assert_eq!(*pointer.get().expect("live"), "ellipsoid");

        pointer.release();
        pointer.release();
        assert!(pointer.is_released());
        assert_eq!(Arc::strong_count(&value), 1);
        let err = pointer.get().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidHandle);
    }

    #[test]
    fn drop_releases_and_into_raw_hands_ownership_over() {
        let value = Arc::new(7u32);
        drop(SharedPointer::new(&value).expect("wrap"));
        assert_eq!(Arc::strong_count(&value), 1);

        let raw = SharedPointer::new(&value).expect("wrap").into_raw();
        assert_eq!(Arc::strong_count(&value), 2);
        let adopted = unsafe { SharedPointer::<u32>::from_raw(raw) };
        assert_eq!(adopted.handle(), raw);
        drop(adopted);
        assert_eq!(Arc::strong_count(&value), 1);
    }

    #[test]
    fn cells_refuse_rewrapping_a_live_handle() {
        let cell = HandleCell::empty();
        assert_eq!(cell.live().unwrap_err().kind(), ErrorKind::InvalidHandle);
        cell.install(0x1000).expect("install");
        assert_eq!(cell.install(0x2000).unwrap_err().kind(), ErrorKind::Usage);
        assert_eq!(cell.take(), 0x1000);
        assert_eq!(cell.take(), 0);
        assert_eq!(cell.install(0).unwrap_err().kind(), ErrorKind::InvalidHandle);
    }
}
