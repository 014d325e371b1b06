//! Purpose: Per-thread native processing context.
//! Exports: `NativeContext`.
//! Role: Carries search paths and the error number compiled pipelines report into.
//! Invariants: A context is used by one thread at a time; the bridge enforces this.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
pub struct NativeContext {
    id: u64,
    search_paths: Vec<PathBuf>,
    errno: Arc<AtomicI32>,
}

impl NativeContext {
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            search_paths,
            errno: Arc::new(AtomicI32::new(0)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Last error number reported by a pipeline bound to this context.
    pub fn errno(&self) -> i32 {
        self.errno.load(Ordering::Relaxed)
    }

    pub fn reset_errno(&self) {
        self.errno.store(0, Ordering::Relaxed);
    }

    pub(crate) fn errno_sink(&self) -> Arc<AtomicI32> {
        Arc::clone(&self.errno)
    }
}
