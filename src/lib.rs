//! Purpose: Handle bridge between a garbage-collected managed runtime and a
//! reference-counted native geodetic object model.
//! Exports: `api` (runtime, wrappers, factories, transforms), `abi` (C surface),
//! `core` (handles, identity, contexts, errors), `native` (object model and catalog).
//! Role: Library crate; ships as `rlib`, `cdylib` and `staticlib`.
//! Invariants: Native objects cross the boundary only as opaque handles.
//! Invariants: One wrapper per live native object per runtime.
pub mod abi;
pub mod api;
pub mod core;
pub mod logging;
pub mod native;
