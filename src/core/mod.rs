// Core bridge modules: handles, type resolution, wrapper identity, contexts and errors.
pub mod block;
pub mod context;
pub mod error;
pub mod handle;
pub mod identity;
pub mod resolve;
pub mod translate;
