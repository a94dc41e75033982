//! Error related data structures, re-exported from the shared `common` crate
//! so that callers only need to depend on this crate.

pub use gba_core_common::error::Error;
