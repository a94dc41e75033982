//! Constants that describe the current build, stamped by `build.rs`.

#[rustfmt::skip]
pub mod build;
pub use self::build::*;
