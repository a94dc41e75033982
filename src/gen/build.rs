//! Compile-time constants, generated by build.rs.

// @generated

pub const COMPILATION_DATE: &str = "Jan 01 2026";
pub const COMPILATION_TIME: &str = "00:00:00";
pub const NAME: &str = "gba-core";
pub const VERSION: &str = "0.1.0";
pub const COMPILER: &str = "rustc";
pub const COMPILER_VERSION: &str = "UNKNOWN";
pub const TARGET: &str = "UNKNOWN";
pub const PROFILE: &str = "UNKNOWN";
pub const FEATURES_SEQ: [&str; 1] = ["cpu"];
