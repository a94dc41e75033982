#![allow(clippy::uninlined_format_args)]

//! Build script (https://doc.rust-lang.org/cargo/reference/build-scripts.html).
//!
//! Rust has no `__DATE__`-style preprocessor macro, so this script stamps a
//! small `src/gen/build.rs` file with compile-time metadata (version,
//! compilation timestamp, enabled features) that `info.rs` then re-exports.

use chrono::Utc;
use std::{
    env,
    fs::OpenOptions,
    io::Write,
    path::Path,
    process::Command,
};

const GEN_DIR: &str = "./src/gen";

fn main() {
    if std::env::var("DOCS_RS").is_ok() {
        return;
    }

    let dest_path = Path::new(GEN_DIR).join("build.rs");
    let mut file = OpenOptions::new()
        .truncate(true)
        .write(true)
        .create(true)
        .open(&dest_path)
        .unwrap_or_else(|_| panic!("Can't open '{}'", dest_path.display()));

    writeln!(file, "//! Compile-time constants, generated by build.rs.\n").unwrap();
    writeln!(file, "// @generated\n").unwrap();

    let now_utc = Utc::now();
    write_str_constant(
        &mut file,
        "COMPILATION_DATE",
        &format!("{}", now_utc.format("%b %d %Y")),
    );
    write_str_constant(
        &mut file,
        "COMPILATION_TIME",
        &format!("{}", now_utc.format("%H:%M:%S")),
    );

    write_str_constant(
        &mut file,
        "NAME",
        option_env!("CARGO_PKG_NAME").unwrap_or("UNKNOWN"),
    );
    write_str_constant(
        &mut file,
        "VERSION",
        option_env!("CARGO_PKG_VERSION").unwrap_or("UNKNOWN"),
    );

    write_str_constant(&mut file, "COMPILER", "rustc");

    let compiler_version = Command::new("rustc")
        .arg("--version")
        .output()
        .ok()
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .unwrap_or_else(|| "rustc UNKNOWN".to_string());
    let compiler_version = compiler_version
        .split_whitespace()
        .nth(1)
        .unwrap_or("UNKNOWN");
    write_str_constant(&mut file, "COMPILER_VERSION", compiler_version);

    write_str_constant(
        &mut file,
        "TARGET",
        &env::var("TARGET").unwrap_or_else(|_| String::from("UNKNOWN")),
    );
    write_str_constant(
        &mut file,
        "PROFILE",
        &env::var("PROFILE").unwrap_or_else(|_| String::from("UNKNOWN")),
    );

    let mut features = vec!["cpu"];
    if cfg!(feature = "debug") {
        features.push("debug")
    }
    if cfg!(feature = "pedantic") {
        features.push("pedantic")
    }
    if cfg!(feature = "cpulog") {
        features.push("cpulog")
    }
    write_vec_constant(&mut file, "FEATURES_SEQ", features);
}

fn write_str_constant(file: &mut std::fs::File, key: &str, val: &str) {
    writeln!(file, "pub const {}: &str = \"{}\";", key, val)
        .unwrap_or_else(|_| panic!("Failed to write '{}' to gen/build.rs", key));
}

fn write_vec_constant(file: &mut std::fs::File, key: &str, vec: Vec<&str>) {
    let list_str = vec
        .iter()
        .map(|v| format!("\"{}\"", v))
        .collect::<Vec<_>>()
        .join(", ");
    writeln!(
        file,
        "pub const {}: [&str; {}] = [{}];",
        key,
        vec.len(),
        list_str
    )
    .unwrap_or_else(|_| panic!("Failed to write '{}' to gen/build.rs", key));
}
