//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::path::PathBuf;

use drill_core::{parse_file, Document};

/// Path of the catalog fixture.
pub fn catalog_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("catalog.xml")
}

/// The catalog fixture, parsed.
pub fn catalog() -> Document {
    parse_file(catalog_path()).expect("catalog fixture parses")
}

/// Raw catalog text.
pub fn catalog_text() -> String {
    std::fs::read_to_string(catalog_path()).expect("catalog fixture readable")
}
