#![allow(dead_code)]

use std::path::PathBuf;

use krait::config::Config;

pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

pub fn sample_libs_dir() -> PathBuf {
    fixtures_dir().join("sample_libs")
}

pub fn site_packages_dir() -> PathBuf {
    fixtures_dir().join("site_packages")
}

/// Configuration pointing at the checked-in sample libraries and the fake
/// site-packages directory.
pub fn fixture_config() -> Config {
    Config {
        src: vec![sample_libs_dir()],
        site_packages: vec![site_packages_dir()],
        ..Config::default()
    }
}
