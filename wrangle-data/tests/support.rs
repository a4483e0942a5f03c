//! Shared helpers for `wrangle-data` integration tests.

use camino::Utf8PathBuf;
use std::path::Path;

/// Directory containing the XML fixtures.
pub fn fixtures_dir() -> Utf8PathBuf {
    Utf8PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

/// Path of a named fixture.
pub fn fixture(name: &str) -> Utf8PathBuf {
    fixtures_dir().join(name)
}

/// Convert a temporary path into a UTF-8 path.
pub fn utf8(path: &Path) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(path.to_path_buf())
        .unwrap_or_else(|path| panic!("temporary path {path:?} is not UTF-8"))
}
