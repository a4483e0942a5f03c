//! Opening the SQLite file that receives an extract.

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8};
use rusqlite::{Connection, Error as SqliteError};
use thiserror::Error;

/// Errors raised when opening the destination database.
#[derive(Debug, Error)]
pub enum OpenStoreError {
    /// Failed to create the parent directory for the SQLite file.
    #[error("failed to create parent directory {path:?}")]
    CreateDirectory {
        /// Path of the directory that could not be created.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Opening the SQLite database failed.
    #[error("failed to open SQLite database at {path:?}")]
    Open {
        /// Destination database path.
        path: Utf8PathBuf,
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
}

/// Open (creating if needed) the SQLite database at `path`.
///
/// Missing parent directories are created first.
///
/// # Examples
/// ```
/// use camino::Utf8PathBuf;
/// use wrangle_data::load::open_database;
///
/// let dir = tempfile::tempdir().unwrap();
/// let path = Utf8PathBuf::from_path_buf(dir.path().join("nested/surrey.db")).unwrap();
/// let connection = open_database(&path).unwrap();
/// assert!(path.exists());
/// drop(connection);
/// ```
pub fn open_database(path: &Utf8Path) -> Result<Connection, OpenStoreError> {
    ensure_parent_dir(path)?;
    Connection::open(path.as_std_path()).map_err(|source| OpenStoreError::Open {
        path: path.to_path_buf(),
        source,
    })
}

fn ensure_parent_dir(path: &Utf8Path) -> Result<(), OpenStoreError> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    let (anchor, relative) = split_anchor(parent);
    if relative.as_str().is_empty() {
        return Ok(());
    }

    let create_error = |source: std::io::Error| OpenStoreError::CreateDirectory {
        path: parent.to_path_buf(),
        source,
    };
    fs_utf8::Dir::open_ambient_dir(anchor, ambient_authority())
        .and_then(|dir| dir.create_dir_all(relative))
        .map_err(create_error)
}

/// Split `dir` into the ambient directory to open and the part below it.
///
/// Absolute paths are anchored at `/`, relative ones at the working
/// directory.
fn split_anchor(dir: &Utf8Path) -> (&'static Utf8Path, &Utf8Path) {
    match dir.strip_prefix("/") {
        Ok(relative) => (Utf8Path::new("/"), relative),
        Err(_) => (Utf8Path::new("."), dir),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    fn utf8(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("temp dir is UTF-8")
    }

    #[rstest]
    fn creates_missing_parent_directories() {
        let dir = TempDir::new().expect("create temp dir");
        let path = utf8(&dir).join("a/b/extract.db");
        open_database(&path).expect("open database");
        assert!(path.parent().is_some_and(Utf8Path::is_dir));
    }

    #[rstest]
    #[case("extract.db", ".", "")]
    #[case("out/extract.db", ".", "out")]
    #[case("/", "/", "")]
    #[case("/var/lib/extract.db", "/", "var/lib")]
    fn anchors_parent_directories(
        #[case] path: &str,
        #[case] anchor: &str,
        #[case] relative: &str,
    ) {
        let parent = Utf8Path::new(path).parent().unwrap_or(Utf8Path::new(path));
        let (found_anchor, found_relative) = split_anchor(parent);
        assert_eq!(found_anchor, Utf8Path::new(anchor));
        assert_eq!(found_relative, Utf8Path::new(relative));
    }

    #[rstest]
    fn opens_in_the_working_directory() {
        assert!(ensure_parent_dir(Utf8Path::new("extract.db")).is_ok());
    }

    #[rstest]
    fn reports_unwritable_parent() {
        let dir = TempDir::new().expect("create temp dir");
        let blocker = utf8(&dir).join("file");
        std::fs::write(&blocker, b"not a directory").expect("write blocker");
        let err = open_database(&blocker.join("extract.db")).expect_err("parent is a file");
        assert!(matches!(err, OpenStoreError::CreateDirectory { path, .. } if path == blocker));
    }
}
