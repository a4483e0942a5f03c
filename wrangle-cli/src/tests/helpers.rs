//! Extract files and workspace helpers shared by the CLI tests.

use std::io::Write as _;

use bzip2::{Compression, write::BzEncoder};
use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;

/// Three nodes, one of them invalid, and a way over the two valid ones.
pub(super) const EXTRACT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<osm version="0.6" generator="test">
  <bounds minlat="51.30" minlon="-0.45" maxlat="51.40" maxlon="-0.35"/>
  <node id="1" lat="51.35" lon="-0.40">
    <tag k="addr:street" v="Station Rd"/>
    <tag k="addr:postcode" v="kt12 1aa"/>
  </node>
  <node id="2" lat="51.36" lon="-0.41"/>
  <node id="3" lat="north" lon="-0.42"/>
  <way id="10">
    <nd ref="1"/>
    <nd ref="2"/>
    <tag k="highway" v="residential"/>
    <tag k="name" v="Station ROAD"/>
  </way>
</osm>
"#;

/// A temporary directory holding extracts for one test.
#[derive(Debug)]
pub(super) struct Workspace {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl Workspace {
    pub(super) fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 workspace");
        Self { _dir: dir, root }
    }

    pub(super) fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Write `contents` to `name` inside the workspace.
    pub(super) fn write(&self, name: &str, contents: &[u8]) -> Utf8PathBuf {
        let path = self.root.join(name);
        write_utf8(&path, contents);
        path
    }

    /// Write `contents` bzip2-compressed to `name` inside the workspace.
    pub(super) fn write_bz2(&self, name: &str, contents: &[u8]) -> Utf8PathBuf {
        let mut encoder = BzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(contents).expect("compress extract");
        let compressed = encoder.finish().expect("finish bzip2 stream");
        self.write(name, &compressed)
    }
}

pub(super) fn write_utf8(path: &Utf8Path, contents: &[u8]) {
    std::fs::write(path.as_std_path(), contents).expect("write test file");
}

/// Parse the JSON report written by a command.
pub(super) fn parse_output(buffer: &[u8]) -> serde_json::Value {
    serde_json::from_slice(buffer).expect("command output should be JSON")
}
