/*!
DumpSink: pluggable destination for behavioral state snapshots.

Cache and shared-memory dumps are inspection artifacts, not persistence.
Keeping them behind a sink lets the CLI write a directory while tests
capture the same bytes in memory.
*/

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;

/// Destination for named snapshot files.
pub trait DumpSink {
    fn emit(&mut self, name: &str, contents: &[u8]) -> io::Result<()>;
}

/// Writes each snapshot as a file under a root directory.
#[derive(Debug)]
pub struct DirSink {
    root: PathBuf,
}

impl DirSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirSink { root: root.into() }
    }
}

impl DumpSink for DirSink {
    fn emit(&mut self, name: &str, contents: &[u8]) -> io::Result<()> {
        fs::create_dir_all(&self.root)?;
        fs::write(self.root.join(name), contents)
    }
}

/// Captures snapshots in memory, keyed by name.
#[derive(Debug, Default)]
pub struct MemSink {
    pub files: BTreeMap<String, Vec<u8>>,
}

impl MemSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A captured file as UTF-8 text, if present.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.files.get(name).and_then(|b| std::str::from_utf8(b).ok())
    }
}

impl DumpSink for MemSink {
    fn emit(&mut self, name: &str, contents: &[u8]) -> io::Result<()> {
        self.files.insert(name.to_string(), contents.to_vec());
        Ok(())
    }
}
