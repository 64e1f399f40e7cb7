//! Output destinations for rendered documents.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Component, Path, PathBuf};

use tracing::debug;

/// Receives rendered documents, one whole file per call.
pub trait OutputSink: Send {
    /// Write `bytes` to `path`, relative to the sink's root.
    fn write(&mut self, path: &str, bytes: &[u8]) -> io::Result<()>;
}

/// Writes files under a root directory.
///
/// Parent directories are created as needed. A target that already exists
/// as a directory is an error, as is any path escaping the root.
#[derive(Debug, Clone)]
pub struct FsSink {
    root: PathBuf,
}

impl FsSink {
    /// Create a sink rooted at `root`. The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location `path` would be written to.
    pub fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if path.is_empty() || escapes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("output path '{path}' must stay inside the output directory"),
            ));
        }
        Ok(self.root.join(relative))
    }
}

impl OutputSink for FsSink {
    fn write(&mut self, path: &str, bytes: &[u8]) -> io::Result<()> {
        let target = self.resolve(path)?;
        if target.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("'{}' is a directory", target.display()),
            ));
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut writer = BufWriter::new(File::create(&target)?);
        writer.write_all(bytes)?;
        writer.flush()?;
        debug!(path = %target.display(), bytes = bytes.len(), "wrote file");
        Ok(())
    }
}

/// Keeps documents in memory, for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    files: BTreeMap<String, Vec<u8>>,
    order: Vec<String>,
}

impl MemorySink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Contents written to `path`, if any.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    /// Paths in the order they were first written.
    #[must_use]
    pub fn paths(&self) -> &[String] {
        &self.order
    }

    /// Number of distinct files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether nothing was written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl OutputSink for MemorySink {
    fn write(&mut self, path: &str, bytes: &[u8]) -> io::Result<()> {
        if self.files.insert(path.to_string(), bytes.to_vec()).is_none() {
            self.order.push(path.to_string());
        }
        Ok(())
    }
}
