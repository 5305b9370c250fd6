//! Scoped temporary files
//!
//! Every file the service materializes lives under a [`WorkDir`] and is owned by
//! a [`TempFile`] guard. Dropping the guard removes the file, so whatever path a
//! request takes out of a handler (success, error, or a client hanging up
//! mid-download) the files it created go with it.

use std::{
    io,
    path::{Path, PathBuf},
};

use tempfile::TempPath;
use tracing::{debug, trace, warn};

const PREFIX: &str = "spotproxy-";

#[derive(Debug, Clone)]
pub struct WorkDir {
    root: PathBuf,
}

impl WorkDir {
    /// Use `root` as the working directory, creating it if needed
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        if !root.exists() {
            std::fs::create_dir_all(&root)?;
            debug!(path = ?root, "Created working directory");
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a uniquely named file ending in `suffix`.
    ///
    /// Returns the guard owning the path together with an open handle for writing.
    pub fn create(&self, suffix: &str) -> io::Result<(TempFile, tokio::fs::File)> {
        let named = tempfile::Builder::new()
            .prefix(PREFIX)
            .suffix(suffix)
            .tempfile_in(&self.root)?;
        let (file, path) = named.into_parts();
        trace!(path = ?path, "Created temporary file");

        Ok((
            TempFile { path: Some(path) },
            tokio::fs::File::from_std(file),
        ))
    }
}

/// A file that is deleted when this guard goes out of scope
#[derive(Debug)]
pub struct TempFile {
    path: Option<TempPath>,
}

impl TempFile {
    pub fn path(&self) -> &Path {
        // only `None` after close/drop
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }

    /// Remove the file now instead of waiting for the guard to drop.
    pub fn close(mut self) -> io::Result<()> {
        match self.path.take() {
            Some(path) => remove(path),
            None => Ok(()),
        }
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            let _ = remove(path);
        }
    }
}

fn remove(path: TempPath) -> io::Result<()> {
    let removed = path.to_path_buf();
    match path.close() {
        Ok(()) => {
            trace!(path = ?removed, "Removed temporary file");
            Ok(())
        }
        Err(e) => {
            warn!(path = ?removed, error = %e, "Failed to remove temporary file");
            Err(e)
        }
    }
}
