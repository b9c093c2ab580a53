//! Temporary files.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log;
use tempfile;

/// A temporary file referenced by its path.
///
/// The file is created empty on construction but no descriptor is kept open, so any number of resources can exist
/// without exhausting the descriptor limit. The file is removed by [`TempResource::delete`] or, at the latest, when
/// the resource is dropped.
#[derive(Debug)]
pub struct TempResource {
    path: PathBuf,
    released: bool,
}

impl TempResource {
    /// Creates a temporary file in the default OS temporary directory.
    pub fn new() -> io::Result<Self> {
        Self::new_in(env::temp_dir())
    }

    /// Creates a temporary file in the provided directory.
    pub fn new_in<P: AsRef<Path>>(dir: P) -> io::Result<Self> {
        let path = tempfile::Builder::new()
            .prefix("chunk-")
            .suffix(".jsonl")
            .tempfile_in(dir)?
            .into_temp_path()
            .keep()?;

        return Ok(TempResource { path, released: false });
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Checks if the file has already been released.
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Removes the file. A file that is already gone is not an error and repeated calls are no-ops.
    pub fn delete(&mut self) -> io::Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        match fs::remove_file(&self.path) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        }
    }

    /// Removes the file logging a warning on failure.
    pub fn release(mut self) {
        self.release_logged();
    }

    fn release_logged(&mut self) {
        if let Err(err) = self.delete() {
            log::warn!("temporary file {} not removed: {}", self.path.display(), err);
        }
    }
}

impl Drop for TempResource {
    fn drop(&mut self) {
        self.release_logged();
    }
}

#[cfg(test)]
mod test {
    use std::fs;

    use rstest::*;

    use super::TempResource;

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir_in("./").unwrap()
    }

    #[rstest]
    fn test_create(tmp_dir: tempfile::TempDir) {
        let first = TempResource::new_in(tmp_dir.path()).unwrap();
        let second = TempResource::new_in(tmp_dir.path()).unwrap();

        assert_ne!(first.path(), second.path());
        assert_eq!(fs::read(first.path()).unwrap(), b"");
        fs::write(first.path(), "text").unwrap();
        assert_eq!(fs::read_to_string(first.path()).unwrap(), "text");
    }

    #[rstest]
    fn test_delete(tmp_dir: tempfile::TempDir) {
        let mut resource = TempResource::new_in(tmp_dir.path()).unwrap();
        fs::write(resource.path(), "text").unwrap();

        resource.delete().unwrap();
        assert!(!resource.path().exists());
        assert!(resource.is_released());

        resource.delete().unwrap();
    }

    #[rstest]
    fn test_delete_missing_file(tmp_dir: tempfile::TempDir) {
        let mut resource = TempResource::new_in(tmp_dir.path()).unwrap();
        fs::remove_file(resource.path()).unwrap();

        assert!(resource.delete().is_ok());
    }

    #[rstest]
    fn test_drop_removes_file(tmp_dir: tempfile::TempDir) {
        let resource = TempResource::new_in(tmp_dir.path()).unwrap();
        let path = resource.path().to_path_buf();
        assert!(path.exists());

        drop(resource);
        assert!(!path.exists());
    }

    #[test]
    fn test_default_location() {
        let resource = TempResource::new().unwrap();
        let path = resource.path().to_path_buf();
        assert!(path.starts_with(std::env::temp_dir()));

        resource.release();
        assert!(!path.exists());
    }
}
