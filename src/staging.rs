//! Atomic publication of output files.
//!
//! Output is written to a hidden temporary file next to its destination
//! and renamed into place only once it is complete. A [`StagedFile`] that
//! is dropped without [`publish`](StagedFile::publish) removes its
//! temporary file, so failed or cancelled writes never leave anything at
//! the final path.

use std::{
    fs::File,
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;

use crate::error::SceneGifError;

/// A file being written that becomes visible at its destination only on
/// success.
#[derive(Debug)]
pub(crate) struct StagedFile {
    temp: NamedTempFile,
    destination: PathBuf,
}

impl StagedFile {
    /// Stage a new file for `destination`, in the same directory.
    pub(crate) fn new<P: AsRef<Path>>(destination: P) -> Result<Self, SceneGifError> {
        let destination = destination.as_ref().to_path_buf();
        let directory = destination
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let temp = tempfile::Builder::new()
            .prefix(".scenegif-")
            .suffix(".part")
            .tempfile_in(directory)?;

        log::debug!(
            "Staging {} at {}",
            destination.display(),
            temp.path().display()
        );

        Ok(Self { temp, destination })
    }

    /// The staged file, open for writing.
    pub(crate) fn file_mut(&mut self) -> &mut File {
        self.temp.as_file_mut()
    }

    /// Flush to disk and atomically rename over the destination.
    pub(crate) fn publish(self) -> Result<PathBuf, SceneGifError> {
        self.temp.as_file().sync_all()?;
        self.temp
            .persist(&self.destination)
            .map_err(|error| SceneGifError::IoError(error.error))?;
        log::debug!("Published {}", self.destination.display());
        Ok(self.destination)
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, io::Write};

    use super::*;

    fn entries(directory: &Path) -> usize {
        fs::read_dir(directory).unwrap().count()
    }

    #[test]
    fn publish_moves_file_into_place() {
        let directory = tempfile::tempdir().unwrap();
        let destination = directory.path().join("out.gif");

        let mut staged = StagedFile::new(&destination).unwrap();
        staged.file_mut().write_all(b"GIF89a").unwrap();
        assert!(!destination.exists());

        let published = staged.publish().unwrap();
        assert_eq!(published, destination);
        assert_eq!(fs::read(&destination).unwrap(), b"GIF89a");
        assert_eq!(entries(directory.path()), 1);
    }

    #[test]
    fn dropping_leaves_nothing_behind() {
        let directory = tempfile::tempdir().unwrap();
        let destination = directory.path().join("out.gif");

        let mut staged = StagedFile::new(&destination).unwrap();
        staged.file_mut().write_all(b"partial").unwrap();
        drop(staged);

        assert!(!destination.exists());
        assert_eq!(entries(directory.path()), 0);
    }

    #[test]
    fn publish_replaces_existing_file() {
        let directory = tempfile::tempdir().unwrap();
        let destination = directory.path().join("out.gif");
        fs::write(&destination, b"old").unwrap();

        let mut staged = StagedFile::new(&destination).unwrap();
        staged.file_mut().write_all(b"new").unwrap();
        staged.publish().unwrap();

        assert_eq!(fs::read(&destination).unwrap(), b"new");
    }
}
