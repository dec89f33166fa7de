//! Mirror a local directory tree into a destination.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::destination::{Destination, DestinationError};

/// Recursive mirror that skips anything the destination already has,
/// keyed by the path relative to the scanned root. No ordering guarantee
/// between files.
pub struct AttachmentsDirectory {
    destination: Arc<dyn Destination>,
    path: PathBuf,
}

impl AttachmentsDirectory {
    pub fn new(destination: Arc<dyn Destination>, path: impl Into<PathBuf>) -> Self {
        AttachmentsDirectory {
            destination,
            path: path.into(),
        }
    }

    /// Upload every file under the tree that the destination does not
    /// already have.
    pub fn scan(&self) -> Result<(), DestinationError> {
        self.scan_dir(&self.path)
    }

    fn scan_dir(&self, dir: &Path) -> Result<(), DestinationError> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                self.scan_dir(&path)?;
                continue;
            }

            let relative = path
                .strip_prefix(&self.path)
                .expect("entry is under the scanned root");
            let name = relative.to_string_lossy().replace('\\', "/");
            if !self.destination.has(&name)? {
                debug!(name = %name, "uploading attachment");
                let data = fs::read(&path)?;
                self.destination.write(&name, &data)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::mock::MockDestination;

    fn populate(root: &Path) {
        fs::create_dir_all(root.join("screenshots")).unwrap();
        fs::write(root.join("run.log"), b"log body").unwrap();
        fs::write(root.join("screenshots/final.png"), b"png body").unwrap();
    }

    #[test]
    fn test_scan_mirrors_tree_with_relative_names() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path());
        let mock = MockDestination::new();

        AttachmentsDirectory::new(Arc::new(mock.clone()), dir.path())
            .scan()
            .unwrap();

        assert_eq!(mock.object("run.log").unwrap(), b"log body");
        assert_eq!(mock.object("screenshots/final.png").unwrap(), b"png body");
    }

    #[test]
    fn test_scan_skips_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path());
        let mock = MockDestination::new().with_object("run.log", b"already here");

        AttachmentsDirectory::new(Arc::new(mock.clone()), dir.path())
            .scan()
            .unwrap();

        // The pre-existing object was not overwritten.
        assert_eq!(mock.object("run.log").unwrap(), b"already here");
        assert_eq!(mock.object("screenshots/final.png").unwrap(), b"png body");
    }

    #[test]
    fn test_scan_of_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockDestination::new();

        AttachmentsDirectory::new(Arc::new(mock.clone()), dir.path())
            .scan()
            .unwrap();

        assert!(mock.filenames().is_empty());
    }
}
