//! Filesystem-backed destination for local runs.

use std::fs;
use std::path::PathBuf;

use tracing::info;

use super::{Destination, DestinationError};

pub struct LocalDestination {
    location: String,
    root: PathBuf,
}

impl LocalDestination {
    /// Create the target directory and write artifacts into it.
    pub fn new(location: impl Into<PathBuf>) -> Result<Self, DestinationError> {
        let root = location.into();
        fs::create_dir_all(&root)?;
        Ok(LocalDestination {
            location: root.display().to_string(),
            root,
        })
    }

    fn path(&self, filename: &str) -> PathBuf {
        self.root.join(filename)
    }
}

impl Destination for LocalDestination {
    fn location(&self) -> &str {
        &self.location
    }

    fn has(&self, filename: &str) -> Result<bool, DestinationError> {
        Ok(self.path(filename).exists())
    }

    fn write(&self, filename: &str, data: &[u8]) -> Result<(), DestinationError> {
        let path = self.path(filename);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        info!(path = %path.display(), "write");
        fs::write(path, data)?;
        Ok(())
    }

    fn delete(&self, filenames: &[String]) -> Result<(), DestinationError> {
        for filename in filenames {
            let path = self.path(filename);
            info!(path = %path.display(), "delete");
            fs::remove_file(path)?;
        }
        Ok(())
    }
}
