//! HTML directory listing maintained over a destination.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use crate::destination::{Destination, DestinationError};

pub const DEFAULT_INDEX: &str = "index.html";

/// Decorator that records every write and answers `has` from that
/// record, so destinations without a native existence check can still be
/// probed. Append-only from the producer's viewpoint: `delete` is
/// unsupported; finalization paths that remove artifacts go directly to
/// the wrapped destination.
pub struct Index {
    destination: Arc<dyn Destination>,
    filename: String,
    state: Mutex<IndexState>,
}

struct IndexState {
    files: BTreeSet<String>,
    dirty: bool,
}

impl Index {
    pub fn new(destination: Arc<dyn Destination>) -> Self {
        Self::with_filename(destination, DEFAULT_INDEX)
    }

    pub fn with_filename(destination: Arc<dyn Destination>, filename: impl Into<String>) -> Self {
        Index {
            destination,
            filename: filename.into(),
            state: Mutex::new(IndexState {
                files: BTreeSet::new(),
                dirty: true,
            }),
        }
    }

    /// The wrapped destination, for paths that bypass the listing.
    pub fn destination(&self) -> &Arc<dyn Destination> {
        &self.destination
    }

    /// Regenerate the listing page if anything was written since the
    /// last sync. The page itself is not listed.
    pub fn sync(&self) -> Result<(), DestinationError> {
        let mut state = self.state.lock().unwrap();
        if state.dirty {
            let page = listing(&state.files);
            self.destination.write(&self.filename, page.as_bytes())?;
            state.dirty = false;
        }
        Ok(())
    }
}

impl Destination for Index {
    fn location(&self) -> &str {
        self.destination.location()
    }

    fn has(&self, filename: &str) -> Result<bool, DestinationError> {
        Ok(self.state.lock().unwrap().files.contains(filename))
    }

    fn write(&self, filename: &str, data: &[u8]) -> Result<(), DestinationError> {
        self.destination.write(filename, data)?;
        let mut state = self.state.lock().unwrap();
        state.files.insert(filename.to_string());
        state.dirty = true;
        Ok(())
    }

    fn delete(&self, _filenames: &[String]) -> Result<(), DestinationError> {
        Err(DestinationError::Unsupported("the index is append-only"))
    }
}

fn listing(files: &BTreeSet<String>) -> String {
    let mut entries = String::new();
    for file in files {
        entries.push_str(&format!("      <li><a href={file}>{file}</a></li> \n"));
    }
    format!(
        "\n<html>\n  <body>\n    <h1>Directory listing for /</h1>\n    <hr>\n    <ul>\n{entries}    </ul>\n  </body>\n</html>\n"
    )
}
