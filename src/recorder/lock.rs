//! Lock artifact
//!
//! A zero-byte file next to the destination. It exists from before the
//! container is opened until after it is closed, so a leftover marker means the
//! recording did not shut down cleanly and the file may end mid-fragment.

use crate::recorder::error::{RecordingError, RecordingResult};
use std::ffi::OsString;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct LockArtifact {
    path: PathBuf,
}

impl LockArtifact {
    /// `destination` with `suffix` appended to the full file name
    pub fn path_for(destination: &Path, suffix: &str) -> PathBuf {
        let mut path = OsString::from(destination.as_os_str());
        path.push(suffix);
        PathBuf::from(path)
    }

    /// Create the marker. An existing marker from a crashed run is truncated and reused.
    pub fn create(destination: &Path, suffix: &str) -> RecordingResult<Self> {
        let path = Self::path_for(destination, suffix);
        File::create(&path).map_err(|source| RecordingError::ResilienceProtocol {
            path: path.clone(),
            source,
        })?;
        tracing::debug!("Created lock artifact {:?}", path);
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Delete the marker. Already-missing markers are not an error.
    pub fn remove(self) -> RecordingResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!("Removed lock artifact {:?}", self.path);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!("Lock artifact {:?} was already gone", self.path);
                Ok(())
            }
            Err(source) => Err(RecordingError::ResilienceProtocol {
                path: self.path,
                source,
            }),
        }
    }
}
