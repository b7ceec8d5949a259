//! Atomic JSON state file

use super::{PersistedState, STATE_VERSION};
use crate::error::PipelineError;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Reads and atomically replaces the state file
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the state, or a fresh one when no file exists yet
    pub fn load(&self) -> Result<PersistedState, PipelineError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = ?self.path, "No state file, starting fresh");
                return Ok(PersistedState::default());
            }
            Err(e) => return Err(e.into()),
        };

        let state: PersistedState = serde_json::from_slice(&bytes).map_err(|e| {
            PipelineError::Persistence(format!("Corrupt state file {:?}: {}", self.path, e))
        })?;

        if state.version != STATE_VERSION {
            return Err(PipelineError::Persistence(format!(
                "Unsupported state version {} (expected {})",
                state.version, STATE_VERSION
            )));
        }

        tracing::info!(
            path = ?self.path,
            known_markets = state.seen.len(),
            tracked_markets = state.tracked.len(),
            outbox = state.outbox.len(),
            "Loaded state"
        );
        Ok(state)
    }

    /// Replace the state file with `state`
    ///
    /// Writes a sibling temp file, syncs it and renames it over the target so
    /// a crash leaves either the old or the new document, never a mix.
    pub fn save(&self, state: &PersistedState) -> Result<(), PipelineError> {
        let bytes = serde_json::to_vec(state)
            .map_err(|e| PipelineError::Persistence(format!("Failed to encode state: {}", e)))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.tmp_path();
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;

        tracing::trace!(path = ?self.path, bytes = bytes.len(), "Saved state");
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
