use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::ledger::Ledger;

/// A playlist as the baseline records it. Identity across servers is the
/// name; the per-server numeric id is looked up per call and never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistState {
    pub name: String,
    pub items: Vec<String>,
}

/// The last fully reconciled state, persisted as JSON between runs.
///
/// Loaded once at startup and written back exactly once, after the whole
/// pass has finished. Mid-pass changes only ever touch a working copy, so a
/// crash leaves the previous baseline intact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncState {
    pub subscriptions: Vec<String>,
    pub playlists: Vec<PlaylistState>,
    /// URLs that have completed at least one pass. A configured server not
    /// listed here gets the full-state bootstrap instead of diffing.
    pub servers: Vec<String>,
    pub todo: Ledger,
}

impl SyncState {
    /// Load the state document, starting empty when none exists yet.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("No state file at {}, starting fresh", path.display());
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file {}", path.display()))?;
        let state: SyncState = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse state file {}", path.display()))?;
        Ok(state)
    }

    /// Write the state document atomically: serialize to a sibling temp file
    /// and rename it over the target, so a crash mid-write cannot leave a
    /// truncated baseline behind.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents =
            serde_json::to_string_pretty(self).context("Failed to serialize sync state")?;

        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, contents)
            .with_context(|| format!("Failed to write state file {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path)
            .with_context(|| format!("Failed to replace state file {}", path.display()))?;
        Ok(())
    }

    pub fn playlist(&self, name: &str) -> Option<&PlaylistState> {
        self.playlists.iter().find(|p| p.name == name)
    }

    pub fn playlist_mut(&mut self, name: &str) -> Option<&mut PlaylistState> {
        self.playlists.iter_mut().find(|p| p.name == name)
    }
}
