//! Session configuration.

use serde::{Deserialize, Serialize};
use strata_core::{Error, Result};

/// Tunables of a [`Session`](crate::Session).
///
/// Every field has a default, so a JSON document only names what it
/// changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct SessionConfig {
    /// Records fetched past each edge of a window so that nearby local
    /// edits resolve without a round trip.
    pub window_margin: usize,
    /// Plan/fetch/merge rounds one `sync` may run.
    pub max_sync_rounds: usize,
    /// Verify the store invariants after every mutation.
    pub check_invariants: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            window_margin: 0,
            max_sync_rounds: 8,
            check_invariants: cfg!(debug_assertions),
        }
    }
}

impl SessionConfig {
    /// Parses a configuration document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: SessionConfig =
            serde_json::from_str(json).map_err(|e| Error::decode("config", e.to_string()))?;
        if config.max_sync_rounds == 0 {
            return Err(Error::decode("maxSyncRounds", "must be at least 1"));
        }
        Ok(config)
    }

    /// Sets the window margin.
    pub fn window_margin(mut self, margin: usize) -> Self {
        self.window_margin = margin;
        self
    }
}
