//! Store and binding configuration.
//!
//! Both structs deserialize from JSON with every field optional, so hosts
//! can keep option blobs next to their state definitions.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Store-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreConfig {
    /// Log every event and every resulting state at info level.
    pub debug: bool,
    /// Default buffer size for pull-style streams.
    pub stream_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            debug: false,
            stream_capacity: 1024,
        }
    }
}

impl StoreConfig {
    /// Parses a JSON config blob.
    ///
    /// # Errors
    /// `StoreError::Config` on malformed JSON or invalid values.
    pub fn from_json_str(input: &str) -> StoreResult<Self> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| StoreError::Config {
            reason: e.to_string(),
        })?;
        cfg.validate()
    }

    /// # Errors
    /// `StoreError::Config` if `stream_capacity` is zero.
    pub fn validate(self) -> StoreResult<Self> {
        if self.stream_capacity == 0 {
            return Err(StoreError::Config {
                reason: "streamCapacity must be at least 1".to_string(),
            });
        }
        Ok(self)
    }
}

/// Options for [`crate::Store::bind`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BindOptions {
    /// Skip the optimistic local write in the setter; the bound value then
    /// changes only when the published event comes back through the bus.
    pub disable_cache: bool,
    /// Throttle window for property and child updates, in milliseconds.
    #[serde(rename = "throttle", alias = "throtle", skip_serializing_if = "Option::is_none")]
    pub throttle_ms: Option<u64>,
}

impl BindOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn disable_cache(mut self) -> Self {
        self.disable_cache = true;
        self
    }

    #[must_use]
    pub fn throttle(mut self, window: Duration) -> Self {
        self.throttle_ms = Some(u64::try_from(window.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// The throttle window, if any.
    #[must_use]
    pub fn throttle_window(&self) -> Option<Duration> {
        self.throttle_ms.map(Duration::from_millis)
    }
}
