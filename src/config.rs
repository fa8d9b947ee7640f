//! Store configuration surface.
//!
//! Consumed, not owned: parsed out of whatever server configuration format
//! the embedding application uses and handed to [`StateStore::new`].
//!
//! [`StateStore::new`]: crate::state::StateStore::new

use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_max_sessions() -> u32 {
    4096
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

/// Configuration for a [`StateStore`](crate::state::StateStore).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// Maximum number of in-progress sessions tracked at once.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: u32,

    /// How long an entry may sit idle between rounds before it is swept.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Byte stamped into every minted key, identifying which server instance
    /// minted the token.  Load-balancing and debugging aid only.
    #[serde(default)]
    pub server_id: u8,

    /// Whether the deployment runs worker threads.  The store serializes
    /// mutation behind its mutex either way; the flag is accepted so
    /// single-threaded deployments can state their intent in config.
    #[serde(default = "default_true")]
    pub thread_safe: bool,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            timeout_secs: default_timeout_secs(),
            server_id: 0,
            thread_safe: true,
        }
    }
}

impl StateConfig {
    /// Entry lifetime as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
