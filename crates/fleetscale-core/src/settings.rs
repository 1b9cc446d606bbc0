//! Live configuration handle.
//!
//! The control loop reads one `Arc<ScalingConfig>` at the start of a tick
//! and keeps it for the whole tick. `refresh()` runs between ticks and swaps
//! in a new config only when the file parsed and validated.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::{ConfigStore, ScalingConfig};
use crate::error::ConfigError;

pub struct SettingsHandle {
    store: Option<ConfigStore>,
    tx: watch::Sender<Arc<ScalingConfig>>,
}

impl SettingsHandle {
    /// A handle that never reloads (tests, one-shot runs).
    pub fn fixed(config: ScalingConfig) -> Self {
        let (tx, _) = watch::channel(Arc::new(config));
        Self { store: None, tx }
    }

    /// Load from the store (writing defaults if the file is missing).
    pub fn from_store(store: ConfigStore) -> Result<Self, ConfigError> {
        let config = store.load_or_init()?;
        let (tx, _) = watch::channel(Arc::new(config));
        Ok(Self {
            store: Some(store),
            tx,
        })
    }

    /// The config generation currently in effect.
    pub fn current(&self) -> Arc<ScalingConfig> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<ScalingConfig>> {
        self.tx.subscribe()
    }

    /// Install a new config generation. Returns whether it differed.
    pub fn replace(&self, config: ScalingConfig) -> bool {
        self.tx.send_if_modified(|current| {
            if **current == config {
                return false;
            }
            *current = Arc::new(config);
            true
        })
    }

    /// Re-read the backing file. Keeps the last good config on failure.
    pub fn refresh(&self) -> bool {
        let Some(store) = &self.store else {
            return false;
        };
        match store.load() {
            Ok(config) => {
                let changed = self.replace(config);
                if changed {
                    info!(path = ?store.path(), "scaling configuration reloaded");
                }
                changed
            }
            Err(e) => {
                warn!(error = %e, "config reload failed, keeping previous configuration");
                false
            }
        }
    }
}
