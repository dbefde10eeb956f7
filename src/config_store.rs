use std::sync::{Arc, RwLock};

use crate::project_config::ProjectConfig;

/// A thread-safe container for the currently active [`ProjectConfig`].
///
/// Readers get an `Arc` snapshot, so a concurrent update never changes a
/// decision mid-flight: the whole config is swapped atomically.
#[derive(Debug, Default)]
pub struct ConfigStore {
    config: RwLock<Option<Arc<ProjectConfig>>>,
}

impl ConfigStore {
    pub fn new() -> ConfigStore {
        ConfigStore {
            config: RwLock::new(None),
        }
    }

    /// Whether a config has been installed.
    pub fn is_initialized(&self) -> bool {
        self.config
            .read()
            .expect("ConfigStore lock is poisoned")
            .is_some()
    }

    /// A snapshot of the active config, or `None` before the first `set`.
    pub fn get(&self) -> Option<Arc<ProjectConfig>> {
        self.config
            .read()
            .expect("ConfigStore lock is poisoned")
            .clone()
    }

    /// Install a new config revision, replacing the previous one.
    pub fn set(&self, config: Arc<ProjectConfig>) {
        log::info!(target: "flagship",
                   revision = config.revision.as_str();
                   "installing project config");
        *self.config.write().expect("ConfigStore lock is poisoned") = Some(config);
    }
}
