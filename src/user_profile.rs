use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Sticky bucketing state for one user: which variation each experiment
/// already assigned them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: String,
    /// Experiment id to variation id.
    pub experiment_bucket_map: HashMap<String, String>,
}

impl UserProfile {
    pub fn new(user_id: impl Into<String>) -> UserProfile {
        UserProfile {
            user_id: user_id.into(),
            experiment_bucket_map: HashMap::new(),
        }
    }

    /// Stored variation id for the experiment, if any.
    pub fn variation_for(&self, experiment_id: &str) -> Option<&str> {
        self.experiment_bucket_map
            .get(experiment_id)
            .map(String::as_str)
    }
}

/// Host-provided persistence for sticky bucketing.
///
/// The decision pipeline consults `lookup` before bucketing an experiment and
/// calls `save` after a fresh assignment. Implementations should be fast;
/// both calls happen on the decision path.
pub trait UserProfileService: Send + Sync {
    /// The stored profile for the user, or `None` when unknown.
    fn lookup(&self, user_id: &str) -> Option<UserProfile>;

    /// Persist the profile, replacing any previous state for the user.
    fn save(&self, profile: UserProfile);
}

/// A process-local [`UserProfileService`] backed by a hash map. Suitable for
/// tests and single-process hosts; state is lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryUserProfileService {
    profiles: Mutex<HashMap<String, UserProfile>>,
}

impl InMemoryUserProfileService {
    pub fn new() -> InMemoryUserProfileService {
        InMemoryUserProfileService::default()
    }
}

impl UserProfileService for InMemoryUserProfileService {
    fn lookup(&self, user_id: &str) -> Option<UserProfile> {
        self.profiles
            .lock()
            .expect("InMemoryUserProfileService lock is poisoned")
            .get(user_id)
            .cloned()
    }

    fn save(&self, profile: UserProfile) {
        self.profiles
            .lock()
            .expect("InMemoryUserProfileService lock is poisoned")
            .insert(profile.user_id.clone(), profile);
    }
}
