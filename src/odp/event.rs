use std::collections::HashMap;

use serde::Serialize;

use crate::sdk_metadata::SdkMetadata;
use crate::{Error, Result};

/// Canonical user identifier key on the wire.
pub const FS_USER_ID: &str = "fs_user_id";

/// Event type used for all events emitted by this engine.
pub const ODP_EVENT_TYPE: &str = "fullstack";

/// One event bound for the ODP events endpoint.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OdpEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub action: String,
    pub identifiers: HashMap<String, String>,
    pub data: HashMap<String, serde_json::Value>,
}

impl OdpEvent {
    /// Build an event, canonicalizing `fs_user_id` identifier variants
    /// (`FS_USER_ID`, `fs-user-id`, ...) to the exact wire key.
    pub fn new(
        event_type: impl Into<String>,
        action: impl Into<String>,
        identifiers: HashMap<String, String>,
        data: HashMap<String, serde_json::Value>,
    ) -> OdpEvent {
        let identifiers = identifiers
            .into_iter()
            .map(|(key, value)| {
                if key.to_lowercase().replace('-', "_") == FS_USER_ID {
                    (FS_USER_ID.to_owned(), value)
                } else {
                    (key, value)
                }
            })
            .collect();
        OdpEvent {
            event_type: event_type.into(),
            action: action.into(),
            identifiers,
            data: data.into_iter().collect(),
        }
    }

    /// Reject events the endpoint would refuse: an empty action or data
    /// values that are not JSON primitives.
    pub fn validate(&self) -> Result<()> {
        if self.action.is_empty() {
            return Err(Error::OdpInvalidAction);
        }
        let valid = self.data.values().all(|value| {
            matches!(
                value,
                serde_json::Value::Null
                    | serde_json::Value::Bool(_)
                    | serde_json::Value::Number(_)
                    | serde_json::Value::String(_)
            )
        });
        if !valid {
            return Err(Error::OdpInvalidData);
        }
        Ok(())
    }

    /// Merge the common payload into `data`. Caller-supplied keys win.
    pub fn add_common_data(&mut self, metadata: &SdkMetadata) {
        self.data
            .entry("idempotence_id".to_owned())
            .or_insert_with(|| uuid::Uuid::new_v4().to_string().into());
        self.data
            .entry("data_source_type".to_owned())
            .or_insert_with(|| "sdk".into());
        self.data
            .entry("data_source".to_owned())
            .or_insert_with(|| metadata.name.into());
        self.data
            .entry("data_source_version".to_owned())
            .or_insert_with(|| metadata.version.into());
    }
}
