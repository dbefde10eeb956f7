//! Events produced by decisions and tracking calls.
//!
//! Both event kinds convert into [`OdpEvent`]s so they ride the shared
//! delivery queue. User attributes stay on the engine-side structs; only
//! primitive payload fields go on the wire.
use std::collections::HashMap;

use serde::Serialize;

use crate::decision::DecisionSource;
use crate::odp::event::{OdpEvent, FS_USER_ID, ODP_EVENT_TYPE};
use crate::{Attributes, Value};

/// Emitted when a decision is reached and tracking is enabled.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpressionEvent {
    pub user_id: String,
    pub attributes: Attributes,
    pub flag_key: String,
    /// Empty when no rule decided (e.g. a flag-scoped forced decision).
    pub rule_key: String,
    pub rule_type: DecisionSource,
    /// Empty when no variation was assigned.
    pub variation_key: String,
    pub enabled: bool,
}

impl ImpressionEvent {
    pub fn into_odp_event(self) -> OdpEvent {
        OdpEvent::new(
            ODP_EVENT_TYPE,
            "decision",
            [(FS_USER_ID.to_owned(), self.user_id)].into(),
            [
                ("flag_key".to_owned(), self.flag_key.into()),
                ("rule_key".to_owned(), self.rule_key.into()),
                (
                    "rule_type".to_owned(),
                    self.rule_type.as_str().into(),
                ),
                ("variation_key".to_owned(), self.variation_key.into()),
                ("enabled".to_owned(), self.enabled.into()),
            ]
            .into(),
        )
    }
}

/// Emitted by `track_event` for a known event key.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionEvent {
    pub user_id: String,
    pub attributes: Attributes,
    pub event_id: String,
    pub event_key: String,
    /// Caller-supplied tags; values must be primitives to be deliverable.
    pub tags: HashMap<String, Value>,
}

impl ConversionEvent {
    pub fn into_odp_event(self) -> OdpEvent {
        let mut data: HashMap<String, serde_json::Value> = self
            .tags
            .into_iter()
            .map(|(key, value)| (key, value.into()))
            .collect();
        data.insert("event_id".to_owned(), self.event_id.into());
        data.insert("event_key".to_owned(), self.event_key.clone().into());
        OdpEvent::new(
            ODP_EVENT_TYPE,
            self.event_key,
            [(FS_USER_ID.to_owned(), self.user_id)].into(),
            data,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn impression_converts_to_a_decision_event() {
        let event = ImpressionEvent {
            user_id: "user-1".to_owned(),
            attributes: Attributes::new(),
            flag_key: "checkout".to_owned(),
            rule_key: "checkout_test".to_owned(),
            rule_type: DecisionSource::FeatureTest,
            variation_key: "treatment".to_owned(),
            enabled: true,
        }
        .into_odp_event();

        assert_eq!(event.event_type, "fullstack");
        assert_eq!(event.action, "decision");
        assert_eq!(event.identifiers[FS_USER_ID], "user-1");
        assert_eq!(event.data["flag_key"], "checkout");
        assert_eq!(event.data["rule_type"], "feature-test");
        assert_eq!(event.data["enabled"], true);
        assert!(event.validate().is_ok());
    }

    #[test]
    fn conversion_uses_the_event_key_as_action() {
        let event = ConversionEvent {
            user_id: "user-1".to_owned(),
            attributes: Attributes::new(),
            event_id: "e1".to_owned(),
            event_key: "purchase".to_owned(),
            tags: [("revenue".to_owned(), 42.into())].into(),
        }
        .into_odp_event();

        assert_eq!(event.action, "purchase");
        assert_eq!(event.data["revenue"], 42);
        assert_eq!(event.data["event_id"], "e1");
        assert!(event.validate().is_ok());
    }
}
