//! Serde wire model of the datafile.
//!
//! This module only mirrors the JSON shape. Cross-indexing, referential
//! checks, and condition-tree parsing happen in [`crate::project_config`].
use std::collections::HashMap;

use serde::Deserialize;

/// The datafile schema version this engine supports.
pub const SUPPORTED_VERSION: &str = "4";

/// Top-level datafile document.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Datafile {
    pub version: String,
    pub account_id: String,
    pub project_id: String,
    pub revision: String,
    #[serde(default)]
    pub sdk_key: String,
    #[serde(default)]
    pub environment_key: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub anonymize_ip: bool,
    #[serde(default)]
    pub bot_filtering: Option<bool>,
    #[serde(default)]
    pub send_flag_decisions: bool,
    #[serde(default)]
    pub attributes: Vec<AttributeWire>,
    #[serde(default)]
    pub audiences: Vec<AudienceWire>,
    #[serde(default)]
    pub typed_audiences: Vec<AudienceWire>,
    #[serde(default)]
    pub events: Vec<EventWire>,
    #[serde(default)]
    pub experiments: Vec<ExperimentWire>,
    #[serde(default)]
    pub groups: Vec<GroupWire>,
    #[serde(default)]
    pub feature_flags: Vec<FeatureFlagWire>,
    #[serde(default)]
    pub rollouts: Vec<RolloutWire>,
    #[serde(default)]
    pub integrations: Vec<IntegrationWire>,
    #[serde(default)]
    pub holdouts: Vec<HoldoutWire>,
}

fn default_region() -> String {
    "US".to_owned()
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AttributeWire {
    pub id: String,
    pub key: String,
}

/// Plain audiences carry `conditions` as a JSON-encoded string; typed
/// audiences inline the JSON. Both are kept raw here.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AudienceWire {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub conditions: serde_json::Value,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct EventWire {
    pub id: String,
    pub key: String,
    #[serde(default)]
    pub experiment_ids: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentWire {
    pub id: String,
    pub key: String,
    #[serde(default)]
    pub layer_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(rename = "type", default)]
    pub experiment_type: String,
    #[serde(default)]
    pub variations: Vec<VariationWire>,
    #[serde(default)]
    pub traffic_allocation: Vec<TrafficAllocationWire>,
    #[serde(default)]
    pub audience_ids: Vec<String>,
    #[serde(default)]
    pub audience_conditions: Option<serde_json::Value>,
    /// Per-user variation overrides, keyed by user id.
    #[serde(default)]
    pub forced_variations: HashMap<String, String>,
    #[serde(default)]
    pub cmab: Option<CmabWire>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CmabWire {
    #[serde(default)]
    pub attribute_ids: Vec<String>,
    #[serde(default)]
    pub traffic_allocation: Option<u32>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VariationWire {
    pub id: String,
    pub key: String,
    #[serde(default)]
    pub feature_enabled: Option<bool>,
    #[serde(default)]
    pub variables: Vec<VariableUsageWire>,
}

/// A variable value attached to a variation, referencing the flag-level
/// variable declaration by id.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VariableUsageWire {
    pub id: String,
    pub value: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TrafficAllocationWire {
    #[serde(default)]
    pub entity_id: String,
    pub end_of_range: u32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GroupWire {
    pub id: String,
    #[serde(default)]
    pub policy: String,
    #[serde(default)]
    pub traffic_allocation: Vec<TrafficAllocationWire>,
    #[serde(default)]
    pub experiments: Vec<ExperimentWire>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlagWire {
    pub id: String,
    pub key: String,
    #[serde(default)]
    pub rollout_id: String,
    #[serde(default)]
    pub experiment_ids: Vec<String>,
    #[serde(default)]
    pub variables: Vec<VariableWire>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VariableWire {
    pub id: String,
    pub key: String,
    #[serde(rename = "type")]
    pub variable_type: String,
    /// A `string` variable with `subType = "json"` is promoted to `json`.
    #[serde(default)]
    pub sub_type: String,
    #[serde(default)]
    pub default_value: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RolloutWire {
    pub id: String,
    #[serde(default)]
    pub experiments: Vec<ExperimentWire>,
}

/// `key` is optional on the wire so that the config build can distinguish a
/// malformed entry (missing key) from an unknown-but-well-formed one.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationWire {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub public_key: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct HoldoutWire {
    pub id: String,
    pub key: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub audience_ids: Vec<String>,
    #[serde(default)]
    pub audience_conditions: Option<serde_json::Value>,
    #[serde(default)]
    pub variations: Vec<VariationWire>,
    #[serde(default)]
    pub traffic_allocation: Vec<TrafficAllocationWire>,
    #[serde(default)]
    pub included_flags: Vec<String>,
    #[serde(default)]
    pub excluded_flags: Vec<String>,
}
