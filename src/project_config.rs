//! Normalized, cross-indexed in-memory model of a datafile revision.
//!
//! A `ProjectConfig` is built once per datafile revision and is immutable
//! afterwards, so it is safe for unlocked concurrent readers. A new revision
//! replaces the whole config atomically through
//! [`crate::config_store::ConfigStore`].
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::condition::{AudienceResolver, ConditionTree, LogicalOperator};
use crate::datafile::{
    self, AudienceWire, Datafile, ExperimentWire, HoldoutWire, VariationWire,
};
use crate::{Error, Result};

/// Process-wide holdout feature toggle, default off. When off, holdout
/// parsing is skipped and holdout lookups always return empty.
static HOLDOUT_SUPPORT: AtomicBool = AtomicBool::new(false);

/// Enable or disable holdout support for configs parsed afterwards.
pub fn set_holdout_support(enabled: bool) {
    HOLDOUT_SUPPORT.store(enabled, Ordering::Relaxed);
}

/// Whether holdout support is currently enabled.
pub fn holdout_support() -> bool {
    HOLDOUT_SUPPORT.load(Ordering::Relaxed)
}

const STATUS_RUNNING: &str = "Running";

#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct Attribute {
    pub id: String,
    pub key: String,
}

#[derive(Debug, Clone)]
#[allow(missing_docs)]
pub struct Event {
    pub id: String,
    pub key: String,
    pub experiment_ids: Vec<String>,
}

/// A named condition tree over user attributes and segments.
#[derive(Debug, Clone)]
pub struct Audience {
    pub id: String,
    pub name: String,
    /// Raw conditions as found in the datafile (string-encoded conditions of
    /// plain audiences are decoded).
    pub conditions: serde_json::Value,
    /// Parsed form of `conditions`. `None` when the encoding was not
    /// understood; such an audience evaluates to NULL.
    pub condition_tree: Option<ConditionTree>,
    /// Distinct third-party segments referenced with match type `qualified`.
    pub segments_used: Vec<String>,
}

#[derive(Debug, Clone)]
#[allow(missing_docs)]
pub struct VariableUsage {
    pub id: String,
    pub value: String,
}

#[derive(Debug, Clone)]
#[allow(missing_docs)]
pub struct Variation {
    pub id: String,
    pub key: String,
    pub feature_enabled: bool,
    /// Variable values keyed by the flag-level variable id.
    pub variables: HashMap<String, VariableUsage>,
}

/// One entry of a traffic allocation. Ranges are cumulative: an entry owns
/// buckets from the previous entry's end (or 0) up to `end_of_range`,
/// exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct TrafficRange {
    pub entity_id: String,
    pub end_of_range: u32,
}

/// Declared type of a flag variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum VariableType {
    String,
    Integer,
    Double,
    Boolean,
    Json,
}

impl VariableType {
    fn from_wire(variable_type: &str, sub_type: &str) -> VariableType {
        match variable_type {
            // A string variable with subType json is promoted to json.
            "string" if sub_type == "json" => VariableType::Json,
            "string" => VariableType::String,
            "integer" => VariableType::Integer,
            "double" => VariableType::Double,
            "boolean" => VariableType::Boolean,
            "json" => VariableType::Json,
            _ => VariableType::String,
        }
    }
}

#[derive(Debug, Clone)]
#[allow(missing_docs)]
pub struct Variable {
    pub id: String,
    pub key: String,
    pub default_value: String,
    pub variable_type: VariableType,
}

#[derive(Debug, Clone)]
#[allow(missing_docs)]
pub struct Cmab {
    pub attribute_ids: Vec<String>,
    pub traffic_allocation: Option<u32>,
}

/// A rule that allocates users across variations.
#[derive(Debug, Clone)]
pub struct Experiment {
    pub id: String,
    pub key: String,
    pub layer_id: String,
    pub status: String,
    /// One of `a/b`, `mab`, `cmab`, `feature_rollouts`, or empty.
    pub experiment_type: String,
    pub variations: HashMap<String, Variation>,
    pub variation_key_to_id: HashMap<String, String>,
    pub traffic_allocation: Vec<TrafficRange>,
    pub audience_ids: Vec<String>,
    pub audience_conditions: Option<serde_json::Value>,
    pub audience_condition_tree: Option<ConditionTree>,
    /// Id of the mutually-exclusive group this experiment belongs to.
    pub group_id: Option<String>,
    /// Per-user variation overrides, keyed by user id.
    pub whitelist: HashMap<String, String>,
    pub is_feature_experiment: bool,
    pub cmab: Option<Cmab>,
}

impl Experiment {
    /// Whether this experiment may decide traffic.
    pub fn is_running(&self) -> bool {
        self.status == STATUS_RUNNING
    }

    /// Variation lookup by key.
    pub fn variation_by_key(&self, key: &str) -> Option<&Variation> {
        self.variation_key_to_id
            .get(key)
            .and_then(|id| self.variations.get(id))
    }

    /// Variation lookup by id.
    pub fn variation_by_id(&self, id: &str) -> Option<&Variation> {
        self.variations.get(id)
    }
}

#[derive(Debug, Clone)]
#[allow(missing_docs)]
pub struct Group {
    pub id: String,
    /// `random` groups are mutually exclusive; `overlapping` groups are not.
    pub policy: String,
    pub traffic_allocation: Vec<TrafficRange>,
    pub experiment_ids: Vec<String>,
}

/// An ordered list of delivery rules, ending with an unguarded
/// "everyone else" rule.
#[derive(Debug, Clone)]
#[allow(missing_docs)]
pub struct Rollout {
    pub id: String,
    pub experiments: Vec<Experiment>,
}

#[derive(Debug, Clone)]
#[allow(missing_docs)]
pub struct FeatureFlag {
    pub id: String,
    pub key: String,
    /// Empty when the flag has no rollout.
    pub rollout_id: String,
    /// Ordered feature-experiment ids, resolved through the experiment map.
    pub experiment_ids: Vec<String>,
    pub variables: HashMap<String, Variable>,
}

/// A higher-priority allocation that withholds traffic from experiments.
#[derive(Debug, Clone)]
pub struct Holdout {
    pub id: String,
    pub key: String,
    pub status: String,
    pub audience_ids: Vec<String>,
    pub audience_conditions: Option<serde_json::Value>,
    pub audience_condition_tree: Option<ConditionTree>,
    pub variations: HashMap<String, Variation>,
    pub traffic_allocation: Vec<TrafficRange>,
    pub included_flags: HashSet<String>,
    pub excluded_flags: HashSet<String>,
}

impl Holdout {
    /// Global holdouts apply to every flag not explicitly excluded.
    pub fn is_global(&self) -> bool {
        self.included_flags.is_empty()
    }
}

/// ODP connection details extracted from the datafile's integrations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct OdpSettings {
    pub api_key: String,
    pub api_host: String,
}

/// The immutable, indexed project configuration.
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    pub account_id: String,
    pub project_id: String,
    pub revision: String,
    pub region: String,
    pub sdk_key: String,
    pub environment_key: String,
    pub anonymize_ip: bool,
    pub bot_filtering: Option<bool>,
    /// Governs whether rollout and forced-decision impressions are emitted.
    pub send_flag_decisions: bool,

    attributes_by_id: HashMap<String, Attribute>,
    attributes_by_key: HashMap<String, Attribute>,
    audiences: HashMap<String, Audience>,
    events_by_key: HashMap<String, Event>,
    experiments_by_id: HashMap<String, Experiment>,
    experiment_key_to_id: HashMap<String, String>,
    groups: HashMap<String, Group>,
    rollouts: HashMap<String, Rollout>,
    flags_by_key: HashMap<String, FeatureFlag>,
    /// Flag keys in datafile order; keeps `decide_all` deterministic.
    flag_keys: Vec<String>,
    /// Per flag key, the deduplicated union of variations across its feature
    /// experiments and rollout rules.
    flag_variations: HashMap<String, Vec<Variation>>,
    odp_settings: Option<OdpSettings>,
    segments_to_check: Vec<String>,
    holdouts_by_id: HashMap<String, Holdout>,
    /// Per flag id: applicable holdout ids, global holdouts first.
    holdouts_by_flag: HashMap<String, Vec<String>>,
}

impl ProjectConfig {
    /// Parse and index raw datafile bytes. Fails on malformed JSON, an
    /// unsupported schema version, or a malformed integration entry.
    pub fn try_parse(json: &[u8]) -> Result<ProjectConfig> {
        let datafile: Datafile = serde_json::from_slice(json)?;

        if datafile.version != datafile::SUPPORTED_VERSION {
            return Err(Error::UnsupportedDatafileVersion(datafile.version));
        }

        let mut attributes_by_id = HashMap::new();
        let mut attributes_by_key = HashMap::new();
        for wire in &datafile.attributes {
            let attribute = Attribute {
                id: wire.id.clone(),
                key: wire.key.clone(),
            };
            attributes_by_id
                .entry(attribute.id.clone())
                .or_insert_with(|| attribute.clone());
            attributes_by_key
                .entry(attribute.key.clone())
                .or_insert(attribute);
        }

        // Typed audiences override plain audiences on id collision;
        // first-win within each list.
        let mut audiences: HashMap<String, Audience> = HashMap::new();
        for wire in &datafile.audiences {
            if !audiences.contains_key(&wire.id) {
                audiences.insert(wire.id.clone(), build_audience(wire));
            }
        }
        let mut typed_seen = HashSet::new();
        for wire in &datafile.typed_audiences {
            if typed_seen.insert(wire.id.clone()) {
                audiences.insert(wire.id.clone(), build_audience(wire));
            }
        }

        // Union of segments referenced by any audience, in a stable order.
        let mut segments_to_check: Vec<String> = Vec::new();
        for wire in datafile.typed_audiences.iter().chain(&datafile.audiences) {
            if let Some(audience) = audiences.get(&wire.id) {
                for segment in &audience.segments_used {
                    if !segments_to_check.contains(segment) {
                        segments_to_check.push(segment.clone());
                    }
                }
            }
        }

        let mut events_by_key = HashMap::new();
        for wire in &datafile.events {
            events_by_key.insert(
                wire.key.clone(),
                Event {
                    id: wire.id.clone(),
                    key: wire.key.clone(),
                    experiment_ids: wire.experiment_ids.clone(),
                },
            );
        }

        // Experiment map merged with in-group experiments; group membership
        // is recorded on the experiment itself.
        let mut experiments_by_id = HashMap::new();
        let mut experiment_key_to_id = HashMap::new();
        for wire in &datafile.experiments {
            let experiment = build_experiment(wire, None);
            experiment_key_to_id.insert(experiment.key.clone(), experiment.id.clone());
            experiments_by_id.insert(experiment.id.clone(), experiment);
        }
        let mut groups = HashMap::new();
        for wire in &datafile.groups {
            let mut experiment_ids = Vec::with_capacity(wire.experiments.len());
            for experiment_wire in &wire.experiments {
                let experiment = build_experiment(experiment_wire, Some(wire.id.clone()));
                experiment_key_to_id.insert(experiment.key.clone(), experiment.id.clone());
                experiment_ids.push(experiment.id.clone());
                experiments_by_id.insert(experiment.id.clone(), experiment);
            }
            groups.insert(
                wire.id.clone(),
                Group {
                    id: wire.id.clone(),
                    policy: wire.policy.clone(),
                    traffic_allocation: build_traffic(&wire.traffic_allocation),
                    experiment_ids,
                },
            );
        }

        let mut rollouts = HashMap::new();
        for wire in &datafile.rollouts {
            rollouts.insert(
                wire.id.clone(),
                Rollout {
                    id: wire.id.clone(),
                    experiments: wire
                        .experiments
                        .iter()
                        .map(|e| build_experiment(e, None))
                        .collect(),
                },
            );
        }

        let mut flags_by_key = HashMap::new();
        let mut flag_keys = Vec::with_capacity(datafile.feature_flags.len());
        for wire in &datafile.feature_flags {
            let mut experiment_ids = Vec::with_capacity(wire.experiment_ids.len());
            for experiment_id in &wire.experiment_ids {
                match experiments_by_id.get_mut(experiment_id) {
                    Some(experiment) => {
                        experiment.is_feature_experiment = true;
                        experiment_ids.push(experiment_id.clone());
                    }
                    None => {
                        log::warn!(target: "flagship",
                                   flag_key = wire.key.as_str(),
                                   experiment_id = experiment_id.as_str();
                                   "flag references an unknown experiment; skipping it");
                    }
                }
            }
            if !wire.rollout_id.is_empty() && !rollouts.contains_key(&wire.rollout_id) {
                log::warn!(target: "flagship",
                           flag_key = wire.key.as_str(),
                           rollout_id = wire.rollout_id.as_str();
                           "flag references an unknown rollout");
            }
            let variables = wire
                .variables
                .iter()
                .map(|v| {
                    (
                        v.key.clone(),
                        Variable {
                            id: v.id.clone(),
                            key: v.key.clone(),
                            default_value: v.default_value.clone(),
                            variable_type: VariableType::from_wire(&v.variable_type, &v.sub_type),
                        },
                    )
                })
                .collect();
            flag_keys.push(wire.key.clone());
            flags_by_key.insert(
                wire.key.clone(),
                FeatureFlag {
                    id: wire.id.clone(),
                    key: wire.key.clone(),
                    rollout_id: wire.rollout_id.clone(),
                    experiment_ids,
                    variables,
                },
            );
        }

        // Per flag, the deduplicated union of variations across feature
        // experiments and rollout rules.
        let mut flag_variations: HashMap<String, Vec<Variation>> = HashMap::new();
        for flag in flags_by_key.values() {
            let mut seen = HashSet::new();
            let mut variations = Vec::new();
            let experiments = flag
                .experiment_ids
                .iter()
                .filter_map(|id| experiments_by_id.get(id));
            let rollout_experiments = rollouts
                .get(&flag.rollout_id)
                .map(|r| r.experiments.as_slice())
                .unwrap_or_default();
            for experiment in experiments.chain(rollout_experiments) {
                for variation in experiment.variations.values() {
                    if seen.insert(variation.id.clone()) {
                        variations.push(variation.clone());
                    }
                }
            }
            flag_variations.insert(flag.key.clone(), variations);
        }

        let mut odp_settings = None;
        for integration in &datafile.integrations {
            let Some(key) = &integration.key else {
                return Err(Error::InvalidIntegration);
            };
            if key == "odp" {
                odp_settings = Some(OdpSettings {
                    api_key: integration.public_key.clone().unwrap_or_default(),
                    api_host: integration.host.clone().unwrap_or_default(),
                });
            }
        }

        let mut holdouts_by_id = HashMap::new();
        let mut holdouts_by_flag: HashMap<String, Vec<String>> = HashMap::new();
        if holdout_support() {
            let running: Vec<Holdout> = datafile
                .holdouts
                .iter()
                .filter(|h| h.status == STATUS_RUNNING)
                .map(build_holdout)
                .collect();
            for flag in flags_by_key.values() {
                let mut applicable: Vec<String> = running
                    .iter()
                    .filter(|h| h.is_global() && !h.excluded_flags.contains(&flag.id))
                    .map(|h| h.id.clone())
                    .collect();
                applicable.extend(
                    running
                        .iter()
                        .filter(|h| !h.is_global() && h.included_flags.contains(&flag.id))
                        .map(|h| h.id.clone()),
                );
                holdouts_by_flag.insert(flag.id.clone(), applicable);
            }
            for holdout in running {
                holdouts_by_id.insert(holdout.id.clone(), holdout);
            }
        }

        Ok(ProjectConfig {
            account_id: datafile.account_id,
            project_id: datafile.project_id,
            revision: datafile.revision,
            region: datafile.region,
            sdk_key: datafile.sdk_key,
            environment_key: datafile.environment_key,
            anonymize_ip: datafile.anonymize_ip,
            bot_filtering: datafile.bot_filtering,
            send_flag_decisions: datafile.send_flag_decisions,
            attributes_by_id,
            attributes_by_key,
            audiences,
            events_by_key,
            experiments_by_id,
            experiment_key_to_id,
            groups,
            rollouts,
            flags_by_key,
            flag_keys,
            flag_variations,
            odp_settings,
            segments_to_check,
            holdouts_by_id,
            holdouts_by_flag,
        })
    }

    /// Flag lookup by key.
    pub fn flag(&self, key: &str) -> Result<&FeatureFlag> {
        self.flags_by_key.get(key).ok_or_else(|| Error::NotFound {
            kind: "flag",
            key: key.to_owned(),
        })
    }

    /// Flag keys in datafile order.
    pub fn flag_keys(&self) -> &[String] {
        &self.flag_keys
    }

    /// Flags in datafile order.
    pub fn flags(&self) -> impl Iterator<Item = &FeatureFlag> {
        self.flag_keys.iter().filter_map(|k| self.flags_by_key.get(k))
    }

    /// Experiment lookup by key.
    pub fn experiment_by_key(&self, key: &str) -> Result<&Experiment> {
        self.experiment_key_to_id
            .get(key)
            .and_then(|id| self.experiments_by_id.get(id))
            .ok_or_else(|| Error::NotFound {
                kind: "experiment",
                key: key.to_owned(),
            })
    }

    /// Experiment lookup by id.
    pub fn experiment_by_id(&self, id: &str) -> Result<&Experiment> {
        self.experiments_by_id.get(id).ok_or_else(|| Error::NotFound {
            kind: "experiment",
            key: id.to_owned(),
        })
    }

    /// Audience lookup by id.
    pub fn audience(&self, id: &str) -> Result<&Audience> {
        self.audiences.get(id).ok_or_else(|| Error::NotFound {
            kind: "audience",
            key: id.to_owned(),
        })
    }

    /// Attribute lookup by key.
    pub fn attribute_by_key(&self, key: &str) -> Result<&Attribute> {
        self.attributes_by_key.get(key).ok_or_else(|| Error::NotFound {
            kind: "attribute",
            key: key.to_owned(),
        })
    }

    /// Attribute lookup by id.
    pub fn attribute_by_id(&self, id: &str) -> Result<&Attribute> {
        self.attributes_by_id.get(id).ok_or_else(|| Error::NotFound {
            kind: "attribute",
            key: id.to_owned(),
        })
    }

    /// Event lookup by key.
    pub fn event(&self, key: &str) -> Result<&Event> {
        self.events_by_key.get(key).ok_or_else(|| Error::NotFound {
            kind: "event",
            key: key.to_owned(),
        })
    }

    /// Group lookup by id.
    pub fn group(&self, id: &str) -> Result<&Group> {
        self.groups.get(id).ok_or_else(|| Error::NotFound {
            kind: "group",
            key: id.to_owned(),
        })
    }

    /// Rollout lookup by id.
    pub fn rollout(&self, id: &str) -> Result<&Rollout> {
        self.rollouts.get(id).ok_or_else(|| Error::NotFound {
            kind: "rollout",
            key: id.to_owned(),
        })
    }

    /// The flag's feature experiments, in declared order.
    pub fn feature_experiments(&self, flag: &FeatureFlag) -> Vec<&Experiment> {
        flag.experiment_ids
            .iter()
            .filter_map(|id| self.experiments_by_id.get(id))
            .collect()
    }

    /// Any variation of the flag (across feature experiments and rollout
    /// rules) with the given key. Used to validate forced decisions.
    pub fn flag_variation(&self, flag_key: &str, variation_key: &str) -> Option<&Variation> {
        self.flag_variations
            .get(flag_key)?
            .iter()
            .find(|v| v.key == variation_key)
    }

    /// All variations reachable from the flag, deduplicated by id.
    pub fn flag_variations(&self, flag_key: &str) -> &[Variation] {
        self.flag_variations
            .get(flag_key)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// The precomputed ordered holdout list for the flag: global holdouts
    /// first, then specific ones. Empty when holdout support is off.
    pub fn holdouts_for_flag(&self, flag_id: &str) -> Vec<&Holdout> {
        self.holdouts_by_flag
            .get(flag_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.holdouts_by_id.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Holdout lookup by id.
    pub fn holdout(&self, id: &str) -> Result<&Holdout> {
        self.holdouts_by_id.get(id).ok_or_else(|| Error::NotFound {
            kind: "holdout",
            key: id.to_owned(),
        })
    }

    /// Segments referenced by any audience; the set the host must fetch.
    pub fn segments_to_check(&self) -> &[String] {
        &self.segments_to_check
    }

    /// ODP connection details, when the datafile carries an `odp`
    /// integration.
    pub fn odp_settings(&self) -> Option<&OdpSettings> {
        self.odp_settings.as_ref()
    }
}

impl AudienceResolver for ProjectConfig {
    fn audience_condition_tree(&self, audience_id: &str) -> Option<&ConditionTree> {
        self.audiences
            .get(audience_id)
            .and_then(|a| a.condition_tree.as_ref())
    }
}

fn build_audience(wire: &AudienceWire) -> Audience {
    // Plain audiences carry conditions as a JSON-encoded string.
    let conditions = match &wire.conditions {
        serde_json::Value::String(encoded) => {
            serde_json::from_str(encoded).unwrap_or(serde_json::Value::Null)
        }
        other => other.clone(),
    };
    let condition_tree = ConditionTree::parse_top_level(&conditions);
    if condition_tree.is_none() {
        log::warn!(target: "flagship",
                   audience_id = wire.id.as_str();
                   "audience conditions could not be parsed");
    }
    let segments_used = condition_tree
        .as_ref()
        .map(ConditionTree::qualified_segments)
        .unwrap_or_default();
    Audience {
        id: wire.id.clone(),
        name: wire.name.clone(),
        conditions,
        condition_tree,
        segments_used,
    }
}

fn build_variations(
    wires: &[VariationWire],
) -> (HashMap<String, Variation>, HashMap<String, String>) {
    let mut variations = HashMap::with_capacity(wires.len());
    let mut key_to_id = HashMap::with_capacity(wires.len());
    for wire in wires {
        key_to_id.insert(wire.key.clone(), wire.id.clone());
        variations.insert(
            wire.id.clone(),
            Variation {
                id: wire.id.clone(),
                key: wire.key.clone(),
                feature_enabled: wire.feature_enabled.unwrap_or(false),
                variables: wire
                    .variables
                    .iter()
                    .map(|v| {
                        (
                            v.id.clone(),
                            VariableUsage {
                                id: v.id.clone(),
                                value: v.value.clone(),
                            },
                        )
                    })
                    .collect(),
            },
        );
    }
    (variations, key_to_id)
}

fn build_traffic(wires: &[datafile::TrafficAllocationWire]) -> Vec<TrafficRange> {
    wires
        .iter()
        .map(|w| TrafficRange {
            entity_id: w.entity_id.clone(),
            end_of_range: w.end_of_range,
        })
        .collect()
}

/// Build the audience condition tree of a rule: explicit `audienceConditions`
/// win; otherwise non-empty `audienceIds` form an implicit `or`; otherwise
/// the rule targets everyone.
fn build_audience_tree(
    audience_conditions: Option<&serde_json::Value>,
    audience_ids: &[String],
) -> Option<ConditionTree> {
    if let Some(conditions) = audience_conditions {
        return ConditionTree::parse_top_level(conditions);
    }
    if audience_ids.is_empty() {
        return None;
    }
    Some(ConditionTree::Operator(
        LogicalOperator::Or,
        audience_ids
            .iter()
            .map(|id| ConditionTree::AudienceRef(id.clone()))
            .collect(),
    ))
}

fn build_experiment(wire: &ExperimentWire, group_id: Option<String>) -> Experiment {
    let (variations, variation_key_to_id) = build_variations(&wire.variations);
    Experiment {
        id: wire.id.clone(),
        key: wire.key.clone(),
        layer_id: wire.layer_id.clone(),
        status: wire.status.clone(),
        experiment_type: wire.experiment_type.clone(),
        variations,
        variation_key_to_id,
        traffic_allocation: build_traffic(&wire.traffic_allocation),
        audience_ids: wire.audience_ids.clone(),
        audience_conditions: wire.audience_conditions.clone(),
        audience_condition_tree: build_audience_tree(
            wire.audience_conditions.as_ref(),
            &wire.audience_ids,
        ),
        group_id,
        whitelist: wire.forced_variations.clone(),
        is_feature_experiment: false,
        cmab: wire.cmab.as_ref().map(|c| Cmab {
            attribute_ids: c.attribute_ids.clone(),
            traffic_allocation: c.traffic_allocation,
        }),
    }
}

fn build_holdout(wire: &HoldoutWire) -> Holdout {
    let (variations, _) = build_variations(&wire.variations);
    Holdout {
        id: wire.id.clone(),
        key: wire.key.clone(),
        status: wire.status.clone(),
        audience_ids: wire.audience_ids.clone(),
        audience_conditions: wire.audience_conditions.clone(),
        audience_condition_tree: build_audience_tree(
            wire.audience_conditions.as_ref(),
            &wire.audience_ids,
        ),
        variations,
        traffic_allocation: build_traffic(&wire.traffic_allocation),
        included_flags: wire.included_flags.iter().cloned().collect(),
        excluded_flags: wire.excluded_flags.iter().cloned().collect(),
    }
}
