//! Flag decisions: option flags, results, and the decision pipeline.
mod pipeline;
mod reasons;

use std::collections::HashMap;

use serde::Serialize;

pub use pipeline::DecisionService;
pub use reasons::DecisionReasons;

/// Per-call options accepted by `decide` and friends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecideOption {
    /// Suppress the impression event for this decision.
    DisableTracking,
    /// `decide_all` returns only enabled flags.
    EnabledOnly,
    /// Skip the user-profile service for both lookup and save.
    BypassUps,
    /// Treat the key as an experiment key rather than a flag key.
    ForExperiment,
    /// Populate the full reasons list, not just errors.
    IncludeReasons,
}

/// Which pipeline stage produced the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionSource {
    FeatureTest,
    Rollout,
    Holdout,
    None,
}

impl DecisionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionSource::FeatureTest => "feature-test",
            DecisionSource::Rollout => "rollout",
            DecisionSource::Holdout => "holdout",
            DecisionSource::None => "none",
        }
    }

    /// Whether impressions for this source are always sent, regardless of
    /// the datafile's `sendFlagDecisions` setting.
    pub(crate) fn always_tracked(&self) -> bool {
        matches!(self, DecisionSource::FeatureTest | DecisionSource::Holdout)
    }
}

/// The outcome of deciding one flag for one user.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub flag_key: String,
    pub enabled: bool,
    /// Key of the chosen variation, absent when no stage decided.
    pub variation_key: Option<String>,
    /// Key of the rule (experiment, rollout rule, or holdout) that decided.
    pub rule_key: Option<String>,
    pub source: DecisionSource,
    /// Effective variable values, typed per their declaration.
    pub variables: HashMap<String, serde_json::Value>,
    pub reasons: Vec<String>,
}

impl Decision {
    /// An undecided result carrying only default variable values.
    pub(crate) fn off(
        flag_key: impl Into<String>,
        variables: HashMap<String, serde_json::Value>,
        reasons: Vec<String>,
    ) -> Decision {
        Decision {
            flag_key: flag_key.into(),
            enabled: false,
            variation_key: None,
            rule_key: None,
            source: DecisionSource::None,
            variables,
            reasons,
        }
    }
}
