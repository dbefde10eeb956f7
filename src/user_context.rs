use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::{Attributes, Value};

/// Reserved attribute name. When present as a non-empty string it overrides
/// the user id for bucketing, but never for user identity.
pub const BUCKETING_ID_ATTRIBUTE: &str = "$opt_bucketing_id";

/// Identifies the scope of a forced decision: a flag, optionally narrowed to
/// one of its rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DecisionContext {
    /// Key of the flag the override applies to.
    pub flag_key: String,
    /// Key of the rule (experiment or delivery rule) the override applies
    /// to. `None` targets the flag as a whole.
    pub rule_key: Option<String>,
}

impl DecisionContext {
    /// Create a decision context for the given flag and optional rule.
    pub fn new(flag_key: impl Into<String>, rule_key: Option<String>) -> DecisionContext {
        DecisionContext {
            flag_key: flag_key.into(),
            rule_key,
        }
    }
}

/// A user to decide for: a stable identifier plus a bag of typed attributes
/// and the third-party segments the user is known to qualify for.
///
/// The context is a snapshot. Decisions made against the same context and the
/// same project config are byte-identical.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    /// Stable user identifier.
    pub user_id: String,
    /// Typed user attributes.
    pub attributes: Attributes,
    /// Qualified third-party segment names, usually populated by
    /// `fetch_qualified_segments`.
    pub qualified_segments: HashSet<String>,
    #[serde(skip)]
    forced_decisions: HashMap<DecisionContext, String>,
}

impl UserContext {
    /// Create a user context with the given id and attributes.
    pub fn new(user_id: impl Into<String>, attributes: Attributes) -> UserContext {
        UserContext {
            user_id: user_id.into(),
            attributes,
            qualified_segments: HashSet::new(),
            forced_decisions: HashMap::new(),
        }
    }

    /// Replace the qualified segments of this context.
    pub fn with_qualified_segments<I, S>(mut self, segments: I) -> UserContext
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.qualified_segments = segments.into_iter().map(Into::into).collect();
        self
    }

    /// The id used for bucketing: `$opt_bucketing_id` when present as a
    /// non-empty string, the user id otherwise.
    pub fn bucketing_id(&self) -> &str {
        match self.attributes.get(BUCKETING_ID_ATTRIBUTE) {
            Some(Value::String(s)) if !s.is_empty() => s,
            _ => &self.user_id,
        }
    }

    /// Whether the user qualifies for the given segment.
    pub fn is_qualified_for(&self, segment: &str) -> bool {
        self.qualified_segments.contains(segment)
    }

    /// Force a specific variation for a flag or one of its rules. Replaces
    /// any previous forced decision for the same context.
    pub fn set_forced_decision(&mut self, context: DecisionContext, variation_key: impl Into<String>) {
        self.forced_decisions.insert(context, variation_key.into());
    }

    /// The forced variation key for the given context, if any.
    pub fn forced_decision(&self, context: &DecisionContext) -> Option<&str> {
        self.forced_decisions.get(context).map(String::as_str)
    }

    /// Remove a forced decision. Returns whether one was present.
    pub fn remove_forced_decision(&mut self, context: &DecisionContext) -> bool {
        self.forced_decisions.remove(context).is_some()
    }

    /// Remove all forced decisions.
    pub fn clear_forced_decisions(&mut self) {
        self.forced_decisions.clear();
    }
}
