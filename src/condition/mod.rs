//! Audience condition trees.
//!
//! The datafile encodes conditions as possibly-nested JSON arrays
//! `["op", child1, child2, …]`; children are further arrays, leaf condition
//! objects, or audience-id strings. Evaluation uses tri-state Kleene logic
//! over `{true, false, null}` so that matcher failures (missing attribute,
//! type mismatch, unsupported value) stay distinguishable from plain `false`:
//! NULL under `not` stays NULL, whereas `false` would flip to `true`.
mod matchers;

pub use matchers::MatchType;

use crate::UserContext;

/// Resolves audience ids referenced by condition leaves. Implemented by the
/// project config.
pub trait AudienceResolver {
    /// The parsed condition tree of the audience with the given id, if any.
    fn audience_condition_tree(&self, audience_id: &str) -> Option<&ConditionTree>;
}

/// Logical operators of internal tree nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperator {
    And,
    Or,
    Not,
}

impl LogicalOperator {
    fn from_name(name: &str) -> Option<LogicalOperator> {
        match name {
            "and" => Some(LogicalOperator::And),
            "or" => Some(LogicalOperator::Or),
            "not" => Some(LogicalOperator::Not),
            _ => None,
        }
    }
}

/// A leaf condition object: dispatched by `type` and `match` to the matcher
/// set, with `exact` as the default match.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCondition {
    /// The condition `type` (e.g. `custom_attribute`).
    pub kind: String,
    /// The `match` name; `None` falls back to `exact`.
    pub match_type: Option<String>,
    /// Attribute (or dimension) name the condition applies to.
    pub name: String,
    /// Raw condition value. Composite values are unsupported and make the
    /// condition evaluate to NULL.
    pub value: serde_json::Value,
}

/// A parsed condition tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionTree {
    /// Internal operator node with ordered children.
    Operator(LogicalOperator, Vec<ConditionTree>),
    /// Leaf condition object.
    Match(MatchCondition),
    /// Leaf reference to an audience by id.
    AudienceRef(String),
}

impl ConditionTree {
    /// Parse the JSON encoding of a condition tree. Returns `None` for shapes
    /// this engine does not understand; the caller treats an absent tree as
    /// an always-NULL audience.
    pub fn parse(raw: &serde_json::Value) -> Option<ConditionTree> {
        match raw {
            serde_json::Value::String(audience_id) => {
                Some(ConditionTree::AudienceRef(audience_id.clone()))
            }

            serde_json::Value::Object(fields) => {
                let name = fields
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_owned();
                let kind = fields
                    .get("type")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_owned();
                let match_type = fields
                    .get("match")
                    .and_then(|v| v.as_str())
                    .map(str::to_owned);
                let value = fields.get("value").cloned().unwrap_or(serde_json::Value::Null);
                Some(ConditionTree::Match(MatchCondition {
                    kind,
                    match_type,
                    name,
                    value,
                }))
            }

            serde_json::Value::Array(items) => {
                let (operator, children_items) = match items.first() {
                    Some(serde_json::Value::String(op)) if LogicalOperator::from_name(op).is_some() => {
                        (LogicalOperator::from_name(op).unwrap_or(LogicalOperator::Or), &items[1..])
                    }
                    // An array without a leading operator is an implicit `or`.
                    _ => (LogicalOperator::Or, &items[..]),
                };
                let children: Option<Vec<ConditionTree>> =
                    children_items.iter().map(ConditionTree::parse).collect();
                Some(ConditionTree::Operator(operator, children?))
            }

            _ => None,
        }
    }

    /// Parse a top-level conditions value. A bare leaf object is wrapped in
    /// an implicit `or` node, matching the datafile's canonical encoding.
    pub fn parse_top_level(raw: &serde_json::Value) -> Option<ConditionTree> {
        let tree = ConditionTree::parse(raw)?;
        match tree {
            ConditionTree::Operator(..) => Some(tree),
            leaf => Some(ConditionTree::Operator(LogicalOperator::Or, vec![leaf])),
        }
    }

    /// Evaluate the tree for the user with Kleene tri-state semantics.
    /// `None` is the NULL state.
    pub fn evaluate(&self, resolver: &dyn AudienceResolver, user: &UserContext) -> Option<bool> {
        self.evaluate_inner(resolver, user, &mut Vec::new())
    }

    /// `in_flight` holds the audience ids currently being resolved above this
    /// node, so a cyclic reference is cut off as NULL instead of recursing.
    fn evaluate_inner(
        &self,
        resolver: &dyn AudienceResolver,
        user: &UserContext,
        in_flight: &mut Vec<String>,
    ) -> Option<bool> {
        match self {
            ConditionTree::Operator(LogicalOperator::And, children) => {
                let mut saw_null = false;
                for child in children {
                    match child.evaluate_inner(resolver, user, in_flight) {
                        Some(false) => return Some(false),
                        None => saw_null = true,
                        Some(true) => {}
                    }
                }
                if saw_null {
                    None
                } else {
                    Some(true)
                }
            }

            ConditionTree::Operator(LogicalOperator::Or, children) => {
                let mut saw_null = false;
                for child in children {
                    match child.evaluate_inner(resolver, user, in_flight) {
                        Some(true) => return Some(true),
                        None => saw_null = true,
                        Some(false) => {}
                    }
                }
                if saw_null {
                    None
                } else {
                    Some(false)
                }
            }

            ConditionTree::Operator(LogicalOperator::Not, children) => children
                .first()
                .and_then(|child| child.evaluate_inner(resolver, user, in_flight))
                .map(|result| !result),

            ConditionTree::Match(condition) => matchers::evaluate(condition, user),

            ConditionTree::AudienceRef(audience_id) => {
                if in_flight.iter().any(|seen| seen == audience_id) {
                    log::warn!(target: "flagship",
                               audience_id = audience_id.as_str();
                               "audience references itself through a cycle");
                    return None;
                }
                let Some(tree) = resolver.audience_condition_tree(audience_id) else {
                    log::debug!(target: "flagship",
                                audience_id = audience_id.as_str();
                                "condition references an unknown audience");
                    return None;
                };
                in_flight.push(audience_id.clone());
                let result = tree.evaluate_inner(resolver, user, in_flight);
                in_flight.pop();
                result
            }
        }
    }

    /// The distinct third-party segment names referenced by `qualified`
    /// conditions in this tree, in first-seen order. These are the segments
    /// the host must fetch before the tree can evaluate meaningfully.
    pub fn qualified_segments(&self) -> Vec<String> {
        let mut segments = Vec::new();
        self.collect_qualified_segments(&mut segments);
        segments
    }

    fn collect_qualified_segments(&self, segments: &mut Vec<String>) {
        match self {
            ConditionTree::Operator(_, children) => {
                for child in children {
                    child.collect_qualified_segments(segments);
                }
            }
            ConditionTree::Match(condition) => {
                let qualified = condition.match_type.as_deref() == Some("qualified");
                if qualified {
                    if let Some(segment) = condition.value.as_str() {
                        if !segments.iter().any(|s| s == segment) {
                            segments.push(segment.to_owned());
                        }
                    }
                }
            }
            ConditionTree::AudienceRef(_) => {}
        }
    }
}
