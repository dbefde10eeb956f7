//! Typed leaf matchers over `(condition, user)`.
use std::cmp::Ordering;

use crate::{version, Error, UserContext, Value};

use super::MatchCondition;

/// Condition types this engine knows how to evaluate.
pub(crate) const CUSTOM_ATTRIBUTE: &str = "custom_attribute";
pub(crate) const THIRD_PARTY_DIMENSION: &str = "third_party_dimension";

/// Match predicates, dispatched by the `match` field of a leaf condition.
/// When the field is absent the predicate defaults to [`MatchType::Exact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    /// User has the attribute and its value is non-null. Never errors.
    Exists,
    /// Same-family equality: string/bool by equality, numerics after float
    /// coercion.
    Exact,
    /// Condition value is a substring of the (string) attribute.
    Substring,
    /// Numeric ordering after float coercion on both sides.
    Lt,
    Le,
    Gt,
    Ge,
    /// Version comparisons per [`crate::version`].
    SemverEq,
    SemverLt,
    SemverLe,
    SemverGt,
    SemverGe,
    /// Membership of the condition value in the user's qualified segments.
    Qualified,
}

impl MatchType {
    /// Resolve a predicate by its wire name. Unknown names return `None` and
    /// make the enclosing condition evaluate to NULL.
    pub fn from_name(name: &str) -> Option<MatchType> {
        match name {
            "exists" => Some(MatchType::Exists),
            "exact" => Some(MatchType::Exact),
            "substring" => Some(MatchType::Substring),
            "lt" => Some(MatchType::Lt),
            "le" => Some(MatchType::Le),
            "gt" => Some(MatchType::Gt),
            "ge" => Some(MatchType::Ge),
            "semver_eq" => Some(MatchType::SemverEq),
            "semver_lt" => Some(MatchType::SemverLt),
            "semver_le" => Some(MatchType::SemverLe),
            "semver_gt" => Some(MatchType::SemverGt),
            "semver_ge" => Some(MatchType::SemverGe),
            "qualified" => Some(MatchType::Qualified),
            _ => None,
        }
    }
}

/// Why a predicate could not be applied. All variants fold to NULL in the
/// condition tree; the distinction only matters for logging.
#[derive(Debug, thiserror::Error)]
pub(crate) enum MatchError {
    #[error("attribute {0:?} is missing")]
    MissingAttribute(String),
    #[error("attribute {0:?} has a type the condition cannot be applied to")]
    InvalidAttributeType(String),
    #[error("condition on {0:?} has an unsupported value")]
    UnsupportedConditionValue(String),
    #[error(transparent)]
    Version(Error),
}

/// Evaluate a leaf condition against the user. Failures are logged and folded
/// into NULL so they never escape a decision.
pub(crate) fn evaluate(condition: &MatchCondition, user: &UserContext) -> Option<bool> {
    if condition.kind != CUSTOM_ATTRIBUTE && condition.kind != THIRD_PARTY_DIMENSION {
        log::debug!(target: "flagship",
                    condition_type = condition.kind.as_str(),
                    name = condition.name.as_str();
                    "skipping condition with unknown type");
        return None;
    }

    let match_type = match &condition.match_type {
        None => MatchType::Exact,
        Some(name) => match MatchType::from_name(name) {
            Some(m) => m,
            None => {
                log::debug!(target: "flagship",
                            match_type = name.as_str(),
                            name = condition.name.as_str();
                            "skipping condition with unknown match type");
                return None;
            }
        },
    };

    match try_evaluate(match_type, condition, user) {
        Ok(result) => Some(result),
        Err(err) => {
            log::debug!(target: "flagship",
                        name = condition.name.as_str();
                        "condition folded to null: {err}");
            None
        }
    }
}

fn try_evaluate(
    match_type: MatchType,
    condition: &MatchCondition,
    user: &UserContext,
) -> Result<bool, MatchError> {
    let name = &condition.name;
    let condition_value = Value::from_json(&condition.value);

    match match_type {
        MatchType::Exists => Ok(matches!(
            user.attributes.get(name),
            Some(v) if *v != Value::Null
        )),

        MatchType::Exact => {
            let target = supported_value(condition_value, name)?;
            let attribute = attribute_value(user, name)?;
            match &target {
                Value::String(t) => match attribute.as_str() {
                    Some(a) => Ok(a == t),
                    None => Err(MatchError::InvalidAttributeType(name.clone())),
                },
                Value::Bool(t) => match attribute.as_bool() {
                    Some(a) => Ok(a == *t),
                    None => Err(MatchError::InvalidAttributeType(name.clone())),
                },
                // Numeric family: int and float unify after coercion.
                _ => {
                    let t = numeric_condition_value(&target, name)?;
                    let a = numeric_attribute_value(attribute, name)?;
                    Ok(a == t)
                }
            }
        }

        MatchType::Substring => {
            let target = supported_value(condition_value, name)?;
            let Value::String(t) = &target else {
                return Err(MatchError::UnsupportedConditionValue(name.clone()));
            };
            let attribute = attribute_value(user, name)?;
            match attribute.as_str() {
                Some(a) => Ok(a.contains(t.as_str())),
                None => Err(MatchError::InvalidAttributeType(name.clone())),
            }
        }

        MatchType::Lt | MatchType::Le | MatchType::Gt | MatchType::Ge => {
            let target = supported_value(condition_value, name)?;
            let t = numeric_condition_value(&target, name)?;
            let a = numeric_attribute_value(attribute_value(user, name)?, name)?;
            Ok(match match_type {
                MatchType::Lt => a < t,
                MatchType::Le => a <= t,
                MatchType::Gt => a > t,
                MatchType::Ge => a >= t,
                _ => unreachable!(),
            })
        }

        MatchType::SemverEq
        | MatchType::SemverLt
        | MatchType::SemverLe
        | MatchType::SemverGt
        | MatchType::SemverGe => {
            let target = supported_value(condition_value, name)?;
            let Value::String(t) = &target else {
                return Err(MatchError::UnsupportedConditionValue(name.clone()));
            };
            let attribute = attribute_value(user, name)?;
            let Some(a) = attribute.as_str() else {
                return Err(MatchError::InvalidAttributeType(name.clone()));
            };
            let ordering = version::compare(a, t).map_err(MatchError::Version)?;
            Ok(match match_type {
                MatchType::SemverEq => ordering == Ordering::Equal,
                MatchType::SemverLt => ordering == Ordering::Less,
                MatchType::SemverLe => ordering != Ordering::Greater,
                MatchType::SemverGt => ordering == Ordering::Greater,
                MatchType::SemverGe => ordering != Ordering::Less,
                _ => unreachable!(),
            })
        }

        MatchType::Qualified => {
            let target = supported_value(condition_value, name)?;
            let Value::String(segment) = &target else {
                return Err(MatchError::UnsupportedConditionValue(name.clone()));
            };
            Ok(user.is_qualified_for(segment))
        }
    }
}

fn supported_value(value: Option<Value>, name: &str) -> Result<Value, MatchError> {
    match value {
        Some(Value::Null) | None => Err(MatchError::UnsupportedConditionValue(name.to_owned())),
        Some(v) => Ok(v),
    }
}

fn attribute_value<'a>(user: &'a UserContext, name: &str) -> Result<&'a Value, MatchError> {
    user.attributes
        .get(name)
        .ok_or_else(|| MatchError::MissingAttribute(name.to_owned()))
}

fn numeric_condition_value(value: &Value, name: &str) -> Result<f64, MatchError> {
    if !value.is_valid_attribute() {
        return Err(MatchError::UnsupportedConditionValue(name.to_owned()));
    }
    value
        .as_float()
        .ok_or_else(|| MatchError::UnsupportedConditionValue(name.to_owned()))
}

fn numeric_attribute_value(value: &Value, name: &str) -> Result<f64, MatchError> {
    if !value.is_valid_attribute() {
        return Err(MatchError::InvalidAttributeType(name.to_owned()));
    }
    value
        .as_float()
        .ok_or_else(|| MatchError::InvalidAttributeType(name.to_owned()))
}
