//! Comparator for dotted, optionally-labelled version strings.
//!
//! Comparison is precision-limited by the target: the user's `2.1.3` compares
//! equal to the target `2.1`. This is deliberately not strict semver, so the
//! comparison is implemented here rather than with the `semver` crate.
use std::cmp::Ordering;

use crate::{Error, Result};

/// Compare `version` (the user's attribute) against `target` (the condition
/// value), considering only as many parts as `target` carries.
///
/// An empty target matches anything. A pre-release suffix orders a version
/// *before* the same prefix without one (`2.1.3-beta < 2.1.3`), while a build
/// suffix orders it after.
pub fn compare(version: &str, target: &str) -> Result<Ordering> {
    if target.is_empty() {
        return Ok(Ordering::Equal);
    }

    let target = SplitVersion::parse(target)?;
    let version = SplitVersion::parse(version)?;

    for (idx, target_part) in target.parts.iter().enumerate() {
        let Some(version_part) = version.parts.get(idx) else {
            // The version is less precise than the target. The target's extra
            // parts make it compare greater, unless they are a pre-release
            // suffix, which orders the target before its own prefix.
            return Ok(if target.pre_release {
                Ordering::Greater
            } else {
                Ordering::Less
            });
        };

        let ordering = match (parse_numeric(version_part), parse_numeric(target_part)) {
            (Some(v), Some(t)) => v.cmp(&t),
            _ => version_part.cmp(target_part),
        };
        if ordering != Ordering::Equal {
            return Ok(ordering);
        }
    }

    if version.parts.len() > target.parts.len() && version.has_suffix && !target.has_suffix {
        // The target consumed only the numeric prefix; the remaining parts
        // are the version's suffix, which orders it relative to that prefix.
        return Ok(if version.pre_release {
            Ordering::Less
        } else {
            Ordering::Greater
        });
    }

    Ok(match (version.pre_release, target.pre_release) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => Ordering::Equal,
    })
}

struct SplitVersion<'a> {
    parts: Vec<&'a str>,
    has_suffix: bool,
    pre_release: bool,
}

impl<'a> SplitVersion<'a> {
    fn parse(raw: &'a str) -> Result<SplitVersion<'a>> {
        let invalid = || Error::InvalidVersionFormat(raw.to_owned());

        if raw.is_empty() || raw.contains(char::is_whitespace) {
            return Err(invalid());
        }

        // A `+` starts a build suffix; otherwise the first `-` starts a
        // pre-release suffix.
        let (prefix, suffix, pre_release) = match raw.split_once('+') {
            Some((prefix, suffix)) => (prefix, Some(suffix), false),
            None => match raw.split_once('-') {
                Some((prefix, suffix)) => (prefix, Some(suffix), true),
                None => (raw, None, false),
            },
        };

        let mut parts: Vec<&str> = prefix.split('.').collect();
        if parts.len() > 3 || parts.iter().any(|p| p.is_empty()) {
            return Err(invalid());
        }
        if let Some(suffix) = suffix {
            if suffix.is_empty() {
                return Err(invalid());
            }
            parts.extend(suffix.split('.'));
            if parts.iter().any(|p| p.is_empty()) {
                return Err(invalid());
            }
        }

        Ok(SplitVersion {
            parts,
            has_suffix: suffix.is_some(),
            pre_release,
        })
    }
}

fn parse_numeric(part: &str) -> Option<u64> {
    if part.bytes().all(|b| b.is_ascii_digit()) {
        part.parse().ok()
    } else {
        None
    }
}
