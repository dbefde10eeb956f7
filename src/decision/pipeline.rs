//! The ordered decision pipeline for a flag.
//!
//! Stage order is strict: forced decision, sticky assignment, holdouts,
//! feature experiments, rollout rules. Every stage is pure with respect to
//! the config snapshot and the user context, so identical calls produce
//! identical decisions.
use std::collections::HashMap;

use crate::bucketer;
use crate::condition::ConditionTree;
use crate::decision::{DecideOption, Decision, DecisionReasons, DecisionSource};
use crate::events::ImpressionEvent;
use crate::project_config::{Experiment, FeatureFlag, ProjectConfig, VariableType, Variation};
use crate::user_context::{DecisionContext, UserContext};
use crate::user_profile::{UserProfile, UserProfileService};

/// Decides flags and experiments against one config snapshot.
pub struct DecisionService<'a> {
    config: &'a ProjectConfig,
    profile_service: Option<&'a dyn UserProfileService>,
}

struct Chosen<'a> {
    variation: &'a Variation,
    rule_key: Option<String>,
    source: DecisionSource,
}

impl<'a> DecisionService<'a> {
    pub fn new(
        config: &'a ProjectConfig,
        profile_service: Option<&'a dyn UserProfileService>,
    ) -> DecisionService<'a> {
        DecisionService {
            config,
            profile_service,
        }
    }

    /// Decide the flag for the user. Never fails: an unknown flag yields an
    /// undecided result with a reason.
    pub fn decide(
        &self,
        user: &UserContext,
        flag_key: &str,
        options: &[DecideOption],
    ) -> (Decision, Option<ImpressionEvent>) {
        let mut reasons = DecisionReasons::new(options.contains(&DecideOption::IncludeReasons));

        let flag = match self.config.flag(flag_key) {
            Ok(flag) => flag,
            Err(_) => {
                reasons.error(format!("flag {flag_key:?} not found"));
                return (
                    Decision::off(flag_key, HashMap::new(), reasons.into_vec()),
                    None,
                );
            }
        };

        let chosen = self.choose(user, flag, options, &mut reasons);
        self.finalize(user, flag, chosen, reasons, options)
    }

    /// Decide a single experiment by key, ignoring flag-level stages. Used
    /// for the `ForExperiment` option.
    pub fn decide_experiment(
        &self,
        user: &UserContext,
        experiment_key: &str,
        options: &[DecideOption],
    ) -> Decision {
        let mut reasons = DecisionReasons::new(options.contains(&DecideOption::IncludeReasons));

        let experiment = match self.config.experiment_by_key(experiment_key) {
            Ok(experiment) => experiment,
            Err(_) => {
                reasons.error(format!("experiment {experiment_key:?} not found"));
                return Decision::off(experiment_key, HashMap::new(), reasons.into_vec());
            }
        };

        match self.bucket_experiment(user, None, experiment, options, &mut reasons) {
            Some(variation) => Decision {
                flag_key: experiment_key.to_owned(),
                enabled: variation.feature_enabled,
                variation_key: Some(variation.key.clone()),
                rule_key: Some(experiment.key.clone()),
                source: DecisionSource::FeatureTest,
                variables: HashMap::new(),
                reasons: reasons.into_vec(),
            },
            None => Decision::off(experiment_key, HashMap::new(), reasons.into_vec()),
        }
    }

    fn choose<'c>(
        &'c self,
        user: &UserContext,
        flag: &'c FeatureFlag,
        options: &[DecideOption],
        reasons: &mut DecisionReasons,
    ) -> Option<Chosen<'c>> {
        // Flag-scoped forced decision wins over every other stage.
        let flag_scope = DecisionContext::new(flag.key.clone(), None);
        if let Some(forced_key) = user.forced_decision(&flag_scope) {
            match self.config.flag_variation(&flag.key, forced_key) {
                Some(variation) => {
                    reasons.info(format!(
                        "forced decision {forced_key:?} applied for flag {:?}",
                        flag.key
                    ));
                    return Some(Chosen {
                        variation,
                        rule_key: None,
                        source: DecisionSource::FeatureTest,
                    });
                }
                None => reasons.error(format!(
                    "forced decision {forced_key:?} for flag {:?} names no variation",
                    flag.key
                )),
            }
        }

        if let Some(chosen) = self.sticky_assignment(user, flag, options, reasons) {
            return Some(chosen);
        }

        if let Some(chosen) = self.decide_holdouts(user, flag, reasons) {
            return Some(chosen);
        }

        for experiment in self.config.feature_experiments(flag) {
            if let Some(chosen) =
                self.decide_feature_experiment(user, flag, experiment, options, reasons)
            {
                return Some(chosen);
            }
        }

        self.decide_rollout(user, flag, reasons)
    }

    /// A previously saved assignment, if it still names a running experiment
    /// of the flag and one of its variations.
    fn sticky_assignment<'c>(
        &'c self,
        user: &UserContext,
        flag: &FeatureFlag,
        options: &[DecideOption],
        reasons: &mut DecisionReasons,
    ) -> Option<Chosen<'c>> {
        if options.contains(&DecideOption::BypassUps) {
            return None;
        }
        let profile = self.profile_service?.lookup(&user.user_id)?;
        for experiment in self.config.feature_experiments(flag) {
            let Some(variation_id) = profile.variation_for(&experiment.id) else {
                continue;
            };
            if !experiment.is_running() {
                continue;
            }
            if let Some(variation) = experiment.variation_by_id(variation_id) {
                reasons.info(format!(
                    "returning sticky variation {:?} of experiment {:?}",
                    variation.key, experiment.key
                ));
                return Some(Chosen {
                    variation,
                    rule_key: Some(experiment.key.clone()),
                    source: DecisionSource::FeatureTest,
                });
            }
        }
        None
    }

    fn decide_holdouts<'c>(
        &'c self,
        user: &UserContext,
        flag: &FeatureFlag,
        reasons: &mut DecisionReasons,
    ) -> Option<Chosen<'c>> {
        for holdout in self.config.holdouts_for_flag(&flag.id) {
            if !self.audience_allows(
                holdout.audience_condition_tree.as_ref(),
                user,
                &holdout.key,
                reasons,
            ) {
                continue;
            }
            let bucketing_id = user.bucketing_id();
            if let Some(variation_id) =
                bucketer::find_bucket(bucketing_id, &holdout.id, &holdout.traffic_allocation)
            {
                if let Some(variation) = holdout.variations.get(variation_id) {
                    reasons.info(format!(
                        "user held back by holdout {:?}",
                        holdout.key
                    ));
                    return Some(Chosen {
                        variation,
                        rule_key: Some(holdout.key.clone()),
                        source: DecisionSource::Holdout,
                    });
                }
            }
        }
        None
    }

    fn decide_feature_experiment<'c>(
        &'c self,
        user: &UserContext,
        flag: &FeatureFlag,
        experiment: &'c Experiment,
        options: &[DecideOption],
        reasons: &mut DecisionReasons,
    ) -> Option<Chosen<'c>> {
        let variation = self.bucket_experiment(user, Some(flag), experiment, options, reasons)?;
        Some(Chosen {
            variation,
            rule_key: Some(experiment.key.clone()),
            source: DecisionSource::FeatureTest,
        })
    }

    /// Whitelist, rule-scoped forced decision, audience, group mutex, and
    /// variation bucketing for one experiment, in that order.
    fn bucket_experiment<'c>(
        &'c self,
        user: &UserContext,
        flag: Option<&FeatureFlag>,
        experiment: &'c Experiment,
        options: &[DecideOption],
        reasons: &mut DecisionReasons,
    ) -> Option<&'c Variation> {
        if !experiment.is_running() {
            reasons.info(format!("experiment {:?} is not running", experiment.key));
            return None;
        }

        if let Some(forced_key) = experiment.whitelist.get(&user.user_id) {
            match experiment.variation_by_key(forced_key) {
                Some(variation) => {
                    reasons.info(format!(
                        "user {:?} is whitelisted into variation {forced_key:?}",
                        user.user_id
                    ));
                    return Some(variation);
                }
                None => reasons.error(format!(
                    "whitelist of experiment {:?} names unknown variation {forced_key:?}",
                    experiment.key
                )),
            }
        }

        if let Some(flag) = flag {
            let rule_scope = DecisionContext::new(flag.key.clone(), Some(experiment.key.clone()));
            if let Some(forced_key) = user.forced_decision(&rule_scope) {
                match experiment.variation_by_key(forced_key) {
                    Some(variation) => {
                        reasons.info(format!(
                            "forced decision {forced_key:?} applied for rule {:?}",
                            experiment.key
                        ));
                        return Some(variation);
                    }
                    None => reasons.error(format!(
                        "forced decision {forced_key:?} for rule {:?} names no variation",
                        experiment.key
                    )),
                }
            }
        }

        if !self.audience_allows(
            experiment.audience_condition_tree.as_ref(),
            user,
            &experiment.key,
            reasons,
        ) {
            return None;
        }

        let bucketing_id = user.bucketing_id();

        // Mutual exclusion: the group must pick this experiment first.
        if let Some(group_id) = &experiment.group_id {
            if let Ok(group) = self.config.group(group_id) {
                if group.policy == "random" {
                    let selected =
                        bucketer::find_bucket(bucketing_id, &group.id, &group.traffic_allocation);
                    if selected != Some(experiment.id.as_str()) {
                        reasons.info(format!(
                            "user not bucketed into experiment {:?} of group {group_id:?}",
                            experiment.key
                        ));
                        return None;
                    }
                }
            }
        }

        let variation_id =
            bucketer::find_bucket(bucketing_id, &experiment.id, &experiment.traffic_allocation);
        let Some(variation) = variation_id.and_then(|id| experiment.variation_by_id(id)) else {
            reasons.info(format!(
                "user not bucketed into any variation of experiment {:?}",
                experiment.key
            ));
            return None;
        };
        reasons.info(format!(
            "user bucketed into variation {:?} of experiment {:?}",
            variation.key, experiment.key
        ));

        if !options.contains(&DecideOption::BypassUps) {
            if let Some(service) = self.profile_service {
                let mut profile = service
                    .lookup(&user.user_id)
                    .unwrap_or_else(|| UserProfile::new(user.user_id.clone()));
                profile
                    .experiment_bucket_map
                    .insert(experiment.id.clone(), variation.id.clone());
                service.save(profile);
            }
        }

        Some(variation)
    }

    /// Walk delivery rules in order. A failed audience jumps straight to the
    /// final "everyone else" rule; an unallocated bucket tries the next rule.
    fn decide_rollout<'c>(
        &'c self,
        user: &UserContext,
        flag: &FeatureFlag,
        reasons: &mut DecisionReasons,
    ) -> Option<Chosen<'c>> {
        if flag.rollout_id.is_empty() {
            return None;
        }
        let rollout = self.config.rollout(&flag.rollout_id).ok()?;
        let rules = &rollout.experiments;
        if rules.is_empty() {
            return None;
        }

        let bucketing_id = user.bucketing_id();
        let mut index = 0;
        while index < rules.len() {
            let rule = &rules[index];
            let everyone_else = index == rules.len() - 1;

            let rule_scope = DecisionContext::new(flag.key.clone(), Some(rule.key.clone()));
            if let Some(forced_key) = user.forced_decision(&rule_scope) {
                match rule.variation_by_key(forced_key) {
                    Some(variation) => {
                        reasons.info(format!(
                            "forced decision {forced_key:?} applied for rule {:?}",
                            rule.key
                        ));
                        return Some(Chosen {
                            variation,
                            rule_key: Some(rule.key.clone()),
                            source: DecisionSource::Rollout,
                        });
                    }
                    None => reasons.error(format!(
                        "forced decision {forced_key:?} for rule {:?} names no variation",
                        rule.key
                    )),
                }
            }

            if !self.audience_allows(
                rule.audience_condition_tree.as_ref(),
                user,
                &rule.key,
                reasons,
            ) {
                if everyone_else {
                    return None;
                }
                index = rules.len() - 1;
                continue;
            }

            let variation_id =
                bucketer::find_bucket(bucketing_id, &rule.id, &rule.traffic_allocation);
            if let Some(variation) = variation_id.and_then(|id| rule.variation_by_id(id)) {
                reasons.info(format!(
                    "user bucketed into delivery rule {:?}",
                    rule.key
                ));
                return Some(Chosen {
                    variation,
                    rule_key: Some(rule.key.clone()),
                    source: DecisionSource::Rollout,
                });
            }
            reasons.info(format!(
                "user not allocated by delivery rule {:?}",
                rule.key
            ));
            index += 1;
        }
        None
    }

    /// NULL folds to false at the audience boundary: unknown never targets.
    fn audience_allows(
        &self,
        tree: Option<&ConditionTree>,
        user: &UserContext,
        rule_key: &str,
        reasons: &mut DecisionReasons,
    ) -> bool {
        let Some(tree) = tree else {
            return true;
        };
        let allowed = tree.evaluate(self.config, user).unwrap_or(false);
        if !allowed {
            reasons.info(format!(
                "audiences of rule {rule_key:?} do not match the user"
            ));
        }
        allowed
    }

    fn finalize(
        &self,
        user: &UserContext,
        flag: &FeatureFlag,
        chosen: Option<Chosen<'_>>,
        mut reasons: DecisionReasons,
        options: &[DecideOption],
    ) -> (Decision, Option<ImpressionEvent>) {
        let (enabled, variation_key, rule_key, source) = match &chosen {
            Some(chosen) => (
                chosen.variation.feature_enabled,
                Some(chosen.variation.key.clone()),
                chosen.rule_key.clone(),
                chosen.source,
            ),
            None => (false, None, None, DecisionSource::None),
        };

        let variables = self.materialize_variables(
            flag,
            chosen.as_ref().map(|c| c.variation),
            enabled,
            &mut reasons,
        );

        let tracked = !options.contains(&DecideOption::DisableTracking)
            && (source.always_tracked() || self.config.send_flag_decisions);
        let impression = tracked.then(|| ImpressionEvent {
            user_id: user.user_id.clone(),
            attributes: user.attributes.clone(),
            flag_key: flag.key.clone(),
            rule_key: rule_key.clone().unwrap_or_default(),
            rule_type: source,
            variation_key: variation_key.clone().unwrap_or_default(),
            enabled,
        });

        let decision = Decision {
            flag_key: flag.key.clone(),
            enabled,
            variation_key,
            rule_key,
            source,
            variables,
            reasons: reasons.into_vec(),
        };
        (decision, impression)
    }

    /// Effective variable values: the variation's overrides when it is
    /// enabled, declared defaults otherwise. Values parse to their declared
    /// type; a malformed value falls back to the default.
    fn materialize_variables(
        &self,
        flag: &FeatureFlag,
        variation: Option<&Variation>,
        enabled: bool,
        reasons: &mut DecisionReasons,
    ) -> HashMap<String, serde_json::Value> {
        let mut variables = HashMap::with_capacity(flag.variables.len());
        for (key, variable) in &flag.variables {
            let raw = if enabled {
                variation
                    .and_then(|v| v.variables.get(&variable.id))
                    .map(|usage| usage.value.as_str())
                    .unwrap_or(&variable.default_value)
            } else {
                &variable.default_value
            };
            let value = match parse_variable(raw, variable.variable_type) {
                Some(value) => value,
                None => {
                    reasons.error(format!(
                        "value {raw:?} of variable {key:?} is not a valid {:?}",
                        variable.variable_type
                    ));
                    parse_variable(&variable.default_value, variable.variable_type)
                        .unwrap_or(serde_json::Value::Null)
                }
            };
            variables.insert(key.clone(), value);
        }
        variables
    }
}

fn parse_variable(raw: &str, variable_type: VariableType) -> Option<serde_json::Value> {
    match variable_type {
        VariableType::String => Some(serde_json::Value::String(raw.to_owned())),
        VariableType::Integer => raw.parse::<i64>().ok().map(serde_json::Value::from),
        VariableType::Double => {
            let parsed: f64 = raw.parse().ok()?;
            serde_json::Number::from_f64(parsed).map(serde_json::Value::Number)
        }
        VariableType::Boolean => raw.parse::<bool>().ok().map(serde_json::Value::Bool),
        VariableType::Json => serde_json::from_str(raw).ok(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::project_config::set_holdout_support;
    use crate::user_profile::InMemoryUserProfileService;
    use crate::Attributes;

    fn sample_datafile() -> serde_json::Value {
        serde_json::json!({
            "version": "4",
            "accountId": "acc-1",
            "projectId": "proj-1",
            "revision": "7",
            "sendFlagDecisions": true,
            "typedAudiences": [
                {
                    "id": "aud_us",
                    "name": "US users",
                    "conditions": ["and", ["or", ["or",
                        {"type": "custom_attribute", "name": "country", "match": "exact", "value": "US"}
                    ]]]
                },
                {
                    "id": "aud_gold",
                    "name": "gold plan",
                    "conditions": ["or",
                        {"type": "custom_attribute", "name": "plan", "match": "exact", "value": "gold"}
                    ]
                },
                {
                    "id": "aud_not_us",
                    "name": "outside the US",
                    "conditions": ["not",
                        {"type": "custom_attribute", "name": "country", "match": "exact", "value": "US"}
                    ]
                }
            ],
            "experiments": [
                {
                    "id": "exp1",
                    "key": "checkout_test",
                    "layerId": "layer1",
                    "status": "Running",
                    "audienceIds": ["aud_us"],
                    "forcedVariations": {"qa-user": "treatment"},
                    "variations": [
                        {"id": "v1", "key": "control", "featureEnabled": false},
                        {
                            "id": "v2",
                            "key": "treatment",
                            "featureEnabled": true,
                            "variables": [
                                {"id": "var1", "value": "25"},
                                {"id": "var2", "value": "{\"size\":3}"},
                                {"id": "var3", "value": "oops"}
                            ]
                        }
                    ],
                    "trafficAllocation": [
                        {"entityId": "v1", "endOfRange": 5000},
                        {"entityId": "v2", "endOfRange": 10000}
                    ]
                }
            ],
            "groups": [
                {
                    "id": "group_1",
                    "policy": "random",
                    "trafficAllocation": [
                        {"entityId": "expA", "endOfRange": 5000},
                        {"entityId": "expB", "endOfRange": 10000}
                    ],
                    "experiments": [
                        {
                            "id": "expA",
                            "key": "group_a",
                            "layerId": "layerA",
                            "status": "Running",
                            "variations": [{"id": "va", "key": "a_on", "featureEnabled": true}],
                            "trafficAllocation": [{"entityId": "va", "endOfRange": 10000}]
                        },
                        {
                            "id": "expB",
                            "key": "group_b",
                            "layerId": "layerB",
                            "status": "Running",
                            "variations": [{"id": "vb", "key": "b_on", "featureEnabled": true}],
                            "trafficAllocation": [{"entityId": "vb", "endOfRange": 10000}]
                        }
                    ]
                }
            ],
            "featureFlags": [
                {
                    "id": "flag1",
                    "key": "checkout",
                    "rolloutId": "rollout1",
                    "experimentIds": ["exp1"],
                    "variables": [
                        {"id": "var1", "key": "limit", "type": "integer", "defaultValue": "10"},
                        {"id": "var2", "key": "config", "type": "string", "subType": "json", "defaultValue": "{}"},
                        {"id": "var3", "key": "ratio", "type": "double", "defaultValue": "1.5"}
                    ]
                },
                {
                    "id": "flag2",
                    "key": "grouped",
                    "rolloutId": "",
                    "experimentIds": ["expB"]
                },
                {
                    "id": "flag3",
                    "key": "gated",
                    "rolloutId": "rollout2",
                    "experimentIds": []
                },
                {
                    "id": "flag4",
                    "key": "tiered",
                    "rolloutId": "rollout1",
                    "experimentIds": []
                }
            ],
            "rollouts": [
                {
                    "id": "rollout1",
                    "experiments": [
                        {
                            "id": "rollout_rule_1",
                            "key": "rule_1",
                            "layerId": "rollout1",
                            "status": "Running",
                            "audienceIds": ["aud_gold"],
                            "variations": [{"id": "vr1", "key": "gold_on", "featureEnabled": true}],
                            "trafficAllocation": [{"entityId": "vr1", "endOfRange": 100}]
                        },
                        {
                            "id": "rollout_rule_2",
                            "key": "rule_2",
                            "layerId": "rollout1",
                            "status": "Running",
                            "audienceIds": ["aud_us"],
                            "variations": [{"id": "vr2", "key": "us_on", "featureEnabled": true}],
                            "trafficAllocation": [{"entityId": "vr2", "endOfRange": 5000}]
                        },
                        {
                            "id": "rollout_everyone",
                            "key": "everyone_else",
                            "layerId": "rollout1",
                            "status": "Running",
                            "variations": [{"id": "vr3", "key": "fallback_off", "featureEnabled": false}],
                            "trafficAllocation": [{"entityId": "vr3", "endOfRange": 10000}]
                        }
                    ]
                },
                {
                    "id": "rollout2",
                    "experiments": [
                        {
                            "id": "rollout_not",
                            "key": "not_rule",
                            "layerId": "rollout2",
                            "status": "Running",
                            "audienceIds": ["aud_not_us"],
                            "variations": [{"id": "vn", "key": "non_us_on", "featureEnabled": true}],
                            "trafficAllocation": [{"entityId": "vn", "endOfRange": 10000}]
                        }
                    ]
                }
            ]
        })
    }

    fn config_from(value: serde_json::Value) -> ProjectConfig {
        ProjectConfig::try_parse(&serde_json::to_vec(&value).unwrap()).unwrap()
    }

    fn us_user(user_id: &str) -> UserContext {
        UserContext::new(
            user_id,
            [("country".to_owned(), "US".into())].into(),
        )
    }

    #[test]
    fn unknown_flag_yields_empty_decision_with_reason() {
        let _ = env_logger::builder().is_test(true).try_init();

        let config = config_from(sample_datafile());
        let service = DecisionService::new(&config, None);
        let (decision, impression) =
            service.decide(&us_user("user1"), "missing", &[]);

        assert!(!decision.enabled);
        assert_eq!(decision.variation_key, None);
        assert_eq!(decision.source, DecisionSource::None);
        assert_eq!(decision.reasons, ["flag \"missing\" not found"]);
        assert!(impression.is_none());
    }

    // 'ppid1' + 'exp1' buckets to 6910, the second half of the allocation.
    #[test]
    fn experiment_bucketing_is_deterministic() {
        let config = config_from(sample_datafile());
        let service = DecisionService::new(&config, None);

        let (decision, impression) = service.decide(&us_user("ppid1"), "checkout", &[]);
        assert!(decision.enabled);
        assert_eq!(decision.variation_key.as_deref(), Some("treatment"));
        assert_eq!(decision.rule_key.as_deref(), Some("checkout_test"));
        assert_eq!(decision.source, DecisionSource::FeatureTest);

        let impression = impression.unwrap();
        assert_eq!(impression.variation_key, "treatment");
        assert_eq!(impression.rule_key, "checkout_test");
        assert_eq!(impression.rule_type, DecisionSource::FeatureTest);

        // 'ppid3' + 'exp1' buckets to 2584, the first half.
        let (decision, _) = service.decide(&us_user("ppid3"), "checkout", &[]);
        assert!(!decision.enabled);
        assert_eq!(decision.variation_key.as_deref(), Some("control"));
    }

    #[test]
    fn bucketing_id_attribute_overrides_user_id_for_allocation() {
        let config = config_from(sample_datafile());
        let service = DecisionService::new(&config, None);

        let mut user = us_user("ppid3");
        user.attributes
            .insert("$opt_bucketing_id".to_owned(), "ppid1".into());
        let (decision, _) = service.decide(&user, "checkout", &[]);
        assert_eq!(decision.variation_key.as_deref(), Some("treatment"));
    }

    #[test]
    fn whitelist_bypasses_audience_and_bucketing() {
        let config = config_from(sample_datafile());
        let service = DecisionService::new(&config, None);

        // No attributes at all, so the audience would fail.
        let user = UserContext::new("qa-user", Attributes::new());
        let (decision, _) = service.decide(&user, "checkout", &[]);
        assert_eq!(decision.variation_key.as_deref(), Some("treatment"));
        assert_eq!(decision.source, DecisionSource::FeatureTest);
    }

    #[test]
    fn flag_scoped_forced_decision_wins() {
        let config = config_from(sample_datafile());
        let service = DecisionService::new(&config, None);

        let mut user = us_user("ppid1");
        user.set_forced_decision(DecisionContext::new("checkout", None), "fallback_off");
        let (decision, _) = service.decide(&user, "checkout", &[]);
        assert_eq!(decision.variation_key.as_deref(), Some("fallback_off"));
        assert!(!decision.enabled);
        assert_eq!(decision.rule_key, None);
        assert_eq!(decision.source, DecisionSource::FeatureTest);
    }

    #[test]
    fn invalid_forced_decision_records_reason_and_continues() {
        let config = config_from(sample_datafile());
        let service = DecisionService::new(&config, None);

        let mut user = us_user("ppid1");
        user.set_forced_decision(DecisionContext::new("checkout", None), "no_such_variation");
        let (decision, _) = service.decide(&user, "checkout", &[]);
        assert_eq!(decision.variation_key.as_deref(), Some("treatment"));
        assert!(decision
            .reasons
            .iter()
            .any(|r| r.contains("no_such_variation")));
    }

    #[test]
    fn rule_scoped_forced_decision_applies_within_the_rule() {
        let config = config_from(sample_datafile());
        let service = DecisionService::new(&config, None);

        let mut user = us_user("ppid1");
        user.set_forced_decision(
            DecisionContext::new("checkout", Some("checkout_test".to_owned())),
            "control",
        );
        let (decision, _) = service.decide(&user, "checkout", &[]);
        assert_eq!(decision.variation_key.as_deref(), Some("control"));
        assert_eq!(decision.rule_key.as_deref(), Some("checkout_test"));
    }

    // 'user1' + 'rollout_rule_1' buckets to 202, outside rule 1's [0, 100)
    // allocation, so only the forced decision can pin the user to rule 1.
    #[test]
    fn rule_scoped_forced_decision_applies_to_a_delivery_rule() {
        let config = config_from(sample_datafile());
        let service = DecisionService::new(&config, None);

        let mut user = UserContext::new(
            "user1",
            [
                ("country".to_owned(), "US".into()),
                ("plan".to_owned(), "gold".into()),
            ]
            .into(),
        );
        user.set_forced_decision(
            DecisionContext::new("tiered", Some("rule_1".to_owned())),
            "gold_on",
        );
        let (decision, _) = service.decide(&user, "tiered", &[]);
        assert_eq!(decision.variation_key.as_deref(), Some("gold_on"));
        assert_eq!(decision.rule_key.as_deref(), Some("rule_1"));
        assert_eq!(decision.source, DecisionSource::Rollout);

        // A forced key the rule does not define records an error and the
        // normal walk resumes.
        user.set_forced_decision(
            DecisionContext::new("tiered", Some("rule_1".to_owned())),
            "no_such_variation",
        );
        let (decision, _) = service.decide(&user, "tiered", &[]);
        assert_eq!(decision.rule_key.as_deref(), Some("rule_2"));
        assert!(decision
            .reasons
            .iter()
            .any(|r| r.contains("no_such_variation")));
    }

    #[test]
    fn audience_mismatch_falls_through_to_rollout() {
        let config = config_from(sample_datafile());
        let service = DecisionService::new(&config, None);

        // Country FR fails the experiment audience and both guarded rules,
        // so the everyone-else rule decides.
        let user = UserContext::new(
            "user1",
            [("country".to_owned(), "FR".into())].into(),
        );
        let (decision, _) = service.decide(&user, "checkout", &[]);
        assert_eq!(decision.variation_key.as_deref(), Some("fallback_off"));
        assert_eq!(decision.rule_key.as_deref(), Some("everyone_else"));
        assert_eq!(decision.source, DecisionSource::Rollout);
    }

    // Rule 1 passes its audience but allocates only bucket [0, 100);
    // 'user1' + 'rollout_rule_1' buckets to 202, so the walk advances one
    // rule (not to the end) and rule 2 decides.
    #[test]
    fn unallocated_rollout_rule_advances_to_next_rule() {
        let config = config_from(sample_datafile());
        let service = DecisionService::new(&config, None);

        let user = UserContext::new(
            "user1",
            [
                ("country".to_owned(), "US".into()),
                ("plan".to_owned(), "gold".into()),
            ]
            .into(),
        );
        let (decision, _) = service.decide(&user, "tiered", &[]);
        assert_eq!(decision.rule_key.as_deref(), Some("rule_2"));
        assert_eq!(decision.variation_key.as_deref(), Some("us_on"));
        assert_eq!(decision.source, DecisionSource::Rollout);
    }

    #[test]
    fn rollout_audience_false_jumps_to_everyone_else() {
        let config = config_from(sample_datafile());
        let service = DecisionService::new(&config, None);

        // Country US matches rule_2, but rule_1 fails first and the walk
        // jumps straight to the last rule, skipping rule_2 entirely.
        let user = UserContext::new("user1", Attributes::new());
        let (decision, _) = service.decide(&user, "checkout", &[]);
        assert_eq!(decision.rule_key.as_deref(), Some("everyone_else"));
        assert_eq!(decision.variation_key.as_deref(), Some("fallback_off"));
    }

    // A NOT over a missing attribute is NULL, not true: the audience fails
    // and the only (last) rule returns no decision.
    #[test]
    fn missing_attribute_under_not_fails_the_audience() {
        let config = config_from(sample_datafile());
        let service = DecisionService::new(&config, None);

        let user = UserContext::new("user1", Attributes::new());
        let (decision, _) = service.decide(&user, "gated", &[]);
        assert_eq!(decision.variation_key, None);
        assert_eq!(decision.source, DecisionSource::None);

        // With a concrete non-US country the NOT evaluates to true.
        let user = UserContext::new(
            "user1",
            [("country".to_owned(), "FR".into())].into(),
        );
        let (decision, _) = service.decide(&user, "gated", &[]);
        assert_eq!(decision.variation_key.as_deref(), Some("non_us_on"));
    }

    // 'alice' + 'group_1' buckets to 2656, selecting expA; the flag's
    // experiment is expB, so alice gets nothing from it.
    #[test]
    fn mutually_exclusive_group_blocks_unselected_experiment() {
        let config = config_from(sample_datafile());
        let service = DecisionService::new(&config, None);

        let (decision, _) = service.decide(
            &UserContext::new("alice", Attributes::new()),
            "grouped",
            &[],
        );
        assert_eq!(decision.variation_key, None);
        assert_eq!(decision.source, DecisionSource::None);

        // 'user1' + 'group_1' buckets to 5566, selecting expB.
        let (decision, _) = service.decide(
            &UserContext::new("user1", Attributes::new()),
            "grouped",
            &[],
        );
        assert_eq!(decision.variation_key.as_deref(), Some("b_on"));
        assert_eq!(decision.source, DecisionSource::FeatureTest);
    }

    #[test]
    fn holdout_takes_precedence_over_the_experiment() {
        let _ = env_logger::builder().is_test(true).try_init();

        set_holdout_support(true);
        let mut datafile = sample_datafile();
        datafile["sendFlagDecisions"] = false.into();
        datafile["holdouts"] = serde_json::json!([
            {
                "id": "holdout_1",
                "key": "q3_holdout",
                "status": "Running",
                "variations": [{"id": "hv", "key": "held_back", "featureEnabled": false}],
                "trafficAllocation": [{"entityId": "hv", "endOfRange": 10000}]
            }
        ]);
        let config = config_from(datafile);
        let service = DecisionService::new(&config, None);

        let (decision, impression) = service.decide(&us_user("ppid1"), "checkout", &[]);
        assert_eq!(decision.source, DecisionSource::Holdout);
        assert_eq!(decision.variation_key.as_deref(), Some("held_back"));
        assert_eq!(decision.rule_key.as_deref(), Some("q3_holdout"));
        assert!(!decision.enabled);

        // Holdout impressions are always sent, even with flag decisions off.
        let impression = impression.unwrap();
        assert_eq!(impression.rule_key, "q3_holdout");
        assert_eq!(impression.rule_type, DecisionSource::Holdout);
    }

    #[test]
    fn fresh_assignment_is_saved_to_the_profile_service() {
        let config = config_from(sample_datafile());
        let profiles = InMemoryUserProfileService::new();
        let service = DecisionService::new(&config, Some(&profiles));

        let (decision, _) = service.decide(&us_user("ppid1"), "checkout", &[]);
        assert_eq!(decision.variation_key.as_deref(), Some("treatment"));

        let profile = profiles.lookup("ppid1").unwrap();
        assert_eq!(profile.variation_for("exp1"), Some("v2"));
    }

    #[test]
    fn sticky_assignment_overrides_bucketing() {
        let config = config_from(sample_datafile());
        let profiles = InMemoryUserProfileService::new();
        let mut profile = UserProfile::new("ppid1");
        profile
            .experiment_bucket_map
            .insert("exp1".to_owned(), "v1".to_owned());
        profiles.save(profile);

        let service = DecisionService::new(&config, Some(&profiles));
        let (decision, _) = service.decide(&us_user("ppid1"), "checkout", &[]);
        assert_eq!(decision.variation_key.as_deref(), Some("control"));

        // BypassUps ignores the stored assignment and re-buckets.
        let (decision, _) =
            service.decide(&us_user("ppid1"), "checkout", &[DecideOption::BypassUps]);
        assert_eq!(decision.variation_key.as_deref(), Some("treatment"));
    }

    #[test]
    fn variables_follow_the_chosen_variation() {
        let config = config_from(sample_datafile());
        let service = DecisionService::new(&config, None);

        let (decision, _) = service.decide(&us_user("ppid1"), "checkout", &[]);
        assert_eq!(decision.variables["limit"], serde_json::json!(25));
        assert_eq!(decision.variables["config"], serde_json::json!({"size": 3}));
        // "oops" is not a double; the declared default applies and the
        // failure is surfaced even without IncludeReasons.
        assert_eq!(decision.variables["ratio"], serde_json::json!(1.5));
        assert!(decision.reasons.iter().any(|r| r.contains("oops")));
    }

    #[test]
    fn disabled_variation_takes_default_variables() {
        let config = config_from(sample_datafile());
        let service = DecisionService::new(&config, None);

        let (decision, _) = service.decide(&us_user("ppid3"), "checkout", &[]);
        assert!(!decision.enabled);
        assert_eq!(decision.variables["limit"], serde_json::json!(10));
        assert_eq!(decision.variables["config"], serde_json::json!({}));
        assert_eq!(decision.variables["ratio"], serde_json::json!(1.5));
    }

    #[test]
    fn disable_tracking_suppresses_the_impression() {
        let config = config_from(sample_datafile());
        let service = DecisionService::new(&config, None);

        let (_, impression) = service.decide(
            &us_user("ppid1"),
            "checkout",
            &[DecideOption::DisableTracking],
        );
        assert!(impression.is_none());
    }

    #[test]
    fn rollout_impressions_follow_send_flag_decisions() {
        let mut datafile = sample_datafile();
        datafile["sendFlagDecisions"] = false.into();
        let config = config_from(datafile);
        let service = DecisionService::new(&config, None);

        let user = UserContext::new("user1", Attributes::new());
        let (decision, impression) = service.decide(&user, "checkout", &[]);
        assert_eq!(decision.source, DecisionSource::Rollout);
        assert!(impression.is_none());
    }

    #[test]
    fn include_reasons_adds_the_decision_trail() {
        let config = config_from(sample_datafile());
        let service = DecisionService::new(&config, None);

        let (terse, _) = service.decide(&us_user("ppid1"), "checkout", &[]);
        assert!(terse.reasons.iter().all(|r| r.contains("oops")));

        let (verbose, _) = service.decide(
            &us_user("ppid1"),
            "checkout",
            &[DecideOption::IncludeReasons],
        );
        assert!(verbose
            .reasons
            .iter()
            .any(|r| r.contains("checkout_test")));
    }

    #[test]
    fn decide_experiment_ignores_flag_stages() {
        let config = config_from(sample_datafile());
        let service = DecisionService::new(&config, None);

        let decision = service.decide_experiment(&us_user("ppid1"), "checkout_test", &[]);
        assert_eq!(decision.variation_key.as_deref(), Some("treatment"));
        assert_eq!(decision.rule_key.as_deref(), Some("checkout_test"));
        assert!(decision.variables.is_empty());

        let decision = service.decide_experiment(&us_user("ppid1"), "missing", &[]);
        assert_eq!(decision.variation_key, None);
        assert_eq!(decision.reasons, ["experiment \"missing\" not found"]);
    }

    #[test]
    fn identical_calls_yield_identical_decisions() {
        let config = config_from(sample_datafile());
        let service = DecisionService::new(&config, None);
        let user = us_user("ppid1");

        let (first, _) = service.decide(&user, "checkout", &[DecideOption::IncludeReasons]);
        let (second, _) = service.decide(&user, "checkout", &[DecideOption::IncludeReasons]);
        assert_eq!(first.enabled, second.enabled);
        assert_eq!(first.variation_key, second.variation_key);
        assert_eq!(first.rule_key, second.rule_key);
        assert_eq!(first.source, second.source);
        assert_eq!(first.variables, second.variables);
        assert_eq!(first.reasons, second.reasons);
    }
}
