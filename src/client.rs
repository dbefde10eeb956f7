//! The public facade combining config storage, decisions, events, and ODP.
use std::collections::HashMap;
use std::sync::Arc;

use crate::config_store::ConfigStore;
use crate::decision::{DecideOption, Decision, DecisionService, DecisionSource};
use crate::events::{ConversionEvent, ImpressionEvent};
use crate::odp::OdpManager;
use crate::project_config::ProjectConfig;
use crate::sdk_metadata::SdkMetadata;
use crate::segments::SegmentOption;
use crate::user_context::UserContext;
use crate::user_profile::UserProfileService;
use crate::{Result, Value};

/// A feature-flagging client bound to one datafile at a time.
///
/// The client is cheap to share behind an `Arc`; all methods take `&self`.
/// Decisions are served from an immutable config snapshot, so a concurrent
/// [`set_datafile`](Client::set_datafile) never affects an in-flight call.
pub struct Client {
    metadata: SdkMetadata,
    config_store: ConfigStore,
    profile_service: Option<Arc<dyn UserProfileService>>,
    odp: OdpManager,
}

impl Client {
    /// A client with production ODP wiring and no user-profile service.
    pub fn new(metadata: SdkMetadata) -> Client {
        let odp = OdpManager::with_defaults(metadata);
        Client::with_odp_manager(metadata, odp)
    }

    /// A client with custom ODP wiring (fetcher, dispatcher, cache).
    pub fn with_odp_manager(metadata: SdkMetadata, odp: OdpManager) -> Client {
        Client {
            metadata,
            config_store: ConfigStore::new(),
            profile_service: None,
            odp,
        }
    }

    /// Attach a sticky-bucketing store.
    pub fn with_profile_service(mut self, service: Arc<dyn UserProfileService>) -> Client {
        self.profile_service = Some(service);
        self
    }

    /// Spawn background workers. Must be called from within a Tokio runtime.
    pub fn start(&self) {
        self.odp.start();
    }

    /// Whether a datafile has been installed.
    pub fn is_ready(&self) -> bool {
        self.config_store.is_initialized()
    }

    /// Parse and install a datafile revision, rotating ODP credentials and
    /// the segment list along with it.
    pub async fn set_datafile(&self, json: &[u8]) -> Result<()> {
        let config = Arc::new(ProjectConfig::try_parse(json)?);
        let (api_key, api_host) = config
            .odp_settings()
            .map(|s| (s.api_key.clone(), s.api_host.clone()))
            .unwrap_or_default();
        let segments = config.segments_to_check().to_vec();

        self.config_store.set(Arc::clone(&config));
        self.odp.update_odp_config(&api_key, &api_host, segments).await;
        Ok(())
    }

    /// Decide one key for the user.
    pub fn decide(&self, user: &UserContext, key: &str, options: &[DecideOption]) -> Decision {
        let Some(config) = self.config_store.get() else {
            return self.not_ready_decision(key);
        };
        let service = DecisionService::new(&config, self.profile_service.as_deref());

        if options.contains(&DecideOption::ForExperiment) {
            let decision = service.decide_experiment(user, key, options);
            self.send_experiment_impression(user, &decision, options);
            return decision;
        }

        let (decision, impression) = service.decide(user, key, options);
        if let Some(impression) = impression {
            self.send_impression(impression);
        }
        decision
    }

    /// Decide the given keys, in order.
    pub fn decide_for_keys(
        &self,
        user: &UserContext,
        keys: &[String],
        options: &[DecideOption],
    ) -> HashMap<String, Decision> {
        let enabled_only = options.contains(&DecideOption::EnabledOnly);
        keys.iter()
            .map(|key| self.decide(user, key, options))
            .filter(|decision| !enabled_only || decision.enabled)
            .map(|decision| (decision.flag_key.clone(), decision))
            .collect()
    }

    /// Decide every flag in the datafile.
    pub fn decide_all(
        &self,
        user: &UserContext,
        options: &[DecideOption],
    ) -> HashMap<String, Decision> {
        let Some(config) = self.config_store.get() else {
            return HashMap::new();
        };
        self.decide_for_keys(user, config.flag_keys(), options)
    }

    /// Queue a conversion event for a known event key. Unknown keys are
    /// logged and dropped; the call itself never fails.
    pub fn track_event(&self, user: &UserContext, event_key: &str, tags: HashMap<String, Value>) {
        let Some(config) = self.config_store.get() else {
            log::warn!(target: "flagship",
                       event_key;
                       "cannot track before a datafile is set");
            return;
        };
        let event = match config.event(event_key) {
            Ok(event) => event,
            Err(_) => {
                log::warn!(target: "flagship",
                           event_key;
                           "unknown event key, dropping the conversion");
                return;
            }
        };
        let conversion = ConversionEvent {
            user_id: user.user_id.clone(),
            attributes: user.attributes.clone(),
            event_id: event.id.clone(),
            event_key: event.key.clone(),
            tags,
        };
        if let Err(err) = self.odp.send_event(conversion.into_odp_event()) {
            log::warn!(target: "flagship",
                       event_key;
                       "conversion event not queued: {err}");
        }
    }

    /// Announce the user to ODP.
    pub fn identify(&self, user_id: &str) {
        self.odp.identify(user_id);
    }

    /// Resolve the user's qualified segments and store them on the context.
    pub async fn fetch_qualified_segments(
        &self,
        user: &mut UserContext,
        options: &[SegmentOption],
    ) -> Result<()> {
        let segments = self
            .odp
            .fetch_qualified_segments(&user.user_id, options)
            .await?;
        user.qualified_segments = segments.into_iter().collect();
        Ok(())
    }

    /// Flush pending events and stop background workers.
    pub async fn close(&self) {
        self.odp.close().await;
    }

    fn not_ready_decision(&self, key: &str) -> Decision {
        Decision::off(
            key,
            HashMap::new(),
            vec!["no datafile has been set".to_owned()],
        )
    }

    fn send_impression(&self, impression: ImpressionEvent) {
        if let Err(err) = self.odp.send_event(impression.into_odp_event()) {
            log::debug!(target: "flagship", "impression event not queued: {err}");
        }
    }

    fn send_experiment_impression(
        &self,
        user: &UserContext,
        decision: &Decision,
        options: &[DecideOption],
    ) {
        if options.contains(&DecideOption::DisableTracking) {
            return;
        }
        let Some(variation_key) = &decision.variation_key else {
            return;
        };
        self.send_impression(ImpressionEvent {
            user_id: user.user_id.clone(),
            attributes: user.attributes.clone(),
            flag_key: decision.flag_key.clone(),
            rule_key: decision.rule_key.clone().unwrap_or_default(),
            rule_type: DecisionSource::FeatureTest,
            variation_key: variation_key.clone(),
            enabled: decision.enabled,
        });
    }

    /// SDK name and version stamped onto outgoing events.
    pub fn metadata(&self) -> SdkMetadata {
        self.metadata
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::odp::{OdpEvent, OdpEventDispatcher, OdpEventQueueConfig};
    use crate::segments::{LruCache, QualifiedSegmentsFetcher};
    use crate::Attributes;

    const METADATA: SdkMetadata = SdkMetadata {
        name: "flagship-rust",
        version: "0.1.0",
    };

    struct NullDispatcher;

    #[async_trait]
    impl OdpEventDispatcher for NullDispatcher {
        async fn dispatch(
            &self,
            _api_key: &str,
            _api_host: &str,
            _batch: &[OdpEvent],
        ) -> Result<()> {
            Ok(())
        }
    }

    struct StubFetcher(Vec<String>);

    #[async_trait]
    impl QualifiedSegmentsFetcher for StubFetcher {
        async fn fetch(
            &self,
            _api_key: &str,
            _api_host: &str,
            _user_id: &str,
            _segments_to_check: &[String],
        ) -> Result<Vec<String>> {
            Ok(self.0.clone())
        }
    }

    fn test_client(segments: Vec<String>) -> Client {
        let odp = OdpManager::new(
            METADATA,
            OdpEventQueueConfig {
                batch_size: 100,
                ..OdpEventQueueConfig::default()
            },
            Box::new(LruCache::default()),
            Arc::new(StubFetcher(segments)),
            Box::new(NullDispatcher),
        );
        Client::with_odp_manager(METADATA, odp)
    }

    fn sample_datafile() -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "version": "4",
            "accountId": "acc-1",
            "projectId": "proj-1",
            "revision": "3",
            "sendFlagDecisions": true,
            "typedAudiences": [
                {
                    "id": "aud_vip",
                    "name": "vip segment",
                    "conditions": ["or", {
                        "type": "third_party_dimension",
                        "match": "qualified",
                        "name": "odp.audiences",
                        "value": "vip"
                    }]
                }
            ],
            "events": [
                {"id": "e1", "key": "purchase", "experimentIds": ["exp1"]}
            ],
            "experiments": [
                {
                    "id": "exp1",
                    "key": "checkout_test",
                    "layerId": "layer1",
                    "status": "Running",
                    "variations": [
                        {"id": "v1", "key": "control", "featureEnabled": false},
                        {"id": "v2", "key": "treatment", "featureEnabled": true}
                    ],
                    "trafficAllocation": [
                        {"entityId": "v1", "endOfRange": 5000},
                        {"entityId": "v2", "endOfRange": 10000}
                    ]
                }
            ],
            "featureFlags": [
                {
                    "id": "flag1",
                    "key": "checkout",
                    "rolloutId": "",
                    "experimentIds": ["exp1"]
                },
                {
                    "id": "flag2",
                    "key": "maintenance_banner",
                    "rolloutId": "rollout1",
                    "experimentIds": []
                }
            ],
            "rollouts": [
                {
                    "id": "rollout1",
                    "experiments": [
                        {
                            "id": "rule_everyone",
                            "key": "everyone_else",
                            "layerId": "rollout1",
                            "status": "Running",
                            "variations": [
                                {"id": "vr", "key": "off", "featureEnabled": false}
                            ],
                            "trafficAllocation": [{"entityId": "vr", "endOfRange": 10000}]
                        }
                    ]
                }
            ],
            "integrations": [
                {"key": "odp", "host": "https://odp.example.com", "publicKey": "odp-key"}
            ]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn decide_before_datafile_is_not_ready() {
        let client = test_client(vec![]);
        assert!(!client.is_ready());

        let user = UserContext::new("user1", Attributes::new());
        let decision = client.decide(&user, "checkout", &[]);
        assert!(!decision.enabled);
        assert_eq!(decision.reasons, ["no datafile has been set"]);
    }

    #[tokio::test]
    async fn set_datafile_enables_decisions_and_impressions() {
        let client = test_client(vec![]);
        client.set_datafile(&sample_datafile()).await.unwrap();
        assert!(client.is_ready());

        let user = UserContext::new("ppid1", Attributes::new());
        let decision = client.decide(&user, "checkout", &[]);
        assert!(decision.enabled);
        assert_eq!(decision.variation_key.as_deref(), Some("treatment"));
        assert_eq!(client.odp.queued_events(), 1);

        // DisableTracking suppresses the impression.
        client.decide(&user, "checkout", &[DecideOption::DisableTracking]);
        assert_eq!(client.odp.queued_events(), 1);
    }

    #[tokio::test]
    async fn decide_all_honors_enabled_only() {
        let client = test_client(vec![]);
        client.set_datafile(&sample_datafile()).await.unwrap();

        let user = UserContext::new("ppid1", Attributes::new());
        let all = client.decide_all(&user, &[DecideOption::DisableTracking]);
        assert_eq!(all.len(), 2);
        assert!(all["checkout"].enabled);
        assert!(!all["maintenance_banner"].enabled);

        let enabled = client.decide_all(
            &user,
            &[DecideOption::DisableTracking, DecideOption::EnabledOnly],
        );
        assert_eq!(enabled.len(), 1);
        assert!(enabled.contains_key("checkout"));
    }

    #[tokio::test]
    async fn for_experiment_treats_the_key_as_an_experiment() {
        let client = test_client(vec![]);
        client.set_datafile(&sample_datafile()).await.unwrap();

        let user = UserContext::new("ppid1", Attributes::new());
        let decision = client.decide(
            &user,
            "checkout_test",
            &[DecideOption::ForExperiment, DecideOption::DisableTracking],
        );
        assert_eq!(decision.variation_key.as_deref(), Some("treatment"));
        assert_eq!(decision.rule_key.as_deref(), Some("checkout_test"));
    }

    #[tokio::test]
    async fn track_event_queues_known_keys_and_drops_unknown_ones() {
        let client = test_client(vec![]);
        client.set_datafile(&sample_datafile()).await.unwrap();

        let user = UserContext::new("user1", Attributes::new());
        client.track_event(&user, "purchase", [("revenue".to_owned(), 42.into())].into());
        assert_eq!(client.odp.queued_events(), 1);

        client.track_event(&user, "no_such_event", HashMap::new());
        assert_eq!(client.odp.queued_events(), 1);
    }

    #[tokio::test]
    async fn fetch_qualified_segments_populates_the_user_context() {
        let client = test_client(vec!["vip".to_owned()]);
        client.set_datafile(&sample_datafile()).await.unwrap();

        let mut user = UserContext::new("user1", Attributes::new());
        client
            .fetch_qualified_segments(&mut user, &[])
            .await
            .unwrap();
        assert!(user.is_qualified_for("vip"));
        assert!(!user.is_qualified_for("dormant"));
    }
}
