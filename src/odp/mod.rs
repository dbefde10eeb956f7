//! Third-party data-platform integration: credentials overlay, identity
//! events, and qualified-segment resolution.
pub mod config;
pub mod event;
pub mod queue;

use std::sync::Arc;

pub use config::{OdpConfig, OdpIntegrationState};
pub use event::OdpEvent;
pub use queue::{HttpOdpEventDispatcher, OdpEventDispatcher, OdpEventManager, OdpEventQueueConfig};

use crate::odp::event::{FS_USER_ID, ODP_EVENT_TYPE};
use crate::sdk_metadata::SdkMetadata;
use crate::segments::{
    GraphqlSegmentsFetcher, LruCache, QualifiedSegmentsFetcher, SegmentCache, SegmentManager,
    SegmentOption,
};
use crate::{Error, Result};

/// Owns all mutable ODP state and the background event queue.
pub struct OdpManager {
    odp_config: Arc<OdpConfig>,
    segment_manager: SegmentManager,
    event_manager: OdpEventManager,
}

impl OdpManager {
    pub fn new(
        metadata: SdkMetadata,
        queue_config: OdpEventQueueConfig,
        cache: Box<dyn SegmentCache>,
        fetcher: Arc<dyn QualifiedSegmentsFetcher>,
        dispatcher: Box<dyn OdpEventDispatcher>,
    ) -> OdpManager {
        let odp_config = Arc::new(OdpConfig::new());
        OdpManager {
            segment_manager: SegmentManager::new(cache, fetcher),
            event_manager: OdpEventManager::new(
                queue_config,
                Arc::clone(&odp_config),
                dispatcher,
                metadata,
            ),
            odp_config,
        }
    }

    /// Production wiring: LRU segment cache, GraphQL fetcher, HTTP
    /// dispatcher.
    pub fn with_defaults(metadata: SdkMetadata) -> OdpManager {
        OdpManager::new(
            metadata,
            OdpEventQueueConfig::default(),
            Box::new(LruCache::default()),
            Arc::new(GraphqlSegmentsFetcher::new()),
            Box::new(HttpOdpEventDispatcher::new()),
        )
    }

    /// Spawn the event flush loop. Must run inside a Tokio runtime.
    pub fn start(&self) {
        self.event_manager.start();
    }

    pub fn is_integrated(&self) -> bool {
        self.odp_config.is_integrated()
    }

    /// Rotate credentials from a new datafile revision. Pending events are
    /// flushed against the previous pair first; when the new host is empty,
    /// whatever is still queued is purged.
    pub async fn update_odp_config(
        &self,
        api_key: &str,
        api_host: &str,
        segments_to_check: Vec<String>,
    ) {
        let (previous_key, previous_host) = self.odp_config.credentials();
        let rotated = previous_key != api_key || previous_host != api_host;
        if rotated && !previous_key.is_empty() && !previous_host.is_empty() {
            self.event_manager.flush().await;
        }

        self.odp_config.update(api_key, api_host, segments_to_check);

        if rotated {
            self.segment_manager.reset_cache();
            if !self.odp_config.is_integrated() {
                self.event_manager.purge();
            }
        }
    }

    /// Queue an identity event for the user. A no-op (with a log line) when
    /// ODP is not integrated.
    pub fn identify(&self, user_id: &str) {
        let event = OdpEvent::new(
            ODP_EVENT_TYPE,
            "identified",
            [(FS_USER_ID.to_owned(), user_id.to_owned())].into(),
            Default::default(),
        );
        if let Err(err) = self.event_manager.process(event) {
            log::debug!(target: "flagship",
                        user_id;
                        "identify event not queued: {err}");
        }
    }

    /// Queue an arbitrary event.
    pub fn send_event(&self, event: OdpEvent) -> Result<()> {
        self.event_manager.process(event)
    }

    /// Resolve which of the datafile's segments the user qualifies for.
    pub async fn fetch_qualified_segments(
        &self,
        user_id: &str,
        options: &[SegmentOption],
    ) -> Result<Vec<String>> {
        if !self.odp_config.is_integrated() {
            return Err(Error::OdpNotIntegrated);
        }
        let (api_key, api_host) = self.odp_config.credentials();
        let segments_to_check = self.odp_config.segments_to_check();
        self.segment_manager
            .fetch_qualified_segments(&api_key, &api_host, user_id, &segments_to_check, options)
            .await
    }

    /// Final flush and worker shutdown.
    pub async fn close(&self) {
        self.event_manager.close().await;
    }

    #[cfg(test)]
    pub(crate) fn queued_events(&self) -> usize {
        self.event_manager.len()
    }
}
