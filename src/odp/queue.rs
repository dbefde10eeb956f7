//! Bounded event queue with timer- and size-triggered batch flushing.
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{Notify, Semaphore};
use tokio::time::{interval_at, sleep, Duration, Instant};

use crate::odp::config::OdpConfig;
use crate::odp::event::OdpEvent;
use crate::sdk_metadata::SdkMetadata;
use crate::{Error, Result};

const DEFAULT_MAX_QUEUE_SIZE: usize = 10_000;
const DEFAULT_BATCH_SIZE: usize = 10;
const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// How many times a retryable batch is attempted within one flush cycle.
const MAX_DISPATCH_RETRIES: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(200);

/// Delivers one batch to the events endpoint.
#[async_trait]
pub trait OdpEventDispatcher: Send + Sync {
    async fn dispatch(&self, api_key: &str, api_host: &str, batch: &[OdpEvent]) -> Result<()>;
}

/// The production dispatcher: `POST {api_host}/v3/events`.
#[derive(Debug)]
pub struct HttpOdpEventDispatcher {
    client: reqwest::Client,
}

impl HttpOdpEventDispatcher {
    pub fn new() -> HttpOdpEventDispatcher {
        HttpOdpEventDispatcher {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for HttpOdpEventDispatcher {
    fn default() -> HttpOdpEventDispatcher {
        HttpOdpEventDispatcher::new()
    }
}

#[async_trait]
impl OdpEventDispatcher for HttpOdpEventDispatcher {
    async fn dispatch(&self, api_key: &str, api_host: &str, batch: &[OdpEvent]) -> Result<()> {
        let url = url::Url::parse(api_host)
            .and_then(|base| base.join("/v3/events"))
            .map_err(Error::InvalidApiHost)?;
        let response = self
            .client
            .post(url)
            .header("x-api-key", api_key)
            .json(batch)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(Error::OdpEventFailed {
            reason: format!("events endpoint returned {status}"),
            // Client-side errors are permanent; everything else may pass on
            // a later attempt.
            retryable: !status.is_client_error(),
        })
    }
}

/// Queue tuning knobs.
#[derive(Debug, Clone)]
pub struct OdpEventQueueConfig {
    pub max_queue_size: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
}

impl Default for OdpEventQueueConfig {
    fn default() -> OdpEventQueueConfig {
        OdpEventQueueConfig {
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

struct QueueInner {
    queue: Mutex<VecDeque<OdpEvent>>,
    queue_config: OdpEventQueueConfig,
    odp_config: Arc<OdpConfig>,
    dispatcher: Box<dyn OdpEventDispatcher>,
    // At most one flush at a time, whether timer- or size-triggered.
    flush_semaphore: Semaphore,
    flush_notify: Notify,
    shutdown_notify: Notify,
}

/// Accepts events synchronously and flushes them in batches from a
/// background task.
pub struct OdpEventManager {
    inner: Arc<QueueInner>,
    metadata: SdkMetadata,
    worker: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl OdpEventManager {
    pub fn new(
        queue_config: OdpEventQueueConfig,
        odp_config: Arc<OdpConfig>,
        dispatcher: Box<dyn OdpEventDispatcher>,
        metadata: SdkMetadata,
    ) -> OdpEventManager {
        OdpEventManager {
            inner: Arc::new(QueueInner {
                queue: Mutex::new(VecDeque::new()),
                queue_config,
                odp_config,
                dispatcher,
                flush_semaphore: Semaphore::new(1),
                flush_notify: Notify::new(),
                shutdown_notify: Notify::new(),
            }),
            metadata,
            worker: Mutex::new(None),
        }
    }

    /// Spawn the flush loop. Must be called from within a Tokio runtime.
    pub fn start(&self) {
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let flush_interval = inner.queue_config.flush_interval;
            let mut interval = interval_at(Instant::now() + flush_interval, flush_interval);
            loop {
                tokio::select! {
                    _ = interval.tick() => flush_queue(&inner).await,
                    _ = inner.flush_notify.notified() => flush_queue(&inner).await,
                    _ = inner.shutdown_notify.notified() => {
                        // Best-effort final drain before exit.
                        flush_queue(&inner).await;
                        break;
                    }
                }
            }
        });
        *self.worker.lock().expect("OdpEventManager lock is poisoned") = Some(handle);
    }

    /// Validate the event, stamp the common payload, and append it to the
    /// queue. Reaching `batch_size` wakes the flush loop immediately.
    pub fn process(&self, mut event: OdpEvent) -> Result<()> {
        if !self.inner.odp_config.is_integrated() {
            return Err(Error::OdpNotIntegrated);
        }
        event.validate()?;
        event.add_common_data(&self.metadata);

        let len = {
            let mut queue = self
                .inner
                .queue
                .lock()
                .expect("OdpEventManager lock is poisoned");
            if queue.len() >= self.inner.queue_config.max_queue_size {
                return Err(Error::QueueFull);
            }
            queue.push_back(event);
            queue.len()
        };
        if len >= self.inner.queue_config.batch_size {
            self.inner.flush_notify.notify_one();
        }
        Ok(())
    }

    /// Flush everything currently queued, inline.
    pub async fn flush(&self) {
        flush_queue(&self.inner).await;
    }

    /// Drop all queued events without dispatching them.
    pub fn purge(&self) {
        self.inner
            .queue
            .lock()
            .expect("OdpEventManager lock is poisoned")
            .clear();
    }

    pub fn len(&self) -> usize {
        self.inner
            .queue
            .lock()
            .expect("OdpEventManager lock is poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop the flush loop after a final drain.
    pub async fn close(&self) {
        let handle = self
            .worker
            .lock()
            .expect("OdpEventManager lock is poisoned")
            .take();
        if let Some(handle) = handle {
            self.inner.shutdown_notify.notify_one();
            if let Err(err) = handle.await {
                log::warn!(target: "flagship", "event flush worker panicked: {err}");
            }
        } else {
            // Never started; drain inline.
            flush_queue(&self.inner).await;
        }
    }
}

async fn flush_queue(inner: &QueueInner) {
    let _permit = match inner.flush_semaphore.acquire().await {
        Ok(permit) => permit,
        Err(_) => return,
    };
    let (api_key, api_host) = inner.odp_config.credentials();
    if api_key.is_empty() || api_host.is_empty() {
        return;
    }

    loop {
        // Copy the head batch; it is only removed once its fate is settled,
        // so a failed cycle leaves events queued for the next one.
        let batch: Vec<OdpEvent> = {
            let queue = inner.queue.lock().expect("OdpEventManager lock is poisoned");
            queue
                .iter()
                .take(inner.queue_config.batch_size)
                .cloned()
                .collect()
        };
        if batch.is_empty() {
            return;
        }

        let mut attempts = 0;
        let settled = loop {
            match inner.dispatcher.dispatch(&api_key, &api_host, &batch).await {
                Ok(()) => break true,
                Err(Error::OdpEventFailed {
                    reason,
                    retryable: false,
                }) => {
                    log::warn!(target: "flagship",
                               batch_len = batch.len(),
                               reason = reason.as_str();
                               "dropping event batch after permanent failure");
                    break true;
                }
                Err(err) => {
                    attempts += 1;
                    if attempts >= MAX_DISPATCH_RETRIES {
                        log::warn!(target: "flagship",
                                   batch_len = batch.len();
                                   "event batch still failing after {attempts} attempts, \
                                    leaving it queued: {err}");
                        break false;
                    }
                    sleep(RETRY_BACKOFF * attempts).await;
                }
            }
        };

        if !settled {
            return;
        }
        let mut queue = inner.queue.lock().expect("OdpEventManager lock is poisoned");
        let settled_len = batch.len().min(queue.len());
        queue.drain(..settled_len);
    }
}
