use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::RwLock;

/// Whether ODP can be used, resolved once credentials are known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OdpIntegrationState {
    /// No datafile has provided credentials yet.
    Undetermined,
    Integrated,
    NotIntegrated,
}

#[derive(Debug, Default)]
struct Credentials {
    api_key: String,
    api_host: String,
    segments_to_check: Vec<String>,
}

/// The mutable ODP connection overlay, rotated on every datafile update.
///
/// Scalar fields sit behind one RW lock; the integration tri-state is an
/// atomic so the hot decision path can check it without locking.
#[derive(Debug, Default)]
pub struct OdpConfig {
    credentials: RwLock<Credentials>,
    // 0 = undetermined, 1 = integrated, 2 = not integrated
    state: AtomicU8,
}

impl OdpConfig {
    pub fn new() -> OdpConfig {
        OdpConfig::default()
    }

    /// Install new credentials. Returns whether the `(api_key, api_host)`
    /// pair changed, so the caller can flush pending events against the
    /// previous pair first.
    pub fn update(
        &self,
        api_key: impl Into<String>,
        api_host: impl Into<String>,
        segments_to_check: Vec<String>,
    ) -> bool {
        let api_key = api_key.into();
        let api_host = api_host.into();
        let integrated = !api_key.is_empty() && !api_host.is_empty();

        let mut credentials = self
            .credentials
            .write()
            .expect("OdpConfig lock is poisoned");
        let changed = credentials.api_key != api_key || credentials.api_host != api_host;
        credentials.api_key = api_key;
        credentials.api_host = api_host;
        credentials.segments_to_check = segments_to_check;
        self.state
            .store(if integrated { 1 } else { 2 }, Ordering::Release);
        changed
    }

    /// Snapshot of the current `(api_key, api_host)` pair.
    pub fn credentials(&self) -> (String, String) {
        let credentials = self
            .credentials
            .read()
            .expect("OdpConfig lock is poisoned");
        (credentials.api_key.clone(), credentials.api_host.clone())
    }

    /// Segments the active datafile references.
    pub fn segments_to_check(&self) -> Vec<String> {
        self.credentials
            .read()
            .expect("OdpConfig lock is poisoned")
            .segments_to_check
            .clone()
    }

    pub fn state(&self) -> OdpIntegrationState {
        match self.state.load(Ordering::Acquire) {
            1 => OdpIntegrationState::Integrated,
            2 => OdpIntegrationState::NotIntegrated,
            _ => OdpIntegrationState::Undetermined,
        }
    }

    pub fn is_integrated(&self) -> bool {
        self.state() == OdpIntegrationState::Integrated
    }
}
