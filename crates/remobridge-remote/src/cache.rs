//! Rate-limited snapshot cache for remote devices and appliances.
//!
//! Every accessory read goes through one shared [`RemoteSnapshotCache`].  A
//! snapshot younger than the freshness window is served from memory; an older
//! one triggers a refetch.  When the refetch fails the previous snapshot is
//! served unchanged, so a flaky cloud API degrades to stale data instead of
//! errors.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use remobridge_remote::{NatureClient, RemoteSnapshotCache};
//!
//! # async fn run() -> Result<(), remobridge_types::BridgeError> {
//! let cache = RemoteSnapshotCache::new(Arc::new(NatureClient::new("token")));
//! let devices = cache.devices().await?;
//! for device in devices.payload.iter() {
//!     println!("{}", device.name);
//! }
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use remobridge_types::{BridgeError, RemoteAppliance, RemoteDevice};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::api::{RemoteApi, RemoteError};

/// Minimum interval between two fetches of the same snapshot.
pub const DEFAULT_FRESHNESS_WINDOW: chrono::Duration = chrono::Duration::seconds(10);

/// Source of "now" for freshness decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock [`Clock`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// One snapshot together with the time of the fetch that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub payload: T,
    pub updated_at: Option<DateTime<Utc>>,
}

impl<T> CacheEntry<T> {
    /// Whether this entry may still be served at `now` without refetching.
    ///
    /// An entry stamped in the future (clock skew) counts as fresh.
    pub fn is_fresh(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        match self.updated_at {
            Some(updated_at) => now.signed_duration_since(updated_at) < window,
            None => false,
        }
    }
}

type Slot<T> = RwLock<Option<Arc<CacheEntry<T>>>>;

/// Shared, rate-limited view of the remote's devices and appliances.
pub struct RemoteSnapshotCache {
    api: Arc<dyn RemoteApi>,
    clock: Arc<dyn Clock>,
    window: chrono::Duration,
    devices: Slot<Vec<RemoteDevice>>,
    appliances: Slot<Vec<RemoteAppliance>>,
}

impl RemoteSnapshotCache {
    pub fn new(api: Arc<dyn RemoteApi>) -> Self {
        Self {
            api,
            clock: Arc::new(SystemClock),
            window: DEFAULT_FRESHNESS_WINDOW,
            devices: RwLock::new(None),
            appliances: RwLock::new(None),
        }
    }

    /// Replace the clock (builder-style).  Tests inject a manual clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Current device snapshot, refetched when stale.
    pub async fn devices(&self) -> Result<Arc<CacheEntry<Vec<RemoteDevice>>>, BridgeError> {
        self.resolve(&self.devices, "devices", || self.api.list_devices())
            .await
    }

    /// Current appliance snapshot, refetched when stale.
    pub async fn appliances(
        &self,
    ) -> Result<Arc<CacheEntry<Vec<RemoteAppliance>>>, BridgeError> {
        self.resolve(&self.appliances, "appliances", || {
            self.api.list_appliances()
        })
        .await
    }

    /// Device named `name` in the current snapshot.
    pub async fn device_by_name(&self, name: &str) -> Result<RemoteDevice, BridgeError> {
        let entry = self.devices().await?;
        entry
            .payload
            .iter()
            .find(|d| d.name == name)
            .cloned()
            .ok_or_else(|| BridgeError::NotFound(format!("device '{name}'")))
    }

    /// Appliance with id `id` in the current snapshot.
    pub async fn appliance_by_id(&self, id: &str) -> Result<RemoteAppliance, BridgeError> {
        let entry = self.appliances().await?;
        entry
            .payload
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or_else(|| BridgeError::NotFound(format!("appliance id '{id}'")))
    }

    async fn resolve<T, F, Fut>(
        &self,
        slot: &Slot<T>,
        what: &'static str,
        fetch: F,
    ) -> Result<Arc<CacheEntry<T>>, BridgeError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let now = self.clock.now();
        if let Some(entry) = slot.read().await.as_ref()
            && entry.is_fresh(now, self.window)
        {
            debug!(snapshot = what, "serving cached snapshot");
            return Ok(Arc::clone(entry));
        }

        // The lock is released while the request is in flight; concurrent
        // readers may fetch redundantly.
        match fetch().await {
            Ok(payload) => {
                let entry = Arc::new(CacheEntry {
                    payload,
                    updated_at: Some(self.clock.now()),
                });
                *slot.write().await = Some(Arc::clone(&entry));
                info!(snapshot = what, "refreshed snapshot from remote");
                Ok(entry)
            }
            Err(err) => {
                error!(snapshot = what, error = %err, "refresh failed, serving previous snapshot");
                match slot.read().await.as_ref() {
                    Some(previous) => Ok(Arc::clone(previous)),
                    None => Err(BridgeError::Remote(format!(
                        "no {what} snapshot available: {err}"
                    ))),
                }
            }
        }
    }
}
