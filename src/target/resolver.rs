//! Config resolver: decides which destination address is active.
//!
//! Precedence, highest first:
//! 1. A non-blank value from a completed remote fetch
//! 2. The last persisted value (user save or earlier remote value)
//! 3. Unset
//!
//! Every write goes through a compare-and-set loop on a single store key, so
//! a fetch completion racing a user save resolves to whichever wrote last.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::model::{PersistedTarget, Provenance, TargetAddress};
use super::remote::{FetchStatus, RemoteConfigSource};
use super::validate::validate_phone_number;
use crate::error::{Result, StoreError};
use crate::store::KeyValueStore;

/// Store key holding the full persisted `TargetAddress` record.
pub const TARGET_KEY: &str = "target_address";

/// Keys of the older two-entry layout, read when no record exists yet.
const LEGACY_NUMBER_KEY: &str = "target_phone_number";
const LEGACY_SOURCE_KEY: &str = "phone_number_source";

/// Compare-and-set retries before a write is reported as contended.
const MAX_WRITE_ATTEMPTS: u32 = 8;

/// Default minimum spacing between remote fetches.
pub const DEFAULT_MIN_FETCH_INTERVAL: Duration = Duration::from_secs(3600);

/// Resolves and persists the relay destination.
pub struct ConfigResolver {
    store: Arc<dyn KeyValueStore>,
    remote: Option<Arc<dyn RemoteConfigSource>>,
    min_fetch_interval: Duration,
    /// Non-blank remote value from the latest completed fetch, consumed by
    /// the next `resolve()`.
    fresh_remote: Mutex<Option<String>>,
    last_fetch: Mutex<Option<Instant>>,
    last_status: RwLock<FetchStatus>,
}

impl ConfigResolver {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        remote: Option<Arc<dyn RemoteConfigSource>>,
        min_fetch_interval: Duration,
    ) -> Self {
        let initial = if remote.is_some() {
            FetchStatus::Idle
        } else {
            FetchStatus::Disabled
        };
        Self {
            store,
            remote,
            min_fetch_interval,
            fresh_remote: Mutex::new(None),
            last_fetch: Mutex::new(None),
            last_status: RwLock::new(initial),
        }
    }

    /// Return the active destination address.
    pub async fn resolve(&self) -> std::result::Result<TargetAddress, StoreError> {
        let fresh = self.fresh_remote.lock().await.take();
        if let Some(value) = fresh {
            let target = TargetAddress::new(value.clone(), Provenance::RemoteConfig);
            return match self.write(&target).await {
                Ok(written) => Ok(written),
                Err(e) => {
                    // Keep the value so the next resolve retries the write.
                    let mut slot = self.fresh_remote.lock().await;
                    if slot.is_none() {
                        *slot = Some(value);
                    }
                    Err(e)
                }
            };
        }

        self.load().await
    }

    /// Validate and persist a user-entered address.
    ///
    /// On validation failure nothing is written.
    pub async fn save(&self, user_value: &str) -> Result<TargetAddress> {
        if let Err(e) = validate_phone_number(user_value) {
            warn!(error = %e, "Rejected destination address");
            return Err(e.into());
        }

        // The user's write is now the latest; a pending remote value must not
        // silently override it on the next resolve.
        self.fresh_remote.lock().await.take();

        let target = TargetAddress::new(user_value, Provenance::UserSet);
        let written = self.write(&target).await?;
        info!(target = %written.value, "Destination address saved by user");
        Ok(written)
    }

    /// Trigger a remote fetch, honouring the minimum fetch interval.
    ///
    /// Calls inside the interval do nothing and return the last status. A
    /// blank or failed fetch leaves the persisted address untouched.
    pub async fn refresh_from_remote(&self) -> FetchStatus {
        let Some(remote) = self.remote.as_ref() else {
            return FetchStatus::Disabled;
        };

        {
            let mut last_fetch = self.last_fetch.lock().await;
            if let Some(at) = *last_fetch {
                if at.elapsed() < self.min_fetch_interval {
                    debug!(
                        elapsed_secs = at.elapsed().as_secs(),
                        "Remote fetch throttled"
                    );
                    return self.last_status.read().await.clone();
                }
            }
            *last_fetch = Some(Instant::now());
        }

        *self.last_status.write().await = FetchStatus::Fetching;

        let status = match remote.fetch_target().await {
            Ok(value) if !value.trim().is_empty() => {
                let value = value.trim().to_string();
                if validate_phone_number(&value).is_err() {
                    warn!(value = %value, "Remote destination does not look like a phone number");
                }
                *self.fresh_remote.lock().await = Some(value.clone());

                match self
                    .write(&TargetAddress::new(value.clone(), Provenance::RemoteConfig))
                    .await
                {
                    Ok(_) => info!(target = %value, "Remote destination applied"),
                    Err(e) => {
                        error!(error = %e, "Failed to persist remote destination; will retry on resolve")
                    }
                }
                FetchStatus::RemoteApplied { value }
            }
            Ok(_) => {
                info!("Remote destination blank, keeping local value");
                FetchStatus::RemoteBlank
            }
            Err(e) => {
                warn!(error = %e, "Remote config fetch failed, keeping local value");
                FetchStatus::Failed {
                    reason: e.to_string(),
                }
            }
        };

        *self.last_status.write().await = status.clone();
        status
    }

    /// Status of the most recent remote refresh.
    pub async fn fetch_status(&self) -> FetchStatus {
        self.last_status.read().await.clone()
    }

    /// Read the persisted address without consulting pending remote values.
    async fn load(&self) -> std::result::Result<TargetAddress, StoreError> {
        if let Some(raw) = self.store.get(TARGET_KEY).await? {
            return match serde_json::from_str::<PersistedTarget>(&raw) {
                Ok(record) => Ok(record.into_target()),
                Err(e) => {
                    warn!(error = %e, "Persisted destination unreadable, treating as unset");
                    Ok(TargetAddress::unset())
                }
            };
        }

        if let Some(number) = self.store.get(LEGACY_NUMBER_KEY).await? {
            let source = self.store.get(LEGACY_SOURCE_KEY).await?;
            debug!("Read destination from legacy keys");
            return Ok(PersistedTarget {
                target_phone_number: number,
                phone_number_source: source,
                updated_at: None,
            }
            .into_target());
        }

        Ok(TargetAddress::unset())
    }

    /// Replace the persisted record, last writer wins.
    async fn write(&self, target: &TargetAddress) -> std::result::Result<TargetAddress, StoreError> {
        let encoded = serde_json::to_string(&PersistedTarget::from(target))?;

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let current = self.store.get(TARGET_KEY).await?;

            let existing = current
                .as_deref()
                .and_then(|raw| serde_json::from_str::<PersistedTarget>(raw).ok())
                .map(PersistedTarget::into_target);
            if let Some(existing) = existing.filter(|e| e.same_as(target)) {
                return Ok(existing);
            }

            if self
                .store
                .compare_and_set(TARGET_KEY, current.as_deref(), &encoded)
                .await?
            {
                debug!(
                    provenance = %target.provenance,
                    attempt,
                    "Destination record written"
                );
                return Ok(target.clone());
            }
            debug!(attempt, "Destination write raced another writer, retrying");
        }

        Err(StoreError::Contention {
            key: TARGET_KEY.to_string(),
            attempts: MAX_WRITE_ATTEMPTS,
        })
    }
}

/// Spawn a background task that refreshes remote config every `interval`.
///
/// The first tick is skipped; callers refresh once at startup themselves.
pub fn spawn_refresh_ticker(resolver: Arc<ConfigResolver>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let status = resolver.refresh_from_remote().await;
            debug!(status = status.message(), "Periodic remote refresh");
        }
    })
}
