//! Capability gate: owns grant state for the relay's runtime permissions.
//!
//! Granting is a two-step protocol: `request()` asks the host to prompt the
//! user, and the host later reports back through `on_result()`. The gate is
//! the only writer of `CapabilityState`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::state::{Capability, GrantState};
use crate::error::CapabilityError;

/// The host environment's permission subsystem.
#[async_trait]
pub trait PermissionHost: Send + Sync {
    /// Whether the host currently reports the capability as granted.
    async fn is_granted(&self, capability: Capability) -> bool;

    /// Launch a permission prompt. The outcome arrives later via
    /// `CapabilityGate::on_result`.
    async fn launch_request(&self, capabilities: Vec<Capability>);

    /// Open the host's settings screen for this app.
    async fn open_settings(&self);
}

/// Outcome of a permission prompt, as delivered by the host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PermissionResult {
    /// Per-capability grant flag.
    pub grants: HashMap<Capability, bool>,
    /// Per-capability "do not ask again" flag.
    #[serde(default)]
    pub rationale_suppressed: HashMap<Capability, bool>,
}

/// What `check_and_request` did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestOutcome {
    /// Capabilities a prompt was launched for.
    pub requested: Vec<Capability>,
    /// True when every capability was already granted.
    pub all_granted: bool,
    /// True when at least one capability can only be fixed in host settings.
    pub needs_settings: bool,
}

/// Point-in-time view of the gate, for display.
#[derive(Debug, Clone, Serialize)]
pub struct CapabilitySnapshot {
    pub states: BTreeMap<Capability, GrantState>,
    pub all_granted: bool,
    pub needs_settings: bool,
}

/// Tracks grant state for receive/read/send and derives relay eligibility.
pub struct CapabilityGate {
    host: Arc<dyn PermissionHost>,
    states: RwLock<HashMap<Capability, GrantState>>,
}

impl CapabilityGate {
    pub fn new(host: Arc<dyn PermissionHost>) -> Self {
        let states = Capability::REQUIRED
            .iter()
            .map(|c| (*c, GrantState::Unrequested))
            .collect();
        Self {
            host,
            states: RwLock::new(states),
        }
    }

    /// Ask the host to prompt for the listed capabilities.
    ///
    /// Capabilities already granted or permanently denied are not prompted
    /// for; the returned list is what was actually requested.
    pub async fn request(&self, capabilities: &[Capability]) -> Vec<Capability> {
        let to_request: Vec<Capability> = {
            let states = self.states.read().await;
            capabilities
                .iter()
                .copied()
                .filter(|c| states.get(c).copied().unwrap_or_default().is_requestable())
                .collect()
        };

        if to_request.is_empty() {
            debug!("No requestable capabilities, skipping prompt");
            return to_request;
        }

        info!(capabilities = ?to_request, "Requesting capabilities from host");
        self.host.launch_request(to_request.clone()).await;
        to_request
    }

    /// Apply a host permission result.
    pub async fn on_result(&self, result: &PermissionResult) {
        let mut states = self.states.write().await;
        for (capability, granted) in &result.grants {
            let suppressed = result
                .rationale_suppressed
                .get(capability)
                .copied()
                .unwrap_or(false);
            let next = GrantState::from_result(*granted, suppressed);
            let prev = states.insert(*capability, next).unwrap_or_default();

            match next {
                GrantState::Granted => {
                    info!(capability = %capability, from = %prev, "Capability granted")
                }
                GrantState::PermanentlyDenied => warn!(
                    capability = %capability,
                    "Capability permanently denied; host settings required"
                ),
                _ => warn!(capability = %capability, "Capability denied"),
            }
        }
    }

    /// Reconcile with the host's current grant status.
    ///
    /// This is the only way out of `PermanentlyDenied`: the user flips the
    /// permission in host settings and the next check observes it granted.
    /// A capability the host no longer reports granted drops back to
    /// `Unrequested` so it can be prompted for again.
    pub async fn refresh_from_host(&self) {
        let mut observed = Vec::with_capacity(Capability::REQUIRED.len());
        for capability in Capability::REQUIRED {
            observed.push((capability, self.host.is_granted(capability).await));
        }

        let mut states = self.states.write().await;
        for (capability, granted) in observed {
            let entry = states.entry(capability).or_default();
            if granted && !entry.is_granted() {
                debug!(capability = %capability, from = %entry, "Host reports capability granted");
                *entry = GrantState::Granted;
            } else if !granted && entry.is_granted() {
                debug!(capability = %capability, "Host revoked capability");
                *entry = GrantState::Unrequested;
            }
        }
    }

    /// Check the host and prompt for anything still missing.
    pub async fn check_and_request(&self) -> RequestOutcome {
        self.refresh_from_host().await;

        if self.all_granted().await {
            debug!("All capabilities already granted");
            return RequestOutcome {
                requested: Vec::new(),
                all_granted: true,
                needs_settings: false,
            };
        }

        let requested = self.request(&Capability::REQUIRED).await;
        RequestOutcome {
            requested,
            all_granted: false,
            needs_settings: self.needs_settings().await,
        }
    }

    /// Forward the user to host settings.
    pub async fn open_host_settings(&self) {
        info!("Opening host settings");
        self.host.open_settings().await;
    }

    pub async fn state(&self, capability: Capability) -> GrantState {
        self.states
            .read()
            .await
            .get(&capability)
            .copied()
            .unwrap_or_default()
    }

    /// True iff every required capability is granted.
    pub async fn all_granted(&self) -> bool {
        let states = self.states.read().await;
        Capability::REQUIRED
            .iter()
            .all(|c| states.get(c).is_some_and(GrantState::is_granted))
    }

    /// True iff `send` is granted.
    pub async fn send_allowed(&self) -> bool {
        self.state(Capability::Send).await.is_granted()
    }

    /// True iff any capability is permanently denied.
    pub async fn needs_settings(&self) -> bool {
        self.states
            .read()
            .await
            .values()
            .any(|s| *s == GrantState::PermanentlyDenied)
    }

    /// Require `send`, reporting why it is unavailable.
    pub async fn require_send(&self) -> Result<(), CapabilityError> {
        match self.state(Capability::Send).await {
            GrantState::Granted => Ok(()),
            GrantState::PermanentlyDenied => Err(CapabilityError::PermissionPermanentlyDenied(
                Capability::Send,
            )),
            _ => Err(CapabilityError::PermissionNotGranted(Capability::Send)),
        }
    }

    pub async fn snapshot(&self) -> CapabilitySnapshot {
        let states: BTreeMap<Capability, GrantState> = self
            .states
            .read()
            .await
            .iter()
            .map(|(c, s)| (*c, *s))
            .collect();
        let all_granted = Capability::REQUIRED
            .iter()
            .all(|c| states.get(c).is_some_and(GrantState::is_granted));
        let needs_settings = states.values().any(|s| *s == GrantState::PermanentlyDenied);
        CapabilitySnapshot {
            states,
            all_granted,
            needs_settings,
        }
    }
}
