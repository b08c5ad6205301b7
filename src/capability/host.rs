//! Permission host whose state is reported over the control API.
//!
//! Headless deployments have no OS prompt to show. A prompt is recorded as
//! pending, and the operator's client posts the outcome back, which both
//! updates this host's view and feeds `CapabilityGate::on_result`.

use std::collections::BTreeSet;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use super::gate::{PermissionHost, PermissionResult};
use super::state::Capability;

#[derive(Debug, Default)]
pub struct ReportedPermissionHost {
    granted: RwLock<BTreeSet<Capability>>,
    pending: RwLock<BTreeSet<Capability>>,
    settings_requested: RwLock<bool>,
}

impl ReportedPermissionHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with the given capabilities already granted.
    pub fn with_granted(capabilities: impl IntoIterator<Item = Capability>) -> Self {
        Self {
            granted: RwLock::new(capabilities.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Record a reported permission outcome.
    pub async fn record(&self, result: &PermissionResult) {
        let mut granted = self.granted.write().await;
        let mut pending = self.pending.write().await;
        for (capability, is_granted) in &result.grants {
            pending.remove(capability);
            if *is_granted {
                granted.insert(*capability);
            } else {
                granted.remove(capability);
            }
        }
        if granted.len() == Capability::REQUIRED.len() {
            *self.settings_requested.write().await = false;
        }
    }

    /// Capabilities a prompt was launched for and no outcome has arrived yet.
    pub async fn pending(&self) -> Vec<Capability> {
        self.pending.read().await.iter().copied().collect()
    }

    /// Whether the user has been sent to host settings and not yet returned
    /// with every capability granted.
    pub async fn settings_requested(&self) -> bool {
        *self.settings_requested.read().await
    }
}

#[async_trait]
impl PermissionHost for ReportedPermissionHost {
    async fn is_granted(&self, capability: Capability) -> bool {
        self.granted.read().await.contains(&capability)
    }

    async fn launch_request(&self, capabilities: Vec<Capability>) {
        info!(capabilities = ?capabilities, "Permission prompt pending host response");
        self.pending.write().await.extend(capabilities);
    }

    async fn open_settings(&self) {
        info!("Host settings requested");
        *self.settings_requested.write().await = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn launch_then_record_clears_pending() {
        let host = ReportedPermissionHost::new();
        host.launch_request(vec![Capability::Read, Capability::Send])
            .await;
        assert_eq!(host.pending().await, vec![Capability::Read, Capability::Send]);

        host.record(&PermissionResult {
            grants: [(Capability::Send, true)].into_iter().collect(),
            ..PermissionResult::default()
        })
        .await;

        assert_eq!(host.pending().await, vec![Capability::Read]);
        assert!(host.is_granted(Capability::Send).await);
        assert!(!host.is_granted(Capability::Read).await);
    }

    #[tokio::test]
    async fn denial_revokes_previous_grant() {
        let host = ReportedPermissionHost::with_granted([Capability::Send]);
        host.record(&PermissionResult {
            grants: [(Capability::Send, false)].into_iter().collect(),
            ..PermissionResult::default()
        })
        .await;
        assert!(!host.is_granted(Capability::Send).await);
    }

    #[tokio::test]
    async fn settings_flag_clears_once_everything_granted() {
        let host = ReportedPermissionHost::new();
        host.open_settings().await;
        assert!(host.settings_requested().await);

        host.record(&PermissionResult {
            grants: Capability::REQUIRED.iter().map(|c| (*c, true)).collect(),
            ..PermissionResult::default()
        })
        .await;
        assert!(!host.settings_requested().await);
    }
}
