//! Relay service: wires decoding, target resolution and sending together
//! and exposes the user-facing actions.

use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::engine::{BatchSummary, RelayEngine, RelayOutcome};
use crate::capability::{CapabilityGate, CapabilitySnapshot, PermissionResult, RequestOutcome};
use crate::error::{CapabilityError, Result, StoreError};
use crate::inbound::{InboundBatch, InboundBatchDecoder};
use crate::target::{ConfigResolver, FetchStatus, TargetAddress};

/// Active destination plus what the settings screen shows for it.
#[derive(Debug, Clone, Serialize)]
pub struct TargetView {
    pub target: TargetAddress,
    pub display: String,
    pub fetch_status: FetchStatus,
    pub status_message: &'static str,
}

pub struct RelayService {
    gate: Arc<CapabilityGate>,
    resolver: Arc<ConfigResolver>,
    decoder: InboundBatchDecoder,
    engine: RelayEngine,
}

impl RelayService {
    pub fn new(
        gate: Arc<CapabilityGate>,
        resolver: Arc<ConfigResolver>,
        decoder: InboundBatchDecoder,
        engine: RelayEngine,
    ) -> Self {
        Self {
            gate,
            resolver,
            decoder,
            engine,
        }
    }

    pub fn gate(&self) -> &Arc<CapabilityGate> {
        &self.gate
    }

    pub fn resolver(&self) -> &Arc<ConfigResolver> {
        &self.resolver
    }

    /// Handle one inbound event: decode, resolve the destination, relay.
    ///
    /// Records within the batch are processed sequentially.
    pub async fn handle_inbound_event(&self, batch: InboundBatch) -> Vec<RelayOutcome> {
        let batch_id = Uuid::new_v4();
        info!(
            batch_id = %batch_id,
            format = %batch.format,
            units = batch.units.len(),
            "Inbound event received"
        );

        let records = self.decoder.decode(&batch);

        self.gate.refresh_from_host().await;
        let send_allowed = match self.gate.require_send().await {
            Ok(()) => true,
            Err(e @ CapabilityError::PermissionPermanentlyDenied(_)) => {
                warn!(
                    batch_id = %batch_id,
                    error = %e,
                    "Send permanently denied; user must enable it in host settings"
                );
                false
            }
            Err(e @ CapabilityError::PermissionNotGranted(_)) => {
                warn!(batch_id = %batch_id, error = %e, "Send not granted; request it first");
                false
            }
        };

        let target = match self.resolver.resolve().await {
            Ok(target) => target,
            Err(e) => {
                error!(batch_id = %batch_id, error = %e, "Failed to resolve destination");
                TargetAddress::unset()
            }
        };

        let outcomes = self.engine.relay_batch(records, &target, send_allowed).await;

        let summary = BatchSummary::from_outcomes(&outcomes);
        info!(
            batch_id = %batch_id,
            total = summary.total,
            sent = summary.sent,
            failed = summary.failed,
            skipped = summary.skipped,
            "Inbound event processed"
        );
        outcomes
    }

    /// Check the host and prompt for any capability still missing.
    pub async fn request_capabilities(&self) -> RequestOutcome {
        self.gate.check_and_request().await
    }

    /// Apply a permission outcome delivered by the host.
    pub async fn on_permission_result(&self, result: &PermissionResult) -> CapabilitySnapshot {
        self.gate.on_result(result).await;
        self.gate.snapshot().await
    }

    pub async fn open_host_settings(&self) {
        self.gate.open_host_settings().await;
    }

    pub async fn capabilities(&self) -> CapabilitySnapshot {
        self.gate.snapshot().await
    }

    /// Validate and persist a user-entered destination, exactly as entered.
    pub async fn save_address(&self, input: &str) -> Result<TargetAddress> {
        self.resolver.save(input).await
    }

    pub async fn current_target(&self) -> std::result::Result<TargetView, StoreError> {
        let target = self.resolver.resolve().await?;
        let fetch_status = self.resolver.fetch_status().await;
        Ok(TargetView {
            display: target.display(),
            status_message: fetch_status.message(),
            target,
            fetch_status,
        })
    }

    /// Refresh remote config on a separate task so inbound handling is never
    /// blocked on the network.
    pub fn refresh_remote(&self) -> JoinHandle<FetchStatus> {
        let resolver = self.resolver.clone();
        tokio::spawn(async move { resolver.refresh_from_remote().await })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::capability::{Capability, ReportedPermissionHost};
    use crate::error::{Error, RemoteFetchError, SendError};
    use crate::inbound::{JsonUnitDecoder, RawUnit, JSON_FORMAT};
    use crate::relay::engine::{REASON_DECODE_INVALID, REASON_NOT_PERMITTED, REASON_NO_TARGET};
    use crate::relay::sender::OutboundSender;
    use crate::store::MemoryStore;
    use crate::target::{Provenance, RemoteConfigSource};

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl OutboundSender for RecordingSender {
        async fn send(&self, destination: &str, body: &str) -> std::result::Result<(), SendError> {
            self.sent
                .lock()
                .unwrap()
                .push((destination.to_string(), body.to_string()));
            Ok(())
        }
    }

    struct FixedRemote(&'static str);

    #[async_trait]
    impl RemoteConfigSource for FixedRemote {
        async fn fetch_target(&self) -> std::result::Result<String, RemoteFetchError> {
            Ok(self.0.to_string())
        }
    }

    /// Remote whose fetch never completes.
    struct HangingRemote {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RemoteConfigSource for HangingRemote {
        async fn fetch_target(&self) -> std::result::Result<String, RemoteFetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::future::pending().await
        }
    }

    struct Harness {
        service: RelayService,
        sender: Arc<RecordingSender>,
        host: Arc<ReportedPermissionHost>,
    }

    fn harness(
        granted: &[Capability],
        remote: Option<Arc<dyn RemoteConfigSource>>,
    ) -> Harness {
        let host = Arc::new(ReportedPermissionHost::with_granted(granted.iter().copied()));
        let gate = Arc::new(CapabilityGate::new(host.clone()));
        let resolver = Arc::new(ConfigResolver::new(
            Arc::new(MemoryStore::new()),
            remote,
            Duration::from_secs(3600),
        ));
        let sender = Arc::new(RecordingSender::default());
        let service = RelayService::new(
            gate,
            resolver,
            InboundBatchDecoder::new(Arc::new(JsonUnitDecoder)),
            RelayEngine::new(sender.clone()),
        );
        Harness {
            service,
            sender,
            host,
        }
    }

    fn unit(sender: &str, body: &str) -> RawUnit {
        RawUnit(
            serde_json::to_vec(&serde_json::json!({ "sender": sender, "body": body })).unwrap(),
        )
    }

    fn three_unit_batch() -> InboundBatch {
        InboundBatch::new(
            JSON_FORMAT,
            vec![unit("+1555", "one"), unit("", ""), unit("+1666", "three")],
        )
    }

    #[tokio::test]
    async fn relays_valid_units_to_saved_target() {
        let h = harness(&Capability::REQUIRED, None);
        h.service.save_address("+11234567890").await.unwrap();

        let outcomes = h.service.handle_inbound_event(three_unit_batch()).await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].success);
        assert!(!outcomes[1].record.valid);
        assert_eq!(outcomes[1].error_reason.as_deref(), Some(REASON_DECODE_INVALID));
        assert!(outcomes[2].success);
        assert_eq!(
            *h.sender.sent.lock().unwrap(),
            vec![
                ("+11234567890".to_string(), "Fwd from +1555: one".to_string()),
                ("+11234567890".to_string(), "Fwd from +1666: three".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn without_send_capability_nothing_is_sent() {
        let h = harness(&[Capability::Receive, Capability::Read], None);
        h.service.save_address("+11234567890").await.unwrap();

        let outcomes = h.service.handle_inbound_event(three_unit_batch()).await;

        assert!(h.sender.sent.lock().unwrap().is_empty());
        assert!(outcomes
            .iter()
            .all(|o| o.error_reason.as_deref() == Some(REASON_NOT_PERMITTED)));
    }

    #[tokio::test]
    async fn without_target_nothing_is_sent() {
        let h = harness(&Capability::REQUIRED, None);

        let outcomes = h.service.handle_inbound_event(three_unit_batch()).await;

        assert!(h.sender.sent.lock().unwrap().is_empty());
        assert!(outcomes
            .iter()
            .all(|o| o.error_reason.as_deref() == Some(REASON_NO_TARGET)));
    }

    #[tokio::test]
    async fn remote_target_is_used_after_refresh() {
        let h = harness(
            &Capability::REQUIRED,
            Some(Arc::new(FixedRemote("+15550001111"))),
        );
        h.service.save_address("+11234567890").await.unwrap();

        let status = h.service.refresh_remote().await.unwrap();
        assert!(matches!(status, FetchStatus::RemoteApplied { .. }));

        h.service
            .handle_inbound_event(InboundBatch::new(JSON_FORMAT, vec![unit("+1", "x")]))
            .await;
        assert_eq!(h.sender.sent.lock().unwrap()[0].0, "+15550001111");

        let view = h.service.current_target().await.unwrap();
        assert_eq!(view.target.provenance, Provenance::RemoteConfig);
        assert_eq!(view.display, "+15550001111 (Source: Remote Config)");
        assert_eq!(view.status_message, "Remote config fetched: Using remote number.");
    }

    #[tokio::test]
    async fn invalid_address_is_rejected() {
        let h = harness(&Capability::REQUIRED, None);
        let err = h.service.save_address("abc").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let view = h.service.current_target().await.unwrap();
        assert_eq!(view.display, "Not set");
    }

    #[tokio::test]
    async fn permission_result_enables_relay() {
        let h = harness(&[], None);
        h.service.save_address("+11234567890").await.unwrap();

        let outcome = h.service.request_capabilities().await;
        assert_eq!(outcome.requested.len(), 3);

        let snapshot = h
            .service
            .on_permission_result(&PermissionResult {
                grants: Capability::REQUIRED.iter().map(|c| (*c, true)).collect(),
                ..PermissionResult::default()
            })
            .await;
        assert!(snapshot.all_granted);
    }

    #[tokio::test]
    async fn padded_address_is_rejected() {
        let h = harness(&Capability::REQUIRED, None);
        let err = h.service.save_address(" +11234567890 ").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(h.service.current_target().await.unwrap().target.is_unset());
    }

    #[tokio::test]
    async fn revoked_send_stops_the_next_batch() {
        let h = harness(&Capability::REQUIRED, None);
        h.service.save_address("+11234567890").await.unwrap();
        h.service.request_capabilities().await;

        let first = h
            .service
            .handle_inbound_event(InboundBatch::new(JSON_FORMAT, vec![unit("+1", "a")]))
            .await;
        assert!(first[0].success);

        h.host
            .record(&PermissionResult {
                grants: [(Capability::Send, false)].into_iter().collect(),
                ..PermissionResult::default()
            })
            .await;

        let second = h
            .service
            .handle_inbound_event(InboundBatch::new(JSON_FORMAT, vec![unit("+1", "b")]))
            .await;
        assert_eq!(second[0].error_reason.as_deref(), Some(REASON_NOT_PERMITTED));
        assert!(!second[0].attempted);
        assert_eq!(h.sender.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn permanently_denied_send_is_not_permitted() {
        let h = harness(&[Capability::Receive, Capability::Read], None);
        h.service.save_address("+11234567890").await.unwrap();
        h.service
            .on_permission_result(&PermissionResult {
                grants: [(Capability::Send, false)].into_iter().collect(),
                rationale_suppressed: [(Capability::Send, true)].into_iter().collect(),
            })
            .await;

        let outcomes = h
            .service
            .handle_inbound_event(InboundBatch::new(JSON_FORMAT, vec![unit("+1", "a")]))
            .await;

        assert_eq!(outcomes[0].error_reason.as_deref(), Some(REASON_NOT_PERMITTED));
        assert_eq!(
            h.service.gate().require_send().await,
            Err(CapabilityError::PermissionPermanentlyDenied(Capability::Send))
        );
        assert!(h.sender.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn pending_remote_fetch_does_not_block_inbound() {
        let remote = Arc::new(HangingRemote {
            calls: AtomicUsize::new(0),
        });
        let h = harness(
            &Capability::REQUIRED,
            Some(remote.clone() as Arc<dyn RemoteConfigSource>),
        );
        h.service.save_address("+11234567890").await.unwrap();

        let in_flight = h.service.refresh_remote();
        // Let the spawned refresh reach the hanging fetch.
        while remote.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        let outcomes = tokio::time::timeout(
            Duration::from_secs(1),
            h.service
                .handle_inbound_event(InboundBatch::new(JSON_FORMAT, vec![unit("+1", "a")])),
        )
        .await
        .expect("inbound handling blocked on remote fetch");
        assert!(outcomes[0].success);
        assert_eq!(h.sender.sent.lock().unwrap()[0].0, "+11234567890");

        let second = h.service.refresh_remote().await.unwrap();
        assert_eq!(second, FetchStatus::Fetching);
        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);

        in_flight.abort();
    }
}
