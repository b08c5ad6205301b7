//! Relay engine: turns decoded records into outbound sends.
//!
//! Batch preconditions are checked once: without the send capability or a
//! destination nothing is sent. Past that point every record is handled on
//! its own and a failed send never stops the rest of the batch.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::sender::OutboundSender;
use crate::inbound::InboundRecord;
use crate::target::TargetAddress;

/// Outcome reason when the send capability is not granted.
pub const REASON_NOT_PERMITTED: &str = "not-permitted";
/// Outcome reason when no destination is configured.
pub const REASON_NO_TARGET: &str = "no-target";
/// Outcome reason for a unit that failed to decode or was empty.
pub const REASON_DECODE_INVALID: &str = "decode-invalid";

/// Result of relaying one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayOutcome {
    pub record: InboundRecord,
    /// Whether a send was handed to the outbound sender.
    pub attempted: bool,
    pub success: bool,
    pub error_reason: Option<String>,
}

impl RelayOutcome {
    fn sent(record: InboundRecord) -> Self {
        Self {
            record,
            attempted: true,
            success: true,
            error_reason: None,
        }
    }

    fn send_failed(record: InboundRecord, reason: impl Into<String>) -> Self {
        Self {
            record,
            attempted: true,
            success: false,
            error_reason: Some(reason.into()),
        }
    }

    fn skipped(record: InboundRecord, reason: &str) -> Self {
        Self {
            record,
            attempted: false,
            success: false,
            error_reason: Some(reason.to_string()),
        }
    }
}

/// Counts over a batch of outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    /// Records a send was attempted for.
    pub attempted: usize,
    pub sent: usize,
    /// Attempted sends that failed.
    pub failed: usize,
    /// Records skipped without a send attempt.
    pub skipped: usize,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[RelayOutcome]) -> Self {
        let mut summary = Self {
            total: outcomes.len(),
            ..Self::default()
        };
        for outcome in outcomes {
            match (outcome.attempted, outcome.success) {
                (false, _) => summary.skipped += 1,
                (true, true) => {
                    summary.attempted += 1;
                    summary.sent += 1;
                }
                (true, false) => {
                    summary.attempted += 1;
                    summary.failed += 1;
                }
            }
        }
        summary
    }
}

/// Outbound relay payload for one record.
pub fn compose_payload(record: &InboundRecord) -> String {
    format!("Fwd from {}: {}", record.sender, record.body)
}

pub struct RelayEngine {
    sender: Arc<dyn OutboundSender>,
}

impl RelayEngine {
    pub fn new(sender: Arc<dyn OutboundSender>) -> Self {
        Self { sender }
    }

    /// Relay a decoded batch to `target`, one outcome per record in order.
    pub async fn relay_batch(
        &self,
        records: Vec<InboundRecord>,
        target: &TargetAddress,
        send_allowed: bool,
    ) -> Vec<RelayOutcome> {
        if !send_allowed {
            warn!(count = records.len(), "Send capability not granted, skipping batch");
            return skip_all(records, REASON_NOT_PERMITTED);
        }
        if target.is_unset() {
            warn!(count = records.len(), "No destination configured, skipping batch");
            return skip_all(records, REASON_NO_TARGET);
        }

        let mut outcomes = Vec::with_capacity(records.len());
        for record in records {
            if !record.valid {
                debug!(part_index = record.part_index, "Skipping invalid record");
                outcomes.push(RelayOutcome::skipped(record, REASON_DECODE_INVALID));
                continue;
            }

            let payload = compose_payload(&record);
            match self.sender.send(&target.value, &payload).await {
                Ok(()) => {
                    info!(
                        part_index = record.part_index,
                        sender = %record.sender,
                        to = %target.value,
                        "Relayed message"
                    );
                    outcomes.push(RelayOutcome::sent(record));
                }
                Err(e) => {
                    warn!(
                        part_index = record.part_index,
                        to = %target.value,
                        error = %e,
                        "Failed to relay message"
                    );
                    outcomes.push(RelayOutcome::send_failed(record, e.to_string()));
                }
            }
        }
        outcomes
    }
}

fn skip_all(records: Vec<InboundRecord>, reason: &str) -> Vec<RelayOutcome> {
    records
        .into_iter()
        .map(|record| RelayOutcome::skipped(record, reason))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::SendError;
    use crate::target::Provenance;

    /// Records every send; fails bodies containing `fail_on`.
    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<(String, String)>>,
        fail_on: Option<&'static str>,
    }

    impl RecordingSender {
        fn failing_on(marker: &'static str) -> Self {
            Self {
                fail_on: Some(marker),
                ..Self::default()
            }
        }

        fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl OutboundSender for RecordingSender {
        async fn send(&self, destination: &str, body: &str) -> Result<(), SendError> {
            self.sent
                .lock()
                .unwrap()
                .push((destination.to_string(), body.to_string()));
            match self.fail_on {
                Some(marker) if body.contains(marker) => {
                    Err(SendError::Other("radio off".into()))
                }
                _ => Ok(()),
            }
        }
    }

    /// Gateway whose error text happens to equal a skip reason.
    struct CollidingSender;

    #[async_trait]
    impl OutboundSender for CollidingSender {
        async fn send(&self, _destination: &str, _body: &str) -> Result<(), SendError> {
            Err(SendError::Other(REASON_NO_TARGET.into()))
        }
    }

    fn record(i: usize, sender: &str, body: &str, valid: bool) -> InboundRecord {
        InboundRecord {
            sender: sender.into(),
            body: body.into(),
            part_index: i,
            timestamp_millis: None,
            valid,
            decode_error: None,
        }
    }

    fn target() -> TargetAddress {
        TargetAddress::new("+11234567890", Provenance::UserSet)
    }

    #[tokio::test]
    async fn sends_only_valid_records_in_order() {
        let sender = Arc::new(RecordingSender::default());
        let engine = RelayEngine::new(sender.clone());
        let records = vec![
            record(0, "+1555", "one", true),
            record(1, "", "", false),
            record(2, "+1555", "three", true),
        ];

        let outcomes = engine.relay_batch(records, &target(), true).await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].success);
        assert_eq!(outcomes[1].error_reason.as_deref(), Some(REASON_DECODE_INVALID));
        assert!(outcomes[2].success);
        assert_eq!(
            sender.sent(),
            vec![
                ("+11234567890".to_string(), "Fwd from +1555: one".to_string()),
                ("+11234567890".to_string(), "Fwd from +1555: three".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn send_failure_does_not_stop_batch() {
        let sender = Arc::new(RecordingSender::failing_on("boom"));
        let engine = RelayEngine::new(sender.clone());
        let records = vec![
            record(0, "+1", "boom", true),
            record(1, "+1", "fine", true),
            record(2, "+1", "also fine", true),
        ];

        let outcomes = engine.relay_batch(records, &target(), true).await;

        assert_eq!(sender.sent().len(), 3);
        assert!(!outcomes[0].success);
        assert_eq!(outcomes[0].error_reason.as_deref(), Some("radio off"));
        assert!(outcomes[1].success);
        assert!(outcomes[2].success);
    }

    #[tokio::test]
    async fn not_permitted_sends_nothing() {
        let sender = Arc::new(RecordingSender::default());
        let engine = RelayEngine::new(sender.clone());
        let records = vec![record(0, "+1", "a", true), record(1, "+1", "b", true)];

        let outcomes = engine.relay_batch(records, &target(), false).await;

        assert!(sender.sent().is_empty());
        assert!(outcomes
            .iter()
            .all(|o| o.error_reason.as_deref() == Some(REASON_NOT_PERMITTED)));
    }

    #[tokio::test]
    async fn not_permitted_takes_precedence_over_missing_target() {
        let engine = RelayEngine::new(Arc::new(RecordingSender::default()));
        let outcomes = engine
            .relay_batch(vec![record(0, "+1", "a", true)], &TargetAddress::unset(), false)
            .await;
        assert_eq!(outcomes[0].error_reason.as_deref(), Some(REASON_NOT_PERMITTED));
    }

    #[tokio::test]
    async fn unset_target_sends_nothing() {
        let sender = Arc::new(RecordingSender::default());
        let engine = RelayEngine::new(sender.clone());

        let outcomes = engine
            .relay_batch(vec![record(0, "+1", "a", true)], &TargetAddress::unset(), true)
            .await;

        assert!(sender.sent().is_empty());
        assert_eq!(outcomes[0].error_reason.as_deref(), Some(REASON_NO_TARGET));
    }

    #[test]
    fn summary_counts_outcomes() {
        let outcomes = vec![
            RelayOutcome::sent(record(0, "+1", "a", true)),
            RelayOutcome::skipped(record(1, "", "", false), REASON_DECODE_INVALID),
            RelayOutcome::send_failed(record(2, "+1", "c", true), "radio off"),
        ];
        assert_eq!(
            BatchSummary::from_outcomes(&outcomes),
            BatchSummary {
                total: 3,
                attempted: 2,
                sent: 1,
                failed: 1,
                skipped: 1,
            }
        );
    }

    #[tokio::test]
    async fn gateway_error_matching_a_skip_reason_counts_as_failed() {
        let engine = RelayEngine::new(Arc::new(CollidingSender));

        let outcomes = engine
            .relay_batch(vec![record(0, "+1", "a", true)], &target(), true)
            .await;
        assert_eq!(outcomes[0].error_reason.as_deref(), Some(REASON_NO_TARGET));
        assert!(outcomes[0].attempted);

        let summary = BatchSummary::from_outcomes(&outcomes);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 0);
    }

    #[tokio::test]
    async fn skipped_records_are_not_attempted() {
        let engine = RelayEngine::new(Arc::new(RecordingSender::default()));
        let outcomes = engine
            .relay_batch(vec![record(0, "+1", "a", true)], &target(), false)
            .await;
        assert!(!outcomes[0].attempted);
        assert_eq!(BatchSummary::from_outcomes(&outcomes).skipped, 1);
    }

    #[test]
    fn payload_format() {
        assert_eq!(
            compose_payload(&record(0, "+1555", "hello", true)),
            "Fwd from +1555: hello"
        );
    }
}
