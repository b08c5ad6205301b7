//! Batch decoding: one inbound event in, one record per unit out.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::unit::{RawUnit, UnitDecoder};

/// An inbound event as delivered by the host: zero or more units sharing a
/// format tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundBatch {
    pub format: String,
    #[serde(default)]
    pub units: Vec<RawUnit>,
}

impl InboundBatch {
    pub fn new(format: impl Into<String>, units: Vec<RawUnit>) -> Self {
        Self {
            format: format.into(),
            units,
        }
    }
}

/// One decoded unit. Invalid units stay in the batch with `valid == false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundRecord {
    pub sender: String,
    pub body: String,
    /// Position of the unit within its batch.
    pub part_index: usize,
    pub timestamp_millis: Option<i64>,
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decode_error: Option<String>,
}

impl InboundRecord {
    fn invalid(part_index: usize, reason: String) -> Self {
        Self {
            sender: String::new(),
            body: String::new(),
            part_index,
            timestamp_millis: None,
            valid: false,
            decode_error: Some(reason),
        }
    }
}

/// Turns a batch of opaque units into records, in input order.
pub struct InboundBatchDecoder {
    decoder: Arc<dyn UnitDecoder>,
}

impl InboundBatchDecoder {
    pub fn new(decoder: Arc<dyn UnitDecoder>) -> Self {
        Self { decoder }
    }

    /// Decode every unit. A failed unit becomes an invalid record and never
    /// aborts the rest. Multi-part messages are not reassembled.
    pub fn decode(&self, batch: &InboundBatch) -> Vec<InboundRecord> {
        batch
            .units
            .iter()
            .enumerate()
            .map(|(part_index, unit)| self.decode_unit(part_index, unit, &batch.format))
            .collect()
    }

    fn decode_unit(&self, part_index: usize, unit: &RawUnit, format: &str) -> InboundRecord {
        match self.decoder.decode(unit, format) {
            Ok(decoded) if decoded.is_empty() => {
                debug!(part_index, "Unit has neither sender nor body");
                InboundRecord {
                    sender: decoded.sender,
                    body: decoded.body,
                    part_index,
                    timestamp_millis: decoded.timestamp_millis,
                    valid: false,
                    decode_error: None,
                }
            }
            Ok(decoded) => {
                debug!(
                    part_index,
                    sender = %decoded.sender,
                    body_len = decoded.body.len(),
                    timestamp_millis = ?decoded.timestamp_millis,
                    "Decoded unit"
                );
                InboundRecord {
                    sender: decoded.sender,
                    body: decoded.body,
                    part_index,
                    timestamp_millis: decoded.timestamp_millis,
                    valid: true,
                    decode_error: None,
                }
            }
            Err(e) => {
                warn!(part_index, format, error = %e, "Failed to decode unit");
                InboundRecord::invalid(part_index, e.to_string())
            }
        }
    }
}
