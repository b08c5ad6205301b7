//! Inbound message decoding.

pub mod batch;
pub mod unit;

pub use batch::{InboundBatch, InboundBatchDecoder, InboundRecord};
pub use unit::{DecodedUnit, JsonUnitDecoder, RawUnit, UnitDecoder, JSON_FORMAT};
