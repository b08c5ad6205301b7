//! Relay: outbound senders, the per-batch engine and the service facade.

pub mod engine;
pub mod sender;
pub mod service;

pub use engine::{compose_payload, BatchSummary, RelayEngine, RelayOutcome};
pub use sender::{HttpSmsGateway, LogSender, OutboundSender};
pub use service::{RelayService, TargetView};
