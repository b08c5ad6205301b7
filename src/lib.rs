//! SMS Relay: forwards inbound text messages to a configured destination.

pub mod api;
pub mod capability;
pub mod config;
pub mod error;
pub mod inbound;
pub mod relay;
pub mod store;
pub mod target;
