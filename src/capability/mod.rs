//! Runtime capability gating for receive/read/send.

pub mod gate;
pub mod host;
pub mod state;

pub use gate::{CapabilityGate, CapabilitySnapshot, PermissionHost, PermissionResult, RequestOutcome};
pub use host::ReportedPermissionHost;
pub use state::{Capability, GrantState};
