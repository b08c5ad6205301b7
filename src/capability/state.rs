//! Capability grant state machine.

use serde::{Deserialize, Serialize};

/// A coarse-grained runtime permission gating relay activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Receive inbound text messages.
    Receive,
    /// Read message contents.
    Read,
    /// Send outbound text messages.
    Send,
}

impl Capability {
    /// All capabilities the relay needs to be fully operational.
    pub const REQUIRED: [Capability; 3] = [Self::Receive, Self::Read, Self::Send];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Receive => "receive",
            Self::Read => "read",
            Self::Send => "send",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Grant state of a single capability.
///
/// `Unrequested → {Granted, Denied, PermanentlyDenied}`; `Denied` may be
/// requested again. `PermanentlyDenied` only leaves through an out-of-band
/// settings change, observed as a fresh grant on the next host check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantState {
    Unrequested,
    Granted,
    Denied,
    PermanentlyDenied,
}

impl GrantState {
    /// State after the host reports the outcome of a request.
    ///
    /// `rationale_suppressed` is the host's signal that the user will not be
    /// asked again.
    pub fn from_result(granted: bool, rationale_suppressed: bool) -> Self {
        match (granted, rationale_suppressed) {
            (true, _) => Self::Granted,
            (false, true) => Self::PermanentlyDenied,
            (false, false) => Self::Denied,
        }
    }

    /// Whether a request prompt may be shown for this capability.
    pub fn is_requestable(&self) -> bool {
        matches!(self, Self::Unrequested | Self::Denied)
    }

    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted)
    }
}

impl Default for GrantState {
    fn default() -> Self {
        Self::Unrequested
    }
}

impl std::fmt::Display for GrantState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unrequested => "unrequested",
            Self::Granted => "granted",
            Self::Denied => "denied",
            Self::PermanentlyDenied => "permanently_denied",
        };
        write!(f, "{s}")
    }
}
