//! Destination address model and its persisted form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which configuration source produced the active destination address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Centrally-managed remote configuration.
    RemoteConfig,
    /// Saved by the user on this device.
    UserSet,
    /// A persisted value whose source was never recorded.
    LocalFallback,
    /// Nothing configured; relay is impossible.
    Unset,
}

impl Provenance {
    /// Tag stored in the `phone_number_source` field.
    pub fn as_tag(&self) -> &'static str {
        match self {
            Self::RemoteConfig => "remote_config",
            Self::UserSet => "local_user_set",
            Self::LocalFallback => "local_fallback",
            Self::Unset => "unset",
        }
    }

    /// Parse a stored source tag. Missing or unrecognised tags (including
    /// the `local_fallback_after_*` variants) read as `LocalFallback`.
    pub fn from_tag(tag: Option<&str>) -> Self {
        match tag {
            Some("remote_config") => Self::RemoteConfig,
            Some("local_user_set") => Self::UserSet,
            _ => Self::LocalFallback,
        }
    }

    /// Human label, e.g. "Remote Config".
    pub fn label(&self) -> String {
        self.as_tag()
            .split('_')
            .filter(|w| !w.is_empty())
            .map(|w| {
                let mut chars = w.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// The active relay destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetAddress {
    pub value: String,
    pub provenance: Provenance,
    /// When the value was last written. `None` for `Unset`.
    pub updated_at: Option<DateTime<Utc>>,
}

impl TargetAddress {
    pub fn new(value: impl Into<String>, provenance: Provenance) -> Self {
        Self {
            value: value.into(),
            provenance,
            updated_at: Some(Utc::now()),
        }
    }

    pub fn unset() -> Self {
        Self {
            value: String::new(),
            provenance: Provenance::Unset,
            updated_at: None,
        }
    }

    pub fn is_unset(&self) -> bool {
        self.provenance == Provenance::Unset
    }

    /// Settings-screen label: `"+11234567890 (Source: Local User Set)"` or
    /// `"Not set"`.
    pub fn display(&self) -> String {
        if self.is_unset() || self.value.trim().is_empty() {
            "Not set".to_string()
        } else {
            format!("{} (Source: {})", self.value, self.provenance.label())
        }
    }

    /// Same value and source, ignoring the write timestamp.
    pub fn same_as(&self, other: &TargetAddress) -> bool {
        self.value == other.value && self.provenance == other.provenance
    }
}

/// On-disk record stored under a single key so that one write replaces the
/// whole address atomically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PersistedTarget {
    pub target_phone_number: String,
    #[serde(default)]
    pub phone_number_source: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl PersistedTarget {
    pub fn into_target(self) -> TargetAddress {
        if self.target_phone_number.trim().is_empty() {
            return TargetAddress::unset();
        }
        TargetAddress {
            provenance: Provenance::from_tag(self.phone_number_source.as_deref()),
            value: self.target_phone_number,
            updated_at: self.updated_at,
        }
    }
}

impl From<&TargetAddress> for PersistedTarget {
    fn from(target: &TargetAddress) -> Self {
        Self {
            target_phone_number: target.value.clone(),
            phone_number_source: Some(target.provenance.as_tag().to_string()),
            updated_at: target.updated_at,
        }
    }
}
