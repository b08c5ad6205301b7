//! Raw inbound units and the host decoding seam.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DecodeError;

/// Format tag handled by [`JsonUnitDecoder`].
pub const JSON_FORMAT: &str = "json";

/// One opaque protocol unit as delivered by the host.
///
/// Over the wire a unit is a JSON string (taken as UTF-8 bytes), an array of
/// byte values (taken verbatim), or any other JSON value (taken as its
/// serialized bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawUnit(pub Vec<u8>);

impl RawUnit {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for RawUnit {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for RawUnit {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl Serialize for RawUnit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match std::str::from_utf8(&self.0) {
            Ok(text) => serializer.serialize_str(text),
            Err(_) => self.0.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for RawUnit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::String(s) => Ok(Self(s.into_bytes())),
            serde_json::Value::Array(ref items) if is_byte_array(items) => Ok(Self(
                items
                    .iter()
                    .filter_map(|item| item.as_u64())
                    .map(|b| b as u8)
                    .collect(),
            )),
            other => serde_json::to_vec(&other)
                .map(Self)
                .map_err(serde::de::Error::custom),
        }
    }
}

/// A JSON array whose items are all integers in `0..=255`.
fn is_byte_array(items: &[serde_json::Value]) -> bool {
    items
        .iter()
        .all(|item| item.as_u64().is_some_and(|n| n <= u64::from(u8::MAX)))
}

/// Sender and body pulled out of one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedUnit {
    pub sender: String,
    pub body: String,
    pub timestamp_millis: Option<i64>,
}

impl DecodedUnit {
    pub fn is_empty(&self) -> bool {
        self.sender.is_empty() && self.body.is_empty()
    }
}

/// Host decoding subsystem: turns one opaque unit into sender and body.
pub trait UnitDecoder: Send + Sync {
    fn decode(&self, unit: &RawUnit, format: &str) -> Result<DecodedUnit, DecodeError>;
}

/// Decodes units that are JSON objects:
/// `{"sender": "...", "body": "...", "timestamp_millis": 0}`.
///
/// Missing fields read as empty.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonUnitDecoder;

#[derive(Deserialize)]
struct JsonUnit {
    #[serde(default, alias = "originating_address")]
    sender: Option<String>,
    #[serde(default, alias = "message_body")]
    body: Option<String>,
    #[serde(default)]
    timestamp_millis: Option<i64>,
}

impl UnitDecoder for JsonUnitDecoder {
    fn decode(&self, unit: &RawUnit, format: &str) -> Result<DecodedUnit, DecodeError> {
        if format != JSON_FORMAT {
            return Err(DecodeError::UnsupportedFormat(format.to_string()));
        }

        let parsed: JsonUnit = serde_json::from_slice(unit.as_bytes())
            .map_err(|e| DecodeError::Malformed(e.to_string()))?;

        Ok(DecodedUnit {
            sender: parsed.sender.unwrap_or_default(),
            body: parsed.body.unwrap_or_default(),
            timestamp_millis: parsed.timestamp_millis,
        })
    }
}
