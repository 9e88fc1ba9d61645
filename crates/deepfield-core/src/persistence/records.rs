//! Durable record types.
//!
//! Records carry an opaque JSON payload owned by the embedding game. The
//! save service only needs the identifying fields; migrations may rewrite
//! the payload as a JSON tree.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// JSON bytes stored verbatim inside a save bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpaquePayload(Vec<u8>);

impl OpaquePayload {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Encode a typed value.
    pub fn encode<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_vec(value).map(Self)
    }

    /// Decode into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.0)
    }

    /// Parse as a JSON tree. An empty payload reads as `null`.
    pub fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        if self.0.is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_slice(&self.0)
    }

    pub fn from_value(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        Self::encode(value)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Per-player durable state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerPersistentRecord {
    pub schema_version: u16,
    pub player_id: String,
    pub payload: OpaquePayload,
}

impl PlayerPersistentRecord {
    pub fn new(schema_version: u16, player_id: impl Into<String>, payload: OpaquePayload) -> Self {
        Self {
            schema_version,
            player_id: player_id.into(),
            payload,
        }
    }
}

/// Per-star-system durable state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldPersistentRecord {
    pub schema_version: u16,
    pub system_id: String,
    pub payload: OpaquePayload,
}

impl WorldPersistentRecord {
    pub fn new(schema_version: u16, system_id: impl Into<String>, payload: OpaquePayload) -> Self {
        Self {
            schema_version,
            system_id: system_id.into(),
            payload,
        }
    }
}

/// The two records written together into one slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleBody {
    pub player: PlayerPersistentRecord,
    pub world: WorldPersistentRecord,
}

/// A validated bundle as read from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveBundle {
    /// Schema version the bundle was written with.
    pub schema_version: u16,
    /// Write time in milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
    pub checksum: [u8; 32],
    pub player: PlayerPersistentRecord,
    pub world: WorldPersistentRecord,
}
