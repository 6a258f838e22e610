//! The canonical platform record.

use crate::error::CodecResult;
use serde::{Deserialize, Serialize};

/// Identifier assigned to a platform by the owning store.
///
/// Followers treat it as opaque and only compare it for equality.
pub type PlatformId = i32;

/// A platform as stored by the owning service.
///
/// Records are immutable once created. The JSON form (`Id`, `Name`,
/// `Publisher`, `Cost`) is also the body of the owner's push to a follower.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PlatformRecord {
    /// Owner-assigned identifier.
    pub id: PlatformId,
    /// Platform name.
    pub name: String,
    /// Publishing organisation.
    pub publisher: String,
    /// Cost description (free text, e.g. "Free").
    pub cost: String,
}

impl PlatformRecord {
    /// Creates a record.
    pub fn new(
        id: PlatformId,
        name: impl Into<String>,
        publisher: impl Into<String>,
        cost: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            publisher: publisher.into(),
            cost: cost.into(),
        }
    }

    /// Encodes to JSON.
    pub fn encode_json(&self) -> CodecResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes from JSON.
    pub fn decode_json(bytes: &[u8]) -> CodecResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Input for creating a platform; the store assigns the identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPlatform {
    /// Platform name.
    pub name: String,
    /// Publishing organisation.
    pub publisher: String,
    /// Cost description.
    pub cost: String,
}

impl NewPlatform {
    /// Creates a new platform input.
    pub fn new(
        name: impl Into<String>,
        publisher: impl Into<String>,
        cost: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            publisher: publisher.into(),
            cost: cost.into(),
        }
    }

    /// Builds the stored record once an identifier has been assigned.
    pub fn into_record(self, id: PlatformId) -> PlatformRecord {
        PlatformRecord {
            id,
            name: self.name,
            publisher: self.publisher,
            cost: self.cost,
        }
    }
}
