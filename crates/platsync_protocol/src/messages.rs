//! Messages for the point-to-point calls.
//!
//! `GetAllPlatforms` bodies are CBOR. The response carries `Id`, `Name` and
//! `Publisher` only; cost is not part of this wire shape.
//!
//! The owner's push to a follower posts a JSON [`PlatformRecord`] to
//! [`INBOUND_PLATFORMS`] and gets [`INBOUND_ACK`] back as plain text.

use crate::error::{CodecError, CodecResult};
use crate::record::{PlatformId, PlatformRecord};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Path of the bulk-fetch call on the owning service.
pub const GET_ALL_PLATFORMS: &str = "/GrpcPlatform/GetAllPlatforms";

/// Path of the follower's inbound endpoint for pushed platforms.
pub const INBOUND_PLATFORMS: &str = "/api/c/platforms";

/// Body the follower answers a push with.
pub const INBOUND_ACK: &str = "Inbound test ok from Platforms Controller";

/// Bulk-fetch request. Carries no fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetAllRequest {}

impl GetAllRequest {
    /// Encodes to CBOR.
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        to_cbor(self)
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        from_cbor(bytes)
    }
}

/// One platform in a bulk-fetch response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PlatformWire {
    /// Owner-assigned identifier.
    pub id: PlatformId,
    /// Platform name.
    pub name: String,
    /// Publishing organisation.
    pub publisher: String,
}

impl From<&PlatformRecord> for PlatformWire {
    fn from(record: &PlatformRecord) -> Self {
        Self {
            id: record.id,
            name: record.name.clone(),
            publisher: record.publisher.clone(),
        }
    }
}

/// Bulk-fetch response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformResponse {
    /// Every platform known to the owner at the time of the call.
    #[serde(rename = "Platform")]
    pub platforms: Vec<PlatformWire>,
}

impl PlatformResponse {
    /// Creates a response from wire platforms.
    pub fn new(platforms: Vec<PlatformWire>) -> Self {
        Self { platforms }
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        to_cbor(self)
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        from_cbor(bytes)
    }
}

fn to_cbor<T: Serialize>(value: &T) -> CodecResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| CodecError::CborEncode(e.to_string()))?;
    Ok(buf)
}

fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    ciborium::from_reader(bytes).map_err(|e| CodecError::CborDecode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_drops_cost() {
        let record = PlatformRecord::new(2, "Dot Net", "Microsoft", "Free");
        let wire = PlatformWire::from(&record);
        assert_eq!(wire.id, 2);
        assert_eq!(wire.name, "Dot Net");
        assert_eq!(wire.publisher, "Microsoft");
    }

    #[test]
    fn response_roundtrip() {
        let response = PlatformResponse::new(vec![
            PlatformWire {
                id: 2,
                name: "Dot Net".into(),
                publisher: "Microsoft".into(),
            },
            PlatformWire {
                id: 3,
                name: "SQL Server Express".into(),
                publisher: "Microsoft".into(),
            },
        ]);

        let decoded = PlatformResponse::decode(&response.encode().unwrap()).unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn empty_request_roundtrip() {
        let bytes = GetAllRequest::default().encode().unwrap();
        assert_eq!(GetAllRequest::decode(&bytes).unwrap(), GetAllRequest {});
    }

    #[test]
    fn malformed_response_is_decode_error() {
        let err = PlatformResponse::decode(&[0xff, 0x00, 0x13]).unwrap_err();
        assert!(err.is_decode());
    }
}
