//! Change events broadcast on the fanout exchange.
//!
//! The wire form is a UTF-8 JSON object:
//!
//! ```text
//! { "Id": 1, "Name": "Kubernetes", "Publisher": "CNCF", "Cost": "Free",
//!   "Event": "Platform_Published" }
//! ```
//!
//! Consumers decode the `Event` discriminator first (see [`EventEnvelope`])
//! and only then the typed payload for the variant they recognise.

use crate::error::CodecResult;
use crate::record::{PlatformId, PlatformRecord};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discriminator value for [`EventKind::PlatformPublished`].
pub const PLATFORM_PUBLISHED: &str = "Platform_Published";

/// The closed set of event kinds this protocol knows about.
///
/// Any other discriminator decodes to [`EventKind::Unrecognized`] so that
/// consumers can log and discard it instead of failing to decode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    /// A platform was created by the owner.
    PlatformPublished,
    /// A discriminator not known to this build.
    Unrecognized(String),
}

impl EventKind {
    /// Returns the wire discriminator.
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::PlatformPublished => PLATFORM_PUBLISHED,
            EventKind::Unrecognized(value) => value,
        }
    }

    /// Returns true if this kind has a handler in this build.
    pub fn is_recognized(&self) -> bool {
        !matches!(self, EventKind::Unrecognized(_))
    }
}

impl From<String> for EventKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            PLATFORM_PUBLISHED => EventKind::PlatformPublished,
            _ => EventKind::Unrecognized(value),
        }
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::PlatformPublished => PLATFORM_PUBLISHED.to_string(),
            EventKind::Unrecognized(value) => value,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Only the discriminator of an event payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EventEnvelope {
    /// Event kind.
    pub event: EventKind,
}

impl EventEnvelope {
    /// Decodes the discriminator from a raw payload, ignoring all other fields.
    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Projection of a [`PlatformRecord`] published when the record is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PlatformPublishedEvent {
    /// Owner-assigned identifier.
    pub id: PlatformId,
    /// Platform name.
    pub name: String,
    /// Publishing organisation.
    pub publisher: String,
    /// Cost description.
    pub cost: String,
    /// Event discriminator, always [`EventKind::PlatformPublished`] when built
    /// from a record.
    pub event: EventKind,
}

impl PlatformPublishedEvent {
    /// Projects a record into its published event.
    pub fn from_record(record: &PlatformRecord) -> Self {
        Self {
            id: record.id,
            name: record.name.clone(),
            publisher: record.publisher.clone(),
            cost: record.cost.clone(),
            event: EventKind::PlatformPublished,
        }
    }

    /// Returns the record this event describes.
    pub fn to_record(&self) -> PlatformRecord {
        PlatformRecord::new(
            self.id,
            self.name.clone(),
            self.publisher.clone(),
            self.cost.clone(),
        )
    }

    /// Encodes to UTF-8 JSON.
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes from UTF-8 JSON.
    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl From<&PlatformRecord> for PlatformPublishedEvent {
    fn from(record: &PlatformRecord) -> Self {
        Self::from_record(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn kubernetes() -> PlatformRecord {
        PlatformRecord::new(1, "Kubernetes", "CNCF", "Free")
    }

    #[test]
    fn encodes_expected_wire_shape() {
        let event = PlatformPublishedEvent::from_record(&kubernetes());
        let json: serde_json::Value = serde_json::from_slice(&event.encode().unwrap()).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "Id": 1,
                "Name": "Kubernetes",
                "Publisher": "CNCF",
                "Cost": "Free",
                "Event": "Platform_Published"
            })
        );
    }

    #[test]
    fn envelope_reads_only_discriminator() {
        let envelope = EventEnvelope::decode(br#"{"Event":"Platform_Published","Id":"odd"}"#)
            .unwrap();
        assert_eq!(envelope.event, EventKind::PlatformPublished);
    }

    #[test]
    fn unknown_discriminator_is_preserved() {
        let envelope = EventEnvelope::decode(br#"{"Event":"Platform_Deleted"}"#).unwrap();
        assert_eq!(
            envelope.event,
            EventKind::Unrecognized("Platform_Deleted".into())
        );
        assert!(!envelope.event.is_recognized());
        assert_eq!(envelope.event.to_string(), "Platform_Deleted");
    }

    #[test]
    fn missing_discriminator_fails() {
        assert!(EventEnvelope::decode(br#"{"Id":1}"#).is_err());
    }

    #[test]
    fn invalid_utf8_fails() {
        let mut payload = br#"{"Event":"Platform_Published","Name":""#.to_vec();
        payload.extend_from_slice(&[0xff, 0xfe]);
        payload.extend_from_slice(br#""}"#);
        assert!(PlatformPublishedEvent::decode(&payload).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn decoded_event_matches_source_record(
            id in any::<i32>(),
            name in "\\PC{0,40}",
            publisher in "\\PC{0,40}",
            cost in "\\PC{0,16}",
        ) {
            let record = PlatformRecord::new(id, name, publisher, cost);
            let bytes = PlatformPublishedEvent::from(&record).encode().unwrap();
            let decoded = PlatformPublishedEvent::decode(&bytes).unwrap();

            prop_assert_eq!(&decoded.event, &EventKind::PlatformPublished);
            prop_assert_eq!(decoded.to_record(), record);
        }
    }
}
