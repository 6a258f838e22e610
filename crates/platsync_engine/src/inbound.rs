//! Inbound endpoint for the owner's synchronous push.

use platsync_protocol::{LoopbackServer, PlatformRecord, INBOUND_ACK, INBOUND_PLATFORMS};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Acknowledges pushes from the owner.
///
/// The push is a connectivity check: the body is logged, not stored. New
/// platforms reach the store through the broadcast channel.
#[derive(Default)]
pub struct InboundEndpoint {
    received: AtomicU64,
}

impl InboundEndpoint {
    /// Creates an endpoint.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of pushes acknowledged.
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }
}

impl LoopbackServer for InboundEndpoint {
    fn handle_call(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, String> {
        if path.trim_end_matches('/') != INBOUND_PLATFORMS {
            return Err(format!("no handler for path {path}"));
        }

        self.received.fetch_add(1, Ordering::Relaxed);
        match PlatformRecord::decode_json(body) {
            Ok(record) => info!(id = record.id, name = %record.name, "Inbound POST"),
            Err(_) => info!(bytes = body.len(), "Inbound POST"),
        }
        Ok(INBOUND_ACK.as_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acknowledges_push() {
        let endpoint = InboundEndpoint::new();
        let body = PlatformRecord::new(1, "Dot Net", "Microsoft", "Free")
            .encode_json()
            .unwrap();

        let reply = endpoint.handle_call("/api/c/platforms", &body).unwrap();

        assert_eq!(reply, INBOUND_ACK.as_bytes());
        assert_eq!(endpoint.received(), 1);
    }

    #[test]
    fn body_is_not_validated() {
        let endpoint = InboundEndpoint::new();
        assert!(endpoint.handle_call("/api/c/platforms/", b"").is_ok());
    }

    #[test]
    fn unknown_path_is_refused() {
        let endpoint = InboundEndpoint::new();
        assert!(endpoint.handle_call("/api/c/commands", b"").is_err());
        assert_eq!(endpoint.received(), 0);
    }
}
