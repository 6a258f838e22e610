//! Configuration for the following side.

use platsync_protocol::{join_url, GET_ALL_PLATFORMS};

/// Default address of the owner's bulk-fetch endpoint.
pub const DEFAULT_PEER_ADDRESS: &str = "http://localhost:666";

/// Configuration for the bulk-fetch client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Base address of the owning service.
    pub peer_address: String,
}

impl SyncConfig {
    /// Creates a configuration for the given owner address.
    pub fn new(peer_address: impl Into<String>) -> Self {
        Self {
            peer_address: peer_address.into(),
        }
    }

    /// Returns the full bulk-fetch URL.
    pub fn fetch_url(&self) -> String {
        join_url(&self.peer_address, GET_ALL_PLATFORMS)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PEER_ADDRESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_url() {
        let config = SyncConfig::new("http://platforms-clusterip-srv:666");
        assert_eq!(
            config.fetch_url(),
            "http://platforms-clusterip-srv:666/GrpcPlatform/GetAllPlatforms"
        );
        assert_eq!(SyncConfig::default().peer_address, "http://localhost:666");
    }
}
