//! Bulk-fetch client.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::repository::ExternalPlatform;
use platsync_protocol::{GetAllRequest, PlatformResponse, RpcClient};
use tracing::{info, warn};

/// Pulls the owner's full platform set with one request/response call.
///
/// There is no timeout and no retry: a failed call is reported once.
pub struct SyncClient<C> {
    client: C,
    config: SyncConfig,
}

impl<C: RpcClient> SyncClient<C> {
    /// Creates a client.
    pub fn new(client: C, config: SyncConfig) -> Self {
        Self { client, config }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Fetches every platform from the owner.
    pub fn try_fetch_all(&self) -> SyncResult<Vec<ExternalPlatform>> {
        if !self.client.is_healthy() {
            return Err(SyncError::NotConnected);
        }

        let url = self.config.fetch_url();
        info!(url = %url, "Calling owner for all platforms");
        let body = GetAllRequest::default().encode()?;
        let reply = self
            .client
            .call(&url, body)
            .map_err(SyncError::RemoteCallFailure)?;
        let response = PlatformResponse::decode(&reply)?;

        Ok(response
            .platforms
            .into_iter()
            .map(ExternalPlatform::from)
            .collect())
    }

    /// Fetches every platform from the owner, or nothing if the call fails.
    pub fn fetch_all(&self) -> Vec<ExternalPlatform> {
        match self.try_fetch_all() {
            Ok(platforms) => platforms,
            Err(e) => {
                warn!(
                    url = %self.config.fetch_url(),
                    error = %e,
                    "Could not call owner, continuing with no platforms"
                );
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use platsync_protocol::{MockRpcClient, PlatformWire};
    use std::sync::Arc;

    fn response() -> Vec<u8> {
        PlatformResponse::new(vec![
            PlatformWire {
                id: 1,
                name: "Dot Net".into(),
                publisher: "Microsoft".into(),
            },
            PlatformWire {
                id: 2,
                name: "SQL Server Express".into(),
                publisher: "Microsoft".into(),
            },
        ])
        .encode()
        .unwrap()
    }

    #[test]
    fn fetch_maps_wire_platforms() {
        let mock = Arc::new(MockRpcClient::new());
        mock.set_response(response());
        let client = SyncClient::new(Arc::clone(&mock), SyncConfig::new("http://owner:666"));

        let platforms = client.try_fetch_all().unwrap();

        assert_eq!(
            platforms,
            vec![
                ExternalPlatform::new(1, "Dot Net", "Microsoft"),
                ExternalPlatform::new(2, "SQL Server Express", "Microsoft"),
            ]
        );
        let calls = mock.calls();
        assert_eq!(calls[0].0, "http://owner:666/GrpcPlatform/GetAllPlatforms");
        assert_eq!(
            GetAllRequest::decode(&calls[0].1).unwrap(),
            GetAllRequest::default()
        );
    }

    #[test]
    fn unhealthy_client_is_not_called() {
        let mock = Arc::new(MockRpcClient::new());
        mock.set_healthy(false);
        let client = SyncClient::new(Arc::clone(&mock), SyncConfig::default());

        assert!(matches!(client.try_fetch_all(), Err(SyncError::NotConnected)));
        assert_eq!(mock.call_count(), 0);
    }

    #[test]
    fn failure_returns_empty_once() {
        let mock = Arc::new(MockRpcClient::new());
        mock.set_failure("connection refused");
        let client = SyncClient::new(Arc::clone(&mock), SyncConfig::default());

        assert!(client.fetch_all().is_empty());
        assert_eq!(mock.call_count(), 1);
    }

    #[test]
    fn garbage_response_returns_empty() {
        let mock = MockRpcClient::new();
        mock.set_response(vec![0xff, 0x00, 0x13]);
        let client = SyncClient::new(mock, SyncConfig::default());

        assert!(matches!(client.try_fetch_all(), Err(SyncError::Codec(_))));
        assert!(client.fetch_all().is_empty());
    }
}
