//! Best-effort synchronous push of new platforms to a follower.

use crate::config::PushConfig;
use crate::error::{ServerError, ServerResult};
use platsync_protocol::{PlatformRecord, RpcClient};
use tracing::{debug, warn};

/// What happened to a push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// The follower answered.
    Delivered {
        /// The follower's response body.
        response: String,
    },
    /// The push failed and will not be retried.
    Failed(String),
}

impl PushOutcome {
    /// Returns true if the follower answered.
    pub fn is_delivered(&self) -> bool {
        matches!(self, PushOutcome::Delivered { .. })
    }
}

/// Posts new records to the follower's inbound endpoint.
pub struct CommandPushClient<C> {
    client: C,
    config: PushConfig,
}

impl<C: RpcClient> CommandPushClient<C> {
    /// Creates a push client.
    pub fn new(client: C, config: PushConfig) -> Self {
        Self { client, config }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &PushConfig {
        &self.config
    }

    /// Posts one record and returns the follower's response.
    pub fn try_send_platform(&self, record: &PlatformRecord) -> ServerResult<String> {
        let body = record.encode_json()?;
        let url = self.config.push_url();
        let response = self
            .client
            .call(&url, body)
            .map_err(ServerError::RemoteCall)?;
        Ok(String::from_utf8_lossy(&response).into_owned())
    }

    /// Posts one record. Never fails; see [`PushOutcome`].
    pub fn send_platform(&self, record: &PlatformRecord) -> PushOutcome {
        match self.try_send_platform(record) {
            Ok(response) => {
                debug!(id = record.id, response = %response, "Sync push to follower was OK");
                PushOutcome::Delivered { response }
            }
            Err(e) => {
                warn!(
                    id = record.id,
                    url = %self.config.push_url(),
                    error = %e,
                    "Could not push platform synchronously"
                );
                PushOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use platsync_protocol::{MockRpcClient, INBOUND_ACK};
    use std::sync::Arc;

    fn record() -> PlatformRecord {
        PlatformRecord::new(4, "Kubernetes", "CNCF", "Free")
    }

    #[test]
    fn posts_json_record_to_inbound_path() {
        let mock = Arc::new(MockRpcClient::new());
        mock.set_response(INBOUND_ACK.as_bytes().to_vec());
        let client = CommandPushClient::new(Arc::clone(&mock), PushConfig::new("http://commands:80"));

        let outcome = client.send_platform(&record());

        assert_eq!(
            outcome,
            PushOutcome::Delivered {
                response: INBOUND_ACK.to_string()
            }
        );
        let calls = mock.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "http://commands:80/api/c/platforms");
        assert_eq!(PlatformRecord::decode_json(&calls[0].1).unwrap(), record());
    }

    #[test]
    fn failure_is_contained_and_not_retried() {
        let mock = Arc::new(MockRpcClient::new());
        mock.set_healthy(false);
        let client = CommandPushClient::new(Arc::clone(&mock), PushConfig::default());

        let outcome = client.send_platform(&record());

        assert!(matches!(outcome, PushOutcome::Failed(_)));
        assert_eq!(mock.call_count(), 1);
    }

    #[test]
    fn try_send_reports_remote_error() {
        let mock = MockRpcClient::new();
        mock.set_failure("503 Service Unavailable");
        let client = CommandPushClient::new(mock, PushConfig::default());

        let err = client.try_send_platform(&record()).unwrap_err();
        assert!(matches!(err, ServerError::RemoteCall(_)));
    }
}
