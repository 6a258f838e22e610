//! Event publisher.
//!
//! Publishing is fail-open: an unavailable broker turns into a
//! [`PublishOutcome::Dropped`] and a warning, never into an error on the
//! caller's write path.

use crate::broker::BrokerConnector;
use crate::config::{BusConfig, FANOUT_ROUTING_KEY};
use crate::connection::BusConnection;
use crate::error::{BusError, BusResult};
use bytes::Bytes;
use platsync_protocol::PlatformPublishedEvent;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// What happened to a published event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The broker accepted the message.
    Sent {
        /// Size of the encoded body.
        bytes: usize,
    },
    /// The event was not sent and will not be retried.
    Dropped(BusError),
}

impl PublishOutcome {
    /// Returns true if the broker accepted the message.
    pub fn is_sent(&self) -> bool {
        matches!(self, PublishOutcome::Sent { .. })
    }
}

/// Publisher counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublisherStats {
    /// Events accepted by the broker.
    pub published: u64,
    /// Events dropped.
    pub dropped: u64,
}

/// Publishes platform events to the fanout exchange.
///
/// Safe to share between tasks; publishes are serialised by the connection.
pub struct EventPublisher {
    connection: BusConnection,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl EventPublisher {
    /// Creates a publisher over an existing connection.
    pub fn new(connection: BusConnection) -> Self {
        Self {
            connection,
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Creates a publisher with its own connection.
    pub fn with_connector(connector: Arc<dyn BrokerConnector>, config: BusConfig) -> Self {
        Self::new(BusConnection::new(connector, config))
    }

    /// Returns the underlying connection.
    pub fn connection(&self) -> &BusConnection {
        &self.connection
    }

    /// Encodes and publishes an event, returning the body size.
    pub async fn try_publish(&self, event: &PlatformPublishedEvent) -> BusResult<usize> {
        let body = event.encode().map_err(BusError::encode)?;
        let bytes = body.len();
        self.connection
            .publish(FANOUT_ROUTING_KEY, Bytes::from(body))
            .await?;
        Ok(bytes)
    }

    /// Publishes an event, connecting first if needed.
    ///
    /// Never fails; see [`PublishOutcome`].
    pub async fn publish(&self, event: &PlatformPublishedEvent) -> PublishOutcome {
        match self.try_publish(event).await {
            Ok(bytes) => {
                self.published.fetch_add(1, Ordering::Relaxed);
                debug!(
                    id = event.id,
                    name = %event.name,
                    event = %event.event,
                    bytes,
                    "Event sent"
                );
                PublishOutcome::Sent { bytes }
            }
            Err(e) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(id = event.id, error = %e, "Event dropped, message bus unavailable");
                PublishOutcome::Dropped(e)
            }
        }
    }

    /// Returns the counters.
    pub fn stats(&self) -> PublisherStats {
        PublisherStats {
            published: self.published.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    /// Closes the connection. The next publish reconnects.
    pub async fn shutdown(&self) {
        self.connection.close().await;
    }
}
