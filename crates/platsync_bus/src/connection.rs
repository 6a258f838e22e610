//! Shared broker connection.
//!
//! A [`BusConnection`] owns one link and one channel. Every operation takes the
//! same async mutex, so publishes are serialised on the channel and two callers
//! racing to connect produce a single link.

use crate::broker::{
    BrokerChannel, BrokerConnector, BrokerLink, DeliveryStream, ExchangeKind, ShutdownEvent,
    ShutdownInitiator,
};
use crate::config::{BusConfig, FANOUT_ROUTING_KEY};
use crate::error::{BusError, BusResult};
use crate::state::ConnectionState;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

/// A lazily (re)connecting connection to the message bus.
pub struct BusConnection {
    connector: Arc<dyn BrokerConnector>,
    config: BusConfig,
    inner: Arc<Mutex<ConnectionInner>>,
}

struct ConnectionInner {
    state: ConnectionState,
    link: Option<Box<dyn BrokerLink>>,
    channel: Option<Box<dyn BrokerChannel>>,
    /// Incremented on every successful connect.
    generation: u64,
}

impl ConnectionInner {
    /// `Connected` requires both handles open; anything else reads as
    /// `Disconnected`.
    fn effective_state(&self) -> ConnectionState {
        if self.state != ConnectionState::Connected {
            return self.state;
        }
        match (&self.link, &self.channel) {
            (Some(link), Some(channel)) if link.is_open() && channel.is_open() => {
                ConnectionState::Connected
            }
            _ => ConnectionState::Disconnected,
        }
    }

    fn is_ready(&self) -> bool {
        self.effective_state().is_connected()
    }
}

impl BusConnection {
    /// Creates a disconnected connection. Nothing is opened until first use.
    pub fn new(connector: Arc<dyn BrokerConnector>, config: BusConfig) -> Self {
        Self {
            connector,
            config,
            inner: Arc::new(Mutex::new(ConnectionInner {
                state: ConnectionState::Disconnected,
                link: None,
                channel: None,
                generation: 0,
            })),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Returns the current state.
    pub async fn state(&self) -> ConnectionState {
        self.inner.lock().await.effective_state()
    }

    /// Returns true if publish and consume may proceed.
    pub async fn is_connected(&self) -> bool {
        self.inner.lock().await.is_ready()
    }

    /// Returns the number of links opened over the lifetime of this connection.
    pub async fn connections_opened(&self) -> u64 {
        self.inner.lock().await.generation
    }

    /// Opens link and channel and declares the exchange.
    ///
    /// Does nothing when already connected. On failure the state is left
    /// `Disconnected`.
    pub async fn connect(&self) -> BusResult<()> {
        let mut inner = self.inner.lock().await;
        self.ensure_connected(&mut inner).await
    }

    /// Closes channel and link. Closing a closed connection succeeds.
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        if inner.link.is_none() && inner.channel.is_none() {
            inner.state = ConnectionState::Disconnected;
            return;
        }

        inner.state = ConnectionState::ClosingByApplication;
        if let Some(channel) = inner.channel.take() {
            if let Err(e) = channel.close().await {
                debug!(error = %e, "Channel close failed");
            }
        }
        if let Some(link) = inner.link.take() {
            if let Err(e) = link.close().await {
                debug!(error = %e, "Link close failed");
            }
        }
        inner.state = ConnectionState::Disconnected;
        info!(exchange = %self.config.exchange, "Message bus connection closed");
    }

    /// Publishes a body to the configured exchange, connecting first if needed.
    ///
    /// Makes exactly one connect attempt.
    pub async fn publish(&self, routing_key: &str, body: Bytes) -> BusResult<()> {
        let mut inner = self.inner.lock().await;
        self.ensure_connected(&mut inner).await?;

        let channel = inner.channel.as_ref().ok_or(BusError::ChannelClosed)?;
        let result = channel
            .publish(&self.config.exchange, routing_key, body)
            .await;
        if result.is_err() && !inner.is_ready() {
            inner.state = ConnectionState::Disconnected;
        }
        result
    }

    /// Declares an anonymous exclusive queue bound to the exchange and returns
    /// its name. Connects first if needed.
    pub async fn declare_bound_queue(&self) -> BusResult<String> {
        let mut inner = self.inner.lock().await;
        self.ensure_connected(&mut inner).await?;

        let channel = inner.channel.as_ref().ok_or(BusError::ChannelClosed)?;
        let queue = channel.queue_declare_anonymous().await?;
        channel
            .queue_bind(&queue, &self.config.exchange, FANOUT_ROUTING_KEY)
            .await?;
        debug!(queue = %queue, exchange = %self.config.exchange, "Queue bound");
        Ok(queue)
    }

    /// Starts an auto-ack consumer on a queue declared by this connection.
    ///
    /// Does not reconnect: a queue declared on an earlier link no longer exists.
    pub async fn consume(&self, queue: &str) -> BusResult<DeliveryStream> {
        let inner = self.inner.lock().await;
        if !inner.is_ready() {
            return Err(BusError::ChannelClosed);
        }
        let channel = inner.channel.as_ref().ok_or(BusError::ChannelClosed)?;
        channel.consume_auto_ack(queue).await
    }

    async fn ensure_connected(&self, inner: &mut ConnectionInner) -> BusResult<()> {
        if inner.is_ready() {
            return Ok(());
        }

        // Handles left over from a dead link or a refused channel.
        if let Some(channel) = inner.channel.take() {
            let _ = channel.close().await;
        }
        if let Some(link) = inner.link.take() {
            let _ = link.close().await;
        }

        inner.state = ConnectionState::Connecting;
        let endpoint = self.config.endpoint();
        match self.open().await {
            Ok((link, channel)) => {
                inner.generation += 1;
                self.watch_shutdown(link.shutdown_events(), inner.generation);
                inner.link = Some(link);
                inner.channel = Some(channel);
                inner.state = ConnectionState::Connected;
                info!(
                    endpoint = %endpoint,
                    exchange = %self.config.exchange,
                    "Connected to message bus"
                );
                Ok(())
            }
            Err(e) => {
                inner.state = ConnectionState::Disconnected;
                warn!(endpoint = %endpoint, error = %e, "Could not connect to the message bus");
                Err(e)
            }
        }
    }

    async fn open(&self) -> BusResult<(Box<dyn BrokerLink>, Box<dyn BrokerChannel>)> {
        let link = self.connector.connect(&self.config.endpoint()).await?;
        let channel = match link.open_channel().await {
            Ok(channel) => channel,
            Err(e) => {
                let _ = link.close().await;
                return Err(e);
            }
        };
        let declared = channel
            .exchange_declare(
                &self.config.exchange,
                ExchangeKind::Fanout,
                self.config.durable_exchange,
            )
            .await;
        if let Err(e) = declared {
            let _ = channel.close().await;
            let _ = link.close().await;
            return Err(e);
        }
        Ok((link, channel))
    }

    /// Spawns a task that reacts to the link's shutdown notification.
    ///
    /// A peer shutdown drops the handles so the next operation reconnects. The
    /// task only acts if no newer link has been opened since.
    fn watch_shutdown(&self, mut events: watch::Receiver<Option<ShutdownEvent>>, generation: u64) {
        let inner = Arc::downgrade(&self.inner);
        let exchange = self.config.exchange.clone();

        tokio::spawn(async move {
            let event = loop {
                let current = events.borrow_and_update().clone();
                if let Some(event) = current {
                    break event;
                }
                if events.changed().await.is_err() {
                    return;
                }
            };

            match event.initiator {
                ShutdownInitiator::Application => {
                    debug!(reason = %event.reason, "Message bus link closed by application");
                }
                ShutdownInitiator::Peer => {
                    let Some(inner) = inner.upgrade() else {
                        return;
                    };
                    let mut guard = inner.lock().await;
                    if guard.generation != generation {
                        return;
                    }
                    guard.state = ConnectionState::ClosingByPeer;
                    warn!(
                        exchange = %exchange,
                        reason = %event.reason,
                        "Message bus connection shut down by peer"
                    );
                    guard.channel = None;
                    guard.link = None;
                    guard.state = ConnectionState::Disconnected;
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBroker;
    use std::time::Duration;

    fn setup() -> (MemoryBroker, BusConnection) {
        let config = BusConfig::default();
        let broker = MemoryBroker::new(config.endpoint());
        let connection = BusConnection::new(Arc::new(broker.clone()), config);
        (broker, connection)
    }

    #[tokio::test]
    async fn starts_disconnected() {
        let (broker, connection) = setup();
        assert_eq!(connection.state().await, ConnectionState::Disconnected);
        assert_eq!(broker.open_links(), 0);
    }

    #[tokio::test]
    async fn connect_declares_fanout_exchange() {
        let (broker, connection) = setup();
        connection.connect().await.unwrap();

        assert_eq!(connection.state().await, ConnectionState::Connected);
        assert_eq!(
            broker.exchange_kind("trigger_exchange"),
            Some(ExchangeKind::Fanout)
        );
    }

    #[tokio::test]
    async fn connect_failure_leaves_disconnected() {
        let (broker, connection) = setup();
        broker.set_reachable(false);

        let result = connection.connect().await;
        assert!(matches!(result, Err(BusError::BrokerUnreachable(_))));
        assert_eq!(connection.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn connect_is_idempotent() {
        let (broker, connection) = setup();
        connection.connect().await.unwrap();
        connection.connect().await.unwrap();

        assert_eq!(broker.open_links(), 1);
        assert_eq!(connection.connections_opened().await, 1);
    }

    #[tokio::test]
    async fn concurrent_connects_open_one_link() {
        let (broker, connection) = setup();
        let connection = Arc::new(connection);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let connection = Arc::clone(&connection);
                tokio::spawn(async move { connection.connect().await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(broker.open_links(), 1);
        assert_eq!(connection.connections_opened().await, 1);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (broker, connection) = setup();
        connection.connect().await.unwrap();

        connection.close().await;
        connection.close().await;

        assert_eq!(connection.state().await, ConnectionState::Disconnected);
        assert_eq!(broker.open_links(), 0);
    }

    #[tokio::test]
    async fn close_without_connect() {
        let (_broker, connection) = setup();
        connection.close().await;
        assert_eq!(connection.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn peer_shutdown_collapses_to_disconnected() {
        let (broker, connection) = setup();
        connection.connect().await.unwrap();

        broker.drop_connections("node down");

        assert_eq!(connection.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn peer_shutdown_does_not_reconnect_by_itself() {
        let (broker, connection) = setup();
        connection.connect().await.unwrap();

        broker.drop_connections("node down");
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(broker.open_links(), 0);
        assert_eq!(connection.connections_opened().await, 1);
    }

    #[tokio::test]
    async fn publish_reconnects_lazily() {
        let (broker, connection) = setup();
        connection.connect().await.unwrap();
        broker.drop_connections("node down");

        connection
            .publish(FANOUT_ROUTING_KEY, Bytes::from_static(b"{}"))
            .await
            .unwrap();

        assert_eq!(connection.state().await, ConnectionState::Connected);
        assert_eq!(connection.connections_opened().await, 2);
        assert_eq!(broker.messages_routed(), 1);
    }

    #[tokio::test]
    async fn publish_makes_one_attempt() {
        let (broker, connection) = setup();
        broker.set_reachable(false);

        let result = connection.publish("", Bytes::new()).await;
        assert!(result.is_err());
        assert_eq!(connection.state().await, ConnectionState::Disconnected);
        assert_eq!(broker.messages_routed(), 0);
    }

    #[tokio::test]
    async fn declare_bound_queue_binds_to_exchange() {
        let (broker, connection) = setup();
        let queue = connection.declare_bound_queue().await.unwrap();

        assert_eq!(broker.bound_queues("trigger_exchange"), vec![queue]);
    }

    #[tokio::test]
    async fn consume_requires_connection() {
        let (_broker, connection) = setup();
        let result = connection.consume("amq.gen-missing").await;
        assert!(matches!(result, Err(BusError::ChannelClosed)));
    }

    #[tokio::test]
    async fn exchange_mismatch_fails_connect() {
        let (broker, connection) = setup();

        let link = broker.connect(broker.endpoint()).await.unwrap();
        let channel = link.open_channel().await.unwrap();
        channel
            .exchange_declare("trigger_exchange", ExchangeKind::Direct, false)
            .await
            .unwrap();

        let result = connection.connect().await;
        assert!(matches!(result, Err(BusError::Broker(_))));
        assert_eq!(connection.state().await, ConnectionState::Disconnected);
    }
}
