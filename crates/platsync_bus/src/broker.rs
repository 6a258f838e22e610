//! Broker abstraction.
//!
//! The bus talks to a broker through three traits that mirror the AMQP object
//! model: a [`BrokerConnector`] opens a [`BrokerLink`] (the physical
//! connection), which opens a [`BrokerChannel`] (the logical channel all
//! exchange, queue and publish operations go through).
//!
//! Channels are not safe for unsynchronised concurrent use. `BusConnection`
//! owns exactly one channel and serialises every call on it.

use crate::error::BusResult;
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use tokio::sync::{mpsc, watch};

/// Address of a broker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BrokerEndpoint {
    /// Host name.
    pub host: String,
    /// Port.
    pub port: u16,
}

impl BrokerEndpoint {
    /// Creates an endpoint.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for BrokerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Exchange routing type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeKind {
    /// Copies every message to every bound queue; routing key ignored.
    Fanout,
    /// Routes to queues bound with an identical routing key.
    Direct,
}

/// Who initiated a connection shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownInitiator {
    /// This process closed the connection.
    Application,
    /// The broker or the network closed the connection.
    Peer,
}

/// Notification that a link has shut down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownEvent {
    /// Who initiated the shutdown.
    pub initiator: ShutdownInitiator,
    /// Reason reported by the initiator.
    pub reason: String,
}

impl ShutdownEvent {
    /// Creates an application-initiated shutdown event.
    pub fn by_application() -> Self {
        Self {
            initiator: ShutdownInitiator::Application,
            reason: "closed by application".into(),
        }
    }

    /// Creates a peer-initiated shutdown event.
    pub fn by_peer(reason: impl Into<String>) -> Self {
        Self {
            initiator: ShutdownInitiator::Peer,
            reason: reason.into(),
        }
    }
}

/// A message delivered to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Per-queue delivery sequence number.
    pub delivery_tag: u64,
    /// Exchange the message was published to.
    pub exchange: String,
    /// Routing key the message was published with.
    pub routing_key: String,
    /// Message body.
    pub body: Bytes,
}

/// Stream of deliveries for one consumer. Ends when the queue goes away.
pub type DeliveryStream = mpsc::UnboundedReceiver<Delivery>;

/// Opens links to a broker.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    /// Opens a link to `endpoint`.
    ///
    /// Fails with `BusError::BrokerUnreachable` when nothing answers.
    async fn connect(&self, endpoint: &BrokerEndpoint) -> BusResult<Box<dyn BrokerLink>>;
}

/// A physical connection to a broker.
#[async_trait]
pub trait BrokerLink: Send + Sync {
    /// Returns true while the link is open.
    fn is_open(&self) -> bool;

    /// Opens a logical channel on this link.
    async fn open_channel(&self) -> BusResult<Box<dyn BrokerChannel>>;

    /// Returns a receiver that is notified once when the link shuts down.
    fn shutdown_events(&self) -> watch::Receiver<Option<ShutdownEvent>>;

    /// Closes the link. Closing an already closed link succeeds.
    async fn close(&self) -> BusResult<()>;
}

/// A logical channel on a link.
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Returns true while both the channel and its link are open.
    fn is_open(&self) -> bool;

    /// Declares an exchange. Succeeds if an identical exchange already exists.
    async fn exchange_declare(&self, name: &str, kind: ExchangeKind, durable: bool)
        -> BusResult<()>;

    /// Declares an anonymous, exclusive queue and returns its broker-assigned name.
    ///
    /// The queue is deleted when the declaring link closes.
    async fn queue_declare_anonymous(&self) -> BusResult<String>;

    /// Binds a queue to an exchange.
    async fn queue_bind(&self, queue: &str, exchange: &str, routing_key: &str) -> BusResult<()>;

    /// Publishes a message.
    async fn publish(&self, exchange: &str, routing_key: &str, body: Bytes) -> BusResult<()>;

    /// Starts consuming a queue. Messages are acknowledged on delivery.
    async fn consume_auto_ack(&self, queue: &str) -> BusResult<DeliveryStream>;

    /// Closes the channel. Closing an already closed channel succeeds.
    async fn close(&self) -> BusResult<()>;
}
