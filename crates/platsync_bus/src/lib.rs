//! # platsync Bus
//!
//! Fire-and-forget broadcast of platform events over a fanout exchange.
//!
//! This crate provides:
//! - A broker seam (`BrokerConnector` / `BrokerLink` / `BrokerChannel`) shaped
//!   after the AMQP object model, with an in-process `MemoryBroker`
//! - `BusConnection`: one link and one channel shared by concurrent callers,
//!   connected lazily and never reconnected in the background
//! - `EventPublisher`: fail-open publishing
//! - `EventSubscriber`: a background listener on its own anonymous queue
//! - `EventProcessor`: discriminator-first decoding and dispatch
//!
//! ## Delivery guarantees
//!
//! - At most once: deliveries are acknowledged on receipt
//! - Every subscriber gets its own copy of every event
//! - Nothing is persisted; events published while nobody listens are gone

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod broker;
mod config;
mod connection;
mod error;
mod memory;
mod processor;
mod publisher;
mod state;
mod subscriber;

pub use broker::{
    BrokerChannel, BrokerConnector, BrokerEndpoint, BrokerLink, Delivery, DeliveryStream,
    ExchangeKind, ShutdownEvent, ShutdownInitiator,
};
pub use config::{BusConfig, DEFAULT_BROKER_PORT, DEFAULT_EXCHANGE, FANOUT_ROUTING_KEY};
pub use connection::BusConnection;
pub use error::{BusError, BusResult};
pub use memory::MemoryBroker;
pub use processor::{EventHandler, EventProcessor, PayloadProcessor, ProcessOutcome};
pub use publisher::{EventPublisher, PublishOutcome, PublisherStats};
pub use state::ConnectionState;
pub use subscriber::{
    EventSubscriber, SubscriberExit, SubscriberHandle, SubscriberReport, SubscriberState,
    SubscriberStats,
};
