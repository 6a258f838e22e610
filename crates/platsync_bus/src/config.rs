//! Configuration for bus connections.

use crate::broker::BrokerEndpoint;

/// Name of the exchange platform events are broadcast on.
pub const DEFAULT_EXCHANGE: &str = "trigger_exchange";

/// Default AMQP port.
pub const DEFAULT_BROKER_PORT: u16 = 5672;

/// Routing key used for every publish and binding. Fanout exchanges ignore it.
pub const FANOUT_ROUTING_KEY: &str = "";

/// Configuration for a bus connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    /// Broker host name.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// Fanout exchange to publish to and bind queues on.
    pub exchange: String,
    /// Whether the exchange is declared durable.
    pub durable_exchange: bool,
}

impl BusConfig {
    /// Creates a configuration for the given broker address.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            exchange: DEFAULT_EXCHANGE.to_string(),
            durable_exchange: false,
        }
    }

    /// Sets the exchange name.
    pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = exchange.into();
        self
    }

    /// Sets exchange durability.
    pub fn with_durable_exchange(mut self, durable: bool) -> Self {
        self.durable_exchange = durable;
        self
    }

    /// Returns the broker endpoint.
    pub fn endpoint(&self) -> BrokerEndpoint {
        BrokerEndpoint::new(self.host.clone(), self.port)
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self::new("localhost", DEFAULT_BROKER_PORT)
    }
}
