//! In-process broker.
//!
//! [`MemoryBroker`] implements the broker traits without any network I/O. It
//! keeps AMQP semantics where the bus depends on them:
//!
//! - connects are refused unless the endpoint matches and the broker is reachable
//! - exchange declaration is idempotent, redeclaring with other arguments fails
//! - anonymous queues get a broker-assigned name and die with their link
//! - fanout exchanges ignore the routing key, direct exchanges match it exactly
//!
//! Tests use [`MemoryBroker::set_reachable`] and
//! [`MemoryBroker::drop_connections`] to simulate an unavailable broker and a
//! peer-initiated shutdown.

use crate::broker::{
    BrokerChannel, BrokerConnector, BrokerEndpoint, BrokerLink, Delivery, DeliveryStream,
    ExchangeKind, ShutdownEvent,
};
use crate::error::{BusError, BusResult};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::debug;
use uuid::Uuid;

/// A broker living in the current process.
///
/// Cloning is cheap; clones share the same exchanges, queues and links.
#[derive(Clone)]
pub struct MemoryBroker {
    endpoint: BrokerEndpoint,
    inner: Arc<Mutex<BrokerState>>,
}

struct BrokerState {
    reachable: bool,
    next_link_id: u64,
    exchanges: HashMap<String, ExchangeEntry>,
    queues: HashMap<String, QueueEntry>,
    links: HashMap<u64, LinkEntry>,
    messages_routed: u64,
}

struct ExchangeEntry {
    kind: ExchangeKind,
    durable: bool,
    bindings: Vec<Binding>,
}

struct Binding {
    queue: String,
    routing_key: String,
}

struct QueueEntry {
    owner: u64,
    sender: mpsc::UnboundedSender<Delivery>,
    /// Taken by the first consumer.
    receiver: Option<DeliveryStream>,
    next_tag: u64,
}

struct LinkEntry {
    open: Arc<AtomicBool>,
    shutdown: watch::Sender<Option<ShutdownEvent>>,
}

impl MemoryBroker {
    /// Creates a reachable broker answering on `endpoint`.
    pub fn new(endpoint: BrokerEndpoint) -> Self {
        Self {
            endpoint,
            inner: Arc::new(Mutex::new(BrokerState {
                reachable: true,
                next_link_id: 0,
                exchanges: HashMap::new(),
                queues: HashMap::new(),
                links: HashMap::new(),
                messages_routed: 0,
            })),
        }
    }

    /// Returns the endpoint this broker answers on.
    pub fn endpoint(&self) -> &BrokerEndpoint {
        &self.endpoint
    }

    /// Makes new connects succeed or fail. Existing links are not affected.
    pub fn set_reachable(&self, reachable: bool) {
        self.inner.lock().reachable = reachable;
    }

    /// Shuts down every open link as if the broker went away.
    ///
    /// Returns the number of links closed.
    pub fn drop_connections(&self, reason: &str) -> usize {
        let ids: Vec<u64> = self.inner.lock().links.keys().copied().collect();
        ids.iter()
            .filter(|id| self.shutdown_link(**id, ShutdownEvent::by_peer(reason)))
            .count()
    }

    /// Returns the number of open links.
    pub fn open_links(&self) -> usize {
        self.inner.lock().links.len()
    }

    /// Returns the names of all live queues.
    pub fn queue_names(&self) -> Vec<String> {
        self.inner.lock().queues.keys().cloned().collect()
    }

    /// Returns the queues bound to an exchange, in binding order.
    pub fn bound_queues(&self, exchange: &str) -> Vec<String> {
        self.inner
            .lock()
            .exchanges
            .get(exchange)
            .map(|e| e.bindings.iter().map(|b| b.queue.clone()).collect())
            .unwrap_or_default()
    }

    /// Returns the type of a declared exchange.
    pub fn exchange_kind(&self, name: &str) -> Option<ExchangeKind> {
        self.inner.lock().exchanges.get(name).map(|e| e.kind)
    }

    /// Returns the number of messages accepted by an exchange.
    pub fn messages_routed(&self) -> u64 {
        self.inner.lock().messages_routed
    }

    fn shutdown_link(&self, id: u64, event: ShutdownEvent) -> bool {
        let link = {
            let mut guard = self.inner.lock();
            let state = &mut *guard;
            let Some(link) = state.links.remove(&id) else {
                return false;
            };
            link.open.store(false, Ordering::SeqCst);

            let owned: Vec<String> = state
                .queues
                .iter()
                .filter(|(_, q)| q.owner == id)
                .map(|(name, _)| name.clone())
                .collect();
            for name in &owned {
                state.queues.remove(name);
            }
            for exchange in state.exchanges.values_mut() {
                exchange.bindings.retain(|b| !owned.contains(&b.queue));
            }
            link
        };

        debug!(link = id, initiator = ?event.initiator, "Memory broker link shut down");
        link.shutdown.send_replace(Some(event));
        true
    }

    fn declare_exchange(&self, name: &str, kind: ExchangeKind, durable: bool) -> BusResult<()> {
        let mut state = self.inner.lock();
        match state.exchanges.get(name) {
            Some(existing) if existing.kind != kind || existing.durable != durable => {
                Err(BusError::Broker(format!(
                    "PRECONDITION_FAILED - inequivalent arg for exchange '{name}'"
                )))
            }
            Some(_) => Ok(()),
            None => {
                state.exchanges.insert(
                    name.to_string(),
                    ExchangeEntry {
                        kind,
                        durable,
                        bindings: Vec::new(),
                    },
                );
                Ok(())
            }
        }
    }

    fn declare_queue(&self, owner: u64) -> String {
        let name = format!("amq.gen-{}", Uuid::new_v4().simple());
        let (sender, receiver) = mpsc::unbounded_channel();
        self.inner.lock().queues.insert(
            name.clone(),
            QueueEntry {
                owner,
                sender,
                receiver: Some(receiver),
                next_tag: 0,
            },
        );
        name
    }

    fn bind(&self, owner: u64, queue: &str, exchange: &str, routing_key: &str) -> BusResult<()> {
        let mut guard = self.inner.lock();
        let state = &mut *guard;
        let entry = state
            .queues
            .get(queue)
            .ok_or_else(|| BusError::Broker(format!("NOT_FOUND - no queue '{queue}'")))?;
        if entry.owner != owner {
            return Err(BusError::Broker(format!(
                "RESOURCE_LOCKED - queue '{queue}' is exclusive to another connection"
            )));
        }
        let exchange_entry = state
            .exchanges
            .get_mut(exchange)
            .ok_or_else(|| BusError::Broker(format!("NOT_FOUND - no exchange '{exchange}'")))?;

        let exists = exchange_entry
            .bindings
            .iter()
            .any(|b| b.queue == queue && b.routing_key == routing_key);
        if !exists {
            exchange_entry.bindings.push(Binding {
                queue: queue.to_string(),
                routing_key: routing_key.to_string(),
            });
        }
        Ok(())
    }

    fn take_consumer(&self, owner: u64, queue: &str) -> BusResult<DeliveryStream> {
        let mut state = self.inner.lock();
        let entry = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| BusError::Broker(format!("NOT_FOUND - no queue '{queue}'")))?;
        if entry.owner != owner {
            return Err(BusError::Broker(format!(
                "RESOURCE_LOCKED - queue '{queue}' is exclusive to another connection"
            )));
        }
        entry.receiver.take().ok_or_else(|| {
            BusError::Broker(format!("ACCESS_REFUSED - queue '{queue}' already has a consumer"))
        })
    }

    fn route(&self, exchange: &str, routing_key: &str, body: Bytes) -> BusResult<usize> {
        let mut guard = self.inner.lock();
        let state = &mut *guard;
        let entry = state
            .exchanges
            .get(exchange)
            .ok_or_else(|| BusError::Broker(format!("NOT_FOUND - no exchange '{exchange}'")))?;

        let mut targets: Vec<String> = Vec::new();
        for binding in &entry.bindings {
            let matches = match entry.kind {
                ExchangeKind::Fanout => true,
                ExchangeKind::Direct => binding.routing_key == routing_key,
            };
            if matches && !targets.contains(&binding.queue) {
                targets.push(binding.queue.clone());
            }
        }

        let mut delivered = 0;
        for name in targets {
            let Some(queue) = state.queues.get_mut(&name) else {
                continue;
            };
            queue.next_tag += 1;
            let delivery = Delivery {
                delivery_tag: queue.next_tag,
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
                body: body.clone(),
            };
            // A consumer that went away loses the message.
            if queue.sender.send(delivery).is_ok() {
                delivered += 1;
            }
        }
        state.messages_routed += 1;
        Ok(delivered)
    }
}

#[async_trait]
impl BrokerConnector for MemoryBroker {
    async fn connect(&self, endpoint: &BrokerEndpoint) -> BusResult<Box<dyn BrokerLink>> {
        let (id, open, shutdown_rx) = {
            let mut state = self.inner.lock();
            if !state.reachable || *endpoint != self.endpoint {
                return Err(BusError::BrokerUnreachable(format!(
                    "connection refused by {endpoint}"
                )));
            }
            state.next_link_id += 1;
            let id = state.next_link_id;
            let open = Arc::new(AtomicBool::new(true));
            let (shutdown, shutdown_rx) = watch::channel(None);
            state.links.insert(
                id,
                LinkEntry {
                    open: Arc::clone(&open),
                    shutdown,
                },
            );
            (id, open, shutdown_rx)
        };

        debug!(%endpoint, link = id, "Memory broker accepted link");
        Ok(Box::new(MemoryLink {
            broker: self.clone(),
            id,
            open,
            shutdown_rx,
        }))
    }
}

struct MemoryLink {
    broker: MemoryBroker,
    id: u64,
    open: Arc<AtomicBool>,
    shutdown_rx: watch::Receiver<Option<ShutdownEvent>>,
}

#[async_trait]
impl BrokerLink for MemoryLink {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn open_channel(&self) -> BusResult<Box<dyn BrokerChannel>> {
        if !self.is_open() {
            return Err(BusError::ChannelClosed);
        }
        Ok(Box::new(MemoryChannel {
            broker: self.broker.clone(),
            link_id: self.id,
            link_open: Arc::clone(&self.open),
            open: AtomicBool::new(true),
        }))
    }

    fn shutdown_events(&self) -> watch::Receiver<Option<ShutdownEvent>> {
        self.shutdown_rx.clone()
    }

    async fn close(&self) -> BusResult<()> {
        self.broker
            .shutdown_link(self.id, ShutdownEvent::by_application());
        Ok(())
    }
}

impl Drop for MemoryLink {
    fn drop(&mut self) {
        self.broker
            .shutdown_link(self.id, ShutdownEvent::by_application());
    }
}

struct MemoryChannel {
    broker: MemoryBroker,
    link_id: u64,
    link_open: Arc<AtomicBool>,
    open: AtomicBool,
}

impl MemoryChannel {
    fn check_open(&self) -> BusResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(BusError::ChannelClosed)
        }
    }

    /// Broker refusals close the channel, as they do in AMQP.
    fn fail<T>(&self, err: BusError) -> BusResult<T> {
        self.open.store(false, Ordering::SeqCst);
        Err(err)
    }
}

#[async_trait]
impl BrokerChannel for MemoryChannel {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && self.link_open.load(Ordering::SeqCst)
    }

    async fn exchange_declare(
        &self,
        name: &str,
        kind: ExchangeKind,
        durable: bool,
    ) -> BusResult<()> {
        self.check_open()?;
        match self.broker.declare_exchange(name, kind, durable) {
            Ok(()) => Ok(()),
            Err(e) => self.fail(e),
        }
    }

    async fn queue_declare_anonymous(&self) -> BusResult<String> {
        self.check_open()?;
        Ok(self.broker.declare_queue(self.link_id))
    }

    async fn queue_bind(&self, queue: &str, exchange: &str, routing_key: &str) -> BusResult<()> {
        self.check_open()?;
        match self.broker.bind(self.link_id, queue, exchange, routing_key) {
            Ok(()) => Ok(()),
            Err(e) => self.fail(e),
        }
    }

    async fn publish(&self, exchange: &str, routing_key: &str, body: Bytes) -> BusResult<()> {
        self.check_open()?;
        match self.broker.route(exchange, routing_key, body) {
            Ok(_) => Ok(()),
            Err(e) => self.fail(e),
        }
    }

    async fn consume_auto_ack(&self, queue: &str) -> BusResult<DeliveryStream> {
        self.check_open()?;
        match self.broker.take_consumer(self.link_id, queue) {
            Ok(stream) => Ok(stream),
            Err(e) => self.fail(e),
        }
    }

    async fn close(&self) -> BusResult<()> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::ShutdownInitiator;

    fn broker() -> MemoryBroker {
        MemoryBroker::new(BrokerEndpoint::new("localhost", 5672))
    }

    async fn channel(broker: &MemoryBroker) -> (Box<dyn BrokerLink>, Box<dyn BrokerChannel>) {
        let link = broker.connect(broker.endpoint()).await.unwrap();
        let channel = link.open_channel().await.unwrap();
        (link, channel)
    }

    #[tokio::test]
    async fn refuses_unknown_endpoint() {
        let broker = broker();
        let result = broker.connect(&BrokerEndpoint::new("localhost", 1)).await;
        assert!(matches!(result, Err(BusError::BrokerUnreachable(_))));
    }

    #[tokio::test]
    async fn refuses_when_unreachable() {
        let broker = broker();
        broker.set_reachable(false);
        assert!(broker.connect(broker.endpoint()).await.is_err());

        broker.set_reachable(true);
        assert!(broker.connect(broker.endpoint()).await.is_ok());
    }

    #[tokio::test]
    async fn exchange_declare_is_idempotent() {
        let broker = broker();
        let (_link, ch) = channel(&broker).await;

        ch.exchange_declare("trigger_exchange", ExchangeKind::Fanout, false)
            .await
            .unwrap();
        ch.exchange_declare("trigger_exchange", ExchangeKind::Fanout, false)
            .await
            .unwrap();
        assert_eq!(
            broker.exchange_kind("trigger_exchange"),
            Some(ExchangeKind::Fanout)
        );
    }

    #[tokio::test]
    async fn exchange_redeclare_with_other_kind_closes_channel() {
        let broker = broker();
        let (_link, ch) = channel(&broker).await;

        ch.exchange_declare("x", ExchangeKind::Fanout, false)
            .await
            .unwrap();
        let result = ch.exchange_declare("x", ExchangeKind::Direct, false).await;

        assert!(matches!(result, Err(BusError::Broker(_))));
        assert!(!ch.is_open());
    }

    #[tokio::test]
    async fn fanout_ignores_routing_key() {
        let broker = broker();
        let (_link, ch) = channel(&broker).await;
        ch.exchange_declare("x", ExchangeKind::Fanout, false)
            .await
            .unwrap();

        let q1 = ch.queue_declare_anonymous().await.unwrap();
        let q2 = ch.queue_declare_anonymous().await.unwrap();
        ch.queue_bind(&q1, "x", "").await.unwrap();
        ch.queue_bind(&q2, "x", "other").await.unwrap();
        let mut s1 = ch.consume_auto_ack(&q1).await.unwrap();
        let mut s2 = ch.consume_auto_ack(&q2).await.unwrap();

        ch.publish("x", "", Bytes::from_static(b"hello"))
            .await
            .unwrap();

        assert_eq!(s1.recv().await.unwrap().body, Bytes::from_static(b"hello"));
        assert_eq!(s2.recv().await.unwrap().body, Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn direct_matches_routing_key() {
        let broker = broker();
        let (_link, ch) = channel(&broker).await;
        ch.exchange_declare("d", ExchangeKind::Direct, false)
            .await
            .unwrap();

        let q1 = ch.queue_declare_anonymous().await.unwrap();
        let q2 = ch.queue_declare_anonymous().await.unwrap();
        ch.queue_bind(&q1, "d", "a").await.unwrap();
        ch.queue_bind(&q2, "d", "b").await.unwrap();
        let mut s1 = ch.consume_auto_ack(&q1).await.unwrap();
        let mut s2 = ch.consume_auto_ack(&q2).await.unwrap();

        ch.publish("d", "a", Bytes::from_static(b"1")).await.unwrap();

        assert_eq!(s1.recv().await.unwrap().delivery_tag, 1);
        assert!(s2.try_recv().is_err());
    }

    #[tokio::test]
    async fn anonymous_names_are_broker_assigned_and_unique() {
        let broker = broker();
        let (_link, ch) = channel(&broker).await;

        let a = ch.queue_declare_anonymous().await.unwrap();
        let b = ch.queue_declare_anonymous().await.unwrap();
        assert!(a.starts_with("amq.gen-"));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn exclusive_queue_dies_with_link() {
        let broker = broker();
        let (link, ch) = channel(&broker).await;
        ch.exchange_declare("x", ExchangeKind::Fanout, false)
            .await
            .unwrap();
        let q = ch.queue_declare_anonymous().await.unwrap();
        ch.queue_bind(&q, "x", "").await.unwrap();
        let mut stream = ch.consume_auto_ack(&q).await.unwrap();

        link.close().await.unwrap();

        assert!(broker.queue_names().is_empty());
        assert!(broker.bound_queues("x").is_empty());
        assert!(stream.recv().await.is_none());
        assert!(!ch.is_open());
    }

    #[tokio::test]
    async fn exclusive_queue_refuses_other_links() {
        let broker = broker();
        let (_owner, ch) = channel(&broker).await;
        let (_other, other_ch) = channel(&broker).await;
        ch.exchange_declare("x", ExchangeKind::Fanout, false)
            .await
            .unwrap();
        let q = ch.queue_declare_anonymous().await.unwrap();

        assert!(other_ch.queue_bind(&q, "x", "").await.is_err());
    }

    #[tokio::test]
    async fn second_consumer_refused() {
        let broker = broker();
        let (_link, ch) = channel(&broker).await;
        let q = ch.queue_declare_anonymous().await.unwrap();

        let _first = ch.consume_auto_ack(&q).await.unwrap();
        assert!(ch.consume_auto_ack(&q).await.is_err());
    }

    #[tokio::test]
    async fn publish_to_missing_exchange_closes_channel() {
        let broker = broker();
        let (link, ch) = channel(&broker).await;

        let result = ch.publish("nope", "", Bytes::new()).await;
        assert!(matches!(result, Err(BusError::Broker(_))));
        assert!(!ch.is_open());
        assert!(link.is_open());
    }

    #[tokio::test]
    async fn drop_connections_signals_peer_shutdown() {
        let broker = broker();
        let (link, _ch) = channel(&broker).await;
        let mut events = link.shutdown_events();

        assert_eq!(broker.drop_connections("broker restart"), 1);

        events.changed().await.unwrap();
        let event = events.borrow().clone().unwrap();
        assert_eq!(event.initiator, ShutdownInitiator::Peer);
        assert_eq!(event.reason, "broker restart");
        assert!(!link.is_open());
        assert_eq!(broker.open_links(), 0);
    }

    #[tokio::test]
    async fn dropping_link_closes_it() {
        let broker = broker();
        {
            let (_link, _ch) = channel(&broker).await;
            assert_eq!(broker.open_links(), 1);
        }
        assert_eq!(broker.open_links(), 0);
    }
}
