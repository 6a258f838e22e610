//! Background event subscriber.
//!
//! Each subscriber owns a connection and an anonymous exclusive queue bound to
//! the fanout exchange, so every running subscriber receives its own copy of
//! every event. Messages are acknowledged on receipt: an event that is in
//! flight when the process dies is lost.
//!
//! ```text
//! Idle ─► Connecting ─► Bound ─► Consuming ─► ShuttingDown ─► Stopped
//! ```
//!
//! Only `Consuming` delivers. Every exit path, including a failed start, goes
//! through `ShuttingDown` and closes the connection.

use crate::broker::{BrokerConnector, Delivery};
use crate::config::BusConfig;
use crate::connection::BusConnection;
use crate::error::BusError;
use crate::processor::{PayloadProcessor, ProcessOutcome};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Lifecycle state of a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriberState {
    /// Created, not started.
    Idle,
    /// Connecting and declaring the queue.
    Connecting,
    /// Queue declared and bound.
    Bound,
    /// Receiving deliveries.
    Consuming,
    /// Closing the connection.
    ShuttingDown,
    /// Terminal.
    Stopped,
}

impl SubscriberState {
    /// Returns true once the subscriber can no longer change state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubscriberState::Stopped)
    }
}

impl fmt::Display for SubscriberState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SubscriberState::Idle => "idle",
            SubscriberState::Connecting => "connecting",
            SubscriberState::Bound => "bound",
            SubscriberState::Consuming => "consuming",
            SubscriberState::ShuttingDown => "shutting down",
            SubscriberState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Delivery counters for one subscriber run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriberStats {
    /// Deliveries received.
    pub received: u64,
    /// Deliveries a handler accepted.
    pub handled: u64,
    /// Deliveries a handler rejected.
    pub handler_failures: u64,
    /// Deliveries that never reached a handler.
    pub discarded: u64,
}

/// Why a subscriber stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriberExit {
    /// Shutdown was requested.
    Cancelled,
    /// The broker ended the delivery stream.
    StreamClosed,
    /// The queue could not be declared, bound or consumed.
    StartFailed(BusError),
    /// The subscriber task itself failed.
    Aborted(String),
}

/// Summary returned when a subscriber stops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberReport {
    /// Broker-assigned queue name, if one was declared.
    pub queue: Option<String>,
    /// Delivery counters.
    pub stats: SubscriberStats,
    /// Why the subscriber stopped.
    pub exit: SubscriberExit,
}

/// A long-lived listener on the fanout exchange.
pub struct EventSubscriber<P> {
    connection: BusConnection,
    processor: P,
    state_tx: watch::Sender<SubscriberState>,
}

impl<P: PayloadProcessor + 'static> EventSubscriber<P> {
    /// Creates an idle subscriber. The connection must not be shared.
    pub fn new(connection: BusConnection, processor: P) -> Self {
        let (state_tx, _) = watch::channel(SubscriberState::Idle);
        Self {
            connection,
            processor,
            state_tx,
        }
    }

    /// Creates an idle subscriber with its own connection.
    pub fn with_connector(
        connector: Arc<dyn BrokerConnector>,
        config: BusConfig,
        processor: P,
    ) -> Self {
        Self::new(BusConnection::new(connector, config), processor)
    }

    /// Returns the current state.
    pub fn state(&self) -> SubscriberState {
        *self.state_tx.borrow()
    }

    /// Returns a receiver that observes state changes.
    pub fn state_receiver(&self) -> watch::Receiver<SubscriberState> {
        self.state_tx.subscribe()
    }

    /// Runs until `shutdown` becomes true or the delivery stream ends.
    ///
    /// The connection is closed before this returns.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> SubscriberReport {
        let mut stats = SubscriberStats::default();
        let (queue, exit) = self.listen(&mut shutdown, &mut stats).await;

        self.set_state(SubscriberState::ShuttingDown);
        self.connection.close().await;
        self.set_state(SubscriberState::Stopped);

        info!(
            queue = queue.as_deref().unwrap_or("-"),
            received = stats.received,
            exit = ?exit,
            "Subscriber stopped"
        );
        SubscriberReport { queue, stats, exit }
    }

    /// Spawns [`run`](Self::run) on the current runtime.
    pub fn spawn(self) -> SubscriberHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state = self.state_receiver();
        let join = tokio::spawn(self.run(shutdown_rx));
        SubscriberHandle {
            shutdown_tx,
            state,
            join,
        }
    }

    async fn listen(
        &self,
        shutdown: &mut watch::Receiver<bool>,
        stats: &mut SubscriberStats,
    ) -> (Option<String>, SubscriberExit) {
        if *shutdown.borrow_and_update() {
            return (None, SubscriberExit::Cancelled);
        }

        self.set_state(SubscriberState::Connecting);
        let queue = match self.connection.declare_bound_queue().await {
            Ok(queue) => queue,
            Err(e) => {
                warn!(error = %e, "Subscriber could not bind a queue");
                return (None, SubscriberExit::StartFailed(e));
            }
        };
        self.set_state(SubscriberState::Bound);

        let mut deliveries = match self.connection.consume(&queue).await {
            Ok(deliveries) => deliveries,
            Err(e) => {
                warn!(queue = %queue, error = %e, "Subscriber could not start consuming");
                return (Some(queue), SubscriberExit::StartFailed(e));
            }
        };
        self.set_state(SubscriberState::Consuming);
        info!(
            queue = %queue,
            exchange = %self.connection.config().exchange,
            "Listening on message bus"
        );

        // A dropped shutdown sender detaches the subscriber; it keeps consuming.
        let mut signal_open = true;
        let exit = loop {
            tokio::select! {
                biased;

                changed = shutdown.changed(), if signal_open => {
                    match changed {
                        Ok(()) => {
                            if *shutdown.borrow_and_update() {
                                break SubscriberExit::Cancelled;
                            }
                        }
                        Err(_) => signal_open = false,
                    }
                }

                delivery = deliveries.recv() => {
                    match delivery {
                        Some(delivery) => self.handle(&queue, delivery, stats),
                        None => {
                            warn!(queue = %queue, "Delivery stream closed by broker");
                            break SubscriberExit::StreamClosed;
                        }
                    }
                }
            }
        };
        (Some(queue), exit)
    }

    fn handle(&self, queue: &str, delivery: Delivery, stats: &mut SubscriberStats) {
        stats.received += 1;
        debug!(
            queue = %queue,
            tag = delivery.delivery_tag,
            bytes = delivery.body.len(),
            "Event received"
        );
        // A panicking handler costs one delivery, not the receive loop.
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.processor.process(&delivery.body)
        }));
        match outcome {
            Ok(ProcessOutcome::Handled(_)) => stats.handled += 1,
            Ok(ProcessOutcome::HandlerFailed { .. }) => stats.handler_failures += 1,
            Ok(ProcessOutcome::Discarded(_)) => stats.discarded += 1,
            Err(payload) => {
                stats.handler_failures += 1;
                warn!(
                    queue = %queue,
                    tag = delivery.delivery_tag,
                    panic = %panic_message(payload.as_ref()),
                    "Event handler panicked, continuing"
                );
            }
        }
    }

    fn set_state(&self, state: SubscriberState) {
        self.state_tx.send_replace(state);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

/// Handle to a spawned subscriber.
pub struct SubscriberHandle {
    shutdown_tx: watch::Sender<bool>,
    state: watch::Receiver<SubscriberState>,
    join: JoinHandle<SubscriberReport>,
}

impl SubscriberHandle {
    /// Returns the current state.
    pub fn state(&self) -> SubscriberState {
        *self.state.borrow()
    }

    /// Waits until the subscriber reaches `target` or stops.
    ///
    /// Returns the state that ended the wait.
    pub async fn wait_for(&self, target: SubscriberState) -> SubscriberState {
        let mut state = self.state.clone();
        let reached = match state.wait_for(|s| *s == target || s.is_terminal()).await {
            Ok(reached) => *reached,
            Err(_) => SubscriberState::Stopped,
        };
        reached
    }

    /// Returns true once the task has finished.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Requests shutdown and waits for the subscriber to stop.
    pub async fn stop(self) -> SubscriberReport {
        // Fails only if the task already finished.
        let _ = self.shutdown_tx.send(true);
        Self::collect(self.join).await
    }

    /// Waits for the subscriber to stop on its own.
    pub async fn join(self) -> SubscriberReport {
        Self::collect(self.join).await
    }

    async fn collect(join: JoinHandle<SubscriberReport>) -> SubscriberReport {
        match join.await {
            Ok(report) => report,
            Err(e) => SubscriberReport {
                queue: None,
                stats: SubscriberStats::default(),
                exit: SubscriberExit::Aborted(e.to_string()),
            },
        }
    }
}
