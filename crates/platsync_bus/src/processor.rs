//! Payload decoding and dispatch.

use crate::error::BusError;
use platsync_protocol::{EventEnvelope, EventKind, PlatformPublishedEvent};
use std::sync::Arc;
use tracing::{debug, warn};

/// Application callback for decoded events.
pub trait EventHandler: Send + Sync {
    /// Handles a platform that was created on the owner.
    fn on_platform_published(&self, event: PlatformPublishedEvent) -> Result<(), String>;
}

impl<H: EventHandler + ?Sized> EventHandler for Arc<H> {
    fn on_platform_published(&self, event: PlatformPublishedEvent) -> Result<(), String> {
        (**self).on_platform_published(event)
    }
}

/// What happened to one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The handler accepted the event.
    Handled(EventKind),
    /// The event decoded but its handler returned an error.
    HandlerFailed {
        /// Kind of the failed event.
        kind: EventKind,
        /// The handler's error.
        error: BusError,
    },
    /// The payload never reached a handler.
    Discarded(BusError),
}

impl ProcessOutcome {
    /// Returns true if a handler accepted the event.
    pub fn is_handled(&self) -> bool {
        matches!(self, ProcessOutcome::Handled(_))
    }
}

/// Something that consumes raw payloads from a subscriber.
///
/// Called synchronously from the receive loop, in delivery order.
pub trait PayloadProcessor: Send + Sync {
    /// Processes one payload. Must not panic on malformed input.
    fn process(&self, payload: &[u8]) -> ProcessOutcome;
}

impl<P: PayloadProcessor + ?Sized> PayloadProcessor for Arc<P> {
    fn process(&self, payload: &[u8]) -> ProcessOutcome {
        (**self).process(payload)
    }
}

/// Decodes the event discriminator, then the typed event, and dispatches it.
pub struct EventProcessor<H> {
    handler: H,
}

impl<H: EventHandler> EventProcessor<H> {
    /// Creates a processor dispatching to `handler`.
    pub fn new(handler: H) -> Self {
        Self { handler }
    }

    /// Returns the handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }
}

impl<H: EventHandler> PayloadProcessor for EventProcessor<H> {
    fn process(&self, payload: &[u8]) -> ProcessOutcome {
        let kind = match EventEnvelope::decode(payload) {
            Ok(envelope) => envelope.event,
            Err(e) => {
                warn!(error = %e, bytes = payload.len(), "Could not decode event, discarding");
                return ProcessOutcome::Discarded(BusError::decode(e));
            }
        };

        match &kind {
            EventKind::PlatformPublished => {
                let event = match PlatformPublishedEvent::decode(payload) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(event = %kind, error = %e, "Malformed event, discarding");
                        return ProcessOutcome::Discarded(BusError::decode(e));
                    }
                };
                let id = event.id;
                match self.handler.on_platform_published(event) {
                    Ok(()) => {
                        debug!(event = %kind, id, "Event handled");
                        ProcessOutcome::Handled(kind)
                    }
                    Err(error) => {
                        warn!(event = %kind, id, error = %error, "Event handler failed");
                        ProcessOutcome::HandlerFailed {
                            kind,
                            error: BusError::Handler(error),
                        }
                    }
                }
            }
            EventKind::Unrecognized(value) => {
                warn!(event = %value, "Could not determine event type, discarding");
                ProcessOutcome::Discarded(BusError::UnknownEventKind(value.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use platsync_protocol::PlatformRecord;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<PlatformPublishedEvent>>,
        fail: bool,
    }

    impl EventHandler for Recorder {
        fn on_platform_published(&self, event: PlatformPublishedEvent) -> Result<(), String> {
            if self.fail {
                return Err("store offline".into());
            }
            self.seen.lock().push(event);
            Ok(())
        }
    }

    fn payload() -> Vec<u8> {
        PlatformPublishedEvent::from_record(&PlatformRecord::new(3, "Kubernetes", "CNCF", "Free"))
            .encode()
            .unwrap()
    }

    #[test]
    fn dispatches_platform_published() {
        let processor = EventProcessor::new(Recorder::default());

        let outcome = processor.process(&payload());

        assert_eq!(outcome, ProcessOutcome::Handled(EventKind::PlatformPublished));
        let seen = processor.handler().seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].id, 3);
        assert_eq!(seen[0].name, "Kubernetes");
    }

    #[test]
    fn garbage_is_discarded() {
        let processor = EventProcessor::new(Recorder::default());

        let outcome = processor.process(b"\xff\x00not json");

        assert!(matches!(outcome, ProcessOutcome::Discarded(BusError::Decode(_))));
        assert!(processor.handler().seen.lock().is_empty());
    }

    #[test]
    fn missing_discriminator_is_discarded() {
        let processor = EventProcessor::new(Recorder::default());
        let outcome = processor.process(br#"{"Id":1,"Name":"x"}"#);
        assert!(matches!(outcome, ProcessOutcome::Discarded(BusError::Decode(_))));
    }

    #[test]
    fn unknown_kind_is_discarded() {
        let processor = EventProcessor::new(Recorder::default());

        let outcome =
            processor.process(br#"{"Id":1,"Name":"x","Publisher":"y","Cost":"z","Event":"Platform_Deleted"}"#);

        assert_eq!(
            outcome,
            ProcessOutcome::Discarded(BusError::UnknownEventKind("Platform_Deleted".into()))
        );
        assert!(processor.handler().seen.lock().is_empty());
    }

    #[test]
    fn recognised_kind_with_missing_fields_is_discarded() {
        let processor = EventProcessor::new(Recorder::default());
        let outcome = processor.process(br#"{"Event":"Platform_Published"}"#);
        assert!(matches!(outcome, ProcessOutcome::Discarded(BusError::Decode(_))));
    }

    #[test]
    fn handler_failure_is_reported() {
        let processor = EventProcessor::new(Recorder {
            fail: true,
            ..Default::default()
        });

        let outcome = processor.process(&payload());

        assert_eq!(
            outcome,
            ProcessOutcome::HandlerFailed {
                kind: EventKind::PlatformPublished,
                error: BusError::Handler("store offline".into()),
            }
        );
    }

    #[test]
    fn shared_processor() {
        let processor: Arc<dyn PayloadProcessor> = Arc::new(EventProcessor::new(Recorder::default()));
        assert!(processor.process(&payload()).is_handled());
    }
}
