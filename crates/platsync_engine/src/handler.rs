//! Follower handling of broadcast events.

use crate::repository::{ExternalPlatform, FollowerRepository};
use platsync_bus::EventHandler;
use platsync_protocol::PlatformPublishedEvent;
use tracing::{info, warn};

/// Stores published platforms in the follower's repository.
///
/// A platform that is already present is not an error.
pub struct FollowerEventHandler<R> {
    repository: R,
}

impl<R: FollowerRepository> FollowerEventHandler<R> {
    /// Creates a handler over a repository.
    pub fn new(repository: R) -> Self {
        Self { repository }
    }

    /// Returns the repository.
    pub fn repository(&self) -> &R {
        &self.repository
    }
}

impl<R: FollowerRepository> EventHandler for FollowerEventHandler<R> {
    fn on_platform_published(&self, event: PlatformPublishedEvent) -> Result<(), String> {
        let platform = ExternalPlatform::from(&event);
        match self.repository.insert_if_absent(platform) {
            Ok(Some(stored)) => {
                info!(
                    external_id = stored.external_id,
                    id = stored.id,
                    name = %stored.name,
                    "Platform added"
                );
                Ok(())
            }
            Ok(None) => {
                info!(external_id = event.id, "Platform already exists");
                Ok(())
            }
            Err(e) => {
                warn!(external_id = event.id, error = %e, "Could not add platform");
                Err(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandRecord, NewCommand};
    use crate::error::{SyncError, SyncResult};
    use crate::repository::{FollowerPlatform, MemoryFollowerRepository};
    use platsync_bus::{EventProcessor, PayloadProcessor, ProcessOutcome};
    use platsync_protocol::{EventKind, PlatformId, PlatformRecord};

    fn event(id: PlatformId) -> PlatformPublishedEvent {
        PlatformPublishedEvent::from_record(&PlatformRecord::new(id, "Kubernetes", "CNCF", "Free"))
    }

    struct BrokenRepository;

    impl FollowerRepository for BrokenRepository {
        fn all(&self) -> SyncResult<Vec<FollowerPlatform>> {
            Err(SyncError::Repository("offline".into()))
        }

        fn external_platform_exists(&self, _external_id: PlatformId) -> SyncResult<bool> {
            Err(SyncError::Repository("offline".into()))
        }

        fn insert_if_absent(
            &self,
            _platform: ExternalPlatform,
        ) -> SyncResult<Option<FollowerPlatform>> {
            Err(SyncError::Repository("offline".into()))
        }

        fn platform_exists(&self, _platform_id: i32) -> SyncResult<bool> {
            Err(SyncError::Repository("offline".into()))
        }

        fn commands_for_platform(&self, _platform_id: i32) -> SyncResult<Vec<CommandRecord>> {
            Err(SyncError::Repository("offline".into()))
        }

        fn command(&self, _platform_id: i32, _command_id: i32) -> SyncResult<Option<CommandRecord>> {
            Err(SyncError::Repository("offline".into()))
        }

        fn create_command(&self, _platform_id: i32, _command: NewCommand) -> SyncResult<CommandRecord> {
            Err(SyncError::Repository("offline".into()))
        }
    }

    #[test]
    fn stores_new_platform() {
        let handler = FollowerEventHandler::new(MemoryFollowerRepository::new());

        handler.on_platform_published(event(5)).unwrap();

        let stored = handler.repository().by_external_id(5).unwrap();
        assert_eq!(stored.name, "Kubernetes");
        assert_eq!(stored.publisher, "CNCF");
    }

    #[test]
    fn redelivery_is_accepted_once_stored() {
        let handler = FollowerEventHandler::new(MemoryFollowerRepository::new());

        handler.on_platform_published(event(5)).unwrap();
        handler.on_platform_published(event(5)).unwrap();

        assert_eq!(handler.repository().platform_count(), 1);
    }

    #[test]
    fn store_failure_reaches_processor_as_handler_failure() {
        let processor = EventProcessor::new(FollowerEventHandler::new(BrokenRepository));

        let outcome = processor.process(&event(1).encode().unwrap());

        assert!(matches!(
            outcome,
            ProcessOutcome::HandlerFailed {
                kind: EventKind::PlatformPublished,
                ..
            }
        ));
    }
}
