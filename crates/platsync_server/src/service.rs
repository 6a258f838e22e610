//! The owner's platform service.
//!
//! A create stores the record locally and then propagates it over both
//! channels independently. Neither propagation result can fail the create.

use crate::error::{ServerError, ServerResult};
use crate::push::{CommandPushClient, PushOutcome};
use crate::repository::PlatformRepository;
use platsync_bus::{EventPublisher, PublishOutcome};
use platsync_protocol::{NewPlatform, PlatformId, PlatformPublishedEvent, PlatformRecord, RpcClient};
use std::sync::Arc;
use tokio::task;
use tracing::{info, warn};

/// Result of a create: the stored record and what each channel did with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateReport {
    /// The stored record.
    pub record: PlatformRecord,
    /// Outcome of the synchronous push.
    pub push: PushOutcome,
    /// Outcome of the broadcast.
    pub publish: PublishOutcome,
}

/// Owns platform records and propagates new ones to followers.
pub struct PlatformService<R, C> {
    repository: R,
    push: Arc<CommandPushClient<C>>,
    publisher: Arc<EventPublisher>,
}

impl<R: PlatformRepository, C: RpcClient + 'static> PlatformService<R, C> {
    /// Creates a service.
    pub fn new(repository: R, push: CommandPushClient<C>, publisher: Arc<EventPublisher>) -> Self {
        Self {
            repository,
            push: Arc::new(push),
            publisher,
        }
    }

    /// Returns the store.
    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Returns every platform.
    pub fn get_platforms(&self) -> ServerResult<Vec<PlatformRecord>> {
        self.repository.all()
    }

    /// Returns one platform.
    pub fn get_platform(&self, id: PlatformId) -> ServerResult<Option<PlatformRecord>> {
        self.repository.get(id)
    }

    /// Stores a platform, then pushes and publishes it.
    ///
    /// Fails only if the input is invalid or the store fails. The push is a
    /// blocking call and runs on the blocking pool while the event is
    /// published, so a slow follower never stalls the runtime.
    pub async fn create_platform(&self, platform: NewPlatform) -> ServerResult<CreateReport> {
        validate(&platform)?;
        let record = self.repository.create(platform)?;
        info!(id = record.id, name = %record.name, "Platform created");

        let push_client = Arc::clone(&self.push);
        let pushed = record.clone();
        let push_task = task::spawn_blocking(move || push_client.send_platform(&pushed));

        let publish = self
            .publisher
            .publish(&PlatformPublishedEvent::from_record(&record))
            .await;
        let push = match push_task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(id = record.id, error = %e, "Push task failed");
                PushOutcome::Failed(format!("push task failed: {e}"))
            }
        };

        Ok(CreateReport {
            record,
            push,
            publish,
        })
    }
}

fn validate(platform: &NewPlatform) -> ServerResult<()> {
    let fields = [
        ("Name", &platform.name),
        ("Publisher", &platform.publisher),
        ("Cost", &platform.cost),
    ];
    for (field, value) in fields {
        if value.trim().is_empty() {
            return Err(ServerError::InvalidRequest(format!("{field} is required")));
        }
    }
    Ok(())
}
