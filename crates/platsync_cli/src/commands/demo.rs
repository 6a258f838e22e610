//! Demo command implementation.

use platsync_bus::{
    BusConfig, EventProcessor, EventPublisher, EventSubscriber, MemoryBroker, SubscriberHandle,
    SubscriberState,
};
use platsync_engine::{
    seed_from_peer, FollowerEventHandler, InboundEndpoint, MemoryFollowerRepository, SyncClient,
    SyncConfig,
};
use platsync_protocol::{LoopbackClient, NewPlatform};
use platsync_server::{
    CommandPushClient, MemoryPlatformRepository, PlatformRepository, PlatformService, PushConfig,
    SeedRetryRunner, SyncServer,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const DELIVERY_WAIT: Duration = Duration::from_secs(2);

/// Demo parameters.
pub struct DemoOptions {
    /// Broker host.
    pub broker_host: String,
    /// Broker port.
    pub broker_port: u16,
    /// Owner address for the bulk fetch.
    pub peer_address: String,
    /// Number of followers.
    pub followers: usize,
    /// Names of the platforms to create.
    pub create: Vec<String>,
    /// Make the broker unreachable before creating.
    pub broker_down: bool,
}

/// Demo result.
#[derive(Debug, Serialize)]
pub struct DemoResult {
    /// Broker address.
    pub broker: String,
    /// Records on the owner after the run.
    pub owner_platforms: usize,
    /// One entry per created platform.
    pub created: Vec<CreatedPlatform>,
    /// One entry per follower.
    pub followers: Vec<FollowerSummary>,
}

/// What happened to one created platform.
#[derive(Debug, Serialize)]
pub struct CreatedPlatform {
    /// Owner-assigned identifier.
    pub id: i32,
    /// Platform name.
    pub name: String,
    /// Whether the push was answered.
    pub pushed: bool,
    /// Whether the event reached the broker.
    pub published: bool,
}

/// One follower's state after the run.
#[derive(Debug, Serialize)]
pub struct FollowerSummary {
    /// Follower index.
    pub index: usize,
    /// Platforms stored by seeding.
    pub seeded: usize,
    /// Platforms stored in total.
    pub platforms: usize,
    /// Events received on the bus.
    pub events_received: u64,
    /// Pushes acknowledged.
    pub pushes_received: u64,
}

struct Follower {
    repository: Arc<MemoryFollowerRepository>,
    inbound: Arc<InboundEndpoint>,
    subscriber: SubscriberHandle,
    seeded: usize,
}

/// Runs the demo command.
pub async fn run(options: DemoOptions, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let bus_config = BusConfig::new(options.broker_host.clone(), options.broker_port);
    let broker = MemoryBroker::new(bus_config.endpoint());

    let owner = Arc::new(MemoryPlatformRepository::new());
    SeedRetryRunner::default().prepare_population(owner.as_ref(), None)?;
    let sync_server = Arc::new(SyncServer::new(Arc::clone(&owner)));

    let mut followers = Vec::with_capacity(options.followers);
    for index in 0..options.followers {
        let repository = Arc::new(MemoryFollowerRepository::new());
        let client = SyncClient::new(
            LoopbackClient::new(Arc::clone(&sync_server)),
            SyncConfig::new(options.peer_address.clone()),
        );
        let seeded = seed_from_peer(&client, repository.as_ref())?.inserted;

        let subscriber = EventSubscriber::with_connector(
            Arc::new(broker.clone()),
            bus_config.clone(),
            EventProcessor::new(FollowerEventHandler::new(Arc::clone(&repository))),
        )
        .spawn();
        let state = subscriber.wait_for(SubscriberState::Consuming).await;
        info!(follower = index, state = %state, "Follower started");

        followers.push(Follower {
            repository,
            inbound: Arc::new(InboundEndpoint::new()),
            subscriber,
            seeded,
        });
    }

    if options.broker_down {
        broker.set_reachable(false);
    }

    // The push goes to the first follower only, as with a single configured address.
    let push_target = followers
        .first()
        .map(|f| Arc::clone(&f.inbound))
        .unwrap_or_default();
    let publisher = Arc::new(EventPublisher::with_connector(
        Arc::new(broker.clone()),
        bus_config.clone(),
    ));
    let service = PlatformService::new(
        Arc::clone(&owner),
        CommandPushClient::new(LoopbackClient::new(push_target), PushConfig::default()),
        Arc::clone(&publisher),
    );

    let mut created = Vec::with_capacity(options.create.len());
    for name in &options.create {
        let report = service
            .create_platform(NewPlatform::new(name.clone(), "Demo", "Free"))
            .await?;
        created.push(CreatedPlatform {
            id: report.record.id,
            name: report.record.name,
            pushed: report.push.is_delivered(),
            published: report.publish.is_sent(),
        });
    }

    let expected_events = created.iter().filter(|c| c.published).count();
    let mut summaries = Vec::with_capacity(followers.len());
    for (index, follower) in followers.into_iter().enumerate() {
        wait_for_platforms(&follower.repository, follower.seeded + expected_events).await;
        let report = follower.subscriber.stop().await;
        summaries.push(FollowerSummary {
            index,
            seeded: follower.seeded,
            platforms: follower.repository.platform_count(),
            events_received: report.stats.received,
            pushes_received: follower.inbound.received(),
        });
    }
    publisher.shutdown().await;

    let result = DemoResult {
        broker: format!("{}:{}", options.broker_host, options.broker_port),
        owner_platforms: owner.all()?.len(),
        created,
        followers: summaries,
    };

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

async fn wait_for_platforms(repository: &MemoryFollowerRepository, count: usize) {
    let deadline = tokio::time::Instant::now() + DELIVERY_WAIT;
    while repository.platform_count() < count && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn print_text_output(result: &DemoResult) {
    println!("Broker: {}", result.broker);
    println!("Owner platforms: {}", result.owner_platforms);
    println!();
    println!("Created:");
    for platform in &result.created {
        println!(
            "  #{} {:<24} pushed: {:<5} published: {}",
            platform.id, platform.name, platform.pushed, platform.published
        );
    }
    println!();
    println!("Followers:");
    for follower in &result.followers {
        println!(
            "  [{}] seeded: {}, platforms: {}, events: {}, pushes: {}",
            follower.index,
            follower.seeded,
            follower.platforms,
            follower.events_received,
            follower.pushes_received
        );
    }
}
