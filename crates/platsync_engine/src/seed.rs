//! Startup seeding from the owner.

use crate::client::SyncClient;
use crate::error::SyncResult;
use crate::repository::{ExternalPlatform, FollowerRepository};
use platsync_protocol::RpcClient;
use tracing::{debug, info};

/// Counts from one seeding pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    /// Platforms returned by the owner.
    pub fetched: usize,
    /// Platforms stored.
    pub inserted: usize,
    /// Platforms already present.
    pub skipped: usize,
}

/// Stores every platform whose owner identifier is not yet present.
pub fn seed_platforms<R: FollowerRepository + ?Sized>(
    repository: &R,
    platforms: Vec<ExternalPlatform>,
) -> SyncResult<SeedReport> {
    let mut report = SeedReport {
        fetched: platforms.len(),
        ..Default::default()
    };
    for platform in platforms {
        let external_id = platform.external_id;
        match repository.insert_if_absent(platform)? {
            Some(_) => report.inserted += 1,
            None => {
                debug!(external_id, "Platform already present");
                report.skipped += 1;
            }
        }
    }
    Ok(report)
}

/// Fetches the owner's platforms once and stores the missing ones.
///
/// An unreachable owner seeds nothing; only a failing local store is an error.
pub fn seed_from_peer<C: RpcClient, R: FollowerRepository + ?Sized>(
    client: &SyncClient<C>,
    repository: &R,
) -> SyncResult<SeedReport> {
    info!("Seeding new platforms");
    let report = seed_platforms(repository, client.fetch_all())?;
    info!(
        fetched = report.fetched,
        inserted = report.inserted,
        skipped = report.skipped,
        "Seeding finished"
    );
    Ok(report)
}
