//! Startup migration and default data.

use crate::config::MigrationRetryPolicy;
use crate::error::{ServerError, ServerResult};
use crate::repository::PlatformRepository;
use platsync_protocol::{NewPlatform, PlatformRecord};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Applies the schema migration for the backing store.
pub trait Migrator: Send + Sync {
    /// Runs the migration once.
    fn migrate(&self) -> Result<(), String>;
}

/// Result of running the migration under a retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// No migrator was supplied.
    Skipped,
    /// The migration succeeded.
    Applied {
        /// Attempts made, including the successful one.
        attempts: u32,
    },
    /// Every attempt failed.
    Abandoned {
        /// Attempts made.
        attempts: u32,
        /// Error reported by the last attempt.
        last_error: String,
    },
}

impl MigrationOutcome {
    /// Converts an abandoned migration into an error.
    pub fn into_result(self) -> ServerResult<Self> {
        match self {
            MigrationOutcome::Abandoned {
                attempts,
                last_error,
            } => Err(ServerError::MigrationFailure {
                attempts,
                last_error,
            }),
            other => Ok(other),
        }
    }
}

/// What startup preparation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedReport {
    /// Migration result.
    pub migration: MigrationOutcome,
    /// Records inserted by seeding; empty if the store already had data.
    pub seeded: Vec<PlatformRecord>,
}

/// The records a fresh store is populated with.
pub fn default_platforms() -> Vec<NewPlatform> {
    vec![
        NewPlatform::new("Dot Net", "Microsoft", "Free"),
        NewPlatform::new("SQL Server Express", "Microsoft", "Free"),
        NewPlatform::new("Kubernetes", "Cloud Native Computing Foundation", "Free"),
    ]
}

/// Runs the migration with bounded linear backoff, then seeds defaults.
pub struct SeedRetryRunner {
    policy: MigrationRetryPolicy,
    sleeper: Arc<dyn Fn(Duration) + Send + Sync>,
}

impl SeedRetryRunner {
    /// Creates a runner that blocks the current thread between attempts.
    pub fn new(policy: MigrationRetryPolicy) -> Self {
        Self {
            policy,
            sleeper: Arc::new(std::thread::sleep),
        }
    }

    /// Replaces the function used to wait between attempts.
    pub fn with_sleeper(mut self, sleeper: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Returns the retry policy.
    pub fn policy(&self) -> &MigrationRetryPolicy {
        &self.policy
    }

    /// Runs the migration until it succeeds or the policy is exhausted.
    ///
    /// Never panics and never returns an error; a failed migration is
    /// reported as [`MigrationOutcome::Abandoned`].
    pub fn run_migration(&self, migrator: &dyn Migrator) -> MigrationOutcome {
        info!(max_attempts = self.policy.max_attempts, "Applying migrations");
        let mut attempt = 1;
        loop {
            let error = match migrator.migrate() {
                Ok(()) => {
                    info!(attempts = attempt, "Migrations applied");
                    return MigrationOutcome::Applied { attempts: attempt };
                }
                Err(e) => e,
            };

            match self.policy.delay_after_failure(attempt) {
                Some(delay) => {
                    warn!(
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "Could not run migrations, retrying"
                    );
                    (self.sleeper)(delay);
                    attempt += 1;
                }
                None => {
                    warn!(attempts = attempt, error = %error, "Could not run migrations, giving up");
                    return MigrationOutcome::Abandoned {
                        attempts: attempt,
                        last_error: error,
                    };
                }
            }
        }
    }

    /// Migrates (if a migrator is given) and seeds [`default_platforms`] into
    /// an empty store.
    ///
    /// Seeding runs even when the migration was abandoned. Running this again
    /// never duplicates records.
    pub fn prepare_population<R: PlatformRepository + ?Sized>(
        &self,
        repository: &R,
        migrator: Option<&dyn Migrator>,
    ) -> ServerResult<SeedReport> {
        let migration = match migrator {
            Some(migrator) => self.run_migration(migrator),
            None => MigrationOutcome::Skipped,
        };

        let seeded = repository.create_all_if_empty(default_platforms())?;
        if seeded.is_empty() {
            info!("Store already has data, not seeding");
        } else {
            info!(count = seeded.len(), "Seeded default platforms");
        }

        Ok(SeedReport { migration, seeded })
    }
}

impl Default for SeedRetryRunner {
    fn default() -> Self {
        Self::new(MigrationRetryPolicy::default())
    }
}
