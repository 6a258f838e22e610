//! # platsync Server
//!
//! The owning side of platform propagation.
//!
//! This crate provides:
//! - `PlatformRepository` and an in-memory store
//! - `SyncServer`, which answers the followers' bulk fetch
//! - `CommandPushClient`, the best-effort push to a follower
//! - `PlatformService`, the create path that feeds both channels
//! - `SeedRetryRunner`, startup migration with linear backoff and default data
//!
//! ## Key Invariants
//!
//! - A create succeeds locally regardless of push or publish failures
//! - Push and publish are attempted independently and never retried
//! - Seeding inserts defaults only into an empty store

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod push;
mod repository;
mod seed;
mod server;
mod service;

pub use config::{MigrationRetryPolicy, PushConfig, DEFAULT_FOLLOWER_ADDRESS};
pub use error::{ServerError, ServerResult};
pub use push::{CommandPushClient, PushOutcome};
pub use repository::{MemoryPlatformRepository, PlatformRepository};
pub use seed::{default_platforms, MigrationOutcome, Migrator, SeedReport, SeedRetryRunner};
pub use server::SyncServer;
pub use service::{CreateReport, PlatformService};
