//! # platsync Engine
//!
//! The following side of platform propagation.
//!
//! This crate provides:
//! - `FollowerRepository`, keyed on the owner's identifier, and an in-memory store
//! - Commands attached to a stored platform by its local identifier
//! - `SyncClient`, the one-shot bulk fetch from the owner
//! - `seed_from_peer`, startup seeding that skips platforms already present
//! - `FollowerEventHandler`, which stores platforms arriving on the bus
//! - `InboundEndpoint`, which acknowledges the owner's synchronous push
//!
//! ## Startup
//!
//! 1. Seed once from the owner (an unreachable owner seeds nothing)
//! 2. Start an `EventSubscriber` with a `FollowerEventHandler`
//! 3. Accept traffic

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod command;
mod config;
mod error;
mod handler;
mod inbound;
mod repository;
mod seed;

pub use client::SyncClient;
pub use command::{CommandRecord, NewCommand};
pub use config::{SyncConfig, DEFAULT_PEER_ADDRESS};
pub use error::{SyncError, SyncResult};
pub use handler::FollowerEventHandler;
pub use inbound::InboundEndpoint;
pub use repository::{
    ExternalPlatform, FollowerPlatform, FollowerRepository, MemoryFollowerRepository,
};
pub use seed::{seed_from_peer, seed_platforms, SeedReport};
