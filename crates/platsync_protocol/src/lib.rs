//! # platsync Protocol
//!
//! Shared data shapes for propagating platform records from the owning
//! service to its followers.
//!
//! This crate provides:
//! - `PlatformRecord` and `NewPlatform` (the canonical record and its create input)
//! - `PlatformPublishedEvent` and `EventKind` for the broadcast channel (JSON)
//! - `GetAllRequest` / `PlatformResponse` for the bulk-fetch call (CBOR)
//! - The `RpcClient` seam used by both point-to-point calls
//!
//! Apart from the `RpcClient` trait this is a pure protocol crate with no I/O.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod event;
mod messages;
mod record;
mod rpc;

pub use error::{CodecError, CodecResult};
pub use event::{EventEnvelope, EventKind, PlatformPublishedEvent, PLATFORM_PUBLISHED};
pub use messages::{
    GetAllRequest, PlatformResponse, PlatformWire, GET_ALL_PLATFORMS, INBOUND_ACK,
    INBOUND_PLATFORMS,
};
pub use record::{NewPlatform, PlatformId, PlatformRecord};
pub use rpc::{join_url, path_of, LoopbackClient, LoopbackServer, MockRpcClient, RpcClient};
