//! The follower's local copy of platforms.

use crate::command::{CommandRecord, NewCommand};
use crate::error::{SyncError, SyncResult};
use parking_lot::RwLock;
use platsync_protocol::{PlatformId, PlatformPublishedEvent, PlatformRecord, PlatformWire};
use std::sync::Arc;

/// A platform as stored by the follower.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FollowerPlatform {
    /// Identifier assigned by the follower's store.
    pub id: i32,
    /// The owner's identifier.
    pub external_id: PlatformId,
    /// Platform name.
    pub name: String,
    /// Publishing organisation.
    pub publisher: String,
}

/// A platform received from the owner, before it has a local identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExternalPlatform {
    /// The owner's identifier.
    pub external_id: PlatformId,
    /// Platform name.
    pub name: String,
    /// Publishing organisation.
    pub publisher: String,
}

impl ExternalPlatform {
    /// Creates an external platform.
    pub fn new(external_id: PlatformId, name: impl Into<String>, publisher: impl Into<String>) -> Self {
        Self {
            external_id,
            name: name.into(),
            publisher: publisher.into(),
        }
    }
}

impl From<PlatformWire> for ExternalPlatform {
    fn from(wire: PlatformWire) -> Self {
        Self::new(wire.id, wire.name, wire.publisher)
    }
}

impl From<&PlatformPublishedEvent> for ExternalPlatform {
    fn from(event: &PlatformPublishedEvent) -> Self {
        Self::new(event.id, event.name.clone(), event.publisher.clone())
    }
}

impl From<&PlatformRecord> for ExternalPlatform {
    fn from(record: &PlatformRecord) -> Self {
        Self::new(record.id, record.name.clone(), record.publisher.clone())
    }
}

/// Storage for the follower's platforms, keyed by the owner's identifier.
pub trait FollowerRepository: Send + Sync {
    /// Returns every platform in insertion order.
    fn all(&self) -> SyncResult<Vec<FollowerPlatform>>;

    /// Returns true if a platform with this owner identifier is stored.
    fn external_platform_exists(&self, external_id: PlatformId) -> SyncResult<bool>;

    /// Stores a platform unless its owner identifier is already present, as
    /// one atomic step.
    ///
    /// Returns `None` if it was already present.
    fn insert_if_absent(&self, platform: ExternalPlatform) -> SyncResult<Option<FollowerPlatform>>;

    /// Returns true if a platform with this local identifier is stored.
    fn platform_exists(&self, platform_id: i32) -> SyncResult<bool>;

    /// Returns the commands of a platform in creation order.
    ///
    /// Fails with `PlatformNotFound` for an unknown platform.
    fn commands_for_platform(&self, platform_id: i32) -> SyncResult<Vec<CommandRecord>>;

    /// Returns one command of a platform, or `None` if either is unknown.
    fn command(&self, platform_id: i32, command_id: i32) -> SyncResult<Option<CommandRecord>>;

    /// Attaches a new command to a platform.
    ///
    /// Fails with `PlatformNotFound` for an unknown platform.
    fn create_command(&self, platform_id: i32, command: NewCommand) -> SyncResult<CommandRecord>;
}

impl<R: FollowerRepository + ?Sized> FollowerRepository for Arc<R> {
    fn all(&self) -> SyncResult<Vec<FollowerPlatform>> {
        (**self).all()
    }

    fn external_platform_exists(&self, external_id: PlatformId) -> SyncResult<bool> {
        (**self).external_platform_exists(external_id)
    }

    fn insert_if_absent(&self, platform: ExternalPlatform) -> SyncResult<Option<FollowerPlatform>> {
        (**self).insert_if_absent(platform)
    }

    fn platform_exists(&self, platform_id: i32) -> SyncResult<bool> {
        (**self).platform_exists(platform_id)
    }

    fn commands_for_platform(&self, platform_id: i32) -> SyncResult<Vec<CommandRecord>> {
        (**self).commands_for_platform(platform_id)
    }

    fn command(&self, platform_id: i32, command_id: i32) -> SyncResult<Option<CommandRecord>> {
        (**self).command(platform_id, command_id)
    }

    fn create_command(&self, platform_id: i32, command: NewCommand) -> SyncResult<CommandRecord> {
        (**self).create_command(platform_id, command)
    }
}

/// In-memory follower store. Local identifiers start at 1.
pub struct MemoryFollowerRepository {
    inner: RwLock<FollowerState>,
}

struct FollowerState {
    platforms: Vec<FollowerPlatform>,
    next_id: i32,
    commands: Vec<CommandRecord>,
    next_command_id: i32,
}

impl FollowerState {
    fn has_platform(&self, platform_id: i32) -> bool {
        self.platforms.iter().any(|p| p.id == platform_id)
    }
}

fn next_identifier(next: &mut i32) -> SyncResult<i32> {
    let id = *next;
    *next = id
        .checked_add(1)
        .ok_or_else(|| SyncError::Repository("identifier space exhausted".into()))?;
    Ok(id)
}

impl MemoryFollowerRepository {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(FollowerState {
                platforms: Vec::new(),
                next_id: 1,
                commands: Vec::new(),
                next_command_id: 1,
            }),
        }
    }

    /// Returns the number of stored platforms.
    pub fn platform_count(&self) -> usize {
        self.inner.read().platforms.len()
    }

    /// Returns the platform with the given owner identifier.
    pub fn by_external_id(&self, external_id: PlatformId) -> Option<FollowerPlatform> {
        self.inner
            .read()
            .platforms
            .iter()
            .find(|p| p.external_id == external_id)
            .cloned()
    }
}

impl Default for MemoryFollowerRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl FollowerRepository for MemoryFollowerRepository {
    fn all(&self) -> SyncResult<Vec<FollowerPlatform>> {
        Ok(self.inner.read().platforms.clone())
    }

    fn external_platform_exists(&self, external_id: PlatformId) -> SyncResult<bool> {
        Ok(self
            .inner
            .read()
            .platforms
            .iter()
            .any(|p| p.external_id == external_id))
    }

    fn insert_if_absent(&self, platform: ExternalPlatform) -> SyncResult<Option<FollowerPlatform>> {
        let mut state = self.inner.write();
        if state
            .platforms
            .iter()
            .any(|p| p.external_id == platform.external_id)
        {
            return Ok(None);
        }

        let id = next_identifier(&mut state.next_id)?;
        let stored = FollowerPlatform {
            id,
            external_id: platform.external_id,
            name: platform.name,
            publisher: platform.publisher,
        };
        state.platforms.push(stored.clone());
        Ok(Some(stored))
    }

    fn platform_exists(&self, platform_id: i32) -> SyncResult<bool> {
        Ok(self.inner.read().has_platform(platform_id))
    }

    fn commands_for_platform(&self, platform_id: i32) -> SyncResult<Vec<CommandRecord>> {
        let state = self.inner.read();
        if !state.has_platform(platform_id) {
            return Err(SyncError::PlatformNotFound(platform_id));
        }
        Ok(state
            .commands
            .iter()
            .filter(|c| c.platform_id == platform_id)
            .cloned()
            .collect())
    }

    fn command(&self, platform_id: i32, command_id: i32) -> SyncResult<Option<CommandRecord>> {
        Ok(self
            .inner
            .read()
            .commands
            .iter()
            .find(|c| c.platform_id == platform_id && c.id == command_id)
            .cloned())
    }

    fn create_command(&self, platform_id: i32, command: NewCommand) -> SyncResult<CommandRecord> {
        command.validate()?;
        let mut state = self.inner.write();
        if !state.has_platform(platform_id) {
            return Err(SyncError::PlatformNotFound(platform_id));
        }

        let id = next_identifier(&mut state.next_command_id)?;
        let stored = command.into_record(id, platform_id);
        state.commands.push(stored.clone());
        Ok(stored)
    }
}
