//! Commands attached to a follower platform.

use crate::error::{SyncError, SyncResult};

/// A stored command.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandRecord {
    /// Identifier assigned by the follower's store.
    pub id: i32,
    /// Local identifier of the owning platform.
    pub platform_id: i32,
    /// What the command does.
    pub how_to: String,
    /// The command line itself.
    pub command_line: String,
}

/// A command to create, before it has an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NewCommand {
    /// What the command does.
    pub how_to: String,
    /// The command line itself.
    pub command_line: String,
}

impl NewCommand {
    /// Creates a new command.
    pub fn new(how_to: impl Into<String>, command_line: impl Into<String>) -> Self {
        Self {
            how_to: how_to.into(),
            command_line: command_line.into(),
        }
    }

    /// Checks that both fields are present.
    pub fn validate(&self) -> SyncResult<()> {
        if self.how_to.trim().is_empty() {
            return Err(SyncError::InvalidCommand("how_to is required".into()));
        }
        if self.command_line.trim().is_empty() {
            return Err(SyncError::InvalidCommand("command_line is required".into()));
        }
        Ok(())
    }

    pub(crate) fn into_record(self, id: i32, platform_id: i32) -> CommandRecord {
        CommandRecord {
            id,
            platform_id,
            how_to: self.how_to,
            command_line: self.command_line,
        }
    }
}
