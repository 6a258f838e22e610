//! Connection state.

use std::fmt;

/// Lifecycle state of a bus connection.
///
/// ```text
///                 connect()                 close()
/// Disconnected ─────────────► Connecting ─► Connected ─► ClosingByApplication ─┐
///      ▲                          │             │                              │
///      │◄──── connect failed ─────┘             └─► ClosingByPeer ─────────────┤
///      └───────────────────────────────────────────────────────────────────────┘
/// ```
///
/// There is no automatic reconnect: after a peer-initiated shutdown the state
/// stays `Disconnected` until the next publish or subscribe attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No link or channel.
    Disconnected,
    /// A connect attempt is in progress.
    Connecting,
    /// Link and channel are open, exchange declared.
    Connected,
    /// The application asked for the connection to close.
    ClosingByApplication,
    /// The broker or network closed the connection.
    ClosingByPeer,
}

impl ConnectionState {
    /// Returns true if publish and consume operations may proceed.
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// Returns true while a shutdown is in progress.
    pub fn is_closing(&self) -> bool {
        matches!(
            self,
            ConnectionState::ClosingByApplication | ConnectionState::ClosingByPeer
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::ClosingByApplication => "closing (application)",
            ConnectionState::ClosingByPeer => "closing (peer)",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_checks() {
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Connecting.is_connected());
        assert!(!ConnectionState::ClosingByPeer.is_connected());

        assert!(ConnectionState::ClosingByApplication.is_closing());
        assert!(ConnectionState::ClosingByPeer.is_closing());
        assert!(!ConnectionState::Disconnected.is_closing());
    }
}
