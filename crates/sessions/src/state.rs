use std::fmt;

use serde::Serialize;

/// Lifecycle of one session worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Starting,
    Pairing,
    Connected,
    /// Transport dropped; the protocol client is reconnecting on its own.
    Reconnecting,
    Disconnecting,
    Terminated,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "Starting",
            Self::Pairing => "Pairing",
            Self::Connected => "Connected",
            Self::Reconnecting => "Reconnecting",
            Self::Disconnecting => "Disconnecting",
            Self::Terminated => "Terminated",
        }
    }

    /// A live, authenticated connection (possibly mid-reconnect).
    pub fn is_logged_in(self) -> bool {
        matches!(self, Self::Connected | Self::Reconnecting)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a worker is shutting down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `StopSession` or tenant deletion.
    Requested,
    LoggedOut,
    PairingTimeout,
    PairingFailed,
    ProtocolFatal,
    /// Process shutdown: the tenant stays marked connected so the next
    /// start reconnects it.
    Shutdown,
}

impl StopReason {
    pub fn clears_connected(self) -> bool {
        !matches!(self, Self::Shutdown)
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Requested => "requested",
            Self::LoggedOut => "logged out",
            Self::PairingTimeout => "pairing timeout",
            Self::PairingFailed => "pairing failed",
            Self::ProtocolFatal => "protocol failure",
            Self::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}
