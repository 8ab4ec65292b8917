#[cfg(test)]
#[path = "state_test.rs"]
mod state_test;

use std::fmt;

/// Gathering state of a [`crate::stream::Stream`] (RFC 8445 §5.1.1.2).
#[derive(Default, Debug, PartialEq, Eq, Copy, Clone)]
pub enum GatheringState {
    #[default]
    Unspecified,
    New,
    Gathering,
    Complete,
}

impl fmt::Display for GatheringState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            GatheringState::Unspecified => "unspecified",
            GatheringState::New => "new",
            GatheringState::Gathering => "gathering",
            GatheringState::Complete => "complete",
        };
        write!(f, "{s}")
    }
}

/// Per-component connection state (RFC 8445 §8). Monotone in reachability
/// except for the `Failed` absorbing sink.
#[derive(Default, Debug, PartialEq, Eq, Copy, Clone)]
pub enum ConnectionState {
    #[default]
    Unspecified,
    New,
    Checking,
    Connected,
    Completed,
    Failed,
    Disconnected,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            ConnectionState::Unspecified => "Unspecified",
            ConnectionState::New => "New",
            ConnectionState::Checking => "Checking",
            ConnectionState::Connected => "Connected",
            ConnectionState::Completed => "Completed",
            ConnectionState::Failed => "Failed",
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Closed => "Closed",
        };
        write!(f, "{s}")
    }
}

impl ConnectionState {
    /// `true` once no further forward progress is possible without a
    /// fresh ICE restart.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Failed | ConnectionState::Closed)
    }
}

/// State of a single candidate pair on a checklist (RFC 8445 §6.1.2.2).
#[derive(Default, Debug, PartialEq, Eq, Copy, Clone, Hash)]
pub enum PairState {
    #[default]
    Frozen,
    Waiting,
    InProgress,
    Succeeded,
    Failed,
}

impl fmt::Display for PairState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            PairState::Frozen => "frozen",
            PairState::Waiting => "waiting",
            PairState::InProgress => "in-progress",
            PairState::Succeeded => "succeeded",
            PairState::Failed => "failed",
        };
        write!(f, "{s}")
    }
}
