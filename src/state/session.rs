/// Crawl session lifecycle
use std::fmt;

/// Lifecycle of one crawl session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Created, nothing dispatched yet
    Idle,
    /// Dispatching batches
    Running,
    /// Finished in the given outcome
    Finished(SessionOutcome),
}

/// How a session ended
///
/// Both outcomes are normal: sessions never end in an error state, failures
/// are reported per URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionOutcome {
    /// The frontier ran out of work
    Completed,
    /// A page or product limit (or an external stop) ended the session early
    StoppedByLimit,
}

impl SessionOutcome {
    /// Stable string form used in logs and the runs table
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::StoppedByLimit => "stopped_by_limit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(Self::Completed),
            "stopped_by_limit" => Some(Self::StoppedByLimit),
            _ => None,
        }
    }
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SessionState {
    /// Returns the outcome if the session has finished
    pub fn outcome(&self) -> Option<SessionOutcome> {
        match self {
            Self::Finished(outcome) => Some(*outcome),
            _ => None,
        }
    }
}
