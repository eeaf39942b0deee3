/// Frontier state definitions for tracking crawl progress
///
/// Every URL known to a crawl session is in exactly one of these states.
use std::fmt;

/// Represents the current state of a URL in the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UrlState {
    /// URL has been discovered and is waiting to be dispatched
    Discovered,

    /// URL has been dispatched to a fetch that has not finished yet
    InFlight,

    /// URL was fetched and its links processed
    Done,

    /// URL could not be fetched (retries exhausted or non-retryable error)
    Failed,
}

impl UrlState {
    /// Returns true if this is a terminal state (no further processing needed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true if the URL still represents outstanding crawl work
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Discovered | Self::InFlight)
    }

    /// Returns true if moving from `self` to `next` is a legal transition
    ///
    /// Discovered → InFlight happens on dispatch; InFlight → Done/Failed when
    /// the fetch completes. Nothing leaves a terminal state.
    pub fn can_transition_to(&self, next: UrlState) -> bool {
        matches!(
            (self, next),
            (Self::Discovered, Self::InFlight)
                | (Self::InFlight, Self::Done)
                | (Self::InFlight, Self::Failed)
        )
    }

    /// Stable string form used in logs and statistics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::InFlight => "in_flight",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Parses a state from its string form
    ///
    /// Returns None if the string doesn't match any known state.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "discovered" => Some(Self::Discovered),
            "in_flight" => Some(Self::InFlight),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns all possible URL states
    pub fn all_states() -> [Self; 4] {
        [Self::Discovered, Self::InFlight, Self::Done, Self::Failed]
    }
}

impl fmt::Display for UrlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_terminal() {
        assert!(!UrlState::Discovered.is_terminal());
        assert!(!UrlState::InFlight.is_terminal());
        assert!(UrlState::Done.is_terminal());
        assert!(UrlState::Failed.is_terminal());
    }

    #[test]
    fn test_is_pending() {
        assert!(UrlState::Discovered.is_pending());
        assert!(UrlState::InFlight.is_pending());
        assert!(!UrlState::Done.is_pending());
        assert!(!UrlState::Failed.is_pending());
    }

    #[test]
    fn test_legal_transitions() {
        assert!(UrlState::Discovered.can_transition_to(UrlState::InFlight));
        assert!(UrlState::InFlight.can_transition_to(UrlState::Done));
        assert!(UrlState::InFlight.can_transition_to(UrlState::Failed));
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(!UrlState::Discovered.can_transition_to(UrlState::Done));
        assert!(!UrlState::Discovered.can_transition_to(UrlState::Failed));
        assert!(!UrlState::InFlight.can_transition_to(UrlState::InFlight));
        assert!(!UrlState::Done.can_transition_to(UrlState::InFlight));
        assert!(!UrlState::Failed.can_transition_to(UrlState::Discovered));
    }

    #[test]
    fn test_roundtrip_string() {
        for state in UrlState::all_states() {
            assert_eq!(UrlState::parse(state.as_str()), Some(state));
        }
        assert_eq!(UrlState::parse("invalid"), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", UrlState::InFlight), "in_flight");
        assert_eq!(format!("{}", UrlState::Done), "done");
    }
}
