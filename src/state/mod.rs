//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `UrlState`: state of an individual URL in the frontier (discovered, in flight, done, failed)
//! - `SessionState`: lifecycle of a crawl session (idle, running, finished)
//! - `SessionOutcome`: how a finished session ended

mod session;
mod url_state;

// Re-export main types
pub use session::{SessionOutcome, SessionState};
pub use url_state::UrlState;
