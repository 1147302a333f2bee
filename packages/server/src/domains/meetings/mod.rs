//! Meetings domain - two-party proposals that follow a match.

pub mod coordinator;
pub mod models;

pub use coordinator::{MeetingCoordinator, MeetingProposal};
pub use models::{AcceptanceOutcome, Meeting, MeetingStatus, MeetingView};
