pub mod meeting;

pub use meeting::{AcceptanceOutcome, Meeting, MeetingStatus, MeetingView};
