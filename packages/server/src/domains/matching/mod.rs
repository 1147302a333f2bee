pub mod events;
pub mod finder;
pub mod intake;
pub mod models;
pub mod status;
pub mod store;

// Re-export commonly used types
pub use events::MatchFoundEvent;
pub use finder::{evaluate, MatchQuery};
pub use intake::{SubmitOutcome, TaskIntake};
pub use models::{Match, MatchStatus, MatchView};
pub use status::{SearchProgress, SearchStatusReader, SearchStatusReport};
pub use store::MatchStore;
