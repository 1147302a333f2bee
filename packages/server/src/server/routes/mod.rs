// HTTP routes
pub mod admin;
pub mod health;
pub mod meeting;
pub mod search;

pub use admin::*;
pub use health::*;
pub use meeting::*;
pub use search::*;
