// Meal Match - API Core
//
// Pairs nearby users who are searching for a meal partner, then coordinates a
// two-party meeting proposal between them.
//
// Domains live in domains/*; infrastructure (stores, task transport,
// collaborators, scheduled jobs) lives in kernel/.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
