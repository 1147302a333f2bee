// Business domains
pub mod matching;
pub mod meetings;
pub mod search;
