//! Typed ID definitions for the matching entities.
//!
//! User ids are opaque strings owned by the account service (they are email
//! addresses in practice) and are not wrapped here.

pub use super::id::Id;

// ============================================================================
// Entity marker types
// ============================================================================

/// Marker type for SearchRequest entities.
pub struct SearchRequestEntity;

/// Marker type for Match entities.
pub struct MatchEntity;

/// Marker type for Meeting entities (confirmation proposals).
pub struct MeetingEntity;

// ============================================================================
// Type aliases - the primary API
// ============================================================================

pub type SearchRequestId = Id<SearchRequestEntity>;

pub type MatchId = Id<MatchEntity>;

pub type MeetingId = Id<MeetingEntity>;

/// Order-independent key for a pair of users.
///
/// `pair_key("b", "a") == pair_key("a", "b")`. The separator cannot appear in
/// an email local part without quoting, so distinct pairs never collide in
/// practice.
pub fn pair_key(a: &str, b: &str) -> String {
    if a <= b {
        format!("{}|{}", a, b)
    } else {
        format!("{}|{}", b, a)
    }
}
