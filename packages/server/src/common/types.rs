// Common types used across multiple domains and layers
//
// These types are shared between the kernel and domain layers to avoid
// circular dependencies while maintaining type safety.

use serde::{Deserialize, Serialize};

/// A venue preference attached to a search, or the venue a match is for.
///
/// Clients send the catalog record they picked, so both the catalog id
/// (`_id` in older payloads) and the display name are optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Venue {
    #[serde(default, alias = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Venue {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: Some(name.into()),
        }
    }

    /// A venue with neither a name nor an id does not constrain matching.
    pub fn is_unset(&self) -> bool {
        let blank = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());
        blank(&self.id) && blank(&self.name)
    }

    /// Drops empty venues so stored filters are either meaningful or absent.
    pub fn normalize(venue: Option<Venue>) -> Option<Venue> {
        venue.filter(|v| !v.is_unset())
    }

    /// Exact, case-sensitive comparison by name; ids decide only when
    /// neither side carries a name.
    pub fn same_as(&self, other: &Venue) -> bool {
        match (&self.name, &other.name) {
            (Some(a), Some(b)) => a == b,
            (None, None) => self.id.is_some() && self.id == other.id,
            _ => false,
        }
    }

    /// The string handed to the venue catalog for enrichment.
    pub fn lookup_key(&self) -> Option<&str> {
        self.name.as_deref().or(self.id.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_as_is_case_sensitive() {
        assert!(Venue::named("Curry House").same_as(&Venue::named("Curry House")));
        assert!(!Venue::named("Curry House").same_as(&Venue::named("curry house")));
    }

    #[test]
    fn test_same_as_falls_back_to_id() {
        let a = Venue {
            id: Some("v1".into()),
            name: None,
        };
        let b = Venue {
            id: Some("v1".into()),
            name: None,
        };
        assert!(a.same_as(&b));
        assert!(!a.same_as(&Venue::default()));
    }

    #[test]
    fn test_normalize_drops_blank_venues() {
        assert_eq!(Venue::normalize(Some(Venue::named("  "))), None);
        assert_eq!(Venue::normalize(Some(Venue::default())), None);
        assert!(Venue::normalize(Some(Venue::named("Curry House"))).is_some());
    }

    #[test]
    fn test_accepts_legacy_id_field() {
        let v: Venue = serde_json::from_str(r#"{"_id": "abc", "name": "Curry House"}"#).unwrap();
        assert_eq!(v.id.as_deref(), Some("abc"));
    }
}
