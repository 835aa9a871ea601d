//! Compact tag model
//!
//! Tags are written as `key[=value][;key=value...]`. Keys are case-insensitive
//! but keep their original spelling; a bare key carries no value.

use super::types::{GraphError, GraphResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
struct TagEntry {
    key: String,
    value: Option<String>,
}

/// Ordered key → optional value mapping with unordered equality
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "Option<String>", into = "String")]
pub struct Tags {
    /// Lower-cased key -> entry (keeps insertion order)
    entries: IndexMap<String, TagEntry>,
}

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a tag string. Empty input yields an empty mapping.
    pub fn parse(text: &str) -> GraphResult<Self> {
        let mut tags = Tags::new();

        for segment in text.split(';') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }

            match segment.split_once('=') {
                Some((key, value)) => tags.set(key.trim(), Some(value.trim()))?,
                None => tags.set(segment, None)?,
            }
        }

        Ok(tags)
    }

    /// Parse an optional tag string; `None` yields an empty mapping
    pub fn parse_opt(text: Option<&str>) -> GraphResult<Self> {
        match text {
            Some(text) => Self::parse(text),
            None => Ok(Self::new()),
        }
    }

    /// Set a tag, replacing any value stored under the same key
    pub fn set(&mut self, key: &str, value: Option<&str>) -> GraphResult<()> {
        validate_key(key)?;
        if let Some(value) = value {
            validate_value(key, value)?;
        }

        let entry = TagEntry {
            key: key.to_string(),
            value: value.map(str::to_string),
        };
        self.entries.insert(key.to_lowercase(), entry);
        Ok(())
    }

    /// Builder-style variant of [`Tags::set`]
    pub fn with(mut self, key: &str, value: Option<&str>) -> GraphResult<Self> {
        self.set(key, value)?;
        Ok(self)
    }

    /// Value of a tag: `None` if absent, `Some(None)` for a bare key
    pub fn get(&self, key: &str) -> Option<Option<&str>> {
        self.entries
            .get(&key.to_lowercase())
            .map(|entry| entry.value.as_deref())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&key.to_lowercase())
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.shift_remove(&key.to_lowercase()).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate tags in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries
            .values()
            .map(|entry| (entry.key.as_str(), entry.value.as_deref()))
    }

    /// Check that every tag of `filter` is present here.
    ///
    /// A bare filter key only requires presence; a valued one requires equality.
    pub fn contains_all(&self, filter: &Tags) -> bool {
        filter.entries.iter().all(|(lower, wanted)| {
            match (self.entries.get(lower), &wanted.value) {
                (None, _) => false,
                (Some(_), None) => true,
                (Some(entry), Some(value)) => entry.value.as_deref() == Some(value.as_str()),
            }
        })
    }

    /// Render as `key=value;key` pairs, optionally sorted case-insensitively
    pub fn to_tag_string(&self, sorted: bool) -> String {
        let mut entries: Vec<&TagEntry> = self.entries.values().collect();
        if sorted {
            entries.sort_by_key(|entry| entry.key.to_lowercase());
        }

        entries
            .iter()
            .map(|entry| match &entry.value {
                Some(value) => format!("{}={}", entry.key, value),
                None => entry.key.clone(),
            })
            .collect::<Vec<_>>()
            .join(";")
    }
}

fn validate_key(key: &str) -> GraphResult<()> {
    if key.is_empty() {
        return Err(GraphError::BadRequest("tag key is empty".to_string()));
    }
    if key
        .chars()
        .any(|c| c == ';' || c == '=' || c.is_whitespace() || c.is_control())
    {
        return Err(GraphError::BadRequest(format!(
            "tag key '{}' contains invalid characters",
            key
        )));
    }
    Ok(())
}

fn validate_value(key: &str, value: &str) -> GraphResult<()> {
    if value.chars().any(|c| c == ';' || c.is_control()) {
        return Err(GraphError::BadRequest(format!(
            "value of tag '{}' contains invalid characters",
            key
        )));
    }
    // Parsing trims values, so padding would not survive a round trip
    if value.trim() != value {
        return Err(GraphError::BadRequest(format!(
            "value of tag '{}' has leading or trailing whitespace",
            key
        )));
    }
    Ok(())
}

impl PartialEq for Tags {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self.entries.iter().all(|(lower, entry)| {
                other
                    .entries
                    .get(lower)
                    .is_some_and(|theirs| theirs.value == entry.value)
            })
    }
}

impl Eq for Tags {}

impl fmt::Display for Tags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_tag_string(false))
    }
}

impl FromStr for Tags {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tags::parse(s)
    }
}

impl TryFrom<Option<String>> for Tags {
    type Error = GraphError;

    fn try_from(value: Option<String>) -> Result<Self, Self::Error> {
        Tags::parse_opt(value.as_deref())
    }
}

impl From<Tags> for String {
    fn from(tags: Tags) -> Self {
        tags.to_tag_string(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pairs_and_bare_keys() {
        let tags = Tags::parse("name=alice;admin;team=core").unwrap();
        assert_eq!(tags.len(), 3);
        assert_eq!(tags.get("name"), Some(Some("alice")));
        assert_eq!(tags.get("admin"), Some(None));
        assert_eq!(tags.get("missing"), None);
    }

    #[test]
    fn test_parse_empty_input() {
        assert!(Tags::parse("").unwrap().is_empty());
        assert!(Tags::parse_opt(None).unwrap().is_empty());
        assert!(Tags::parse(" ; ;").unwrap().is_empty());
    }

    #[test]
    fn test_value_splits_on_first_equals() {
        let tags = Tags::parse("expr=a=b").unwrap();
        assert_eq!(tags.get("expr"), Some(Some("a=b")));
    }

    #[test]
    fn test_invalid_characters() {
        assert!(Tags::parse("bad key=1").is_err());
        assert!(Tags::parse("=value").is_err());

        let mut tags = Tags::new();
        let err = tags.set("ok", Some("a;b")).unwrap_err();
        assert!(matches!(err, GraphError::BadRequest(_)));
    }

    #[test]
    fn test_case_insensitive_keys() {
        let tags = Tags::parse("Name=alice").unwrap();
        assert!(tags.contains_key("name"));
        assert!(tags.contains_key("NAME"));

        let mut tags = tags;
        tags.set("NAME", Some("bob")).unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags.get("name"), Some(Some("bob")));
    }

    #[test]
    fn test_unordered_equality() {
        let a = Tags::parse("x=1;y;z=3").unwrap();
        let b = Tags::parse("Z=3;x=1;Y").unwrap();
        assert_eq!(a, b);

        let c = Tags::parse("x=1;y=2;z=3").unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_to_string_sorted() {
        let tags = Tags::parse("b=2;A;c=3").unwrap();
        assert_eq!(tags.to_tag_string(false), "b=2;A;c=3");
        assert_eq!(tags.to_tag_string(true), "A;b=2;c=3");
    }

    #[test]
    fn test_round_trip() {
        let tags = Tags::new()
            .with("owner", Some("ops"))
            .unwrap()
            .with("pinned", None)
            .unwrap()
            .with("empty", Some(""))
            .unwrap();
        let parsed = Tags::parse(&tags.to_string()).unwrap();
        assert_eq!(parsed, tags);
    }

    #[test]
    fn test_padded_values_rejected() {
        let mut tags = Tags::new();
        assert!(tags.set("k", Some(" padded ")).is_err());
        assert!(tags.set("k", Some("padded\t")).is_err());
        assert!(tags.is_empty());

        // Inner spaces survive the round trip
        tags.set("k", Some("two words")).unwrap();
        let back = Tags::parse(&tags.to_string()).unwrap();
        assert_eq!(back, tags);
        assert_eq!(back.get("k"), Some(Some("two words")));

        // Parsing still tolerates padding around segments
        assert_eq!(Tags::parse(" k = padded ").unwrap().get("k"), Some(Some("padded")));
    }

    #[test]
    fn test_contains_all() {
        let tags = Tags::parse("role=admin;active;team=core").unwrap();
        assert!(tags.contains_all(&Tags::parse("role=admin").unwrap()));
        assert!(tags.contains_all(&Tags::parse("team").unwrap()));
        assert!(tags.contains_all(&Tags::new()));
        assert!(!tags.contains_all(&Tags::parse("role=user").unwrap()));
        assert!(!tags.contains_all(&Tags::parse("missing").unwrap()));
    }

    #[test]
    fn test_serde_as_string() {
        let tags = Tags::parse("a=1;b").unwrap();
        let json = serde_json::to_string(&tags).unwrap();
        assert_eq!(json, "\"a=1;b\"");

        let back: Tags = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tags);

        let null: Tags = serde_json::from_str("null").unwrap();
        assert!(null.is_empty());
    }
}
