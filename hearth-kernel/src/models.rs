use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Status literals that are always relabeled before use.
const SPECIAL_CATEGORIES: &[(&str, &str)] = &[("Away", "Elsewhere")];

/// One Home Assistant instance: endpoint + long-lived token.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
pub struct SourceRef {
    pub url: String,
    pub token: String,
}

impl SourceRef {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self { url: url.into(), token: token.into() }
    }
}

// never print the token
impl fmt::Debug for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceRef")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// A tracked person, as written in the config (`person.keith`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Subject {
    pub name: String,
    pub id: String,
}

impl Subject {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self { name: name.into(), id: id.into() }
    }
}

/// Group label a person currently belongs to (a zone, "Elsewhere"...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Category(String);

impl Category {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// Category for a raw status literal, after the fixed relabeling rules.
    pub fn resolve(status: &str) -> Self {
        let label = SPECIAL_CATEGORIES
            .iter()
            .find(|(raw, _)| *raw == status)
            .map(|(_, canonical)| *canonical)
            .unwrap_or(status);
        Self(label.to_string())
    }

    /// Key of the lone slice drawn when no category is known at all.
    pub fn unassigned() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Successful status of one subject at one source.
///
/// Identity is (subject, source) only: a later fetch of the same person on
/// the same instance replaces the earlier entry in a set.
#[derive(Debug, Clone)]
pub struct SubjectState {
    pub subject: Subject,
    pub source: SourceRef,
    pub category: Category,
    pub image: Option<String>,
}

impl PartialEq for SubjectState {
    fn eq(&self, other: &Self) -> bool {
        self.subject == other.subject && self.source == other.source
    }
}

impl Eq for SubjectState {}

impl Hash for SubjectState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.subject.hash(state);
        self.source.hash(state);
    }
}
