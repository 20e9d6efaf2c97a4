/**
 * SNAPSHOT - Merged view of every instance for one poll cycle
 *
 * ROLE :
 * Holds the per-instance results (InstanceSnapshot) and folds them into the
 * single immutable Snapshot consumed by the layout and the API.
 *
 * OPERATION :
 * - people     : union of every successful SubjectState
 * - locations  : union of every listed zone + every zone actually used
 * - errors     : per (instance, person) attempt and per instance, never thrown
 *
 * A Snapshot is built from scratch each cycle and never mutated afterwards.
 */

use crate::models::{Category, SourceRef, Subject, SubjectState};
use crate::source::SourceError;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use time::OffsetDateTime;

/// What went wrong, by stage. Display is the underlying cause only.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Failure {
    /// Client open/auth failed for the whole instance
    #[error("{0}")]
    SourceUnavailable(SourceError),
    #[error("{0}")]
    SubjectFetchFailed(SourceError),
    #[error("{0}")]
    CategoryListFailed(SourceError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorTarget {
    Subject(Subject),
    Source(SourceRef),
}

/// A failure tied to a person or to an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub target: ErrorTarget,
    pub failure: Failure,
}

impl ErrorRecord {
    pub fn for_subject(subject: Subject, failure: Failure) -> Self {
        Self { target: ErrorTarget::Subject(subject), failure }
    }

    pub fn for_source(source: SourceRef, failure: Failure) -> Self {
        Self { target: ErrorTarget::Source(source), failure }
    }

    /// Person name, or instance URL.
    pub fn name(&self) -> &str {
        match &self.target {
            ErrorTarget::Subject(s) => &s.name,
            ErrorTarget::Source(s) => &s.url,
        }
    }

    /// `"<name>: <cause>"`
    pub fn line(&self) -> String {
        format!("{}: {}", self.name(), self.failure)
    }
}

/// Result of polling one instance.
#[derive(Debug, Clone)]
pub struct InstanceSnapshot {
    pub people: HashSet<SubjectState>,
    /// Zones listed by the instance, or why they could not be listed
    pub categories: Result<BTreeSet<Category>, Failure>,
    pub errored_people: BTreeMap<Subject, ErrorRecord>,
}

impl InstanceSnapshot {
    /// Instance that could not be opened: every person inherits the cause.
    pub fn unavailable<'a>(subjects: impl IntoIterator<Item = &'a Subject>, error: SourceError) -> Self {
        let failure = Failure::SourceUnavailable(error);
        let errored_people = subjects
            .into_iter()
            .map(|s| (s.clone(), ErrorRecord::for_subject(s.clone(), failure.clone())))
            .collect();
        Self {
            people: HashSet::new(),
            categories: Err(failure),
            errored_people,
        }
    }
}

/// Everything known after one poll cycle.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub taken_at: OffsetDateTime,
    pub people: HashSet<SubjectState>,
    pub locations: BTreeSet<Category>,
    /// Keyed per attempt: the same person may succeed on one instance and fail on another
    pub errored_people: BTreeMap<(SourceRef, Subject), ErrorRecord>,
    pub errored_sources: BTreeMap<SourceRef, ErrorRecord>,
}

impl Snapshot {
    /// Folds per-instance results; order of `instances` does not matter.
    pub fn from_instance_snapshots(
        taken_at: OffsetDateTime,
        instances: impl IntoIterator<Item = (SourceRef, InstanceSnapshot)>,
    ) -> Self {
        let mut snapshot = Snapshot {
            taken_at,
            people: HashSet::new(),
            locations: BTreeSet::new(),
            errored_people: BTreeMap::new(),
            errored_sources: BTreeMap::new(),
        };

        for (source, instance) in instances {
            for state in instance.people {
                snapshot.people.replace(state);
            }
            for (subject, record) in instance.errored_people {
                snapshot.errored_people.insert((source.clone(), subject), record);
            }
            match instance.categories {
                Ok(categories) => snapshot.locations.extend(categories),
                Err(failure) => {
                    snapshot
                        .errored_sources
                        .insert(source.clone(), ErrorRecord::for_source(source, failure));
                }
            }
        }

        // no person may end up in a zone without a slice
        let used: Vec<Category> = snapshot.used_categories().into_iter().cloned().collect();
        snapshot.locations.extend(used);
        snapshot
    }

    /// Categories referenced by at least one resolved person.
    pub fn used_categories(&self) -> BTreeSet<&Category> {
        self.people.iter().map(|p| &p.category).collect()
    }

    /// One line per failed person attempt, then one per failed instance.
    pub fn error_lines(&self) -> Vec<String> {
        self.errored_people
            .values()
            .chain(self.errored_sources.values())
            .map(ErrorRecord::line)
            .collect()
    }

    pub fn error_count(&self) -> usize {
        self.errored_people.len() + self.errored_sources.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(name: &str, source: &SourceRef, category: &str) -> SubjectState {
        SubjectState {
            subject: Subject::new(name, format!("person.{}", name.to_lowercase())),
            source: source.clone(),
            category: Category::new(category),
            image: None,
        }
    }

    fn now() -> OffsetDateTime {
        OffsetDateTime::UNIX_EPOCH
    }

    #[test]
    fn test_used_category_missing_from_listing_is_added() {
        let a = SourceRef::new("http://a", "t");
        let instance = InstanceSnapshot {
            people: HashSet::from([state("Janet", &a, "Nonexistent location")]),
            categories: Ok(BTreeSet::from([Category::new("Home")])),
            errored_people: BTreeMap::new(),
        };
        let snapshot = Snapshot::from_instance_snapshots(now(), [(a, instance)]);
        assert!(snapshot.locations.contains(&Category::new("Home")));
        assert!(snapshot.locations.contains(&Category::new("Nonexistent location")));
        for used in snapshot.used_categories() {
            assert!(snapshot.locations.contains(used));
        }
    }

    #[test]
    fn test_failed_category_listing_keeps_people() {
        let a = SourceRef::new("http://a", "t");
        let instance = InstanceSnapshot {
            people: HashSet::from([state("Keith", &a, "Home")]),
            categories: Err(Failure::CategoryListFailed(SourceError::Timeout)),
            errored_people: BTreeMap::new(),
        };
        let snapshot = Snapshot::from_instance_snapshots(now(), [(a.clone(), instance)]);
        assert_eq!(snapshot.people.len(), 1);
        assert_eq!(snapshot.locations, BTreeSet::from([Category::new("Home")]));
        assert_eq!(snapshot.errored_sources[&a].line(), "http://a: timeout");
    }

    #[test]
    fn test_same_person_success_and_failure_on_two_instances() {
        let a = SourceRef::new("http://a", "t");
        let b = SourceRef::new("http://b", "t");
        let keith = Subject::new("Keith", "person.keith");

        let ok = InstanceSnapshot {
            people: HashSet::from([state("Keith", &a, "Home")]),
            categories: Ok(BTreeSet::new()),
            errored_people: BTreeMap::new(),
        };
        let failed = InstanceSnapshot {
            people: HashSet::new(),
            categories: Ok(BTreeSet::new()),
            errored_people: BTreeMap::from([(
                keith.clone(),
                ErrorRecord::for_subject(
                    keith.clone(),
                    Failure::SubjectFetchFailed(SourceError::Other("HA error".into())),
                ),
            )]),
        };

        let snapshot = Snapshot::from_instance_snapshots(now(), [(a, ok), (b.clone(), failed)]);
        assert_eq!(snapshot.people.len(), 1);
        assert!(snapshot.errored_people.contains_key(&(b, keith)));
        assert_eq!(snapshot.error_lines(), vec!["Keith: HA error".to_string()]);
    }

    #[test]
    fn test_unavailable_instance_fails_every_person() {
        let people = [Subject::new("P3", "person.p3"), Subject::new("P4", "person.p4")];
        let instance = InstanceSnapshot::unavailable(&people, SourceError::Timeout);
        assert!(instance.people.is_empty());
        assert_eq!(instance.errored_people.len(), 2);
        assert!(matches!(instance.categories, Err(Failure::SourceUnavailable(_))));
        assert_eq!(instance.errored_people[&people[0]].line(), "P3: timeout");
    }

    #[test]
    fn test_merge_is_order_independent() {
        let a = SourceRef::new("http://a", "t");
        let b = SourceRef::new("http://b", "t");
        let ia = InstanceSnapshot {
            people: HashSet::from([state("Keith", &a, "Home")]),
            categories: Ok(BTreeSet::from([Category::new("Home"), Category::new("Moon")])),
            errored_people: BTreeMap::new(),
        };
        let ib = InstanceSnapshot {
            people: HashSet::from([state("Bill", &b, "Office")]),
            categories: Err(Failure::CategoryListFailed(SourceError::Timeout)),
            errored_people: BTreeMap::new(),
        };

        let one = Snapshot::from_instance_snapshots(now(), [(a.clone(), ia.clone()), (b.clone(), ib.clone())]);
        let two = Snapshot::from_instance_snapshots(now(), [(b, ib), (a, ia)]);
        assert_eq!(one.people, two.people);
        assert_eq!(one.locations, two.locations);
        assert_eq!(one.error_lines(), two.error_lines());
    }
}
