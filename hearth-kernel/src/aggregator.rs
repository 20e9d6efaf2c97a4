/**
 * AGGREGATOR - Fan-out polling of every configured instance
 *
 * ROLE : Turns "instance -> people to track" into one Snapshot per cycle.
 *
 * ARCHITECTURE :
 * - one tokio task per instance, all running in parallel
 * - inside an instance, every person is fetched concurrently (join_all)
 *   together with the zone listing
 * - each task sends its InstanceSnapshot on an mpsc channel; the caller is
 *   the only owner of the merge, no map is shared between tasks
 *
 * FAILURES : always data. An instance that cannot be opened fails each of
 * its people individually; a person that fails never affects a sibling; a
 * failed zone listing only removes that instance's zones. No retries here,
 * the next poll cycle is the retry.
 */

use crate::models::{Category, SourceRef, Subject, SubjectState};
use crate::snapshot::{ErrorRecord, Failure, InstanceSnapshot, Snapshot};
use crate::source::{SourceConnector, SourceError};
use futures::future::join_all;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Instance URL -> people, as produced by the config.
pub type SourcesMap = HashMap<SourceRef, HashSet<Subject>>;

#[derive(Clone)]
pub struct Aggregator {
    connector: Arc<dyn SourceConnector>,
}

impl Aggregator {
    pub fn new(connector: Arc<dyn SourceConnector>) -> Self {
        Self { connector }
    }

    /// Polls every instance once. Never fails: partial failures live in the snapshot.
    pub async fn aggregate(&self, sources: &SourcesMap) -> Snapshot {
        let (tx, mut rx) = mpsc::channel::<(SourceRef, InstanceSnapshot)>(sources.len().max(1));

        for (source, subjects) in sources {
            let tx = tx.clone();
            let connector = self.connector.clone();
            let source = source.clone();
            let subjects = subjects.clone();

            tokio::spawn(async move {
                let instance = poll_instance(connector.as_ref(), &source, &subjects).await;
                if tx.send((source, instance)).await.is_err() {
                    debug!("aggregation receiver dropped before instance result");
                }
            });
        }
        drop(tx);

        let mut instances = Vec::with_capacity(sources.len());
        while let Some(result) = rx.recv().await {
            instances.push(result);
        }

        // a worker that panicked never reported: fail its people instead of losing them
        let reported: HashSet<&SourceRef> = instances.iter().map(|(s, _)| s).collect();
        let missing: Vec<(SourceRef, InstanceSnapshot)> = sources
            .iter()
            .filter(|(source, _)| !reported.contains(source))
            .map(|(source, subjects)| {
                warn!(url = %source.url, "poll task ended without a result");
                let cause = SourceError::Other("poll task aborted".into());
                (source.clone(), InstanceSnapshot::unavailable(subjects, cause))
            })
            .collect();
        instances.extend(missing);

        let snapshot = Snapshot::from_instance_snapshots(OffsetDateTime::now_utc(), instances);
        info!(
            people = snapshot.people.len(),
            errored_people = snapshot.errored_people.len(),
            errored_sources = snapshot.errored_sources.len(),
            locations = snapshot.locations.len(),
            "poll cycle aggregated"
        );
        snapshot
    }
}

async fn poll_instance(
    connector: &dyn SourceConnector,
    source: &SourceRef,
    subjects: &HashSet<Subject>,
) -> InstanceSnapshot {
    let client = match connector.open(source).await {
        Ok(client) => client,
        Err(e) => {
            warn!(url = %source.url, error = %e, "instance unavailable");
            return InstanceSnapshot::unavailable(subjects, e);
        }
    };
    let client = client.as_ref();

    let fetches = join_all(subjects.iter().map(|subject| async move {
        (subject, client.get_status(&subject.id).await)
    }));
    let (statuses, categories) = tokio::join!(fetches, client.list_categories());

    let mut people = HashSet::new();
    let mut errored_people = BTreeMap::new();
    for (subject, result) in statuses {
        match result {
            Ok(report) => {
                people.replace(SubjectState {
                    subject: subject.clone(),
                    source: source.clone(),
                    category: Category::resolve(&report.status),
                    image: report.image,
                });
            }
            Err(e) => {
                debug!(url = %source.url, subject = %subject.id, error = %e, "status fetch failed");
                errored_people.insert(
                    subject.clone(),
                    ErrorRecord::for_subject(subject.clone(), Failure::SubjectFetchFailed(e)),
                );
            }
        }
    }

    let categories = match categories {
        Ok(names) => Ok(names.iter().map(|n| Category::resolve(n)).collect()),
        Err(e) => {
            debug!(url = %source.url, error = %e, "zone listing failed");
            Err(Failure::CategoryListFailed(e))
        }
    };

    InstanceSnapshot { people, categories, errored_people }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::mock::{MockConnector, MockInstance};
    use std::collections::BTreeSet;

    fn subjects(people: &[(&str, &str)]) -> HashSet<Subject> {
        people.iter().map(|(n, id)| Subject::new(*n, *id)).collect()
    }

    fn categories_of(snapshot: &Snapshot, name: &str) -> Vec<String> {
        snapshot
            .people
            .iter()
            .filter(|p| p.subject.name == name)
            .map(|p| p.category.to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_failing_source_does_not_affect_other_sources() {
        let connector = MockConnector::new()
            .with_instance(
                "http://a",
                MockInstance::new()
                    .person("person.p1", "Home")
                    .person("person.p2", "Office")
                    .categories(["Home", "Office"]),
            )
            .with_instance("http://b", MockInstance::unreachable(SourceError::Timeout));
        let a = SourceRef::new("http://a", "ta");
        let b = SourceRef::new("http://b", "tb");
        let sources = SourcesMap::from([
            (a, subjects(&[("P1", "person.p1"), ("P2", "person.p2")])),
            (b.clone(), subjects(&[("P3", "person.p3")])),
        ]);

        let snapshot = Aggregator::new(Arc::new(connector)).aggregate(&sources).await;

        assert_eq!(snapshot.people.len(), 2);
        assert_eq!(categories_of(&snapshot, "P1"), vec!["Home"]);
        assert_eq!(categories_of(&snapshot, "P2"), vec!["Office"]);
        assert!(snapshot.people.iter().all(|p| p.source.url == "http://a"));

        assert_eq!(snapshot.errored_people.len(), 1);
        let p3 = &snapshot.errored_people[&(b.clone(), Subject::new("P3", "person.p3"))];
        assert_eq!(p3.line(), "P3: timeout");
        assert!(matches!(p3.failure, Failure::SourceUnavailable(SourceError::Timeout)));
        assert!(snapshot.errored_sources.contains_key(&b));

        assert!(snapshot.locations.contains(&Category::new("Home")));
        assert!(snapshot.locations.contains(&Category::new("Office")));
    }

    #[tokio::test]
    async fn test_one_failing_person_keeps_siblings() {
        let connector = MockConnector::new().with_instance(
            "http://a",
            MockInstance::new()
                .person("person.keith", "Home")
                .failing_person("person.eli", SourceError::Other("HA error".into()))
                .person("person.bill", "Away")
                .categories(["Home"]),
        );
        let a = SourceRef::new("http://a", "t");
        let sources = SourcesMap::from([(
            a.clone(),
            subjects(&[("Keith", "person.keith"), ("Eli", "person.eli"), ("Bill", "person.bill")]),
        )]);

        let snapshot = Aggregator::new(Arc::new(connector)).aggregate(&sources).await;

        assert_eq!(snapshot.people.len(), 2);
        assert_eq!(categories_of(&snapshot, "Bill"), vec!["Elsewhere"]);
        assert_eq!(snapshot.error_lines(), vec!["Eli: HA error".to_string()]);
        assert!(snapshot.errored_sources.is_empty());
        assert!(snapshot.locations.contains(&Category::new("Elsewhere")));
    }

    #[tokio::test]
    async fn test_failed_zone_listing_degrades_gracefully() {
        let connector = MockConnector::new().with_instance(
            "http://a",
            MockInstance::new()
                .person("person.keith", "Shops")
                .failing_categories(SourceError::Status { status: 500, message: "boom".into() }),
        );
        let a = SourceRef::new("http://a", "t");
        let sources = SourcesMap::from([(a.clone(), subjects(&[("Keith", "person.keith")]))]);

        let snapshot = Aggregator::new(Arc::new(connector)).aggregate(&sources).await;

        assert_eq!(snapshot.people.len(), 1);
        assert_eq!(snapshot.locations, BTreeSet::from([Category::new("Shops")]));
        assert!(matches!(
            snapshot.errored_sources[&a].failure,
            Failure::CategoryListFailed(_)
        ));
        assert!(snapshot.errored_people.is_empty());
    }

    #[tokio::test]
    async fn test_locations_cover_every_used_category() {
        let snapshot = Aggregator::new(Arc::new(MockConnector::demo()))
            .aggregate(&crate::source::mock::demo_sources())
            .await;
        for used in snapshot.used_categories() {
            assert!(snapshot.locations.contains(used), "orphan category {used}");
        }
        assert!(snapshot.locations.contains(&Category::new("Nonexistent location")));
        assert_eq!(snapshot.people.len(), 5);
        assert_eq!(snapshot.error_lines(), vec!["Eli: HA error".to_string()]);
    }

    #[tokio::test]
    async fn test_no_sources_yields_empty_snapshot() {
        let snapshot = Aggregator::new(Arc::new(MockConnector::new()))
            .aggregate(&SourcesMap::new())
            .await;
        assert!(snapshot.people.is_empty());
        assert!(snapshot.locations.is_empty());
        assert_eq!(snapshot.error_count(), 0);
    }

    #[tokio::test]
    async fn test_same_person_tracked_on_two_instances() {
        let connector = MockConnector::new()
            .with_instance("http://a", MockInstance::new().person("person.keith", "Home"))
            .with_instance(
                "http://b",
                MockInstance::new().failing_person("person.keith", SourceError::Timeout),
            );
        let keith = subjects(&[("Keith", "person.keith")]);
        let sources = SourcesMap::from([
            (SourceRef::new("http://a", "t"), keith.clone()),
            (SourceRef::new("http://b", "t"), keith),
        ]);

        let snapshot = Aggregator::new(Arc::new(connector)).aggregate(&sources).await;
        assert_eq!(categories_of(&snapshot, "Keith"), vec!["Home"]);
        assert_eq!(snapshot.errored_people.len(), 1);
    }
}
