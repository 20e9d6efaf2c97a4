//! In-memory, scripted sources
//!
//! Used by the `mock: true` demo mode and by the aggregator tests: every
//! instance, person and zone listing can be told to succeed or fail.

use super::{SourceClient, SourceConnector, SourceError, StatusReport};
use crate::models::{SourceRef, Subject};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

pub const DEMO_URL: &str = "mock.example.com";

/// Scripted behaviour of one instance.
#[derive(Debug, Clone)]
pub struct MockInstance {
    open_error: Option<SourceError>,
    statuses: HashMap<String, Result<StatusReport, SourceError>>,
    categories: Result<BTreeSet<String>, SourceError>,
}

impl Default for MockInstance {
    fn default() -> Self {
        Self {
            open_error: None,
            statuses: HashMap::new(),
            categories: Ok(BTreeSet::new()),
        }
    }
}

impl MockInstance {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instance that cannot even be opened.
    pub fn unreachable(error: SourceError) -> Self {
        Self { open_error: Some(error), ..Self::default() }
    }

    pub fn person(mut self, id: &str, status: &str) -> Self {
        self.statuses.insert(
            id.to_string(),
            Ok(StatusReport { status: status.to_string(), image: None }),
        );
        self
    }

    pub fn person_with_image(mut self, id: &str, status: &str, image: &str) -> Self {
        self.statuses.insert(
            id.to_string(),
            Ok(StatusReport { status: status.to_string(), image: Some(image.to_string()) }),
        );
        self
    }

    pub fn failing_person(mut self, id: &str, error: SourceError) -> Self {
        self.statuses.insert(id.to_string(), Err(error));
        self
    }

    pub fn categories<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = Ok(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn failing_categories(mut self, error: SourceError) -> Self {
        self.categories = Err(error);
        self
    }
}

/// Connector resolving instances by URL.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    instances: HashMap<String, Arc<MockInstance>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_instance(mut self, url: &str, instance: MockInstance) -> Self {
        self.instances.insert(url.to_string(), Arc::new(instance));
        self
    }

    /// Fixed demo household, see [`demo_sources`].
    pub fn demo() -> Self {
        Self::new().with_instance(
            DEMO_URL,
            MockInstance::new()
                .person_with_image("person.keith", "Home", "/api/image/serve/keith/512x512")
                .person("person.jennifer", "Office")
                .person("person.bill", "Office")
                .person("person.jensen", "Shops")
                .person("person.janet", "Nonexistent location")
                .failing_person("person.eli", SourceError::Other("HA error".into()))
                .categories(["Home", "Office", "Shops", "Mars", "Moon"]),
        )
    }
}

/// People tracked by the demo household.
pub fn demo_sources() -> HashMap<SourceRef, HashSet<Subject>> {
    let people = [
        ("Keith", "person.keith"),
        ("Jennifer", "person.jennifer"),
        ("Bill", "person.bill"),
        ("Jensen", "person.jensen"),
        ("Janet", "person.janet"),
        ("Eli", "person.eli"),
    ]
    .into_iter()
    .map(|(name, id)| Subject::new(name, id))
    .collect();

    HashMap::from([(SourceRef::new(DEMO_URL, "mock"), people)])
}

#[async_trait]
impl SourceConnector for MockConnector {
    async fn open(&self, source: &SourceRef) -> Result<Box<dyn SourceClient>, SourceError> {
        let instance = self
            .instances
            .get(&source.url)
            .ok_or_else(|| SourceError::Request(format!("unknown instance {}", source.url)))?;
        if let Some(e) = &instance.open_error {
            return Err(e.clone());
        }
        Ok(Box::new(MockClient { instance: instance.clone() }))
    }
}

struct MockClient {
    instance: Arc<MockInstance>,
}

#[async_trait]
impl SourceClient for MockClient {
    async fn get_status(&self, subject_id: &str) -> Result<StatusReport, SourceError> {
        match self.instance.statuses.get(subject_id) {
            Some(result) => result.clone(),
            None => Err(SourceError::Status {
                status: 404,
                message: format!("Entity not found: {subject_id}"),
            }),
        }
    }

    async fn list_categories(&self) -> Result<BTreeSet<String>, SourceError> {
        self.instance.categories.clone()
    }
}
