//! Home Assistant REST client
//!
//! - `GET /api/`                : reachability + token check
//! - `GET /api/states/{entity}` : status of one `person.*` entity
//! - `GET /api/states`          : every entity, `zone.*` ones become categories

use super::{SourceClient, SourceConnector, SourceError, StatusReport};
use crate::models::SourceRef;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::debug;

/// Entity as returned by `/api/states`
#[derive(Debug, Deserialize)]
struct EntityState {
    entity_id: String,
    state: String,
    #[serde(default)]
    attributes: serde_json::Map<String, serde_json::Value>,
}

pub struct HomeAssistantConnector {
    http: Client,
}

impl HomeAssistantConnector {
    /// Every request made through this connector gives up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, SourceError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl SourceConnector for HomeAssistantConnector {
    async fn open(&self, source: &SourceRef) -> Result<Box<dyn SourceClient>, SourceError> {
        let base_url = Url::parse(&source.url)
            .map_err(|e| SourceError::Request(format!("invalid URL {}: {e}", source.url)))?;
        let client = HomeAssistantClient {
            http: self.http.clone(),
            base_url,
            token: source.token.clone(),
        };

        // fails fast on bad token / unreachable instance
        client.get(&["api", ""]).await?;
        debug!(url = %client.base_url, "Home Assistant API reachable");
        Ok(Box::new(client))
    }
}

struct HomeAssistantClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl HomeAssistantClient {
    /// `segments` are appended to the instance URL, each one percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, SourceError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SourceError::Request(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get(&self, segments: &[&str]) -> Result<reqwest::Response, SourceError> {
        let resp = self
            .http
            .get(self.endpoint(segments)?)
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp)
    }
}

#[async_trait]
impl SourceClient for HomeAssistantClient {
    async fn get_status(&self, subject_id: &str) -> Result<StatusReport, SourceError> {
        let entity: EntityState = self.get(&["api", "states", subject_id]).await?.json().await?;
        Ok(status_report(entity))
    }

    async fn list_categories(&self) -> Result<BTreeSet<String>, SourceError> {
        let entities: Vec<EntityState> = self.get(&["api", "states"]).await?.json().await?;
        Ok(zone_names(entities))
    }
}

fn status_report(entity: EntityState) -> StatusReport {
    // a missing picture is not a failure of the person
    let image = entity
        .attributes
        .get("entity_picture")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    StatusReport { status: entity.state, image }
}

fn zone_names(entities: Vec<EntityState>) -> BTreeSet<String> {
    entities
        .into_iter()
        .filter(|e| e.entity_id.starts_with("zone."))
        .map(|e| {
            e.attributes
                .get("friendly_name")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or(e.entity_id)
        })
        .collect()
}
