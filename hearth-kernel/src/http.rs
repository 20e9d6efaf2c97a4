/**
 * REST API HEARTH - HTTP surface of the kernel
 *
 * ROLE :
 * Exposes the latest snapshot and its clock-face rendering to wall
 * displays, dashboards and scripts.
 *
 * ROUTES :
 * - GET /health    : poller + MQTT status (no key needed)
 * - GET /snapshot  : people, zones and error lines of the last poll
 * - GET /layout    : slices + markers + error lines (render plan, JSON)
 * - GET /clock.svg : the render plan drawn as SVG
 *
 * SECURITY :
 * - header x-api-key required everywhere except /health
 * - no key configured (HEARTH_API_KEY) = every protected route refused
 * - tokens of the instances never leave the process
 */

use crate::health::{HealthTracker, KernelHealth};
use crate::layout::{plan, RadiusBand, RenderPlan};
use crate::snapshot::Snapshot;
use crate::state::SnapshotStore;
use crate::svg::render_svg;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use tracing::warn;

const CLOCK_SIZE_PX: f64 = 800.0;

#[derive(Clone)]
pub struct AppState {
    pub store: SnapshotStore,
    pub health_tracker: HealthTracker,
    pub band: RadiusBand,
    pub api_key: Option<String>,
    pub sources_tracked: usize,
    pub subjects_tracked: usize,
}

#[derive(Debug, Serialize)]
struct PersonView {
    name: String,
    id: String,
    source_url: String,
    category: String,
    image: Option<String>,
}

#[derive(Debug, Serialize)]
struct SnapshotView {
    taken_at: String, // RFC3339
    people: Vec<PersonView>,
    locations: Vec<String>,
    errors: Vec<String>,
}

fn to_view(s: &Snapshot) -> SnapshotView {
    let mut people: Vec<PersonView> = s
        .people
        .iter()
        .map(|p| PersonView {
            name: p.subject.name.clone(),
            id: p.subject.id.clone(),
            source_url: p.source.url.clone(),
            category: p.category.to_string(),
            image: p.image.clone(),
        })
        .collect();
    people.sort_by(|a, b| (&a.name, &a.id, &a.source_url).cmp(&(&b.name, &b.id, &b.source_url)));

    SnapshotView {
        taken_at: s.taken_at.format(&Rfc3339).unwrap_or_default(),
        people,
        locations: s.locations.iter().map(|c| c.to_string()).collect(),
        errors: s.error_lines(),
    }
}

async fn require_api_key(State(app): State<AppState>, req: Request, next: Next) -> Result<Response, StatusCode> {
    if req.uri().path().starts_with("/health") {
        return Ok(next.run(req).await);
    }

    let Some(expected) = app.api_key.as_deref().filter(|k| !k.is_empty()) else {
        warn!("SECURITY: HEARTH_API_KEY not set - API access denied");
        return Err(StatusCode::UNAUTHORIZED);
    };

    let ok = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == expected)
        .unwrap_or(false);

    if !ok {
        warn!("rejected request to {} (bad or missing x-api-key)", req.uri().path());
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/snapshot", get(get_snapshot))
        .route("/layout", get(get_layout))
        .route("/clock.svg", get(get_clock_svg))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_api_key))
        .with_state(app_state)
}

fn latest(app: &AppState) -> Result<Arc<Snapshot>, StatusCode> {
    app.store.latest().ok_or(StatusCode::SERVICE_UNAVAILABLE)
}

// GET /health
async fn get_health(State(app): State<AppState>) -> Json<KernelHealth> {
    Json(app.health_tracker.get_health(app.sources_tracked, app.subjects_tracked))
}

// GET /snapshot
async fn get_snapshot(State(app): State<AppState>) -> Result<Json<SnapshotView>, StatusCode> {
    let snapshot = latest(&app)?;
    Ok(Json(to_view(&snapshot)))
}

// GET /layout
async fn get_layout(State(app): State<AppState>) -> Result<Json<RenderPlan>, StatusCode> {
    let snapshot = latest(&app)?;
    Ok(Json(plan(&snapshot, app.band)))
}

// GET /clock.svg
async fn get_clock_svg(State(app): State<AppState>) -> Result<Response, StatusCode> {
    let snapshot = latest(&app)?;
    let svg = render_svg(&plan(&snapshot, app.band), CLOCK_SIZE_PX);
    Ok(([(header::CONTENT_TYPE, "image/svg+xml")], svg).into_response())
}
