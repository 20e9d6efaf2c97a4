/**
 * LAYOUT - Clock-face placement of zones and people
 *
 * ROLE :
 * Splits the circle into one equal slice per category and places each
 * person's marker on the middle ray of its category's slice.
 *
 * CONVENTIONS :
 * - screen coordinates: y grows downwards, angles grow clockwise, 0 = 3 o'clock
 * - slice 0 starts at 12 o'clock (BASE_OFFSET = -PI/2)
 * - slices are assigned in lexicographic order of the category label
 * - radii are fractions of the wheel radius, the presenter scales them
 * - text rotations are clockwise degrees, 0 = horizontal and upright
 */

use crate::models::{Category, Subject, SubjectState};
use crate::snapshot::Snapshot;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::f64::consts::{FRAC_PI_2, PI, TAU};
use tracing::warn;

/// 12 o'clock in screen coordinates
pub const BASE_OFFSET: f64 = -FRAC_PI_2;

/// Radians between two sampled points of a slice's arc
pub const VERTEX_ANGLE: f64 = TAU / 100.0;

/// Angular span of one category. The slice covers `[stop_angle, start_angle)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Slice {
    pub start_angle: f64,
    pub stop_angle: f64,
}

impl Slice {
    pub fn middle_angle(&self) -> f64 {
        (self.start_angle + self.stop_angle) / 2.0
    }

    pub fn span(&self) -> f64 {
        self.start_angle - self.stop_angle
    }

    /// Polygon of the slice on the unit circle: centre first, then the arc
    /// walked from `start_angle` down to `stop_angle`.
    pub fn outline(&self) -> Vec<(f64, f64)> {
        let point = |angle: f64| (angle.cos(), angle.sin());

        let mut vertices = vec![(0.0, 0.0)];
        let mut angle = self.start_angle;
        while angle > self.stop_angle {
            vertices.push(point(angle));
            angle -= VERTEX_ANGLE;
        }
        vertices.push(point(self.stop_angle));
        vertices
    }
}

/// Result of [`layout`]: one slice per category, all of the same span.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub arc_angle: f64,
    pub slices: BTreeMap<Category, Slice>,
}

impl Layout {
    pub fn slice(&self, category: &Category) -> Option<&Slice> {
        self.slices.get(category)
    }
}

/// Divides the circle between `categories`.
///
/// An empty set still yields a single full-circle slice (keyed by
/// [`Category::unassigned`]) so nothing downstream divides by zero.
pub fn layout(categories: &BTreeSet<Category>) -> Layout {
    if categories.is_empty() {
        let slice = Slice { start_angle: BASE_OFFSET + TAU, stop_angle: BASE_OFFSET };
        return Layout {
            arc_angle: TAU,
            slices: BTreeMap::from([(Category::unassigned(), slice)]),
        };
    }

    let arc_angle = TAU / categories.len() as f64;
    let slices = categories
        .iter()
        .enumerate()
        .map(|(i, category)| {
            let stop_angle = BASE_OFFSET + i as f64 * arc_angle;
            let slice = Slice { start_angle: stop_angle + arc_angle, stop_angle };
            (category.clone(), slice)
        })
        .collect();

    Layout { arc_angle, slices }
}

/// Maps any angle into `[-PI, PI)`.
pub fn normalize_radians(rad: f64) -> f64 {
    let normalized = (rad + PI).rem_euclid(TAU) - PI;
    // rem_euclid may round up to TAU for inputs just below a multiple of it
    if normalized >= PI {
        normalized - TAU
    } else {
        normalized
    }
}

/// True when text laid along `angle` would read upside down (lower half).
pub fn is_upside_down(angle: f64) -> bool {
    normalize_radians(angle) > 0.0
}

/// Clockwise rotation, in degrees within `[-180, 180)`, for a horizontal
/// label centred on the ray at `angle`; lower-half labels get an extra 180.
pub fn text_rotation_degrees(angle: f64) -> f64 {
    let mut degrees = 90.0 + angle.to_degrees();
    if is_upside_down(angle) {
        degrees += 180.0;
    }
    (degrees + 180.0).rem_euclid(360.0) - 180.0
}

pub fn lerp(start: f64, end: f64, percent: f64) -> f64 {
    start + (end - start) * percent
}

/// Radial band, as fractions of the wheel radius, where markers are staggered.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadiusBand {
    pub min_radius: f64,
    pub max_radius: f64,
}

impl Default for RadiusBand {
    fn default() -> Self {
        Self { min_radius: 0.1, max_radius: 0.9 }
    }
}

impl RadiusBand {
    /// Radius of the `index`-th of `population` markers sharing a slice.
    pub fn radius_for(&self, index: usize, population: usize) -> f64 {
        let t = if population <= 1 {
            0.5
        } else {
            index as f64 / (population - 1) as f64
        };
        lerp(self.min_radius, self.max_radius, t)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlacementError {
    #[error("category not found")]
    CategoryNotFound(Category),
}

/// Where one person is drawn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub subject: Subject,
    pub source_url: String,
    pub category: Category,
    pub angle: f64,
    pub radius: f64,
    pub rotation_degrees: f64,
    pub image: Option<String>,
}

/// Places every person on its category's middle ray.
///
/// People sharing a slice are staggered along the ray, ordered by person id
/// (then name, then instance URL) so the result does not depend on set order.
pub fn place_markers<'a>(
    layout: &Layout,
    people: impl IntoIterator<Item = &'a SubjectState>,
    band: RadiusBand,
) -> (Vec<Marker>, Vec<(Subject, PlacementError)>) {
    let mut by_category: BTreeMap<&Category, Vec<&SubjectState>> = BTreeMap::new();
    for person in people {
        by_category.entry(&person.category).or_default().push(person);
    }

    let mut markers = Vec::new();
    let mut unplaced = Vec::new();
    for (category, mut population) in by_category {
        population.sort_by(|a, b| {
            (&a.subject.id, &a.subject.name, &a.source.url)
                .cmp(&(&b.subject.id, &b.subject.name, &b.source.url))
        });

        let Some(slice) = layout.slice(category) else {
            for person in population {
                warn!(subject = %person.subject.id, category = %category, "no slice for category");
                unplaced.push((
                    person.subject.clone(),
                    PlacementError::CategoryNotFound(category.clone()),
                ));
            }
            continue;
        };

        let angle = slice.middle_angle();
        let count = population.len();
        for (i, person) in population.into_iter().enumerate() {
            markers.push(Marker {
                subject: person.subject.clone(),
                source_url: person.source.url.clone(),
                category: category.clone(),
                angle,
                radius: band.radius_for(i, count),
                rotation_degrees: text_rotation_degrees(angle),
                image: person.image.clone(),
            });
        }
    }

    (markers, unplaced)
}

/// One slice as handed to the presenter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SliceView {
    pub category: Category,
    #[serde(flatten)]
    pub slice: Slice,
    pub span: f64,
    pub middle_angle: f64,
    pub label_rotation_degrees: f64,
}

/// Everything the presenter needs for one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderPlan {
    /// Span shared by every slice
    pub arc_angle: f64,
    pub slices: Vec<SliceView>,
    pub markers: Vec<Marker>,
    pub errors: Vec<String>,
}

/// Layout + markers + error lines for `snapshot`.
pub fn plan(snapshot: &Snapshot, band: RadiusBand) -> RenderPlan {
    let layout = layout(&snapshot.locations);

    let slices = layout
        .slices
        .iter()
        .map(|(category, slice)| SliceView {
            category: category.clone(),
            slice: *slice,
            span: slice.span(),
            middle_angle: slice.middle_angle(),
            label_rotation_degrees: text_rotation_degrees(slice.middle_angle()),
        })
        .collect();

    let (markers, unplaced) = place_markers(&layout, &snapshot.people, band);

    let mut errors = snapshot.error_lines();
    errors.extend(unplaced.iter().map(|(subject, e)| format!("{}: {}", subject.name, e)));

    RenderPlan { arc_angle: layout.arc_angle, slices, markers, errors }
}
