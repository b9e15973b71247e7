//! Fog-of-war accumulation.

use std::sync::Arc;

use geo::{MultiPolygon, Polygon};
use tracing::{debug, warn};

use crate::geodesy::{
    GeoPoint,
    area::{ExploredArea, GeometryError, area_m2, circle, merge_geometry},
};

/// Unions one disc into the explored area.
pub type MergeFn = fn(&ExploredArea, &Polygon<f64>) -> Result<ExploredArea, GeometryError>;

/// What the renderer should reveal right now.
#[derive(Debug, Clone)]
pub enum Visibility {
    /// Just the disc around the player; nothing is being counted.
    Preview(Arc<ExploredArea>),
    Explored(Arc<ExploredArea>),
}

impl Visibility {
    pub fn area(&self) -> &Arc<ExploredArea> {
        match self {
            Visibility::Preview(area) | Visibility::Explored(area) => area,
        }
    }
}

pub struct ExplorationAccumulator {
    radius_m: f64,
    steps: usize,
    merge: MergeFn,
    accumulated: Option<Arc<ExploredArea>>,
    visible: Option<Visibility>,
    dirty: bool,
    failed_merges: u64,
}

impl ExplorationAccumulator {
    pub fn new(radius_m: f64, steps: usize) -> Self {
        Self::with_merge(radius_m, steps, merge_geometry)
    }

    /// Use `merge` instead of [`merge_geometry`] to grow the area.
    pub fn with_merge(radius_m: f64, steps: usize, merge: MergeFn) -> Self {
        Self {
            radius_m,
            steps,
            merge,
            accumulated: None,
            visible: None,
            dirty: false,
            failed_merges: 0,
        }
    }

    /// Seed from persisted state. Only meaningful before the first fix.
    pub fn restore(&mut self, area: ExploredArea) {
        if area.0.is_empty() {
            return;
        }

        debug!(
            polygons = area.0.len(),
            area_m2 = area_m2(&area),
            "restored explored area"
        );
        self.accumulated = Some(Arc::new(area));
    }

    fn disc(&self, center: GeoPoint) -> Polygon<f64> {
        circle(center, self.radius_m, self.steps)
    }

    /// Fold a fix into the explored area.
    pub fn update(&mut self, position: GeoPoint) -> Arc<ExploredArea> {
        let disc = self.disc(position);

        let next = match self.accumulated.as_deref() {
            None => MultiPolygon::new(vec![disc]),
            Some(previous) if previous.0.is_empty() => MultiPolygon::new(vec![disc]),
            Some(previous) => match (self.merge)(previous, &disc) {
                Ok(merged) => merged,
                Err(error) => {
                    self.failed_merges += 1;
                    warn!(
                        %error,
                        failed_merges = self.failed_merges,
                        "explored area merge failed, keeping previous area"
                    );

                    let kept = self
                        .accumulated
                        .clone()
                        .unwrap_or_else(|| Arc::new(MultiPolygon::new(vec![])));
                    self.visible = Some(Visibility::Explored(Arc::clone(&kept)));
                    return kept;
                }
            },
        };

        let next = Arc::new(next);
        self.accumulated = Some(Arc::clone(&next));
        self.visible = Some(Visibility::Explored(Arc::clone(&next)));
        self.dirty = true;
        next
    }

    /// Expose only the instantaneous disc without touching the accumulated area.
    pub fn preview(&mut self, position: GeoPoint) -> Arc<ExploredArea> {
        let area = Arc::new(MultiPolygon::new(vec![self.disc(position)]));
        self.visible = Some(Visibility::Preview(Arc::clone(&area)));
        area
    }

    pub fn visible(&self) -> Option<&Visibility> {
        self.visible.as_ref()
    }

    pub fn accumulated(&self) -> Option<&Arc<ExploredArea>> {
        self.accumulated.as_ref()
    }

    pub fn coverage_m2(&self) -> f64 {
        self.accumulated.as_deref().map(area_m2).unwrap_or(0.0)
    }

    pub fn failed_merges(&self) -> u64 {
        self.failed_merges
    }

    /// Returns the area to persist if it changed since the last call.
    pub fn take_dirty(&mut self) -> Option<Arc<ExploredArea>> {
        if !std::mem::take(&mut self.dirty) {
            return None;
        }

        Some(
            self.accumulated
                .clone()
                .unwrap_or_else(|| Arc::new(MultiPolygon::new(vec![]))),
        )
    }

    /// Clear everything. The cleared state is itself persisted.
    pub fn reset(&mut self) {
        self.accumulated = None;
        self.visible = None;
        self.dirty = true;
    }
}
