//! Secondary collisions of overlay droplets against water and solid geometry.

use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};

use glam::Vec2;
use liquid_sandbox_core::{
    CastHit, CellCoord, GridGeometry, LayerMask, SceneQuery, SolidCollision, SurfaceDetection,
    WaterView,
};

use crate::parcel::Ledger;

/// Fill ratio at which a sampled cell counts as the water surface.
const SURFACE_FILL_RATIO: f32 = 0.3;

/// Cached set of surface cells, rebuilt on a fixed interval.
#[derive(Debug, Default)]
pub(crate) struct SurfaceCache {
    cells: HashSet<CellCoord>,
    since_rebuild: Duration,
    stale: bool,
}

impl SurfaceCache {
    pub(crate) fn new() -> Self {
        Self {
            stale: true,
            ..Self::default()
        }
    }

    pub(crate) fn invalidate(&mut self) {
        self.stale = true;
    }

    /// Rebuilds the cache when the interval elapsed or the grid changed.
    pub(crate) fn refresh(&mut self, dt: Duration, interval: Duration, view: WaterView<'_>) {
        self.since_rebuild = self.since_rebuild.saturating_add(dt);
        if !self.stale && self.since_rebuild < interval {
            return;
        }
        self.since_rebuild = Duration::ZERO;
        self.stale = false;
        let geometry = view.geometry();
        self.cells = (0..geometry.cell_count())
            .filter_map(|index| geometry.cell_at(index))
            .filter(|cell| view.is_surface(*cell))
            .collect();
    }

    pub(crate) fn contains(&self, cell: CellCoord) -> bool {
        self.cells.contains(&cell)
    }
}

/// Solid cells bucketed by coarse grid blocks.
#[derive(Debug, Default)]
pub(crate) struct SolidHash {
    bucket_cells: u32,
    buckets: HashMap<(i32, i32), Vec<CellCoord>>,
    dirty: bool,
}

impl SolidHash {
    pub(crate) fn new(bucket_cells: u32) -> Self {
        Self {
            bucket_cells: bucket_cells.max(1),
            buckets: HashMap::new(),
            dirty: true,
        }
    }

    pub(crate) fn invalidate(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn rebuild_if_dirty(&mut self, view: WaterView<'_>) {
        if !self.dirty {
            return;
        }
        self.dirty = false;
        self.buckets.clear();
        let geometry = view.geometry();
        for index in 0..geometry.cell_count() {
            let Some(cell) = geometry.cell_at(index) else {
                continue;
            };
            if view.is_solid(cell) {
                let key = self.key(cell.column() as i32, cell.row() as i32);
                self.buckets.entry(key).or_default().push(cell);
            }
        }
    }

    fn key(&self, column: i32, row: i32) -> (i32, i32) {
        let size = self.bucket_cells as i32;
        (column.div_euclid(size), row.div_euclid(size))
    }

    /// Marches a circle along the segment and reports the first solid cell it overlaps.
    pub(crate) fn cast(
        &self,
        geometry: &GridGeometry,
        origin: Vec2,
        radius: f32,
        motion: Vec2,
    ) -> Option<CastHit> {
        let distance = motion.length();
        if distance <= f32::EPSILON || self.buckets.is_empty() {
            return None;
        }
        let stride = radius.max(geometry.cell_size() * 0.25);
        let steps = ((distance / stride).ceil() as u32).clamp(1, MAX_MARCH_STEPS);
        let mut previous = origin;
        for step in 1..=steps {
            let fraction = step as f32 / steps as f32;
            let probe = origin + motion * fraction;
            if let Some(closest) = self.overlap(geometry, probe, radius) {
                let normal = (probe - closest)
                    .try_normalize()
                    .unwrap_or(-motion / distance);
                return Some(CastHit {
                    point: previous,
                    normal,
                    fraction: (step - 1) as f32 / steps as f32,
                });
            }
            previous = probe;
        }
        None
    }

    fn overlap(&self, geometry: &GridGeometry, center: Vec2, radius: f32) -> Option<Vec2> {
        let (min_column, min_row) = geometry.world_to_grid(center - Vec2::splat(radius));
        let (max_column, max_row) = geometry.world_to_grid(center + Vec2::splat(radius));
        let (min_key_x, min_key_y) = self.key(min_column, min_row);
        let (max_key_x, max_key_y) = self.key(max_column, max_row);
        for key_y in min_key_y..=max_key_y {
            for key_x in min_key_x..=max_key_x {
                let Some(cells) = self.buckets.get(&(key_x, key_y)) else {
                    continue;
                };
                for cell in cells {
                    let bounds = geometry.cell_bounds(*cell);
                    if bounds.distance_to(center) <= radius {
                        return Some(bounds.closest_point(center));
                    }
                }
            }
        }
        None
    }
}

const MAX_MARCH_STEPS: u32 = 64;

/// Strategy-dependent state shared by every droplet in a pass.
pub(crate) struct Contacts<'a> {
    pub(crate) view: WaterView<'a>,
    pub(crate) ledger: &'a Ledger,
    pub(crate) surface: &'a SurfaceCache,
    pub(crate) solids: &'a SolidHash,
    pub(crate) scene: Option<&'a dyn SceneQuery>,
    pub(crate) detection: SurfaceDetection,
    pub(crate) collision: SolidCollision,
    pub(crate) mask: LayerMask,
}

impl Contacts<'_> {
    /// First solid contact along the segment.
    pub(crate) fn solid(&self, origin: Vec2, radius: f32, motion: Vec2) -> Option<CastHit> {
        let geometry = self.view.geometry();
        match (self.collision, self.scene) {
            (SolidCollision::CircleCast, Some(scene)) => {
                scene.circle_cast(origin, radius, motion, self.mask)
            }
            _ => self.solids.cast(&geometry, origin, radius, motion),
        }
    }

    /// First point along the segment that touches the water surface.
    pub(crate) fn water(&self, origin: Vec2, motion: Vec2) -> Option<(Vec2, CellCoord)> {
        let geometry = self.view.geometry();
        let stride = geometry.cell_size() * 0.5;
        let steps = ((motion.length() / stride).ceil() as u32).clamp(1, MAX_MARCH_STEPS);
        for step in 0..=steps {
            let probe = origin + motion * (step as f32 / steps as f32);
            let Some(cell) = geometry.world_to_cell(probe) else {
                continue;
            };
            let touching = match self.detection {
                SurfaceDetection::StepSampling => {
                    self.ledger.water(self.view, cell)
                        >= self.view.max_water() * SURFACE_FILL_RATIO
                }
                SurfaceDetection::SurfaceCache => self.surface.contains(cell),
            };
            if touching {
                return Some((probe, cell));
            }
        }
        None
    }
}

/// Reflects a velocity off a surface with the given normal.
pub(crate) fn bounce(velocity: Vec2, normal: Vec2, bounce_damping: f32, friction: f32) -> Vec2 {
    let normal_speed = velocity.dot(normal);
    if normal_speed >= 0.0 {
        return velocity;
    }
    let normal_part = normal * normal_speed;
    let tangent = velocity - normal_part;
    tangent * (1.0 - friction) - normal_part * bounce_damping
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> GridGeometry {
        GridGeometry::new(8, 8, 1.0, Vec2::ZERO)
    }

    struct Buffers {
        water: Vec<f32>,
        solid: Vec<bool>,
        surface: Vec<bool>,
        settled: Vec<bool>,
        depth: Vec<u32>,
    }

    impl Buffers {
        fn new() -> Self {
            let count = geometry().cell_count();
            Self {
                water: vec![0.0; count],
                solid: vec![false; count],
                surface: vec![false; count],
                settled: vec![false; count],
                depth: vec![0; count],
            }
        }

        fn view(&self) -> WaterView<'_> {
            WaterView::new(
                geometry(),
                &self.water,
                &self.solid,
                &self.settled,
                &self.depth,
                &self.surface,
                1.0,
                0.001,
            )
        }
    }

    #[test]
    fn bounce_reverses_and_damps_the_normal_component() {
        let reflected = bounce(Vec2::new(2.0, -4.0), Vec2::Y, 0.5, 0.25);
        assert!((reflected - Vec2::new(1.5, 2.0)).length() < 1e-5);
        let receding = Vec2::new(0.0, 3.0);
        assert_eq!(bounce(receding, Vec2::Y, 0.5, 0.25), receding);
    }

    #[test]
    fn spatial_hash_finds_solid_floor() {
        let mut buffers = Buffers::new();
        for column in 0..8 {
            buffers.solid[column] = true;
        }
        let mut hash = SolidHash::new(4);
        hash.rebuild_if_dirty(buffers.view());

        let hit = hash
            .cast(&geometry(), Vec2::new(3.5, 4.0), 0.1, Vec2::new(0.0, -4.0))
            .expect("floor should be hit");

        assert!(hit.point.y > 1.0);
        assert!((hit.normal - Vec2::Y).length() < 1e-5);
        assert!(hash
            .cast(&geometry(), Vec2::new(3.5, 4.0), 0.1, Vec2::new(2.0, 0.0))
            .is_none());
    }

    #[test]
    fn surface_cache_rebuilds_on_interval() {
        let mut buffers = Buffers::new();
        let interval = Duration::from_millis(100);
        let mut cache = SurfaceCache::new();
        cache.refresh(Duration::ZERO, interval, buffers.view());
        assert!(!cache.contains(CellCoord::new(2, 0)));

        buffers.surface[2] = true;
        cache.refresh(Duration::from_millis(50), interval, buffers.view());
        assert!(!cache.contains(CellCoord::new(2, 0)));
        cache.refresh(Duration::from_millis(50), interval, buffers.view());
        assert!(cache.contains(CellCoord::new(2, 0)));
    }

    #[test]
    fn step_sampling_detects_filled_cells_along_the_segment() {
        let mut buffers = Buffers::new();
        buffers.water[8 + 3] = 0.8;
        let ledger = Ledger::default();
        let surface = SurfaceCache::new();
        let solids = SolidHash::new(4);
        let contacts = Contacts {
            view: buffers.view(),
            ledger: &ledger,
            surface: &surface,
            solids: &solids,
            scene: None,
            detection: SurfaceDetection::StepSampling,
            collision: SolidCollision::SpatialHash,
            mask: LayerMask::ALL,
        };

        let contact = contacts.water(Vec2::new(3.5, 4.5), Vec2::new(0.0, -3.5));

        assert_eq!(contact.map(|(_, cell)| cell), Some(CellCoord::new(3, 1)));
        assert!(contacts
            .water(Vec2::new(5.5, 4.5), Vec2::new(0.0, -3.5))
            .is_none());
    }
}
