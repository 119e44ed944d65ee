//! Spatial primitives shared by the world and the liquid systems.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::CellCoord;

/// Affine mapping between world space and the liquid cell grid.
///
/// Rows are counted upward from `origin`, so gravity pulls water toward row zero.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridGeometry {
    columns: u32,
    rows: u32,
    cell_size: f32,
    origin: Vec2,
}

impl GridGeometry {
    /// Creates a new geometry description.
    ///
    /// Non-positive cell sizes are replaced by the smallest positive `f32` so the
    /// mapping never divides by zero.
    #[must_use]
    pub fn new(columns: u32, rows: u32, cell_size: f32, origin: Vec2) -> Self {
        let cell_size = if cell_size > 0.0 && cell_size.is_finite() {
            cell_size
        } else {
            f32::MIN_POSITIVE
        };
        Self {
            columns,
            rows,
            cell_size,
            origin,
        }
    }

    /// Number of cell columns.
    #[must_use]
    pub const fn columns(&self) -> u32 {
        self.columns
    }

    /// Number of cell rows.
    #[must_use]
    pub const fn rows(&self) -> u32 {
        self.rows
    }

    /// Edge length of a single square cell in world units.
    #[must_use]
    pub const fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// World position of the lower-left corner of cell `(0, 0)`.
    #[must_use]
    pub const fn origin(&self) -> Vec2 {
        self.origin
    }

    /// Total number of cells in the grid.
    #[must_use]
    pub fn cell_count(&self) -> usize {
        let count = u64::from(self.columns) * u64::from(self.rows);
        usize::try_from(count).unwrap_or(0)
    }

    /// Maps a world position onto raw (possibly out of range) grid indices.
    #[must_use]
    pub fn world_to_grid(&self, position: Vec2) -> (i32, i32) {
        let local = (position - self.origin) / self.cell_size;
        (local.x.floor() as i32, local.y.floor() as i32)
    }

    /// Maps a world position onto the containing cell, if it lies inside the grid.
    #[must_use]
    pub fn world_to_cell(&self, position: Vec2) -> Option<CellCoord> {
        let (column, row) = self.world_to_grid(position);
        self.cell_from_signed(column, row)
    }

    /// World position of the centre of the provided cell.
    #[must_use]
    pub fn grid_to_world(&self, cell: CellCoord) -> Vec2 {
        self.origin
            + Vec2::new(
                (cell.column() as f32 + 0.5) * self.cell_size,
                (cell.row() as f32 + 0.5) * self.cell_size,
            )
    }

    /// Reports whether the signed grid indices address a cell inside the grid.
    #[must_use]
    pub fn is_valid_cell(&self, column: i32, row: i32) -> bool {
        column >= 0 && row >= 0 && (column as u32) < self.columns && (row as u32) < self.rows
    }

    /// Reports whether the cell lies inside the grid.
    #[must_use]
    pub const fn contains(&self, cell: CellCoord) -> bool {
        cell.column() < self.columns && cell.row() < self.rows
    }

    /// Converts signed indices into a cell coordinate when they are in range.
    #[must_use]
    pub fn cell_from_signed(&self, column: i32, row: i32) -> Option<CellCoord> {
        if self.is_valid_cell(column, row) {
            Some(CellCoord::new(column as u32, row as u32))
        } else {
            None
        }
    }

    /// Returns the neighbour offset by the provided delta, if it stays in the grid.
    #[must_use]
    pub fn offset(&self, cell: CellCoord, columns: i32, rows: i32) -> Option<CellCoord> {
        let column = i64::from(cell.column()) + i64::from(columns);
        let row = i64::from(cell.row()) + i64::from(rows);
        let column = i32::try_from(column).ok()?;
        let row = i32::try_from(row).ok()?;
        self.cell_from_signed(column, row)
    }

    /// Row-major buffer index for the cell.
    #[must_use]
    pub fn index(&self, cell: CellCoord) -> Option<usize> {
        if !self.contains(cell) {
            return None;
        }
        let row = usize::try_from(cell.row()).ok()?;
        let column = usize::try_from(cell.column()).ok()?;
        let width = usize::try_from(self.columns).ok()?;
        Some(row * width + column)
    }

    /// Inverse of [`GridGeometry::index`].
    #[must_use]
    pub fn cell_at(&self, index: usize) -> Option<CellCoord> {
        let width = usize::try_from(self.columns).ok()?;
        if width == 0 || index >= self.cell_count() {
            return None;
        }
        let column = u32::try_from(index % width).ok()?;
        let row = u32::try_from(index / width).ok()?;
        Some(CellCoord::new(column, row))
    }

    /// World-space rectangle covered by the whole grid.
    #[must_use]
    pub fn bounds(&self) -> Aabb {
        let size = Vec2::new(
            self.columns as f32 * self.cell_size,
            self.rows as f32 * self.cell_size,
        );
        Aabb::new(self.origin, self.origin + size)
    }

    /// World-space rectangle covered by a single cell.
    #[must_use]
    pub fn cell_bounds(&self, cell: CellCoord) -> Aabb {
        let min = self.origin
            + Vec2::new(
                cell.column() as f32 * self.cell_size,
                cell.row() as f32 * self.cell_size,
            );
        Aabb::new(min, min + Vec2::splat(self.cell_size))
    }

    /// Inclusive cell range overlapped by the rectangle, clamped to the grid.
    ///
    /// Returns `None` when the rectangle lies completely outside the grid.
    #[must_use]
    pub fn cell_span(&self, area: Aabb) -> Option<CellSpan> {
        if self.columns == 0 || self.rows == 0 {
            return None;
        }
        let (min_column, min_row) = self.world_to_grid(area.min());
        let (max_column, max_row) = self.world_to_grid(area.max());
        let last_column = self.columns as i32 - 1;
        let last_row = self.rows as i32 - 1;
        if max_column < 0 || max_row < 0 || min_column > last_column || min_row > last_row {
            return None;
        }
        Some(CellSpan {
            min_column: min_column.clamp(0, last_column) as u32,
            min_row: min_row.clamp(0, last_row) as u32,
            max_column: max_column.clamp(0, last_column) as u32,
            max_row: max_row.clamp(0, last_row) as u32,
        })
    }
}

/// Inclusive rectangular range of cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CellSpan {
    /// Leftmost column.
    pub min_column: u32,
    /// Bottom row.
    pub min_row: u32,
    /// Rightmost column.
    pub max_column: u32,
    /// Top row.
    pub max_row: u32,
}

impl CellSpan {
    /// Iterates the covered cells in row-major order, bottom row first.
    pub fn cells(self) -> impl Iterator<Item = CellCoord> {
        (self.min_row..=self.max_row).flat_map(move |row| {
            (self.min_column..=self.max_column).map(move |column| CellCoord::new(column, row))
        })
    }

    /// Number of columns spanned.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.max_column - self.min_column + 1
    }
}

/// Axis-aligned rectangle in world units.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    min: Vec2,
    max: Vec2,
}

impl Aabb {
    /// Creates a rectangle from two corners, normalising their order.
    #[must_use]
    pub fn new(a: Vec2, b: Vec2) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Creates a rectangle centred on `center`.
    #[must_use]
    pub fn from_center(center: Vec2, half_extents: Vec2) -> Self {
        let half_extents = half_extents.abs();
        Self::new(center - half_extents, center + half_extents)
    }

    /// Lower-left corner.
    #[must_use]
    pub const fn min(&self) -> Vec2 {
        self.min
    }

    /// Upper-right corner.
    #[must_use]
    pub const fn max(&self) -> Vec2 {
        self.max
    }

    /// Centre point.
    #[must_use]
    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    /// Width and height.
    #[must_use]
    pub fn size(&self) -> Vec2 {
        self.max - self.min
    }

    /// Enclosed area.
    #[must_use]
    pub fn area(&self) -> f32 {
        let size = self.size();
        size.x * size.y
    }

    /// Reports whether the point lies inside or on the boundary.
    #[must_use]
    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
    }

    /// Reports whether the rectangles overlap.
    #[must_use]
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    /// Returns a copy grown by `margin` on every side.
    #[must_use]
    pub fn expanded(&self, margin: f32) -> Self {
        Self::new(self.min - Vec2::splat(margin), self.max + Vec2::splat(margin))
    }

    /// Closest point inside the rectangle.
    #[must_use]
    pub fn closest_point(&self, point: Vec2) -> Vec2 {
        point.clamp(self.min, self.max)
    }

    /// Distance from the point to the rectangle; zero when inside.
    #[must_use]
    pub fn distance_to(&self, point: Vec2) -> f32 {
        self.closest_point(point).distance(point)
    }
}

/// Bitmask of physics layers. Two masks interact when their bits intersect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayerMask(u32);

impl LayerMask {
    /// Mask matching every layer.
    pub const ALL: Self = Self(u32::MAX);
    /// Mask matching no layer.
    pub const NONE: Self = Self(0);

    /// Creates a mask from raw bits.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Creates a mask containing a single layer index. Indices above 31 yield an empty mask.
    #[must_use]
    pub const fn from_layer(layer: u8) -> Self {
        if layer < 32 {
            Self(1 << layer)
        } else {
            Self(0)
        }
    }

    /// Raw bit representation.
    #[must_use]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Reports whether any layer is shared with `other`.
    #[must_use]
    pub const fn intersects(&self, other: LayerMask) -> bool {
        self.0 & other.0 != 0
    }

    /// Returns the union of both masks.
    #[must_use]
    pub const fn with(self, other: LayerMask) -> Self {
        Self(self.0 | other.0)
    }
}

impl Default for LayerMask {
    fn default() -> Self {
        Self::from_layer(0)
    }
}

/// Collision shape expressed relative to its owner's position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Collider {
    /// Axis-aligned box.
    Box {
        /// Half the box size along each axis.
        half_extents: Vec2,
    },
    /// Circle.
    Circle {
        /// Circle radius.
        radius: f32,
    },
    /// Simple polygon with vertices in local space.
    Polygon {
        /// Outline vertices in winding order.
        points: Vec<Vec2>,
    },
}

impl Collider {
    /// World-space bounds when the collider sits at `position`.
    #[must_use]
    pub fn bounds(&self, position: Vec2) -> Aabb {
        match self {
            Self::Box { half_extents } => Aabb::from_center(position, *half_extents),
            Self::Circle { radius } => Aabb::from_center(position, Vec2::splat(radius.abs())),
            Self::Polygon { points } => {
                let mut iter = points.iter();
                let Some(first) = iter.next() else {
                    return Aabb::new(position, position);
                };
                let (min, max) = iter.fold((*first, *first), |(min, max), point| {
                    (min.min(*point), max.max(*point))
                });
                Aabb::new(position + min, position + max)
            }
        }
    }

    /// Reports whether the world point lies inside the collider placed at `position`.
    #[must_use]
    pub fn contains_point(&self, position: Vec2, point: Vec2) -> bool {
        match self {
            Self::Box { half_extents } => {
                Aabb::from_center(position, *half_extents).contains(point)
            }
            Self::Circle { radius } => position.distance_squared(point) <= radius * radius,
            Self::Polygon { points } => polygon_contains(points, point - position),
        }
    }

    /// Distance from the world point to the collider surface; zero when inside.
    #[must_use]
    pub fn distance_to_surface(&self, position: Vec2, point: Vec2) -> f32 {
        match self {
            Self::Box { half_extents } => {
                Aabb::from_center(position, *half_extents).distance_to(point)
            }
            Self::Circle { radius } => (position.distance(point) - radius.abs()).max(0.0),
            Self::Polygon { points } => {
                let local = point - position;
                if polygon_contains(points, local) {
                    return 0.0;
                }
                polygon_edges(points)
                    .map(|(a, b)| segment_distance(a, b, local))
                    .fold(f32::INFINITY, f32::min)
            }
        }
    }

    /// Enclosed area in square world units.
    #[must_use]
    pub fn area(&self) -> f32 {
        match self {
            Self::Box { half_extents } => 4.0 * (half_extents.x * half_extents.y).abs(),
            Self::Circle { radius } => std::f32::consts::PI * radius * radius,
            Self::Polygon { points } => polygon_area(points),
        }
    }
}

/// Crossing-number point-in-polygon test. Degenerate polygons contain nothing.
#[must_use]
pub fn polygon_contains(points: &[Vec2], point: Vec2) -> bool {
    if points.len() < 3 {
        return false;
    }
    let mut inside = false;
    for (a, b) in polygon_edges(points) {
        if (a.y > point.y) != (b.y > point.y) {
            let t = (point.y - a.y) / (b.y - a.y);
            if point.x < a.x + t * (b.x - a.x) {
                inside = !inside;
            }
        }
    }
    inside
}

/// Unsigned shoelace area.
#[must_use]
pub fn polygon_area(points: &[Vec2]) -> f32 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: f32 = polygon_edges(points).map(|(a, b)| a.perp_dot(b)).sum();
    twice.abs() * 0.5
}

fn polygon_edges(points: &[Vec2]) -> impl Iterator<Item = (Vec2, Vec2)> + '_ {
    points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| (*a, *b))
}

fn segment_distance(a: Vec2, b: Vec2, point: Vec2) -> f32 {
    let edge = b - a;
    let length_squared = edge.length_squared();
    if length_squared <= f32::EPSILON {
        return a.distance(point);
    }
    let t = ((point - a).dot(edge) / length_squared).clamp(0.0, 1.0);
    (a + edge * t).distance(point)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> GridGeometry {
        GridGeometry::new(16, 12, 0.25, Vec2::new(-2.0, -1.5))
    }

    #[test]
    fn world_to_grid_round_trips_every_cell() {
        let geometry = geometry();
        for row in 0..geometry.rows() {
            for column in 0..geometry.columns() {
                let cell = CellCoord::new(column, row);
                let world = geometry.grid_to_world(cell);
                assert_eq!(geometry.world_to_grid(world), (column as i32, row as i32));
                assert_eq!(geometry.world_to_cell(world), Some(cell));
            }
        }
    }

    #[test]
    fn positions_outside_the_grid_are_rejected() {
        let geometry = geometry();
        assert!(geometry.world_to_cell(Vec2::new(-2.1, 0.0)).is_none());
        assert!(geometry.world_to_cell(Vec2::new(0.0, 1.6)).is_none());
        assert!(!geometry.is_valid_cell(-1, 0));
        assert!(!geometry.is_valid_cell(16, 0));
        assert!(geometry.is_valid_cell(15, 11));
    }

    #[test]
    fn index_and_cell_at_are_inverse() {
        let geometry = geometry();
        let cell = CellCoord::new(5, 7);
        let index = geometry.index(cell).expect("cell in range");
        assert_eq!(index, 7 * 16 + 5);
        assert_eq!(geometry.cell_at(index), Some(cell));
        assert!(geometry.cell_at(geometry.cell_count()).is_none());
    }

    #[test]
    fn cell_span_clamps_to_grid() {
        let geometry = GridGeometry::new(4, 4, 1.0, Vec2::ZERO);
        let span = geometry
            .cell_span(Aabb::new(Vec2::new(-3.0, 1.5), Vec2::new(1.2, 9.0)))
            .expect("overlaps grid");
        assert_eq!(span.min_column, 0);
        assert_eq!(span.max_column, 1);
        assert_eq!(span.min_row, 1);
        assert_eq!(span.max_row, 3);
        assert_eq!(span.cells().count(), 6);
        assert!(geometry
            .cell_span(Aabb::new(Vec2::new(5.0, 5.0), Vec2::new(6.0, 6.0)))
            .is_none());
    }

    #[test]
    fn layer_masks_intersect_on_shared_bits() {
        let water = LayerMask::from_layer(4);
        let props = LayerMask::from_layer(2).with(water);
        assert!(props.intersects(water));
        assert!(!LayerMask::from_layer(1).intersects(water));
        assert!(!LayerMask::NONE.intersects(LayerMask::ALL));
        assert_eq!(LayerMask::from_layer(40), LayerMask::NONE);
    }

    #[test]
    fn collider_surface_distance_is_zero_inside() {
        let square = Collider::Polygon {
            points: vec![
                Vec2::new(-1.0, -1.0),
                Vec2::new(1.0, -1.0),
                Vec2::new(1.0, 1.0),
                Vec2::new(-1.0, 1.0),
            ],
        };
        let position = Vec2::new(3.0, 0.0);
        assert!(square.contains_point(position, Vec2::new(3.5, 0.5)));
        assert_eq!(square.distance_to_surface(position, Vec2::new(3.5, 0.5)), 0.0);
        assert!((square.distance_to_surface(position, Vec2::new(5.0, 0.0)) - 1.0).abs() < 1e-5);
        assert!((square.area() - 4.0).abs() < 1e-5);

        let circle = Collider::Circle { radius: 0.5 };
        assert!((circle.distance_to_surface(Vec2::ZERO, Vec2::new(2.0, 0.0)) - 1.5).abs() < 1e-5);
        let boxed = Collider::Box {
            half_extents: Vec2::new(1.0, 0.5),
        };
        assert!((boxed.area() - 2.0).abs() < 1e-5);
        assert_eq!(boxed.bounds(Vec2::ONE).min(), Vec2::new(0.0, 0.5));
    }
}
