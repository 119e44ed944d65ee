#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the liquid sandbox.
//!
//! This crate defines the message surface that connects adapters, the
//! authoritative world, and pure systems. Adapters submit [`Command`] values
//! describing desired mutations, the world executes those commands via its
//! `apply` entry point, and then broadcasts [`Event`] values for systems to
//! react to. Systems consume event streams, query immutable views such as
//! [`WaterView`], and respond exclusively with new command batches.

mod geometry;
mod tuning;

use std::time::Duration;

use glam::Vec2;
use serde::{Deserialize, Serialize};

pub use geometry::{
    polygon_area, polygon_contains, Aabb, CellSpan, Collider, GridGeometry, LayerMask,
};
pub use tuning::{
    AbsorptionTuning, CrownMode, CrownTuning, DisplacementTuning, FlowTuning, JetTuning,
    LiquidTuning, MaterialRate, ParcelTuning, ParticleTuning, SolidCollision, SolidTuning,
    SplashTuning, SprayTuning, SurfaceDetection, TuningError,
};

/// Commands that express all permissible world mutations.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Rebuilds the grid with the provided geometry, discarding all water.
    ConfigureGrid {
        /// Number of cell columns.
        columns: u32,
        /// Number of cell rows.
        rows: u32,
        /// Edge length of a cell in world units.
        cell_size: f32,
        /// World position of the lower-left grid corner.
        origin: Vec2,
    },
    /// Replaces the flow stepper parameters.
    ConfigureFlow {
        /// New flow parameters; rejected when invalid.
        tuning: FlowTuning,
    },
    /// Advances the simulation clock and runs the configured flow steps.
    ///
    /// Equivalent to `AdvanceClock` followed by `StepFlow`.
    Tick {
        /// Duration of simulated time that elapsed since the previous tick.
        dt: Duration,
    },
    /// Advances the simulation clock without moving any water.
    AdvanceClock {
        /// Duration of simulated time that elapsed since the previous tick.
        dt: Duration,
    },
    /// Runs the configured flow steps once.
    StepFlow,
    /// Overwrites the water held by a cell, clamped to the cell capacity.
    SetWater {
        /// Target cell.
        cell: CellCoord,
        /// Requested amount.
        amount: f32,
    },
    /// Adds water to a cell, clamped to the cell capacity.
    AddWater {
        /// Target cell.
        cell: CellCoord,
        /// Amount to add.
        amount: f32,
    },
    /// Removes up to `amount` water from a cell.
    DrainWater {
        /// Target cell.
        cell: CellCoord,
        /// Maximum amount to remove.
        amount: f32,
    },
    /// Injects water at a world position, carrying overflow into the cells above.
    SpawnWater {
        /// World position of the source.
        position: Vec2,
        /// Amount to inject.
        amount: f32,
    },
    /// Spreads water evenly across the cells whose centres lie inside a polygon.
    SpawnWaterInRegion {
        /// Polygon outline in world space.
        vertices: Vec<Vec2>,
        /// Total amount to distribute.
        total: f32,
    },
    /// Removes up to `amount` water from the cell at a world position.
    RemoveWater {
        /// World position of the drain.
        position: Vec2,
        /// Maximum amount to remove.
        amount: f32,
    },
    /// Empties every cell.
    ClearAllWater,
    /// Schedules a cell for evaluation on the next flow step.
    ActivateCell {
        /// Cell to activate.
        cell: CellCoord,
    },
    /// Asks the solid classifier to resample the scene on its next pass.
    RefreshSolidCells,
    /// Replaces every cell's solid flag. Masks of the wrong length are ignored.
    ApplySolidMask {
        /// Row-major solid flags.
        solid: Vec<bool>,
    },
    /// Registers a rigid body for displacement and splash coupling.
    RegisterBody {
        /// Initial body state.
        body: BodySnapshot,
    },
    /// Updates the kinematic state of a registered body.
    UpdateBody {
        /// Body identifier.
        id: BodyId,
        /// New world position.
        position: Vec2,
        /// New velocity in world units per second.
        velocity: Vec2,
    },
    /// Deregisters a rigid body.
    RemoveBody {
        /// Body identifier.
        id: BodyId,
    },
    /// Registers an absorptive object.
    RegisterAbsorber {
        /// Absorber description.
        absorber: AbsorberSnapshot,
    },
    /// Deregisters an absorptive object.
    RemoveAbsorber {
        /// Absorber identifier.
        id: AbsorberId,
    },
}

/// Events broadcast by the world after processing commands.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Indicates that the simulation clock advanced.
    TimeAdvanced {
        /// Duration of simulated time that elapsed in the tick.
        dt: Duration,
    },
    /// Announces a freshly configured grid.
    GridConfigured {
        /// Geometry of the new grid.
        geometry: GridGeometry,
        /// Generation counter of the new grid contents.
        generation: u64,
    },
    /// Confirms that new flow parameters are active.
    FlowConfigured,
    /// Reports that a configuration request was rejected.
    TuningRejected {
        /// Validation failure.
        reason: TuningError,
    },
    /// Summarises the flow steps executed during a tick.
    FlowStepped {
        /// Steps executed.
        steps: u32,
        /// Cells scheduled for the next step.
        active_cells: usize,
    },
    /// Summarises a solid mask reconciliation.
    SolidCellsRefreshed {
        /// Cells that became solid.
        blocked: u32,
        /// Cells that became free.
        freed: u32,
        /// Freed cells that still held water and were reactivated.
        reactivated: u32,
    },
    /// Confirms that every cell was emptied.
    WaterCleared {
        /// Generation counter of the emptied grid.
        generation: u64,
    },
    /// Confirms a body registration.
    BodyRegistered {
        /// Body identifier.
        id: BodyId,
    },
    /// Confirms a body deregistration.
    BodyRemoved {
        /// Body identifier.
        id: BodyId,
    },
    /// Confirms an absorber registration.
    AbsorberRegistered {
        /// Absorber identifier.
        id: AbsorberId,
    },
    /// Confirms an absorber deregistration.
    AbsorberRemoved {
        /// Absorber identifier.
        id: AbsorberId,
    },
}

/// Location of a single grid cell expressed as column and row coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellCoord {
    column: u32,
    row: u32,
}

impl CellCoord {
    /// Creates a new grid cell coordinate.
    #[must_use]
    pub const fn new(column: u32, row: u32) -> Self {
        Self { column, row }
    }

    /// Zero-based column index of the cell.
    #[must_use]
    pub const fn column(&self) -> u32 {
        self.column
    }

    /// Zero-based row index of the cell, counted upward.
    #[must_use]
    pub const fn row(&self) -> u32 {
        self.row
    }
}

/// Unique identifier assigned to a rigid body by its owner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BodyId(u32);

impl BodyId {
    /// Creates a new body identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Unique identifier assigned to an absorptive object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AbsorberId(u32);

impl AbsorberId {
    /// Creates a new absorber identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Material key used to look up absorption rates.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaterialTag(String);

impl MaterialTag {
    /// Creates a tag from its textual name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Textual name of the tag.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// How a rigid body participates in the physics scene.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BodyKind {
    /// Moved by forces.
    Dynamic,
    /// Moved explicitly by its owner.
    Kinematic,
    /// Never moves.
    Static,
}

/// Immutable representation of a registered rigid body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BodySnapshot {
    /// Identifier chosen by the owner.
    pub id: BodyId,
    /// World position of the collider origin.
    pub position: Vec2,
    /// Velocity in world units per second.
    pub velocity: Vec2,
    /// Participation mode.
    pub kind: BodyKind,
    /// Layers the body belongs to.
    pub layer: LayerMask,
    /// Collision shape; bodies without one never touch water.
    pub collider: Option<Collider>,
}

impl BodySnapshot {
    /// World-space bounds of the collider, if any.
    #[must_use]
    pub fn bounds(&self) -> Option<Aabb> {
        self.collider
            .as_ref()
            .map(|collider| collider.bounds(self.position))
    }
}

/// Read-only snapshot describing all registered bodies.
#[derive(Clone, Debug, Default)]
pub struct BodyView {
    snapshots: Vec<BodySnapshot>,
}

impl BodyView {
    /// Creates a new body view from the provided snapshots.
    #[must_use]
    pub fn from_snapshots(mut snapshots: Vec<BodySnapshot>) -> Self {
        snapshots.sort_by_key(|snapshot| snapshot.id);
        Self { snapshots }
    }

    /// Iterator over the captured snapshots in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = &BodySnapshot> {
        self.snapshots.iter()
    }

    /// Number of captured bodies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Reports whether no body is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

/// Immutable representation of a registered absorptive object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AbsorberSnapshot {
    /// Identifier chosen by the owner.
    pub id: AbsorberId,
    /// World position of the collider origin.
    pub position: Vec2,
    /// Collision shape.
    pub collider: Collider,
    /// Material used to look up the absorption rate.
    pub tag: MaterialTag,
}

/// Read-only snapshot describing all registered absorbers.
#[derive(Clone, Debug, Default)]
pub struct AbsorberView {
    snapshots: Vec<AbsorberSnapshot>,
}

impl AbsorberView {
    /// Creates a new absorber view from the provided snapshots.
    #[must_use]
    pub fn from_snapshots(mut snapshots: Vec<AbsorberSnapshot>) -> Self {
        snapshots.sort_by_key(|snapshot| snapshot.id);
        Self { snapshots }
    }

    /// Iterator over the captured snapshots in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = &AbsorberSnapshot> {
        self.snapshots.iter()
    }
}

/// Read-only view into the liquid grid.
///
/// Out-of-range cells read as dry, non-solid and unsettled.
#[derive(Clone, Copy, Debug)]
pub struct WaterView<'a> {
    geometry: GridGeometry,
    water: &'a [f32],
    solid: &'a [bool],
    settled: &'a [bool],
    depth: &'a [u32],
    surface: &'a [bool],
    max_water: f32,
    min_water: f32,
}

impl<'a> WaterView<'a> {
    /// Captures a new view backed by the provided buffers.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        geometry: GridGeometry,
        water: &'a [f32],
        solid: &'a [bool],
        settled: &'a [bool],
        depth: &'a [u32],
        surface: &'a [bool],
        max_water: f32,
        min_water: f32,
    ) -> Self {
        Self {
            geometry,
            water,
            solid,
            settled,
            depth,
            surface,
            max_water,
            min_water,
        }
    }

    /// Geometry of the underlying grid.
    #[must_use]
    pub const fn geometry(&self) -> GridGeometry {
        self.geometry
    }

    /// Nominal capacity of a cell.
    #[must_use]
    pub const fn max_water(&self) -> f32 {
        self.max_water
    }

    /// Amount below which a cell counts as dry.
    #[must_use]
    pub const fn min_water(&self) -> f32 {
        self.min_water
    }

    /// Water held by the cell.
    #[must_use]
    pub fn water(&self, cell: CellCoord) -> f32 {
        self.geometry
            .index(cell)
            .and_then(|index| self.water.get(index).copied())
            .unwrap_or(0.0)
    }

    /// Reports whether the cell is blocked.
    #[must_use]
    pub fn is_solid(&self, cell: CellCoord) -> bool {
        self.flag(self.solid, cell)
    }

    /// Reports whether the cell lies inside the grid and is not blocked.
    #[must_use]
    pub fn is_open(&self, cell: CellCoord) -> bool {
        self.geometry.contains(cell) && !self.is_solid(cell)
    }

    /// Reports whether the cell stopped changing.
    #[must_use]
    pub fn is_settled(&self, cell: CellCoord) -> bool {
        self.flag(self.settled, cell)
    }

    /// Reports whether the cell is wet with nothing wet above it.
    #[must_use]
    pub fn is_surface(&self, cell: CellCoord) -> bool {
        self.flag(self.surface, cell)
    }

    /// Number of wet cells between this cell and the exposed surface above it.
    #[must_use]
    pub fn depth(&self, cell: CellCoord) -> u32 {
        self.geometry
            .index(cell)
            .and_then(|index| self.depth.get(index).copied())
            .unwrap_or(0)
    }

    /// Reports whether the cell holds at least the dry threshold.
    #[must_use]
    pub fn is_wet(&self, cell: CellCoord) -> bool {
        self.water(cell) >= self.min_water.max(f32::MIN_POSITIVE)
    }

    /// Iterates the raw water buffer in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = f32> + 'a {
        self.water.iter().copied()
    }

    fn flag(&self, buffer: &[bool], cell: CellCoord) -> bool {
        self.geometry
            .index(cell)
            .and_then(|index| buffer.get(index).copied())
            .unwrap_or(false)
    }
}

/// Contact reported by [`SceneQuery::circle_cast`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CastHit {
    /// Circle centre at the moment of contact.
    pub point: Vec2,
    /// Unit surface normal pointing away from the obstacle.
    pub normal: Vec2,
    /// Fraction of the requested motion travelled before contact.
    pub fraction: f32,
}

/// Physical scene queries supplied by the host engine.
pub trait SceneQuery {
    /// Reports whether solid geometry on `mask` occupies the world point.
    fn is_solid_at(&self, point: Vec2, mask: LayerMask) -> bool;

    /// Sweeps a circle along `motion` and reports the first contact.
    ///
    /// The default implementation marches the segment in half-radius steps and
    /// estimates the normal from the solid samples around the contact.
    fn circle_cast(
        &self,
        origin: Vec2,
        radius: f32,
        motion: Vec2,
        mask: LayerMask,
    ) -> Option<CastHit> {
        let distance = motion.length();
        if distance <= f32::EPSILON {
            return None;
        }
        let stride = (radius * 0.5).max(0.005);
        let steps = ((distance / stride).ceil() as u32).clamp(1, MAX_CAST_STEPS);
        let mut previous = origin;
        for step in 1..=steps {
            let fraction = step as f32 / steps as f32;
            let probe = origin + motion * fraction;
            if self.is_solid_at(probe, mask) {
                let mut normal = Vec2::ZERO;
                for direction in [Vec2::X, Vec2::NEG_X, Vec2::Y, Vec2::NEG_Y] {
                    if self.is_solid_at(probe + direction * radius.max(stride), mask) {
                        normal -= direction;
                    }
                }
                let normal = normal.try_normalize().unwrap_or(-motion / distance);
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
}

const MAX_CAST_STEPS: u32 = 64;

/// Byte RGBA colour assigned to overlay droplets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DropletColor {
    red: u8,
    green: u8,
    blue: u8,
    alpha: u8,
}

impl DropletColor {
    /// Creates a new colour from byte RGBA components.
    #[must_use]
    pub const fn from_rgba(red: u8, green: u8, blue: u8, alpha: u8) -> Self {
        Self {
            red,
            green,
            blue,
            alpha,
        }
    }

    /// Red component of the color.
    #[must_use]
    pub const fn red(&self) -> u8 {
        self.red
    }

    /// Green component of the color.
    #[must_use]
    pub const fn green(&self) -> u8 {
        self.green
    }

    /// Blue component of the color.
    #[must_use]
    pub const fn blue(&self) -> u8 {
        self.blue
    }

    /// Alpha component of the color.
    #[must_use]
    pub const fn alpha(&self) -> u8 {
        self.alpha
    }
}

/// Overlay droplet captured for presentation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Droplet {
    /// World position of the droplet centre.
    pub position: Vec2,
    /// Droplet radius in world units.
    pub radius: f32,
    /// Display colour.
    pub color: DropletColor,
}

#[cfg(test)]
mod tests {
    use super::{
        AbsorberId, BodyId, BodyKind, BodySnapshot, BodyView, CellCoord, Collider, LayerMask,
        MaterialTag, SceneQuery,
    };
    use glam::Vec2;
    use serde::{de::DeserializeOwned, Serialize};

    fn assert_round_trip<T>(value: &T)
    where
        T: Serialize + DeserializeOwned + PartialEq + std::fmt::Debug,
    {
        let bytes = bincode::serialize(value).expect("serialize");
        let restored: T = bincode::deserialize(&bytes).expect("deserialize");
        assert_eq!(&restored, value);
    }

    #[test]
    fn body_snapshot_round_trips_through_bincode() {
        assert_round_trip(&BodySnapshot {
            id: BodyId::new(7),
            position: Vec2::new(1.5, -2.0),
            velocity: Vec2::new(0.0, -4.0),
            kind: BodyKind::Dynamic,
            layer: LayerMask::from_layer(3),
            collider: Some(Collider::Circle { radius: 0.25 }),
        });
    }

    #[test]
    fn identifiers_and_tags_round_trip_through_bincode() {
        assert_round_trip(&AbsorberId::new(42));
        assert_round_trip(&MaterialTag::new("sponge"));
        assert_round_trip(&CellCoord::new(5, 7));
    }

    #[test]
    fn body_view_orders_by_identifier() {
        let body = |id| BodySnapshot {
            id: BodyId::new(id),
            position: Vec2::ZERO,
            velocity: Vec2::ZERO,
            kind: BodyKind::Static,
            layer: LayerMask::default(),
            collider: None,
        };
        let view = BodyView::from_snapshots(vec![body(9), body(2), body(5)]);
        let ids: Vec<u32> = view.iter().map(|snapshot| snapshot.id.get()).collect();
        assert_eq!(ids, vec![2, 5, 9]);
        assert!(view.iter().all(|snapshot| snapshot.bounds().is_none()));
    }

    struct Floor;

    impl SceneQuery for Floor {
        fn is_solid_at(&self, point: Vec2, _mask: LayerMask) -> bool {
            point.y < 0.0
        }
    }

    #[test]
    fn default_circle_cast_stops_above_the_floor() {
        let hit = Floor
            .circle_cast(
                Vec2::new(0.0, 1.0),
                0.1,
                Vec2::new(0.0, -2.0),
                LayerMask::ALL,
            )
            .expect("cast should hit the floor");
        assert!(hit.point.y >= 0.0);
        assert!(hit.fraction < 0.55);
        assert!((hit.normal - Vec2::Y).length() < 1e-5);
        assert!(Floor
            .circle_cast(Vec2::new(0.0, 1.0), 0.1, Vec2::new(1.0, 0.0), LayerMask::ALL)
            .is_none());
    }
}
