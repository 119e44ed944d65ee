#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative liquid grid state for the sandbox.
//!
//! The world owns the water buffers, the solid flags, the registered bodies
//! and absorbers. Systems never touch it directly: they read the views
//! exposed by [`query`] and answer with [`Command`]s that are fed back through
//! [`apply`].

mod flow;
mod grid;

use std::{collections::BTreeMap, time::Duration};

use glam::Vec2;
use liquid_sandbox_core::{
    polygon_contains, AbsorberId, AbsorberSnapshot, Aabb, BodyId, BodySnapshot, CellCoord,
    Command, Event, FlowTuning, GridGeometry,
};
use log::{debug, trace, warn};

use crate::grid::LiquidGrid;

const DEFAULT_GRID_COLUMNS: u32 = 64;
const DEFAULT_GRID_ROWS: u32 = 48;
const DEFAULT_CELL_SIZE: f32 = 0.125;

/// Cells above the spawn point that may absorb spawn overflow.
const SPAWN_OVERFLOW_ROWS: i32 = 4;

/// Represents the authoritative liquid world state.
#[derive(Debug)]
pub struct World {
    grid: LiquidGrid,
    tuning: FlowTuning,
    generation: u64,
    bodies: BTreeMap<BodyId, BodySnapshot>,
    absorbers: BTreeMap<AbsorberId, AbsorberSnapshot>,
    tick_index: u64,
    elapsed: Duration,
}

impl World {
    /// Creates an empty world with the default grid and flow parameters.
    #[must_use]
    pub fn new() -> Self {
        let geometry = GridGeometry::new(
            DEFAULT_GRID_COLUMNS,
            DEFAULT_GRID_ROWS,
            DEFAULT_CELL_SIZE,
            Vec2::ZERO,
        );
        Self {
            grid: LiquidGrid::new(geometry),
            tuning: FlowTuning::default(),
            generation: 0,
            bodies: BTreeMap::new(),
            absorbers: BTreeMap::new(),
            tick_index: 0,
            elapsed: Duration::ZERO,
        }
    }

    fn nominal_capacity(&self) -> f32 {
        self.tuning.max_water_per_cell
    }

    fn advance_clock(&mut self, dt: Duration, out_events: &mut Vec<Event>) {
        self.tick_index = self.tick_index.saturating_add(1);
        self.elapsed = self.elapsed.saturating_add(dt);
        out_events.push(Event::TimeAdvanced { dt });
    }

    fn step_flow(&mut self, out_events: &mut Vec<Event>) {
        let mut steps = 0;
        let mut transfers = 0;
        for _ in 0..self.tuning.iterations_per_tick {
            let outcome = flow::step(&mut self.grid, &self.tuning);
            steps += 1;
            transfers += outcome.transfers;
        }
        self.grid.refresh_surface(self.tuning.min_water_transfer);
        trace!(
            "tick {} ran {} transfers, {} cells active",
            self.tick_index,
            transfers,
            self.grid.active.len()
        );
        out_events.push(Event::FlowStepped {
            steps,
            active_cells: self.grid.active.len(),
        });
    }

    fn spawn_at(&mut self, cell: CellCoord, amount: f32) -> f32 {
        let capacity = self.nominal_capacity();
        let mut remaining = amount;
        let mut placed = 0.0;
        for rows in 0..=SPAWN_OVERFLOW_ROWS {
            if remaining <= 0.0 {
                break;
            }
            let Some(target) = self.grid.geometry.offset(cell, 0, rows) else {
                break;
            };
            if self.grid.is_solid(target) {
                break;
            }
            let accepted = self.grid.add_water(target, remaining, capacity);
            remaining -= accepted;
            placed += accepted;
        }
        placed
    }

    fn spawn_in_region(&mut self, vertices: &[Vec2], total: f32) {
        if vertices.len() < 3 || !total.is_finite() || total <= 0.0 {
            return;
        }
        let geometry = self.grid.geometry;
        let bounds = vertices
            .iter()
            .skip(1)
            .fold(Aabb::new(vertices[0], vertices[0]), |bounds, vertex| {
                Aabb::new(bounds.min().min(*vertex), bounds.max().max(*vertex))
            });

        let cells: Vec<CellCoord> = geometry
            .cell_span(bounds)
            .map(|span| {
                span.cells()
                    .filter(|cell| !self.grid.is_solid(*cell))
                    .filter(|cell| polygon_contains(vertices, geometry.grid_to_world(*cell)))
                    .collect()
            })
            .unwrap_or_default();

        if cells.is_empty() {
            let centroid = vertices.iter().copied().sum::<Vec2>() / vertices.len() as f32;
            if let Some(cell) = geometry.world_to_cell(centroid) {
                let _ = self.spawn_at(cell, total);
            }
            return;
        }

        let share = total / cells.len() as f32;
        let capacity = self.nominal_capacity();
        for cell in cells {
            let _ = self.grid.add_water(cell, share, capacity);
        }
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

/// Applies the provided command to the world, mutating state deterministically.
pub fn apply(world: &mut World, command: Command, out_events: &mut Vec<Event>) {
    match command {
        Command::ConfigureGrid {
            columns,
            rows,
            cell_size,
            origin,
        } => {
            let geometry = GridGeometry::new(columns, rows, cell_size, origin);
            world.grid = LiquidGrid::new(geometry);
            world.generation = world.generation.wrapping_add(1);
            debug!(
                "configured {}x{} grid (cell size {}) generation {}",
                columns, rows, cell_size, world.generation
            );
            out_events.push(Event::GridConfigured {
                geometry,
                generation: world.generation,
            });
        }
        Command::ConfigureFlow { tuning } => match tuning.validate() {
            Ok(()) => {
                world.tuning = tuning;
                world.grid.clamp_all(world.tuning.hard_capacity());
                world.grid.rescan_pending = true;
                out_events.push(Event::FlowConfigured);
            }
            Err(reason) => {
                warn!("rejected flow tuning: {reason}");
                out_events.push(Event::TuningRejected { reason });
            }
        },
        Command::Tick { dt } => {
            world.advance_clock(dt, out_events);
            world.step_flow(out_events);
        }
        Command::AdvanceClock { dt } => world.advance_clock(dt, out_events),
        Command::StepFlow => world.step_flow(out_events),
        Command::SetWater { cell, amount } => {
            let capacity = world.nominal_capacity();
            let _ = world.grid.set_water(cell, amount, capacity);
        }
        Command::AddWater { cell, amount } => {
            let capacity = world.nominal_capacity();
            let _ = world.grid.add_water(cell, amount, capacity);
        }
        Command::DrainWater { cell, amount } => {
            let _ = world.grid.drain_water(cell, amount);
        }
        Command::SpawnWater { position, amount } => {
            if !amount.is_finite() || amount <= 0.0 {
                return;
            }
            if let Some(cell) = world.grid.geometry.world_to_cell(position) {
                let _ = world.spawn_at(cell, amount);
            }
        }
        Command::SpawnWaterInRegion { vertices, total } => {
            world.spawn_in_region(&vertices, total);
        }
        Command::RemoveWater { position, amount } => {
            if let Some(cell) = world.grid.geometry.world_to_cell(position) {
                let _ = world.grid.drain_water(cell, amount);
            }
        }
        Command::ClearAllWater => {
            world.grid.clear();
            world.generation = world.generation.wrapping_add(1);
            out_events.push(Event::WaterCleared {
                generation: world.generation,
            });
        }
        Command::ActivateCell { cell } => world.grid.activate(cell),
        Command::RefreshSolidCells => {}
        Command::ApplySolidMask { solid } => {
            if solid.len() != world.grid.geometry.cell_count() {
                warn!(
                    "ignoring solid mask with {} entries for a grid of {} cells",
                    solid.len(),
                    world.grid.geometry.cell_count()
                );
                return;
            }
            let diff = world
                .grid
                .apply_solid_mask(&solid, world.tuning.min_water_transfer);
            out_events.push(Event::SolidCellsRefreshed {
                blocked: diff.blocked,
                freed: diff.freed,
                reactivated: diff.reactivated,
            });
        }
        Command::RegisterBody { body } => {
            let id = body.id;
            let _ = world.bodies.insert(id, body);
            out_events.push(Event::BodyRegistered { id });
        }
        Command::UpdateBody {
            id,
            position,
            velocity,
        } => {
            if let Some(body) = world.bodies.get_mut(&id) {
                body.position = position;
                body.velocity = velocity;
            }
        }
        Command::RemoveBody { id } => {
            if world.bodies.remove(&id).is_some() {
                out_events.push(Event::BodyRemoved { id });
            }
        }
        Command::RegisterAbsorber { absorber } => {
            let id = absorber.id;
            let _ = world.absorbers.insert(id, absorber);
            out_events.push(Event::AbsorberRegistered { id });
        }
        Command::RemoveAbsorber { id } => {
            if world.absorbers.remove(&id).is_some() {
                out_events.push(Event::AbsorberRemoved { id });
            }
        }
    }
}

/// Query functions that provide read-only access to the world state.
pub mod query {
    use std::time::Duration;

    use super::World;
    use liquid_sandbox_core::{
        Aabb, AbsorberView, BodyId, BodySnapshot, BodyView, CellCoord, FlowTuning, GridGeometry,
        WaterView,
    };

    /// Geometry of the current grid.
    #[must_use]
    pub fn geometry(world: &World) -> GridGeometry {
        world.grid.geometry
    }

    /// Flow parameters currently in effect.
    #[must_use]
    pub fn flow_tuning(world: &World) -> &FlowTuning {
        &world.tuning
    }

    /// Water held by a cell; out-of-range cells read as dry.
    #[must_use]
    pub fn water(world: &World, cell: CellCoord) -> f32 {
        world.grid.water(cell)
    }

    /// Reports whether a cell is flagged solid.
    #[must_use]
    pub fn is_solid(world: &World, cell: CellCoord) -> bool {
        world.grid.is_solid(cell)
    }

    /// Reports whether a cell produced no transfer on its last evaluation.
    #[must_use]
    pub fn is_settled(world: &World, cell: CellCoord) -> bool {
        world.grid.is_settled(cell)
    }

    /// Captures a read-only view of the liquid grid.
    #[must_use]
    pub fn water_view(world: &World) -> WaterView<'_> {
        world
            .grid
            .view(world.tuning.max_water_per_cell, world.tuning.min_water_transfer)
    }

    /// Captures a read-only view of the registered bodies.
    #[must_use]
    pub fn body_view(world: &World) -> BodyView {
        BodyView::from_snapshots(world.bodies.values().cloned().collect())
    }

    /// Looks up a single registered body.
    #[must_use]
    pub fn body(world: &World, id: BodyId) -> Option<&BodySnapshot> {
        world.bodies.get(&id)
    }

    /// Captures a read-only view of the registered absorbers.
    #[must_use]
    pub fn absorber_view(world: &World) -> AbsorberView {
        AbsorberView::from_snapshots(world.absorbers.values().cloned().collect())
    }

    /// World-space rectangle covered by the grid.
    #[must_use]
    pub fn world_bounds(world: &World) -> Aabb {
        world.grid.geometry.bounds()
    }

    /// Number of cells scheduled for the next flow step.
    #[must_use]
    pub fn active_cell_count(world: &World) -> usize {
        world.grid.active.len()
    }

    /// Number of open cells holding at least the transfer epsilon.
    #[must_use]
    pub fn total_water_cells(world: &World) -> usize {
        world.grid.wet_cell_count(world.tuning.min_water_transfer)
    }

    /// Sum of the water held by every cell.
    #[must_use]
    pub fn total_water(world: &World) -> f32 {
        world.grid.total_water()
    }

    /// Counter bumped whenever the grid contents are discarded wholesale.
    #[must_use]
    pub fn grid_generation(world: &World) -> u64 {
        world.generation
    }

    /// Number of ticks processed so far.
    #[must_use]
    pub fn tick_index(world: &World) -> u64 {
        world.tick_index
    }

    /// Simulated time accumulated across all ticks.
    #[must_use]
    pub fn elapsed(world: &World) -> Duration {
        world.elapsed
    }
}
