//! Tick driver that wires the world and the liquid systems together.

use std::{fmt, time::Duration};

use liquid_sandbox_core::{Command, Droplet, Event, LiquidTuning, SceneQuery};
use liquid_sandbox_rendering::FrameSink;
use liquid_sandbox_system_absorption::Absorption;
use liquid_sandbox_system_displacement::Displacement;
use liquid_sandbox_system_solids::SolidClassifier;
use liquid_sandbox_system_splash::{SplashEngine, SplashStats};
use liquid_sandbox_world::{self as world, query, World};
use log::{debug, warn};

use crate::scene::BoxScene;

/// Owns the world, the scene and every system, and steps them in a fixed order.
#[derive(Debug)]
pub(crate) struct Simulation {
    world: World,
    scene: BoxScene,
    solids: SolidClassifier,
    displacement: Displacement,
    splash: SplashEngine,
    absorption: Absorption,
    pending_events: Vec<Event>,
    pending_commands: Vec<Command>,
    rejected_tuning: u32,
}

/// Snapshot of the simulation after a tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct TickReport {
    pub(crate) tick: u64,
    pub(crate) grid_water: f32,
    pub(crate) airborne_water: f32,
    pub(crate) wet_cells: usize,
    pub(crate) active_cells: usize,
    pub(crate) particles: usize,
    pub(crate) splash: SplashStats,
}

impl fmt::Display for TickReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tick {:>5} | water {:>8.3} (+{:.3} airborne) | wet {:>4} active {:>4} | \
             splashes {} (dropped {}) | parcels landed {} dropped {} | droplets {}",
            self.tick,
            self.grid_water,
            self.airborne_water,
            self.wet_cells,
            self.active_cells,
            self.splash.splashes_started,
            self.splash.splashes_dropped,
            self.splash.parcels_landed,
            self.splash.parcels_dropped,
            self.particles,
        )
    }
}

impl Simulation {
    /// Creates a simulation with every subsystem configured from `tuning`.
    pub(crate) fn new(tuning: LiquidTuning) -> Self {
        let mut simulation = Self {
            world: World::new(),
            scene: BoxScene::default(),
            solids: SolidClassifier::new(tuning.solids.clone()),
            displacement: Displacement::new(tuning.displacement.clone()),
            splash: SplashEngine::new(tuning.splash.clone()),
            absorption: Absorption::new(tuning.absorption.clone()),
            pending_events: Vec::new(),
            pending_commands: Vec::new(),
            rejected_tuning: 0,
        };
        simulation.submit(Command::ConfigureFlow { tuning: tuning.flow });
        simulation
    }

    /// Applies a command immediately; its events reach the systems on the next step.
    pub(crate) fn submit(&mut self, command: Command) {
        world::apply(&mut self.world, command.clone(), &mut self.pending_events);
        self.pending_commands.push(command);
    }

    pub(crate) fn world(&self) -> &World {
        &self.world
    }

    pub(crate) fn scene_mut(&mut self) -> &mut BoxScene {
        &mut self.scene
    }

    pub(crate) fn absorption(&self) -> &Absorption {
        &self.absorption
    }

    /// Count of tuning updates the world refused.
    pub(crate) fn rejected_tuning(&self) -> u32 {
        self.rejected_tuning
    }

    /// Advances the clock, then runs solids, flow, displacement, splash and absorption.
    ///
    /// The solid mask lands before water moves, so flow never fills a cell
    /// that the scene blocks this tick. Each system sees every event raised so
    /// far in the tick, including those produced by commands of the systems
    /// that ran before it.
    pub(crate) fn step(&mut self, dt: Duration) -> TickReport {
        let mut events = std::mem::take(&mut self.pending_events);
        let commands = std::mem::take(&mut self.pending_commands);
        world::apply(&mut self.world, Command::AdvanceClock { dt }, &mut events);

        let scene: &dyn SceneQuery = &self.scene;
        let mut out = Vec::new();

        self.solids.handle(
            &events,
            &commands,
            query::geometry(&self.world),
            Some(scene),
            &mut out,
        );
        apply_all(&mut self.world, &mut out, &mut events);
        world::apply(&mut self.world, Command::StepFlow, &mut events);

        self.displacement.handle(
            &events,
            query::water_view(&self.world),
            &query::body_view(&self.world),
            &mut out,
        );
        apply_all(&mut self.world, &mut out, &mut events);

        self.splash.handle(
            &events,
            query::water_view(&self.world),
            &query::body_view(&self.world),
            Some(scene),
            &mut out,
        );
        apply_all(&mut self.world, &mut out, &mut events);

        self.absorption.handle(
            &events,
            query::water_view(&self.world),
            &query::absorber_view(&self.world),
            &mut out,
        );
        apply_all(&mut self.world, &mut out, &mut events);

        for event in &events {
            match event {
                Event::TuningRejected { reason } => {
                    self.rejected_tuning += 1;
                    warn!("tuning rejected: {reason}");
                }
                Event::SolidCellsRefreshed {
                    blocked,
                    freed,
                    reactivated,
                } if *blocked + *freed > 0 => {
                    debug!("solid mask changed: +{blocked} -{freed} ({reactivated} reactivated)");
                }
                _ => {}
            }
        }

        self.report()
    }

    /// Summarises the current state.
    pub(crate) fn report(&self) -> TickReport {
        TickReport {
            tick: query::tick_index(&self.world),
            grid_water: query::total_water(&self.world),
            airborne_water: self.splash.airborne_water(),
            wet_cells: query::total_water_cells(&self.world),
            active_cells: query::active_cell_count(&self.world),
            particles: self.splash.particle_count(),
            splash: self.splash.stats(),
        }
    }

    /// Overlay droplets currently in flight.
    pub(crate) fn droplets(&self) -> Vec<Droplet> {
        self.splash.droplets()
    }

    /// Hands the current state to a frame sink.
    pub(crate) fn present(&self, sink: &mut dyn FrameSink) -> anyhow::Result<()> {
        sink.present(
            query::tick_index(&self.world),
            query::water_view(&self.world),
            &self.droplets(),
        )
    }
}

fn apply_all(world: &mut World, commands: &mut Vec<Command>, events: &mut Vec<Event>) {
    for command in commands.drain(..) {
        world::apply(world, command, events);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;
    use liquid_sandbox_core::{Aabb, CellCoord, FlowTuning};

    fn basin() -> Simulation {
        let mut simulation = Simulation::new(LiquidTuning::default());
        simulation.submit(Command::ConfigureGrid {
            columns: 12,
            rows: 8,
            cell_size: 0.5,
            origin: Vec2::ZERO,
        });
        simulation
    }

    #[test]
    fn scene_boxes_become_solid_cells_after_the_first_tick() {
        let mut simulation = basin();
        let _ = simulation
            .scene_mut()
            .add(Aabb::new(Vec2::new(2.0, 0.0), Vec2::new(3.0, 4.0)));

        let _ = simulation.step(Duration::from_millis(16));

        let world = simulation.world();
        assert!(query::is_solid(world, CellCoord::new(4, 0)));
        assert!(query::is_solid(world, CellCoord::new(5, 7)));
        assert!(!query::is_solid(world, CellCoord::new(3, 0)));
    }

    #[test]
    fn flow_never_enters_cells_blocked_this_tick() {
        let mut simulation = Simulation::new(LiquidTuning::default());
        simulation.submit(Command::ConfigureGrid {
            columns: 8,
            rows: 8,
            cell_size: 0.5,
            origin: Vec2::ZERO,
        });
        let _ = simulation
            .scene_mut()
            .add(Aabb::new(Vec2::new(2.1, 0.1), Vec2::new(2.4, 0.4)));
        simulation.submit(Command::SetWater {
            cell: CellCoord::new(4, 1),
            amount: 0.5,
        });

        let _ = simulation.step(Duration::from_millis(16));

        let world = simulation.world();
        let floor = CellCoord::new(4, 0);
        assert!(query::is_solid(world, floor));
        assert_eq!(query::water(world, floor), 0.0);
        assert!((query::total_water(world) - 0.5).abs() < 1e-5);
    }

    #[test]
    fn water_settles_without_loss() {
        let mut simulation = basin();
        simulation.submit(Command::SpawnWater {
            position: Vec2::new(3.0, 0.25),
            amount: 3.0,
        });
        let before = simulation.report().grid_water;
        assert!((before - 3.0).abs() < 1e-6);

        let mut report = simulation.report();
        for _ in 0..5_000 {
            report = simulation.step(Duration::from_millis(16));
            if report.active_cells == 0 {
                break;
            }
        }

        assert_eq!(report.active_cells, 0, "basin never settled");
        assert!((report.grid_water - before).abs() < 1e-3);
        let world = simulation.world();
        assert!(query::water(world, CellCoord::new(0, 0)) > 0.0);
        assert!(query::water(world, CellCoord::new(11, 0)) > 0.0);
    }

    #[test]
    fn invalid_flow_tuning_is_counted() {
        let mut simulation = basin();
        simulation.submit(Command::ConfigureFlow {
            tuning: FlowTuning {
                max_water_per_cell: -1.0,
                ..FlowTuning::default()
            },
        });

        let _ = simulation.step(Duration::from_millis(16));

        assert_eq!(simulation.rejected_tuning(), 1);
    }
}
