//! Scripted demo scenes driven from the command line.

use std::time::Duration;

use clap::ValueEnum;
use glam::Vec2;
use liquid_sandbox_core::{
    Aabb, AbsorberId, AbsorberSnapshot, BodyId, BodyKind, BodySnapshot, Collider, Command,
    LayerMask, MaterialTag,
};
use liquid_sandbox_world::query;
use log::info;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::simulation::Simulation;

const COLUMNS: u32 = 48;
const ROWS: u32 = 32;
const CELL_SIZE: f32 = 0.125;
const GRAVITY: f32 = 9.81;
const WATER_DRAG: f32 = 3.0;

const FOUNTAIN_TICKS: u64 = 180;
const FOUNTAIN_RATE: f32 = 0.3;
const GATE_OPEN_TICK: u64 = 90;
const CRATE_ID: BodyId = BodyId::new(1);
const BALL_ID: BodyId = BodyId::new(2);
const BALL_RELEASE_TICK: u64 = 120;

/// Demo scenes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum Scenario {
    /// A wobbling spout pours onto a shelf and fills the floor.
    Fountain,
    /// A crate and a ball fall into a pool.
    Drop,
    /// Sponge and cloth blocks soak up a shallow puddle.
    Sponge,
    /// A wall holding back a reservoir is removed.
    Gate,
}

/// Mutable state of a running scenario.
#[derive(Debug)]
pub(crate) struct Script {
    scenario: Scenario,
    rng: ChaCha8Rng,
    gate: Option<usize>,
}

impl Script {
    /// Builds the scene for `scenario` inside a freshly configured grid.
    pub(crate) fn setup(scenario: Scenario, seed: u64, simulation: &mut Simulation) -> Self {
        simulation.submit(Command::ConfigureGrid {
            columns: COLUMNS,
            rows: ROWS,
            cell_size: CELL_SIZE,
            origin: Vec2::ZERO,
        });

        let mut script = Self {
            scenario,
            rng: ChaCha8Rng::seed_from_u64(seed),
            gate: None,
        };

        match scenario {
            Scenario::Fountain => {
                let _ = simulation
                    .scene_mut()
                    .add(Aabb::new(Vec2::new(1.5, 2.0), Vec2::new(3.25, 2.25)));
            }
            Scenario::Drop => {
                fill(simulation, Vec2::ZERO, Vec2::new(6.0, 1.25));
                register_body(
                    simulation,
                    CRATE_ID,
                    Vec2::new(3.0, 3.2),
                    Collider::Box {
                        half_extents: Vec2::splat(0.2),
                    },
                );
            }
            Scenario::Sponge => {
                fill(simulation, Vec2::ZERO, Vec2::new(6.0, 0.5));
                register_absorber(simulation, 1, Vec2::new(3.0, 0.7), "sponge");
                register_absorber(simulation, 2, Vec2::new(1.2, 0.7), "cloth");
            }
            Scenario::Gate => {
                script.gate = Some(
                    simulation
                        .scene_mut()
                        .add(Aabb::new(Vec2::new(2.9, 0.0), Vec2::new(3.1, 4.0))),
                );
                fill(simulation, Vec2::ZERO, Vec2::new(2.875, 2.5));
            }
        }
        info!("scenario {scenario:?} ready");
        script
    }

    /// Scripted input applied before the tick numbered `tick` runs.
    pub(crate) fn before_tick(&mut self, simulation: &mut Simulation, tick: u64, dt: Duration) {
        match self.scenario {
            Scenario::Fountain => {
                if tick < FOUNTAIN_TICKS {
                    let wobble = self.rng.gen_range(-0.15..=0.15);
                    simulation.submit(Command::SpawnWater {
                        position: Vec2::new(4.0 + wobble, 3.9),
                        amount: FOUNTAIN_RATE,
                    });
                }
            }
            Scenario::Drop => {
                if tick == BALL_RELEASE_TICK {
                    let x = self.rng.gen_range(1.0..=2.0);
                    register_body(
                        simulation,
                        BALL_ID,
                        Vec2::new(x, 3.5),
                        Collider::Circle { radius: 0.15 },
                    );
                }
                fall(simulation, CRATE_ID, dt);
                fall(simulation, BALL_ID, dt);
            }
            Scenario::Sponge => {}
            Scenario::Gate => {
                if tick == GATE_OPEN_TICK {
                    if let Some(gate) = self.gate.take() {
                        let _ = simulation.scene_mut().remove(gate);
                        simulation.submit(Command::RefreshSolidCells);
                        info!("gate opened at tick {tick}");
                    }
                }
            }
        }
    }
}

/// Fills the open cells whose centres lie inside the rectangle to capacity.
fn fill(simulation: &mut Simulation, min: Vec2, max: Vec2) {
    let cells = ((max - min) / CELL_SIZE).round();
    simulation.submit(Command::SpawnWaterInRegion {
        vertices: vec![min, Vec2::new(max.x, min.y), max, Vec2::new(min.x, max.y)],
        total: cells.x * cells.y,
    });
}

fn register_body(simulation: &mut Simulation, id: BodyId, position: Vec2, collider: Collider) {
    simulation.submit(Command::RegisterBody {
        body: BodySnapshot {
            id,
            position,
            velocity: Vec2::ZERO,
            kind: BodyKind::Dynamic,
            layer: LayerMask::default(),
            collider: Some(collider),
        },
    });
}

fn register_absorber(simulation: &mut Simulation, id: u32, position: Vec2, tag: &str) {
    simulation.submit(Command::RegisterAbsorber {
        absorber: AbsorberSnapshot {
            id: AbsorberId::new(id),
            position,
            collider: Collider::Box {
                half_extents: Vec2::new(0.5, 0.25),
            },
            tag: MaterialTag::new(tag),
        },
    });
}

/// Integrates gravity for a body, slowing it in water and resting it on the floor.
fn fall(simulation: &mut Simulation, id: BodyId, dt: Duration) {
    let world = simulation.world();
    let Some(body) = query::body(world, id) else {
        return;
    };
    let Some(bounds) = body.bounds() else {
        return;
    };
    let dt = dt.as_secs_f32();
    let submerged = query::geometry(world)
        .world_to_cell(Vec2::new(body.position.x, bounds.min().y))
        .is_some_and(|cell| query::water(world, cell) > 0.5);

    let mut velocity = body.velocity;
    velocity.y -= GRAVITY * dt;
    if submerged {
        velocity *= (1.0 - WATER_DRAG * dt).max(0.0);
    }
    let mut position = body.position + velocity * dt;
    let floor = position.y - (bounds.center().y - bounds.min().y);
    if floor <= 0.0 {
        position.y -= floor;
        velocity = Vec2::ZERO;
    }
    if position == body.position && velocity == body.velocity {
        return;
    }
    simulation.submit(Command::UpdateBody {
        id,
        position,
        velocity,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use liquid_sandbox_core::{CellCoord, LiquidTuning};

    const TICK: Duration = Duration::from_millis(16);

    fn run(scenario: Scenario, ticks: u64) -> Simulation {
        let mut simulation = Simulation::new(LiquidTuning::default());
        let mut script = Script::setup(scenario, 7, &mut simulation);
        for tick in 0..ticks {
            script.before_tick(&mut simulation, tick, TICK);
            let _ = simulation.step(TICK);
        }
        simulation
    }

    #[test]
    fn gate_releases_the_reservoir() {
        let held = run(Scenario::Gate, GATE_OPEN_TICK);
        let right_of_gate = CellCoord::new(30, 0);
        assert_eq!(query::water(held.world(), right_of_gate), 0.0);
        assert!(query::is_solid(held.world(), CellCoord::new(23, 0)));

        let released = run(Scenario::Gate, GATE_OPEN_TICK + 120);
        assert!(!query::is_solid(released.world(), CellCoord::new(23, 0)));
        assert!(query::water(released.world(), right_of_gate) > 0.0);
    }

    #[test]
    fn crate_comes_to_rest_on_the_floor() {
        let simulation = run(Scenario::Drop, 240);
        let body = query::body(simulation.world(), CRATE_ID).expect("crate stays registered");
        assert!((body.position.y - 0.2).abs() < 1e-4);
        assert_eq!(body.velocity, Vec2::ZERO);
        assert!(simulation.report().splash.splashes_started > 0);
    }

    #[test]
    fn sponge_soaks_up_the_puddle() {
        let simulation = run(Scenario::Sponge, 60);
        let sponge = simulation.absorption().saturation(AbsorberId::new(1));
        let cloth = simulation.absorption().saturation(AbsorberId::new(2));
        assert!(sponge > cloth);
        assert!(cloth > 0.0);
    }

    #[test]
    fn fountain_pours_a_fixed_volume() {
        let simulation = run(Scenario::Fountain, FOUNTAIN_TICKS + 60);
        let report = simulation.report();
        let total = report.grid_water + report.airborne_water;
        assert!((total - FOUNTAIN_RATE * FOUNTAIN_TICKS as f32).abs() < 1e-2);
    }
}
