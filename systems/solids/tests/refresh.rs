use std::time::Duration;

use glam::Vec2;
use liquid_sandbox_core::{
    Aabb, CellCoord, Command, Event, LayerMask, SceneQuery, SolidTuning,
};
use liquid_sandbox_system_solids::SolidClassifier;
use liquid_sandbox_world::{self as world, query, World};

struct Boxes {
    boxes: Vec<Aabb>,
}

impl SceneQuery for Boxes {
    fn is_solid_at(&self, point: Vec2, _mask: LayerMask) -> bool {
        self.boxes.iter().any(|area| area.contains(point))
    }
}

struct Harness {
    world: World,
    classifier: SolidClassifier,
    emitted: usize,
}

impl Harness {
    fn new(tuning: SolidTuning) -> Self {
        Self {
            world: World::new(),
            classifier: SolidClassifier::new(tuning),
            emitted: 0,
        }
    }

    fn run(&mut self, command: Command, scene: Option<&dyn SceneQuery>) -> Vec<Event> {
        let mut events = Vec::new();
        world::apply(&mut self.world, command.clone(), &mut events);

        let mut generated = Vec::new();
        self.classifier.handle(
            &events,
            std::slice::from_ref(&command),
            query::geometry(&self.world),
            scene,
            &mut generated,
        );

        let mut follow_up = Vec::new();
        for command in generated {
            self.emitted += 1;
            world::apply(&mut self.world, command, &mut follow_up);
        }
        events.extend(follow_up);
        events
    }

    fn tick(&mut self, millis: u64, scene: Option<&dyn SceneQuery>) -> Vec<Event> {
        self.run(
            Command::Tick {
                dt: Duration::from_millis(millis),
            },
            scene,
        )
    }
}

fn configure() -> Command {
    Command::ConfigureGrid {
        columns: 4,
        rows: 4,
        cell_size: 1.0,
        origin: Vec2::ZERO,
    }
}

fn ledge() -> Boxes {
    Boxes {
        boxes: vec![Aabb::new(Vec2::new(0.0, 1.0), Vec2::new(2.0, 2.0))],
    }
}

#[test]
fn refresh_waits_for_a_tick() {
    let scene = ledge();
    let mut harness = Harness::new(SolidTuning::default());

    let _ = harness.run(configure(), Some(&scene));
    assert_eq!(harness.emitted, 0);
    assert!(!query::is_solid(&harness.world, CellCoord::new(0, 1)));

    let events = harness.tick(16, Some(&scene));

    assert_eq!(harness.emitted, 1);
    assert!(events.contains(&Event::SolidCellsRefreshed {
        blocked: 2,
        freed: 0,
        reactivated: 0,
    }));
    assert!(query::is_solid(&harness.world, CellCoord::new(0, 1)));
    assert!(query::is_solid(&harness.world, CellCoord::new(1, 1)));
    assert!(!query::is_solid(&harness.world, CellCoord::new(2, 1)));
}

#[test]
fn unchanged_scene_is_not_republished_on_interval() {
    let scene = ledge();
    let mut harness = Harness::new(SolidTuning {
        refresh_interval_ms: 100,
        ..SolidTuning::default()
    });
    let _ = harness.run(configure(), Some(&scene));
    let _ = harness.tick(16, Some(&scene));
    assert_eq!(harness.emitted, 1);

    for _ in 0..20 {
        let _ = harness.tick(50, Some(&scene));
    }

    assert_eq!(harness.emitted, 1);
}

#[test]
fn moved_geometry_is_picked_up_on_interval() {
    let mut harness = Harness::new(SolidTuning {
        refresh_interval_ms: 100,
        ..SolidTuning::default()
    });
    let before = ledge();
    let _ = harness.run(configure(), Some(&before));
    let _ = harness.tick(16, Some(&before));

    let after = Boxes {
        boxes: vec![Aabb::new(Vec2::new(2.0, 1.0), Vec2::new(4.0, 2.0))],
    };
    let mut refreshed = Vec::new();
    for _ in 0..3 {
        refreshed.extend(harness.tick(50, Some(&after)));
    }

    assert_eq!(harness.emitted, 2);
    assert!(refreshed.contains(&Event::SolidCellsRefreshed {
        blocked: 2,
        freed: 2,
        reactivated: 0,
    }));
    assert!(!query::is_solid(&harness.world, CellCoord::new(0, 1)));
    assert!(query::is_solid(&harness.world, CellCoord::new(3, 1)));
}

#[test]
fn manual_refresh_runs_on_next_tick() {
    let scene = ledge();
    let mut harness = Harness::new(SolidTuning {
        refresh_interval_ms: 60_000,
        ..SolidTuning::default()
    });
    let _ = harness.run(configure(), Some(&scene));
    let _ = harness.tick(16, Some(&scene));

    let _ = harness.run(Command::RefreshSolidCells, Some(&scene));
    assert_eq!(harness.emitted, 1);
    let _ = harness.tick(16, Some(&scene));

    assert_eq!(harness.emitted, 2);
}

#[test]
fn missing_scene_opens_the_grid_once() {
    let mut harness = Harness::new(SolidTuning {
        refresh_interval_ms: 50,
        ..SolidTuning::default()
    });
    let _ = harness.run(configure(), None);

    for _ in 0..5 {
        let _ = harness.tick(50, None);
    }

    assert_eq!(harness.emitted, 1);
    assert!(!query::is_solid(&harness.world, CellCoord::new(0, 0)));
}
