use std::time::Duration;

use glam::Vec2;
use liquid_sandbox_core::{
    AbsorberId, AbsorberSnapshot, AbsorptionTuning, CellCoord, Collider, Command, MaterialTag,
};
use liquid_sandbox_system_absorption::Absorption;
use liquid_sandbox_world::{self as world, query, World};

const TICK: Duration = Duration::from_millis(50);

fn puddle() -> World {
    let mut world = World::new();
    let mut events = Vec::new();
    world::apply(
        &mut world,
        Command::ConfigureGrid {
            columns: 10,
            rows: 10,
            cell_size: 1.0,
            origin: Vec2::ZERO,
        },
        &mut events,
    );
    for column in 0..10 {
        world::apply(
            &mut world,
            Command::SetWater {
                cell: CellCoord::new(column, 0),
                amount: 1.0,
            },
            &mut events,
        );
    }
    world
}

fn register(world: &mut World, id: u32, tag: &str) {
    let mut events = Vec::new();
    world::apply(
        world,
        Command::RegisterAbsorber {
            absorber: AbsorberSnapshot {
                id: AbsorberId::new(id),
                position: Vec2::new(5.0, 1.7),
                collider: Collider::Box {
                    half_extents: Vec2::splat(1.0),
                },
                tag: MaterialTag::new(tag),
            },
        },
        &mut events,
    );
}

fn tick(world: &mut World, absorption: &mut Absorption) -> Vec<Command> {
    let mut events = Vec::new();
    world::apply(world, Command::Tick { dt: TICK }, &mut events);
    let mut commands = Vec::new();
    absorption.handle(
        &events,
        query::water_view(world),
        &query::absorber_view(world),
        &mut commands,
    );
    let mut ignored = Vec::new();
    for command in commands.clone() {
        world::apply(world, command, &mut ignored);
    }
    commands
}

fn small_sponge() -> AbsorptionTuning {
    AbsorptionTuning {
        saturation_capacity: 0.1,
        ..AbsorptionTuning::default()
    }
}

#[test]
fn saturation_never_exceeds_capacity() {
    let mut world = puddle();
    register(&mut world, 1, "sponge");
    let mut absorption = Absorption::new(small_sponge());
    let before = query::total_water(&world);

    for _ in 0..20 {
        let _ = tick(&mut world, &mut absorption);
    }

    let saturation = absorption.saturation(AbsorberId::new(1));
    assert!((saturation - 0.4).abs() < 1e-4, "saturation {saturation}");
    assert!((before - query::total_water(&world) - saturation).abs() < 1e-4);

    for _ in 0..8 {
        assert!(tick(&mut world, &mut absorption).is_empty());
    }
}

#[test]
fn absorption_waits_for_the_check_interval() {
    let mut world = puddle();
    register(&mut world, 1, "sponge");
    let mut absorption = Absorption::new(AbsorptionTuning::default());

    for _ in 0..3 {
        assert!(tick(&mut world, &mut absorption).is_empty());
    }
    let due = tick(&mut world, &mut absorption);

    assert!(!due.is_empty());
    for command in &due {
        match command {
            Command::DrainWater { cell, .. } => assert_eq!(cell.row(), 0),
            other => panic!("unexpected command {other:?}"),
        }
    }
    let expected = 0.8 * 0.2;
    assert!((absorption.saturation(AbsorberId::new(1)) - expected).abs() < 1e-4);
}

#[test]
fn unknown_materials_are_skipped() {
    let mut world = puddle();
    register(&mut world, 1, "granite");
    let mut absorption = Absorption::new(AbsorptionTuning::default());

    for _ in 0..8 {
        assert!(tick(&mut world, &mut absorption).is_empty());
    }
    assert_eq!(absorption.saturation(AbsorberId::new(1)), 0.0);
}

#[test]
fn materials_can_be_added_and_removed_at_runtime() {
    let mut world = puddle();
    register(&mut world, 1, "moss");
    let mut absorption = Absorption::new(AbsorptionTuning::default());
    assert_eq!(absorption.add_material(MaterialTag::new("moss"), 0.5), Ok(()));

    for _ in 0..4 {
        let _ = tick(&mut world, &mut absorption);
    }
    assert!(absorption.saturation(AbsorberId::new(1)) > 0.0);

    assert_eq!(absorption.remove_material(&MaterialTag::new("moss")), Some(0.5));
    for _ in 0..8 {
        assert!(tick(&mut world, &mut absorption).is_empty());
    }
}

#[test]
fn removed_absorbers_lose_their_saturation() {
    let mut world = puddle();
    register(&mut world, 1, "sponge");
    let mut absorption = Absorption::new(AbsorptionTuning::default());
    for _ in 0..4 {
        let _ = tick(&mut world, &mut absorption);
    }
    assert!(absorption.saturation(AbsorberId::new(1)) > 0.0);

    let mut events = Vec::new();
    world::apply(
        &mut world,
        Command::RemoveAbsorber {
            id: AbsorberId::new(1),
        },
        &mut events,
    );
    let mut commands = Vec::new();
    absorption.handle(
        &events,
        query::water_view(&world),
        &query::absorber_view(&world),
        &mut commands,
    );

    assert!(commands.is_empty());
    assert_eq!(absorption.saturation(AbsorberId::new(1)), 0.0);
}
