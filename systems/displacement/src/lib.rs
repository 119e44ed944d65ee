#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Pure system that pushes water out of the way of moving rigid bodies.
//!
//! Every pass removes most of the water overlapped by a moving body and
//! redistributes exactly the removed volume into open cells above the body,
//! ahead of it and behind it.

use std::{
    collections::{BTreeMap, BTreeSet},
    time::Duration,
};

use glam::Vec2;
use liquid_sandbox_core::{
    BodyId, BodyKind, BodySnapshot, BodyView, CellCoord, CellSpan, Collider, Command,
    DisplacementTuning, Event, WaterView,
};
use log::debug;

/// Velocities shorter than this are treated as zero.
const STILL_EPSILON: f32 = 1e-4;

/// Share of a cell by which collider bounds are shrunk so that edges lying
/// exactly on a cell boundary do not claim the neighbouring cell.
const BOUNDS_INSET: f32 = 1e-3;

/// Displacement coupler that tracks bodies between passes.
#[derive(Debug, Default)]
pub struct Displacement {
    tuning: DisplacementTuning,
    since_update: Duration,
    tracked: BTreeMap<BodyId, TrackedBody>,
    pending: BTreeMap<CellCoord, f32>,
}

#[derive(Clone, Copy, Debug)]
struct TrackedBody {
    last_position: Vec2,
}

impl Displacement {
    /// Creates a new displacement coupler driven by the provided tuning.
    #[must_use]
    pub fn new(tuning: DisplacementTuning) -> Self {
        Self {
            tuning,
            ..Self::default()
        }
    }

    /// Tuning currently in effect.
    #[must_use]
    pub fn tuning(&self) -> &DisplacementTuning {
        &self.tuning
    }

    /// Number of bodies observed during the last pass.
    #[must_use]
    pub fn tracked_bodies(&self) -> usize {
        self.tracked.len()
    }

    /// Emits drain and add commands for bodies moving through water.
    ///
    /// Passes run once `update_interval_ms` of simulated time has been
    /// observed through `Event::TimeAdvanced`.
    pub fn handle(
        &mut self,
        events: &[Event],
        water: WaterView<'_>,
        bodies: &BodyView,
        out: &mut Vec<Command>,
    ) {
        for event in events {
            if let Event::TimeAdvanced { dt } = event {
                self.since_update = self.since_update.saturating_add(*dt);
            }
        }

        let interval = Duration::from_millis(u64::from(self.tuning.update_interval_ms));
        if self.since_update < interval {
            return;
        }
        let elapsed = self.since_update.as_secs_f32();
        self.since_update = Duration::ZERO;

        self.tracked
            .retain(|id, _| bodies.iter().any(|body| body.id == *id));
        self.pending.clear();

        let mut displaced = 0.0;
        for body in bodies.iter() {
            let velocity = self.observe(body, elapsed);
            if !self.participates(body, velocity) {
                continue;
            }
            let Some(collider) = body.collider.as_ref() else {
                continue;
            };
            let plan = plan_displacement(
                &self.tuning,
                water,
                &self.pending,
                body.position,
                collider,
                velocity,
            );
            if plan.is_empty() {
                continue;
            }
            for (cell, amount) in plan.removals() {
                *self.pending.entry(*cell).or_insert(0.0) -= amount;
            }
            for (cell, amount) in plan.additions() {
                *self.pending.entry(*cell).or_insert(0.0) += amount;
            }
            displaced += plan.removed_total();
            plan.emit(out);
        }

        if displaced > 0.0 {
            debug!("displacement pass moved {displaced:.4} units of water");
        }
    }

    fn observe(&mut self, body: &BodySnapshot, elapsed: f32) -> Vec2 {
        let previous = self.tracked.insert(
            body.id,
            TrackedBody {
                last_position: body.position,
            },
        );
        if body.kind != BodyKind::Kinematic || body.velocity.length() > STILL_EPSILON {
            return body.velocity;
        }
        match previous {
            Some(tracked) if elapsed > 0.0 => (body.position - tracked.last_position) / elapsed,
            _ => body.velocity,
        }
    }

    fn participates(&self, body: &BodySnapshot, velocity: Vec2) -> bool {
        body.kind != BodyKind::Static
            && body.collider.is_some()
            && body.layer.intersects(self.tuning.layer_mask)
            && velocity.length() >= self.tuning.min_speed
    }
}

/// Matched water removals and additions produced for one body.
///
/// The removed and added totals always agree.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DisplacementPlan {
    removals: Vec<(CellCoord, f32)>,
    additions: Vec<(CellCoord, f32)>,
}

impl DisplacementPlan {
    /// Water taken from overlapped cells.
    #[must_use]
    pub fn removals(&self) -> &[(CellCoord, f32)] {
        &self.removals
    }

    /// Water deposited into target cells.
    #[must_use]
    pub fn additions(&self) -> &[(CellCoord, f32)] {
        &self.additions
    }

    /// Sum of all removals.
    #[must_use]
    pub fn removed_total(&self) -> f32 {
        self.removals.iter().map(|(_, amount)| amount).sum()
    }

    /// Sum of all additions.
    #[must_use]
    pub fn added_total(&self) -> f32 {
        self.additions.iter().map(|(_, amount)| amount).sum()
    }

    /// Reports whether the plan moves no water.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.removals.is_empty()
    }

    /// Appends the world commands realising the plan.
    pub fn emit(&self, out: &mut Vec<Command>) {
        for (cell, amount) in &self.removals {
            out.push(Command::DrainWater {
                cell: *cell,
                amount: *amount,
            });
        }
        for (cell, amount) in &self.additions {
            out.push(Command::AddWater {
                cell: *cell,
                amount: *amount,
            });
        }
    }
}

/// Computes the displacement caused by a collider at `position` moving with `velocity`.
///
/// `pending` holds per-cell deltas already promised earlier in the same pass
/// and is layered over `water` when reading amounts and headroom.
#[must_use]
pub fn plan_displacement(
    tuning: &DisplacementTuning,
    water: WaterView<'_>,
    pending: &BTreeMap<CellCoord, f32>,
    position: Vec2,
    collider: &Collider,
    velocity: Vec2,
) -> DisplacementPlan {
    let geometry = water.geometry();
    let bounds = collider
        .bounds(position)
        .expanded(-geometry.cell_size() * BOUNDS_INSET);
    let Some(span) = geometry.cell_span(bounds) else {
        return DisplacementPlan::default();
    };
    let amount_in = |cell: CellCoord| {
        (water.water(cell) + pending.get(&cell).copied().unwrap_or(0.0)).max(0.0)
    };
    let epsilon = water.min_water();

    let footprint = footprint_cells(tuning, water, span, position, collider);
    let cell_area = geometry.cell_size() * geometry.cell_size();
    let multiplier = velocity.length().clamp(
        tuning.min_velocity_multiplier,
        tuning.max_velocity_multiplier,
    );
    let mut budget = collider.area() / cell_area * multiplier * tuning.strength;

    let mut removals = Vec::new();
    for cell in &footprint {
        if budget <= 0.0 {
            break;
        }
        let held = amount_in(*cell);
        if held <= 0.0 {
            continue;
        }
        let mut removed = (held * tuning.removal_fraction).min(budget);
        if held - removed < epsilon {
            removed = held;
        }
        budget -= removed;
        removals.push((*cell, removed));
    }
    let removed_total: f32 = removals.iter().map(|(_, amount)| amount).sum();
    if removed_total <= 0.0 {
        return DisplacementPlan::default();
    }

    let targets = target_cells(tuning, water, span, &footprint, velocity);
    let mut additions = Vec::new();
    if !targets.is_empty() {
        let share = removed_total / targets.len() as f32;
        for cell in targets {
            let headroom = (water.max_water() - amount_in(cell)).max(0.0);
            let added = share.min(headroom);
            if added > 0.0 {
                additions.push((cell, added));
            }
        }
    }

    let added_total: f32 = additions.iter().map(|(_, amount)| amount).sum();
    let mut refund = removed_total - added_total;
    for (_, amount) in removals.iter_mut().rev() {
        if refund <= 0.0 {
            break;
        }
        let returned = refund.min(*amount);
        *amount -= returned;
        refund -= returned;
    }
    removals.retain(|(_, amount)| *amount > 0.0);

    DisplacementPlan {
        removals,
        additions,
    }
}

/// Open wet cells whose interior sample points fall inside the collider.
fn footprint_cells(
    tuning: &DisplacementTuning,
    water: WaterView<'_>,
    span: CellSpan,
    position: Vec2,
    collider: &Collider,
) -> Vec<CellCoord> {
    let geometry = water.geometry();
    let samples = tuning.samples_per_cell.max(1);
    let step = geometry.cell_size() / samples as f32;
    span.cells()
        .filter(|cell| water.is_open(*cell) && water.water(*cell) > 0.0)
        .filter(|cell| {
            let corner = geometry.cell_bounds(*cell).min();
            (0..samples).any(|column| {
                (0..samples).any(|row| {
                    let point = corner
                        + Vec2::new((column as f32 + 0.5) * step, (row as f32 + 0.5) * step);
                    collider.contains_point(position, point)
                })
            })
        })
        .collect()
}

/// Open cells receiving displaced water, in deterministic order.
fn target_cells(
    tuning: &DisplacementTuning,
    water: WaterView<'_>,
    span: CellSpan,
    footprint: &[CellCoord],
    velocity: Vec2,
) -> Vec<CellCoord> {
    let geometry = water.geometry();
    let excluded: BTreeSet<CellCoord> = footprint.iter().copied().collect();
    let mut targets = BTreeSet::new();
    let mut consider = |column: i32, row: i32| -> bool {
        let Some(cell) = geometry.cell_from_signed(column, row) else {
            return false;
        };
        if !water.is_open(cell) {
            return false;
        }
        if !excluded.contains(&cell) {
            let _ = targets.insert(cell);
        }
        true
    };

    let min_column = span.min_column as i32;
    let max_column = span.max_column as i32;
    let min_row = span.min_row as i32;
    let max_row = span.max_row as i32;

    for column in min_column..=max_column {
        for offset in 1..=tuning.upward_cells as i32 {
            if !consider(column, max_row + offset) {
                break;
            }
        }
    }

    let direction = if velocity.x > STILL_EPSILON {
        1
    } else if velocity.x < -STILL_EPSILON {
        -1
    } else {
        0
    };
    let (ahead, behind) = match direction {
        1 => (vec![1], vec![-1]),
        -1 => (vec![-1], vec![1]),
        _ => (Vec::new(), vec![-1, 1]),
    };

    for side in ahead {
        let edge = if side > 0 { max_column } else { min_column };
        for offset in 1..=tuning.forward_width as i32 {
            for row in min_row..min_row + tuning.forward_height as i32 {
                let _ = consider(edge + side * offset, row);
            }
        }
    }
    for side in behind {
        let edge = if side > 0 { max_column } else { min_column };
        for offset in 1..=tuning.opposite_cells as i32 {
            let _ = consider(edge + side * offset, min_row);
        }
    }

    targets.into_iter().collect()
}
