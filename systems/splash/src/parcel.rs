//! Ballistic water parcels that hop between grid cells.
//!
//! A parcel keeps its water inside the grid while it flies: every accepted hop
//! drains the cell it occupied and adds the same amount to the next one. The
//! amount carried forward is limited to what is still present in the previous
//! cell, so water the flow stepper moved in the meantime is never duplicated.

use std::{collections::BTreeMap, time::Duration};

use glam::Vec2;
use liquid_sandbox_core::{CellCoord, Command, ParcelTuning, WaterView};

/// Transfers smaller than this are not emitted.
pub(crate) const TRANSFER_EPSILON: f32 = 1e-6;

/// Rows above the launch cell searched when a parcel cannot leave it.
const DEPOSIT_ROWS: i32 = 4;

/// Water changes issued during the current pass but not yet applied by the world.
#[derive(Debug, Default)]
pub(crate) struct Ledger {
    deltas: BTreeMap<CellCoord, f32>,
}

impl Ledger {
    pub(crate) fn clear(&mut self) {
        self.deltas.clear();
    }

    /// Water the cell will hold once pending commands are applied.
    pub(crate) fn water(&self, view: WaterView<'_>, cell: CellCoord) -> f32 {
        let delta = self.deltas.get(&cell).copied().unwrap_or(0.0);
        (view.water(cell) + delta).max(0.0)
    }

    pub(crate) fn headroom(&self, view: WaterView<'_>, cell: CellCoord) -> f32 {
        if view.is_open(cell) {
            (view.max_water() - self.water(view, cell)).max(0.0)
        } else {
            0.0
        }
    }

    pub(crate) fn add(&mut self, cell: CellCoord, amount: f32, out: &mut Vec<Command>) {
        if amount < TRANSFER_EPSILON {
            return;
        }
        *self.deltas.entry(cell).or_insert(0.0) += amount;
        out.push(Command::AddWater { cell, amount });
    }

    pub(crate) fn drain(&mut self, cell: CellCoord, amount: f32, out: &mut Vec<Command>) {
        if amount < TRANSFER_EPSILON {
            return;
        }
        *self.deltas.entry(cell).or_insert(0.0) -= amount;
        out.push(Command::DrainWater { cell, amount });
    }
}

/// Adds water to `cell` and the open cells stacked above it, returning what fit.
pub(crate) fn deposit_upward(
    view: WaterView<'_>,
    ledger: &mut Ledger,
    cell: CellCoord,
    amount: f32,
    out: &mut Vec<Command>,
) -> f32 {
    let geometry = view.geometry();
    let mut remaining = amount;
    for rise in 0..DEPOSIT_ROWS {
        let Some(target) = geometry.offset(cell, 0, rise) else {
            break;
        };
        if !view.is_open(target) {
            break;
        }
        let take = ledger.headroom(view, target).min(remaining);
        ledger.add(target, take, out);
        remaining -= take;
        if remaining < TRANSFER_EPSILON {
            break;
        }
    }
    amount - remaining.max(0.0)
}

/// Outcome of advancing a parcel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FlightStatus {
    Flying,
    Landed,
    Dropped,
}

enum Hop {
    Continue,
    Stop,
}

/// A single water parcel following a parabola sampled at fixed intervals.
#[derive(Clone, Debug)]
pub(crate) struct ParcelFlight {
    origin: Vec2,
    velocity: Vec2,
    gravity: f32,
    amount: f32,
    step: u32,
    steps: u32,
    interval: Duration,
    since_step: Duration,
    holder: Option<CellCoord>,
    generation: u64,
}

impl ParcelFlight {
    pub(crate) fn launch(
        origin: Vec2,
        velocity: Vec2,
        amount: f32,
        tuning: &ParcelTuning,
        generation: u64,
    ) -> Self {
        Self {
            origin,
            velocity,
            gravity: tuning.gravity,
            amount,
            step: 0,
            steps: tuning.arc_steps.max(1),
            interval: Duration::from_millis(u64::from(tuning.step_interval_ms.max(1))),
            since_step: Duration::ZERO,
            holder: None,
            generation,
        }
    }

    pub(crate) fn amount(&self) -> f32 {
        self.amount
    }

    /// Reports whether the parcel's water has already been added to the grid.
    pub(crate) fn in_grid(&self) -> bool {
        self.holder.is_some()
    }

    fn position_at(&self, step: u32) -> Vec2 {
        let t = self.interval.as_secs_f32() * step as f32;
        self.origin + self.velocity * t + Vec2::new(0.0, -0.5 * self.gravity * t * t)
    }

    /// Samples the trajectory for every step that fell due during `dt`.
    pub(crate) fn advance(
        &mut self,
        dt: Duration,
        view: WaterView<'_>,
        ledger: &mut Ledger,
        generation: u64,
        out: &mut Vec<Command>,
    ) -> FlightStatus {
        if generation != self.generation {
            return FlightStatus::Dropped;
        }
        match self.holder {
            Some(holder) if !view.is_open(holder) => return FlightStatus::Landed,
            None if self.step >= self.steps => return self.land(view, ledger, out),
            _ => {}
        }

        self.since_step = self.since_step.saturating_add(dt);
        while self.since_step >= self.interval {
            self.since_step -= self.interval;
            self.step += 1;
            let position = self.position_at(self.step);
            if let Hop::Stop = self.hop(position, view, ledger, out) {
                return self.land(view, ledger, out);
            }
            if self.step >= self.steps {
                return self.land(view, ledger, out);
            }
        }
        FlightStatus::Flying
    }

    fn hop(
        &mut self,
        position: Vec2,
        view: WaterView<'_>,
        ledger: &mut Ledger,
        out: &mut Vec<Command>,
    ) -> Hop {
        let Some(target) = view.geometry().world_to_cell(position) else {
            return Hop::Stop;
        };
        if self.holder == Some(target) {
            return Hop::Continue;
        }
        if !view.is_open(target) || ledger.headroom(view, target) < self.amount {
            return Hop::Stop;
        }

        match self.holder {
            None => ledger.add(target, self.amount, out),
            Some(previous) => {
                let recoverable = self.amount.min(ledger.water(view, previous));
                if recoverable < TRANSFER_EPSILON {
                    self.amount = 0.0;
                    return Hop::Stop;
                }
                ledger.drain(previous, recoverable, out);
                ledger.add(target, recoverable, out);
                self.amount = recoverable;
            }
        }
        self.holder = Some(target);
        Hop::Continue
    }

    /// Deposits the carried water above the launch cell. Whatever does not fit
    /// stays airborne and is retried on the next advance.
    fn land(
        &mut self,
        view: WaterView<'_>,
        ledger: &mut Ledger,
        out: &mut Vec<Command>,
    ) -> FlightStatus {
        if self.holder.is_some() {
            return FlightStatus::Landed;
        }
        let Some(cell) = view.geometry().world_to_cell(self.origin) else {
            return FlightStatus::Dropped;
        };
        let deposited = deposit_upward(view, ledger, cell, self.amount, out);
        self.amount -= deposited;
        if self.amount < TRANSFER_EPSILON {
            return FlightStatus::Landed;
        }
        self.step = self.steps;
        FlightStatus::Flying
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use liquid_sandbox_core::GridGeometry;

    struct Buffers {
        geometry: GridGeometry,
        water: Vec<f32>,
        solid: Vec<bool>,
        flags: Vec<bool>,
        depth: Vec<u32>,
    }

    impl Buffers {
        fn new(columns: u32, rows: u32) -> Self {
            let geometry = GridGeometry::new(columns, rows, 1.0, Vec2::ZERO);
            let count = geometry.cell_count();
            Self {
                geometry,
                water: vec![0.0; count],
                solid: vec![false; count],
                flags: vec![false; count],
                depth: vec![0; count],
            }
        }

        fn set(&mut self, cell: CellCoord, amount: f32) {
            if let Some(index) = self.geometry.index(cell) {
                self.water[index] = amount;
            }
        }

        fn view(&self) -> WaterView<'_> {
            WaterView::new(
                self.geometry,
                &self.water,
                &self.solid,
                &self.flags,
                &self.depth,
                &self.flags,
                1.0,
                0.001,
            )
        }
    }

    fn net_water(commands: &[Command]) -> f32 {
        commands
            .iter()
            .map(|command| match command {
                Command::AddWater { amount, .. } => *amount,
                Command::DrainWater { amount, .. } => -*amount,
                _ => 0.0,
            })
            .sum()
    }

    #[test]
    fn ledger_accounts_for_pending_commands() {
        let mut buffers = Buffers::new(4, 4);
        let cell = CellCoord::new(1, 1);
        buffers.set(cell, 0.25);
        let mut ledger = Ledger::default();
        let mut out = Vec::new();

        ledger.add(cell, 0.5, &mut out);

        assert!((ledger.water(buffers.view(), cell) - 0.75).abs() < 1e-6);
        assert!((ledger.headroom(buffers.view(), cell) - 0.25).abs() < 1e-6);
        assert_eq!(out, vec![Command::AddWater { cell, amount: 0.5 }]);
    }

    #[test]
    fn parcel_trails_its_water_through_open_cells() {
        let buffers = Buffers::new(8, 8);
        let tuning = ParcelTuning::default();
        let mut flight = ParcelFlight::launch(
            Vec2::new(2.5, 2.5),
            Vec2::new(6.0, 4.0),
            0.2,
            &tuning,
            3,
        );
        let mut ledger = Ledger::default();
        let mut out = Vec::new();

        let mut status = FlightStatus::Flying;
        for _ in 0..tuning.arc_steps {
            status = flight.advance(
                Duration::from_millis(u64::from(tuning.step_interval_ms)),
                buffers.view(),
                &mut ledger,
                3,
                &mut out,
            );
            if status != FlightStatus::Flying {
                break;
            }
        }

        assert_eq!(status, FlightStatus::Landed);
        assert!((net_water(&out) - 0.2).abs() < 1e-5);
        assert!(out
            .iter()
            .any(|command| matches!(command, Command::DrainWater { .. })));
    }

    #[test]
    fn blocked_launch_deposits_above_the_origin() {
        let mut buffers = Buffers::new(4, 8);
        let origin_cell = CellCoord::new(1, 1);
        buffers.set(origin_cell, 1.0);
        let mut flight = ParcelFlight::launch(
            Vec2::new(1.5, 1.5),
            Vec2::ZERO,
            0.3,
            &ParcelTuning::default(),
            0,
        );
        let mut ledger = Ledger::default();
        let mut out = Vec::new();

        let status = flight.advance(
            Duration::from_millis(20),
            buffers.view(),
            &mut ledger,
            0,
            &mut out,
        );

        assert_eq!(status, FlightStatus::Landed);
        assert_eq!(
            out,
            vec![Command::AddWater {
                cell: CellCoord::new(1, 2),
                amount: 0.3
            }]
        );
    }

    #[test]
    fn parcels_that_do_not_fit_wait_for_room() {
        let mut buffers = Buffers::new(4, 3);
        buffers.set(CellCoord::new(1, 1), 1.0);
        buffers.set(CellCoord::new(1, 2), 0.9);
        let mut flight = ParcelFlight::launch(
            Vec2::new(1.5, 1.5),
            Vec2::ZERO,
            0.3,
            &ParcelTuning::default(),
            0,
        );
        let mut out = Vec::new();

        let status = flight.advance(
            Duration::from_millis(20),
            buffers.view(),
            &mut Ledger::default(),
            0,
            &mut out,
        );

        assert_eq!(status, FlightStatus::Flying);
        assert!((net_water(&out) - 0.1).abs() < 1e-5);
        assert!((flight.amount() - 0.2).abs() < 1e-5);
        assert!(!flight.in_grid());

        buffers.set(CellCoord::new(1, 2), 0.5);
        out.clear();
        let status = flight.advance(
            Duration::from_millis(20),
            buffers.view(),
            &mut Ledger::default(),
            0,
            &mut out,
        );

        assert_eq!(status, FlightStatus::Landed);
        assert!((net_water(&out) - 0.2).abs() < 1e-5);
    }

    #[test]
    fn parcels_from_a_previous_generation_are_dropped() {
        let buffers = Buffers::new(4, 4);
        let mut flight = ParcelFlight::launch(
            Vec2::new(1.5, 1.5),
            Vec2::Y,
            0.1,
            &ParcelTuning::default(),
            1,
        );
        let mut ledger = Ledger::default();
        let mut out = Vec::new();

        let status = flight.advance(
            Duration::from_millis(20),
            buffers.view(),
            &mut ledger,
            2,
            &mut out,
        );

        assert_eq!(status, FlightStatus::Dropped);
        assert!(out.is_empty());
        assert!((flight.amount() - 0.1).abs() < f32::EPSILON);
    }

    #[test]
    fn deposit_stops_at_solid_cells() {
        let mut buffers = Buffers::new(2, 6);
        buffers.set(CellCoord::new(0, 0), 0.9);
        if let Some(index) = buffers.geometry.index(CellCoord::new(0, 2)) {
            buffers.solid[index] = true;
        }
        let mut ledger = Ledger::default();
        let mut out = Vec::new();

        let deposited =
            deposit_upward(buffers.view(), &mut ledger, CellCoord::new(0, 0), 2.0, &mut out);

        assert!((deposited - 1.1).abs() < 1e-5);
    }
}
