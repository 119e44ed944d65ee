//! Double-buffered cellular flow kernel.
//!
//! Every step reads the `water` snapshot and accumulates transfers into the
//! `scratch` buffer. Capacity checks run against the write buffer so that a
//! cell is never filled past what it can hold, while each source only ever
//! spends what its snapshot contained.

use liquid_sandbox_core::{CellCoord, FlowTuning};

use crate::grid::LiquidGrid;

/// Result of a single flow step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct StepOutcome {
    pub(crate) transfers: u32,
}

/// Advances the grid by one flow step.
pub(crate) fn step(grid: &mut LiquidGrid, tuning: &FlowTuning) -> StepOutcome {
    let epsilon = tuning.min_water_transfer;
    let dry = epsilon.max(f32::MIN_POSITIVE);

    if grid.active.is_empty() {
        if !grid.rescan_pending {
            return StepOutcome::default();
        }
        grid.rescan_pending = false;
        for (index, amount) in grid.water.iter().enumerate() {
            if !grid.solid[index] && *amount >= dry {
                let _ = grid.active.insert(index);
            }
        }
        if grid.active.is_empty() {
            return StepOutcome::default();
        }
    }

    let worklist: Vec<usize> = std::mem::take(&mut grid.active).into_iter().collect();
    grid.scratch.copy_from_slice(&grid.water);

    let mut kernel = Kernel {
        grid: &mut *grid,
        tuning,
        epsilon,
        touched: Vec::new(),
        outcome: StepOutcome::default(),
    };
    for index in worklist {
        kernel.evaluate(index, dry);
    }
    let Kernel {
        touched, outcome, ..
    } = kernel;

    let ceiling = tuning.hard_capacity();
    for &index in &touched {
        let amount = grid.scratch[index];
        grid.scratch[index] = if amount.is_finite() {
            amount.clamp(0.0, ceiling)
        } else {
            0.0
        };
    }
    std::mem::swap(&mut grid.water, &mut grid.scratch);

    for index in touched {
        grid.wake(index);
    }
    outcome
}

struct Kernel<'a> {
    grid: &'a mut LiquidGrid,
    tuning: &'a FlowTuning,
    epsilon: f32,
    touched: Vec<usize>,
    outcome: StepOutcome,
}

impl Kernel<'_> {
    fn evaluate(&mut self, index: usize, dry: f32) {
        let Some(cell) = self.grid.geometry.cell_at(index) else {
            return;
        };
        if self.grid.solid[index] {
            return;
        }
        let amount = self.grid.water[index];
        if amount < dry {
            self.grid.settled[index] = true;
            return;
        }

        let transfers_before = self.outcome.transfers;
        let mut remaining = amount;

        let below = self.open_neighbour(cell, 0, -1);
        let mut resting = true;
        if let Some(below) = below {
            let capacity = self.capacity(below);
            let room = (capacity - self.grid.scratch[below]).max(0.0);
            let mut offered = remaining * self.tuning.flow_speed;
            if offered < self.epsilon || remaining - offered < self.epsilon {
                offered = remaining;
            }
            let flow = offered.min(room);
            if self.worth_moving(flow) {
                self.transfer(index, below, flow);
                remaining -= flow;
            }
            resting = self.grid.scratch[below] >= capacity * self.tuning.nearly_full_ratio;
        }

        if resting && self.tuning.enable_diagonal_flow && remaining >= dry {
            remaining -= self.flow_diagonally(cell, index, remaining);
        }

        if resting && remaining >= dry {
            remaining -= self.spread(cell, index, remaining);
        }

        if self.tuning.enable_pressure && remaining >= dry {
            self.relieve_pressure(cell, index, remaining);
        }

        if self.outcome.transfers == transfers_before {
            self.grid.settled[index] = true;
        }
    }

    fn flow_diagonally(&mut self, cell: CellCoord, index: usize, remaining: f32) -> f32 {
        let mut targets = [None, None];
        for (slot, side) in targets.iter_mut().zip([-1, 1]) {
            if self.open_neighbour(cell, side, 0).is_none() {
                continue;
            }
            let Some(diagonal) = self.open_neighbour(cell, side, -1) else {
                continue;
            };
            if self.headroom(diagonal) > 0.0 {
                *slot = Some(diagonal);
            }
        }
        let eligible = targets.iter().flatten().count();
        if eligible == 0 {
            return 0.0;
        }

        let share = remaining * self.tuning.diagonal_flow_rate / eligible as f32;
        let mut moved = 0.0;
        for target in targets.into_iter().flatten() {
            let flow = share.min(self.headroom(target));
            if self.worth_moving(flow) {
                self.transfer(index, target, flow);
                moved += flow;
            }
        }
        moved
    }

    fn spread(&mut self, cell: CellCoord, index: usize, mut remaining: f32) -> f32 {
        let source_capacity = self.capacity(index);
        let mut moved = 0.0;
        for side in [-1, 1] {
            let Some(neighbour) = self.open_neighbour(cell, side, 0) else {
                continue;
            };
            let neighbour_amount = self.grid.water[neighbour];
            if neighbour_amount >= remaining {
                continue;
            }
            let mut capacity = self.capacity(neighbour);
            if self.tuning.enable_pressure {
                capacity = capacity.max(source_capacity);
            }
            let room = (capacity - self.grid.scratch[neighbour]).max(0.0);
            let flow = ((remaining - neighbour_amount) * self.tuning.spread_rate * 0.5).min(room);
            if self.worth_moving(flow) {
                self.transfer(index, neighbour, flow);
                remaining -= flow;
                moved += flow;
            }
        }
        moved
    }

    fn relieve_pressure(&mut self, cell: CellCoord, index: usize, remaining: f32) {
        let Some(above) = self.open_neighbour(cell, 0, 1) else {
            return;
        };
        let difference = self.excess(index) - self.excess(above);
        if difference <= self.tuning.pressure_threshold {
            return;
        }
        let flow = (difference * self.tuning.pressure_push_rate)
            .min(self.headroom(above))
            .min(remaining * self.tuning.max_pressure_push_fraction);
        if self.worth_moving(flow) {
            self.transfer(index, above, flow);
        }
    }

    /// Water held beyond what the weight above justifies.
    fn excess(&self, index: usize) -> f32 {
        (self.grid.water[index] - self.capacity(index)).max(0.0)
    }

    fn capacity(&self, index: usize) -> f32 {
        let nominal = self.tuning.max_water_per_cell;
        if !self.tuning.enable_pressure {
            return nominal;
        }
        let bonus = self.weight_above(index) * self.tuning.pressure_compression;
        nominal + bonus.min(self.tuning.max_compression)
    }

    /// Sums the contiguous wet column above a cell, up to the scan depth.
    fn weight_above(&self, index: usize) -> f32 {
        let Some(mut cell) = self.grid.geometry.cell_at(index) else {
            return 0.0;
        };
        let dry = self.epsilon.max(f32::MIN_POSITIVE);
        let mut weight = 0.0;
        for _ in 0..self.tuning.pressure_scan_depth {
            let Some(above) = self.grid.geometry.offset(cell, 0, 1) else {
                break;
            };
            let Some(above_index) = self.grid.geometry.index(above) else {
                break;
            };
            let amount = self.grid.water[above_index];
            if self.grid.solid[above_index] || amount < dry {
                break;
            }
            weight += amount;
            cell = above;
        }
        weight
    }

    fn headroom(&self, index: usize) -> f32 {
        (self.capacity(index) - self.grid.scratch[index]).max(0.0)
    }

    fn open_neighbour(&self, cell: CellCoord, columns: i32, rows: i32) -> Option<usize> {
        let neighbour = self.grid.geometry.offset(cell, columns, rows)?;
        let index = self.grid.geometry.index(neighbour)?;
        if self.grid.solid[index] {
            None
        } else {
            Some(index)
        }
    }

    fn worth_moving(&self, flow: f32) -> bool {
        flow > 0.0 && flow >= self.epsilon
    }

    fn transfer(&mut self, from: usize, to: usize, amount: f32) {
        self.grid.scratch[from] -= amount;
        self.grid.scratch[to] += amount;
        self.touched.push(from);
        self.touched.push(to);
        self.outcome.transfers += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;
    use liquid_sandbox_core::GridGeometry;

    fn grid(columns: u32, rows: u32) -> LiquidGrid {
        LiquidGrid::new(GridGeometry::new(columns, rows, 1.0, Vec2::ZERO))
    }

    #[test]
    fn falling_water_reaches_the_floor() {
        let mut grid = grid(1, 4);
        let tuning = FlowTuning::default();
        let _ = grid.set_water(CellCoord::new(0, 3), 0.5, 1.0);

        for _ in 0..32 {
            let _ = step(&mut grid, &tuning);
        }

        assert!((grid.water(CellCoord::new(0, 0)) - 0.5).abs() < 1e-4);
        assert!(grid.active.is_empty());
    }

    #[test]
    fn empty_active_set_without_rescan_is_a_no_op() {
        let mut grid = grid(3, 3);
        grid.rescan_pending = false;
        let outcome = step(&mut grid, &FlowTuning::default());
        assert_eq!(outcome, StepOutcome::default());
    }

    #[test]
    fn rescan_discovers_untracked_water() {
        let mut grid = grid(1, 2);
        grid.water[1] = 0.4;
        grid.active.clear();
        grid.rescan_pending = true;

        let outcome = step(&mut grid, &FlowTuning::default());

        assert_eq!(outcome.transfers, 1);
        assert!(!grid.rescan_pending);
        assert!((grid.water[0] - 0.28).abs() < 1e-6);
    }

    #[test]
    fn pressure_pushes_overloaded_water_upward() {
        let mut grid = grid(1, 3);
        let tuning = FlowTuning {
            enable_pressure: true,
            ..FlowTuning::default()
        };
        grid.water[0] = 1.4;
        grid.active.clear();
        let _ = grid.active.insert(0);

        let _ = step(&mut grid, &tuning);

        assert!(grid.water[1] > 0.0);
        assert!((grid.water[0] + grid.water[1] - 1.4).abs() < 1e-5);
    }
}
