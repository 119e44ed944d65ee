use std::collections::BTreeSet;

use liquid_sandbox_core::{CellCoord, GridGeometry, WaterView};

/// Dense liquid storage indexed by `row * columns + column`.
///
/// `water` is the authoritative buffer; `scratch` is the flow stepper's write
/// buffer and is swapped with `water` at the end of every step.
#[derive(Clone, Debug)]
pub(crate) struct LiquidGrid {
    pub(crate) geometry: GridGeometry,
    pub(crate) water: Vec<f32>,
    pub(crate) scratch: Vec<f32>,
    pub(crate) solid: Vec<bool>,
    pub(crate) settled: Vec<bool>,
    pub(crate) depth: Vec<u32>,
    pub(crate) surface: Vec<bool>,
    pub(crate) active: BTreeSet<usize>,
    pub(crate) rescan_pending: bool,
}

impl LiquidGrid {
    pub(crate) fn new(geometry: GridGeometry) -> Self {
        let cells = geometry.cell_count();
        Self {
            geometry,
            water: vec![0.0; cells],
            scratch: vec![0.0; cells],
            solid: vec![false; cells],
            settled: vec![false; cells],
            depth: vec![0; cells],
            surface: vec![false; cells],
            active: BTreeSet::new(),
            rescan_pending: true,
        }
    }

    pub(crate) fn view(&self, max_water: f32, min_water: f32) -> WaterView<'_> {
        WaterView::new(
            self.geometry,
            &self.water,
            &self.solid,
            &self.settled,
            &self.depth,
            &self.surface,
            max_water,
            min_water,
        )
    }

    fn open_index(&self, cell: CellCoord) -> Option<usize> {
        let index = self.geometry.index(cell)?;
        if self.solid[index] {
            None
        } else {
            Some(index)
        }
    }

    pub(crate) fn water(&self, cell: CellCoord) -> f32 {
        self.geometry
            .index(cell)
            .map_or(0.0, |index| self.water[index])
    }

    pub(crate) fn is_solid(&self, cell: CellCoord) -> bool {
        self.geometry
            .index(cell)
            .map_or(false, |index| self.solid[index])
    }

    pub(crate) fn is_settled(&self, cell: CellCoord) -> bool {
        self.geometry
            .index(cell)
            .map_or(false, |index| self.settled[index])
    }

    /// Overwrites an open cell's water. Returns the signed change.
    pub(crate) fn set_water(&mut self, cell: CellCoord, amount: f32, capacity: f32) -> f32 {
        let Some(index) = self.open_index(cell) else {
            return 0.0;
        };
        let amount = sanitize(amount).clamp(0.0, capacity);
        let delta = amount - self.water[index];
        self.water[index] = amount;
        self.wake(index);
        delta
    }

    /// Adds water to an open cell up to `capacity`. Returns the accepted amount.
    pub(crate) fn add_water(&mut self, cell: CellCoord, amount: f32, capacity: f32) -> f32 {
        let Some(index) = self.open_index(cell) else {
            return 0.0;
        };
        let amount = sanitize(amount);
        let accepted = amount.min((capacity - self.water[index]).max(0.0));
        if accepted <= 0.0 {
            return 0.0;
        }
        self.water[index] += accepted;
        self.wake(index);
        accepted
    }

    /// Removes up to `amount` from an open cell. Returns the removed amount.
    pub(crate) fn drain_water(&mut self, cell: CellCoord, amount: f32) -> f32 {
        let Some(index) = self.open_index(cell) else {
            return 0.0;
        };
        let removed = sanitize(amount).min(self.water[index]);
        if removed <= 0.0 {
            return 0.0;
        }
        self.water[index] = (self.water[index] - removed).max(0.0);
        self.wake(index);
        removed
    }

    pub(crate) fn clear(&mut self) {
        self.water.fill(0.0);
        self.scratch.fill(0.0);
        self.settled.fill(false);
        self.depth.fill(0);
        self.surface.fill(false);
        self.active.clear();
    }

    /// Clamps every cell into `[0, capacity]`.
    pub(crate) fn clamp_all(&mut self, capacity: f32) {
        for amount in &mut self.water {
            *amount = sanitize(*amount).clamp(0.0, capacity);
        }
    }

    pub(crate) fn activate(&mut self, cell: CellCoord) {
        if let Some(index) = self.geometry.index(cell) {
            self.wake(index);
        }
    }

    /// Schedules the cell and its eight neighbours and clears their settled flags.
    pub(crate) fn wake(&mut self, index: usize) {
        let Some(cell) = self.geometry.cell_at(index) else {
            return;
        };
        for rows in -1..=1 {
            for columns in -1..=1 {
                let Some(neighbour) = self.geometry.offset(cell, columns, rows) else {
                    continue;
                };
                let Some(neighbour_index) = self.geometry.index(neighbour) else {
                    continue;
                };
                self.settled[neighbour_index] = false;
                let _ = self.active.insert(neighbour_index);
            }
        }
    }

    /// Replaces the solid flags, reactivating water trapped in freed cells.
    pub(crate) fn apply_solid_mask(&mut self, mask: &[bool], min_water: f32) -> SolidDiff {
        let mut diff = SolidDiff::default();
        if mask.len() != self.solid.len() {
            return diff;
        }
        let mut freed_wet = Vec::new();
        for (index, (current, next)) in self.solid.iter_mut().zip(mask).enumerate() {
            match (*current, *next) {
                (false, true) => diff.blocked += 1,
                (true, false) => {
                    diff.freed += 1;
                    if self.water[index] > 0.0 && self.water[index] >= min_water {
                        freed_wet.push(index);
                    }
                }
                _ => {}
            }
            *current = *next;
        }
        for index in freed_wet {
            diff.reactivated += 1;
            self.wake(index);
        }
        self.rescan_pending = true;
        diff
    }

    /// Recomputes the derived depth and surface buffers.
    pub(crate) fn refresh_surface(&mut self, min_water: f32) {
        let columns = self.geometry.columns();
        let rows = self.geometry.rows();
        let threshold = min_water.max(f32::MIN_POSITIVE);
        for column in 0..columns {
            let mut run = 0u32;
            for row in (0..rows).rev() {
                let Some(index) = self.geometry.index(CellCoord::new(column, row)) else {
                    continue;
                };
                if self.solid[index] || self.water[index] < threshold {
                    run = 0;
                    self.depth[index] = 0;
                    self.surface[index] = false;
                    continue;
                }
                self.surface[index] = run == 0;
                self.depth[index] = run;
                run = run.saturating_add(1);
            }
        }
    }

    pub(crate) fn total_water(&self) -> f32 {
        self.water.iter().sum()
    }

    pub(crate) fn wet_cell_count(&self, min_water: f32) -> usize {
        let threshold = min_water.max(f32::MIN_POSITIVE);
        self.water
            .iter()
            .zip(&self.solid)
            .filter(|(amount, solid)| !**solid && **amount >= threshold)
            .count()
    }
}

/// Summary of a solid mask reconciliation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct SolidDiff {
    pub(crate) blocked: u32,
    pub(crate) freed: u32,
    pub(crate) reactivated: u32,
}

fn sanitize(amount: f32) -> f32 {
    if amount.is_finite() {
        amount.max(0.0)
    } else {
        0.0
    }
}
