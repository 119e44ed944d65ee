#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Pure system that lets absorptive objects soak up nearby water until saturated.

use std::{
    collections::{BTreeMap, BTreeSet},
    time::Duration,
};

use liquid_sandbox_core::{
    AbsorberId, AbsorberSnapshot, AbsorberView, AbsorptionTuning, CellCoord, Command, Event,
    MaterialTag, TuningError, WaterView,
};
use log::{debug, warn};

/// Drains smaller than this are not emitted.
const DRAIN_EPSILON: f32 = 1e-6;

/// Absorption engine holding the material table and per-absorber saturation.
#[derive(Debug, Default)]
pub struct Absorption {
    tuning: AbsorptionTuning,
    materials: BTreeMap<MaterialTag, f32>,
    saturation: BTreeMap<AbsorberId, f32>,
    since_check: Duration,
    unknown_tags: BTreeSet<MaterialTag>,
}

impl Absorption {
    /// Creates a new engine seeded with the tuning's material table.
    #[must_use]
    pub fn new(tuning: AbsorptionTuning) -> Self {
        let materials = tuning
            .materials
            .iter()
            .map(|material| (material.tag.clone(), material.rate))
            .collect();
        Self {
            tuning,
            materials,
            ..Self::default()
        }
    }

    /// Tuning currently in effect.
    #[must_use]
    pub fn tuning(&self) -> &AbsorptionTuning {
        &self.tuning
    }

    /// Registers or replaces the absorption rate of a material, in water units per second.
    pub fn add_material(&mut self, tag: MaterialTag, rate: f32) -> Result<(), TuningError> {
        const FIELD: &str = "absorption.materials.rate";
        if !rate.is_finite() {
            return Err(TuningError::NotFinite { field: FIELD });
        }
        if rate < 0.0 {
            return Err(TuningError::OutOfRange {
                field: FIELD,
                value: rate,
                min: 0.0,
                max: f32::MAX,
            });
        }
        let _ = self.unknown_tags.remove(&tag);
        let _ = self.materials.insert(tag, rate);
        Ok(())
    }

    /// Forgets a material, returning its previous rate.
    pub fn remove_material(&mut self, tag: &MaterialTag) -> Option<f32> {
        self.materials.remove(tag)
    }

    /// Absorption rate of a material, if known.
    #[must_use]
    pub fn rate(&self, tag: &MaterialTag) -> Option<f32> {
        self.materials.get(tag).copied()
    }

    /// Water soaked up so far by an absorber.
    #[must_use]
    pub fn saturation(&self, id: AbsorberId) -> f32 {
        self.saturation.get(&id).copied().unwrap_or(0.0)
    }

    /// Maximum water an absorber can hold.
    #[must_use]
    pub fn capacity(&self, absorber: &AbsorberSnapshot) -> f32 {
        absorber.collider.area() * self.tuning.saturation_capacity
    }

    /// Emits drain commands for water touching registered absorbers.
    ///
    /// Passes run once `check_interval_ms` of simulated time has been observed
    /// through `Event::TimeAdvanced`; the absorbed amount scales with the time
    /// actually elapsed since the previous pass.
    pub fn handle(
        &mut self,
        events: &[Event],
        water: WaterView<'_>,
        absorbers: &AbsorberView,
        out: &mut Vec<Command>,
    ) {
        for event in events {
            match event {
                Event::TimeAdvanced { dt } => {
                    self.since_check = self.since_check.saturating_add(*dt);
                }
                Event::AbsorberRemoved { id } => {
                    let _ = self.saturation.remove(id);
                }
                _ => {}
            }
        }

        let interval = Duration::from_millis(u64::from(self.tuning.check_interval_ms));
        if self.since_check < interval {
            return;
        }
        let elapsed = self.since_check.as_secs_f32();
        self.since_check = Duration::ZERO;

        let mut drained: BTreeMap<CellCoord, f32> = BTreeMap::new();
        for absorber in absorbers.iter() {
            let Some(rate) = self.materials.get(&absorber.tag).copied() else {
                if self.unknown_tags.insert(absorber.tag.clone()) {
                    warn!(
                        "absorber {} uses unknown material `{}`; skipping it",
                        absorber.id.get(),
                        absorber.tag.as_str()
                    );
                }
                continue;
            };
            let capacity = self.capacity(absorber);
            let saturation = self.saturation(absorber.id);
            if saturation >= capacity {
                continue;
            }
            let wanted = (rate * elapsed).min(capacity - saturation);
            if wanted <= DRAIN_EPSILON {
                continue;
            }

            let cells = self.contact_cells(water, absorber, &drained);
            let absorbed = distribute(wanted, &cells, &mut drained, out);
            if absorbed > 0.0 {
                let _ = self
                    .saturation
                    .insert(absorber.id, (saturation + absorbed).min(capacity));
                debug!(
                    "absorber {} soaked up {absorbed:.4} ({:.4}/{capacity:.4})",
                    absorber.id.get(),
                    saturation + absorbed
                );
            }
        }
    }

    /// Open wet cells whose centres lie within the tolerance of the collider surface.
    fn contact_cells(
        &self,
        water: WaterView<'_>,
        absorber: &AbsorberSnapshot,
        drained: &BTreeMap<CellCoord, f32>,
    ) -> Vec<(CellCoord, f32)> {
        let geometry = water.geometry();
        let tolerance = self.tuning.surface_tolerance;
        let area = absorber.collider.bounds(absorber.position).expanded(tolerance);
        let Some(span) = geometry.cell_span(area) else {
            return Vec::new();
        };
        span.cells()
            .filter(|cell| water.is_open(*cell))
            .filter(|cell| {
                absorber
                    .collider
                    .distance_to_surface(absorber.position, geometry.grid_to_world(*cell))
                    <= tolerance
            })
            .filter_map(|cell| {
                let taken = drained.get(&cell).copied().unwrap_or(0.0);
                let available = water.water(cell) - taken;
                (available >= water.min_water().max(DRAIN_EPSILON)).then_some((cell, available))
            })
            .collect()
    }
}

/// Drains up to `wanted` from the cells in proportion to what each holds.
fn distribute(
    wanted: f32,
    cells: &[(CellCoord, f32)],
    drained: &mut BTreeMap<CellCoord, f32>,
    out: &mut Vec<Command>,
) -> f32 {
    let available: f32 = cells.iter().map(|(_, amount)| amount).sum();
    if available <= DRAIN_EPSILON {
        return 0.0;
    }
    let target = wanted.min(available);
    let mut absorbed = 0.0;
    for (cell, amount) in cells {
        let take = (target * amount / available).min(*amount);
        if take < DRAIN_EPSILON {
            continue;
        }
        *drained.entry(*cell).or_insert(0.0) += take;
        out.push(Command::DrainWater {
            cell: *cell,
            amount: take,
        });
        absorbed += take;
    }
    absorbed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distribution_is_weighted_by_available_water() {
        let cells = [
            (CellCoord::new(0, 0), 0.75),
            (CellCoord::new(1, 0), 0.25),
        ];
        let mut drained = BTreeMap::new();
        let mut out = Vec::new();

        let absorbed = distribute(0.4, &cells, &mut drained, &mut out);

        assert!((absorbed - 0.4).abs() < 1e-6);
        assert!((drained[&CellCoord::new(0, 0)] - 0.3).abs() < 1e-6);
        assert!((drained[&CellCoord::new(1, 0)] - 0.1).abs() < 1e-6);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn distribution_never_takes_more_than_available() {
        let cells = [(CellCoord::new(0, 0), 0.2)];
        let mut drained = BTreeMap::new();
        let mut out = Vec::new();

        let absorbed = distribute(5.0, &cells, &mut drained, &mut out);

        assert!((absorbed - 0.2).abs() < 1e-6);
    }

    #[test]
    fn invalid_rates_are_rejected() {
        let mut absorption = Absorption::new(AbsorptionTuning::default());
        assert!(matches!(
            absorption.add_material(MaterialTag::new("felt"), -1.0),
            Err(TuningError::OutOfRange { .. })
        ));
        assert_eq!(
            absorption.add_material(MaterialTag::new("felt"), f32::NAN),
            Err(TuningError::NotFinite {
                field: "absorption.materials.rate"
            })
        );
        assert_eq!(absorption.rate(&MaterialTag::new("felt")), None);
        assert_eq!(absorption.rate(&MaterialTag::new("sponge")), Some(0.8));
    }
}
