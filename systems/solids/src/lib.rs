#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Deterministic classifier that marks grid cells occupied by solid scene geometry.

use std::{collections::VecDeque, time::Duration};

use liquid_sandbox_core::{Command, Event, GridGeometry, SceneQuery, SolidTuning};
use log::{debug, warn};

/// Pure system that samples the physics scene at cell centres and emits solid masks.
#[derive(Debug, Default)]
pub struct SolidClassifier {
    tuning: SolidTuning,
    since_refresh: Duration,
    pending_requests: VecDeque<RefreshRequest>,
    last_mask: Vec<bool>,
    warned_missing_scene: bool,
}

impl SolidClassifier {
    /// Creates a new classifier driven by the provided tuning.
    #[must_use]
    pub fn new(tuning: SolidTuning) -> Self {
        Self {
            tuning,
            ..Self::default()
        }
    }

    /// Tuning currently in effect.
    #[must_use]
    pub fn tuning(&self) -> &SolidTuning {
        &self.tuning
    }

    /// Consumes world events and applied commands, emitting `Command::ApplySolidMask`
    /// when a refresh is due.
    ///
    /// Refreshes are requested by grid reconfiguration, by the periodic interval
    /// or by `Command::RefreshSolidCells`, and only execute once a tick
    /// (`Event::TimeAdvanced`) has been observed. Periodic refreshes that would
    /// reproduce the previous mask are suppressed.
    pub fn handle(
        &mut self,
        events: &[Event],
        commands: &[Command],
        geometry: GridGeometry,
        scene: Option<&dyn SceneQuery>,
        out: &mut Vec<Command>,
    ) {
        let mut tick_observed = false;
        let interval = Duration::from_millis(u64::from(self.tuning.refresh_interval_ms));

        for event in events {
            match event {
                Event::GridConfigured { .. } => self.enqueue_request(RefreshRequest::GridChanged),
                Event::TimeAdvanced { dt } => {
                    tick_observed = true;
                    self.since_refresh = self.since_refresh.saturating_add(*dt);
                    if self.since_refresh >= interval {
                        self.since_refresh = Duration::ZERO;
                        self.enqueue_request(RefreshRequest::Interval);
                    }
                }
                _ => {}
            }
        }

        for command in commands {
            if matches!(command, Command::RefreshSolidCells) {
                self.enqueue_request(RefreshRequest::Manual);
            }
        }

        if !tick_observed {
            return;
        }

        let Some(request) = self.pending_requests.pop_front() else {
            return;
        };
        self.pending_requests.clear();

        let Some(scene) = scene else {
            if !self.warned_missing_scene {
                warn!("no physics scene available; treating every cell as open");
                self.warned_missing_scene = true;
                self.last_mask = vec![false; geometry.cell_count()];
                out.push(Command::ApplySolidMask {
                    solid: self.last_mask.clone(),
                });
            }
            return;
        };

        let mut mask = Vec::with_capacity(geometry.cell_count());
        classify(geometry, scene, &self.tuning, &mut mask);

        if request == RefreshRequest::Interval && mask == self.last_mask {
            return;
        }

        debug!(
            "solid refresh ({:?}) marked {} of {} cells",
            request,
            mask.iter().filter(|solid| **solid).count(),
            mask.len()
        );
        self.last_mask.clone_from(&mask);
        out.push(Command::ApplySolidMask { solid: mask });
    }

    fn enqueue_request(&mut self, request: RefreshRequest) {
        match request {
            RefreshRequest::GridChanged => {
                self.pending_requests.clear();
                self.last_mask.clear();
                self.pending_requests.push_back(request);
            }
            RefreshRequest::Manual | RefreshRequest::Interval => {
                if self.pending_requests.is_empty() {
                    self.pending_requests.push_back(request);
                }
            }
        }
    }
}

/// Samples the scene at every cell centre in row-major order.
pub fn classify(
    geometry: GridGeometry,
    scene: &dyn SceneQuery,
    tuning: &SolidTuning,
    mask: &mut Vec<bool>,
) {
    mask.clear();
    mask.extend((0..geometry.cell_count()).map(|index| {
        geometry
            .cell_at(index)
            .map_or(false, |cell| {
                scene.is_solid_at(geometry.grid_to_world(cell), tuning.layer_mask)
            })
    }));
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RefreshRequest {
    GridChanged,
    Interval,
    Manual,
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;
    use liquid_sandbox_core::{CellCoord, LayerMask};

    struct Floor;

    impl SceneQuery for Floor {
        fn is_solid_at(&self, point: Vec2, mask: LayerMask) -> bool {
            mask.intersects(LayerMask::from_layer(0)) && point.y < 1.0
        }
    }

    #[test]
    fn classify_marks_cells_below_the_floor() {
        let geometry = GridGeometry::new(3, 3, 1.0, Vec2::ZERO);
        let mut mask = Vec::new();

        classify(geometry, &Floor, &SolidTuning::default(), &mut mask);

        let solid: Vec<CellCoord> = mask
            .iter()
            .enumerate()
            .filter(|(_, solid)| **solid)
            .filter_map(|(index, _)| geometry.cell_at(index))
            .collect();
        assert_eq!(
            solid,
            vec![CellCoord::new(0, 0), CellCoord::new(1, 0), CellCoord::new(2, 0)]
        );
    }

    #[test]
    fn layer_mask_filters_scene_geometry() {
        let geometry = GridGeometry::new(2, 2, 1.0, Vec2::ZERO);
        let tuning = SolidTuning {
            layer_mask: LayerMask::from_layer(3),
            ..SolidTuning::default()
        };
        let mut mask = Vec::new();

        classify(geometry, &Floor, &tuning, &mut mask);

        assert!(mask.iter().all(|solid| !solid));
    }

    #[test]
    fn grid_change_supersedes_pending_requests() {
        let mut classifier = SolidClassifier::default();
        classifier.enqueue_request(RefreshRequest::Manual);
        classifier.enqueue_request(RefreshRequest::GridChanged);
        classifier.enqueue_request(RefreshRequest::Interval);

        assert_eq!(
            classifier.pending_requests.iter().copied().collect::<Vec<_>>(),
            vec![RefreshRequest::GridChanged]
        );
    }
}
