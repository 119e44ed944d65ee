//! Static box geometry standing in for a host physics scene.

use glam::Vec2;
use liquid_sandbox_core::{Aabb, LayerMask, SceneQuery};

/// Axis-aligned obstacle on a physics layer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Obstacle {
    pub(crate) bounds: Aabb,
    pub(crate) layer: LayerMask,
}

/// Scene made of axis-aligned boxes that scenarios may add or remove.
#[derive(Clone, Debug, Default)]
pub(crate) struct BoxScene {
    obstacles: Vec<Option<Obstacle>>,
}

impl BoxScene {
    /// Adds an obstacle on the default layer and returns its handle.
    pub(crate) fn add(&mut self, bounds: Aabb) -> usize {
        self.obstacles.push(Some(Obstacle {
            bounds,
            layer: LayerMask::default(),
        }));
        self.obstacles.len() - 1
    }

    /// Removes an obstacle. Returns `false` if it was already gone.
    pub(crate) fn remove(&mut self, handle: usize) -> bool {
        self.obstacles
            .get_mut(handle)
            .and_then(Option::take)
            .is_some()
    }

    pub(crate) fn obstacles(&self) -> impl Iterator<Item = &Obstacle> {
        self.obstacles.iter().flatten()
    }
}

impl SceneQuery for BoxScene {
    fn is_solid_at(&self, point: Vec2, mask: LayerMask) -> bool {
        self.obstacles()
            .any(|obstacle| obstacle.layer.intersects(mask) && obstacle.bounds.contains(point))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shelf() -> (BoxScene, usize) {
        let mut scene = BoxScene::default();
        let handle = scene.add(Aabb::new(Vec2::new(1.0, 1.0), Vec2::new(2.0, 1.5)));
        (scene, handle)
    }

    #[test]
    fn points_inside_boxes_are_solid() {
        let (scene, _) = shelf();
        assert!(scene.is_solid_at(Vec2::new(1.5, 1.2), LayerMask::ALL));
        assert!(!scene.is_solid_at(Vec2::new(0.5, 1.2), LayerMask::ALL));
        assert!(!scene.is_solid_at(Vec2::new(1.5, 1.2), LayerMask::from_layer(3)));
    }

    #[test]
    fn removed_boxes_stop_blocking() {
        let (mut scene, handle) = shelf();
        assert!(scene.remove(handle));
        assert!(!scene.remove(handle));
        assert!(!scene.is_solid_at(Vec2::new(1.5, 1.2), LayerMask::ALL));
        assert_eq!(scene.obstacles().count(), 0);
    }

    #[test]
    fn circle_casts_stop_before_boxes() {
        let (scene, _) = shelf();
        let hit = scene
            .circle_cast(Vec2::new(1.5, 2.5), 0.05, Vec2::new(0.0, -2.0), LayerMask::ALL)
            .expect("falling circle hits the shelf");
        assert!(hit.point.y >= 1.5 - 1e-3);
        assert!(hit.normal.y > 0.9);
    }
}
