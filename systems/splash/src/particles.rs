//! Fixed-capacity pool of overlay droplets.

use std::time::Duration;

use glam::Vec2;
use liquid_sandbox_core::{Droplet, DropletColor, ParticleTuning};

const CROWN_COLOR: DropletColor = DropletColor::from_rgba(205, 228, 255, 235);
const SPRAY_COLOR: DropletColor = DropletColor::from_rgba(176, 210, 250, 210);
const MICRO_COLOR: DropletColor = DropletColor::from_rgba(226, 238, 255, 190);

/// Origin of an overlay droplet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ParticleKind {
    Crown,
    Spray,
    Micro,
}

impl ParticleKind {
    pub(crate) fn radius(self, tuning: &ParticleTuning) -> f32 {
        match self {
            Self::Crown => tuning.crown_size,
            Self::Spray => tuning.spray_size,
            Self::Micro => tuning.micro_size,
        }
    }

    fn color(self) -> DropletColor {
        match self {
            Self::Crown => CROWN_COLOR,
            Self::Spray => SPRAY_COLOR,
            Self::Micro => MICRO_COLOR,
        }
    }
}

/// Free-flying droplet integrated independently of the grid.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Particle {
    pub(crate) position: Vec2,
    pub(crate) velocity: Vec2,
    pub(crate) radius: f32,
    pub(crate) kind: ParticleKind,
    pub(crate) age: Duration,
    pub(crate) lifetime: Duration,
    pub(crate) cooldown: Duration,
}

impl Particle {
    pub(crate) fn droplet(&self) -> Droplet {
        let remaining = if self.lifetime.is_zero() {
            0.0
        } else {
            1.0 - (self.age.as_secs_f32() / self.lifetime.as_secs_f32()).clamp(0.0, 1.0)
        };
        let base = self.kind.color();
        let alpha = (f32::from(base.alpha()) * (0.35 + 0.65 * remaining)).round() as u8;
        Droplet {
            position: self.position,
            radius: self.radius,
            color: DropletColor::from_rgba(base.red(), base.green(), base.blue(), alpha),
        }
    }

    /// Applies gravity and damping for one tick and returns the travelled segment end.
    pub(crate) fn integrate(&mut self, dt: Duration, tuning: &ParticleTuning) -> Vec2 {
        let seconds = dt.as_secs_f32();
        self.velocity.y -= tuning.gravity * seconds;
        self.velocity *= 1.0 / (1.0 + tuning.damping * seconds);
        self.age = self.age.saturating_add(dt);
        self.cooldown = self.cooldown.saturating_sub(dt);
        self.position + self.velocity * seconds
    }

    pub(crate) fn expired(&self) -> bool {
        self.age >= self.lifetime
    }
}

/// Slot pool with a free list; spawns beyond the capacity are rejected.
#[derive(Debug, Default)]
pub(crate) struct ParticlePool {
    slots: Vec<Option<Particle>>,
    free: Vec<usize>,
    capacity: usize,
    live: usize,
}

impl ParticlePool {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            capacity,
            live: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.live
    }

    /// Stores the particle, returning `false` when the pool is full.
    pub(crate) fn spawn(&mut self, particle: Particle) -> bool {
        if self.live >= self.capacity {
            return false;
        }
        let slot = if let Some(slot) = self.free.pop() {
            slot
        } else {
            self.slots.push(None);
            self.slots.len() - 1
        };
        self.slots[slot] = Some(particle);
        self.live += 1;
        true
    }

    pub(crate) fn recycle(&mut self, slot: usize) {
        if let Some(entry) = self.slots.get_mut(slot) {
            if entry.take().is_some() {
                self.free.push(slot);
                self.live -= 1;
            }
        }
    }

    pub(crate) fn get_mut(&mut self, slot: usize) -> Option<&mut Particle> {
        self.slots.get_mut(slot).and_then(Option::as_mut)
    }

    /// Slots currently holding a live particle, in slot order.
    pub(crate) fn live_slots(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, entry)| entry.as_ref().map(|_| slot))
            .collect()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Particle> {
        self.slots.iter().flatten()
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.live = 0;
    }
}
