#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Pure system that turns bodies crossing the water surface into splashes.
//!
//! A splash removes a small volume of water beneath the impact and hands it to
//! ballistic parcels that hop across the grid until they land. Crown cusps may be
//! released progressively and entry splashes follow up with a delayed jet column,
//! so every splash is tracked as a task that advances once per tick. Overlay
//! droplets are integrated alongside for presentation and optionally collide with
//! the water surface and solid geometry.

mod collision;
mod crown;
mod parcel;
mod particles;

use std::{
    collections::{BTreeMap, VecDeque},
    time::Duration,
};

use glam::Vec2;
use liquid_sandbox_core::{
    Aabb, BodyId, BodySnapshot, BodyView, CellCoord, Command, Droplet, Event, SceneQuery,
    SolidCollision, SplashTuning, SurfaceDetection, WaterView,
};
use log::{debug, warn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::{
    collision::{bounce, Contacts, SolidHash, SurfaceCache},
    crown::{crown_cusps, direction, jet_speeds, spray_shots, Cusp},
    parcel::{FlightStatus, Ledger, ParcelFlight, TRANSFER_EPSILON},
    particles::{Particle, ParticleKind, ParticlePool},
};

/// Share of the impact speed kept by droplets thrown up by a micro-splash.
const MICRO_SPEED_FACTOR: f32 = 0.3;

/// Progress of an active splash.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SplashPhase {
    /// Crown cusps are still being released.
    CrownEjection,
    /// Waiting for the jet column to form.
    JetDelay,
    /// Jet parcels are being fired upward.
    JetColumn,
}

/// Running totals reported by the splash engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SplashStats {
    /// Splashes that removed water and launched parcels.
    pub splashes_started: u64,
    /// Splash requests rejected by the per-tick limit.
    pub splashes_dropped: u64,
    /// Parcels that came to rest inside the grid.
    pub parcels_landed: u64,
    /// Parcels discarded because the grid changed or no room was left.
    pub parcels_dropped: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SplashKind {
    Entry,
    Exit,
    Side,
}

#[derive(Clone, Copy, Debug, Default)]
struct TrackedBody {
    in_water: bool,
    side_cooldown: Duration,
}

#[derive(Clone, Copy, Debug)]
struct PendingCusp {
    cusp: Cusp,
    amount: f32,
}

#[derive(Debug)]
struct SplashTask {
    phase: SplashPhase,
    elapsed: Duration,
    origin: Vec2,
    intensity: f32,
    cusps: VecDeque<PendingCusp>,
    jet: VecDeque<(f32, f32)>,
    jets_fired: u32,
    generation: u64,
}

/// Splash engine tracking bodies, splash tasks, parcels and overlay droplets.
#[derive(Debug)]
pub struct SplashEngine {
    tuning: SplashTuning,
    rng: ChaCha8Rng,
    generation: u64,
    bodies: BTreeMap<BodyId, TrackedBody>,
    tasks: Vec<SplashTask>,
    parcels: Vec<ParcelFlight>,
    particles: ParticlePool,
    ledger: Ledger,
    surface: SurfaceCache,
    solids: SolidHash,
    stats: SplashStats,
    warned_missing_scene: bool,
}

impl SplashEngine {
    /// Creates a new splash engine seeded from the tuning.
    #[must_use]
    pub fn new(tuning: SplashTuning) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(tuning.seed);
        let particles = ParticlePool::new(tuning.particles.max_particles as usize);
        let solids = SolidHash::new(tuning.particles.spatial_hash_bucket_cells);
        Self {
            tuning,
            rng,
            generation: 0,
            bodies: BTreeMap::new(),
            tasks: Vec::new(),
            parcels: Vec::new(),
            particles,
            ledger: Ledger::default(),
            surface: SurfaceCache::new(),
            solids,
            stats: SplashStats::default(),
            warned_missing_scene: false,
        }
    }

    /// Tuning currently in effect.
    #[must_use]
    pub fn tuning(&self) -> &SplashTuning {
        &self.tuning
    }

    /// Running totals since construction.
    #[must_use]
    pub fn stats(&self) -> SplashStats {
        self.stats
    }

    /// Number of live overlay droplets.
    #[must_use]
    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    /// Number of parcels in flight.
    #[must_use]
    pub fn parcel_count(&self) -> usize {
        self.parcels.len()
    }

    /// Water removed by splashes that has not been returned to the grid yet.
    ///
    /// Covers parcels still waiting for their first hop and crown or jet parcels
    /// that have not been released.
    #[must_use]
    pub fn airborne_water(&self) -> f32 {
        let flying: f32 = self
            .parcels
            .iter()
            .filter(|flight| !flight.in_grid())
            .map(ParcelFlight::amount)
            .sum();
        let pending: f32 = self
            .tasks
            .iter()
            .map(|task| {
                task.cusps.iter().map(|pending| pending.amount).sum::<f32>()
                    + task.jet.iter().map(|(_, amount)| amount).sum::<f32>()
            })
            .sum();
        flying + pending
    }

    /// Number of splashes with pending crown or jet work.
    #[must_use]
    pub fn active_splashes(&self) -> usize {
        self.tasks.len()
    }

    /// Phase of every active splash in start order.
    #[must_use]
    pub fn phases(&self) -> Vec<SplashPhase> {
        self.tasks.iter().map(|task| task.phase).collect()
    }

    /// Overlay droplets ready for presentation.
    #[must_use]
    pub fn droplets(&self) -> Vec<Droplet> {
        self.particles.iter().map(Particle::droplet).collect()
    }

    /// Advances parcels, droplets and splash tasks, then checks bodies for new splashes.
    ///
    /// Nothing happens until `Event::TimeAdvanced` reports elapsed time. The water
    /// view must reflect every command emitted by the previous call.
    pub fn handle(
        &mut self,
        events: &[Event],
        water: WaterView<'_>,
        bodies: &BodyView,
        scene: Option<&dyn SceneQuery>,
        out: &mut Vec<Command>,
    ) {
        let mut dt = Duration::ZERO;
        for event in events {
            match event {
                Event::TimeAdvanced { dt: step } => dt = dt.saturating_add(*step),
                Event::GridConfigured { generation, .. } => {
                    self.generation = *generation;
                    self.particles.clear();
                    self.surface.invalidate();
                    self.solids.invalidate();
                }
                Event::WaterCleared { generation } => {
                    self.generation = *generation;
                    self.surface.invalidate();
                }
                Event::SolidCellsRefreshed { .. } => self.solids.invalidate(),
                Event::BodyRemoved { id } => {
                    let _ = self.bodies.remove(id);
                }
                _ => {}
            }
        }
        if dt.is_zero() {
            return;
        }

        self.ledger.clear();
        self.advance_parcels(dt, water, out);
        self.advance_particles(dt, water, scene, out);

        let mut tasks = std::mem::take(&mut self.tasks);
        tasks.retain_mut(|task| self.progress(task, dt));
        self.tasks = tasks;

        self.detect_splashes(dt, water, bodies, out);
    }

    fn advance_parcels(&mut self, dt: Duration, water: WaterView<'_>, out: &mut Vec<Command>) {
        let mut parcels = std::mem::take(&mut self.parcels);
        parcels.retain_mut(|flight| {
            match flight.advance(dt, water, &mut self.ledger, self.generation, out) {
                FlightStatus::Flying => true,
                FlightStatus::Landed => {
                    self.stats.parcels_landed += 1;
                    false
                }
                FlightStatus::Dropped => {
                    debug!("dropped parcel carrying {:.4} water", flight.amount());
                    self.stats.parcels_dropped += 1;
                    false
                }
            }
        });
        self.parcels = parcels;
    }

    fn advance_particles(
        &mut self,
        dt: Duration,
        water: WaterView<'_>,
        scene: Option<&dyn SceneQuery>,
        out: &mut Vec<Command>,
    ) {
        let tuning = self.tuning.particles.clone();
        let geometry = water.geometry();
        let bounds = geometry.bounds();

        let mut collision = tuning.solid_collision;
        if tuning.secondary_collisions {
            if collision == SolidCollision::CircleCast && scene.is_none() {
                if !self.warned_missing_scene {
                    warn!("no scene available for circle casts; using the solid cell hash");
                    self.warned_missing_scene = true;
                }
                collision = SolidCollision::SpatialHash;
            }
            if collision == SolidCollision::SpatialHash {
                self.solids.rebuild_if_dirty(water);
            }
            if tuning.surface_detection == SurfaceDetection::SurfaceCache {
                let interval = Duration::from_millis(u64::from(tuning.surface_cache_interval_ms));
                self.surface.refresh(dt, interval, water);
            }
        }
        let cooldown = Duration::from_millis(u64::from(tuning.collision_cooldown_ms));

        let mut impacts = Vec::new();
        for slot in self.particles.live_slots() {
            let Some(particle) = self.particles.get_mut(slot) else {
                continue;
            };
            let start = particle.position;
            let end = particle.integrate(dt, &tuning);
            if particle.expired() || !bounds.contains(end) {
                self.particles.recycle(slot);
                continue;
            }
            if !tuning.secondary_collisions || !particle.cooldown.is_zero() {
                particle.position = end;
                continue;
            }

            let contacts = Contacts {
                view: water,
                ledger: &self.ledger,
                surface: &self.surface,
                solids: &self.solids,
                scene,
                detection: tuning.surface_detection,
                collision,
                mask: tuning.collision_mask,
            };
            let motion = end - start;
            if let Some(hit) = contacts.solid(start, particle.radius, motion) {
                particle.position = hit.point;
                particle.velocity = bounce(
                    particle.velocity,
                    hit.normal,
                    tuning.bounce_damping,
                    tuning.friction,
                );
                particle.cooldown = cooldown;
                continue;
            }
            let contact = if particle.velocity.y < 0.0 {
                contacts.water(start, motion)
            } else {
                None
            };
            match contact {
                Some((point, cell)) => {
                    impacts.push((point, cell, particle.velocity.length(), particle.kind));
                    self.particles.recycle(slot);
                }
                None => particle.position = end,
            }
        }

        for (point, cell, speed, kind) in impacts {
            if kind == ParticleKind::Micro || speed < tuning.micro_splash_speed {
                continue;
            }
            if self.ledger.headroom(water, cell) >= tuning.micro_splash_amount {
                self.ledger.add(cell, tuning.micro_splash_amount, out);
            }
            for _ in 0..tuning.micro_particles {
                let angle = self.rng.gen_range(0.25..=(std::f32::consts::PI - 0.25));
                let velocity = direction(angle) * speed * MICRO_SPEED_FACTOR;
                self.spawn_particle(ParticleKind::Micro, point, velocity);
            }
        }
    }

    fn spawn_particle(&mut self, kind: ParticleKind, position: Vec2, velocity: Vec2) {
        let tuning = &self.tuning.particles;
        let low = tuning.lifetime_min_ms;
        let high = tuning.lifetime_max_ms.max(low);
        let lifetime = Duration::from_millis(u64::from(self.rng.gen_range(low..=high)));
        let particle = Particle {
            position,
            velocity,
            radius: kind.radius(tuning),
            kind,
            age: Duration::ZERO,
            lifetime,
            cooldown: Duration::from_millis(u64::from(tuning.collision_cooldown_ms)),
        };
        let _ = self.particles.spawn(particle);
    }

    fn launch_parcel(&mut self, origin: Vec2, velocity: Vec2, amount: f32) {
        if amount < TRANSFER_EPSILON {
            return;
        }
        self.parcels.push(ParcelFlight::launch(
            origin,
            velocity,
            amount,
            &self.tuning.parcels,
            self.generation,
        ));
    }

    /// Releases whatever the task owes by now; returns `false` once it is finished.
    fn progress(&mut self, task: &mut SplashTask, dt: Duration) -> bool {
        if task.generation != self.generation {
            return false;
        }
        task.elapsed = task.elapsed.saturating_add(dt);
        let jet_delay = Duration::from_millis(u64::from(self.tuning.jet.delay_ms));
        let jet_interval = Duration::from_millis(u64::from(self.tuning.jet.interval_ms));

        loop {
            match task.phase {
                SplashPhase::CrownEjection => {
                    while let Some(pending) = task.cusps.front().copied() {
                        if pending.cusp.delay > task.elapsed {
                            return true;
                        }
                        let _ = task.cusps.pop_front();
                        let velocity = direction(pending.cusp.angle)
                            * self.tuning.crown.speed
                            * task.intensity.sqrt();
                        self.launch_parcel(task.origin, velocity, pending.amount);
                        self.spawn_particle(ParticleKind::Crown, task.origin, velocity);
                    }
                    if task.jet.is_empty() {
                        return false;
                    }
                    task.phase = SplashPhase::JetDelay;
                }
                SplashPhase::JetDelay => {
                    if task.elapsed < jet_delay {
                        return true;
                    }
                    task.phase = SplashPhase::JetColumn;
                }
                SplashPhase::JetColumn => {
                    while let Some((speed, amount)) = task.jet.front().copied() {
                        let due = jet_delay + jet_interval * task.jets_fired;
                        if due > task.elapsed {
                            return true;
                        }
                        let _ = task.jet.pop_front();
                        task.jets_fired += 1;
                        self.launch_parcel(task.origin, Vec2::new(0.0, speed), amount);
                    }
                    return false;
                }
            }
        }
    }

    fn detect_splashes(
        &mut self,
        dt: Duration,
        water: WaterView<'_>,
        bodies: &BodyView,
        out: &mut Vec<Command>,
    ) {
        let mask = self.tuning.layer_mask;
        self.bodies.retain(|id, _| {
            bodies.iter().any(|body| {
                body.id == *id && body.layer.intersects(mask) && body.collider.is_some()
            })
        });

        let mut started = 0;
        for body in bodies.iter() {
            if !body.layer.intersects(mask) {
                continue;
            }
            let Some(bounds) = body.bounds() else {
                continue;
            };
            let in_water = self.touches_water(water, bounds);
            let Some(previous) = self.bodies.get(&body.id).copied() else {
                let _ = self.bodies.insert(
                    body.id,
                    TrackedBody {
                        in_water,
                        side_cooldown: Duration::ZERO,
                    },
                );
                continue;
            };
            let mut record = TrackedBody {
                in_water,
                side_cooldown: previous.side_cooldown.saturating_sub(dt),
            };

            let request = self.classify(body, previous.in_water, &mut record);
            let _ = self.bodies.insert(body.id, record);
            let Some((kind, intensity)) = request else {
                continue;
            };
            if started >= self.tuning.max_splashes_per_tick {
                self.stats.splashes_dropped += 1;
                debug!("splash limit reached; dropping {kind:?} splash of body {}", body.id.get());
                continue;
            }
            if self.start_splash(kind, body, bounds, intensity, water, out) {
                started += 1;
            }
        }
    }

    fn classify(
        &self,
        body: &BodySnapshot,
        was_in_water: bool,
        record: &mut TrackedBody,
    ) -> Option<(SplashKind, f32)> {
        let tuning = &self.tuning;
        let velocity = body.velocity;
        let scaled = |speed: f32, threshold: f32| {
            (speed / threshold.max(f32::EPSILON)).clamp(1.0, tuning.max_intensity)
        };

        if !was_in_water && record.in_water && -velocity.y > tuning.entry_speed {
            return Some((SplashKind::Entry, scaled(-velocity.y, tuning.entry_speed)));
        }
        if was_in_water && !record.in_water && velocity.y > tuning.exit_speed {
            let intensity = scaled(velocity.y, tuning.exit_speed) * tuning.reduced_intensity;
            return Some((SplashKind::Exit, intensity));
        }
        if was_in_water
            && record.in_water
            && velocity.x.abs() > tuning.side_speed
            && record.side_cooldown.is_zero()
        {
            record.side_cooldown = Duration::from_millis(u64::from(tuning.side_cooldown_ms));
            let intensity = scaled(velocity.x.abs(), tuning.side_speed) * tuning.reduced_intensity;
            return Some((SplashKind::Side, intensity));
        }
        None
    }

    /// Checks the bounds centre and the column beneath it down to one row under the body.
    fn touches_water(&self, water: WaterView<'_>, bounds: Aabb) -> bool {
        let geometry = water.geometry();
        if !bounds.intersects(&geometry.bounds().expanded(geometry.cell_size())) {
            return false;
        }
        let (column, centre_row) = geometry.world_to_grid(bounds.center());
        let (_, bottom_row) = geometry.world_to_grid(bounds.min());
        (bottom_row.saturating_sub(1)..=centre_row).any(|row| {
            geometry
                .cell_from_signed(column, row)
                .map_or(false, |cell| {
                    self.ledger.water(water, cell) >= self.tuning.in_water_threshold
                })
        })
    }

    fn start_splash(
        &mut self,
        kind: SplashKind,
        body: &BodySnapshot,
        bounds: Aabb,
        intensity: f32,
        water: WaterView<'_>,
        out: &mut Vec<Command>,
    ) -> bool {
        let Some((sources, origin_cell)) = self.removal_sources(water, bounds, intensity) else {
            return false;
        };
        let geometry = water.geometry();
        let surface_cell = self.surface_above(water, origin_cell);
        let origin =
            geometry.grid_to_world(surface_cell) + Vec2::new(0.0, geometry.cell_size() * 0.5);
        let removed: f32 = sources.iter().map(|(_, amount)| amount).sum();

        let crown = &self.tuning.crown;
        let spray = &self.tuning.spray;
        let jet = &self.tuning.jet;
        let with_crown = kind == SplashKind::Entry;
        let with_jet = with_crown && jet.enabled;
        let weights = [
            if with_crown { crown.water_share } else { 0.0 },
            spray.water_share,
            if with_jet { jet.water_share } else { 0.0 },
        ];
        let weight_sum: f32 = weights.iter().sum();
        let share = |weight: f32| {
            if weight_sum > 0.0 {
                removed * weight / weight_sum
            } else {
                0.0
            }
        };
        let (crown_total, spray_total, jet_total) =
            (share(weights[0]), share(weights[1]), share(weights[2]));

        let cusps = if with_crown {
            crown_cusps(crown, bounds.size().x * 0.5, &mut self.rng)
        } else {
            Vec::new()
        };
        let spray_count = (spray.count as f32 * intensity).round() as u32;
        let shots = spray_shots(spray, spray_count, body.velocity.x, &mut self.rng);
        let speeds = if with_jet {
            jet_speeds(jet, intensity, self.tuning.parcels.gravity)
        } else {
            Vec::new()
        };

        let min_amount = self.tuning.parcels.min_amount;
        let (crown_parcels, crown_amount) = allocate(crown_total, cusps.len(), min_amount);
        let (spray_parcels, spray_amount) = allocate(spray_total, shots.len(), min_amount);
        let (jet_parcels, jet_amount) = allocate(jet_total, speeds.len(), min_amount);
        let carried = crown_parcels as f32 * crown_amount
            + spray_parcels as f32 * spray_amount
            + jet_parcels as f32 * jet_amount;

        if carried > 0.0 {
            let scale = carried / removed;
            for (cell, amount) in &sources {
                self.ledger.drain(*cell, amount * scale, out);
            }
        }

        let spray_speed = spray.speed * intensity.sqrt();
        for (index, shot) in shots.iter().enumerate() {
            let velocity = direction(shot.angle) * spray_speed * shot.speed_scale;
            if index < spray_parcels {
                self.launch_parcel(origin, velocity, spray_amount);
            }
            self.spawn_particle(ParticleKind::Spray, origin, velocity);
        }

        self.stats.splashes_started += 1;
        debug!(
            "{kind:?} splash of body {} at {origin}: intensity {intensity:.2}, carried {carried:.4}",
            body.id.get()
        );

        if !with_crown {
            return true;
        }
        let mut task = SplashTask {
            phase: SplashPhase::CrownEjection,
            elapsed: Duration::ZERO,
            origin,
            intensity,
            cusps: cusps
                .into_iter()
                .enumerate()
                .map(|(index, cusp)| PendingCusp {
                    cusp,
                    amount: if index < crown_parcels {
                        crown_amount
                    } else {
                        0.0
                    },
                })
                .collect(),
            jet: speeds
                .into_iter()
                .enumerate()
                .map(|(index, speed)| {
                    let amount = if index < jet_parcels { jet_amount } else { 0.0 };
                    (speed, amount)
                })
                .collect(),
            jets_fired: 0,
            generation: self.generation,
        };
        if self.progress(&mut task, Duration::ZERO) {
            self.tasks.push(task);
        }
        true
    }

    /// First wet cell beneath the body in each covered column, with the amount to take.
    fn removal_sources(
        &self,
        water: WaterView<'_>,
        bounds: Aabb,
        intensity: f32,
    ) -> Option<(Vec<(CellCoord, f32)>, CellCoord)> {
        let geometry = water.geometry();
        let span = geometry.cell_span(bounds)?;
        let (centre_column, _) = geometry.world_to_grid(bounds.center());
        let (_, bottom_row) = geometry.world_to_grid(bounds.min());
        let per_column = self.tuning.removal_per_intensity * intensity;
        let dry = water.min_water().max(TRANSFER_EPSILON);

        let mut sources = Vec::new();
        let mut origin = None;
        for column in span.min_column..=span.max_column {
            for depth in 0..=self.tuning.removal_search_depth as i32 {
                let row = bottom_row.saturating_sub(depth);
                let Some(cell) = geometry.cell_from_signed(column as i32, row) else {
                    continue;
                };
                let held = self.ledger.water(water, cell);
                if !water.is_open(cell) || held < dry {
                    continue;
                }
                sources.push((cell, per_column.min(held)));
                if column as i32 == centre_column || origin.is_none() {
                    origin = Some(cell);
                }
                break;
            }
        }
        Some((sources, origin?))
    }

    fn surface_above(&self, water: WaterView<'_>, cell: CellCoord) -> CellCoord {
        let geometry = water.geometry();
        let mut surface = cell;
        while let Some(above) = geometry.offset(surface, 0, 1) {
            if !water.is_open(above) || self.ledger.water(water, above) < water.min_water() {
                break;
            }
            surface = above;
        }
        surface
    }
}

/// Splits `total` across at most `slots` parcels of at least `min_amount` each.
fn allocate(total: f32, slots: usize, min_amount: f32) -> (usize, f32) {
    if slots == 0 || total <= 0.0 {
        return (0, 0.0);
    }
    let floor = min_amount.max(TRANSFER_EPSILON);
    let affordable = (total / floor).floor() as usize;
    let count = slots.min(affordable);
    if count == 0 {
        (0, 0.0)
    } else {
        (count, total / count as f32)
    }
}
