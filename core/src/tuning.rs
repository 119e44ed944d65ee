//! Tuning surfaces for every liquid subsystem.
//!
//! Each group deserialises with `#[serde(default)]` so partial configuration files
//! only override the knobs they mention. Interval fields are expressed in whole
//! milliseconds.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{LayerMask, MaterialTag};

/// Reasons a tuning surface is rejected.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum TuningError {
    /// A value fell outside its permitted range.
    #[error("{field} = {value} is outside {min}..={max}")]
    OutOfRange {
        /// Name of the offending field.
        field: &'static str,
        /// Supplied value.
        value: f32,
        /// Inclusive lower bound.
        min: f32,
        /// Inclusive upper bound.
        max: f32,
    },
    /// A count or interval that must be non-zero was zero.
    #[error("{field} must be greater than zero")]
    Zero {
        /// Name of the offending field.
        field: &'static str,
    },
    /// A value that must be finite was NaN or infinite.
    #[error("{field} must be finite")]
    NotFinite {
        /// Name of the offending field.
        field: &'static str,
    },
}

fn check_range(field: &'static str, value: f32, min: f32, max: f32) -> Result<(), TuningError> {
    if !value.is_finite() {
        return Err(TuningError::NotFinite { field });
    }
    if value < min || value > max {
        return Err(TuningError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

fn check_non_zero(field: &'static str, value: u32) -> Result<(), TuningError> {
    if value == 0 {
        Err(TuningError::Zero { field })
    } else {
        Ok(())
    }
}

/// Aggregated tuning knobs for the whole liquid simulation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiquidTuning {
    /// Flow stepper parameters.
    pub flow: FlowTuning,
    /// Solid-cell classifier parameters.
    pub solids: SolidTuning,
    /// Displacement coupler parameters.
    pub displacement: DisplacementTuning,
    /// Splash engine parameters.
    pub splash: SplashTuning,
    /// Absorption engine parameters.
    pub absorption: AbsorptionTuning,
}

impl LiquidTuning {
    /// Validates every group, reporting the first violation.
    pub fn validate(&self) -> Result<(), TuningError> {
        self.flow.validate()?;
        self.solids.validate()?;
        self.displacement.validate()?;
        self.splash.validate()?;
        self.absorption.validate()
    }
}

/// Parameters of the cellular flow kernel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowTuning {
    /// Nominal capacity of a cell. Pressure may temporarily exceed it.
    pub max_water_per_cell: f32,
    /// Cells holding less than this are treated as dry and transfers below it are ignored.
    pub min_water_transfer: f32,
    /// Fraction of a cell's water offered to the cell below each step.
    pub flow_speed: f32,
    /// Horizontal equalisation rate; half the weighted difference moves per side.
    pub spread_rate: f32,
    /// Number of flow steps executed per world tick.
    pub iterations_per_tick: u32,
    /// Enables routing water diagonally around obstacles.
    pub enable_diagonal_flow: bool,
    /// Fraction of the remaining water routed diagonally.
    pub diagonal_flow_rate: f32,
    /// Fill ratio above which the cell below counts as full for diagonal and spread flow.
    pub nearly_full_ratio: f32,
    /// Enables the pressure model.
    pub enable_pressure: bool,
    /// Extra capacity granted per unit of water weighing on a cell.
    pub pressure_compression: f32,
    /// Upper bound on extra capacity granted by pressure.
    pub max_compression: f32,
    /// Minimum pressure difference against the cell above before water is pushed up.
    pub pressure_threshold: f32,
    /// Fraction of the pressure difference pushed upward per step.
    pub pressure_push_rate: f32,
    /// Maximum number of cells scanned upward when accumulating weight.
    pub pressure_scan_depth: u32,
    /// Cap on the share of a cell's water pushed upward per step.
    pub max_pressure_push_fraction: f32,
}

impl Default for FlowTuning {
    fn default() -> Self {
        Self {
            max_water_per_cell: 1.0,
            min_water_transfer: 0.001,
            flow_speed: 0.7,
            spread_rate: 0.5,
            iterations_per_tick: 2,
            enable_diagonal_flow: true,
            diagonal_flow_rate: 0.25,
            nearly_full_ratio: 0.95,
            enable_pressure: false,
            pressure_compression: 0.02,
            max_compression: 0.5,
            pressure_threshold: 0.01,
            pressure_push_rate: 0.5,
            pressure_scan_depth: 16,
            max_pressure_push_fraction: 0.25,
        }
    }
}

impl FlowTuning {
    /// Validates value ranges.
    pub fn validate(&self) -> Result<(), TuningError> {
        check_range(
            "flow.max_water_per_cell",
            self.max_water_per_cell,
            f32::MIN_POSITIVE,
            f32::MAX,
        )?;
        check_range(
            "flow.min_water_transfer",
            self.min_water_transfer,
            0.0,
            self.max_water_per_cell,
        )?;
        check_range("flow.flow_speed", self.flow_speed, 0.0, 1.0)?;
        check_range("flow.spread_rate", self.spread_rate, 0.0, 1.0)?;
        check_non_zero("flow.iterations_per_tick", self.iterations_per_tick)?;
        check_range("flow.diagonal_flow_rate", self.diagonal_flow_rate, 0.0, 1.0)?;
        check_range("flow.nearly_full_ratio", self.nearly_full_ratio, f32::MIN_POSITIVE, 1.0)?;
        check_range("flow.pressure_compression", self.pressure_compression, 0.0, f32::MAX)?;
        check_range("flow.max_compression", self.max_compression, 0.0, f32::MAX)?;
        check_range("flow.pressure_threshold", self.pressure_threshold, 0.0, f32::MAX)?;
        check_range("flow.pressure_push_rate", self.pressure_push_rate, 0.0, 1.0)?;
        check_range(
            "flow.max_pressure_push_fraction",
            self.max_pressure_push_fraction,
            0.0,
            1.0,
        )
    }

    /// Absolute ceiling any cell may hold under the current settings.
    #[must_use]
    pub fn hard_capacity(&self) -> f32 {
        if self.enable_pressure {
            self.max_water_per_cell + self.max_compression
        } else {
            self.max_water_per_cell
        }
    }
}

/// Parameters of the solid-cell classifier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolidTuning {
    /// Interval between automatic refreshes.
    pub refresh_interval_ms: u32,
    /// Layers that count as solid geometry.
    pub layer_mask: LayerMask,
}

impl Default for SolidTuning {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 500,
            layer_mask: LayerMask::ALL,
        }
    }
}

impl SolidTuning {
    /// Validates value ranges.
    pub fn validate(&self) -> Result<(), TuningError> {
        check_non_zero("solids.refresh_interval_ms", self.refresh_interval_ms)
    }
}

/// Parameters of the displacement coupler.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplacementTuning {
    /// Interval between displacement passes.
    pub update_interval_ms: u32,
    /// Bodies slower than this (world units per second) are ignored.
    pub min_speed: f32,
    /// Share of each overlapped cell's water removed per pass.
    pub removal_fraction: f32,
    /// Lower clamp of the speed multiplier.
    pub min_velocity_multiplier: f32,
    /// Upper clamp of the speed multiplier.
    pub max_velocity_multiplier: f32,
    /// Water volume displaced per cell of body area at multiplier 1.
    pub strength: f32,
    /// Footprint samples taken along each cell edge.
    pub samples_per_cell: u32,
    /// Cells stacked above the footprint that receive displaced water.
    pub upward_cells: u32,
    /// Width of the region ahead of the body that receives displaced water.
    pub forward_width: u32,
    /// Height of the region ahead of the body that receives displaced water.
    pub forward_height: u32,
    /// Cells behind the body that receive a smaller share.
    pub opposite_cells: u32,
    /// Layers of bodies that displace water.
    pub layer_mask: LayerMask,
}

impl Default for DisplacementTuning {
    fn default() -> Self {
        Self {
            update_interval_ms: 50,
            min_speed: 0.5,
            removal_fraction: 0.85,
            min_velocity_multiplier: 1.0,
            max_velocity_multiplier: 5.0,
            strength: 1.0,
            samples_per_cell: 2,
            upward_cells: 5,
            forward_width: 3,
            forward_height: 2,
            opposite_cells: 1,
            layer_mask: LayerMask::ALL,
        }
    }
}

impl DisplacementTuning {
    /// Validates value ranges.
    pub fn validate(&self) -> Result<(), TuningError> {
        check_non_zero("displacement.update_interval_ms", self.update_interval_ms)?;
        check_range("displacement.min_speed", self.min_speed, 0.0, f32::MAX)?;
        check_range("displacement.removal_fraction", self.removal_fraction, 0.0, 1.0)?;
        check_range(
            "displacement.min_velocity_multiplier",
            self.min_velocity_multiplier,
            0.0,
            self.max_velocity_multiplier,
        )?;
        check_range("displacement.strength", self.strength, 0.0, f32::MAX)?;
        check_non_zero("displacement.samples_per_cell", self.samples_per_cell)
    }
}

/// Cusp placement strategy for crown ejection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrownMode {
    /// Evenly spaced cusps with uniform jitter.
    Naive,
    /// Cusp count derived from the rim circumference and the most unstable wavelength.
    RayleighPlateau,
}

/// Water surface detection strategy for overlay particles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurfaceDetection {
    /// March the travelled segment and sample water amounts.
    StepSampling,
    /// Look up a periodically refreshed set of surface cells.
    SurfaceCache,
}

/// Solid geometry collision strategy for overlay particles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolidCollision {
    /// Ask the scene for a circle cast along the travelled segment.
    CircleCast,
    /// Test against solid grid cells bucketed in a spatial hash.
    SpatialHash,
}

/// Parameters of the splash engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplashTuning {
    /// Layers of bodies that trigger splashes.
    pub layer_mask: LayerMask,
    /// Downward speed required for an entry splash.
    pub entry_speed: f32,
    /// Upward speed required for an exit splash.
    pub exit_speed: f32,
    /// Horizontal speed required for a side splash while submerged.
    pub side_speed: f32,
    /// Minimum interval between side splashes of the same body.
    pub side_cooldown_ms: u32,
    /// Intensity scale applied to side and exit splashes.
    pub reduced_intensity: f32,
    /// Water amount that counts as "in water".
    pub in_water_threshold: f32,
    /// Upper clamp on impact intensity.
    pub max_intensity: f32,
    /// Splashes accepted per tick; extra requests are dropped.
    pub max_splashes_per_tick: u32,
    /// Water removed per unit intensity per cell of body width.
    pub removal_per_intensity: f32,
    /// Rows searched beneath the impact for wet cells.
    pub removal_search_depth: u32,
    /// Crown parameters.
    pub crown: CrownTuning,
    /// Spray parameters.
    pub spray: SprayTuning,
    /// Jet parameters.
    pub jet: JetTuning,
    /// Flying parcel parameters.
    pub parcels: ParcelTuning,
    /// Overlay particle parameters.
    pub particles: ParticleTuning,
    /// Seed for the splash jitter generator.
    pub seed: u64,
}

impl Default for SplashTuning {
    fn default() -> Self {
        Self {
            layer_mask: LayerMask::ALL,
            entry_speed: 2.0,
            exit_speed: 2.5,
            side_speed: 1.5,
            side_cooldown_ms: 250,
            reduced_intensity: 0.5,
            in_water_threshold: 0.1,
            max_intensity: 4.0,
            max_splashes_per_tick: 4,
            removal_per_intensity: 0.15,
            removal_search_depth: 3,
            crown: CrownTuning::default(),
            spray: SprayTuning::default(),
            jet: JetTuning::default(),
            parcels: ParcelTuning::default(),
            particles: ParticleTuning::default(),
            seed: SPLASH_SEED,
        }
    }
}

const SPLASH_SEED: u64 = 0x5eed_c0de_f1a5_4b1d;

impl SplashTuning {
    /// Validates value ranges.
    pub fn validate(&self) -> Result<(), TuningError> {
        check_range("splash.entry_speed", self.entry_speed, 0.0, f32::MAX)?;
        check_range("splash.exit_speed", self.exit_speed, 0.0, f32::MAX)?;
        check_range("splash.side_speed", self.side_speed, 0.0, f32::MAX)?;
        check_range("splash.reduced_intensity", self.reduced_intensity, 0.0, 1.0)?;
        check_range("splash.in_water_threshold", self.in_water_threshold, 0.0, f32::MAX)?;
        check_range("splash.max_intensity", self.max_intensity, 1.0, f32::MAX)?;
        check_range(
            "splash.removal_per_intensity",
            self.removal_per_intensity,
            0.0,
            f32::MAX,
        )?;
        self.crown.validate()?;
        self.spray.validate()?;
        self.jet.validate()?;
        self.parcels.validate()?;
        self.particles.validate()
    }
}

/// Crown ejection parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrownTuning {
    /// Cusp placement strategy.
    pub mode: CrownMode,
    /// Cusp count used by [`CrownMode::Naive`].
    pub naive_cusps: u32,
    /// Most unstable rim wavelength in world units.
    pub wavelength: f32,
    /// Lower clamp on the derived cusp count.
    pub min_cusps: u32,
    /// Upper clamp on the derived cusp count.
    pub max_cusps: u32,
    /// Angular jitter in radians (uniform half-width or Gaussian deviation).
    pub jitter_radians: f32,
    /// Staggers cusp ejection across the window instead of firing all at once.
    pub progressive: bool,
    /// Window across which progressive cusps are released.
    pub ejection_window_ms: u32,
    /// Lowest ejection angle measured from the +x axis, in degrees.
    pub min_angle_degrees: f32,
    /// Highest ejection angle measured from the +x axis, in degrees.
    pub max_angle_degrees: f32,
    /// Launch speed at intensity 1.
    pub speed: f32,
    /// Share of the removed water carried by crown parcels.
    pub water_share: f32,
}

impl Default for CrownTuning {
    fn default() -> Self {
        Self {
            mode: CrownMode::RayleighPlateau,
            naive_cusps: 8,
            wavelength: 0.35,
            min_cusps: 4,
            max_cusps: 24,
            jitter_radians: 0.12,
            progressive: true,
            ejection_window_ms: 80,
            min_angle_degrees: 25.0,
            max_angle_degrees: 155.0,
            speed: 3.0,
            water_share: 0.5,
        }
    }
}

impl CrownTuning {
    /// Validates value ranges.
    pub fn validate(&self) -> Result<(), TuningError> {
        check_non_zero("splash.crown.naive_cusps", self.naive_cusps)?;
        check_range("splash.crown.wavelength", self.wavelength, f32::MIN_POSITIVE, f32::MAX)?;
        check_non_zero("splash.crown.min_cusps", self.min_cusps)?;
        check_range(
            "splash.crown.max_cusps",
            self.max_cusps as f32,
            self.min_cusps as f32,
            f32::MAX,
        )?;
        check_range("splash.crown.min_angle_degrees", self.min_angle_degrees, 0.0, 180.0)?;
        check_range(
            "splash.crown.max_angle_degrees",
            self.max_angle_degrees,
            self.min_angle_degrees,
            180.0,
        )?;
        check_range("splash.crown.water_share", self.water_share, 0.0, 1.0)
    }
}

/// Spray ejection parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SprayTuning {
    /// Droplets ejected at intensity 1.
    pub count: u32,
    /// Launch speed at intensity 1.
    pub speed: f32,
    /// Relative random variation applied to the launch speed.
    pub speed_variance: f32,
    /// Angular margin kept from the horizon on each side, in degrees.
    pub horizon_margin_degrees: f32,
    /// Horizontal bias pushing spray away from the impactor's lateral motion.
    pub lateral_bias: f32,
    /// Share of the removed water carried by spray parcels.
    pub water_share: f32,
}

impl Default for SprayTuning {
    fn default() -> Self {
        Self {
            count: 6,
            speed: 2.5,
            speed_variance: 0.4,
            horizon_margin_degrees: 10.0,
            lateral_bias: 0.6,
            water_share: 0.2,
        }
    }
}

impl SprayTuning {
    /// Validates value ranges.
    pub fn validate(&self) -> Result<(), TuningError> {
        check_range("splash.spray.speed_variance", self.speed_variance, 0.0, 1.0)?;
        check_range(
            "splash.spray.horizon_margin_degrees",
            self.horizon_margin_degrees,
            0.0,
            89.0,
        )?;
        check_range("splash.spray.water_share", self.water_share, 0.0, 1.0)
    }
}

/// Delayed vertical jet parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JetTuning {
    /// Enables the jet column phase.
    pub enabled: bool,
    /// Delay between the crown and the first jet parcel.
    pub delay_ms: u32,
    /// Parcels fired in the column.
    pub parcels: u32,
    /// Apex height of the first parcel at intensity 1.
    pub base_height: f32,
    /// Additional apex height for each successive parcel.
    pub height_step: f32,
    /// Interval between successive jet parcels.
    pub interval_ms: u32,
    /// Share of the removed water carried by jet parcels.
    pub water_share: f32,
}

impl Default for JetTuning {
    fn default() -> Self {
        Self {
            enabled: true,
            delay_ms: 150,
            parcels: 4,
            base_height: 0.4,
            height_step: 0.3,
            interval_ms: 30,
            water_share: 0.3,
        }
    }
}

impl JetTuning {
    /// Validates value ranges.
    pub fn validate(&self) -> Result<(), TuningError> {
        check_range("splash.jet.base_height", self.base_height, 0.0, f32::MAX)?;
        check_range("splash.jet.height_step", self.height_step, 0.0, f32::MAX)?;
        check_range("splash.jet.water_share", self.water_share, 0.0, 1.0)
    }
}

/// Flying water parcel parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParcelTuning {
    /// Trajectory samples between launch and landing.
    pub arc_steps: u32,
    /// Simulated time between trajectory samples.
    pub step_interval_ms: u32,
    /// Downward acceleration applied to parcels.
    pub gravity: f32,
    /// Parcels carrying less water are not launched.
    pub min_amount: f32,
}

impl Default for ParcelTuning {
    fn default() -> Self {
        Self {
            arc_steps: 8,
            step_interval_ms: 20,
            gravity: 9.81,
            min_amount: 0.002,
        }
    }
}

impl ParcelTuning {
    /// Validates value ranges.
    pub fn validate(&self) -> Result<(), TuningError> {
        check_non_zero("splash.parcels.arc_steps", self.arc_steps)?;
        check_non_zero("splash.parcels.step_interval_ms", self.step_interval_ms)?;
        check_range("splash.parcels.gravity", self.gravity, 0.0, f32::MAX)?;
        check_range("splash.parcels.min_amount", self.min_amount, 0.0, f32::MAX)
    }
}

/// Overlay particle parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleTuning {
    /// Live particle cap; spawns beyond it are dropped.
    pub max_particles: u32,
    /// Downward acceleration.
    pub gravity: f32,
    /// Linear velocity damping per second.
    pub damping: f32,
    /// Shortest lifetime.
    pub lifetime_min_ms: u32,
    /// Longest lifetime.
    pub lifetime_max_ms: u32,
    /// Radius of crown droplets.
    pub crown_size: f32,
    /// Radius of spray droplets.
    pub spray_size: f32,
    /// Radius of micro-splash droplets.
    pub micro_size: f32,
    /// Enables collisions against the water surface and solid geometry.
    pub secondary_collisions: bool,
    /// Water surface detection strategy.
    pub surface_detection: SurfaceDetection,
    /// Solid geometry collision strategy.
    pub solid_collision: SolidCollision,
    /// Interval between surface cache rebuilds.
    pub surface_cache_interval_ms: u32,
    /// Edge length of a spatial hash bucket in cells.
    pub spatial_hash_bucket_cells: u32,
    /// Share of the normal velocity kept after a bounce.
    pub bounce_damping: f32,
    /// Share of the tangential velocity removed by a bounce.
    pub friction: f32,
    /// Minimum time between two collisions of the same particle.
    pub collision_cooldown_ms: u32,
    /// Impact speed required to trigger a micro-splash.
    pub micro_splash_speed: f32,
    /// Water injected into the grid by a micro-splash.
    pub micro_splash_amount: f32,
    /// Miniature particles spawned by a micro-splash.
    pub micro_particles: u32,
    /// Layers treated as solid by circle casts.
    pub collision_mask: LayerMask,
}

impl Default for ParticleTuning {
    fn default() -> Self {
        Self {
            max_particles: 256,
            gravity: 9.81,
            damping: 0.6,
            lifetime_min_ms: 400,
            lifetime_max_ms: 900,
            crown_size: 0.05,
            spray_size: 0.035,
            micro_size: 0.02,
            secondary_collisions: true,
            surface_detection: SurfaceDetection::SurfaceCache,
            solid_collision: SolidCollision::SpatialHash,
            surface_cache_interval_ms: 100,
            spatial_hash_bucket_cells: 4,
            bounce_damping: 0.4,
            friction: 0.2,
            collision_cooldown_ms: 50,
            micro_splash_speed: 1.5,
            micro_splash_amount: 0.02,
            micro_particles: 2,
            collision_mask: LayerMask::ALL,
        }
    }
}

impl ParticleTuning {
    /// Validates value ranges.
    pub fn validate(&self) -> Result<(), TuningError> {
        check_range("splash.particles.gravity", self.gravity, 0.0, f32::MAX)?;
        check_range("splash.particles.damping", self.damping, 0.0, f32::MAX)?;
        check_range(
            "splash.particles.lifetime_max_ms",
            self.lifetime_max_ms as f32,
            self.lifetime_min_ms as f32,
            f32::MAX,
        )?;
        check_non_zero(
            "splash.particles.surface_cache_interval_ms",
            self.surface_cache_interval_ms,
        )?;
        check_non_zero(
            "splash.particles.spatial_hash_bucket_cells",
            self.spatial_hash_bucket_cells,
        )?;
        check_range("splash.particles.bounce_damping", self.bounce_damping, 0.0, 1.0)?;
        check_range("splash.particles.friction", self.friction, 0.0, 1.0)?;
        check_range(
            "splash.particles.micro_splash_amount",
            self.micro_splash_amount,
            0.0,
            f32::MAX,
        )
    }
}

/// Absorption rate assigned to a material tag, in water units per second.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaterialRate {
    /// Material tag carried by absorbers.
    pub tag: MaterialTag,
    /// Water absorbed per second.
    pub rate: f32,
}

/// Parameters of the absorption engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbsorptionTuning {
    /// Interval between absorption passes.
    pub check_interval_ms: u32,
    /// Distance from the collider surface within which cells are drained.
    pub surface_tolerance: f32,
    /// Saturation capacity per square world unit of absorber area.
    pub saturation_capacity: f32,
    /// Initial material table.
    pub materials: Vec<MaterialRate>,
}

impl Default for AbsorptionTuning {
    fn default() -> Self {
        Self {
            check_interval_ms: 200,
            surface_tolerance: 0.3,
            saturation_capacity: 4.0,
            materials: vec![
                MaterialRate {
                    tag: MaterialTag::new("sponge"),
                    rate: 0.8,
                },
                MaterialRate {
                    tag: MaterialTag::new("cloth"),
                    rate: 0.4,
                },
                MaterialRate {
                    tag: MaterialTag::new("soil"),
                    rate: 0.15,
                },
            ],
        }
    }
}

impl AbsorptionTuning {
    /// Validates value ranges.
    pub fn validate(&self) -> Result<(), TuningError> {
        check_non_zero("absorption.check_interval_ms", self.check_interval_ms)?;
        check_range(
            "absorption.surface_tolerance",
            self.surface_tolerance,
            0.0,
            f32::MAX,
        )?;
        check_range(
            "absorption.saturation_capacity",
            self.saturation_capacity,
            0.0,
            f32::MAX,
        )?;
        for material in &self.materials {
            check_range("absorption.materials.rate", material.rate, 0.0, f32::MAX)?;
        }
        Ok(())
    }
}
