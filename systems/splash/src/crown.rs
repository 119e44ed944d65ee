//! Ejection patterns for crowns, spray and jets.

use std::{f32::consts::PI, f32::consts::TAU, time::Duration};

use glam::Vec2;
use liquid_sandbox_core::{CrownMode, CrownTuning, JetTuning, SprayTuning};
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Lateral speeds below this do not bias spray.
const LATERAL_EPSILON: f32 = 1e-3;

/// Single crown rim cusp.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Cusp {
    /// Launch angle in radians measured from +x.
    pub(crate) angle: f32,
    /// Delay after impact before the cusp is released.
    pub(crate) delay: Duration,
}

/// Number of cusps the rim breaks into.
pub(crate) fn cusp_count(tuning: &CrownTuning, rim_radius: f32) -> u32 {
    match tuning.mode {
        CrownMode::Naive => tuning.naive_cusps.max(1),
        CrownMode::RayleighPlateau => {
            let circumference = TAU * rim_radius.max(0.0);
            let derived = (circumference / tuning.wavelength).round();
            let derived = if derived.is_finite() { derived as u32 } else { 0 };
            derived.clamp(tuning.min_cusps.max(1), tuning.max_cusps.max(1))
        }
    }
}

/// Computes the rim cusps for a crown of the given radius, ordered by release time.
pub(crate) fn crown_cusps<R: Rng + ?Sized>(
    tuning: &CrownTuning,
    rim_radius: f32,
    rng: &mut R,
) -> Vec<Cusp> {
    let count = cusp_count(tuning, rim_radius);
    let low = tuning.min_angle_degrees.to_radians();
    let high = tuning.max_angle_degrees.to_radians().max(low);
    let spacing = (high - low) / count as f32;
    let jitter = tuning.jitter_radians.abs();
    let normal = Normal::new(0.0_f32, jitter).ok();
    let window_ms = tuning.ejection_window_ms as f32;

    let mut cusps: Vec<Cusp> = (0..count)
        .map(|index| {
            let base = low + spacing * (index as f32 + 0.5);
            let (offset, delay) = match tuning.mode {
                CrownMode::Naive => {
                    let offset = if jitter > 0.0 {
                        rng.gen_range(-jitter..=jitter)
                    } else {
                        0.0
                    };
                    (offset, Duration::ZERO)
                }
                CrownMode::RayleighPlateau => {
                    let offset = normal.map_or(0.0, |normal| normal.sample(rng));
                    let delay = if tuning.progressive {
                        let stagger = window_ms * (index as f32 + rng.gen::<f32>()) / count as f32;
                        Duration::from_millis(stagger.round() as u64)
                    } else {
                        Duration::ZERO
                    };
                    (offset, delay)
                }
            };
            Cusp {
                angle: (base + offset).clamp(low, high),
                delay,
            }
        })
        .collect();
    cusps.sort_by_key(|cusp| cusp.delay);
    cusps
}

/// Spray droplet launch parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct SprayShot {
    /// Launch angle in radians measured from +x, strictly above the horizon.
    pub(crate) angle: f32,
    /// Multiplier applied to the nominal spray speed.
    pub(crate) speed_scale: f32,
}

/// Scatters spray above the horizon, pushed away from the impactor's lateral motion.
pub(crate) fn spray_shots<R: Rng + ?Sized>(
    tuning: &SprayTuning,
    count: u32,
    lateral_velocity: f32,
    rng: &mut R,
) -> Vec<SprayShot> {
    let margin = tuning.horizon_margin_degrees.to_radians();
    let low = margin;
    let high = (PI - margin).max(low);
    let bias = if lateral_velocity.abs() > LATERAL_EPSILON {
        -lateral_velocity.signum() * tuning.lateral_bias
    } else {
        0.0
    };
    let variance = tuning.speed_variance.abs();

    (0..count)
        .map(|_| {
            let raw = rng.gen_range(low..=high);
            let direction = Vec2::new(raw.cos() + bias, raw.sin());
            let angle = direction.y.atan2(direction.x).clamp(low, high);
            let speed_scale = if variance > 0.0 {
                1.0 + rng.gen_range(-variance..=variance)
            } else {
                1.0
            };
            SprayShot { angle, speed_scale }
        })
        .collect()
}

/// Launch speeds of the jet column; each parcel climbs higher than the previous one.
pub(crate) fn jet_speeds(tuning: &JetTuning, intensity: f32, gravity: f32) -> Vec<f32> {
    (0..tuning.parcels)
        .map(|index| {
            let height = (tuning.base_height + tuning.height_step * index as f32) * intensity;
            (2.0 * gravity * height.max(0.0)).sqrt()
        })
        .collect()
}

/// Unit launch direction for an angle measured from +x.
pub(crate) fn direction(angle: f32) -> Vec2 {
    Vec2::new(angle.cos(), angle.sin())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(7)
    }

    #[test]
    fn rayleigh_plateau_count_follows_circumference() {
        let tuning = CrownTuning::default();
        assert_eq!(cusp_count(&tuning, 0.5), 9);
        assert_eq!(cusp_count(&tuning, 0.01), tuning.min_cusps);
        assert_eq!(cusp_count(&tuning, 50.0), tuning.max_cusps);
    }

    #[test]
    fn naive_crown_uses_fixed_count_without_delay() {
        let tuning = CrownTuning {
            mode: CrownMode::Naive,
            ..CrownTuning::default()
        };
        let cusps = crown_cusps(&tuning, 2.0, &mut rng());
        assert_eq!(cusps.len(), 8);
        assert!(cusps.iter().all(|cusp| cusp.delay.is_zero()));
    }

    #[test]
    fn cusps_stay_inside_angle_range_and_window() {
        let tuning = CrownTuning::default();
        let low = tuning.min_angle_degrees.to_radians();
        let high = tuning.max_angle_degrees.to_radians();
        let window = Duration::from_millis(u64::from(tuning.ejection_window_ms));

        let cusps = crown_cusps(&tuning, 0.6, &mut rng());

        assert!(!cusps.is_empty());
        for cusp in &cusps {
            assert!(cusp.angle >= low && cusp.angle <= high);
            assert!(cusp.delay <= window);
        }
        assert!(cusps.windows(2).all(|pair| pair[0].delay <= pair[1].delay));
    }

    #[test]
    fn spray_is_pushed_against_lateral_motion() {
        let tuning = SprayTuning {
            lateral_bias: 1.0,
            ..SprayTuning::default()
        };
        let shots = spray_shots(&tuning, 64, -3.0, &mut rng());

        let mean_x: f32 =
            shots.iter().map(|shot| shot.angle.cos()).sum::<f32>() / shots.len() as f32;
        assert!(mean_x > 0.2, "spray not biased: {mean_x}");
        for shot in &shots {
            assert!(shot.angle > 0.0 && shot.angle < PI);
        }
    }

    #[test]
    fn jet_parcels_climb_progressively_higher() {
        let speeds = jet_speeds(&JetTuning::default(), 1.0, 9.81);
        assert_eq!(speeds.len(), 4);
        assert!(speeds.windows(2).all(|pair| pair[0] < pair[1]));
        assert!((speeds[0] - (2.0_f32 * 9.81 * 0.4).sqrt()).abs() < 1e-5);
    }
}
