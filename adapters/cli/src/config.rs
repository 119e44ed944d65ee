//! Loading of the optional TOML configuration file.

use std::{fs, path::Path};

use anyhow::{bail, Context, Result};
use liquid_sandbox_core::LiquidTuning;
use liquid_sandbox_rendering::WaterPalette;
use serde::Deserialize;

/// Contents of a sandbox configuration file.
///
/// Every section is optional; missing knobs keep their defaults.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct SandboxConfig {
    /// Tuning of every liquid subsystem, under `[tuning.*]`.
    pub(crate) tuning: LiquidTuning,
    /// Presentation settings, under `[render]`.
    pub(crate) render: RenderConfig,
}

/// Presentation settings for exported frames.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct RenderConfig {
    pub(crate) pixels_per_cell: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            pixels_per_cell: WaterPalette::default().pixels_per_cell,
        }
    }
}

impl RenderConfig {
    pub(crate) fn palette(&self) -> WaterPalette {
        WaterPalette {
            pixels_per_cell: self.pixels_per_cell,
            ..WaterPalette::default()
        }
    }
}

/// Reads and validates a configuration file.
pub(crate) fn load(path: &Path) -> Result<SandboxConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    parse(&contents).with_context(|| format!("invalid config file {}", path.display()))
}

/// Parses and validates configuration text.
pub(crate) fn parse(contents: &str) -> Result<SandboxConfig> {
    let config: SandboxConfig =
        toml::from_str(contents).context("failed to parse sandbox configuration")?;
    if let Err(error) = config.tuning.validate() {
        bail!("tuning rejected: {error}");
    }
    if config.render.pixels_per_cell == 0 {
        bail!("render.pixels_per_cell must be greater than zero");
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = parse("").expect("empty config parses");
        assert_eq!(config, SandboxConfig::default());
    }

    #[test]
    fn partial_sections_override_only_named_knobs() {
        let config = parse(
            r#"
            [tuning.splash]
            seed = 99

            [tuning.absorption]
            check_interval_ms = 50

            [render]
            pixels_per_cell = 2
            "#,
        )
        .expect("partial config parses");

        assert_eq!(config.tuning.splash.seed, 99);
        assert_eq!(config.tuning.absorption.check_interval_ms, 50);
        assert_eq!(
            config.tuning.flow,
            liquid_sandbox_core::FlowTuning::default()
        );
        assert_eq!(config.render.palette().pixels_per_cell, 2);
    }

    #[test]
    fn invalid_tuning_is_rejected() {
        let error = parse(
            r#"
            [tuning.solids]
            refresh_interval_ms = 0
            "#,
        )
        .expect_err("zero interval must be rejected");
        assert!(format!("{error:#}").contains("solids.refresh_interval_ms"));
    }

    #[test]
    fn unknown_sections_are_rejected() {
        assert!(parse("[physics]\ngravity = 3.0\n").is_err());
    }

    #[test]
    fn missing_files_report_their_path() {
        let error = load(Path::new("/nonexistent/sandbox.toml")).expect_err("missing file");
        assert!(format!("{error:#}").contains("/nonexistent/sandbox.toml"));
    }
}
