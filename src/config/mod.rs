//! Configuration management for `weave.toml`.
//!
//! # Sections
//!
//! | Section      | Purpose                                    |
//! |--------------|--------------------------------------------|
//! | `[assembly]` | Error marker styling, strict exit behavior |
//!
//! # Example
//!
//! ```toml
//! [assembly]
//! marker_color = "CC0000"
//! marker_prefix = "!! "
//! strict = true
//! ```

mod error;

pub use error::ConfigError;

use crate::cli::{Cli, Commands};
use crate::transform::MarkerStyle;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs, path::Path};

/// Root configuration loaded from `weave.toml`. Every field has a default,
/// so a missing file means default behavior.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WeaveConfig {
    #[serde(default)]
    pub assembly: AssemblyConfig,
}

/// `[assembly]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssemblyConfig {
    /// `Color` attribute for inline error marker runs (RRGGBB).
    #[serde(default = "defaults::marker_color")]
    pub marker_color: String,

    /// Text prepended to every error marker message.
    #[serde(default = "defaults::marker_prefix")]
    pub marker_prefix: String,

    /// Exit non-zero when the assembled document contains any error marker.
    #[serde(default)]
    pub strict: bool,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        AssemblyConfig {
            marker_color: defaults::marker_color(),
            marker_prefix: defaults::marker_prefix(),
            strict: false,
        }
    }
}

mod defaults {
    pub fn marker_color() -> String {
        "FF0000".to_string()
    }
    pub fn marker_prefix() -> String {
        "Error: ".to_string()
    }
}

impl WeaveConfig {
    /// Load and parse a config file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))
            .context("failed to read config file")?;
        let config: WeaveConfig = toml::from_str(&raw)
            .map_err(ConfigError::Toml)
            .context("failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Apply CLI overrides on top of the file configuration.
    pub fn update_with_cli(&mut self, cli: &Cli) {
        if let Commands::Assemble { assemble_args } = &cli.command
            && let Some(strict) = assemble_args.strict
        {
            self.assembly.strict = strict;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let color = &self.assembly.marker_color;
        if color.len() != 6 || !color.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ConfigError::InvalidMarkerColor {
                value: color.clone(),
            }
            .into());
        }
        Ok(())
    }

    /// Marker styling for the transform, from the `[assembly]` section.
    pub fn marker_style(&self) -> MarkerStyle {
        MarkerStyle {
            color: self.assembly.marker_color.clone(),
            prefix: self.assembly.marker_prefix.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_sections_are_missing() {
        let config: WeaveConfig = toml::from_str("").unwrap();
        assert_eq!(config.assembly.marker_color, "FF0000");
        assert_eq!(config.assembly.marker_prefix, "Error: ");
        assert!(!config.assembly.strict);
    }

    #[test]
    fn assembly_section_overrides_defaults() {
        let config: WeaveConfig = toml::from_str(
            "[assembly]\nmarker_color = \"00AA00\"\nstrict = true\n",
        )
        .unwrap();
        assert_eq!(config.assembly.marker_color, "00AA00");
        assert!(config.assembly.strict);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(toml::from_str::<WeaveConfig>("[assembly]\ntypo = 1\n").is_err());
    }

    #[test]
    fn from_path_reads_and_validates_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weave.toml");
        fs::write(&path, "[assembly]\nmarker_prefix = \"!! \"\n").unwrap();
        let config = WeaveConfig::from_path(&path).unwrap();
        assert_eq!(config.assembly.marker_prefix, "!! ");

        fs::write(&path, "[assembly]\nmarker_color = \"red\"\n").unwrap();
        assert!(WeaveConfig::from_path(&path).is_err());
    }

    #[test]
    fn validate_rejects_bad_marker_color() {
        let mut config = WeaveConfig::default();
        config.assembly.marker_color = "red".to_string();
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::InvalidMarkerColor { value }) if value == "red"
        ));
    }
}
