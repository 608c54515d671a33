//! Errors raised while loading `weave.toml`.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("config file is not valid TOML")]
    Toml(#[from] toml::de::Error),

    /// Marker runs carry the color as an `RRGGBB` attribute value, so
    /// anything but six hex digits would end up verbatim in the output.
    #[error("marker_color must be six hex digits (RRGGBB), got `{value}`")]
    InvalidMarkerColor { value: String },
}
