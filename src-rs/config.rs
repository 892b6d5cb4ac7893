use std::env;

use crate::color;
use crate::geometry::MappingMode;

pub const DEFAULT_COLOR: &str = "#FF0000";
pub const DEFAULT_STROKE_WIDTH: f64 = 2.0;
pub const DEFAULT_FONT_PX: u32 = 16;

const ENV_STROKE_WIDTH: &str = "CASE_ANNOTATE_STROKE_WIDTH";
const ENV_FONT_PX: &str = "CASE_ANNOTATE_FONT_PX";
const ENV_COLOR: &str = "CASE_ANNOTATE_COLOR";
const ENV_MAPPING: &str = "CASE_ANNOTATE_MAPPING";

/// Fixed rendering parameters and interaction defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub stroke_width: f64,
    pub font_px: u32,
    pub default_color: String,
    pub mapping: MappingMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stroke_width: DEFAULT_STROKE_WIDTH,
            font_px: DEFAULT_FONT_PX,
            default_color: DEFAULT_COLOR.to_string(),
            mapping: MappingMode::Intrinsic,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `CASE_ANNOTATE_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let read = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(raw) = read(ENV_STROKE_WIDTH) {
            match raw.trim().parse::<f64>() {
                Ok(v) if v.is_finite() && v > 0.0 => config.stroke_width = v,
                _ => tracing::warn!(key = ENV_STROKE_WIDTH, value = %raw, "ignoring invalid stroke width"),
            }
        }
        if let Some(raw) = read(ENV_FONT_PX) {
            match raw.trim().parse::<u32>() {
                Ok(v) if v >= 8 => config.font_px = v,
                _ => tracing::warn!(key = ENV_FONT_PX, value = %raw, "ignoring invalid font size"),
            }
        }
        if let Some(raw) = read(ENV_COLOR) {
            match color::normalize(&raw) {
                Ok(v) => config.default_color = v,
                Err(err) => tracing::warn!(key = ENV_COLOR, error = %err, "ignoring invalid color"),
            }
        }
        if let Some(raw) = read(ENV_MAPPING) {
            match raw.parse::<MappingMode>() {
                Ok(v) => config.mapping = v,
                Err(err) => tracing::warn!(key = ENV_MAPPING, error = %err, "ignoring invalid mapping mode"),
            }
        }
        config
    }

    /// Integer upscale applied to the 8x8 bitmap font.
    pub fn glyph_scale(&self) -> u32 {
        (f64::from(self.font_px) / 8.0).round().max(1.0) as u32
    }
}
