//! Render configuration loaded once at startup.
//!
//! Unsupported values never fail loading: they fall back to the nearest
//! supported value and log a warning.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Errors from loading render settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Render quality. Selects the shadow map resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "QualityRepr", rename_all = "lowercase")]
pub enum RenderQuality {
    Low,
    Medium,
    High,
    Ultra,
}

impl Default for RenderQuality {
    fn default() -> Self {
        Self::High
    }
}

impl RenderQuality {
    pub const ALL: [RenderQuality; 4] = [Self::Low, Self::Medium, Self::High, Self::Ultra];

    /// Edge length of the square shadow depth map, in pixels.
    pub fn shadow_map_size(self) -> u32 {
        match self {
            Self::Low => 512,
            Self::Medium => 1024,
            Self::High => 2048,
            Self::Ultra => 4096,
        }
    }

    /// Quality whose shadow map size is closest to `size`.
    pub fn from_shadow_map_size(size: u32) -> Self {
        Self::ALL
            .into_iter()
            .min_by_key(|q| q.shadow_map_size().abs_diff(size))
            .unwrap_or_default()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QualityRepr {
    Size(u32),
    Name(String),
}

impl From<QualityRepr> for RenderQuality {
    fn from(repr: QualityRepr) -> Self {
        match repr {
            QualityRepr::Size(size) => {
                let quality = Self::from_shadow_map_size(size);
                if quality.shadow_map_size() != size {
                    tracing::warn!(
                        requested = size,
                        used = quality.shadow_map_size(),
                        "unsupported shadow map size, using nearest quality"
                    );
                }
                quality
            }
            QualityRepr::Name(name) => match name.to_ascii_lowercase().as_str() {
                "low" => Self::Low,
                "medium" => Self::Medium,
                "high" => Self::High,
                "ultra" => Self::Ultra,
                other => {
                    tracing::warn!(requested = other, "unknown render quality, using default");
                    Self::default()
                }
            },
        }
    }
}

/// Post-process antialiasing applied by the final composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", rename_all = "lowercase")]
pub enum Antialiasing {
    #[default]
    None,
    Fxaa,
}

impl From<String> for Antialiasing {
    fn from(name: String) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "none" | "off" => Self::None,
            "fxaa" => Self::Fxaa,
            other => {
                // Any other antialiasing request maps onto the one post filter we have.
                tracing::warn!(requested = other, "unsupported antialiasing mode, using fxaa");
                Self::Fxaa
            }
        }
    }
}

/// Top-level render configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub quality: RenderQuality,
    pub antialiasing: Antialiasing,
    /// Geometry/lighting buffers are this many times larger than the display.
    pub supersampling: u32,
    pub gamma: f32,
    /// Stream opaque draws to the GPU while scene traversal is still running.
    pub overlap_traversal: bool,
    pub debug_draw: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            quality: RenderQuality::default(),
            antialiasing: Antialiasing::None,
            supersampling: 1,
            gamma: 2.2,
            overlap_traversal: false,
            debug_draw: false,
        }
    }
}

impl RenderSettings {
    pub const MAX_SUPERSAMPLING: u32 = 4;
    pub const DEFAULT_GAMMA: f32 = 2.2;

    /// Parse settings from YAML and sanitize them.
    pub fn from_yaml_str(text: &str) -> Result<Self, SettingsError> {
        let settings: RenderSettings = serde_yaml::from_str(text)?;
        Ok(settings.sanitized())
    }

    /// Load settings from a YAML file and sanitize them.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&text)
    }

    pub fn to_yaml_string(&self) -> Result<String, SettingsError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Clamp every field into its supported range.
    pub fn sanitized(mut self) -> Self {
        let clamped = self.supersampling.clamp(1, Self::MAX_SUPERSAMPLING);
        if clamped != self.supersampling {
            tracing::warn!(
                requested = self.supersampling,
                used = clamped,
                "unsupported supersampling factor"
            );
            self.supersampling = clamped;
        }
        if !self.gamma.is_finite() || self.gamma <= 0.0 {
            tracing::warn!(requested = self.gamma, "invalid gamma, using default");
            self.gamma = Self::DEFAULT_GAMMA;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn quality_maps_to_shadow_sizes() {
        assert_eq!(RenderQuality::Low.shadow_map_size(), 512);
        assert_eq!(RenderQuality::Medium.shadow_map_size(), 1024);
        assert_eq!(RenderQuality::High.shadow_map_size(), 2048);
        assert_eq!(RenderQuality::Ultra.shadow_map_size(), 4096);
    }

    #[test]
    fn nearest_quality_for_odd_sizes() {
        assert_eq!(RenderQuality::from_shadow_map_size(100), RenderQuality::Low);
        assert_eq!(RenderQuality::from_shadow_map_size(1500), RenderQuality::Medium);
        assert_eq!(RenderQuality::from_shadow_map_size(3000), RenderQuality::High);
        assert_eq!(RenderQuality::from_shadow_map_size(100_000), RenderQuality::Ultra);
    }

    #[test]
    fn yaml_accepts_names_and_sizes() {
        let s = RenderSettings::from_yaml_str("quality: ultra\nantialiasing: fxaa\n").unwrap();
        assert_eq!(s.quality, RenderQuality::Ultra);
        assert_eq!(s.antialiasing, Antialiasing::Fxaa);

        let s = RenderSettings::from_yaml_str("quality: 1000\n").unwrap();
        assert_eq!(s.quality, RenderQuality::Medium);
    }

    #[test]
    fn unsupported_values_fall_back() {
        let s = RenderSettings::from_yaml_str(
            "quality: cinematic\nantialiasing: msaa8x\nsupersampling: 9\ngamma: -1.0\n",
        )
        .unwrap();
        assert_eq!(s.quality, RenderQuality::High);
        assert_eq!(s.antialiasing, Antialiasing::Fxaa);
        assert_eq!(s.supersampling, RenderSettings::MAX_SUPERSAMPLING);
        assert_eq!(s.gamma, RenderSettings::DEFAULT_GAMMA);
    }

    #[test]
    fn zero_supersampling_becomes_one() {
        let s = RenderSettings {
            supersampling: 0,
            ..RenderSettings::default()
        }
        .sanitized();
        assert_eq!(s.supersampling, 1);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "quality: low\noverlap_traversal: true").unwrap();
        let s = RenderSettings::load(file.path()).unwrap();
        assert_eq!(s.quality, RenderQuality::Low);
        assert!(s.overlap_traversal);
        assert_eq!(s.gamma, 2.2);
    }

    #[test]
    fn yaml_round_trip_keeps_names() {
        let yaml = RenderSettings::default().to_yaml_string().unwrap();
        assert!(yaml.contains("quality: high"));
        assert_eq!(RenderSettings::from_yaml_str(&yaml).unwrap(), RenderSettings::default());
    }
}
