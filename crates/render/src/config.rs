//! Renderer configuration, loadable from YAML. Every field has a default, so
//! a partial file only overrides what it names.

use std::path::{Path, PathBuf};

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::bloom::BloomSettings;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SsaoSettings {
    pub enabled: bool,
    /// Sample hemisphere radius in world units.
    pub radius: f32,
    pub bias: f32,
    pub intensity: f32,
}

impl Default for SsaoSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            radius: 0.5,
            bias: 0.025,
            intensity: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowSettings {
    /// Cull each cascade's indirect slot. When off, cascade slots keep
    /// `instance_count == 1`.
    pub cull_cascades: bool,
    /// Constant depth bias applied in the shadow lookup.
    pub depth_bias: f32,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            cull_cascades: true,
            depth_bias: 0.0015,
        }
    }
}

/// Sky gradient and the directional light.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Environment {
    pub sky_zenith: Vec3,
    pub sky_horizon: Vec3,
    /// Direction the sunlight travels, from the sun toward the scene.
    pub sun_direction: Vec3,
    pub sun_color: Vec3,
    pub sun_intensity: f32,
    pub ambient_intensity: f32,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            sky_zenith: Vec3::new(0.18, 0.36, 0.72),
            sky_horizon: Vec3::new(0.75, 0.82, 0.9),
            sun_direction: Vec3::new(-0.35, -1.0, -0.45),
            sun_color: Vec3::new(1.0, 0.95, 0.85),
            sun_intensity: 3.0,
            ambient_intensity: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub ssao: SsaoSettings,
    pub shadows: ShadowSettings,
    pub bloom: BloomSettings,
    pub environment: Environment,
    pub exposure: f32,
    pub vsync: bool,
    /// Directory of `<key>.wgsl` files overriding built-in shaders.
    pub shader_dir: Option<PathBuf>,
    /// Directory holding `diffuse.ktx2`, `specular.ktx2` and `lut.png` for
    /// image-based ambient light.
    pub environment_dir: Option<PathBuf>,
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            ssao: SsaoSettings::default(),
            shadows: ShadowSettings::default(),
            bloom: BloomSettings::default(),
            environment: Environment::default(),
            exposure: 1.0,
            vsync: true,
            shader_dir: None,
            environment_dir: None,
            fov_degrees: 60.0,
            near: 0.1,
            far: 200.0,
        }
    }
}

impl RendererConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_yaml_str(&text)?;
        tracing::info!(path = %path.display(), "renderer config loaded");
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = RendererConfig::from_yaml_str(
            "ssao:\n  enabled: false\nexposure: 1.5\nbloom:\n  intensity: 0.1\n",
        )
        .unwrap();
        assert!(!config.ssao.enabled);
        assert_eq!(config.ssao.radius, SsaoSettings::default().radius);
        assert_eq!(config.exposure, 1.5);
        assert_eq!(config.bloom.intensity, 0.1);
        assert_eq!(config.bloom.threshold, BloomSettings::default().threshold);
        assert!(config.shadows.cull_cascades);
        assert_eq!(config.environment_dir, None);
    }

    #[test]
    fn environment_dir_is_read_from_yaml() {
        let config = RendererConfig::from_yaml_str("environment_dir: assets/ibl
").unwrap();
        assert_eq!(config.environment_dir, Some(PathBuf::from("assets/ibl")));
    }

    #[test]
    fn yaml_round_trip_through_file() {
        let mut config = RendererConfig::default();
        config.vsync = false;
        config.shader_dir = Some(PathBuf::from("shaders"));
        config.environment_dir = Some(PathBuf::from("env/studio"));
        config.environment.sun_direction = Vec3::new(0.0, -1.0, 0.0);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.to_yaml().unwrap().as_bytes()).unwrap();
        assert_eq!(RendererConfig::load(file.path()).unwrap(), config);
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        assert!(matches!(
            RendererConfig::from_yaml_str("exposure: [1, 2"),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            RendererConfig::load(dir.path().join("none.yaml")),
            Err(ConfigError::Io(_))
        ));
    }
}
