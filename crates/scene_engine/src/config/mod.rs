//! Configuration system
//!
//! Engine settings are plain serde structs. The [`Config`] trait adds file
//! loading and saving, picking TOML or RON from the file extension.

pub use serde::{Serialize, Deserialize};

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_str_with_format(&contents, path)
    }

    /// Parse configuration text, using `path` only to pick the format
    fn from_str_with_format(contents: &str, path: &str) -> Result<Self, ConfigError> {
        if path.ends_with(".toml") {
            toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A value is out of its accepted range
    #[error("Invalid value for {field}: {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// Why the value was rejected
        reason: String,
    },
}

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default log filter passed to `env_logger` (overridden by `RUST_LOG`)
    pub log_level: String,
    /// Frame driver settings
    pub renderer: RendererConfig,
    /// First-person camera settings
    pub camera: CameraConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            renderer: RendererConfig::default(),
            camera: CameraConfig::default(),
        }
    }
}

impl Config for EngineConfig {}

impl EngineConfig {
    /// Validate every section
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.renderer.validate()?;
        self.camera.validate()
    }
}

/// Frame driver settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Number of frame slots rotating between CPU and GPU
    pub frames_in_flight: usize,
    /// Fence wait timeout in nanoseconds; unset waits until done
    pub fence_timeout_ns: Option<u64>,
    /// Colour the first pass clears the image to
    pub clear_color: [f32; 4],
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            fence_timeout_ns: None,
            clear_color: [0.05, 0.05, 0.08, 1.0],
        }
    }
}

impl RendererConfig {
    /// Largest supported number of frames in flight
    pub const MAX_FRAMES_IN_FLIGHT: usize = 3;

    /// Fence timeout handed to the backend
    pub fn fence_timeout(&self) -> u64 {
        self.fence_timeout_ns.unwrap_or(u64::MAX)
    }

    /// Set frames in flight
    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frames_in_flight == 0 || self.frames_in_flight > Self::MAX_FRAMES_IN_FLIGHT {
            return Err(ConfigError::Invalid {
                field: "renderer.frames_in_flight",
                reason: format!(
                    "{} is outside 1..={}",
                    self.frames_in_flight,
                    Self::MAX_FRAMES_IN_FLIGHT
                ),
            });
        }
        Ok(())
    }
}

/// First-person camera settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Vertical field of view in degrees
    pub fov_degrees: f32,
    /// Near clip distance
    pub near: f32,
    /// Far clip distance
    pub far: f32,
    /// Movement speed in units per second
    pub move_speed: f32,
    /// Radians of rotation per pixel of mouse travel
    pub mouse_sensitivity: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_degrees: 45.0,
            near: 0.1,
            far: 1000.0,
            move_speed: 5.0,
            mouse_sensitivity: 0.003,
        }
    }
}

impl CameraConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1.0..179.0).contains(&self.fov_degrees) {
            return Err(ConfigError::Invalid {
                field: "camera.fov_degrees",
                reason: format!("{} is outside [1, 179)", self.fov_degrees),
            });
        }
        if self.near <= 0.0 || self.far <= self.near {
            return Err(ConfigError::Invalid {
                field: "camera.near",
                reason: format!("clip range {}..{} is empty", self.near, self.far),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_frames_in_flight_range() {
        let renderer = RendererConfig::default().with_frames_in_flight(0);
        assert!(renderer.validate().is_err());

        let renderer = RendererConfig::default().with_frames_in_flight(4);
        assert!(renderer.validate().is_err());

        let renderer = RendererConfig::default().with_frames_in_flight(3);
        assert!(renderer.validate().is_ok());
    }

    #[test]
    fn test_toml_partial_config_uses_defaults() {
        let text = "log_level = \"debug\"\n[renderer]\nframes_in_flight = 3\n";
        let config = EngineConfig::from_str_with_format(text, "engine.toml").unwrap();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.renderer.frames_in_flight, 3);
        assert_eq!(config.renderer.fence_timeout(), u64::MAX);
        assert!((config.camera.fov_degrees - 45.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_ron_config_parses() {
        let text = "(log_level: \"warn\", renderer: (frames_in_flight: 2))";
        let config = EngineConfig::from_str_with_format(text, "engine.ron").unwrap();

        assert_eq!(config.log_level, "warn");
        assert_eq!(config.renderer.frames_in_flight, 2);
    }

    #[test]
    fn test_save_load_round_trip() {
        let mut config = EngineConfig::default();
        config.renderer.frames_in_flight = 3;
        config.renderer.fence_timeout_ns = Some(1_000_000);
        config.camera.move_speed = 12.5;

        for ext in ["toml", "ron"] {
            let path = std::env::temp_dir().join(format!("scene_engine_round_trip_{}.{ext}", std::process::id()));
            let path = path.to_string_lossy().into_owned();
            config.save_to_file(&path).unwrap();
            let loaded = EngineConfig::load_from_file(&path).unwrap();
            std::fs::remove_file(&path).unwrap();

            assert_eq!(loaded.renderer.frames_in_flight, 3);
            assert_eq!(loaded.renderer.fence_timeout(), 1_000_000);
            assert!((loaded.camera.move_speed - 12.5).abs() < f32::EPSILON);
        }
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let result = EngineConfig::from_str_with_format("", "engine.json");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }
}
