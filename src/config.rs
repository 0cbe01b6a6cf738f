use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub display: DisplayConfig,
    pub camera: CameraConfig,
    pub service: ServiceConfig,
    pub paths: PathConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    /// JPEG quality for captured frames (0-100)
    pub capture_quality: u8,
    /// Fallback capture size when the sensor's native size is unavailable
    pub fallback_width: u32,
    pub fallback_height: u32,
    /// Preview refresh interval in milliseconds
    pub preview_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Classification endpoint URL
    pub endpoint: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    pub capture_dir: PathBuf,
    pub config_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            display: DisplayConfig {
                width: 800,
                height: 480,
                fullscreen: true,
            },
            camera: CameraConfig {
                capture_quality: 92,
                fallback_width: 1280,
                fallback_height: 720,
                preview_interval_ms: 33,
            },
            service: ServiceConfig {
                endpoint: "http://localhost:8000/analyze".to_string(),
                timeout_secs: 30,
            },
            paths: PathConfig {
                capture_dir: std::env::temp_dir().join("ripecheck_captures"),
                config_file: PathBuf::from("ripecheck_config.toml"),
            },
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = PathBuf::from("ripecheck_config.toml");

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            log::info!("Config file not found, creating default configuration");
            let default_config = Self::default();
            default_config.save()?;
            Ok(default_config)
        }
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = toml::from_str(&contents)
            .with_context(|| "Failed to parse configuration file")?;

        log::info!("Configuration loaded from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to_file(&self.paths.config_file)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize configuration")?;

        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
            }
        }

        std::fs::write(path.as_ref(), contents)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        log::info!("Configuration saved to {}", path.as_ref().display());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        // Validate display settings
        if self.display.width == 0 || self.display.height == 0 {
            return Err(anyhow::anyhow!("Invalid display dimensions"));
        }

        // Validate camera settings
        if self.camera.capture_quality == 0 || self.camera.capture_quality > 100 {
            return Err(anyhow::anyhow!(
                "Invalid capture quality: {} (expected 1-100)",
                self.camera.capture_quality
            ));
        }

        if self.camera.fallback_width == 0 || self.camera.fallback_height == 0 {
            return Err(anyhow::anyhow!("Invalid fallback capture dimensions"));
        }

        // Validate service settings
        if self.service.endpoint.trim().is_empty() {
            return Err(anyhow::anyhow!("Service endpoint must not be empty"));
        }

        if self.service.timeout_secs == 0 {
            return Err(anyhow::anyhow!("Service timeout must be at least 1 second"));
        }

        Ok(())
    }

    pub fn create_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.paths.capture_dir)
            .with_context(|| format!("Failed to create capture directory: {}",
                self.paths.capture_dir.display()))?;

        log::info!("Created necessary directories");
        Ok(())
    }
}

// Environment-specific configuration presets
impl Config {
    pub fn raspberry_pi_7inch() -> Self {
        Config {
            display: DisplayConfig {
                width: 800,
                height: 480,
                fullscreen: true,
            },
            ..Default::default()
        }
    }

    pub fn development_desktop() -> Self {
        Config {
            display: DisplayConfig {
                width: 1024,
                height: 768,
                fullscreen: false,
            },
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.camera.capture_quality, 92);
        assert_eq!(config.camera.fallback_width, 1280);
        assert_eq!(config.camera.fallback_height, 720);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        // Test invalid quality
        config.camera.capture_quality = 0;
        assert!(config.validate().is_err());

        // Test empty endpoint
        config.camera.capture_quality = 92;
        config.service.endpoint = "   ".to_string();
        assert!(config.validate().is_err());

        // Test zero timeout
        config.service.endpoint = "http://localhost:8000/analyze".to_string();
        config.service.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test_config.toml");

        let original_config = Config::raspberry_pi_7inch();
        original_config.save_to_file(&config_path).unwrap();

        let loaded_config = Config::load_from_file(&config_path).unwrap();

        assert_eq!(original_config.display.width, loaded_config.display.width);
        assert_eq!(original_config.service.endpoint, loaded_config.service.endpoint);
        assert_eq!(original_config.camera.capture_quality, loaded_config.camera.capture_quality);
    }

    #[test]
    fn test_preset_configs() {
        assert!(Config::raspberry_pi_7inch().validate().is_ok());
        assert!(Config::development_desktop().validate().is_ok());
    }
}
