use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::geometry::Region;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub detect: DetectConfig,
    #[serde(default)]
    pub overlay: OverlayConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_browser")]
    pub browser: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_full_page")]
    pub full_page: bool,
    /// Upper bound on the height of a full-page capture.
    #[serde(default = "default_full_page_height")]
    pub full_page_height: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

/// Which direction of luminance change counts as a difference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonMode {
    /// Flag pixels that got brighter in the newer capture.
    #[default]
    Increase,
    /// Flag pixels that got darker in the newer capture.
    Decrease,
    /// Flag any change.
    Absolute,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectConfig {
    #[serde(default)]
    pub mode: ComparisonMode,
    #[serde(default)]
    pub noise_threshold: u8,
    #[serde(default = "default_merge_distance")]
    pub merge_distance: u32,
    #[serde(default)]
    pub roi: Option<Region>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OverlayConfig {
    #[serde(default = "default_padding")]
    pub padding: u32,
    #[serde(default = "default_color")]
    pub color: [u8; 3],
    #[serde(default = "default_alpha")]
    pub alpha: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: f64,
    #[serde(default = "default_artifact_path")]
    pub artifact_path: String,
    /// Command run with the artifact path whenever it is rewritten.
    #[serde(default)]
    pub viewer: Option<String>,
    #[serde(default)]
    pub history_dir: Option<String>,
    /// Consecutive failed captures before giving up. 0 retries forever.
    #[serde(default)]
    pub max_consecutive_failures: u32,
}

impl MonitorConfig {
    /// Polling period. Fails for non-positive, non-finite or unrepresentable values.
    pub fn interval(&self) -> Result<Duration, ConfigError> {
        match Duration::try_from_secs_f64(self.interval_secs) {
            Ok(d) if !d.is_zero() => Ok(d),
            _ => Err(ConfigError::Invalid(format!(
                "monitor.interval_secs must be a positive number of seconds, got {}",
                self.interval_secs
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            browser: default_browser(),
            width: default_width(),
            height: default_height(),
            full_page: default_full_page(),
            full_page_height: default_full_page_height(),
            timeout_secs: default_timeout_secs(),
            extra_args: Vec::new(),
        }
    }
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            mode: ComparisonMode::default(),
            noise_threshold: 0,
            merge_distance: default_merge_distance(),
            roi: None,
        }
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            padding: default_padding(),
            color: default_color(),
            alpha: default_alpha(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            artifact_path: default_artifact_path(),
            viewer: None,
            history_dir: None,
            max_consecutive_failures: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        let config: Config = Self::parse(&content)?;
        config.validate()?;
        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "capture viewport must be non-empty, got {}x{}",
                self.capture.width, self.capture.height
            )));
        }
        if self.capture.full_page && self.capture.full_page_height < self.capture.height {
            return Err(ConfigError::Invalid(format!(
                "capture.full_page_height ({}) is smaller than capture.height ({})",
                self.capture.full_page_height, self.capture.height
            )));
        }
        if !(0.0..=1.0).contains(&self.overlay.alpha) {
            return Err(ConfigError::Invalid(format!(
                "overlay.alpha must be within 0.0..=1.0, got {}",
                self.overlay.alpha
            )));
        }
        if self.capture.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "capture.timeout_secs must be at least 1".into(),
            ));
        }
        self.monitor.interval()?;
        if let Some(roi) = &self.detect.roi {
            if roi.is_empty() {
                return Err(ConfigError::Invalid("detect.roi must be non-empty".into()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_browser() -> String {
    "chromium".into()
}
fn default_width() -> u32 {
    1920
}
fn default_height() -> u32 {
    1080
}
fn default_full_page() -> bool {
    true
}
fn default_full_page_height() -> u32 {
    8192
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_merge_distance() -> u32 {
    4
}
fn default_padding() -> u32 {
    5
}
fn default_color() -> [u8; 3] {
    [0, 255, 0]
}
fn default_alpha() -> f32 {
    0.2
}
fn default_interval_secs() -> f64 {
    5.0
}
fn default_artifact_path() -> String {
    "differences.png".into()
}
fn default_log_level() -> String {
    "info".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.capture.browser, "chromium");
        assert_eq!(config.capture.width, 1920);
        assert_eq!(config.detect.mode, ComparisonMode::Increase);
        assert_eq!(config.overlay.padding, 5);
        assert_eq!(config.overlay.color, [0, 255, 0]);
        assert_eq!(config.monitor.artifact_path, "differences.png");
        assert!(config.detect.roi.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn sections_override_defaults() {
        let config = Config::parse(
            r#"
            [capture]
            browser = "google-chrome"
            full_page = false

            [detect]
            mode = "absolute"
            noise_threshold = 12
            roi = { x = 1500, y = 100, width = 300, height = 600 }

            [monitor]
            interval_secs = 30.0
            viewer = "xdg-open"
            "#,
        )
        .unwrap();
        assert_eq!(config.capture.browser, "google-chrome");
        assert!(!config.capture.full_page);
        assert_eq!(config.detect.mode, ComparisonMode::Absolute);
        assert_eq!(config.detect.noise_threshold, 12);
        assert_eq!(config.detect.roi, Some(Region::new(1500, 100, 300, 600)));
        assert_eq!(config.monitor.interval_secs, 30.0);
        assert_eq!(config.monitor.viewer.as_deref(), Some("xdg-open"));
    }

    #[test]
    fn unknown_mode_is_a_parse_error() {
        let result = Config::parse("[detect]\nmode = \"sideways\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn validate_rejects_out_of_range_alpha() {
        let mut config = Config::default();
        config.overlay.alpha = 1.5;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn validate_rejects_zero_interval() {
        let mut config = Config::default();
        config.monitor.interval_secs = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn validate_rejects_oversized_interval() {
        let mut config = Config::default();
        for secs in [1e20, f64::INFINITY, f64::NAN, -1.0] {
            config.monitor.interval_secs = secs;
            assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))), "{secs}");
        }
        config.monitor.interval_secs = 0.25;
        assert_eq!(config.monitor.interval().unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn validate_rejects_zero_capture_timeout() {
        let mut config = Config::default();
        config.capture.timeout_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
