use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::EdgecamError;
use crate::types::{LensFacing, Resolution};

/// Environment variable naming an optional JSON config file.
pub const CONFIG_PATH_ENV: &str = "EDGECAM_CONFIG";

// MARK: - RenderMode

/// How the render driver schedules presenter ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    /// Tick at the display refresh rate whether or not a frame is ready.
    #[default]
    Continuous,
    /// Tick only after the ingest side signals a freshly published frame.
    #[serde(alias = "on-demand", alias = "onDemand")]
    OnDemand,
}

impl FromStr for RenderMode {
    type Err = EdgecamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continuous" => Ok(Self::Continuous),
            "on_demand" | "on-demand" | "ondemand" => Ok(Self::OnDemand),
            other => Err(invalid(format!("unknown render mode '{other}'"))),
        }
    }
}

// MARK: - CountPolicy

/// What the rate monitor counts as a presented frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountPolicy {
    /// Every draw tick, so the reported rate is the display rate.
    #[default]
    Ticks,
    /// Only ticks that uploaded a new frame, so the reported rate is the
    /// new-content rate.
    Uploads,
}

impl FromStr for CountPolicy {
    type Err = EdgecamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ticks" => Ok(Self::Ticks),
            "uploads" => Ok(Self::Uploads),
            other => Err(invalid(format!("unknown count policy '{other}'"))),
        }
    }
}

// MARK: - ProcessorKind

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorKind {
    /// Sobel edge magnitude.
    #[default]
    Edges,
    /// Plain luma as grey.
    Luma,
}

impl FromStr for ProcessorKind {
    type Err = EdgecamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "edges" | "sobel" => Ok(Self::Edges),
            "luma" | "gray" | "grey" => Ok(Self::Luma),
            other => Err(invalid(format!("unknown processor '{other}'"))),
        }
    }
}

// MARK: - EdgecamConfig

/// Runtime configuration shared by both binaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgecamConfig {
    /// Capture resolution requested from the device.
    pub resolution: Resolution,
    #[serde(alias = "lensFacing")]
    pub lens_facing: LensFacing,
    #[serde(alias = "renderMode")]
    pub render_mode: RenderMode,
    #[serde(alias = "countPolicy")]
    pub count_policy: CountPolicy,
    pub processor: ProcessorKind,
    /// Refresh rate used by the continuous render driver.
    #[serde(alias = "refreshHz")]
    pub refresh_hz: u32,
    /// Flip the image vertically when drawing (sensor rows bottom-up).
    #[serde(alias = "flipVertical")]
    pub flip_vertical: bool,
}

impl Default for EdgecamConfig {
    fn default() -> Self {
        Self {
            resolution: Resolution::HD,
            lens_facing: LensFacing::Back,
            render_mode: RenderMode::Continuous,
            count_policy: CountPolicy::Ticks,
            processor: ProcessorKind::Edges,
            refresh_hz: 60,
            flip_vertical: false,
        }
    }
}

impl EdgecamConfig {
    /// Load the config file named by `EDGECAM_CONFIG` (if any), then apply
    /// `EDGECAM_*` environment overrides and validate.
    pub fn load() -> Result<Self, EdgecamError> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => {
                info!("Loading config from {}", path);
                Self::from_json(&std::fs::read_to_string(&path)?)?
            }
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self, EdgecamError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Apply `EDGECAM_*` overrides through `lookup` (the process environment
    /// in production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), EdgecamError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("EDGECAM_WIDTH") {
            self.resolution.width = parse_number("EDGECAM_WIDTH", &v)?;
        }
        if let Some(v) = lookup("EDGECAM_HEIGHT") {
            self.resolution.height = parse_number("EDGECAM_HEIGHT", &v)?;
        }
        if let Some(v) = lookup("EDGECAM_REFRESH_HZ") {
            self.refresh_hz = parse_number("EDGECAM_REFRESH_HZ", &v)?;
        }
        if let Some(v) = lookup("EDGECAM_RENDER_MODE") {
            self.render_mode = v.parse()?;
        }
        if let Some(v) = lookup("EDGECAM_COUNT_POLICY") {
            self.count_policy = v.parse()?;
        }
        if let Some(v) = lookup("EDGECAM_PROCESSOR") {
            self.processor = v.parse()?;
        }
        debug!("Effective config: {:?}", self);
        Ok(())
    }

    pub fn validate(&self) -> Result<(), EdgecamError> {
        if self.resolution.is_empty() {
            return Err(invalid(format!("resolution {} is empty", self.resolution)));
        }
        if self.resolution.width > 8192 || self.resolution.height > 8192 {
            return Err(invalid(format!("resolution {} exceeds 8192", self.resolution)));
        }
        if self.refresh_hz == 0 || self.refresh_hz > 480 {
            return Err(invalid(format!("refresh rate {} Hz out of range", self.refresh_hz)));
        }
        Ok(())
    }

    /// Interval between ticks of the continuous render driver.
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.refresh_hz.max(1) as u64)
    }
}

fn parse_number(key: &str, value: &str) -> Result<u32, EdgecamError> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(format!("{key}='{value}' is not a number")))
}

fn invalid(reason: String) -> EdgecamError {
    EdgecamError::ConfigurationInvalid { reason }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_capture() {
        let cfg = EdgecamConfig::default();
        assert_eq!(cfg.resolution, Resolution::HD);
        assert_eq!(cfg.lens_facing, LensFacing::Back);
        assert_eq!(cfg.count_policy, CountPolicy::Ticks);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn deserializes_camel_case_fields() {
        let json = r#"{
            "resolution": {"width": 640, "height": 480},
            "renderMode": "on-demand",
            "countPolicy": "uploads",
            "refreshHz": 30,
            "flipVertical": true
        }"#;

        let cfg = EdgecamConfig::from_json(json).expect("valid camelCase config");
        assert_eq!(cfg.resolution, Resolution::VGA);
        assert_eq!(cfg.render_mode, RenderMode::OnDemand);
        assert_eq!(cfg.count_policy, CountPolicy::Uploads);
        assert_eq!(cfg.refresh_hz, 30);
        assert!(cfg.flip_vertical);
        assert_eq!(cfg.processor, ProcessorKind::Edges);
    }

    #[test]
    fn deserializes_snake_case_fields() {
        let json = r#"{
            "render_mode": "continuous",
            "count_policy": "ticks",
            "processor": "luma",
            "lens_facing": "front"
        }"#;

        let cfg = EdgecamConfig::from_json(json).expect("valid snake_case config");
        assert_eq!(cfg.render_mode, RenderMode::Continuous);
        assert_eq!(cfg.processor, ProcessorKind::Luma);
        assert_eq!(cfg.lens_facing, LensFacing::Front);
        assert_eq!(cfg.resolution, Resolution::HD);
    }

    #[test]
    fn env_overrides_take_precedence() {
        let mut cfg = EdgecamConfig::default();
        cfg.apply_overrides(|key| match key {
            "EDGECAM_WIDTH" => Some("640".into()),
            "EDGECAM_HEIGHT" => Some("480".into()),
            "EDGECAM_RENDER_MODE" => Some("on_demand".into()),
            "EDGECAM_COUNT_POLICY" => Some("uploads".into()),
            _ => None,
        })
        .expect("overrides parse");
        assert_eq!(cfg.resolution, Resolution::VGA);
        assert_eq!(cfg.render_mode, RenderMode::OnDemand);
        assert_eq!(cfg.count_policy, CountPolicy::Uploads);
    }

    #[test]
    fn rejects_bad_values() {
        let mut cfg = EdgecamConfig::default();
        let err = cfg
            .apply_overrides(|key| (key == "EDGECAM_WIDTH").then(|| "wide".to_string()))
            .unwrap_err();
        assert!(matches!(err, EdgecamError::ConfigurationInvalid { .. }));

        cfg.resolution = Resolution::new(0, 720);
        assert!(cfg.validate().is_err());

        let mut cfg = EdgecamConfig::default();
        cfg.refresh_hz = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn refresh_interval_from_hz() {
        let mut cfg = EdgecamConfig::default();
        cfg.refresh_hz = 50;
        assert_eq!(cfg.refresh_interval(), Duration::from_millis(20));
    }
}
