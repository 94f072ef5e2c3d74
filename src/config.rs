use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::detect::LabelMap;
use crate::grouping::ParentClassMap;
use crate::output::DEFAULT_OUTPUT_PATH;

const DEFAULT_MODEL_INPUT: u32 = 640;
const DEFAULT_CONFIDENCE: f32 = 0.25;
const DEFAULT_IOU: f32 = 0.45;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct GrouperConfigFile {
    camera: Option<CameraConfigFile>,
    detector: Option<DetectorConfigFile>,
    output: Option<OutputConfigFile>,
    /// Parent label -> eligible sub-object labels.
    parents: Option<BTreeMap<String, Vec<String>>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CameraConfigFile {
    source: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectorConfigFile {
    model_path: Option<PathBuf>,
    input_size: Option<u32>,
    confidence_threshold: Option<f32>,
    iou_threshold: Option<f32>,
    labels: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct OutputConfigFile {
    path: Option<PathBuf>,
    stream_jsonl: Option<bool>,
    preview_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct GrouperConfig {
    pub camera: CameraSettings,
    pub detector: DetectorSettings,
    pub output: OutputSettings,
    pub parents: ParentClassMap,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    /// Device path, or `stub://name` for a synthetic source.
    pub source: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    /// ONNX model. Without one the pipeline runs with the scripted backend.
    pub model_path: Option<PathBuf>,
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub labels: LabelMap,
}

#[derive(Debug, Clone)]
pub struct OutputSettings {
    pub path: PathBuf,
    /// Stream one JSON line per frame instead of one document at exit.
    pub stream_jsonl: bool,
    pub preview_path: Option<PathBuf>,
}

impl Default for GrouperConfig {
    fn default() -> Self {
        Self {
            camera: CameraSettings {
                source: crate::DEFAULT_CAMERA_DEVICE.to_string(),
                width: crate::CAMERA_WIDTH,
                height: crate::CAMERA_HEIGHT,
            },
            detector: DetectorSettings {
                model_path: None,
                input_size: DEFAULT_MODEL_INPUT,
                confidence_threshold: DEFAULT_CONFIDENCE,
                iou_threshold: DEFAULT_IOU,
                labels: LabelMap::coco(),
            },
            output: OutputSettings {
                path: PathBuf::from(DEFAULT_OUTPUT_PATH),
                stream_jsonl: false,
                preview_path: None,
            },
            parents: ParentClassMap::default(),
        }
    }
}

impl GrouperConfig {
    /// Load defaults, then the file named by `GROUPER_CONFIG`, then env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("GROUPER_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: GrouperConfigFile) -> Result<Self> {
        let mut cfg = Self::default();

        if let Some(camera) = file.camera {
            if let Some(source) = camera.source {
                cfg.camera.source = source;
            }
            cfg.camera.width = camera.width.unwrap_or(cfg.camera.width);
            cfg.camera.height = camera.height.unwrap_or(cfg.camera.height);
        }
        if let Some(detector) = file.detector {
            if let Some(model_path) = detector.model_path {
                cfg.detector.model_path = Some(model_path);
            }
            cfg.detector.input_size = detector.input_size.unwrap_or(cfg.detector.input_size);
            cfg.detector.confidence_threshold = detector
                .confidence_threshold
                .unwrap_or(cfg.detector.confidence_threshold);
            cfg.detector.iou_threshold = detector
                .iou_threshold
                .unwrap_or(cfg.detector.iou_threshold);
            if let Some(labels) = detector.labels {
                cfg.detector.labels = LabelMap::new(labels)?;
            }
        }
        if let Some(output) = file.output {
            if let Some(path) = output.path {
                cfg.output.path = path;
            }
            cfg.output.stream_jsonl = output.stream_jsonl.unwrap_or(cfg.output.stream_jsonl);
            cfg.output.preview_path = output.preview_path;
        }
        if let Some(parents) = file.parents {
            cfg.parents = ParentClassMap::new(parents)?;
        }
        Ok(cfg)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(source) = std::env::var("GROUPER_SOURCE") {
            if !source.trim().is_empty() {
                self.camera.source = source;
            }
        }
        if let Ok(model) = std::env::var("GROUPER_MODEL") {
            if !model.trim().is_empty() {
                self.detector.model_path = Some(PathBuf::from(model));
            }
        }
        if let Ok(output) = std::env::var("GROUPER_OUTPUT") {
            if !output.trim().is_empty() {
                self.output.path = PathBuf::from(output);
            }
        }
        if let Ok(stream) = std::env::var("GROUPER_STREAM_JSONL") {
            self.output.stream_jsonl = parse_bool(&stream)
                .ok_or_else(|| anyhow!("GROUPER_STREAM_JSONL must be true/false or 1/0"))?;
        }
        Ok(())
    }

    /// Check ranges and cross-field consistency.
    pub fn validate(&self) -> Result<()> {
        if self.camera.source.trim().is_empty() {
            return Err(anyhow!("camera source must not be empty"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!(
                "camera resolution must be non-zero, got {}x{}",
                self.camera.width,
                self.camera.height
            ));
        }
        if self.detector.input_size == 0 {
            return Err(anyhow!("detector input size must be non-zero"));
        }
        for (name, value) in [
            ("confidence_threshold", self.detector.confidence_threshold),
            ("iou_threshold", self.detector.iou_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("{} must be within [0, 1], got {}", name, value));
            }
        }
        if self.output.path.as_os_str().is_empty() {
            return Err(anyhow!("output path must not be empty"));
        }
        self.parents.validate()?;
        for parent in self.parents.parents() {
            if !self.detector.labels.contains_label(parent) {
                log::warn!(
                    "parent class '{}' is not in the detector vocabulary and will never match",
                    parent
                );
            }
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<GrouperConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
