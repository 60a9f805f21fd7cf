use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};

use crate::extract::ResolverConfig;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventWindowConfig {
    pub pre_event_secs: u32,
    pub post_event_secs: u32,
    /// Zusätzliche Wartezeit, damit der Recorder die Post-Phase sicher geschrieben hat.
    pub margin_secs: u32,
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IngestConfig {
    pub bind: String,
    pub max_pending: usize,
    pub max_message_bytes: usize,
    pub read_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DetectionsConfig {
    pub enabled: bool,
    pub addr: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FfmpegConfig {
    pub binary: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub node_name: String,
    pub recordings_dir: PathBuf,
    pub events_dir: PathBuf,
    pub segment_duration_secs: u64,
    pub output_fps: u32,
    pub events: EventWindowConfig,
    pub ingest: IngestConfig,
    pub detections: DetectionsConfig,
    pub resolver: ResolverConfig,
    pub ffmpeg: FfmpegConfig,
    /// `camera_type` aus dem Event → Kameraverzeichnis der Aufnahme.
    pub cameras: HashMap<String, String>,
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate().context("config validation failed")?;
        Ok(config)
    }

    /// Loads `path`, or writes the defaults there if it does not exist yet.
    pub fn load_or_create(path: &str) -> anyhow::Result<Self> {
        if Path::new(path).exists() {
            return Self::load(path);
        }
        let config = Self::default();
        config
            .save(path)
            .with_context(|| format!("writing default config to {}", path))?;
        log::info!("[config] wrote defaults to {}", path);
        Ok(config)
    }

    pub fn save(&self, path: &str) -> anyhow::Result<()> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.node_name.trim().is_empty() {
            bail!("node_name must not be empty");
        }
        if self.recordings_dir.as_os_str().is_empty() {
            bail!("recordings_dir must not be empty");
        }
        if self.events_dir.as_os_str().is_empty() {
            bail!("events_dir must not be empty");
        }
        if self.segment_duration_secs == 0 {
            bail!("segment_duration_secs must be > 0");
        }
        if self.output_fps == 0 {
            bail!("output_fps must be > 0");
        }

        self.events.validate()?;
        self.ingest.validate()?;
        self.detections.validate()?;

        if self.resolver.keyframe_lookback == 0 {
            bail!("resolver.keyframe_lookback must be > 0");
        }
        if self.ffmpeg.binary.trim().is_empty() {
            bail!("ffmpeg.binary must not be empty");
        }

        for (camera_type, dir) in &self.cameras {
            if dir.trim().is_empty() {
                bail!("cameras.{} maps to an empty directory name", camera_type);
            }
            if dir.contains('/') || dir.contains('\\') {
                bail!("cameras.{} must be a plain directory name, got '{}'", camera_type, dir);
            }
        }

        Ok(())
    }

    /// Debounce before an event is processed: pre + post + margin.
    pub fn process_delay(&self) -> Duration {
        Duration::from_secs(
            u64::from(self.events.pre_event_secs)
                + u64::from(self.events.post_event_secs)
                + u64::from(self.events.margin_secs),
        )
    }

    pub fn segment_duration(&self) -> Duration {
        Duration::from_secs(self.segment_duration_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.events.poll_interval_ms)
    }

    pub fn camera_for(&self, camera_type: &str) -> Option<&str> {
        self.cameras.get(camera_type).map(String::as_str)
    }
}

impl EventWindowConfig {
    fn validate(&self) -> anyhow::Result<()> {
        if self.pre_event_secs == 0 && self.post_event_secs == 0 {
            bail!("events: pre_event_secs and post_event_secs must not both be 0");
        }
        if self.poll_interval_ms == 0 {
            bail!("events.poll_interval_ms must be > 0");
        }
        Ok(())
    }
}

impl IngestConfig {
    fn validate(&self) -> anyhow::Result<()> {
        if self.bind.parse::<SocketAddr>().is_err() {
            bail!("ingest.bind '{}' is not a socket address", self.bind);
        }
        if self.max_pending == 0 {
            bail!("ingest.max_pending must be > 0");
        }
        if self.max_message_bytes == 0 {
            bail!("ingest.max_message_bytes must be > 0");
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl DetectionsConfig {
    fn validate(&self) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.addr.trim().is_empty() {
            bail!("detections.addr must not be empty when enabled");
        }
        if self.timeout_ms == 0 {
            bail!("detections.timeout_ms must be > 0");
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut cameras = HashMap::new();
        cameras.insert("0".to_string(), "RGB_Camera".to_string());
        cameras.insert("1".to_string(), "Thermal_Camera".to_string());

        Self {
            node_name: "vigil-node".to_string(),
            recordings_dir: PathBuf::from("/data/vigil"),
            events_dir: PathBuf::from("/data/vigil"),
            segment_duration_secs: 300,
            output_fps: 10,
            events: EventWindowConfig::default(),
            ingest: IngestConfig::default(),
            detections: DetectionsConfig::default(),
            resolver: ResolverConfig::default(),
            ffmpeg: FfmpegConfig::default(),
            cameras,
        }
    }
}

impl Default for EventWindowConfig {
    fn default() -> Self {
        Self {
            pre_event_secs: 15,
            post_event_secs: 15,
            margin_secs: 2,
            poll_interval_ms: 500,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:9999".to_string(),
            max_pending: 100,
            max_message_bytes: 1024 * 1024,
            read_timeout_ms: 5000,
        }
    }
}

impl Default for DetectionsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            addr: "127.0.0.1:8888".to_string(),
            timeout_ms: 5000,
        }
    }
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            binary: "ffmpeg".to_string(),
        }
    }
}
