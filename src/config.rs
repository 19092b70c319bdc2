//! Camera configuration.
//!
//! Resolution order: built-in defaults, then the file named by
//! `SHARED_CAMERA_CONFIG` (JSON, or TOML when the path ends in `.toml`), then
//! `SHARED_CAMERA_*` environment overrides, then validation.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::camera::{CameraOptions, SharedCamera};
use crate::capture::{CaptureDevice, SyntheticConfig, SyntheticDevice};
use crate::channel::stream::DEFAULT_MAX_MESSAGE_BYTES;
use crate::channel::{
    FrameChannel, MemorySlotStore, RedisSlotStore, SingleSlotChannel, SqliteSlotStore,
    StreamConfig, StreamingChannel,
};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_SLOT_PORT: u16 = 6379;
const DEFAULT_STREAM_PORT: u16 = 5555;
const DEFAULT_BIND_HOST: &str = "0.0.0.0";
const DEFAULT_SQLITE_PATH: &str = "shared_camera.db";
const DEFAULT_TIMEOUT_MS: u64 = 1000;
const DEFAULT_TAKEOVER_INTERVAL_MS: u64 = 1000;

/// Camera handle built from configuration.
pub type DynCamera = SharedCamera<Box<dyn CaptureDevice>, Box<dyn FrameChannel>>;

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    camera_index: Option<u32>,
    autotakeover: Option<bool>,
    name: Option<String>,
    timeout_ms: Option<u64>,
    takeover_interval_ms: Option<u64>,
    channel: Option<ChannelConfigFile>,
    device: Option<DeviceConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ChannelConfigFile {
    kind: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    bind_host: Option<String>,
    store: Option<String>,
    sqlite_path: Option<PathBuf>,
    max_message_bytes: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct DeviceConfigFile {
    kind: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    claim_port_base: Option<u16>,
}

/// Frame channel backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChannelKind {
    /// Overwrite-on-write key-value slot.
    #[default]
    Slot,
    /// Bind-to-claim TCP stream.
    Streaming,
}

impl FromStr for ChannelKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "slot" | "single_slot" | "redis" => Ok(Self::Slot),
            "streaming" | "stream" | "tcp" => Ok(Self::Streaming),
            other => Err(anyhow!(
                "unknown channel '{}': expected 'slot' or 'streaming'",
                other
            )),
        }
    }
}

/// Store behind the single-slot channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StoreKind {
    #[default]
    Redis,
    Sqlite,
    /// Process-local map; frames never leave this process.
    Memory,
}

impl FromStr for StoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "sqlite" => Ok(Self::Sqlite),
            "memory" => Ok(Self::Memory),
            other => Err(anyhow!(
                "unknown slot store '{}': expected 'redis', 'sqlite' or 'memory'",
                other
            )),
        }
    }
}

/// Capture device backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeviceKind {
    #[default]
    Synthetic,
    V4l2,
}

impl FromStr for DeviceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "synthetic" | "stub" => Ok(Self::Synthetic),
            "v4l2" | "v4l" => Ok(Self::V4l2),
            other => Err(anyhow!(
                "unknown device '{}': expected 'synthetic' or 'v4l2'",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CameraConfig {
    pub camera: CameraOptions,
    pub channel: ChannelSettings,
    pub device: DeviceSettings,
}

#[derive(Debug, Clone)]
pub struct ChannelSettings {
    pub kind: ChannelKind,
    pub host: String,
    /// `None` until resolved: the default depends on `kind`.
    pub port: Option<u16>,
    pub bind_host: String,
    pub store: StoreKind,
    pub sqlite_path: PathBuf,
    /// Streaming only: frames whose message would exceed this are not sent.
    pub max_message_bytes: usize,
}

impl ChannelSettings {
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(match self.kind {
            ChannelKind::Slot => DEFAULT_SLOT_PORT,
            ChannelKind::Streaming => DEFAULT_STREAM_PORT,
        })
    }
}

#[derive(Debug, Clone)]
pub struct DeviceSettings {
    pub kind: DeviceKind,
    pub width: u32,
    pub height: u32,
    pub claim_port_base: u16,
}

impl Default for CameraConfig {
    fn default() -> Self {
        let synthetic = SyntheticConfig::default();
        Self {
            camera: CameraOptions::default(),
            channel: ChannelSettings {
                kind: ChannelKind::default(),
                host: DEFAULT_HOST.to_string(),
                port: None,
                bind_host: DEFAULT_BIND_HOST.to_string(),
                store: StoreKind::default(),
                sqlite_path: PathBuf::from(DEFAULT_SQLITE_PATH),
                max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            },
            device: DeviceSettings {
                kind: DeviceKind::default(),
                width: synthetic.width,
                height: synthetic.height,
                claim_port_base: synthetic.claim_port_base,
            },
        }
    }
}

impl CameraConfig {
    /// Load from `SHARED_CAMERA_CONFIG` (if set) and the environment.
    pub fn load() -> Result<Self> {
        let path = std::env::var("SHARED_CAMERA_CONFIG").ok().map(PathBuf::from);
        Self::load_from(path.as_deref())
    }

    /// Load from an explicit file (if any) and the environment.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => CameraConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CameraConfigFile) -> Result<Self> {
        let mut cfg = Self::default();

        if let Some(index) = file.camera_index {
            cfg.camera.camera_index = index;
        }
        if let Some(autotakeover) = file.autotakeover {
            cfg.camera.autotakeover = autotakeover;
        }
        if let Some(name) = file.name {
            cfg.camera.name = name;
        }
        cfg.camera.timeout =
            Duration::from_millis(file.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS));
        cfg.camera.takeover_interval = Duration::from_millis(
            file.takeover_interval_ms
                .unwrap_or(DEFAULT_TAKEOVER_INTERVAL_MS),
        );

        if let Some(channel) = file.channel {
            if let Some(kind) = channel.kind {
                cfg.channel.kind = kind.parse()?;
            }
            if let Some(host) = channel.host {
                cfg.channel.host = host;
            }
            cfg.channel.port = channel.port;
            if let Some(bind_host) = channel.bind_host {
                cfg.channel.bind_host = bind_host;
            }
            if let Some(store) = channel.store {
                cfg.channel.store = store.parse()?;
            }
            if let Some(path) = channel.sqlite_path {
                cfg.channel.sqlite_path = path;
            }
            if let Some(limit) = channel.max_message_bytes {
                cfg.channel.max_message_bytes = limit;
            }
        }

        if let Some(device) = file.device {
            if let Some(kind) = device.kind {
                cfg.device.kind = kind.parse()?;
            }
            if let Some(width) = device.width {
                cfg.device.width = width;
            }
            if let Some(height) = device.height {
                cfg.device.height = height;
            }
            if let Some(base) = device.claim_port_base {
                cfg.device.claim_port_base = base;
            }
        }
        Ok(cfg)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(index) = env_value("SHARED_CAMERA_INDEX") {
            self.camera.camera_index = index
                .parse()
                .map_err(|_| anyhow!("SHARED_CAMERA_INDEX must be a non-negative integer"))?;
        }
        if let Some(name) = env_value("SHARED_CAMERA_NAME") {
            self.camera.name = name;
        }
        if let Some(host) = env_value("SHARED_CAMERA_HOST") {
            self.channel.host = host;
        }
        if let Some(port) = env_value("SHARED_CAMERA_PORT") {
            self.channel.port = Some(
                port.parse()
                    .map_err(|_| anyhow!("SHARED_CAMERA_PORT must be a port number"))?,
            );
        }
        if let Some(timeout) = env_value("SHARED_CAMERA_TIMEOUT_MS") {
            let ms: u64 = timeout.parse().map_err(|_| {
                anyhow!("SHARED_CAMERA_TIMEOUT_MS must be an integer number of milliseconds")
            })?;
            self.camera.timeout = Duration::from_millis(ms);
        }
        if let Some(flag) = env_value("SHARED_CAMERA_AUTOTAKEOVER") {
            self.camera.autotakeover = parse_bool(&flag)
                .ok_or_else(|| anyhow!("SHARED_CAMERA_AUTOTAKEOVER must be true or false"))?;
        }
        if let Some(kind) = env_value("SHARED_CAMERA_CHANNEL") {
            self.channel.kind = kind.parse()?;
        }
        if let Some(store) = env_value("SHARED_CAMERA_STORE") {
            self.channel.store = store.parse()?;
        }
        if let Some(path) = env_value("SHARED_CAMERA_SQLITE_PATH") {
            self.channel.sqlite_path = PathBuf::from(path);
        }
        if let Some(kind) = env_value("SHARED_CAMERA_DEVICE") {
            self.device.kind = kind.parse()?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.camera.name = self.camera.name.trim().to_string();
        if self.camera.name.is_empty() {
            return Err(anyhow!("camera name must not be empty"));
        }
        if self.camera.timeout.is_zero() {
            return Err(anyhow!("receive timeout must be greater than zero"));
        }
        if self.channel.port() == 0 {
            return Err(anyhow!("channel port must not be zero"));
        }
        if self.channel.max_message_bytes == 0 {
            return Err(anyhow!("max_message_bytes must be greater than zero"));
        }
        if self.device.width == 0 || self.device.height == 0 {
            return Err(anyhow!("device resolution must be non-zero"));
        }
        Ok(())
    }

    /// Build the capture device this configuration names.
    pub fn build_device(&self) -> Result<Box<dyn CaptureDevice>> {
        match self.device.kind {
            DeviceKind::Synthetic => Ok(Box::new(SyntheticDevice::new(SyntheticConfig {
                width: self.device.width,
                height: self.device.height,
                claim_port_base: self.device.claim_port_base,
                fail_after: None,
            }))),
            DeviceKind::V4l2 => {
                #[cfg(feature = "capture-v4l2")]
                {
                    Ok(Box::new(crate::capture::V4l2Device::new(
                        crate::capture::V4l2Config {
                            width: self.device.width,
                            height: self.device.height,
                            ..crate::capture::V4l2Config::default()
                        },
                    )))
                }
                #[cfg(not(feature = "capture-v4l2"))]
                {
                    Err(anyhow!("v4l2 capture requires the capture-v4l2 feature"))
                }
            }
        }
    }

    /// Build the frame channel this configuration names. Connects to the slot store.
    pub fn build_channel(&self) -> Result<Box<dyn FrameChannel>> {
        let port = self.channel.port();
        match self.channel.kind {
            ChannelKind::Slot => match self.channel.store {
                StoreKind::Redis => {
                    let store =
                        RedisSlotStore::connect(&self.channel.host, port, self.camera.timeout)?;
                    Ok(Box::new(SingleSlotChannel::new(store)))
                }
                StoreKind::Sqlite => {
                    let store =
                        SqliteSlotStore::open(&self.channel.sqlite_path, self.camera.timeout)?;
                    Ok(Box::new(SingleSlotChannel::new(store)))
                }
                StoreKind::Memory => Ok(Box::new(SingleSlotChannel::new(MemorySlotStore::new()))),
            },
            ChannelKind::Streaming => Ok(Box::new(StreamingChannel::new(StreamConfig {
                host: self.channel.host.clone(),
                port,
                bind_host: self.channel.bind_host.clone(),
                max_message_bytes: self.channel.max_message_bytes,
                ..StreamConfig::default()
            }))),
        }
    }

    /// Build the device and channel and run the initial ownership attempt.
    pub fn build(&self) -> Result<DynCamera> {
        let device = self.build_device()?;
        let channel = self.build_channel()?;
        Ok(SharedCamera::new(device, channel, self.camera.clone()))
    }
}

fn read_config_file(path: &Path) -> Result<CameraConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_default_follows_channel_kind() {
        let mut cfg = CameraConfig::default();
        assert_eq!(cfg.channel.port(), 6379);
        cfg.channel.kind = ChannelKind::Streaming;
        assert_eq!(cfg.channel.port(), 5555);
        cfg.channel.port = Some(7000);
        assert_eq!(cfg.channel.port(), 7000);
    }

    #[test]
    fn kinds_parse_case_insensitively() -> Result<()> {
        assert_eq!("Streaming".parse::<ChannelKind>()?, ChannelKind::Streaming);
        assert_eq!("SQLITE".parse::<StoreKind>()?, StoreKind::Sqlite);
        assert_eq!("memory".parse::<StoreKind>()?, StoreKind::Memory);
        assert_eq!("v4l2".parse::<DeviceKind>()?, DeviceKind::V4l2);
        assert!("carrier-pigeon".parse::<ChannelKind>().is_err());
        Ok(())
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = CameraConfig::default();
        assert_eq!(cfg.camera.camera_index, 0);
        assert!(cfg.camera.autotakeover);
        assert_eq!(cfg.camera.name, "shared_camera");
        assert_eq!(cfg.camera.timeout, Duration::from_secs(1));
        assert_eq!(cfg.channel.host, "127.0.0.1");
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert_eq!(parse_bool("Yes"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
