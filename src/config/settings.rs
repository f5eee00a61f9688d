use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};

/// Largest snapshot length a saved capture file can hold.
pub const MAX_SNAPLEN: i32 = 65535;

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub output: OutputConfig,
}

/// Parameters of one capture run. Built once, then only borrowed by the session.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CaptureConfig {
    pub interface: Option<String>,
    /// BPF expression handed to libpcap unparsed.
    pub filter: Option<String>,
    /// Packet bound; absent or 0 means run until interrupted.
    pub count: Option<u64>,
    /// Bytes kept per packet, at most `MAX_SNAPLEN`.
    pub snaplen: i32,
    /// Read timeout; bounds how long an interrupt goes unnoticed on a quiet link.
    pub timeout_ms: i32,
    pub promiscuous: bool,
    /// Upper bound on packets kept in memory for the output file.
    pub max_retained: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub packets: Option<PathBuf>,
    pub stats: Option<PathBuf>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interface: None,
            filter: None,
            count: None,
            snaplen: MAX_SNAPLEN,
            timeout_ms: 1000,
            promiscuous: false,
            max_retained: None,
        }
    }
}

impl CaptureConfig {
    pub fn packet_limit(&self) -> Option<u64> {
        self.count.filter(|&n| n > 0)
    }

    /// libpcap blocks forever on a zero timeout, so the stop flag would never be polled.
    pub fn read_timeout_ms(&self) -> i32 {
        self.timeout_ms.max(1)
    }

    pub fn snapshot_len(&self) -> i32 {
        self.snaplen.clamp(1, MAX_SNAPLEN)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.timeout_ms <= 0 {
            bail!("capture.timeout_ms must be positive, got {}", self.timeout_ms);
        }
        if !(1..=MAX_SNAPLEN).contains(&self.snaplen) {
            bail!("capture.snaplen must be between 1 and {}, got {}", MAX_SNAPLEN, self.snaplen);
        }
        Ok(())
    }
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        config
            .capture
            .validate()
            .with_context(|| format!("invalid config file {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("writing config file {}", path.display()))?;
        Ok(())
    }

    /// True when captured packets have to be kept for the output file.
    pub fn retains_packets(&self) -> bool {
        self.output.packets.is_some()
    }
}
