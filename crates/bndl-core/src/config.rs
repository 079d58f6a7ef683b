use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{BndlError, BndlResult};

/// Top-level tool configuration (loaded from bndl.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BndlConfig {
    pub endpoint: EndpointConfig,
    pub output: OutputConfig,
    pub download: DownloadConfig,
    pub master: MasterConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Content-delivery base URL; bundle paths are resolved against it
    pub base_url: String,
    /// Catalog location relative to the base URL
    pub catalog_path: String,
    /// Master-data blob location relative to the base URL
    pub master_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Root directory for decrypted bundles
    pub root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Concurrent workers per pass (0 = cpu_count). Retry passes always
    /// run with a single worker.
    pub workers: usize,
    /// Ceiling on download passes, counting the first (0 = unbounded)
    pub max_passes: u32,
}

/// Master-data decryption parameters (AES-256-CBC)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MasterConfig {
    /// 32-byte key, hex encoded
    pub key_hex: String,
    /// 16-byte IV, hex encoded
    pub iv_hex: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: "https://localhost:8443/dl".into(),
            catalog_path: "catalog.json".into(),
            master_path: "master.bin".into(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./bundles"),
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            max_passes: 0,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl MasterConfig {
    pub fn key(&self) -> BndlResult<[u8; 32]> {
        decode_fixed(&self.key_hex, "master.key_hex")
    }

    pub fn iv(&self) -> BndlResult<[u8; 16]> {
        decode_fixed(&self.iv_hex, "master.iv_hex")
    }
}

fn decode_fixed<const N: usize>(s: &str, field: &str) -> BndlResult<[u8; N]> {
    let raw = hex::decode(s)
        .map_err(|e| BndlError::Config(format!("{field}: invalid hex: {e}")))?;
    raw.as_slice()
        .try_into()
        .map_err(|_| {
            BndlError::Config(format!(
                "{field}: expected {N} bytes, got {}",
                raw.len()
            ))
        })
}
