use crate::rpc::{Framing, Result};
use crate::worker::params::LoadConfig;
use crate::{muted_error, weak_error};
use serde::{Deserialize, Serialize};
use std::fs::read_to_string;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Debug session configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Host of the Delve server.
    pub host: String,
    /// Port of the Delve server.
    pub port: u16,
    /// Socket read/write timeout in seconds, 0 disables it.
    pub timeout: u64,
    /// Chunk size for short-read framing, in bytes.
    pub buffer: usize,
    pub framing: Framing,
    /// File to write all the raw data read from and written to the Delve session.
    pub trace_file: Option<PathBuf>,
    /// Max number of frames in a stacktrace.
    pub stacktrace_depth: u32,
    /// How variables are loaded for locals, arguments and watches.
    pub load: LoadConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3456,
            timeout: 10,
            buffer: 4096,
            framing: Framing::default(),
            trace_file: None,
            stacktrace_depth: 20,
            load: LoadConfig::default(),
        }
    }
}

impl Config {
    const DEFAULT_PATH: &'static str = ".config/dlvc/config.toml";

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn from_toml(data: &str) -> Result<Self> {
        Ok(toml::de::from_str(data)?)
    }

    /// Load configuration from file.
    ///
    /// Without explicit `path` the file is looked up in the home directory, a missing or broken
    /// default file gives the default configuration. An explicit file must exist and be valid.
    pub fn from_file(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_toml(&read_to_string(path)?),
            None => Ok(Self::from_home().unwrap_or_default()),
        }
    }

    fn from_home() -> Option<Self> {
        let path = home::home_dir()?.join(Self::DEFAULT_PATH);
        let data = muted_error!(read_to_string(path))?;
        weak_error!(Self::from_toml(&data), "default config file:")
    }
}
