use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use tally_engine::{FieldMapping, PipelineConfig, Strategy};

use crate::error::Result;

/// Configuration of `tally-server`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
  /// Interface to listen on.
  pub host: String,
  /// One session is served on each port.
  pub ports: Vec<u16>,
  /// How record lines map onto keys and values. `skip_header` drops the
  /// first record line of every session.
  pub mapping: FieldMapping,
  pub pipeline: PipelineConfig,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host: "0.0.0.0".to_string(),
      ports: vec![8001, 8002, 8003, 8004],
      mapping: FieldMapping::default(),
      pipeline: PipelineConfig {
        strategy: Strategy::Sharded,
        ..PipelineConfig::default()
      },
    }
  }
}

impl ServerConfig {
  pub fn from_yaml(yaml: &str) -> Result<Self> {
    Ok(serde_yaml::from_str(yaml)?)
  }

  pub fn load(path: impl AsRef<Path>) -> Result<Self> {
    Ok(serde_yaml::from_reader(File::open(path)?)?)
  }

  /// `host:port` for every configured port.
  pub fn addrs(&self) -> Vec<String> {
    self
      .ports
      .iter()
      .map(|port| format!("{}:{}", self.host, port))
      .collect()
  }
}

/// Configuration of `tally-client`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
  pub host: String,
  pub port: u16,
  /// File whose lines are streamed to the server.
  pub file: PathBuf,
  pub skip_header: bool,
  /// Upper bound on a single line write, e.g. `"1s"` or `"250ms"`.
  #[serde(deserialize_with = "humantime_duration")]
  pub write_timeout: Duration,
}

impl Default for ClientConfig {
  fn default() -> Self {
    Self {
      host: "localhost".to_string(),
      port: 8001,
      file: PathBuf::from("phones_data.csv"),
      skip_header: true,
      write_timeout: Duration::from_secs(1),
    }
  }
}

impl ClientConfig {
  pub fn from_yaml(yaml: &str) -> Result<Self> {
    Ok(serde_yaml::from_str(yaml)?)
  }

  pub fn load(path: impl AsRef<Path>) -> Result<Self> {
    Ok(serde_yaml::from_reader(File::open(path)?)?)
  }

  pub fn addr(&self) -> String {
    format!("{}:{}", self.host, self.port)
  }
}

fn humantime_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
  D: Deserializer<'de>,
{
  let raw = String::deserialize(deserializer)?;
  humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
}
