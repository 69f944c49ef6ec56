use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::session::PollPolicy;

/// Top-level harness config, loaded from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// The server under test.
    pub server: ServerConfig,
    /// Timeouts, settle delays and poll budgets.
    pub timing: TimingConfig,
    /// Options that shape a run.
    pub run: RunConfig,
}

/// Endpoint of the IRC server under test.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Shared registration password sent with `PASS`.
    pub password: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6667,
            password: "senha".to_string(),
        }
    }
}

impl ServerConfig {
    /// `host:port`, as handed to the TCP connector.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Every wait the harness performs is bounded by one of these values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub connect_timeout_ms: u64,
    /// Upper bound for a single receive.
    pub read_timeout_ms: u64,
    /// Unit for `Wait::Settle(n)`.
    pub settle_unit_ms: u64,
    pub register_attempts: u32,
    pub register_interval_ms: u64,
    pub collect_attempts: u32,
    pub collect_interval_ms: u64,
    /// How long the server is given to drop an unregistered client.
    pub registration_grace_ms: u64,
    /// Hard wall-clock budget for one scenario.
    pub scenario_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 3_000,
            read_timeout_ms: 1_000,
            settle_unit_ms: 100,
            register_attempts: 5,
            register_interval_ms: 300,
            collect_attempts: 5,
            collect_interval_ms: 200,
            registration_grace_ms: 32_000,
            scenario_timeout_ms: 90_000,
        }
    }
}

impl TimingConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn settle(&self, units: u32) -> Duration {
        Duration::from_millis(self.settle_unit_ms.saturating_mul(u64::from(units)))
    }

    pub fn registration_grace(&self) -> Duration {
        Duration::from_millis(self.registration_grace_ms)
    }

    pub fn scenario_timeout(&self) -> Duration {
        Duration::from_millis(self.scenario_timeout_ms)
    }

    pub fn register_policy(&self) -> PollPolicy {
        PollPolicy::new(
            self.register_attempts,
            Duration::from_millis(self.register_interval_ms),
        )
    }

    pub fn collect_policy(&self) -> PollPolicy {
        PollPolicy::new(
            self.collect_attempts,
            Duration::from_millis(self.collect_interval_ms),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Append a per-run suffix to every nickname and channel name.
    pub unique_names: bool,
    /// Run scenarios flagged as slow (multi-second waits).
    pub include_slow: bool,
    /// Seed for generated payloads. Random when unset.
    pub seed: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            unique_names: true,
            include_slow: false,
            seed: None,
        }
    }
}

impl HarnessConfig {
    /// Read the harness file at `path`. A missing file is `Ok(None)`, so
    /// callers fall back to defaults and flags.
    pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        warn_if_password_exposed(path);
        toml::from_str(&contents)
            .map(Some)
            .map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Write the current settings, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(write_err)?;
        }
        std::fs::write(path, self.to_toml()?).map_err(write_err)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// `<config dir>/ircprobe/config.toml`, or `./ircprobe/config.toml` when the
/// platform has no config dir.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ircprobe")
        .join("config.toml")
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read harness file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("harness file {} is not valid TOML: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("cannot write harness file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot render settings as TOML: {0}")]
    Render(#[from] toml::ser::Error),
}

/// The file holds the server password; say so when other users can read it.
#[cfg(unix)]
fn warn_if_password_exposed(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    let Ok(meta) = std::fs::metadata(path) else {
        return;
    };
    let mode = meta.permissions().mode() & 0o7777;
    if others_can_read(mode) {
        tracing::warn!(
            path = %path.display(),
            mode = format_args!("{mode:o}"),
            "harness file readable by other users exposes the server password; chmod 600 it"
        );
    }
}

#[cfg(not(unix))]
fn warn_if_password_exposed(_path: &Path) {}

#[cfg(unix)]
fn others_can_read(mode: u32) -> bool {
    mode & 0o004 != 0
}
