use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::connection::{BackoffPolicy, Endpoint};

// =============================================================================
// Tunables (figment-deserialized from defaults / config.toml / env / CLI)
// =============================================================================
//
//   config.toml:     [reconnect]
//                    max_ms = 30000
//
//   env var:         COPILOT_RECONNECT__MAX_MS=30000   (double underscore = nesting)

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub reconnect: ReconnectFileConfig,
    #[serde(default)]
    pub embed: EmbedFileConfig,
    #[serde(default)]
    pub input: InputFileConfig,
}

/// Where the assistant server listens (lives under `[server]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Reconnect backoff (lives under `[reconnect]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReconnectFileConfig {
    #[serde(default = "default_step_ms")]
    pub step_ms: u64,
    #[serde(default = "default_max_ms")]
    pub max_ms: u64,
    /// Start again from the first step after a successful open.
    #[serde(default)]
    pub reset_on_open: bool,
}

impl Default for ReconnectFileConfig {
    fn default() -> Self {
        Self {
            step_ms: default_step_ms(),
            max_ms: default_max_ms(),
            reset_on_open: false,
        }
    }
}

/// Host notifications (lives under `[embed]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbedFileConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// `-` for stderr, otherwise a file path. Unset means no host.
    #[serde(default)]
    pub notify: Option<String>,
}

impl Default for EmbedFileConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            notify: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InputFileConfig {
    #[serde(default = "default_clear_delay_ms")]
    pub clear_delay_ms: u64,
}

impl Default for InputFileConfig {
    fn default() -> Self {
        Self {
            clear_delay_ms: default_clear_delay_ms(),
        }
    }
}

fn default_host() -> String {
    Endpoint::DEFAULT_HOST.to_string()
}
fn default_port() -> u16 {
    Endpoint::DEFAULT_PORT
}
fn default_step_ms() -> u64 {
    1000
}
fn default_max_ms() -> u64 {
    60_000
}
fn default_tick_interval_ms() -> u64 {
    1000
}
fn default_clear_delay_ms() -> u64 {
    10
}

/// Values given on the command line. They sit above every other layer.
#[derive(Clone, Debug, Default)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub notify: Option<String>,
}

/// Build a figment that layers: defaults → config.toml → COPILOT_* env vars → CLI flags.
///
/// Env vars use double-underscore for nesting into sections:
///   `COPILOT_SERVER__PORT=9100`  →  `server.port = 9100`
pub fn load_config(data_dir: &Path, cli: &CliOverrides) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    let mut figment = Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join("config.toml")))
        .merge(Env::prefixed("COPILOT_").split("__"));

    if let Some(host) = &cli.host {
        figment = figment.merge(Serialized::default("server.host", host));
    }
    if let Some(port) = cli.port {
        figment = figment.merge(Serialized::default("server.port", port));
    }
    if let Some(notify) = &cli.notify {
        figment = figment.merge(Serialized::default("embed.notify", notify));
    }
    figment
}

// =============================================================================
// Runtime config (derived from FileConfig)
// =============================================================================

/// Where host notifications are written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NotifyTarget {
    None,
    Stderr,
    Path(PathBuf),
}

impl NotifyTarget {
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") => Self::None,
            Some("-") => Self::Stderr,
            Some(path) => Self::Path(PathBuf::from(path)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PanelConfig {
    pub endpoint: Endpoint,
    pub backoff: BackoffPolicy,
    /// Period of the host `tick` notification.
    pub tick_interval: Duration,
    /// How long after submit the input field is cleared.
    pub clear_delay: Duration,
    pub notify: NotifyTarget,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            backoff: BackoffPolicy::default(),
            tick_interval: Duration::from_millis(default_tick_interval_ms()),
            clear_delay: Duration::from_millis(default_clear_delay_ms()),
            notify: NotifyTarget::None,
        }
    }
}

impl PanelConfig {
    pub fn from_file(fc: &FileConfig) -> Result<Self> {
        ensure!(!fc.server.host.trim().is_empty(), "server.host must not be empty");
        ensure!(fc.reconnect.step_ms > 0, "reconnect.step_ms must be greater than 0");
        ensure!(
            fc.reconnect.max_ms >= fc.reconnect.step_ms,
            "reconnect.max_ms ({}) must be at least reconnect.step_ms ({})",
            fc.reconnect.max_ms,
            fc.reconnect.step_ms
        );
        ensure!(
            fc.embed.tick_interval_ms > 0,
            "embed.tick_interval_ms must be greater than 0"
        );

        Ok(Self {
            endpoint: Endpoint::new(fc.server.host.trim(), fc.server.port),
            backoff: BackoffPolicy {
                step: Duration::from_millis(fc.reconnect.step_ms),
                max: Duration::from_millis(fc.reconnect.max_ms),
                reset_on_open: fc.reconnect.reset_on_open,
            },
            tick_interval: Duration::from_millis(fc.embed.tick_interval_ms),
            clear_delay: Duration::from_millis(fc.input.clear_delay_ms),
            notify: NotifyTarget::parse(fc.embed.notify.as_deref()),
        })
    }
}

// =============================================================================
// Directory layout (not tunable via figment, derived from --data-dir)
// =============================================================================

#[derive(Clone, Debug)]
pub struct CopilotDirs {
    pub data_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl CopilotDirs {
    pub fn new(custom_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = match custom_dir {
            Some(dir) => dir,
            None => dirs::home_dir()
                .context("Could not find home directory")?
                .join(".copilot"),
        };

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

        let logs_dir = data_dir.join("logs");
        std::fs::create_dir_all(&logs_dir)
            .with_context(|| format!("Failed to create logs directory: {:?}", logs_dir))?;

        info!("Data directory: {}", data_dir.display());

        Ok(Self { data_dir, logs_dir })
    }

    pub fn config_toml_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }

    pub fn log_path(&self) -> PathBuf {
        self.logs_dir.join("copilot.log")
    }
}
