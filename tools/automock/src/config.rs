use crate::codec::CodecKind;
use crate::errors::AutomockError;
use crate::logging::{JsonlLogger, DEFAULT_MAX_PAYLOAD_BYTES};
use crate::replay::proxy::AutomockOptions;
use crate::runtime::FileSystem;
use crate::types::CounterScope;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const ENV_UNLOCKED: &str = "AUTOMOCK_UNLOCKED";
pub const ENV_REMOVE: &str = "AUTOMOCK_REMOVE";
pub const ENV_STORAGE: &str = "AUTOMOCK_STORAGE";

pub type EnvMap = BTreeMap<String, String>;

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AutomockConfig {
    pub storage: StorageConfig,
    pub mode: ModeConfig,
    pub counters: CountersConfig,
    pub codec: CodecConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("tests/mocks"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ModeConfig {
    /// Record mode. Locked (replay only) unless set.
    pub unlocked: bool,
    /// Drop existing fixtures and record from scratch.
    pub remove: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CountersConfig {
    pub scope: CounterScope,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CodecConfig {
    pub kind: CodecKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogConfig {
    pub path: Option<PathBuf>,
    pub max_payload_bytes: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }
}

impl AutomockConfig {
    pub fn logger(&self) -> Option<JsonlLogger> {
        self.log.path.as_ref().map(|path| {
            let mut logger = JsonlLogger::new(path);
            logger.max_payload_bytes = self.log.max_payload_bytes;
            logger
        })
    }

    /// Proxy options matching this configuration.
    pub fn options(&self) -> AutomockOptions {
        let mut options = if self.mode.unlocked {
            AutomockOptions::unlocked()
        } else {
            AutomockOptions::locked()
        }
        .with_codec(self.codec.kind.build())
        .with_counter_scope(self.counters.scope);
        if let Some(logger) = self.logger() {
            options = options.with_logger(logger);
        }
        options
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialAutomockConfig {
    storage: Option<PartialStorageConfig>,
    mode: Option<PartialModeConfig>,
    counters: Option<PartialCountersConfig>,
    codec: Option<PartialCodecConfig>,
    log: Option<PartialLogConfig>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialStorageConfig {
    root: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialModeConfig {
    unlocked: Option<bool>,
    remove: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialCountersConfig {
    scope: Option<CounterScope>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialCodecConfig {
    kind: Option<CodecKind>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialLogConfig {
    path: Option<PathBuf>,
    max_payload_bytes: Option<usize>,
}

/// Defaults, then the TOML file named by `--config`, then the environment.
pub fn load_config(
    overrides: &CliOverrides,
    env: &EnvMap,
    fs: &dyn FileSystem,
) -> Result<AutomockConfig, AutomockError> {
    let mut cfg = AutomockConfig::default();

    if let Some(path) = &overrides.config_path {
        let file_contents = fs.read_to_string(path)?;
        let partial = parse_partial(&file_contents)?;
        merge_partial_config(&mut cfg, partial);
    }

    apply_env_overrides(&mut cfg, env)?;
    validate_config(&cfg)?;
    Ok(cfg)
}

pub fn parse_config(text: &str) -> Result<AutomockConfig, AutomockError> {
    let mut cfg = AutomockConfig::default();
    merge_partial_config(&mut cfg, parse_partial(text)?);
    validate_config(&cfg)?;
    Ok(cfg)
}

fn parse_partial(text: &str) -> Result<PartialAutomockConfig, AutomockError> {
    toml::from_str(text).map_err(|e| AutomockError::ConfigParse(e.to_string()))
}

fn merge_partial_config(cfg: &mut AutomockConfig, partial: PartialAutomockConfig) {
    if let Some(storage) = partial.storage {
        if let Some(root) = storage.root {
            cfg.storage.root = root;
        }
    }

    if let Some(mode) = partial.mode {
        if let Some(unlocked) = mode.unlocked {
            cfg.mode.unlocked = unlocked;
        }
        if let Some(remove) = mode.remove {
            cfg.mode.remove = remove;
        }
    }

    if let Some(scope) = partial.counters.and_then(|c| c.scope) {
        cfg.counters.scope = scope;
    }

    if let Some(kind) = partial.codec.and_then(|c| c.kind) {
        cfg.codec.kind = kind;
    }

    if let Some(log) = partial.log {
        if let Some(path) = log.path {
            cfg.log.path = Some(path);
        }
        if let Some(max) = log.max_payload_bytes {
            cfg.log.max_payload_bytes = max;
        }
    }
}

fn apply_env_overrides(cfg: &mut AutomockConfig, env: &EnvMap) -> Result<(), AutomockError> {
    if let Some(value) = env.get(ENV_UNLOCKED) {
        cfg.mode.unlocked = parse_flag(ENV_UNLOCKED, value)?;
    }
    if let Some(value) = env.get(ENV_REMOVE) {
        cfg.mode.remove = parse_flag(ENV_REMOVE, value)?;
    }
    if let Some(value) = env.get(ENV_STORAGE) {
        if !value.trim().is_empty() {
            cfg.storage.root = PathBuf::from(value.trim());
        }
    }
    Ok(())
}

fn parse_flag(name: &str, value: &str) -> Result<bool, AutomockError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => Err(AutomockError::InvalidConfig(format!(
            "{name} must be a boolean flag, got {other:?}"
        ))),
    }
}

fn validate_config(cfg: &AutomockConfig) -> Result<(), AutomockError> {
    if cfg.mode.remove && !cfg.mode.unlocked {
        return Err(AutomockError::InvalidConfig(
            "mode.remove requires mode.unlocked".to_string(),
        ));
    }

    if cfg.storage.root.as_os_str().is_empty() {
        return Err(AutomockError::InvalidConfig(
            "storage.root must not be empty".to_string(),
        ));
    }

    if cfg.log.max_payload_bytes < 16 {
        return Err(AutomockError::InvalidConfig(
            "log.max_payload_bytes must be at least 16".to_string(),
        ));
    }

    Ok(())
}
