use crate::address::{AddressLimits, DEFAULT_MAX_COLS, DEFAULT_MAX_ROWS};
use crate::grid::SettlePolicy;
use crate::interchange::{DEFAULT_MAX_IMPORT_BYTES, PipelineSettings};
use crate::merge::{AppendOptions, DEFAULT_SHEET_COLS, DEFAULT_SHEET_ROWS};
use anyhow::{Context, Result};
use clap::Args;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_DEBOUNCE_MS: u64 = 50;
const DEFAULT_SETTLE_POLL_MS: u64 = 25;
const DEFAULT_SETTLE_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BridgeConfig {
    /// Every file path must resolve inside this directory.
    pub workspace_root: PathBuf,
    pub debounce_ms: u64,
    pub settle_poll_ms: u64,
    pub settle_timeout_ms: u64,
    pub max_rows: u32,
    pub max_cols: u32,
    pub default_sheet_rows: u32,
    pub default_sheet_cols: u32,
    /// `None` when disabled.
    pub max_import_bytes: Option<u64>,
    pub log_filter: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from("."),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            settle_poll_ms: DEFAULT_SETTLE_POLL_MS,
            settle_timeout_ms: DEFAULT_SETTLE_TIMEOUT_MS,
            max_rows: DEFAULT_MAX_ROWS,
            max_cols: DEFAULT_MAX_COLS,
            default_sheet_rows: DEFAULT_SHEET_ROWS,
            default_sheet_cols: DEFAULT_SHEET_COLS,
            max_import_bytes: Some(DEFAULT_MAX_IMPORT_BYTES),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl BridgeConfig {
    /// Layers CLI flags (and their env vars) over the config file over defaults.
    pub fn from_args(args: ConfigArgs) -> Result<Self> {
        let ConfigArgs {
            config,
            workspace_root: cli_workspace_root,
            debounce_ms: cli_debounce_ms,
            settle_poll_ms: cli_settle_poll_ms,
            settle_timeout_ms: cli_settle_timeout_ms,
            max_rows: cli_max_rows,
            max_cols: cli_max_cols,
            default_sheet_rows: cli_default_sheet_rows,
            default_sheet_cols: cli_default_sheet_cols,
            max_import_bytes: cli_max_import_bytes,
            log_filter: cli_log_filter,
        } = args;

        let file_config = match config.as_ref() {
            Some(path) => load_config_file(path)?,
            None => PartialConfig::default(),
        };
        let PartialConfig {
            workspace_root: file_workspace_root,
            debounce_ms: file_debounce_ms,
            settle_poll_ms: file_settle_poll_ms,
            settle_timeout_ms: file_settle_timeout_ms,
            max_rows: file_max_rows,
            max_cols: file_max_cols,
            default_sheet_rows: file_default_sheet_rows,
            default_sheet_cols: file_default_sheet_cols,
            max_import_bytes: file_max_import_bytes,
            log_filter: file_log_filter,
        } = file_config;

        let workspace_root = cli_workspace_root
            .or(file_workspace_root)
            .unwrap_or_else(|| PathBuf::from("."));
        anyhow::ensure!(
            workspace_root.is_dir(),
            "workspace root {:?} is not a directory",
            workspace_root
        );

        let max_rows = cli_max_rows
            .or(file_max_rows)
            .unwrap_or(DEFAULT_MAX_ROWS)
            .max(1);
        let max_cols = cli_max_cols
            .or(file_max_cols)
            .unwrap_or(DEFAULT_MAX_COLS)
            .max(1);

        let default_sheet_rows = cli_default_sheet_rows
            .or(file_default_sheet_rows)
            .unwrap_or(DEFAULT_SHEET_ROWS)
            .clamp(1, max_rows);
        let default_sheet_cols = cli_default_sheet_cols
            .or(file_default_sheet_cols)
            .unwrap_or(DEFAULT_SHEET_COLS)
            .clamp(1, max_cols);

        let settle_poll_ms = cli_settle_poll_ms
            .or(file_settle_poll_ms)
            .unwrap_or(DEFAULT_SETTLE_POLL_MS)
            .max(1);
        let settle_timeout_ms = cli_settle_timeout_ms
            .or(file_settle_timeout_ms)
            .unwrap_or(DEFAULT_SETTLE_TIMEOUT_MS);

        let max_import_bytes = cli_max_import_bytes
            .or(file_max_import_bytes)
            .unwrap_or(DEFAULT_MAX_IMPORT_BYTES);
        let max_import_bytes = if max_import_bytes == 0 {
            None
        } else {
            Some(max_import_bytes)
        };

        let log_filter = cli_log_filter
            .or(file_log_filter)
            .map(|filter| filter.trim().to_string())
            .filter(|filter| !filter.is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Ok(Self {
            workspace_root,
            debounce_ms: cli_debounce_ms
                .or(file_debounce_ms)
                .unwrap_or(DEFAULT_DEBOUNCE_MS),
            settle_poll_ms,
            settle_timeout_ms,
            max_rows,
            max_cols,
            default_sheet_rows,
            default_sheet_cols,
            max_import_bytes,
            log_filter,
        })
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn limits(&self) -> AddressLimits {
        AddressLimits::new(self.max_rows, self.max_cols)
    }

    pub fn settle_policy(&self) -> SettlePolicy {
        SettlePolicy {
            poll_interval: Duration::from_millis(self.settle_poll_ms),
            timeout: Duration::from_millis(self.settle_timeout_ms),
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            limits: self.limits(),
            append: AppendOptions {
                settle: self.settle_policy(),
                default_rows: self.default_sheet_rows,
                default_cols: self.default_sheet_cols,
            },
            max_import_bytes: self.max_import_bytes.unwrap_or(0),
        }
    }
}

#[derive(Args, Debug, Default, Clone)]
pub struct ConfigArgs {
    #[arg(
        long,
        global = true,
        value_name = "FILE",
        help = "Path to a YAML or JSON config file"
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        env = "SHEET_BRIDGE_WORKSPACE_ROOT",
        value_name = "DIR",
        help = "Directory every input and output path must stay inside"
    )]
    pub workspace_root: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        env = "SHEET_BRIDGE_DEBOUNCE_MS",
        value_name = "MS",
        help = "Mutation queue debounce window (default: 50)",
        value_parser = clap::value_parser!(u64)
    )]
    pub debounce_ms: Option<u64>,

    #[arg(
        long,
        global = true,
        env = "SHEET_BRIDGE_SETTLE_POLL_MS",
        value_name = "MS",
        help = "Poll interval while a new sheet registers (default: 25)",
        value_parser = clap::value_parser!(u64)
    )]
    pub settle_poll_ms: Option<u64>,

    #[arg(
        long,
        global = true,
        env = "SHEET_BRIDGE_SETTLE_TIMEOUT_MS",
        value_name = "MS",
        help = "Give up on a new sheet after this long (default: 2000)",
        value_parser = clap::value_parser!(u64)
    )]
    pub settle_timeout_ms: Option<u64>,

    #[arg(
        long,
        global = true,
        env = "SHEET_BRIDGE_MAX_ROWS",
        value_name = "N",
        help = "Row limit for addresses (default: 1048576)",
        value_parser = clap::value_parser!(u32)
    )]
    pub max_rows: Option<u32>,

    #[arg(
        long,
        global = true,
        env = "SHEET_BRIDGE_MAX_COLS",
        value_name = "N",
        help = "Column limit for addresses (default: 16384)",
        value_parser = clap::value_parser!(u32)
    )]
    pub max_cols: Option<u32>,

    #[arg(
        long,
        global = true,
        env = "SHEET_BRIDGE_DEFAULT_SHEET_ROWS",
        value_name = "N",
        help = "Row capacity of sheets created without one (default: 1000)",
        value_parser = clap::value_parser!(u32)
    )]
    pub default_sheet_rows: Option<u32>,

    #[arg(
        long,
        global = true,
        env = "SHEET_BRIDGE_DEFAULT_SHEET_COLS",
        value_name = "N",
        help = "Column capacity of sheets created without one (default: 26)",
        value_parser = clap::value_parser!(u32)
    )]
    pub default_sheet_cols: Option<u32>,

    #[arg(
        long,
        global = true,
        env = "SHEET_BRIDGE_MAX_IMPORT_BYTES",
        value_name = "BYTES",
        help = "Largest file accepted for import (default: 104857600; 0 disables)",
        value_parser = clap::value_parser!(u64)
    )]
    pub max_import_bytes: Option<u64>,

    #[arg(
        long,
        global = true,
        env = "SHEET_BRIDGE_LOG",
        value_name = "FILTER",
        help = "Default tracing filter when RUST_LOG is unset (default: info)"
    )]
    pub log_filter: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PartialConfig {
    workspace_root: Option<PathBuf>,
    debounce_ms: Option<u64>,
    settle_poll_ms: Option<u64>,
    settle_timeout_ms: Option<u64>,
    max_rows: Option<u32>,
    max_cols: Option<u32>,
    default_sheet_rows: Option<u32>,
    default_sheet_cols: Option<u32>,
    max_import_bytes: Option<u64>,
    log_filter: Option<String>,
}

fn load_config_file(path: &Path) -> Result<PartialConfig> {
    if !path.exists() {
        anyhow::bail!("config file {:?} does not exist", path);
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {:?}", path))?;
    let ext = path
        .extension()
        .and_then(|os| os.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let parsed = match ext.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse YAML config {:?}", path))?,
        "json" => serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse JSON config {:?}", path))?,
        other => anyhow::bail!("unsupported config extension: {other}"),
    };
    Ok(parsed)
}
