pub mod plan;

use crate::adapters::postgres::{PgTarget, DEFAULT_BATCH_SIZE, DEFAULT_SCHEMA};
use crate::adapters::snapshot::{CsvSnapshotReader, DEFAULT_FILE_PATTERN};
use crate::utils::error::{MigrateError, Result};
use crate::utils::validation::{
    validate_database_url, validate_non_empty_string, validate_path, validate_positive_number,
    Validate,
};
use plan::MigrationPlan;

pub const DEFAULT_SNAPSHOT_DIR: &str = "./migrate_data";
pub const DATABASE_URL_ENV: &str = "NEON_DATABASE_URL";

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "snapshot-migrate")]
#[command(about = "Load CSV table snapshots into PostgreSQL in foreign-key order")]
pub struct CliConfig {
    /// Directory holding the `<table>_rows.csv` snapshots
    #[arg(long)]
    pub snapshot_dir: Option<String>,

    /// Target connection string
    #[arg(long, env = "NEON_DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// Target schema
    #[arg(long)]
    pub schema: Option<String>,

    /// TOML plan overriding the built-in table order and cleaning rules
    #[arg(long)]
    pub plan: Option<String>,

    /// Rows per INSERT statement
    #[arg(long)]
    pub batch_size: Option<usize>,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,
}

/// 命令列或計畫檔能覆寫的設定
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub snapshot_dir: Option<String>,
    pub database_url: Option<String>,
    pub schema: Option<String>,
    pub batch_size: Option<usize>,
}

#[cfg(feature = "cli")]
impl From<&CliConfig> for Overrides {
    fn from(cli: &CliConfig) -> Self {
        Self {
            snapshot_dir: cli.snapshot_dir.clone(),
            database_url: cli.database_url.clone(),
            schema: cli.schema.clone(),
            batch_size: cli.batch_size,
        }
    }
}

/// 匯入器的明確設定，建構時傳入，不依賴全域狀態
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub database_url: String,
    pub schema: String,
    pub snapshot_dir: String,
    pub file_pattern: String,
    pub batch_size: usize,
}

impl LoaderConfig {
    /// 命令列優先，其次計畫檔，最後是預設值。
    /// 連線字串沒有預設值，缺少時直接回報錯誤。
    pub fn resolve(overrides: &Overrides, plan: &MigrationPlan) -> Result<Self> {
        let database_url = overrides
            .database_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .or_else(|| plan.database_url())
            .ok_or_else(|| MigrateError::MissingConfigError {
                field: "database_url".to_string(),
            })?
            .to_string();

        Ok(Self {
            database_url,
            schema: overrides
                .schema
                .clone()
                .or_else(|| plan.target.schema.clone())
                .unwrap_or_else(|| DEFAULT_SCHEMA.to_string()),
            snapshot_dir: overrides
                .snapshot_dir
                .clone()
                .or_else(|| plan.snapshots.dir.clone())
                .unwrap_or_else(|| DEFAULT_SNAPSHOT_DIR.to_string()),
            file_pattern: plan
                .snapshots
                .file_pattern
                .clone()
                .unwrap_or_else(|| DEFAULT_FILE_PATTERN.to_string()),
            batch_size: overrides
                .batch_size
                .or(plan.target.batch_size)
                .unwrap_or(DEFAULT_BATCH_SIZE),
        })
    }

    pub fn snapshot_reader(&self) -> CsvSnapshotReader {
        CsvSnapshotReader::new(&self.snapshot_dir).with_file_pattern(self.file_pattern.as_str())
    }

    /// 只解析連線字串，實際連線延後到第一次寫入
    pub fn target(&self) -> Result<PgTarget> {
        PgTarget::new(&self.database_url, self.schema.as_str(), self.batch_size)
    }
}

impl Validate for LoaderConfig {
    fn validate(&self) -> Result<()> {
        validate_database_url("database_url", &self.database_url)?;
        validate_non_empty_string("schema", &self.schema)?;
        validate_path("snapshot_dir", &self.snapshot_dir)?;
        validate_positive_number("batch_size", self.batch_size, 1)?;

        if !self.file_pattern.contains("{table}") {
            return Err(MigrateError::InvalidConfigValueError {
                field: "snapshots.file_pattern".to_string(),
                value: self.file_pattern.clone(),
                reason: "Pattern must contain the {table} placeholder".to_string(),
            });
        }

        Ok(())
    }
}
