use crate::core::{Record, Snapshot, SnapshotSource};
use crate::utils::error::{MigrateError, Result};
use std::path::{Path, PathBuf};

pub const DEFAULT_FILE_PATTERN: &str = "{table}_rows.csv";

/// 從固定目錄讀取 `<table>_rows.csv` 匯出檔
#[derive(Debug, Clone)]
pub struct CsvSnapshotReader {
    base_path: PathBuf,
    file_pattern: String,
}

impl CsvSnapshotReader {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            file_pattern: DEFAULT_FILE_PATTERN.to_string(),
        }
    }

    pub fn with_file_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.file_pattern = pattern.into();
        self
    }

    pub fn path_for(&self, table: &str) -> PathBuf {
        self.base_path
            .join(self.file_pattern.replace("{table}", table))
    }

    fn parse(table: &str, path: &Path) -> Result<Snapshot> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_path(path)?;

        let columns: Vec<String> = reader
            .headers()
            .map_err(|e| MigrateError::snapshot(table, e.to_string()))?
            .iter()
            .map(str::to_string)
            .collect();

        let mut records = Vec::new();
        for row in reader.records() {
            let row = row.map_err(|e| MigrateError::snapshot(table, e.to_string()))?;
            // 空欄位視為 NULL
            let record: Record = columns
                .iter()
                .zip(row.iter())
                .map(|(column, field)| {
                    let value = if field.is_empty() {
                        serde_json::Value::Null
                    } else {
                        serde_json::Value::String(field.to_string())
                    };
                    (column.clone(), value)
                })
                .collect();
            records.push(record);
        }

        Ok(Snapshot::new(table, columns, records))
    }
}

impl SnapshotSource for CsvSnapshotReader {
    fn exists(&self, table: &str) -> bool {
        self.path_for(table).is_file()
    }

    async fn read(&self, table: &str) -> Result<Option<Snapshot>> {
        let path = self.path_for(table);
        if !path.is_file() {
            return Ok(None);
        }

        tracing::debug!("Reading snapshot {} from {}", table, path.display());
        let snapshot = Self::parse(table, &path)?;
        tracing::debug!(
            "Snapshot {}: {} rows, {} columns",
            table,
            snapshot.len(),
            snapshot.columns.len()
        );
        Ok(Some(snapshot))
    }
}
