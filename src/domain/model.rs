use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// 一筆資料列：欄位名稱對應值（CSV 匯出只會有字串或 Null）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub data: HashMap<String, serde_json::Value>,
}

impl Record {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
        }
    }

    /// 欄位不存在與值為 Null 視為相同
    pub fn is_null(&self, column: &str) -> bool {
        self.data
            .get(column)
            .map_or(true, serde_json::Value::is_null)
    }

    /// 取出可比較的鍵值；Null 回傳 None
    pub fn key(&self, column: &str) -> Option<String> {
        self.data.get(column).and_then(value_key)
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Into<String>, V: Into<serde_json::Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            data: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

pub fn value_key(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// 單一資料表的匯出快照
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub table: String,
    pub columns: Vec<String>,
    pub records: Vec<Record>,
}

impl Snapshot {
    pub fn new(table: impl Into<String>, columns: Vec<String>, records: Vec<Record>) -> Self {
        Self {
            table: table.into(),
            columns,
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}

/// 清洗結果
#[derive(Debug, Clone)]
pub struct CleaningResult {
    pub snapshot: Snapshot,
    pub removed: usize,
    pub diagnostics: Vec<String>,
}

impl CleaningResult {
    pub fn unchanged(snapshot: Snapshot) -> Self {
        Self {
            snapshot,
            removed: 0,
            diagnostics: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableStatus {
    Loaded { loaded: u64, original: usize },
    SkippedNoFile,
    SkippedEmptyAfterClean { original: usize },
    Failed { error: String },
}

impl TableStatus {
    pub fn label(&self) -> &'static str {
        match self {
            TableStatus::Loaded { .. } => "loaded",
            TableStatus::SkippedNoFile => "skipped-no-file",
            TableStatus::SkippedEmptyAfterClean { .. } => "skipped-empty-after-clean",
            TableStatus::Failed { .. } => "failed",
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(
            self,
            TableStatus::SkippedNoFile | TableStatus::SkippedEmptyAfterClean { .. }
        )
    }
}

#[derive(Debug, Clone)]
pub struct TableOutcome {
    pub table: String,
    pub status: TableStatus,
    pub diagnostics: Vec<String>,
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifiedCount {
    Count(i64),
    QueryFailed(String),
}

#[derive(Debug, Clone)]
pub struct TableVerification {
    pub table: String,
    pub count: VerifiedCount,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_record_missing_column_is_null() {
        let record: Record = [("id", Value::from("1")), ("team_id", Value::Null)]
            .into_iter()
            .collect();
        assert!(record.is_null("team_id"));
        assert!(record.is_null("user_id"));
        assert!(!record.is_null("id"));
        assert_eq!(record.key("id"), Some("1".to_string()));
        assert_eq!(record.key("team_id"), None);
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(TableStatus::SkippedNoFile.label(), "skipped-no-file");
        assert!(TableStatus::SkippedEmptyAfterClean { original: 3 }.is_skipped());
        assert!(!TableStatus::Failed {
            error: "boom".to_string()
        }
        .is_skipped());
    }
}
