use crate::domain::model::{CleaningResult, Record, Snapshot};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// 快照來源：找不到檔案時回傳 `Ok(None)`，格式錯誤才回傳 Err
pub trait SnapshotSource: Send + Sync {
    fn exists(&self, table: &str) -> bool;
    fn read(
        &self,
        table: &str,
    ) -> impl std::future::Future<Output = Result<Option<Snapshot>>> + Send;
}

/// 目標資料庫：只允許追加寫入與計數查詢
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// 追加寫入，回傳實際寫入的筆數
    async fn insert_rows(&self, table: &str, columns: &[String], records: &[Record])
        -> Result<u64>;

    async fn row_count(&self, table: &str) -> Result<i64>;
}

/// 清洗規則共用的上下文：預先載入的父表快照
#[derive(Debug, Clone, Default)]
pub struct CleaningContext {
    references: HashMap<String, Snapshot>,
}

impl CleaningContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_reference(&mut self, snapshot: Snapshot) {
        self.references.insert(snapshot.table.clone(), snapshot);
    }

    pub fn reference(&self, table: &str) -> Option<&Snapshot> {
        self.references.get(table)
    }

    pub fn reference_count(&self) -> usize {
        self.references.len()
    }
}

/// 清洗規則；永遠不會失敗，只會降級資料並留下診斷訊息
pub trait CleaningRule: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    fn apply(&self, snapshot: Snapshot, context: &CleaningContext) -> CleaningResult;

    /// 此規則需要預先載入的父表
    fn reference_table(&self) -> Option<&str> {
        None
    }
}
