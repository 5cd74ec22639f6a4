use crate::core::{
    cleaning::CleaningPlan, report::RunReport, verify::verify_counts, CleaningContext,
    DependencyOrder, SnapshotSource, TableOutcome, TableStatus, TargetStore,
};
use std::time::Instant;

/// 依外鍵順序逐表匯入：讀取 → 清洗 → 寫入 → 統計。
/// 單表失敗只記錄在該表，後續資料表照常執行。
pub struct Loader<S: SnapshotSource, T: TargetStore> {
    source: S,
    target: T,
    order: DependencyOrder,
    cleaning: CleaningPlan,
}

impl<S: SnapshotSource, T: TargetStore> Loader<S, T> {
    pub fn new(source: S, target: T, order: DependencyOrder, cleaning: CleaningPlan) -> Self {
        Self {
            source,
            target,
            order,
            cleaning,
        }
    }

    /// 執行完整匯入與驗證；本身不會失敗
    pub async fn run(&self) -> RunReport {
        let mut report = RunReport::new();
        let context = self.load_references().await;

        tracing::info!(
            "🚀 Importing {} tables ({} reference snapshots preloaded)",
            self.order.len(),
            context.reference_count()
        );

        for table in self.order.tables() {
            let outcome = self.load_table(table, &context).await;
            report.record(outcome);
        }

        report.verifications = verify_counts(&self.target, &self.order).await;
        report
    }

    /// 外鍵檢查用的父表只讀一次，之後所有子表共用
    async fn load_references(&self) -> CleaningContext {
        let mut context = CleaningContext::new();

        for table in self.cleaning.reference_tables() {
            match self.source.read(&table).await {
                Ok(Some(snapshot)) => {
                    tracing::debug!("🔗 Reference snapshot {}: {} rows", table, snapshot.len());
                    context.add_reference(snapshot);
                }
                Ok(None) => {
                    tracing::info!(
                        "🔗 Reference snapshot {} not found, orphan checks against it are skipped",
                        table
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        "🔗 Reference snapshot {} unreadable, orphan checks against it are skipped: {}",
                        table,
                        e
                    );
                }
            }
        }

        context
    }

    async fn load_table(&self, table: &str, context: &CleaningContext) -> TableOutcome {
        let start = Instant::now();
        let mut diagnostics = Vec::new();
        let status = self.process_table(table, context, &mut diagnostics).await;

        TableOutcome {
            table: table.to_string(),
            status,
            diagnostics,
            duration: start.elapsed(),
        }
    }

    async fn process_table(
        &self,
        table: &str,
        context: &CleaningContext,
        diagnostics: &mut Vec<String>,
    ) -> TableStatus {
        if !self.source.exists(table) {
            tracing::info!("⏭ {}: snapshot file not found, skipping", table);
            return TableStatus::SkippedNoFile;
        }

        tracing::info!("📦 Importing {}...", table);

        let snapshot = match self.source.read(table).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                tracing::info!("⏭ {}: snapshot file not found, skipping", table);
                return TableStatus::SkippedNoFile;
            }
            Err(e) => {
                tracing::error!("  ❌ {}: import failed - {}", table, e);
                return TableStatus::Failed {
                    error: e.to_string(),
                };
            }
        };

        let original = snapshot.len();
        let cleaned = self.cleaning.clean(snapshot, context);
        for line in &cleaned.diagnostics {
            tracing::warn!("  {}", line);
        }
        diagnostics.extend(cleaned.diagnostics);

        let snapshot = cleaned.snapshot;
        if snapshot.is_empty() {
            tracing::info!("  ⏭ {}: no rows left after cleaning, skipping", table);
            return TableStatus::SkippedEmptyAfterClean { original };
        }

        match self
            .target
            .insert_rows(table, &snapshot.columns, &snapshot.records)
            .await
        {
            Ok(loaded) => {
                tracing::info!("  ✅ {}: imported {}/{} rows", table, loaded, original);
                TableStatus::Loaded { loaded, original }
            }
            Err(e) => {
                tracing::error!("  ❌ {}: import failed - {}", table, e);
                TableStatus::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cleaning::{OrphanReference, OrphanScope};
    use crate::core::{Record, Snapshot, VerifiedCount};
    use crate::utils::error::{MigrateError, Result};
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    const NONE: [&str; 0] = [];

    #[derive(Clone, Default)]
    struct MemorySource {
        snapshots: HashMap<String, Snapshot>,
        malformed: Vec<String>,
    }

    impl MemorySource {
        fn with(mut self, table: &str, columns: &[&str], rows: &[&[&str]]) -> Self {
            let records = rows
                .iter()
                .map(|row| {
                    columns
                        .iter()
                        .zip(row.iter())
                        .map(|(c, v)| {
                            let value = if v.is_empty() {
                                serde_json::Value::Null
                            } else {
                                serde_json::Value::from(*v)
                            };
                            (c.to_string(), value)
                        })
                        .collect::<Record>()
                })
                .collect();
            self.snapshots.insert(
                table.to_string(),
                Snapshot::new(table, columns.iter().map(|c| c.to_string()).collect(), records),
            );
            self
        }

        fn with_malformed(mut self, table: &str) -> Self {
            self.malformed.push(table.to_string());
            self
        }
    }

    impl SnapshotSource for MemorySource {
        fn exists(&self, table: &str) -> bool {
            self.snapshots.contains_key(table) || self.malformed.iter().any(|t| t == table)
        }

        async fn read(&self, table: &str) -> Result<Option<Snapshot>> {
            if self.malformed.iter().any(|t| t == table) {
                return Err(MigrateError::snapshot(table, "unterminated quote"));
            }
            Ok(self.snapshots.get(table).cloned())
        }
    }

    #[derive(Clone, Default)]
    struct MockTarget {
        tables: Arc<Mutex<HashMap<String, Vec<Record>>>>,
        attempts: Arc<Mutex<Vec<String>>>,
        fail_on: Vec<String>,
    }

    #[async_trait::async_trait]
    impl TargetStore for MockTarget {
        async fn insert_rows(
            &self,
            table: &str,
            _columns: &[String],
            records: &[Record],
        ) -> Result<u64> {
            self.attempts.lock().await.push(table.to_string());
            if self.fail_on.iter().any(|t| t == table) {
                return Err(MigrateError::insert(table, "simulated failure"));
            }
            let mut tables = self.tables.lock().await;
            tables
                .entry(table.to_string())
                .or_default()
                .extend(records.iter().cloned());
            Ok(records.len() as u64)
        }

        async fn row_count(&self, table: &str) -> Result<i64> {
            let tables = self.tables.lock().await;
            tables
                .get(table)
                .map(|rows| rows.len() as i64)
                .ok_or_else(|| MigrateError::insert(table, "relation does not exist"))
        }
    }

    fn order() -> DependencyOrder {
        DependencyOrder::new()
            .then("prompts", NONE)
            .then("tags", NONE)
            .then("favorites", ["prompts"])
    }

    fn cleaning() -> CleaningPlan {
        CleaningPlan::new()
            .with_rule("favorites", OrphanReference::new("prompt_id", "prompts", "id"))
            .with_rule("tags", OrphanScope::new(["team_id", "user_id"]))
    }

    #[tokio::test]
    async fn test_run_loads_cleaned_tables_in_order() {
        let source = MemorySource::default()
            .with("prompts", &["id"], &[&["1"], &["2"], &["3"]])
            .with("tags", &["id", "team_id", "user_id"], &[&["t1", "A", ""], &["t2", "", ""]])
            .with(
                "favorites",
                &["id", "prompt_id"],
                &[&["f1", "1"], &["f2", "2"], &["f3", "4"], &["f4", "5"]],
            );
        let target = MockTarget::default();
        let loader = Loader::new(source, target.clone(), order(), cleaning());

        let report = loader.run().await;

        assert_eq!(*target.attempts.lock().await, vec!["prompts", "tags", "favorites"]);
        assert_eq!(
            report.outcome("favorites").unwrap().status,
            TableStatus::Loaded {
                loaded: 2,
                original: 4
            }
        );
        assert_eq!(report.outcome("favorites").unwrap().diagnostics.len(), 1);
        assert_eq!(
            report.outcome("tags").unwrap().status,
            TableStatus::Loaded {
                loaded: 1,
                original: 2
            }
        );
        assert_eq!(report.tally().loaded, 3);
        assert_eq!(report.verifications[2].count, VerifiedCount::Count(2));
    }

    #[tokio::test]
    async fn test_failure_does_not_block_later_tables() {
        let source = MemorySource::default()
            .with("prompts", &["id"], &[&["1"]])
            .with("tags", &["id", "team_id", "user_id"], &[&["t1", "A", ""]])
            .with("favorites", &["id", "prompt_id"], &[&["f1", "1"]]);
        let target = MockTarget {
            fail_on: vec!["prompts".to_string()],
            ..Default::default()
        };
        let loader = Loader::new(source, target.clone(), order(), cleaning());

        let report = loader.run().await;

        assert_eq!(*target.attempts.lock().await, vec!["prompts", "tags", "favorites"]);
        assert!(matches!(
            report.outcome("prompts").unwrap().status,
            TableStatus::Failed { .. }
        ));
        let tally = report.tally();
        assert_eq!((tally.loaded, tally.skipped, tally.failed), (2, 0, 1));
        assert!(matches!(
            report.verifications[0].count,
            VerifiedCount::QueryFailed(_)
        ));
    }

    #[tokio::test]
    async fn test_missing_and_emptied_tables_are_skipped() {
        let source = MemorySource::default()
            .with("prompts", &["id"], &[&["1"]])
            .with("favorites", &["id", "prompt_id"], &[&["f1", "9"]]);
        let target = MockTarget::default();
        let loader = Loader::new(source, target.clone(), order(), cleaning());

        let report = loader.run().await;

        assert_eq!(report.outcome("tags").unwrap().status, TableStatus::SkippedNoFile);
        assert_eq!(
            report.outcome("favorites").unwrap().status,
            TableStatus::SkippedEmptyAfterClean { original: 1 }
        );
        assert_eq!(*target.attempts.lock().await, vec!["prompts"]);
        // 沒有檔案的表仍然會做計數查詢
        assert_eq!(report.verifications.len(), 3);
        assert_eq!(report.verifications[1].table, "tags");
    }

    #[tokio::test]
    async fn test_malformed_snapshot_fails_only_that_table() {
        let source = MemorySource::default()
            .with("prompts", &["id"], &[&["1"]])
            .with_malformed("tags")
            .with("favorites", &["id", "prompt_id"], &[&["f1", "1"]]);
        let loader = Loader::new(source, MockTarget::default(), order(), cleaning());

        let report = loader.run().await;

        assert!(matches!(
            report.outcome("tags").unwrap().status,
            TableStatus::Failed { .. }
        ));
        assert!(matches!(
            report.outcome("favorites").unwrap().status,
            TableStatus::Loaded { .. }
        ));
    }

    #[tokio::test]
    async fn test_misnamed_rule_columns_keep_table_rows() {
        let source = MemorySource::default()
            .with("prompts", &["id"], &[&["1"]])
            .with("tags", &["id", "name"], &[&["t1", "x"], &["t2", "y"]])
            .with("favorites", &["id", "promptid"], &[&["f1", "1"], &["f2", "9"]]);
        let target = MockTarget::default();
        let loader = Loader::new(source, target.clone(), order(), cleaning());

        let report = loader.run().await;

        assert_eq!(
            report.outcome("tags").unwrap().status,
            TableStatus::Loaded {
                loaded: 2,
                original: 2
            }
        );
        let favorites = report.outcome("favorites").unwrap();
        assert_eq!(
            favorites.status,
            TableStatus::Loaded {
                loaded: 2,
                original: 2
            }
        );
        assert!(favorites.diagnostics[0].contains("column prompt_id missing"));
        assert_eq!(report.tally().skipped, 0);
    }

    #[tokio::test]
    async fn test_missing_parent_skips_reference_check() {
        let source = MemorySource::default()
            .with("favorites", &["id", "prompt_id"], &[&["f1", "404"]]);
        let target = MockTarget::default();
        let loader = Loader::new(source, target, order(), cleaning());

        let report = loader.run().await;

        assert_eq!(
            report.outcome("favorites").unwrap().status,
            TableStatus::Loaded {
                loaded: 1,
                original: 1
            }
        );
    }
}
