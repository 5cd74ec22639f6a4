use crate::core::{CleaningContext, CleaningResult, CleaningRule, Snapshot};
use std::collections::{HashMap, HashSet};

/// 子表外鍵必須指向父表快照中存在的鍵，否則整列移除
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanReference {
    pub column: String,
    pub parent_table: String,
    pub parent_column: String,
}

impl OrphanReference {
    pub fn new(
        column: impl Into<String>,
        parent_table: impl Into<String>,
        parent_column: impl Into<String>,
    ) -> Self {
        Self {
            column: column.into(),
            parent_table: parent_table.into(),
            parent_column: parent_column.into(),
        }
    }
}

impl CleaningRule for OrphanReference {
    fn name(&self) -> &'static str {
        "orphan_reference"
    }

    fn apply(&self, mut snapshot: Snapshot, context: &CleaningContext) -> CleaningResult {
        let Some(parent) = context.reference(&self.parent_table) else {
            tracing::debug!(
                "{}: parent snapshot '{}' unavailable, skipping reference check on {}",
                snapshot.table,
                self.parent_table,
                self.column
            );
            return CleaningResult::unchanged(snapshot);
        };

        if !snapshot.has_column(&self.column) {
            return skipped(snapshot, format!("column {} missing", self.column));
        }
        if !parent.has_column(&self.parent_column) {
            return skipped(
                snapshot,
                format!("column {}.{} missing", self.parent_table, self.parent_column),
            );
        }

        let valid_keys: HashSet<String> = parent
            .records
            .iter()
            .filter_map(|r| r.key(&self.parent_column))
            .collect();

        let before = snapshot.len();
        // Null 外鍵同樣視為孤兒
        snapshot.records.retain(|r| {
            r.key(&self.column)
                .is_some_and(|key| valid_keys.contains(&key))
        });
        let removed = before - snapshot.len();

        let mut diagnostics = Vec::new();
        if removed > 0 {
            diagnostics.push(format!(
                "⚠ {}: removed {} orphan rows ({} references missing {}.{})",
                snapshot.table, removed, self.column, self.parent_table, self.parent_column
            ));
        }

        CleaningResult {
            snapshot,
            removed,
            diagnostics,
        }
    }

    fn reference_table(&self) -> Option<&str> {
        Some(&self.parent_table)
    }
}

/// 規則欄位不存在時無法驗證，原樣保留並留下警告
fn skipped(snapshot: Snapshot, reason: String) -> CleaningResult {
    let diagnostic = format!("⚠ {}: {}, reference check skipped", snapshot.table, reason);
    CleaningResult {
        snapshot,
        removed: 0,
        diagnostics: vec![diagnostic],
    }
}

/// 多型範圍表：至少要有一個範圍欄位非 Null
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanScope {
    pub columns: Vec<String>,
}

impl OrphanScope {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }
}

impl CleaningRule for OrphanScope {
    fn name(&self) -> &'static str {
        "orphan_scope"
    }

    fn apply(&self, mut snapshot: Snapshot, _context: &CleaningContext) -> CleaningResult {
        if !self.columns.iter().any(|c| snapshot.has_column(c)) {
            return skipped(
                snapshot,
                format!("columns {} missing", self.columns.join(" and ")),
            );
        }

        let before = snapshot.len();
        snapshot
            .records
            .retain(|r| self.columns.iter().any(|c| !r.is_null(c)));
        let removed = before - snapshot.len();

        let mut diagnostics = Vec::new();
        if removed > 0 {
            diagnostics.push(format!(
                "⚠ {}: removed {} orphan rows ({} all null)",
                snapshot.table,
                removed,
                self.columns.join(" and ")
            ));
        }

        CleaningResult {
            snapshot,
            removed,
            diagnostics,
        }
    }
}

/// 目標 schema 需要但匯出缺少的欄位，從既有欄位複製
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnBackfill {
    pub column: String,
    pub source: String,
}

impl ColumnBackfill {
    pub fn new(column: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            source: source.into(),
        }
    }
}

impl CleaningRule for ColumnBackfill {
    fn name(&self) -> &'static str {
        "backfill"
    }

    fn apply(&self, mut snapshot: Snapshot, _context: &CleaningContext) -> CleaningResult {
        if snapshot.has_column(&self.column) {
            return CleaningResult::unchanged(snapshot);
        }

        let source_present = snapshot.has_column(&self.source);
        for record in &mut snapshot.records {
            let value = record
                .data
                .get(&self.source)
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            record.data.insert(self.column.clone(), value);
        }
        snapshot.columns.push(self.column.clone());

        let diagnostic = if source_present {
            format!(
                "⚠ {}: backfilled column {} from {}",
                snapshot.table, self.column, self.source
            )
        } else {
            format!(
                "⚠ {}: backfilled column {} with NULL ({} is also missing)",
                snapshot.table, self.column, self.source
            )
        };

        CleaningResult {
            snapshot,
            removed: 0,
            diagnostics: vec![diagnostic],
        }
    }
}

/// 資料表名稱 → 依序套用的清洗規則
#[derive(Debug, Default)]
pub struct CleaningPlan {
    rules: HashMap<String, Vec<Box<dyn CleaningRule>>>,
}

impl CleaningPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rule(&mut self, table: impl Into<String>, rule: Box<dyn CleaningRule>) {
        self.rules.entry(table.into()).or_default().push(rule);
    }

    pub fn with_rule(mut self, table: impl Into<String>, rule: impl CleaningRule + 'static) -> Self {
        self.add_rule(table, Box::new(rule));
        self
    }

    pub fn rules_for(&self, table: &str) -> &[Box<dyn CleaningRule>] {
        self.rules.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 所有需要預先載入的父表，依名稱排序且不重複
    pub fn reference_tables(&self) -> Vec<String> {
        let mut tables: Vec<String> = self
            .rules
            .values()
            .flatten()
            .filter_map(|rule| rule.reference_table().map(str::to_string))
            .collect();
        tables.sort();
        tables.dedup();
        tables
    }

    pub fn clean(&self, snapshot: Snapshot, context: &CleaningContext) -> CleaningResult {
        let table = snapshot.table.clone();
        let mut result = CleaningResult::unchanged(snapshot);

        for rule in self.rules_for(&table) {
            let step = rule.apply(result.snapshot, context);
            tracing::debug!(
                "{}: rule {} removed {} rows",
                table,
                rule.name(),
                step.removed
            );
            result.snapshot = step.snapshot;
            result.removed += step.removed;
            result.diagnostics.extend(step.diagnostics);
        }

        result
    }
}
