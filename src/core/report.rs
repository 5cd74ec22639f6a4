use crate::core::{TableOutcome, TableStatus, TableVerification, VerifiedCount};
use chrono::{DateTime, Local};
use std::fmt::Write;
use std::time::Duration;

const RULE_WIDTH: usize = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub loaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// 單次執行的彙總結果，只存在於本次輸出
#[derive(Debug, Clone)]
pub struct RunReport {
    pub started_at: DateTime<Local>,
    pub outcomes: Vec<TableOutcome>,
    pub verifications: Vec<TableVerification>,
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            started_at: Local::now(),
            outcomes: Vec::new(),
            verifications: Vec::new(),
        }
    }

    pub fn record(&mut self, outcome: TableOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn outcome(&self, table: &str) -> Option<&TableOutcome> {
        self.outcomes.iter().find(|o| o.table == table)
    }

    pub fn tally(&self) -> Tally {
        self.outcomes
            .iter()
            .fold(Tally::default(), |mut tally, outcome| {
                if outcome.status.is_skipped() {
                    tally.skipped += 1;
                } else if matches!(outcome.status, TableStatus::Failed { .. }) {
                    tally.failed += 1;
                } else {
                    tally.loaded += 1;
                }
                tally
            })
    }

    pub fn total_duration(&self) -> Duration {
        self.outcomes.iter().map(|o| o.duration).sum()
    }

    /// 兩段式摘要：統計列 + 各表驗證行數
    pub fn render(&self) -> String {
        let tally = self.tally();
        let rule = "=".repeat(RULE_WIDTH);
        let mut out = String::new();

        let _ = writeln!(out);
        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(
            out,
            "Import finished: ✅ loaded {} | ⏭ skipped {} | ❌ failed {}",
            tally.loaded, tally.skipped, tally.failed
        );
        let _ = writeln!(
            out,
            "Started {} | elapsed {:.1?}",
            self.started_at.format("%Y-%m-%d %H:%M:%S"),
            self.total_duration()
        );
        let _ = writeln!(out, "{}", rule);

        let _ = writeln!(out);
        let _ = writeln!(out, "📊 Target row counts:");
        for verification in &self.verifications {
            match &verification.count {
                VerifiedCount::Count(n) => {
                    let _ = writeln!(out, "  {}: {} rows", verification.table, n);
                }
                VerifiedCount::QueryFailed(_) => {
                    let _ = writeln!(out, "  {}: query failed", verification.table);
                }
            }
        }

        out
    }

    /// 機器可讀的摘要，供 JSON 日誌使用
    pub fn summary_json(&self) -> serde_json::Value {
        let tally = self.tally();
        let tables: Vec<serde_json::Value> = self
            .outcomes
            .iter()
            .map(|o| {
                let mut entry = serde_json::json!({
                    "table": o.table,
                    "status": o.status.label(),
                    "duration_ms": o.duration.as_millis() as u64,
                });
                match &o.status {
                    TableStatus::Loaded { loaded, original } => {
                        entry["loaded"] = (*loaded).into();
                        entry["original"] = (*original).into();
                    }
                    TableStatus::SkippedEmptyAfterClean { original } => {
                        entry["original"] = (*original).into();
                    }
                    TableStatus::Failed { error } => {
                        entry["error"] = error.clone().into();
                    }
                    TableStatus::SkippedNoFile => {}
                }
                entry
            })
            .collect();

        serde_json::json!({
            "started_at": self.started_at.to_rfc3339(),
            "loaded": tally.loaded,
            "skipped": tally.skipped,
            "failed": tally.failed,
            "tables": tables,
        })
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}
