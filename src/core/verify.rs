use crate::core::{DependencyOrder, TableVerification, TargetStore, VerifiedCount};

/// 匯入後逐表查詢行數；失敗只記錄，不會中止流程
pub async fn verify_counts<T: TargetStore>(
    target: &T,
    order: &DependencyOrder,
) -> Vec<TableVerification> {
    let mut verifications = Vec::with_capacity(order.len());

    for table in order.tables() {
        let count = match target.row_count(table).await {
            Ok(count) => VerifiedCount::Count(count),
            Err(e) => {
                tracing::warn!("📊 {}: count query failed - {}", table, e);
                VerifiedCount::QueryFailed(e.to_string())
            }
        };
        verifications.push(TableVerification {
            table: table.clone(),
            count,
        });
    }

    verifications
}
