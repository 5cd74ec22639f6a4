//! PostgreSQL target: append-only inserts and row-count verification.

use crate::core::{Record, TargetStore};
use crate::utils::error::{MigrateError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_postgres::config::SslMode;
use tokio_postgres::{Client, Config as PgConfig, NoTls};
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{debug, error, info};

pub const DEFAULT_SCHEMA: &str = "public";
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// 整個執行期間只共用一條連線。
/// 連線在第一次使用時建立，連不上時由該次呼叫的資料表承擔失敗。
pub struct PgTarget {
    config: PgConfig,
    schema: String,
    batch_size: usize,
    client: Mutex<Option<Client>>,
}

impl PgTarget {
    pub fn new(database_url: &str, schema: impl Into<String>, batch_size: usize) -> Result<Self> {
        let config: PgConfig = database_url
            .parse()
            .map_err(|e: tokio_postgres::Error| MigrateError::InvalidConfigValueError {
                field: "database_url".to_string(),
                value: crate::utils::validation::redact_url(database_url),
                reason: e.to_string(),
            })?;

        Ok(Self {
            config,
            schema: schema.into(),
            batch_size: batch_size.max(1),
            client: Mutex::new(None),
        })
    }

    async fn connect(&self) -> Result<Client> {
        let hosts = self.config.get_hosts().len();
        let client = if matches!(self.config.get_ssl_mode(), SslMode::Disable) {
            let (client, connection) = self.config.connect(NoTls).await?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    error!("PostgreSQL connection error: {}", e);
                }
            });
            client
        } else {
            let (client, connection) = self.config.connect(tls_connector()?).await?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    error!("PostgreSQL connection error: {}", e);
                }
            });
            client
        };

        info!(
            "Connected to PostgreSQL ({} host(s), database {})",
            hosts,
            self.config.get_dbname().unwrap_or("<default>")
        );
        Ok(client)
    }

    fn qualify(&self, table: &str) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(table))
    }
}

#[async_trait]
impl TargetStore for PgTarget {
    async fn insert_rows(
        &self,
        table: &str,
        columns: &[String],
        records: &[Record],
    ) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut guard = self.client.lock().await;
        if guard.is_none() {
            *guard = Some(self.connect().await?);
        }
        let client = guard
            .as_mut()
            .ok_or_else(|| MigrateError::insert(table, "connection unavailable"))?;

        // 同一張表的所有批次放在同一個交易，表層級要嘛全進要嘛全不進
        let transaction = client.transaction().await?;
        let qualified = self.qualify(table);
        let mut inserted = 0u64;

        for chunk in records.chunks(self.batch_size) {
            let sql = build_insert_sql(&qualified, columns, chunk);
            inserted += transaction
                .execute(sql.as_str(), &[])
                .await
                .map_err(|e| MigrateError::insert(table, describe_pg_error(&e)))?;
            debug!("{}: inserted batch of {} rows", table, chunk.len());
        }

        transaction.commit().await?;
        Ok(inserted)
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        let mut guard = self.client.lock().await;
        if guard.is_none() {
            *guard = Some(self.connect().await?);
        }
        let client = guard
            .as_ref()
            .ok_or_else(|| MigrateError::insert(table, "connection unavailable"))?;

        let sql = format!("SELECT COUNT(*) FROM {}", self.qualify(table));
        let row = client.query_one(sql.as_str(), &[]).await?;
        Ok(row.get(0))
    }
}

fn tls_connector() -> Result<MakeRustlsConnect> {
    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| MigrateError::TlsError(e.to_string()))?
    .with_root_certificates(root_store)
    .with_no_client_auth();

    Ok(MakeRustlsConnect::new(config))
}

/// 資料庫錯誤通常把細節放在 DbError 裡
fn describe_pg_error(e: &tokio_postgres::Error) -> String {
    match e.as_db_error() {
        Some(db) => match db.detail() {
            Some(detail) => format!("{} ({})", db.message(), detail),
            None => db.message().to_string(),
        },
        None => e.to_string(),
    }
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn value_to_literal(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        other => format!("'{}'", other.to_string().replace('\'', "''")),
    }
}

/// 多列 INSERT，所有值都以未定型字面值送出，由目標欄位型別決定轉換
pub fn build_insert_sql(qualified_table: &str, columns: &[String], records: &[Record]) -> String {
    let col_list = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");

    let value_rows: Vec<String> = records
        .iter()
        .map(|record| {
            let values: Vec<String> = columns
                .iter()
                .map(|c| {
                    record
                        .data
                        .get(c)
                        .map_or_else(|| "NULL".to_string(), value_to_literal)
                })
                .collect();
            format!("({})", values.join(", "))
        })
        .collect();

    format!(
        "INSERT INTO {} ({}) VALUES {}",
        qualified_table,
        col_list,
        value_rows.join(", ")
    )
}
