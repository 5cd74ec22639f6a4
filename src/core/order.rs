use crate::utils::error::{MigrateError, Result};
use std::collections::{HashMap, HashSet};

/// 宣告式的匯入順序：每張表必須排在它所引用的表之後
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyOrder {
    tables: Vec<String>,
    depends_on: HashMap<String, Vec<String>>,
}

impl DependencyOrder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 依序加入資料表與其外鍵依賴
    pub fn then<I, S>(mut self, table: impl Into<String>, depends_on: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(table, depends_on);
        self
    }

    pub fn push<I, S>(&mut self, table: impl Into<String>, depends_on: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let table = table.into();
        self.depends_on.insert(
            table.clone(),
            depends_on.into_iter().map(Into::into).collect(),
        );
        self.tables.push(table);
    }

    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    pub fn dependencies(&self, table: &str) -> &[String] {
        self.depends_on
            .get(table)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn position(&self, table: &str) -> Option<usize> {
        self.tables.iter().position(|t| t == table)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// 啟動時驗證一次：不重複、依賴完整、且每個依賴都排在前面。
    /// 依賴必須在前也就排除了循環。
    pub fn validate(&self) -> Result<()> {
        let mut seen: HashSet<&str> = HashSet::new();

        for table in &self.tables {
            for dep in self.dependencies(table) {
                if dep == table {
                    return Err(MigrateError::ConfigValidationError {
                        field: format!("tables.{}.depends_on", table),
                        message: "A table cannot depend on itself".to_string(),
                    });
                }
                if self.position(dep).is_none() {
                    return Err(MigrateError::ConfigValidationError {
                        field: format!("tables.{}.depends_on", table),
                        message: format!("Dependency '{}' is not part of the import order", dep),
                    });
                }
                if !seen.contains(dep.as_str()) {
                    return Err(MigrateError::ConfigValidationError {
                        field: format!("tables.{}.depends_on", table),
                        message: format!(
                            "'{}' must be imported after '{}', but it is listed before it",
                            table, dep
                        ),
                    });
                }
            }

            if !seen.insert(table.as_str()) {
                return Err(MigrateError::ConfigValidationError {
                    field: "tables".to_string(),
                    message: format!("Table '{}' appears more than once in the import order", table),
                });
            }
        }

        Ok(())
    }
}
