use crate::core::cleaning::{CleaningPlan, ColumnBackfill, OrphanReference, OrphanScope};
use crate::core::{CleaningRule, DependencyOrder};
use crate::utils::error::{MigrateError, Result};
use crate::utils::validation::{validate_non_empty_string, Validate};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// 匯入計畫：資料表順序、外鍵依賴與各表的清洗規則
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationPlan {
    #[serde(default)]
    pub target: TargetSection,
    #[serde(default)]
    pub snapshots: SnapshotSection,
    pub tables: Vec<TableDefinition>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetSection {
    pub database_url: Option<String>,
    pub schema: Option<String>,
    pub batch_size: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotSection {
    pub dir: Option<String>,
    pub file_pattern: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub name: String,
    /// 僅供閱讀的分層編號，順序以清單本身為準
    pub tier: Option<u32>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleDefinition {
    OrphanReference {
        column: String,
        parent_table: String,
        #[serde(default = "default_parent_column")]
        parent_column: String,
    },
    OrphanScope {
        columns: Vec<String>,
    },
    Backfill {
        column: String,
        source: String,
    },
}

fn default_parent_column() -> String {
    "id".to_string()
}

impl RuleDefinition {
    pub fn build(&self) -> Box<dyn CleaningRule> {
        match self {
            RuleDefinition::OrphanReference {
                column,
                parent_table,
                parent_column,
            } => Box::new(OrphanReference::new(
                column.as_str(),
                parent_table.as_str(),
                parent_column.as_str(),
            )),
            RuleDefinition::OrphanScope { columns } => {
                Box::new(OrphanScope::new(columns.iter().cloned()))
            }
            RuleDefinition::Backfill { column, source } => {
                Box::new(ColumnBackfill::new(column.as_str(), source.as_str()))
            }
        }
    }
}

impl TableDefinition {
    fn new(name: &str, tier: u32, depends_on: &[&str], rules: Vec<RuleDefinition>) -> Self {
        Self {
            name: name.to_string(),
            tier: Some(tier),
            depends_on: depends_on.iter().map(|d| d.to_string()).collect(),
            rules,
        }
    }
}

impl MigrationPlan {
    /// 從 TOML 檔案載入計畫
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析計畫
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| MigrateError::ConfigValidationError {
            field: "plan".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${NEON_DATABASE_URL})；找不到的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| MigrateError::ConfigValidationError {
            field: "plan".to_string(),
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// 內建計畫：PromptMinder 匯出資料的表順序與清洗規則
    pub fn builtin() -> Self {
        let tables = vec![
            // 第 1 層：沒有外鍵
            TableDefinition::new("teams", 1, &[], vec![]),
            TableDefinition::new("public_prompts", 1, &[], vec![]),
            TableDefinition::new("prompt_contributions", 1, &[], vec![]),
            TableDefinition::new("user_feedback", 1, &[], vec![]),
            TableDefinition::new("provider_keys", 1, &[], vec![]),
            // 第 2 層：依賴 teams
            TableDefinition::new("team_members", 2, &["teams"], vec![]),
            TableDefinition::new("prompts", 2, &["teams"], vec![]),
            // 第 3 層：依賴第 2 層
            TableDefinition::new(
                "tags",
                3,
                &["teams"],
                vec![
                    // chk_tag_scope：team_id 與 user_id 至少一個非空
                    RuleDefinition::OrphanScope {
                        columns: vec!["team_id".to_string(), "user_id".to_string()],
                    },
                    RuleDefinition::Backfill {
                        column: "created_by".to_string(),
                        source: "user_id".to_string(),
                    },
                    RuleDefinition::Backfill {
                        column: "updated_at".to_string(),
                        source: "created_at".to_string(),
                    },
                ],
            ),
            TableDefinition::new(
                "favorites",
                3,
                &["prompts"],
                vec![RuleDefinition::OrphanReference {
                    column: "prompt_id".to_string(),
                    parent_table: "prompts".to_string(),
                    parent_column: "id".to_string(),
                }],
            ),
            TableDefinition::new(
                "prompt_likes",
                3,
                &["public_prompts"],
                vec![RuleDefinition::OrphanReference {
                    column: "prompt_id".to_string(),
                    parent_table: "public_prompts".to_string(),
                    parent_column: "id".to_string(),
                }],
            ),
        ];

        Self {
            target: TargetSection::default(),
            snapshots: SnapshotSection::default(),
            tables,
        }
    }

    pub fn dependency_order(&self) -> DependencyOrder {
        let mut order = DependencyOrder::new();
        for table in &self.tables {
            order.push(table.name.as_str(), table.depends_on.iter().cloned());
        }
        order
    }

    pub fn cleaning_plan(&self) -> CleaningPlan {
        let mut plan = CleaningPlan::new();
        for table in &self.tables {
            for rule in &table.rules {
                plan.add_rule(table.name.as_str(), rule.build());
            }
        }
        plan
    }

    /// 未被環境變數替換的佔位字串視為未設定
    pub fn database_url(&self) -> Option<&str> {
        self.target
            .database_url
            .as_deref()
            .filter(|url| !url.trim().is_empty() && !url.contains("${"))
    }

    fn validate_rules(&self, table: &TableDefinition) -> Result<()> {
        let field = format!("tables.{}.rules", table.name);

        for rule in &table.rules {
            match rule {
                RuleDefinition::OrphanReference {
                    column,
                    parent_table,
                    parent_column,
                } => {
                    validate_non_empty_string(&field, column)?;
                    validate_non_empty_string(&field, parent_column)?;
                    if !table.depends_on.contains(parent_table) {
                        return Err(MigrateError::ConfigValidationError {
                            field,
                            message: format!(
                                "orphan_reference parent '{}' must be listed in depends_on",
                                parent_table
                            ),
                        });
                    }
                }
                RuleDefinition::OrphanScope { columns } => {
                    if columns.is_empty() {
                        return Err(MigrateError::ConfigValidationError {
                            field,
                            message: "orphan_scope needs at least one scope column".to_string(),
                        });
                    }
                    for column in columns {
                        validate_non_empty_string(&field, column)?;
                    }
                }
                RuleDefinition::Backfill { column, source } => {
                    validate_non_empty_string(&field, column)?;
                    validate_non_empty_string(&field, source)?;
                    if column == source {
                        return Err(MigrateError::ConfigValidationError {
                            field,
                            message: format!("backfill column '{}' cannot copy from itself", column),
                        });
                    }
                }
            }
        }

        Ok(())
    }
}

impl Validate for MigrationPlan {
    fn validate(&self) -> Result<()> {
        if self.tables.is_empty() {
            return Err(MigrateError::ConfigValidationError {
                field: "tables".to_string(),
                message: "Plan lists no tables".to_string(),
            });
        }

        let mut names = HashSet::new();
        for table in &self.tables {
            validate_non_empty_string("tables.name", &table.name)?;
            if !names.insert(table.name.as_str()) {
                return Err(MigrateError::ConfigValidationError {
                    field: "tables".to_string(),
                    message: format!("Table '{}' is defined more than once", table.name),
                });
            }
            self.validate_rules(table)?;
        }

        self.dependency_order().validate()?;

        if let Some(batch_size) = self.target.batch_size {
            crate::utils::validation::validate_positive_number("target.batch_size", batch_size, 1)?;
        }

        Ok(())
    }
}
