//! Column mapping and integration settings.
//!
//! An [`IntegrationConfig`] names the two source tables, the view to create,
//! the discriminator column with its plan/actual labels, and the ordered list
//! of [`ColumnMapping`] entries that line the two tables up under one set of
//! standard column names. The defaults reproduce the stock sales layout; a YAML
//! file can override any field.

use std::{collections::HashSet, fmt, fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_PLAN_TABLE: &str = "sales_plan_data";
pub const DEFAULT_ACTUAL_TABLE: &str = "sales_actual_data";
pub const DEFAULT_VIEW_NAME: &str = "view_integrated_sales";
pub const DEFAULT_DISCRIMINATOR: &str = "데이터구분";
pub const DEFAULT_PLAN_LABEL: &str = "판매계획";
pub const DEFAULT_ACTUAL_LABEL: &str = "판매실적";
pub const DEFAULT_PERIOD_FORMAT: &str = "%Y-%m";

/// (standard, plan, actual) triples for the stock sales tables. The first
/// entry is the period column.
const DEFAULT_COLUMN_MAP: &[(&str, &str, &str)] = &[
    ("매출연월", "계획년월", "매출일"),
    ("매출처", "매출처", "매출처"),
    ("매출처명", "매출처명", "매출처명"),
    ("품목", "품목코드", "품목"),
    ("품목명", "품명", "품목명"),
    ("거래통화", "거래통화", "거래통화"),
    ("환율", "환율", "환율"),
    ("판매단가", "판매단가", "판매단가"),
    ("수량", "판매수량", "수량"),
    ("장부금액", "판매금액", "장부금액"),
    ("대분류", "대분류", "대분류"),
    ("중분류", "중분류", "중분류"),
    ("소분류", "소분류", "소분류"),
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("Column mapping is empty")]
    Empty,
    #[error("Column mapping entry {position} has a blank {field} name")]
    BlankName { position: usize, field: &'static str },
    #[error("Standard column '{0}' is mapped more than once")]
    DuplicateStandard(String),
    #[error("Standard column '{0}' collides with the discriminator column")]
    DiscriminatorCollision(String),
    #[error("Setting '{0}' must not be blank")]
    BlankSetting(&'static str),
    #[error("Plan and actual labels are both '{0}'")]
    IdenticalLabels(String),
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ColumnTransform {
    #[default]
    Direct,
    /// Truncate a date/datetime to the configured period format.
    YearMonth,
}

impl fmt::Display for ColumnTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnTransform::Direct => f.write_str("direct"),
            ColumnTransform::YearMonth => f.write_str("year_month"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnMapping {
    pub standard: String,
    pub plan: String,
    pub actual: String,
    #[serde(default)]
    pub transform: ColumnTransform,
}

impl ColumnMapping {
    pub fn new(standard: &str, plan: &str, actual: &str) -> Self {
        Self {
            standard: standard.to_string(),
            plan: plan.to_string(),
            actual: actual.to_string(),
            transform: ColumnTransform::Direct,
        }
    }

    pub fn with_transform(mut self, transform: ColumnTransform) -> Self {
        self.transform = transform;
        self
    }

    pub fn source(&self, kind: RecordKind) -> &str {
        match kind {
            RecordKind::Plan => &self.plan,
            RecordKind::Actual => &self.actual,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKind {
    Plan,
    Actual,
}

impl RecordKind {
    pub const ALL: [RecordKind; 2] = [RecordKind::Plan, RecordKind::Actual];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Plan => "plan",
            RecordKind::Actual => "actual",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IntegrationConfig {
    pub plan_table: String,
    pub actual_table: String,
    pub view_name: String,
    pub discriminator: String,
    pub plan_label: String,
    pub actual_label: String,
    pub period_format: String,
    pub columns: Vec<ColumnMapping>,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        let columns = DEFAULT_COLUMN_MAP
            .iter()
            .enumerate()
            .map(|(idx, (standard, plan, actual))| {
                let mapping = ColumnMapping::new(standard, plan, actual);
                if idx == 0 {
                    mapping.with_transform(ColumnTransform::YearMonth)
                } else {
                    mapping
                }
            })
            .collect();
        Self {
            plan_table: DEFAULT_PLAN_TABLE.to_string(),
            actual_table: DEFAULT_ACTUAL_TABLE.to_string(),
            view_name: DEFAULT_VIEW_NAME.to_string(),
            discriminator: DEFAULT_DISCRIMINATOR.to_string(),
            plan_label: DEFAULT_PLAN_LABEL.to_string(),
            actual_label: DEFAULT_ACTUAL_LABEL.to_string(),
            period_format: DEFAULT_PERIOD_FORMAT.to_string(),
            columns,
        }
    }
}

impl IntegrationConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening mapping file {path:?}"))?;
        let config: IntegrationConfig = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing mapping YAML {path:?}"))?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file =
            File::create(path).with_context(|| format!("Creating mapping file {path:?}"))?;
        serde_yaml::to_writer(file, self).context("Writing mapping YAML")
    }

    pub fn validate(&self) -> Result<(), MappingError> {
        let settings = [
            ("plan_table", &self.plan_table),
            ("actual_table", &self.actual_table),
            ("view_name", &self.view_name),
            ("discriminator", &self.discriminator),
            ("plan_label", &self.plan_label),
            ("actual_label", &self.actual_label),
            ("period_format", &self.period_format),
        ];
        for (name, value) in settings {
            if value.trim().is_empty() {
                return Err(MappingError::BlankSetting(name));
            }
        }
        if self.plan_label == self.actual_label {
            return Err(MappingError::IdenticalLabels(self.plan_label.clone()));
        }
        if self.columns.is_empty() {
            return Err(MappingError::Empty);
        }

        let mut seen = HashSet::with_capacity(self.columns.len());
        for (idx, column) in self.columns.iter().enumerate() {
            let position = idx + 1;
            for (field, value) in [
                ("standard", &column.standard),
                ("plan", &column.plan),
                ("actual", &column.actual),
            ] {
                if value.trim().is_empty() {
                    return Err(MappingError::BlankName { position, field });
                }
            }
            if column.standard == self.discriminator {
                return Err(MappingError::DiscriminatorCollision(
                    column.standard.clone(),
                ));
            }
            if !seen.insert(column.standard.as_str()) {
                return Err(MappingError::DuplicateStandard(column.standard.clone()));
            }
        }
        Ok(())
    }

    pub fn source_table(&self, kind: RecordKind) -> &str {
        match kind {
            RecordKind::Plan => &self.plan_table,
            RecordKind::Actual => &self.actual_table,
        }
    }

    pub fn label(&self, kind: RecordKind) -> &str {
        match kind {
            RecordKind::Plan => &self.plan_label,
            RecordKind::Actual => &self.actual_label,
        }
    }

    pub fn kind_for_label(&self, label: &str) -> Option<RecordKind> {
        RecordKind::ALL
            .into_iter()
            .find(|kind| self.label(*kind) == label)
    }

    /// Name of the single-source view created by `--cleaned-views`.
    pub fn cleaned_view_name(&self, kind: RecordKind) -> String {
        format!("view_cleaned_{}", kind.as_str())
    }

    pub fn standard_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.standard.as_str()).collect()
    }

    /// First column carrying the year-month transform.
    pub fn period_column(&self) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| c.transform == ColumnTransform::YearMonth)
            .map(|c| c.standard.as_str())
    }
}
