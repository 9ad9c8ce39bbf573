//! Plan-versus-actual totals per period.
//!
//! Groups the integrated dataset by period and record kind, counting rows and
//! summing each measure column. Cells that do not parse as numbers count as
//! zero towards the sum but are tallied in `skipped`.

use std::collections::BTreeMap;

use anyhow::{Context, Result, anyhow};
use chrono::{Datelike, NaiveDate};
use log::info;

use crate::{
    cli::SummaryArgs,
    data::{Cell, Dataset},
    database::{self, WorkingDatabase, WorkingMode},
    load_config,
    mapping::{IntegrationConfig, RecordKind},
    table, view,
};

const DEFAULT_MEASURES: &[&str] = &["수량", "장부금액"];

pub const UNKNOWN_PERIOD: &str = "(unknown)";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum PeriodKey {
    Month(NaiveDate),
    Unknown,
}

impl PeriodKey {
    fn from_cell(cell: Option<&Cell>, format: &str) -> Self {
        cell.and_then(Cell::as_text)
            .and_then(|text| parse_period(text, format))
            .map(PeriodKey::Month)
            .unwrap_or(PeriodKey::Unknown)
    }

    /// Months are always labelled `YYYY-MM`, whatever format the view emits.
    pub fn label(&self) -> String {
        match self {
            PeriodKey::Month(date) => date.format("%Y-%m").to_string(),
            PeriodKey::Unknown => UNKNOWN_PERIOD.to_string(),
        }
    }
}

pub fn execute(args: &SummaryArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    let measures: Vec<String> = if args.measures.is_empty() {
        DEFAULT_MEASURES.iter().map(|m| m.to_string()).collect()
    } else {
        args.measures.clone()
    };

    let mut working = WorkingDatabase::open(&args.input, WorkingMode::Copy)?;
    let conn = working.connection()?;
    view::create_integrated_view(conn, &config)?;
    let dataset = database::read_view(conn, &config.view_name, None)?;
    let summary = summarize(&dataset, &config, &measures)
        .with_context(|| format!("Summarizing view '{}'", config.view_name))?;

    table::print_table(&summary.headers(), &summary.table_rows(&config));
    info!(
        "Summarized {} row(s) into {} group(s)",
        dataset.len(),
        summary.groups.len()
    );
    Ok(())
}

/// Parses a period written with the view's strftime `format` into the first
/// day of that month. Formats without a day field get one appended.
pub fn parse_period(value: &str, format: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, format)
        .or_else(|_| NaiveDate::parse_from_str(&format!("{value}-01"), &format!("{format}-%d")))
        .ok()
        .and_then(|date| date.with_day(1))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Totals {
    pub rows: usize,
    pub sums: Vec<f64>,
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub measures: Vec<String>,
    pub groups: BTreeMap<(PeriodKey, RecordKind), Totals>,
}

pub fn summarize(
    dataset: &Dataset,
    config: &IntegrationConfig,
    measures: &[String],
) -> Result<Summary> {
    let period_name = config
        .period_column()
        .ok_or_else(|| anyhow!("Mapping has no year_month column to group by"))?;
    let period_idx = dataset
        .column_index(period_name)
        .ok_or_else(|| anyhow!("Column '{period_name}' not found in dataset"))?;
    let kind_idx = dataset
        .column_index(&config.discriminator)
        .ok_or_else(|| anyhow!("Column '{}' not found in dataset", config.discriminator))?;
    let measure_indices = measures
        .iter()
        .map(|name| {
            dataset
                .column_index(name)
                .ok_or_else(|| anyhow!("Measure column '{name}' not found in dataset"))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut groups: BTreeMap<(PeriodKey, RecordKind), Totals> = BTreeMap::new();
    for row in &dataset.rows {
        let label = row.get(kind_idx).and_then(Cell::as_text).unwrap_or_default();
        let Some(kind) = config.kind_for_label(label) else {
            continue;
        };
        let key = (PeriodKey::from_cell(row.get(period_idx), &config.period_format), kind);
        let totals = groups.entry(key).or_insert_with(|| Totals {
            sums: vec![0.0; measure_indices.len()],
            ..Totals::default()
        });
        totals.rows += 1;
        for (slot, &idx) in measure_indices.iter().enumerate() {
            match row.get(idx).and_then(Cell::as_f64) {
                Some(value) => totals.sums[slot] += value,
                None => totals.skipped += 1,
            }
        }
    }

    Ok(Summary {
        measures: measures.to_vec(),
        groups,
    })
}

impl Summary {
    pub fn headers(&self) -> Vec<String> {
        let mut headers = vec!["period".to_string(), "kind".to_string(), "rows".to_string()];
        headers.extend(self.measures.iter().cloned());
        headers
    }

    pub fn table_rows(&self, config: &IntegrationConfig) -> Vec<Vec<String>> {
        self.groups
            .iter()
            .map(|((period, kind), totals)| {
                let mut row = vec![
                    period.label(),
                    config.label(*kind).to_string(),
                    totals.rows.to_string(),
                ];
                row.extend(
                    totals
                        .sums
                        .iter()
                        .map(|sum| Cell::Real(*sum).as_display()),
                );
                row
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(config: &IntegrationConfig) -> Dataset {
        let mut dataset = Dataset::new(vec![
            config.discriminator.clone(),
            "매출연월".into(),
            "수량".into(),
        ]);
        let plan = || Cell::Text(config.plan_label.clone());
        let actual = || Cell::Text(config.actual_label.clone());
        dataset.rows = vec![
            vec![plan(), Cell::Text("2024-02".into()), Cell::Integer(5)],
            vec![plan(), Cell::Text("2024-01".into()), Cell::Integer(10)],
            vec![actual(), Cell::Text("2024-01".into()), Cell::Real(4.5)],
            vec![actual(), Cell::Text("2024-01".into()), Cell::Text("n/a".into())],
            vec![actual(), Cell::Null, Cell::Integer(1)],
        ];
        dataset
    }

    #[test]
    fn parse_period_accepts_year_month() {
        assert_eq!(
            parse_period("2024-03", "%Y-%m"),
            NaiveDate::from_ymd_opt(2024, 3, 1)
        );
        assert_eq!(parse_period("2024-13", "%Y-%m"), None);
        assert_eq!(parse_period("", "%Y-%m"), None);
    }

    #[test]
    fn parse_period_follows_configured_format() {
        let march = NaiveDate::from_ymd_opt(2024, 3, 1);
        assert_eq!(parse_period("2024/03", "%Y/%m"), march);
        assert_eq!(parse_period("2024-03", "%Y/%m"), None);
        assert_eq!(parse_period("2024-03-17", "%Y-%m-%d"), march);
    }

    #[test]
    fn custom_period_format_groups_by_month() {
        let config = IntegrationConfig {
            period_format: "%Y/%m".to_string(),
            ..IntegrationConfig::default()
        };
        let mut data = Dataset::new(vec![
            config.discriminator.clone(),
            "매출연월".into(),
            "수량".into(),
        ]);
        data.rows = vec![
            vec![
                Cell::Text(config.plan_label.clone()),
                Cell::Text("2024/01".into()),
                Cell::Integer(3),
            ],
            vec![
                Cell::Text(config.actual_label.clone()),
                Cell::Text("2024/01".into()),
                Cell::Integer(2),
            ],
        ];
        let summary = summarize(&data, &config, &["수량".to_string()]).expect("summarize");
        let rows = summary.table_rows(&config);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row[0] == "2024-01"));
        assert!(rows.iter().all(|row| row[0] != UNKNOWN_PERIOD));
    }

    #[test]
    fn groups_by_period_then_kind() {
        let config = IntegrationConfig::default();
        let summary =
            summarize(&dataset(&config), &config, &["수량".to_string()]).expect("summarize");
        let rows = summary.table_rows(&config);
        assert_eq!(
            rows,
            vec![
                vec!["2024-01", "판매계획", "1", "10"],
                vec!["2024-01", "판매실적", "2", "4.5"],
                vec!["2024-02", "판매계획", "1", "5"],
                vec!["(unknown)", "판매실적", "1", "1"],
            ]
        );
        let jan_actual = &summary.groups[&(
            PeriodKey::Month(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
            RecordKind::Actual,
        )];
        assert_eq!(jan_actual.skipped, 1);
    }

    #[test]
    fn missing_measure_is_an_error() {
        let config = IntegrationConfig::default();
        let err = summarize(&dataset(&config), &config, &["없음".to_string()]).unwrap_err();
        assert!(err.to_string().contains("없음"));
    }
}
