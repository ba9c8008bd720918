//! Converts BDX trend tables into consumer-specific shapes: Grafana series for the
//! gateway, and summary/trend tables for the PDF report.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::ReshapeError;
use crate::services::query::PropertyDescriptor;
use crate::time::parse_timestamp;

pub const TIME_COLUMN: &str = "time";
pub const NO_DATA_MESSAGE: &str = "No data available";

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesColumn {
    pub descriptor: PropertyDescriptor,
    pub values: Vec<Option<f64>>,
}

/// Timestamp-indexed table with one value column per requested property.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesTable {
    index: Vec<Option<String>>,
    columns: Vec<SeriesColumn>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TableShape {
    pub rows: usize,
    pub columns: usize,
}

impl fmt::Display for TableShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.rows, self.columns)
    }
}

impl SeriesTable {
    pub fn new(index: Vec<Option<String>>, columns: Vec<SeriesColumn>) -> Self {
        Self { index, columns }
    }

    pub fn index(&self) -> &[Option<String>] {
        &self.index
    }

    pub fn columns(&self) -> &[SeriesColumn] {
        &self.columns
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn shape(&self) -> TableShape {
        TableShape {
            rows: self.index.len(),
            columns: self.columns.len(),
        }
    }

    pub fn labels(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|column| column.descriptor.label())
            .collect()
    }
}

/// A reshape result, or the sentinel for "queried fine, nothing there".
#[derive(Debug, Clone, PartialEq)]
pub enum Reshaped<T> {
    Data(T),
    NoData,
}

#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct ReshapedSeries {
    pub target: String,
    /// `[value, epoch_millis]` pairs, ascending by time.
    #[schema(value_type = Vec<Vec<f64>>)]
    pub datapoints: Vec<(f64, i64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct NoDataBody {
    pub message: String,
}

/// Body of `GET /query`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum GrafanaResponse {
    Series(Vec<ReshapedSeries>),
    NoData(NoDataBody),
}

impl From<Reshaped<Vec<ReshapedSeries>>> for GrafanaResponse {
    fn from(value: Reshaped<Vec<ReshapedSeries>>) -> Self {
        match value {
            Reshaped::Data(series) => Self::Series(series),
            Reshaped::NoData => Self::NoData(NoDataBody {
                message: NO_DATA_MESSAGE.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub metric: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendRow {
    pub date: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentTables {
    pub summary: Vec<SummaryRow>,
    pub trend: Vec<TrendRow>,
}

fn validate_shape(table: &SeriesTable) -> Result<(), ReshapeError> {
    let expected = table.index.len();
    for column in &table.columns {
        if column.values.len() != expected {
            return Err(ReshapeError::ShapeMismatch {
                column: column.descriptor.label(),
                expected,
                actual: column.values.len(),
            });
        }
    }
    Ok(())
}

fn parse_index(table: &SeriesTable) -> Result<Vec<Option<DateTime<Utc>>>, ReshapeError> {
    table
        .index
        .iter()
        .enumerate()
        .map(|(row, raw)| match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(value) => parse_timestamp(value).map(Some).ok_or_else(|| {
                ReshapeError::MalformedTimestamp {
                    column: TIME_COLUMN.to_string(),
                    row,
                    value: value.to_string(),
                }
            }),
        })
        .collect()
}

fn present(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// API mode: one Grafana series per value column. The target is the property name from
/// the column metadata, so ids never leak into the series name.
pub fn to_grafana_series(
    table: &SeriesTable,
) -> Result<Reshaped<Vec<ReshapedSeries>>, ReshapeError> {
    tracing::debug!(
        shape = %table.shape(),
        columns = ?table.labels(),
        "reshaping trend table for grafana"
    );
    validate_shape(table)?;
    if table.is_empty() {
        return Ok(Reshaped::NoData);
    }
    let index = parse_index(table)?;

    let series = table
        .columns
        .iter()
        .map(|column| {
            let mut points: Vec<(DateTime<Utc>, f64)> = index
                .iter()
                .zip(&column.values)
                .filter_map(|(ts, value)| Some(((*ts)?, present(*value)?)))
                .collect();
            points.sort_by_key(|(ts, _)| *ts);
            ReshapedSeries {
                target: column.descriptor.property_name.clone(),
                datapoints: points
                    .into_iter()
                    .map(|(ts, value)| (value, ts.timestamp_millis()))
                    .collect(),
            }
        })
        .collect();
    Ok(Reshaped::Data(series))
}

/// Document mode: a daily-mean trend plus scalar summary metrics over every value in
/// the table.
pub fn to_document_tables(table: &SeriesTable) -> Result<Reshaped<DocumentTables>, ReshapeError> {
    tracing::debug!(
        shape = %table.shape(),
        columns = ?table.labels(),
        "reshaping trend table for report"
    );
    validate_shape(table)?;
    if table.is_empty() {
        return Ok(Reshaped::NoData);
    }
    let index = parse_index(table)?;

    let mut daily: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
    let mut total = 0.0_f64;
    let mut peak = f64::NEG_INFINITY;
    let mut readings = 0usize;

    for column in &table.columns {
        for (ts, value) in index.iter().zip(&column.values) {
            let (Some(ts), Some(value)) = (ts, present(*value)) else {
                continue;
            };
            let entry = daily.entry(ts.date_naive()).or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += 1;
            total += value;
            peak = peak.max(value);
            readings += 1;
        }
    }

    if readings == 0 {
        return Ok(Reshaped::NoData);
    }

    let trend = daily
        .into_iter()
        .map(|(date, (sum, count))| TrendRow {
            date,
            value: sum / count as f64,
        })
        .collect();
    let summary = vec![
        SummaryRow {
            metric: "Total".to_string(),
            value: total,
        },
        SummaryRow {
            metric: "Peak".to_string(),
            value: peak,
        },
        SummaryRow {
            metric: "Average".to_string(),
            value: total / readings as f64,
        },
        SummaryRow {
            metric: "Readings".to_string(),
            value: readings as f64,
        },
    ];

    Ok(Reshaped::Data(DocumentTables { summary, trend }))
}
