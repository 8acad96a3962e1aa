//! Ad-hoc filtering of a dataset whose columns are not known up front.
//!
//! Filtering is two steps. [`derive_filters`] inspects each activated column,
//! classifies it as a [`ColumnKind`] and turns the user's raw input into a
//! typed [`Predicate`]. [`apply_filters`] then keeps the rows matching every
//! predicate, in activation order. Applying the same filters twice gives the
//! same dataset.

use std::collections::HashSet;
use std::fmt::Display;
use std::str::FromStr;

use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::types::{Dataset, DatasetError};

pub const MAX_CATEGORIES: usize = 10;
pub const MAX_CATEGORY_LEN: usize = 255;
pub const DISPLAY_DATE_FORMAT: &str = "%d-%m-%Y";

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d-%m-%Y", "%d.%m.%Y", "%d/%m/%Y"];

#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error("Invalid number '{value}' for column '{column}'")]
    Number { column: String, value: String },
    #[error("Invalid date '{value}' for column '{column}'. Use YYYY-MM-DD or DD-MM-YYYY")]
    Date { column: String, value: String },
    #[error("Invalid filter '{0}', expected COLUMN=VALUE")]
    Syntax(String),
}

/// Thresholds for telling categorical columns from free text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FilterConfig {
    pub max_categories: usize,
    pub max_category_len: usize,
    /// Columns whose name contains this are never categorical.
    pub primary_name_column: String,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_categories: MAX_CATEGORIES,
            max_category_len: MAX_CATEGORY_LEN,
            primary_name_column: crate::NAME_COLUMN.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Date,
    Numeric,
    Categorical,
    FreeText,
}

impl Display for ColumnKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnKind::Date => write!(f, "date"),
            ColumnKind::Numeric => write!(f, "numeric"),
            ColumnKind::Categorical => write!(f, "categorical"),
            ColumnKind::FreeText => write!(f, "text"),
        }
    }
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .or_else(|| {
            // Timestamps: keep the date part.
            let (date, rest) = value.split_at_checked(10)?;
            rest.starts_with(['T', ' '])
                .then(|| NaiveDate::parse_from_str(date, "%Y-%m-%d").ok())
                .flatten()
        })
}

pub fn parse_number(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

fn is_date_column(values: &[&str]) -> bool {
    !values.is_empty() && values.iter().all(|v| parse_date(v).is_some())
}

/// Infers how `column` should be filtered from its present values.
pub fn classify_column(
    dataset: &Dataset,
    column: &str,
    config: &FilterConfig,
) -> Result<ColumnKind, FilterError> {
    let values: Vec<&str> = dataset.column_values(column)?.flatten().collect();

    if is_date_column(&values) {
        return Ok(ColumnKind::Date);
    }
    if !values.is_empty() && values.iter().all(|v| parse_number(v).is_some()) {
        return Ok(ColumnKind::Numeric);
    }

    let distinct = values.iter().collect::<HashSet<_>>().len();
    let longest = values.iter().map(|v| v.chars().count()).max().unwrap_or(0);
    let short_or_few = distinct < config.max_categories || longest < config.max_category_len;
    if short_or_few && !column.contains(config.primary_name_column.as_str()) {
        Ok(ColumnKind::Categorical)
    } else {
        Ok(ColumnKind::FreeText)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    /// Inclusive; an open bound means the column's own min or max.
    NumericRange { min: Option<f64>, max: Option<f64> },
    DateRange {
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    },
    /// Exact numbers, written `a|b`.
    NumberSet { values: Vec<f64> },
    /// Exact dates, written `a|b`.
    DateSet { values: Vec<NaiveDate> },
    /// Empty means the column is not filtered.
    OneOf { values: Vec<String> },
    /// Case-insensitive; empty means the column is not filtered.
    Contains { needle: String },
}

fn choices(input: &str) -> Vec<&str> {
    input
        .split('|')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect()
}

fn is_choice_list(input: &str) -> bool {
    input.contains('|') && !input.contains("..")
}

fn split_range(input: &str) -> (&str, &str) {
    input.split_once("..").unwrap_or((input, input))
}

fn bound<T>(
    raw: &str,
    parse: impl Fn(&str) -> Option<T>,
    err: impl Fn() -> FilterError,
) -> Result<Option<T>, FilterError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    parse(raw).map(Some).ok_or_else(err)
}

impl Predicate {
    /// Interprets raw user input for a column of the given kind.
    ///
    /// Ranges are written `min..max`, either side may be left out and a
    /// single value means exactly that value. Categories are `a|b|c`.
    ///
    /// A list also works on numeric and date columns, matching by value.
    /// Options that are not numbers (or dates) can never match there and are
    /// dropped, so a list picked while the column was categorical keeps
    /// selecting the same rows once filtering leaves only numbers.
    pub fn parse(kind: ColumnKind, column: &str, input: &str) -> Result<Self, FilterError> {
        let by_value = matches!(kind, ColumnKind::Numeric | ColumnKind::Date);
        if by_value && is_choice_list(input) && choices(input).is_empty() {
            return Ok(Predicate::OneOf { values: Vec::new() });
        }
        match kind {
            ColumnKind::Numeric if is_choice_list(input) => Ok(Predicate::NumberSet {
                values: choices(input).into_iter().filter_map(parse_number).collect(),
            }),
            ColumnKind::Date if is_choice_list(input) => Ok(Predicate::DateSet {
                values: choices(input).into_iter().filter_map(parse_date).collect(),
            }),
            ColumnKind::Numeric => {
                let (lo, hi) = split_range(input);
                let err = || FilterError::Number {
                    column: column.to_string(),
                    value: input.to_string(),
                };
                Ok(Predicate::NumericRange {
                    min: bound(lo, parse_number, err)?,
                    max: bound(hi, parse_number, err)?,
                })
            }
            ColumnKind::Date => {
                let (lo, hi) = split_range(input);
                let err = || FilterError::Date {
                    column: column.to_string(),
                    value: input.to_string(),
                };
                Ok(Predicate::DateRange {
                    start: bound(lo, parse_date, err)?,
                    end: bound(hi, parse_date, err)?,
                })
            }
            ColumnKind::Categorical => Ok(Predicate::OneOf {
                values: choices(input).into_iter().map(str::to_string).collect(),
            }),
            ColumnKind::FreeText => Ok(Predicate::Contains {
                needle: input.trim().to_string(),
            }),
        }
    }

    fn is_noop(&self) -> bool {
        match self {
            Predicate::OneOf { values } => values.is_empty(),
            Predicate::Contains { needle } => needle.is_empty(),
            _ => false,
        }
    }

    /// Absent values never match.
    pub fn matches(&self, value: Option<&str>) -> bool {
        let Some(value) = value else {
            return false;
        };
        match self {
            Predicate::NumericRange { min, max } => parse_number(value)
                .is_some_and(|n| min.is_none_or(|m| n >= m) && max.is_none_or(|m| n <= m)),
            Predicate::DateRange { start, end } => parse_date(value)
                .is_some_and(|d| start.is_none_or(|s| d >= s) && end.is_none_or(|e| d <= e)),
            Predicate::NumberSet { values } => {
                parse_number(value).is_some_and(|n| values.contains(&n))
            }
            Predicate::DateSet { values } => parse_date(value).is_some_and(|d| values.contains(&d)),
            Predicate::OneOf { values } => values.iter().any(|v| v == value),
            Predicate::Contains { needle } => {
                value.to_lowercase().contains(&needle.to_lowercase())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnFilter {
    pub column: String,
    pub predicate: Predicate,
}

/// A column the user activated for filtering plus their raw input for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnInput {
    pub column: String,
    #[serde(default)]
    pub value: String,
}

impl FromStr for ColumnInput {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (column, value) = s
            .split_once('=')
            .ok_or_else(|| FilterError::Syntax(s.to_string()))?;
        let column = column.trim();
        if column.is_empty() {
            return Err(FilterError::Syntax(s.to_string()));
        }
        Ok(Self {
            column: column.to_string(),
            value: value.to_string(),
        })
    }
}

/// Classifies every activated column against `dataset` and parses its input.
pub fn derive_filters(
    dataset: &Dataset,
    inputs: &[ColumnInput],
    config: &FilterConfig,
) -> Result<Vec<ColumnFilter>, FilterError> {
    inputs
        .iter()
        .map(|input| {
            let kind = classify_column(dataset, &input.column, config)?;
            let predicate = Predicate::parse(kind, &input.column, &input.value)?;
            log::debug!("Filter on '{}' ({}): {:?}", input.column, kind, predicate);
            Ok(ColumnFilter {
                column: input.column.clone(),
                predicate,
            })
        })
        .collect()
}

/// Rows matching every filter, in their original order.
pub fn apply_filters(dataset: &Dataset, filters: &[ColumnFilter]) -> Result<Dataset, FilterError> {
    let mut filtered = dataset.clone();
    for filter in filters {
        let index = filtered.require_column(&filter.column)?;
        if filter.predicate.is_noop() {
            continue;
        }
        filtered.retain_rows(|r| filter.predicate.matches(r.get(index)));
    }
    Ok(filtered)
}

/// Rewrites every date-typed column as `DD-MM-YYYY`.
pub fn normalize_dates(dataset: &mut Dataset) -> Result<(), FilterError> {
    let date_columns: Vec<String> = dataset
        .columns()
        .iter()
        .filter(|c| {
            dataset
                .column_values(c)
                .map(|values| is_date_column(&values.flatten().collect::<Vec<_>>()))
                .unwrap_or(false)
        })
        .cloned()
        .collect();

    for column in date_columns {
        dataset.map_column(&column, |v| {
            v.map(|v| match parse_date(v) {
                Some(d) => d.format(DISPLAY_DATE_FORMAT).to_string(),
                None => v.to_string(),
            })
        })?;
    }
    Ok(())
}

/// Full filtering pass for one interaction: derive, apply, then normalise
/// dates for display. No active columns returns the dataset untouched.
pub fn filter_dataset(
    dataset: &Dataset,
    inputs: &[ColumnInput],
    config: &FilterConfig,
) -> Result<Dataset, FilterError> {
    if inputs.is_empty() {
        return Ok(dataset.clone());
    }
    let filters = derive_filters(dataset, inputs, config)?;
    let mut filtered = apply_filters(dataset, &filters)?;
    normalize_dates(&mut filtered)?;
    log::info!(
        "Filtered {} row(s) down to {} using {} column(s)",
        dataset.len(),
        filtered.len(),
        filters.len()
    );
    Ok(filtered)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDescription {
    pub column: String,
    pub kind: ColumnKind,
    /// Distinct values in order of appearance, for categorical columns.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl Display for ColumnDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]", self.column, self.kind)?;
        if !self.options.is_empty() {
            write!(f, ": {}", self.options.join(" | "))?;
        }
        Ok(())
    }
}

/// Kind of every column, with the choices a categorical filter offers.
pub fn describe_columns(
    dataset: &Dataset,
    config: &FilterConfig,
) -> Result<Vec<ColumnDescription>, FilterError> {
    dataset
        .columns()
        .iter()
        .map(|column| {
            let kind = classify_column(dataset, column, config)?;
            let mut options = Vec::new();
            if kind == ColumnKind::Categorical {
                let mut seen = HashSet::new();
                for value in dataset.column_values(column)?.flatten() {
                    if seen.insert(value) {
                        options.push(value.to_string());
                    }
                }
            }
            Ok(ColumnDescription {
                column: column.clone(),
                kind,
                options,
            })
        })
        .collect()
}
