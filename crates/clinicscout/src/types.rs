use std::{fmt::Display, str::FromStr};

use schemars::JsonSchema;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Serialize, Serializer};

pub const MAX_PAGE_LIMIT: u32 = 20;

#[derive(Debug, thiserror::Error)]
#[error("Invalid region '{0}'. Accepted values: 'astrahan', 'sochi', 'tyumen', 'voronezh'")]
pub struct RegionParseError(String);

#[derive(Debug, thiserror::Error)]
#[error("Invalid service '{0}'. Accepted values: 'mrt', 'kt', 'rentgen'")]
pub struct ServiceParseError(String);

#[derive(Debug, thiserror::Error)]
#[error("Invalid listing kind '{0}'. Accepted values: 'clinics' ('lpu'), 'doctors' ('vrach')")]
pub struct ListingKindParseError(String);

#[derive(Debug, thiserror::Error)]
pub enum PageLimitError {
    #[error("Page limit must be between 1 and {MAX_PAGE_LIMIT}, got {0}")]
    OutOfRange(u32),
    #[error("Invalid page limit '{0}'. Use 'none' or a number between 1 and {MAX_PAGE_LIMIT}")]
    Invalid(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("Row has {found} value(s) but the dataset has {expected} column(s)")]
    Width { expected: usize, found: usize },
    #[error("Unknown column: {0}")]
    UnknownColumn(String),
    #[error("Column '{0}' already exists")]
    DuplicateColumn(String),
    #[error("Cannot append a dataset with columns {found:?} to one with columns {expected:?}")]
    SchemaMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    Astrakhan,
    Sochi,
    Tyumen,
    Voronezh,
}

impl Region {
    pub const ALL: [Region; 4] = [
        Region::Astrakhan,
        Region::Sochi,
        Region::Tyumen,
        Region::Voronezh,
    ];

    pub fn slug(&self) -> &'static str {
        match self {
            Region::Astrakhan => "astrahan",
            Region::Sochi => "sochi",
            Region::Tyumen => "tyumen",
            Region::Voronezh => "voronezh",
        }
    }

    /// Base address of the region's listings, with a trailing slash.
    pub fn address(&self) -> String {
        format!("{}/{}/", crate::BASE_URL, self.slug())
    }
}

impl FromStr for Region {
    type Err = RegionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Region::ALL
            .into_iter()
            .find(|r| r.slug().eq_ignore_ascii_case(needle) || r.to_string() == needle)
            .ok_or_else(|| RegionParseError(s.to_string()))
    }
}

impl Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Region::Astrakhan => write!(f, "Астрахань"),
            Region::Sochi => write!(f, "Сочи"),
            Region::Tyumen => write!(f, "Тюмень"),
            Region::Voronezh => write!(f, "Воронеж"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ListingKind {
    Clinics,
    Doctors,
}

impl ListingKind {
    pub fn path(&self) -> &'static str {
        match self {
            ListingKind::Clinics => "lpu",
            ListingKind::Doctors => "vrach",
        }
    }
}

impl FromStr for ListingKind {
    type Err = ListingKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "clinics" | "lpu" | "лпу" => Ok(ListingKind::Clinics),
            "doctors" | "vrach" | "врачи" => Ok(ListingKind::Doctors),
            _ => Err(ListingKindParseError(s.to_string())),
        }
    }
}

impl Display for ListingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListingKind::Clinics => write!(f, "ЛПУ"),
            ListingKind::Doctors => write!(f, "Врачи"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Service {
    Mri,
    Ct,
    Xray,
}

impl Service {
    pub fn slug(&self) -> &'static str {
        match self {
            Service::Mri => "mrt",
            Service::Ct => "kt",
            Service::Xray => "rentgen",
        }
    }
}

impl FromStr for Service {
    type Err = ServiceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mrt" | "mri" | "мрт" => Ok(Service::Mri),
            "kt" | "ct" | "кт" => Ok(Service::Ct),
            "rentgen" | "xray" | "рентген" => Ok(Service::Xray),
            _ => Err(ServiceParseError(s.to_string())),
        }
    }
}

impl Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Service::Mri => write!(f, "МРТ"),
            Service::Ct => write!(f, "КТ"),
            Service::Xray => write!(f, "Рентген"),
        }
    }
}

/// A page count in `1..=MAX_PAGE_LIMIT`, only built by [`PageLimit::pages`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageCount(u32);

impl PageCount {
    pub fn get(self) -> u32 {
        self.0
    }
}

/// Upper bound on the number of listing pages one scrape may accumulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PageLimit {
    #[default]
    Unbounded,
    Pages(PageCount),
}

impl PageLimit {
    pub fn pages(n: u32) -> Result<Self, PageLimitError> {
        if (1..=MAX_PAGE_LIMIT).contains(&n) {
            Ok(PageLimit::Pages(PageCount(n)))
        } else {
            Err(PageLimitError::OutOfRange(n))
        }
    }

    pub fn max_pages(&self) -> Option<u32> {
        match self {
            PageLimit::Unbounded => None,
            PageLimit::Pages(n) => Some(n.get()),
        }
    }

    pub fn is_reached(&self, accumulated: u32) -> bool {
        self.max_pages().is_some_and(|n| accumulated >= n)
    }
}

impl TryFrom<Option<u32>> for PageLimit {
    type Error = PageLimitError;

    fn try_from(value: Option<u32>) -> Result<Self, Self::Error> {
        value.map_or(Ok(PageLimit::Unbounded), PageLimit::pages)
    }
}

impl FromStr for PageLimit {
    type Err = PageLimitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "нет" | "unbounded" => Ok(PageLimit::Unbounded),
            other => other
                .parse::<u32>()
                .map_err(|_| PageLimitError::Invalid(s.to_string()))
                .and_then(PageLimit::pages),
        }
    }
}

impl Display for PageLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PageLimit::Unbounded => write!(f, "none"),
            PageLimit::Pages(n) => write!(f, "{}", n.get()),
        }
    }
}

/// One row of a [`Dataset`]. `None` marks a field whose locator found nothing,
/// which is distinct from an empty string.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Record {
    values: Vec<Option<String>>,
}

impl Record {
    pub fn new(values: Vec<Option<String>>) -> Self {
        Self { values }
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.values.get(index).and_then(|v| v.as_deref())
    }

    pub fn values(&self) -> &[Option<String>] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub(crate) fn values_mut(&mut self) -> &mut Vec<Option<String>> {
        &mut self.values
    }
}

impl FromIterator<Option<String>> for Record {
    fn from_iter<T: IntoIterator<Item = Option<String>>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Ordered table of records sharing one set of named columns.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Record>,
}

impl Dataset {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn require_column(&self, name: &str) -> Result<usize, DatasetError> {
        self.column_index(name)
            .ok_or_else(|| DatasetError::UnknownColumn(name.to_string()))
    }

    pub fn push(&mut self, record: Record) -> Result<(), DatasetError> {
        if record.len() != self.columns.len() {
            return Err(DatasetError::Width {
                expected: self.columns.len(),
                found: record.len(),
            });
        }
        self.rows.push(record);
        Ok(())
    }

    /// Appends every row of `other`, which must have the same columns.
    pub fn append(&mut self, other: Dataset) -> Result<(), DatasetError> {
        if other.columns != self.columns {
            return Err(DatasetError::SchemaMismatch {
                expected: self.columns.clone(),
                found: other.columns,
            });
        }
        self.rows.extend(other.rows);
        Ok(())
    }

    pub fn column_values(
        &self,
        name: &str,
    ) -> Result<impl Iterator<Item = Option<&str>> + '_, DatasetError> {
        let index = self.require_column(name)?;
        Ok(self.rows.iter().map(move |r| r.get(index)))
    }

    pub fn retain_rows(&mut self, f: impl FnMut(&Record) -> bool) {
        self.rows.retain(f);
    }

    pub fn map_column(
        &mut self,
        name: &str,
        mut f: impl FnMut(Option<&str>) -> Option<String>,
    ) -> Result<(), DatasetError> {
        let index = self.require_column(name)?;
        for row in &mut self.rows {
            let slot = &mut row.values_mut()[index];
            *slot = f(slot.as_deref());
        }
        Ok(())
    }

    /// Adds a column at the end, one value per existing row.
    pub fn add_column(
        &mut self,
        name: impl Into<String>,
        values: Vec<Option<String>>,
    ) -> Result<(), DatasetError> {
        let name = name.into();
        if self.column_index(&name).is_some() {
            return Err(DatasetError::DuplicateColumn(name));
        }
        if values.len() != self.rows.len() {
            return Err(DatasetError::Width {
                expected: self.rows.len(),
                found: values.len(),
            });
        }
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.values_mut().push(value);
        }
        self.columns.push(name);
        Ok(())
    }
}

struct RowRef<'a> {
    columns: &'a [String],
    record: &'a Record,
}

impl Serialize for RowRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in self.columns.iter().zip(self.record.values()) {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

impl Serialize for Dataset {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.rows.len()))?;
        for record in &self.rows {
            seq.serialize_element(&RowRef {
                columns: &self.columns,
                record,
            })?;
        }
        seq.end()
    }
}

impl Display for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "┌─ {}", self.columns.join(" │ "))?;
        for (i, record) in self.rows.iter().enumerate() {
            let cells: Vec<&str> = record
                .values()
                .iter()
                .map(|v| v.as_deref().unwrap_or("—"))
                .collect();
            writeln!(f, "{:>4}. {}", i + 1, cells.join(" │ "))?;
        }
        write!(f, "└─ {} row(s)", self.rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dataset {
        let mut ds = Dataset::new(["Название", "Адрес"]);
        ds.push(Record::new(vec![Some("Клиника".into()), None]))
            .unwrap();
        ds
    }

    #[test]
    fn test_push_rejects_wrong_width() {
        let mut ds = sample();
        let err = ds.push(Record::new(vec![None])).unwrap_err();
        assert!(matches!(
            err,
            DatasetError::Width {
                expected: 2,
                found: 1
            }
        ));
        assert_eq!(ds.len(), 1);
    }

    #[test]
    fn test_json_keeps_column_order_and_nulls() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert_eq!(json, r#"[{"Название":"Клиника","Адрес":null}]"#);
    }

    #[test]
    fn test_add_column_requires_one_value_per_row() {
        let mut ds = sample();
        assert!(ds.add_column("lat", vec![]).is_err());
        ds.add_column("lat", vec![Some("44.1".into())]).unwrap();
        assert_eq!(ds.columns().last().map(String::as_str), Some("lat"));
        assert!(matches!(
            ds.add_column("lat", vec![None]),
            Err(DatasetError::DuplicateColumn(_))
        ));
    }

    #[test]
    fn test_page_limit_parsing() {
        assert_eq!("none".parse::<PageLimit>().unwrap(), PageLimit::Unbounded);
        assert_eq!("Нет".parse::<PageLimit>().unwrap(), PageLimit::Unbounded);
        assert_eq!("20".parse::<PageLimit>().unwrap().max_pages(), Some(20));
        assert!(matches!(
            "21".parse::<PageLimit>(),
            Err(PageLimitError::OutOfRange(21))
        ));
        assert!(matches!(
            "0".parse::<PageLimit>(),
            Err(PageLimitError::OutOfRange(0))
        ));
        assert!(matches!(
            "many".parse::<PageLimit>(),
            Err(PageLimitError::Invalid(_))
        ));
        assert!(PageLimit::pages(2).unwrap().is_reached(2));
        assert!(!PageLimit::Unbounded.is_reached(u32::MAX));
    }

    #[test]
    fn test_page_limit_only_holds_counts_in_range() {
        assert!(PageLimit::pages(0).is_err());
        assert!(PageLimit::pages(MAX_PAGE_LIMIT + 1).is_err());
        assert!(PageLimit::try_from(Some(50)).is_err());

        let limit = PageLimit::pages(MAX_PAGE_LIMIT).unwrap();
        let PageLimit::Pages(count) = limit else {
            panic!("expected a page count");
        };
        assert_eq!(count.get(), MAX_PAGE_LIMIT);
        assert_eq!(limit.to_string(), "20");
        assert!(!limit.is_reached(MAX_PAGE_LIMIT - 1));
        assert!(limit.is_reached(MAX_PAGE_LIMIT));
        assert_eq!(PageLimit::Unbounded.max_pages(), None);
    }

    #[test]
    fn test_region_parsing_and_address() {
        assert_eq!("sochi".parse::<Region>().unwrap(), Region::Sochi);
        assert_eq!("Тюмень".parse::<Region>().unwrap(), Region::Tyumen);
        assert!("moscow".parse::<Region>().is_err());
        assert_eq!(Region::Voronezh.address(), "https://prodoctorov.ru/voronezh/");
    }

    #[test]
    fn test_service_parsing() {
        assert_eq!("МРТ".parse::<Service>().unwrap(), Service::Mri);
        assert_eq!("rentgen".parse::<Service>().unwrap().slug(), "rentgen");
        assert!("uzi".parse::<Service>().is_err());
    }
}
