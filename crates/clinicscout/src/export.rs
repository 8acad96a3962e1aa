use rust_xlsxwriter::{Format, Workbook, XlsxError};

use crate::types::Dataset;

pub const DEFAULT_SHEET_NAME: &str = "clinicscout";

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("CSV buffer error: {0}")]
    CsvBuffer(String),
    #[error("XLSX error: {0}")]
    Xlsx(#[from] XlsxError),
    #[error("Dataset has {0} columns, more than a worksheet holds")]
    TooWide(usize),
}

/// UTF-8 CSV, one header row then one line per record. Absent values are
/// written as empty fields.
pub fn to_csv(dataset: &Dataset) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(dataset.columns())?;
    for record in dataset.rows() {
        writer.write_record(record.values().iter().map(|v| v.as_deref().unwrap_or("")))?;
    }
    writer
        .into_inner()
        .map_err(|e| ExportError::CsvBuffer(e.to_string()))
}

/// Single-sheet workbook with a header row. The first column carries a
/// `0.00` number format; absent values are left blank.
pub fn to_xlsx(dataset: &Dataset, sheet_name: &str) -> Result<Vec<u8>, ExportError> {
    if dataset.columns().len() > u16::MAX as usize {
        return Err(ExportError::TooWide(dataset.columns().len()));
    }

    let mut workbook = Workbook::new();
    let two_decimals = Format::new().set_num_format("0.00");
    let sheet = workbook.add_worksheet();
    sheet.set_name(sheet_name)?;
    sheet.set_column_format(0, &two_decimals)?;

    for (col, name) in (0u16..).zip(dataset.columns()) {
        sheet.write_string(0, col, name)?;
    }
    for (row, record) in (1u32..).zip(dataset.rows()) {
        for (col, value) in (0u16..).zip(record.values()) {
            if let Some(value) = value {
                sheet.write_string(row, col, value)?;
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Record;

    fn sample() -> Dataset {
        let mut ds = Dataset::new(["Название", "Адрес"]);
        ds.push(Record::new(vec![
            Some("Клиника \"Здоровье\"".into()),
            Some("ул. Ленина, д. 1".into()),
        ]))
        .unwrap();
        ds.push(Record::new(vec![Some("Медцентр".into()), None]))
            .unwrap();
        ds
    }

    #[test]
    fn test_csv_header_and_absent_values() {
        let csv = String::from_utf8(to_csv(&sample()).unwrap()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "Название,Адрес");
        assert_eq!(lines[1], r#""Клиника ""Здоровье""","ул. Ленина, д. 1""#);
        assert_eq!(lines[2], "Медцентр,");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_csv_of_empty_dataset_is_header_only() {
        let csv = String::from_utf8(to_csv(&Dataset::new(["ФИО"])).unwrap()).unwrap();
        assert_eq!(csv.lines().collect::<Vec<_>>(), vec!["ФИО"]);
    }

    #[test]
    fn test_xlsx_is_a_zip_archive() {
        let bytes = to_xlsx(&sample(), DEFAULT_SHEET_NAME).unwrap();
        assert!(bytes.starts_with(b"PK"));
    }

    #[test]
    fn test_xlsx_rejects_invalid_sheet_name() {
        assert!(matches!(
            to_xlsx(&sample(), "bad/name"),
            Err(ExportError::Xlsx(_))
        ));
    }
}
