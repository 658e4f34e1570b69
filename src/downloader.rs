#![cfg(not(tarpaulin_include))]

use crate::campaign::DataTable;
use crate::error::{DashboardError, Result};

/// Convert a campaign's rows to CSV
///
/// The header row carries the sheet labels, quoting follows RFC 4180.
///
/// # Arguments
/// * `table` - Rows of one campaign, as built by `campaign_rows`
///
/// # Returns
/// * `Result<String>` - CSV content or an `Export` error
pub fn to_csv(table: &DataTable) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&table.headers).map_err(export)?;
    for row in &table.rows {
        writer.write_record(row).map_err(export)?;
    }
    let bytes = writer.into_inner().map_err(export)?;
    String::from_utf8(bytes).map_err(export)
}

/// Convert a campaign's rows to XLSX
///
/// Metric columns are written as numbers so the sheet can be summed in
/// Excel; everything else stays text.
#[cfg(feature = "web")]
pub fn to_xlsx(table: &DataTable, sheet_name: &str) -> Result<Vec<u8>> {
    use crate::campaign::Metric;
    use rust_xlsxwriter::Workbook;

    let metric_cols: Vec<bool> = table
        .headers
        .iter()
        .map(|h| Metric::ALL.iter().any(|m| m.label() == h))
        .collect();

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(sheet_name).map_err(export)?;

    for (c, header) in table.headers.iter().enumerate() {
        worksheet
            .write_string(0, c as u16, header.as_str())
            .map_err(export)?;
    }

    for (r, row) in table.rows.iter().enumerate() {
        let xl_row = (r + 1) as u32;
        for (c, value) in row.iter().enumerate() {
            let number = metric_cols
                .get(c)
                .copied()
                .unwrap_or(false)
                .then(|| value.parse::<f64>().ok())
                .flatten();
            match number {
                Some(n) => worksheet.write_number(xl_row, c as u16, n).map_err(export)?,
                None => worksheet
                    .write_string(xl_row, c as u16, value.as_str())
                    .map_err(export)?,
            };
        }
    }

    workbook.save_to_buffer().map_err(export)
}

/// Worksheet names are limited to 31 characters without `[]:*?/\`
pub fn sheet_name_for(campaign: &str) -> String {
    let cleaned: String = campaign
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\'))
        .collect();
    let cleaned = cleaned.trim_matches('\'').trim();
    if cleaned.is_empty() {
        return "RDV".to_string();
    }
    cleaned.chars().take(31).collect()
}

fn export(e: impl std::fmt::Display) -> DashboardError {
    DashboardError::Export(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DataTable {
        DataTable {
            headers: vec![
                "DATE".to_string(),
                "CAMPAGNES".to_string(),
                "NOMBRE DE RDV PRIS".to_string(),
            ],
            rows: vec![vec![
                "24/11/2025".to_string(),
                "Regards d'Experts, édition 2".to_string(),
                "3".to_string(),
            ]],
        }
    }

    #[test]
    fn csv_quotes_commas() {
        let csv = to_csv(&sample()).unwrap();
        assert_eq!(
            csv,
            "DATE,CAMPAGNES,NOMBRE DE RDV PRIS\n24/11/2025,\"Regards d'Experts, édition 2\",3\n"
        );
    }

    #[cfg(feature = "web")]
    #[test]
    fn xlsx_is_a_zip_archive() {
        let bytes = to_xlsx(&sample(), "RDV").unwrap();
        assert!(bytes.starts_with(b"PK"));
    }

    #[test]
    fn sheet_names_are_sanitized() {
        assert_eq!(sheet_name_for("L'oeil des Experts"), "L'oeil des Experts");
        assert_eq!(sheet_name_for("RDV/jour"), "RDVjour");
        assert_eq!(sheet_name_for("'"), "RDV");
        assert_eq!(sheet_name_for(&"x".repeat(40)).len(), 31);
    }
}
