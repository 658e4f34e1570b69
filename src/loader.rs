#![cfg(not(tarpaulin_include))]

use crate::error::{DashboardError, Result};
use crate::table::RawTable;
use log::{debug, info};
use std::path::{Path, PathBuf};

/// Anything that can hand over the worksheet as rows of strings.
///
/// The first row returned is the header row. Implementations map every
/// authentication, network or lookup failure to
/// [`DashboardError::Connection`].
pub trait RowSource: Send + Sync {
    fn fetch_rows(&self, sheet_id: &str, worksheet: &str) -> Result<RawTable>;

    /// Short human-readable description used in logs
    fn describe(&self) -> String;
}

/// Rows already in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    table: RawTable,
}

impl MemorySource {
    pub fn new(table: RawTable) -> Self {
        Self { table }
    }
}

impl RowSource for MemorySource {
    fn fetch_rows(&self, _sheet_id: &str, _worksheet: &str) -> Result<RawTable> {
        Ok(self.table.clone())
    }

    fn describe(&self) -> String {
        format!("memory ({} rows)", self.table.len())
    }
}

/// A CSV export of the worksheet
///
/// The sheet id and worksheet name are ignored: the file is the worksheet.
#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RowSource for CsvSource {
    fn fetch_rows(&self, _sheet_id: &str, _worksheet: &str) -> Result<RawTable> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)
            .map_err(|e| connection(&self.path, e))?;

        let mut grid = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| connection(&self.path, e))?;
            grid.push(record.iter().map(str::to_string).collect());
        }
        debug!("read {} records from {}", grid.len(), self.path.display());
        Ok(RawTable::from_rows(grid))
    }

    fn describe(&self) -> String {
        format!("csv file {}", self.path.display())
    }
}

/// A local workbook (`.xlsx`, `.xlsm`, `.xls`, `.ods`) read with calamine.
///
/// Every cell is turned into the text a spreadsheet would display, so the
/// downstream parsing is the same as for the Sheets API. Date cells are
/// written `DD/MM/YYYY`.
#[derive(Debug, Clone)]
pub struct ExcelSource {
    path: PathBuf,
}

impl ExcelSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RowSource for ExcelSource {
    fn fetch_rows(&self, _sheet_id: &str, worksheet: &str) -> Result<RawTable> {
        use calamine::{Reader, open_workbook_auto};

        let mut workbook = open_workbook_auto(&self.path).map_err(|e| connection(&self.path, e))?;

        if !workbook.sheet_names().iter().any(|name| name == worksheet) {
            return Err(DashboardError::Connection(format!(
                "worksheet '{}' not found in {}",
                worksheet,
                self.path.display()
            )));
        }

        let range = workbook
            .worksheet_range(worksheet)
            .map_err(|e| connection(&self.path, e))?;

        let grid: Vec<Vec<String>> = range
            .rows()
            .map(|row| row.iter().map(cell_text).collect())
            .collect();
        debug!(
            "read {} rows from {}:{}",
            grid.len(),
            self.path.display(),
            worksheet
        );
        Ok(RawTable::from_rows(grid))
    }

    fn describe(&self) -> String {
        format!("workbook {}", self.path.display())
    }
}

fn cell_text(cell: &calamine::Data) -> String {
    use calamine::{Data, DataType};

    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(_) | Data::Float(_) | Data::Bool(_) => cell.to_string(),
        other => other
            .as_date()
            .map(|d| d.format("%d/%m/%Y").to_string())
            .unwrap_or_else(|| other.to_string()),
    }
}

fn connection(path: &Path, err: impl std::fmt::Display) -> DashboardError {
    DashboardError::Connection(format!("{}: {}", path.display(), err))
}

/// Pick a file source from the extension
///
/// # Arguments
/// * `path` - CSV or workbook export of the worksheet
///
/// # Returns
/// * `Result<Box<dyn RowSource>>` - The source, or a `Config` error for an unknown extension
pub fn source_from_path(path: impl AsRef<Path>) -> Result<Box<dyn RowSource>> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase());

    let source: Box<dyn RowSource> = match extension.as_deref() {
        Some("csv") => Box::new(CsvSource::new(path)),
        Some("xlsx") | Some("xlsm") | Some("xls") | Some("ods") => Box::new(ExcelSource::new(path)),
        Some(ext) => {
            return Err(DashboardError::Config(format!(
                "unsupported file extension: {}",
                ext
            )));
        }
        None => return Err(DashboardError::Config("file has no extension".to_string())),
    };
    info!("row source: {}", source.describe());
    Ok(source)
}

#[cfg(feature = "web")]
pub use google::GoogleSheetsSource;

#[cfg(feature = "web")]
mod google {
    use super::RowSource;
    use crate::error::{DashboardError, Result};
    use crate::secrets::{ServiceAccountKey, SheetCredentials};
    use crate::table::RawTable;
    use jsonwebtoken::{Algorithm, EncodingKey, Header};
    use log::{debug, info};
    use reqwest::StatusCode;
    use reqwest::blocking::Client;
    use serde::{Deserialize, Serialize};
    use std::sync::Mutex;
    use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

    const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
    const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets.readonly";
    const JWT_BEARER: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
    const ASSERTION_LIFETIME: u64 = 3600;

    /// JWT claims of a service-account token request
    #[derive(Debug, Serialize)]
    struct Claims<'a> {
        iss: &'a str,
        scope: &'a str,
        aud: &'a str,
        iat: u64,
        exp: u64,
    }

    #[derive(Debug, Deserialize)]
    struct TokenResponse {
        access_token: String,
        #[serde(default = "default_expiry")]
        expires_in: u64,
    }

    fn default_expiry() -> u64 {
        ASSERTION_LIFETIME
    }

    struct CachedToken {
        value: String,
        refresh_at: Instant,
    }

    #[derive(Debug, Deserialize)]
    struct ValueRange {
        #[serde(default)]
        values: Vec<Vec<serde_json::Value>>,
    }

    /// Google Sheets API v4 `values.get` over blocking reqwest.
    ///
    /// The HTTP client is built per fetch: a blocking client must not be
    /// created or dropped on an async runtime thread, and fetches run on
    /// the blocking pool.
    pub struct GoogleSheetsSource {
        credentials: SheetCredentials,
        base_url: String,
        token: Mutex<Option<CachedToken>>,
    }

    impl GoogleSheetsSource {
        pub fn new(credentials: SheetCredentials) -> Self {
            Self {
                credentials,
                base_url: SHEETS_API.to_string(),
                token: Mutex::new(None),
            }
        }

        /// Point the source at another API root (a proxy or a local stub)
        pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
            self.base_url = base_url.into();
            self
        }

        pub(crate) fn values_url(&self, sheet_id: &str, worksheet: &str) -> String {
            // quoted so names containing '/' or spaces are read as a sheet title
            let range = format!("'{}'", worksheet.replace('\'', "''"));
            format!(
                "{}/{}/values/{}?majorDimension=ROWS&valueRenderOption=FORMATTED_VALUE",
                self.base_url.trim_end_matches('/'),
                urlencoding::encode(sheet_id),
                urlencoding::encode(&range)
            )
        }
    }

    impl GoogleSheetsSource {
        /// Access token for a service account, reused until a minute
        /// before it expires
        fn service_account_token(&self, client: &Client, key: &ServiceAccountKey) -> Result<String> {
            let mut cached = self.token.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(token) = cached.as_ref() {
                if Instant::now() < token.refresh_at {
                    return Ok(token.value.clone());
                }
            }

            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default();
            let assertion = sign_assertion(key, now)?;

            debug!("requesting an access token for {}", key.client_email);
            let response = client
                .post(&key.token_uri)
                .form(&[("grant_type", JWT_BEARER), ("assertion", assertion.as_str())])
                .send()
                .map_err(|e| DashboardError::Connection(e.to_string()))?;
            if !response.status().is_success() {
                return Err(DashboardError::Connection(format!(
                    "token request for {} refused ({})",
                    key.client_email,
                    response.status()
                )));
            }
            let body: TokenResponse = response
                .json()
                .map_err(|e| DashboardError::Connection(format!("bad token response: {}", e)))?;

            *cached = Some(CachedToken {
                value: body.access_token.clone(),
                refresh_at: Instant::now() + Duration::from_secs(body.expires_in.saturating_sub(60)),
            });
            Ok(body.access_token)
        }
    }

    /// Signed RS256 assertion for the OAuth JWT-bearer grant
    pub(crate) fn sign_assertion(key: &ServiceAccountKey, now: u64) -> Result<String> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes()).map_err(|e| {
            DashboardError::Connection(format!("invalid private key for {}: {}", key.client_email, e))
        })?;
        let mut header = Header::new(Algorithm::RS256);
        header.kid = key.private_key_id.clone();
        let claims = Claims {
            iss: &key.client_email,
            scope: SHEETS_SCOPE,
            aud: &key.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME,
        };
        jsonwebtoken::encode(&header, &claims, &encoding_key)
            .map_err(|e| DashboardError::Connection(format!("cannot sign token request: {}", e)))
    }

    impl RowSource for GoogleSheetsSource {
        fn fetch_rows(&self, sheet_id: &str, worksheet: &str) -> Result<RawTable> {
            let client = reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .map_err(|e| DashboardError::Connection(e.to_string()))?;

            let url = self.values_url(sheet_id, worksheet);
            let request = match &self.credentials {
                SheetCredentials::ApiKey { api_key } => {
                    client.get(&url).query(&[("key", api_key.as_str())])
                }
                SheetCredentials::AccessToken { access_token } => {
                    client.get(&url).bearer_auth(access_token)
                }
                SheetCredentials::ServiceAccount(key) => {
                    let token = self.service_account_token(&client, key)?;
                    client.get(&url).bearer_auth(token)
                }
            };

            info!("fetching '{}' from sheet {}", worksheet, sheet_id);
            let response = request
                .send()
                .map_err(|e| DashboardError::Connection(e.to_string()))?;

            match response.status() {
                status if status.is_success() => {}
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    return Err(DashboardError::Connection(format!(
                        "access to sheet {} refused ({})",
                        sheet_id,
                        response.status()
                    )));
                }
                StatusCode::NOT_FOUND => {
                    return Err(DashboardError::Connection(format!(
                        "sheet {} not found",
                        sheet_id
                    )));
                }
                StatusCode::BAD_REQUEST => {
                    return Err(DashboardError::Connection(format!(
                        "worksheet '{}' not found in sheet {}",
                        worksheet, sheet_id
                    )));
                }
                status => {
                    return Err(DashboardError::Connection(format!(
                        "Sheets API answered {}",
                        status
                    )));
                }
            }

            let body: ValueRange = response
                .json()
                .map_err(|e| DashboardError::Connection(format!("bad Sheets API payload: {}", e)))?;
            debug!("received {} rows", body.values.len());

            let grid = body
                .values
                .into_iter()
                .map(|row| row.into_iter().map(value_text).collect())
                .collect();
            Ok(RawTable::from_rows(grid))
        }

        fn describe(&self) -> String {
            format!("google sheets ({})", self.base_url)
        }
    }

    fn value_text(value: serde_json::Value) -> String {
        match value {
            serde_json::Value::String(s) => s,
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn csv_source_keeps_ragged_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rdv.csv");
        fs::write(
            &path,
            "DATE,CAMPAGNES,NOMBRE DE RDV PRIS\n24/11/2025,\"Regards d'Experts\",3\n,Portraits Féminins\n",
        )
        .unwrap();

        let raw = CsvSource::new(&path).fetch_rows("", "").unwrap();
        assert_eq!(raw.headers, vec!["DATE", "CAMPAGNES", "NOMBRE DE RDV PRIS"]);
        assert_eq!(raw.rows.len(), 2);
        assert_eq!(raw.rows[1], vec!["", "Portraits Féminins"]);
    }

    #[test]
    fn missing_file_is_a_connection_error() {
        let err = CsvSource::new("/nonexistent/rdv.csv")
            .fetch_rows("", "")
            .unwrap_err();
        assert!(matches!(err, DashboardError::Connection(_)));
    }

    #[test]
    fn source_from_path_dispatches_on_extension() {
        assert!(source_from_path("export.CSV").is_ok());
        assert!(source_from_path("export.xlsx").is_ok());
        assert!(matches!(
            source_from_path("export.txt"),
            Err(DashboardError::Config(_))
        ));
        assert!(source_from_path("export").is_err());
    }

    #[cfg(feature = "web")]
    fn write_workbook(path: &Path) {
        use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.set_name("RDV jour").unwrap();
        sheet.write_string(0, 0, "DATE").unwrap();
        sheet.write_string(0, 1, "CAMPAGNES").unwrap();
        sheet.write_string(0, 2, "NOMBRE DE RDV PRIS").unwrap();

        let date = ExcelDateTime::from_ymd(2025, 11, 24).unwrap();
        let day_first = Format::new().set_num_format("dd/mm/yyyy");
        sheet
            .write_datetime_with_format(1, 0, &date, &day_first)
            .unwrap();
        sheet.write_string(1, 1, "Plaisirs et Papilles").unwrap();
        sheet.write_number(1, 2, 3.0).unwrap();
        sheet.write_string(2, 1, "Plaisirs et Papilles").unwrap();
        sheet.write_number(2, 2, 2.0).unwrap();
        workbook.save(path).unwrap();
    }

    #[cfg(feature = "web")]
    #[test]
    fn excel_source_reads_date_cells_day_first() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rdv.xlsx");
        write_workbook(&path);

        let raw = ExcelSource::new(&path).fetch_rows("", "RDV jour").unwrap();
        assert_eq!(raw.headers, vec!["DATE", "CAMPAGNES", "NOMBRE DE RDV PRIS"]);
        assert_eq!(raw.rows[0], vec!["24/11/2025", "Plaisirs et Papilles", "3"]);
        assert_eq!(raw.rows[1], vec!["", "Plaisirs et Papilles", "2"]);

        let table = crate::table::normalize(&raw).unwrap();
        let series = crate::campaign::extract(&table, "Plaisirs et Papilles");
        assert_eq!(series.len(), 2);
        assert!(
            series
                .points
                .iter()
                .all(|p| p.date == chrono::NaiveDate::from_ymd_opt(2025, 11, 24).unwrap())
        );
    }

    #[cfg(feature = "web")]
    #[test]
    fn excel_source_needs_the_named_worksheet() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rdv.xlsx");
        write_workbook(&path);

        match ExcelSource::new(&path).fetch_rows("", "RDV/jour") {
            Err(DashboardError::Connection(message)) => {
                assert!(message.contains("worksheet 'RDV/jour' not found"))
            }
            other => panic!("expected a connection error, got {:?}", other),
        }
    }

    #[test]
    fn memory_source_returns_its_table() {
        let table = RawTable::from_rows(vec![vec!["DATE".to_string()]]);
        let source = MemorySource::new(table.clone());
        assert_eq!(source.fetch_rows("id", "ws").unwrap(), table);
    }
}
