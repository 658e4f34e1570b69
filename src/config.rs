//! Dashboard configuration, read from a TOML file with built-in defaults.

use crate::error::{DashboardError, Result};
use log::info;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "RDV_DASHBOARD_CONFIG";

/// Environment variable overriding the listen address
pub const BIND_ENV: &str = "RDV_BIND";

const DEFAULT_CONFIG_FILE: &str = "dashboard.toml";
const DEFAULT_SHEET_ID: &str = "1oThuV40f0y5rKAMlmyiLVviZ-ITNAQAl0zMevO4fjlg";
const DEFAULT_WORKSHEET: &str = "RDV/jour";
const DEFAULT_SESSION_TTL: u64 = 24 * 60 * 60;

/// Campaigns shown on the page, in display order
pub const DEFAULT_CAMPAIGNS: [&str; 4] = [
    "Plaisirs et Papilles",
    "Portraits Féminins",
    "Regards d'Experts",
    "L'oeil des Experts",
];

/// Where the rows come from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(try_from = "RawSource")]
pub enum SourceConfig {
    /// The Google Sheet named by `sheet_id` / `worksheet`
    #[default]
    Google,

    /// A local CSV or spreadsheet export
    File { path: PathBuf },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSource {
    Tag(String),
    File { path: PathBuf },
}

impl TryFrom<RawSource> for SourceConfig {
    type Error = String;

    fn try_from(raw: RawSource) -> std::result::Result<Self, Self::Error> {
        match raw {
            RawSource::Tag(tag) if tag.eq_ignore_ascii_case("google") => Ok(SourceConfig::Google),
            RawSource::Tag(tag) => Err(format!(
                "unknown source '{}', expected \"google\" or {{ path = \"...\" }}",
                tag
            )),
            RawSource::File { path } => Ok(SourceConfig::File { path }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub sheet_id: String,
    pub worksheet: String,
    pub campaigns: Vec<String>,
    pub bind: String,
    pub source: SourceConfig,
    /// Local credentials file, preferred over the secret store when present
    pub credentials_file: PathBuf,
    pub secrets_file: PathBuf,
    pub session_ttl_secs: u64,
    pub chart_width: u32,
    pub chart_height: u32,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            sheet_id: DEFAULT_SHEET_ID.to_string(),
            worksheet: DEFAULT_WORKSHEET.to_string(),
            campaigns: DEFAULT_CAMPAIGNS.iter().map(|c| c.to_string()).collect(),
            bind: "127.0.0.1:3000".to_string(),
            source: SourceConfig::Google,
            credentials_file: PathBuf::from("credentials.json"),
            secrets_file: PathBuf::from("secrets.toml"),
            session_ttl_secs: DEFAULT_SESSION_TTL,
            chart_width: 900,
            chart_height: 380,
        }
    }
}

impl DashboardConfig {
    /// Parse a TOML document; absent keys keep their defaults
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: DashboardConfig =
            toml::from_str(text).map_err(|e| DashboardError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            DashboardError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    /// Load the configuration the binaries run with.
    ///
    /// Uses `$RDV_DASHBOARD_CONFIG` when set (the file must exist), else
    /// `dashboard.toml` if present, else the defaults. `$RDV_BIND` then
    /// overrides the listen address.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(PathBuf::from(path))?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(DEFAULT_CONFIG_FILE)?
            }
            None => {
                info!("no {} found, using defaults", DEFAULT_CONFIG_FILE);
                Self::default()
            }
        };
        if let Ok(bind) = std::env::var(BIND_ENV) {
            config.bind = bind;
        }
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.campaigns.is_empty() {
            return Err(DashboardError::Config("no campaigns configured".to_string()));
        }
        if self.chart_width == 0 || self.chart_height == 0 {
            return Err(DashboardError::Config(
                "chart dimensions must be positive".to_string(),
            ));
        }
        if self.source == SourceConfig::Google && self.sheet_id.trim().is_empty() {
            return Err(DashboardError::Config("sheet_id is empty".to_string()));
        }
        Ok(())
    }
}
