#![cfg(feature = "web")]
//! Page assembly: one section per configured campaign.

use crate::campaign::{self, CampaignSeries, DataTable};
use crate::config::DashboardConfig;
use crate::error::Result;
use crate::graph::{ChartOptions, render_line_chart};
use crate::loader::RowSource;
use crate::login::SessionContext;
use crate::table::{NormalizedTable, normalize};
use chrono::NaiveDate;
use log::{error, info, warn};
use serde::Serialize;

/// Everything shown for one campaign.
#[derive(Debug, Clone, Serialize)]
pub struct CampaignSection {
    pub campaign: String,
    /// Anchor / URL fragment for the section
    pub slug: String,
    /// Export route of this campaign, percent-encoded
    pub export_path: String,
    pub series: CampaignSeries,
    /// Raw-data table under the chart
    pub data: DataTable,
    /// SVG chart, absent when the series is empty or drawing failed
    pub chart: Option<String>,
    /// Shown in place of (or above) the chart
    pub warning: Option<String>,
    pub near_misses: Vec<String>,
    pub total_pris: String,
    pub total_planifie: String,
}

/// The whole dashboard for one render.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardPage {
    pub today: String,
    /// Column labels detected in the worksheet
    pub columns: Vec<String>,
    pub row_count: usize,
    pub sections: Vec<CampaignSection>,
}

/// Build the section of one campaign.
///
/// Never fails: an empty series turns into a warning, and so does a chart
/// the backend could not draw (the raw-data table is still shown).
pub fn render_campaign_section(
    table: &NormalizedTable,
    campaign_label: &str,
    today: NaiveDate,
    options: &ChartOptions,
) -> CampaignSection {
    let series = campaign::extract(table, campaign_label);
    let data = campaign::campaign_rows(table, &series);
    let near_misses = campaign::near_misses(table, campaign_label);
    let (pris, planifie) = series.totals();

    let mut warning = None;
    let mut chart = None;

    if series.is_empty() {
        let mut message = format!("Aucune donnée trouvée pour '{}'.", campaign_label);
        if !near_misses.is_empty() {
            let quoted: Vec<String> = near_misses.iter().map(|v| format!("'{}'", v)).collect();
            warn!(
                "'{}' has no exact match; near misses in CAMPAGNES: {}",
                campaign_label,
                quoted.join(", ")
            );
            message.push_str(&format!(
                " Valeurs proches dans la colonne CAMPAGNES : {} (vérifiez l'orthographe exacte).",
                quoted.join(", ")
            ));
        }
        warning = Some(message);
    } else {
        let options = ChartOptions {
            title: String::new(),
            ..options.clone()
        };
        match render_line_chart(&series, today, &options) {
            Ok(svg) => chart = Some(svg),
            Err(e) => {
                error!("chart for '{}' failed: {}", campaign_label, e);
                warning = Some(format!("Graphique indisponible : {}", e));
            }
        }
    }

    CampaignSection {
        campaign: campaign_label.to_string(),
        slug: slugify(campaign_label),
        export_path: format!("/export/{}", urlencoding::encode(campaign_label)),
        series,
        data,
        chart,
        warning,
        near_misses,
        total_pris: campaign::format_number(pris),
        total_planifie: campaign::format_number(planifie),
    }
}

/// Fetch, normalize and build every configured campaign section.
///
/// # Arguments
/// * `session` - Visitor session; nothing is fetched unless it is authenticated
/// * `source` - Where the worksheet rows come from
/// * `config` - Sheet id, worksheet, campaign list and chart size
/// * `today` - Reference date for the marker line
///
/// # Errors
/// * `Auth` when the session is not authenticated
/// * `Connection` from the row source, `Schema` when `DATE` is missing;
///   both stop the whole render, no section is produced
pub fn render_dashboard(
    session: &SessionContext,
    source: &dyn RowSource,
    config: &DashboardConfig,
    today: NaiveDate,
) -> Result<DashboardPage> {
    session.require()?;

    let table = load_table(source, config)?;
    let options = ChartOptions {
        title: String::new(),
        width: config.chart_width,
        height: config.chart_height,
    };

    let sections = config
        .campaigns
        .iter()
        .map(|label| render_campaign_section(&table, label, today, &options))
        .collect();

    Ok(DashboardPage {
        today: today.format("%d/%m/%Y").to_string(),
        columns: table.labels().to_vec(),
        row_count: table.len(),
        sections,
    })
}

/// Row source -> normalized table, shared by the page and the JSON/export routes
pub fn load_table(source: &dyn RowSource, config: &DashboardConfig) -> Result<NormalizedTable> {
    let raw = source.fetch_rows(&config.sheet_id, &config.worksheet)?;
    info!(
        "fetched {} rows from {} (columns: {:?})",
        raw.len(),
        source.describe(),
        raw.headers
    );
    Ok(normalize(&raw)?)
}

/// Lowercase ASCII slug: `L'oeil des Experts` -> `l-oeil-des-experts`
pub fn slugify(label: &str) -> String {
    let mut slug = String::with_capacity(label.len());
    for c in label.chars() {
        let c = match c {
            'à' | 'â' | 'ä' | 'À' | 'Â' => 'a',
            'é' | 'è' | 'ê' | 'ë' | 'É' | 'È' | 'Ê' => 'e',
            'î' | 'ï' => 'i',
            'ô' | 'ö' => 'o',
            'ù' | 'û' | 'ü' => 'u',
            'ç' | 'Ç' => 'c',
            other => other,
        };
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}
