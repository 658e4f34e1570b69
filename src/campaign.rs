use crate::error::CellParseError;
use crate::table::{Column, NormalizedTable};
use chrono::{Datelike, Local, NaiveDate};
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use serde::Serialize;

lazy_static! {
    // day, month, year with an optional time part that is ignored
    static ref DAY_FIRST_REGEX: Regex =
        Regex::new(r"^(\d{1,2})[/.\-](\d{1,2})[/.\-](\d{4}|\d{2})(?:[ T]\d{1,2}:\d{2}(?::\d{2})?)?$")
            .unwrap();
    static ref ISO_DATE_REGEX: Regex =
        Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})(?:[ T]\d{1,2}:\d{2}(?::\d{2})?)?$").unwrap();
}

/// The two plotted measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Metric {
    RdvPris,
    RdvPlanifie,
}

impl Metric {
    pub const ALL: [Metric; 2] = [Metric::RdvPris, Metric::RdvPlanifie];

    pub fn label(&self) -> &'static str {
        self.column().label()
    }

    pub fn column(&self) -> Column {
        match self {
            Metric::RdvPris => Column::RdvPris,
            Metric::RdvPlanifie => Column::RdvPlanifie,
        }
    }

    /// Line colour, hex
    pub fn color(&self) -> &'static str {
        match self {
            Metric::RdvPris => "#3366cc",
            Metric::RdvPlanifie => "#dc3912",
        }
    }

    pub fn value(&self, point: &SeriesPoint) -> f64 {
        match self {
            Metric::RdvPris => point.rdv_pris,
            Metric::RdvPlanifie => point.rdv_planifie,
        }
    }
}

/// One day of one campaign.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub rdv_pris: f64,
    pub rdv_planifie: f64,
    /// Index of the row in the normalized table
    pub source_row: usize,
}

/// Chronological series for a single campaign.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignSeries {
    pub campaign: String,
    pub points: Vec<SeriesPoint>,
}

/// Tidy form record: one (date, metric, value) triple.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LongRecord {
    pub date: NaiveDate,
    pub metric: &'static str,
    pub value: f64,
}

impl CampaignSeries {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Reshape into long form, metrics in [`Metric::ALL`] order for each point
    pub fn to_long_form(&self) -> Vec<LongRecord> {
        self.points
            .iter()
            .flat_map(|p| {
                Metric::ALL.iter().map(move |m| LongRecord {
                    date: p.date,
                    metric: m.label(),
                    value: m.value(p),
                })
            })
            .collect()
    }

    /// Sum of (taken, planned) over the whole series
    pub fn totals(&self) -> (f64, f64) {
        self.points.iter().fold((0.0, 0.0), |(pris, planifie), p| {
            (pris + p.rdv_pris, planifie + p.rdv_planifie)
        })
    }

    /// First and last date, if any
    pub fn date_span(&self) -> Option<(NaiveDate, NaiveDate)> {
        let first = self.points.first()?.date;
        let last = self.points.last()?.date;
        Some((first, last))
    }
}

/// Rows of one campaign as shown in the raw-data table and in exports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// The table rows behind a series, in series order, with the parsed date
/// and the coerced numbers written back into their columns.
pub fn campaign_rows(table: &NormalizedTable, series: &CampaignSeries) -> DataTable {
    let headers = table.labels().to_vec();
    let position = |column: Column| headers.iter().position(|h| h == column.label());
    let date_pos = position(Column::Date);
    let metric_pos: Vec<(usize, Metric)> = Metric::ALL
        .iter()
        .filter_map(|m| position(m.column()).map(|pos| (pos, *m)))
        .collect();

    let rows = series
        .points
        .iter()
        .filter_map(|p| {
            let mut row: Vec<String> = table
                .row(p.source_row)?
                .into_iter()
                .map(str::to_string)
                .collect();
            if let Some(pos) = date_pos {
                row[pos] = p.date.format("%d/%m/%Y").to_string();
            }
            for (pos, metric) in &metric_pos {
                row[*pos] = format_number(metric.value(p));
            }
            Some(row)
        })
        .collect();

    DataTable { headers, rows }
}

/// `12` rather than `12.0` for whole numbers
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.0}", value)
    } else {
        value.to_string()
    }
}

/// Build the series of one campaign from the normalized table.
///
/// Rows are selected by exact equality of their `CAMPAGNES` cell with
/// `campaign` (no trimming, case-sensitive). Selected rows whose `DATE`
/// does not parse day-first are dropped; unparseable numbers count as zero.
/// The result is sorted by date, equal dates keeping their sheet order.
///
/// Never fails: no match, a missing `CAMPAGNES` column or all dates bad
/// all give an empty series.
pub fn extract(table: &NormalizedTable, campaign: &str) -> CampaignSeries {
    let mut points = Vec::new();

    let Some(campaigns) = table.column(Column::Campaign) else {
        debug!("no CAMPAGNES column, '{}' is empty", campaign);
        return CampaignSeries {
            campaign: campaign.to_string(),
            points,
        };
    };

    for (row, _) in campaigns
        .iter()
        .enumerate()
        .filter(|(_, c)| c.as_str() == campaign)
    {
        let raw_date = table.cell(Column::Date, row).unwrap_or_default();
        let date = match parse_day_first(raw_date) {
            Ok(date) => date,
            Err(e) => {
                debug!("'{}' row {} dropped: {}", campaign, row, e);
                continue;
            }
        };

        points.push(SeriesPoint {
            date,
            rdv_pris: coerce_number(table.cell(Column::RdvPris, row)),
            rdv_planifie: coerce_number(table.cell(Column::RdvPlanifie, row)),
            source_row: row,
        });
    }

    // sort_by_key is stable
    points.sort_by_key(|p| p.date);

    CampaignSeries {
        campaign: campaign.to_string(),
        points,
    }
}

/// Parse a date written day first (`24/11/2025`, `24-11-25`, `24.11.2025 10:30`).
///
/// ISO `YYYY-MM-DD` is also accepted since its year-first shape is
/// unambiguous. A two-digit year is placed in the century that puts it
/// within 50 years of the current year (`99` is 1999, `25` is 2025).
pub fn parse_day_first(value: &str) -> Result<NaiveDate, CellParseError> {
    parse_day_first_at(value, Local::now().year())
}

/// [`parse_day_first`] with an explicit current year for two-digit years
pub fn parse_day_first_at(value: &str, current_year: i32) -> Result<NaiveDate, CellParseError> {
    let trimmed = value.trim();
    let bad = || CellParseError::Date(value.to_string());

    let (year, month, day) = if let Some(caps) = DAY_FIRST_REGEX.captures(trimmed) {
        let year_str = &caps[3];
        let mut year: i32 = year_str.parse().map_err(|_| bad())?;
        if year_str.len() == 2 {
            year = expand_two_digit_year(year, current_year);
        }
        let month: u32 = caps[2].parse().map_err(|_| bad())?;
        let day: u32 = caps[1].parse().map_err(|_| bad())?;
        (year, month, day)
    } else if let Some(caps) = ISO_DATE_REGEX.captures(trimmed) {
        let year: i32 = caps[1].parse().map_err(|_| bad())?;
        let month: u32 = caps[2].parse().map_err(|_| bad())?;
        let day: u32 = caps[3].parse().map_err(|_| bad())?;
        (year, month, day)
    } else {
        return Err(bad());
    };

    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(bad)
}

fn expand_two_digit_year(year: i32, current_year: i32) -> i32 {
    let year = year + current_year.div_euclid(100) * 100;
    if year >= current_year + 50 {
        year - 100
    } else if year < current_year - 50 {
        year + 100
    } else {
        year
    }
}

/// Parse a numeric cell, anything unusable becomes `0`.
pub fn coerce_number(value: Option<&str>) -> f64 {
    match value.map(parse_number) {
        Some(Ok(n)) => n,
        Some(Err(e)) => {
            debug!("{}, using 0", e);
            0.0
        }
        None => 0.0,
    }
}

fn parse_number(value: &str) -> Result<f64, CellParseError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(0.0);
    }
    match trimmed.parse::<f64>() {
        Ok(n) if n.is_finite() => Ok(n),
        Ok(_) => Ok(0.0),
        Err(_) => Err(CellParseError::Number(value.to_string())),
    }
}

/// `CAMPAGNES` values that would match `campaign` if whitespace and letter
/// case were ignored, but do not match it exactly.
///
/// Only used to explain an empty chart; the filter itself stays exact.
pub fn near_misses(table: &NormalizedTable, campaign: &str) -> Vec<String> {
    let wanted = campaign.trim().to_lowercase();
    let mut found: Vec<String> = Vec::new();
    if let Some(values) = table.column(Column::Campaign) {
        for value in values {
            if value != campaign
                && value.trim().to_lowercase() == wanted
                && !found.contains(value)
            {
                found.push(value.clone());
            }
        }
    }
    found
}
