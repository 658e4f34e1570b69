#![cfg(not(tarpaulin_include))]
#![cfg(feature = "web")]
use crate::campaign::{CampaignSeries, Metric};
use chrono::{Datelike, NaiveDate};
use handlebars::html_escape;
use plotters::prelude::*;
use std::fmt::Write as _;

/// Configuration options for chart generation
#[derive(Clone, Debug)]
pub struct ChartOptions {
    /// Title displayed at the top of the chart
    pub title: String,

    /// Width of the chart in pixels
    pub width: u32,

    /// Height of the chart in pixels
    pub height: u32,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            title: String::new(),
            width: 900,
            height: 380,
        }
    }
}

/// Error raised by the plotting backend, flattened to its message
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ChartError(pub String);

impl<E: std::error::Error + Send + Sync> From<DrawingAreaErrorKind<E>> for ChartError {
    fn from(e: DrawingAreaErrorKind<E>) -> Self {
        ChartError(e.to_string())
    }
}

/// X and Y extent of a chart, x in days since the common era
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartBounds {
    pub x_min: i32,
    pub x_max: i32,
    pub y_max: f64,
}

/// Compute the plotted extent: the series dates widened to include `today`
/// with one day of margin on each side, and y from 0 to 10% above the
/// highest value (at least 1).
pub fn chart_bounds(series: &CampaignSeries, today: NaiveDate) -> ChartBounds {
    let today_x = day_number(today);
    let (first, last) = series
        .date_span()
        .map(|(a, b)| (day_number(a), day_number(b)))
        .unwrap_or((today_x, today_x));

    let highest = series
        .points
        .iter()
        .flat_map(|p| [p.rdv_pris, p.rdv_planifie])
        .fold(0.0_f64, f64::max);

    ChartBounds {
        x_min: first.min(today_x) - 1,
        x_max: last.max(today_x) + 1,
        y_max: (highest * 1.1).max(1.0),
    }
}

fn day_number(date: NaiveDate) -> i32 {
    date.num_days_from_ce()
}

fn format_day(day: i32) -> String {
    NaiveDate::from_num_days_from_ce_opt(day)
        .map(|d| d.format("%d/%m").to_string())
        .unwrap_or_default()
}

fn metric_color(metric: Metric) -> RGBColor {
    match metric {
        Metric::RdvPris => RGBColor(0x33, 0x66, 0xcc),
        Metric::RdvPlanifie => RGBColor(0xdc, 0x39, 0x12),
    }
}

/// A data point placed in pixel space, used for the hover layer
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedPoint {
    pub metric: Metric,
    pub date: NaiveDate,
    pub value: f64,
    pub x: i32,
    pub y: i32,
}

/// Renders a campaign series as an SVG line chart
///
/// One line per metric with point markers, a legend, and a dashed rule marking
/// `today`. After the plotters drawing, an extra layer of transparent
/// circles is appended, grouped per metric (`<g class="rdv-points"
/// data-metric="...">`), each carrying a `<title>` so browsers show a
/// date/metric/value tooltip on hover and the page script can dim the
/// other metric when a legend entry is clicked.
///
/// # Arguments
/// * `series` - Sorted series of one campaign
/// * `today` - Reference date for the marker rule
/// * `options` - Size and title
///
/// # Returns
/// * A Result containing the SVG document or a `ChartError`
pub fn render_line_chart(
    series: &CampaignSeries,
    today: NaiveDate,
    options: &ChartOptions,
) -> Result<String, ChartError> {
    let bounds = chart_bounds(series, today);
    let today_x = day_number(today);
    let mut svg = String::new();
    let mut placed = Vec::with_capacity(series.len() * Metric::ALL.len());

    {
        let root = SVGBackend::with_string(&mut svg, (options.width, options.height))
            .into_drawing_area();
        root.fill(&WHITE)?;

        let mut builder = ChartBuilder::on(&root);
        builder
            .margin(10)
            .x_label_area_size(30)
            .y_label_area_size(40);
        if !options.title.is_empty() {
            builder.caption(&options.title, ("sans-serif", 20).into_font());
        }
        let mut chart =
            builder.build_cartesian_2d(bounds.x_min..bounds.x_max, 0.0..bounds.y_max)?;

        chart
            .configure_mesh()
            .x_labels(10)
            .x_label_formatter(&|d| format_day(*d))
            .y_desc("RDV")
            .draw()?;

        for metric in Metric::ALL {
            let color = metric_color(metric);
            let points: Vec<(i32, f64)> = series
                .points
                .iter()
                .map(|p| (day_number(p.date), metric.value(p)))
                .collect();

            chart
                .draw_series(LineSeries::new(points.clone(), color.stroke_width(2)))?
                .label(metric.label())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
            chart.draw_series(
                points
                    .iter()
                    .map(|&point| Circle::new(point, 3, color.filled())),
            )?;

            for (p, (x, y)) in series.points.iter().zip(points) {
                let (px, py) = chart.backend_coord(&(x, y));
                placed.push(PlacedPoint {
                    metric,
                    date: p.date,
                    value: y,
                    x: px,
                    y: py,
                });
            }
        }

        // dashed "today" rule, drawn as short segments
        let dash = bounds.y_max / 40.0;
        let rule = BLACK.mix(0.6).stroke_width(1);
        chart.draw_series((0..40).step_by(2).map(|i| {
            let y0 = i as f64 * dash;
            PathElement::new(vec![(today_x, y0), (today_x, y0 + dash)], rule)
        }))?;
        chart.draw_series(std::iter::once(Text::new(
            "aujourd'hui",
            (today_x, bounds.y_max),
            ("sans-serif", 12).into_font(),
        )))?;

        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperLeft)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;

        root.present()?;
    }

    let overlay = hover_layer(&placed);
    match svg.rfind("</svg>") {
        Some(end) => svg.insert_str(end, &overlay),
        None => return Err(ChartError("backend produced no svg root".to_string())),
    }
    Ok(svg)
}

/// Transparent hover targets with tooltips, one group per metric
pub fn hover_layer(points: &[PlacedPoint]) -> String {
    let mut out = String::new();
    for metric in Metric::ALL {
        let _ = write!(
            out,
            r#"<g class="rdv-points" data-metric="{}" data-color="{}">"#,
            html_escape(metric.label()),
            metric.color()
        );
        for p in points.iter().filter(|p| p.metric == metric) {
            let _ = write!(
                out,
                r#"<circle cx="{}" cy="{}" r="5" fill="{}" fill-opacity="0.01"><title>{} | {} : {}</title></circle>"#,
                p.x,
                p.y,
                metric.color(),
                p.date.format("%d/%m/%Y"),
                html_escape(metric.label()),
                p.value
            );
        }
        out.push_str("</g>");
    }
    out
}
