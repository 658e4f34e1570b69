/*!
# RDV Dashboard

A password-protected dashboard of appointment (RDV) counts per lead-generation
campaign, built in Rust.

## Overview

The daily appointment figures live in one worksheet (`RDV/jour` by default)
maintained by hand. Each row carries a date, a campaign name and two counters:
appointments taken (`NOMBRE DE RDV PRIS`) and appointments scheduled
(`NOMBRE DE RDV PLANIFIÉ`). The date is only written on the first row of each
day, so it is carried down to the rows below before anything else happens.

Every page render fetches the worksheet again, normalizes it, and draws one
line chart per configured campaign, with a dashed rule on today's date.

## Architecture

### Data layer
- **loader**: Row sources (Google Sheets API, local CSV, local workbook)
- **table**: Header trimming, DATE forward fill, typed column access
- **campaign**: Per-campaign series extraction, day-first dates, numeric coercion

### Presentation layer
- **graph**: SVG line chart with a today marker and hover tooltips (plotters)
- **dashboard**: One section per campaign, warnings for empty series
- **downloader**: Raw campaign rows as CSV or XLSX

### Web layer
- **login**: Password gate, explicit sessions, auth middleware
- **app**: Routing, templates, startup

### Support
- **config**: TOML configuration with defaults
- **secrets**: Sheet credentials and dashboard password
- **error**: Error types shared by every module

## REST API Endpoints

- `GET /` - Dashboard (redirects to `/login` without a session)
- `GET /login`, `POST /login`, `POST /logout` - Access gate
- `GET /api/campaigns` - Long-form series of every campaign as JSON
- `GET /export/{campaign}?format=csv|xlsx` - Raw rows of one campaign
- `GET /health` - Liveness check
*/

pub mod campaign;
pub mod config;
pub mod downloader;
pub mod error;
pub mod loader;
pub mod secrets;
pub mod table;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod dashboard;
#[cfg(feature = "web")]
pub mod graph;
#[cfg(feature = "web")]
pub mod login;

pub use campaign::{CampaignSeries, Metric, SeriesPoint, extract};
pub use config::DashboardConfig;
pub use error::{DashboardError, Result};
pub use loader::RowSource;
pub use table::{Column, NormalizedTable, RawTable, normalize};
