#![cfg(not(tarpaulin_include))]

use rdv_dashboard::{app, config::DashboardConfig};

/// Main entry point for the dashboard server
///
/// Reads `dashboard.toml` (or `$RDV_DASHBOARD_CONFIG`), resolves the
/// secrets and serves until interrupted. Log level defaults to `info`,
/// `RUST_LOG` overrides it.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = DashboardConfig::load()?;
    log::info!(
        "dashboard for sheet {} / '{}', campaigns: {:?}",
        config.sheet_id,
        config.worksheet,
        config.campaigns
    );

    app::run(config).await
}
