#![cfg(not(tarpaulin_include))]

use rdv_dashboard::campaign::{self, format_number};
use rdv_dashboard::config::DashboardConfig;
use rdv_dashboard::loader::source_from_path;
use rdv_dashboard::table::normalize;
use std::env;

/// Print every configured campaign's series from a local export of the
/// worksheet, without starting the server.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args.len() > 3 {
        eprintln!("Usage: {} <export.csv|export.xlsx> [worksheet]", args[0]);
        return Ok(());
    }

    let config = DashboardConfig::load()?;
    let worksheet = args.get(2).unwrap_or(&config.worksheet);

    let source = source_from_path(&args[1])?;
    let raw = source.fetch_rows(&config.sheet_id, worksheet)?;
    let table = normalize(&raw)?;
    println!("{} rows, columns: {}", table.len(), table.labels().join(" | "));

    for label in &config.campaigns {
        println!();
        println!("== {} ==", label);

        let series = campaign::extract(&table, label);
        if series.is_empty() {
            println!("  no data");
            let misses = campaign::near_misses(&table, label);
            if !misses.is_empty() {
                println!("  near misses in CAMPAGNES: {:?}", misses);
            }
            continue;
        }

        println!("  {:<12}{:>8}{:>12}", "DATE", "PRIS", "PLANIFIÉ");
        for point in &series.points {
            println!(
                "  {:<12}{:>8}{:>12}",
                point.date.format("%d/%m/%Y").to_string(),
                format_number(point.rdv_pris),
                format_number(point.rdv_planifie)
            );
        }
        let (pris, planifie) = series.totals();
        println!(
            "  {:<12}{:>8}{:>12}",
            "total",
            format_number(pris),
            format_number(planifie)
        );
    }

    Ok(())
}
