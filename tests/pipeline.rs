use chrono::NaiveDate;
use rdv_dashboard::campaign::{self, SeriesPoint};
use rdv_dashboard::loader::{RowSource, source_from_path};
use rdv_dashboard::table::{Column, RawTable, normalize};
use std::io::Write;

fn grid(rows: &[&[&str]]) -> RawTable {
    RawTable::from_rows(
        rows.iter()
            .map(|r| r.iter().map(|s| s.to_string()).collect())
            .collect(),
    )
}

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn forward_filled_rows_keep_their_day() {
    let raw = grid(&[
        &["DATE", "CAMPAGNES", "NOMBRE DE RDV PRIS", "NOMBRE DE RDV PLANIFIÉ"],
        &["24/11/2025", "Plaisirs et Papilles", "3", "5"],
        &["", "Plaisirs et Papilles", "2", ""],
    ]);
    let table = normalize(&raw).unwrap();
    let series = campaign::extract(&table, "Plaisirs et Papilles");

    assert_eq!(
        series.points,
        vec![
            SeriesPoint {
                date: ymd(2025, 11, 24),
                rdv_pris: 3.0,
                rdv_planifie: 5.0,
                source_row: 0,
            },
            SeriesPoint {
                date: ymd(2025, 11, 24),
                rdv_pris: 2.0,
                rdv_planifie: 0.0,
                source_row: 1,
            },
        ]
    );
}

#[test]
fn padded_headers_and_unsorted_days() {
    let raw = grid(&[
        &[" DATE ", "CAMPAGNES ", " NOMBRE DE RDV PRIS", "NOMBRE DE RDV PLANIFIÉ"],
        &["26/11/2025", "Regards d'Experts", "1", "4"],
        &["", "Portraits Féminins", "7", "7"],
        &["25/11/2025", "Regards d'Experts", "abc", "2"],
        &["pas une date", "Regards d'Experts", "9", "9"],
        &["", " Regards d'Experts ", "5", "5"],
    ]);
    let table = normalize(&raw).unwrap();
    assert_eq!(table.cell(Column::Date, 1), Some("26/11/2025"));

    let series = campaign::extract(&table, "Regards d'Experts");
    let days: Vec<NaiveDate> = series.points.iter().map(|p| p.date).collect();
    assert_eq!(days, vec![ymd(2025, 11, 25), ymd(2025, 11, 26)]);
    assert_eq!(series.points[0].rdv_pris, 0.0);
    assert_eq!(series.totals(), (1.0, 6.0));

    assert_eq!(
        campaign::near_misses(&table, "Regards d'Experts"),
        vec![" Regards d'Experts ".to_string()]
    );
}

#[test]
fn csv_export_feeds_the_same_pipeline() {
    let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    writeln!(file, "DATE,CAMPAGNES,NOMBRE DE RDV PRIS,NOMBRE DE RDV PLANIFIÉ").unwrap();
    writeln!(file, "01/12/2025,L'oeil des Experts,2,3").unwrap();
    writeln!(file, ",L'oeil des Experts,1").unwrap();
    file.flush().unwrap();

    let source = source_from_path(file.path()).unwrap();
    let table = normalize(&source.fetch_rows("ignored", "ignored").unwrap()).unwrap();
    let series = campaign::extract(&table, "L'oeil des Experts");
    assert_eq!(series.len(), 2);
    assert!(series.points.iter().all(|p| p.date == ymd(2025, 12, 1)));

    let long = series.to_long_form();
    assert_eq!(long.len(), 4);
}

#[test]
fn missing_date_column_is_a_schema_error() {
    let raw = grid(&[&["Jour", "CAMPAGNES"], &["24/11/2025", "Plaisirs et Papilles"]]);
    assert!(normalize(&raw).is_err());
}
