use crate::error::SchemaError;
use log::{debug, warn};
use serde::Serialize;
use std::collections::HashMap;

/// Columns the dashboard knows about.
///
/// Lookups for these go through [`NormalizedTable::column`] so that a
/// renamed header shows up as a missing column at the boundary instead of
/// as a silently empty chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    /// Day of the record, `DD/MM/YYYY`; merged cells in the sheet leave it blank
    Date,

    /// Campaign name the row belongs to
    Campaign,

    /// Appointments actually taken that day
    RdvPris,

    /// Appointments planned for that day
    RdvPlanifie,
}

impl Column {
    pub const ALL: [Column; 4] = [
        Column::Date,
        Column::Campaign,
        Column::RdvPris,
        Column::RdvPlanifie,
    ];

    /// Header label as written in the worksheet
    pub fn label(&self) -> &'static str {
        match self {
            Column::Date => "DATE",
            Column::Campaign => "CAMPAGNES",
            Column::RdvPris => "NOMBRE DE RDV PRIS",
            Column::RdvPlanifie => "NOMBRE DE RDV PLANIFIÉ",
        }
    }
}

/// Unprocessed rows as handed over by a row source.
///
/// The first record holds the header labels, every other record holds the
/// positional values of one data row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Split a `get_all_values`-style grid into header and data rows.
    ///
    /// An empty grid gives a table with no headers, which `normalize`
    /// rejects for lack of a `DATE` column.
    pub fn from_rows(mut grid: Vec<Vec<String>>) -> Self {
        if grid.is_empty() {
            return RawTable::default();
        }
        let headers = grid.remove(0);
        RawTable {
            headers,
            rows: grid,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Column-oriented view of the worksheet with trimmed, unique labels and a
/// forward-filled `DATE` column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedTable {
    labels: Vec<String>,
    columns: Vec<Vec<String>>,
    #[serde(skip)]
    index: HashMap<String, usize>,
    rows: usize,
}

impl NormalizedTable {
    /// Values of a known column, in row order
    pub fn column(&self, column: Column) -> Option<&[String]> {
        self.get(column.label())
    }

    /// Values of an arbitrary column by its trimmed label
    pub fn get(&self, label: &str) -> Option<&[String]> {
        self.index
            .get(label)
            .map(|&i| self.columns[i].as_slice())
    }

    /// Trimmed column labels in sheet order
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Number of data rows
    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Cell values of one row in label order, as shown in the raw-data table
    pub fn row(&self, index: usize) -> Option<Vec<&str>> {
        if index >= self.rows {
            return None;
        }
        Some(self.columns.iter().map(|c| c[index].as_str()).collect())
    }

    /// Cell of a known column at a row, `None` when the column is absent
    pub fn cell(&self, column: Column, index: usize) -> Option<&str> {
        self.column(column)
            .and_then(|values| values.get(index))
            .map(String::as_str)
    }
}

/// Turn raw worksheet rows into a [`NormalizedTable`].
///
/// Header labels are trimmed, each label is mapped to its positional values
/// and the `DATE` column is forward-filled to undo merged cells. Nothing
/// else is touched; per-campaign parsing happens later in
/// [`crate::campaign::extract`].
///
/// # Arguments
/// * `raw` - Header record and data records from the row source
///
/// # Returns
/// * `Result<NormalizedTable, SchemaError>` - The table, or `MissingColumn("DATE")`
///
/// # Notes
/// * Short records are padded with empty strings, extra trailing fields are ignored
/// * A duplicated label keeps its first column; later ones are dropped
pub fn normalize(raw: &RawTable) -> Result<NormalizedTable, SchemaError> {
    let arity = raw.headers.len();
    let mut labels = Vec::with_capacity(arity);
    let mut positions = Vec::with_capacity(arity);
    let mut index = HashMap::with_capacity(arity);

    for (pos, header) in raw.headers.iter().enumerate() {
        let label = header.trim().to_string();
        if index.contains_key(&label) {
            warn!("duplicate column '{}' at position {}, keeping the first one", label, pos);
            continue;
        }
        index.insert(label.clone(), labels.len());
        labels.push(label);
        positions.push(pos);
    }

    let date_idx = *index
        .get(Column::Date.label())
        .ok_or_else(|| SchemaError::MissingColumn(Column::Date.label().to_string()))?;

    let mut columns: Vec<Vec<String>> = positions
        .iter()
        .map(|&pos| {
            raw.rows
                .iter()
                .map(|record| record.get(pos).cloned().unwrap_or_default())
                .collect()
        })
        .collect();

    let filled = forward_fill(&mut columns[date_idx]);
    debug!(
        "normalized {} rows x {} columns, {} DATE cells forward-filled",
        raw.rows.len(),
        labels.len(),
        filled
    );

    Ok(NormalizedTable {
        labels,
        columns,
        index,
        rows: raw.rows.len(),
    })
}

/// Replace empty cells with the nearest preceding non-empty value.
///
/// Leading empty cells have nothing to copy from and stay empty.
/// Returns the number of cells that were filled.
pub fn forward_fill(values: &mut [String]) -> usize {
    let mut last: Option<String> = None;
    let mut filled = 0;
    for value in values.iter_mut() {
        if value.is_empty() {
            if let Some(prev) = &last {
                value.clone_from(prev);
                filled += 1;
            }
        } else {
            last = Some(value.clone());
        }
    }
    filled
}
