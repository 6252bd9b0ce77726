use super::import::select_table;
use super::{ImportOptions, read_file};
use crate::codec::{CodecRegistry, header_names};
use crate::errors::BridgeError;
use crate::extract::RawValue;
use serde::Serialize;
use std::path::Path;

/// One column of finite numbers pulled from an imported table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NumericSeries {
    pub name: String,
    /// Table (sheet) the column came from.
    pub source: String,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NumericImport {
    pub file_path: String,
    pub series: Vec<NumericSeries>,
    /// Non-empty cells that did not parse as a finite number.
    pub skipped: usize,
}

/// Best-effort projection: blanks are ignored, unparseable cells are counted and dropped.
/// Columns without a single number yield no series.
pub fn numeric_series(
    source: &str,
    rows: &[Vec<RawValue>],
    header_row: bool,
) -> (Vec<NumericSeries>, usize) {
    let names = header_names(rows, header_row);
    let body = match rows.split_first() {
        Some((_, rest)) if header_row => rest,
        _ => rows,
    };

    let mut skipped = 0;
    let mut series = Vec::new();
    for (idx, name) in names.into_iter().enumerate() {
        let mut values = Vec::new();
        for cell in body.iter().filter_map(|row| row.get(idx)) {
            if cell.is_blank() {
                continue;
            }
            match cell.as_number().filter(|n| n.is_finite()) {
                Some(n) => values.push(n),
                None => skipped += 1,
            }
        }
        if !values.is_empty() {
            series.push(NumericSeries {
                name,
                source: source.to_string(),
                values,
            });
        }
    }
    (series, skipped)
}

/// Reads `path` into numeric series without touching the grid.
pub async fn import_numeric(
    codecs: &CodecRegistry,
    path: &Path,
    options: &ImportOptions,
    max_import_bytes: u64,
) -> Result<NumericImport, BridgeError> {
    let data = read_file(codecs, path, options, max_import_bytes).await?;
    let (table, rows) = select_table(data.into_tables(), options.source_sheet.as_deref())?;
    let (series, skipped) = numeric_series(&table, &rows, options.header_row);
    if series.is_empty() {
        return Err(BridgeError::NoDataFound(format!(
            "{} holds no numeric cells",
            path.display()
        )));
    }
    tracing::info!(path = %path.display(), series = series.len(), skipped, "numeric import");
    Ok(NumericImport {
        file_path: path.display().to_string(),
        series,
        skipped,
    })
}
