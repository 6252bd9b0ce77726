use super::{ImportOptions, PipelineSettings, SnapshotMode, TargetMode, import_format, read_file};
use crate::address::{AddressLimits, CellCoord, RangeBounds};
use crate::codec::{CodecRegistry, ImportedData};
use crate::errors::{BridgeError, ErrorCode, ErrorReport, Warning};
use crate::extract::{RawValue, clean_rectangle, dimensions};
use crate::grid::{GridControl, create_and_resolve, resolve_sheet};
use crate::merge::{AppendOutcome, NameLedger, append_workbook};
use crate::model::{CellRecord, WorkbookSnapshot};
use crate::security::sanitize_sheet_name;
use indexmap::IndexMap;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDimensions {
    pub rows: usize,
    pub columns: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeValidation {
    pub is_valid: bool,
    pub warnings: Vec<Warning>,
    pub will_truncate: bool,
    pub selected_range: String,
    /// Cells the write will actually cover.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_range: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_dimensions: Option<FileDimensions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_validation: Option<RangeValidation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet_count: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sheet_names: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub append: Option<AppendOutcome>,
    pub warnings: Vec<Warning>,
}

impl ImportResult {
    pub fn failure(err: &BridgeError) -> Self {
        Self {
            success: false,
            message: err.to_string(),
            error: Some(err.report()),
            ..Self::default()
        }
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error.as_ref().map(|report| report.code)
    }
}

/// Checks a `data_rows` x `data_cols` write against the selected range before anything is written.
///
/// A single selected cell is an anchor: the data keeps its full size. A larger selection caps
/// the write and flags truncation. The write is invalid when it would leave `limits`.
pub fn validate_range(
    data_rows: usize,
    data_cols: usize,
    selected: &RangeBounds,
    limits: &AddressLimits,
) -> RangeValidation {
    let anchor = selected.is_single_cell();
    let will_truncate =
        !anchor && (data_rows > selected.row_count() || data_cols > selected.col_count());
    let (write_rows, write_cols) = if anchor {
        (data_rows, data_cols)
    } else {
        (
            data_rows.min(selected.row_count()),
            data_cols.min(selected.col_count()),
        )
    };

    let mut warnings = Vec::new();
    if will_truncate {
        let mismatch = BridgeError::RangeCapacityMismatch {
            range: selected.to_string(),
            data_rows,
            data_cols,
            range_rows: selected.row_count(),
            range_cols: selected.col_count(),
        };
        warnings.push(mismatch.to_warning());
    }

    let target = RangeBounds::from_extent(selected.start(), write_rows, write_cols);
    let is_valid = match target {
        Some(target) => limits.contains(target.end()),
        None => selected.start().row < limits.max_rows && selected.start().col < limits.max_cols,
    };
    if !is_valid {
        warnings.push(Warning::new(
            ErrorCode::RangeFormatError,
            format!(
                "writing {write_rows}x{write_cols} at {} leaves the {}x{} grid",
                selected.start(),
                limits.max_rows,
                limits.max_cols
            ),
        ));
    }

    RangeValidation {
        is_valid,
        warnings,
        will_truncate,
        selected_range: selected.to_string(),
        target_range: target.map(|t| t.to_string()),
    }
}

/// Picks the table named by `selector`, or the first one.
pub(crate) fn select_table(
    tables: IndexMap<String, Vec<Vec<RawValue>>>,
    selector: Option<&str>,
) -> Result<(String, Vec<Vec<RawValue>>), BridgeError> {
    match selector.map(str::trim).filter(|s| !s.is_empty()) {
        Some(name) => {
            let available = tables.keys().cloned().collect::<Vec<_>>().join(", ");
            tables
                .into_iter()
                .find(|(table, _)| table == name)
                .ok_or_else(|| {
                    BridgeError::InvalidOptions(format!(
                        "file has no sheet '{name}' (available: {available})"
                    ))
                })
        }
        None => tables
            .into_iter()
            .next()
            .ok_or_else(|| BridgeError::NoDataFound("file contains no sheets".to_string())),
    }
}

fn to_records(rows: Vec<Vec<RawValue>>) -> Vec<Vec<CellRecord>> {
    rows.into_iter()
        .map(|row| row.into_iter().map(CellRecord::from).collect())
        .collect()
}

fn clamp_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

/// Reads `path` and places its contents in the grid. Failures come back as a result value.
pub async fn import(
    grid: &dyn GridControl,
    codecs: &CodecRegistry,
    path: &Path,
    options: &ImportOptions,
    settings: &PipelineSettings,
) -> ImportResult {
    match import_inner(grid, codecs, path, options, settings).await {
        Ok(result) => {
            tracing::info!(path = %path.display(), warnings = result.warnings.len(), "{}", result.message);
            result
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), code = %err.code(), error = %err, "import failed");
            ImportResult::failure(&err)
        }
    }
}

async fn import_inner(
    grid: &dyn GridControl,
    codecs: &CodecRegistry,
    path: &Path,
    options: &ImportOptions,
    settings: &PipelineSettings,
) -> Result<ImportResult, BridgeError> {
    let format = import_format(path, options.format)?;
    let data = read_file(codecs, path, options, settings.max_import_bytes).await?;

    let data = match data {
        ImportedData::Workbook(snapshot) if options.target == TargetMode::NewSheet => {
            return import_snapshot(grid, snapshot, options.snapshot_mode, settings).await;
        }
        other => other,
    };

    let (table, rows) = select_table(data.into_tables(), options.source_sheet.as_deref())?;
    let rows = clean_rectangle(rows);
    if rows.is_empty() {
        return Err(BridgeError::NoDataFound(format!(
            "{} contains no data",
            path.display()
        )));
    }
    let (height, width) = dimensions(&rows);
    let file_dimensions = FileDimensions {
        rows: height,
        columns: width,
    };
    tracing::debug!(format = %format, table = %table, rows = height, cols = width, "decoded table");

    match options.target {
        TargetMode::NewSheet => {
            let existing = grid.get_all_sheets().await.map_err(BridgeError::Grid)?;
            let mut ledger = NameLedger::new(existing.into_iter().map(|info| info.name));
            let base = options.sheet_name.as_deref().unwrap_or(&table);
            let name = ledger.claim(&sanitize_sheet_name(base));

            let validation = validate_range(
                height,
                width,
                &RangeBounds::cell(CellCoord::ORIGIN),
                &settings.limits,
            );
            if !validation.is_valid {
                return Err(BridgeError::range_format(
                    "A1",
                    format!("a {height}x{width} block exceeds the grid limits"),
                ));
            }

            let rows_needed = clamp_u32(height).max(settings.append.default_rows);
            let cols_needed = clamp_u32(width).max(settings.append.default_cols);
            let id = create_and_resolve(grid, &name, rows_needed, cols_needed, &settings.append.settle)
                .await
                .map_err(BridgeError::Grid)?;
            grid.update_range(Some(&id), CellCoord::ORIGIN, to_records(rows))
                .await
                .map_err(BridgeError::Grid)?;

            Ok(ImportResult {
                success: true,
                message: format!("Imported {height} row(s) x {width} column(s) into new sheet '{name}'"),
                file_dimensions: Some(file_dimensions),
                range_validation: Some(validation),
                sheet_count: Some(1),
                sheet_names: vec![name],
                ..ImportResult::default()
            })
        }
        TargetMode::CurrentRange => {
            let sheet = resolve_sheet(grid, options.sheet.as_deref()).await?;
            let raw = match options.target_range.as_deref().map(str::trim) {
                Some(range) if !range.is_empty() => range.to_string(),
                _ => grid
                    .get_selection()
                    .await
                    .map_err(BridgeError::Grid)?
                    .ok_or_else(|| {
                        BridgeError::range_format("", "no target range given and nothing is selected")
                    })?,
            };
            let selected = settings
                .limits
                .parse_range(&raw)
                .map_err(|err| BridgeError::range_format(&raw, err.to_string()))?;

            let bounds = grid
                .get_sheet_bounds(sheet.as_ref())
                .await
                .map_err(BridgeError::Grid)?;
            let limits = AddressLimits::new(
                settings.limits.max_rows.min(bounds.end_row.saturating_add(1)),
                settings.limits.max_cols.min(bounds.end_col.saturating_add(1)),
            );
            let validation = validate_range(height, width, &selected, &limits);
            if !validation.is_valid {
                return Err(BridgeError::range_format(
                    raw,
                    format!("a {height}x{width} block does not fit the sheet from {}", selected.start()),
                ));
            }

            let mut rows = rows;
            if validation.will_truncate {
                rows.truncate(selected.row_count());
                for row in &mut rows {
                    row.truncate(selected.col_count());
                }
            }
            let (written_rows, written_cols) = dimensions(&rows);
            grid.update_range(sheet.as_ref(), selected.start(), to_records(rows))
                .await
                .map_err(BridgeError::Grid)?;

            let message = if validation.will_truncate {
                format!(
                    "Imported {written_rows} of {height} row(s) and {written_cols} of {width} column(s) into {selected}; data was truncated to fit"
                )
            } else {
                format!("Imported {height} row(s) x {width} column(s) at {}", selected.start())
            };
            Ok(ImportResult {
                success: true,
                message,
                file_dimensions: Some(file_dimensions),
                warnings: validation.warnings.clone(),
                range_validation: Some(validation),
                sheet_count: Some(1),
                ..ImportResult::default()
            })
        }
    }
}

async fn import_snapshot(
    grid: &dyn GridControl,
    snapshot: WorkbookSnapshot,
    mode: SnapshotMode,
    settings: &PipelineSettings,
) -> Result<ImportResult, BridgeError> {
    match mode {
        SnapshotMode::Replace => {
            let names: Vec<String> = snapshot
                .ordered_sheets()
                .iter()
                .map(|sheet| sheet.name.clone())
                .collect();
            grid.load_workbook_snapshot(snapshot)
                .await
                .map_err(BridgeError::Grid)?;
            Ok(ImportResult {
                success: true,
                message: format!("Loaded workbook with {} sheet(s)", names.len()),
                sheet_count: Some(names.len()),
                sheet_names: names,
                ..ImportResult::default()
            })
        }
        SnapshotMode::Append => {
            let outcome = append_workbook(grid, &snapshot, &settings.append).await?;
            if let Some(err) = outcome.total_failure() {
                return Ok(ImportResult {
                    warnings: outcome.warnings.clone(),
                    append: Some(outcome),
                    ..ImportResult::failure(&err)
                });
            }
            let message = if outcome.failures.is_empty() {
                format!("Appended {} sheet(s)", outcome.sheet_count)
            } else {
                format!(
                    "Appended {} of {} sheet(s)",
                    outcome.sheet_count, outcome.source_sheet_count
                )
            };
            Ok(ImportResult {
                success: true,
                message,
                sheet_count: Some(outcome.sheet_count),
                sheet_names: outcome.sheets.iter().map(|s| s.name.clone()).collect(),
                warnings: outcome.warnings.clone(),
                append: Some(outcome),
                ..ImportResult::default()
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_cell_is_an_anchor() {
        let limits = AddressLimits::default();
        let anchor = RangeBounds::cell(CellCoord::new(4, 1));
        let v = validate_range(10, 1, &anchor, &limits);
        assert!(v.is_valid && !v.will_truncate && v.warnings.is_empty());
        assert_eq!(v.target_range.as_deref(), Some("B5:B14"));
    }

    #[test]
    fn oversized_data_truncates_with_one_warning() {
        let selected = "A1:A3".parse::<RangeBounds>().unwrap();
        let v = validate_range(10, 1, &selected, &AddressLimits::default());
        assert!(v.is_valid && v.will_truncate);
        assert_eq!(v.warnings.len(), 1);
        assert_eq!(v.warnings[0].code, ErrorCode::RangeCapacityMismatch);
        assert_eq!(v.target_range.as_deref(), Some("A1:A3"));
    }

    #[test]
    fn writes_past_the_limits_are_invalid() {
        let anchor = RangeBounds::cell(CellCoord::new(8, 0));
        let v = validate_range(5, 1, &anchor, &AddressLimits::new(10, 5));
        assert!(!v.is_valid);
        assert_eq!(v.warnings[0].code, ErrorCode::RangeFormatError);
    }

    #[test]
    fn unknown_source_table_is_rejected() {
        let mut tables = IndexMap::new();
        tables.insert("a".to_string(), vec![vec![RawValue::Number(1.0)]]);
        assert!(select_table(tables.clone(), Some("b")).is_err());
        assert_eq!(select_table(tables, None).unwrap().0, "a");
    }
}
