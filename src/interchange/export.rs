use super::{ExportOptions, RangeMode, run_codec};
use crate::address::{AddressLimits, RangeBounds};
use crate::codec::{CodecRegistry, FileFormat};
use crate::errors::BridgeError;
use crate::extract::{RawValue, clean_rectangle, dimensions};
use crate::grid::{GridControl, resolve_sheet};
use crate::model::{CellRecord, SheetId};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportResult {
    pub message: String,
    pub file_path: String,
    pub format: FileFormat,
    /// Resolved source range; absent for whole-workbook formats.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    pub rows: usize,
    pub columns: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet_count: Option<usize>,
}

/// Turns the range selection mode into concrete bounds.
///
/// A custom range that does not parse is an error; there is no fallback to the used range.
pub async fn resolve_range(
    grid: &dyn GridControl,
    sheet: Option<&SheetId>,
    options: &ExportOptions,
    limits: &AddressLimits,
) -> Result<RangeBounds, BridgeError> {
    match options.range_mode {
        RangeMode::Custom => {
            let raw = options.custom_range.as_deref().unwrap_or_default();
            if raw.trim().is_empty() {
                return Err(BridgeError::range_format(
                    raw,
                    "custom range mode requires a range",
                ));
            }
            limits
                .parse_range(raw)
                .map_err(|err| BridgeError::range_format(raw, err.to_string()))
        }
        RangeMode::Sheet | RangeMode::All => {
            let used = grid
                .get_used_range(sheet)
                .await
                .map_err(BridgeError::Grid)?
                .ok_or_else(|| BridgeError::NoDataFound("sheet has no used range".to_string()))?;
            limits
                .parse_range(&used)
                .map_err(|err| BridgeError::range_format(&used, err.to_string()))
        }
    }
}

fn project(record: CellRecord, include_formulas: bool) -> RawValue {
    match record.formula {
        Some(formula) if include_formulas && !formula.trim().is_empty() => {
            if formula.starts_with('=') {
                RawValue::Text(formula)
            } else {
                RawValue::Text(format!("={formula}"))
            }
        }
        _ => record.value,
    }
}

/// Writes grid contents to `path` in `options.format`.
pub async fn export(
    grid: &dyn GridControl,
    codecs: &CodecRegistry,
    path: &Path,
    options: &ExportOptions,
    limits: &AddressLimits,
) -> Result<ExportResult, BridgeError> {
    let codec = codecs.get(options.format)?;
    let target = path.to_path_buf();
    let opts = options.clone();

    if options.format.requires_snapshot() {
        let snapshot = grid.get_workbook_snapshot().await.map_err(BridgeError::Grid)?;
        let sheet_count = snapshot.sheets.len();
        run_codec(
            move || codec.export_snapshot(&snapshot, &target, &opts),
            BridgeError::Export,
        )
        .await?;
        tracing::info!(format = %options.format, path = %path.display(), sheets = sheet_count, "exported workbook");
        return Ok(ExportResult {
            message: format!("Exported {sheet_count} sheet(s) to {}", path.display()),
            file_path: path.display().to_string(),
            format: options.format,
            range: None,
            rows: 0,
            columns: 0,
            sheet_count: Some(sheet_count),
        });
    }

    let sheet = resolve_sheet(grid, options.sheet.as_deref()).await?;
    let range = resolve_range(grid, sheet.as_ref(), options, limits).await?;
    let cells = grid
        .get_cells(sheet.as_ref(), &range)
        .await
        .map_err(BridgeError::Grid)?;
    let raw: Vec<Vec<RawValue>> = cells
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|record| project(record, options.include_formulas))
                .collect()
        })
        .collect();
    let rows = clean_rectangle(raw);
    if rows.is_empty() {
        return Err(BridgeError::NoDataFound(format!("range {range} holds no data")));
    }
    let (height, width) = dimensions(&rows);

    run_codec(
        move || codec.export_rows(&rows, &target, &opts),
        BridgeError::Export,
    )
    .await?;
    tracing::info!(
        format = %options.format,
        path = %path.display(),
        range = %range,
        rows = height,
        cols = width,
        "exported range"
    );
    Ok(ExportResult {
        message: format!(
            "Exported {height} row(s) x {width} column(s) from {range} to {}",
            path.display()
        ),
        file_path: path.display().to_string(),
        format: options.format,
        range: Some(range.to_string()),
        rows: height,
        columns: width,
        sheet_count: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formulas_project_as_prefixed_text() {
        let mut record = CellRecord::formula("SUM(A1:A3)");
        record.value = RawValue::Number(6.0);
        assert_eq!(project(record.clone(), false), RawValue::Number(6.0));
        assert_eq!(project(record, true), RawValue::from("=SUM(A1:A3)"));
    }
}
