//! Append-mode merge of a workbook snapshot into the open workbook.
//!
//! Two phases: every sheet is created and loaded in declared order, then protection rules are
//! reattached against the new sheet identities. A failing sheet or rule becomes a warning and
//! the merge carries on.

mod protection;

pub use protection::ProtectionReport;

use crate::errors::{BridgeError, Warning};
use crate::grid::{GridControl, SettlePolicy, create_and_resolve};
use crate::model::{SheetId, SheetSnapshot, StyleRef, WorkbookSnapshot};
use crate::security::MAX_SHEET_NAME_CHARS;
use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashSet;

pub const DEFAULT_SHEET_ROWS: u32 = 1000;
pub const DEFAULT_SHEET_COLS: u32 = 26;

/// Sheet names claimed so far; hands out `"name (n)"` on collision.
#[derive(Debug, Clone, Default)]
pub struct NameLedger {
    taken: HashSet<String>,
}

impl NameLedger {
    pub fn new<I, S>(existing: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            taken: existing.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.taken.contains(name)
    }

    /// Returns `base` or `base (n)` with the smallest free `n >= 1`, and reserves it.
    ///
    /// The base is shortened so the result never exceeds [`MAX_SHEET_NAME_CHARS`].
    pub fn claim(&mut self, base: &str) -> String {
        let base: String = match base.trim() {
            "" => "Sheet".to_string(),
            trimmed => trimmed.chars().take(MAX_SHEET_NAME_CHARS).collect(),
        };
        if self.taken.insert(base.clone()) {
            return base;
        }
        let mut n: u32 = 1;
        loop {
            let suffix = format!(" ({n})");
            let room = MAX_SHEET_NAME_CHARS.saturating_sub(suffix.chars().count());
            let stem: String = base.chars().take(room).collect();
            let candidate = format!("{}{suffix}", stem.trim_end());
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOptions {
    pub settle: SettlePolicy,
    pub default_rows: u32,
    pub default_cols: u32,
}

impl Default for AppendOptions {
    fn default() -> Self {
        Self {
            settle: SettlePolicy::default(),
            default_rows: DEFAULT_SHEET_ROWS,
            default_cols: DEFAULT_SHEET_COLS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendedSheet {
    pub source_id: SheetId,
    pub id: SheetId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetFailure {
    pub source_id: SheetId,
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendOutcome {
    /// Sheets that made it into the destination.
    pub sheet_count: usize,
    pub source_sheet_count: usize,
    /// Old sheet id to new sheet id, in append order.
    pub sheet_map: IndexMap<SheetId, SheetId>,
    pub sheets: Vec<AppendedSheet>,
    pub failures: Vec<SheetFailure>,
    pub protection: ProtectionReport,
    pub warnings: Vec<Warning>,
}

impl AppendOutcome {
    /// The error for a merge that appended nothing from a non-empty source.
    pub fn total_failure(&self) -> Option<BridgeError> {
        (self.sheet_count == 0 && self.source_sheet_count > 0).then(|| {
            BridgeError::SheetAppendFailed {
                sheet: self
                    .failures
                    .iter()
                    .map(|failure| failure.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                reason: format!(
                    "none of the {} source sheet(s) could be appended",
                    self.source_sheet_count
                ),
            }
        })
    }
}

/// Appends every sheet of `snapshot` to the workbook behind `grid`.
///
/// Only a failure to read the destination's sheet list is fatal.
pub async fn append_workbook(
    grid: &dyn GridControl,
    snapshot: &WorkbookSnapshot,
    options: &AppendOptions,
) -> Result<AppendOutcome, BridgeError> {
    let existing = grid.get_all_sheets().await.map_err(BridgeError::Grid)?;
    let mut ledger = NameLedger::new(existing.into_iter().map(|info| info.name));

    let sheets = snapshot.ordered_sheets();
    let mut outcome = AppendOutcome {
        source_sheet_count: sheets.len(),
        ..AppendOutcome::default()
    };

    for sheet in sheets {
        let name = ledger.claim(&sheet.name);
        match append_sheet(grid, snapshot, sheet, &name, options).await {
            Ok(id) => {
                tracing::info!(source = %sheet.id, sheet = %id, name = %name, "appended sheet");
                outcome.sheet_map.insert(sheet.id.clone(), id.clone());
                outcome.sheets.push(AppendedSheet {
                    source_id: sheet.id.clone(),
                    id,
                    name,
                });
            }
            Err(err) => {
                let failure = BridgeError::SheetAppendFailed {
                    sheet: name.clone(),
                    reason: format!("{err:#}"),
                };
                tracing::warn!(source = %sheet.id, name = %name, error = %failure, "skipping sheet");
                outcome.warnings.push(failure.to_warning());
                outcome.failures.push(SheetFailure {
                    source_id: sheet.id.clone(),
                    name,
                    reason: format!("{err:#}"),
                });
            }
        }
    }
    outcome.sheet_count = outcome.sheet_map.len();

    if !snapshot.resources.is_empty() && !outcome.sheet_map.is_empty() {
        match grid.unit_id().await {
            Ok(unit_id) => {
                let source_ids: HashSet<&str> =
                    snapshot.sheets.keys().map(SheetId::as_str).collect();
                let (report, warnings) = protection::reattach(
                    grid,
                    &snapshot.resources,
                    &outcome.sheet_map,
                    &source_ids,
                    &unit_id,
                )
                .await;
                outcome.protection = report;
                outcome.warnings.extend(warnings);
            }
            Err(err) => {
                let failure = BridgeError::ProtectionApplyFailed {
                    sheet_id: "*".to_string(),
                    reason: format!("destination unit id unavailable: {err:#}"),
                };
                tracing::warn!(error = %failure, "skipping protection phase");
                outcome.warnings.push(failure.to_warning());
            }
        }
    }

    Ok(outcome)
}

async fn append_sheet(
    grid: &dyn GridControl,
    snapshot: &WorkbookSnapshot,
    sheet: &SheetSnapshot,
    name: &str,
    options: &AppendOptions,
) -> Result<SheetId> {
    let (rows, cols) = sheet.capacity(options.default_rows, options.default_cols);
    let id = create_and_resolve(grid, name, rows, cols, &options.settle).await?;

    for (corner, mut block) in sheet.blocks() {
        for record in block.iter_mut().flatten() {
            let resolved = record
                .style
                .as_ref()
                .filter(|style| matches!(style, StyleRef::Id(_)))
                .and_then(|style| snapshot.resolve_style(style))
                .cloned();
            if let Some(inline) = resolved {
                record.style = Some(StyleRef::Inline(inline));
            }
        }
        grid.update_range(Some(&id), corner, block)
            .await
            .with_context(|| format!("failed to load cells at {corner} into '{name}'"))?;
    }
    if !sheet.merge_data.is_empty() {
        grid.set_merges(&id, sheet.merge_data.clone())
            .await
            .with_context(|| format!("failed to apply merges to '{name}'"))?;
    }
    Ok(id)
}
