//! Abstract control surface of the host grid.
//!
//! Everything that reads or mutates live workbook state goes through [`GridControl`]. The trait
//! is object safe so callers hold an `Arc<dyn GridControl>`.

mod memory;

pub use memory::{MemoryGrid, MemoryGridOptions};

use crate::address::{CellCoord, RangeBounds};
use crate::errors::BridgeError;
use crate::extract::RawValue;
use crate::model::{CellRecord, SheetId, WorkbookSnapshot};
use anyhow::{Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetInfo {
    pub id: SheetId,
    pub name: String,
}

/// Outcome of a sheet creation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetCreation {
    /// The host returned the new identity directly.
    Created(SheetId),
    /// The host registers the sheet asynchronously; resolve it by name.
    Pending,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProtectionCommand {
    /// Whole-sheet edit lock.
    LockSheet { sheet_id: SheetId, rule: Value },
    /// Edit lock scoped to the ranges of one permission.
    LockRange {
        sheet_id: SheetId,
        permission_id: String,
        rule: Value,
    },
}

impl ProtectionCommand {
    pub fn sheet_id(&self) -> &SheetId {
        match self {
            ProtectionCommand::LockSheet { sheet_id, .. }
            | ProtectionCommand::LockRange { sheet_id, .. } => sheet_id,
        }
    }

    pub fn rule(&self) -> &Value {
        match self {
            ProtectionCommand::LockSheet { rule, .. } | ProtectionCommand::LockRange { rule, .. } => {
                rule
            }
        }
    }
}

/// A `None` sheet argument addresses the active sheet.
#[async_trait]
pub trait GridControl: Send + Sync {
    async fn get_cells(&self, sheet: Option<&SheetId>, range: &RangeBounds)
    -> Result<Vec<Vec<CellRecord>>>;

    async fn get_range(
        &self,
        sheet: Option<&SheetId>,
        range: &RangeBounds,
    ) -> Result<Vec<Vec<RawValue>>> {
        let cells = self.get_cells(sheet, range).await?;
        Ok(cells
            .into_iter()
            .map(|row| row.into_iter().map(|cell| cell.value).collect())
            .collect())
    }

    async fn update_range(
        &self,
        sheet: Option<&SheetId>,
        start: CellCoord,
        rows: Vec<Vec<CellRecord>>,
    ) -> Result<()>;

    /// A1 range of the non-empty region, `None` when the sheet holds no data.
    async fn get_used_range(&self, sheet: Option<&SheetId>) -> Result<Option<String>>;

    async fn get_selection(&self) -> Result<Option<String>>;

    async fn create_sheet(&self, name: &str, rows: u32, cols: u32) -> Result<SheetCreation>;

    async fn find_sheet(&self, name: &str) -> Result<Option<SheetId>>;

    async fn get_all_sheets(&self) -> Result<Vec<SheetInfo>>;

    async fn active_sheet(&self) -> Result<Option<SheetId>>;

    async fn unit_id(&self) -> Result<String>;

    async fn get_workbook_snapshot(&self) -> Result<WorkbookSnapshot>;

    async fn load_workbook_snapshot(&self, snapshot: WorkbookSnapshot) -> Result<()>;

    async fn get_sheet_bounds(&self, sheet: Option<&SheetId>) -> Result<RangeBounds>;

    async fn set_merges(&self, sheet: &SheetId, merges: Vec<RangeBounds>) -> Result<()>;

    async fn apply_protection(&self, command: ProtectionCommand) -> Result<()>;
}

/// Bounded polling used when sheet creation does not return an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlePolicy {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(25),
            timeout: Duration::from_secs(2),
        }
    }
}

/// Creates a sheet and returns its identity, polling by name while the host settles.
pub async fn create_and_resolve(
    grid: &dyn GridControl,
    name: &str,
    rows: u32,
    cols: u32,
    settle: &SettlePolicy,
) -> Result<SheetId> {
    match grid.create_sheet(name, rows, cols).await? {
        SheetCreation::Created(id) => Ok(id),
        SheetCreation::Pending => {
            let deadline = Instant::now() + settle.timeout;
            loop {
                if let Some(id) = grid.find_sheet(name).await? {
                    return Ok(id);
                }
                if Instant::now() >= deadline {
                    bail!(
                        "sheet '{name}' was not registered within {} ms",
                        settle.timeout.as_millis()
                    );
                }
                tokio::time::sleep(settle.poll_interval).await;
            }
        }
    }
}

/// Resolves a user-supplied sheet selector (id or name). `None` keeps the active sheet.
pub async fn resolve_sheet(
    grid: &dyn GridControl,
    selector: Option<&str>,
) -> Result<Option<SheetId>, BridgeError> {
    let Some(selector) = selector.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    let sheets = grid.get_all_sheets().await.map_err(BridgeError::Grid)?;
    sheets
        .iter()
        .find(|info| info.id.as_str() == selector)
        .or_else(|| sheets.iter().find(|info| info.name == selector))
        .map(|info| Some(info.id.clone()))
        .ok_or_else(|| BridgeError::InvalidOptions(format!("unknown sheet '{selector}'")))
}
