#![allow(dead_code)]

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::Value;
use sheet_bridge::address::{CellCoord, RangeBounds};
use sheet_bridge::config::BridgeConfig;
use sheet_bridge::extract::RawValue;
use sheet_bridge::grid::{GridControl, MemoryGrid, ProtectionCommand, SheetCreation, SheetInfo};
use sheet_bridge::model::{CellRecord, Resource, SheetId, SheetSnapshot, WorkbookSnapshot};
use sheet_bridge::state::Workbench;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

pub struct TestWorkspace {
    _tempdir: TempDir,
    root: PathBuf,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let root = tempdir.path().canonicalize().expect("canonical tempdir");
        Self {
            _tempdir: tempdir,
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, contents).expect("write fixture");
        path
    }

    pub fn read(&self, name: &str) -> String {
        std::fs::read_to_string(self.path(name)).expect("read output")
    }

    pub fn config(&self) -> BridgeConfig {
        self.config_with(|_| {})
    }

    pub fn config_with<F>(&self, f: F) -> BridgeConfig
    where
        F: FnOnce(&mut BridgeConfig),
    {
        let mut config = BridgeConfig {
            workspace_root: self.root.clone(),
            debounce_ms: 1,
            ..BridgeConfig::default()
        };
        f(&mut config);
        config
    }

    pub fn bench(&self, grid: Arc<dyn GridControl>) -> Workbench {
        Workbench::new(self.config(), grid)
    }
}

pub fn text(value: &str) -> CellRecord {
    CellRecord::value(RawValue::Text(value.to_string()))
}

pub fn num(value: f64) -> CellRecord {
    CellRecord::value(RawValue::Number(value))
}

/// Sheet holding `rows` anchored at A1.
pub fn sheet(id: &str, name: &str, rows: Vec<Vec<CellRecord>>) -> SheetSnapshot {
    SheetSnapshot::from_rows(id, name, rows)
}

/// Single-column sheet `1..=n`.
pub fn column_sheet(id: &str, name: &str, n: usize) -> SheetSnapshot {
    sheet(id, name, (1..=n).map(|i| vec![num(i as f64)]).collect())
}

pub fn workbook(id: &str, sheets: Vec<SheetSnapshot>) -> WorkbookSnapshot {
    let mut book = WorkbookSnapshot::new(id, "Source");
    for sheet in sheets {
        book.push_sheet(sheet);
    }
    book
}

/// Protection resource keyed by sheet id, with the payload stored as JSON text.
pub fn protection_resource(name: &str, rules: Value) -> Resource {
    Resource {
        name: name.to_string(),
        data: Value::String(rules.to_string()),
    }
}

pub fn cell_value(grid: &MemoryGrid, sheet: &str, row: u32, col: u32) -> Option<RawValue> {
    grid.sheet_snapshot(sheet)?
        .cell(CellCoord::new(row, col))
        .map(|record| record.value.clone())
}

/// Memory grid that fails cell writes aimed at one sheet name.
pub struct FlakyGrid {
    pub inner: MemoryGrid,
    pub fail_writes_to: String,
}

impl FlakyGrid {
    pub fn new(inner: MemoryGrid, fail_writes_to: &str) -> Self {
        Self {
            inner,
            fail_writes_to: fail_writes_to.to_string(),
        }
    }

    async fn name_of(&self, sheet: Option<&SheetId>) -> Result<Option<String>> {
        let Some(sheet) = sheet else {
            return Ok(None);
        };
        Ok(self
            .inner
            .get_all_sheets()
            .await?
            .into_iter()
            .find(|info| &info.id == sheet)
            .map(|info| info.name))
    }
}

#[async_trait]
impl GridControl for FlakyGrid {
    async fn get_cells(
        &self,
        sheet: Option<&SheetId>,
        range: &RangeBounds,
    ) -> Result<Vec<Vec<CellRecord>>> {
        self.inner.get_cells(sheet, range).await
    }

    async fn update_range(
        &self,
        sheet: Option<&SheetId>,
        start: CellCoord,
        rows: Vec<Vec<CellRecord>>,
    ) -> Result<()> {
        if self.name_of(sheet).await?.as_deref() == Some(self.fail_writes_to.as_str()) {
            bail!("host rejected the write");
        }
        self.inner.update_range(sheet, start, rows).await
    }

    async fn get_used_range(&self, sheet: Option<&SheetId>) -> Result<Option<String>> {
        self.inner.get_used_range(sheet).await
    }

    async fn get_selection(&self) -> Result<Option<String>> {
        self.inner.get_selection().await
    }

    async fn create_sheet(&self, name: &str, rows: u32, cols: u32) -> Result<SheetCreation> {
        self.inner.create_sheet(name, rows, cols).await
    }

    async fn find_sheet(&self, name: &str) -> Result<Option<SheetId>> {
        self.inner.find_sheet(name).await
    }

    async fn get_all_sheets(&self) -> Result<Vec<SheetInfo>> {
        self.inner.get_all_sheets().await
    }

    async fn active_sheet(&self) -> Result<Option<SheetId>> {
        self.inner.active_sheet().await
    }

    async fn unit_id(&self) -> Result<String> {
        self.inner.unit_id().await
    }

    async fn get_workbook_snapshot(&self) -> Result<WorkbookSnapshot> {
        self.inner.get_workbook_snapshot().await
    }

    async fn load_workbook_snapshot(&self, snapshot: WorkbookSnapshot) -> Result<()> {
        self.inner.load_workbook_snapshot(snapshot).await
    }

    async fn get_sheet_bounds(&self, sheet: Option<&SheetId>) -> Result<RangeBounds> {
        self.inner.get_sheet_bounds(sheet).await
    }

    async fn set_merges(&self, sheet: &SheetId, merges: Vec<RangeBounds>) -> Result<()> {
        self.inner.set_merges(sheet, merges).await
    }

    async fn apply_protection(&self, command: ProtectionCommand) -> Result<()> {
        self.inner.apply_protection(command).await
    }
}
