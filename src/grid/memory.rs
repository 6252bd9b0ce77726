use super::{GridControl, ProtectionCommand, SheetCreation, SheetInfo};
use crate::address::{AddressLimits, CellCoord, RangeBounds};
use crate::model::{CellRecord, Resource, SheetId, SheetSnapshot, WorkbookSnapshot};
use anyhow::{Context, Result, anyhow, bail, ensure};
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::time::Duration;
use tokio::time::Instant;

const WORKSHEET_PROTECTION_RESOURCE: &str = "SHEET_WORKSHEET_PROTECTION_PLUGIN";
const RANGE_PROTECTION_RESOURCE: &str = "SHEET_RANGE_PROTECTION_PLUGIN";

#[derive(Debug, Clone, Default)]
pub struct MemoryGridOptions {
    /// When set, new sheets become visible only after this delay and creation reports
    /// [`SheetCreation::Pending`].
    pub registration_delay: Option<Duration>,
    pub limits: AddressLimits,
}

#[derive(Debug)]
struct MemorySheet {
    snapshot: SheetSnapshot,
    visible_at: Option<Instant>,
}

impl MemorySheet {
    fn is_visible(&self) -> bool {
        self.visible_at.is_none_or(|at| Instant::now() >= at)
    }

    fn bounds(&self) -> RangeBounds {
        let rows = self.snapshot.row_count.unwrap_or(1).max(1);
        let cols = self.snapshot.column_count.unwrap_or(1).max(1);
        RangeBounds::new(CellCoord::ORIGIN, CellCoord::new(rows - 1, cols - 1))
    }
}

#[derive(Debug, Default)]
struct MemoryBook {
    unit_id: String,
    name: String,
    sheets: IndexMap<SheetId, MemorySheet>,
    active: Option<SheetId>,
    selection: Option<String>,
    styles: IndexMap<String, Value>,
    resources: Vec<Resource>,
    protections: Vec<ProtectionCommand>,
    extra: Map<String, Value>,
}

impl MemoryBook {
    fn sheet(&self, sheet: Option<&SheetId>) -> Result<&MemorySheet> {
        let id = self.target(sheet)?;
        self.sheets
            .get(&id)
            .filter(|s| s.is_visible())
            .ok_or_else(|| anyhow!("sheet '{id}' does not exist"))
    }

    fn sheet_mut(&mut self, sheet: Option<&SheetId>) -> Result<&mut MemorySheet> {
        let id = self.target(sheet)?;
        self.sheets
            .get_mut(&id)
            .filter(|s| s.is_visible())
            .ok_or_else(|| anyhow!("sheet '{id}' does not exist"))
    }

    fn target(&self, sheet: Option<&SheetId>) -> Result<SheetId> {
        sheet
            .cloned()
            .or_else(|| self.active.clone())
            .ok_or_else(|| anyhow!("workbook has no active sheet"))
    }

    fn fresh_sheet_id(&self) -> SheetId {
        loop {
            let candidate = SheetId::new(format!("sheet-{:08x}", rand::random::<u32>()));
            if !self.sheets.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    fn record_protection(&mut self, command: &ProtectionCommand) -> Result<()> {
        let (resource_name, key, rule) = match command {
            ProtectionCommand::LockSheet { sheet_id, rule } => {
                (WORKSHEET_PROTECTION_RESOURCE, sheet_id, rule)
            }
            ProtectionCommand::LockRange { sheet_id, rule, .. } => {
                (RANGE_PROTECTION_RESOURCE, sheet_id, rule)
            }
        };
        let idx = match self.resources.iter().position(|r| r.name == resource_name) {
            Some(idx) => idx,
            None => {
                self.resources.push(Resource {
                    name: resource_name.to_string(),
                    data: Value::String("{}".to_string()),
                });
                self.resources.len() - 1
            }
        };
        let resource = &mut self.resources[idx];
        let mut data: Map<String, Value> = match &resource.data {
            Value::String(text) if !text.trim().is_empty() => serde_json::from_str(text)
                .with_context(|| format!("resource {resource_name} holds invalid JSON"))?,
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        match command {
            ProtectionCommand::LockSheet { .. } => {
                data.insert(key.to_string(), rule.clone());
            }
            ProtectionCommand::LockRange { .. } => {
                let entry = data
                    .entry(key.to_string())
                    .or_insert_with(|| Value::Array(Vec::new()));
                match entry {
                    Value::Array(rules) => rules.push(rule.clone()),
                    other => *other = Value::Array(vec![rule.clone()]),
                }
            }
        }
        resource.data = Value::String(serde_json::to_string(&data)?);
        Ok(())
    }
}

/// In-process grid host backing the CLI and tests.
#[derive(Debug)]
pub struct MemoryGrid {
    book: RwLock<MemoryBook>,
    options: MemoryGridOptions,
}

impl Default for MemoryGrid {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGrid {
    pub fn new() -> Self {
        Self::with_options(MemoryGridOptions::default())
    }

    pub fn with_options(options: MemoryGridOptions) -> Self {
        let book = MemoryBook {
            unit_id: format!("workbook-{:08x}", rand::random::<u32>()),
            name: "Workbook".to_string(),
            ..MemoryBook::default()
        };
        Self {
            book: RwLock::new(book),
            options,
        }
    }

    /// Grid pre-populated with empty, immediately visible sheets.
    pub fn with_sheets(names: &[&str]) -> Self {
        let grid = Self::new();
        {
            let mut book = grid.book.write();
            for name in names {
                let id = book.fresh_sheet_id();
                let mut snapshot = SheetSnapshot::new(id.clone(), *name);
                snapshot.row_count = Some(1000);
                snapshot.column_count = Some(26);
                book.sheets.insert(
                    id.clone(),
                    MemorySheet {
                        snapshot,
                        visible_at: None,
                    },
                );
                if book.active.is_none() {
                    book.active = Some(id);
                }
            }
        }
        grid
    }

    pub fn set_selection(&self, range: Option<&str>) {
        self.book.write().selection = range.map(str::to_string);
    }

    pub fn set_active(&self, sheet: &SheetId) {
        self.book.write().active = Some(sheet.clone());
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.book
            .read()
            .sheets
            .values()
            .filter(|s| s.is_visible())
            .map(|s| s.snapshot.name.clone())
            .collect()
    }

    pub fn sheet_snapshot(&self, name: &str) -> Option<SheetSnapshot> {
        self.book
            .read()
            .sheets
            .values()
            .find(|s| s.snapshot.name == name)
            .map(|s| s.snapshot.clone())
    }

    pub fn protections(&self) -> Vec<ProtectionCommand> {
        self.book.read().protections.clone()
    }
}

#[async_trait]
impl GridControl for MemoryGrid {
    async fn get_cells(
        &self,
        sheet: Option<&SheetId>,
        range: &RangeBounds,
    ) -> Result<Vec<Vec<CellRecord>>> {
        let book = self.book.read();
        let sheet = book.sheet(sheet)?;
        Ok((range.start_row..=range.end_row)
            .map(|row| {
                (range.start_col..=range.end_col)
                    .map(|col| {
                        sheet
                            .snapshot
                            .cell(CellCoord::new(row, col))
                            .cloned()
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .collect())
    }

    async fn update_range(
        &self,
        sheet: Option<&SheetId>,
        start: CellCoord,
        rows: Vec<Vec<CellRecord>>,
    ) -> Result<()> {
        let mut book = self.book.write();
        let sheet = book.sheet_mut(sheet)?;
        let bounds = sheet.bounds();
        let height = rows.len();
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        if let Some(target) = RangeBounds::from_extent(start, height, width) {
            ensure!(
                bounds.contains(target.end()),
                "write of {height}x{width} at {start} exceeds sheet bounds {bounds}"
            );
        }
        for (r, row) in rows.into_iter().enumerate() {
            for (c, record) in row.into_iter().enumerate() {
                let coord = CellCoord::new(start.row + r as u32, start.col + c as u32);
                if record.is_empty() {
                    if let Some(cols) = sheet.snapshot.cell_data.get_mut(&coord.row) {
                        cols.remove(&coord.col);
                        if cols.is_empty() {
                            sheet.snapshot.cell_data.remove(&coord.row);
                        }
                    }
                } else {
                    sheet.snapshot.set_cell(coord, record);
                }
            }
        }
        Ok(())
    }

    async fn get_used_range(&self, sheet: Option<&SheetId>) -> Result<Option<String>> {
        let book = self.book.read();
        let sheet = book.sheet(sheet)?;
        Ok(sheet.snapshot.extent().map(|extent| extent.to_string()))
    }

    async fn get_selection(&self) -> Result<Option<String>> {
        Ok(self.book.read().selection.clone())
    }

    async fn create_sheet(&self, name: &str, rows: u32, cols: u32) -> Result<SheetCreation> {
        let mut book = self.book.write();
        ensure!(!name.trim().is_empty(), "sheet name must not be empty");
        ensure!(
            !book.sheets.values().any(|s| s.snapshot.name == name),
            "sheet '{name}' already exists"
        );
        let limits = self.options.limits;
        ensure!(
            rows <= limits.max_rows && cols <= limits.max_cols,
            "sheet size {rows}x{cols} exceeds grid limits"
        );

        let id = book.fresh_sheet_id();
        let mut snapshot = SheetSnapshot::new(id.clone(), name);
        snapshot.row_count = Some(rows.max(1));
        snapshot.column_count = Some(cols.max(1));
        let visible_at = self.options.registration_delay.map(|delay| Instant::now() + delay);
        book.sheets.insert(
            id.clone(),
            MemorySheet {
                snapshot,
                visible_at,
            },
        );
        if book.active.is_none() {
            book.active = Some(id.clone());
        }
        Ok(match visible_at {
            Some(_) => SheetCreation::Pending,
            None => SheetCreation::Created(id),
        })
    }

    async fn find_sheet(&self, name: &str) -> Result<Option<SheetId>> {
        Ok(self
            .book
            .read()
            .sheets
            .iter()
            .find(|(_, s)| s.is_visible() && s.snapshot.name == name)
            .map(|(id, _)| id.clone()))
    }

    async fn get_all_sheets(&self) -> Result<Vec<SheetInfo>> {
        Ok(self
            .book
            .read()
            .sheets
            .iter()
            .filter(|(_, s)| s.is_visible())
            .map(|(id, s)| SheetInfo {
                id: id.clone(),
                name: s.snapshot.name.clone(),
            })
            .collect())
    }

    async fn active_sheet(&self) -> Result<Option<SheetId>> {
        Ok(self.book.read().active.clone())
    }

    async fn unit_id(&self) -> Result<String> {
        Ok(self.book.read().unit_id.clone())
    }

    async fn get_workbook_snapshot(&self) -> Result<WorkbookSnapshot> {
        let book = self.book.read();
        let mut snapshot = WorkbookSnapshot::new(book.unit_id.clone(), book.name.clone());
        for sheet in book.sheets.values().filter(|s| s.is_visible()) {
            snapshot.push_sheet(sheet.snapshot.clone());
        }
        snapshot.styles = book.styles.clone();
        snapshot.resources = book.resources.clone();
        snapshot.extra = book.extra.clone();
        Ok(snapshot)
    }

    async fn load_workbook_snapshot(&self, snapshot: WorkbookSnapshot) -> Result<()> {
        let mut book = self.book.write();
        let mut sheets = IndexMap::new();
        for sheet in snapshot.ordered_sheets() {
            let mut sheet = sheet.clone();
            let (rows, cols) = sheet.capacity(1000, 26);
            sheet.row_count = Some(rows);
            sheet.column_count = Some(cols);
            sheets.insert(
                sheet.id.clone(),
                MemorySheet {
                    snapshot: sheet,
                    visible_at: None,
                },
            );
        }
        book.active = sheets.keys().next().cloned();
        book.sheets = sheets;
        if !snapshot.id.is_empty() {
            book.unit_id = snapshot.id;
        }
        book.name = snapshot.name;
        book.styles = snapshot.styles;
        book.resources = snapshot.resources;
        book.extra = snapshot.extra;
        book.protections.clear();
        book.selection = None;
        Ok(())
    }

    async fn get_sheet_bounds(&self, sheet: Option<&SheetId>) -> Result<RangeBounds> {
        let book = self.book.read();
        Ok(book.sheet(sheet)?.bounds())
    }

    async fn set_merges(&self, sheet: &SheetId, merges: Vec<RangeBounds>) -> Result<()> {
        let mut book = self.book.write();
        let sheet = book.sheet_mut(Some(sheet))?;
        let bounds = sheet.bounds();
        for merge in &merges {
            ensure!(
                bounds.contains(merge.end()),
                "merge {merge} lies outside sheet bounds {bounds}"
            );
        }
        sheet.snapshot.merge_data = merges;
        Ok(())
    }

    async fn apply_protection(&self, command: ProtectionCommand) -> Result<()> {
        let mut book = self.book.write();
        let sheet_id = command.sheet_id().clone();
        if !book.sheets.contains_key(&sheet_id) {
            bail!("cannot protect unknown sheet '{sheet_id}'");
        }
        book.record_protection(&command)?;
        book.protections.push(command);
        Ok(())
    }
}
