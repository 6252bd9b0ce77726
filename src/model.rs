//! Workbook snapshot records exchanged with the host grid.
//!
//! Field names follow the host's short-key JSON layout (`v`, `f`, `s`, `t`, `cellData`, ...).
//! Style, type and custom payloads are carried as opaque JSON and never interpreted, so a
//! snapshot read from disk serializes back to the same structure.

use crate::address::{CellCoord, RangeBounds};
use crate::errors::BridgeError;
use crate::extract::{BlankCell, RawValue};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SheetId(pub String);

impl SheetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SheetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SheetId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SheetId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Style reference: an id into the workbook style table, or an inline style record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StyleRef {
    Id(String),
    Inline(Value),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CellRecord {
    #[serde(rename = "v", default, skip_serializing_if = "RawValue::is_null")]
    pub value: RawValue,
    #[serde(rename = "f", default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    pub style: Option<StyleRef>,
    #[serde(rename = "t", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CellRecord {
    pub fn value(value: impl Into<RawValue>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }

    pub fn formula(formula: impl Into<String>) -> Self {
        Self {
            formula: Some(formula.into()),
            ..Self::default()
        }
    }

    pub fn with_style(mut self, style: StyleRef) -> Self {
        self.style = Some(style);
        self
    }

    /// Whether the record carries anything beyond an empty value.
    pub fn is_empty(&self) -> bool {
        self.value.is_null()
            && self.formula.is_none()
            && self.style.is_none()
            && self.type_tag.is_none()
            && self.custom.is_none()
            && self.extra.is_empty()
    }
}

impl BlankCell for CellRecord {
    fn is_blank(&self) -> bool {
        self.value.is_blank() && self.formula.as_deref().is_none_or(|f| f.trim().is_empty())
    }

    fn blank() -> Self {
        CellRecord::default()
    }
}

impl From<RawValue> for CellRecord {
    fn from(value: RawValue) -> Self {
        CellRecord::value(value)
    }
}

pub type CellMatrix = BTreeMap<u32, BTreeMap<u32, CellRecord>>;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetSnapshot {
    #[serde(default)]
    pub id: SheetId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub cell_data: CellMatrix,
    #[serde(default)]
    pub merge_data: Vec<RangeBounds>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_count: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SheetSnapshot {
    pub fn new(id: impl Into<SheetId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Builds a sheet from a dense block anchored at A1, skipping empty records.
    pub fn from_rows(id: impl Into<SheetId>, name: impl Into<String>, rows: Vec<Vec<CellRecord>>) -> Self {
        let mut sheet = Self::new(id, name);
        for (r, row) in rows.into_iter().enumerate() {
            for (c, record) in row.into_iter().enumerate() {
                if !record.is_empty() {
                    sheet.set_cell(CellCoord::new(r as u32, c as u32), record);
                }
            }
        }
        sheet
    }

    pub fn cell(&self, coord: CellCoord) -> Option<&CellRecord> {
        self.cell_data.get(&coord.row)?.get(&coord.col)
    }

    pub fn set_cell(&mut self, coord: CellCoord, record: CellRecord) {
        self.cell_data
            .entry(coord.row)
            .or_default()
            .insert(coord.col, record);
    }

    /// Smallest rectangle covering every stored record.
    pub fn extent(&self) -> Option<RangeBounds> {
        let mut bounds: Option<RangeBounds> = None;
        for (&row, cols) in &self.cell_data {
            let (Some((&first, _)), Some((&last, _))) =
                (cols.first_key_value(), cols.last_key_value())
            else {
                continue;
            };
            let row_bounds = RangeBounds::new(CellCoord::new(row, first), CellCoord::new(row, last));
            bounds = Some(match bounds {
                None => row_bounds,
                Some(b) => RangeBounds::new(
                    CellCoord::new(b.start_row.min(row), b.start_col.min(first)),
                    CellCoord::new(b.end_row.max(row), b.end_col.max(last)),
                ),
            });
        }
        bounds
    }

    /// Stored records as rectangular blocks, each with its top-left corner.
    ///
    /// Every row is split into runs of adjacent columns; consecutive rows whose runs share a
    /// column span are stacked into one block. Gaps are never filled, so the blocks hold
    /// exactly the stored records.
    pub fn blocks(&self) -> Vec<(CellCoord, Vec<Vec<CellRecord>>)> {
        let mut blocks: Vec<(CellCoord, Vec<Vec<CellRecord>>)> = Vec::new();
        // (first column, width) -> index of a block whose last row is the previous row
        let mut open: HashMap<(u32, usize), usize> = HashMap::new();
        for (&row, cols) in &self.cell_data {
            let mut runs: Vec<(CellCoord, Vec<CellRecord>)> = Vec::new();
            for (&col, record) in cols {
                let adjacent = runs
                    .last()
                    .is_some_and(|(start, cells)| start.col as usize + cells.len() == col as usize);
                if adjacent && let Some((_, cells)) = runs.last_mut() {
                    cells.push(record.clone());
                } else {
                    runs.push((CellCoord::new(row, col), vec![record.clone()]));
                }
            }

            let mut next_open = HashMap::with_capacity(runs.len());
            for (start, cells) in runs {
                let key = (start.col, cells.len());
                let idx = match open.get(&key) {
                    Some(&idx) if blocks[idx].0.row as usize + blocks[idx].1.len() == row as usize => {
                        blocks[idx].1.push(cells);
                        idx
                    }
                    _ => {
                        blocks.push((start, vec![cells]));
                        blocks.len() - 1
                    }
                };
                next_open.insert(key, idx);
            }
            open = next_open;
        }
        blocks
    }

    /// Values only, from A1 through the extent, for tabular codecs.
    pub fn value_rows(&self) -> Vec<Vec<RawValue>> {
        let Some(extent) = self.extent() else {
            return Vec::new();
        };
        (0..=extent.end_row)
            .map(|row| {
                (0..=extent.end_col)
                    .map(|col| {
                        self.cell(CellCoord::new(row, col))
                            .map(|record| record.value.clone())
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .collect()
    }

    /// Declared capacity widened to cover the stored data.
    pub fn capacity(&self, default_rows: u32, default_cols: u32) -> (u32, u32) {
        let declared_rows = self.row_count.unwrap_or(default_rows).max(1);
        let declared_cols = self.column_count.unwrap_or(default_cols).max(1);
        match self.extent() {
            Some(extent) => (
                declared_rows.max(extent.end_row.saturating_add(1)),
                declared_cols.max(extent.end_col.saturating_add(1)),
            ),
            None => (declared_rows, declared_cols),
        }
    }

    pub fn cell_count(&self) -> usize {
        self.cell_data.values().map(BTreeMap::len).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkbookSnapshot {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sheet_order: Vec<SheetId>,
    pub sheets: IndexMap<SheetId, SheetSnapshot>,
    #[serde(default)]
    pub styles: IndexMap<String, Value>,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WorkbookSnapshot {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Validates the structural shape before deserializing.
    pub fn from_value(value: Value) -> Result<Self, BridgeError> {
        let Value::Object(map) = &value else {
            return Err(BridgeError::SnapshotStructureInvalid(
                "snapshot must be a JSON object".to_string(),
            ));
        };
        match map.get("sheets") {
            Some(Value::Object(_)) => {}
            Some(_) => {
                return Err(BridgeError::SnapshotStructureInvalid(
                    "'sheets' must be an object keyed by sheet id".to_string(),
                ));
            }
            None => {
                return Err(BridgeError::SnapshotStructureInvalid(
                    "missing 'sheets' key".to_string(),
                ));
            }
        }

        let mut snapshot: WorkbookSnapshot = serde_json::from_value(value)
            .map_err(|err| BridgeError::SnapshotStructureInvalid(err.to_string()))?;

        for (id, sheet) in snapshot.sheets.iter_mut() {
            if sheet.id.as_str().is_empty() {
                sheet.id = id.clone();
            }
            sheet.merge_data = sheet.merge_data.iter().map(|m| m.normalized()).collect();
        }
        if let Some(missing) = snapshot
            .sheet_order
            .iter()
            .find(|id| !snapshot.sheets.contains_key(*id))
        {
            return Err(BridgeError::SnapshotStructureInvalid(format!(
                "sheetOrder references unknown sheet '{missing}'"
            )));
        }
        Ok(snapshot)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, BridgeError> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|err| BridgeError::SnapshotStructureInvalid(err.to_string()))?;
        Self::from_value(value)
    }

    /// Sheets in declared order, followed by any sheet the order list omits.
    pub fn ordered_sheets(&self) -> Vec<&SheetSnapshot> {
        let mut ordered: Vec<&SheetSnapshot> = self
            .sheet_order
            .iter()
            .filter_map(|id| self.sheets.get(id))
            .collect();
        for (id, sheet) in &self.sheets {
            if !self.sheet_order.contains(id) {
                ordered.push(sheet);
            }
        }
        ordered
    }

    pub fn push_sheet(&mut self, sheet: SheetSnapshot) {
        let id = sheet.id.clone();
        if !self.sheet_order.contains(&id) {
            self.sheet_order.push(id.clone());
        }
        self.sheets.insert(id, sheet);
    }

    pub fn sheet_by_name(&self, name: &str) -> Option<&SheetSnapshot> {
        self.sheets.values().find(|sheet| sheet.name == name)
    }

    pub fn resolve_style<'a>(&'a self, style: &'a StyleRef) -> Option<&'a Value> {
        match style {
            StyleRef::Id(id) => self.styles.get(id),
            StyleRef::Inline(value) => Some(value),
        }
    }
}
