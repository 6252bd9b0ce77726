use crate::errors::BridgeError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_MAX_ROWS: u32 = 1_048_576;
pub const DEFAULT_MAX_COLS: u32 = 16_384;

static CELL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z]+)([1-9][0-9]*)$").expect("cell pattern compiles"));

/// Zero-based cell position.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct CellCoord {
    pub row: u32,
    pub col: u32,
}

impl CellCoord {
    pub const ORIGIN: CellCoord = CellCoord { row: 0, col: 0 };

    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for CellCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_to_letters(self.col), u64::from(self.row) + 1)
    }
}

impl FromStr for CellCoord {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_cell(s)
    }
}

/// Inclusive, zero-based rectangle. Constructors keep `start <= end` on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeBounds {
    pub start_row: u32,
    #[serde(rename = "startColumn", alias = "startCol")]
    pub start_col: u32,
    pub end_row: u32,
    #[serde(rename = "endColumn", alias = "endCol")]
    pub end_col: u32,
}

impl RangeBounds {
    pub fn new(a: CellCoord, b: CellCoord) -> Self {
        Self {
            start_row: a.row.min(b.row),
            start_col: a.col.min(b.col),
            end_row: a.row.max(b.row),
            end_col: a.col.max(b.col),
        }
    }

    pub fn cell(coord: CellCoord) -> Self {
        Self::new(coord, coord)
    }

    /// Rectangle anchored at `start` spanning `rows` x `cols` cells. `None` for an empty extent.
    pub fn from_extent(start: CellCoord, rows: usize, cols: usize) -> Option<Self> {
        if rows == 0 || cols == 0 {
            return None;
        }
        let end_row = u32::try_from(rows - 1).ok()?.checked_add(start.row)?;
        let end_col = u32::try_from(cols - 1).ok()?.checked_add(start.col)?;
        Some(Self::new(start, CellCoord::new(end_row, end_col)))
    }

    /// Deserialized bounds may arrive reversed.
    pub fn normalized(self) -> Self {
        Self::new(self.start(), self.end())
    }

    pub fn start(&self) -> CellCoord {
        CellCoord::new(self.start_row, self.start_col)
    }

    pub fn end(&self) -> CellCoord {
        CellCoord::new(self.end_row, self.end_col)
    }

    pub fn row_count(&self) -> usize {
        (self.end_row - self.start_row) as usize + 1
    }

    pub fn col_count(&self) -> usize {
        (self.end_col - self.start_col) as usize + 1
    }

    pub fn cell_count(&self) -> usize {
        self.row_count() * self.col_count()
    }

    pub fn is_single_cell(&self) -> bool {
        self.start_row == self.end_row && self.start_col == self.end_col
    }

    pub fn contains(&self, coord: CellCoord) -> bool {
        (self.start_row..=self.end_row).contains(&coord.row)
            && (self.start_col..=self.end_col).contains(&coord.col)
    }

    pub fn overlaps(&self, other: &RangeBounds) -> bool {
        ranges_overlap(self, other)
    }

    /// Row-major enumeration of every cell in the rectangle.
    pub fn cells(&self) -> impl Iterator<Item = CellCoord> + '_ {
        (self.start_row..=self.end_row)
            .flat_map(move |row| (self.start_col..=self.end_col).map(move |col| CellCoord::new(row, col)))
    }

    /// Shrinks the rectangle from its top-left corner so it spans at most `rows` x `cols`.
    pub fn clipped_to(&self, rows: usize, cols: usize) -> Option<Self> {
        Self::from_extent(
            self.start(),
            rows.min(self.row_count()),
            cols.min(self.col_count()),
        )
    }
}

impl fmt::Display for RangeBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single_cell() {
            write!(f, "{}", self.start())
        } else {
            write!(f, "{}:{}", self.start(), self.end())
        }
    }
}

impl FromStr for RangeBounds {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_range(s)
    }
}

/// Grid dimensions that parsed addresses must fit inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressLimits {
    pub max_rows: u32,
    pub max_cols: u32,
}

impl Default for AddressLimits {
    fn default() -> Self {
        Self {
            max_rows: DEFAULT_MAX_ROWS,
            max_cols: DEFAULT_MAX_COLS,
        }
    }
}

impl AddressLimits {
    pub fn new(max_rows: u32, max_cols: u32) -> Self {
        Self {
            max_rows: max_rows.max(1),
            max_cols: max_cols.max(1),
        }
    }

    pub fn contains(&self, coord: CellCoord) -> bool {
        coord.row < self.max_rows && coord.col < self.max_cols
    }

    pub fn parse_cell(&self, input: &str) -> Result<CellCoord, BridgeError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(BridgeError::invalid_address(input, "address is empty"));
        }
        let caps = CELL_PATTERN.captures(trimmed).ok_or_else(|| {
            BridgeError::invalid_address(input, "expected column letters followed by a row number")
        })?;

        let col = letters_to_column(&caps[1])
            .map_err(|_| BridgeError::invalid_address(input, "column is out of range"))?;
        let row = caps[2]
            .parse::<u32>()
            .map_err(|_| BridgeError::invalid_address(input, "row is out of range"))?
            - 1;

        if col >= self.max_cols {
            return Err(BridgeError::invalid_address(
                input,
                format!("column exceeds the grid limit of {} columns", self.max_cols),
            ));
        }
        if row >= self.max_rows {
            return Err(BridgeError::invalid_address(
                input,
                format!("row exceeds the grid limit of {} rows", self.max_rows),
            ));
        }
        Ok(CellCoord::new(row, col))
    }

    pub fn parse_range(&self, input: &str) -> Result<RangeBounds, BridgeError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(BridgeError::invalid_address(input, "range is empty"));
        }
        match trimmed.split_once(':') {
            None => self.parse_cell(trimmed).map(RangeBounds::cell),
            Some((start, end)) => {
                if start.trim().is_empty() || end.trim().is_empty() {
                    return Err(BridgeError::invalid_address(
                        input,
                        "range is missing an endpoint",
                    ));
                }
                let start = self.parse_cell(start)?;
                let end = self.parse_cell(end)?;
                Ok(RangeBounds::new(start, end))
            }
        }
    }
}

/// Bijective base-26: 0 -> "A", 25 -> "Z", 26 -> "AA".
pub fn column_to_letters(index: u32) -> String {
    let mut n = u64::from(index) + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        letters.push(char::from(b'A' + rem));
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

pub fn letters_to_column(letters: &str) -> Result<u32, BridgeError> {
    if letters.is_empty() {
        return Err(BridgeError::invalid_address(letters, "column letters are empty"));
    }
    let mut col: u64 = 0;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return Err(BridgeError::invalid_address(
                letters,
                format!("'{c}' is not a column letter"),
            ));
        }
        col = col * 26 + u64::from(c.to_ascii_uppercase() as u8 - b'A' + 1);
        if col > u64::from(u32::MAX) {
            return Err(BridgeError::invalid_address(letters, "column is out of range"));
        }
    }
    Ok((col - 1) as u32)
}

pub fn parse_cell(input: &str) -> Result<CellCoord, BridgeError> {
    AddressLimits::default().parse_cell(input)
}

pub fn format_cell(coord: CellCoord) -> String {
    coord.to_string()
}

pub fn parse_range(input: &str) -> Result<RangeBounds, BridgeError> {
    AddressLimits::default().parse_range(input)
}

pub fn format_range(bounds: &RangeBounds) -> String {
    bounds.to_string()
}

pub fn ranges_overlap(a: &RangeBounds, b: &RangeBounds) -> bool {
    !(a.end_row < b.start_row
        || b.end_row < a.start_row
        || a.end_col < b.start_col
        || b.end_col < a.start_col)
}

pub fn bounds_to_range(bounds: &RangeBounds) -> String {
    format_range(bounds)
}

pub fn range_to_bounds(range: &str) -> Result<RangeBounds, BridgeError> {
    parse_range(range)
}
