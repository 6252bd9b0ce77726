use serde::{Deserialize, Serialize};
use std::fmt;

/// Primitive cell value as exchanged with the grid and codecs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl RawValue {
    pub fn is_null(&self) -> bool {
        matches!(self, RawValue::Null)
    }

    /// Null, or text that is empty once trimmed.
    pub fn is_blank(&self) -> bool {
        match self {
            RawValue::Null => true,
            RawValue::Text(text) => text.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            RawValue::Number(n) => Some(*n),
            RawValue::Text(text) => text.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Text fields that look numeric become numbers; everything else stays text.
    pub fn infer(field: &str) -> Self {
        if field.is_empty() {
            return RawValue::Null;
        }
        let trimmed = field.trim();
        if !trimmed.is_empty()
            && let Ok(n) = trimmed.parse::<f64>()
            && n.is_finite()
        {
            return RawValue::Number(n);
        }
        RawValue::Text(field.to_string())
    }

    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => RawValue::Null,
            serde_json::Value::Bool(b) => RawValue::Bool(*b),
            serde_json::Value::Number(n) => n.as_f64().map(RawValue::Number).unwrap_or_default(),
            serde_json::Value::String(s) => RawValue::Text(s.clone()),
            other => RawValue::Text(other.to_string()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            RawValue::Null => serde_json::Value::Null,
            RawValue::Bool(b) => serde_json::Value::Bool(*b),
            RawValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            RawValue::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Null => Ok(()),
            RawValue::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            RawValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            RawValue::Number(n) => write!(f, "{n}"),
            RawValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::Text(value)
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

impl From<bool> for RawValue {
    fn from(value: bool) -> Self {
        RawValue::Bool(value)
    }
}

impl<T: Into<RawValue>> From<Option<T>> for RawValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}

/// Cells that the trimming pass can classify and pad.
pub trait BlankCell {
    fn is_blank(&self) -> bool;
    fn blank() -> Self;
}

impl BlankCell for RawValue {
    fn is_blank(&self) -> bool {
        RawValue::is_blank(self)
    }

    fn blank() -> Self {
        RawValue::Null
    }
}

/// Trims trailing blank rows and columns from a jagged block in a single scan.
///
/// Rows are moved into the output as they are scanned; afterwards every kept row is padded
/// with blanks or truncated to the widest non-blank column. Leading blank rows and columns
/// survive. An input without any non-blank cell yields an empty vector.
pub fn clean_rectangle<T: BlankCell>(rows: Vec<Vec<T>>) -> Vec<Vec<T>> {
    let mut last_row: Option<usize> = None;
    let mut last_col: Option<usize> = None;
    let mut cleaned = Vec::with_capacity(rows.len());

    for (row_idx, row) in rows.into_iter().enumerate() {
        let row_last = row.iter().rposition(|cell| !cell.is_blank());
        if let Some(col_idx) = row_last {
            last_row = Some(row_idx);
            last_col = Some(last_col.map_or(col_idx, |current| current.max(col_idx)));
        }
        cleaned.push(row);
    }

    let (Some(last_row), Some(last_col)) = (last_row, last_col) else {
        return Vec::new();
    };

    cleaned.truncate(last_row + 1);
    for row in &mut cleaned {
        row.resize_with(last_col + 1, T::blank);
    }
    cleaned
}

/// Pads every row to the widest row without trimming anything.
pub fn pad_rectangle<T: BlankCell>(mut rows: Vec<Vec<T>>) -> Vec<Vec<T>> {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    for row in &mut rows {
        row.resize_with(width, T::blank);
    }
    rows
}

/// `(rows, widest row)` of a possibly jagged block.
pub fn dimensions<T>(rows: &[Vec<T>]) -> (usize, usize) {
    (rows.len(), rows.iter().map(Vec::len).max().unwrap_or(0))
}
