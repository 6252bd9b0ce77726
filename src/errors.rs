use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};
use thiserror::Error;

/// Stable, machine-readable error codes surfaced to callers alongside a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidAddress,
    RangeFormatError,
    RangeCapacityMismatch,
    NoDataFound,
    SnapshotStructureInvalid,
    SheetAppendFailed,
    ProtectionApplyFailed,
    QueueCleared,
    QueueAborted,
    UnsupportedFormat,
    InvalidOptions,
    PathValidation,
    ImportFailed,
    ExportFailed,
    GridError,
    IoError,
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("invalid address '{input}': {reason}")]
    InvalidAddress { input: String, reason: String },

    #[error("invalid range '{range}': {reason}")]
    RangeFormat { range: String, reason: String },

    #[error(
        "data ({data_rows}x{data_cols}) exceeds selected range {range} ({range_rows}x{range_cols})"
    )]
    RangeCapacityMismatch {
        range: String,
        data_rows: usize,
        data_cols: usize,
        range_rows: usize,
        range_cols: usize,
    },

    #[error("no data found: {0}")]
    NoDataFound(String),

    #[error("workbook snapshot is malformed: {0}")]
    SnapshotStructureInvalid(String),

    #[error("failed to append sheet '{sheet}': {reason}")]
    SheetAppendFailed { sheet: String, reason: String },

    #[error("failed to apply protection rule for sheet {sheet_id}: {reason}")]
    ProtectionApplyFailed { sheet_id: String, reason: String },

    #[error("operation was cancelled because the mutation queue was cleared")]
    QueueCleared,

    #[error("queued operation did not complete: {0}")]
    QueueAborted(String),

    #[error("format '{format}' does not support {operation}")]
    UnsupportedFormat { format: String, operation: String },

    #[error("invalid options: {0}")]
    InvalidOptions(String),

    #[error("path '{path}' rejected for {field}: {reason}")]
    PathValidation {
        field: String,
        path: String,
        reason: String,
    },

    #[error("import failed: {0:#}")]
    Import(#[source] anyhow::Error),

    #[error("export failed: {0:#}")]
    Export(#[source] anyhow::Error),

    #[error("grid operation failed: {0:#}")]
    Grid(#[source] anyhow::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    pub fn code(&self) -> ErrorCode {
        match self {
            BridgeError::InvalidAddress { .. } => ErrorCode::InvalidAddress,
            BridgeError::RangeFormat { .. } => ErrorCode::RangeFormatError,
            BridgeError::RangeCapacityMismatch { .. } => ErrorCode::RangeCapacityMismatch,
            BridgeError::NoDataFound(_) => ErrorCode::NoDataFound,
            BridgeError::SnapshotStructureInvalid(_) => ErrorCode::SnapshotStructureInvalid,
            BridgeError::SheetAppendFailed { .. } => ErrorCode::SheetAppendFailed,
            BridgeError::ProtectionApplyFailed { .. } => ErrorCode::ProtectionApplyFailed,
            BridgeError::QueueCleared => ErrorCode::QueueCleared,
            BridgeError::QueueAborted(_) => ErrorCode::QueueAborted,
            BridgeError::UnsupportedFormat { .. } => ErrorCode::UnsupportedFormat,
            BridgeError::InvalidOptions(_) => ErrorCode::InvalidOptions,
            BridgeError::PathValidation { .. } => ErrorCode::PathValidation,
            BridgeError::Import(_) => ErrorCode::ImportFailed,
            BridgeError::Export(_) => ErrorCode::ExportFailed,
            BridgeError::Grid(_) => ErrorCode::GridError,
            BridgeError::Io(_) => ErrorCode::IoError,
        }
    }

    pub fn invalid_address(input: impl Into<String>, reason: impl Into<String>) -> Self {
        BridgeError::InvalidAddress {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn range_format(range: impl Into<String>, reason: impl Into<String>) -> Self {
        BridgeError::RangeFormat {
            range: range.into(),
            reason: reason.into(),
        }
    }

    pub fn unsupported(format: impl ToString, operation: impl Into<String>) -> Self {
        BridgeError::UnsupportedFormat {
            format: format.to_string(),
            operation: operation.into(),
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            code: self.code(),
            message: self.to_string(),
        }
    }

    pub fn to_warning(&self) -> Warning {
        Warning::new(self.code(), self.to_string())
    }
}

/// Failure payload embedded in result records instead of propagating an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub code: ErrorCode,
    pub message: String,
}

/// Non-fatal condition attached to a successful result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub code: ErrorCode,
    pub message: String,
}

impl Warning {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}
