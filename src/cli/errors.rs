use crate::errors::BridgeError;
use crate::interchange::ImportResult;
use anyhow::{Result, anyhow};

/// Failure reports become command errors carrying the stable code.
pub fn ensure_imported(result: ImportResult) -> Result<ImportResult> {
    if !result.success
        && let Some(report) = &result.error
    {
        return Err(anyhow!("{}: {}", report.code, report.message));
    }
    Ok(result)
}

pub fn coded(err: BridgeError) -> anyhow::Error {
    anyhow!("{}: {err}", err.code())
}
