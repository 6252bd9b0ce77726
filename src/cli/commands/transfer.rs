use super::{import_options, workbench};
use crate::cli::errors::{coded, ensure_imported};
use crate::cli::{AppendArgs, ConvertArgs};
use crate::codec::FileFormat;
use crate::config::BridgeConfig;
use crate::interchange::{ExportOptions, ImportOptions, SnapshotMode};
use anyhow::{Result, anyhow};
use serde_json::{Value, json};
use std::path::Path;

fn output_format(path: &Path, explicit: Option<FileFormat>) -> Result<FileFormat> {
    explicit
        .or_else(|| FileFormat::from_path(path))
        .ok_or_else(|| {
            anyhow!(
                "INVALID_OPTIONS: cannot infer an output format for '{}'; pass --to",
                path.display()
            )
        })
}

pub async fn convert(config: BridgeConfig, args: ConvertArgs) -> Result<Value> {
    let format = output_format(&args.output, args.to)?;
    let bench = workbench(config);

    let import = ImportOptions {
        snapshot_mode: SnapshotMode::Replace,
        source_sheet: args.sheet.clone(),
        ..import_options(&args.read)
    };
    let imported = ensure_imported(bench.import(&args.input, import).await)?;

    let sheet = args
        .sheet
        .clone()
        .or_else(|| imported.sheet_names.first().cloned());
    let mut options = ExportOptions {
        sheet,
        delimiter: args.delimiter,
        line_ending: args.line_ending,
        include_headers: !args.no_headers,
        include_formulas: args.formulas,
        include_formatting: args.formatting,
        include_metadata: args.metadata,
        json_layout: args.json_layout,
        title: args.title,
        ..ExportOptions::new(format)
    };
    if let Some(range) = args.range {
        options = options.with_custom_range(range);
    }
    let exported = bench.export(&args.output, options).await.map_err(coded)?;

    Ok(json!({
        "import": imported,
        "export": exported,
    }))
}

pub async fn append(config: BridgeConfig, args: AppendArgs) -> Result<Value> {
    let format = output_format(&args.output, args.to)?;
    let bench = workbench(config);

    let base = ImportOptions {
        snapshot_mode: SnapshotMode::Replace,
        ..ImportOptions::default()
    };
    ensure_imported(bench.import(&args.base, base).await)?;

    let outcome = bench
        .append_file(&args.other, ImportOptions::default())
        .await
        .map_err(coded)?;
    let exported = bench
        .export(&args.output, ExportOptions::lossless(format))
        .await
        .map_err(coded)?;

    Ok(json!({
        "append": outcome,
        "export": exported,
    }))
}
