use anyhow::Result;
use serde_json::json;
use sheet_bridge::address::{CellCoord, parse_range};
use sheet_bridge::codec::{Codec, FileFormat, NativeCodec};
use sheet_bridge::errors::ErrorCode;
use sheet_bridge::extract::RawValue;
use sheet_bridge::grid::{MemoryGrid, MemoryGridOptions, ProtectionCommand};
use sheet_bridge::interchange::{ExportOptions, ImportOptions};
use sheet_bridge::merge::{AppendOptions, append_workbook};
use sheet_bridge::model::{CellRecord, SheetId, SheetSnapshot, StyleRef};
use std::sync::Arc;
use std::time::Duration;

mod support;

#[tokio::test(flavor = "current_thread")]
async fn colliding_names_gain_a_counter() -> Result<()> {
    let grid = MemoryGrid::with_sheets(&["Data", "Data (1)"]);
    let source = support::workbook(
        "src",
        vec![
            support::column_sheet("s1", "Data", 2),
            support::column_sheet("s2", "Notes", 1),
            support::column_sheet("s3", "Data", 1),
        ],
    );

    let outcome = append_workbook(&grid, &source, &AppendOptions::default()).await?;

    assert_eq!(outcome.sheet_count, 3);
    assert!(outcome.failures.is_empty());
    assert_eq!(
        grid.sheet_names(),
        vec!["Data", "Data (1)", "Data (2)", "Notes", "Data (3)"]
    );
    assert_eq!(
        support::cell_value(&grid, "Data (2)", 1, 0),
        Some(RawValue::Number(2.0))
    );
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn two_appends_into_an_empty_book_keep_both_sheets() -> Result<()> {
    let grid = MemoryGrid::new();
    let first = support::workbook("a", vec![support::column_sheet("s1", "Data", 1)]);
    let second = support::workbook("b", vec![support::column_sheet("s1", "Data", 2)]);

    append_workbook(&grid, &first, &AppendOptions::default()).await?;
    append_workbook(&grid, &second, &AppendOptions::default()).await?;

    assert_eq!(grid.sheet_names(), vec!["Data", "Data (1)"]);
    assert_eq!(
        support::cell_value(&grid, "Data (1)", 1, 0),
        Some(RawValue::Number(2.0))
    );
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn one_failing_sheet_does_not_stop_the_others() -> Result<()> {
    let grid = support::FlakyGrid::new(MemoryGrid::with_sheets(&["Base"]), "B");
    let source = support::workbook(
        "src",
        vec![
            support::column_sheet("s1", "A", 1),
            support::column_sheet("s2", "B", 1),
            support::column_sheet("s3", "C", 1),
        ],
    );

    let outcome = append_workbook(&grid, &source, &AppendOptions::default()).await?;

    assert_eq!(outcome.sheet_count, 2);
    assert_eq!(outcome.source_sheet_count, 3);
    let mapped: Vec<&str> = outcome.sheet_map.keys().map(SheetId::as_str).collect();
    assert_eq!(mapped, vec!["s1", "s3"]);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].source_id, SheetId::from("s2"));
    assert!(
        outcome
            .warnings
            .iter()
            .any(|w| w.code == ErrorCode::SheetAppendFailed && w.message.contains("'B'"))
    );
    assert_eq!(
        support::cell_value(&grid.inner, "C", 0, 0),
        Some(RawValue::Number(1.0))
    );
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn protection_rules_follow_the_new_sheet_ids() -> Result<()> {
    let grid = MemoryGrid::with_sheets(&["Base"]);
    let mut source = support::workbook(
        "src-unit",
        vec![
            support::column_sheet("old-1", "Locked", 3),
            support::column_sheet("old-2", "Ranges", 3),
        ],
    );
    source.resources.push(support::protection_resource(
        "SHEET_WORKSHEET_PROTECTION_PLUGIN",
        json!({
            "old-1": {"unitId": "src-unit", "subUnitId": "old-1", "unitType": 2}
        }),
    ));
    source.resources.push(support::protection_resource(
        "SHEET_RANGE_PROTECTION_PLUGIN",
        json!({
            "old-2": [{
                "unitId": "src-unit",
                "subUnitId": "old-2",
                "permissionId": "perm-7",
                "unitType": 3,
                "ranges": [{"startRow": 0, "endRow": 1, "startColumn": 0, "endColumn": 0}]
            }],
            "gone": [{"unitId": "src-unit", "subUnitId": "gone", "permissionId": "perm-9"}]
        }),
    ));

    let outcome = append_workbook(&grid, &source, &AppendOptions::default()).await?;

    assert_eq!(outcome.protection.applied, 2);
    assert_eq!(outcome.protection.skipped, 1);
    assert_eq!(outcome.protection.failed, 0);

    let unit_id = {
        use sheet_bridge::grid::GridControl;
        grid.unit_id().await?
    };
    let new_ids: Vec<String> = outcome.sheet_map.values().map(|id| id.to_string()).collect();
    let commands = grid.protections();
    assert_eq!(commands.len(), 2);
    for command in &commands {
        assert!(new_ids.contains(&command.sheet_id().to_string()));
        let rendered = command.rule().to_string();
        assert!(!rendered.contains("old-1") && !rendered.contains("old-2"));
        assert!(!rendered.contains("src-unit"));
        assert_eq!(command.rule()["unitId"], json!(unit_id));
    }
    assert!(commands.iter().any(|command| matches!(
        command,
        ProtectionCommand::LockRange { permission_id, .. } if permission_id == "perm-7"
    )));
    Ok(())
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn pending_sheets_are_resolved_by_polling() -> Result<()> {
    let grid = MemoryGrid::with_options(MemoryGridOptions {
        registration_delay: Some(Duration::from_millis(120)),
        ..MemoryGridOptions::default()
    });
    let source = support::workbook("src", vec![support::column_sheet("s1", "Late", 4)]);

    let outcome = append_workbook(&grid, &source, &AppendOptions::default()).await?;

    assert_eq!(outcome.sheet_count, 1);
    assert_eq!(
        support::cell_value(&grid, "Late", 3, 0),
        Some(RawValue::Number(4.0))
    );
    Ok(())
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn sheets_that_never_register_are_reported() -> Result<()> {
    let grid = MemoryGrid::with_options(MemoryGridOptions {
        registration_delay: Some(Duration::from_secs(60)),
        ..MemoryGridOptions::default()
    });
    let source = support::workbook("src", vec![support::column_sheet("s1", "Never", 1)]);

    let outcome = append_workbook(&grid, &source, &AppendOptions::default()).await?;

    assert_eq!(outcome.sheet_count, 0);
    assert!(outcome.sheet_map.is_empty());
    assert_eq!(outcome.failures.len(), 1);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn workbench_appends_a_gridbook_file() -> Result<()> {
    let workspace = support::TestWorkspace::new();
    let grid = Arc::new(MemoryGrid::with_sheets(&["Summary"]));
    let bench = workspace.bench(grid.clone());

    let other = support::workbook("other", vec![support::column_sheet("x", "Summary", 2)]);
    let path = workspace.path("other.gridbook");
    NativeCodec.export_snapshot(&other, &path, &ExportOptions::lossless(FileFormat::Gridbook))?;

    let outcome = bench.append_file(&path, ImportOptions::default()).await?;

    assert_eq!(outcome.sheets[0].name, "Summary (1)");
    let snapshot = bench.snapshot().await?;
    assert_eq!(snapshot.sheets.len(), 2);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn appending_no_sheet_at_all_is_a_failure() -> Result<()> {
    let workspace = support::TestWorkspace::new();
    let path = workspace.path("single.gridbook");
    let source = support::workbook("src", vec![support::column_sheet("s1", "Only", 2)]);
    NativeCodec.export_snapshot(&source, &path, &ExportOptions::lossless(FileFormat::Gridbook))?;
    let flaky = || Arc::new(support::FlakyGrid::new(MemoryGrid::with_sheets(&["Base"]), "Only"));

    let result = workspace
        .bench(flaky())
        .import(&path, ImportOptions::default())
        .await;
    assert!(!result.success);
    assert_eq!(result.error_code(), Some(ErrorCode::SheetAppendFailed));
    let outcome = result.append.expect("merge details are kept");
    assert_eq!((outcome.sheet_count, outcome.source_sheet_count), (0, 1));

    let err = workspace
        .bench(flaky())
        .append_file(&path, ImportOptions::default())
        .await
        .expect_err("nothing was appended");
    assert_eq!(err.code(), ErrorCode::SheetAppendFailed);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn rules_never_point_at_a_sheet_that_failed() -> Result<()> {
    let grid = support::FlakyGrid::new(MemoryGrid::with_sheets(&["Base"]), "Broken");
    let mut source = support::workbook(
        "src",
        vec![
            support::column_sheet("s1", "Keep", 2),
            support::column_sheet("s2", "Broken", 2),
        ],
    );
    source.resources.push(support::protection_resource(
        "SHEET_RANGE_PROTECTION_PLUGIN",
        json!({
            "s1": [{
                "unitId": "src",
                "subUnitId": "s1",
                "permissionId": "perm-1",
                "unitType": 3,
                "ranges": [
                    {"subUnitId": "s1", "startRow": 0, "endRow": 0, "startColumn": 0, "endColumn": 0},
                    {"subUnitId": "s2", "startRow": 0, "endRow": 1, "startColumn": 0, "endColumn": 0}
                ]
            }]
        }),
    ));
    source.resources.push(support::protection_resource(
        "SHEET_WORKSHEET_PROTECTION_PLUGIN",
        json!({
            "s1": {"unitId": "src", "subUnitId": "s1", "unitType": 2, "mirror": {"subUnitId": "s2"}}
        }),
    ));

    let outcome = append_workbook(&grid, &source, &AppendOptions::default()).await?;

    assert_eq!(outcome.sheet_count, 1);
    assert_eq!(outcome.protection.applied, 1);
    assert_eq!(outcome.protection.skipped, 1);
    let commands = grid.inner.protections();
    assert_eq!(commands.len(), 1);
    let rule = commands[0].rule();
    assert_eq!(rule["ranges"].as_array().map(Vec::len), Some(1));
    assert!(!rule.to_string().contains("\"s2\""));
    assert_eq!(
        rule["ranges"][0]["subUnitId"],
        json!(outcome.sheet_map[&SheetId::from("s1")].to_string())
    );
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn appended_sheets_keep_merges_formulas_and_styles() -> Result<()> {
    let grid = MemoryGrid::new();
    let mut sheet = support::sheet(
        "s1",
        "Report",
        vec![
            vec![
                support::text("title").with_style(StyleRef::Id("st-bold".to_string())),
                CellRecord::default(),
            ],
            vec![support::num(2.0), CellRecord::formula("=A2*3")],
        ],
    );
    sheet.merge_data.push(parse_range("A1:B1")?);
    let mut source = support::workbook("src", vec![sheet]);
    source
        .styles
        .insert("st-bold".to_string(), json!({"bl": 1, "fs": 14}));

    append_workbook(&grid, &source, &AppendOptions::default()).await?;

    let appended = grid.sheet_snapshot("Report").expect("sheet appended");
    assert_eq!(appended.merge_data, vec![parse_range("A1:B1")?]);
    assert_eq!(
        appended.cell(CellCoord::new(0, 0)).and_then(|c| c.style.clone()),
        Some(StyleRef::Inline(json!({"bl": 1, "fs": 14})))
    );
    assert_eq!(
        appended
            .cell(CellCoord::new(1, 1))
            .and_then(|c| c.formula.as_deref()),
        Some("=A2*3")
    );
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn sparse_sheets_load_only_their_stored_cells() -> Result<()> {
    let grid = MemoryGrid::new();
    let mut sheet = SheetSnapshot::new("s1", "Sparse");
    sheet.set_cell(CellCoord::ORIGIN, support::text("corner"));
    sheet.set_cell(CellCoord::new(200_000, 1_000), support::num(7.0));
    let source = support::workbook("src", vec![sheet]);

    let outcome = append_workbook(&grid, &source, &AppendOptions::default()).await?;

    assert!(outcome.failures.is_empty());
    let appended = grid.sheet_snapshot("Sparse").expect("sheet appended");
    assert_eq!(appended.cell_count(), 2);
    assert_eq!(
        support::cell_value(&grid, "Sparse", 200_000, 1_000),
        Some(RawValue::Number(7.0))
    );
    Ok(())
}
