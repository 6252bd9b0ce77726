use serde_json::Value;
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;

fn write_fixture(path: &Path, value: f64) {
    let mut workbook = umya_spreadsheet::new_file();
    let sheet = workbook
        .get_sheet_by_name_mut("Sheet1")
        .expect("default sheet exists");
    sheet.get_cell_mut("A1").set_value_number(value);
    sheet.get_cell_mut("B1").set_formula("A1*2");
    umya_spreadsheet::writer::xlsx::write(&workbook, path).expect("write workbook");
}

fn run_cli(dir: &Path, args: &[&str]) -> std::process::Output {
    Command::new(assert_cmd::cargo::cargo_bin!("sheet-bridge"))
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .expect("run sheet-bridge")
}

fn parse_stdout_json(output: &std::process::Output) -> Value {
    let stdout = String::from_utf8(output.stdout.clone()).expect("stdout utf8");
    serde_json::from_str(&stdout).expect("valid json")
}

#[test]
fn convert_csv_to_markdown() {
    let tmp = tempdir().expect("tempdir");
    std::fs::write(tmp.path().join("parts.csv"), "part,qty\nbolt,4\n").expect("write csv");

    let output = run_cli(tmp.path(), &["convert", "parts.csv", "parts.md"]);
    assert!(output.status.success(), "stderr: {:?}", output.stderr);

    let payload = parse_stdout_json(&output);
    assert_eq!(payload["import"]["success"], Value::Bool(true));
    assert_eq!(payload["export"]["rows"], 2);
    let markdown = std::fs::read_to_string(tmp.path().join("parts.md")).expect("read md");
    assert!(markdown.starts_with("| part | qty |"));
}

#[test]
fn convert_xlsx_range_to_csv() {
    let tmp = tempdir().expect("tempdir");
    write_fixture(&tmp.path().join("book.xlsx"), 21.0);

    let output = run_cli(
        tmp.path(),
        &[
            "convert",
            "book.xlsx",
            "out.csv",
            "--range",
            "A1:B1",
            "--line-ending",
            "lf",
            "--formulas",
        ],
    );
    assert!(output.status.success(), "stderr: {:?}", output.stderr);
    let csv = std::fs::read_to_string(tmp.path().join("out.csv")).expect("read csv");
    assert_eq!(csv, "21,=A1*2\n");
}

#[test]
fn bad_range_reports_its_code() {
    let tmp = tempdir().expect("tempdir");
    std::fs::write(tmp.path().join("a.csv"), "1\n").expect("write csv");

    let output = run_cli(tmp.path(), &["convert", "a.csv", "b.csv", "--range", "A1:"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("RANGE_FORMAT_ERROR"), "stderr: {stderr}");
    assert!(!tmp.path().join("b.csv").exists());
}

#[test]
fn append_merges_two_workbooks() {
    let tmp = tempdir().expect("tempdir");
    write_fixture(&tmp.path().join("base.xlsx"), 1.0);
    write_fixture(&tmp.path().join("other.xlsx"), 2.0);

    let output = run_cli(
        tmp.path(),
        &["--compact", "append", "base.xlsx", "other.xlsx", "merged.xlsx"],
    );
    assert!(output.status.success(), "stderr: {:?}", output.stderr);

    let payload = parse_stdout_json(&output);
    assert_eq!(payload["append"]["sheetCount"], 1);
    assert_eq!(payload["append"]["sheets"][0]["name"], "Sheet1 (1)");

    let inspect = run_cli(tmp.path(), &["inspect", "merged.xlsx"]);
    assert!(inspect.status.success(), "stderr: {:?}", inspect.stderr);
    let sheets = parse_stdout_json(&inspect)["sheets"].clone();
    let names: Vec<&str> = sheets
        .as_array()
        .expect("sheets array")
        .iter()
        .filter_map(|entry| entry["name"].as_str())
        .collect();
    assert_eq!(names, vec!["Sheet1", "Sheet1 (1)"]);
}

#[test]
fn paths_outside_the_workspace_are_refused() {
    let tmp = tempdir().expect("tempdir");
    let outside = tempdir().expect("tempdir");
    std::fs::write(tmp.path().join("a.csv"), "1\n").expect("write csv");
    let target = outside.path().join("b.csv");

    let output = run_cli(
        tmp.path(),
        &["convert", "a.csv", target.to_str().expect("path utf8")],
    );
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("PATH_VALIDATION"));
}

#[test]
fn schema_describes_both_option_records() {
    let tmp = tempdir().expect("tempdir");
    let output = run_cli(tmp.path(), &["schema"]);
    assert!(output.status.success(), "stderr: {:?}", output.stderr);

    let payload = parse_stdout_json(&output);
    assert!(payload["exportOptions"]["properties"]["rangeMode"].is_object());
    assert!(payload["importOptions"]["properties"]["targetRange"].is_object());
}
