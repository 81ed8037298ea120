//! End-to-end runs of the `csvtok` binary on files in a temp directory.

use std::fs;
use std::process::{Command, Output};

fn csvtok(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_csvtok"))
        .args(args)
        .env_remove("CSVTOK_SCHEMA")
        .env_remove("CSVTOK_SEPARATOR")
        .output()
        .expect("failed to run csvtok")
}

fn stdout(output: &Output) -> String {
    assert!(
        output.status.success(),
        "csvtok failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout.clone()).unwrap()
}

#[test]
fn test_to_json_with_schema_file() {
    let dir = tempfile::tempdir().unwrap();
    let schema = dir.path().join("schema.yaml");
    fs::write(
        &schema,
        "use_header: true\ncolumns:\n  - name: id\n    type: number\n  - name: ok\n    type: boolean\n",
    )
    .unwrap();
    let input = dir.path().join("in.csv");
    fs::write(&input, "id,ok\n1,true\n2,false\n").unwrap();

    let out = csvtok(&[
        "to-json",
        input.to_str().unwrap(),
        "--schema",
        schema.to_str().unwrap(),
        "--layout",
        "array",
    ]);
    assert_eq!(
        stdout(&out),
        "[{\"id\":1,\"ok\":true},{\"id\":2,\"ok\":false}]\n"
    );
}

#[test]
fn test_from_json_to_file_and_back() {
    let dir = tempfile::tempdir().unwrap();
    let json = dir.path().join("rows.json");
    fs::write(&json, "[{\"name\":\"a;b\",\"n\":1},{\"name\":\"c\",\"n\":2}]").unwrap();
    let csv = dir.path().join("rows.csv");

    let out = csvtok(&[
        "from-json",
        json.to_str().unwrap(),
        "--header",
        "--separator",
        ";",
        "--output",
        csv.to_str().unwrap(),
    ]);
    stdout(&out);
    assert_eq!(fs::read_to_string(&csv).unwrap(), "name;n\n\"a;b\";1\nc;2\n");

    let out = csvtok(&["to-json", csv.to_str().unwrap(), "--header", "--separator", ";"]);
    assert_eq!(
        stdout(&out),
        "{\"name\":\"a;b\",\"n\":\"1\"}\n{\"name\":\"c\",\"n\":\"2\"}\n"
    );
}

#[test]
fn test_detect() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("data.txt");
    fs::write(&input, "a,b,c\n1,2,3\n").unwrap();
    assert_eq!(stdout(&csvtok(&["detect", input.to_str().unwrap()])), "SolidMatch\n");
    assert_eq!(
        stdout(&csvtok(&["detect", input.to_str().unwrap(), "--separator", "|"])),
        "Inconclusive\n"
    );
}

#[test]
fn test_bad_row_fails_unless_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("bad.csv");
    fs::write(&input, "a\n1\n2,3\n4\n").unwrap();

    let out = csvtok(&["to-json", input.to_str().unwrap(), "--header"]);
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("Error: Failed to read CSV row 2"), "{stderr}");

    let out = csvtok(&["to-json", input.to_str().unwrap(), "--header", "--skip-bad-rows"]);
    assert_eq!(stdout(&out), "{\"a\":\"1\"}\n{\"a\":\"4\"}\n");
}

#[test]
fn test_missing_input_file() {
    let out = csvtok(&["to-json", "/nonexistent/input.csv"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("Failed to open input"));
}
