//! JSON -> CSV -> JSON through a schema loaded from disk.

use std::io::Write;

use csvtok_core::{CsvGenerator, GeneratorConfig, ParserConfig, ReadFeatures, Schema};
use csvtok_json::{schema_from_sample, write_rows, JsonRows};
use serde_json::{json, Value};

const SCHEMA: &str = r#"
use_header: true
null_value: "n/a"
columns:
  - name: id
    type: number
  - name: title
  - name: done
    type: boolean
  - name: labels
    type: array
    array_element_separator: "|"
  - name: note
    type: string_or_literal
"#;

fn write_csv(schema: &Schema, rows: &[Value]) -> String {
    let mut out = Vec::new();
    {
        let mut generator =
            CsvGenerator::with_schema(&mut out, schema.clone(), GeneratorConfig::default());
        write_rows(&mut generator, rows).unwrap();
        generator.close().unwrap();
    }
    String::from_utf8(out).unwrap()
}

fn read_json(schema: &Schema, csv: &str) -> Vec<Value> {
    JsonRows::with_schema(csv.as_bytes(), schema.clone(), ParserConfig::default())
        .map(|row| row.unwrap())
        .collect()
}

#[test]
fn test_round_trip_with_schema_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(SCHEMA.as_bytes()).unwrap();
    file.flush().unwrap();
    let schema = Schema::from_file(file.path()).unwrap();

    let rows = vec![
        json!({"id": 1, "title": "write docs", "done": false, "labels": ["docs", "easy"], "note": "null"}),
        json!({"id": 2, "title": "fix \"quoted\" bug, again", "done": true, "labels": [], "note": "true"}),
        json!({"id": 3, "title": null, "done": true, "labels": ["x"], "note": "plain"}),
    ];
    let csv = write_csv(&schema, &rows);
    assert!(csv.starts_with("id,title,done,labels,note\n"));
    assert!(csv.contains("n/a"));

    let back = read_json(&schema, &csv);
    assert_eq!(
        back,
        vec![
            json!({"id": 1, "title": "write docs", "done": false, "labels": ["docs", "easy"], "note": null}),
            json!({"id": 2, "title": "fix \"quoted\" bug, again", "done": true, "labels": [], "note": true}),
            json!({"id": 3, "title": null, "done": true, "labels": ["x"], "note": "plain"}),
        ]
    );
}

#[test]
fn test_derived_schema_round_trip() {
    let rows = vec![
        json!({"name": "a", "score": 1.5}),
        json!({"name": "b", "score": -2}),
    ];
    let schema = schema_from_sample(&rows[0], &Schema::empty().with_header()).unwrap();
    let csv = write_csv(&schema, &rows);
    assert_eq!(csv, "name,score\na,1.5\nb,-2\n");
    assert_eq!(read_json(&schema, &csv), rows);
}

#[test]
fn test_header_defines_columns_when_none_declared() {
    let schema = Schema::empty().with_header();
    let csv = "b,a\n1,2\n3,4\n";
    assert_eq!(
        read_json(&schema, csv),
        vec![json!({"b": "1", "a": "2"}), json!({"b": "3", "a": "4"})]
    );
}

#[test]
fn test_missing_values_become_nulls() {
    let schema = Schema::builder()
        .add_column("a")
        .add_column("b")
        .add_column("c")
        .build();
    let features = ReadFeatures::default().with_insert_nulls_for_missing_columns(true);
    let rows: Vec<Value> = JsonRows::with_schema(
        &b"1\n1,2,3\n"[..],
        schema,
        ParserConfig::default().with_features(features),
    )
    .map(|row| row.unwrap())
    .collect();
    assert_eq!(
        rows,
        vec![
            json!({"a": "1", "b": null, "c": null}),
            json!({"a": "1", "b": "2", "c": "3"}),
        ]
    );
}
