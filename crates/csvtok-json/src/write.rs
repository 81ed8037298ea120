//! `serde_json::Value`s written through a [`CsvGenerator`].

use std::io::Write;

use csvtok_core::{CsvGenerator, Schema, SchemaBuilder};
use serde_json::Value;
use tracing::debug;

use crate::error::{BindError, Result};

/// Write one value: an object or array becomes a row, nested arrays become
/// array cells. Shapes the generator can not express are rejected by it.
pub fn write_value<W: Write>(generator: &mut CsvGenerator<W>, value: &Value) -> Result<()> {
    match value {
        Value::Null => generator.write_null()?,
        Value::Bool(b) => generator.write_bool(*b)?,
        Value::Number(n) => generator.write_number(&n.to_string())?,
        Value::String(s) => generator.write_string(s)?,
        Value::Array(elements) => {
            generator.write_start_array()?;
            for element in elements {
                write_value(generator, element)?;
            }
            generator.write_end_array()?;
        }
        Value::Object(fields) => {
            generator.write_start_object()?;
            for (name, field) in fields {
                generator.write_field_name(name)?;
                write_value(generator, field)?;
            }
            generator.write_end_object()?;
        }
    }
    Ok(())
}

/// Write `rows` as a document. A wrapping array is opened around them so a
/// header, when configured, is written once.
pub fn write_rows<'a, W, I>(generator: &mut CsvGenerator<W>, rows: I) -> Result<u64>
where
    W: Write,
    I: IntoIterator<Item = &'a Value>,
{
    generator.write_start_array()?;
    let mut count = 0u64;
    for row in rows {
        write_value(generator, row)?;
        count += 1;
    }
    generator.write_end_array()?;
    debug!(rows = count, "Wrote JSON rows as CSV");
    Ok(count)
}

/// Columns taken from the keys of `sample`, typed after its values.
///
/// Settings other than the columns come from `base`.
pub fn schema_from_sample(sample: &Value, base: &Schema) -> Result<Schema> {
    let Value::Object(fields) = sample else {
        return Err(BindError::Unsupported {
            found: json_type_name(sample),
            context: "a schema sample (expected an object)",
        });
    };
    let mut builder: SchemaBuilder = base.rebuild().clear_columns();
    for (name, value) in fields {
        builder = match value {
            Value::Number(_) => builder.add_number_column(name.as_str()),
            Value::Bool(_) => builder.add_boolean_column(name.as_str()),
            Value::Array(_) => builder.add_array_column(name.as_str(), None),
            Value::Null | Value::String(_) | Value::Object(_) => builder.add_column(name.as_str()),
        };
    }
    Ok(builder.build())
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use csvtok_core::{ColumnType, CsvError, GeneratorConfig, WriteError};
    use serde_json::json;

    fn to_csv(schema: Schema, rows: &[Value]) -> Result<String> {
        let mut out = Vec::new();
        {
            let mut generator = CsvGenerator::with_schema(&mut out, schema, GeneratorConfig::default());
            write_rows(&mut generator, rows)?;
            generator.close()?;
        }
        Ok(String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_write_rows_with_header() {
        let schema = Schema::builder()
            .add_column("id")
            .add_column("name")
            .add_array_column("tags", None)
            .set_use_header(true)
            .build();
        let rows = [
            json!({"id": 1, "name": "Ann", "tags": ["a", "b"]}),
            json!({"name": "Bob, Jr.", "id": 2, "tags": []}),
        ];
        assert_eq!(
            to_csv(schema, &rows).unwrap(),
            "id,name,tags\n1,Ann,a;b\n2,\"Bob, Jr.\",\n"
        );
    }

    #[test]
    fn test_nested_object_is_rejected() {
        let schema = Schema::builder().add_column("a").build();
        let err = to_csv(schema, &[json!({"a": {"b": 1}})]).unwrap_err();
        assert!(matches!(
            err,
            BindError::Csv(CsvError::Write(WriteError::NestedObject))
        ));
    }

    #[test]
    fn test_schema_from_sample() {
        let sample = json!({"id": 1, "name": "x", "ok": true, "tags": []});
        let base = Schema::empty().with_header();
        let schema = schema_from_sample(&sample, &base).unwrap();
        assert!(schema.uses_header());
        assert_eq!(schema.column_names(), ["id", "name", "ok", "tags"]);
        assert_eq!(schema.column(0).unwrap().column_type(), ColumnType::Number);
        assert_eq!(schema.column(2).unwrap().column_type(), ColumnType::Boolean);
        assert!(schema.column(3).unwrap().is_array());
    }

    #[test]
    fn test_schema_from_non_object_sample() {
        let err = schema_from_sample(&json!([1, 2]), &Schema::empty()).unwrap_err();
        assert!(matches!(err, BindError::Unsupported { found: "an array", .. }));
    }
}
