//! Column schema and document-level formatting settings.
//!
//! A [`Schema`] is an ordered list of [`Column`]s plus the settings that say
//! how a document is laid out (separator, quoting, header handling, ...).
//! Schemas are immutable: every `with_*` method returns a new schema and
//! the column list is shared between copies.
//!
//! ## Building
//!
//! ```
//! use csvtok_core::{ColumnType, Schema};
//!
//! let schema = Schema::builder()
//!     .add_column("id")
//!     .add_typed_column("score", ColumnType::Number)
//!     .add_array_column("tags", Some("|"))
//!     .set_use_header(true)
//!     .build();
//!
//! assert_eq!(schema.len(), 3);
//! assert_eq!(schema.column_by_name("score").map(|c| c.index()), Some(1));
//! ```
//!
//! ## YAML
//!
//! Schemas can also be described in YAML and loaded with
//! [`Schema::from_yaml`] / [`Schema::from_file`]:
//!
//! ```yaml
//! use_header: true
//! null_value: "n/a"
//! columns:
//!   - name: id
//!   - name: tags
//!     type: array
//!     array_element_separator: "|"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Default column separator.
pub const DEFAULT_COLUMN_SEPARATOR: u8 = b',';
/// Default quote character.
pub const DEFAULT_QUOTE_CHAR: u8 = b'"';
/// Default line separator used when writing.
pub const DEFAULT_LINE_SEPARATOR: &str = "\n";
/// Default separator between elements of an array cell.
pub const DEFAULT_ARRAY_ELEMENT_SEPARATOR: &str = ";";

// ============================================================================
// Error Types
// ============================================================================

/// Error type for schema loading.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// Error reading schema file
    #[error("Failed to read schema file: {0}")]
    IoError(#[from] std::io::Error),

    /// Error parsing YAML
    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Separator, quote and escape chars must be single ASCII characters
    #[error("Setting '{setting}' must be an ASCII character, got {value:?}")]
    NonAsciiChar { setting: &'static str, value: char },
}

// ============================================================================
// Columns
// ============================================================================

/// How the values of a column are typed.
///
/// All cells are text on the wire. The type tells readers how to coerce the
/// text lazily and writers when quoting can be relaxed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// Plain text
    #[default]
    String,
    /// Text, except for the literals `true`, `false` and `null`
    StringOrLiteral,
    /// Numeric value
    Number,
    /// Numeric value when it parses as one, text otherwise
    NumberOrString,
    /// `true` / `false`
    Boolean,
    /// Several values joined by an array element separator
    Array,
}

/// One column of a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    index: usize,
    name: String,
    column_type: ColumnType,
    array_element_separator: Option<String>,
}

impl Column {
    pub fn new(index: usize, name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            index,
            name: name.into(),
            column_type,
            array_element_separator: None,
        }
    }

    /// Set a column-specific array element separator.
    pub fn with_array_element_separator(mut self, separator: impl Into<String>) -> Self {
        self.array_element_separator = Some(separator.into());
        self
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    pub fn is_array(&self) -> bool {
        self.column_type == ColumnType::Array
    }

    /// Column-specific separator; `None` means "use the schema default".
    pub fn array_element_separator(&self) -> Option<&str> {
        self.array_element_separator
            .as_deref()
            .filter(|sep| !sep.is_empty())
    }
}

// ============================================================================
// Schema
// ============================================================================

/// Ordered columns plus per-document settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    columns: Arc<[Column]>,
    by_name: Arc<HashMap<String, usize>>,
    column_separator: u8,
    quote_char: Option<u8>,
    escape_char: Option<u8>,
    line_separator: String,
    array_element_separator: Option<String>,
    null_value: Option<String>,
    any_property_name: Option<String>,
    use_header: bool,
    skip_first_data_row: bool,
    allow_comments: bool,
    reorder_columns: bool,
    strict_headers: bool,
}

impl Default for Schema {
    fn default() -> Self {
        Self::empty()
    }
}

impl Schema {
    /// Schema without columns and with default settings.
    ///
    /// Reading with it exposes every row as an array of values.
    pub fn empty() -> Self {
        SchemaBuilder::new().build()
    }

    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    /// Builder seeded with this schema's columns and settings.
    pub fn rebuild(&self) -> SchemaBuilder {
        SchemaBuilder {
            columns: self.columns.to_vec(),
            column_separator: self.column_separator,
            quote_char: self.quote_char,
            escape_char: self.escape_char,
            line_separator: self.line_separator.clone(),
            array_element_separator: self.array_element_separator.clone(),
            null_value: self.null_value.clone(),
            any_property_name: self.any_property_name.clone(),
            use_header: self.use_header,
            skip_first_data_row: self.skip_first_data_row,
            allow_comments: self.allow_comments,
            reorder_columns: self.reorder_columns,
            strict_headers: self.strict_headers,
        }
    }

    // ========================================================================
    // Columns
    // ========================================================================

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    pub fn column_name(&self, index: usize) -> Option<&str> {
        self.columns.get(index).map(Column::name)
    }

    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        self.by_name.get(name).and_then(|&idx| self.columns.get(idx))
    }

    /// Look a column up by name, checking `hint` first.
    ///
    /// Writers usually see fields in schema order, so the hint is the index
    /// following the previously resolved column.
    pub fn column_by_name_hint(&self, name: &str, hint: usize) -> Option<&Column> {
        match self.columns.get(hint) {
            Some(col) if col.name == name => Some(col),
            _ => self.column_by_name(name),
        }
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(Column::name).collect()
    }

    /// Column names formatted for error messages: `["a","b"]`.
    pub fn column_desc(&self) -> String {
        let names: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("\"{}\"", c.name))
            .collect();
        format!("[{}]", names.join(","))
    }

    // ========================================================================
    // Settings
    // ========================================================================

    pub fn column_separator(&self) -> u8 {
        self.column_separator
    }

    pub fn quote_char(&self) -> Option<u8> {
        self.quote_char
    }

    pub fn escape_char(&self) -> Option<u8> {
        self.escape_char
    }

    pub fn line_separator(&self) -> &str {
        &self.line_separator
    }

    /// Schema-wide array element separator; `None` when disabled.
    pub fn array_element_separator(&self) -> Option<&str> {
        self.array_element_separator.as_deref()
    }

    pub fn has_array_element_separator(&self) -> bool {
        self.array_element_separator.is_some()
    }

    /// Marker that reads back as null; `None` when only the empty-string
    /// feature produces nulls.
    pub fn null_value(&self) -> Option<&str> {
        self.null_value.as_deref()
    }

    /// Marker written for nulls.
    pub fn null_value_or_empty(&self) -> &str {
        self.null_value.as_deref().unwrap_or("")
    }

    pub fn any_property_name(&self) -> Option<&str> {
        self.any_property_name.as_deref()
    }

    pub fn uses_header(&self) -> bool {
        self.use_header
    }

    pub fn skips_first_data_row(&self) -> bool {
        self.skip_first_data_row
    }

    pub fn allows_comments(&self) -> bool {
        self.allow_comments
    }

    pub fn reorders_columns(&self) -> bool {
        self.reorder_columns
    }

    pub fn strict_headers(&self) -> bool {
        self.strict_headers
    }

    // ========================================================================
    // Copy-on-write mutators
    // ========================================================================

    pub fn with_column_separator(&self, separator: u8) -> Schema {
        self.rebuild().set_column_separator(separator).build()
    }

    pub fn with_quote_char(&self, quote: u8) -> Schema {
        self.rebuild().set_quote_char(quote).build()
    }

    pub fn without_quote_char(&self) -> Schema {
        self.rebuild().disable_quote_char().build()
    }

    pub fn with_escape_char(&self, escape: u8) -> Schema {
        self.rebuild().set_escape_char(escape).build()
    }

    pub fn without_escape_char(&self) -> Schema {
        self.rebuild().disable_escape_char().build()
    }

    pub fn with_line_separator(&self, separator: impl Into<String>) -> Schema {
        self.rebuild().set_line_separator(separator).build()
    }

    pub fn with_array_element_separator(&self, separator: impl Into<String>) -> Schema {
        self.rebuild().set_array_element_separator(separator).build()
    }

    pub fn without_array_element_separator(&self) -> Schema {
        self.rebuild().disable_array_element_separator().build()
    }

    pub fn with_null_value(&self, null_value: impl Into<String>) -> Schema {
        self.rebuild().set_null_value(null_value).build()
    }

    pub fn with_any_property_name(&self, name: impl Into<String>) -> Schema {
        self.rebuild().set_any_property_name(name).build()
    }

    pub fn with_header(&self) -> Schema {
        self.rebuild().set_use_header(true).build()
    }

    pub fn without_header(&self) -> Schema {
        self.rebuild().set_use_header(false).build()
    }

    pub fn with_skip_first_data_row(&self, on: bool) -> Schema {
        self.rebuild().set_skip_first_data_row(on).build()
    }

    pub fn with_comments(&self, on: bool) -> Schema {
        self.rebuild().set_allow_comments(on).build()
    }

    pub fn with_column_reordering(&self, on: bool) -> Schema {
        self.rebuild().set_reorder_columns(on).build()
    }

    pub fn with_strict_headers(&self, on: bool) -> Schema {
        self.rebuild().set_strict_headers(on).build()
    }

    /// Same settings, columns taken from `other`.
    pub fn with_columns_from(&self, other: &Schema) -> Schema {
        let mut builder = self.rebuild().clear_columns();
        builder.columns = other.columns.to_vec();
        builder.build()
    }

    /// Columns named in `names` first, in that order, then the rest in
    /// their current order. Unknown names are ignored.
    pub fn sorted_by(&self, names: &[&str]) -> Schema {
        let mut ordered: Vec<Column> = Vec::with_capacity(self.columns.len());
        for name in names {
            if let Some(col) = self.column_by_name(name) {
                if !ordered.iter().any(|c| c.name == col.name) {
                    ordered.push(col.clone());
                }
            }
        }
        for col in self.columns.iter() {
            if !ordered.iter().any(|c| c.name == col.name) {
                ordered.push(col.clone());
            }
        }
        let mut builder = self.rebuild().clear_columns();
        builder.columns = ordered;
        builder.build()
    }

    // ========================================================================
    // YAML
    // ========================================================================

    /// Load a schema definition from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SchemaError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a schema definition from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, SchemaError> {
        let definition: SchemaDefinition = serde_yaml::from_str(yaml)?;
        definition.into_schema()
    }

    /// Serializable description of this schema.
    pub fn to_definition(&self) -> SchemaDefinition {
        SchemaDefinition {
            columns: self
                .columns
                .iter()
                .map(|c| ColumnDefinition {
                    name: c.name.clone(),
                    column_type: c.column_type,
                    array_element_separator: c.array_element_separator.clone(),
                })
                .collect(),
            column_separator: self.column_separator as char,
            quote_char: self.quote_char.map(char::from),
            escape_char: self.escape_char.map(char::from),
            line_separator: self.line_separator.clone(),
            array_element_separator: self.array_element_separator.clone(),
            null_value: self.null_value.clone(),
            any_property_name: self.any_property_name.clone(),
            use_header: self.use_header,
            skip_first_data_row: self.skip_first_data_row,
            allow_comments: self.allow_comments,
            reorder_columns: self.reorder_columns,
            strict_headers: self.strict_headers,
        }
    }
}

impl<'a> IntoIterator for &'a Schema {
    type Item = &'a Column;
    type IntoIter = std::slice::Iter<'a, Column>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.iter()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Mutable staging area for a [`Schema`].
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    columns: Vec<Column>,
    column_separator: u8,
    quote_char: Option<u8>,
    escape_char: Option<u8>,
    line_separator: String,
    array_element_separator: Option<String>,
    null_value: Option<String>,
    any_property_name: Option<String>,
    use_header: bool,
    skip_first_data_row: bool,
    allow_comments: bool,
    reorder_columns: bool,
    strict_headers: bool,
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
            column_separator: DEFAULT_COLUMN_SEPARATOR,
            quote_char: Some(DEFAULT_QUOTE_CHAR),
            escape_char: None,
            line_separator: DEFAULT_LINE_SEPARATOR.to_string(),
            array_element_separator: Some(DEFAULT_ARRAY_ELEMENT_SEPARATOR.to_string()),
            null_value: None,
            any_property_name: None,
            use_header: false,
            skip_first_data_row: false,
            allow_comments: false,
            reorder_columns: false,
            strict_headers: false,
        }
    }

    /// Add a `String` column.
    pub fn add_column(self, name: impl Into<String>) -> Self {
        self.add_typed_column(name, ColumnType::String)
    }

    pub fn add_typed_column(mut self, name: impl Into<String>, column_type: ColumnType) -> Self {
        let index = self.columns.len();
        self.columns.push(Column::new(index, name, column_type));
        self
    }

    /// Add an `Array` column, optionally with its own element separator.
    pub fn add_array_column(mut self, name: impl Into<String>, separator: Option<&str>) -> Self {
        let index = self.columns.len();
        let mut column = Column::new(index, name, ColumnType::Array);
        if let Some(sep) = separator {
            column = column.with_array_element_separator(sep);
        }
        self.columns.push(column);
        self
    }

    pub fn add_number_column(self, name: impl Into<String>) -> Self {
        self.add_typed_column(name, ColumnType::Number)
    }

    pub fn add_boolean_column(self, name: impl Into<String>) -> Self {
        self.add_typed_column(name, ColumnType::Boolean)
    }

    /// Append a fully described column; its index is reassigned.
    pub fn push_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn clear_columns(mut self) -> Self {
        self.columns.clear();
        self
    }

    /// Remove the last column when its name is empty (trailing separator
    /// in a header line).
    pub fn drop_last_column_if_empty(mut self) -> Self {
        if self.columns.last().is_some_and(|c| c.name.is_empty()) {
            self.columns.pop();
        }
        self
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn set_use_header(mut self, on: bool) -> Self {
        self.use_header = on;
        self
    }

    pub fn set_column_separator(mut self, separator: u8) -> Self {
        self.column_separator = separator;
        self
    }

    pub fn set_quote_char(mut self, quote: u8) -> Self {
        self.quote_char = Some(quote);
        self
    }

    pub fn disable_quote_char(mut self) -> Self {
        self.quote_char = None;
        self
    }

    pub fn set_escape_char(mut self, escape: u8) -> Self {
        self.escape_char = Some(escape);
        self
    }

    pub fn disable_escape_char(mut self) -> Self {
        self.escape_char = None;
        self
    }

    pub fn set_line_separator(mut self, separator: impl Into<String>) -> Self {
        self.line_separator = separator.into();
        self
    }

    /// An empty separator disables array splitting.
    pub fn set_array_element_separator(mut self, separator: impl Into<String>) -> Self {
        let separator = separator.into();
        self.array_element_separator = if separator.is_empty() {
            None
        } else {
            Some(separator)
        };
        self
    }

    pub fn disable_array_element_separator(mut self) -> Self {
        self.array_element_separator = None;
        self
    }

    pub fn set_null_value(mut self, null_value: impl Into<String>) -> Self {
        self.null_value = Some(null_value.into());
        self
    }

    pub fn clear_null_value(mut self) -> Self {
        self.null_value = None;
        self
    }

    pub fn set_any_property_name(mut self, name: impl Into<String>) -> Self {
        self.any_property_name = Some(name.into());
        self
    }

    pub fn set_allow_comments(mut self, on: bool) -> Self {
        self.allow_comments = on;
        self
    }

    pub fn set_skip_first_data_row(mut self, on: bool) -> Self {
        self.skip_first_data_row = on;
        self
    }

    pub fn set_reorder_columns(mut self, on: bool) -> Self {
        self.reorder_columns = on;
        self
    }

    pub fn set_strict_headers(mut self, on: bool) -> Self {
        self.strict_headers = on;
        self
    }

    /// Freeze into a [`Schema`]. Column indices are reassigned to match
    /// list order; for duplicate names the first column wins lookups.
    pub fn build(self) -> Schema {
        let columns: Vec<Column> = self
            .columns
            .into_iter()
            .enumerate()
            .map(|(index, mut col)| {
                col.index = index;
                col
            })
            .collect();
        let mut by_name = HashMap::with_capacity(columns.len());
        for col in &columns {
            by_name.entry(col.name.clone()).or_insert(col.index);
        }
        Schema {
            columns: columns.into(),
            by_name: Arc::new(by_name),
            column_separator: self.column_separator,
            quote_char: self.quote_char,
            escape_char: self.escape_char,
            line_separator: self.line_separator,
            array_element_separator: self.array_element_separator,
            null_value: self.null_value,
            any_property_name: self.any_property_name,
            use_header: self.use_header,
            skip_first_data_row: self.skip_first_data_row,
            allow_comments: self.allow_comments,
            reorder_columns: self.reorder_columns,
            strict_headers: self.strict_headers,
        }
    }
}

// ============================================================================
// Serializable definition
// ============================================================================

fn default_column_separator() -> char {
    DEFAULT_COLUMN_SEPARATOR as char
}

fn default_quote_char() -> Option<char> {
    Some(DEFAULT_QUOTE_CHAR as char)
}

fn default_line_separator() -> String {
    DEFAULT_LINE_SEPARATOR.to_string()
}

fn default_array_element_separator() -> Option<String> {
    Some(DEFAULT_ARRAY_ELEMENT_SEPARATOR.to_string())
}

/// Column entry of a [`SchemaDefinition`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnDefinition {
    pub name: String,

    #[serde(rename = "type", default)]
    pub column_type: ColumnType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array_element_separator: Option<String>,
}

/// Serde view of a [`Schema`], used for YAML schema files.
///
/// Absent settings take their defaults; `quote_char: null` and
/// `array_element_separator: null` disable quoting and array splitting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchemaDefinition {
    #[serde(default)]
    pub columns: Vec<ColumnDefinition>,

    #[serde(default = "default_column_separator")]
    pub column_separator: char,

    #[serde(default = "default_quote_char")]
    pub quote_char: Option<char>,

    #[serde(default)]
    pub escape_char: Option<char>,

    #[serde(default = "default_line_separator")]
    pub line_separator: String,

    #[serde(default = "default_array_element_separator")]
    pub array_element_separator: Option<String>,

    #[serde(default)]
    pub null_value: Option<String>,

    #[serde(default)]
    pub any_property_name: Option<String>,

    #[serde(default)]
    pub use_header: bool,

    #[serde(default)]
    pub skip_first_data_row: bool,

    #[serde(default)]
    pub allow_comments: bool,

    #[serde(default)]
    pub reorder_columns: bool,

    #[serde(default)]
    pub strict_headers: bool,
}

fn ascii_byte(setting: &'static str, value: char) -> Result<u8, SchemaError> {
    if value.is_ascii() {
        Ok(value as u8)
    } else {
        Err(SchemaError::NonAsciiChar { setting, value })
    }
}

impl SchemaDefinition {
    /// Validate and convert into a [`Schema`].
    pub fn into_schema(self) -> Result<Schema, SchemaError> {
        let mut builder = SchemaBuilder::new()
            .set_column_separator(ascii_byte("column_separator", self.column_separator)?)
            .set_line_separator(self.line_separator)
            .set_use_header(self.use_header)
            .set_skip_first_data_row(self.skip_first_data_row)
            .set_allow_comments(self.allow_comments)
            .set_reorder_columns(self.reorder_columns)
            .set_strict_headers(self.strict_headers);

        builder = match self.quote_char {
            Some(q) => builder.set_quote_char(ascii_byte("quote_char", q)?),
            None => builder.disable_quote_char(),
        };
        if let Some(e) = self.escape_char {
            builder = builder.set_escape_char(ascii_byte("escape_char", e)?);
        }
        builder = match self.array_element_separator {
            Some(sep) => builder.set_array_element_separator(sep),
            None => builder.disable_array_element_separator(),
        };
        if let Some(null_value) = self.null_value {
            builder = builder.set_null_value(null_value);
        }
        if let Some(any) = self.any_property_name {
            builder = builder.set_any_property_name(any);
        }
        for (index, col) in self.columns.into_iter().enumerate() {
            let mut column = Column::new(index, col.name, col.column_type);
            if let Some(sep) = col.array_element_separator {
                column = column.with_array_element_separator(sep);
            }
            builder = builder.push_column(column);
        }
        Ok(builder.build())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn abc() -> Schema {
        Schema::builder()
            .add_column("a")
            .add_number_column("b")
            .add_array_column("c", Some("|"))
            .build()
    }

    #[test]
    fn test_indices_follow_list_order() {
        let schema = abc();
        for (i, col) in schema.columns().iter().enumerate() {
            assert_eq!(col.index(), i);
        }
        assert_eq!(schema.column_by_name("c").unwrap().index(), 2);
        assert_eq!(schema.column_name(1), Some("b"));
        assert!(schema.column_by_name("missing").is_none());
    }

    #[test]
    fn test_defaults() {
        let schema = Schema::empty();
        assert_eq!(schema.column_separator(), b',');
        assert_eq!(schema.quote_char(), Some(b'"'));
        assert_eq!(schema.escape_char(), None);
        assert_eq!(schema.line_separator(), "\n");
        assert_eq!(schema.array_element_separator(), Some(";"));
        assert_eq!(schema.null_value(), None);
        assert_eq!(schema.null_value_or_empty(), "");
        assert!(!schema.uses_header());
    }

    #[test]
    fn test_with_mutators_copy_on_write() {
        let schema = abc();
        let semi = schema.with_column_separator(b';').with_header();
        assert_eq!(schema.column_separator(), b',');
        assert!(!schema.uses_header());
        assert_eq!(semi.column_separator(), b';');
        assert!(semi.uses_header());
        assert_eq!(semi.column_names(), schema.column_names());
    }

    #[test]
    fn test_rebuild_keeps_settings_when_columns_replaced() {
        let schema = abc().with_null_value("NULL").with_strict_headers(true);
        let replaced = schema
            .rebuild()
            .clear_columns()
            .add_column("x")
            .add_column("y")
            .build();
        assert_eq!(replaced.column_names(), vec!["x", "y"]);
        assert_eq!(replaced.null_value(), Some("NULL"));
        assert!(replaced.strict_headers());
    }

    #[test]
    fn test_hint_lookup() {
        let schema = abc();
        assert_eq!(schema.column_by_name_hint("b", 1).unwrap().index(), 1);
        assert_eq!(schema.column_by_name_hint("a", 1).unwrap().index(), 0);
        assert_eq!(schema.column_by_name_hint("a", 99).unwrap().index(), 0);
    }

    #[test]
    fn test_sorted_by() {
        let sorted = abc().sorted_by(&["c", "nope", "a"]);
        assert_eq!(sorted.column_names(), vec!["c", "a", "b"]);
        assert_eq!(sorted.column_by_name("b").unwrap().index(), 2);
        assert_eq!(
            sorted.column(0).unwrap().array_element_separator(),
            Some("|")
        );
    }

    #[test]
    fn test_drop_last_column_if_empty() {
        let schema = Schema::builder()
            .add_column("a")
            .add_column("")
            .drop_last_column_if_empty()
            .build();
        assert_eq!(schema.column_names(), vec!["a"]);
    }

    #[test]
    fn test_column_desc() {
        assert_eq!(abc().column_desc(), "[\"a\",\"b\",\"c\"]");
    }

    #[test]
    fn test_empty_array_separator_disables() {
        let schema = Schema::builder().set_array_element_separator("").build();
        assert!(!schema.has_array_element_separator());
    }

    const SAMPLE_SCHEMA: &str = r#"
use_header: true
column_separator: ";"
null_value: "n/a"
columns:
  - name: id
    type: number
  - name: name
  - name: tags
    type: array
    array_element_separator: "|"
"#;

    #[test]
    fn test_from_yaml() {
        let schema = Schema::from_yaml(SAMPLE_SCHEMA).unwrap();
        assert!(schema.uses_header());
        assert_eq!(schema.column_separator(), b';');
        assert_eq!(schema.quote_char(), Some(b'"'));
        assert_eq!(schema.null_value(), Some("n/a"));
        assert_eq!(schema.column(0).unwrap().column_type(), ColumnType::Number);
        assert_eq!(schema.column(1).unwrap().column_type(), ColumnType::String);
        assert!(schema.column(2).unwrap().is_array());
        assert_eq!(
            schema.column(2).unwrap().array_element_separator(),
            Some("|")
        );
    }

    #[test]
    fn test_from_yaml_disable_quoting() {
        let schema = Schema::from_yaml("quote_char: null\ncolumns: []\n").unwrap();
        assert_eq!(schema.quote_char(), None);
    }

    #[test]
    fn test_from_yaml_rejects_non_ascii_separator() {
        let result = Schema::from_yaml("column_separator: \"§\"\n");
        assert!(matches!(result, Err(SchemaError::NonAsciiChar { .. })));
    }

    #[test]
    fn test_definition_round_trip() {
        let schema = Schema::from_yaml(SAMPLE_SCHEMA).unwrap();
        let yaml = serde_yaml::to_string(&schema.to_definition()).unwrap();
        let parsed = Schema::from_yaml(&yaml).unwrap();
        assert_eq!(schema, parsed);
    }

    #[test]
    fn test_from_file() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{SAMPLE_SCHEMA}").unwrap();
        file.flush().unwrap();
        let schema = Schema::from_file(file.path()).unwrap();
        assert_eq!(schema.len(), 3);
    }
}
