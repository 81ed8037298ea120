//! Format feature sets for reading and writing.
//!
//! Each set is an immutable `Copy` struct of named booleans. Defaults follow
//! the documented default of every option; the `with_*` setters return a
//! modified copy so a configuration can be built up in one expression.

/// Options that change how the read state machine and decoder behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadFeatures {
    /// Trim spaces and tabs around unquoted values and around quoted values
    /// (never inside the quotes). Default: `false`.
    pub trim_spaces: bool,

    /// Expose the whole document as one array of rows instead of a sequence
    /// of root-level rows. Default: `false`.
    pub wrap_as_array: bool,

    /// Silently drop columns past the last declared one. Default: `false`.
    pub ignore_trailing_unmappable: bool,

    /// Skip lines that are empty or contain only whitespace. Default: `false`.
    pub skip_empty_lines: bool,

    /// Accept one trailing empty value past the last declared column
    /// (`a,b,` for a two column schema). Default: `true`.
    pub allow_trailing_comma: bool,

    /// Treat lines whose first non-blank character is `#` as comments.
    /// Also enabled by the schema's own `allow_comments` setting.
    /// Default: `false`.
    pub allow_comments: bool,

    /// Rows with fewer cells than declared columns are an error.
    /// Default: `false`.
    pub fail_on_missing_columns: bool,

    /// A header line that lacks some declared columns is an error.
    /// Default: `true`.
    pub fail_on_missing_header_columns: bool,

    /// Rows with fewer cells than declared columns are padded with nulls.
    /// Ignored when `fail_on_missing_columns` is set. Default: `false`.
    pub insert_nulls_for_missing_columns: bool,

    /// Empty cells are exposed as nulls. Default: `false`.
    pub empty_string_as_null: bool,
}

impl Default for ReadFeatures {
    fn default() -> Self {
        Self {
            trim_spaces: false,
            wrap_as_array: false,
            ignore_trailing_unmappable: false,
            skip_empty_lines: false,
            allow_trailing_comma: true,
            allow_comments: false,
            fail_on_missing_columns: false,
            fail_on_missing_header_columns: true,
            insert_nulls_for_missing_columns: false,
            empty_string_as_null: false,
        }
    }
}

impl ReadFeatures {
    pub fn with_trim_spaces(mut self, on: bool) -> Self {
        self.trim_spaces = on;
        self
    }

    pub fn with_wrap_as_array(mut self, on: bool) -> Self {
        self.wrap_as_array = on;
        self
    }

    pub fn with_ignore_trailing_unmappable(mut self, on: bool) -> Self {
        self.ignore_trailing_unmappable = on;
        self
    }

    pub fn with_skip_empty_lines(mut self, on: bool) -> Self {
        self.skip_empty_lines = on;
        self
    }

    pub fn with_allow_trailing_comma(mut self, on: bool) -> Self {
        self.allow_trailing_comma = on;
        self
    }

    pub fn with_allow_comments(mut self, on: bool) -> Self {
        self.allow_comments = on;
        self
    }

    pub fn with_fail_on_missing_columns(mut self, on: bool) -> Self {
        self.fail_on_missing_columns = on;
        self
    }

    pub fn with_fail_on_missing_header_columns(mut self, on: bool) -> Self {
        self.fail_on_missing_header_columns = on;
        self
    }

    pub fn with_insert_nulls_for_missing_columns(mut self, on: bool) -> Self {
        self.insert_nulls_for_missing_columns = on;
        self
    }

    pub fn with_empty_string_as_null(mut self, on: bool) -> Self {
        self.empty_string_as_null = on;
        self
    }
}

/// Options that change how the encoder quotes and how the generator maps
/// fields onto columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteFeatures {
    /// Scan every value to quote only when strictly required. When off, a
    /// cheaper check is used that may quote more than needed but never less.
    /// Default: `false`.
    pub strict_check_for_quoting: bool,

    /// Do not write separators for trailing columns that got no value.
    /// Default: `false`.
    pub omit_missing_tail_columns: bool,

    /// Quote every String value. Default: `false`.
    pub always_quote_strings: bool,

    /// Quote empty String values. Default: `false`.
    pub always_quote_empty_strings: bool,

    /// Quote numeric values. Default: `false`.
    pub always_quote_numbers: bool,

    /// Write a quote char inside a quoted value as escape char + quote
    /// instead of doubling it. Needs an escape char. Default: `false`.
    pub escape_quote_char_with_escape_char: bool,

    /// Write `\n`, `\r`, `\t` and NUL inside quoted values as escape
    /// sequences. Needs an escape char. Default: `false`.
    pub escape_control_chars_with_escape_char: bool,

    /// Drop values for field names the schema does not know instead of
    /// failing. Default: `false`.
    pub ignore_unknown: bool,
}

impl Default for WriteFeatures {
    fn default() -> Self {
        Self {
            strict_check_for_quoting: false,
            omit_missing_tail_columns: false,
            always_quote_strings: false,
            always_quote_empty_strings: false,
            always_quote_numbers: false,
            escape_quote_char_with_escape_char: false,
            escape_control_chars_with_escape_char: false,
            ignore_unknown: false,
        }
    }
}

impl WriteFeatures {
    pub fn with_strict_check_for_quoting(mut self, on: bool) -> Self {
        self.strict_check_for_quoting = on;
        self
    }

    pub fn with_omit_missing_tail_columns(mut self, on: bool) -> Self {
        self.omit_missing_tail_columns = on;
        self
    }

    pub fn with_always_quote_strings(mut self, on: bool) -> Self {
        self.always_quote_strings = on;
        self
    }

    pub fn with_always_quote_empty_strings(mut self, on: bool) -> Self {
        self.always_quote_empty_strings = on;
        self
    }

    pub fn with_always_quote_numbers(mut self, on: bool) -> Self {
        self.always_quote_numbers = on;
        self
    }

    pub fn with_escape_quote_char_with_escape_char(mut self, on: bool) -> Self {
        self.escape_quote_char_with_escape_char = on;
        self
    }

    pub fn with_escape_control_chars_with_escape_char(mut self, on: bool) -> Self {
        self.escape_control_chars_with_escape_char = on;
        self
    }

    pub fn with_ignore_unknown(mut self, on: bool) -> Self {
        self.ignore_unknown = on;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_defaults() {
        let f = ReadFeatures::default();
        assert!(f.allow_trailing_comma);
        assert!(f.fail_on_missing_header_columns);
        assert!(!f.wrap_as_array);
        assert!(!f.skip_empty_lines);
        assert!(!f.insert_nulls_for_missing_columns);
    }

    #[test]
    fn test_setters_return_copies() {
        let base = WriteFeatures::default();
        let strict = base.with_strict_check_for_quoting(true);
        assert!(!base.strict_check_for_quoting);
        assert!(strict.strict_check_for_quoting);
    }
}
