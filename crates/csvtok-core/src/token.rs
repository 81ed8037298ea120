//! Tokens produced by [`crate::CsvParser`].
//!
//! Every scalar in CSV is text. [`Scalar`] keeps that text and offers
//! numeric and boolean readings computed on demand, so a consumer can
//! always fall back to [`Scalar::as_str`].

use std::fmt;

/// Discriminant of a [`Token`], without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    StartObject,
    EndObject,
    StartArray,
    EndArray,
    FieldName,
    Value,
    Null,
}

impl TokenKind {
    pub fn is_structural_start(self) -> bool {
        matches!(self, TokenKind::StartObject | TokenKind::StartArray)
    }

    pub fn is_structural_end(self) -> bool {
        matches!(self, TokenKind::EndObject | TokenKind::EndArray)
    }

    pub fn is_scalar(self) -> bool {
        matches!(self, TokenKind::Value | TokenKind::Null)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::StartObject => "START_OBJECT",
            TokenKind::EndObject => "END_OBJECT",
            TokenKind::StartArray => "START_ARRAY",
            TokenKind::EndArray => "END_ARRAY",
            TokenKind::FieldName => "FIELD_NAME",
            TokenKind::Value => "VALUE_STRING",
            TokenKind::Null => "VALUE_NULL",
        };
        f.write_str(name)
    }
}

/// A structural or scalar event, borrowing its text from the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    StartObject,
    EndObject,
    StartArray,
    EndArray,
    FieldName(&'a str),
    Value(Scalar<'a>),
    Null,
}

impl<'a> Token<'a> {
    pub fn kind(&self) -> TokenKind {
        match self {
            Token::StartObject => TokenKind::StartObject,
            Token::EndObject => TokenKind::EndObject,
            Token::StartArray => TokenKind::StartArray,
            Token::EndArray => TokenKind::EndArray,
            Token::FieldName(_) => TokenKind::FieldName,
            Token::Value(_) => TokenKind::Value,
            Token::Null => TokenKind::Null,
        }
    }

    /// Text of a field name or value.
    pub fn text(&self) -> Option<&'a str> {
        match self {
            Token::FieldName(name) => Some(name),
            Token::Value(scalar) => Some(scalar.as_str()),
            _ => None,
        }
    }
}

/// Which numeric reading a scalar admits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberKind {
    Integer,
    Float,
}

/// Untyped scalar text with lazy coercions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scalar<'a>(&'a str);

impl<'a> Scalar<'a> {
    pub fn new(text: &'a str) -> Self {
        Self(text)
    }

    pub fn as_str(&self) -> &'a str {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn parse_i64(&self) -> Option<i64> {
        self.0.trim().parse().ok()
    }

    /// Decimal reading; `NaN` and infinities are not numbers here.
    pub fn parse_f64(&self) -> Option<f64> {
        let text = self.0.trim();
        if !looks_numeric(text) {
            return None;
        }
        text.parse().ok()
    }

    /// `true` / `false`, ignoring ASCII case and surrounding whitespace.
    pub fn parse_bool(&self) -> Option<bool> {
        let text = self.0.trim();
        if text.eq_ignore_ascii_case("true") {
            Some(true)
        } else if text.eq_ignore_ascii_case("false") {
            Some(false)
        } else {
            None
        }
    }

    pub fn number_kind(&self) -> Option<NumberKind> {
        if self.parse_i64().is_some() {
            Some(NumberKind::Integer)
        } else if self.parse_f64().is_some() {
            Some(NumberKind::Float)
        } else {
            None
        }
    }
}

impl fmt::Display for Scalar<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Digits with optional sign, fraction and exponent.
pub(crate) fn looks_numeric(text: &str) -> bool {
    let bytes = text.as_bytes();
    let mut i = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        i += 1;
    }
    let int_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let mut digits = i - int_start;
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        let frac_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        digits += i - frac_start;
    }
    if digits == 0 {
        return false;
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        i += 1;
        if matches!(bytes.get(i), Some(b'+' | b'-')) {
            i += 1;
        }
        let exp_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == exp_start {
            return false;
        }
    }
    i == bytes.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_and_float_readings() {
        let int = Scalar::new("42");
        assert_eq!(int.parse_i64(), Some(42));
        assert_eq!(int.number_kind(), Some(NumberKind::Integer));

        let float = Scalar::new(" -1.5e3 ");
        assert_eq!(float.parse_i64(), None);
        assert_eq!(float.parse_f64(), Some(-1500.0));
        assert_eq!(float.number_kind(), Some(NumberKind::Float));
    }

    #[test]
    fn test_non_numbers() {
        for text in ["", "abc", "NaN", "inf", "1e", ".", "-", "1.2.3"] {
            assert_eq!(Scalar::new(text).number_kind(), None, "{text:?}");
        }
        assert!(looks_numeric(".5"));
        assert!(looks_numeric("5."));
    }

    #[test]
    fn test_bool_reading() {
        assert_eq!(Scalar::new("TRUE").parse_bool(), Some(true));
        assert_eq!(Scalar::new("false").parse_bool(), Some(false));
        assert_eq!(Scalar::new("yes").parse_bool(), None);
    }

    #[test]
    fn test_token_text_and_kind() {
        let token = Token::Value(Scalar::new("x"));
        assert_eq!(token.kind(), TokenKind::Value);
        assert_eq!(token.text(), Some("x"));
        assert_eq!(Token::FieldName("id").text(), Some("id"));
        assert_eq!(Token::StartObject.text(), None);
        assert!(TokenKind::EndArray.is_structural_end());
        assert_eq!(TokenKind::Null.to_string(), "VALUE_NULL");
    }
}
