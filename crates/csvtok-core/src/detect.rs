//! Guess whether a byte prefix looks like CSV for a given schema.

use crate::schema::Schema;

/// Lines inspected at most.
pub const MAX_DETECT_LINES: usize = 4;

/// Confidence that the input is CSV, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchStrength {
    NoMatch,
    Inconclusive,
    WeakMatch,
    SolidMatch,
}

/// Rate `prefix` against the schema's separator and quote settings.
///
/// Consistent non-zero separator counts over several lines are a solid
/// match; separators on a single line, or uneven counts, a weak one.
/// Binary content, invalid UTF-8 and stray characters after a closing
/// quote rule CSV out. A multi-byte character cut off at the end of the
/// prefix is tolerated.
pub fn detect_format(prefix: &[u8], schema: &Schema) -> MatchStrength {
    if prefix.contains(&0) {
        return MatchStrength::NoMatch;
    }
    let bytes = match std::str::from_utf8(prefix) {
        Ok(_) => prefix,
        Err(e) if e.error_len().is_none() => &prefix[..e.valid_up_to()],
        Err(_) => return MatchStrength::NoMatch,
    };
    match scan_lines(bytes, schema) {
        Some(counts) => rate(&counts),
        None => MatchStrength::NoMatch,
    }
}

/// Separator counts of the complete lines in `bytes` (or of the single
/// partial line when no line is complete). `None` when quoting is broken.
fn scan_lines(bytes: &[u8], schema: &Schema) -> Option<Vec<usize>> {
    let separator = schema.column_separator();
    let quote = schema.quote_char();
    let comments = schema.allows_comments();

    let mut counts = Vec::new();
    let mut count = 0;
    let mut line_empty = true;
    let mut comment_line = false;
    let mut at_cell_start = true;
    let mut in_quotes = false;
    let mut i = 0;

    while i < bytes.len() && counts.len() < MAX_DETECT_LINES {
        let b = bytes[i];
        i += 1;
        if in_quotes {
            if Some(b) == quote {
                if bytes.get(i) == Some(&b) {
                    i += 1;
                    continue;
                }
                in_quotes = false;
                match bytes.get(i) {
                    None | Some(b'\r' | b'\n') => {}
                    Some(&next) if next == separator => {}
                    Some(_) => return None,
                }
            }
            continue;
        }
        match b {
            b'\r' | b'\n' => {
                if b == b'\r' && bytes.get(i) == Some(&b'\n') {
                    i += 1;
                }
                if !line_empty && !comment_line {
                    counts.push(count);
                }
                count = 0;
                line_empty = true;
                comment_line = false;
                at_cell_start = true;
            }
            _ if comment_line => {}
            b'#' if comments && line_empty => comment_line = true,
            _ if b == separator => {
                count += 1;
                line_empty = false;
                at_cell_start = true;
            }
            _ if Some(b) == quote && at_cell_start => {
                in_quotes = true;
                line_empty = false;
                at_cell_start = false;
            }
            _ => {
                line_empty = false;
                at_cell_start = false;
            }
        }
    }
    if counts.is_empty() && !line_empty && !comment_line && !in_quotes {
        counts.push(count);
    }
    Some(counts)
}

fn rate(counts: &[usize]) -> MatchStrength {
    let Some(&first) = counts.first() else {
        return MatchStrength::Inconclusive;
    };
    if counts.iter().all(|&c| c == 0) {
        return MatchStrength::Inconclusive;
    }
    if counts.len() > 1 && first > 0 && counts.iter().all(|&c| c == first) {
        return MatchStrength::SolidMatch;
    }
    MatchStrength::WeakMatch
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect(input: &[u8]) -> MatchStrength {
        detect_format(input, &Schema::empty())
    }

    #[test]
    fn test_consistent_lines_are_solid() {
        assert_eq!(detect(b"a,b,c\n1,2,3\n4,5,6\n"), MatchStrength::SolidMatch);
        assert_eq!(
            detect(b"a,\"b,with comma\"\r\n1,\"2\"\r\n"),
            MatchStrength::SolidMatch
        );
    }

    #[test]
    fn test_single_line_or_uneven_is_weak() {
        assert_eq!(detect(b"a,b,c"), MatchStrength::WeakMatch);
        assert_eq!(detect(b"a,b\n1,2,3\n"), MatchStrength::WeakMatch);
    }

    #[test]
    fn test_no_separators_is_inconclusive() {
        assert_eq!(detect(b"hello\nworld\n"), MatchStrength::Inconclusive);
        assert_eq!(detect(b""), MatchStrength::Inconclusive);
    }

    #[test]
    fn test_binary_and_broken_quotes_do_not_match() {
        assert_eq!(detect(b"a,b\0c\n"), MatchStrength::NoMatch);
        assert_eq!(detect(b"a,\xff\xfe\n"), MatchStrength::NoMatch);
        assert_eq!(detect(b"\"abc\"x,1\n2,3\n"), MatchStrength::NoMatch);
    }

    #[test]
    fn test_truncated_utf8_tail_is_tolerated() {
        let mut input = b"a,b\n1,2\nx,".to_vec();
        input.extend_from_slice(&"é".as_bytes()[..1]);
        assert_eq!(detect(&input), MatchStrength::SolidMatch);
    }

    #[test]
    fn test_uses_schema_separator_and_comments() {
        let schema = Schema::empty().with_column_separator(b'\t').with_comments(true);
        assert_eq!(
            detect_format(b"# note\na\tb\n1\t2\n", &schema),
            MatchStrength::SolidMatch
        );
        assert_eq!(
            detect_format(b"a,b\n1,2\n", &schema),
            MatchStrength::Inconclusive
        );
    }
}
