//! Tolerant scanning of JSON-like objects out of free-form model output.
//!
//! Model responses wrap objects in prose, markdown fences, or truncated
//! arrays, so nothing here requires well-formed JSON. The scanner rule:
//!
//! - The candidate object starts at the first `{` at or after the scan
//!   position. If that candidate never balances, there is no object — later
//!   braces are not retried.
//! - From the opening brace onward, a `"` toggles string state; inside a
//!   string a `\` escapes exactly the next character; `{` and `}` inside
//!   strings are never counted.
//! - Outside strings, `{` and `}` adjust depth; the object ends at the `}`
//!   that returns depth to zero.

use std::ops::Range;

// ─── Balanced-object scanning ───────────────────────────────────────────────

/// Locate the first balanced object at or after byte offset `from`.
///
/// Returns the byte range including both braces, or `None` when no `{`
/// exists or the candidate never balances.
pub fn find_object(text: &str, from: usize) -> Option<Range<usize>> {
    let bytes = text.as_bytes();
    if from >= bytes.len() {
        return None;
    }

    let start = from + text[from..].find('{')?;

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if escape_next {
            escape_next = false;
            continue;
        }
        if in_string {
            match b {
                b'\\' => escape_next = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start..i + 1);
                }
            }
            _ => {}
        }
    }

    None
}

/// Iterator over successive balanced objects in a string.
///
/// Used on extraction responses, where the model returns something shaped
/// like a JSON array but frequently decorated or cut short; each yielded
/// slice is one object, braces included.
pub struct ObjectScanner<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> ObjectScanner<'a> {
    pub fn new(text: &'a str) -> Self {
        ObjectScanner { text, pos: 0 }
    }
}

impl<'a> Iterator for ObjectScanner<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let range = find_object(self.text, self.pos)?;
        self.pos = range.end;
        Some(&self.text[range])
    }
}

// ─── Quoted-string reading ──────────────────────────────────────────────────

/// Read a double-quoted string starting at `quote_idx` (which must point at
/// the opening `"`). Decodes the common JSON escapes (`\"`, `\\`, `\/`,
/// `\n`, `\t`, `\r`); any other escaped character is kept verbatim with its
/// backslash. Returns the decoded content and the byte offset just past the
/// closing quote, or `None` when the string never terminates.
pub(crate) fn read_quoted(text: &str, quote_idx: usize) -> Option<(String, usize)> {
    if text.as_bytes().get(quote_idx) != Some(&b'"') {
        return None;
    }

    let mut out = String::new();
    let mut chars = text[quote_idx + 1..].char_indices();

    while let Some((i, ch)) = chars.next() {
        match ch {
            '"' => return Some((out, quote_idx + 1 + i + 1)),
            '\\' => match chars.next() {
                Some((_, '"')) => out.push('"'),
                Some((_, '\\')) => out.push('\\'),
                Some((_, '/')) => out.push('/'),
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, 'r')) => out.push('\r'),
                Some((_, other)) => {
                    out.push('\\');
                    out.push(other);
                }
                None => return None,
            },
            _ => out.push(ch),
        }
    }

    None
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_object_simple() {
        let text = r#"{"a": 1}"#;
        assert_eq!(find_object(text, 0), Some(0..text.len()));
    }

    #[test]
    fn test_find_object_nested() {
        let text = r#"call with {"outer": {"inner": 2}} trailing"#;
        let range = find_object(text, 0).unwrap();
        assert_eq!(&text[range], r#"{"outer": {"inner": 2}}"#);
    }

    #[test]
    fn test_find_object_brace_inside_string() {
        let text = r#"{"pattern": "a{b}c", "n": 1}"#;
        assert_eq!(find_object(text, 0), Some(0..text.len()));
    }

    #[test]
    fn test_find_object_escaped_quote_inside_string() {
        let text = r#"{"q": "she said \"hi {\" ", "n": 1}"#;
        assert_eq!(find_object(text, 0), Some(0..text.len()));
    }

    #[test]
    fn test_find_object_backslash_pairs() {
        // "\\" closes the string; the brace after it is structural
        let text = r#"{"path": "C:\\"}"#;
        assert_eq!(find_object(text, 0), Some(0..text.len()));
    }

    #[test]
    fn test_find_object_unbalanced_is_none() {
        assert_eq!(find_object(r#"{"a": 1"#, 0), None);
        assert_eq!(find_object("no braces here", 0), None);
    }

    #[test]
    fn test_find_object_first_candidate_only() {
        // The first `{` never balances; the later well-formed object is not
        // retried
        let text = r#"{"broken": 1 and then {"ok": 2}"#;
        // the nested "{" keeps depth at 1 after the inner object closes
        assert_eq!(find_object(text, 0), None);
    }

    #[test]
    fn test_find_object_from_offset() {
        let text = r#"{"a": 1} {"b": 2}"#;
        let first = find_object(text, 0).unwrap();
        let second = find_object(text, first.end).unwrap();
        assert_eq!(&text[second], r#"{"b": 2}"#);
    }

    #[test]
    fn test_object_scanner_array_with_prose() {
        let text = r#"Here are the rows:
[{"id": 101, "title": "First"}, {"id": 205, "title": "Second"}]
Done."#;
        let objects: Vec<&str> = ObjectScanner::new(text).collect();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0], r#"{"id": 101, "title": "First"}"#);
        assert_eq!(objects[1], r#"{"id": 205, "title": "Second"}"#);
    }

    #[test]
    fn test_object_scanner_stops_on_truncated_tail() {
        let text = r#"[{"id": 1}, {"id": 2, "title": "cut of"#;
        let objects: Vec<&str> = ObjectScanner::new(text).collect();
        assert_eq!(objects, vec![r#"{"id": 1}"#]);
    }

    #[test]
    fn test_object_scanner_empty_input() {
        assert_eq!(ObjectScanner::new("").count(), 0);
        assert_eq!(ObjectScanner::new("[]").count(), 0);
    }

    #[test]
    fn test_read_quoted_plain() {
        let text = r#""hello" rest"#;
        let (content, after) = read_quoted(text, 0).unwrap();
        assert_eq!(content, "hello");
        assert_eq!(&text[after..], " rest");
    }

    #[test]
    fn test_read_quoted_escapes() {
        let text = r#""a \"b\" \\ \n\t""#;
        let (content, _) = read_quoted(text, 0).unwrap();
        assert_eq!(content, "a \"b\" \\ \n\t");
    }

    #[test]
    fn test_read_quoted_unknown_escape_kept() {
        let text = r#""\u0041""#;
        let (content, _) = read_quoted(text, 0).unwrap();
        assert_eq!(content, "\\u0041");
    }

    #[test]
    fn test_read_quoted_unterminated() {
        assert_eq!(read_quoted(r#""never ends"#, 0), None);
    }

    #[test]
    fn test_read_quoted_not_a_quote() {
        assert_eq!(read_quoted("plain", 0), None);
    }
}
