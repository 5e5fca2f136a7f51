//! Line codec shared by index and cache files.
//!
//! Every record is a single line of fields joined by [`SEPARATOR`]. Inside a
//! field `\`, `:`, newline and carriage return are backslash-escaped, so the
//! separator and the line terminator never occur in an encoded field.

use crate::error::{CommonError, CommonResult};

pub const SEPARATOR: &str = "::";

const ESCAPE: char = '\\';

pub fn escape(field: &str, out: &mut String) {
    for c in field.chars() {
        match c {
            ESCAPE => out.push_str("\\\\"),
            ':' => out.push_str("\\:"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
}

/// Encodes `fields` into one line without the trailing newline.
pub fn encode_line(fields: &[&str]) -> String {
    let mut line = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            line.push_str(SEPARATOR);
        }
        escape(field, &mut line);
    }
    line
}

/// Splits a line produced by [`encode_line`] back into exactly `expected`
/// unescaped fields.
pub fn decode_line(line: &str, expected: usize) -> CommonResult<Vec<String>> {
    let mut fields = Vec::with_capacity(expected);
    let mut current = String::new();
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            ESCAPE => match chars.next() {
                Some(ESCAPE) => current.push(ESCAPE),
                Some(':') => current.push(':'),
                Some('n') => current.push('\n'),
                Some('r') => current.push('\r'),
                Some(other) => return Err(CommonError::UnknownEscape(other)),
                None => return Err(CommonError::DanglingEscape(current)),
            },
            ':' => {
                if chars.next_if_eq(&':').is_none() {
                    return Err(CommonError::StraySeparator);
                }
                fields.push(std::mem::take(&mut current));
            }
            c => current.push(c),
        }
    }
    fields.push(current);

    if fields.len() != expected {
        return Err(CommonError::FieldCount {
            expected,
            found: fields.len(),
        });
    }
    Ok(fields)
}
