//! Delimited-text record splitting
//!
//! Hand-rolled rather than pulled from a crate because BOQ exports are
//! messy: quoted fields containing the delimiter, embedded newlines
//! inside quotes, doubled quotes as escapes, and mixed CRLF/LF line
//! endings all occur in real files and must not break record boundaries.

/// Split CSV text into records of fields
///
/// Quoting rules: a field starting with `"` runs until the closing quote;
/// `""` inside a quoted field is a literal quote; delimiters and newlines
/// inside quotes belong to the field. A single trailing empty record from
/// a final newline is dropped.
pub fn split_records(input: &str) -> Vec<Vec<String>> {
    let mut records: Vec<Vec<String>> = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;

    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        // Doubled quote is a literal quote
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' => in_quotes = true,
            ',' => {
                record.push(std::mem::take(&mut field));
            }
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }

    // Flush the last record when the file does not end with a newline
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }

    records
}
