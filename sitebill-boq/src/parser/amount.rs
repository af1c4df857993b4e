//! Amount and number normalization
//!
//! Converts heterogeneous numeric-looking cell text into a canonical f64.
//! Deliberately crude and locale-agnostic: every character that is not a
//! digit, decimal point, or minus sign is stripped before parsing, so
//! callers must not rely on it to distinguish "1.234" (thousand) from
//! "1.234" (fraction). Invalid input degrades to 0; no error is ever
//! raised.

/// Normalize a cell's text into a decimal value
pub fn parse_amount(value: &str) -> f64 {
    let cleaned: String = value
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();

    if cleaned.is_empty() {
        return 0.0;
    }

    cleaned.parse::<f64>().unwrap_or(0.0)
}

/// Whether a cell looks numeric after normalization
///
/// Used by the column-resolution fallback path: any numeric-looking cell
/// can stand in for a missing amount column.
pub fn looks_numeric(value: &str) -> bool {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return false;
    }
    let cleaned: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    // Reject cells that are mostly text with a stray digit
    let stripped_len = trimmed.chars().filter(|c| !c.is_whitespace()).count();
    cleaned.parse::<f64>().is_ok() && cleaned.len() * 2 >= stripped_len
}
