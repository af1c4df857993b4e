//! Hierarchical structure detection
//!
//! BOQ files carry their hierarchy in formatting, not in data: a section
//! heading is just a row with nothing but text in the description column,
//! and every line item below it belongs to that section until the next
//! heading. The detector is a single forward pass carrying the current
//! section/sub-section context; a classification, once made, is final.

use super::columns::ExtractedRow;

/// Classification of one data row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowClass {
    SectionHeading,
    SubSectionHeading,
    LineItem,
    /// Standalone "total"/"sum" row; feeds the fallback total, never items
    TotalRow,
    /// No usable description
    Blank,
}

/// Sequential row classifier with section context
///
/// Context is reset only at start of file, never mid-file; a new
/// top-level section always clears the sub-section.
#[derive(Debug, Default)]
pub struct StructureDetector {
    current_section: Option<String>,
    current_sub_section: Option<String>,
}

impl StructureDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify a row and update section context
    ///
    /// Heuristics, in order:
    /// 1. description-only row with short, unpunctuated text is a heading;
    ///    leading whitespace on the raw cell marks it a sub-section
    /// 2. a standalone "total"/"sum" token marks a total row
    /// 3. everything else with a description is a line item
    pub fn classify(&mut self, row: &ExtractedRow) -> RowClass {
        if row.description.is_empty() {
            return RowClass::Blank;
        }

        // Dedicated section/sub-section columns override the positional
        // heuristics for context tracking
        if let Some(section) = &row.section {
            if self.current_section.as_deref() != Some(section.as_str()) {
                self.current_section = Some(section.clone());
                self.current_sub_section = None;
            }
        }
        if let Some(sub) = &row.sub_section {
            self.current_sub_section = Some(sub.clone());
        }

        if self.is_heading(row) {
            if leading_whitespace(&row.description_raw) > 0 {
                self.current_sub_section = Some(row.description.clone());
                return RowClass::SubSectionHeading;
            }
            self.current_section = Some(row.description.clone());
            self.current_sub_section = None;
            return RowClass::SectionHeading;
        }

        if is_total_text(&row.description) {
            return RowClass::TotalRow;
        }

        RowClass::LineItem
    }

    /// Section label for the next line item
    pub fn current_section(&self) -> Option<&str> {
        self.current_section.as_deref()
    }

    /// Sub-section label for the next line item
    pub fn current_sub_section(&self) -> Option<&str> {
        self.current_sub_section.as_deref()
    }

    /// Rule 1: only the description is populated, and the text is short
    /// with no sentence punctuation
    fn is_heading(&self, row: &ExtractedRow) -> bool {
        row.unit.is_empty()
            && row.quantity.unwrap_or(0.0) == 0.0
            && row.rate.unwrap_or(0.0) == 0.0
            && row.amount.unwrap_or(0.0) == 0.0
            && row.description.len() <= 80
            && !row.description.contains(". ")
            && !row.description.ends_with('.')
            && !row.description.contains(';')
    }
}

/// The line-item gate: a BOQ row without a measurable unit and a positive
/// quantity cannot become a billable phase
pub fn passes_item_gate(row: &ExtractedRow) -> bool {
    !row.description.is_empty() && !row.unit.is_empty() && row.quantity.unwrap_or(0.0) > 0.0
}

/// "total"/"sum" as a standalone case-insensitive token
fn is_total_text(text: &str) -> bool {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .any(|token| token == "total" || token == "sum")
}

fn leading_whitespace(text: &str) -> usize {
    text.chars().take_while(|c| c.is_whitespace()).count()
}
