//! Parse output types for BOQ ingestion
//!
//! These are transient: they live for one parse and are either shown to
//! the caller (preview) or handed to the phase materializer. Nothing here
//! is persisted directly.

use serde::{Deserialize, Serialize};

/// Source encoding of an uploaded BOQ file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Csv,
    Xlsx,
}

impl SourceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::Csv => "csv",
            SourceFormat::Xlsx => "xlsx",
        }
    }
}

/// One parsed BOQ line item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoqItem {
    /// Synthetic id, stable within one parse
    pub id: u32,
    pub description: String,
    pub quantity: f64,
    /// Unit of measure, free text ("m3", "nr", ...)
    pub unit: String,
    pub rate: f64,
    /// Always present and non-negative; derived as quantity * rate when
    /// the source supplies no amount column
    pub amount: f64,
    pub section: Option<String>,
    pub sub_section: Option<String>,
    /// Position in the source file, for traceability
    pub row_index: usize,
    /// Original row payload verbatim, for audit/debugging
    pub raw_data: Vec<String>,
    /// Set when column resolution fell back to per-row heuristics
    pub uncertain_headers: Vec<String>,
    /// Passes the unit + quantity gate required for materialization.
    /// Preview mode keeps failing items so a human can see everything;
    /// the materializer re-applies this gate itself.
    pub is_billable: bool,
}

/// Row-level statistics for one parse
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseMetadata {
    pub total_rows: usize,
    pub processed_rows: usize,
    pub skipped_rows: usize,
    pub file_type: SourceFormat,
}

/// Complete output of one BOQ parse
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoqParseResult {
    pub items: Vec<BoqItem>,
    /// Explicit total row's amount when one was detected, else the sum of
    /// all accepted items' amounts
    pub total_amount: f64,
    /// Distinct section labels, order of first appearance
    pub sections: Vec<String>,
    /// Columns/rows the resolver was not confident about
    pub uncertain_headers: Vec<String>,
    pub metadata: ParseMetadata,
}
