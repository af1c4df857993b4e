//! BOQ tabular ingestion pipeline
//!
//! Turns uploaded file bytes (CSV or XLSX) into a `BoqParseResult`:
//! format detection, one-time column resolution from the header row, a
//! single classified pass over the data rows, and assembly of items,
//! sections and row statistics. Progress is reported through an optional
//! channel sender at a bounded cadence; omitting it changes nothing.

pub mod amount;
pub mod columns;
pub mod csv;
pub mod sheet;
pub mod structure;

use sitebill_common::events::ProgressEvent;
use sitebill_common::Result;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::models::{BoqItem, BoqParseResult, ParseMetadata, SourceFormat};
use columns::{extract_row, ColumnMap};
use structure::{passes_item_gate, RowClass, StructureDetector};

/// Progress is emitted every this many rows (and once at the end)
const PROGRESS_EVERY_ROWS: usize = 25;

/// Parse strictness
///
/// Preview keeps line items that fail the unit/quantity gate so a human
/// can see everything that was read; materialization drops them. Row
/// statistics are identical in both modes. This dual strictness is a
/// contract: previews are informative, materialization is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Preview,
    Materialize,
}

/// BOQ file parser
pub struct BoqParser;

impl BoqParser {
    /// Parse uploaded file bytes into a `BoqParseResult`
    ///
    /// `progress` receives `ProgressEvent::Progress` updates; terminal
    /// events are the caller's responsibility (the caller knows whether a
    /// materialization step follows).
    pub fn parse(
        bytes: &[u8],
        file_name: &str,
        mode: ParseMode,
        progress: Option<&UnboundedSender<ProgressEvent>>,
    ) -> Result<BoqParseResult> {
        let format = detect_format(bytes, file_name);
        let rows = match format {
            SourceFormat::Csv => csv::split_records(&String::from_utf8_lossy(bytes)),
            SourceFormat::Xlsx => sheet::read_rows(bytes)?,
        };

        // Header row: first row with any non-empty cell
        let header_idx = rows
            .iter()
            .position(|r| r.iter().any(|c| !c.trim().is_empty()));

        let Some(header_idx) = header_idx else {
            return Ok(empty_result(format));
        };

        let map = ColumnMap::resolve(&rows[header_idx]);
        // When no description column resolved the file is headerless:
        // the candidate header row is data and every row uses fallback
        let (map, data_start) = if map.is_usable() {
            (map, header_idx + 1)
        } else {
            debug!(file_name, "no usable header row; falling back per row");
            (ColumnMap::default(), header_idx)
        };

        let mut uncertain_headers = map.uncertain.clone();
        let mut detector = StructureDetector::new();
        let mut items: Vec<BoqItem> = Vec::new();
        let mut sections: Vec<String> = Vec::new();
        let mut explicit_total: Option<f64> = None;

        let total_rows = rows.len() - data_start;
        let mut processed_rows = 0usize;
        let mut skipped_rows = 0usize;
        let mut next_id: u32 = 1;

        for (offset, cells) in rows[data_start..].iter().enumerate() {
            // 1-based position in the source file, headers included
            let row_index = data_start + offset + 1;
            let extracted = extract_row(cells, &map, row_index);
            uncertain_headers.extend(extracted.fallback_notes.iter().cloned());

            match detector.classify(&extracted) {
                RowClass::Blank => skipped_rows += 1,
                RowClass::SectionHeading => {
                    if let Some(section) = detector.current_section() {
                        if !sections.iter().any(|s| s == section) {
                            sections.push(section.to_string());
                        }
                    }
                    processed_rows += 1;
                }
                RowClass::SubSectionHeading => processed_rows += 1,
                RowClass::TotalRow => {
                    // The explicit total wins over the item sum; with
                    // several total rows the last one with a value holds
                    if let Some(amount) = extracted.amount {
                        if amount != 0.0 {
                            explicit_total = Some(amount);
                        }
                    }
                    skipped_rows += 1;
                }
                RowClass::LineItem => {
                    let billable = passes_item_gate(&extracted);
                    if billable {
                        processed_rows += 1;
                    } else {
                        skipped_rows += 1;
                    }

                    if billable || mode == ParseMode::Preview {
                        let quantity = extracted.quantity.unwrap_or(0.0);
                        let rate = extracted.rate.unwrap_or(0.0);
                        let amount = extracted
                            .amount
                            .unwrap_or(quantity * rate)
                            .max(0.0);

                        let section = detector.current_section().map(String::from);
                        let sub_section = detector.current_sub_section().map(String::from);
                        if let Some(section) = &section {
                            if !sections.iter().any(|s| s == section) {
                                sections.push(section.clone());
                            }
                        }

                        items.push(BoqItem {
                            id: next_id,
                            description: extracted.description.clone(),
                            quantity,
                            unit: extracted.unit.clone(),
                            rate,
                            amount,
                            section,
                            sub_section,
                            row_index,
                            raw_data: cells.clone(),
                            uncertain_headers: extracted.fallback_notes.clone(),
                            is_billable: billable,
                        });
                        next_id += 1;
                    }
                }
            }

            let current = offset + 1;
            if current % PROGRESS_EVERY_ROWS == 0 || current == total_rows {
                emit_progress(progress, current, total_rows);
            }
        }

        let total_amount = explicit_total.unwrap_or_else(|| {
            items
                .iter()
                .filter(|i| i.is_billable)
                .map(|i| i.amount)
                .sum()
        });

        Ok(BoqParseResult {
            items,
            total_amount,
            sections,
            uncertain_headers,
            metadata: ParseMetadata {
                total_rows,
                processed_rows,
                skipped_rows,
                file_type: format,
            },
        })
    }
}

/// Detect the source encoding from magic bytes, falling back to the file
/// extension; anything that is not a zip container parses as CSV
fn detect_format(bytes: &[u8], file_name: &str) -> SourceFormat {
    if let Some(kind) = infer::get(bytes) {
        let mime = kind.mime_type();
        if mime == "application/zip"
            || mime == "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        {
            return SourceFormat::Xlsx;
        }
    }
    if file_name.to_lowercase().ends_with(".xlsx") {
        return SourceFormat::Xlsx;
    }
    SourceFormat::Csv
}

fn emit_progress(
    progress: Option<&UnboundedSender<ProgressEvent>>,
    current: usize,
    total: usize,
) {
    if let Some(tx) = progress {
        // Best-effort: a dropped receiver never interrupts parsing
        let _ = tx.send(ProgressEvent::Progress {
            current,
            total,
            message: format!("Parsing row {} of {}", current, total),
        });
    }
}

fn empty_result(format: SourceFormat) -> BoqParseResult {
    BoqParseResult {
        items: Vec::new(),
        total_amount: 0.0,
        sections: Vec::new(),
        uncertain_headers: Vec::new(),
        metadata: ParseMetadata {
            total_rows: 0,
            processed_rows: 0,
            skipped_rows: 0,
            file_type: format,
        },
    }
}
