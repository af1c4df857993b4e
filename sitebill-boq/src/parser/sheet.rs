//! XLSX first-sheet extraction
//!
//! An XLSX workbook is a zip container of XML parts. Only the first
//! worksheet is read: BOQ exports put the bill on sheet one and anything
//! after it is summary/scratch material. Shared strings are resolved so
//! text cells come back as their display text.

use sitebill_common::{Error, Result};
use std::io::{Cursor, Read};

use quick_xml::events::Event;
use quick_xml::Reader;

/// Extract the first worksheet as rows of cell text
///
/// Numeric cells are returned as their stored text ("10", "500.5");
/// downstream normalization handles them the same way as CSV cells.
pub fn read_rows(bytes: &[u8]) -> Result<Vec<Vec<String>>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| Error::InvalidInput(format!("Failed to open workbook: {}", e)))?;

    let shared = read_shared_strings(&mut archive)?;

    let sheet_name = first_sheet_name(&archive).ok_or_else(|| {
        Error::InvalidInput("Workbook contains no worksheets".to_string())
    })?;

    let mut sheet_xml = String::new();
    archive
        .by_name(&sheet_name)
        .map_err(|e| Error::InvalidInput(format!("Failed to read worksheet: {}", e)))?
        .read_to_string(&mut sheet_xml)
        .map_err(|e| Error::InvalidInput(format!("Failed to read worksheet: {}", e)))?;

    parse_sheet_xml(&sheet_xml, &shared)
}

/// Locate the first worksheet part ("xl/worksheets/sheet1.xml" by
/// convention, else the lexicographically first part under worksheets/)
fn first_sheet_name<R: Read + std::io::Seek>(archive: &zip::ZipArchive<R>) -> Option<String> {
    let mut candidates: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/") && n.ends_with(".xml"))
        .map(|n| n.to_string())
        .collect();
    if candidates.iter().any(|n| n == "xl/worksheets/sheet1.xml") {
        return Some("xl/worksheets/sheet1.xml".to_string());
    }
    candidates.sort();
    candidates.into_iter().next()
}

/// Read the shared-string table, if the workbook has one
///
/// Rich-text runs inside one `<si>` are concatenated.
fn read_shared_strings<R: Read + std::io::Seek>(
    archive: &mut zip::ZipArchive<R>,
) -> Result<Vec<String>> {
    let mut xml = String::new();
    match archive.by_name("xl/sharedStrings.xml") {
        Ok(mut part) => {
            part.read_to_string(&mut xml)
                .map_err(|e| Error::InvalidInput(format!("Failed to read shared strings: {}", e)))?;
        }
        Err(_) => return Ok(Vec::new()),
    }

    let mut reader = Reader::from_str(&xml);
    reader.config_mut().trim_text(false);

    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_t = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"si" => current.clear(),
                b"t" => in_t = true,
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"si" => strings.push(std::mem::take(&mut current)),
                b"t" => in_t = false,
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_t {
                    current.push_str(&e.unescape().unwrap_or_default());
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::InvalidInput(format!(
                    "Shared strings XML error: {}",
                    e
                )))
            }
            _ => {}
        }
    }

    Ok(strings)
}

fn parse_sheet_xml(xml: &str, shared: &[String]) -> Result<Vec<Vec<String>>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut in_row = false;
    let mut in_value = false;
    let mut in_inline_text = false;

    // State of the cell currently being read
    let mut col: usize = 0;
    let mut cell_type = String::new();
    let mut cell_text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"row" => {
                    in_row = true;
                    row.clear();
                    col = 0;
                }
                b"c" if in_row => {
                    (col, cell_type) = cell_start(e, col, row.len())?;
                    cell_text.clear();
                }
                b"v" => in_value = true,
                b"t" => in_inline_text = true,
                _ => {}
            },
            Ok(Event::Empty(ref e)) => {
                // Self-closing cell: present but empty
                if in_row && e.local_name().as_ref() == b"c" {
                    (col, _) = cell_start(e, col, row.len())?;
                    place_cell(&mut row, col, String::new());
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"row" => {
                    in_row = false;
                    rows.push(std::mem::take(&mut row));
                }
                b"c" if in_row => {
                    let value = resolve_cell(&cell_type, &cell_text, shared);
                    place_cell(&mut row, col, value);
                }
                b"v" => in_value = false,
                b"t" => in_inline_text = false,
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_value || in_inline_text {
                    cell_text.push_str(&e.unescape().unwrap_or_default());
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::InvalidInput(format!(
                    "Worksheet XML error: {}",
                    e
                )))
            }
            _ => {}
        }
    }

    Ok(rows)
}

/// Read a `<c>` element's column index and type attributes
fn cell_start(
    e: &quick_xml::events::BytesStart<'_>,
    prev_col: usize,
    cells_so_far: usize,
) -> Result<(usize, String)> {
    let mut col = if cells_so_far == 0 { 0 } else { prev_col + 1 };
    let mut cell_type = String::new();

    for attr in e.attributes().flatten() {
        match attr.key.local_name().as_ref() {
            b"r" => {
                if let Ok(value) = attr.unescape_value() {
                    if let Some(idx) = column_index(&value) {
                        col = idx;
                    }
                }
            }
            b"t" => {
                if let Ok(value) = attr.unescape_value() {
                    cell_type = value.into_owned();
                }
            }
            _ => {}
        }
    }

    Ok((col, cell_type))
}

/// Resolve stored cell text against its type ("s" = shared string index)
fn resolve_cell(cell_type: &str, text: &str, shared: &[String]) -> String {
    if cell_type == "s" {
        return text
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|i| shared.get(i).cloned())
            .unwrap_or_default();
    }
    text.to_string()
}

/// Column index from a cell reference ("A1" -> 0, "C5" -> 2, "AB2" -> 27)
fn column_index(cell_ref: &str) -> Option<usize> {
    let letters: String = cell_ref.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    if letters.is_empty() {
        return None;
    }
    let mut idx: usize = 0;
    for c in letters.chars() {
        idx = idx * 26 + (c.to_ascii_uppercase() as usize - 'A' as usize + 1);
    }
    Some(idx - 1)
}

/// Place a cell at its column, padding any gap with empty cells
fn place_cell(row: &mut Vec<String>, col: usize, value: String) {
    while row.len() < col {
        row.push(String::new());
    }
    if row.len() == col {
        row.push(value);
    } else {
        row[col] = value;
    }
}
