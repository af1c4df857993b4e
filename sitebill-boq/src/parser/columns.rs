//! Column semantics resolution
//!
//! BOQ exports name their columns inconsistently ("Qty", "Quantity",
//! "QUANTITY (No.)", "Unit Price"...). The resolver scores every header
//! against a fixed alias table and produces an explicit column-index to
//! canonical-field mapping that is computed once per file and consumed
//! for every data row. Rows in files whose headers could not be resolved
//! go through a per-row best-effort fallback instead.

use super::amount::{looks_numeric, parse_amount};

/// Canonical fields a BOQ column can map to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalField {
    Description,
    Unit,
    Quantity,
    Rate,
    Amount,
    Section,
    SubSection,
}

impl CanonicalField {
    const ALL: [CanonicalField; 7] = [
        CanonicalField::Description,
        CanonicalField::Unit,
        CanonicalField::Quantity,
        CanonicalField::Rate,
        CanonicalField::Amount,
        CanonicalField::Section,
        CanonicalField::SubSection,
    ];

    /// Alias table: case-insensitive substrings that identify a field.
    /// Longer aliases outscore shorter ones so "unit price" resolves to
    /// rate rather than unit.
    fn aliases(&self) -> &'static [&'static str] {
        match self {
            CanonicalField::Description => &["description", "particulars", "item", "desc"],
            CanonicalField::Unit => &["unit", "uom"],
            CanonicalField::Quantity => &["quantity", "qty"],
            CanonicalField::Rate => &["unit price", "unit rate", "rate", "price"],
            CanonicalField::Amount => &["total price", "total amount", "amount", "value", "cost"],
            CanonicalField::Section => &["section", "bill", "category"],
            CanonicalField::SubSection => {
                &["sub section", "sub-section", "subsection", "sub category", "subcategory"]
            }
        }
    }

    fn name(&self) -> &'static str {
        match self {
            CanonicalField::Description => "description",
            CanonicalField::Unit => "unit",
            CanonicalField::Quantity => "quantity",
            CanonicalField::Rate => "rate",
            CanonicalField::Amount => "amount",
            CanonicalField::Section => "section",
            CanonicalField::SubSection => "sub_section",
        }
    }
}

const EXACT_SCORE: usize = 100;
const SUBSTRING_SCORE: usize = 50;

/// Column-index assignments for one file, resolved once from the header row
#[derive(Debug, Clone, Default)]
pub struct ColumnMap {
    pub description: Option<usize>,
    pub unit: Option<usize>,
    pub quantity: Option<usize>,
    pub rate: Option<usize>,
    pub amount: Option<usize>,
    pub section: Option<usize>,
    pub sub_section: Option<usize>,
    /// Headers the resolver was not confident about (weak matches and
    /// unrecognized columns)
    pub uncertain: Vec<String>,
}

impl ColumnMap {
    /// Resolve a header row into a column map
    ///
    /// Best score wins; ties break toward the leftmost column. A column is
    /// assigned to at most one field and vice versa.
    pub fn resolve(headers: &[String]) -> ColumnMap {
        // (score, column, field) candidates above zero
        let mut candidates: Vec<(usize, usize, CanonicalField)> = Vec::new();

        for (col, header) in headers.iter().enumerate() {
            let normalized = header.trim().to_lowercase();
            if normalized.is_empty() {
                continue;
            }
            for field in CanonicalField::ALL {
                let mut best = 0usize;
                for alias in field.aliases() {
                    let score = if normalized == *alias {
                        EXACT_SCORE + alias.len()
                    } else if normalized.contains(alias) {
                        SUBSTRING_SCORE + alias.len()
                    } else {
                        0
                    };
                    best = best.max(score);
                }
                if best > 0 {
                    candidates.push((best, col, field));
                }
            }
        }

        // Highest score first, leftmost column on ties
        candidates.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        let mut map = ColumnMap::default();
        let mut used_cols = vec![false; headers.len()];

        for (score, col, field) in candidates {
            if used_cols[col] || map.get(field).is_some() {
                continue;
            }
            used_cols[col] = true;
            map.set(field, col);
            if score < EXACT_SCORE {
                map.uncertain.push(format!(
                    "header '{}' assumed to be {}",
                    headers[col].trim(),
                    field.name()
                ));
            }
        }

        for (col, header) in headers.iter().enumerate() {
            if !header.trim().is_empty() && !used_cols[col] {
                map.uncertain
                    .push(format!("column '{}' not recognized", header.trim()));
            }
        }

        map
    }

    /// A header row is usable when at least a description column resolved;
    /// otherwise the file is treated as headerless and every row goes
    /// through the fallback path.
    pub fn is_usable(&self) -> bool {
        self.description.is_some()
    }

    fn get(&self, field: CanonicalField) -> Option<usize> {
        match field {
            CanonicalField::Description => self.description,
            CanonicalField::Unit => self.unit,
            CanonicalField::Quantity => self.quantity,
            CanonicalField::Rate => self.rate,
            CanonicalField::Amount => self.amount,
            CanonicalField::Section => self.section,
            CanonicalField::SubSection => self.sub_section,
        }
    }

    fn set(&mut self, field: CanonicalField, col: usize) {
        match field {
            CanonicalField::Description => self.description = Some(col),
            CanonicalField::Unit => self.unit = Some(col),
            CanonicalField::Quantity => self.quantity = Some(col),
            CanonicalField::Rate => self.rate = Some(col),
            CanonicalField::Amount => self.amount = Some(col),
            CanonicalField::Section => self.section = Some(col),
            CanonicalField::SubSection => self.sub_section = Some(col),
        }
    }
}

/// Canonical values extracted from one data row
#[derive(Debug, Clone, Default)]
pub struct ExtractedRow {
    pub description: String,
    /// Description cell verbatim, leading whitespace preserved for the
    /// structure detector's indent heuristic
    pub description_raw: String,
    pub unit: String,
    pub quantity: Option<f64>,
    pub rate: Option<f64>,
    /// Column-supplied amount; when absent the assembler derives
    /// quantity * rate
    pub amount: Option<f64>,
    pub section: Option<String>,
    pub sub_section: Option<String>,
    /// Fallback diagnostics for this row
    pub fallback_notes: Vec<String>,
}

/// Extract canonical values from a row using the resolved map, falling
/// back per row for fields the map could not place.
///
/// Fallback behavior is preserved from the original system verbatim:
/// when neither an amount nor a rate column resolved, the first
/// numeric-looking cell becomes the amount, even if it is conceptually a
/// quantity. See the fallback tests before changing this.
pub fn extract_row(cells: &[String], map: &ColumnMap, row_index: usize) -> ExtractedRow {
    let cell = |idx: Option<usize>| -> &str {
        idx.and_then(|i| cells.get(i)).map(|s| s.as_str()).unwrap_or("")
    };

    let mut row = ExtractedRow::default();

    // Description: mapped column, else first non-numeric text cell
    let mapped_description = cell(map.description);
    if !mapped_description.trim().is_empty() {
        row.description_raw = mapped_description.to_string();
        row.description = mapped_description.trim().to_string();
    } else {
        if let Some((idx, text)) = cells
            .iter()
            .enumerate()
            .find(|(_, c)| !c.trim().is_empty() && !looks_numeric(c))
        {
            row.description_raw = text.clone();
            row.description = text.trim().to_string();
            if map.description != Some(idx) {
                row.fallback_notes.push(format!(
                    "row {}: no description column; used column {}",
                    row_index, idx
                ));
            }
        }
    }

    row.unit = cell(map.unit).trim().to_string();

    let quantity_text = cell(map.quantity);
    if !quantity_text.trim().is_empty() {
        row.quantity = Some(parse_amount(quantity_text));
    }

    let rate_text = cell(map.rate);
    if !rate_text.trim().is_empty() {
        row.rate = Some(parse_amount(rate_text));
    }

    let amount_text = cell(map.amount);
    if !amount_text.trim().is_empty() {
        row.amount = Some(parse_amount(amount_text));
    } else if map.amount.is_none() && map.rate.is_none() {
        // Sparse headers: any numeric-looking cell becomes the amount
        let description_col = map.description;
        if let Some((idx, text)) = cells.iter().enumerate().find(|(i, c)| {
            Some(*i) != description_col && looks_numeric(c)
        }) {
            row.amount = Some(parse_amount(text));
            row.fallback_notes.push(format!(
                "row {}: no amount column; used numeric column {}",
                row_index, idx
            ));
        }
    }

    let section = cell(map.section).trim();
    if !section.is_empty() {
        row.section = Some(section.to_string());
    }
    let sub_section = cell(map.sub_section).trim();
    if !sub_section.is_empty() {
        row.sub_section = Some(sub_section.to_string());
    }

    row
}
