use crate::error::{PayrollError, Result};
use crate::types::{column_letter, Cell, Header, Sheet};

/// Header labels plus the data rows below them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NormalizedSheet {
    pub header: Header,
    pub rows: Sheet,
}

impl NormalizedSheet {
    pub fn width(&self) -> usize {
        self.header.len()
    }
}

fn row_has_data(row: &[Cell]) -> bool {
    row.iter().any(|c| !c.is_blank())
}

/// Label for a header cell; blanks become `Column <letter>`.
fn header_label(cell: &Cell, index: usize) -> String {
    let text = cell.to_string();
    let text = text.trim();
    if text.is_empty() {
        format!("Column {}", column_letter(index))
    } else {
        text.to_string()
    }
}

/// Drop everything above the first row with data, label the header and drop
/// blank rows below it. The header is widened to the widest data row. The
/// returned grid starts with the header row.
pub fn normalize(raw: &Sheet) -> Result<Sheet> {
    let header_idx = raw
        .iter()
        .position(|row| row_has_data(row))
        .ok_or(PayrollError::EmptySheet)?;
    let width = raw[header_idx..]
        .iter()
        .filter(|row| row_has_data(row))
        .map(Vec::len)
        .max()
        .unwrap_or(0);
    let header: Vec<Cell> = (0..width)
        .map(|i| {
            let label = raw[header_idx]
                .get(i)
                .map(|c| header_label(c, i))
                .unwrap_or_else(|| format!("Column {}", column_letter(i)));
            Cell::Text(label)
        })
        .collect();
    tracing::debug!(header_row = header_idx, columns = header.len(), "header row found");

    let mut out = Vec::with_capacity(raw.len() - header_idx);
    out.push(header);
    out.extend(
        raw[header_idx + 1..]
            .iter()
            .filter(|row| row_has_data(row))
            .cloned(),
    );
    Ok(out)
}

/// Split a normalized grid into header labels and data rows.
pub fn split_header(mut clean: Sheet) -> (Header, Sheet) {
    if clean.is_empty() {
        return (Vec::new(), Vec::new());
    }
    let rows = clean.split_off(1);
    let header = clean
        .pop()
        .unwrap_or_default()
        .iter()
        .enumerate()
        .map(|(i, c)| header_label(c, i))
        .collect();
    (header, rows)
}

/// `normalize` followed by `split_header`.
pub fn prepare(raw: &Sheet) -> Result<NormalizedSheet> {
    let (header, rows) = split_header(normalize(raw)?);
    tracing::info!(columns = header.len(), rows = rows.len(), "sheet normalized");
    Ok(NormalizedSheet { header, rows })
}
