//! Resolves which sheet column backs each payroll field.
//!
//! Precedence per field: explicit selection, remembered choice for this header
//! layout, header-name match, content heuristic, canonical layout.

use crate::error::{PayrollError, Result};
use crate::models::{ColumnMapping, ColumnSelection, LearnedColumn, MappingSource, PayrollField, ResolvedColumn};
use crate::types::Sheet;

/// Header substrings tried in priority order (case-insensitive).
fn header_candidates(field: PayrollField) -> &'static [&'static str] {
    match field {
        PayrollField::Date => &["date"],
        PayrollField::Sales => &["sales - total", "sales total", "sales", "amount"],
        PayrollField::Refund => &["refunds - total", "refunds total", "refund", "returns"],
        PayrollField::Hours => &["hours - worked", "hours worked", "hours", "time"],
    }
}

/// First header matching a candidate, trying candidates in order. A header
/// matches when either string contains the other.
pub fn find_by_header(header: &[String], candidates: &[&str]) -> Option<usize> {
    for candidate in candidates {
        let needle = candidate.trim().to_lowercase();
        let found = header.iter().position(|h| {
            let h = h.trim().to_lowercase();
            !h.is_empty() && (h.contains(&needle) || needle.contains(&h))
        });
        if found.is_some() {
            return found;
        }
    }
    None
}

/// Last-resort guess from column contents (date, sales) or header wording
/// (refund, hours).
pub fn find_by_content(header: &[String], rows: &Sheet, field: PayrollField) -> Option<usize> {
    (0..header.len()).find(|&i| {
        let mut values = rows
            .iter()
            .filter_map(|row| row.get(i))
            .filter(|c| !c.is_blank());
        let label = header[i].to_lowercase();
        match field {
            PayrollField::Date => values.any(|c| c.as_number().is_some_and(|n| n > 1000.0)),
            PayrollField::Sales => values.any(|c| c.as_number().is_some_and(|n| n > 0.0)),
            PayrollField::Refund => label.contains("refund") || label.contains("return"),
            PayrollField::Hours => label.contains("hour") || label.contains("time"),
        }
    })
}

fn same_label(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Remembered picks still valid for `header`: a pick is kept only when the
/// column at its index carries the label it had when it was confirmed.
pub fn learned_selection(learned: &[LearnedColumn], header: &[String]) -> ColumnSelection {
    let mut selection = ColumnSelection::default();
    for col in learned {
        let current = header.get(col.index).map(String::as_str);
        match (current, col.header_text.as_deref()) {
            (Some(now), Some(then)) if same_label(now, then) => selection.set(col.field, Some(col.index)),
            _ => tracing::warn!(
                field = col.field.key(),
                index = col.index,
                remembered = col.header_text.as_deref().unwrap_or(""),
                found = current.unwrap_or(""),
                "remembered column no longer matches the header; ignoring"
            ),
        }
    }
    selection
}

#[derive(Debug, Clone)]
pub struct ColumnMapper {
    learned: ColumnSelection,
    fallback: ColumnSelection,
}

impl Default for ColumnMapper {
    fn default() -> Self {
        ColumnMapper {
            learned: ColumnSelection::default(),
            fallback: ColumnSelection::canonical(),
        }
    }
}

impl ColumnMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Columns previously confirmed for a sheet with the same header layout.
    pub fn with_learned(mut self, learned: ColumnSelection) -> Self {
        self.learned = learned;
        self
    }

    pub fn resolve(
        &self,
        header: &[String],
        rows: &Sheet,
        selection: &ColumnSelection,
    ) -> Result<ColumnMapping> {
        let mut resolved = [None; 4];
        for (slot, field) in resolved.iter_mut().zip(PayrollField::ALL) {
            *slot = self.resolve_field(field, header, rows, selection)?;
            match slot {
                Some(col) => tracing::info!(
                    field = field.key(),
                    column = col.index,
                    source = %col.source,
                    "column resolved"
                ),
                None if field.is_mandatory() => {
                    tracing::warn!(field = field.key(), "mandatory column unresolved");
                    return Err(PayrollError::MissingColumn(field));
                }
                None => tracing::debug!(field = field.key(), "optional column unmapped"),
            }
        }
        let [date, sales, refund, hours] = resolved;
        Ok(ColumnMapping {
            date: date.ok_or(PayrollError::MissingColumn(PayrollField::Date))?,
            sales: sales.ok_or(PayrollError::MissingColumn(PayrollField::Sales))?,
            refund,
            hours,
        })
    }

    fn resolve_field(
        &self,
        field: PayrollField,
        header: &[String],
        rows: &Sheet,
        selection: &ColumnSelection,
    ) -> Result<Option<ResolvedColumn>> {
        let width = header.len();
        let data_width = rows.iter().map(Vec::len).max().unwrap_or(0).max(width);
        let pick = |index, source| Some(ResolvedColumn { index, source });

        if let Some(index) = selection.get(field) {
            if index >= data_width {
                return Err(PayrollError::ColumnOutOfRange {
                    field,
                    index,
                    width: data_width,
                });
            }
            return Ok(pick(index, MappingSource::Explicit));
        }
        match self.learned.get(field) {
            Some(index) if index < width => return Ok(pick(index, MappingSource::Learned)),
            Some(index) => {
                tracing::warn!(field = field.key(), index, width, "remembered column no longer fits; ignoring");
            }
            None => {}
        }
        if let Some(index) = find_by_header(header, header_candidates(field)) {
            return Ok(pick(index, MappingSource::Header));
        }
        if let Some(index) = find_by_content(header, rows, field) {
            return Ok(pick(index, MappingSource::Content));
        }
        Ok(self
            .fallback
            .get(field)
            .filter(|&i| i < width)
            .and_then(|i| pick(i, MappingSource::Default)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Cell;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn canonical_header() -> Vec<String> {
        labels(&[
            "Date",
            "Salary",
            "Sales - Total",
            "Sales - Comm.",
            "Refunds - Total",
            "Refunds - Sales Comm.",
            "Products - Comm.",
            "Spare",
            "Tips",
            "Hours - Worked",
            "Hours - Salary",
            "Avg Sales/Hour",
            "Deductions",
            "Reimburs.",
            "Profit",
        ])
    }

    #[test]
    fn canonical_headers_resolve_by_name() {
        let mapping = ColumnMapper::new()
            .resolve(&canonical_header(), &Vec::new(), &ColumnSelection::default())
            .unwrap();
        assert_eq!(mapping.to_selection(), ColumnSelection::canonical());
        assert_eq!(mapping.sales.source, MappingSource::Header);
    }

    #[test]
    fn explicit_selection_wins() {
        let selection = ColumnSelection {
            sales: Some(3),
            hours: Some(10),
            ..Default::default()
        };
        let mapping = ColumnMapper::new()
            .resolve(&canonical_header(), &Vec::new(), &selection)
            .unwrap();
        assert_eq!(mapping.sales.index, 3);
        assert_eq!(mapping.sales.source, MappingSource::Explicit);
        assert_eq!(mapping.hours.map(|c| c.index), Some(10));
        assert_eq!(mapping.date.source, MappingSource::Header);
    }

    #[test]
    fn explicit_selection_outside_sheet_is_rejected() {
        let selection = ColumnSelection {
            date: Some(20),
            ..Default::default()
        };
        let err = ColumnMapper::new()
            .resolve(&canonical_header(), &Vec::new(), &selection)
            .unwrap_err();
        assert!(matches!(err, PayrollError::ColumnOutOfRange { index: 20, width: 15, .. }));
    }

    #[test]
    fn learned_columns_beat_header_names() {
        let learned = ColumnSelection {
            sales: Some(3),
            ..Default::default()
        };
        let mapping = ColumnMapper::new()
            .with_learned(learned)
            .resolve(&canonical_header(), &Vec::new(), &ColumnSelection::default())
            .unwrap();
        assert_eq!(mapping.sales.index, 3);
        assert_eq!(mapping.sales.source, MappingSource::Learned);
    }

    #[test]
    fn header_match_is_bidirectional_and_ordered() {
        let header = labels(&["Day", "Gross Amount", "sales"]);
        assert_eq!(find_by_header(&header, &["sales - total", "amount"]), Some(2));
        assert_eq!(find_by_header(&header, &["amount"]), Some(1));
        assert_eq!(find_by_header(&header, &["refund"]), None);
    }

    #[test]
    fn content_heuristics_pick_serials_and_positive_amounts() {
        let header = labels(&["A", "B", "C"]);
        let rows = vec![
            vec![Cell::text("x"), Cell::Number(45859.0), Cell::Number(-1.0)],
            vec![Cell::Empty, Cell::Number(45860.0), Cell::Number(12.0)],
        ];
        assert_eq!(find_by_content(&header, &rows, PayrollField::Date), Some(1));
        assert_eq!(find_by_content(&header, &rows, PayrollField::Sales), Some(1));
        assert_eq!(find_by_content(&header, &rows, PayrollField::Hours), None);
    }

    #[test]
    fn unnamed_columns_fall_back_to_content_then_default() {
        let header = labels(&["Column A", "Column B", "Column C"]);
        let rows = vec![vec![Cell::text("n/a"), Cell::text("n/a"), Cell::text("n/a")]];
        let mapping = ColumnMapper::new()
            .resolve(&header, &rows, &ColumnSelection::default())
            .unwrap();
        assert_eq!(mapping.date.index, 0);
        assert_eq!(mapping.date.source, MappingSource::Default);
        assert_eq!(mapping.sales.index, 2);
        assert_eq!(mapping.refund, None);
        assert_eq!(mapping.hours, None);
    }

    #[test]
    fn unresolvable_sales_is_an_error() {
        let header = labels(&["Column A"]);
        let rows = vec![vec![Cell::text("n/a")]];
        let err = ColumnMapper::new()
            .resolve(&header, &rows, &ColumnSelection::default())
            .unwrap_err();
        assert!(matches!(err, PayrollError::MissingColumn(PayrollField::Sales)));
    }
    #[test]
    fn explicit_pick_may_reach_past_a_short_header() {
        let header = labels(&["Date", "Sales"]);
        let rows = vec![vec![Cell::Number(45859.0), Cell::Number(500.0), Cell::Number(8.0)]];
        let selection = ColumnSelection {
            hours: Some(2),
            ..Default::default()
        };
        let mapping = ColumnMapper::new().resolve(&header, &rows, &selection).unwrap();
        assert_eq!(mapping.hours.map(|c| (c.index, c.source)), Some((2, MappingSource::Explicit)));

        let beyond = ColumnSelection {
            hours: Some(3),
            ..Default::default()
        };
        let err = ColumnMapper::new().resolve(&header, &rows, &beyond).unwrap_err();
        assert!(matches!(err, PayrollError::ColumnOutOfRange { index: 3, width: 3, .. }));
    }

    fn remembered(field: PayrollField, index: usize, label: Option<&str>) -> LearnedColumn {
        LearnedColumn {
            field,
            index,
            header_text: label.map(str::to_string),
        }
    }

    #[test]
    fn remembered_picks_need_their_old_label() {
        let learned = vec![
            remembered(PayrollField::Date, 0, Some("Date")),
            remembered(PayrollField::Sales, 1, Some("sales ")),
            remembered(PayrollField::Hours, 2, None),
        ];
        let same = labels(&["Date", "Sales", "Hours"]);
        let selection = learned_selection(&learned, &same);
        assert_eq!(selection.date, Some(0));
        assert_eq!(selection.sales, Some(1));
        assert_eq!(selection.hours, None);

        let reordered = labels(&["Sales", "Date", "Hours"]);
        assert_eq!(learned_selection(&learned, &reordered), ColumnSelection::default());

        let narrower = labels(&["Date"]);
        assert_eq!(learned_selection(&learned, &narrower).sales, None);
    }

    #[test]
    fn only_user_picks_are_confirmed() {
        let mapping = ColumnMapper::new()
            .with_learned(ColumnSelection {
                date: Some(0),
                ..Default::default()
            })
            .resolve(
                &canonical_header(),
                &Vec::new(),
                &ColumnSelection {
                    hours: Some(10),
                    ..Default::default()
                },
            )
            .unwrap();
        let confirmed = mapping.confirmed_selection();
        assert_eq!(confirmed.date, Some(0));
        assert_eq!(confirmed.hours, Some(10));
        assert_eq!((confirmed.sales, confirmed.refund), (None, None));

        let guessed = ColumnMapper::new()
            .resolve(&canonical_header(), &Vec::new(), &ColumnSelection::default())
            .unwrap();
        assert!(guessed.confirmed_selection().is_empty());
    }
}
