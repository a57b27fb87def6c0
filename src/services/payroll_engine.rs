//! Selected sheet rows → day records, and in-place recomputation.

use std::collections::BTreeSet;

use crate::error::{PayrollError, Result};
use crate::models::{ColumnMapping, DayRecord, PayrollField};
use crate::services::{DateCodec, TierSchedule};
use crate::types::{Cell, Sheet};

fn cell_at<'a>(row: &'a [Cell], mapping: &ColumnMapping, field: PayrollField) -> Option<&'a Cell> {
    mapping.index(field).and_then(|i| row.get(i))
}

fn amount_at(row: &[Cell], mapping: &ColumnMapping, field: PayrollField) -> f64 {
    cell_at(row, mapping, field).map(Cell::amount).unwrap_or(0.0)
}

/// Compute one record per selected data row, in row order.
///
/// `selected` holds zero-based data row indices; indices past the end are
/// ignored. Undecodable dates become `Day <n>` (n = position among processed
/// rows, from 1); unreadable amounts count as 0.
pub fn process(
    rows: &Sheet,
    mapping: &ColumnMapping,
    selected: &BTreeSet<usize>,
    schedule: &TierSchedule,
    codec: &DateCodec,
) -> Result<Vec<DayRecord>> {
    let picked: Vec<&Vec<Cell>> = selected.iter().filter_map(|&i| rows.get(i)).collect();
    if picked.is_empty() {
        return Err(PayrollError::EmptySelection);
    }

    let records: Vec<DayRecord> = picked
        .into_iter()
        .enumerate()
        .map(|(pos, row)| {
            let date = cell_at(row, mapping, PayrollField::Date)
                .and_then(|c| codec.decode_cell(c))
                .unwrap_or_else(|| format!("Day {}", pos + 1));
            let sales = amount_at(row, mapping, PayrollField::Sales);
            let refund = amount_at(row, mapping, PayrollField::Refund);
            let hours = amount_at(row, mapping, PayrollField::Hours);
            let net_sales = sales - refund;
            let rate = schedule.resolve_rate(net_sales);
            DayRecord {
                date,
                sales,
                refund,
                net_sales,
                hours,
                rate,
                salary: hours * rate,
            }
        })
        .collect();

    tracing::info!(
        selected = selected.len(),
        processed = records.len(),
        "payroll computed"
    );
    Ok(records)
}

/// Apply an hours edit. Rate and sales figures are left alone.
pub fn recompute_row(record: &mut DayRecord, hours: f64) {
    record.hours = if hours.is_finite() { hours } else { 0.0 };
    record.salary = record.hours * record.rate;
}

/// Re-resolve rate and salary of every record against `schedule`.
pub fn recompute_all(records: &mut [DayRecord], schedule: &TierSchedule) {
    for record in records.iter_mut() {
        record.rate = schedule.resolve_rate(record.net_sales);
        record.salary = record.hours * record.rate;
    }
    tracing::debug!(records = records.len(), "payroll recomputed");
}
