use crate::models::{DayRecord, Summary};

/// Totals and simple averages over `records`. The average rate is the plain
/// mean of per-day rates, not salary over hours.
pub fn summarize(records: &[DayRecord]) -> Summary {
    if records.is_empty() {
        return Summary::default();
    }
    let count = records.len() as f64;
    let total_sales: f64 = records.iter().map(|r| r.sales).sum();
    Summary {
        total_days: records.len(),
        total_salary: records.iter().map(|r| r.salary).sum(),
        total_sales,
        total_refunds: records.iter().map(|r| r.refund).sum(),
        total_hours: records.iter().map(|r| r.hours).sum(),
        avg_rate: records.iter().map(|r| r.rate).sum::<f64>() / count,
        avg_sales_per_day: total_sales / count,
    }
}
