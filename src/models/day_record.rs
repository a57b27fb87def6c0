use serde::{Deserialize, Serialize};

/// One computed payroll line for a selected day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayRecord {
    pub date: String,
    pub sales: f64,
    pub refund: f64,
    pub net_sales: f64,
    pub hours: f64,
    pub rate: f64,
    pub salary: f64,
}

/// Totals and averages over a set of day records. All zero when there are none.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_days: usize,
    pub total_salary: f64,
    pub total_sales: f64,
    pub total_refunds: f64,
    pub total_hours: f64,
    pub avg_rate: f64,
    pub avg_sales_per_day: f64,
}

/// A saved processing run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayrollRun {
    pub id: i64,
    pub created_at: String,
    pub source_file: String,
    pub sheet_name: String,
    pub records: Vec<DayRecord>,
    pub summary: Summary,
}
