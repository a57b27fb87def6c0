use calamine::{open_workbook_auto, Data, Reader};
use rust_xlsxwriter::{Color, Format, FormatAlign, Workbook, Worksheet, XlsxError};
use std::path::{Path, PathBuf};

use crate::error::{PayrollError, Result};
use crate::models::{DayRecord, Summary};
use crate::types::{format_number, Cell, Sheet};

/// CSV / report column order.
pub const REPORT_HEADERS: [&str; 7] = ["Date", "Sales", "Refund", "Real Sales", "Hours", "Rate", "Salary"];

fn data_to_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::String(s) => Cell::Text(s.clone()),
        Data::Bool(b) => Cell::Text(if *b { "TRUE" } else { "FALSE" }.to_string()),
        // Date-formatted cells keep their serial; decoding happens later.
        Data::DateTime(dt) => Cell::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(e) => Cell::Text(format!("#{:?}", e)),
    }
}

/// Get list of sheet names from workbook.
pub fn get_sheet_names(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Err(PayrollError::Spreadsheet(format!("File not found: {}", path.display())));
    }
    let workbook = open_workbook_auto(path).map_err(|e| PayrollError::Spreadsheet(e.to_string()))?;
    Ok(workbook.sheet_names().to_vec())
}

/// Read a worksheet (first one when `sheet_name` is None) into a grid whose
/// row/column positions match the sheet's A1 layout.
/// Returns the worksheet name actually read.
pub fn read_sheet(path: &Path, sheet_name: Option<&str>) -> Result<(String, Sheet)> {
    if !path.exists() {
        return Err(PayrollError::Spreadsheet(format!("File not found: {}", path.display())));
    }
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| PayrollError::Spreadsheet(format!("Could not open Excel file: {}", e)))?;
    let name = match sheet_name {
        Some(n) => n.to_string(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| PayrollError::Spreadsheet("Workbook has no sheets".to_string()))?,
    };
    let range = workbook
        .worksheet_range(&name)
        .map_err(|e| PayrollError::Spreadsheet(format!("Sheet not found: {}", e)))?;

    // Ranges start at the first used cell; pad back to A1.
    let (start_row, start_col) = range.start().unwrap_or((0, 0));
    let mut grid: Sheet = vec![Vec::new(); start_row as usize];
    for row in range.rows() {
        let mut cells = vec![Cell::Empty; start_col as usize];
        cells.extend(row.iter().map(data_to_cell));
        while cells.last().is_some_and(Cell::is_blank) {
            cells.pop();
        }
        grid.push(cells);
    }
    tracing::info!(path = %path.display(), sheet = %name, rows = grid.len(), "worksheet read");
    Ok((name, grid))
}

/// Deterministic hash of the header labels in column order, used to remember
/// column choices per layout. Case and surrounding spaces are ignored.
pub fn schema_hash(headers: &[String]) -> String {
    let labels: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
    let normalized = labels.join("|");
    let mut hash: i32 = 0;
    for b in normalized.bytes() {
        hash = hash.wrapping_shl(5).wrapping_sub(hash).wrapping_add(b as i32);
    }
    format!("{}-{}", to_radix36(hash.unsigned_abs()), headers.len())
}

fn to_radix36(mut n: u32) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut s = Vec::new();
    while n > 0 {
        s.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    s.reverse();
    String::from_utf8(s).unwrap_or_default()
}

/// `path_override` with extension `ext`, or a timestamped file in Downloads
/// (Desktop, then the working directory, as fallbacks).
pub fn export_path(path_override: Option<&str>, stem: &str, ext: &str) -> PathBuf {
    if let Some(p) = path_override.map(str::trim).filter(|p| !p.is_empty()) {
        let mut pb = PathBuf::from(p);
        if pb.extension().and_then(|e| e.to_str()) != Some(ext) {
            pb.set_extension(ext);
        }
        return pb;
    }
    let dir = dirs::download_dir()
        .or_else(dirs::desktop_dir)
        .unwrap_or_else(|| PathBuf::from("."));
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
    let mut p = dir.join(format!("{}_{}.{}", stem, stamp, ext));
    let mut counter = 2u32;
    while p.exists() {
        p = dir.join(format!("{}_{}_{}.{}", stem, stamp, counter, ext));
        counter += 1;
    }
    p
}

/// CSV text: fixed header line, one line per record, raw numbers.
pub fn records_to_csv(records: &[DayRecord]) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(REPORT_HEADERS)?;
    for r in records {
        writer.write_record([
            r.date.clone(),
            format_number(r.sales),
            format_number(r.refund),
            format_number(r.net_sales),
            format_number(r.hours),
            format_number(r.rate),
            format_number(r.salary),
        ])?;
    }
    let bytes = writer.into_inner().map_err(|e| PayrollError::Io(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Write the salary report as CSV. Returns the saved path.
pub fn export_csv(records: &[DayRecord], path_override: Option<&str>) -> Result<String> {
    if records.is_empty() {
        return Err(PayrollError::NoRecords);
    }
    let path = export_path(path_override, "Salary_Report", "csv");
    std::fs::write(&path, records_to_csv(records)?)?;
    tracing::info!(path = %path.display(), rows = records.len(), "csv exported");
    Ok(path.to_string_lossy().into_owned())
}

/// Drop control chars (except tab, newline, CR) that Excel rejects.
fn sanitize_cell(s: &str) -> String {
    s.chars()
        .filter(|&c| {
            let u = c as u32;
            c == '\t' || c == '\n' || c == '\r' || !(u < 0x20 || u == 0x7F || u == 0xFFFE || u == 0xFFFF)
        })
        .collect()
}

fn header_format() -> Format {
    Format::new()
        .set_bold()
        .set_background_color(Color::RGB(0x2563EB))
        .set_font_color(Color::RGB(0xFFFFFF))
}

fn money_format() -> Format {
    Format::new().set_num_format("$#,##0.00").set_align(FormatAlign::Right)
}

fn write_report_sheet(worksheet: &mut Worksheet, records: &[DayRecord]) -> std::result::Result<(), XlsxError> {
    worksheet.set_name("Salary Report")?;
    let header = header_format();
    let money = money_format();
    let hours_format = Format::new().set_num_format("0.0#");
    let bold = Format::new().set_bold();
    let bold_money = money_format().set_bold();

    for (col, title) in REPORT_HEADERS.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *title, &header)?;
        worksheet.set_column_width(col as u16, if col == 0 { 14.0 } else { 12.0 })?;
    }
    for (i, r) in records.iter().enumerate() {
        let row = (i + 1) as u32;
        worksheet.write_string(row, 0, sanitize_cell(&r.date))?;
        worksheet.write_number_with_format(row, 1, r.sales, &money)?;
        worksheet.write_number_with_format(row, 2, r.refund, &money)?;
        worksheet.write_number_with_format(row, 3, r.net_sales, &money)?;
        worksheet.write_number_with_format(row, 4, r.hours, &hours_format)?;
        worksheet.write_number_with_format(row, 5, r.rate, &money)?;
        worksheet.write_number_with_format(row, 6, r.salary, &money)?;
    }
    let total_row = (records.len() + 1) as u32;
    let total_hours: f64 = records.iter().map(|r| r.hours).sum();
    let total_salary: f64 = records.iter().map(|r| r.salary).sum();
    worksheet.write_string_with_format(total_row, 0, "Total", &bold)?;
    worksheet.write_number_with_format(total_row, 4, total_hours, &hours_format.clone().set_bold())?;
    worksheet.write_number_with_format(total_row, 6, total_salary, &bold_money)?;
    worksheet.set_freeze_panes(1, 0)?;
    Ok(())
}

fn write_summary_sheet(worksheet: &mut Worksheet, summary: &Summary) -> std::result::Result<(), XlsxError> {
    worksheet.set_name("Summary")?;
    let header = header_format();
    let money = money_format();
    worksheet.write_string_with_format(0, 0, "Metric", &header)?;
    worksheet.write_string_with_format(0, 1, "Value", &header)?;
    worksheet.set_column_width(0, 18.0)?;
    worksheet.set_column_width(1, 14.0)?;

    let rows: [(&str, f64, bool); 7] = [
        ("Total Days", summary.total_days as f64, false),
        ("Total Salary", summary.total_salary, true),
        ("Total Sales", summary.total_sales, true),
        ("Total Refunds", summary.total_refunds, true),
        ("Total Hours", summary.total_hours, false),
        ("Avg Rate/Hour", summary.avg_rate, true),
        ("Avg Sales/Day", summary.avg_sales_per_day, true),
    ];
    for (i, (label, value, is_money)) in rows.iter().enumerate() {
        let row = (i + 1) as u32;
        worksheet.write_string(row, 0, *label)?;
        if *is_money {
            worksheet.write_number_with_format(row, 1, *value, &money)?;
        } else {
            worksheet.write_number(row, 1, *value)?;
        }
    }
    Ok(())
}

/// Write the salary report workbook (records + summary sheet). Returns the saved path.
pub fn export_xlsx(records: &[DayRecord], summary: &Summary, path_override: Option<&str>) -> Result<String> {
    if records.is_empty() {
        return Err(PayrollError::NoRecords);
    }
    let path = export_path(path_override, "Salary_Report", "xlsx");
    let mut workbook = Workbook::new();
    write_report_sheet(workbook.add_worksheet(), records)?;
    write_summary_sheet(workbook.add_worksheet(), summary)?;
    workbook.save(&path)?;
    tracing::info!(path = %path.display(), rows = records.len(), "xlsx exported");
    Ok(path.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_matches_report_layout() {
        let records = vec![DayRecord {
            date: "01/02/2024".to_string(),
            sales: 500.0,
            refund: 50.0,
            net_sales: 450.0,
            hours: 8.0,
            rate: 17.0,
            salary: 136.0,
        }];
        let csv = records_to_csv(&records).unwrap();
        assert_eq!(
            csv,
            "Date,Sales,Refund,Real Sales,Hours,Rate,Salary\n01/02/2024,500,50,450,8,17,136\n"
        );
        assert_eq!(csv.lines().count(), 2);
    }

    #[test]
    fn csv_keeps_fractions_unformatted() {
        let records = vec![DayRecord {
            date: "Day 1".to_string(),
            sales: 312.5,
            refund: 0.0,
            net_sales: 312.5,
            hours: 7.5,
            rate: 17.0,
            salary: 127.5,
        }];
        let csv = records_to_csv(&records).unwrap();
        assert!(csv.ends_with("Day 1,312.5,0,312.5,7.5,17,127.5\n"));
    }

    #[test]
    fn schema_hash_follows_column_order_not_case() {
        let a = schema_hash(&["Date".to_string(), "Sales".to_string()]);
        let b = schema_hash(&[" DATE".to_string(), "sales".to_string()]);
        let swapped = schema_hash(&["Sales".to_string(), "Date".to_string()]);
        let c = schema_hash(&["Date".to_string(), "Hours".to_string()]);
        assert_eq!(a, b);
        assert_ne!(a, swapped);
        assert_ne!(a, c);
    }

    #[test]
    fn export_path_forces_extension() {
        let p = export_path(Some("/tmp/report.txt"), "Salary_Report", "csv");
        assert_eq!(p, PathBuf::from("/tmp/report.csv"));
        let p = export_path(Some("out.xlsx"), "Salary_Report", "xlsx");
        assert_eq!(p, PathBuf::from("out.xlsx"));
    }

    #[test]
    fn empty_exports_are_refused() {
        assert!(matches!(export_csv(&[], Some("x.csv")), Err(PayrollError::NoRecords)));
        assert!(matches!(
            export_xlsx(&[], &Summary::default(), Some("x.xlsx")),
            Err(PayrollError::NoRecords)
        ));
    }
}
