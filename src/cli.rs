use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::collections::BTreeSet;

use crate::commands::{self, AppState, SheetPreview};
use crate::models::{ColumnMapping, ColumnSelection, DayRecord, PayrollField, Summary};
use crate::services::{Tier, TierField};
use crate::types::column_letter;

#[derive(Debug, Parser)]
#[command(
    name = "payroll-calculator",
    version,
    about = "Daily salaries from sales spreadsheets using a tiered hourly rate"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List worksheets in a workbook
    Sheets { file: String },
    /// Show the sheet with decoded dates and the inferred columns
    Preview {
        file: String,
        #[arg(long)]
        sheet: Option<String>,
        /// Maximum rows to print
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Compute salaries for a workbook
    Calc(CalcArgs),
    /// Show or edit the commission tiers
    Tiers {
        #[command(subcommand)]
        action: TierAction,
    },
    /// Saved runs
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// Remembered column choices
    Mappings {
        #[command(subcommand)]
        action: MappingAction,
    },
    /// Print (or open) the data folder
    DataDir {
        #[arg(long)]
        open: bool,
    },
}

#[derive(Debug, Args)]
pub struct CalcArgs {
    pub file: String,
    #[arg(long)]
    pub sheet: Option<String>,
    /// Date column (letter like A, or 1-based number)
    #[arg(long, value_parser = parse_column)]
    pub date: Option<usize>,
    /// Sales column
    #[arg(long, value_parser = parse_column)]
    pub sales: Option<usize>,
    /// Refund column
    #[arg(long, value_parser = parse_column)]
    pub refund: Option<usize>,
    /// Hours column
    #[arg(long, value_parser = parse_column)]
    pub hours: Option<usize>,
    /// Only these data rows (1-based, comma separated)
    #[arg(long, value_delimiter = ',')]
    pub rows: Vec<usize>,
    /// Skip these data rows (1-based, comma separated)
    #[arg(long, value_delimiter = ',')]
    pub exclude: Vec<usize>,
    /// Override hours of a result line: LINE=HOURS (1-based)
    #[arg(long = "set-hours", value_parser = parse_hours_edit)]
    pub set_hours: Vec<(usize, f64)>,
    /// Write the report as CSV (default name in Downloads when empty)
    #[arg(long, num_args = 0..=1, default_missing_value = "")]
    pub csv: Option<String>,
    /// Write the report as an Excel workbook
    #[arg(long, num_args = 0..=1, default_missing_value = "")]
    pub xlsx: Option<String>,
    /// Save the run to history
    #[arg(long)]
    pub save: bool,
    /// Print records and summary as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Subcommand)]
pub enum TierAction {
    List,
    /// Add a tier; without values, adds one step above the top tier
    Add {
        #[arg(long, requires = "rate")]
        threshold: Option<f64>,
        #[arg(long, requires = "threshold")]
        rate: Option<f64>,
    },
    /// Change the threshold or rate of tier N (1-based)
    Set { tier: usize, field: TierField, value: f64 },
    /// Remove tier N (1-based)
    Remove { tier: usize },
    /// Restore the default tiers
    Reset,
    Import { file: String },
    Export { file: Option<String> },
}

#[derive(Debug, Subcommand)]
pub enum HistoryAction {
    List,
    Show { id: i64 },
    Delete { id: i64 },
}

#[derive(Debug, Subcommand)]
pub enum MappingAction {
    Clear,
}

/// Column reference: spreadsheet letters (`C`, `AA`) or a 1-based number.
pub fn parse_column(s: &str) -> Result<usize, String> {
    let s = s.trim();
    if let Ok(n) = s.parse::<usize>() {
        return n.checked_sub(1).ok_or_else(|| "column numbers start at 1".to_string());
    }
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(format!("'{}' is not a column letter or number", s));
    }
    let too_wide = || format!("column '{}' is too far right", s);
    let mut n = 0usize;
    for c in s.to_ascii_uppercase().bytes() {
        n = n
            .checked_mul(26)
            .and_then(|n| n.checked_add((c - b'A' + 1) as usize))
            .ok_or_else(too_wide)?;
    }
    Ok(n - 1)
}

fn parse_hours_edit(s: &str) -> Result<(usize, f64), String> {
    let (line, hours) = s
        .split_once('=')
        .ok_or_else(|| format!("expected LINE=HOURS, got '{}'", s))?;
    let line: usize = line.trim().parse().map_err(|_| format!("bad line number '{}'", line))?;
    let hours: f64 = hours.trim().parse().map_err(|_| format!("bad hours '{}'", hours))?;
    if line == 0 {
        return Err("line numbers start at 1".to_string());
    }
    Ok((line - 1, hours))
}

fn one_based(rows: &[usize], what: &str) -> Result<BTreeSet<usize>, String> {
    rows.iter()
        .map(|&r| r.checked_sub(1).ok_or_else(|| format!("{} row numbers start at 1", what)))
        .collect()
}

fn money(v: f64) -> String {
    format!("${:.2}", v)
}

fn describe_mapping(mapping: &ColumnMapping, header: &[String]) -> String {
    PayrollField::ALL
        .iter()
        .map(|&field| match mapping.column(field) {
            Some(col) => format!(
                "{}={} ({}, {})",
                field,
                column_letter(col.index),
                header.get(col.index).map(String::as_str).unwrap_or(""),
                col.source
            ),
            None => format!("{}=none", field),
        })
        .collect::<Vec<_>>()
        .join("  ")
}

fn print_preview(preview: &SheetPreview, limit: usize) {
    println!("{} [{}]", preview.source, preview.sheet_name);
    for h in &preview.headers {
        println!("  {:>3}: {}", h.column_letter, h.header_text);
    }
    println!();
    for (i, row) in preview.rows.iter().take(limit).enumerate() {
        let cells: Vec<String> = row.iter().map(|c| c.to_string()).collect();
        println!("{:>4} | {}", i + 1, cells.join(" | "));
    }
    if preview.rows.len() > limit {
        println!("  ... {} more rows", preview.rows.len() - limit);
    }
    let header: Vec<String> = preview.headers.iter().map(|h| h.header_text.clone()).collect();
    match (&preview.mapping, &preview.mapping_error) {
        (Some(m), _) => println!("\ncolumns: {}", describe_mapping(m, &header)),
        (None, Some(err)) => println!("\ncolumns: {}", err),
        (None, None) => {}
    }
}

fn print_records(records: &[DayRecord], summary: &Summary) {
    println!(
        "{:<12} {:>12} {:>12} {:>12} {:>7} {:>8} {:>12}",
        "Date", "Sales", "Refund", "Real Sales", "Hours", "Rate", "Salary"
    );
    for r in records {
        println!(
            "{:<12} {:>12} {:>12} {:>12} {:>7.1} {:>8} {:>12}",
            r.date,
            money(r.sales),
            money(r.refund),
            money(r.net_sales),
            r.hours,
            money(r.rate),
            money(r.salary)
        );
    }
    println!(
        "{:<12} {:>12} {:>12} {:>12} {:>7.1} {:>8} {:>12}",
        "Total", "", "", "", summary.total_hours, "", money(summary.total_salary)
    );
    println!();
    println!("Total Days     {}", summary.total_days);
    println!("Total Salary   {}", money(summary.total_salary));
    println!("Total Sales    {}", money(summary.total_sales));
    println!("Total Refunds  {}", money(summary.total_refunds));
    println!("Total Hours    {:.1} hrs", summary.total_hours);
    println!("Avg Rate/Hour  {}", money(summary.avg_rate));
    println!("Avg Sales/Day  {}", money(summary.avg_sales_per_day));
}

fn print_tiers(tiers: &[Tier]) {
    for (i, t) in tiers.iter().enumerate() {
        println!("{:>3}. sales >= {:<12} {}/hr", i + 1, money(t.threshold), money(t.rate));
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CalcOutput<'a> {
    records: &'a [DayRecord],
    summary: Summary,
}

fn optional_path(p: &Option<String>) -> Option<Option<&str>> {
    p.as_deref().map(|s| if s.is_empty() { None } else { Some(s) })
}

fn calc(state: &mut AppState, args: CalcArgs) -> Result<(), String> {
    commands::load_file(state, &args.file, args.sheet.as_deref())?;
    let row_count = state.session.as_ref().map(|s| s.sheet.rows.len()).unwrap_or(0);

    let mut rows = if args.rows.is_empty() {
        (0..row_count).collect()
    } else {
        one_based(&args.rows, "--rows")?
    };
    for r in one_based(&args.exclude, "--exclude")? {
        rows.remove(&r);
    }
    commands::set_row_selection(state, rows)?;

    let selection = ColumnSelection {
        date: args.date,
        sales: args.sales,
        refund: args.refund,
        hours: args.hours,
    };
    commands::process_selected(state, &selection)?;
    for &(line, hours) in &args.set_hours {
        commands::update_hours(state, line, hours)?;
    }

    let records = commands::get_records(state);
    let summary = commands::get_summary(state);
    if args.json {
        let out = CalcOutput {
            records: &records,
            summary,
        };
        println!("{}", serde_json::to_string_pretty(&out).map_err(|e| e.to_string())?);
    } else {
        if let Some(session) = &state.session {
            if let Some(m) = &session.mapping {
                println!("columns: {}\n", describe_mapping(m, &session.sheet.header));
            }
        }
        print_records(&records, &summary);
    }

    if let Some(path) = optional_path(&args.csv) {
        let saved = commands::export_to_csv(state, path)?;
        eprintln!("CSV saved to {}", saved);
    }
    if let Some(path) = optional_path(&args.xlsx) {
        let saved = commands::export_to_excel(state, path)?;
        eprintln!("Excel report saved to {}", saved);
    }
    if args.save {
        let id = commands::save_run(state)?;
        eprintln!("Saved as run #{}", id);
    }
    Ok(())
}

fn tiers(state: &mut AppState, action: TierAction) -> Result<(), String> {
    let tier_index = |n: usize| n.checked_sub(1).ok_or_else(|| "tier numbers start at 1".to_string());
    match action {
        TierAction::List => {}
        TierAction::Add { threshold, rate } => {
            let tier = threshold.zip(rate).map(|(t, r)| Tier::new(t, r));
            let added = commands::add_tier(state, tier)?;
            eprintln!("Added tier: sales >= {} pays {}/hr", money(added.threshold), money(added.rate));
        }
        TierAction::Set { tier, field, value } => {
            commands::update_tier(state, tier_index(tier)?, field, value)?;
        }
        TierAction::Remove { tier } => {
            let removed = commands::remove_tier(state, tier_index(tier)?)?;
            eprintln!("Removed tier at {}", money(removed.threshold));
        }
        TierAction::Reset => {
            commands::load_default_tiers(state)?;
            eprintln!("Default tiers loaded successfully!");
        }
        TierAction::Import { file } => {
            commands::import_tiers(state, &file)?;
            eprintln!("Tiers imported successfully!");
        }
        TierAction::Export { file } => {
            let saved = commands::export_tiers(state, file.as_deref())?;
            eprintln!("Tiers exported to {}", saved);
            return Ok(());
        }
    }
    print_tiers(&commands::get_tiers(state));
    Ok(())
}

fn history(state: &AppState, action: HistoryAction) -> Result<(), String> {
    match action {
        HistoryAction::List => {
            for run in commands::get_history(state)? {
                println!(
                    "#{:<4} {}  {} [{}]  {} days  {}",
                    run.id,
                    run.created_at,
                    run.source_file,
                    run.sheet_name,
                    run.summary.total_days,
                    money(run.summary.total_salary)
                );
            }
        }
        HistoryAction::Show { id } => {
            let run = commands::get_history_by_id(state, id)?;
            println!("#{} {} {} [{}]\n", run.id, run.created_at, run.source_file, run.sheet_name);
            print_records(&run.records, &run.summary);
        }
        HistoryAction::Delete { id } => {
            commands::delete_history_record(state, id)?;
            eprintln!("Deleted run #{}", id);
        }
    }
    Ok(())
}

pub fn execute(state: &mut AppState, command: Command) -> Result<(), String> {
    match command {
        Command::Sheets { file } => {
            for name in commands::get_sheet_names(&file)? {
                println!("{}", name);
            }
            Ok(())
        }
        Command::Preview { file, sheet, limit } => {
            let preview = commands::load_file(state, &file, sheet.as_deref())?;
            print_preview(&preview, limit);
            Ok(())
        }
        Command::Calc(args) => calc(state, args),
        Command::Tiers { action } => tiers(state, action),
        Command::History { action } => history(state, action),
        Command::Mappings { action: MappingAction::Clear } => {
            let n = commands::clear_learned_mappings(state)?;
            eprintln!("Cleared {} remembered column choices", n);
            Ok(())
        }
        Command::DataDir { open } => {
            println!("{}", commands::get_app_data_path(state));
            if open {
                commands::open_app_data_folder(state)?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn columns_accept_letters_and_numbers() {
        assert_eq!(parse_column("A"), Ok(0));
        assert_eq!(parse_column("j"), Ok(9));
        assert_eq!(parse_column("AA"), Ok(26));
        assert_eq!(parse_column("3"), Ok(2));
        assert!(parse_column("0").is_err());
        assert!(parse_column("C3").is_err());
        assert!(parse_column(&"Z".repeat(20)).is_err());
    }

    #[test]
    fn calc_arguments_parse() {
        let cli = Cli::try_parse_from([
            "payroll-calculator",
            "calc",
            "week.xlsx",
            "--sales",
            "C",
            "--rows",
            "1,2,5",
            "--set-hours",
            "2=7.5",
            "--csv",
        ])
        .unwrap();
        let Command::Calc(args) = cli.command else {
            panic!("expected calc");
        };
        assert_eq!(args.sales, Some(2));
        assert_eq!(args.rows, vec![1, 2, 5]);
        assert_eq!(args.set_hours, vec![(1, 7.5)]);
        assert_eq!(args.csv.as_deref(), Some(""));
        assert_eq!(args.xlsx, None);
    }

    #[test]
    fn tier_set_parses_field_names() {
        let cli = Cli::try_parse_from(["payroll-calculator", "tiers", "set", "2", "rate", "18.5"]).unwrap();
        match cli.command {
            Command::Tiers {
                action: TierAction::Set { tier, field, value },
            } => {
                assert_eq!((tier, field, value), (2, TierField::Rate, 18.5));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
