//! Print a worksheet the way the calculator sees it: trimmed, header split
//! off, date column decoded, plus the inferred column mapping.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use payroll_calculator_lib::config::{init_tracing, AppConfig};
use payroll_calculator_lib::excel;
use payroll_calculator_lib::models::{ColumnSelection, PayrollField};
use payroll_calculator_lib::services::{sheet_normalizer, ColumnMapper, DateCodec};
use payroll_calculator_lib::types::column_letter;

#[derive(Debug, Parser)]
#[command(name = "dump_sheet", about = "Dump a normalized worksheet")]
struct Args {
    file: PathBuf,
    #[arg(long)]
    sheet: Option<String>,
    /// Show cells exactly as read, before normalization
    #[arg(long)]
    raw: bool,
}

fn dump(args: &Args) -> payroll_calculator_lib::Result<()> {
    let (name, raw) = excel::read_sheet(&args.file, args.sheet.as_deref())?;
    println!("# {} [{}]", args.file.display(), name);

    if args.raw {
        for (i, row) in raw.iter().enumerate() {
            let cells: Vec<String> = row.iter().map(|c| format!("{:?}", c)).collect();
            println!("{:>4}: {}", i + 1, cells.join(", "));
        }
        return Ok(());
    }

    let sheet = sheet_normalizer::prepare(&raw)?;
    println!("# schema {}", excel::schema_hash(&sheet.header));
    for (i, h) in sheet.header.iter().enumerate() {
        println!("{:>3} {}", column_letter(i), h);
    }

    let mapping = ColumnMapper::new().resolve(&sheet.header, &sheet.rows, &ColumnSelection::default());
    let date_col = match &mapping {
        Ok(m) => {
            for field in PayrollField::ALL {
                if let Some(col) = m.column(field) {
                    println!("# {} -> {} ({})", field, column_letter(col.index), col.source);
                }
            }
            m.date.index
        }
        Err(e) => {
            println!("# mapping failed: {}", e);
            0
        }
    };

    for (i, row) in DateCodec::default().display_dates(&sheet.rows, date_col).iter().enumerate() {
        let cells: Vec<String> = row.iter().map(|c| c.to_string()).collect();
        println!("{:>4}: {}", i + 1, cells.join("\t"));
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(&AppConfig::load().log_filter);
    match dump(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
