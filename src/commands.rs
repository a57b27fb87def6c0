//! Command layer: owns the upload session and the live tier schedule, and
//! turns library errors into user-facing messages.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::AppConfig;
use crate::db::Db;
use crate::error::PayrollError;
use crate::excel;
use crate::models::{ColumnMapping, ColumnSelection, DayRecord, PayrollRun, Summary};
use crate::services::sheet_normalizer::{self, NormalizedSheet};
use crate::services::{column_mapper, payroll_engine, summary, ColumnMapper, DateCodec, Tier, TierField, TierSchedule};
use crate::types::{column_letter, Cell, Sheet};

pub const TIERS_FILE_NAME: &str = "commission-tiers.json";

/// Structured header for display: column letter, header text, column index.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExcelHeader {
    pub column_letter: String,
    pub header_text: String,
    pub column_index: usize,
}

/// What the sheet view shows after a load.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetPreview {
    pub source: String,
    pub sheet_name: String,
    pub headers: Vec<ExcelHeader>,
    /// Data rows with the date column decoded for display.
    pub rows: Sheet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping: Option<ColumnMapping>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping_error: Option<String>,
}

/// State of the current upload. Replaced on every load.
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub source: String,
    pub sheet_name: String,
    pub sheet: NormalizedSheet,
    pub schema_hash: String,
    pub mapping: Option<ColumnMapping>,
    pub selected: BTreeSet<usize>,
    pub records: Vec<DayRecord>,
}

pub struct AppState {
    pub config: AppConfig,
    pub db: Option<Db>,
    pub schedule: TierSchedule,
    pub codec: DateCodec,
    pub session: Option<UploadSession>,
}

impl AppState {
    /// Open the database and restore the saved tier schedule.
    pub fn new(config: AppConfig) -> Result<Self, String> {
        let db = Db::new(config.db_path.clone()).map_err(|e| e.to_string())?;
        let schedule = db
            .load_tiers()
            .map_err(|e| e.to_string())?
            .unwrap_or_default();
        Ok(AppState {
            config,
            db: Some(db),
            schedule,
            codec: DateCodec::default(),
            session: None,
        })
    }

    /// State without persistence.
    pub fn detached(config: AppConfig) -> Self {
        AppState {
            config,
            db: None,
            schedule: TierSchedule::default(),
            codec: DateCodec::default(),
            session: None,
        }
    }

    fn session(&self) -> Result<&UploadSession, String> {
        self.session
            .as_ref()
            .ok_or_else(|| "No file loaded. Load a spreadsheet first.".to_string())
    }

    fn session_mut(&mut self) -> Result<&mut UploadSession, String> {
        self.session
            .as_mut()
            .ok_or_else(|| "No file loaded. Load a spreadsheet first.".to_string())
    }

    fn mapper_for(&self, schema_hash: &str, header: &[String]) -> ColumnMapper {
        let learned = match &self.db {
            Some(db) => db.get_learned_mapping(schema_hash).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "could not read remembered columns");
                Vec::new()
            }),
            None => Vec::new(),
        };
        ColumnMapper::new().with_learned(column_mapper::learned_selection(&learned, header))
    }
}

fn headers_of(sheet: &NormalizedSheet) -> Vec<ExcelHeader> {
    sheet
        .header
        .iter()
        .enumerate()
        .map(|(i, text)| ExcelHeader {
            column_letter: column_letter(i),
            header_text: text.clone(),
            column_index: i,
        })
        .collect()
}

fn preview_of(state: &AppState, session: &UploadSession, mapping_error: Option<String>) -> SheetPreview {
    let date_col = session.mapping.map(|m| m.date.index).unwrap_or(0);
    SheetPreview {
        source: session.source.clone(),
        sheet_name: session.sheet_name.clone(),
        headers: headers_of(&session.sheet),
        rows: state.codec.display_dates(&session.sheet.rows, date_col),
        mapping: session.mapping,
        mapping_error,
    }
}

pub fn get_sheet_names(path: &str) -> Result<Vec<String>, String> {
    excel::get_sheet_names(Path::new(path)).map_err(|e| e.to_string())
}

/// Read a workbook from disk and start a new session with it.
pub fn load_file(state: &mut AppState, path: &str, sheet: Option<&str>) -> Result<SheetPreview, String> {
    let sheet = sheet.or(state.config.default_sheet.as_deref()).map(str::to_string);
    let (sheet_name, raw) = excel::read_sheet(Path::new(path), sheet.as_deref()).map_err(|e| e.to_string())?;
    load_rows(state, path, &sheet_name, &raw)
}

/// Start a new session from an already-decoded grid. All rows start selected
/// and columns are inferred; an inference failure is reported in the preview.
pub fn load_rows(state: &mut AppState, source: &str, sheet_name: &str, raw: &Sheet) -> Result<SheetPreview, String> {
    let sheet = sheet_normalizer::prepare(raw).map_err(|e| e.to_string())?;
    let schema_hash = excel::schema_hash(&sheet.header);
    let (mapping, mapping_error) = match state
        .mapper_for(&schema_hash, &sheet.header)
        .resolve(&sheet.header, &sheet.rows, &ColumnSelection::default())
    {
        Ok(m) => (Some(m), None),
        Err(e) => (None, Some(e.to_string())),
    };
    let session = UploadSession {
        source: source.to_string(),
        sheet_name: sheet_name.to_string(),
        selected: (0..sheet.rows.len()).collect(),
        sheet,
        schema_hash,
        mapping,
        records: Vec::new(),
    };
    tracing::info!(source, sheet = sheet_name, rows = session.sheet.rows.len(), "file loaded");
    let preview = preview_of(state, &session, mapping_error);
    state.session = Some(session);
    Ok(preview)
}

/// Current sheet view.
pub fn get_preview(state: &AppState) -> Result<SheetPreview, String> {
    Ok(preview_of(state, state.session()?, None))
}

/// Re-resolve the column mapping with the user's picks.
pub fn select_columns(state: &mut AppState, selection: &ColumnSelection) -> Result<ColumnMapping, String> {
    let session = state.session()?;
    let mapping = state
        .mapper_for(&session.schema_hash, &session.sheet.header)
        .resolve(&session.sheet.header, &session.sheet.rows, selection)
        .map_err(|e| e.to_string())?;
    state.session_mut()?.mapping = Some(mapping);
    Ok(mapping)
}

/// Replace the row selection (zero-based data row indices).
pub fn set_row_selection(state: &mut AppState, rows: BTreeSet<usize>) -> Result<usize, String> {
    let session = state.session_mut()?;
    let len = session.sheet.rows.len();
    if let Some(&bad) = rows.iter().find(|&&r| r >= len) {
        return Err(PayrollError::RowOutOfRange { index: bad, len }.to_string());
    }
    session.selected = rows;
    Ok(session.selected.len())
}

pub fn set_row_selected(state: &mut AppState, row: usize, selected: bool) -> Result<(), String> {
    let session = state.session_mut()?;
    let len = session.sheet.rows.len();
    if row >= len {
        return Err(PayrollError::RowOutOfRange { index: row, len }.to_string());
    }
    if selected {
        session.selected.insert(row);
    } else {
        session.selected.remove(&row);
    }
    Ok(())
}

/// Edit a raw data cell before processing. Short rows are padded; the column
/// must exist in the header.
pub fn update_cell(state: &mut AppState, row: usize, col: usize, value: Cell) -> Result<(), String> {
    let session = state.session_mut()?;
    let width = session.sheet.width();
    if col >= width {
        return Err(PayrollError::CellOutOfRange { index: col, width }.to_string());
    }
    let len = session.sheet.rows.len();
    let cells = session
        .sheet
        .rows
        .get_mut(row)
        .ok_or_else(|| PayrollError::RowOutOfRange { index: row, len }.to_string())?;
    if cells.len() <= col {
        cells.resize(col + 1, Cell::Empty);
    }
    cells[col] = value;
    Ok(())
}

/// Resolve columns, compute the selected rows and keep the records in the
/// session. Columns the user picked are remembered for this header layout;
/// guessed ones are not.
pub fn process_selected(state: &mut AppState, selection: &ColumnSelection) -> Result<Vec<DayRecord>, String> {
    let mapping = select_columns(state, selection)?;
    let session = state.session()?;
    let records = payroll_engine::process(
        &session.sheet.rows,
        &mapping,
        &session.selected,
        &state.schedule,
        &state.codec,
    )
    .map_err(|e| e.to_string())?;

    let confirmed = mapping.confirmed_selection();
    match &state.db {
        Some(db) if !confirmed.is_empty() => {
            if let Err(e) = db.upsert_learned_mapping(&session.schema_hash, &confirmed, &session.sheet.header) {
                tracing::warn!(error = %e, "could not remember column choice");
            }
        }
        _ => {}
    }
    state.session_mut()?.records = records.clone();
    Ok(records)
}

pub fn get_records(state: &AppState) -> Vec<DayRecord> {
    state
        .session
        .as_ref()
        .map(|s| s.records.clone())
        .unwrap_or_default()
}

pub fn update_hours(state: &mut AppState, index: usize, hours: f64) -> Result<DayRecord, String> {
    let session = state.session_mut()?;
    let len = session.records.len();
    let record = session
        .records
        .get_mut(index)
        .ok_or_else(|| PayrollError::RowOutOfRange { index, len }.to_string())?;
    payroll_engine::recompute_row(record, hours);
    Ok(record.clone())
}

pub fn get_summary(state: &AppState) -> Summary {
    state
        .session
        .as_ref()
        .map(|s| summary::summarize(&s.records))
        .unwrap_or_default()
}

pub fn get_tiers(state: &AppState) -> Vec<Tier> {
    state.schedule.tiers().to_vec()
}

/// Apply a schedule change to a copy, persist it, then swap it in and
/// recompute the session's records. Nothing changes on error.
fn mutate_tiers<T>(
    state: &mut AppState,
    change: impl FnOnce(&mut TierSchedule) -> crate::error::Result<T>,
) -> Result<T, String> {
    let mut next = state.schedule.clone();
    let out = change(&mut next).map_err(|e| e.to_string())?;
    if let Some(db) = &state.db {
        db.save_tiers(&next).map_err(|e| e.to_string())?;
    }
    state.schedule = next;
    if let Some(session) = state.session.as_mut() {
        payroll_engine::recompute_all(&mut session.records, &state.schedule);
    }
    Ok(out)
}

/// Add `tier`, or the next step above the current top when None.
pub fn add_tier(state: &mut AppState, tier: Option<Tier>) -> Result<Tier, String> {
    mutate_tiers(state, |s| match tier {
        Some(t) => s.add(t).map(|_| t),
        None => s.add_next(),
    })
}

pub fn update_tier(state: &mut AppState, index: usize, field: TierField, value: f64) -> Result<Vec<Tier>, String> {
    mutate_tiers(state, |s| s.update(index, field, value))?;
    Ok(get_tiers(state))
}

pub fn remove_tier(state: &mut AppState, index: usize) -> Result<Tier, String> {
    mutate_tiers(state, |s| s.remove(index))
}

pub fn load_default_tiers(state: &mut AppState) -> Result<Vec<Tier>, String> {
    mutate_tiers(state, |s| {
        *s = TierSchedule::default();
        Ok(())
    })?;
    Ok(get_tiers(state))
}

pub fn import_tiers(state: &mut AppState, path: &str) -> Result<Vec<Tier>, String> {
    let json = fs::read_to_string(path).map_err(|e| format!("Error reading file. Please check the format. ({})", e))?;
    mutate_tiers(state, |s| s.import_json(&json))?;
    tracing::info!(path, tiers = state.schedule.len(), "tiers imported");
    Ok(get_tiers(state))
}

/// Write the schedule as JSON. Returns the saved path.
pub fn export_tiers(state: &AppState, path: Option<&str>) -> Result<String, String> {
    let path = path
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(TIERS_FILE_NAME));
    let json = state.schedule.export_json().map_err(|e| e.to_string())?;
    fs::write(&path, json).map_err(|e| e.to_string())?;
    Ok(path.to_string_lossy().into_owned())
}

pub fn export_to_csv(state: &AppState, path: Option<&str>) -> Result<String, String> {
    let records = state.session.as_ref().map(|s| s.records.as_slice()).unwrap_or(&[]);
    excel::export_csv(records, path).map_err(|e| e.to_string())
}

pub fn export_to_excel(state: &AppState, path: Option<&str>) -> Result<String, String> {
    let records = state.session.as_ref().map(|s| s.records.as_slice()).unwrap_or(&[]);
    excel::export_xlsx(records, &summary::summarize(records), path).map_err(|e| e.to_string())
}

/// Save the current results to history. Returns the run id.
pub fn save_run(state: &AppState) -> Result<i64, String> {
    let db = state.db.as_ref().ok_or("History is not available without a database.")?;
    let session = state.session()?;
    if session.records.is_empty() {
        return Err(PayrollError::NoRecords.to_string());
    }
    db.add_payroll_run(
        &session.source,
        &session.sheet_name,
        &session.records,
        &summary::summarize(&session.records),
    )
    .map_err(|e| e.to_string())
}

pub fn get_history(state: &AppState) -> Result<Vec<PayrollRun>, String> {
    let db = state.db.as_ref().ok_or("History is not available without a database.")?;
    db.get_payroll_runs().map_err(|e| e.to_string())
}

pub fn get_history_by_id(state: &AppState, id: i64) -> Result<PayrollRun, String> {
    let db = state.db.as_ref().ok_or("History is not available without a database.")?;
    db.get_payroll_run(id)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("No saved run with id {}", id))
}

pub fn delete_history_record(state: &AppState, id: i64) -> Result<(), String> {
    let db = state.db.as_ref().ok_or("History is not available without a database.")?;
    if db.delete_payroll_run(id).map_err(|e| e.to_string())? {
        Ok(())
    } else {
        Err(format!("No saved run with id {}", id))
    }
}

pub fn clear_learned_mappings(state: &AppState) -> Result<u64, String> {
    let db = state.db.as_ref().ok_or("No database configured.")?;
    db.clear_learned_mappings().map_err(|e| e.to_string())
}

/// Drop the loaded file and its results. The tier schedule is kept.
pub fn clear_file(state: &mut AppState) {
    state.session = None;
}

/// Drop computed results but keep the loaded sheet.
pub fn clear_results(state: &mut AppState) {
    if let Some(session) = state.session.as_mut() {
        session.records.clear();
    }
}

pub fn get_app_data_path(state: &AppState) -> String {
    state.config.data_dir.to_string_lossy().into_owned()
}

pub fn open_app_data_folder(state: &AppState) -> Result<(), String> {
    fs::create_dir_all(&state.config.data_dir).map_err(|e| e.to_string())?;
    opener::open(&state.config.data_dir).map_err(|e| e.to_string())
}
