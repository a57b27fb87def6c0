use rusqlite::{params, Connection, OptionalExtension};
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::{PayrollError, Result};
use crate::models::{ColumnSelection, DayRecord, LearnedColumn, PayrollField, PayrollRun, Summary};
use crate::services::{Tier, TierSchedule};
use crate::types::column_letter;

const SCHEMA_VERSION: i64 = 3;

pub struct Db {
    conn: Mutex<Connection>,
}

fn lock_err<T>(_: T) -> PayrollError {
    PayrollError::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        "database connection lock poisoned",
    ))
}

impl Db {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&db_path)?;
        tracing::debug!(path = %db_path.display(), "database opened");
        Self::migrate(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::migrate(Connection::open_in_memory()?)
    }

    fn migrate(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at TEXT DEFAULT CURRENT_TIMESTAMP
            );
            INSERT INTO schema_version (version) SELECT 1 WHERE NOT EXISTS (SELECT 1 FROM schema_version LIMIT 1);
            CREATE TABLE IF NOT EXISTS pay_tiers (
                position INTEGER PRIMARY KEY,
                threshold REAL NOT NULL,
                rate REAL NOT NULL
            );
            CREATE TABLE IF NOT EXISTS learned_mappings (
                schema_hash TEXT NOT NULL,
                field_type TEXT NOT NULL,
                column_index INTEGER NOT NULL,
                column_letter TEXT NOT NULL,
                usage_count INTEGER DEFAULT 1,
                last_used TEXT NOT NULL,
                PRIMARY KEY (schema_hash, field_type)
            );
            ",
        )?;

        let mut version: i64 = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |r| r.get(0))
            .unwrap_or(1);
        let found = version;

        // Migration 002: saved processing runs
        if version < 2 {
            conn.execute_batch(
                "
                CREATE TABLE IF NOT EXISTS payroll_runs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    created_at TEXT NOT NULL,
                    source_file TEXT NOT NULL,
                    sheet_name TEXT NOT NULL,
                    records_json TEXT NOT NULL,
                    summary_json TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_payroll_runs_created ON payroll_runs(created_at);
                ",
            )?;
            version = 2;
        }

        // Migration 003: header label of each remembered column
        if version < 3 {
            conn.execute_batch("ALTER TABLE learned_mappings ADD COLUMN header_text TEXT;")?;
            version = 3;
        }

        if version != found {
            conn.execute("UPDATE schema_version SET version = ?1", params![version])?;
            tracing::info!(from = found, to = version, "database migrated");
        }

        Ok(Db {
            conn: Mutex::new(conn),
        })
    }

    pub fn schema_version(&self) -> Result<i64> {
        let conn = self.conn.lock().map_err(lock_err)?;
        Ok(conn.query_row("SELECT version FROM schema_version LIMIT 1", [], |r| r.get(0))?)
    }

    /// Stored schedule, or None when nothing was saved yet.
    pub fn load_tiers(&self) -> Result<Option<TierSchedule>> {
        let conn = self.conn.lock().map_err(lock_err)?;
        let mut stmt = conn.prepare("SELECT threshold, rate FROM pay_tiers ORDER BY position")?;
        let tiers = stmt
            .query_map([], |row| Ok(Tier::new(row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if tiers.is_empty() {
            return Ok(None);
        }
        TierSchedule::new(tiers).map(Some)
    }

    pub fn save_tiers(&self, schedule: &TierSchedule) -> Result<()> {
        let mut conn = self.conn.lock().map_err(lock_err)?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM pay_tiers", [])?;
        for (position, tier) in schedule.tiers().iter().enumerate() {
            tx.execute(
                "INSERT INTO pay_tiers (position, threshold, rate) VALUES (?1, ?2, ?3)",
                params![position as i64, tier.threshold, tier.rate],
            )?;
        }
        tx.commit()?;
        tracing::debug!(tiers = schedule.len(), "tier schedule saved");
        Ok(())
    }

    /// Column choices remembered for a header layout.
    pub fn get_learned_mapping(&self, schema_hash: &str) -> Result<Vec<LearnedColumn>> {
        let conn = self.conn.lock().map_err(lock_err)?;
        let mut stmt = conn.prepare(
            "SELECT field_type, column_index, header_text FROM learned_mappings WHERE schema_hash = ?",
        )?;
        let rows = stmt.query_map(params![schema_hash], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?;
        let mut learned = Vec::new();
        for row in rows {
            let (field_type, column_index, header_text) = row?;
            if let (Some(field), Ok(index)) = (PayrollField::from_key(&field_type), usize::try_from(column_index)) {
                learned.push(LearnedColumn {
                    field,
                    index,
                    header_text,
                });
            }
        }
        Ok(learned)
    }

    /// Remember the columns the user confirmed, with the header label found at
    /// each. Fields not in `selection` are forgotten for this layout.
    pub fn upsert_learned_mapping(
        &self,
        schema_hash: &str,
        selection: &ColumnSelection,
        header: &[String],
    ) -> Result<()> {
        let mut conn = self.conn.lock().map_err(lock_err)?;
        let now = chrono::Utc::now().to_rfc3339();
        let tx = conn.transaction()?;
        for field in PayrollField::ALL {
            match selection.get(field) {
                Some(index) => {
                    tx.execute(
                        "INSERT INTO learned_mappings (schema_hash, field_type, column_index, column_letter, header_text, usage_count, last_used)
                         VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)
                         ON CONFLICT(schema_hash, field_type) DO UPDATE SET
                           column_index = excluded.column_index,
                           column_letter = excluded.column_letter,
                           header_text = excluded.header_text,
                           usage_count = usage_count + 1,
                           last_used = excluded.last_used",
                        params![
                            schema_hash,
                            field.key(),
                            index as i64,
                            column_letter(index),
                            header.get(index),
                            now
                        ],
                    )?;
                }
                None => {
                    tx.execute(
                        "DELETE FROM learned_mappings WHERE schema_hash = ?1 AND field_type = ?2",
                        params![schema_hash, field.key()],
                    )?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn clear_learned_mappings(&self) -> Result<u64> {
        let conn = self.conn.lock().map_err(lock_err)?;
        let count = conn.execute("DELETE FROM learned_mappings", [])?;
        Ok(count as u64)
    }

    pub fn add_payroll_run(
        &self,
        source_file: &str,
        sheet_name: &str,
        records: &[DayRecord],
        summary: &Summary,
    ) -> Result<i64> {
        let records_json = serde_json::to_string(records)?;
        let summary_json = serde_json::to_string(summary)?;
        let conn = self.conn.lock().map_err(lock_err)?;
        conn.execute(
            "INSERT INTO payroll_runs (created_at, source_file, sheet_name, records_json, summary_json)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                chrono::Utc::now().to_rfc3339(),
                source_file,
                sheet_name,
                records_json,
                summary_json
            ],
        )?;
        let id = conn.last_insert_rowid();
        tracing::info!(id, records = records.len(), "payroll run saved");
        Ok(id)
    }

    fn run_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(i64, String, String, String, String, String)> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
        ))
    }

    fn decode_run(raw: (i64, String, String, String, String, String)) -> Result<PayrollRun> {
        let (id, created_at, source_file, sheet_name, records_json, summary_json) = raw;
        Ok(PayrollRun {
            id,
            created_at,
            source_file,
            sheet_name,
            records: serde_json::from_str(&records_json)?,
            summary: serde_json::from_str(&summary_json)?,
        })
    }

    /// Saved runs, newest first.
    pub fn get_payroll_runs(&self) -> Result<Vec<PayrollRun>> {
        let conn = self.conn.lock().map_err(lock_err)?;
        let mut stmt = conn.prepare(
            "SELECT id, created_at, source_file, sheet_name, records_json, summary_json
             FROM payroll_runs ORDER BY created_at DESC, id DESC",
        )?;
        let raw = stmt
            .query_map([], Self::run_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        raw.into_iter().map(Self::decode_run).collect()
    }

    pub fn get_payroll_run(&self, id: i64) -> Result<Option<PayrollRun>> {
        let conn = self.conn.lock().map_err(lock_err)?;
        let raw = conn
            .query_row(
                "SELECT id, created_at, source_file, sheet_name, records_json, summary_json
                 FROM payroll_runs WHERE id = ?",
                params![id],
                Self::run_from_row,
            )
            .optional()?;
        raw.map(Self::decode_run).transpose()
    }

    pub fn delete_payroll_run(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock().map_err(lock_err)?;
        let n = conn.execute("DELETE FROM payroll_runs WHERE id = ?", params![id])?;
        Ok(n > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_database_is_migrated() {
        let db = Db::open_in_memory().unwrap();
        assert_eq!(db.schema_version().unwrap(), SCHEMA_VERSION);
        assert!(db.load_tiers().unwrap().is_none());
        assert!(db.get_payroll_runs().unwrap().is_empty());
    }

    #[test]
    fn tiers_round_trip_in_order() {
        let db = Db::open_in_memory().unwrap();
        let schedule = TierSchedule::new(vec![Tier::new(250.0, 16.0), Tier::new(0.0, 14.0)]).unwrap();
        db.save_tiers(&schedule).unwrap();
        assert_eq!(db.load_tiers().unwrap(), Some(schedule));

        db.save_tiers(&TierSchedule::default()).unwrap();
        assert_eq!(db.load_tiers().unwrap(), Some(TierSchedule::default()));
    }

    fn header() -> Vec<String> {
        ["Date", "Salary", "Sales - Total", "Sales - Comm.", "Refunds - Total", "F", "G", "H", "I", "Hours - Worked"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn learned_mappings_replace_and_forget() {
        let db = Db::open_in_memory().unwrap();
        db.upsert_learned_mapping("abc-10", &ColumnSelection::canonical(), &header()).unwrap();
        let learned = db.get_learned_mapping("abc-10").unwrap();
        assert_eq!(learned.len(), 4);
        let hours = learned.iter().find(|c| c.field == PayrollField::Hours).unwrap();
        assert_eq!((hours.index, hours.header_text.as_deref()), (9, Some("Hours - Worked")));
        assert!(db.get_learned_mapping("other").unwrap().is_empty());

        let narrower = ColumnSelection {
            date: Some(1),
            sales: Some(3),
            refund: None,
            hours: Some(9),
        };
        db.upsert_learned_mapping("abc-10", &narrower, &header()).unwrap();
        let learned = db.get_learned_mapping("abc-10").unwrap();
        assert_eq!(learned.len(), 3);
        assert!(learned.iter().all(|c| c.field != PayrollField::Refund));
        assert_eq!(db.clear_learned_mappings().unwrap(), 3);
    }

    #[test]
    fn version_two_database_gains_header_labels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "
                CREATE TABLE schema_version (version INTEGER PRIMARY KEY, applied_at TEXT);
                INSERT INTO schema_version (version) VALUES (2);
                CREATE TABLE learned_mappings (
                    schema_hash TEXT NOT NULL,
                    field_type TEXT NOT NULL,
                    column_index INTEGER NOT NULL,
                    column_letter TEXT NOT NULL,
                    usage_count INTEGER DEFAULT 1,
                    last_used TEXT NOT NULL,
                    PRIMARY KEY (schema_hash, field_type)
                );
                INSERT INTO learned_mappings VALUES ('h-2', 'sales', 1, 'B', 1, 'then');
                CREATE TABLE payroll_runs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    created_at TEXT NOT NULL,
                    source_file TEXT NOT NULL,
                    sheet_name TEXT NOT NULL,
                    records_json TEXT NOT NULL,
                    summary_json TEXT NOT NULL
                );
                ",
            )
            .unwrap();
        }

        let db = Db::new(path).unwrap();
        assert_eq!(db.schema_version().unwrap(), SCHEMA_VERSION);
        let learned = db.get_learned_mapping("h-2").unwrap();
        assert_eq!(learned.len(), 1);
        assert_eq!(learned[0].header_text, None);
    }
}
