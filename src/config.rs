use std::env;
use std::path::PathBuf;

pub const APP_DIR_NAME: &str = "payroll-calculator";
pub const DB_FILE_NAME: &str = "payroll.db";
const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub log_filter: String,
    pub default_sheet: Option<String>,
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl AppConfig {
    /// Resolve settings from the environment. `.env` files in the data dir and
    /// the working directory are loaded first; variables already set win.
    pub fn load() -> Self {
        let data_dir = Self::data_dir_from_env();
        let env_path = data_dir.join(".env");
        if env_path.exists() {
            let _ = dotenvy::from_path(&env_path);
        }
        let _ = dotenvy::dotenv();
        Self::from_env(data_dir)
    }

    fn data_dir_from_env() -> PathBuf {
        non_empty_var("PAYROLL_DATA_DIR")
            .map(PathBuf::from)
            .or_else(|| dirs::data_dir().map(|d| d.join(APP_DIR_NAME)))
            .unwrap_or_else(|| PathBuf::from(".").join(APP_DIR_NAME))
    }

    /// Settings for a known data dir, reading the remaining variables as-is.
    pub fn from_env(data_dir: PathBuf) -> Self {
        let db_path = non_empty_var("PAYROLL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join(DB_FILE_NAME));
        AppConfig {
            db_path,
            log_filter: non_empty_var("PAYROLL_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            default_sheet: non_empty_var("PAYROLL_SHEET"),
            data_dir,
        }
    }

    /// Config rooted at `data_dir` without consulting the environment.
    pub fn in_dir(data_dir: PathBuf) -> Self {
        AppConfig {
            db_path: data_dir.join(DB_FILE_NAME),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            default_sheet: None,
            data_dir,
        }
    }
}

/// Install the stderr subscriber. Safe to call more than once.
pub fn init_tracing(filter: &str) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_dir_places_database_inside() {
        let cfg = AppConfig::in_dir(PathBuf::from("/tmp/payroll"));
        assert_eq!(cfg.db_path, PathBuf::from("/tmp/payroll/payroll.db"));
        assert_eq!(cfg.log_filter, "warn");
        assert_eq!(cfg.default_sheet, None);
    }

    #[test]
    fn init_tracing_tolerates_repeat_calls() {
        init_tracing("debug");
        init_tracing("not a [valid filter");
    }
}
