mod column_mapping;
mod day_record;

pub use column_mapping::{
    ColumnMapping, ColumnSelection, LearnedColumn, MappingSource, PayrollField, ResolvedColumn,
};
pub use day_record::{DayRecord, PayrollRun, Summary};
