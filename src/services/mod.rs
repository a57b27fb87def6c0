pub mod column_mapper;
pub mod date_codec;
pub mod payroll_engine;
pub mod sheet_normalizer;
pub mod summary;
pub mod tier_schedule;

pub use column_mapper::ColumnMapper;
pub use date_codec::DateCodec;
pub use tier_schedule::{Tier, TierField, TierSchedule};
