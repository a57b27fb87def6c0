//! Spreadsheet serial dates to `MM/DD/YYYY` labels.
//!
//! Serial 1 is the epoch day. The 1900 date system counts a 29 Feb 1900 that
//! never existed, so every serial from 60 on is one day ahead of the calendar.

use chrono::{Datelike, Days, NaiveDate};

use crate::types::{Cell, Sheet};

/// Serials accepted for decoding: `[MIN_SERIAL, MAX_SERIAL)`.
pub const MIN_SERIAL: f64 = 1.0;
pub const MAX_SERIAL: f64 = 100_000.0;

/// Display-time conversion only touches numbers in this open range.
const DISPLAY_MIN: f64 = 1000.0;

pub const DISPLAY_FORMAT: &str = "%m/%d/%Y";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateCodec {
    pub epoch: NaiveDate,
    /// First serial shifted back one day for the phantom leap day.
    pub leap_bug_serial: i64,
    pub min_year: i32,
    pub max_year: i32,
}

impl Default for DateCodec {
    fn default() -> Self {
        DateCodec {
            epoch: NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or(NaiveDate::MIN),
            leap_bug_serial: 60,
            min_year: 1900,
            max_year: 2100,
        }
    }
}

impl DateCodec {
    /// Calendar date for a serial, or None when it is not plausibly a date.
    pub fn decode_date(&self, serial: f64) -> Option<NaiveDate> {
        if !serial.is_finite() || !(MIN_SERIAL..MAX_SERIAL).contains(&serial) {
            return None;
        }
        let mut days = serial.floor() as i64;
        if days >= self.leap_bug_serial {
            days -= 1;
        }
        let offset = u64::try_from(days - 1).ok()?;
        let date = self.epoch.checked_add_days(Days::new(offset))?;
        if date.year() < self.min_year || date.year() > self.max_year {
            return None;
        }
        Some(date)
    }

    pub fn decode(&self, serial: f64) -> Option<String> {
        self.decode_date(serial)
            .map(|d| d.format(DISPLAY_FORMAT).to_string())
    }

    /// Decode a raw cell: numbers and numeric text only. Formatted labels are
    /// not numbers, so decoding an already-decoded cell yields None.
    pub fn decode_cell(&self, cell: &Cell) -> Option<String> {
        cell.as_number().and_then(|n| self.decode(n))
    }

    /// Copy of `rows` with serials in `column` replaced by their labels.
    pub fn display_dates(&self, rows: &Sheet, column: usize) -> Sheet {
        rows.iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(i, cell)| {
                        if i != column {
                            return cell.clone();
                        }
                        match cell.as_number() {
                            Some(n) if n > DISPLAY_MIN && n < MAX_SERIAL => self
                                .decode(n)
                                .map(Cell::Text)
                                .unwrap_or_else(|| cell.clone()),
                            _ => cell.clone(),
                        }
                    })
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn naive(serial: u32) -> NaiveDate {
        let epoch = NaiveDate::from_ymd_opt(1900, 1, 1).unwrap();
        epoch + Days::new(u64::from(serial) - 1)
    }

    #[test]
    fn known_serials() {
        let codec = DateCodec::default();
        assert_eq!(codec.decode(1.0).as_deref(), Some("01/01/1900"));
        assert_eq!(codec.decode(59.0).as_deref(), Some("02/28/1900"));
        assert_eq!(codec.decode(60.0).as_deref(), Some("02/28/1900"));
        assert_eq!(codec.decode(61.0).as_deref(), Some("03/01/1900"));
        assert_eq!(codec.decode(44927.0).as_deref(), Some("01/01/2023"));
        assert_eq!(codec.decode(45658.0).as_deref(), Some("01/01/2025"));
        assert_eq!(codec.decode(45859.0).as_deref(), Some("07/21/2025"));
    }

    #[test]
    fn time_of_day_is_dropped() {
        let codec = DateCodec::default();
        assert_eq!(codec.decode(45859.75).as_deref(), Some("07/21/2025"));
    }

    #[test]
    fn out_of_range_serials_rejected() {
        let codec = DateCodec::default();
        assert_eq!(codec.decode(0.0), None);
        assert_eq!(codec.decode(-5.0), None);
        assert_eq!(codec.decode(100_000.0), None);
        assert_eq!(codec.decode(f64::NAN), None);
        assert_eq!(codec.decode(f64::INFINITY), None);
    }

    #[test]
    fn year_window_is_enforced() {
        let codec = DateCodec::default();
        assert_eq!(codec.decode(73415.0).as_deref(), Some("12/31/2100"));
        assert_eq!(codec.decode(73416.0), None);
        assert_eq!(codec.decode(99_999.0), None);
    }

    #[test]
    fn cells_decode_numbers_and_numeric_text() {
        let codec = DateCodec::default();
        assert_eq!(codec.decode_cell(&Cell::Number(45859.0)).as_deref(), Some("07/21/2025"));
        assert_eq!(codec.decode_cell(&Cell::text("45859")).as_deref(), Some("07/21/2025"));
        assert_eq!(codec.decode_cell(&Cell::text("07/21/2025")), None);
        assert_eq!(codec.decode_cell(&Cell::Empty), None);
    }

    #[test]
    fn display_dates_is_idempotent() {
        let codec = DateCodec::default();
        let rows = vec![
            vec![Cell::Number(45859.0), Cell::Number(45859.0)],
            vec![Cell::Number(500.0), Cell::Empty],
            vec![Cell::text("Total")],
        ];
        let once = codec.display_dates(&rows, 0);
        assert_eq!(once[0][0], Cell::text("07/21/2025"));
        assert_eq!(once[0][1], Cell::Number(45859.0));
        assert_eq!(once[1][0], Cell::Number(500.0));
        assert_eq!(once[2][0], Cell::text("Total"));
        assert_eq!(codec.display_dates(&once, 0), once);
    }

    proptest! {
        #[test]
        fn compensation_starts_at_serial_60(serial in 1u32..73_000) {
            let codec = DateCodec::default();
            let decoded = codec.decode_date(f64::from(serial)).unwrap();
            if serial >= 60 {
                prop_assert_eq!(decoded + Days::new(1), naive(serial));
            } else {
                prop_assert_eq!(decoded, naive(serial));
            }
        }
    }
}
