//! Step-function hourly rate table keyed by daily net sales.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{PayrollError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    pub threshold: f64,
    pub rate: f64,
}

impl Tier {
    pub fn new(threshold: f64, rate: f64) -> Self {
        Tier { threshold, rate }
    }

    fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() {
            return Err(PayrollError::InvalidTierValue {
                field: "threshold",
                value: self.threshold,
            });
        }
        if !self.rate.is_finite() {
            return Err(PayrollError::InvalidTierValue {
                field: "rate",
                value: self.rate,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierField {
    Threshold,
    Rate,
}

impl std::str::FromStr for TierField {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "threshold" => Ok(TierField::Threshold),
            "rate" => Ok(TierField::Rate),
            other => Err(format!("Unknown tier field '{}' (expected threshold or rate)", other)),
        }
    }
}

/// Tiers sorted ascending by threshold; never empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TierSchedule {
    tiers: Vec<Tier>,
}

impl Default for TierSchedule {
    fn default() -> Self {
        TierSchedule {
            tiers: vec![
                Tier::new(0.0, 15.0),
                Tier::new(300.0, 17.0),
                Tier::new(600.0, 19.0),
                Tier::new(900.0, 21.0),
            ],
        }
    }
}

impl TierSchedule {
    pub fn new(tiers: Vec<Tier>) -> Result<Self> {
        if tiers.is_empty() {
            return Err(PayrollError::InvalidTierImport(
                "expected a non-empty array of tiers".to_string(),
            ));
        }
        for tier in &tiers {
            tier.validate()?;
        }
        let mut schedule = TierSchedule { tiers };
        schedule.sort();
        Ok(schedule)
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    fn sort(&mut self) {
        self.tiers.sort_by(|a, b| a.threshold.total_cmp(&b.threshold));
    }

    /// Rate of the highest tier whose threshold does not exceed `net_sales`;
    /// the lowest tier's rate when sales sit below every threshold.
    pub fn resolve_rate(&self, net_sales: f64) -> f64 {
        let floor = self.tiers.first().map(|t| t.rate).unwrap_or(0.0);
        self.tiers
            .iter()
            .rev()
            .find(|t| net_sales >= t.threshold)
            .map(|t| t.rate)
            .unwrap_or(floor)
    }

    pub fn add(&mut self, tier: Tier) -> Result<()> {
        tier.validate()?;
        self.tiers.push(tier);
        self.sort();
        tracing::info!(threshold = tier.threshold, rate = tier.rate, "tier added");
        Ok(())
    }

    /// Append a tier 100 above the current top threshold paying 2 more than the top rate.
    pub fn add_next(&mut self) -> Result<Tier> {
        let top = self
            .tiers
            .iter()
            .map(|t| t.threshold)
            .fold(f64::NEG_INFINITY, f64::max);
        let last_rate = self.tiers.last().map(|t| t.rate).unwrap_or(0.0);
        let tier = Tier::new(top + 100.0, last_rate + 2.0);
        self.add(tier)?;
        Ok(tier)
    }

    pub fn update(&mut self, index: usize, field: TierField, value: f64) -> Result<()> {
        let len = self.tiers.len();
        let tier = self
            .tiers
            .get_mut(index)
            .ok_or(PayrollError::TierOutOfRange { index, len })?;
        let mut updated = *tier;
        match field {
            TierField::Threshold => updated.threshold = value,
            TierField::Rate => updated.rate = value,
        }
        updated.validate()?;
        *tier = updated;
        self.sort();
        tracing::info!(index, ?field, value, "tier updated");
        Ok(())
    }

    /// Remove a tier. The last remaining tier cannot be removed.
    pub fn remove(&mut self, index: usize) -> Result<Tier> {
        let len = self.tiers.len();
        if index >= len {
            return Err(PayrollError::TierOutOfRange { index, len });
        }
        if len <= 1 {
            tracing::warn!("refusing to remove the only tier");
            return Err(PayrollError::LastTier);
        }
        let removed = self.tiers.remove(index);
        tracing::info!(index, threshold = removed.threshold, "tier removed");
        Ok(removed)
    }

    /// Replace the whole schedule. On error the current schedule is untouched.
    pub fn replace(&mut self, tiers: Vec<Tier>) -> Result<()> {
        *self = TierSchedule::new(tiers)?;
        tracing::info!(tiers = self.tiers.len(), "tier schedule replaced");
        Ok(())
    }

    pub fn import_json(&mut self, json: &str) -> Result<()> {
        let tiers: Vec<Tier> = serde_json::from_str(json)
            .map_err(|e| PayrollError::InvalidTierImport(e.to_string()))?;
        self.replace(tiers)
    }

    pub fn export_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.tiers)?)
    }
}

impl fmt::Display for TierSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, tier) in self.tiers.iter().enumerate() {
            writeln!(f, "{:>3}. sales >= ${:<10.2} ${:.2}/hr", i + 1, tier.threshold, tier.rate)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn default_schedule_steps() {
        let s = TierSchedule::default();
        assert_eq!(s.resolve_rate(299.0), 15.0);
        assert_eq!(s.resolve_rate(300.0), 17.0);
        assert_eq!(s.resolve_rate(450.0), 17.0);
        assert_eq!(s.resolve_rate(899.0), 19.0);
        assert_eq!(s.resolve_rate(900.0), 21.0);
        assert_eq!(s.resolve_rate(100_000.0), 21.0);
    }

    #[test]
    fn below_every_threshold_uses_lowest_rate() {
        let s = TierSchedule::new(vec![Tier::new(100.0, 16.0), Tier::new(500.0, 20.0)]).unwrap();
        assert_eq!(s.resolve_rate(-50.0), 16.0);
        assert_eq!(s.resolve_rate(99.99), 16.0);
    }

    #[test]
    fn duplicate_thresholds_resolve_to_last() {
        let s = TierSchedule::new(vec![Tier::new(0.0, 10.0), Tier::new(300.0, 12.0), Tier::new(300.0, 14.0)])
            .unwrap();
        assert_eq!(s.resolve_rate(300.0), 14.0);
    }

    #[test]
    fn updates_keep_the_schedule_sorted() {
        let mut s = TierSchedule::default();
        s.update(0, TierField::Threshold, 1000.0).unwrap();
        let thresholds: Vec<f64> = s.tiers().iter().map(|t| t.threshold).collect();
        assert_eq!(thresholds, vec![300.0, 600.0, 900.0, 1000.0]);
        assert_eq!(s.tiers()[3].rate, 15.0);
    }

    #[test]
    fn rejected_update_leaves_schedule_unchanged() {
        let mut s = TierSchedule::default();
        assert!(s.update(1, TierField::Rate, f64::NAN).is_err());
        assert!(matches!(
            s.update(9, TierField::Rate, 1.0),
            Err(PayrollError::TierOutOfRange { index: 9, len: 4 })
        ));
        assert_eq!(s, TierSchedule::default());
    }

    #[test]
    fn add_next_extends_the_top() {
        let mut s = TierSchedule::default();
        let tier = s.add_next().unwrap();
        assert_eq!(tier, Tier::new(1000.0, 23.0));
        assert_eq!(s.len(), 5);
        assert_eq!(s.resolve_rate(1000.0), 23.0);
    }

    #[test]
    fn last_tier_cannot_be_removed() {
        let mut s = TierSchedule::new(vec![Tier::new(0.0, 15.0)]).unwrap();
        assert!(matches!(s.remove(0), Err(PayrollError::LastTier)));
        assert_eq!(s.len(), 1);

        let mut s = TierSchedule::default();
        for _ in 0..3 {
            s.remove(0).unwrap();
        }
        assert!(s.remove(0).is_err());
        assert_eq!(s.tiers(), &[Tier::new(900.0, 21.0)]);
    }

    #[test]
    fn import_validates_before_replacing() {
        let mut s = TierSchedule::default();
        assert!(s.import_json("[]").is_err());
        assert!(s.import_json(r#"{"threshold": 0, "rate": 1}"#).is_err());
        assert!(s.import_json(r#"[{"threshold": 0}]"#).is_err());
        assert!(s.import_json("not json").is_err());
        assert_eq!(s, TierSchedule::default());

        s.import_json(r#"[{"threshold": 500, "rate": 20}, {"threshold": 0, "rate": 12.5}]"#)
            .unwrap();
        assert_eq!(s.tiers(), &[Tier::new(0.0, 12.5), Tier::new(500.0, 20.0)]);
    }

    #[test]
    fn export_is_an_array_of_pairs() {
        let s = TierSchedule::new(vec![Tier::new(0.0, 15.0), Tier::new(300.0, 17.5)]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&s.export_json().unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!([
                {"threshold": 0.0, "rate": 15.0},
                {"threshold": 300.0, "rate": 17.5}
            ])
        );
    }

    proptest! {
        #[test]
        fn rate_never_decreases_with_sales(a in -1000.0f64..5000.0, b in -1000.0f64..5000.0) {
            let s = TierSchedule::default();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(s.resolve_rate(lo) <= s.resolve_rate(hi));
            let rate = s.resolve_rate(hi);
            prop_assert!(s.tiers().iter().any(|t| t.rate == rate));
        }
    }
}
