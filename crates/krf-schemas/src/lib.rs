//! Shared data model for the refill job.
//!
//! Everything here is plain data plus the pure eligibility rules that both the
//! Postgres store and the in-memory test store must agree on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A quota-bearing key as stored in the `keys` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    pub id: String,
    pub workspace_id: String,
    /// `None` means the key has no refill policy.
    pub refill_amount: Option<i64>,
    pub remaining: i64,
    /// Day of month (1..=31). `None` means "every day it is below its refill amount".
    pub refill_day: Option<i32>,
    pub last_refill_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Key {
    /// Not deleted, has a refill policy, and is below its refill amount.
    pub fn is_refill_candidate(&self) -> bool {
        self.deleted_at.is_none()
            && self
                .refill_amount
                .is_some_and(|amount| self.remaining < amount)
    }
}

/// Classification of the run's civil date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayClass {
    pub today: u32,
    pub last_day_of_month: u32,
    pub is_end_of_month: bool,
}

impl DayClass {
    /// Day condition a key's `refill_day` must satisfy for this run.
    pub fn day_condition(&self) -> DayCondition {
        if self.is_end_of_month {
            DayCondition::AtLeast(self.last_day_of_month)
        } else {
            DayCondition::Exactly(self.today)
        }
    }
}

/// Constraint on `refill_day` applied by the due-key query.
///
/// Keys without a refill day always satisfy the condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "day", rename_all = "snake_case")]
pub enum DayCondition {
    /// Normal day: `refill_day == day`.
    Exactly(u32),
    /// End of month: `refill_day >= day` (catches 29/30/31 on short months).
    AtLeast(u32),
}

impl DayCondition {
    pub fn admits(&self, refill_day: Option<i32>) -> bool {
        let Some(day) = refill_day else {
            return true;
        };
        match *self {
            DayCondition::Exactly(d) => i64::from(day) == i64::from(d),
            DayCondition::AtLeast(d) => i64::from(day) >= i64::from(d),
        }
    }

    /// The bound day, for query binding and log fields.
    pub fn day(&self) -> u32 {
        match *self {
            DayCondition::Exactly(d) | DayCondition::AtLeast(d) => d,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(refill_amount: Option<i64>, remaining: i64) -> Key {
        Key {
            id: "key_1".to_string(),
            workspace_id: "ws_1".to_string(),
            refill_amount,
            remaining,
            refill_day: None,
            last_refill_at: None,
            deleted_at: None,
        }
    }

    #[test]
    fn candidate_requires_policy_and_headroom() {
        assert!(key(Some(100), 5).is_refill_candidate());
        assert!(!key(Some(100), 100).is_refill_candidate());
        assert!(!key(Some(100), 150).is_refill_candidate());
        assert!(!key(None, 0).is_refill_candidate());
    }

    #[test]
    fn deleted_key_is_never_a_candidate() {
        let mut k = key(Some(100), 5);
        k.deleted_at = Some(Utc::now());
        assert!(!k.is_refill_candidate());
    }

    #[test]
    fn day_condition_admits_unset_refill_day() {
        assert!(DayCondition::Exactly(15).admits(None));
        assert!(DayCondition::AtLeast(29).admits(None));
    }

    #[test]
    fn day_condition_bounds() {
        assert!(DayCondition::Exactly(15).admits(Some(15)));
        assert!(!DayCondition::Exactly(15).admits(Some(16)));
        assert!(DayCondition::AtLeast(29).admits(Some(29)));
        assert!(DayCondition::AtLeast(29).admits(Some(31)));
        assert!(!DayCondition::AtLeast(29).admits(Some(28)));
    }

    #[test]
    fn end_of_month_class_uses_at_least() {
        let class = DayClass {
            today: 30,
            last_day_of_month: 30,
            is_end_of_month: true,
        };
        assert_eq!(class.day_condition(), DayCondition::AtLeast(30));

        let class = DayClass {
            today: 12,
            last_day_of_month: 30,
            is_end_of_month: false,
        };
        assert_eq!(class.day_condition(), DayCondition::Exactly(12));
    }

    #[test]
    fn day_condition_serializes_tagged() {
        let v = serde_json::to_value(DayCondition::AtLeast(29)).unwrap();
        assert_eq!(v, serde_json::json!({"kind": "at_least", "day": 29}));
    }
}
