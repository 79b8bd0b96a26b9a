use std::fmt;

use crate::error::PolicyError;

pub const DEFAULT_RECENT_WINDOW_DAYS: u32 = 7;
pub const DEFAULT_DAILY_WINDOW_DAYS: u32 = 30;

/// Tiered retention policy.
///
/// - age <= recent: always kept;
/// - recent < age <= daily: one snapshot per age-in-days bucket;
/// - age > daily: deleted.
///
/// `recent < daily` is enforced by `new`, so the mid tier is never empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    recent_window_days: u32,
    daily_window_days: u32,
}

impl RetentionPolicy {
    pub fn new(recent_window_days: u32, daily_window_days: u32) -> Result<Self, PolicyError> {
        if recent_window_days >= daily_window_days {
            return Err(PolicyError::WindowOrder {
                recent: recent_window_days,
                daily: daily_window_days,
            });
        }
        Ok(Self {
            recent_window_days,
            daily_window_days,
        })
    }

    pub fn recent_window_days(&self) -> u32 {
        self.recent_window_days
    }

    pub fn daily_window_days(&self) -> u32 {
        self.daily_window_days
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            recent_window_days: DEFAULT_RECENT_WINDOW_DAYS,
            daily_window_days: DEFAULT_DAILY_WINDOW_DAYS,
        }
    }
}

impl fmt::Display for RetentionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "keep all <= {}d, one per day <= {}d, drop older",
            self.recent_window_days, self.daily_window_days
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inverted_or_equal_windows() {
        assert_eq!(
            RetentionPolicy::new(30, 7),
            Err(PolicyError::WindowOrder { recent: 30, daily: 7 })
        );
        assert!(RetentionPolicy::new(7, 7).is_err());
        assert!(RetentionPolicy::new(0, 1).is_ok());
    }

    #[test]
    fn default_matches_weekly_then_monthly() {
        let p = RetentionPolicy::default();
        assert_eq!(p.recent_window_days(), 7);
        assert_eq!(p.daily_window_days(), 30);
    }
}
