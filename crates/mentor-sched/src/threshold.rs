//! The five reminder thresholds around an occurrence. Each is checked
//! independently every tick and gated separately by the ledger.

/// Half-width of the crossing window in seconds. The full 120-second
/// window must stay wider than the scheduler tick so no crossing slips
/// between two ticks.
pub const CROSSING_WINDOW_SECS: i64 = 60;

/// Thresholds recur weekly, so a week-long cooldown suppresses repeats
/// within one cycle while letting next week's crossing fire again.
pub const LEDGER_COOLDOWN_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threshold {
    SixDaysBefore,
    FourDaysBefore,
    OneDayBefore,
    OneHourBefore,
    OneHourAfter,
}

impl Threshold {
    pub const ALL: [Threshold; 5] = [
        Threshold::SixDaysBefore,
        Threshold::FourDaysBefore,
        Threshold::OneDayBefore,
        Threshold::OneHourBefore,
        Threshold::OneHourAfter,
    ];

    /// Signed target distance to the occurrence, positive meaning the
    /// occurrence is still ahead.
    pub fn target_secs(self) -> i64 {
        match self {
            Threshold::SixDaysBefore => 6 * 24 * 3600,
            Threshold::FourDaysBefore => 4 * 24 * 3600,
            Threshold::OneDayBefore => 24 * 3600,
            Threshold::OneHourBefore => 3600,
            Threshold::OneHourAfter => -3600,
        }
    }

    /// Ledger key, stable across releases since it is persisted.
    pub fn kind(self) -> &'static str {
        match self {
            Threshold::SixDaysBefore => "6_days",
            Threshold::FourDaysBefore => "4_days",
            Threshold::OneDayBefore => "1_day",
            Threshold::OneHourBefore => "1_hour",
            Threshold::OneHourAfter => "1_hour_after",
        }
    }

    pub fn is_crossed(self, delta_secs: i64) -> bool {
        let target = self.target_secs();
        target - CROSSING_WINDOW_SECS < delta_secs && delta_secs < target + CROSSING_WINDOW_SECS
    }

    /// Reminder text, with the appointment time where the wording needs it.
    pub fn message(self, time: &str) -> String {
        match self {
            Threshold::SixDaysBefore => {
                "Reminder: your next meeting is six days away.".to_string()
            }
            Threshold::FourDaysBefore => {
                "Reminder: your meeting is four days away.".to_string()
            }
            Threshold::OneDayBefore => {
                "Reminder: your meeting is tomorrow. Take a moment to review \
                 the material from last week."
                    .to_string()
            }
            Threshold::OneHourBefore => {
                format!("Reminder: your meeting starts at {}.", time)
            }
            Threshold::OneHourAfter => {
                format!("The {} meeting has wrapped up. See you next week!", time)
            }
        }
    }
}

/// All thresholds crossed by the given delta. Usually zero or one, but
/// they are evaluated independently on purpose.
pub fn crossed(delta_secs: i64) -> impl Iterator<Item = Threshold> {
    Threshold::ALL
        .into_iter()
        .filter(move |t| t.is_crossed(delta_secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_target_is_crossed() {
        for threshold in Threshold::ALL {
            assert!(threshold.is_crossed(threshold.target_secs()));
        }
    }

    #[test]
    fn window_boundaries() {
        let target = Threshold::OneHourBefore.target_secs();
        assert!(Threshold::OneHourBefore.is_crossed(target - 59));
        assert!(Threshold::OneHourBefore.is_crossed(target + 59));
        assert!(!Threshold::OneHourBefore.is_crossed(target - 61));
        assert!(!Threshold::OneHourBefore.is_crossed(target + 61));
        // The window is open: exactly 60 seconds off does not count.
        assert!(!Threshold::OneHourBefore.is_crossed(target + 60));
    }

    #[test]
    fn after_threshold_uses_negative_delta() {
        assert!(Threshold::OneHourAfter.is_crossed(-3600));
        assert!(!Threshold::OneHourAfter.is_crossed(3600));
    }

    #[test]
    fn thresholds_are_independent() {
        let hits: Vec<_> = crossed(Threshold::OneDayBefore.target_secs()).collect();
        assert_eq!(hits, vec![Threshold::OneDayBefore]);

        assert_eq!(crossed(0).count(), 0);
    }
}
