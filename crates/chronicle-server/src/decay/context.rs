// decay/context.rs
// Environmental context: diurnal decay-rate adjustment

use chrono::Timelike;

/// Environmental context selected from the local wall clock. Memory decays
/// slower while the user is active and faster overnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentalContext {
    /// 09:00–17:59 local.
    FocusedLearning,
    /// 18:00–22:59 local.
    HighActivity,
    /// 23:00–08:59 local.
    RestPeriod,
    /// Explicit override only, never selected by clock.
    LowActivity,
}

impl EnvironmentalContext {
    /// Half-life divisor for this context. Values below 1 slow decay.
    pub fn decay_multiplier(&self) -> f64 {
        match self {
            EnvironmentalContext::FocusedLearning => 0.5,
            EnvironmentalContext::HighActivity => 0.7,
            EnvironmentalContext::RestPeriod => 1.3,
            EnvironmentalContext::LowActivity => 1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EnvironmentalContext::FocusedLearning => "focused_learning",
            EnvironmentalContext::HighActivity => "high_activity",
            EnvironmentalContext::RestPeriod => "rest_period",
            EnvironmentalContext::LowActivity => "low_activity",
        }
    }

    /// Select a context for an hour of the day (0–23).
    pub fn for_hour(hour: u32) -> Self {
        match hour {
            9..=17 => EnvironmentalContext::FocusedLearning,
            18..=22 => EnvironmentalContext::HighActivity,
            _ => EnvironmentalContext::RestPeriod,
        }
    }

    /// Select the context for the current local wall clock. No timezone or
    /// daylight-transition handling beyond what the OS reports.
    pub fn current() -> Self {
        Self::for_hour(chrono::Local::now().hour())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hour_bands() {
        assert_eq!(
            EnvironmentalContext::for_hour(9),
            EnvironmentalContext::FocusedLearning
        );
        assert_eq!(
            EnvironmentalContext::for_hour(17),
            EnvironmentalContext::FocusedLearning
        );
        assert_eq!(
            EnvironmentalContext::for_hour(18),
            EnvironmentalContext::HighActivity
        );
        assert_eq!(
            EnvironmentalContext::for_hour(22),
            EnvironmentalContext::HighActivity
        );
        assert_eq!(
            EnvironmentalContext::for_hour(23),
            EnvironmentalContext::RestPeriod
        );
        assert_eq!(
            EnvironmentalContext::for_hour(0),
            EnvironmentalContext::RestPeriod
        );
        assert_eq!(
            EnvironmentalContext::for_hour(8),
            EnvironmentalContext::RestPeriod
        );
    }

    #[test]
    fn test_multipliers() {
        assert_eq!(
            EnvironmentalContext::FocusedLearning.decay_multiplier(),
            0.5
        );
        assert_eq!(EnvironmentalContext::LowActivity.decay_multiplier(), 1.0);
    }
}
