//! Time-of-day buckets used to bias synthetic queue statistics

use serde::Serialize;

/// Uniform draw `base + U[0, spread)`; a zero spread yields `base`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinuteRange {
    pub base: f64,
    pub spread: f64,
}

/// Uniform integer draw in `base..base + spread`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountRange {
    pub base: u32,
    pub spread: u32,
}

/// Draw bounds for one daypart
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaitProfile {
    pub cashier: MinuteRange,
    pub turnstile: MinuteRange,
    pub contributors: CountRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Daypart {
    LunchPeak,
    DinnerPeak,
    OffPeak,
}

impl Daypart {
    /// Classify a local hour (0-23)
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            11..=13 => Daypart::LunchPeak,
            17..=19 => Daypart::DinnerPeak,
            _ => Daypart::OffPeak,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Daypart::LunchPeak => "lunch_peak",
            Daypart::DinnerPeak => "dinner_peak",
            Daypart::OffPeak => "off_peak",
        }
    }

    pub fn profile(&self) -> WaitProfile {
        match self {
            Daypart::LunchPeak => WaitProfile {
                cashier: MinuteRange { base: 15.0, spread: 10.0 },
                turnstile: MinuteRange { base: 5.0, spread: 5.0 },
                contributors: CountRange { base: 80, spread: 20 },
            },
            Daypart::DinnerPeak => WaitProfile {
                cashier: MinuteRange { base: 10.0, spread: 5.0 },
                turnstile: MinuteRange { base: 3.0, spread: 3.0 },
                contributors: CountRange { base: 50, spread: 20 },
            },
            Daypart::OffPeak => WaitProfile {
                cashier: MinuteRange { base: 2.0, spread: 0.0 },
                turnstile: MinuteRange { base: 1.0, spread: 0.0 },
                contributors: CountRange { base: 5, spread: 20 },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_hour_boundaries() {
        assert_eq!(Daypart::from_hour(10), Daypart::OffPeak);
        assert_eq!(Daypart::from_hour(11), Daypart::LunchPeak);
        assert_eq!(Daypart::from_hour(13), Daypart::LunchPeak);
        assert_eq!(Daypart::from_hour(14), Daypart::OffPeak);
        assert_eq!(Daypart::from_hour(17), Daypart::DinnerPeak);
        assert_eq!(Daypart::from_hour(19), Daypart::DinnerPeak);
        assert_eq!(Daypart::from_hour(20), Daypart::OffPeak);
        assert_eq!(Daypart::from_hour(0), Daypart::OffPeak);
    }

    #[test]
    fn test_peak_profiles_have_more_contributors() {
        let off = Daypart::OffPeak.profile();
        let lunch = Daypart::LunchPeak.profile();
        assert!(lunch.contributors.base > off.contributors.base + off.contributors.spread);
        assert!(lunch.cashier.base > off.cashier.base);
    }
}
