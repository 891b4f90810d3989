use crate::models::{MetricFlag, NormalRange};

/// Classify `value` against its reference interval.
///
/// Below `low` is LOW. Above `high` is HIGH, or CRITICAL once the value
/// exceeds `high × critical_multiplier`. Anything else, including a missing
/// range, is NORMAL.
pub fn compute_flag(value: f64, range: Option<&NormalRange>, critical_multiplier: f64) -> MetricFlag {
    let Some(range) = range else {
        return MetricFlag::Normal;
    };

    if let Some(low) = range.low {
        if value < low {
            return MetricFlag::Low;
        }
    }
    if let Some(high) = range.high {
        if value > high {
            if high > 0.0 && value > high * critical_multiplier {
                return MetricFlag::Critical;
            }
            return MetricFlag::High;
        }
    }
    MetricFlag::Normal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_range_is_normal() {
        assert_eq!(compute_flag(9999.0, None, 2.0), MetricFlag::Normal);
    }

    #[test]
    fn bounded_range() {
        let range = NormalRange::between(70.0, 100.0);
        assert_eq!(compute_flag(69.9, Some(&range), 2.5), MetricFlag::Low);
        assert_eq!(compute_flag(70.0, Some(&range), 2.5), MetricFlag::Normal);
        assert_eq!(compute_flag(100.0, Some(&range), 2.5), MetricFlag::Normal);
        assert_eq!(compute_flag(180.0, Some(&range), 2.5), MetricFlag::High);
        assert_eq!(compute_flag(250.0, Some(&range), 2.5), MetricFlag::High);
        assert_eq!(compute_flag(250.1, Some(&range), 2.5), MetricFlag::Critical);
    }

    #[test]
    fn open_ranges() {
        let below = NormalRange::below(200.0);
        assert_eq!(compute_flag(5.0, Some(&below), 2.0), MetricFlag::Normal);
        assert_eq!(compute_flag(240.0, Some(&below), 2.0), MetricFlag::High);
        assert_eq!(compute_flag(401.0, Some(&below), 2.0), MetricFlag::Critical);

        let above = NormalRange::above(40.0);
        assert_eq!(compute_flag(35.0, Some(&above), 2.0), MetricFlag::Low);
        assert_eq!(compute_flag(400.0, Some(&above), 2.0), MetricFlag::Normal);
    }

    #[test]
    fn zero_upper_bound_never_critical() {
        let range = NormalRange::between(0.0, 0.0);
        assert_eq!(compute_flag(3.0, Some(&range), 2.0), MetricFlag::High);
    }

    #[test]
    fn flag_consistent_with_range_everywhere() {
        let range = NormalRange::between(3.5, 5.1);
        let mut value = 0.0;
        while value < 20.0 {
            let flag = compute_flag(value, Some(&range), 1.2);
            if value < 3.5 {
                assert_eq!(flag, MetricFlag::Low, "{value}");
            } else if value > 5.1 {
                assert!(matches!(flag, MetricFlag::High | MetricFlag::Critical), "{value}");
            } else {
                assert_eq!(flag, MetricFlag::Normal, "{value}");
            }
            value += 0.05;
        }
    }
}
