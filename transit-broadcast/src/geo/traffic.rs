//! Time-of-day congestion model.

use crate::config::TrafficModel;
use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};

/// Returns the congestion multiplier in (0,1] for the given instant.
///
/// Weekday rush windows (07-09 and 16-19) slow traffic the most, weekday
/// midday less so, weekend daytime least, and everything else runs at the
/// off-peak factor. Pure given its inputs; callers supply the instant from an
/// injected clock.
pub fn traffic_factor(at: DateTime<Utc>, model: &TrafficModel) -> f64 {
    let hour = at.hour();
    let weekend = matches!(at.weekday(), Weekday::Sat | Weekday::Sun);

    if weekend {
        if (8..=20).contains(&hour) {
            model.weekend_factor
        } else {
            model.offpeak_factor
        }
    } else if (7..=9).contains(&hour) || (16..=19).contains(&hour) {
        model.rush_hour_factor
    } else if (10..=15).contains(&hour) {
        model.midday_factor
    } else {
        model.offpeak_factor
    }
}

#[cfg(test)]
mod tests {
    use super::traffic_factor;
    use crate::config::TrafficModel;
    use chrono::{TimeZone, Utc};

    fn at(day: u32, hour: u32) -> chrono::DateTime<Utc> {
        // 2026-03-02 is a Monday.
        Utc.with_ymd_and_hms(2026, 3, day, hour, 15, 0).unwrap()
    }

    #[test]
    fn weekday_rush_hours_slow_traffic_most() {
        let model = TrafficModel::default();
        assert_eq!(traffic_factor(at(2, 8), &model), model.rush_hour_factor);
        assert_eq!(traffic_factor(at(2, 17), &model), model.rush_hour_factor);
    }

    #[test]
    fn weekday_midday_uses_midday_factor() {
        let model = TrafficModel::default();
        assert_eq!(traffic_factor(at(2, 12), &model), model.midday_factor);
    }

    #[test]
    fn weekend_daytime_uses_weekend_factor() {
        let model = TrafficModel::default();
        // 2026-03-07 is a Saturday.
        assert_eq!(traffic_factor(at(7, 12), &model), model.weekend_factor);
    }

    #[test]
    fn night_runs_at_offpeak_factor() {
        let model = TrafficModel::default();
        assert_eq!(traffic_factor(at(2, 3), &model), model.offpeak_factor);
        assert_eq!(traffic_factor(at(7, 2), &model), model.offpeak_factor);
    }

    #[test]
    fn factor_is_deterministic_and_in_range() {
        let model = TrafficModel::default();
        for hour in 0..24 {
            let factor = traffic_factor(at(2, hour), &model);
            assert_eq!(factor, traffic_factor(at(2, hour), &model));
            assert!(factor > 0.0 && factor <= 1.0);
        }
    }
}
