//! Plages horaires de surveillance.
//!
//! Un équipement hors plage n'est pas pingé : il passe en `OutOfSchedule`
//! sans latence et ne déclenche aucune alerte.

use crate::models::Schedule;
use chrono::{Datelike, Timelike, Weekday};

/// Indique si l'équipement doit être sondé à l'instant `now` (heure locale).
pub fn is_in_scope<T: Datelike + Timelike>(schedule: &Schedule, now: &T) -> bool {
    match schedule {
        Schedule::AlwaysOn => true,
        Schedule::WorkingHours { weekday, weekend } => {
            let rule = if is_weekend(now.weekday()) { weekend } else { weekday };
            rule.map(|range| range.contains(now.hour())).unwrap_or(false)
        }
    }
}

fn is_weekend(day: Weekday) -> bool {
    matches!(day, Weekday::Sat | Weekday::Sun)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HourRange;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 30, 0)
            .unwrap()
    }

    fn weekday_only() -> Schedule {
        Schedule::WorkingHours {
            weekday: Some(HourRange { start: 7, end: 18 }),
            weekend: None,
        }
    }

    #[test]
    fn always_on_ignores_clock() {
        for day in 1..=7 {
            for hour in 0..24 {
                assert!(is_in_scope(&Schedule::AlwaysOn, &at(2024, 1, day, hour)));
            }
        }
    }

    #[test]
    fn weekday_rule_on_tuesday() {
        // 2024-01-02 est un mardi
        assert!(is_in_scope(&weekday_only(), &at(2024, 1, 2, 10)));
        assert!(!is_in_scope(&weekday_only(), &at(2024, 1, 2, 20)));
        assert!(!is_in_scope(&weekday_only(), &at(2024, 1, 2, 6)));
    }

    #[test]
    fn end_hour_is_exclusive() {
        assert!(is_in_scope(&weekday_only(), &at(2024, 1, 2, 17)));
        assert!(!is_in_scope(&weekday_only(), &at(2024, 1, 2, 18)));
    }

    #[test]
    fn weekday_only_rule_never_matches_saturday() {
        for hour in 0..24 {
            assert!(!is_in_scope(&weekday_only(), &at(2024, 1, 6, hour)));
        }
    }

    #[test]
    fn weekend_rule_applies_on_sunday() {
        let schedule = Schedule::WorkingHours {
            weekday: None,
            weekend: Some(HourRange::WEEKEND_DEFAULT),
        };
        // 2024-01-07 est un dimanche
        assert!(is_in_scope(&schedule, &at(2024, 1, 7, 9)));
        assert!(!is_in_scope(&schedule, &at(2024, 1, 7, 16)));
        assert!(!is_in_scope(&schedule, &at(2024, 1, 8, 10)));
    }

    #[test]
    fn no_rule_at_all_is_never_in_scope() {
        let schedule = Schedule::WorkingHours { weekday: None, weekend: None };
        assert!(!is_in_scope(&schedule, &at(2024, 1, 2, 10)));
    }
}
