//! Trading calendars.

use chrono::{Datelike, NaiveDate, Weekday};
use std::sync::Arc;

/// A named, sorted list of trading sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradingCalendar {
    name: String,
    sessions: Arc<[NaiveDate]>,
}

impl TradingCalendar {
    /// Create a calendar; sessions are sorted and deduplicated.
    pub fn new(name: impl Into<String>, mut sessions: Vec<NaiveDate>) -> Self {
        sessions.sort_unstable();
        sessions.dedup();
        Self {
            name: name.into(),
            sessions: sessions.into(),
        }
    }

    /// Calendar of every Monday-Friday between `start` and `end` inclusive.
    pub fn weekdays(name: impl Into<String>, start: NaiveDate, end: NaiveDate) -> Self {
        let sessions = start
            .iter_days()
            .take_while(|day| *day <= end)
            .filter(|day| !matches!(day.weekday(), Weekday::Sat | Weekday::Sun))
            .collect();
        Self::new(name, sessions)
    }

    /// Calendar name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All sessions, ascending.
    pub fn sessions(&self) -> &[NaiveDate] {
        &self.sessions
    }

    /// Number of sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True if the calendar has no sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// First session.
    pub fn first_session(&self) -> Option<NaiveDate> {
        self.sessions.first().copied()
    }

    /// Last session.
    pub fn last_session(&self) -> Option<NaiveDate> {
        self.sessions.last().copied()
    }

    /// True if `date` is a session.
    pub fn is_session(&self, date: NaiveDate) -> bool {
        self.session_index(date).is_some()
    }

    /// Index of an exact session.
    pub fn session_index(&self, date: NaiveDate) -> Option<usize> {
        self.sessions.binary_search(&date).ok()
    }

    /// Index of the first session on or after `date`.
    pub fn session_index_on_or_after(&self, date: NaiveDate) -> Option<usize> {
        let idx = self.sessions.partition_point(|s| *s < date);
        (idx < self.sessions.len()).then_some(idx)
    }

    /// Index of the last session on or before `date`.
    pub fn session_index_on_or_before(&self, date: NaiveDate) -> Option<usize> {
        self.sessions.partition_point(|s| *s <= date).checked_sub(1)
    }

    /// Sessions between `start` and `end` inclusive.
    pub fn sessions_in_range(&self, start: NaiveDate, end: NaiveDate) -> &[NaiveDate] {
        let lo = self.sessions.partition_point(|s| *s < start);
        let hi = self.sessions.partition_point(|s| *s <= end);
        if lo >= hi { &[] } else { &self.sessions[lo..hi] }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_weekdays_skip_weekends() {
        // 2024-01-05 is a Friday
        let cal = TradingCalendar::weekdays("XTST", d(2024, 1, 5), d(2024, 1, 9));
        assert_eq!(cal.sessions(), &[d(2024, 1, 5), d(2024, 1, 8), d(2024, 1, 9)]);
        assert_eq!(cal.name(), "XTST");
    }

    #[test]
    fn test_session_lookups() {
        let cal = TradingCalendar::weekdays("XTST", d(2024, 1, 1), d(2024, 1, 31));
        let saturday = d(2024, 1, 6);
        assert!(!cal.is_session(saturday));
        assert_eq!(cal.sessions()[cal.session_index_on_or_after(saturday).unwrap()], d(2024, 1, 8));
        assert_eq!(cal.sessions()[cal.session_index_on_or_before(saturday).unwrap()], d(2024, 1, 5));
        assert_eq!(cal.session_index_on_or_before(d(2023, 12, 31)), None);
        assert_eq!(cal.session_index_on_or_after(d(2024, 2, 1)), None);
        assert_eq!(cal.sessions_in_range(d(2024, 1, 6), d(2024, 1, 9)).len(), 2);
        assert!(cal.sessions_in_range(d(2024, 1, 9), d(2024, 1, 8)).is_empty());
    }

    #[test]
    fn test_new_sorts_and_dedups() {
        let cal = TradingCalendar::new("X", vec![d(2024, 1, 3), d(2024, 1, 2), d(2024, 1, 3)]);
        assert_eq!(cal.len(), 2);
        assert_eq!(cal.first_session(), Some(d(2024, 1, 2)));
    }
}
