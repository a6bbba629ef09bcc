//! Asset universes: which assets exist on which dates.

use chrono::NaiveDate;
use ndarray::Array2;
use std::collections::BTreeMap;
use std::fmt;
use strata_terms::Sid;

/// Source of the root mask.
pub trait AssetUniverse: fmt::Debug + Send + Sync {
    /// Every known asset, ascending.
    fn sids(&self) -> Vec<Sid>;

    /// `(dates, sids)` mask, true where the asset is listed on the date.
    fn lifetimes(&self, dates: &[NaiveDate], sids: &[Sid]) -> Array2<bool>;
}

/// Universe from listing intervals.
///
/// Each asset may have several `start..=end` intervals; it exists on a date
/// covered by any of them.
#[derive(Debug, Clone, Default)]
pub struct AssetLifetimes {
    intervals: BTreeMap<Sid, Vec<(NaiveDate, NaiveDate)>>,
}

impl AssetLifetimes {
    /// Universe from `(sid, start, end)` records.
    pub fn new(records: impl IntoIterator<Item = (Sid, NaiveDate, NaiveDate)>) -> Self {
        let mut lifetimes = Self::default();
        for (sid, start, end) in records {
            lifetimes.add(sid, start, end);
        }
        lifetimes
    }

    /// Assets that exist on every date.
    pub fn always(sids: impl IntoIterator<Item = Sid>) -> Self {
        Self::new(sids.into_iter().map(|sid| (sid, NaiveDate::MIN, NaiveDate::MAX)))
    }

    /// Add a listing interval.
    pub fn add(&mut self, sid: Sid, start: NaiveDate, end: NaiveDate) {
        self.intervals.entry(sid).or_default().push((start, end));
    }

    /// True if `sid` exists on `date`.
    pub fn is_alive(&self, sid: Sid, date: NaiveDate) -> bool {
        self.intervals
            .get(&sid)
            .is_some_and(|spans| spans.iter().any(|(start, end)| *start <= date && date <= *end))
    }
}

impl AssetUniverse for AssetLifetimes {
    fn sids(&self) -> Vec<Sid> {
        self.intervals.keys().copied().collect()
    }

    fn lifetimes(&self, dates: &[NaiveDate], sids: &[Sid]) -> Array2<bool> {
        Array2::from_shape_fn((dates.len(), sids.len()), |(r, c)| {
            self.is_alive(sids[c], dates[r])
        })
    }
}
