use std::ops::Range;

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::{
    errors::{Error, Result},
    range::index_range_of,
};

pub const SECONDS_PER_DAY: i64 = 86_400;

/// A regularly spaced time coordinate, in seconds since the Unix epoch.
///
#[derive(Clone, Debug, PartialEq)]
pub struct TimeRange {
    pub start: i64,
    pub step: i64,
    pub steps: usize,
}

impl TimeRange {
    pub fn new(start: i64, step: i64, steps: usize) -> Self {
        Self { start, step, steps }
    }

    /// Daily time steps starting at midnight UTC on `first`
    pub fn daily(first: NaiveDate, days: usize) -> Self {
        Self::new(timestamp(first), SECONDS_PER_DAY, days)
    }

    pub fn get(&self, index: usize) -> i64 {
        self.start + (index as i64) * self.step
    }

    pub fn values(&self) -> Vec<i64> {
        (0..self.steps).map(|index| self.get(index)).collect()
    }

    pub fn len(&self) -> usize {
        self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps == 0
    }
}

/// Midnight UTC on `date`, in seconds since the epoch
pub fn timestamp(date: NaiveDate) -> i64 {
    date.and_time(chrono::NaiveTime::MIN).and_utc().timestamp()
}

pub fn datetime(timestamp: i64) -> Result<NaiveDateTime> {
    DateTime::from_timestamp(timestamp, 0)
        .map(|datetime| datetime.naive_utc())
        .ok_or(Error::Time(timestamp))
}

pub fn date(timestamp: i64) -> Result<NaiveDate> {
    Ok(datetime(timestamp)?.date())
}

/// Indexes of the time stamps falling on any day from `first` through `last`, inclusive.
///
pub fn date_index_range(timestamps: &[i64], first: NaiveDate, last: NaiveDate) -> Range<usize> {
    let (first, last) = if first > last {
        (last, first)
    } else {
        (first, last)
    };
    let start = timestamp(first);
    let end = timestamp(last) + SECONDS_PER_DAY;

    index_range_of(timestamps.iter(), |&stamp| start <= stamp && stamp < end)
}
