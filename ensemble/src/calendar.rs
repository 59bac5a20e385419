//! Calendar arithmetic for resampling and grouping along the time dimension.
//!
use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{Datelike, Duration, NaiveDate};

use crate::{
    errors::{Error, Result},
    time,
};

/// Meteorological seasons
///
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Season {
    DJF,
    MAM,
    JJA,
    SON,
}

impl Season {
    /// The order seasons are presented in: winter, spring, summer, autumn.
    pub const CANONICAL: [Season; 4] = [Season::DJF, Season::MAM, Season::JJA, Season::SON];

    pub fn of_month(month: u32) -> Self {
        match month {
            12 | 1 | 2 => Season::DJF,
            3..=5 => Season::MAM,
            6..=8 => Season::JJA,
            _ => Season::SON,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Season::DJF => "DJF",
            Season::MAM => "MAM",
            Season::JJA => "JJA",
            Season::SON => "SON",
        }
    }

    pub fn canonical_labels() -> Vec<String> {
        Self::CANONICAL.iter().map(|season| season.label().to_string()).collect()
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A derived attribute of a time stamp that observations can be grouped by.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeAttribute {
    Season,
    Month,
    Year,
}

impl TimeAttribute {
    /// Name of the dimension produced by grouping on this attribute
    pub fn name(&self) -> &'static str {
        match self {
            TimeAttribute::Season => "season",
            TimeAttribute::Month => "month",
            TimeAttribute::Year => "year",
        }
    }

    /// Group label for a date. Months are zero padded so labels sort chronologically.
    pub fn label(&self, date: NaiveDate) -> String {
        match self {
            TimeAttribute::Season => Season::of_month(date.month()).label().to_string(),
            TimeAttribute::Month => format!("{:02}", date.month()),
            TimeAttribute::Year => date.year().to_string(),
        }
    }

    /// Partition time stamps into groups keyed by label, in sorted label order.
    pub fn groups(&self, timestamps: &[i64]) -> Result<Vec<(String, Vec<usize>)>> {
        let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (index, &stamp) in timestamps.iter().enumerate() {
            groups
                .entry(self.label(time::date(stamp)?))
                .or_default()
                .push(index);
        }

        Ok(groups.into_iter().collect())
    }
}

/// A calendar resampling frequency.
///
/// Parsed from the usual tokens: `D`, `MS`, `QS`, `QS-DEC`, `AS`/`YS`, `AS-JUL`/`YS-JUL`. Bins are
/// labeled by the date they start on.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Frequency {
    Day,
    MonthStart,

    /// Quarters, the first of which starts in `anchor` (1 = January)
    QuarterStart { anchor: u32 },

    /// Years starting in `anchor` (1 = January)
    YearStart { anchor: u32 },
}

const MONTHS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

fn parse_month(token: &str) -> Option<u32> {
    MONTHS
        .iter()
        .position(|&month| month == token)
        .map(|index| index as u32 + 1)
}

impl FromStr for Frequency {
    type Err = Error;

    fn from_str(token: &str) -> Result<Self> {
        let upper = token.trim().to_ascii_uppercase();
        let (base, anchor) = match upper.split_once('-') {
            Some((base, month)) => {
                let month = parse_month(month).ok_or_else(|| Error::Frequency(token.to_string()))?;
                (base, Some(month))
            }
            None => (upper.as_str(), None),
        };

        match (base, anchor) {
            ("D", None) => Ok(Frequency::Day),
            ("MS", None) => Ok(Frequency::MonthStart),
            ("QS", anchor) => Ok(Frequency::QuarterStart {
                anchor: anchor.unwrap_or(1),
            }),
            ("AS" | "YS", anchor) => Ok(Frequency::YearStart {
                anchor: anchor.unwrap_or(1),
            }),
            _ => Err(Error::Frequency(token.to_string())),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frequency::Day => f.write_str("D"),
            Frequency::MonthStart => f.write_str("MS"),
            Frequency::QuarterStart { anchor } => write!(f, "QS-{}", AnchorName(*anchor)),
            Frequency::YearStart { anchor } => write!(f, "AS-{}", AnchorName(*anchor)),
        }
    }
}

/// Three letter name of a month numbered from 1, or the bare number when out of range
struct AnchorName(u32);

impl fmt::Display for AnchorName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match month_name(self.0) {
            Some(name) => f.write_str(name),
            None => write!(f, "{}", self.0),
        }
    }
}

fn month_name(month: u32) -> Option<&'static str> {
    (month as usize)
        .checked_sub(1)
        .and_then(|index| MONTHS.get(index))
        .copied()
}

/// Months since year 0, January = 0
fn month_index(date: NaiveDate) -> i64 {
    date.year() as i64 * 12 + date.month0() as i64
}

fn from_month_index(index: i64) -> Result<NaiveDate> {
    let year = index.div_euclid(12) as i32;
    let month = index.rem_euclid(12) as u32 + 1;
    NaiveDate::from_ymd_opt(year, month, 1).ok_or(Error::Time(index))
}

impl Frequency {
    /// Length of a bin and the month it is anchored on, both in months
    fn months(&self) -> Result<Option<(i64, i64)>> {
        let anchored = |period: i64, anchor: u32| match month_name(anchor) {
            Some(_) => Ok(Some((period, anchor as i64 - 1))),
            None => Err(Error::Frequency(self.to_string())),
        };
        match self {
            Frequency::Day => Ok(None),
            Frequency::MonthStart => Ok(Some((1, 0))),
            Frequency::QuarterStart { anchor } => anchored(3, *anchor),
            Frequency::YearStart { anchor } => anchored(12, *anchor),
        }
    }

    /// First day of the bin containing `date`
    pub fn bin_start(&self, date: NaiveDate) -> Result<NaiveDate> {
        match self.months()? {
            None => Ok(date),
            Some((period, anchor)) => {
                let index = month_index(date);
                from_month_index(index - (index - anchor).rem_euclid(period))
            }
        }
    }

    /// First day of the bin following the one that starts on `start`
    pub fn next_bin(&self, start: NaiveDate) -> Result<NaiveDate> {
        match self.months()? {
            None => Ok(start + Duration::days(1)),
            Some((period, _)) => from_month_index(month_index(start) + period),
        }
    }

    /// Partition time stamps into consecutive bins.
    ///
    /// Returns the bin start time stamps and, for each bin, the indexes of the time stamps it
    /// holds. Every bin from the first populated one to the last is present, even if empty.
    ///
    pub fn bins(&self, timestamps: &[i64]) -> Result<(Vec<i64>, Vec<Vec<usize>>)> {
        let mut starts = vec![];
        let mut members: Vec<Vec<usize>> = vec![];
        let mut last: Option<NaiveDate> = None;
        for (index, &stamp) in timestamps.iter().enumerate() {
            let start = self.bin_start(time::date(stamp)?)?;
            match last {
                Some(current) if current == start => {}
                Some(current) if current < start => {
                    let mut next = self.next_bin(current)?;
                    while next < start {
                        starts.push(time::timestamp(next));
                        members.push(vec![]);
                        next = self.next_bin(next)?;
                    }
                    starts.push(time::timestamp(start));
                    members.push(vec![]);
                }
                Some(_) => {
                    return Err(Error::Shape(String::from(
                        "time coordinate must increase to be resampled",
                    )))
                }
                None => {
                    starts.push(time::timestamp(start));
                    members.push(vec![]);
                }
            }
            if let Some(bin) = members.last_mut() {
                bin.push(index);
            }
            last = Some(start);
        }

        Ok((starts, members))
    }
}
