/*!
 # Brightness schedules

 This module defines a single time-range-to-brightness mapping and the
 bounded, insertion-ordered set of them a user edits.
*/

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{Error, Result};

/// Maximum number of schedules a set may hold
pub const MAX_SCHEDULES: usize = 5;

/// Brightness given to a freshly added schedule
pub const DEFAULT_BRIGHTNESS: u8 = 50;

/// One interval during which the brightness is driven to a fixed value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// Interval start
    #[serde(default, with = "timestamp")]
    pub from: Option<DateTime<Utc>>,
    /// Interval end
    #[serde(default, with = "timestamp")]
    pub to: Option<DateTime<Utc>>,
    /// Target brightness (0-100)
    pub brightness: u8,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            from: None,
            to: None,
            brightness: DEFAULT_BRIGHTNESS,
        }
    }
}

impl Schedule {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>, brightness: u8) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
            brightness,
        }
    }

    /// Both endpoints, if both are set
    pub fn bounds(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match (self.from, self.to) {
            (Some(from), Some(to)) => Some((from, to)),
            _ => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.bounds().is_some()
    }

    /// Half-open overlap test. Incomplete schedules never overlap anything.
    pub fn overlaps(&self, other: &Schedule) -> bool {
        match (self.bounds(), other.bounds()) {
            (Some((a_from, a_to)), Some((b_from, b_to))) => a_from < b_to && a_to > b_from,
            _ => false,
        }
    }

    /// Zero the seconds and sub-second part of both endpoints
    pub fn truncate_to_minute(&mut self) {
        self.from = self.from.map(truncate);
        self.to = self.to.map(truncate);
    }
}

fn truncate(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_second(0)
        .and_then(|ts| ts.with_nanosecond(0))
        .unwrap_or(ts)
}

/// Insertion-ordered set of at most [`MAX_SCHEDULES`] schedules
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScheduleSet {
    schedules: Vec<Schedule>,
}

impl ScheduleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from stored data, keeping only the first
    /// [`MAX_SCHEDULES`] entries.
    pub fn from_vec(mut schedules: Vec<Schedule>) -> Self {
        if schedules.len() > MAX_SCHEDULES {
            warn!(
                "Dropping {} schedules beyond the limit of {}",
                schedules.len() - MAX_SCHEDULES,
                MAX_SCHEDULES
            );
            schedules.truncate(MAX_SCHEDULES);
        }
        Self { schedules }
    }

    /// Appends an empty schedule and returns its index.
    ///
    /// Fails with [`Error::LimitReached`] once the set is full; the set is
    /// left untouched in that case.
    pub fn add(&mut self) -> Result<usize> {
        self.push(Schedule::default())
    }

    /// Appends the given schedule, subject to the same cap as [`add`](Self::add)
    pub fn push(&mut self, schedule: Schedule) -> Result<usize> {
        if self.schedules.len() >= MAX_SCHEDULES {
            warn!("Schedule limit of {} reached", MAX_SCHEDULES);
            return Err(Error::LimitReached(MAX_SCHEDULES));
        }
        self.schedules.push(schedule);
        debug!("Added schedule at index {}", self.schedules.len() - 1);
        Ok(self.schedules.len() - 1)
    }

    pub fn remove(&mut self, index: usize) -> Result<Schedule> {
        if index >= self.schedules.len() {
            return Err(Error::IndexOutOfRange(index));
        }
        Ok(self.schedules.remove(index))
    }

    pub fn clear(&mut self) {
        self.schedules.clear();
    }

    pub fn get(&self, index: usize) -> Option<&Schedule> {
        self.schedules.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Schedule> {
        self.schedules.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.schedules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schedules.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Schedule> {
        self.schedules.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Schedule> {
        self.schedules.iter_mut()
    }

    pub fn as_slice(&self) -> &[Schedule] {
        &self.schedules
    }

    pub fn to_vec(&self) -> Vec<Schedule> {
        self.schedules.clone()
    }
}

impl<'a> IntoIterator for &'a ScheduleSet {
    type Item = &'a Schedule;
    type IntoIter = std::slice::Iter<'a, Schedule>;

    fn into_iter(self) -> Self::IntoIter {
        self.schedules.iter()
    }
}

/// Wire encoding for optional timestamps: `YYYY-MM-DDTHH:MM:SS.mmmZ` on write,
/// any RFC 3339 string on read.
pub mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn format(ts: &DateTime<Utc>) -> String {
        ts.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn parse(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        DateTime::parse_from_rfc3339(s).map(|ts| ts.with_timezone(&Utc))
    }

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_some(&format(ts)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(s) => parse(&s).map(Some).map_err(de::Error::custom),
            None => Ok(None),
        }
    }
}
