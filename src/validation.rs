/*!
 # Schedule validation

 Keeps a schedule set internally consistent before it is committed.

 Interactive edits are forgiving: a reversed pair of times is swapped
 rather than rejected. Commits are strict: every schedule must be complete,
 start strictly before it ends, and not overlap any other schedule.
*/

use chrono::Timelike;
use tracing::{debug, instrument, warn};

use crate::schedule::{Schedule, ScheduleSet};
use crate::{Error, Result};

/// Which end of a schedule a time picker is editing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    From,
    To,
}

/// Swaps the endpoints when both are set and `from > to`.
///
/// Returns whether a swap happened.
pub fn normalize(schedule: &mut Schedule) -> bool {
    match schedule.bounds() {
        Some((from, to)) if from > to => {
            schedule.from = Some(to);
            schedule.to = Some(from);
            warn!("Swapped times because 'from' was after 'to'");
            true
        }
        _ => false,
    }
}

/// First other complete schedule overlapping the one at `index`
pub fn find_overlap(set: &ScheduleSet, index: usize) -> Option<usize> {
    let schedule = set.get(index)?;
    set.iter()
        .enumerate()
        .find(|(other_index, other)| *other_index != index && schedule.overlaps(other))
        .map(|(other_index, _)| other_index)
}

/// Whether the schedule at `index` overlaps any other complete schedule
pub fn check_overlap(set: &ScheduleSet, index: usize) -> bool {
    find_overlap(set, index).is_some()
}

/// Full commit-time check. The first failure found aborts the pass.
#[instrument(skip(set), fields(count = set.len()))]
pub fn validate_all(set: &ScheduleSet) -> Result<()> {
    for (index, schedule) in set.iter().enumerate() {
        let Some((from, to)) = schedule.bounds() else {
            return Err(Error::IncompleteSchedule(index));
        };
        if from >= to {
            return Err(Error::InvalidOrdering(index));
        }
        if let Some(other) = find_overlap(set, index) {
            return Err(Error::OverlapConflict(index, other));
        }
    }
    debug!("All schedules are valid");
    Ok(())
}

/// Hours a picker should grey out for `endpoint`, given the other endpoint.
///
/// Advisory only; [`validate_all`] remains the authoritative check.
pub fn disabled_hours(schedule: &Schedule, endpoint: Endpoint) -> Vec<u32> {
    let Some((from, to)) = schedule.bounds() else {
        return Vec::new();
    };
    match endpoint {
        Endpoint::From => (to.hour() + 1..24).collect(),
        Endpoint::To => (0..from.hour()).collect(),
    }
}

/// Minutes a picker should grey out for `endpoint` within `hour`.
pub fn disabled_minutes(schedule: &Schedule, endpoint: Endpoint, hour: u32) -> Vec<u32> {
    let Some((from, to)) = schedule.bounds() else {
        return Vec::new();
    };
    let other = match endpoint {
        Endpoint::From => to,
        Endpoint::To => from,
    };
    if hour != other.hour() {
        return Vec::new();
    }
    match endpoint {
        Endpoint::From => (other.minute()..60).collect(),
        Endpoint::To => (0..=other.minute()).collect(),
    }
}
