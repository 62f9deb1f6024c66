//! Fixed-interval time grid covering one local calendar day.
//!
//! Slots advance in elapsed time from the first instant of the local day to
//! the first instant of the next one. A spring-forward day is therefore one
//! hour short and a fall-back day one hour long, and no instant is ever
//! produced twice.

use crate::errors::GridError;
use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

pub const MINUTES_PER_DAY: u32 = 1440;

#[derive(Debug, Clone)]
pub struct TimeGrid {
    date: NaiveDate,
    interval_minutes: u32,
    tz: Tz,
    slots: Vec<DateTime<Utc>>,
}

impl TimeGrid {
    pub fn for_day(date: NaiveDate, interval_minutes: u32, tz: Tz) -> Result<Self, GridError> {
        if interval_minutes == 0 || MINUTES_PER_DAY % interval_minutes != 0 {
            return Err(GridError::InvalidInterval(interval_minutes));
        }

        let start = local_day_start(date, tz)?;
        let next_day = date.succ_opt().ok_or_else(|| GridError::UnrepresentableDay {
            date,
            tz: tz.name().to_string(),
        })?;
        let end = local_day_start(next_day, tz)?;

        let step = Duration::minutes(i64::from(interval_minutes));
        let mut slots = Vec::with_capacity((MINUTES_PER_DAY / interval_minutes) as usize);
        let mut slot = start;
        while slot < end {
            slots.push(slot);
            slot += step;
        }

        Ok(Self {
            date,
            interval_minutes,
            tz,
            slots,
        })
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn interval_minutes(&self) -> u32 {
        self.interval_minutes
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[DateTime<Utc>] {
        &self.slots
    }

    /// Local civil time of every slot, in slot order.
    ///
    /// On a fall-back day the repeated hour shows up twice here even though
    /// the underlying instants differ.
    pub fn local_times(&self) -> Vec<NaiveDateTime> {
        self.slots
            .iter()
            .map(|slot| slot.with_timezone(&self.tz).naive_local())
            .collect()
    }

    /// Index of the first slot at or after `instant`, or `None` when the
    /// instant is before the first slot or after the last one.
    pub fn slot_for(&self, instant: DateTime<Utc>) -> Option<usize> {
        let first = *self.slots.first()?;
        if instant < first {
            return None;
        }
        let idx = self.slots.partition_point(|slot| *slot < instant);
        (idx < self.slots.len()).then_some(idx)
    }
}

/// First existing local instant of `date`. Zones that skip midnight start the
/// day at the first minute that exists.
fn local_day_start(date: NaiveDate, tz: Tz) -> Result<DateTime<Utc>, GridError> {
    let unrepresentable = || GridError::UnrepresentableDay {
        date,
        tz: tz.name().to_string(),
    };
    let midnight = date.and_hms_opt(0, 0, 0).ok_or_else(unrepresentable)?;

    for minute in 0..i64::from(MINUTES_PER_DAY) {
        let candidate = midnight + Duration::minutes(minute);
        match tz.from_local_datetime(&candidate) {
            LocalResult::Single(t) => return Ok(t.with_timezone(&Utc)),
            LocalResult::Ambiguous(earliest, _) => return Ok(earliest.with_timezone(&Utc)),
            LocalResult::None => continue,
        }
    }
    Err(unrepresentable())
}
