//! Binary schedule blocks (variable type 64).
//!
//! Two layouts exist: the weekly [`BaseSchedule`] made of time-of-week
//! transitions, and the dated [`ExceptionSchedule`] where every slot is one
//! override interval. Both are decoded from a raw block, and every edit
//! returns a complete new block ready to be written back as a single value.

pub mod base;
pub mod exceptions;

use chrono::{Duration, NaiveDateTime, NaiveTime};
use tracing::debug;

use crate::error::ScheduleError;
use crate::variable::Variable;

pub use base::{BaseSchedule, Transition};
pub use exceptions::ExceptionSchedule;

pub const MINS_PER_DAY: u16 = 1440;
pub const MINS_PER_WEEK: u16 = 7 * MINS_PER_DAY;
pub const SCHEDULE_OFF: u16 = 0;
/// On-state assumed when a block holds no nonzero state yet.
pub const SCHEDULE_ON: u16 = 1;

/// One interval derived from a schedule block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleEvent {
    /// Index of the slot that opens the event.
    pub slot: usize,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub on: bool,
}

/// Local wall-clock time, the usual `now` argument.
pub fn local_now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// Monday 00:00 of the week containing `now`.
pub fn week_start(now: NaiveDateTime) -> NaiveDateTime {
    use chrono::Datelike;

    let days = i64::from(now.weekday().num_days_from_monday());
    NaiveDateTime::new(now.date(), NaiveTime::MIN) - Duration::days(days)
}

fn item_count(len: usize, slot_len: usize) -> Result<usize, ScheduleError> {
    if len % slot_len != 0 {
        return Err(ScheduleError::LengthNotMultiple {
            length: len,
            slot_len,
        });
    }
    Ok(len / slot_len)
}

/// Returns the single nonzero state used across `states`.
fn detect_on_state(states: impl IntoIterator<Item = u16>) -> Result<u16, ScheduleError> {
    let mut on_state = SCHEDULE_OFF;
    for state in states {
        if state == SCHEDULE_OFF {
            continue;
        }
        if on_state == SCHEDULE_OFF {
            on_state = state;
        } else if on_state != state {
            return Err(ScheduleError::MultipleOnStates {
                first: on_state,
                second: state,
            });
        }
    }
    if on_state == SCHEDULE_OFF {
        on_state = SCHEDULE_ON;
    }
    Ok(on_state)
}

/// Which block layout a schedule variable holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleKind {
    Base,
    Exceptions,
}

/// A decoded schedule of either layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    Base(BaseSchedule),
    Exceptions(ExceptionSchedule),
}

impl Schedule {
    /// Decode the raw value of a schedule variable.
    pub fn decode(
        kind: ScheduleKind,
        variable: &Variable,
        raw: &[u8],
    ) -> Result<Self, ScheduleError> {
        let expected = usize::try_from(variable.length).unwrap_or(usize::MAX);
        if raw.len() != expected {
            return Err(ScheduleError::BlockLength {
                expected,
                got: raw.len(),
            });
        }
        debug!(uid = variable.uid, ?kind, len = raw.len(), "decoding schedule block");
        match kind {
            ScheduleKind::Base => BaseSchedule::decode(raw).map(Self::Base),
            ScheduleKind::Exceptions => ExceptionSchedule::decode(raw).map(Self::Exceptions),
        }
    }

    pub fn kind(&self) -> ScheduleKind {
        match self {
            Self::Base(_) => ScheduleKind::Base,
            Self::Exceptions(_) => ScheduleKind::Exceptions,
        }
    }

    pub fn item_count(&self) -> usize {
        match self {
            Self::Base(schedule) => schedule.item_count(),
            Self::Exceptions(schedule) => schedule.item_count(),
        }
    }

    pub fn on_state(&self) -> u16 {
        match self {
            Self::Base(schedule) => schedule.on_state(),
            Self::Exceptions(schedule) => schedule.on_state(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Base(schedule) => schedule.encode(),
            Self::Exceptions(schedule) => schedule.encode(),
        }
    }

    /// Events of the block. Base events are anchored to the week of `now`.
    pub fn to_events(&self, now: NaiveDateTime) -> Vec<ScheduleEvent> {
        match self {
            Self::Base(schedule) => schedule.to_events(now),
            Self::Exceptions(schedule) => schedule.to_events(),
        }
    }

    pub fn add_event(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        on: bool,
        now: NaiveDateTime,
    ) -> Result<Vec<u8>, ScheduleError> {
        match self {
            Self::Base(schedule) => schedule.add_event(start, end, on, now),
            Self::Exceptions(schedule) => schedule.add_event(start, end, on),
        }
    }

    pub fn remove_event(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        on: bool,
        now: NaiveDateTime,
    ) -> Result<Vec<u8>, ScheduleError> {
        match self {
            Self::Base(schedule) => schedule.remove_event(start, end, on, now),
            Self::Exceptions(schedule) => schedule.remove_event(start, end, on),
        }
    }

    /// Replace `old` with a new interval in one step.
    pub fn change_event(
        &self,
        old: &ScheduleEvent,
        start: NaiveDateTime,
        end: NaiveDateTime,
        on: bool,
        now: NaiveDateTime,
    ) -> Result<Vec<u8>, ScheduleError> {
        match self {
            Self::Base(schedule) => schedule.change_event(old, start, end, on, now),
            Self::Exceptions(schedule) => schedule.change_event(old, start, end, on),
        }
    }
}

#[cfg(test)]
pub(crate) fn at(date: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(date, "%Y-%m-%d %H:%M").unwrap()
}
