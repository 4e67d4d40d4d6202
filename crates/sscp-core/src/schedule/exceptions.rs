//! Dated schedule exceptions.
//!
//! The block is a fixed array of 12-byte slots
//! `[4B start][4B end][2B state][2B reserved]`, each slot one override
//! interval. Timestamps are `[1B year - 2000][3B minutes since Jan 1]`, with
//! one day (1440 minutes) added whenever the year byte is nonzero. A slot
//! whose two timestamps are all zero is unused.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use tracing::{trace, warn};

use super::{
    detect_on_state, item_count, ScheduleEvent, MINS_PER_DAY, SCHEDULE_OFF, SCHEDULE_ON,
};
use crate::error::ScheduleError;

pub const SLOT_LEN: usize = 12;
pub const BASE_YEAR: i32 = 2000;

type Slot = [u8; SLOT_LEN];

const EMPTY_SLOT: Slot = [0; SLOT_LEN];

fn jan_first(year: i32) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, 1, 1).and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Encode a wall-clock time as a 4-byte exception timestamp.
pub fn encode_timestamp(at: NaiveDateTime) -> Result<[u8; 4], ScheduleError> {
    let year = at.year();
    let offset =
        u8::try_from(year - BASE_YEAR).map_err(|_| ScheduleError::YearOutOfRange(year))?;
    let start = jan_first(year).ok_or(ScheduleError::YearOutOfRange(year))?;
    let mut minutes = (at - start).num_minutes();
    if offset > 0 {
        minutes += i64::from(MINS_PER_DAY);
    }
    let minutes = u32::try_from(minutes).map_err(|_| ScheduleError::YearOutOfRange(year))?;
    let [_, high, mid, low] = minutes.to_be_bytes();
    Ok([offset, high, mid, low])
}

/// Decode a 4-byte exception timestamp; `None` for an unused or invalid one.
pub fn decode_timestamp(word: [u8; 4]) -> Option<NaiveDateTime> {
    let year = word[0];
    let mut minutes = u32::from_be_bytes([0, word[1], word[2], word[3]]);
    if year == 0 && minutes == 0 {
        return None;
    }
    if year > 0 {
        if minutes < u32::from(MINS_PER_DAY) {
            warn!(year, minutes, "exception timestamp below the one day bias");
            return None;
        }
        minutes -= u32::from(MINS_PER_DAY);
    }
    jan_first(BASE_YEAR + i32::from(year))
        .map(|start| start + Duration::minutes(i64::from(minutes)))
}

fn start_key(slot: &Slot) -> u32 {
    u32::from_be_bytes([slot[0], slot[1], slot[2], slot[3]])
}

fn is_empty(slot: &Slot) -> bool {
    slot[..8].iter().all(|byte| *byte == 0)
}

fn slot_state(slot: &Slot) -> u16 {
    u16::from_be_bytes([slot[8], slot[9]])
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionSchedule {
    slots: Vec<Slot>,
    on_state: u16,
}

impl ExceptionSchedule {
    pub fn empty(item_count: usize) -> Self {
        Self {
            slots: vec![EMPTY_SLOT; item_count],
            on_state: SCHEDULE_ON,
        }
    }

    pub fn decode(raw: &[u8]) -> Result<Self, ScheduleError> {
        item_count(raw.len(), SLOT_LEN)?;
        let slots: Vec<Slot> = raw
            .chunks_exact(SLOT_LEN)
            .map(|chunk| {
                let mut slot = EMPTY_SLOT;
                slot.copy_from_slice(chunk);
                slot
            })
            .collect();
        let on_state = detect_on_state(slots.iter().map(slot_state))?;
        trace!(slots = slots.len(), on_state, "decoded schedule exceptions");
        Ok(Self { slots, on_state })
    }

    pub fn encode(&self) -> Vec<u8> {
        self.slots.concat()
    }

    /// Maximum number of exceptions the block can hold.
    pub fn item_count(&self) -> usize {
        self.slots.len()
    }

    pub fn on_state(&self) -> u16 {
        self.on_state
    }

    /// Number of slots in use.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| !is_empty(slot)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One event per used slot, in slot order.
    pub fn to_events(&self) -> Vec<ScheduleEvent> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| !is_empty(slot))
            .filter_map(|(index, slot)| {
                let start = decode_timestamp([slot[0], slot[1], slot[2], slot[3]]);
                let end = decode_timestamp([slot[4], slot[5], slot[6], slot[7]]);
                match (start, end) {
                    (Some(start), Some(end)) => Some(ScheduleEvent {
                        slot: index,
                        start,
                        end,
                        on: slot_state(slot) != SCHEDULE_OFF,
                    }),
                    _ => {
                        warn!(index, "skipping exception slot with an invalid timestamp");
                        None
                    }
                }
            })
            .collect()
    }

    fn encode_slot(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        on: bool,
    ) -> Result<Slot, ScheduleError> {
        if end < start {
            return Err(ScheduleError::InvalidRange);
        }
        let state = if on { self.on_state } else { SCHEDULE_OFF };
        let start = encode_timestamp(start)?;
        // 2000-01-01 00:00 is indistinguishable from an unused slot.
        if start == [0; 4] {
            return Err(ScheduleError::InvalidRange);
        }
        let mut slot = EMPTY_SLOT;
        slot[0..4].copy_from_slice(&start);
        slot[4..8].copy_from_slice(&encode_timestamp(end)?);
        slot[8..10].copy_from_slice(&state.to_be_bytes());
        Ok(slot)
    }

    fn insert(&self, slots: &mut Vec<Slot>, new: Slot) {
        let key = start_key(&new);
        let index = slots
            .iter()
            .position(|slot| is_empty(slot) || start_key(slot) >= key)
            .unwrap_or(slots.len());
        slots.insert(index, new);
        while slots.len() > self.item_count() {
            if let Some(dropped) = slots.pop() {
                if !is_empty(&dropped) {
                    warn!(
                        start = start_key(&dropped),
                        "schedule exceptions full, dropping last slot"
                    );
                }
            }
        }
    }

    fn remove(&self, slots: &mut Vec<Slot>, target: &Slot) -> Result<(), ScheduleError> {
        let index = slots
            .iter()
            .position(|slot| slot == target)
            .ok_or(ScheduleError::EventNotFound)?;
        slots.remove(index);
        slots.push(EMPTY_SLOT);
        Ok(())
    }

    fn finish(&self, slots: Vec<Slot>) -> Result<Vec<u8>, ScheduleError> {
        if slots.len() != self.item_count() {
            return Err(ScheduleError::SlotCountMismatch {
                expected: self.item_count(),
                got: slots.len(),
            });
        }
        Ok(slots.concat())
    }

    /// New block with the exception inserted in start order.
    pub fn add_event(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        on: bool,
    ) -> Result<Vec<u8>, ScheduleError> {
        let new = self.encode_slot(start, end, on)?;
        let mut slots = self.slots.clone();
        self.insert(&mut slots, new);
        self.finish(slots)
    }

    /// New block without the exception exactly matching `start`, `end`, `on`.
    pub fn remove_event(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        on: bool,
    ) -> Result<Vec<u8>, ScheduleError> {
        let target = self.encode_slot(start, end, on)?;
        let mut slots = self.slots.clone();
        self.remove(&mut slots, &target)?;
        self.finish(slots)
    }

    pub fn change_event(
        &self,
        old: &ScheduleEvent,
        start: NaiveDateTime,
        end: NaiveDateTime,
        on: bool,
    ) -> Result<Vec<u8>, ScheduleError> {
        let target = self.encode_slot(old.start, old.end, old.on)?;
        let new = self.encode_slot(start, end, on)?;
        let mut slots = self.slots.clone();
        self.remove(&mut slots, &target)?;
        self.insert(&mut slots, new);
        self.finish(slots)
    }
}
