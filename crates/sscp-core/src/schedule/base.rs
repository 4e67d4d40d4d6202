//! Weekly recurring schedule.
//!
//! The block is a fixed array of 8-byte slots
//! `[2B minute of week][2B reserved][2B state][2B reserved]`. Slot 0 at
//! minute 0 with state off anchors the week; unused slots after it are
//! padded with the same `(0, off)` pattern.

use chrono::{Duration, NaiveDateTime, Weekday};
use tracing::{trace, warn};

use super::{
    detect_on_state, item_count, week_start, ScheduleEvent, MINS_PER_DAY, MINS_PER_WEEK,
    SCHEDULE_OFF, SCHEDULE_ON,
};
use crate::error::ScheduleError;

pub const SLOT_LEN: usize = 8;

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// One slot: at `minute` of the week the output switches to `state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Transition {
    pub minute: u16,
    pub state: u16,
}

impl Transition {
    pub const OFF_ANCHOR: Self = Self {
        minute: 0,
        state: SCHEDULE_OFF,
    };

    pub const fn is_on(self) -> bool {
        self.state != SCHEDULE_OFF
    }

    /// Day, hour and minute of the transition, `None` past the end of the week.
    pub fn weekday_time(self) -> Option<(Weekday, u16, u16)> {
        if self.minute >= MINS_PER_WEEK {
            return None;
        }
        let day = usize::from(self.minute / MINS_PER_DAY);
        let in_day = self.minute % MINS_PER_DAY;
        Some((WEEKDAYS[day], in_day / 60, in_day % 60))
    }

    fn decode(slot: &[u8]) -> Self {
        Self {
            minute: u16::from_be_bytes([slot[0], slot[1]]),
            state: u16::from_be_bytes([slot[4], slot[5]]),
        }
    }

    fn encode(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.minute.to_be_bytes());
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(&self.state.to_be_bytes());
        out.extend_from_slice(&[0, 0]);
    }
}

fn is_padding(index: usize, slot: Transition) -> bool {
    index > 0 && slot == Transition::OFF_ANCHOR
}

/// Index at or after `from` where `new` belongs.
///
/// At an equal minute a closing transition goes before an opening one, so
/// an interval ending where another starts stays a separate event; an
/// opening goes after everything already at that minute.
fn insertion_index(slots: &[Transition], from: usize, new: Transition) -> usize {
    slots
        .iter()
        .enumerate()
        .skip(from)
        .find(|(index, slot)| {
            is_padding(*index, **slot)
                || slot.minute > new.minute
                || (slot.minute == new.minute && !new.is_on() && slot.is_on())
        })
        .map(|(index, _)| index)
        .unwrap_or(slots.len())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseSchedule {
    slots: Vec<Transition>,
    on_state: u16,
}

impl BaseSchedule {
    /// A block of `item_count` padding slots.
    pub fn empty(item_count: usize) -> Self {
        Self {
            slots: vec![Transition::OFF_ANCHOR; item_count],
            on_state: SCHEDULE_ON,
        }
    }

    pub fn decode(raw: &[u8]) -> Result<Self, ScheduleError> {
        item_count(raw.len(), SLOT_LEN)?;
        let slots: Vec<Transition> = raw
            .chunks_exact(SLOT_LEN)
            .map(Transition::decode)
            .collect();
        let on_state = detect_on_state(slots.iter().map(|slot| slot.state))?;
        trace!(slots = slots.len(), on_state, "decoded base schedule");
        Ok(Self { slots, on_state })
    }

    pub fn encode(&self) -> Vec<u8> {
        encode_slots(&self.slots)
    }

    pub fn item_count(&self) -> usize {
        self.slots.len()
    }

    pub fn on_state(&self) -> u16 {
        self.on_state
    }

    pub fn slots(&self) -> &[Transition] {
        &self.slots
    }

    /// `(weekday, hour, minute, on)` of every meaningful slot, in slot order.
    pub fn transitions(&self) -> Vec<(Weekday, u16, u16, bool)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(index, slot)| !is_padding(*index, **slot))
            .filter_map(|(_, slot)| {
                slot.weekday_time()
                    .map(|(day, hour, minute)| (day, hour, minute, slot.is_on()))
            })
            .collect()
    }

    /// On intervals of the week containing `now`.
    ///
    /// An interval still on after the last slot closes at the first off
    /// transition of the following week.
    pub fn to_events(&self, now: NaiveDateTime) -> Vec<ScheduleEvent> {
        let anchor = week_start(now);
        let at = |minute: u16| anchor + Duration::minutes(i64::from(minute));
        let mut events = Vec::new();
        let mut open: Option<(usize, u16)> = None;
        for (index, slot) in self.slots.iter().enumerate() {
            if is_padding(index, *slot) {
                continue;
            }
            if slot.minute >= MINS_PER_WEEK {
                warn!(index, minute = slot.minute, "base schedule slot outside the week");
                continue;
            }
            match (open, slot.is_on()) {
                (None, true) => open = Some((index, slot.minute)),
                (Some((first, start)), false) => {
                    events.push(ScheduleEvent {
                        slot: first,
                        start: at(start),
                        end: at(slot.minute),
                        on: true,
                    });
                    open = None;
                }
                _ => {}
            }
        }
        if let Some((first, start)) = open {
            let wrap = self
                .slots
                .iter()
                .find(|slot| !slot.is_on() && slot.minute < MINS_PER_WEEK)
                .map(|slot| slot.minute)
                .unwrap_or(0);
            events.push(ScheduleEvent {
                slot: first,
                start: at(start),
                end: at(MINS_PER_WEEK) + Duration::minutes(i64::from(wrap)),
                on: true,
            });
        }
        events
    }

    /// Minutes of week for an interval, shifted by whole weeks so that
    /// `start` falls in the week of `now`.
    fn week_minutes(
        start: NaiveDateTime,
        end: NaiveDateTime,
        now: NaiveDateTime,
    ) -> Result<(u16, u16), ScheduleError> {
        if end < start {
            return Err(ScheduleError::InvalidRange);
        }
        let anchor = week_start(now);
        let week = i64::from(MINS_PER_WEEK);
        let start_offset = (start - anchor).num_minutes();
        let shift = start_offset.div_euclid(week) * week;
        let start_minute = start_offset - shift;
        let end_minute = (end - anchor).num_minutes() - shift;
        if end_minute >= week {
            return Err(ScheduleError::CrossesWeekBoundary);
        }
        // Both are within 0..MINS_PER_WEEK here.
        let to_u16 = |minute: i64| u16::try_from(minute).map_err(|_| ScheduleError::InvalidRange);
        Ok((to_u16(start_minute)?, to_u16(end_minute)?))
    }

    fn insert(&self, slots: &mut Vec<Transition>, start: u16, end: u16, on: bool) {
        let opening = Transition {
            minute: start,
            state: if on { self.on_state } else { SCHEDULE_OFF },
        };
        let closing = Transition {
            minute: end,
            state: SCHEDULE_OFF,
        };
        let opened_at = if start == 0 && slots.first() == Some(&Transition::OFF_ANCHOR) {
            slots[0] = opening;
            0
        } else {
            let index = insertion_index(slots, 0, opening);
            slots.insert(index, opening);
            index
        };
        let index = insertion_index(slots, opened_at + 1, closing);
        slots.insert(index, closing);

        let count = self.item_count();
        for (index, dropped) in slots.iter().enumerate().skip(count) {
            if !is_padding(index, *dropped) {
                warn!(
                    minute = dropped.minute,
                    state = dropped.state,
                    "base schedule full, dropping slot"
                );
            }
        }
        slots.truncate(count);
    }

    fn remove(
        &self,
        slots: &mut Vec<Transition>,
        start: u16,
        end: u16,
        on: bool,
    ) -> Result<(), ScheduleError> {
        let state = if on { self.on_state } else { SCHEDULE_OFF };
        let opened = slots
            .iter()
            .enumerate()
            .position(|(index, slot)| {
                !is_padding(index, *slot) && slot.minute == start && slot.state == state
            })
            .ok_or(ScheduleError::EventNotFound)?;
        let closed = slots
            .iter()
            .enumerate()
            .skip(opened + 1)
            .find(|(index, slot)| {
                !is_padding(*index, **slot) && slot.minute == end && slot.state == SCHEDULE_OFF
            })
            .map(|(index, _)| index)
            .ok_or(ScheduleError::EventNotFound)?;
        slots.remove(closed);
        slots.remove(opened);
        if opened == 0 && start == 0 {
            slots.insert(0, Transition::OFF_ANCHOR);
        }
        slots.resize(self.item_count(), Transition::OFF_ANCHOR);
        Ok(())
    }

    fn finish(&self, slots: Vec<Transition>) -> Result<Vec<u8>, ScheduleError> {
        if slots.len() != self.item_count() {
            return Err(ScheduleError::SlotCountMismatch {
                expected: self.item_count(),
                got: slots.len(),
            });
        }
        Ok(encode_slots(&slots))
    }

    /// New block with an on (or off) interval from `start` to `end` added.
    pub fn add_event(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        on: bool,
        now: NaiveDateTime,
    ) -> Result<Vec<u8>, ScheduleError> {
        let (start, end) = Self::week_minutes(start, end, now)?;
        let mut slots = self.slots.clone();
        self.insert(&mut slots, start, end, on);
        self.finish(slots)
    }

    /// New block without the interval from `start` to `end`.
    pub fn remove_event(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        on: bool,
        now: NaiveDateTime,
    ) -> Result<Vec<u8>, ScheduleError> {
        let (start, end) = Self::week_minutes(start, end, now)?;
        let mut slots = self.slots.clone();
        self.remove(&mut slots, start, end, on)?;
        self.finish(slots)
    }

    /// New block with `old` replaced by the interval from `start` to `end`.
    pub fn change_event(
        &self,
        old: &ScheduleEvent,
        start: NaiveDateTime,
        end: NaiveDateTime,
        on: bool,
        now: NaiveDateTime,
    ) -> Result<Vec<u8>, ScheduleError> {
        let (old_start, old_end) = Self::week_minutes(old.start, old.end, now)?;
        let (start, end) = Self::week_minutes(start, end, now)?;
        let mut slots = self.slots.clone();
        self.remove(&mut slots, old_start, old_end, old.on)?;
        self.insert(&mut slots, start, end, on);
        self.finish(slots)
    }
}

fn encode_slots(slots: &[Transition]) -> Vec<u8> {
    let mut out = Vec::with_capacity(slots.len() * SLOT_LEN);
    for slot in slots {
        slot.encode(&mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use chrono::Weekday;

    use super::{BaseSchedule, Transition, SLOT_LEN};
    use crate::schedule::at;
    use crate::ScheduleError;

    fn block(slots: &[(u16, u16)], count: usize) -> Vec<u8> {
        let mut raw = vec![0u8; count * SLOT_LEN];
        for (i, (minute, state)) in slots.iter().enumerate() {
            raw[i * SLOT_LEN..i * SLOT_LEN + 2].copy_from_slice(&minute.to_be_bytes());
            raw[i * SLOT_LEN + 4..i * SLOT_LEN + 6].copy_from_slice(&state.to_be_bytes());
        }
        raw
    }

    // Thursday of the week starting 2024-05-13.
    fn now() -> chrono::NaiveDateTime {
        at("2024-05-16 12:00")
    }

    #[test]
    fn rejects_partial_slots() {
        assert_eq!(
            BaseSchedule::decode(&[0u8; 12]).unwrap_err(),
            ScheduleError::LengthNotMultiple {
                length: 12,
                slot_len: 8
            }
        );
    }

    #[test]
    fn rejects_multiple_on_states() {
        let raw = block(&[(0, 0), (480, 1), (600, 0), (700, 2), (800, 0)], 6);
        assert!(matches!(
            BaseSchedule::decode(&raw).unwrap_err(),
            ScheduleError::MultipleOnStates { .. }
        ));
    }

    #[test]
    fn events_are_anchored_to_monday() {
        // Monday 08:00-17:00 and Tuesday 08:00-12:00.
        let raw = block(&[(0, 0), (480, 1), (1020, 0), (1920, 1), (2160, 0)], 8);
        let schedule = BaseSchedule::decode(&raw).unwrap();
        let events = schedule.to_events(now());
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].slot, 1);
        assert_eq!(events[0].start, at("2024-05-13 08:00"));
        assert_eq!(events[0].end, at("2024-05-13 17:00"));
        assert_eq!(events[1].start, at("2024-05-14 08:00"));
        assert_eq!(events[1].end, at("2024-05-14 12:00"));
        assert!(events.iter().all(|event| event.on));
    }

    #[test]
    fn open_event_wraps_into_next_week() {
        // On from Sunday 22:00, off again Monday 06:00.
        let raw = block(&[(360, 0), (9960, 1)], 4);
        let schedule = BaseSchedule::decode(&raw).unwrap();
        let events = schedule.to_events(now());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].start, at("2024-05-19 22:00"));
        assert_eq!(events[0].end, at("2024-05-20 06:00"));
    }

    #[test]
    fn transitions_listing() {
        let raw = block(&[(0, 0), (1500, 1), (1560, 0)], 4);
        let schedule = BaseSchedule::decode(&raw).unwrap();
        assert_eq!(
            schedule.transitions(),
            vec![
                (Weekday::Mon, 0, 0, false),
                (Weekday::Tue, 1, 0, true),
                (Weekday::Tue, 2, 0, false),
            ]
        );
    }

    #[test]
    fn add_into_empty_block() {
        let schedule = BaseSchedule::empty(4);
        let raw = schedule
            .add_event(at("2024-05-15 08:00"), at("2024-05-15 17:00"), true, now())
            .unwrap();
        assert_eq!(raw, block(&[(0, 0), (3360, 1), (3900, 0)], 4));
    }

    #[test]
    fn add_normalizes_other_weeks() {
        let schedule = BaseSchedule::empty(4);
        let this_week = schedule
            .add_event(at("2024-05-15 08:00"), at("2024-05-15 17:00"), true, now())
            .unwrap();
        let later = schedule
            .add_event(at("2024-06-12 08:00"), at("2024-06-12 17:00"), true, now())
            .unwrap();
        let earlier = schedule
            .add_event(at("2023-01-04 08:00"), at("2023-01-04 17:00"), true, now())
            .unwrap();
        assert_eq!(this_week, later);
        assert_eq!(this_week, earlier);
    }

    #[test]
    fn add_at_midnight_replaces_anchor() {
        let schedule = BaseSchedule::empty(4);
        let raw = schedule
            .add_event(at("2024-05-13 00:00"), at("2024-05-13 06:00"), true, now())
            .unwrap();
        assert_eq!(raw, block(&[(0, 1), (360, 0)], 4));
        let updated = BaseSchedule::decode(&raw).unwrap();
        let restored = updated
            .remove_event(at("2024-05-13 00:00"), at("2024-05-13 06:00"), true, now())
            .unwrap();
        assert_eq!(restored, schedule.encode());
    }

    #[test]
    fn add_keeps_order_and_uses_block_on_state() {
        let raw = block(&[(0, 0), (480, 3), (1020, 0)], 6);
        let schedule = BaseSchedule::decode(&raw).unwrap();
        let out = schedule
            .add_event(at("2024-05-13 05:00"), at("2024-05-13 06:00"), true, now())
            .unwrap();
        assert_eq!(out, block(&[(0, 0), (300, 3), (360, 0), (480, 3), (1020, 0)], 6));
    }

    #[test]
    fn add_ending_where_existing_event_starts() {
        let raw = block(&[(0, 0), (480, 1), (1020, 0)], 6);
        let schedule = BaseSchedule::decode(&raw).unwrap();
        let out = schedule
            .add_event(at("2024-05-13 05:00"), at("2024-05-13 08:00"), true, now())
            .unwrap();
        assert_eq!(out, block(&[(0, 0), (300, 1), (480, 0), (480, 1), (1020, 0)], 6));

        let updated = BaseSchedule::decode(&out).unwrap();
        let events = updated.to_events(now());
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].start, at("2024-05-13 05:00"));
        assert_eq!(events[0].end, at("2024-05-13 08:00"));
        assert_eq!(events[1].start, at("2024-05-13 08:00"));
        assert_eq!(events[1].end, at("2024-05-13 17:00"));

        let restored = updated
            .remove_event(at("2024-05-13 05:00"), at("2024-05-13 08:00"), true, now())
            .unwrap();
        assert_eq!(restored, raw);
    }

    #[test]
    fn add_starting_where_existing_event_ends() {
        let raw = block(&[(0, 0), (480, 1), (1020, 0)], 6);
        let schedule = BaseSchedule::decode(&raw).unwrap();
        let out = schedule
            .add_event(at("2024-05-13 17:00"), at("2024-05-13 19:00"), true, now())
            .unwrap();
        assert_eq!(out, block(&[(0, 0), (480, 1), (1020, 0), (1020, 1), (1140, 0)], 6));
        let events = BaseSchedule::decode(&out).unwrap().to_events(now());
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].start, at("2024-05-13 17:00"));
        assert_eq!(events[1].end, at("2024-05-13 19:00"));
    }

    #[test]
    fn full_block_drops_tail() {
        let raw = block(&[(0, 0), (480, 1), (1020, 0)], 3);
        let schedule = BaseSchedule::decode(&raw).unwrap();
        let out = schedule
            .add_event(at("2024-05-13 05:00"), at("2024-05-13 06:00"), true, now())
            .unwrap();
        assert_eq!(out, block(&[(0, 0), (300, 1), (360, 0)], 3));
    }

    #[test]
    fn rejects_week_crossing_and_reversed_ranges() {
        let schedule = BaseSchedule::empty(4);
        assert_eq!(
            schedule
                .add_event(at("2024-05-19 22:00"), at("2024-05-20 06:00"), true, now())
                .unwrap_err(),
            ScheduleError::CrossesWeekBoundary
        );
        assert_eq!(
            schedule
                .add_event(at("2024-05-12 22:00"), at("2024-05-27 06:00"), true, now())
                .unwrap_err(),
            ScheduleError::CrossesWeekBoundary
        );
        assert_eq!(
            schedule
                .add_event(at("2024-05-15 17:00"), at("2024-05-15 08:00"), true, now())
                .unwrap_err(),
            ScheduleError::InvalidRange
        );
    }

    #[test]
    fn remove_restores_original() {
        let raw = block(&[(0, 0), (480, 1), (1020, 0)], 6);
        let schedule = BaseSchedule::decode(&raw).unwrap();
        let added = schedule
            .add_event(at("2024-05-17 09:30"), at("2024-05-17 11:00"), true, now())
            .unwrap();
        let removed = BaseSchedule::decode(&added)
            .unwrap()
            .remove_event(at("2024-05-17 09:30"), at("2024-05-17 11:00"), true, now())
            .unwrap();
        assert_eq!(removed, raw);
    }

    #[test]
    fn remove_missing_event_fails() {
        let raw = block(&[(0, 0), (480, 1), (1020, 0)], 4);
        let schedule = BaseSchedule::decode(&raw).unwrap();
        assert_eq!(
            schedule
                .remove_event(at("2024-05-13 09:00"), at("2024-05-13 17:00"), true, now())
                .unwrap_err(),
            ScheduleError::EventNotFound
        );
    }

    #[test]
    fn change_moves_event_in_one_step() {
        let raw = block(&[(0, 0), (480, 1), (1020, 0)], 4);
        let schedule = BaseSchedule::decode(&raw).unwrap();
        let old = schedule.to_events(now())[0];
        let changed = schedule
            .change_event(&old, at("2024-05-13 09:00"), at("2024-05-13 18:00"), true, now())
            .unwrap();
        assert_eq!(changed, block(&[(0, 0), (540, 1), (1080, 0)], 4));
    }

    #[test]
    fn weekday_time_of_transition() {
        let slot = Transition {
            minute: 9960,
            state: 1,
        };
        assert_eq!(slot.weekday_time(), Some((Weekday::Sun, 22, 0)));
        assert_eq!(
            Transition {
                minute: 10080,
                state: 0
            }
            .weekday_time(),
            None
        );
    }
}
