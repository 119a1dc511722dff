/*!
The `track` module holds the in-memory event sequence. A [`Track`] keeps its events in a flat,
exponentially grown array, ordered by absolute time, with three refinements that keep the common
editing operations cheap:

- a *cursor* that walks the track in either direction and treats the position past the last event
  and before the first as one circular end-of-track mark;
- *tombstones*: deleting an event retags its slot as [`Message::Empty`] instead of shifting the
  tail, and the array is compacted only when tombstones pile up;
- an *insertion mode*: a batch of inserts appends raw entries and a single stable sort
  establishes the order when the next read happens.

The total order used by that sort is the one every consumer of a track observes; equal-timed
events are tie-broken so that musically meaningful ordering is stable (end-of-track last, meta
before voice, program and control changes before notes, note-offs before note-ons).
!*/

use crate::event::Event;
use crate::message::Message;
use std::cmp::Ordering;

const INITIAL_CAPACITY: usize = 512;

/// Which way [`Track::step`] moves.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    Forward,
    Backward,
}

/// An opaque cursor position, valid until the next insert or delete.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TrackPos(usize);

/// An ordered, editable sequence of time-stamped events.
#[derive(Clone, Debug, Default)]
pub struct Track {
    events: Vec<Event>,
    /// Cursor slot index; any value `>= events.len()` is the end-of-track mark.
    current: usize,
    /// Number of tombstone slots in `events`.
    nempty: usize,
    /// True while a batch of inserts is pending its finalizing sort.
    inserting: bool,
}

impl Track {
    /// A new, empty track with the cursor at end-of-track.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of live (non-tombstone) events.
    pub fn nevents(&self) -> usize {
        self.events.len() - self.nempty
    }

    /// Returns `true` when the cursor is at the end-of-track mark.
    pub fn is_eot(&self) -> bool {
        self.current >= self.events.len()
    }

    /// Move the cursor to the end-of-track mark: past the last event and, circularly, before the
    /// first. Finalizes a pending insertion batch.
    pub fn rewind(&mut self) {
        self.finish_insertion();
        self.current = self.events.len();
    }

    /// The current cursor position. Invalidated by any insert or delete.
    pub fn getpos(&mut self) -> TrackPos {
        self.finish_insertion();
        TrackPos(self.current)
    }

    /// Restore a position previously retrieved with [`Track::getpos`].
    pub fn setpos(&mut self, pos: TrackPos) {
        self.current = pos.0.min(self.events.len());
    }

    /// Step to the next (or previous) live event and return it, or `None` when the end-of-track
    /// mark is reached. Tombstones are skipped. End-of-track is a single circular mark: stepping
    /// forward from it yields the first event, stepping backward from it yields the last.
    pub fn step(&mut self, direction: Direction) -> Option<&Event> {
        self.finish_insertion();
        loop {
            match self.step_raw(direction) {
                None => return None,
                Some(i) if self.events[i].msg.is_empty_slot() => continue,
                Some(i) => return Some(&self.events[i]),
            }
        }
    }

    /// As [`Track::step`], with mutable access to the event.
    pub fn step_mut(&mut self, direction: Direction) -> Option<&mut Event> {
        self.finish_insertion();
        loop {
            match self.step_raw(direction) {
                None => return None,
                Some(i) if self.events[i].msg.is_empty_slot() => continue,
                Some(i) => return Some(&mut self.events[i]),
            }
        }
    }

    fn step_raw(&mut self, direction: Direction) -> Option<usize> {
        if self.events.is_empty() {
            return None;
        }
        let n = self.events.len();
        if self.current >= n {
            self.current = match direction {
                Direction::Forward => 0,
                Direction::Backward => n - 1,
            };
        } else {
            match direction {
                Direction::Forward => self.current += 1,
                Direction::Backward => {
                    if self.current == 0 {
                        self.current = n;
                    } else {
                        self.current -= 1;
                    }
                }
            }
        }
        if self.current < n {
            Some(self.current)
        } else {
            None
        }
    }

    /// The live event at the cursor, or `None` at end-of-track or on a tombstone.
    pub fn current_event(&self) -> Option<&Event> {
        let e = self.events.get(self.current)?;
        if e.msg.is_empty_slot() {
            None
        } else {
            Some(e)
        }
    }

    /// As [`Track::current_event`], with mutable access.
    pub fn current_event_mut(&mut self) -> Option<&mut Event> {
        let e = self.events.get_mut(self.current)?;
        if e.msg.is_empty_slot() {
            None
        } else {
            Some(e)
        }
    }

    /// Position the cursor at the first live event with `time >= target` and return it, or leave
    /// the cursor at end-of-track and return `None` if there is none.
    pub fn find(&mut self, target: u32) -> Option<&Event> {
        self.finish_insertion();
        // Tombstones carry the time of the event after them, so the array stays ordered and a
        // plain lower bound works.
        let idx = self.events.partition_point(|e| e.time < target);
        self.current = idx;
        if idx >= self.events.len() {
            return None;
        }
        if self.events[idx].msg.is_empty_slot() {
            return self.step(Direction::Forward);
        }
        Some(&self.events[idx])
    }

    /// Insert an event in time-sorted order. Among equal-timed events the newcomer sorts last
    /// within its class. The cursor is undefined afterwards; rewind before iterating.
    ///
    /// Consecutive inserts form a batch: entries are appended raw and a single sort establishes
    /// the order when the next read operation happens.
    pub fn insert(&mut self, event: Event) {
        if !self.inserting {
            self.pack();
            self.inserting = true;
        }
        if self.events.capacity() == self.events.len()
            && self.events.capacity() < INITIAL_CAPACITY
        {
            self.events.reserve(INITIAL_CAPACITY);
        }
        self.events.push(event);
    }

    /// Delete the event at the cursor, leaving a tombstone, and advance the cursor to the next
    /// live event. Returns `false` when the cursor is at end-of-track (nothing to delete). The
    /// array is compacted once tombstones outnumber live events.
    pub fn delete(&mut self) -> bool {
        self.finish_insertion();
        if self.is_eot() || self.events[self.current].msg.is_empty_slot() {
            return false;
        }
        self.events[self.current].msg.clear();
        self.nempty += 1;
        if self.current + 1 < self.events.len() {
            // The tombstone takes the time of its successor so binary search stays ordered.
            self.events[self.current].time = self.events[self.current + 1].time;
            self.step(Direction::Forward);
        } else {
            self.events[self.current].time = u32::MAX;
        }
        if self.events.len() < 2 * self.nempty {
            self.pack();
        }
        true
    }

    /// Release every event and the backing array, leaving an empty track.
    pub fn clear(&mut self) {
        self.events = Vec::new();
        self.current = 0;
        self.nempty = 0;
        self.inserting = false;
    }

    /// Consume the track, yielding its live events in order.
    pub(crate) fn into_live_events(mut self) -> impl Iterator<Item = Event> {
        self.finish_insertion();
        self.events.into_iter().filter(|e| !e.msg.is_empty_slot())
    }

    /// End a pending insertion batch by establishing the total event order.
    fn finish_insertion(&mut self) {
        if !self.inserting {
            return;
        }
        self.inserting = false;
        // A stable sort: events the comparator cannot distinguish keep insertion order.
        self.events.sort_by(compare_events);
    }

    /// Copy live events down over tombstones, preserving order and fixing up the cursor, then
    /// give back block-sized chunks of capacity that are no longer needed.
    fn pack(&mut self) {
        let mut to = 0;
        for from in 0..self.events.len() {
            if self.events[from].msg.is_empty_slot() {
                continue;
            }
            if to < from {
                if self.current == from {
                    self.current = to;
                }
                self.events.swap(to, from);
            }
            to += 1;
        }
        self.events.truncate(to);
        self.nempty = 0;
        if self.current > self.events.len() {
            self.current = self.events.len();
        }
        let block = self.events.len().next_power_of_two().max(INITIAL_CAPACITY);
        if self.events.capacity() >= 2 * block {
            self.events.shrink_to(block);
        }
    }
}

/// The total order of events within a track. Time first; at equal times a decision list keeps
/// musically meaningful ordering, and whatever it cannot distinguish is left `Equal` for the
/// stable sort to keep in insertion order.
pub(crate) fn compare_events(e1: &Event, e2: &Event) -> Ordering {
    if e1.time != e2.time {
        return e1.time.cmp(&e2.time);
    }
    let eot1 = e1.msg.is_end_of_track();
    let eot2 = e2.msg.is_end_of_track();
    match (eot1, eot2) {
        (false, true) => return Ordering::Less,
        (true, false) => return Ordering::Greater,
        _ => {}
    }
    let voice1 = e1.msg.is_voice();
    let voice2 = e2.msg.is_voice();
    match (voice1, voice2) {
        (false, true) => return Ordering::Less,
        (true, false) => return Ordering::Greater,
        (false, false) => return Ordering::Equal,
        (true, true) => {}
    }
    let ch1 = e1.msg.channel().map(|c| c.get()).unwrap_or(0);
    let ch2 = e2.msg.channel().map(|c| c.get()).unwrap_or(0);
    if ch1 != ch2 {
        return ch1.cmp(&ch2);
    }
    let prog1 = matches!(e1.msg, Message::ProgramChange(_));
    let prog2 = matches!(e2.msg, Message::ProgramChange(_));
    match (prog1, prog2) {
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        _ => {}
    }
    let ctrl1 = matches!(e1.msg, Message::ControlChange(_));
    let ctrl2 = matches!(e2.msg, Message::ControlChange(_));
    match (ctrl1, ctrl2) {
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        _ => {}
    }
    let off1 = e1.msg.is_note_off_like();
    let off2 = e2.msg.is_note_off_like();
    let on1 = e1.msg.is_note_on_like();
    let on2 = e2.msg.is_note_on_like();
    if off1 && on2 {
        return Ordering::Less;
    }
    if off2 && on1 {
        return Ordering::Greater;
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{
        ControlChangeValue, NoteOnValue, NoteValue, ProgramChangeValue,
    };
    use crate::num::{Channel, ControlValue, Controller, NoteNumber, Program, Velocity};

    fn note_on(time: u32, channel: u8, note: u8, velocity: u8) -> Event {
        Event::new(
            time,
            Message::NoteOn(NoteOnValue::new(
                Channel::new(channel),
                NoteNumber::new(note),
                Velocity::new(velocity),
            )),
        )
    }

    fn note_off(time: u32, channel: u8, note: u8) -> Event {
        Event::new(
            time,
            Message::NoteOff(NoteValue {
                channel: Channel::new(channel),
                note: NoteNumber::new(note),
                velocity: Velocity::new(0),
            }),
        )
    }

    fn eot(time: u32) -> Event {
        Event::new(time, Message::EndOfTrack)
    }

    fn times(track: &mut Track) -> Vec<u32> {
        track.rewind();
        let mut out = Vec::new();
        while let Some(e) = track.step(Direction::Forward) {
            out.push(e.time);
        }
        out
    }

    #[test]
    fn empty_track() {
        let mut t = Track::new();
        assert_eq!(0, t.nevents());
        assert!(t.is_eot());
        assert!(t.step(Direction::Forward).is_none());
        assert!(t.step(Direction::Backward).is_none());
    }

    #[test]
    fn insert_establishes_time_order() {
        let mut t = Track::new();
        for &time in &[30u32, 10, 20, 40] {
            t.insert(note_on(time, 0, 60, 90));
        }
        assert_eq!(vec![10, 20, 30, 40], times(&mut t));
    }

    #[test]
    fn step_is_circular() {
        let mut t = Track::new();
        t.insert(note_on(10, 0, 60, 90));
        t.insert(note_on(20, 0, 62, 90));
        t.rewind();
        assert_eq!(20, t.step(Direction::Backward).unwrap().time);
        assert_eq!(10, t.step(Direction::Backward).unwrap().time);
        assert!(t.step(Direction::Backward).is_none());
        // From end-of-track, forward starts over at the first event.
        assert_eq!(10, t.step(Direction::Forward).unwrap().time);
    }

    #[test]
    fn equal_time_tie_breaks() {
        let mut t = Track::new();
        // Inserted deliberately out of the expected order.
        t.insert(eot(100));
        t.insert(note_on(100, 1, 60, 90));
        t.insert(note_off(100, 1, 55));
        t.insert(Event::new(
            100,
            Message::ControlChange(ControlChangeValue {
                channel: Channel::new(1),
                controller: Controller::new(7),
                value: ControlValue::new(100),
            }),
        ));
        t.insert(Event::new(
            100,
            Message::ProgramChange(ProgramChangeValue {
                channel: Channel::new(1),
                program: Program::new(5),
            }),
        ));
        t.insert(note_on(100, 0, 60, 90));
        t.insert(Event::new(100, Message::SetTempo(500_000)));

        t.rewind();
        let mut kinds = Vec::new();
        while let Some(e) = t.step(Direction::Forward) {
            kinds.push(match &e.msg {
                Message::SetTempo(_) => "tempo",
                Message::ProgramChange(_) => "program",
                Message::ControlChange(_) => "control",
                Message::NoteOff(_) => "off",
                Message::NoteOn(v) if v.channel.get() == 0 => "on ch0",
                Message::NoteOn(_) => "on ch1",
                Message::EndOfTrack => "eot",
                other => panic!("unexpected {:?}", other),
            });
        }
        assert_eq!(
            vec!["tempo", "on ch0", "program", "control", "off", "on ch1", "eot"],
            kinds
        );
    }

    #[test]
    fn shuffled_inserts_match_natural_order() {
        // With unique timestamps per (channel, kind, note) the order is fully determined.
        let natural: Vec<Event> = (0..40u32)
            .map(|i| note_on(i * 3, (i % 4) as u8, 60, 90))
            .collect();
        let mut expected = Track::new();
        for e in &natural {
            expected.insert(e.clone());
        }
        let mut shuffled: Vec<Event> = natural.clone();
        // A fixed permutation: reverse odd/even interleave.
        shuffled.sort_by_key(|e| (e.time % 7, std::cmp::Reverse(e.time)));
        let mut got = Track::new();
        for e in &shuffled {
            got.insert(e.clone());
        }
        assert_eq!(times(&mut expected), times(&mut got));
    }

    #[test]
    fn find_lower_bound() {
        let mut t = Track::new();
        for &time in &[10u32, 20, 30, 40] {
            t.insert(note_on(time, 0, 60, 90));
        }
        assert_eq!(20, t.find(15).unwrap().time);
        assert_eq!(20, t.find(20).unwrap().time);
        assert_eq!(10, t.find(0).unwrap().time);
        assert!(t.find(41).is_none());
        assert!(t.is_eot());
    }

    #[test]
    fn find_then_step_continues() {
        let mut t = Track::new();
        for &time in &[10u32, 20, 30] {
            t.insert(note_on(time, 0, 60, 90));
        }
        t.find(20);
        assert_eq!(30, t.step(Direction::Forward).unwrap().time);
    }

    #[test]
    fn delete_skips_to_next_live_event() {
        let mut t = Track::new();
        for &time in &[10u32, 20, 30] {
            t.insert(note_on(time, 0, 60, 90));
        }
        t.find(20);
        assert!(t.delete());
        assert_eq!(2, t.nevents());
        // Cursor advanced to the event after the deleted one.
        assert_eq!(30, t.current_event().unwrap().time);
        assert_eq!(vec![10, 30], times(&mut t));
    }

    #[test]
    fn delete_at_eot_is_a_no_op() {
        let mut t = Track::new();
        t.insert(note_on(10, 0, 60, 90));
        t.rewind();
        assert!(!t.delete());
        assert_eq!(1, t.nevents());
    }

    #[test]
    fn alternating_delete_keeps_odd_times() {
        let mut t = Track::new();
        for time in 0..20u32 {
            t.insert(note_on(time, 0, 60, 90));
        }
        // Delete advances to the next live event, so stepping in between skips one each round.
        t.rewind();
        while t.step(Direction::Forward).is_some() {
            t.delete();
        }
        assert_eq!(10, t.nevents());
        let expected: Vec<u32> = (0..20).filter(|x| x % 2 == 1).collect();
        assert_eq!(expected, times(&mut t));
    }

    #[test]
    fn compaction_preserves_observable_order() {
        let mut t = Track::new();
        for time in 0..20u32 {
            t.insert(note_on(time, 0, 60, 90));
        }
        // Deleting eleven of twenty events crosses the tombstone threshold and forces a pack
        // mid-way; the observable sequence afterwards is unchanged.
        t.find(0);
        for _ in 0..15 {
            assert!(t.delete());
        }
        assert_eq!(5, t.nevents());
        assert_eq!(vec![15, 16, 17, 18, 19], times(&mut t));
    }

    #[test]
    fn getpos_setpos_round_trip() {
        let mut t = Track::new();
        for &time in &[10u32, 20, 30] {
            t.insert(note_on(time, 0, 60, 90));
        }
        t.find(20);
        let p = t.getpos();
        t.rewind();
        t.setpos(p);
        assert_eq!(20, t.current_event().unwrap().time);
    }

    #[test]
    fn reads_finalize_insertion_batch() {
        let mut t = Track::new();
        t.insert(note_on(20, 0, 60, 90));
        t.insert(note_on(10, 0, 62, 90));
        // The first read after a batch sees sorted order.
        assert_eq!(10, t.find(0).unwrap().time);
        // A new batch after reads re-packs and re-sorts.
        t.insert(note_on(5, 0, 64, 90));
        assert_eq!(vec![5, 10, 20], times(&mut t));
    }

    #[test]
    fn clear_releases_everything() {
        let mut t = Track::new();
        t.insert(note_on(10, 0, 60, 90));
        t.clear();
        assert_eq!(0, t.nevents());
        assert!(t.is_eot());
    }
}
