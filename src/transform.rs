/*!
The `transform` module contains the operations the companion tool applies between reading and
writing: grouping note-on/note-off pairs into combined notes and back, normalizing note-offs,
merging the tracks of a score into one, and restricting a score to a range of tracks.
!*/

use crate::diag::Severity;
use crate::event::Event;
use crate::message::{Message, NoteOnValue, NoteValue};
use crate::num::Velocity;
use crate::score::Score;
use crate::track::{Direction, Track, TrackPos};

/// Search backward from the cursor for the nearest note-on that could still be paired: same
/// channel and note, sounding (velocity above zero) and not yet combined. The cursor is left
/// where it was; the found position, if any, is returned.
fn find_note_on(track: &mut Track, channel: u8, note: u8) -> Option<TrackPos> {
    let saved = track.getpos();
    let mut found = None;
    while let Some(e) = track.step(Direction::Backward) {
        if let Message::NoteOn(v) = &e.msg {
            if v.channel.get() == channel
                && v.note.get() == note
                && v.velocity.get() != 0
                && v.duration == 0
            {
                found = Some(track.getpos());
                break;
            }
        }
    }
    track.setpos(saved);
    found
}

/// Convert note-on/note-off pairs into combined notes. For each note-off (a note-on with
/// velocity zero counts), the nearest preceding un-combined note-on with the same channel and
/// note absorbs it: its `duration` becomes the distance between the two events, its `release`
/// the off velocity, and the note-off is deleted. Overlapping same-pitch notes therefore match
/// newest-first, so the shorter note nests completely within the longer one:
///
/// ```text
///   100 NoteOn  ch=1 n=60          100 Note ch=1 n=60 dur=30
///   110 NoteOn  ch=1 n=60    =>    110 Note ch=1 n=60 dur=10
///   120 NoteOff ch=1 n=60
///   130 NoteOff ch=1 n=60
/// ```
///
/// Returns the number of events left unmatched, note-ons and note-offs combined.
pub fn pair_notes(track: &mut Track) -> usize {
    let mut open_notes = 0usize;
    let mut unmatched_offs = 0usize;
    track.rewind();
    loop {
        let (off_time, channel, note, off_velocity) = {
            let e = match track.step(Direction::Forward) {
                Some(e) => e,
                None => break,
            };
            match &e.msg {
                Message::NoteOn(v) if v.duration != 0 || v.velocity.get() != 0 => {
                    open_notes += 1;
                    continue;
                }
                // A note-on with velocity zero is handled exactly like a note-off.
                Message::NoteOn(v) => (e.time, v.channel.get(), v.note.get(), v.velocity.get()),
                Message::NoteOff(v) => (e.time, v.channel.get(), v.note.get(), v.velocity.get()),
                _ => continue,
            }
        };
        if open_notes == 0 {
            unmatched_offs += 1;
            continue;
        }
        match find_note_on(track, channel, note) {
            None => unmatched_offs += 1,
            Some(on_pos) => {
                let off_pos = track.getpos();
                track.setpos(on_pos);
                if let Some(on) = track.current_event_mut() {
                    let on_time = on.time;
                    if let Message::NoteOn(v) = &mut on.msg {
                        v.duration = off_time - on_time;
                        v.release = Velocity::new(off_velocity);
                    }
                }
                track.setpos(off_pos);
                track.delete();
                // The delete advanced past the removed note-off; step back so the outer loop
                // continues with the event that followed it.
                track.step(Direction::Backward);
                open_notes -= 1;
            }
        }
    }
    open_notes + unmatched_offs
}

/// The counterpart to [`pair_notes`]: every combined note gets its note-off back, at
/// `time + duration` with the stored release velocity, and its `duration` and `release` reset to
/// zero. End-of-track times are deliberately not adjusted, even when a restored note-off lands
/// beyond them. Returns the number of notes converted.
pub fn unpair_notes(track: &mut Track) -> usize {
    // Collected separately so the walk over `track` is undisturbed, then inserted in one batch.
    let mut offs = Track::new();
    let mut count = 0usize;
    track.rewind();
    while let Some(e) = track.step_mut(Direction::Forward) {
        let time = e.time;
        if let Message::NoteOn(v) = &mut e.msg {
            if v.duration != 0 {
                offs.insert(Event::new(
                    time + v.duration,
                    Message::NoteOff(NoteValue {
                        channel: v.channel,
                        note: v.note,
                        velocity: v.release,
                    }),
                ));
                v.duration = 0;
                v.release = Velocity::new(0);
                count += 1;
            }
        }
    }
    for off in offs.into_live_events() {
        track.insert(off);
    }
    count
}

/// Replace note-offs with note-ons of velocity zero, enabling longer running-status runs when
/// written. With `force` unset, the replacement only happens when every note-off in the track
/// shares a single release velocity (otherwise information would be lost). The cursor is left
/// where it was.
pub fn compress_note_off(track: &mut Track, force: bool) {
    let saved = track.getpos();
    let mut convert = force;
    if !convert {
        convert = true;
        let mut velocity: Option<u8> = None;
        track.rewind();
        while let Some(e) = track.step(Direction::Forward) {
            if let Message::NoteOff(v) = &e.msg {
                match velocity {
                    None => velocity = Some(v.velocity.get()),
                    Some(first) if first != v.velocity.get() => {
                        convert = false;
                        break;
                    }
                    Some(_) => {}
                }
            }
        }
    }
    if convert {
        track.rewind();
        while let Some(e) = track.step_mut(Direction::Forward) {
            if let Message::NoteOff(v) = &e.msg {
                let v = *v;
                e.msg = Message::NoteOn(NoteOnValue::new(v.channel, v.note, Velocity::new(0)));
            }
        }
    }
    track.setpos(saved);
}

/// Merge every track of the score into the first, establishing the one total event order. Of the
/// end-of-track events only the latest survives, so the merged track ends exactly once.
pub fn merge_tracks(score: &mut Score) {
    if score.tracks.is_empty() {
        return;
    }
    let rest = score.tracks.split_off(1);
    let merged = &mut score.tracks[0];
    for track in rest {
        for event in track.into_live_events() {
            merged.insert(event);
        }
    }

    // Walk backward from the end: the last event is the surviving end-of-track, every earlier
    // one is deleted.
    merged.rewind();
    let last_is_eot = merged
        .step(Direction::Backward)
        .map(|e| e.msg.is_end_of_track())
        .unwrap_or(false);
    if !last_is_eot {
        diag!(Severity::Warn, "merged track does not end with `End Of Track`");
        merged.rewind();
    }
    while let Some(e) = merged.step(Direction::Backward) {
        if e.msg.is_end_of_track() {
            merged.delete();
        }
    }
}

/// Keep only the tracks with indices in `[from, to]` (inclusive, zero-based) and destroy the
/// rest. An empty or out-of-range selection empties the score.
pub fn adjust_tracks(score: &mut Score, from: usize, to: usize) {
    if from > to || from >= score.tracks.len() {
        score.tracks.clear();
        return;
    }
    let to = to.min(score.tracks.len() - 1);
    score.tracks.truncate(to + 1);
    score.tracks.drain(..from);
}
