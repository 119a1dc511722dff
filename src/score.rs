/*!
The `score` module assembles whole files. Reading walks the chunk layer: an optional header, then
one track per `MTrk` chunk, decoding events with delta times converted to absolute ticks on the
way in. Writing is the inverse, with track sizes backpatched once the body length is known.

A buffer may hold several scores back to back; [`Score::read`] consumes one and leaves the cursor
where the next could begin.
!*/

use crate::buffer::Buffer;
use crate::chunk::{search_chunk, write_mthd, write_mtrk, Chunk, Division, Format};
use crate::diag::Severity;
use crate::error::LibResult;
use crate::event::Event;
use crate::message::{Message, RunningStatus};
use crate::track::{Direction, Track};
use crate::vlq::write_vlq;
use log::{debug, trace};

/// A whole decoded file: the header fields and the tracks. The track count of the header is
/// derived from `tracks` when writing; a mismatch with what a file declared is reported while
/// reading but the discovered count wins.
#[derive(Clone, Debug, Default)]
pub struct Score {
    pub format: Format,
    pub division: Division,
    pub tracks: Vec<Track>,
}

impl Score {
    pub fn new(format: Format, division: Division) -> Self {
        Self {
            format,
            division,
            tracks: Vec::new(),
        }
    }

    /// The number of tracks currently held.
    pub fn ntrk(&self) -> usize {
        self.tracks.len()
    }

    /// Read the next score from the buffer. Returns `None`, with a diagnostic, when no header or
    /// track chunk can be found. A missing header yields default fields (format 0, division 120)
    /// and a warning.
    pub fn read(buf: &mut Buffer) -> Option<Score> {
        let mut score = Score::default();
        let (mut size, declared_ntrk) = read_header(buf, &mut score)?;
        loop {
            if size == 0 {
                diag!(Severity::Warn, "empty track");
            }
            let mut track = Track::new();
            read_events(buf, size, &mut track);
            score.tracks.push(track);
            match read_track(buf) {
                Some(next) => size = next,
                None => break,
            }
        }
        if let Some(declared) = declared_ntrk {
            let found = score.tracks.len();
            if found < declared as usize {
                diag!(Severity::Error, "{} tracks missing", declared as usize - found);
            } else if found > declared as usize {
                diag!(
                    Severity::Error,
                    "{} extraneous tracks",
                    found - declared as usize
                );
            }
        }
        debug!("read score with {} tracks", score.tracks.len());
        Some(score)
    }

    /// Write the score: a header chunk followed by every track.
    pub fn write(&mut self, buf: &mut Buffer) -> crate::Result<()> {
        write_mthd(buf, self.format, self.tracks.len() as u16, self.division);
        self.write_tracks(buf, false)
    }

    /// Write only the track chunks. With `concat` set, a single `MTrk` receives the events of
    /// every track in order and only the final end-of-track event is kept. Each track's cursor
    /// is rewound in the process.
    pub fn write_tracks(&mut self, buf: &mut Buffer, concat: bool) -> crate::Result<()> {
        Ok(self.write_tracks_inner(buf, concat)?)
    }

    fn write_tracks_inner(&mut self, buf: &mut Buffer, concat: bool) -> LibResult<()> {
        if self.tracks.is_empty() {
            return Ok(());
        }
        let ntrk = self.tracks.len();
        let mut rs = RunningStatus::new();
        let mut header_pos = 0usize;
        let mut body_pos = 0usize;
        for (index, track) in self.tracks.iter_mut().enumerate() {
            if index == 0 || !concat {
                header_pos = buf.pos();
                write_mtrk(buf, 0);
                body_pos = buf.pos();
                rs = RunningStatus::new();
            }
            let mut time: u32 = 0;
            track.rewind();
            while let Some(e) = track.step(Direction::Forward) {
                let delta = match e.time.checked_sub(time) {
                    Some(d) => d,
                    None => {
                        diag!(Severity::Fatal, "writing track: events out of order");
                        return invariant!(
                            "event at time {} after time {}; the track is not sorted",
                            e.time,
                            time
                        )
                        .fail();
                    }
                };
                time = e.time;
                // In concat mode all but the very last end-of-track disappear.
                if concat && index != ntrk - 1 && e.msg.is_end_of_track() {
                    continue;
                }
                write_vlq(buf, delta)?;
                e.msg.write(buf, Some(&mut rs))?;
            }
            if !concat {
                backpatch_size(buf, header_pos, body_pos);
            }
        }
        if concat {
            backpatch_size(buf, header_pos, body_pos);
        }
        Ok(())
    }
}

/// Rewrite the `MTrk` header at `header_pos` with the body length that is now known.
fn backpatch_size(buf: &mut Buffer, header_pos: usize, body_pos: usize) {
    let end = buf.pos();
    buf.set_pos(header_pos);
    write_mtrk(buf, (end - body_pos) as u32);
    buf.set_pos(end);
}

/// Read the optional score header and the first track header. Returns the first track's declared
/// size and, when a header chunk was present, its declared track count.
fn read_header(buf: &mut Buffer, score: &mut Score) -> Option<(u32, Option<u16>)> {
    if !buf.request(1) {
        return None;
    }
    let (skipped, chunk) = search_chunk(buf)?;
    if skipped > 0 {
        diag!(Severity::Error, "{} bytes skipped", skipped);
    }
    let header = match chunk {
        Chunk::Track(t) => {
            diag!(
                Severity::Warn,
                "no score header; assuming format 0, division 120"
            );
            return Some((t.size, None));
        }
        Chunk::Header(h) => h,
    };
    if header.extra_bytes > 0 {
        diag!(
            Severity::Warn,
            "large score header ({} extra bytes)",
            header.extra_bytes
        );
        let pos = buf.pos();
        buf.set_pos(pos + header.extra_bytes as usize);
    }
    score.format = header.format;
    score.division = header.division;

    // The first track chunk must follow.
    let pos = buf.pos();
    if !buf.request(1) {
        diag!(Severity::Error, "no tracks");
        return None;
    }
    match search_chunk(buf) {
        None => {
            diag!(Severity::Error, "no tracks");
            None
        }
        Some((skipped, Chunk::Track(t))) => {
            if skipped > 0 {
                diag!(Severity::Error, "{} bytes skipped", skipped);
            }
            Some((t.size, Some(header.ntrk)))
        }
        Some((_, Chunk::Header(_))) => {
            diag!(Severity::Error, "no tracks");
            buf.set_pos(pos);
            None
        }
    }
}

/// Find the next track chunk and return its declared size. A header chunk (the start of another
/// score) or end of input ends this score; the cursor is restored so the caller can hand over.
fn read_track(buf: &mut Buffer) -> Option<u32> {
    let pos = buf.pos();
    if !buf.request(1) {
        return None;
    }
    match search_chunk(buf)? {
        (skipped, Chunk::Track(t)) => {
            if skipped > 0 {
                diag!(Severity::Error, "{} bytes skipped", skipped);
            }
            Some(t.size)
        }
        (_, Chunk::Header(_)) => {
            buf.set_pos(pos);
            None
        }
    }
}

/// Decode events from the next `size` bytes into `track`, converting delta times to absolute
/// ticks. Decoding stops at the end-of-track event, at the end of the declared size, or at the
/// first undecodable event (the chunk scanner will then resynchronize). A missing end-of-track
/// is synthesized at the final time with a warning; data between the end-of-track event and the
/// end of the declared size is discarded with a warning.
fn read_events(buf: &mut Buffer, size: u32, track: &mut Track) {
    let mut rs = RunningStatus::new();
    let mut time: u32 = 0;
    let mut remaining = i64::from(size);
    let mut saw_eot = false;
    while remaining > 0 && buf.request(1) {
        let before = buf.pos();
        let event = match Event::read(buf, &mut rs) {
            Ok(e) => e,
            Err(_) => break,
        };
        remaining -= (buf.pos() - before) as i64;
        time = time.wrapping_add(event.time);
        if event.msg.is_end_of_track() {
            saw_eot = true;
            break;
        }
        trace!("event at {}: {:?}", time, event.msg);
        track.insert(Event::new(time, event.msg));
    }
    if !saw_eot {
        diag!(Severity::Warn, "inserting missing `End Of Track`");
    }
    track.insert(Event::new(time, Message::EndOfTrack));
    if saw_eot && remaining > 0 {
        diag!(Severity::Warn, "ignoring events after `End Of Track`");
        let skip = (remaining as usize).min(buf.remaining());
        let pos = buf.pos();
        buf.set_pos(pos + skip);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::NoteOnValue;
    use crate::num::{Channel, NoteNumber, Velocity};

    fn note_on(time: u32, note: u8) -> Event {
        Event::new(
            time,
            Message::NoteOn(NoteOnValue::new(
                Channel::new(0),
                NoteNumber::new(note),
                Velocity::new(100),
            )),
        )
    }

    fn track_times(track: &mut Track) -> Vec<(u32, bool)> {
        track.rewind();
        let mut out = Vec::new();
        while let Some(e) = track.step(Direction::Forward) {
            out.push((e.time, e.msg.is_end_of_track()));
        }
        out
    }

    #[test]
    fn write_then_read_round_trip() {
        let mut score = Score::new(Format::Multi, Division::new(480).unwrap());
        let mut track = Track::new();
        track.insert(note_on(0, 60));
        track.insert(note_on(120, 64));
        track.insert(Event::new(240, Message::EndOfTrack));
        score.tracks.push(track);

        let mut buf = Buffer::new();
        score.write(&mut buf).unwrap();
        buf.set_pos(0);
        let reread = Score::read(&mut buf).unwrap();
        assert_eq!(Format::Multi, reread.format);
        assert_eq!(480, reread.division.get());
        assert_eq!(1, reread.ntrk());
        let mut track = reread.tracks.into_iter().next().unwrap();
        assert_eq!(
            vec![(0, false), (120, false), (240, true)],
            track_times(&mut track)
        );
    }

    #[test]
    fn headerless_score_gets_defaults() {
        // A single MTrk holding one EndOfTrack event.
        let bytes = b"MTrk\x00\x00\x00\x04\x00\xff\x2f\x00".to_vec();
        let mut buf = Buffer::from_vec(bytes);
        let score = Score::read(&mut buf).unwrap();
        assert_eq!(Format::Single, score.format);
        assert_eq!(120, score.division.get());
        assert_eq!(1, score.ntrk());
    }

    #[test]
    fn truncated_header_is_skipped_and_decoding_continues() {
        // An MThd declaring size 4 is illegal; the scanner steps past it and still finds the
        // track chunk behind it.
        let mut bytes = b"MThd\x00\x00\x00\x04\x00\x00".to_vec();
        bytes.extend_from_slice(b"MTrk\x00\x00\x00\x04\x00\xff\x2f\x00");
        let mut buf = Buffer::from_vec(bytes);
        let score = Score::read(&mut buf).unwrap();
        assert_eq!(1, score.ntrk());
    }

    #[test]
    fn missing_end_of_track_is_synthesized() {
        // Track body: delta 0x10 NoteOn, no EndOfTrack.
        let bytes = b"MTrk\x00\x00\x00\x04\x10\x90\x3c\x64".to_vec();
        let mut buf = Buffer::from_vec(bytes);
        let score = Score::read(&mut buf).unwrap();
        let mut track = score.tracks.into_iter().next().unwrap();
        assert_eq!(
            vec![(0x10, false), (0x10, true)],
            track_times(&mut track)
        );
    }

    #[test]
    fn data_after_end_of_track_is_discarded() {
        // Declared size 8: EndOfTrack at delta 0, then four bytes of leftovers.
        let bytes = b"MTrk\x00\x00\x00\x08\x00\xff\x2f\x00\xde\xad\xbe\xef".to_vec();
        let mut buf = Buffer::from_vec(bytes);
        let score = Score::read(&mut buf).unwrap();
        assert_eq!(1, score.ntrk());
        // The leftovers were consumed along with the declared size.
        assert!(!buf.request(1));
    }

    #[test]
    fn two_scores_in_one_buffer() {
        let mut buf = Buffer::new();
        let mut first = Score::new(Format::Single, Division::new(96).unwrap());
        let mut t = Track::new();
        t.insert(Event::new(0, Message::EndOfTrack));
        first.tracks.push(t);
        first.write(&mut buf).unwrap();
        let mut second = Score::new(Format::Single, Division::new(192).unwrap());
        let mut t = Track::new();
        t.insert(Event::new(7, Message::EndOfTrack));
        second.tracks.push(t);
        second.write(&mut buf).unwrap();

        buf.set_pos(0);
        let a = Score::read(&mut buf).unwrap();
        assert_eq!(96, a.division.get());
        let b = Score::read(&mut buf).unwrap();
        assert_eq!(192, b.division.get());
        assert!(Score::read(&mut buf).is_none());
    }

    #[test]
    fn declared_track_count_mismatch_is_tolerated() {
        // Header declares two tracks, only one follows.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"MThd\x00\x00\x00\x06\x00\x01\x00\x02\x00\x60");
        bytes.extend_from_slice(b"MTrk\x00\x00\x00\x04\x00\xff\x2f\x00");
        let mut buf = Buffer::from_vec(bytes);
        let score = Score::read(&mut buf).unwrap();
        assert_eq!(1, score.ntrk());
    }

    #[test]
    fn concat_mode_writes_one_track_with_one_eot() {
        let mut score = Score::new(Format::Single, Division::new(96).unwrap());
        for start in [0u32, 100] {
            let mut t = Track::new();
            t.insert(note_on(start, 60));
            t.insert(Event::new(start + 50, Message::EndOfTrack));
            score.tracks.push(t);
        }
        let mut buf = Buffer::new();
        score.write_tracks(&mut buf, true).unwrap();

        buf.set_pos(0);
        let reread = Score::read(&mut buf).unwrap();
        assert_eq!(1, reread.ntrk());
        let mut track = reread.tracks.into_iter().next().unwrap();
        let events = track_times(&mut track);
        // One end-of-track, and it is the last event.
        assert_eq!(1, events.iter().filter(|(_, eot)| *eot).count());
        assert!(events.last().unwrap().1);
    }

    #[test]
    fn no_chunks_yields_none() {
        let mut buf = Buffer::from_vec(vec![0u8; 32]);
        assert!(Score::read(&mut buf).is_none());
    }
}
