/*!
The `chunk` module frames the two chunk types of the container format. A file is a sequence of
chunks, each `4-byte ASCII tag, 4-byte big-endian size, size bytes of body`. The scanner here is
deliberately forgiving: bytes that do not start a well-formed chunk are skipped (with a
diagnostic) so that a damaged file still yields whatever intact chunks remain.
!*/

use crate::buffer::Buffer;
use crate::diag::Severity;
use crate::error::LibResult;
use log::trace;

/// The header chunk declares one of three layouts for the tracks that follow.
#[repr(u16)]
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Format {
    /// 0: the file contains a single multi-channel track.
    Single = 0,
    /// 1: the file contains one or more simultaneous tracks of a sequence.
    Multi = 1,
    /// 2: the file contains one or more sequentially independent single-track patterns.
    Sequential = 2,
}

impl Default for Format {
    fn default() -> Self {
        Format::Single
    }
}

impl Format {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(Format::Single),
            1 => Some(Format::Multi),
            2 => Some(Format::Sequential),
            _ => None,
        }
    }

    pub fn as_u16(&self) -> u16 {
        *self as u16
    }
}

/// The `<division>` word of the header: the meaning of one delta-time tick. A zero division is
/// illegal. When bit 15 is set the word is SMPTE-based; it is carried opaquely and written back
/// verbatim, since decoding SMPTE time is out of scope.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Division(u16);

impl Division {
    /// Wrap a raw division word. Zero is refused.
    pub fn new(value: u16) -> crate::Result<Self> {
        Ok(Self::from_u16(value)?)
    }

    pub(crate) fn from_u16(value: u16) -> LibResult<Self> {
        if value == 0 {
            return range!("division of 0 is illegal").fail();
        }
        Ok(Self(value))
    }

    /// The raw division word.
    pub fn get(&self) -> u16 {
        self.0
    }

    /// Returns `true` when the division is SMPTE-based (bit 15 set).
    pub fn is_smpte(&self) -> bool {
        self.0 & 0x8000 != 0
    }

    /// Ticks per quarter-note, or `None` for an SMPTE-based division.
    pub fn ticks_per_quarter(&self) -> Option<u16> {
        if self.is_smpte() {
            None
        } else {
            Some(self.0)
        }
    }
}

impl Default for Division {
    fn default() -> Self {
        Self(120)
    }
}

/// A decoded `MThd` chunk header. `extra_bytes` counts declared header bytes beyond the six that
/// are defined; they sit in the buffer after the header fields and are skipped by the reader.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct HeaderChunk {
    pub format: Format,
    pub ntrk: u16,
    pub division: Division,
    pub extra_bytes: u32,
}

/// A decoded `MTrk` chunk header. The body (`size` bytes of events) follows at the cursor.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct TrackChunk {
    pub size: u32,
}

/// One framed chunk of the container.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Chunk {
    Header(HeaderChunk),
    Track(TrackChunk),
}

/// Check for an `MThd` chunk at the cursor. Consumes it and returns the decoded header on
/// success; restores the cursor and returns `None` otherwise. Structural problems inside an
/// otherwise tagged header (bad size, bad format, zero division) also skip it, with an error
/// diagnostic, so the scanner can resume searching behind it.
fn try_mthd(buf: &mut Buffer) -> Option<HeaderChunk> {
    let start = buf.pos();
    if !buf.request(8) || !eat_tag(buf, b"MThd") {
        buf.set_pos(start);
        return None;
    }
    let size = read_u32(buf);
    if size < 6 {
        diag!(Severity::Error, "skipping header: size too short");
        buf.set_pos(start);
        return None;
    }
    if size > 6 {
        diag!(Severity::Warn, "unusual long header: {} bytes", size);
    }
    if !buf.request(6) {
        diag!(
            Severity::Error,
            "skipping header: truncated header at end of file"
        );
        buf.set_pos(start);
        return None;
    }
    if !buf.request(size as usize) {
        diag!(Severity::Warn, "truncated but usable header at end of file");
    }
    let format_word = read_u16(buf);
    let ntrk = read_u16(buf);
    let division_word = read_u16(buf);
    let format = match Format::from_u16(format_word) {
        Some(f) => f,
        None => {
            diag!(
                Severity::Error,
                "skipping header: illegal format {}",
                format_word
            );
            buf.set_pos(start);
            return None;
        }
    };
    let division = match Division::from_u16(division_word) {
        Ok(d) => d,
        Err(_) => {
            diag!(Severity::Error, "skipping header: division is 0");
            buf.set_pos(start);
            return None;
        }
    };
    Some(HeaderChunk {
        format,
        ntrk,
        division,
        extra_bytes: size - 6,
    })
}

/// As [`try_mthd`], but for `MTrk` chunks. A declared size larger than the bytes remaining is
/// accepted; the event reader stops at end of input anyway.
fn try_mtrk(buf: &mut Buffer) -> Option<TrackChunk> {
    let start = buf.pos();
    if !buf.request(8) || !eat_tag(buf, b"MTrk") {
        buf.set_pos(start);
        return None;
    }
    let size = read_u32(buf);
    if !buf.request(size as usize) {
        diag!(Severity::Warn, "track size {} extends past end of input", size);
    }
    Some(TrackChunk { size })
}

/// Scan forward from the cursor for the next well-formed chunk header. On success, returns how
/// many garbage bytes were skipped along with the chunk, and leaves the cursor at the start of
/// the chunk body. When no chunk is found before end of input the cursor is restored and `None`
/// is returned.
pub fn search_chunk(buf: &mut Buffer) -> Option<(usize, Chunk)> {
    let start = buf.pos();
    let mut skipped = 0usize;
    while buf.request(8) {
        if let Some(header) = try_mthd(buf) {
            trace!("found MThd after {} skipped bytes", skipped);
            return Some((skipped, Chunk::Header(header)));
        }
        if let Some(track) = try_mtrk(buf) {
            trace!("found MTrk after {} skipped bytes", skipped);
            return Some((skipped, Chunk::Track(track)));
        }
        let _ = buf.get();
        skipped += 1;
    }
    buf.set_pos(start);
    None
}

/// Write a fourteen-byte `MThd` chunk with the given fields.
pub fn write_mthd(buf: &mut Buffer, format: Format, ntrk: u16, division: Division) {
    for &byte in b"MThd" {
        buf.put(byte);
    }
    put_u32(buf, 6);
    put_u16(buf, format.as_u16());
    put_u16(buf, ntrk);
    put_u16(buf, division.get());
}

/// Write an eight-byte `MTrk` chunk header declaring `size` body bytes. Callers typically write
/// a placeholder size, emit the body, then reposition and rewrite the real size.
pub fn write_mtrk(buf: &mut Buffer, size: u32) {
    for &byte in b"MTrk" {
        buf.put(byte);
    }
    put_u32(buf, size);
}

fn eat_tag(buf: &mut Buffer, tag: &[u8; 4]) -> bool {
    for &expected in tag {
        if buf.get() != Some(expected) {
            return false;
        }
    }
    true
}

fn read_u16(buf: &mut Buffer) -> u16 {
    let hi = buf.get().unwrap_or(0);
    let lo = buf.get().unwrap_or(0);
    u16::from(hi) << 8 | u16::from(lo)
}

fn read_u32(buf: &mut Buffer) -> u32 {
    u32::from(read_u16(buf)) << 16 | u32::from(read_u16(buf))
}

fn put_u16(buf: &mut Buffer, value: u16) {
    buf.put((value >> 8) as u8);
    buf.put((value & 0xff) as u8);
}

fn put_u32(buf: &mut Buffer, value: u32) {
    put_u16(buf, (value >> 16) as u16);
    put_u16(buf, (value & 0xffff) as u16);
}
