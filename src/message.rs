/*!
The `message` module holds the typed representation of every message that can appear in a track,
and the codec that moves one message at a time between a [`Buffer`] and that representation.

Three families exist on the wire. Channel-voice messages (`0x8n`–`0xEn`) carry their channel in
the low nibble of the status byte and use *running status*: consecutive messages with the same
status byte may omit it. System-exclusive messages (`0xF0`, `0xF7`) carry an opaque,
length-prefixed payload. Meta messages (`0xFF type length data`) are decoded into one typed
variant per recognized type; unrecognized types are kept raw so they can be written back intact.
!*/

use crate::buffer::Buffer;
use crate::diag::Severity;
use crate::error::LibResult;
use crate::num::{Channel, ControlValue, Controller, NoteNumber, Program, Velocity, U7};
use crate::vlq::{read_vld, write_vld, write_vlq, Vld};
use log::trace;

pub(crate) const STATUS_NOTE_OFF: u8 = 0x80;
pub(crate) const STATUS_NOTE_ON: u8 = 0x90;
pub(crate) const STATUS_KEY_PRESSURE: u8 = 0xa0;
pub(crate) const STATUS_CONTROL_CHANGE: u8 = 0xb0;
pub(crate) const STATUS_PROGRAM_CHANGE: u8 = 0xc0;
pub(crate) const STATUS_CHANNEL_PRESSURE: u8 = 0xd0;
pub(crate) const STATUS_PITCH_WHEEL: u8 = 0xe0;
pub(crate) const STATUS_SYSEX: u8 = 0xf0;
pub(crate) const STATUS_SYSEX_CONT: u8 = 0xf7;
pub(crate) const STATUS_META: u8 = 0xff;

pub(crate) const META_SEQUENCE_NUMBER: u8 = 0x00;
pub(crate) const META_TEXT: u8 = 0x01;
pub(crate) const META_COPYRIGHT: u8 = 0x02;
pub(crate) const META_TRACK_NAME: u8 = 0x03;
pub(crate) const META_INSTRUMENT_NAME: u8 = 0x04;
pub(crate) const META_LYRIC: u8 = 0x05;
pub(crate) const META_MARKER: u8 = 0x06;
pub(crate) const META_CUE_POINT: u8 = 0x07;
pub(crate) const META_CHANNEL_PREFIX: u8 = 0x20;
pub(crate) const META_PORT_PREFIX: u8 = 0x21;
pub(crate) const META_END_OF_TRACK: u8 = 0x2f;
pub(crate) const META_SET_TEMPO: u8 = 0x51;
pub(crate) const META_SMPTE_OFFSET: u8 = 0x54;
pub(crate) const META_TIME_SIGNATURE: u8 = 0x58;
pub(crate) const META_KEY_SIGNATURE: u8 = 0x59;
pub(crate) const META_SEQUENCER_SPECIFIC: u8 = 0x7f;

/// The largest value a `SetTempo` message can carry (24 bits of microseconds per quarter-note).
pub const MAX_TEMPO: u32 = 0x00ff_ffff;

/// The channel-voice status byte most recently seen on a stream. Each independently decoded or
/// encoded stream owns one of these; the codec never keeps running-status state of its own.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct RunningStatus {
    status: Option<u8>,
}

impl RunningStatus {
    /// A cleared accumulator: the next message must carry its own status byte.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the current status, e.g. at a meta-message boundary.
    pub fn clear(&mut self) {
        self.status = None;
    }

    pub(crate) fn get(&self) -> Option<u8> {
        self.status
    }

    pub(crate) fn set(&mut self, status: u8) {
        self.status = Some(status);
    }
}

/// The fields of a `NoteOff` or `KeyPressure` message.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct NoteValue {
    pub channel: Channel,
    pub note: NoteNumber,
    pub velocity: Velocity,
}

/// The fields of a `NoteOn` message. On the wire `duration` and `release` are always zero; the
/// note-pairing transform fills them in when it absorbs the matching `NoteOff`, turning this into
/// a combined note. A combined note must be unpaired again before it can be written.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct NoteOnValue {
    pub channel: Channel,
    pub note: NoteNumber,
    pub velocity: Velocity,
    pub duration: u32,
    pub release: Velocity,
}

impl NoteOnValue {
    /// A plain, un-combined `NoteOn`.
    pub fn new(channel: Channel, note: NoteNumber, velocity: Velocity) -> Self {
        Self {
            channel,
            note,
            velocity,
            duration: 0,
            release: Velocity::new(0),
        }
    }
}

/// The fields of a `ControlChange` message.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct ControlChangeValue {
    pub channel: Channel,
    pub controller: Controller,
    pub value: ControlValue,
}

/// The fields of a `ProgramChange` message.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct ProgramChangeValue {
    pub channel: Channel,
    pub program: Program,
}

/// The fields of a `ChannelPressure` message.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct ChannelPressureValue {
    pub channel: Channel,
    pub velocity: Velocity,
}

/// The fields of a `PitchWheelChange` message. The position is a 14-bit quantity carried as two
/// seven-bit halves, least significant first on the wire.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct PitchWheelValue {
    pub channel: Channel,
    pub lsb: U7,
    pub msb: U7,
}

/// `FF 54 05 hr mn se fr ff`: the SMPTE time at which a track is supposed to start. Held as raw
/// bytes; decoding SMPTE time is out of scope.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct SmpteOffsetValue {
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
    pub frames: u8,
    pub subframes: u8,
}

/// `FF 58 04 nn dd cc bb`: a time signature. `denominator` is the notated power of two (3 means
/// an eighth note), `clocks_per_click` the MIDI clocks per metronome click, `tt_per_quarter` the
/// notated 32nd-notes per MIDI quarter-note. All four travel as raw bytes.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct TimeSignatureValue {
    pub numerator: u8,
    pub denominator: u8,
    pub clocks_per_click: u8,
    pub tt_per_quarter: u8,
}

/// `FF 59 02 sf mi`: a key signature. `sharps_flats` is negative for flats (-7 through 7);
/// `minor` is 0 for major, 1 for minor.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct KeySignatureValue {
    pub sharps_flats: i8,
    pub minor: u8,
}

/// Every message a track can hold. The first seven variants are channel-voice messages; then the
/// two system-exclusive forms; then the meta taxonomy. `Empty` never appears on the wire: it is
/// the tombstone a track leaves behind when an event is deleted in place.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Message {
    NoteOff(NoteValue),
    NoteOn(NoteOnValue),
    KeyPressure(NoteValue),
    ControlChange(ControlChangeValue),
    ProgramChange(ProgramChangeValue),
    ChannelPressure(ChannelPressureValue),
    PitchWheelChange(PitchWheelValue),
    SystemExclusive(Vld),
    SystemExclusiveCont(Vld),
    SequenceNumber(u16),
    Text(Vld),
    Copyright(Vld),
    TrackName(Vld),
    InstrumentName(Vld),
    Lyric(Vld),
    Marker(Vld),
    CuePoint(Vld),
    ChannelPrefix(Channel),
    PortPrefix(u8),
    EndOfTrack,
    SetTempo(u32),
    SmpteOffset(SmpteOffsetValue),
    TimeSignature(TimeSignatureValue),
    KeySignature(KeySignatureValue),
    SequencerSpecific(Vld),
    UnknownMeta { meta_type: u8, data: Vld },
    Empty,
}

impl Default for Message {
    fn default() -> Self {
        Message::EndOfTrack
    }
}

impl Message {
    /// Returns `true` for the channel-voice variants.
    pub fn is_voice(&self) -> bool {
        matches!(
            self,
            Message::NoteOff(_)
                | Message::NoteOn(_)
                | Message::KeyPressure(_)
                | Message::ControlChange(_)
                | Message::ProgramChange(_)
                | Message::ChannelPressure(_)
                | Message::PitchWheelChange(_)
        )
    }

    /// The channel of a channel-voice message, `None` for everything else.
    pub fn channel(&self) -> Option<Channel> {
        match self {
            Message::NoteOff(v) => Some(v.channel),
            Message::NoteOn(v) => Some(v.channel),
            Message::KeyPressure(v) => Some(v.channel),
            Message::ControlChange(v) => Some(v.channel),
            Message::ProgramChange(v) => Some(v.channel),
            Message::ChannelPressure(v) => Some(v.channel),
            Message::PitchWheelChange(v) => Some(v.channel),
            _ => None,
        }
    }

    /// Returns `true` for `EndOfTrack`.
    pub fn is_end_of_track(&self) -> bool {
        matches!(self, Message::EndOfTrack)
    }

    /// Returns `true` for the internal tombstone.
    pub fn is_empty_slot(&self) -> bool {
        matches!(self, Message::Empty)
    }

    /// A `NoteOff`, or the equivalent `NoteOn` with velocity zero.
    pub(crate) fn is_note_off_like(&self) -> bool {
        match self {
            Message::NoteOff(_) => true,
            Message::NoteOn(v) => v.velocity.get() == 0,
            _ => false,
        }
    }

    /// A sounding `NoteOn` (velocity above zero).
    pub(crate) fn is_note_on_like(&self) -> bool {
        matches!(self, Message::NoteOn(v) if v.velocity.get() != 0)
    }

    /// Drop any owned payload and retag this slot as the tombstone.
    pub(crate) fn clear(&mut self) {
        *self = Message::Empty;
    }

    /// Read one message at the cursor. `rs` is the stream's running-status accumulator: a leading
    /// data byte re-uses the remembered status, a voice status byte replaces it, and a meta
    /// status byte clears it. On any failure the cursor is restored to where it was.
    pub(crate) fn read(buf: &mut Buffer, rs: &mut RunningStatus) -> LibResult<Self> {
        let start = buf.pos();
        let result = Self::read_inner(buf, rs, start);
        if result.is_err() {
            buf.set_pos(start);
        }
        result
    }

    fn read_inner(buf: &mut Buffer, rs: &mut RunningStatus, start: usize) -> LibResult<Self> {
        let first = match buf.get() {
            Some(b) => b,
            None => {
                diag!(
                    Severity::Error,
                    "reading message at offset {}: end of input",
                    start
                );
                return truncated!().fail();
            }
        };

        let status = if first & 0x80 == 0 {
            // A data byte in status position: running-status continuation. Rewind so the byte is
            // consumed again as data.
            buf.set_pos(start);
            match rs.get() {
                Some(s) => s,
                None => {
                    diag!(
                        Severity::Error,
                        "reading message at offset {}: data byte {:#04x} without running status",
                        start,
                        first
                    );
                    return crate::error::BadStatusSnafu {
                        site: site!(),
                        byte: first,
                    }
                    .fail();
                }
            }
        } else {
            first
        };

        let channel = Channel::new(status & 0x0f);
        match status & 0xf0 {
            STATUS_NOTE_OFF => {
                let msg = Message::NoteOff(NoteValue {
                    channel,
                    note: data_byte(buf, start)?.into(),
                    velocity: data_byte(buf, start)?.into(),
                });
                rs.set(status);
                Ok(msg)
            }
            STATUS_NOTE_ON => {
                let msg = Message::NoteOn(NoteOnValue::new(
                    channel,
                    data_byte(buf, start)?.into(),
                    data_byte(buf, start)?.into(),
                ));
                rs.set(status);
                Ok(msg)
            }
            STATUS_KEY_PRESSURE => {
                let msg = Message::KeyPressure(NoteValue {
                    channel,
                    note: data_byte(buf, start)?.into(),
                    velocity: data_byte(buf, start)?.into(),
                });
                rs.set(status);
                Ok(msg)
            }
            STATUS_CONTROL_CHANGE => {
                let msg = Message::ControlChange(ControlChangeValue {
                    channel,
                    controller: data_byte(buf, start)?.into(),
                    value: data_byte(buf, start)?.into(),
                });
                rs.set(status);
                Ok(msg)
            }
            STATUS_PROGRAM_CHANGE => {
                let msg = Message::ProgramChange(ProgramChangeValue {
                    channel,
                    program: data_byte(buf, start)?.into(),
                });
                rs.set(status);
                Ok(msg)
            }
            STATUS_CHANNEL_PRESSURE => {
                let msg = Message::ChannelPressure(ChannelPressureValue {
                    channel,
                    velocity: data_byte(buf, start)?.into(),
                });
                rs.set(status);
                Ok(msg)
            }
            STATUS_PITCH_WHEEL => {
                // Least significant seven bits travel first.
                let msg = Message::PitchWheelChange(PitchWheelValue {
                    channel,
                    lsb: data_byte(buf, start)?.into(),
                    msb: data_byte(buf, start)?.into(),
                });
                rs.set(status);
                Ok(msg)
            }
            _ => Self::read_system(buf, rs, status, start),
        }
    }

    fn read_system(
        buf: &mut Buffer,
        rs: &mut RunningStatus,
        status: u8,
        start: usize,
    ) -> LibResult<Self> {
        match status {
            STATUS_SYSEX => Ok(Message::SystemExclusive(read_vld(buf)?)),
            STATUS_SYSEX_CONT => Ok(Message::SystemExclusiveCont(read_vld(buf)?)),
            STATUS_META => {
                // At least two more bytes must exist: the type and the length.
                if !buf.request(2) {
                    diag!(
                        Severity::Error,
                        "reading meta message at offset {}: end of input",
                        start
                    );
                    return truncated!().fail();
                }
                let meta_type = buf.get().unwrap_or(0);
                let data = read_vld(buf)?;
                rs.clear();
                let msg = convert_meta(meta_type, data)?;
                trace!("decoded meta message {:?}", msg);
                Ok(msg)
            }
            _ => {
                diag!(
                    Severity::Error,
                    "unknown message type {:#04x} at offset {}",
                    status,
                    start
                );
                crate::error::UnknownStatusSnafu {
                    site: site!(),
                    byte: status,
                }
                .fail()
            }
        }
    }

    /// Write one message at the cursor. `rs`, when given, enables running status: the status byte
    /// is omitted when it matches the accumulator, and the accumulator tracks what was written.
    /// System-exclusive and meta messages always write their status byte and clear the
    /// accumulator. A combined note or a tombstone reaching here is an internal error.
    pub(crate) fn write(&self, buf: &mut Buffer, rs: Option<&mut RunningStatus>) -> LibResult<()> {
        match self {
            Message::NoteOff(v) => {
                write_voice_status(buf, rs, STATUS_NOTE_OFF | v.channel.get());
                buf.put(v.note.get());
                buf.put(v.velocity.get());
                Ok(())
            }
            Message::NoteOn(v) => {
                if v.duration != 0 {
                    diag!(Severity::Fatal, "writing message: combined note");
                    return invariant!("a combined note cannot be written; unpair it first").fail();
                }
                write_voice_status(buf, rs, STATUS_NOTE_ON | v.channel.get());
                buf.put(v.note.get());
                buf.put(v.velocity.get());
                Ok(())
            }
            Message::KeyPressure(v) => {
                write_voice_status(buf, rs, STATUS_KEY_PRESSURE | v.channel.get());
                buf.put(v.note.get());
                buf.put(v.velocity.get());
                Ok(())
            }
            Message::ControlChange(v) => {
                write_voice_status(buf, rs, STATUS_CONTROL_CHANGE | v.channel.get());
                buf.put(v.controller.get());
                buf.put(v.value.get());
                Ok(())
            }
            Message::ProgramChange(v) => {
                write_voice_status(buf, rs, STATUS_PROGRAM_CHANGE | v.channel.get());
                buf.put(v.program.get());
                Ok(())
            }
            Message::ChannelPressure(v) => {
                write_voice_status(buf, rs, STATUS_CHANNEL_PRESSURE | v.channel.get());
                buf.put(v.velocity.get());
                Ok(())
            }
            Message::PitchWheelChange(v) => {
                write_voice_status(buf, rs, STATUS_PITCH_WHEEL | v.channel.get());
                buf.put(v.lsb.get());
                buf.put(v.msb.get());
                Ok(())
            }
            Message::SystemExclusive(data) => {
                clear_rs(rs);
                buf.put(STATUS_SYSEX);
                write_vld(buf, data)?;
                Ok(())
            }
            Message::SystemExclusiveCont(data) => {
                clear_rs(rs);
                buf.put(STATUS_SYSEX_CONT);
                write_vld(buf, data)?;
                Ok(())
            }
            Message::Empty => {
                diag!(Severity::Fatal, "writing message: empty slot");
                invariant!("a tombstone cannot be written").fail()
            }
            _ => self.write_meta(buf, rs),
        }
    }

    fn write_meta(&self, buf: &mut Buffer, rs: Option<&mut RunningStatus>) -> LibResult<()> {
        clear_rs(rs);
        buf.put(STATUS_META);
        match self {
            Message::SequenceNumber(n) => {
                buf.put(META_SEQUENCE_NUMBER);
                write_vlq(buf, 2)?;
                buf.put((n >> 8) as u8);
                buf.put((n & 0xff) as u8);
            }
            Message::Text(t) => write_meta_vld(buf, META_TEXT, t)?,
            Message::Copyright(t) => write_meta_vld(buf, META_COPYRIGHT, t)?,
            Message::TrackName(t) => write_meta_vld(buf, META_TRACK_NAME, t)?,
            Message::InstrumentName(t) => write_meta_vld(buf, META_INSTRUMENT_NAME, t)?,
            Message::Lyric(t) => write_meta_vld(buf, META_LYRIC, t)?,
            Message::Marker(t) => write_meta_vld(buf, META_MARKER, t)?,
            Message::CuePoint(t) => write_meta_vld(buf, META_CUE_POINT, t)?,
            Message::ChannelPrefix(channel) => {
                buf.put(META_CHANNEL_PREFIX);
                write_vlq(buf, 1)?;
                buf.put(channel.get());
            }
            Message::PortPrefix(port) => {
                buf.put(META_PORT_PREFIX);
                write_vlq(buf, 1)?;
                buf.put(*port);
            }
            Message::EndOfTrack => {
                buf.put(META_END_OF_TRACK);
                write_vlq(buf, 0)?;
            }
            Message::SetTempo(tempo) => {
                if *tempo > MAX_TEMPO {
                    diag!(Severity::Fatal, "writing set tempo: out of range");
                    return range!("tempo {} does not fit in 24 bits", tempo).fail();
                }
                buf.put(META_SET_TEMPO);
                write_vlq(buf, 3)?;
                buf.put((tempo >> 16) as u8);
                buf.put((tempo >> 8) as u8);
                buf.put((tempo & 0xff) as u8);
            }
            Message::SmpteOffset(v) => {
                buf.put(META_SMPTE_OFFSET);
                write_vlq(buf, 5)?;
                buf.put(v.hours);
                buf.put(v.minutes);
                buf.put(v.seconds);
                buf.put(v.frames);
                buf.put(v.subframes);
            }
            Message::TimeSignature(v) => {
                buf.put(META_TIME_SIGNATURE);
                write_vlq(buf, 4)?;
                buf.put(v.numerator);
                buf.put(v.denominator);
                buf.put(v.clocks_per_click);
                buf.put(v.tt_per_quarter);
            }
            Message::KeySignature(v) => {
                buf.put(META_KEY_SIGNATURE);
                write_vlq(buf, 2)?;
                buf.put(v.sharps_flats as u8);
                buf.put(v.minor);
            }
            Message::SequencerSpecific(data) => write_meta_vld(buf, META_SEQUENCER_SPECIFIC, data)?,
            Message::UnknownMeta { meta_type, data } => write_meta_vld(buf, *meta_type, data)?,
            _ => {
                diag!(Severity::Fatal, "writing message: unknown message type");
                return invariant!("{:?} is not a meta message", self).fail();
            }
        }
        Ok(())
    }
}

/// Read one data byte, which must have its high bit clear.
fn data_byte(buf: &mut Buffer, start: usize) -> LibResult<u8> {
    match buf.get() {
        None => {
            diag!(
                Severity::Error,
                "reading message at offset {}: end of input",
                start
            );
            truncated!().fail()
        }
        Some(b) if b & 0x80 != 0 => {
            diag!(
                Severity::Error,
                "reading message at offset {}: status byte {:#04x} where data was expected",
                start,
                b
            );
            range!("data byte {:#04x} has its high bit set", b).fail()
        }
        Some(b) => Ok(b),
    }
}

fn clear_rs(rs: Option<&mut RunningStatus>) {
    if let Some(rs) = rs {
        rs.clear();
    }
}

/// Write a channel-voice status byte, omitting it when running status is enabled and already
/// holds the same value.
fn write_voice_status(buf: &mut Buffer, rs: Option<&mut RunningStatus>, status: u8) {
    match rs {
        Some(rs) => {
            if rs.get() != Some(status) {
                buf.put(status);
            }
            rs.set(status);
        }
        None => buf.put(status),
    }
}

fn write_meta_vld(buf: &mut Buffer, meta_type: u8, data: &Vld) -> LibResult<()> {
    buf.put(meta_type);
    write_vld(buf, data)?;
    Ok(())
}

/// Turn a raw meta payload into its typed variant, validating the length mandated for the type.
/// Too little data is an error; extra data gets a warning and is dropped for fixed-size types.
fn convert_meta(meta_type: u8, data: Vld) -> LibResult<Message> {
    let bytes = data.as_bytes();
    let check = |need: usize, name: &str| -> LibResult<()> {
        if bytes.len() < need {
            diag!(Severity::Error, "{}: too short data", name);
            return range!("{} payload of {} bytes, {} required", name, bytes.len(), need).fail();
        }
        if bytes.len() > need {
            diag!(Severity::Warn, "{}: long data", name);
        }
        Ok(())
    };
    match meta_type {
        META_SEQUENCE_NUMBER => {
            check(2, "sequence number")?;
            Ok(Message::SequenceNumber(
                u16::from(bytes[0]) << 8 | u16::from(bytes[1]),
            ))
        }
        META_TEXT => Ok(Message::Text(data)),
        META_COPYRIGHT => Ok(Message::Copyright(data)),
        META_TRACK_NAME => Ok(Message::TrackName(data)),
        META_INSTRUMENT_NAME => Ok(Message::InstrumentName(data)),
        META_LYRIC => Ok(Message::Lyric(data)),
        META_MARKER => Ok(Message::Marker(data)),
        META_CUE_POINT => Ok(Message::CuePoint(data)),
        META_CHANNEL_PREFIX => {
            check(1, "channel prefix")?;
            if bytes[0] > Channel::MAX {
                diag!(Severity::Warn, "channel prefix: channel {} clamped", bytes[0]);
            }
            Ok(Message::ChannelPrefix(Channel::new(bytes[0])))
        }
        META_PORT_PREFIX => {
            check(1, "port prefix")?;
            Ok(Message::PortPrefix(bytes[0]))
        }
        META_END_OF_TRACK => {
            check(0, "end of track")?;
            Ok(Message::EndOfTrack)
        }
        META_SET_TEMPO => {
            check(3, "set tempo")?;
            Ok(Message::SetTempo(
                u32::from(bytes[0]) << 16 | u32::from(bytes[1]) << 8 | u32::from(bytes[2]),
            ))
        }
        META_SMPTE_OFFSET => {
            check(5, "SMPTE offset")?;
            Ok(Message::SmpteOffset(SmpteOffsetValue {
                hours: bytes[0],
                minutes: bytes[1],
                seconds: bytes[2],
                frames: bytes[3],
                subframes: bytes[4],
            }))
        }
        META_TIME_SIGNATURE => {
            check(4, "time signature")?;
            Ok(Message::TimeSignature(TimeSignatureValue {
                numerator: bytes[0],
                denominator: bytes[1],
                clocks_per_click: bytes[2],
                tt_per_quarter: bytes[3],
            }))
        }
        META_KEY_SIGNATURE => {
            check(2, "key signature")?;
            Ok(Message::KeySignature(KeySignatureValue {
                sharps_flats: bytes[0] as i8,
                minor: bytes[1],
            }))
        }
        META_SEQUENCER_SPECIFIC => Ok(Message::SequencerSpecific(data)),
        _ => {
            diag!(Severity::Warn, "unknown meta type {:#04x}", meta_type);
            Ok(Message::UnknownMeta { meta_type, data })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(bytes: &[u8]) -> Vec<Message> {
        let mut buf = Buffer::from_vec(bytes.to_vec());
        let mut rs = RunningStatus::new();
        let mut out = Vec::new();
        while buf.request(1) {
            out.push(Message::read(&mut buf, &mut rs).unwrap());
        }
        out
    }

    #[test]
    fn running_status_decodes() {
        let messages = read_all(&[0x90, 0x40, 0x64, 0x42, 0x65, 0x80, 0x40, 0x00]);
        assert_eq!(3, messages.len());
        assert_eq!(
            Message::NoteOn(NoteOnValue::new(
                Channel::new(0),
                NoteNumber::new(0x40),
                Velocity::new(100)
            )),
            messages[0]
        );
        assert_eq!(
            Message::NoteOn(NoteOnValue::new(
                Channel::new(0),
                NoteNumber::new(0x42),
                Velocity::new(101)
            )),
            messages[1]
        );
        assert_eq!(
            Message::NoteOff(NoteValue {
                channel: Channel::new(0),
                note: NoteNumber::new(0x40),
                velocity: Velocity::new(0),
            }),
            messages[2]
        );
    }

    #[test]
    fn running_status_encodes() {
        let messages = read_all(&[0x90, 0x40, 0x64, 0x42, 0x65, 0x80, 0x40, 0x00]);
        let mut buf = Buffer::new();
        let mut rs = RunningStatus::new();
        for msg in &messages {
            msg.write(&mut buf, Some(&mut rs)).unwrap();
        }
        assert_eq!(
            &[0x90, 0x40, 0x64, 0x42, 0x65, 0x80, 0x40, 0x00],
            buf.as_slice()
        );
    }

    #[test]
    fn no_running_status_writes_every_status() {
        let messages = read_all(&[0x90, 0x40, 0x64, 0x42, 0x65]);
        let mut buf = Buffer::new();
        for msg in &messages {
            msg.write(&mut buf, None).unwrap();
        }
        assert_eq!(&[0x90, 0x40, 0x64, 0x90, 0x42, 0x65], buf.as_slice());
    }

    #[test]
    fn data_byte_without_running_status_fails_and_restores() {
        let mut buf = Buffer::from_vec(vec![0x40, 0x64]);
        let mut rs = RunningStatus::new();
        assert!(Message::read(&mut buf, &mut rs).is_err());
        assert_eq!(0, buf.pos());
    }

    #[test]
    fn truncated_voice_message_restores() {
        let mut buf = Buffer::from_vec(vec![0x91, 0x40]);
        let mut rs = RunningStatus::new();
        assert!(Message::read(&mut buf, &mut rs).is_err());
        assert_eq!(0, buf.pos());
    }

    #[test]
    fn unknown_status_fails_and_restores() {
        let mut buf = Buffer::from_vec(vec![0xf4, 0x01]);
        let mut rs = RunningStatus::new();
        assert!(Message::read(&mut buf, &mut rs).is_err());
        assert_eq!(0, buf.pos());
    }

    #[test]
    fn set_tempo_round_trip() {
        let bytes = [0xffu8, 0x51, 0x03, 0x07, 0xa1, 0x20];
        let mut buf = Buffer::from_vec(bytes.to_vec());
        let mut rs = RunningStatus::new();
        rs.set(0x90);
        let msg = Message::read(&mut buf, &mut rs).unwrap();
        assert_eq!(Message::SetTempo(500_000), msg);
        // A meta message clears running status.
        assert_eq!(None, rs.get());
        let mut out = Buffer::new();
        msg.write(&mut out, Some(&mut rs)).unwrap();
        assert_eq!(&bytes, out.as_slice());
    }

    #[test]
    fn pitch_wheel_lsb_first() {
        let mut buf = Buffer::from_vec(vec![0xe3, 0x21, 0x47]);
        let mut rs = RunningStatus::new();
        let msg = Message::read(&mut buf, &mut rs).unwrap();
        match &msg {
            Message::PitchWheelChange(v) => {
                assert_eq!(3, v.channel.get());
                assert_eq!(0x21, v.lsb.get());
                assert_eq!(0x47, v.msb.get());
            }
            other => panic!("expected pitch wheel, got {:?}", other),
        }
        let mut out = Buffer::new();
        msg.write(&mut out, None).unwrap();
        assert_eq!(&[0xe3, 0x21, 0x47], out.as_slice());
    }

    #[test]
    fn unknown_meta_kept_raw() {
        let mut buf = Buffer::from_vec(vec![0xff, 0x42, 0x02, 0xaa, 0xbb]);
        let mut rs = RunningStatus::new();
        let msg = Message::read(&mut buf, &mut rs).unwrap();
        match &msg {
            Message::UnknownMeta { meta_type, data } => {
                assert_eq!(0x42, *meta_type);
                assert_eq!(&[0xaa, 0xbb], data.as_bytes());
            }
            other => panic!("expected unknown meta, got {:?}", other),
        }
        let mut out = Buffer::new();
        msg.write(&mut out, None).unwrap();
        assert_eq!(&[0xff, 0x42, 0x02, 0xaa, 0xbb], out.as_slice());
    }

    #[test]
    fn short_meta_payload_fails_and_restores() {
        // SetTempo with a two-byte payload.
        let mut buf = Buffer::from_vec(vec![0xff, 0x51, 0x02, 0x07, 0xa1]);
        let mut rs = RunningStatus::new();
        assert!(Message::read(&mut buf, &mut rs).is_err());
        assert_eq!(0, buf.pos());
    }

    #[test]
    fn oversize_meta_payload_accepted() {
        // End of track with one stray byte of payload.
        let mut buf = Buffer::from_vec(vec![0xff, 0x2f, 0x01, 0x00]);
        let mut rs = RunningStatus::new();
        assert_eq!(Message::EndOfTrack, Message::read(&mut buf, &mut rs).unwrap());
    }

    #[test]
    fn combined_note_refuses_to_write() {
        let mut v = NoteOnValue::new(Channel::new(0), NoteNumber::new(60), Velocity::new(90));
        v.duration = 30;
        let mut buf = Buffer::new();
        assert!(Message::NoteOn(v).write(&mut buf, None).is_err());
    }

    #[test]
    fn sysex_reads_do_not_disturb_running_status() {
        let mut buf = Buffer::from_vec(vec![
            0x90, 0x40, 0x64, // NoteOn
            0xf0, 0x02, 0x01, 0x02, // sysex, two payload bytes
            0x41, 0x00, // running-status NoteOn, still using 0x90
        ]);
        let mut rs = RunningStatus::new();
        let first = Message::read(&mut buf, &mut rs).unwrap();
        assert!(first.is_note_on_like());
        let sysex = Message::read(&mut buf, &mut rs).unwrap();
        assert!(matches!(sysex, Message::SystemExclusive(_)));
        assert_eq!(Some(0x90), rs.get());
        let third = Message::read(&mut buf, &mut rs).unwrap();
        assert!(third.is_note_off_like());
    }

    #[test]
    fn clear_retags_as_tombstone() {
        let mut msg = Message::TrackName(Vld::new(b"piano".to_vec()).unwrap());
        msg.clear();
        assert!(msg.is_empty_slot());
    }
}
