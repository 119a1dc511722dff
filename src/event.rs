/*!
The `event` module pairs a message with its time. On the wire the time is a variable-length delta
from the previous event; inside a [`crate::track::Track`] it is absolute, counted in ticks from
the start of the track. The score layer converts between the two while reading and writing.
!*/

use crate::buffer::Buffer;
use crate::error::LibResult;
use crate::message::{Message, RunningStatus};
use crate::vlq::{read_vlq, write_vlq};

/// A message and the time at which it occurs.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct Event {
    /// Delta ticks when freshly decoded, absolute ticks once inside a track.
    pub time: u32,
    pub msg: Message,
}

impl Event {
    pub fn new(time: u32, msg: Message) -> Self {
        Self { time, msg }
    }

    /// Read a delta time and the message that follows it. On failure the cursor is restored to
    /// the start of the delta time.
    pub(crate) fn read(buf: &mut Buffer, rs: &mut RunningStatus) -> LibResult<Self> {
        let start = buf.pos();
        let result: LibResult<Self> = (|| {
            let time = read_vlq(buf)?;
            let msg = Message::read(buf, rs)?;
            Ok(Self { time, msg })
        })();
        if result.is_err() {
            buf.set_pos(start);
        }
        result
    }

    /// Write this event's time as a variable-length quantity followed by its message.
    pub(crate) fn write(&self, buf: &mut Buffer, rs: Option<&mut RunningStatus>) -> LibResult<()> {
        write_vlq(buf, self.time)?;
        self.msg.write(buf, rs)
    }
}
