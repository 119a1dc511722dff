/*!
A library for reading, transforming and writing Standard MIDI Files, together with the `midikit`
command-line tool built on top of it.

A file is slurped into a [`Buffer`], decoded into a [`Score`] (header fields plus one [`Track`]
per `MTrk` chunk, with delta times converted to absolute ticks), edited through the track engine
and the [`transform`] operations, and written back out. The reader is deliberately tolerant:
damaged chunks are skipped, a missing end-of-track is synthesized, and every oddity is reported
through the pluggable [`diag`] sink rather than aborting the parse.

```
use midikit::track::Direction;
use midikit::{Buffer, Score};

let mut bytes = b"MThd\x00\x00\x00\x06\x00\x00\x00\x01\x00\x78".to_vec();
bytes.extend_from_slice(b"MTrk\x00\x00\x00\x04\x00\xff\x2f\x00");

let mut buf = Buffer::from_vec(bytes);
let mut score = Score::read(&mut buf).expect("a well-formed file");
assert_eq!(1, score.ntrk());
let track = &mut score.tracks[0];
track.rewind();
while let Some(event) = track.step(Direction::Forward) {
    println!("{:>8} {:?}", event.time, event.msg);
}
```
!*/

// https://www.music.mcgill.ca/~gary/306/week9/smf.html

#[macro_use]
mod error;
#[macro_use]
pub mod diag;

pub mod buffer;
pub mod chunk;
pub mod event;
pub mod message;
pub mod num;
pub mod score;
pub mod track;
pub mod transform;
pub mod vlq;

pub use buffer::Buffer;
pub use chunk::{Division, Format};
pub use error::{Error, Result};
pub use event::Event;
pub use message::{Message, RunningStatus};
pub use score::Score;
pub use track::{Direction, Track};
pub use vlq::Vld;
