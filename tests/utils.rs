#![allow(dead_code)]

use log::LevelFilter;
use std::io::Write;
use std::sync::Once;

static LOGGER: Once = Once::new();

pub fn enable_logging() {
    LOGGER.call_once(logger_init)
}

fn logger_init() {
    env_logger::Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{}:{} [{}] - {}",
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.level(),
                record.args()
            )
        })
        .filter(None, LevelFilter::Warn)
        .init();
}

/// A complete two-track file, hand-encoded, that exercises running status, variable-length delta
/// times, text and fixed-size meta events. The writer's running-status policy reproduces it
/// byte for byte.
pub fn two_track_file() -> Vec<u8> {
    let mut bytes = Vec::new();
    // MThd: format 1, two tracks, 480 ticks per quarter.
    bytes.extend_from_slice(b"MThd\x00\x00\x00\x06\x00\x01\x00\x02\x01\xe0");
    // Track one: name, time signature, tempo, program change, two notes sharing running status.
    bytes.extend_from_slice(b"MTrk\x00\x00\x00\x2c");
    bytes.extend_from_slice(&[0x00, 0xff, 0x03, 0x05, b'P', b'i', b'a', b'n', b'o']);
    bytes.extend_from_slice(&[0x00, 0xff, 0x58, 0x04, 0x04, 0x02, 0x18, 0x08]);
    bytes.extend_from_slice(&[0x00, 0xff, 0x51, 0x03, 0x07, 0xa1, 0x20]);
    bytes.extend_from_slice(&[0x00, 0xc0, 0x05]);
    bytes.extend_from_slice(&[0x00, 0x90, 0x3c, 0x64]);
    bytes.extend_from_slice(&[0x60, 0x3c, 0x00]);
    bytes.extend_from_slice(&[0x00, 0x40, 0x64]);
    bytes.extend_from_slice(&[0x60, 0x40, 0x00]);
    bytes.extend_from_slice(&[0x00, 0xff, 0x2f, 0x00]);
    // Track two: pitch wheel, one note with a two-byte delta time.
    bytes.extend_from_slice(b"MTrk\x00\x00\x00\x10");
    bytes.extend_from_slice(&[0x00, 0xe1, 0x00, 0x40]);
    bytes.extend_from_slice(&[0x00, 0x91, 0x45, 0x50]);
    bytes.extend_from_slice(&[0x81, 0x40, 0x45, 0x00]);
    bytes.extend_from_slice(&[0x00, 0xff, 0x2f, 0x00]);
    bytes
}
