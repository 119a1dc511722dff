//! The `midikit` command-line tool: dump, select, merge and rewrite Standard MIDI Files.

use clap::{ArgAction, Parser};
use midikit::chunk::{write_mthd, Division, Format};
use midikit::diag::{self, DiagnosticSink, Severity};
use midikit::track::Direction;
use midikit::transform::{
    adjust_tracks, compress_note_off, merge_tracks, pair_notes, unpair_notes,
};
use midikit::{Buffer, Event, Message, Score, Vld};
use std::fmt;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

macro_rules! note {
    ($($arg:tt)*) => {
        diag::emit(Severity::Note, format_args!($($arg)*))
    };
}

macro_rules! fatal {
    ($($arg:tt)*) => {
        diag::emit(Severity::Fatal, format_args!($($arg)*))
    };
}

/// One input argument: a file name (or `-`/nothing for stdin) with an optional selection of
/// scores and tracks, `name@scores.tracks`. Either range is a single zero-based number or
/// `low-high`, and either may be omitted: `song.mid@1`, `song.mid@0-2.1`, `song.mid@.3-4`.
#[derive(Clone, Debug, Default)]
struct FileSpec {
    name: Option<String>,
    scores: Option<(u64, u64)>,
    tracks: Option<(u64, u64)>,
}

fn parse_spec(input: &str) -> Result<FileSpec, String> {
    let (name, selection) = match input.split_once('@') {
        Some((name, selection)) => (name, Some(selection)),
        None => (input, None),
    };
    let mut spec = FileSpec {
        name: match name {
            "" | "-" => None,
            other => Some(other.to_string()),
        },
        scores: None,
        tracks: None,
    };
    if let Some(selection) = selection {
        let (score_part, track_part) = match selection.split_once('.') {
            Some((scores, tracks)) => (scores, Some(tracks)),
            None => (selection, None),
        };
        spec.scores = parse_range(score_part)?;
        if let Some(track_part) = track_part {
            spec.tracks = parse_range(track_part)?;
        }
    }
    Ok(spec)
}

fn parse_range(part: &str) -> Result<Option<(u64, u64)>, String> {
    if part.is_empty() {
        return Ok(None);
    }
    let (low, high) = match part.split_once('-') {
        Some((low, high)) => (low, high),
        None => (part, part),
    };
    let low = low
        .parse::<u64>()
        .map_err(|_| format!("bad selection `{}`", part))?;
    let high = high
        .parse::<u64>()
        .map_err(|_| format!("bad selection `{}`", part))?;
    if low > high {
        return Err(format!("empty selection `{}`", part));
    }
    Ok(Some((low, high)))
}

#[derive(Parser)]
#[command(
    name = "midikit",
    version,
    about = "Read, transform and write Standard MIDI Files."
)]
struct Cli {
    /// Show score headers (format, track count, division).
    #[arg(short = 'H', long)]
    headers: bool,

    /// Show per-track event counts.
    #[arg(short, long)]
    lengths: bool,

    /// Show events, one per line.
    #[arg(short, long)]
    events: bool,

    /// Do not group note-on/note-off pairs into combined notes.
    #[arg(short, long)]
    ungroup: bool,

    /// Suppress diagnostics; repeat to silence warnings, then file errors, then everything.
    #[arg(short, long, action = ArgAction::Count)]
    quiet: u8,

    /// Merge all tracks of each score into one.
    #[arg(short, long)]
    merge: bool,

    /// Write the resulting tracks to this file.
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Concatenate all tracks of a score into a single track chunk (only with --output).
    #[arg(short, long)]
    concat: bool,

    /// Write only track chunks, no header chunk (only with --output).
    #[arg(short = 'n', long)]
    no_header: bool,

    /// Output format; defaults to the format of the first score read.
    #[arg(short, long, value_parser = clap::value_parser!(u16).range(0..=2))]
    format: Option<u16>,

    /// Output division; defaults to the division of the first score read.
    #[arg(short, long)]
    division: Option<u16>,

    /// Input files with optional selections: [name][@scores][.tracks]
    #[arg(value_name = "SPEC", value_parser = parse_spec)]
    specs: Vec<FileSpec>,
}

/// Shared between `main` and the installed sink: which file diagnostics should be blamed on, and
/// whether anything fatal happened.
struct SinkState {
    file: Mutex<String>,
    failed: AtomicBool,
}

/// Routes diagnostics the way the original-style frontend does: notes to stdout, everything else
/// to stderr prefixed with the current file name, honoring the accumulated quiet level.
struct StderrSink {
    quiet: u8,
    state: Arc<SinkState>,
}

impl StderrSink {
    fn file(&self) -> String {
        self.state.file.lock().unwrap().clone()
    }
}

impl DiagnosticSink for StderrSink {
    fn emit(&self, severity: Severity, message: fmt::Arguments<'_>) {
        match severity {
            Severity::Note => println!("{}", message),
            Severity::Warn => {
                if self.quiet < 1 {
                    eprintln!("{}: warning: {}", self.file(), message);
                }
            }
            Severity::Error => {
                if self.quiet < 2 {
                    eprintln!("{}: mferror: {}", self.file(), message);
                }
            }
            Severity::Fatal => {
                self.state.failed.store(true, Ordering::Relaxed);
                if self.quiet < 3 {
                    eprintln!("{}: error: {}", self.file(), message);
                }
            }
        }
    }
}

/// The accumulating output file: tracks from every selected score land in `buf`; the header is
/// patched in at the very end once format, division and track count are settled.
struct Output {
    buf: Buffer,
    format: Option<Format>,
    division: Option<Division>,
    ntrk: usize,
}

fn display_data(data: &Vld) -> String {
    const LIMIT: usize = 1024;
    let bytes = data.as_bytes();
    let shown = &bytes[..bytes.len().min(LIMIT)];
    let mut text = shown.escape_ascii().to_string();
    if bytes.len() > LIMIT {
        text.push_str("...");
    }
    text
}

fn print_event(e: &Event) {
    match &e.msg {
        Message::NoteOff(v) => note!(
            "{:8} NoteOff {} {} {}",
            e.time,
            v.channel,
            v.note,
            v.velocity
        ),
        Message::NoteOn(v) if v.duration != 0 => note!(
            "{:8} Note {} {} {} {} {}",
            e.time,
            v.channel,
            v.note,
            v.velocity,
            v.duration,
            v.release
        ),
        Message::NoteOn(v) => note!(
            "{:8} NoteOn {} {} {}",
            e.time,
            v.channel,
            v.note,
            v.velocity
        ),
        Message::KeyPressure(v) => note!(
            "{:8} KeyPressure {} {} {}",
            e.time,
            v.channel,
            v.note,
            v.velocity
        ),
        Message::ControlChange(v) => note!(
            "{:8} ControlChange {} {} {}",
            e.time,
            v.channel,
            v.controller,
            v.value
        ),
        Message::ProgramChange(v) => {
            note!("{:8} ProgramChange {} {}", e.time, v.channel, v.program)
        }
        Message::ChannelPressure(v) => {
            note!("{:8} ChannelPressure {} {}", e.time, v.channel, v.velocity)
        }
        Message::PitchWheelChange(v) => {
            let value = (i32::from(v.msb.get()) << 7 | i32::from(v.lsb.get())) - 0x2000;
            note!("{:8} PitchWheelChange {} {}", e.time, v.channel, value)
        }
        Message::SystemExclusive(d) => {
            note!("{:8} SystemExclusive `{}`", e.time, display_data(d))
        }
        Message::SystemExclusiveCont(d) => {
            note!("{:8} SystemExclusiveCont `{}`", e.time, display_data(d))
        }
        Message::SequenceNumber(n) => note!("{:8} SequenceNumber {}", e.time, n),
        Message::Text(d) => note!("{:8} Text `{}`", e.time, display_data(d)),
        Message::Copyright(d) => note!("{:8} CopyrightNotice `{}`", e.time, display_data(d)),
        Message::TrackName(d) => note!("{:8} TrackName `{}`", e.time, display_data(d)),
        Message::InstrumentName(d) => {
            note!("{:8} InstrumentName `{}`", e.time, display_data(d))
        }
        Message::Lyric(d) => note!("{:8} Lyric `{}`", e.time, display_data(d)),
        Message::Marker(d) => note!("{:8} Marker `{}`", e.time, display_data(d)),
        Message::CuePoint(d) => note!("{:8} CuePoint `{}`", e.time, display_data(d)),
        Message::ChannelPrefix(c) => note!("{:8} ChannelPrefix {}", e.time, c),
        Message::PortPrefix(p) => note!("{:8} PortPrefix {}", e.time, p),
        Message::EndOfTrack => note!("{:8} EndOfTrack", e.time),
        Message::SetTempo(t) => note!("{:8} SetTempo {}", e.time, t),
        Message::SmpteOffset(v) => note!(
            "{:8} SMPTEOffset {} {} {} {} {}",
            e.time,
            v.hours,
            v.minutes,
            v.seconds,
            v.frames,
            v.subframes
        ),
        Message::TimeSignature(v) => note!(
            "{:8} TimeSignature {} {} {} {}",
            e.time,
            v.numerator,
            v.denominator,
            v.clocks_per_click,
            v.tt_per_quarter
        ),
        Message::KeySignature(v) => {
            note!("{:8} KeySignature {} {}", e.time, v.sharps_flats, v.minor)
        }
        Message::SequencerSpecific(d) => {
            note!("{:8} SequencerSpecific `{}`", e.time, display_data(d))
        }
        Message::UnknownMeta { meta_type, data } => {
            note!("{:8} Meta {} `{}`", e.time, meta_type, display_data(data))
        }
        Message::Empty => {}
    }
}

fn show_tracks(cli: &Cli, score: &mut Score) {
    if cli.lengths {
        for track in &score.tracks {
            note!("       {:7}", track.nevents());
        }
    }
    if cli.events {
        for track in &mut score.tracks {
            track.rewind();
            while let Some(e) = track.step(Direction::Forward) {
                print_event(e);
            }
        }
    }
}

/// Process one file spec: read every score in the file, apply the selections and transforms, dump
/// whatever was asked for, and append output tracks. Returns `false` when the file is unusable.
fn process_file(
    cli: &Cli,
    spec: &FileSpec,
    output: &mut Option<Output>,
    state: &Arc<SinkState>,
) -> bool {
    let display_name = spec.name.clone().unwrap_or_else(|| String::from("-"));
    *state.file.lock().unwrap() = display_name.clone();

    let mut buf = Buffer::new();
    let read_result: Result<(), String> = match &spec.name {
        Some(path) => File::open(path)
            .map_err(|e| e.to_string())
            .and_then(|mut f| buf.read_from(&mut f).map_err(|e| e.to_string())),
        None => buf
            .read_from(&mut io::stdin().lock())
            .map_err(|e| e.to_string()),
    };
    if let Err(e) = read_result {
        fatal!("{}", e);
        return false;
    }

    let mut index: u64 = 0;
    let mut any = false;
    let mut ok = true;
    while buf.request(1) {
        let mut score = match Score::read(&mut buf) {
            Some(score) => score,
            None => break,
        };
        any = true;
        let selected = match spec.scores {
            None => true,
            Some((low, high)) => low <= index && index <= high,
        };
        if selected {
            if let Some((low, high)) = spec.tracks {
                adjust_tracks(&mut score, low as usize, high as usize);
            }
            if !cli.ungroup {
                for (t, track) in score.tracks.iter_mut().enumerate() {
                    let unmatched = pair_notes(track);
                    if unmatched != 0 {
                        diag::emit(
                            Severity::Warn,
                            format_args!("track {}: {} unmatched notes", t, unmatched),
                        );
                    }
                }
            }
            if cli.merge {
                merge_tracks(&mut score);
            }
            if cli.headers {
                note!(
                    "{}({}): {:7} {:7} {:7}",
                    display_name,
                    index,
                    score.format.as_u16(),
                    score.ntrk(),
                    score.division.get()
                );
            } else if cli.lengths || cli.events {
                note!("{}({}):", display_name, index);
            }
            show_tracks(cli, &mut score);

            if let Some(out) = output.as_mut() {
                if out.division.is_none() {
                    out.division = Some(score.division);
                }
                if out.format.is_none() {
                    out.format = Some(score.format);
                }
                // Back to plain wire form: combined notes cannot be written.
                for track in &mut score.tracks {
                    unpair_notes(track);
                    compress_note_off(track, false);
                }
                if let Err(e) = score.write_tracks(&mut out.buf, cli.concat) {
                    fatal!("{}", e);
                    ok = false;
                }
                out.ntrk += if cli.concat { 1 } else { score.ntrk() };
            }
        }
        index += 1;
    }
    if !any {
        fatal!("no headers or tracks found");
        return false;
    }
    if buf.request(1) {
        diag::emit(Severity::Warn, format_args!("garbage at end of input"));
    }
    ok
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let state = Arc::new(SinkState {
        file: Mutex::new(String::from("-")),
        failed: AtomicBool::new(false),
    });
    diag::install_sink(Box::new(StderrSink {
        quiet: cli.quiet,
        state: Arc::clone(&state),
    }));

    let mut output = match &cli.output {
        None => None,
        Some(_) => {
            let division = match cli.division {
                None => None,
                Some(word) => match Division::new(word) {
                    Ok(d) => Some(d),
                    Err(e) => {
                        eprintln!("midikit: {}", e);
                        return ExitCode::FAILURE;
                    }
                },
            };
            let mut out = Output {
                buf: Buffer::new(),
                format: cli.format.and_then(Format::from_u16),
                division,
                ntrk: 0,
            };
            if !cli.no_header {
                // A placeholder, rewritten with the real values at the end.
                write_mthd(&mut out.buf, Format::default(), 0, Division::default());
            }
            Some(out)
        }
    };

    let specs = if cli.specs.is_empty() {
        vec![FileSpec::default()]
    } else {
        cli.specs.clone()
    };
    let mut ok = true;
    for spec in &specs {
        ok &= process_file(&cli, spec, &mut output, &state);
    }

    if let (Some(path), Some(out)) = (&cli.output, output.as_mut()) {
        if !cli.no_header {
            out.buf.set_pos(0);
            write_mthd(
                &mut out.buf,
                out.format.unwrap_or_default(),
                out.ntrk.min(usize::from(u16::MAX)) as u16,
                out.division.unwrap_or_default(),
            );
        }
        let write_result: Result<(), String> = File::create(path)
            .map_err(|e| e.to_string())
            .and_then(|mut f| out.buf.write_to(&mut f).map_err(|e| e.to_string()));
        if let Err(e) = write_result {
            eprintln!("{}: {}", path.display(), e);
            ok = false;
        }
    }

    if state.failed.load(Ordering::Relaxed) {
        ok = false;
    }
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
