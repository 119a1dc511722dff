use snafu::Snafu;

/// The public Error type for this library.
#[derive(Debug, Snafu)]
pub struct Error(LibError);

/// The public Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;

/// The internal Result type for this library.
pub(crate) type LibResult<T> = std::result::Result<T, LibError>;

/// The internal Error type for this library. Variants follow the failure taxonomy of the wire
/// format: file I/O, structural underrun, running-status breakdown, out-of-range values, and
/// internal invariant breaks.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub(crate) enum LibError {
    #[snafu(display("{}: error while reading or writing a file: {}", site, source))]
    Io {
        site: String,
        source: std::io::Error,
    },

    #[snafu(display("{}: unexpected end of input", site))]
    Truncated { site: String },

    #[snafu(display("{}: data byte {:#04X} but no running status is in effect", site, byte))]
    BadStatus { site: String, byte: u8 },

    #[snafu(display("{}: unrecognized status byte {:#04X}", site, byte))]
    UnknownStatus { site: String, byte: u8 },

    #[snafu(display("{}: value out of range: {}", site, description))]
    Range { site: String, description: String },

    #[snafu(display("{}: invariant violation: {}", site, description))]
    Invariant { site: String, description: String },
}

macro_rules! site {
    () => {
        format!("{}:{}", file!(), line!())
    };
}

macro_rules! io {
    () => {
        crate::error::IoSnafu { site: site!() }
    };
}

macro_rules! truncated {
    () => {
        crate::error::TruncatedSnafu { site: site!() }
    };
}

macro_rules! range {
    ($msg:expr) => {
        crate::error::RangeSnafu {
            site: site!(),
            description: String::from($msg),
        }
    };
    ($fmt:expr, $($arg:expr),+) => {
        crate::error::RangeSnafu {
            site: site!(),
            description: format!($fmt, $($arg),+),
        }
    };
}

macro_rules! invariant {
    ($msg:expr) => {
        crate::error::InvariantSnafu {
            site: site!(),
            description: String::from($msg),
        }
    };
    ($fmt:expr, $($arg:expr),+) => {
        crate::error::InvariantSnafu {
            site: site!(),
            description: format!($fmt, $($arg),+),
        }
    };
}
