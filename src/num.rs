/*!
The `num` module defines the small bounded integers that channel-voice messages are made of. MIDI
data bytes carry seven bits; the types here make it impossible to hold a value the wire format
could not represent.
!*/

/// Defines a `u8` newtype whose value is clamped to `[0, max]`.
macro_rules! data_byte {
    ($(#[$docs:meta])* $name:ident, max: $max:expr, default: $default:expr) => {
        $(#[$docs])*
        #[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
        pub struct $name(u8);

        impl $name {
            /// The largest representable value.
            pub const MAX: u8 = $max;

            /// Silently clamps `value` into range.
            pub const fn new(value: u8) -> Self {
                if value > $max {
                    Self($max)
                } else {
                    Self(value)
                }
            }

            /// The inner value.
            pub const fn get(&self) -> u8 {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new($default)
            }
        }

        impl From<u8> for $name {
            fn from(value: u8) -> Self {
                Self::new(value)
            }
        }

        impl From<$name> for u8 {
            fn from(value: $name) -> u8 {
                value.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

data_byte!(
    /// A channel number, 0 through 15. Displayed to users as 1 through 16 by most software, but
    /// held zero-based here exactly as it travels in the low nibble of a status byte.
    Channel, max: 15, default: 0
);

data_byte!(
    /// A note number, 0 through 127. Middle C is 60.
    NoteNumber, max: 127, default: 60
);

data_byte!(
    /// A key or release velocity, 0 through 127.
    Velocity, max: 127, default: 64
);

data_byte!(
    /// A program (patch) number, 0 through 127.
    Program, max: 127, default: 0
);

data_byte!(
    /// A controller number, 0 through 127.
    Controller, max: 127, default: 0
);

data_byte!(
    /// A controller value, 0 through 127.
    ControlValue, max: 127, default: 0
);

data_byte!(
    /// One seven-bit data byte, used where no more specific meaning applies, e.g. the halves of a
    /// pitch wheel position.
    U7, max: 127, default: 0
);
