use core::fmt;

/// Errors returned by the RLE stack.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// A `Config` was built with an out-of-range or contradictory option.
    InvalidConfig,

    /// The SDU handed to `encapsulate` does not fit in an ALPDU, even after accounting for the
    /// protocol-type header and trailer.
    SduTooBig,

    /// `encapsulate` was called for a `frag_id` whose context is still `Staged`.
    FragContextBusy,

    /// The SDU's protocol type cannot be represented under the active `Config`.
    InvalidPtype,

    /// `fragment` was given a budget too small to carry a PPDU header plus at least one payload
    /// byte (or enough bytes to keep the trailer intact in the END PPDU).
    BurstTooSmall,

    /// `fragment` or `get_queue_size` was called on a `Free` (non-`Staged`) context.
    ContextEmpty,

    /// A PPDU header declared a length that overruns the FPDU it was read from, or an otherwise
    /// impossible combination of fields.
    PpduMalformed,

    /// A CONTINUE, END, or repeated START/COMPLETE PPDU arrived that violates the per-`frag_id`
    /// reassembly state machine.
    UnexpectedPpdu,

    /// The CRC-32 trailer did not match the reassembled SDU.
    TrailerBadCrc,

    /// A VLAN-without-protocol-type ALPDU reassembled to fewer bytes than are needed to inspect
    /// the suppressed IP version nibble.
    SduTooShortForVlanReconstruction,

    /// The nibble inspected to reconstruct a suppressed VLAN protocol type was neither 4 nor 6.
    UnknownIpVersion,

    /// Unexpectedly reached the end of a fixed-size buffer while packing or unpacking a header.
    ///
    /// This indicates a logic error (a computed length that doesn't fit the allotted context
    /// buffer) rather than a malformed wire PDU, which is reported as `PpduMalformed` instead.
    Eof,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Error::InvalidConfig => "invalid RLE configuration",
            Error::SduTooBig => "SDU too large to encapsulate",
            Error::FragContextBusy => "fragmentation context is still staged",
            Error::InvalidPtype => "SDU protocol type cannot be encoded under this configuration",
            Error::BurstTooSmall => "burst budget too small for a PPDU",
            Error::ContextEmpty => "context has no staged ALPDU",
            Error::PpduMalformed => "malformed PPDU header",
            Error::UnexpectedPpdu => "PPDU violates the reassembly state machine",
            Error::TrailerBadCrc => "CRC-32 trailer mismatch",
            Error::SduTooShortForVlanReconstruction => {
                "ALPDU too short to reconstruct suppressed VLAN protocol type"
            }
            Error::UnknownIpVersion => "unknown IP version in VLAN payload",
            Error::Eof => "end of buffer",
        })
    }
}
