//! Per-link RLE configuration.

use crate::constants::{MAX_IMPLICIT_PROTO_TYPE, MAX_LABEL_SIZE, PTYPE_IPV4_OR_IPV6};
use crate::Error;

/// Validated per-link RLE policy.
///
/// A `Config` is built once via [`Config::new`], which rejects any out-of-range or contradictory
/// combination of options up front: every [`Transmitter`](crate::transmitter::Transmitter) and
/// [`Receiver`](crate::receiver::Receiver) method can then assume the configuration it was built
/// with is internally consistent.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Config {
    allow_ptype_omission: bool,
    use_compressed_ptype: bool,
    allow_alpdu_crc: bool,
    allow_alpdu_sequence_number: bool,
    implicit_protocol_type: u8,
    implicit_ppdu_label_size: u8,
    implicit_payload_label_size: u8,
    type_0_alpdu_label_size: u8,
}

impl Config {
    /// Validates and builds a `Config`.
    ///
    /// Returns `Error::InvalidConfig` if:
    /// - neither `allow_alpdu_crc` nor `allow_alpdu_sequence_number` is set,
    /// - `use_explicit_payload_header_map` is set (reserved, unimplemented),
    /// - `implicit_protocol_type` is greater than `0x30`,
    /// - any of the three label-size fields is greater than 15.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        allow_ptype_omission: bool,
        use_compressed_ptype: bool,
        allow_alpdu_crc: bool,
        allow_alpdu_sequence_number: bool,
        use_explicit_payload_header_map: bool,
        implicit_protocol_type: u8,
        implicit_ppdu_label_size: u8,
        implicit_payload_label_size: u8,
        type_0_alpdu_label_size: u8,
    ) -> Result<Self, Error> {
        if !allow_alpdu_crc && !allow_alpdu_sequence_number {
            error!("invalid config: neither CRC nor sequence-number trailer is allowed");
            return Err(Error::InvalidConfig);
        }
        if use_explicit_payload_header_map {
            error!("invalid config: use_explicit_payload_header_map is reserved and unimplemented");
            return Err(Error::InvalidConfig);
        }
        if implicit_protocol_type > MAX_IMPLICIT_PROTO_TYPE {
            error!(
                "invalid config: implicit_protocol_type {:#04x} exceeds {:#04x}",
                implicit_protocol_type, MAX_IMPLICIT_PROTO_TYPE
            );
            return Err(Error::InvalidConfig);
        }
        if implicit_ppdu_label_size > MAX_LABEL_SIZE
            || implicit_payload_label_size > MAX_LABEL_SIZE
            || type_0_alpdu_label_size > MAX_LABEL_SIZE
        {
            error!("invalid config: a label size field exceeds {}", MAX_LABEL_SIZE);
            return Err(Error::InvalidConfig);
        }

        Ok(Config {
            allow_ptype_omission,
            use_compressed_ptype,
            allow_alpdu_crc,
            allow_alpdu_sequence_number,
            implicit_protocol_type,
            implicit_ppdu_label_size,
            implicit_payload_label_size,
            type_0_alpdu_label_size,
        })
    }

    /// The default conformance configuration: no omission, no compression, sequence-number
    /// trailer only, no implicit protocol type, all label sizes zero.
    pub fn default_uncompressed() -> Self {
        Config::new(false, false, false, true, false, 0x00, 0, 0, 0).unwrap()
    }

    pub fn allow_ptype_omission(&self) -> bool {
        self.allow_ptype_omission
    }

    pub fn use_compressed_ptype(&self) -> bool {
        self.use_compressed_ptype
    }

    pub fn allow_alpdu_crc(&self) -> bool {
        self.allow_alpdu_crc
    }

    pub fn allow_alpdu_sequence_number(&self) -> bool {
        self.allow_alpdu_sequence_number
    }

    pub fn implicit_protocol_type(&self) -> u8 {
        self.implicit_protocol_type
    }

    pub fn implicit_ppdu_label_size(&self) -> u8 {
        self.implicit_ppdu_label_size
    }

    pub fn implicit_payload_label_size(&self) -> u8 {
        self.implicit_payload_label_size
    }

    pub fn type_0_alpdu_label_size(&self) -> u8 {
        self.type_0_alpdu_label_size
    }

    /// Whether the implicit protocol type is the `0x30` "omit for IPv4 or IPv6" sentinel.
    pub fn implicit_is_ip_ambiguous(&self) -> bool {
        self.implicit_protocol_type == PTYPE_IPV4_OR_IPV6
    }

    /// Decides which trailer a fragmented (non-COMPLETE) ALPDU stream should use.
    ///
    /// CRC is used only when sequence numbers are disallowed; when both are permitted, the
    /// sequence number is preferred by default.
    pub fn use_crc_trailer(&self) -> bool {
        self.allow_alpdu_crc && !self.allow_alpdu_sequence_number
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_no_trailer_allowed() {
        assert_eq!(
            Config::new(false, false, false, false, false, 0x00, 0, 0, 0),
            Err(Error::InvalidConfig)
        );
    }

    #[test]
    fn rejects_explicit_payload_header_map() {
        assert_eq!(
            Config::new(false, false, false, true, true, 0x00, 0, 0, 0),
            Err(Error::InvalidConfig)
        );
    }

    #[test]
    fn rejects_implicit_protocol_type_above_sentinel() {
        assert_eq!(
            Config::new(true, false, false, true, false, 0x31, 0, 0, 0),
            Err(Error::InvalidConfig)
        );
    }

    #[test]
    fn rejects_oversized_label_size() {
        assert_eq!(
            Config::new(false, false, false, true, false, 0x00, 16, 0, 0),
            Err(Error::InvalidConfig)
        );
    }

    #[test]
    fn crc_trailer_preferred_only_when_seqno_disallowed() {
        let both = Config::new(false, false, true, true, false, 0x00, 0, 0, 0).unwrap();
        assert!(!both.use_crc_trailer());

        let crc_only = Config::new(false, false, true, false, false, 0x00, 0, 0, 0).unwrap();
        assert!(crc_only.use_crc_trailer());
    }
}
