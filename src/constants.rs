//! Protocol-wide constants.

/// Largest SDU the encapsulator will accept, in bytes.
pub const MAX_SDU_SIZE: usize = 4088;

/// Highest valid `frag_id` value (3-bit field).
pub const MAX_FRAG_ID: u8 = 7;

/// Number of parallel fragmentation/reassembly contexts (`frag_id` is 3 bits).
pub const NUM_FRAG_IDS: usize = MAX_FRAG_ID as usize + 1;

/// Size of a context's ALPDU scratch buffer: worst case is a header (up to 3 bytes), a full-size
/// SDU, and a CRC-32 trailer (4 bytes), rounded up for slack.
pub const MAX_ALPDU_BUFFER: usize = 4100;

/// Length in bytes of the CRC-32 trailer.
pub const CRC_TRAILER_LEN: usize = 4;

/// Length in bytes of the sequence-number trailer.
pub const SEQNO_TRAILER_LEN: usize = 1;

/// Reserved one-byte compressed protocol-type value: "IPv4 or IPv6, disambiguate by inspecting the
/// SDU" (used together with `implicit_protocol_type == 0x30`).
pub const PTYPE_IPV4_OR_IPV6: u8 = 0x30;

/// Reserved one-byte compressed protocol-type value: VLAN frame with its inner EtherType
/// suppressed (recovered by the receiver from the first IP nibble).
pub const PTYPE_VLAN_COMP_WO_PTYPE_FIELD: u8 = 0x31;

/// Reserved one-byte compressed protocol-type value for RLE signalling (`0x0082`) SDUs.
pub const PTYPE_SIGNAL: u8 = 0x42;

/// Marker byte preceding a 2-byte uncompressed EtherType extension, used when a one-byte
/// compressed encoding has no entry for the SDU's protocol type.
pub const PTYPE_EXTENSION: u8 = 0xFF;

/// Highest value accepted for `implicit_protocol_type`, other than the `0x30` sentinel.
pub const MAX_IMPLICIT_PROTO_TYPE: u8 = 0x30;

/// Highest value accepted for a label-size nibble (`implicit_ppdu_label_size`,
/// `implicit_payload_label_size`, `type_0_alpdu_label_size`).
pub const MAX_LABEL_SIZE: u8 = 15;
