//! Protocol-type resolution: the rules that decide how (or whether) an ALPDU header records the
//! SDU's EtherType, and the special-cased VLAN/IP reconstruction trick.

use crate::config::Config;
use crate::constants::{
    PTYPE_EXTENSION, PTYPE_IPV4_OR_IPV6, PTYPE_SIGNAL, PTYPE_VLAN_COMP_WO_PTYPE_FIELD,
};
use crate::Error;

/// Signalling SDU EtherType.
pub const SIGNAL: u16 = 0x0082;
/// VLAN (802.1Q) EtherType.
pub const VLAN_UNCOMP: u16 = 0x8100;
/// Service-VLAN / QinQ EtherType.
pub const QINQ: u16 = 0x88a8;
/// Legacy (pre-standard) QinQ EtherType.
pub const QINQ_LEGACY: u16 = 0x9100;
/// IPv4 EtherType.
pub const IPV4: u16 = 0x0800;
/// IPv6 EtherType.
pub const IPV6: u16 = 0x86dd;
/// ARP EtherType.
pub const ARP: u16 = 0x0806;

/// Bytes from the start of an Ethernet frame to the end of its EtherType/length field.
const ETHER_HEADER_LEN: usize = 14;
/// Bytes in a full (uncompressed) 802.1Q VLAN tag: 2-byte TCI + 2-byte inner EtherType.
const VLAN_HDR_LEN: usize = 4;

/// Length category of an ALPDU protocol-type header, mirrored in the PPDU's `label_type` field so
/// the receiver can invert the encoding without re-deriving it from the config alone.
///
/// When the header is *not* suppressed, `label_type` records how many bytes follow. When it *is*
/// suppressed, `label_type` instead distinguishes the "always-suppressible signal" case (which
/// does not depend on `implicit_protocol_type`) from ordinary implicit-type omission.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LabelType {
    /// 2-byte uncompressed EtherType, or (when suppressed) ordinary implicit-type omission.
    Zero,
    /// 1-byte compressed EtherType, or (when suppressed) the always-suppressible signal case.
    One,
    /// 3-byte compressed EtherType with `0xFF` extension prefix.
    Extension,
}

impl LabelType {
    pub fn as_bits(self) -> u8 {
        match self {
            LabelType::Zero => 0b00,
            LabelType::One => 0b01,
            LabelType::Extension => 0b10,
        }
    }

    pub fn from_bits(bits: u8) -> Result<Self, Error> {
        match bits & 0b11 {
            0b00 => Ok(LabelType::Zero),
            0b01 => Ok(LabelType::One),
            0b10 => Ok(LabelType::Extension),
            _ => {
                warn!("reserved label_type value 0b11");
                Err(Error::PpduMalformed)
            }
        }
    }
}

/// The serialized protocol-type header bytes to place in a PPDU, if any.
#[derive(Debug, Copy, Clone)]
pub struct HeaderBytes {
    buf: [u8; 3],
    len: u8,
}

impl HeaderBytes {
    fn empty() -> Self {
        HeaderBytes { buf: [0; 3], len: 0 }
    }

    fn one(byte: u8) -> Self {
        HeaderBytes { buf: [byte, 0, 0], len: 1 }
    }

    fn two(ptype: u16) -> Self {
        let [hi, lo] = ptype.to_be_bytes();
        HeaderBytes { buf: [hi, lo, 0], len: 2 }
    }

    fn three(ptype: u16) -> Self {
        let [hi, lo] = ptype.to_be_bytes();
        HeaderBytes { buf: [PTYPE_EXTENSION, hi, lo], len: 3 }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }
}

/// Number of protocol-type header bytes implied by `label_type`/`proto_type_suppr`, as read off a
/// PPDU header. Mirrors [`HeaderBytes::len`] on the encode side.
pub fn header_len(label_type: LabelType, proto_type_suppr: bool) -> usize {
    if proto_type_suppr {
        return 0;
    }
    match label_type {
        LabelType::Zero => 2,
        LabelType::One => 1,
        LabelType::Extension => 3,
    }
}

/// Outcome of resolving an SDU's protocol type against a [`Config`] for encapsulation.
#[derive(Debug, Copy, Clone)]
pub struct EncodedHeader {
    pub label_type: LabelType,
    pub proto_type_suppr: bool,
    pub header_bytes: HeaderBytes,
    /// Set only for the VLAN-carrying-IP optimization: the encoder has dropped the 2-byte inner
    /// EtherType from the VLAN tag inside the SDU payload, to be reconstructed by the receiver.
    pub strip_inner_vlan_ethertype: bool,
}

/// Returns whether `ptype` is suppressible outright (omitted header) under `implicit`.
fn is_suppressible(ptype: u16, implicit: u8) -> bool {
    match ptype {
        SIGNAL => true,
        VLAN_UNCOMP => implicit == 0x0f,
        QINQ => implicit == 0x19,
        QINQ_LEGACY => implicit == 0x1a,
        IPV4 => implicit == 0x0d || implicit == PTYPE_IPV4_OR_IPV6,
        IPV6 => implicit == 0x11 || implicit == PTYPE_IPV4_OR_IPV6,
        ARP => implicit == 0x0e,
        _ => false,
    }
}

/// One-byte compression table. Returns `None` on a miss (caller must fall back to the 3-byte
/// extension encoding).
fn compress(ptype: u16) -> Option<u8> {
    match ptype {
        IPV4 => Some(0x0d),
        IPV6 => Some(0x11),
        VLAN_UNCOMP => Some(0x0f),
        QINQ => Some(0x19),
        QINQ_LEGACY => Some(0x1a),
        ARP => Some(0x0e),
        SIGNAL => Some(PTYPE_SIGNAL),
        _ => None,
    }
}

/// Reverses [`compress`], additionally handling the two reserved values (`0x30`, `0x31`) that
/// never come out of `compress` but can appear on the wire.
fn decompress(byte: u8) -> DecompressedByte {
    match byte {
        0x0d => DecompressedByte::Known(IPV4),
        0x11 => DecompressedByte::Known(IPV6),
        0x0f => DecompressedByte::Known(VLAN_UNCOMP),
        0x19 => DecompressedByte::Known(QINQ),
        0x1a => DecompressedByte::Known(QINQ_LEGACY),
        0x0e => DecompressedByte::Known(ARP),
        PTYPE_SIGNAL => DecompressedByte::Known(SIGNAL),
        PTYPE_IPV4_OR_IPV6 => DecompressedByte::AmbiguousIpv4OrIpv6,
        PTYPE_VLAN_COMP_WO_PTYPE_FIELD => DecompressedByte::VlanCompWoPtype,
        _ => DecompressedByte::Unknown,
    }
}

enum DecompressedByte {
    Known(u16),
    AmbiguousIpv4OrIpv6,
    VlanCompWoPtype,
    Unknown,
}

/// Detects whether `sdu` is an `Ethernet/VLAN/IPv4` or `Ethernet/VLAN/IPv6` frame, i.e. whether the
/// VLAN-without-inner-ptype optimization can legally apply.
fn vlan_carries_ip(sdu: &[u8]) -> bool {
    if sdu.len() < ETHER_HEADER_LEN + VLAN_HDR_LEN {
        return false;
    }
    let outer = u16::from_be_bytes([sdu[12], sdu[13]]);
    if outer != VLAN_UNCOMP {
        return false;
    }
    let inner = u16::from_be_bytes([sdu[16], sdu[17]]);
    inner == IPV4 || inner == IPV6
}

/// Resolves how the ALPDU header for `ptype` should be written, given `sdu` (used only to detect
/// the VLAN/IP special case) and the active `config`.
pub fn resolve(ptype: u16, sdu: &[u8], config: &Config) -> Result<EncodedHeader, Error> {
    if ptype != 0 && ptype < 0x0600 {
        // Below this, the Ethernet "Type" field is conventionally a length, not an EtherType.
        error!("protocol type {:#06x} is not a valid EtherType", ptype);
        return Err(Error::InvalidPtype);
    }

    if config.allow_ptype_omission() && is_suppressible(ptype, config.implicit_protocol_type()) {
        let label_type = if ptype == SIGNAL {
            LabelType::One
        } else {
            LabelType::Zero
        };
        return Ok(EncodedHeader {
            label_type,
            proto_type_suppr: true,
            header_bytes: HeaderBytes::empty(),
            strip_inner_vlan_ethertype: false,
        });
    }

    if config.use_compressed_ptype() {
        if ptype == VLAN_UNCOMP && vlan_carries_ip(sdu) {
            return Ok(EncodedHeader {
                label_type: LabelType::One,
                proto_type_suppr: false,
                header_bytes: HeaderBytes::one(PTYPE_VLAN_COMP_WO_PTYPE_FIELD),
                strip_inner_vlan_ethertype: true,
            });
        }
        if let Some(byte) = compress(ptype) {
            return Ok(EncodedHeader {
                label_type: LabelType::One,
                proto_type_suppr: false,
                header_bytes: HeaderBytes::one(byte),
                strip_inner_vlan_ethertype: false,
            });
        }
        return Ok(EncodedHeader {
            label_type: LabelType::Extension,
            proto_type_suppr: false,
            header_bytes: HeaderBytes::three(ptype),
            strip_inner_vlan_ethertype: false,
        });
    }

    Ok(EncodedHeader {
        label_type: LabelType::Zero,
        proto_type_suppr: false,
        header_bytes: HeaderBytes::two(ptype),
        strip_inner_vlan_ethertype: false,
    })
}

/// Reverses the implicit-type omission: given the config and, for the ambiguous IPv4/IPv6 case,
/// the first byte of the reassembled ALPDU payload, recovers the protocol type.
fn resolve_implicit(config: &Config, first_payload_byte: Option<u8>) -> Result<u16, Error> {
    let implicit = config.implicit_protocol_type();
    if implicit == PTYPE_IPV4_OR_IPV6 {
        return infer_ip_version_ptype(first_payload_byte);
    }
    let ptype = match implicit {
        0x0d => IPV4,
        0x11 => IPV6,
        0x0f => VLAN_UNCOMP,
        0x19 => QINQ,
        0x1a => QINQ_LEGACY,
        0x0e => ARP,
        _ => {
            error!("implicit_protocol_type {:#04x} has no reverse mapping", implicit);
            return Err(Error::PpduMalformed);
        }
    };
    Ok(ptype)
}

fn infer_ip_version_ptype(first_payload_byte: Option<u8>) -> Result<u16, Error> {
    let byte = first_payload_byte.ok_or(Error::SduTooShortForVlanReconstruction)?;
    match byte >> 4 {
        4 => Ok(IPV4),
        6 => Ok(IPV6),
        _ => Err(Error::UnknownIpVersion),
    }
}

/// Decoded protocol-type header, as understood by the receiver.
pub struct DecodedHeader {
    pub protocol_type: u16,
    pub vlan_comp_wo_ptype: bool,
}

/// Inverts [`resolve`]: given the `label_type`/`proto_type_suppr` bits read off the wire, the raw
/// header bytes (empty if suppressed), the config, and the first byte of ALPDU payload (needed
/// only for the ambiguous-IP cases), recovers the SDU's protocol type.
pub fn decode(
    label_type: LabelType,
    proto_type_suppr: bool,
    header_bytes: &[u8],
    config: &Config,
    first_payload_byte: Option<u8>,
) -> Result<DecodedHeader, Error> {
    if proto_type_suppr {
        let protocol_type = if label_type == LabelType::One {
            SIGNAL
        } else {
            resolve_implicit(config, first_payload_byte)?
        };
        return Ok(DecodedHeader {
            protocol_type,
            vlan_comp_wo_ptype: false,
        });
    }

    match label_type {
        LabelType::Zero => {
            if header_bytes.len() != 2 {
                return Err(Error::PpduMalformed);
            }
            let protocol_type = u16::from_be_bytes([header_bytes[0], header_bytes[1]]);
            Ok(DecodedHeader {
                protocol_type,
                vlan_comp_wo_ptype: false,
            })
        }
        LabelType::One => {
            if header_bytes.len() != 1 {
                return Err(Error::PpduMalformed);
            }
            match decompress(header_bytes[0]) {
                DecompressedByte::Known(ptype) => Ok(DecodedHeader {
                    protocol_type: ptype,
                    vlan_comp_wo_ptype: false,
                }),
                DecompressedByte::AmbiguousIpv4OrIpv6 => Ok(DecodedHeader {
                    protocol_type: infer_ip_version_ptype(first_payload_byte)?,
                    vlan_comp_wo_ptype: false,
                }),
                DecompressedByte::VlanCompWoPtype => Ok(DecodedHeader {
                    protocol_type: VLAN_UNCOMP,
                    vlan_comp_wo_ptype: true,
                }),
                DecompressedByte::Unknown => {
                    warn!("unknown compressed protocol type {:#04x}", header_bytes[0]);
                    Err(Error::PpduMalformed)
                }
            }
        }
        LabelType::Extension => {
            if header_bytes.len() != 3 || header_bytes[0] != PTYPE_EXTENSION {
                return Err(Error::PpduMalformed);
            }
            let protocol_type = u16::from_be_bytes([header_bytes[1], header_bytes[2]]);
            Ok(DecodedHeader {
                protocol_type,
                vlan_comp_wo_ptype: false,
            })
        }
    }
}

/// Re-inserts the 2-byte inner VLAN EtherType that [`resolve`]'s VLAN/IP optimization stripped out
/// of the wire payload, writing the reconstructed frame into `out`.
///
/// Returns the reconstructed length, which is always `stripped.len() + 2`.
pub fn reconstruct_vlan_ptype(stripped: &[u8], out: &mut [u8]) -> Result<usize, Error> {
    const PREFIX_LEN: usize = ETHER_HEADER_LEN + 2; // dst + src + outer EtherType + VLAN TCI

    if stripped.len() < PREFIX_LEN + 1 {
        return Err(Error::SduTooShortForVlanReconstruction);
    }
    let outer = u16::from_be_bytes([stripped[12], stripped[13]]);
    if outer != VLAN_UNCOMP {
        warn!("VLAN reconstruction: outer EtherType {:#06x} is not VLAN", outer);
        return Err(Error::UnknownIpVersion);
    }
    let inner = match stripped[PREFIX_LEN] >> 4 {
        4 => IPV4,
        6 => IPV6,
        _ => return Err(Error::UnknownIpVersion),
    };

    let total = stripped.len() + 2;
    if out.len() < total {
        return Err(Error::Eof);
    }
    out[..PREFIX_LEN].copy_from_slice(&stripped[..PREFIX_LEN]);
    out[PREFIX_LEN..PREFIX_LEN + 2].copy_from_slice(&inner.to_be_bytes());
    out[PREFIX_LEN + 2..total].copy_from_slice(&stripped[PREFIX_LEN..]);
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg_compressed() -> Config {
        Config::new(true, true, false, true, false, 0x00, 0, 0, 0).unwrap()
    }

    #[test]
    fn ipv4_compresses_to_one_byte() {
        let cfg = cfg_compressed();
        let hdr = resolve(IPV4, &[0x45, 0, 0, 20], &cfg).unwrap();
        assert_eq!(hdr.header_bytes.as_slice(), &[0x0d]);
        assert!(!hdr.proto_type_suppr);
        assert_eq!(hdr.label_type, LabelType::One);
    }

    #[test]
    fn unknown_ethertype_falls_back_to_extension() {
        let cfg = cfg_compressed();
        let hdr = resolve(0x1234, &[], &cfg).unwrap();
        assert_eq!(hdr.header_bytes.as_slice(), &[0xFF, 0x12, 0x34]);
        assert_eq!(hdr.label_type, LabelType::Extension);
    }

    #[test]
    fn signal_is_always_suppressible() {
        let cfg = Config::new(true, false, false, true, false, 0x00, 0, 0, 0).unwrap();
        let hdr = resolve(SIGNAL, &[], &cfg).unwrap();
        assert!(hdr.proto_type_suppr);
        assert_eq!(hdr.label_type, LabelType::One);
    }

    #[test]
    fn vlan_ip_frame_strips_inner_ethertype() {
        let cfg = cfg_compressed();
        let mut sdu = [0u8; 22];
        sdu[12] = 0x81;
        sdu[13] = 0x00; // outer VLAN
        sdu[16] = 0x08;
        sdu[17] = 0x00; // inner IPv4
        sdu[18] = 0x45; // IP version nibble
        let hdr = resolve(VLAN_UNCOMP, &sdu, &cfg).unwrap();
        assert!(hdr.strip_inner_vlan_ethertype);
        assert_eq!(hdr.header_bytes.as_slice(), &[0x31]);
    }

    #[test]
    fn reconstruct_roundtrip() {
        let mut original = [0u8; 22];
        original[12] = 0x81;
        original[13] = 0x00;
        original[16] = 0x86;
        original[17] = 0xdd;
        original[18] = 0x60;

        let mut stripped = [0u8; 20];
        stripped[..16].copy_from_slice(&original[..16]);
        stripped[16..].copy_from_slice(&original[18..]);

        let mut out = [0u8; 22];
        let len = reconstruct_vlan_ptype(&stripped, &mut out).unwrap();
        assert_eq!(len, 22);
        assert_eq!(&out[..len], &original[..]);
    }

    #[test]
    fn reconstruct_rejects_unknown_ip_version() {
        let mut stripped = [0u8; 17];
        stripped[12] = 0x81;
        stripped[13] = 0x00;
        stripped[16] = 0x00; // nibble 0, neither 4 nor 6
        let mut out = [0u8; 19];
        assert_eq!(
            reconstruct_vlan_ptype(&stripped, &mut out),
            Err(Error::UnknownIpVersion)
        );
    }
}
