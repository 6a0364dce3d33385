//! PPDU (Payload PDU) header packing and parsing.
//!
//! Every PPDU starts with two bits, `start_ind`/`end_ind`, that select one of four header shapes.
//! Bit positions below are numbered MSB-first within each octet, matching the wire layout; nothing
//! here is ever reinterpreted as a `#[repr(C)]` struct, only explicit shift-and-mask accessors, the
//! same way the model codebase this crate is descended from reads its own link-layer headers.

use crate::bytes::{ByteReader, ByteWriter};
use crate::proto_type::LabelType;
use crate::Error;

/// Largest value the 11-bit `rle_packet_length` field can hold.
pub const RLE_PACKET_LENGTH_MAX: u16 = 0x7FF;
/// Largest value the 12-bit `total_alpdu_length` field can hold.
pub const TOTAL_ALPDU_LENGTH_MAX: u16 = 0xFFF;

/// A parsed or about-to-be-packed PPDU header plus a borrow of its payload bytes.
#[derive(Debug)]
pub enum Ppdu<'a> {
    /// A complete, unfragmented ALPDU (2-byte header).
    Complete {
        rle_packet_length: u16,
        label_type: LabelType,
        proto_type_suppr: bool,
        payload: &'a [u8],
    },
    /// The first fragment of an ALPDU that does not fit in one PPDU (4-byte header).
    Start {
        rle_packet_length: u16,
        total_alpdu_length: u16,
        label_type: LabelType,
        proto_type_suppr: bool,
        use_crc: bool,
        frag_id: u8,
        payload: &'a [u8],
    },
    /// A middle fragment (2-byte header).
    Continue {
        rle_packet_length: u16,
        frag_id: u8,
        payload: &'a [u8],
    },
    /// The final fragment, carrying the trailer (2-byte header).
    End {
        rle_packet_length: u16,
        frag_id: u8,
        payload: &'a [u8],
    },
}

impl<'a> Ppdu<'a> {
    /// Size in bytes of this PPDU's header (not counting `payload`).
    pub fn header_len(&self) -> usize {
        match self {
            Ppdu::Complete { .. } => 2,
            Ppdu::Start { .. } => 4,
            Ppdu::Continue { .. } => 2,
            Ppdu::End { .. } => 2,
        }
    }

    pub fn rle_packet_length(&self) -> u16 {
        match self {
            Ppdu::Complete { rle_packet_length, .. }
            | Ppdu::Start { rle_packet_length, .. }
            | Ppdu::Continue { rle_packet_length, .. }
            | Ppdu::End { rle_packet_length, .. } => *rle_packet_length,
        }
    }

    pub fn payload(&self) -> &'a [u8] {
        match self {
            Ppdu::Complete { payload, .. }
            | Ppdu::Start { payload, .. }
            | Ppdu::Continue { payload, .. }
            | Ppdu::End { payload, .. } => payload,
        }
    }

    /// `frag_id` for PPDUs that carry a reassembly context; `None` for `Complete`, which needs
    /// none.
    pub fn frag_id(&self) -> Option<u8> {
        match self {
            Ppdu::Complete { .. } => None,
            Ppdu::Start { frag_id, .. } | Ppdu::Continue { frag_id, .. } | Ppdu::End { frag_id, .. } => {
                Some(*frag_id)
            }
        }
    }

    /// Serializes the header (not `payload`, which the caller writes separately) into `writer`.
    pub fn pack_header(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        match *self {
            Ppdu::Complete {
                rle_packet_length,
                label_type,
                proto_type_suppr,
                ..
            } => {
                check_rle_packet_length(rle_packet_length)?;
                let byte0 = 0b1100_0000 | ((rle_packet_length >> 5) & 0x3F) as u8;
                let low3 = (label_type.as_bits() << 1) | proto_type_suppr as u8;
                let byte1 = (((rle_packet_length & 0x1F) as u8) << 3) | low3;
                writer.write_u8(byte0)?;
                writer.write_u8(byte1)
            }
            Ppdu::Continue {
                rle_packet_length,
                frag_id,
                ..
            } => pack_simple(writer, 0b00, rle_packet_length, frag_id),
            Ppdu::End {
                rle_packet_length,
                frag_id,
                ..
            } => pack_simple(writer, 0b01, rle_packet_length, frag_id),
            Ppdu::Start {
                rle_packet_length,
                total_alpdu_length,
                label_type,
                proto_type_suppr,
                use_crc,
                frag_id,
                ..
            } => {
                check_rle_packet_length(rle_packet_length)?;
                if total_alpdu_length > TOTAL_ALPDU_LENGTH_MAX {
                    error!(
                        "total_alpdu_length {} exceeds {}",
                        total_alpdu_length, TOTAL_ALPDU_LENGTH_MAX
                    );
                    return Err(Error::PpduMalformed);
                }
                let byte0 = 0b1000_0000 | ((rle_packet_length >> 5) & 0x3F) as u8;

                let field19: u32 = (total_alpdu_length as u32) << 7
                    | (label_type.as_bits() as u32) << 5
                    | (proto_type_suppr as u32) << 4
                    | (use_crc as u32) << 3
                    | (frag_id & 0x7) as u32;

                let low3 = ((field19 >> 16) & 0x7) as u8;
                let byte1 = (((rle_packet_length & 0x1F) as u8) << 3) | low3;
                let bytes23 = (field19 & 0xFFFF) as u16;

                writer.write_u8(byte0)?;
                writer.write_u8(byte1)?;
                writer.write_u16_be(bytes23)
            }
        }
    }

    /// Parses a PPDU header from `reader`, then splits off exactly `rle_packet_length` bytes as
    /// `payload`. Returns `Error::PpduMalformed` if the buffer does not contain that many bytes.
    pub fn parse(reader: &mut ByteReader<'a>) -> Result<Self, Error> {
        let byte0 = reader.read_u8()?;
        let start_ind = (byte0 >> 7) & 1;
        let end_ind = (byte0 >> 6) & 1;
        let len_high6 = (byte0 & 0x3F) as u16;

        let byte1 = reader.read_u8()?;
        let len_low5 = ((byte1 >> 3) & 0x1F) as u16;
        let rle_packet_length = (len_high6 << 5) | len_low5;

        let ppdu = match (start_ind, end_ind) {
            (1, 1) => {
                let low3 = byte1 & 0x7;
                let label_type = LabelType::from_bits(low3 >> 1)?;
                let proto_type_suppr = (low3 & 0x1) != 0;
                let payload = reader.read_slice(rle_packet_length as usize)?;
                Ppdu::Complete {
                    rle_packet_length,
                    label_type,
                    proto_type_suppr,
                    payload,
                }
            }
            (0, 0) => {
                let frag_id = byte1 & 0x7;
                let payload = reader.read_slice(rle_packet_length as usize)?;
                Ppdu::Continue {
                    rle_packet_length,
                    frag_id,
                    payload,
                }
            }
            (0, 1) => {
                let frag_id = byte1 & 0x7;
                let payload = reader.read_slice(rle_packet_length as usize)?;
                Ppdu::End {
                    rle_packet_length,
                    frag_id,
                    payload,
                }
            }
            (1, 0) => {
                let low3 = (byte1 & 0x7) as u32;
                let bytes23 = reader.read_u16_be()? as u32;
                let field19 = (low3 << 16) | bytes23;

                let total_alpdu_length = ((field19 >> 7) & 0xFFF) as u16;
                let label_type = LabelType::from_bits(((field19 >> 5) & 0x3) as u8)?;
                let proto_type_suppr = ((field19 >> 4) & 0x1) != 0;
                let use_crc = ((field19 >> 3) & 0x1) != 0;
                let frag_id = (field19 & 0x7) as u8;

                let payload = reader.read_slice(rle_packet_length as usize)?;
                Ppdu::Start {
                    rle_packet_length,
                    total_alpdu_length,
                    label_type,
                    proto_type_suppr,
                    use_crc,
                    frag_id,
                    payload,
                }
            }
            _ => unreachable!("start_ind/end_ind are single bits"),
        };
        Ok(ppdu)
    }
}

fn check_rle_packet_length(len: u16) -> Result<(), Error> {
    if len > RLE_PACKET_LENGTH_MAX {
        error!("rle_packet_length {} exceeds {}", len, RLE_PACKET_LENGTH_MAX);
        return Err(Error::PpduMalformed);
    }
    Ok(())
}

fn pack_simple(
    writer: &mut ByteWriter<'_>,
    start_end_bits: u8,
    rle_packet_length: u16,
    frag_id: u8,
) -> Result<(), Error> {
    check_rle_packet_length(rle_packet_length)?;
    let byte0 = (start_end_bits << 6) | ((rle_packet_length >> 5) & 0x3F) as u8;
    let byte1 = (((rle_packet_length & 0x1F) as u8) << 3) | (frag_id & 0x7);
    writer.write_u8(byte0)?;
    writer.write_u8(byte1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_roundtrip() {
        let payload = [1u8, 2, 3, 4];
        let ppdu = Ppdu::Complete {
            rle_packet_length: payload.len() as u16,
            label_type: LabelType::One,
            proto_type_suppr: false,
            payload: &payload,
        };
        let mut buf = [0u8; 6];
        let mut writer = ByteWriter::new(&mut buf);
        ppdu.pack_header(&mut writer).unwrap();
        writer.write_slice(&payload).unwrap();

        let mut reader = ByteReader::new(&buf);
        let parsed = Ppdu::parse(&mut reader).unwrap();
        match parsed {
            Ppdu::Complete {
                rle_packet_length,
                label_type,
                proto_type_suppr,
                payload: got,
            } => {
                assert_eq!(rle_packet_length, 4);
                assert_eq!(label_type, LabelType::One);
                assert!(!proto_type_suppr);
                assert_eq!(got, &payload);
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn start_roundtrip_preserves_all_fields() {
        let payload = [0xAAu8; 10];
        let ppdu = Ppdu::Start {
            rle_packet_length: payload.len() as u16,
            total_alpdu_length: 1502,
            label_type: LabelType::Zero,
            proto_type_suppr: false,
            use_crc: true,
            frag_id: 5,
            payload: &payload,
        };
        let mut buf = [0u8; 16];
        let mut writer = ByteWriter::new(&mut buf);
        ppdu.pack_header(&mut writer).unwrap();
        writer.write_slice(&payload).unwrap();

        let mut reader = ByteReader::new(&buf);
        match Ppdu::parse(&mut reader).unwrap() {
            Ppdu::Start {
                rle_packet_length,
                total_alpdu_length,
                label_type,
                proto_type_suppr,
                use_crc,
                frag_id,
                payload: got,
            } => {
                assert_eq!(rle_packet_length, 10);
                assert_eq!(total_alpdu_length, 1502);
                assert_eq!(label_type, LabelType::Zero);
                assert!(!proto_type_suppr);
                assert!(use_crc);
                assert_eq!(frag_id, 5);
                assert_eq!(got, &payload);
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    fn roundtrip_frag_id(ppdu: Ppdu, payload: &[u8]) {
        let mut buf = [0u8; 8];
        let mut writer = ByteWriter::new(&mut buf);
        ppdu.pack_header(&mut writer).unwrap();
        writer.write_slice(payload).unwrap();

        let mut reader = ByteReader::new(&buf);
        let parsed = Ppdu::parse(&mut reader).unwrap();
        assert_eq!(parsed.frag_id(), Some(2));
        assert_eq!(parsed.payload(), payload);
    }

    #[test]
    fn continue_carries_frag_id() {
        let payload = [9u8; 3];
        roundtrip_frag_id(
            Ppdu::Continue {
                rle_packet_length: payload.len() as u16,
                frag_id: 2,
                payload: &payload,
            },
            &payload,
        );
    }

    #[test]
    fn end_carries_frag_id() {
        let payload = [9u8; 3];
        roundtrip_frag_id(
            Ppdu::End {
                rle_packet_length: payload.len() as u16,
                frag_id: 2,
                payload: &payload,
            },
            &payload,
        );
    }

    #[test]
    fn oversized_rle_packet_length_rejected() {
        let ppdu = Ppdu::Complete {
            rle_packet_length: RLE_PACKET_LENGTH_MAX + 1,
            label_type: LabelType::Zero,
            proto_type_suppr: false,
            payload: &[],
        };
        let mut buf = [0u8; 4];
        let mut writer = ByteWriter::new(&mut buf);
        assert_eq!(ppdu.pack_header(&mut writer), Err(Error::PpduMalformed));
    }
}
