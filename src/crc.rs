//! CRC-32 trailer computation.
//!
//! The ALPDU CRC-32 trailer uses the same polynomial, bit order, and XOR conventions as Ethernet
//! FCS and zlib/gzip: CRC-32/ISO-HDLC. Rather than hand-roll the table-driven implementation, this
//! module reaches for the `crc` crate, which ships the algorithm as a named constant and is
//! `no_std`-friendly.

use crc::{Crc, CRC_32_ISO_HDLC};

static ALGORITHM: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Computes the CRC-32/ISO-HDLC checksum of `sdu`.
///
/// This is calculated over the protocol-type-uncompressed SDU bytes exactly as presented by the
/// caller (after VLAN-ptype reconstruction, on the receive side), and stored big-endian in the
/// ALPDU trailer.
pub fn checksum(sdu: &[u8]) -> u32 {
    ALGORITHM.checksum(sdu)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        // CRC-32/ISO-HDLC ("check" value from the CRC RevEng catalogue).
        assert_eq!(checksum(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn empty_input() {
        assert_eq!(checksum(&[]), 0);
    }
}
