//! Service Data Unit: the caller-facing payload handed to and returned from this crate.

use crate::constants::MAX_SDU_SIZE;
use crate::Error;

/// A single network-layer payload plus the EtherType that identifies it.
///
/// `Sdu` owns its bytes in a fixed-size array rather than borrowing, so that a [`Receiver`]
/// reassembling fragments across several `decap` calls can hand one back without tying its
/// lifetime to the input FPDU buffer.
///
/// [`Receiver`]: crate::receiver::Receiver
#[derive(Debug, Clone)]
pub struct Sdu {
    bytes: [u8; MAX_SDU_SIZE],
    length: usize,
    protocol_type: u16,
}

impl Sdu {
    /// Builds an `Sdu` by copying `data` (which must fit within [`MAX_SDU_SIZE`]).
    pub fn new(data: &[u8], protocol_type: u16) -> Result<Self, Error> {
        if data.len() > MAX_SDU_SIZE {
            error!("SDU length {} exceeds MAX_SDU_SIZE {}", data.len(), MAX_SDU_SIZE);
            return Err(Error::SduTooBig);
        }
        let mut bytes = [0u8; MAX_SDU_SIZE];
        bytes[..data.len()].copy_from_slice(data);
        Ok(Sdu {
            bytes,
            length: data.len(),
            protocol_type,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes[..self.length]
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn protocol_type(&self) -> u16 {
        self.protocol_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_bytes_and_ptype() {
        let sdu = Sdu::new(&[1, 2, 3], 0x0800).unwrap();
        assert_eq!(sdu.bytes(), &[1, 2, 3]);
        assert_eq!(sdu.len(), 3);
        assert_eq!(sdu.protocol_type(), 0x0800);
    }

    #[test]
    fn rejects_oversized_payload() {
        let data = [0u8; MAX_SDU_SIZE + 1];
        assert_eq!(Sdu::new(&data, 0x0800), Err(Error::SduTooBig));
    }
}
