//! Encapsulation and fragmentation: SDU → ALPDU → PPDU bursts.

use crate::bytes::ByteWriter;
use crate::config::Config;
use crate::constants::{CRC_TRAILER_LEN, MAX_ALPDU_BUFFER, MAX_FRAG_ID, MAX_SDU_SIZE, NUM_FRAG_IDS, SEQNO_TRAILER_LEN};
use crate::crc;
use crate::ppdu::{Ppdu, RLE_PACKET_LENGTH_MAX};
use crate::proto_type::{self, LabelType};
use crate::sdu::Sdu;
use crate::stats::Counters;
use crate::Error;

/// State of a single `frag_id` slot on the transmit side.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ContextState {
    /// No ALPDU pending; ready to accept `encapsulate`.
    Free,
    /// An ALPDU is staged and (partially) fragmented out.
    Staged,
}

struct FragContext {
    state: ContextState,
    alpdu_buffer: [u8; MAX_ALPDU_BUFFER],
    /// Length of `[ptype header || SDU payload]`, not counting a trailer.
    payload_len: usize,
    /// Authoritative length to fragment out: equals `payload_len` until the fragmented path
    /// commits a trailer to the buffer, at which point it grows to include it. A COMPLETE PPDU
    /// never reads past `payload_len` and so never observes a trailer at all.
    total_len: usize,
    emitted: usize,
    use_crc: bool,
    /// CRC-32 of the original (pre-VLAN-stripping) SDU, precomputed at `encapsulate` time since
    /// this crate does not retain a borrow of the caller's SDU across calls.
    crc_value: u32,
    label_type: LabelType,
    proto_type_suppr: bool,
    /// Set once fragmentation has begun; `fragment` consults it only before this is true.
    started: bool,
    next_seqno: u8,
    counters: Counters,
}

impl FragContext {
    const fn new() -> Self {
        FragContext {
            state: ContextState::Free,
            alpdu_buffer: [0; MAX_ALPDU_BUFFER],
            payload_len: 0,
            total_len: 0,
            emitted: 0,
            use_crc: false,
            crc_value: 0,
            label_type: LabelType::Zero,
            proto_type_suppr: false,
            started: false,
            next_seqno: 0,
            counters: Counters {
                ok: 0,
                dropped: 0,
                lost: 0,
                bytes: 0,
            },
        }
    }

    fn remaining(&self) -> usize {
        self.total_len - self.emitted
    }

    fn trailer_len(&self) -> usize {
        if self.use_crc {
            CRC_TRAILER_LEN
        } else {
            SEQNO_TRAILER_LEN
        }
    }
}

/// Owns the eight `frag_id` fragmentation contexts and turns staged ALPDUs into PPDU bursts.
pub struct Transmitter {
    config: Config,
    contexts: [FragContext; NUM_FRAG_IDS],
}

impl Transmitter {
    pub fn new(config: Config) -> Self {
        Transmitter {
            config,
            contexts: [
                FragContext::new(),
                FragContext::new(),
                FragContext::new(),
                FragContext::new(),
                FragContext::new(),
                FragContext::new(),
                FragContext::new(),
                FragContext::new(),
            ],
        }
    }

    fn context(&self, frag_id: u8) -> Result<&FragContext, Error> {
        if frag_id > MAX_FRAG_ID {
            error!("frag_id {} exceeds MAX_FRAG_ID {}", frag_id, MAX_FRAG_ID);
            return Err(Error::ContextEmpty);
        }
        Ok(&self.contexts[frag_id as usize])
    }

    fn context_mut(&mut self, frag_id: u8) -> Result<&mut FragContext, Error> {
        if frag_id > MAX_FRAG_ID {
            error!("frag_id {} exceeds MAX_FRAG_ID {}", frag_id, MAX_FRAG_ID);
            return Err(Error::ContextEmpty);
        }
        Ok(&mut self.contexts[frag_id as usize])
    }

    /// Copies `sdu` into the context for `frag_id`, writing its ALPDU header and staging the
    /// trailer computation for fragment time.
    pub fn encapsulate(&mut self, sdu: &Sdu, frag_id: u8) -> Result<(), Error> {
        let header = proto_type::resolve(sdu.protocol_type(), sdu.bytes(), &self.config)?;

        let payload_len = if header.strip_inner_vlan_ethertype {
            if sdu.bytes().len() < 18 {
                return Err(Error::SduTooShortForVlanReconstruction);
            }
            sdu.bytes().len() - 2
        } else {
            sdu.bytes().len()
        };

        let use_crc = self.config.use_crc_trailer();
        let trailer_len = if use_crc { CRC_TRAILER_LEN } else { SEQNO_TRAILER_LEN };
        let payload_total = header.header_bytes.len() + payload_len;
        if payload_total + trailer_len > MAX_ALPDU_BUFFER {
            error!(
                "ALPDU length {} exceeds MAX_ALPDU_BUFFER {}",
                payload_total + trailer_len,
                MAX_ALPDU_BUFFER
            );
            return Err(Error::SduTooBig);
        }
        if payload_len > MAX_SDU_SIZE {
            return Err(Error::SduTooBig);
        }

        let ctx = self.context_mut(frag_id)?;
        if ctx.state != ContextState::Free {
            error!("frag_id {} is still staged", frag_id);
            return Err(Error::FragContextBusy);
        }

        let mut writer = ByteWriter::new(&mut ctx.alpdu_buffer);
        writer.write_slice(header.header_bytes.as_slice())?;
        if header.strip_inner_vlan_ethertype {
            writer.write_slice(&sdu.bytes()[..16])?;
            writer.write_slice(&sdu.bytes()[18..])?;
        } else {
            writer.write_slice(sdu.bytes())?;
        }

        // The trailer is only ever written to the wire if fragmentation turns out to be
        // necessary (see `fragment_inner`); a COMPLETE ALPDU never carries one.
        ctx.payload_len = payload_total;
        ctx.total_len = payload_total;
        ctx.emitted = 0;
        ctx.use_crc = use_crc;
        ctx.crc_value = crc::checksum(sdu.bytes());
        ctx.label_type = header.label_type;
        ctx.proto_type_suppr = header.proto_type_suppr;
        ctx.started = false;
        ctx.state = ContextState::Staged;
        Ok(())
    }

    /// Produces exactly one PPDU from the `frag_id` context, sized to fit within `burst_budget`
    /// bytes (header included).
    pub fn fragment(&mut self, frag_id: u8, burst_budget: usize) -> Result<PpduBytes, Error> {
        let result = self.fragment_inner(frag_id, burst_budget);
        if result.is_err() {
            if let Ok(ctx) = self.context_mut(frag_id) {
                if ctx.state == ContextState::Staged {
                    ctx.counters.record_dropped();
                    ctx.state = ContextState::Free;
                    ctx.total_len = 0;
                    ctx.emitted = 0;
                }
            }
        }
        result
    }

    fn fragment_inner(&mut self, frag_id: u8, burst_budget: usize) -> Result<PpduBytes, Error> {
        let ctx = self.context_mut(frag_id)?;
        if ctx.state != ContextState::Staged {
            error!("frag_id {} has no staged ALPDU", frag_id);
            return Err(Error::ContextEmpty);
        }

        let is_first = !ctx.started;

        if is_first {
            let complete_len = ctx.payload_len;
            if burst_budget >= 2
                && complete_len <= burst_budget - 2
                && complete_len <= RLE_PACKET_LENGTH_MAX as usize
            {
                // Whole ALPDU fits in one COMPLETE PPDU: no trailer is ever appended.
                let mut out = PpduBytes::new();
                let ppdu = Ppdu::Complete {
                    rle_packet_length: complete_len as u16,
                    label_type: ctx.label_type,
                    proto_type_suppr: ctx.proto_type_suppr,
                    payload: &ctx.alpdu_buffer[..complete_len],
                };
                out.pack(&ppdu)?;
                ctx.emitted = complete_len;
                ctx.state = ContextState::Free;
                ctx.counters.record_ok(complete_len);
                return Ok(out);
            }

            // Fragmentation is required: commit the trailer to the buffer now.
            let trailer_len = ctx.trailer_len();
            if ctx.use_crc {
                let crc_bytes = ctx.crc_value.to_be_bytes();
                ctx.alpdu_buffer[ctx.payload_len..ctx.payload_len + CRC_TRAILER_LEN]
                    .copy_from_slice(&crc_bytes);
            } else {
                ctx.alpdu_buffer[ctx.payload_len] = ctx.next_seqno;
            }
            ctx.total_len = ctx.payload_len + trailer_len;
        }

        let remaining = ctx.remaining();
        let trailer_len = ctx.trailer_len();
        let header_len = if is_first { 4 } else { 2 };
        if burst_budget <= header_len {
            return Err(Error::BurstTooSmall);
        }
        let mut space = (burst_budget - header_len).min(RLE_PACKET_LENGTH_MAX as usize);

        // Trailer atomicity: never leave fewer than `trailer_len` bytes (but more than zero) for a
        // later PPDU; pull them into this one's tail-holdback instead.
        let post_emit = remaining.saturating_sub(space);
        if post_emit > 0 && post_emit < trailer_len {
            let shrink = trailer_len - post_emit;
            space = space.saturating_sub(shrink);
        }

        let emit_len = space.min(remaining);
        if emit_len == 0 {
            return Err(Error::BurstTooSmall);
        }
        let is_last = ctx.emitted + emit_len == ctx.total_len;

        let mut out = PpduBytes::new();
        let ppdu = if is_first {
            Ppdu::Start {
                rle_packet_length: emit_len as u16,
                total_alpdu_length: ctx.total_len as u16,
                label_type: ctx.label_type,
                proto_type_suppr: ctx.proto_type_suppr,
                use_crc: ctx.use_crc,
                frag_id,
                payload: &ctx.alpdu_buffer[ctx.emitted..ctx.emitted + emit_len],
            }
        } else if is_last {
            Ppdu::End {
                rle_packet_length: emit_len as u16,
                frag_id,
                payload: &ctx.alpdu_buffer[ctx.emitted..ctx.emitted + emit_len],
            }
        } else {
            Ppdu::Continue {
                rle_packet_length: emit_len as u16,
                frag_id,
                payload: &ctx.alpdu_buffer[ctx.emitted..ctx.emitted + emit_len],
            }
        };
        out.pack(&ppdu)?;

        ctx.emitted += emit_len;
        ctx.started = true;

        if is_last {
            ctx.state = ContextState::Free;
            ctx.counters.record_ok(ctx.total_len);
            if !ctx.use_crc {
                ctx.next_seqno = ctx.next_seqno.wrapping_add(1);
            }
        }

        Ok(out)
    }

    pub fn get_queue_size(&self, frag_id: u8) -> Result<u32, Error> {
        let ctx = self.context(frag_id)?;
        if ctx.state != ContextState::Staged {
            return Err(Error::ContextEmpty);
        }
        Ok(ctx.remaining() as u32)
    }

    pub fn get_queue_state(&self, frag_id: u8) -> Result<ContextState, Error> {
        Ok(self.context(frag_id)?.state)
    }

    /// Forcibly reclaims `frag_id`, discarding any in-flight ALPDU.
    pub fn free_context(&mut self, frag_id: u8) -> Result<(), Error> {
        let ctx = self.context_mut(frag_id)?;
        if ctx.state == ContextState::Staged {
            ctx.counters.record_dropped();
        }
        ctx.state = ContextState::Free;
        ctx.total_len = 0;
        ctx.emitted = 0;
        Ok(())
    }

    pub fn counters(&self, frag_id: u8) -> Result<Counters, Error> {
        Ok(self.context(frag_id)?.counters)
    }

    /// Aggregates the per-`frag_id` counters into a single total.
    pub fn counters_sum(&self) -> Counters {
        let mut sum = Counters::default();
        for ctx in &self.contexts {
            sum.ok += ctx.counters.ok;
            sum.dropped += ctx.counters.dropped;
            sum.lost += ctx.counters.lost;
            sum.bytes += ctx.counters.bytes;
        }
        sum
    }
}

/// A packed PPDU (header + payload), returned by [`Transmitter::fragment`].
pub struct PpduBytes {
    buf: [u8; MAX_ALPDU_BUFFER + 4],
    len: usize,
}

impl PpduBytes {
    fn new() -> Self {
        PpduBytes {
            buf: [0; MAX_ALPDU_BUFFER + 4],
            len: 0,
        }
    }

    fn pack(&mut self, ppdu: &Ppdu<'_>) -> Result<(), Error> {
        let header_len = ppdu.header_len();
        let payload = ppdu.payload();
        let total = header_len + payload.len();
        {
            let mut writer = ByteWriter::new(&mut self.buf[..total]);
            ppdu.pack_header(&mut writer)?;
            writer.write_slice(payload)?;
        }
        self.len = total;
        Ok(())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg_seqno() -> Config {
        Config::default_uncompressed()
    }

    #[test]
    fn small_sdu_emits_single_complete_ppdu() {
        let mut tx = Transmitter::new(cfg_seqno());
        let sdu = Sdu::new(&[0xAB; 10], 0x0800).unwrap();
        tx.encapsulate(&sdu, 3).unwrap();

        let ppdu = tx.fragment(3, 200).unwrap();
        // header(2) + ptype(2, uncompressed) + sdu(10) = 14; COMPLETE never carries a trailer.
        assert_eq!(ppdu.as_slice().len(), 14);
        assert_eq!(tx.get_queue_state(3).unwrap(), ContextState::Free);
        assert_eq!(tx.counters(3).unwrap().ok, 1);
    }

    #[test]
    fn large_sdu_fragments_across_multiple_ppdus() {
        let mut tx = Transmitter::new(cfg_seqno());
        let data = [0x11u8; 1500];
        let sdu = Sdu::new(&data, 0x0800).unwrap();
        tx.encapsulate(&sdu, 0).unwrap();

        let mut total_payload = 0usize;
        let mut saw_start = false;
        let mut saw_end = false;
        loop {
            let state = tx.get_queue_state(0).unwrap();
            if state == ContextState::Free {
                break;
            }
            let ppdu_bytes = tx.fragment(0, 100).unwrap();
            let mut reader = crate::bytes::ByteReader::new(ppdu_bytes.as_slice());
            let ppdu = Ppdu::parse(&mut reader).unwrap();
            total_payload += ppdu.payload().len();
            match ppdu {
                Ppdu::Start { .. } => saw_start = true,
                Ppdu::End { .. } => saw_end = true,
                _ => {}
            }
        }
        assert!(saw_start);
        assert!(saw_end);
        // alpdu = 2-byte ptype header + 1500 payload + 1-byte seqno trailer = 1503
        assert_eq!(total_payload, 1503);
    }

    #[test]
    fn busy_context_rejects_second_encapsulate() {
        let mut tx = Transmitter::new(cfg_seqno());
        let sdu = Sdu::new(&[1, 2, 3], 0x0800).unwrap();
        tx.encapsulate(&sdu, 1).unwrap();
        let err = tx.encapsulate(&sdu, 1).unwrap_err();
        assert_eq!(err, Error::FragContextBusy);
    }

    #[test]
    fn free_context_discards_and_counts_dropped() {
        let mut tx = Transmitter::new(cfg_seqno());
        let sdu = Sdu::new(&[1, 2, 3], 0x0800).unwrap();
        tx.encapsulate(&sdu, 2).unwrap();
        tx.free_context(2).unwrap();
        assert_eq!(tx.get_queue_state(2).unwrap(), ContextState::Free);
        assert_eq!(tx.counters(2).unwrap().dropped, 1);
    }

    #[test]
    fn too_small_a_burst_is_rejected() {
        let mut tx = Transmitter::new(cfg_seqno());
        let sdu = Sdu::new(&[1, 2, 3], 0x0800).unwrap();
        tx.encapsulate(&sdu, 4).unwrap();
        let err = tx.fragment(4, 1).unwrap_err();
        assert_eq!(err, Error::BurstTooSmall);
    }

    #[test]
    fn counters_sum_aggregates_across_frag_ids() {
        let mut tx = Transmitter::new(cfg_seqno());
        let sdu = Sdu::new(&[1, 2, 3], 0x0800).unwrap();
        tx.encapsulate(&sdu, 0).unwrap();
        tx.fragment(0, 200).unwrap();
        tx.encapsulate(&sdu, 1).unwrap();
        tx.fragment(1, 200).unwrap();

        let sum = tx.counters_sum();
        assert_eq!(sum.ok, 2);
    }
}
