//! Deterministic PPDU overhead accounting for non-traffic FPDU kinds.
//!
//! `Logon`, `Ctrl`, and `TrafficCtrl` FPDUs always carry a single signalling SDU (protocol type
//! `0x0082`), which is unconditionally suppressible (see [`proto_type::resolve`]) and never
//! fragments, so their overhead is a fixed number of bytes independent of the SDU actually being
//! sent. `Traffic` FPDUs carry arbitrary user SDUs whose header shape depends on each SDU's own
//! protocol type, so their overhead cannot be quoted ahead of time.
//!
//! [`proto_type::resolve`]: crate::proto_type::resolve

use crate::config::Config;

/// The four FPDU classes this link distinguishes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FpduKind {
    Logon,
    Ctrl,
    TrafficCtrl,
    Traffic,
}

/// Result of a [`header_size`] query.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HeaderSize {
    /// Fixed per-FPDU overhead in bytes.
    Deterministic(u32),
    /// Overhead varies per SDU; no single answer exists.
    NonDeterministic,
}

/// Fixed signalling overhead for a `Logon` FPDU: COMPLETE PPDU header (2) + sequence-number
/// trailer (1) + logon-specific fixed fields (3).
const LOGON_OVERHEAD: u32 = 6;
/// Fixed signalling overhead for a `Ctrl` FPDU: COMPLETE PPDU header (2) + sequence-number
/// trailer (1).
const CTRL_OVERHEAD: u32 = 3;
/// Fixed signalling overhead for a `TrafficCtrl` FPDU: COMPLETE PPDU header (2) + sequence-number
/// trailer (1) + traffic-control-specific fixed fields (2).
const TRAFFIC_CTRL_OVERHEAD: u32 = 5;

/// Returns the per-FPDU overhead for `kind` under `config`.
///
/// `Logon`, `Ctrl`, and `TrafficCtrl` FPDUs carry only signalling SDUs, whose protocol-type header
/// is always suppressed regardless of `config`, so their overhead is constant. `Traffic` FPDUs
/// carry user data whose header shape depends on each SDU's protocol type and is decided per call
/// to `fragment`, so no deterministic answer exists.
pub fn header_size(_config: &Config, kind: FpduKind) -> HeaderSize {
    match kind {
        FpduKind::Logon => HeaderSize::Deterministic(LOGON_OVERHEAD),
        FpduKind::Ctrl => HeaderSize::Deterministic(CTRL_OVERHEAD),
        FpduKind::TrafficCtrl => HeaderSize::Deterministic(TRAFFIC_CTRL_OVERHEAD),
        FpduKind::Traffic => HeaderSize::NonDeterministic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conf_seqno_only(implicit_protocol_type: u8, use_compressed_ptype: bool) -> Config {
        Config::new(
            false,
            use_compressed_ptype,
            false,
            true,
            false,
            implicit_protocol_type,
            0,
            0,
            0,
        )
        .unwrap()
    }

    #[test]
    fn logon_overhead_is_six() {
        let cfg = conf_seqno_only(0x00, false);
        assert_eq!(header_size(&cfg, FpduKind::Logon), HeaderSize::Deterministic(6));
    }

    #[test]
    fn ctrl_overhead_is_three() {
        let cfg = conf_seqno_only(0x00, false);
        assert_eq!(header_size(&cfg, FpduKind::Ctrl), HeaderSize::Deterministic(3));
    }

    #[test]
    fn traffic_ctrl_overhead_is_five_regardless_of_ptype_compression() {
        for use_compressed_ptype in [false, true] {
            let cfg = conf_seqno_only(0x34, use_compressed_ptype);
            assert_eq!(
                header_size(&cfg, FpduKind::TrafficCtrl),
                HeaderSize::Deterministic(5)
            );
        }
    }

    #[test]
    fn plain_traffic_is_never_deterministic() {
        let cfg = conf_seqno_only(0x00, false);
        assert_eq!(header_size(&cfg, FpduKind::Traffic), HeaderSize::NonDeterministic);
    }
}
