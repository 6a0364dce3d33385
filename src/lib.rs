//! A `no_std` implementation of Return Link Encapsulation (RLE), the DVB-RCS2 adaptation layer
//! that carries variable-length network SDUs over fixed-size satellite-link FPDU payloads.
//!
//! # Using the stack
//!
//! This crate does not open any channel or perform any I/O itself: it only transforms bytes.
//! A [`Transmitter`] turns SDUs into a stream of PPDU bursts sized to whatever burst budget the
//! caller's link layer hands it; a [`Receiver`] takes PPDU bursts pulled back out of FPDUs and
//! reassembles SDUs from them. Both sides are configured once via [`Config`], which must agree
//! between transmitter and receiver for a link to interoperate.
//!
//! [`Transmitter`]: transmitter::Transmitter
//! [`Receiver`]: receiver::Receiver
//! [`Config`]: config::Config

#![no_std]

#[macro_use]
mod log;
pub mod bytes;
pub mod config;
pub mod constants;
mod crc;
mod error;
pub mod fpdu;
pub mod ppdu;
pub mod proto_type;
pub mod receiver;
pub mod sdu;
pub mod stats;
pub mod transmitter;

pub use self::error::Error;
