//! # Ecometer Protocol Module
//!
//! Implementation of the binary datagram protocol spoken by the Ecometer S
//! display unit on its serial link.
//!
//! This module handles:
//! - Frame layout constants and datagram types
//! - Datagram decoding and encoding
//! - CRC-16 trailer calculation
//! - Translating live data payloads into physical measurements

pub mod protocol;
pub mod encoder;
pub mod decoder;
pub mod crc;
pub mod measurement;
