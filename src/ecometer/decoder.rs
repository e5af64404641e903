//! # Ecometer Datagram Decoder
//!
//! Decodes raw frames into structured datagrams.

use super::crc::crc16_ccitt;
use super::protocol::*;
use crate::error::{EcometerError, Result};

/// Decode a complete Ecometer frame
///
/// Fields are taken from fixed offsets. The CRC trailer is passed through
/// without being checked, see [`verify_crc`].
///
/// # Arguments
///
/// * `frame` - Complete frame bytes (magic, length, body, crc)
///
/// # Returns
///
/// * `Result<Datagram>` - Decoded datagram, or error if inconsistent
///
/// # Errors
///
/// Returns error if:
/// - Frame is shorter than the 15 byte minimum
/// - Magic header is incorrect
/// - Declared length differs from the number of bytes held
pub fn decode_frame(frame: &RawFrame) -> Result<Datagram> {
    let data = frame.as_bytes();

    if data.len() < ECOMETER_MIN_FRAME_SIZE {
        return Err(EcometerError::MalformedFrame(format!(
            "Frame too short: {} bytes, minimum is {}",
            data.len(),
            ECOMETER_MIN_FRAME_SIZE
        )));
    }

    if data[0..2] != ECOMETER_MAGIC {
        return Err(EcometerError::HeaderMismatch([data[0], data[1]]));
    }

    let declared = u16::from_be_bytes([data[2], data[3]]) as usize;
    if declared != data.len() {
        return Err(EcometerError::MalformedFrame(format!(
            "Declared length {} does not match {} bytes received",
            declared,
            data.len()
        )));
    }

    let crc_offset = data.len() - ECOMETER_CRC_SIZE;

    Ok(Datagram {
        direction: Direction::from_byte(data[4]),
        command: CommandFlags(data[5]),
        clock: ClockFields {
            hour: data[6],
            minute: data[7],
            second: data[8],
        },
        eeprom_start: u16::from_be_bytes([data[9], data[10]]),
        eeprom_end: u16::from_be_bytes([data[11], data[12]]),
        payload: data[ECOMETER_HEADER_SIZE..crc_offset].to_vec(),
        crc: u16::from_be_bytes([data[crc_offset], data[crc_offset + 1]]),
    })
}

/// Check the CRC-16 trailer of a frame
///
/// # Errors
///
/// Returns `MalformedFrame` if the frame cannot hold a trailer and
/// `CrcMismatch` if the trailer differs from the computed checksum.
pub fn verify_crc(frame: &RawFrame) -> Result<()> {
    let data = frame.as_bytes();

    if data.len() < ECOMETER_MIN_FRAME_SIZE {
        return Err(EcometerError::MalformedFrame(format!(
            "Frame too short for CRC: {} bytes",
            data.len()
        )));
    }

    let crc_offset = data.len() - ECOMETER_CRC_SIZE;
    let actual = u16::from_be_bytes([data[crc_offset], data[crc_offset + 1]]);
    let expected = crc16_ccitt(&data[..crc_offset]);

    if expected != actual {
        return Err(EcometerError::CrcMismatch { expected, actual });
    }

    Ok(())
}
