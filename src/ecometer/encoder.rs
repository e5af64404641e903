//! # Ecometer Datagram Encoder
//!
//! Builds complete frames from datagrams. The display only ever sends live
//! data to the host, so this is mostly used to produce well-formed frames
//! for the decoder and the frame reader.

use bytes::{BufMut, BytesMut};

use super::crc::crc16_ccitt;
use super::protocol::*;

/// Encode a datagram into a complete frame
///
/// The length field is computed from the payload and the CRC trailer is
/// recomputed; `datagram.crc` is ignored.
///
/// # Arguments
///
/// * `datagram` - Datagram to encode
///
/// # Returns
///
/// * `Vec<u8>` - Complete frame (magic + length + body + crc)
///
/// # Examples
///
/// ```
/// use ecometer_bridge::ecometer::encoder::encode_datagram;
/// use ecometer_bridge::ecometer::protocol::{CommandFlags, Datagram, Direction};
///
/// let datagram = Datagram::new(Direction::FromDevice, CommandFlags::LIVE, vec![0u8; 7]);
/// let frame = encode_datagram(&datagram);
/// assert_eq!(frame.len(), 22);
/// ```
pub fn encode_datagram(datagram: &Datagram) -> Vec<u8> {
    let length = datagram.frame_length();
    let mut frame = BytesMut::with_capacity(length);

    frame.put_slice(&ECOMETER_MAGIC);
    frame.put_u16(length as u16);
    frame.put_u8(datagram.direction.to_byte());
    frame.put_u8(datagram.command.bits());
    frame.put_u8(datagram.clock.hour);
    frame.put_u8(datagram.clock.minute);
    frame.put_u8(datagram.clock.second);
    frame.put_u16(datagram.eeprom_start);
    frame.put_u16(datagram.eeprom_end);
    frame.put_slice(&datagram.payload);

    let crc = crc16_ccitt(&frame);
    frame.put_u16(crc);

    frame.to_vec()
}

/// Encode a live data payload
///
/// # Arguments
///
/// * `temperature_byte` - Raw temperature byte (Fahrenheit + 40)
/// * `distance_cm` - Distance between sensor and liquid surface
/// * `usable` - Usable volume
/// * `total` - Total capacity
pub fn encode_live_payload(
    temperature_byte: u8,
    distance_cm: u16,
    usable: u16,
    total: u16,
) -> Vec<u8> {
    let mut payload = Vec::with_capacity(ECOMETER_LIVE_PAYLOAD_SIZE);
    payload.push(temperature_byte);
    payload.extend_from_slice(&distance_cm.to_be_bytes());
    payload.extend_from_slice(&usable.to_be_bytes());
    payload.extend_from_slice(&total.to_be_bytes());
    payload
}
