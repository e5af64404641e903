//! # Ecometer Protocol Constants and Types
//!
//! Core protocol definitions for the Ecometer S serial link.
//!
//! ```text
//! Offset  Size  Field
//! 0       2     magic header ("SI")
//! 2       2     total frame length, big-endian, counts every byte
//! 4       1     direction (1 = to device, 2 = from device)
//! 5       1     command flags
//! 6..=8   3     hour, minute, second
//! 9       2     EEPROM start address, big-endian
//! 11      2     EEPROM end address, big-endian
//! 13      n     payload
//! len-2   2     CRC-16 trailer, big-endian
//! ```

use bytes::Bytes;

/// Frame magic header ("SI")
pub const ECOMETER_MAGIC: [u8; 2] = [0x53, 0x49];

/// Size of the magic header
pub const ECOMETER_MAGIC_SIZE: usize = 2;

/// Size of the big-endian length field
pub const ECOMETER_LENGTH_FIELD_SIZE: usize = 2;

/// Bytes before the payload: magic(2) + length(2) + direction(1) + command(1)
/// + clock(3) + eeprom start(2) + eeprom end(2)
pub const ECOMETER_HEADER_SIZE: usize = 13;

/// CRC trailer size
pub const ECOMETER_CRC_SIZE: usize = 2;

/// Smallest valid frame: header region plus CRC, empty payload
pub const ECOMETER_MIN_FRAME_SIZE: usize = ECOMETER_HEADER_SIZE + ECOMETER_CRC_SIZE;

/// Live data payload size (temperature + distance + usable + total)
pub const ECOMETER_LIVE_PAYLOAD_SIZE: usize = 7;

/// Baud rate of the display's serial link
pub const ECOMETER_BAUD_RATE: u32 = 115_200;

/// Read timeout of one frame read, in milliseconds
pub const ECOMETER_READ_TIMEOUT_MS: u64 = 10_000;

/// Direction of a datagram on the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Host to display
    ToDevice,
    /// Display to host
    FromDevice,
    /// Any other byte value, kept as received
    Unknown(u8),
}

impl Direction {
    /// Interpret the direction byte
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            1 => Direction::ToDevice,
            2 => Direction::FromDevice,
            other => Direction::Unknown(other),
        }
    }

    /// Wire value of this direction
    pub fn to_byte(self) -> u8 {
        match self {
            Direction::ToDevice => 1,
            Direction::FromDevice => 2,
            Direction::Unknown(other) => other,
        }
    }
}

/// Command flags bitfield (byte 5)
///
/// Bits 5-7 are unused by the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommandFlags(pub u8);

impl CommandFlags {
    /// Set the clock in the device on upload
    pub const SET_CLOCK: CommandFlags = CommandFlags(1);
    /// Force a device reset (set before an update)
    pub const RESET: CommandFlags = CommandFlags(2);
    /// A non-empty payload is sent to the device
    pub const SEND: CommandFlags = CommandFlags(4);
    /// Force recalculation after changing offset, outlet height or lookup table
    pub const RECALCULATE: CommandFlags = CommandFlags(8);
    /// Live data received from the device
    pub const LIVE: CommandFlags = CommandFlags(16);

    /// Raw bitfield value
    pub fn bits(self) -> u8 {
        self.0
    }

    /// True if every bit of `other` is set
    pub fn contains(self, other: CommandFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// True for a pure live data datagram (no other flag set)
    pub fn is_live(self) -> bool {
        self == CommandFlags::LIVE
    }
}

impl std::ops::BitOr for CommandFlags {
    type Output = CommandFlags;

    fn bitor(self, rhs: CommandFlags) -> CommandFlags {
        CommandFlags(self.0 | rhs.0)
    }
}

/// Clock fields carried by every datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClockFields {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

/// Complete raw frame as read from the serial port
///
/// Holds header, length field, body and CRC exactly as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    bytes: Bytes,
}

impl RawFrame {
    /// Wrap received bytes
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self { bytes: bytes.into() }
    }

    /// All frame bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of bytes actually held
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True when no bytes were captured
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Length declared in bytes 2..4, if present
    pub fn declared_length(&self) -> Option<u16> {
        self.bytes
            .get(ECOMETER_MAGIC_SIZE..ECOMETER_MAGIC_SIZE + ECOMETER_LENGTH_FIELD_SIZE)
            .map(|field| u16::from_be_bytes([field[0], field[1]]))
    }
}

/// Decoded view of one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    /// Direction of the datagram
    pub direction: Direction,

    /// Command flags
    pub command: CommandFlags,

    /// Clock fields, meaningful with SET_CLOCK or on upload
    pub clock: ClockFields,

    /// First EEPROM address (unused in live data)
    pub eeprom_start: u16,

    /// Last EEPROM address (unused in live data)
    pub eeprom_end: u16,

    /// Payload bytes between header region and CRC
    pub payload: Vec<u8>,

    /// CRC trailer as received
    pub crc: u16,
}

impl Datagram {
    /// Create a datagram with zeroed clock and EEPROM fields
    pub fn new(direction: Direction, command: CommandFlags, payload: Vec<u8>) -> Self {
        Self {
            direction,
            command,
            clock: ClockFields::default(),
            eeprom_start: 0,
            eeprom_end: 0,
            payload,
            crc: 0,
        }
    }

    /// Total frame length on the wire (header region + payload + crc)
    pub fn frame_length(&self) -> usize {
        ECOMETER_HEADER_SIZE + self.payload.len() + ECOMETER_CRC_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_constants() {
        assert_eq!(&ECOMETER_MAGIC, b"SI");
        assert_eq!(ECOMETER_HEADER_SIZE, 13);
        assert_eq!(ECOMETER_MIN_FRAME_SIZE, 15);
        assert_eq!(ECOMETER_BAUD_RATE, 115_200);
        assert_eq!(ECOMETER_READ_TIMEOUT_MS, 10_000);
    }

    #[test]
    fn test_command_flag_values() {
        assert_eq!(CommandFlags::SET_CLOCK.bits(), 1);
        assert_eq!(CommandFlags::RESET.bits(), 2);
        assert_eq!(CommandFlags::SEND.bits(), 4);
        assert_eq!(CommandFlags::RECALCULATE.bits(), 8);
        assert_eq!(CommandFlags::LIVE.bits(), 16);
    }

    #[test]
    fn test_command_flags_live_must_be_alone() {
        assert!(CommandFlags(16).is_live());
        assert!(!(CommandFlags::LIVE | CommandFlags::SEND).is_live());
        assert!((CommandFlags::LIVE | CommandFlags::SEND).contains(CommandFlags::LIVE));
        assert!(!CommandFlags::SEND.contains(CommandFlags::LIVE));
    }

    #[test]
    fn test_direction_bytes() {
        assert_eq!(Direction::from_byte(1), Direction::ToDevice);
        assert_eq!(Direction::from_byte(2), Direction::FromDevice);
        assert_eq!(Direction::from_byte(7), Direction::Unknown(7));
        assert_eq!(Direction::Unknown(7).to_byte(), 7);
    }

    #[test]
    fn test_raw_frame_declared_length() {
        let frame = RawFrame::new(vec![0x53, 0x49, 0x00, 0x16]);
        assert_eq!(frame.declared_length(), Some(22));
        assert_eq!(frame.len(), 4);

        let short = RawFrame::new(vec![0x53, 0x49, 0x00]);
        assert_eq!(short.declared_length(), None);
    }

    #[test]
    fn test_datagram_frame_length() {
        let datagram = Datagram::new(Direction::FromDevice, CommandFlags::LIVE, vec![0u8; 7]);
        assert_eq!(datagram.frame_length(), 22);
    }
}
