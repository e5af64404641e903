//! # Live Measurement Translation
//!
//! Converts the payload of a live datagram into physical measurements.
//!
//! Payload layout (7 bytes):
//! ```text
//! Byte 0:    temperature, degrees Fahrenheit + 40
//! Byte 1-2:  distance sensor to surface in cm, big-endian
//! Byte 3-4:  usable volume, big-endian
//! Byte 5-6:  total capacity, big-endian
//! ```

use chrono::{DateTime, Utc};

use super::protocol::{Datagram, ECOMETER_LIVE_PAYLOAD_SIZE};
use crate::error::{EcometerError, Result};

/// Level reference used by the display firmware, in cm
///
/// Independent of the configured tank height and sensor offset.
pub const ECOMETER_LEVEL_REFERENCE_CM: i32 = 190;

/// Offset added to the Fahrenheit temperature byte
const TEMPERATURE_BYTE_OFFSET: f64 = 40.0;

/// One set of readings from a live datagram
#[derive(Debug, Clone, PartialEq)]
pub struct LiveMeasurement {
    /// Liquid temperature in °C, one decimal
    pub temperature_celsius: f64,

    /// Distance between sensor and liquid surface in cm
    pub distance_cm: u16,

    /// Fill level in cm (reference minus distance, may be negative)
    pub level_cm: i32,

    /// Usable volume as reported by the display
    pub usable_volume: u16,

    /// Total capacity as reported by the display
    pub total_capacity: u16,

    /// Fill percentage, one decimal
    pub percentage: f64,

    /// Capture time
    pub captured_at: DateTime<Utc>,
}

/// Round to one decimal place
///
/// Rounds the exact decimal value of `value`, ties to even.
pub fn round_one_decimal(value: f64) -> f64 {
    format!("{:.1}", value).parse().unwrap_or(value)
}

/// Translate a live datagram into measurements
///
/// Callers must only pass datagrams whose command is LIVE; other datagrams
/// carry no measurement payload.
///
/// # Arguments
///
/// * `datagram` - Decoded live datagram
/// * `level_reference_cm` - Height the distance is subtracted from
/// * `captured_at` - Time stamp attached to the measurement
///
/// # Errors
///
/// Returns error if:
/// - Payload is shorter than 7 bytes
/// - Total capacity is zero
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use ecometer_bridge::ecometer::measurement::{translate, ECOMETER_LEVEL_REFERENCE_CM};
/// use ecometer_bridge::ecometer::protocol::{CommandFlags, Datagram, Direction};
///
/// let payload = vec![0x5A, 0x00, 0x32, 0x01, 0x90, 0x02, 0x00];
/// let datagram = Datagram::new(Direction::FromDevice, CommandFlags::LIVE, payload);
/// let m = translate(&datagram, ECOMETER_LEVEL_REFERENCE_CM, Utc::now()).unwrap();
/// assert_eq!(m.level_cm, 140);
/// assert_eq!(m.percentage, 78.1);
/// ```
pub fn translate(
    datagram: &Datagram,
    level_reference_cm: i32,
    captured_at: DateTime<Utc>,
) -> Result<LiveMeasurement> {
    let payload = &datagram.payload;
    if payload.len() < ECOMETER_LIVE_PAYLOAD_SIZE {
        return Err(EcometerError::MalformedFrame(format!(
            "Live payload too short: {} bytes",
            payload.len()
        )));
    }

    let fahrenheit = payload[0] as f64 - TEMPERATURE_BYTE_OFFSET;
    let temperature_celsius = round_one_decimal((fahrenheit - 32.0) / 1.8);

    let distance_cm = u16::from_be_bytes([payload[1], payload[2]]);
    let level_cm = level_reference_cm - distance_cm as i32;

    let usable_volume = u16::from_be_bytes([payload[3], payload[4]]);
    let total_capacity = u16::from_be_bytes([payload[5], payload[6]]);

    if total_capacity == 0 {
        return Err(EcometerError::ZeroCapacity);
    }

    let percentage = round_one_decimal(100.0 * usable_volume as f64 / total_capacity as f64);

    Ok(LiveMeasurement {
        temperature_celsius,
        distance_cm,
        level_cm,
        usable_volume,
        total_capacity,
        percentage,
        captured_at,
    })
}
