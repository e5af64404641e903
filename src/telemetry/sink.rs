//! # Measurement Sinks
//!
//! Unit updates and the idempotent device board that receives them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::info;

use crate::ecometer::measurement::LiveMeasurement;
use crate::error::{EcometerError, Result};

/// The five values published per live frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum DeviceUnit {
    /// Fill level in percent
    Percentage = 1,
    /// Fill level in cm
    Level = 2,
    /// Usable volume
    Volume = 3,
    /// Liquid temperature in °C
    Temperature = 4,
    /// Distance between sensor and liquid surface in cm
    Distance = 5,
}

impl DeviceUnit {
    /// All units in publication order
    pub const ALL: [DeviceUnit; 5] = [
        DeviceUnit::Percentage,
        DeviceUnit::Level,
        DeviceUnit::Volume,
        DeviceUnit::Temperature,
        DeviceUnit::Distance,
    ];

    /// Unit number
    pub fn number(self) -> u8 {
        self as u8
    }

    /// Unit with the given number
    pub fn from_number(number: u8) -> Option<DeviceUnit> {
        DeviceUnit::ALL.into_iter().find(|u| u.number() == number)
    }

    /// Display name
    pub fn name(self) -> &'static str {
        match self {
            DeviceUnit::Percentage => "Percentage",
            DeviceUnit::Level => "Level",
            DeviceUnit::Volume => "Volume",
            DeviceUnit::Temperature => "Temperature",
            DeviceUnit::Distance => "Distance",
        }
    }
}

/// One scalar update for one unit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitUpdate {
    pub unit: DeviceUnit,
    pub value: f64,
    pub display: String,
    pub captured_at: DateTime<Utc>,
}

impl UnitUpdate {
    /// True if both updates carry the same reading, ignoring the time stamp
    pub fn same_reading(&self, other: &UnitUpdate) -> bool {
        self.unit == other.unit && self.value == other.value && self.display == other.display
    }

    /// Split a measurement into its five updates
    pub fn from_measurement(m: &LiveMeasurement) -> [UnitUpdate; 5] {
        let update = |unit, value: f64, display: String| UnitUpdate {
            unit,
            value,
            display,
            captured_at: m.captured_at,
        };

        [
            update(DeviceUnit::Percentage, m.percentage, format!("{:.1}", m.percentage)),
            update(DeviceUnit::Level, m.level_cm as f64, m.level_cm.to_string()),
            update(DeviceUnit::Volume, m.usable_volume as f64, m.usable_volume.to_string()),
            update(
                DeviceUnit::Temperature,
                m.temperature_celsius,
                format!("{:.1}", m.temperature_celsius),
            ),
            update(DeviceUnit::Distance, m.distance_cm as f64, m.distance_cm.to_string()),
        ]
    }
}

/// Receiver of unit updates, called from the polling task
#[cfg_attr(test, mockall::automock)]
pub trait MeasurementSink: Send {
    /// Deliver one update
    fn publish(&mut self, update: UnitUpdate) -> Result<()>;
}

impl<S: MeasurementSink> MeasurementSink for Arc<Mutex<S>> {
    fn publish(&mut self, update: UnitUpdate) -> Result<()> {
        let mut sink = self.lock().map_err(|_| {
            EcometerError::Io(std::io::Error::other("measurement sink lock poisoned"))
        })?;
        sink.publish(update)
    }
}

/// Current value of every unit
///
/// An update is applied, logged and forwarded downstream only when it
/// differs from the value already held for that unit.
#[derive(Debug)]
pub struct DeviceBoard<S = NullSink> {
    values: BTreeMap<DeviceUnit, UnitUpdate>,
    downstream: Option<S>,
    applied: u64,
}

impl DeviceBoard<NullSink> {
    /// Board without a downstream sink
    pub fn new() -> Self {
        Self::with_downstream(None)
    }
}

impl Default for DeviceBoard<NullSink> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: MeasurementSink> DeviceBoard<S> {
    /// Board forwarding applied updates to `downstream`
    pub fn with_downstream(downstream: Option<S>) -> Self {
        Self {
            values: BTreeMap::new(),
            downstream,
            applied: 0,
        }
    }

    /// Seed a unit with a previously known value without forwarding it
    ///
    /// Used at startup with the values recovered from the telemetry log.
    pub fn restore(&mut self, update: UnitUpdate) {
        self.values.insert(update.unit, update);
    }

    /// Current value of a unit
    pub fn get(&self, unit: DeviceUnit) -> Option<&UnitUpdate> {
        self.values.get(&unit)
    }

    /// Copy of all current values in unit order
    pub fn snapshot(&self) -> Vec<UnitUpdate> {
        self.values.values().cloned().collect()
    }

    /// Number of updates applied since creation
    pub fn applied_count(&self) -> u64 {
        self.applied
    }
}

impl<S: MeasurementSink> MeasurementSink for DeviceBoard<S> {
    fn publish(&mut self, update: UnitUpdate) -> Result<()> {
        if let Some(current) = self.values.get(&update.unit) {
            if current.same_reading(&update) {
                return Ok(());
            }
        }

        info!(
            "Update {}:'{}' ({})",
            update.unit.number(),
            update.display,
            update.unit.name()
        );

        if let Some(downstream) = self.downstream.as_mut() {
            downstream.publish(update.clone())?;
        }

        self.values.insert(update.unit, update);
        self.applied += 1;
        Ok(())
    }
}

/// Sink that drops every update
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl MeasurementSink for NullSink {
    fn publish(&mut self, _update: UnitUpdate) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn measurement() -> LiveMeasurement {
        LiveMeasurement {
            temperature_celsius: 10.0,
            distance_cm: 50,
            level_cm: 140,
            usable_volume: 400,
            total_capacity: 512,
            percentage: 78.1,
            captured_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    fn update(unit: DeviceUnit, value: f64) -> UnitUpdate {
        UnitUpdate {
            unit,
            value,
            display: value.to_string(),
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn test_unit_numbers_and_names() {
        assert_eq!(DeviceUnit::Percentage.number(), 1);
        assert_eq!(DeviceUnit::Distance.number(), 5);
        assert_eq!(DeviceUnit::Temperature.name(), "Temperature");
        assert_eq!(DeviceUnit::from_number(3), Some(DeviceUnit::Volume));
        assert_eq!(DeviceUnit::from_number(0), None);
        assert_eq!(DeviceUnit::from_number(6), None);
        assert_eq!(DeviceUnit::ALL.len(), 5);
    }

    #[test]
    fn test_updates_from_measurement() {
        let updates = UnitUpdate::from_measurement(&measurement());

        let units: Vec<DeviceUnit> = updates.iter().map(|u| u.unit).collect();
        assert_eq!(units, DeviceUnit::ALL.to_vec());

        let displays: Vec<&str> = updates.iter().map(|u| u.display.as_str()).collect();
        assert_eq!(displays, vec!["78.1", "140", "400", "10.0", "50"]);

        assert_eq!(updates[1].value, 140.0);
        assert_eq!(updates[3].value, 10.0);
    }

    #[test]
    fn test_negative_level_display() {
        let mut m = measurement();
        m.level_cm = -60;
        let updates = UnitUpdate::from_measurement(&m);
        assert_eq!(updates[1].display, "-60");
    }

    #[test]
    fn test_board_applies_changed_values_only() {
        let mut board = DeviceBoard::new();

        board.publish(update(DeviceUnit::Level, 140.0)).unwrap();
        board.publish(update(DeviceUnit::Level, 140.0)).unwrap();
        assert_eq!(board.applied_count(), 1);

        board.publish(update(DeviceUnit::Level, 139.0)).unwrap();
        assert_eq!(board.applied_count(), 2);
        assert_eq!(board.get(DeviceUnit::Level).unwrap().value, 139.0);
    }

    #[test]
    fn test_board_forwards_once_per_change() {
        let mut downstream = MockMeasurementSink::new();
        downstream
            .expect_publish()
            .withf(|u| u.unit == DeviceUnit::Volume)
            .times(2)
            .returning(|_| Ok(()));

        let mut board = DeviceBoard::with_downstream(Some(downstream));
        board.publish(update(DeviceUnit::Volume, 400.0)).unwrap();
        board.publish(update(DeviceUnit::Volume, 400.0)).unwrap();
        board.publish(update(DeviceUnit::Volume, 401.0)).unwrap();
    }

    #[test]
    fn test_board_restore_suppresses_identical_update() {
        let mut downstream = MockMeasurementSink::new();
        downstream.expect_publish().never();

        let mut board = DeviceBoard::with_downstream(Some(downstream));
        board.restore(update(DeviceUnit::Distance, 50.0));
        board.publish(update(DeviceUnit::Distance, 50.0)).unwrap();
        assert_eq!(board.applied_count(), 0);
    }

    #[test]
    fn test_board_downstream_error_leaves_value_unapplied() {
        let mut downstream = MockMeasurementSink::new();
        downstream.expect_publish().returning(|_| {
            Err(EcometerError::Io(std::io::Error::other("disk full")))
        });

        let mut board = DeviceBoard::with_downstream(Some(downstream));
        assert!(board.publish(update(DeviceUnit::Level, 1.0)).is_err());
        assert!(board.get(DeviceUnit::Level).is_none());
    }

    #[test]
    fn test_shared_board_snapshot() {
        let board = Arc::new(Mutex::new(DeviceBoard::new()));
        let mut writer = Arc::clone(&board);

        for u in UnitUpdate::from_measurement(&measurement()) {
            writer.publish(u).unwrap();
        }

        let snapshot = board.lock().unwrap().snapshot();
        assert_eq!(snapshot.len(), 5);
        assert_eq!(snapshot[0].unit, DeviceUnit::Percentage);
    }
}
