//! Measurement conversion
//!
//! Maps raw sensor readings to normalized measurements:
//! - Acceleration: m/s² to g
//! - Light: lux, unchanged
//! - Battery: level/scale extras to a charge fraction
//!
//! Each conversion writes the new value to the [`DeviceStateCell`] first and
//! builds the emitted record from what was stored, so status queries always
//! agree with the last emitted measurement.

use crate::error::DeviceError;
use crate::state::DeviceStateCell;
use crate::types::{
    AccelerationSample, BatterySample, BatterySnapshot, LightSample, RawSensorEvent,
    STANDARD_GRAVITY,
};

/// Converter from raw sensor readings to measurements
pub struct MeasurementConverter;

impl MeasurementConverter {
    /// Convert an accelerometer event (m/s² on three axes)
    pub fn acceleration(
        event: &RawSensorEvent,
        state: &DeviceStateCell,
        now_seconds: f64,
    ) -> Result<AccelerationSample, DeviceError> {
        let [x, y, z] = match event.values.as_slice() {
            [x, y, z, ..] => [*x, *y, *z],
            values => {
                return Err(DeviceError::MalformedEvent(format!(
                    "accelerometer event needs 3 values, got {}",
                    values.len()
                )))
            }
        };

        let [x, y, z] = state.set_acceleration(to_g(x), to_g(y), to_g(z));

        Ok(AccelerationSample {
            time: event.timestamp_nanos as f64,
            time_received: now_seconds,
            x,
            y,
            z,
        })
    }

    /// Convert an ambient light event (lux)
    pub fn light(
        event: &RawSensorEvent,
        state: &DeviceStateCell,
        now_seconds: f64,
    ) -> Result<LightSample, DeviceError> {
        let lux = event.values.first().copied().ok_or_else(|| {
            DeviceError::MalformedEvent("light event carries no value".to_string())
        })?;

        let light = state.set_light(lux);

        Ok(LightSample {
            time: event.timestamp_nanos as f64,
            time_received: now_seconds,
            light,
        })
    }

    /// Convert a battery snapshot; `None` when the charge level is unknown
    pub fn battery(
        snapshot: Option<&BatterySnapshot>,
        state: &DeviceStateCell,
        now_seconds: f64,
    ) -> Option<BatterySample> {
        let snapshot = snapshot?;
        let fraction = battery_fraction(snapshot.level?, snapshot.scale?)?;

        state.set_battery_level(fraction);

        Some(BatterySample {
            time: now_seconds,
            time_received: now_seconds,
            battery_level: fraction,
        })
    }
}

/// Convert m/s² to g
pub fn to_g(meters_per_second_squared: f32) -> f32 {
    meters_per_second_squared / STANDARD_GRAVITY
}

/// Charge fraction for a level/scale pair, `None` if the pair is not usable
///
/// A non-positive scale, a negative level, or a level above the scale all
/// mean the platform did not report a real reading.
pub fn battery_fraction(level: i32, scale: i32) -> Option<f32> {
    if scale <= 0 || level < 0 || level > scale {
        return None;
    }
    Some(level as f32 / scale as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DeviceIdentity, SensorKind};

    fn make_state() -> DeviceStateCell {
        DeviceStateCell::new(DeviceIdentity::new("group", Some("source".to_string())))
    }

    #[test]
    fn test_acceleration_in_g() {
        let state = make_state();
        let event = RawSensorEvent::new(
            SensorKind::Accelerometer,
            123_456,
            vec![9.81, -4.905, 0.0],
        );

        let sample = MeasurementConverter::acceleration(&event, &state, 1_700_000_000.5).unwrap();

        assert!((sample.x - 1.0).abs() < 1e-6);
        assert!((sample.y + 0.5).abs() < 1e-6);
        assert_eq!(sample.z, 0.0);
        assert_eq!(sample.time, 123_456.0);
        assert_eq!(sample.time_received, 1_700_000_000.5);

        assert_eq!(state.latest().acceleration, Some([sample.x, sample.y, sample.z]));
    }

    #[test]
    fn test_acceleration_matches_division_for_many_inputs() {
        let state = make_state();
        for raw in [-39.2_f32, -9.81, -0.001, 0.0, 0.5, 3.3, 19.62, 78.4] {
            let event =
                RawSensorEvent::new(SensorKind::Accelerometer, 0, vec![raw, raw * 2.0, -raw]);
            let sample = MeasurementConverter::acceleration(&event, &state, 0.0).unwrap();

            assert!((sample.x - raw / 9.81).abs() < 1e-5);
            assert!((sample.y - raw * 2.0 / 9.81).abs() < 1e-5);
            assert!((sample.z + raw / 9.81).abs() < 1e-5);
        }
    }

    #[test]
    fn test_acceleration_rejects_short_event() {
        let state = make_state();
        let event = RawSensorEvent::new(SensorKind::Accelerometer, 0, vec![1.0, 2.0]);

        let result = MeasurementConverter::acceleration(&event, &state, 0.0);

        assert!(matches!(result, Err(DeviceError::MalformedEvent(_))));
        assert_eq!(state.latest().acceleration, None);
    }

    #[test]
    fn test_light_passes_through() {
        let state = make_state();
        let event = RawSensorEvent::new(SensorKind::Light, 77, vec![250.5]);

        let sample = MeasurementConverter::light(&event, &state, 12.25).unwrap();

        assert_eq!(sample.light, 250.5);
        assert_eq!(sample.time, 77.0);
        assert_eq!(sample.time_received, 12.25);
        assert_eq!(state.latest().light, Some(250.5));
    }

    #[test]
    fn test_light_rejects_empty_event() {
        let state = make_state();
        let event = RawSensorEvent::new(SensorKind::Light, 0, Vec::new());
        assert!(MeasurementConverter::light(&event, &state, 0.0).is_err());
    }

    #[test]
    fn test_battery_half_charged() {
        let state = make_state();
        let snapshot = BatterySnapshot::from_extras(50, 100);

        let sample = MeasurementConverter::battery(Some(&snapshot), &state, 99.5).unwrap();

        assert_eq!(sample.battery_level, 0.5);
        assert_eq!(sample.time, 99.5);
        assert_eq!(sample.time_received, 99.5);
        assert_eq!(state.latest().battery_level, Some(0.5));
    }

    #[test]
    fn test_battery_unknown_outcomes() {
        let state = make_state();
        let cases = [
            BatterySnapshot::from_extras(50, 0),
            BatterySnapshot::from_extras(50, -1),
            BatterySnapshot::from_extras(-1, 100),
            BatterySnapshot::from_extras(120, 100),
            BatterySnapshot::default(),
        ];

        for snapshot in cases {
            assert_eq!(MeasurementConverter::battery(Some(&snapshot), &state, 0.0), None);
        }
        assert_eq!(MeasurementConverter::battery(None, &state, 0.0), None);
        assert_eq!(state.latest().battery_level, None);
    }

    #[test]
    fn test_battery_fraction_bounds() {
        assert_eq!(battery_fraction(0, 100), Some(0.0));
        assert_eq!(battery_fraction(100, 100), Some(1.0));
        assert_eq!(battery_fraction(1, 0), None);
    }
}
