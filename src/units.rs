//! Conversion between physical units and device pulses.
//!
//! Physical values are multiplied by the axis' `pulse_per_unit` and truncated
//! toward zero, since the device only accepts whole pulses. Every conversion
//! checks the pulse value against the axis' limits, in both directions.

use crate::config::AxisConfig;
use crate::error::{
    AccTimeOutOfRangeError, AccTypeInvalidError, PositionOutOfRangeError, VelocityOutOfRangeError,
};
use crate::protocol::Variant;

/// The smallest allowed acceleration or deceleration time.
pub const MIN_ACC_TIME: i64 = 1;
/// The largest allowed acceleration or deceleration time.
pub const MAX_ACC_TIME: i64 = 10_000;

fn check_position(pulse: f64, axis: &AxisConfig) -> Result<i64, PositionOutOfRangeError> {
    if pulse.is_finite() && pulse >= axis.min_pulse as f64 && pulse <= axis.max_pulse as f64 {
        Ok(pulse as i64)
    } else {
        Err(PositionOutOfRangeError::new(
            axis.ax_num,
            pulse,
            axis.min_pulse,
            axis.max_pulse,
        ))
    }
}

fn check_velocity(pulse: f64, axis: &AxisConfig) -> Result<i64, VelocityOutOfRangeError> {
    if pulse.is_finite() && pulse >= 0.0 && pulse <= axis.max_speed_pulse as f64 {
        Ok(pulse as i64)
    } else {
        Err(VelocityOutOfRangeError::new(
            axis.ax_num,
            pulse,
            axis.max_speed_pulse,
        ))
    }
}

/// Convert a position or distance to pulses.
pub fn length_to_pulse(length: f64, axis: &AxisConfig) -> Result<i64, PositionOutOfRangeError> {
    check_position((length * axis.pulse_per_unit).trunc(), axis)
}

/// Convert a pulse count to a position or distance.
pub fn pulse_to_length(pulse: i64, axis: &AxisConfig) -> Result<f64, PositionOutOfRangeError> {
    check_position(pulse as f64, axis)?;
    Ok(pulse as f64 / axis.pulse_per_unit)
}

/// Convert a velocity to pulses per second.
pub fn velocity_to_pulse(velocity: f64, axis: &AxisConfig) -> Result<i64, VelocityOutOfRangeError> {
    check_velocity((velocity * axis.pulse_per_unit).trunc(), axis)
}

/// Convert pulses per second to a velocity.
pub fn pulse_to_velocity(pulse: i64, axis: &AxisConfig) -> Result<f64, VelocityOutOfRangeError> {
    check_velocity(pulse as f64, axis)?;
    Ok(pulse as f64 / axis.pulse_per_unit)
}

fn check_time(field: &'static str, value: i64) -> Result<i64, AccTimeOutOfRangeError> {
    if (MIN_ACC_TIME..=MAX_ACC_TIME).contains(&value) {
        Ok(value)
    } else {
        Err(AccTimeOutOfRangeError::new(
            field,
            value,
            MIN_ACC_TIME,
            MAX_ACC_TIME,
        ))
    }
}

/// Check an acceleration time.
pub fn validate_acc_time(acc_time: i64) -> Result<i64, AccTimeOutOfRangeError> {
    check_time("acc_time", acc_time)
}

/// Check a deceleration time.
pub fn validate_dec_time(dec_time: i64) -> Result<i64, AccTimeOutOfRangeError> {
    check_time("dec_time", dec_time)
}

/// Check that an acceleration type is one the variant accepts.
pub fn validate_acc_type(acc_type: i64, variant: Variant) -> Result<i64, AccTypeInvalidError> {
    if variant.acc_types().contains(&acc_type) {
        Ok(acc_type)
    } else {
        Err(AccTypeInvalidError::new(acc_type, variant))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn axis() -> AxisConfig {
        AxisConfig {
            name: "x".to_string(),
            ax_num: 1,
            units: "mm".to_string(),
            max_pulse: 1000,
            min_pulse: 0,
            max_speed_pulse: 100,
            start_velocity_pulse: 5.0,
            pulse_per_unit: 10.0,
        }
    }

    #[test]
    fn length_round_trip() {
        let axis = axis();
        assert_eq!(length_to_pulse(2.0, &axis).unwrap(), 20);
        assert_eq!(pulse_to_length(20, &axis).unwrap(), 2.0);
        for pulse in [0, 1, 20, 250, 1000] {
            let length = pulse_to_length(pulse, &axis).unwrap();
            assert_eq!(length_to_pulse(length, &axis).unwrap(), pulse);
        }
    }

    #[test]
    fn velocity_round_trip() {
        let axis = axis();
        assert_eq!(velocity_to_pulse(1.5, &axis).unwrap(), 15);
        assert_eq!(pulse_to_velocity(15, &axis).unwrap(), 1.5);
        assert_eq!(pulse_to_velocity(5, &axis).unwrap(), 0.5);
    }

    #[test]
    fn truncates_toward_zero() {
        let mut axis = axis();
        assert_eq!(length_to_pulse(2.09, &axis).unwrap(), 20);
        axis.min_pulse = -1000;
        assert_eq!(length_to_pulse(-2.09, &axis).unwrap(), -20);
    }

    #[test]
    fn out_of_range() {
        let axis = axis();
        let err = length_to_pulse(100.5, &axis).unwrap_err();
        assert_eq!(err.pulse(), 1005.0);
        assert_eq!(err.range(), (0, 1000));
        assert!(length_to_pulse(-0.1, &axis).is_err());
        assert!(pulse_to_length(-1, &axis).is_err());
        assert!(velocity_to_pulse(10.5, &axis).is_err());
        assert!(velocity_to_pulse(-0.1, &axis).is_err());
        assert!(pulse_to_velocity(101, &axis).is_err());
    }

    #[test]
    fn non_finite_is_out_of_range() {
        let axis = axis();
        assert!(length_to_pulse(f64::NAN, &axis).is_err());
        assert!(length_to_pulse(f64::INFINITY, &axis).is_err());
        assert!(velocity_to_pulse(f64::NAN, &axis).is_err());
    }

    #[test]
    fn acceleration_parameters() {
        assert_eq!(validate_acc_time(1).unwrap(), 1);
        assert_eq!(validate_acc_time(10_000).unwrap(), 10_000);
        assert_eq!(validate_acc_time(0).unwrap_err().field(), "acc_time");
        assert_eq!(validate_dec_time(10_001).unwrap_err().field(), "dec_time");

        assert!(validate_acc_type(2, Variant::Default).is_ok());
        assert!(validate_acc_type(3, Variant::Default).is_err());
        assert!(validate_acc_type(3, Variant::Aries).is_ok());
        assert!(validate_acc_type(0, Variant::Aries).is_err());
    }
}
