//! Error types for caller input that fails validation.
//!
//! All of these are raised before anything is written to the device.

use crate::protocol::Variant;

/// The axis is not defined in the device configuration.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct UnknownAxisError(u32);

impl UnknownAxisError {
    pub(crate) fn new(axis: u32) -> Self {
        UnknownAxisError(axis)
    }

    /// The requested axis number.
    pub fn axis(&self) -> u32 {
        self.0
    }
}

impl_error_display! {
    UnknownAxisError,
    self => "axis {} is not defined in the device configuration", self.0
}

/// A position converted to a pulse count outside the axis' travel.
#[derive(Debug, PartialEq)]
pub struct PositionOutOfRangeError {
    axis: u32,
    pulse: f64,
    min: i64,
    max: i64,
}

impl PositionOutOfRangeError {
    pub(crate) fn new(axis: u32, pulse: f64, min: i64, max: i64) -> Self {
        PositionOutOfRangeError {
            axis,
            pulse,
            min,
            max,
        }
    }

    /// The axis the position was validated against.
    pub fn axis(&self) -> u32 {
        self.axis
    }

    /// The offending pulse count.
    pub fn pulse(&self) -> f64 {
        self.pulse
    }

    /// The allowed range, inclusive.
    pub fn range(&self) -> (i64, i64) {
        (self.min, self.max)
    }
}

impl_error_display! {
    PositionOutOfRangeError,
    self => "position pulse {} out of range [{}, {}] on axis {}", self.pulse, self.min, self.max, self.axis
}

/// A velocity converted to a pulse rate outside `[0, max_speed_pulse]`.
#[derive(Debug, PartialEq)]
pub struct VelocityOutOfRangeError {
    axis: u32,
    pulse: f64,
    max: u64,
}

impl VelocityOutOfRangeError {
    pub(crate) fn new(axis: u32, pulse: f64, max: u64) -> Self {
        VelocityOutOfRangeError { axis, pulse, max }
    }

    /// The axis the velocity was validated against.
    pub fn axis(&self) -> u32 {
        self.axis
    }

    /// The offending pulse rate.
    pub fn pulse(&self) -> f64 {
        self.pulse
    }

    /// The axis' maximum pulse rate.
    pub fn max(&self) -> u64 {
        self.max
    }
}

impl_error_display! {
    VelocityOutOfRangeError,
    self => "velocity pulse {} out of range [0, {}] on axis {}", self.pulse, self.max, self.axis
}

/// An acceleration or deceleration time is outside the allowed range.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct AccTimeOutOfRangeError {
    field: &'static str,
    value: i64,
    min: i64,
    max: i64,
}

impl AccTimeOutOfRangeError {
    pub(crate) fn new(field: &'static str, value: i64, min: i64, max: i64) -> Self {
        AccTimeOutOfRangeError {
            field,
            value,
            min,
            max,
        }
    }

    /// Which field was rejected (`acc_time` or `dec_time`).
    pub fn field(&self) -> &'static str {
        self.field
    }

    /// The rejected value.
    pub fn value(&self) -> i64 {
        self.value
    }
}

impl_error_display! {
    AccTimeOutOfRangeError,
    self => "{} {} out of range [{}, {}]", self.field, self.value, self.min, self.max
}

/// An acceleration type is not one of the codes the variant accepts.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct AccTypeInvalidError {
    value: i64,
    variant: Variant,
}

impl AccTypeInvalidError {
    pub(crate) fn new(value: i64, variant: Variant) -> Self {
        AccTypeInvalidError { value, variant }
    }

    /// The rejected value.
    pub fn value(&self) -> i64 {
        self.value
    }

    /// The variant the value was checked against.
    pub fn variant(&self) -> Variant {
        self.variant
    }
}

impl_error_display! {
    AccTypeInvalidError,
    self => "acc_type {} invalid for the {} variant; must be one of {:?}",
        self.value, self.variant, self.variant.acc_types()
}

error_enum! {
    /// Caller input that was rejected before any device write.
    #[derive(Debug, PartialEq)]
    #[non_exhaustive]
    pub enum ValidationError {
        UnknownAxis(UnknownAxisError),
        PositionOutOfRange(PositionOutOfRangeError),
        VelocityOutOfRange(VelocityOutOfRangeError),
        AccTimeOutOfRange(AccTimeOutOfRangeError),
        AccTypeInvalid(AccTypeInvalidError),
    }
}
