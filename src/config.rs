//! The device configuration: calibration for each axis and serial settings.
//!
//! Configurations are JSON documents:
//!
//! ```
//! # use kzproto::config::DeviceConfig;
//! let config = DeviceConfig::from_json_str(r#"{
//!     "device": "ARIES",
//!     "axes_sum": 1,
//!     "axes": [{
//!         "name": "x", "ax_num": 1, "units": "mm",
//!         "max_pulse": 1000, "min_pulse": 0, "max_speed_pulse": 500,
//!         "start_velocity_pulse": 10, "pulse_per_unit": 10
//!     }],
//!     "serial": { "baudrate": 38400, "parity": "N" }
//! }"#)?;
//! assert_eq!(config.axis(1)?.units, "mm");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! A configuration is validated as it is loaded and is immutable afterwards.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::error::{ConfigError, Error, UnknownAxisError};

/// Calibration of a single axis.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AxisConfig {
    /// A human readable name.
    pub name: String,
    /// The axis number used on the wire. Unique within a device.
    pub ax_num: u32,
    /// The physical unit positions are expressed in (e.g. `mm`).
    pub units: String,
    /// The largest allowed position, in pulses.
    pub max_pulse: i64,
    /// The smallest allowed position, in pulses.
    pub min_pulse: i64,
    /// The largest allowed speed, in pulses per second.
    pub max_speed_pulse: u64,
    /// The axis' start velocity, in pulses per second.
    pub start_velocity_pulse: f64,
    /// Pulses per physical unit.
    pub pulse_per_unit: f64,
}

impl AxisConfig {
    fn problems(&self, problems: &mut Vec<String>) {
        let at = format!("axes[{}]", self.ax_num);
        if self.min_pulse > self.max_pulse {
            problems.push(format!(
                "{at}: min_pulse ({}) must not exceed max_pulse ({})",
                self.min_pulse, self.max_pulse
            ));
        }
        if !(self.pulse_per_unit.is_finite() && self.pulse_per_unit > 0.0) {
            problems.push(format!(
                "{at}: pulse_per_unit must be greater than 0, got {}",
                self.pulse_per_unit
            ));
        }
        if !(self.start_velocity_pulse.is_finite() && self.start_velocity_pulse > 0.0) {
            problems.push(format!(
                "{at}: start_velocity_pulse must be greater than 0, got {}",
                self.start_velocity_pulse
            ));
        }
    }
}

/// The parity of the serial line.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum Parity {
    /// No parity.
    #[default]
    N,
    /// Even parity.
    E,
    /// Odd parity.
    O,
}

/// Serial line settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub struct SerialConfig {
    /// The baud rate.
    pub baudrate: u32,
    /// The parity.
    pub parity: Parity,
}

/// The configuration of a device.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeviceConfig {
    /// The name the device reports in reply to `identify`.
    pub device: String,
    /// The number of axes. Must equal the length of `axes`.
    pub axes_sum: usize,
    /// Calibration for each axis.
    pub axes: Vec<AxisConfig>,
    /// Serial line settings.
    pub serial: SerialConfig,
}

impl DeviceConfig {
    /// Parse and validate a configuration from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: DeviceConfig =
            serde_json::from_str(text).map_err(|e| ConfigError::new([e.to_string()]))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        log::debug!("loading device configuration from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Ok(DeviceConfig::from_json_str(&text)?)
    }

    /// List every problem with the configuration.
    ///
    /// An empty list means the configuration is valid.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.device.trim().is_empty() {
            problems.push("device: must not be empty".to_string());
        }
        if self.axes_sum != self.axes.len() {
            problems.push(format!(
                "axes_sum ({}) must equal the number of axes ({})",
                self.axes_sum,
                self.axes.len()
            ));
        }
        let mut seen = HashSet::new();
        for axis in &self.axes {
            if !seen.insert(axis.ax_num) {
                problems.push(format!("axes[{}]: ax_num is defined more than once", axis.ax_num));
            }
            axis.problems(&mut problems);
        }
        if self.serial.baudrate == 0 {
            problems.push("serial.baudrate: must be greater than 0".to_string());
        }
        problems
    }

    /// Check the configuration, reporting every problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let problems = self.problems();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::new(problems))
        }
    }

    /// Get the calibration of an axis.
    pub fn axis(&self, ax_num: u32) -> Result<&AxisConfig, UnknownAxisError> {
        self.axes
            .iter()
            .find(|axis| axis.ax_num == ax_num)
            .ok_or_else(|| UnknownAxisError::new(ax_num))
    }
}

impl std::str::FromStr for DeviceConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeviceConfig::from_json_str(s)
    }
}
