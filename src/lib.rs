//! A library for controlling multi-axis stepper controllers over their
//! ASCII serial protocol.
//!
//! The crate is layered:
//!
//! * [`protocol`] encodes commands into request frames and decodes reply
//!   lines, for each dialect ([`Variant`](protocol::Variant)) of the protocol.
//! * [`session`] finds the configured controller among the available serial
//!   ports and exchanges commands with it.
//! * [`motion`] moves axes in physical units, temporarily overriding the
//!   device's velocity table when a move needs a different velocity.
//! * [`units`] converts between physical units and device pulses.
//!
//! A controller is described by a [`DeviceConfig`](config::DeviceConfig),
//! usually loaded from a JSON file.
//!
//! ```no_run
//! # use kzproto::{config::DeviceConfig, motion::{Controller, MotionOptions}, session::Session};
//! # use std::time::Duration;
//! # fn wrapper() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DeviceConfig::load("aries.json")?;
//! let session = Session::connect(&config)?;
//! let options = MotionOptions::new(Duration::from_secs(30));
//! let mut controller = Controller::new(session, &config, &options);
//! let position = controller.read_position(1)?;
//! println!("axis 1 is at {}", position.position);
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
#![deny(missing_debug_implementations)]

pub mod backend;
pub mod config;
pub mod error;
pub mod motion;
pub mod protocol;
pub mod session;
pub mod units;
