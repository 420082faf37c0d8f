//! Motion operations in physical units.
//!
//! A [`Controller`] wraps a [`Session`] and the device configuration it was
//! connected with. Positions and velocities are given in each axis'
//! configured units and converted to pulses before anything is written to
//! the device.
//!
//! Moves can run with a velocity other than the one stored in the device's
//! velocity table. The controller then reads the slot used by the move,
//! overwrites it for the duration of the move and writes the original
//! contents back once the axis is idle again. The override and the restore
//! are separate exchanges: if the process dies in between, the slot stays
//! overwritten.
//!
//! ```no_run
//! # use kzproto::{config::DeviceConfig, motion::{Controller, MotionOptions}, session::Session};
//! # use std::time::Duration;
//! # fn wrapper() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DeviceConfig::load("aries.json")?;
//! let session = Session::connect(&config)?;
//! let mut options = MotionOptions::new(Duration::from_secs(30));
//! options.target_vel_no(2);
//! let mut controller = Controller::new(session, &config, &options);
//!
//! // Move axis 1 by 2.5 units at 1.5 units/s, through velocity table slot 2.
//! let done = controller.move_relative(1, 2.5, 1.5, None)?;
//! println!("moved {} pulses", done.target_pulse);
//! # Ok(())
//! # }
//! ```

mod options;
mod table;

pub use options::{CancelToken, MotionOptions, StartVelocity};
pub use table::{PendingRestore, VelocityTableEntry};

use std::time::{Duration, Instant};

use crate::{
	backend::{Connector, SerialConnector},
	config::{AxisConfig, DeviceConfig},
	error::{CancelledError, Error, IdleTimeoutError},
	protocol::{
		command::{
			HOME, MOVE_ABSOLUTE, MOVE_FREE, MOVE_RELATIVE, MOVE_STOP, READ_AXIS, READ_POSITION,
			READ_STATUS, READ_VEL_TBL, WRITE_VEL_TBL,
		},
		Codec, Reply,
	},
	session::{Event, Identity, Session},
	units,
};
use table::scale_time;

/// Whether an axis is moving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisState {
	/// The axis is stopped.
	Idle,
	/// The axis is moving or homing.
	Busy,
}

/// The reply to `read_status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisStatus {
	/// Whether the axis is moving.
	pub state: AxisState,
	/// The raw status code. `"0"` means idle.
	pub status: String,
	/// The full reply, including the limit and origin sensor states.
	pub reply: Reply,
}

impl AxisStatus {
	fn from_reply(reply: Reply) -> Result<Self, Error> {
		let status: String = reply.parse("status")?;
		Ok(AxisStatus {
			state: if status == "0" {
				AxisState::Idle
			} else {
				AxisState::Busy
			},
			status,
			reply,
		})
	}

	/// Whether the axis is idle.
	pub fn is_idle(&self) -> bool {
		self.state == AxisState::Idle
	}
}

/// The result of a completed move.
#[derive(Debug, Clone, PartialEq)]
pub struct Move {
	/// The distance of a relative move, or the target of an absolute one.
	pub target: f64,
	/// `target` in pulses.
	pub target_pulse: i64,
	/// The requested velocity.
	pub velocity: f64,
	/// `velocity` in pulses per second.
	pub velocity_pulse: i64,
	/// The velocity table slot the move ran with. `0` if none was overridden.
	pub vel_no: i64,
	/// The reply to the motion command.
	pub reply: Reply,
}

/// The result of a completed homing run.
#[derive(Debug, Clone, PartialEq)]
pub struct Homed {
	/// The requested velocity.
	pub velocity: f64,
	/// `velocity` in pulses per second.
	pub velocity_pulse: i64,
	/// The velocity table slot the run used. `0` if none was overridden.
	pub vel_no: i64,
	/// The reply to the homing command.
	pub reply: Reply,
}

/// The position of an axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
	/// The position in the axis' units.
	pub position: f64,
	/// The position in pulses.
	pub position_pulse: i64,
	/// The full reply.
	pub reply: Reply,
}

/// A velocity table slot together with its velocities in physical units.
#[derive(Debug, Clone, PartialEq)]
pub struct VelocityTable {
	/// The slot's contents, in pulses.
	pub entry: VelocityTableEntry,
	/// The start velocity in the axis' units.
	pub start_velocity: f64,
	/// The maximum velocity in the axis' units.
	pub max_velocity: f64,
	/// The reply to the last exchange: `read_vel_tbl` or `write_vel_tbl`.
	pub reply: Reply,
}

/// The axes a controller reports with `read_axis`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisInfo {
	/// The number of axes.
	pub ax_num: i64,
	/// The number of controlled axes.
	pub control_num: i64,
	/// The `island_0` to `island_7` fields, in order.
	pub islands: Vec<String>,
	/// The full reply.
	pub reply: Reply,
}

/// Optional acceleration parameters for [`Controller::write_vel_tbl`].
///
/// Missing times are scaled from the slot's current contents. A missing
/// acceleration type is written as `1`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Acceleration {
	/// The acceleration time.
	pub acc_time: Option<i64>,
	/// The deceleration time. Ignored by variants without one.
	pub dec_time: Option<i64>,
	/// The acceleration type code.
	pub acc_type: Option<i64>,
}

/// Motion operations on a connected controller.
///
/// See the [module level documentation](self) for more information.
#[derive(Debug)]
pub struct Controller<'c, C: Connector = SerialConnector> {
	session: Session<C>,
	config: &'c DeviceConfig,
	options: MotionOptions,
}

impl<'c, C: Connector> Controller<'c, C> {
	/// Create a controller for a session connected with `config`.
	pub fn new(session: Session<C>, config: &'c DeviceConfig, options: &MotionOptions) -> Self {
		Controller {
			session,
			config,
			options: options.clone(),
		}
	}

	/// Get a reference to the session.
	pub fn session(&self) -> &Session<C> {
		&self.session
	}

	/// Get a mutable reference to the session.
	pub fn session_mut(&mut self) -> &mut Session<C> {
		&mut self.session
	}

	/// Give up the controller and return its session.
	pub fn into_session(self) -> Session<C> {
		self.session
	}

	/// The device configuration.
	pub fn config(&self) -> &'c DeviceConfig {
		self.config
	}

	/// The controller's options.
	pub fn options(&self) -> &MotionOptions {
		&self.options
	}

	/// Get a mutable reference to the controller's options.
	pub fn options_mut(&mut self) -> &mut MotionOptions {
		&mut self.options
	}

	fn axis(&self, axis: u32) -> Result<&'c AxisConfig, Error> {
		let config: &'c DeviceConfig = self.config;
		Ok(config.axis(axis)?)
	}

	/// The slot a move overrides: an explicit non-zero slot, or the target slot.
	fn slot(&self, vel_no: Option<i64>) -> i64 {
		vel_no
			.filter(|&vel_no| vel_no != 0)
			.unwrap_or_else(|| self.options.effective_target_vel_no())
	}

	/// Run an operation, reporting when it starts and finishes.
	fn instrument<T, F>(&mut self, operation: &'static str, axis: Option<u32>, f: F) -> Result<T, Error>
	where
		F: FnOnce(&mut Self) -> Result<T, Error>,
	{
		self.session.emit(&Event::OperationStarted { operation, axis });
		let start = Instant::now();
		let result = f(self);
		let elapsed = start.elapsed();
		match &result {
			Ok(_) => log::debug!("{operation} {axis:?} finished in {elapsed:?}"),
			Err(e) => log::debug!("{operation} {axis:?} failed after {elapsed:?}: {e}"),
		}
		self.session.emit(&Event::OperationFinished {
			operation,
			axis,
			elapsed,
			success: result.is_ok(),
		});
		result
	}

	/// Query the controller's name and firmware version.
	pub fn device_info(&mut self) -> Result<Identity, Error> {
		self.instrument("device_info", None, |this| this.session.identify())
	}

	/// Read the status of an axis.
	pub fn read_status(&mut self, axis: u32) -> Result<AxisStatus, Error> {
		self.instrument("read_status", Some(axis), |this| {
			this.axis(axis)?;
			this.status(axis)
		})
	}

	fn status(&mut self, axis: u32) -> Result<AxisStatus, Error> {
		let reply = self
			.session
			.execute(READ_STATUS, &[("ax_num", i64::from(axis))])?;
		AxisStatus::from_reply(reply)
	}

	/// Wait for an axis to become idle.
	///
	/// The status is polled until the axis reports idle, the idle timeout
	/// elapses, the poll limit is reached or the cancel token is cancelled.
	pub fn ensure_idle(&mut self, axis: u32) -> Result<(), Error> {
		self.instrument("ensure_idle", Some(axis), |this| {
			this.axis(axis)?;
			this.wait_idle(axis)
		})
	}

	fn wait_idle(&mut self, axis: u32) -> Result<(), Error> {
		let start = Instant::now();
		let deadline = self.options.idle_timeout_value();
		let mut polls = 0;
		loop {
			if self.options.cancel().is_cancelled() {
				log::debug!("wait for axis {axis} cancelled after {polls} polls");
				return Err(CancelledError::new(axis).into());
			}
			polls += 1;
			let busy = !self.status(axis)?.is_idle();
			self.session.emit(&Event::IdlePoll {
				axis,
				poll: polls,
				busy,
			});
			if !busy {
				return Ok(());
			}

			let elapsed = start.elapsed();
			let out_of_polls = self.options.max_polls_value().is_some_and(|max| polls >= max);
			if out_of_polls || elapsed >= deadline {
				return Err(IdleTimeoutError::new(axis, polls, elapsed).into());
			}
			std::thread::sleep(self.options.poll_interval_value().min(deadline - elapsed));
		}
	}

	/// Sleep for the estimated duration of a motion, one poll interval at a
	/// time.
	///
	/// The sleep ends early when cancelled and never exceeds the idle timeout.
	fn settle(&self, axis: u32, estimate: Duration) -> Result<(), Error> {
		let total = estimate.min(self.options.idle_timeout_value());
		let start = Instant::now();
		loop {
			if self.options.cancel().is_cancelled() {
				log::debug!("axis {axis}: settling cancelled after {:?}", start.elapsed());
				return Err(CancelledError::new(axis).into());
			}
			let elapsed = start.elapsed();
			if elapsed >= total {
				return Ok(());
			}
			std::thread::sleep(self.options.poll_interval_value().min(total - elapsed));
		}
	}

	/// Read the position of an axis.
	pub fn read_position(&mut self, axis: u32) -> Result<Position, Error> {
		self.instrument("read_position", Some(axis), |this| {
			let calibration = this.axis(axis)?;
			let reply = this
				.session
				.execute(READ_POSITION, &[("ax_num", i64::from(axis))])?;
			let position_pulse = reply.parse("pos")?;
			Ok(Position {
				position: units::pulse_to_length(position_pulse, calibration)?,
				position_pulse,
				reply,
			})
		})
	}

	/// Read a velocity table slot of an axis.
	///
	/// Without an explicit non-zero slot, the target slot is read.
	pub fn read_vel_tbl(&mut self, axis: u32, vel_no: Option<i64>) -> Result<VelocityTable, Error> {
		self.instrument("read_vel_tbl", Some(axis), |this| {
			let calibration = this.axis(axis)?;
			let vel_no = this.slot(vel_no);
			let (entry, reply) = this.read_entry(axis, vel_no)?;
			Ok(VelocityTable {
				start_velocity: units::pulse_to_velocity(entry.start_vel, calibration)?,
				max_velocity: units::pulse_to_velocity(entry.max_vel, calibration)?,
				entry,
				reply,
			})
		})
	}

	fn read_entry(&mut self, axis: u32, vel_no: i64) -> Result<(VelocityTableEntry, Reply), Error> {
		let reply = self.session.execute(
			READ_VEL_TBL,
			&[("ax_num", i64::from(axis)), ("vel_no", vel_no)],
		)?;
		Ok((VelocityTableEntry::from_reply(&reply)?, reply))
	}

	/// Write a velocity table slot of an axis.
	///
	/// The slot is read first. Its start velocity is chosen by the start
	/// velocity policy, and acceleration times that are not given are scaled
	/// by the ratio between the new and the current maximum velocity. Values
	/// given by the caller are checked before anything is exchanged with the
	/// device; derived values are checked before the slot is written.
	pub fn write_vel_tbl(
		&mut self,
		axis: u32,
		vel_no: i64,
		max_velocity: f64,
		acceleration: Acceleration,
	) -> Result<VelocityTable, Error> {
		self.instrument("write_vel_tbl", Some(axis), |this| {
			let calibration = this.axis(axis)?;
			let variant = this.session.variant();
			let max_vel = units::velocity_to_pulse(max_velocity, calibration)?;
			if let Some(acc_time) = acceleration.acc_time {
				units::validate_acc_time(acc_time)?;
			}
			if let Some(dec_time) = acceleration.dec_time {
				units::validate_dec_time(dec_time)?;
			}
			let acc_type = units::validate_acc_type(acceleration.acc_type.unwrap_or(1), variant)?;

			let (original, _) = this.read_entry(axis, vel_no)?;
			let scale = original.scale_to(max_vel);
			let acc_time = match acceleration.acc_time {
				Some(acc_time) => acc_time,
				None => units::validate_acc_time(scale_time(original.acc_time, scale))?,
			};
			let takes_dec_time = this.session.codec().spec(WRITE_VEL_TBL)?.takes("dec_time");
			let dec_time = if takes_dec_time {
				Some(match acceleration.dec_time {
					Some(dec_time) => dec_time,
					None => units::validate_dec_time(
						original.dec_time.map_or(acc_time, |d| scale_time(d, scale)),
					)?,
				})
			} else {
				None
			};
			let entry = VelocityTableEntry {
				ax_num: axis,
				vel_no,
				start_vel: this.options.start_velocity_policy().start_pulse(max_vel, calibration),
				max_vel,
				acc_time,
				dec_time,
				acc_type,
			};
			let reply = this.session.execute(WRITE_VEL_TBL, &entry.to_args())?;
			Ok(VelocityTable {
				start_velocity: units::pulse_to_velocity(entry.start_vel, calibration)?,
				max_velocity: units::pulse_to_velocity(entry.max_vel, calibration)?,
				entry,
				reply,
			})
		})
	}

	/// Temporarily overwrite a velocity table slot to run at `velocity_pulse`.
	///
	/// The slot's current contents are returned, to be written back with
	/// [`restore`](Controller::restore). If the write is sent but no valid
	/// reply comes back, the restore is attempted before the error is
	/// returned.
	pub fn override_velocity(
		&mut self,
		axis: u32,
		vel_no: i64,
		velocity_pulse: i64,
	) -> Result<PendingRestore, Error> {
		let calibration = self.axis(axis)?;
		let (original, _) = self.read_entry(axis, vel_no)?;
		let scale = original.scale_to(velocity_pulse);
		let entry = VelocityTableEntry {
			ax_num: axis,
			vel_no,
			start_vel: self
				.options
				.start_velocity_policy()
				.start_pulse(velocity_pulse, calibration),
			max_vel: velocity_pulse,
			acc_time: units::validate_acc_time(scale_time(original.acc_time, scale))?,
			dec_time: original
				.dec_time
				.map(|dec_time| units::validate_dec_time(scale_time(dec_time, scale)))
				.transpose()?,
			acc_type: original.acc_type,
		};
		// Captured before writing, so the restore uses the same table.
		let pending = PendingRestore::new(original, self.session.variant());
		match self.session.execute(WRITE_VEL_TBL, &entry.to_args()) {
			Ok(_) => {}
			Err(e @ Error::DeviceCommand(_)) => return Err(e),
			// Without a valid reply the slot may or may not have been written.
			Err(e) => return self.finish_override(Err(e), Some(pending)),
		}
		log::debug!(
			"axis {axis}: velocity table {vel_no} set to {}..{} pulse/s (was {}..{})",
			entry.start_vel,
			entry.max_vel,
			original.start_vel,
			original.max_vel
		);
		self.session.emit(&Event::VelocityOverride {
			axis,
			vel_no,
			start_vel: entry.start_vel,
			max_vel: entry.max_vel,
		});
		Ok(pending)
	}

	/// Write a temporarily overwritten velocity table slot back.
	///
	/// The slot is written with the variant in use when it was read.
	pub fn restore(&mut self, pending: PendingRestore) -> Result<Reply, Error> {
		let codec = Codec::new(pending.variant());
		let reply = self
			.session
			.execute_with(codec, WRITE_VEL_TBL, &pending.original().to_args())?;
		log::debug!(
			"axis {}: velocity table {} restored",
			pending.axis(),
			pending.vel_no()
		);
		self.session.emit(&Event::VelocityRestore {
			axis: pending.axis(),
			vel_no: pending.vel_no(),
		});
		Ok(reply)
	}

	/// Restore an overridden slot, if any, after an operation finished.
	///
	/// If the operation failed, the restore is still attempted but only its
	/// failure is logged; the operation's error is returned.
	fn finish_override<T>(
		&mut self,
		result: Result<T, Error>,
		pending: Option<PendingRestore>,
	) -> Result<T, Error> {
		let Some(pending) = pending else {
			return result;
		};
		if !self.options.restores() {
			log::debug!(
				"axis {}: leaving velocity table {} overwritten",
				pending.axis(),
				pending.vel_no()
			);
			return result;
		}
		match result {
			Ok(value) => {
				self.restore(pending)?;
				Ok(value)
			}
			Err(e) => {
				let (axis, vel_no) = (pending.axis(), pending.vel_no());
				if let Err(restore_error) = self.restore(pending) {
					log::warn!(
						"axis {axis}: failed to restore velocity table {vel_no}: {restore_error}"
					);
				}
				Err(e)
			}
		}
	}

	/// Issue a motion command through an optional velocity override and wait
	/// for the axis to settle.
	fn run_motion(
		&mut self,
		axis: u32,
		vel_no: i64,
		velocity_pulse: i64,
		command: &str,
		args: &[(&str, i64)],
		estimate: Duration,
	) -> Result<Reply, Error> {
		self.wait_idle(axis)?;
		let pending = if vel_no != 0 {
			Some(self.override_velocity(axis, vel_no, velocity_pulse)?)
		} else {
			None
		};
		let result = self.session.execute(command, args).and_then(|reply| {
			if self.options.sleeps() {
				log::debug!("axis {axis}: waiting {estimate:?} for {command} to complete");
				self.settle(axis, estimate)?;
			}
			self.wait_idle(axis)?;
			Ok(reply)
		});
		self.finish_override(result, pending)
	}

	fn run_move(
		&mut self,
		command: &'static str,
		axis: u32,
		target: f64,
		velocity: f64,
		vel_no: Option<i64>,
	) -> Result<Move, Error> {
		let calibration = self.axis(axis)?;
		let target_pulse = units::length_to_pulse(target, calibration)?;
		let velocity_pulse = units::velocity_to_pulse(velocity, calibration)?;
		let vel_no = self.slot(vel_no);
		let estimate = self.options.move_estimate(target_pulse, velocity_pulse);
		let args = [
			("ax_num", i64::from(axis)),
			("vel_no", vel_no),
			("length", target_pulse),
			("pat", 1),
		];
		let reply = self.run_motion(axis, vel_no, velocity_pulse, command, &args, estimate)?;
		Ok(Move {
			target,
			target_pulse,
			velocity,
			velocity_pulse,
			vel_no,
			reply,
		})
	}

	/// Move an axis by `length` at `velocity`.
	///
	/// With a non-zero slot (`vel_no`, or else the target slot) the slot is
	/// overwritten with `velocity` for the move.
	pub fn move_relative(
		&mut self,
		axis: u32,
		length: f64,
		velocity: f64,
		vel_no: Option<i64>,
	) -> Result<Move, Error> {
		self.instrument("move_relative", Some(axis), |this| {
			this.run_move(MOVE_RELATIVE, axis, length, velocity, vel_no)
		})
	}

	/// Move an axis to `position` at `velocity`.
	///
	/// The completion estimate assumes the axis starts at position 0.
	pub fn move_absolute(
		&mut self,
		axis: u32,
		position: f64,
		velocity: f64,
		vel_no: Option<i64>,
	) -> Result<Move, Error> {
		self.instrument("move_absolute", Some(axis), |this| {
			this.run_move(MOVE_ABSOLUTE, axis, position, velocity, vel_no)
		})
	}

	/// Run the homing sequence of an axis at `velocity`.
	pub fn home(&mut self, axis: u32, velocity: f64, vel_no: Option<i64>) -> Result<Homed, Error> {
		self.instrument("home", Some(axis), |this| {
			let calibration = this.axis(axis)?;
			let velocity_pulse = units::velocity_to_pulse(velocity, calibration)?;
			let vel_no = this.slot(vel_no);
			let estimate = this.options.home_estimate_value();
			let args = [("ax_num", i64::from(axis)), ("vel_no", vel_no), ("pat", 1)];
			let reply = this.run_motion(axis, vel_no, velocity_pulse, HOME, &args, estimate)?;
			Ok(Homed {
				velocity,
				velocity_pulse,
				vel_no,
				reply,
			})
		})
	}

	/// Stop an axis. The default stop pattern is `1`.
	pub fn move_stop(&mut self, axis: u32, pat: Option<i64>) -> Result<Reply, Error> {
		self.instrument("move_stop", Some(axis), |this| {
			this.axis(axis)?;
			this.session.execute(
				MOVE_STOP,
				&[("ax_num", i64::from(axis)), ("pat", pat.unwrap_or(1))],
			)
		})
	}

	/// Start moving an axis without a target, using velocity table slot
	/// `vel_no`, in direction `dir`.
	///
	/// The axis keeps moving until it is stopped with
	/// [`move_stop`](Controller::move_stop).
	pub fn move_free(&mut self, axis: u32, vel_no: i64, dir: i64) -> Result<Reply, Error> {
		self.instrument("move_free", Some(axis), |this| {
			this.axis(axis)?;
			this.session.execute(
				MOVE_FREE,
				&[("ax_num", i64::from(axis)), ("vel_no", vel_no), ("dir", dir)],
			)
		})
	}

	/// Read the axis configuration of the controller.
	///
	/// Only available with the [`Aries`](crate::protocol::Variant::Aries) variant.
	pub fn read_axis(&mut self) -> Result<AxisInfo, Error> {
		self.instrument("read_axis", None, |this| {
			let reply = this.session.execute(READ_AXIS, &[])?;
			Ok(AxisInfo {
				ax_num: reply.parse("ax_num")?,
				control_num: reply.parse("control_num")?,
				islands: (0..8)
					.filter_map(|i| reply.get(&format!("island_{i}")).map(str::to_string))
					.collect(),
				reply,
			})
		})
	}
}

#[cfg(test)]
mod test;
