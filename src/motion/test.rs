use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::*;
use crate::{
	backend::{Mock, MockConnector, Transcript},
	config::{Parity, SerialConfig},
	protocol::Variant,
	session::ConnectOptions,
};

#[derive(Debug, Clone, Copy)]
struct Slot {
	start_vel: i64,
	max_vel: i64,
	acc_time: i64,
	dec_time: i64,
	acc_type: i64,
}

const FACTORY_SLOT: Slot = Slot {
	start_vel: 5,
	max_vel: 10,
	acc_time: 100,
	dec_time: 200,
	acc_type: 1,
};

#[derive(Debug)]
struct State {
	aries: bool,
	slots: HashMap<(i64, i64), Slot>,
	/// Status polls left before the axis reports idle.
	busy: u32,
	/// The value `busy` is set to by a motion command.
	busy_after_motion: u32,
	position: i64,
	/// A command code answered with an error.
	fail: Option<&'static str>,
	/// A command code executed once without replying.
	silent: Option<&'static str>,
}

impl State {
	fn slot(&self, axis: i64, vel_no: i64) -> Slot {
		self.slots.get(&(axis, vel_no)).copied().unwrap_or(FACTORY_SLOT)
	}

	fn respond(&mut self, body: &str) -> Option<String> {
		let (code, rest) = body.split_at(3);
		let args: Vec<i64> = rest
			.split('/')
			.filter_map(|arg| arg.parse().ok())
			.collect();
		let axis = args.first().copied().unwrap_or(0);
		if self.fail == Some(code) {
			return Some(format!("E {code} {axis} 7"));
		}
		let reply = match code {
			"IDN" => "C IDN ARIES 2.1".to_string(),
			"STR" => {
				let status = if self.busy > 0 {
					self.busy -= 1;
					1
				} else {
					0
				};
				format!("C STR {axis} {status} 0 0 0 0")
			}
			"RTB" => {
				let slot = self.slot(axis, args[1]);
				if self.aries {
					format!(
						"C RTB {axis} {} {} {} {} {} {}",
						args[1], slot.start_vel, slot.max_vel, slot.acc_time, slot.dec_time, slot.acc_type
					)
				} else {
					format!(
						"C RTB {axis} {} {} {} {} {}",
						args[1], slot.start_vel, slot.max_vel, slot.acc_time, slot.acc_type
					)
				}
			}
			"WTB" => {
				let slot = if self.aries {
					Slot {
						start_vel: args[2],
						max_vel: args[3],
						acc_time: args[4],
						dec_time: args[5],
						acc_type: args[6],
					}
				} else {
					Slot {
						start_vel: args[2],
						max_vel: args[3],
						acc_time: args[4],
						dec_time: args[4],
						acc_type: args[5],
					}
				};
				self.slots.insert((axis, args[1]), slot);
				format!("C WTB {axis}")
			}
			"RPS" | "APS" | "ORG" => {
				self.busy = self.busy_after_motion;
				format!("C {code} {axis}")
			}
			"STP" | "FRP" => format!("C {code} {axis}"),
			"RDP" => format!("C RDP {axis} {}", self.position),
			"RAX" => "C RAX 1 2 0 1 0 1 0 1 0 1".to_string(),
			_ => return None,
		};
		if self.silent == Some(code) {
			self.silent = None;
			return None;
		}
		Some(reply)
	}
}

/// A simulated controller.
#[derive(Debug, Clone)]
struct Device(Arc<Mutex<State>>);

impl Device {
	fn new(variant: Variant) -> Self {
		Device(Arc::new(Mutex::new(State {
			aries: variant == Variant::Aries,
			slots: HashMap::new(),
			busy: 0,
			busy_after_motion: 0,
			position: 20,
			fail: None,
			silent: None,
		})))
	}

	fn state(&self) -> std::sync::MutexGuard<'_, State> {
		self.0.lock().unwrap()
	}

	fn mock(&self) -> Mock {
		let state = Arc::clone(&self.0);
		Mock::with_responder(move |body| state.lock().unwrap().respond(body))
	}
}

fn config() -> DeviceConfig {
	DeviceConfig {
		device: "ARIES".to_string(),
		axes_sum: 1,
		axes: vec![AxisConfig {
			name: "x".to_string(),
			ax_num: 1,
			units: "mm".to_string(),
			max_pulse: 1000,
			min_pulse: 0,
			max_speed_pulse: 100,
			start_velocity_pulse: 5.0,
			pulse_per_unit: 10.0,
		}],
		serial: SerialConfig {
			baudrate: 38400,
			parity: Parity::N,
		},
	}
}

fn options() -> MotionOptions {
	MotionOptions::new(Duration::from_secs(2))
		.poll_interval(Duration::from_millis(1))
		.sleep_for_estimate(false)
		.clone()
}

/// Connect a controller to `device` and return it with a transcript that
/// starts after discovery.
fn connect<'c>(
	config: &'c DeviceConfig,
	variant: Variant,
	device: &Device,
	options: &MotionOptions,
) -> (Controller<'c, MockConnector>, Transcript) {
	let mut connector = MockConnector::new();
	connector.insert("A", device.mock());
	let transcript = connector.transcript();
	let session = ConnectOptions::new()
		.variant(variant)
		.connect_with(connector, config)
		.unwrap();
	transcript.clear();
	(Controller::new(session, config, options), transcript)
}

fn record_events(controller: &mut Controller<'_, MockConnector>) -> Arc<Mutex<Vec<String>>> {
	let events = Arc::new(Mutex::new(Vec::new()));
	let sink = Arc::clone(&events);
	controller.session_mut().set_event_handler(move |event| {
		let text = match event {
			Event::VelocityOverride {
				vel_no,
				start_vel,
				max_vel,
				..
			} => format!("override {vel_no} {start_vel} {max_vel}"),
			Event::VelocityRestore { vel_no, .. } => format!("restore {vel_no}"),
			Event::IdlePoll { poll, busy, .. } => format!("poll {poll} {busy}"),
			Event::OperationStarted { operation, .. } => format!("start {operation}"),
			Event::OperationFinished {
				operation, success, ..
			} => format!("finish {operation} {success}"),
			_ => return,
		};
		sink.lock().unwrap().push(text);
	});
	events
}

#[test]
fn write_vel_tbl_converts_velocities() {
	let config = config();
	let device = Device::new(Variant::Default);
	let (mut controller, transcript) = connect(&config, Variant::Default, &device, &options());

	let table = controller
		.write_vel_tbl(
			1,
			3,
			2.0,
			Acceleration {
				acc_time: Some(4),
				acc_type: Some(1),
				..Acceleration::default()
			},
		)
		.unwrap();
	assert_eq!(table.entry.start_vel, 16);
	assert_eq!(table.entry.max_vel, 20);
	assert_eq!(table.start_velocity, 1.6);
	assert_eq!(table.max_velocity, 2.0);
	assert_eq!(transcript.bodies(), ["RTB1/3", "WTB1/3/16/20/4/1"]);
}

#[test]
fn write_vel_tbl_scales_missing_times() {
	let config = config();
	let device = Device::new(Variant::Aries);
	let (mut controller, transcript) = connect(&config, Variant::Aries, &device, &options());

	let table = controller
		.write_vel_tbl(1, 3, 2.0, Acceleration::default())
		.unwrap();
	assert_eq!(table.entry.acc_time, 200);
	assert_eq!(table.entry.dec_time, Some(400));
	assert_eq!(table.entry.acc_type, 1);
	assert_eq!(transcript.bodies(), ["RTB1/3", "WTB1/3/16/20/200/400/1"]);
}

#[test]
fn write_vel_tbl_rejects_explicit_values_before_any_exchange() {
	let config = config();
	let device = Device::new(Variant::Default);
	let (mut controller, transcript) = connect(&config, Variant::Default, &device, &options());

	let err = controller
		.write_vel_tbl(
			1,
			3,
			2.0,
			Acceleration {
				acc_time: Some(0),
				..Acceleration::default()
			},
		)
		.unwrap_err();
	assert!(matches!(err, Error::AccTimeOutOfRange(ref e) if e.field() == "acc_time"));

	let err = controller
		.write_vel_tbl(
			1,
			3,
			2.0,
			Acceleration {
				acc_type: Some(3),
				..Acceleration::default()
			},
		)
		.unwrap_err();
	assert!(matches!(err, Error::AccTypeInvalid(_)));

	let err = controller
		.write_vel_tbl(1, 3, 20.0, Acceleration::default())
		.unwrap_err();
	assert!(matches!(err, Error::VelocityOutOfRange(_)));
	assert!(transcript.frames().is_empty());
}

#[test]
fn write_vel_tbl_rejects_derived_values_before_writing() {
	let config = config();
	let device = Device::new(Variant::Default);
	device.state().slots.insert(
		(1, 3),
		Slot {
			acc_time: 10_000,
			..FACTORY_SLOT
		},
	);
	let (mut controller, transcript) = connect(&config, Variant::Default, &device, &options());

	let err = controller
		.write_vel_tbl(1, 3, 2.0, Acceleration::default())
		.unwrap_err();
	assert!(err.is_validation());
	assert_eq!(transcript.bodies(), ["RTB1/3"]);
}

#[test]
fn move_relative_overrides_slot() {
	let config = config();
	let device = Device::new(Variant::Default);
	let mut options = options();
	options.restore_vel_table(false);
	let (mut controller, transcript) = connect(&config, Variant::Default, &device, &options);

	let done = controller.move_relative(1, 2.0, 1.5, Some(3)).unwrap();
	assert_eq!(done.target_pulse, 20);
	assert_eq!(done.velocity_pulse, 15);
	assert_eq!(done.vel_no, 3);
	assert_eq!(done.reply.get("ax_num"), Some("1"));
	assert_eq!(
		transcript.bodies(),
		["STR1", "RTB1/3", "WTB1/3/12/15/150/1", "RPS1/3/20/1", "STR1"]
	);
	assert_eq!(device.state().slot(1, 3).max_vel, 15);
}

#[test]
fn move_relative_restores_slot() {
	let config = config();
	let device = Device::new(Variant::Default);
	let (mut controller, transcript) = connect(&config, Variant::Default, &device, &options());
	let events = record_events(&mut controller);

	controller.move_relative(1, 2.0, 1.5, Some(3)).unwrap();
	assert_eq!(
		transcript.bodies(),
		[
			"STR1",
			"RTB1/3",
			"WTB1/3/12/15/150/1",
			"RPS1/3/20/1",
			"STR1",
			"WTB1/3/5/10/100/1"
		]
	);
	assert_eq!(device.state().slot(1, 3).max_vel, 10);
	assert_eq!(
		*events.lock().unwrap(),
		[
			"start move_relative",
			"poll 1 false",
			"override 3 12 15",
			"poll 1 false",
			"restore 3",
			"finish move_relative true",
		]
	);
}

#[test]
fn restore_keeps_deceleration_time() {
	let config = config();
	let device = Device::new(Variant::Aries);
	let (mut controller, transcript) = connect(&config, Variant::Aries, &device, &options());

	controller.move_absolute(1, 5.0, 2.0, Some(2)).unwrap();
	assert_eq!(
		transcript.bodies(),
		[
			"STR1",
			"RTB1/2",
			"WTB1/2/16/20/200/400/1",
			"APS1/2/50/1",
			"STR1",
			"WTB1/2/5/10/100/200/1"
		]
	);
}

#[test]
fn target_slot_applies_without_explicit_slot() {
	let config = config();
	let device = Device::new(Variant::Default);
	let mut options = options();
	options.target_vel_no(4);
	let (mut controller, transcript) = connect(&config, Variant::Default, &device, &options);

	let done = controller.move_relative(1, 1.0, 1.0, None).unwrap();
	assert_eq!(done.vel_no, 4);
	assert_eq!(transcript.count("RTB"), 1);
	assert_eq!(transcript.count("WTB"), 2);
}

#[test]
fn slot_zero_skips_override() {
	let config = config();
	let device = Device::new(Variant::Default);
	let (mut controller, transcript) = connect(&config, Variant::Default, &device, &options());

	let done = controller.move_absolute(1, 5.0, 1.0, None).unwrap();
	assert_eq!(done.vel_no, 0);
	assert_eq!(done.target_pulse, 50);
	assert_eq!(transcript.bodies(), ["STR1", "APS1/0/50/1", "STR1"]);
}

#[test]
fn move_waits_for_idle() {
	let config = config();
	let device = Device::new(Variant::Default);
	device.state().busy_after_motion = 2;
	let (mut controller, transcript) = connect(&config, Variant::Default, &device, &options());
	let events = record_events(&mut controller);

	controller.move_relative(1, 1.0, 1.0, None).unwrap();
	assert_eq!(transcript.count("STR"), 4);
	let polls: Vec<_> = events
		.lock()
		.unwrap()
		.iter()
		.filter(|e| e.starts_with("poll"))
		.cloned()
		.collect();
	assert_eq!(polls, ["poll 1 false", "poll 1 true", "poll 2 true", "poll 3 false"]);
}

#[test]
fn idle_timeout_restores_slot() {
	let config = config();
	let device = Device::new(Variant::Default);
	device.state().busy_after_motion = u32::MAX;
	let mut options = options();
	options.max_polls(Some(3));
	let (mut controller, transcript) = connect(&config, Variant::Default, &device, &options);

	let err = controller.move_relative(1, 1.0, 1.0, Some(3)).unwrap_err();
	let Error::IdleTimeout(err) = err else {
		panic!("unexpected error {err:?}");
	};
	assert_eq!(err.axis(), 1);
	assert_eq!(err.polls(), 3);
	assert_eq!(transcript.bodies().last().map(String::as_str), Some("WTB1/3/5/10/100/1"));
}

#[test]
fn idle_deadline_bounds_wait() {
	let config = config();
	let device = Device::new(Variant::Default);
	device.state().busy = u32::MAX;
	let mut options = options();
	options.idle_timeout(Duration::from_millis(20));
	let (mut controller, _) = connect(&config, Variant::Default, &device, &options);

	let err = controller.ensure_idle(1).unwrap_err();
	assert!(matches!(err, Error::IdleTimeout(_)));
}

#[test]
fn cancelled_wait() {
	let config = config();
	let device = Device::new(Variant::Default);
	let token = CancelToken::new();
	let mut options = options();
	options.cancel_token(token.clone());
	let (mut controller, transcript) = connect(&config, Variant::Default, &device, &options);

	token.cancel();
	let err = controller.ensure_idle(1).unwrap_err();
	assert!(matches!(err, Error::Cancelled(ref e) if e.axis() == 1));
	assert!(transcript.frames().is_empty());

	token.reset();
	controller.ensure_idle(1).unwrap();
}

#[test]
fn failed_move_still_restores_slot() {
	let config = config();
	let device = Device::new(Variant::Default);
	device.state().fail = Some("RPS");
	let (mut controller, transcript) = connect(&config, Variant::Default, &device, &options());
	let events = record_events(&mut controller);

	let err = controller.move_relative(1, 2.0, 1.5, Some(3)).unwrap_err();
	let Error::DeviceCommand(err) = err else {
		panic!("unexpected error {err:?}");
	};
	assert_eq!(err.code(), "7");
	assert_eq!(
		transcript.bodies(),
		["STR1", "RTB1/3", "WTB1/3/12/15/150/1", "RPS1/3/20/1", "WTB1/3/5/10/100/1"]
	);
	assert_eq!(
		events.lock().unwrap().last().map(String::as_str),
		Some("finish move_relative false")
	);
}

#[test]
fn failed_restore_after_failed_move_returns_move_error() {
	let config = config();
	let device = Device::new(Variant::Default);
	let (mut controller, _) = connect(&config, Variant::Default, &device, &options());

	// The override is written, then the device rejects the move and the
	// restore alike.
	let pending = controller.override_velocity(1, 3, 15).unwrap();
	device.state().fail = Some("WTB");
	let result: Result<(), Error> = Err(CancelledError::new(1).into());
	let err = controller.finish_override(result, Some(pending)).unwrap_err();
	assert!(matches!(err, Error::Cancelled(_)));
	assert_eq!(device.state().slot(1, 3).max_vel, 15);
}

#[test]
fn lost_override_reply_still_restores_slot() {
	let config = config();
	let device = Device::new(Variant::Default);
	device.state().silent = Some("WTB");
	let (mut controller, transcript) = connect(&config, Variant::Default, &device, &options());

	let err = controller.move_relative(1, 2.0, 1.5, Some(3)).unwrap_err();
	assert!(err.is_timeout(), "{err:?}");
	assert_eq!(
		transcript.bodies(),
		["STR1", "RTB1/3", "WTB1/3/12/15/150/1", "WTB1/3/5/10/100/1"]
	);
	assert_eq!(device.state().slot(1, 3).max_vel, 10);
}

#[test]
fn rejected_override_is_not_restored() {
	let config = config();
	let device = Device::new(Variant::Default);
	device.state().fail = Some("WTB");
	let (mut controller, transcript) = connect(&config, Variant::Default, &device, &options());

	let err = controller.move_relative(1, 2.0, 1.5, Some(3)).unwrap_err();
	assert!(matches!(err, Error::DeviceCommand(_)));
	assert_eq!(transcript.bodies(), ["STR1", "RTB1/3", "WTB1/3/12/15/150/1"]);
}

#[test]
fn completion_sleep_can_be_cancelled() {
	let config = config();
	let device = Device::new(Variant::Default);
	let token = CancelToken::new();
	let mut options = options();
	options
		.idle_timeout(Duration::from_secs(30))
		.sleep_for_estimate(true)
		.cancel_token(token.clone());
	let (mut controller, transcript) = connect(&config, Variant::Default, &device, &options);

	// 50 pulses at 10 pulses/s is estimated at over 5 s.
	let canceller = std::thread::spawn(move || {
		std::thread::sleep(Duration::from_millis(100));
		token.cancel();
	});
	let start = Instant::now();
	let err = controller.move_relative(1, 5.0, 1.0, Some(3)).unwrap_err();
	canceller.join().unwrap();
	assert!(matches!(err, Error::Cancelled(ref e) if e.axis() == 1));
	assert!(start.elapsed() < Duration::from_secs(2), "{:?}", start.elapsed());
	assert_eq!(transcript.bodies().last().map(String::as_str), Some("WTB1/3/5/10/100/1"));
}

#[test]
fn completion_sleep_is_bounded_by_idle_timeout() {
	let config = config();
	let device = Device::new(Variant::Default);
	let mut options = options();
	options
		.idle_timeout(Duration::from_millis(50))
		.sleep_for_estimate(true);
	let (mut controller, _) = connect(&config, Variant::Default, &device, &options);

	let start = Instant::now();
	controller.move_relative(1, 5.0, 1.0, None).unwrap();
	assert!(start.elapsed() < Duration::from_secs(2), "{:?}", start.elapsed());
}

#[test]
fn invalid_input_issues_no_command() {
	let config = config();
	let device = Device::new(Variant::Default);
	let (mut controller, transcript) = connect(&config, Variant::Default, &device, &options());

	let err = controller.move_relative(1, 200.0, 1.0, Some(3)).unwrap_err();
	assert!(matches!(err, Error::PositionOutOfRange(_)));
	let err = controller.move_absolute(1, 1.0, 20.0, Some(3)).unwrap_err();
	assert!(matches!(err, Error::VelocityOutOfRange(_)));
	let err = controller.home(2, 1.0, None).unwrap_err();
	assert!(matches!(err, Error::UnknownAxis(ref e) if e.axis() == 2));
	assert!(transcript.frames().is_empty());
}

#[test]
fn home_runs_homing_sequence() {
	let config = config();
	let device = Device::new(Variant::Default);
	let mut options = options();
	options.home_estimate(Duration::ZERO);
	let (mut controller, transcript) = connect(&config, Variant::Default, &device, &options);

	let homed = controller.home(1, 1.0, None).unwrap();
	assert_eq!(homed.velocity_pulse, 10);
	assert_eq!(transcript.bodies(), ["STR1", "ORG1/0/1", "STR1"]);
}

#[test]
fn reads_convert_to_physical_units() {
	let config = config();
	let device = Device::new(Variant::Default);
	let (mut controller, _) = connect(&config, Variant::Default, &device, &options());

	let position = controller.read_position(1).unwrap();
	assert_eq!(position.position_pulse, 20);
	assert_eq!(position.position, 2.0);

	let table = controller.read_vel_tbl(1, Some(3)).unwrap();
	assert_eq!(table.start_velocity, 0.5);
	assert_eq!(table.max_velocity, 1.0);
	assert_eq!(table.entry.acc_time, 100);

	let status = controller.read_status(1).unwrap();
	assert!(status.is_idle());
	assert_eq!(status.status, "0");
}

#[test]
fn stop_and_free_moves() {
	let config = config();
	let device = Device::new(Variant::Default);
	let (mut controller, transcript) = connect(&config, Variant::Default, &device, &options());

	controller.move_free(1, 2, 1).unwrap();
	controller.move_stop(1, None).unwrap();
	controller.move_stop(1, Some(0)).unwrap();
	assert_eq!(transcript.bodies(), ["FRP1/2/1", "STP1/1", "STP1/0"]);
}

#[test]
fn read_axis_needs_aries() {
	let config = config();
	let device = Device::new(Variant::Aries);
	let (mut controller, _) = connect(&config, Variant::Aries, &device, &options());
	let info = controller.read_axis().unwrap();
	assert_eq!(info.ax_num, 1);
	assert_eq!(info.control_num, 2);
	assert_eq!(info.islands.len(), 8);

	let device = Device::new(Variant::Default);
	let (mut controller, transcript) = connect(&config, Variant::Default, &device, &options());
	assert!(matches!(
		controller.read_axis(),
		Err(Error::UnknownCommand(_))
	));
	assert!(transcript.frames().is_empty());
}

#[test]
fn device_info_reports_identity() {
	let config = config();
	let device = Device::new(Variant::Default);
	let (mut controller, _) = connect(&config, Variant::Default, &device, &options());
	let events = record_events(&mut controller);

	let identity = controller.device_info().unwrap();
	assert_eq!(identity.name, "ARIES");
	assert_eq!(identity.version, "2.1");
	assert_eq!(
		*events.lock().unwrap(),
		["start device_info", "finish device_info true"]
	);
}
