//! A connection to a single controller.
//!
//! A [`Session`] owns the transport to one controller, bound to it by
//! checking the name the controller reports in reply to `identify`. Every
//! exchange is a blocking request/reply pair; the session's `&mut self`
//! receivers guarantee that only one is ever in flight.
//!
//! ```no_run
//! # use kzproto::{config::DeviceConfig, session::Session, protocol::Variant};
//! # fn wrapper() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DeviceConfig::load("aries.json")?;
//! let mut session = Session::connect_options()
//!     .variant(Variant::Aries)
//!     .connect(&config)?;
//! let identity = session.identify()?;
//! println!("connected to {} ({})", identity.name, identity.version);
//! # Ok(())
//! # }
//! ```

mod options;
pub use options::ConnectOptions;

use std::io;
use std::time::{Duration, Instant};

use crate::{
	backend::{Backend, Connector, LinkSettings, SerialConnector, UNKNOWN_BACKEND_NAME},
	config::DeviceConfig,
	error::{DeviceNotFoundError, Error, TransportNotOpenError},
	protocol::{command::IDENTIFY, Codec, Reply, Variant},
};

/// Something that happened on a session.
///
/// Events are delivered to the handler installed with
/// [`Session::set_event_handler`].
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Event<'a> {
	/// A request frame was written to the transport.
	Transmitted {
		/// The frame, including framing bytes.
		frame: &'a [u8],
	},
	/// A reply line was read from the transport.
	Received {
		/// The line, without its line ending.
		line: &'a str,
		/// The time between writing the request and reading the reply, when
		/// the line was read as part of an exchange.
		rtt: Option<Duration>,
	},
	/// A velocity table slot was temporarily overwritten before a move.
	VelocityOverride {
		/// The axis.
		axis: u32,
		/// The velocity table slot.
		vel_no: i64,
		/// The start velocity written, in pulses per second.
		start_vel: i64,
		/// The maximum velocity written, in pulses per second.
		max_vel: i64,
	},
	/// A velocity table slot was written back to its original contents.
	VelocityRestore {
		/// The axis.
		axis: u32,
		/// The velocity table slot.
		vel_no: i64,
	},
	/// The status of an axis was polled while waiting for it to become idle.
	IdlePoll {
		/// The axis.
		axis: u32,
		/// The number of the poll, starting at 1.
		poll: u32,
		/// Whether the axis was still busy.
		busy: bool,
	},
	/// A controller operation started.
	OperationStarted {
		/// The name of the operation.
		operation: &'static str,
		/// The axis the operation acts on, if any.
		axis: Option<u32>,
	},
	/// A controller operation finished.
	OperationFinished {
		/// The name of the operation.
		operation: &'static str,
		/// The axis the operation acts on, if any.
		axis: Option<u32>,
		/// How long the operation took.
		elapsed: Duration,
		/// Whether the operation succeeded.
		success: bool,
	},
}

/// A callback receiving session [`Event`]s.
pub type EventHandler = Box<dyn FnMut(&Event<'_>) + Send>;

/// The name and firmware version a controller reports.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
	/// The device name.
	pub name: String,
	/// The firmware version.
	pub version: String,
	/// The full reply.
	pub reply: Reply,
}

impl TryFrom<Reply> for Identity {
	type Error = Error;

	fn try_from(reply: Reply) -> Result<Self, Self::Error> {
		Ok(Identity {
			name: reply.parse("dev_name")?,
			version: reply.get("dev_var").unwrap_or_default().to_string(),
			reply,
		})
	}
}

/// A connection to a single controller.
///
/// See the [module level documentation](self) for more information.
pub struct Session<C: Connector = SerialConnector> {
	/// Opens transports.
	connector: C,
	/// The candidate the session is bound to, once discovery succeeds.
	candidate: Option<String>,
	/// The settings transports are opened with.
	settings: LinkSettings,
	/// The open transport, if any.
	backend: Option<C::Backend>,
	/// Encodes and decodes with the session's variant.
	codec: Codec,
	/// The expected device name.
	device: String,
	/// Whether `execute` reopens a closed transport.
	auto_reopen: bool,
	/// Receives events.
	handler: Option<EventHandler>,
}

impl<C: Connector> std::fmt::Debug for Session<C> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Session")
			.field("candidate", &self.candidate)
			.field("settings", &self.settings)
			.field("open", &self.backend.is_some())
			.field("codec", &self.codec)
			.field("device", &self.device)
			.field("auto_reopen", &self.auto_reopen)
			.finish_non_exhaustive()
	}
}

impl Session<SerialConnector> {
	/// Connect to the configured device on the host's serial ports with the
	/// default options.
	///
	/// Use [`Session::connect_options`] to customize how the session connects.
	pub fn connect(config: &DeviceConfig) -> Result<Self, Error> {
		ConnectOptions::new().connect(config)
	}

	/// Get a [`ConnectOptions`] to customize how a session connects.
	pub fn connect_options() -> ConnectOptions {
		ConnectOptions::default()
	}
}

impl<C: Connector> Session<C> {
	/// Probe the candidates in order and bind to the first one reporting the
	/// configured device name.
	///
	/// Candidates that fail to open, fail to answer, or report another
	/// device are closed and skipped. An invalid configuration is rejected
	/// before any candidate is opened.
	pub(crate) fn establish(
		connector: C,
		config: &DeviceConfig,
		options: &ConnectOptions,
	) -> Result<Self, Error> {
		config.validate()?;
		let mut session = Session {
			connector,
			candidate: None,
			settings: options.link_settings(&config.serial),
			backend: None,
			codec: Codec::new(options.variant_value()),
			device: config.device.clone(),
			auto_reopen: options.auto_reopen_value(),
			handler: None,
		};

		let candidates = match options.port_value() {
			Some(port) => vec![port.to_string()],
			None => session.connector.candidates()?,
		};
		for candidate in &candidates {
			log::debug!(
				"probing {candidate} (baud rate {}, parity {:?}) for '{}'",
				session.settings.baud_rate,
				session.settings.parity,
				session.device
			);
			match session.probe(candidate) {
				Ok(None) => {
					log::info!("connected to '{}' on {candidate}", session.device);
					session.candidate = Some(candidate.clone());
					return Ok(session);
				}
				Ok(Some(found)) => {
					log::debug!(
						"{candidate}: device mismatch (expected '{}', found '{found}')",
						session.device
					);
				}
				Err(e) => log::warn!("{candidate}: probe failed: {e}"),
			}
			session.backend = None;
		}
		Err(DeviceNotFoundError::new(&session.device, candidates).into())
	}

	/// Open a candidate and check its identity.
	///
	/// Returns the name found if it is not the expected device.
	fn probe(&mut self, candidate: &str) -> Result<Option<String>, Error> {
		self.backend = Some(self.connector.open(candidate, &self.settings)?);
		let identity = self.identify()?;
		if identity.name == self.device {
			Ok(None)
		} else {
			Ok(Some(identity.name))
		}
	}

	/// The variant the session encodes and decodes with.
	pub fn variant(&self) -> Variant {
		self.codec.variant()
	}

	/// The session's codec.
	pub fn codec(&self) -> Codec {
		self.codec
	}

	/// The name of the device the session is bound to.
	pub fn device(&self) -> &str {
		&self.device
	}

	/// The candidate the session is bound to.
	pub fn candidate(&self) -> Option<&str> {
		self.candidate.as_deref()
	}

	/// The settings transports are opened with.
	pub fn link_settings(&self) -> &LinkSettings {
		&self.settings
	}

	/// Set the read timeout.
	///
	/// The timeout is applied to the open transport, if any, and to every
	/// transport opened later. If timeout is `None`, reads block indefinitely.
	pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), Error> {
		if let Some(backend) = self.backend.as_mut() {
			backend.set_read_timeout(timeout)?;
		}
		self.settings.timeout = timeout;
		Ok(())
	}

	/// Get the read timeout.
	///
	/// This is the open transport's timeout, or the timeout the next
	/// transport will be opened with if the session is closed.
	pub fn read_timeout(&self) -> Result<Option<Duration>, Error> {
		match self.backend.as_ref() {
			Some(backend) => Ok(backend.read_timeout()?),
			None => Ok(self.settings.timeout),
		}
	}

	/// Whether the transport is open.
	pub fn is_open(&self) -> bool {
		self.backend.is_some()
	}

	/// Get a reference to the connector.
	pub fn connector(&self) -> &C {
		&self.connector
	}

	/// Get a mutable reference to the connector.
	pub fn connector_mut(&mut self) -> &mut C {
		&mut self.connector
	}

	/// Get a reference to the open backend, if any.
	pub fn backend(&self) -> Option<&C::Backend> {
		self.backend.as_ref()
	}

	/// Get a mutable reference to the open backend, if any.
	pub fn backend_mut(&mut self) -> Option<&mut C::Backend> {
		self.backend.as_mut()
	}

	/// Close the transport.
	///
	/// Closing a session that is already closed does nothing. If automatic
	/// reopening is enabled (the default) the next [`execute`](Session::execute)
	/// reopens the transport.
	pub fn disconnect(&mut self) {
		if self.backend.take().is_some() {
			log::debug!(
				"{} closed",
				self.candidate.as_deref().unwrap_or(UNKNOWN_BACKEND_NAME)
			);
		}
	}

	/// Set a callback that will be called for every [`Event`] on the session.
	///
	/// If a previous callback was set, it is returned.
	///
	/// ```
	/// # use kzproto::session::{Event, Session};
	/// # use kzproto::backend::Connector;
	/// # use std::sync::{Arc, Mutex};
	/// # fn wrapper<C: Connector>(session: &mut Session<C>) {
	/// let frames = Arc::new(Mutex::new(Vec::new()));
	/// let sink = Arc::clone(&frames);
	/// session.set_event_handler(move |event| {
	///     if let Event::Transmitted { frame } = event {
	///         if let Ok(mut frames) = sink.lock() {
	///             frames.push(frame.to_vec());
	///         }
	///     }
	/// });
	/// # }
	/// ```
	pub fn set_event_handler<F>(&mut self, handler: F) -> Option<EventHandler>
	where
		F: FnMut(&Event<'_>) + Send + 'static,
	{
		self.handler.replace(Box::new(handler))
	}

	/// Clear any callback registered via [`set_event_handler`](Session::set_event_handler) and return it.
	pub fn clear_event_handler(&mut self) -> Option<EventHandler> {
		self.handler.take()
	}

	/// Deliver an event to the handler, if one is installed.
	pub(crate) fn emit(&mut self, event: &Event<'_>) {
		if let Some(handler) = self.handler.as_mut() {
			handler(event);
		}
	}

	/// Query the controller's name and firmware version.
	pub fn identify(&mut self) -> Result<Identity, Error> {
		Identity::try_from(self.execute(IDENTIFY, &[])?)
	}

	/// Execute a command with the session's codec and return its reply.
	///
	/// The transport is reopened first if it was closed and automatic
	/// reopening is enabled.
	pub fn execute(&mut self, command: &str, args: &[(&str, i64)]) -> Result<Reply, Error> {
		let codec = self.codec;
		self.execute_with(codec, command, args)
	}

	/// Execute a command with the given codec and return its reply.
	pub fn execute_with(
		&mut self,
		codec: Codec,
		command: &str,
		args: &[(&str, i64)],
	) -> Result<Reply, Error> {
		let frame = codec.encode(command, args)?;
		self.ensure_open()?;

		let start = Instant::now();
		self.write_frame(&frame)?;
		let line = self.read_line()?;
		let rtt = start.elapsed();
		log::debug!(
			"{} RECV: {} ({:.1} ms)",
			self.backend_name(),
			line,
			rtt.as_secs_f64() * 1000.0
		);
		self.emit(&Event::Received {
			line: &line,
			rtt: Some(rtt),
		});
		Ok(codec.decode(&line, command)?)
	}

	/// Write a raw frame to the transport.
	///
	/// The transport is never reopened.
	pub fn send(&mut self, frame: &[u8]) -> Result<(), Error> {
		self.write_frame(frame)
	}

	/// Read a single reply line from the transport.
	///
	/// The transport is never reopened.
	pub fn receive_line(&mut self) -> Result<String, Error> {
		let line = self.read_line()?;
		log::debug!("{} RECV: {}", self.backend_name(), line);
		self.emit(&Event::Received {
			line: &line,
			rtt: None,
		});
		Ok(line)
	}

	/// Make sure the transport is open, reopening the bound candidate if allowed.
	fn ensure_open(&mut self) -> Result<(), Error> {
		if self.backend.is_some() {
			return Ok(());
		}
		match &self.candidate {
			Some(candidate) if self.auto_reopen => {
				log::debug!("reopening {candidate}");
				self.backend = Some(self.connector.open(candidate, &self.settings)?);
				Ok(())
			}
			candidate => Err(TransportNotOpenError::new(
				candidate.as_deref().unwrap_or(UNKNOWN_BACKEND_NAME),
			)
			.into()),
		}
	}

	fn backend_name(&self) -> String {
		self.backend
			.as_ref()
			.and_then(Backend::name)
			.unwrap_or_else(|| UNKNOWN_BACKEND_NAME.to_string())
	}

	fn open_backend(&mut self) -> Result<&mut C::Backend, Error> {
		match self.backend.as_mut() {
			Some(backend) => Ok(backend),
			None => Err(TransportNotOpenError::new(
				self.candidate.as_deref().unwrap_or(UNKNOWN_BACKEND_NAME),
			)
			.into()),
		}
	}

	fn write_frame(&mut self, frame: &[u8]) -> Result<(), Error> {
		let name = self.backend_name();
		let backend = self.open_backend()?;
		log::debug!(
			"{} TX:   {}",
			name,
			String::from_utf8_lossy(frame).trim_matches(|c: char| c.is_control())
		);
		io::Write::write_all(backend, frame)?;
		io::Write::flush(backend)?;
		self.emit(&Event::Transmitted { frame });
		Ok(())
	}

	/// Read bytes up to and including the next line feed.
	fn read_line(&mut self) -> Result<String, Error> {
		let backend = self.open_backend()?;
		let mut buf = Vec::with_capacity(64);
		for byte in io::Read::bytes(backend) {
			let byte = byte?;
			buf.push(byte);
			if byte == b'\n' {
				break;
			}
		}
		if buf.is_empty() {
			return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "transport closed").into());
		}
		Ok(String::from_utf8_lossy(&buf)
			.trim_end_matches(['\r', '\n'])
			.to_string())
	}
}
