//! Types that can exchange (read/write) bytes with a connected controller.
//!
//! The [`Backend`] trait represents all such types. A [`Connector`] lists the
//! transport candidates a controller might be attached to and opens a
//! [`Backend`] for one of them; [`SerialConnector`] does this for the serial
//! ports on the host.

use std::io;
#[cfg(any(test, feature = "mock"))]
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serialport as sp;

#[cfg(windows)]
use sp::COMPort as ExternSerial;
use sp::SerialPort;
#[cfg(unix)]
use sp::TTYPort as ExternSerial;

use crate::config::Parity;
use crate::error::Error;

/// The placeholder name for a backend that doesn't have a name.
pub(crate) const UNKNOWN_BACKEND_NAME: &str = "<unknown backend>";

/// Types that allow reading and writing bytes with a connected device.
pub trait Backend: io::Read + io::Write + private::Sealed {
	/// Set the read timeout.
	///
	/// If timeout is `None`, reads will block indefinitely.
	fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), io::Error>;

	/// Get the read timeout.
	///
	/// If timeout is `None`, reads will block indefinitely.
	fn read_timeout(&self) -> Result<Option<Duration>, io::Error>;

	/// Get the "name" of the backend.
	///
	/// This can be in any format, but should uniquely identify the backend
	/// instance.
	fn name(&self) -> Option<String>;
}

/// A platform agnostic serial port backend.
//
// The `serialport` crate exposes two platform specific serial ports, `COMPort`
// and `TTYPort` for windows and unix, respectively. Wrapping whichever one the
// platform uses in a new type keeps consumers free of both dynamic dispatch
// and an extra type parameter.
#[derive(Debug)]
pub struct Serial(pub(crate) ExternSerial);

impl io::Read for Serial {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		self.0.read(buf)
	}
}

impl io::Write for Serial {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		self.0.write(buf)
	}

	fn flush(&mut self) -> io::Result<()> {
		self.0.flush()
	}
}

impl Backend for Serial {
	fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), io::Error> {
		// The serialport API does not support infinite timeouts, so simply set
		// the timeout to the largest possible duration if `timeout` is `None`,
		// which is practically infinite.
		Ok(self.0.set_timeout(timeout.unwrap_or(Duration::MAX))?)
	}
	fn read_timeout(&self) -> Result<Option<Duration>, io::Error> {
		Ok(Some(self.0.timeout()))
	}
	fn name(&self) -> Option<String> {
		self.0.name()
	}
}

/// The line settings used when opening a transport candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkSettings {
	/// The baud rate.
	pub baud_rate: u32,
	/// The parity.
	pub parity: Parity,
	/// The read timeout. If `None`, reads block indefinitely.
	pub timeout: Option<Duration>,
}

/// Enumerates transport candidates and opens them.
pub trait Connector {
	/// The backend produced when a candidate is opened.
	type Backend: Backend;

	/// List the candidates a controller may be attached to, in probing order.
	fn candidates(&mut self) -> Result<Vec<String>, Error>;

	/// Open the named candidate with the given line settings.
	fn open(&mut self, candidate: &str, settings: &LinkSettings) -> Result<Self::Backend, Error>;
}

impl<C: Connector + ?Sized> Connector for &mut C {
	type Backend = C::Backend;

	fn candidates(&mut self) -> Result<Vec<String>, Error> {
		(**self).candidates()
	}
	fn open(&mut self, candidate: &str, settings: &LinkSettings) -> Result<Self::Backend, Error> {
		(**self).open(candidate, settings)
	}
}

/// Opens the serial ports available on the host.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SerialConnector;

impl Connector for SerialConnector {
	type Backend = Serial;

	fn candidates(&mut self) -> Result<Vec<String>, Error> {
		Ok(sp::available_ports()?
			.into_iter()
			.map(|info| info.port_name)
			.collect())
	}

	fn open(&mut self, candidate: &str, settings: &LinkSettings) -> Result<Serial, Error> {
		let parity = match settings.parity {
			Parity::N => sp::Parity::None,
			Parity::E => sp::Parity::Even,
			Parity::O => sp::Parity::Odd,
		};
		// The baud rate passed to `new` can be ignored on some platforms, so
		// set it again explicitly below.
		sp::new(candidate, settings.baud_rate)
			.data_bits(sp::DataBits::Eight)
			.parity(parity)
			.flow_control(sp::FlowControl::None)
			.stop_bits(sp::StopBits::One)
			.timeout(settings.timeout.unwrap_or(Duration::MAX))
			.baud_rate(settings.baud_rate)
			.open_native()
			.map(Serial)
			.map_err(Into::into)
	}
}

/// A record of every frame written to a set of [`Mock`] backends.
///
/// Clones share the same record.
#[cfg(any(test, feature = "mock"))]
#[derive(Debug, Default, Clone)]
pub struct Transcript(Arc<Mutex<Vec<(String, Vec<u8>)>>>);

#[cfg(any(test, feature = "mock"))]
impl Transcript {
	fn record(&self, backend: &str, frame: Vec<u8>) {
		self.0
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.push((backend.to_string(), frame));
	}

	/// Every frame written so far, with the name of the backend it was written to.
	pub fn frames(&self) -> Vec<(String, Vec<u8>)> {
		self.0
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.clone()
	}

	/// The frames written so far, with framing bytes removed, as text.
	pub fn bodies(&self) -> Vec<String> {
		self.frames()
			.iter()
			.map(|(_, frame)| frame_body(frame))
			.collect()
	}

	/// The number of frames written whose command code is `code`.
	pub fn count(&self, code: &str) -> usize {
		self.bodies()
			.iter()
			.filter(|body| body.starts_with(code))
			.count()
	}

	/// Forget every recorded frame.
	pub fn clear(&self) {
		self.0.lock().unwrap_or_else(PoisonError::into_inner).clear();
	}
}

/// The text of a request frame without the start byte and line ending.
#[cfg(any(test, feature = "mock"))]
fn frame_body(frame: &[u8]) -> String {
	String::from_utf8_lossy(frame)
		.trim_matches(|c: char| c.is_control() || c.is_whitespace())
		.to_string()
}

/// A function computing the reply to a request frame.
///
/// It receives the frame text without framing bytes (e.g. `RDP1`) and
/// returns the reply line to queue, if any.
#[cfg(any(test, feature = "mock"))]
pub type Responder = Box<dyn FnMut(&str) -> Option<String> + Send>;

/// A mock backend for use in testing.
///
/// It has the following features:
///   * Every complete frame written to it is recorded in its [`Transcript`].
///   * It can be filled with reply lines for reading, either up front or
///     computed by a [`Responder`] as frames are written.
///   * Specific errors can be inserted for calls to `read`, `write`, `flush`,
///     and `set_read_timeout`.
#[cfg(any(test, feature = "mock"))]
pub struct Mock {
	/// The name reported by the backend.
	name: String,
	/// The buffer data is read from
	buffer: io::Cursor<Vec<u8>>,
	/// Bytes of a frame that has not been terminated yet.
	pending: Vec<u8>,
	/// Where complete frames are recorded.
	transcript: Transcript,
	/// Computes replies to written frames.
	responder: Option<Responder>,
	/// The error to surface on the next read, if any. It is only surfaced once.
	read_error: Option<io::Error>,
	/// The error to surface on the next write, if any. It is only surfaced once.
	write_error: Option<io::Error>,
	/// The error to surface on the next flush, if any. It is only surfaced once.
	flush_error: Option<io::Error>,
	/// The error to surface on the next set_read_timeout, if any. It is only surfaced once.
	set_read_timeout_error: Option<io::Error>,
	/// The read timeout, which is ignored.
	ignored_read_timeout: Option<Duration>,
}

#[cfg(any(test, feature = "mock"))]
impl std::fmt::Debug for Mock {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Mock")
			.field("name", &self.name)
			.field("buffer", &self.buffer)
			.field("pending", &self.pending)
			.field("responder", &self.responder.is_some())
			.finish_non_exhaustive()
	}
}

#[cfg(any(test, feature = "mock"))]
impl Mock {
	/// Create a new Mock backend.
	pub fn new() -> Self {
		Mock {
			name: "<mock>".to_string(),
			buffer: io::Cursor::new(Vec::new()),
			pending: Vec::new(),
			transcript: Transcript::default(),
			responder: None,
			read_error: None,
			write_error: None,
			flush_error: None,
			set_read_timeout_error: None,
			ignored_read_timeout: Some(Duration::ZERO),
		}
	}
	/// Create a new Mock backend that answers frames with `responder`.
	pub fn with_responder<F>(responder: F) -> Self
	where
		F: FnMut(&str) -> Option<String> + Send + 'static,
	{
		let mut mock = Mock::new();
		mock.responder = Some(Box::new(responder));
		mock
	}
	/// Set the name reported by the backend.
	pub fn set_name(&mut self, name: &str) {
		self.name = name.to_string();
	}
	/// Get a handle to the transcript of frames written to this backend.
	pub fn transcript(&self) -> Transcript {
		self.transcript.clone()
	}
	/// Record frames in `transcript` instead.
	pub fn set_transcript(&mut self, transcript: Transcript) {
		self.transcript = transcript;
	}
	/// Append data to the read buffer.
	///
	/// The data is not validated in any way.
	pub fn append_data<T: AsRef<[u8]>>(&mut self, bytes: T) {
		self.buffer.get_mut().extend_from_slice(bytes.as_ref());
	}
	/// Append a reply line, terminated with `\r\n`, to the read buffer.
	pub fn push(&mut self, line: &str) {
		self.append_data(line.trim_end());
		self.append_data(crate::protocol::CRLF);
	}
	/// Clear the read buffer.
	pub fn clear_buffer(&mut self) {
		self.buffer.get_mut().clear();
		self.buffer.set_position(0);
	}
	/// Whether the mock has any data available or not
	pub fn is_empty(&self) -> bool {
		self.buffer.position() as usize >= self.buffer.get_ref().len()
	}
	/// Set the error for the next `read`, if any.
	pub fn read_error(&mut self, err: Option<io::Error>) {
		self.read_error = err;
	}
	/// Set the error for the next `write`, if any.
	pub fn write_error(&mut self, err: Option<io::Error>) {
		self.write_error = err;
	}
	/// Set the error for the next `flush`, if any.
	pub fn flush_error(&mut self, err: Option<io::Error>) {
		self.flush_error = err;
	}
	/// Set the error for the next `set_read_timeout`, if any.
	pub fn set_read_timeout_error(&mut self, err: Option<io::Error>) {
		self.set_read_timeout_error = err;
	}
	/// Handle a complete frame: record it and queue the responder's reply.
	fn complete_frame(&mut self, frame: Vec<u8>) {
		let body = frame_body(&frame);
		self.transcript.record(&self.name, frame);
		if let Some(reply) = self.responder.as_mut().and_then(|respond| respond(&body)) {
			self.push(&reply);
		}
	}
}

#[cfg(any(test, feature = "mock"))]
impl Default for Mock {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(any(test, feature = "mock"))]
impl Backend for Mock {
	fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), io::Error> {
		if let Some(err) = self.set_read_timeout_error.take() {
			Err(err)
		} else {
			self.ignored_read_timeout = timeout;
			Ok(())
		}
	}

	fn read_timeout(&self) -> Result<Option<Duration>, io::Error> {
		Ok(self.ignored_read_timeout)
	}

	fn name(&self) -> Option<String> {
		Some(self.name.clone())
	}
}

#[cfg(any(test, feature = "mock"))]
impl io::Read for Mock {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		if let Some(err) = self.read_error.take() {
			Err(err)
		} else if self.is_empty() {
			// For a real device, having no data ready would result in a wait
			// and then eventual timeout error. However, as our data is in
			// memory that does not happen here. So simulate that behaviour by
			// returning a timeout error immediately.
			Err(io::Error::new(
				io::ErrorKind::TimedOut,
				"Simulated timeout error",
			))
		} else {
			io::Read::read(&mut self.buffer, buf)
		}
	}
}

#[cfg(any(test, feature = "mock"))]
impl io::Write for Mock {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		if let Some(err) = self.write_error.take() {
			return Err(err);
		}
		for &byte in buf {
			self.pending.push(byte);
			if byte == b'\n' {
				let frame = std::mem::take(&mut self.pending);
				self.complete_frame(frame);
			}
		}
		Ok(buf.len())
	}

	fn flush(&mut self) -> io::Result<()> {
		if let Some(err) = self.flush_error.take() {
			Err(err)
		} else {
			Ok(())
		}
	}
}

/// A [`Connector`] over a fixed set of named [`Mock`] backends.
///
/// Each mock can be opened once; opening a candidate whose mock has already
/// been taken, or that was never inserted, fails like a missing device.
#[cfg(any(test, feature = "mock"))]
#[derive(Debug, Default)]
pub struct MockConnector {
	devices: Vec<(String, Option<Mock>)>,
	transcript: Transcript,
	opened: Vec<(String, LinkSettings)>,
}

#[cfg(any(test, feature = "mock"))]
impl MockConnector {
	/// Create a connector without any candidates.
	pub fn new() -> Self {
		MockConnector::default()
	}

	/// Add a candidate, or replace the mock behind an existing one.
	///
	/// The mock is renamed after the candidate and records into the
	/// connector's transcript.
	pub fn insert(&mut self, candidate: &str, mut mock: Mock) -> &mut Self {
		mock.set_name(candidate);
		mock.set_transcript(self.transcript.clone());
		match self.devices.iter_mut().find(|(name, _)| name == candidate) {
			Some((_, slot)) => *slot = Some(mock),
			None => self.devices.push((candidate.to_string(), Some(mock))),
		}
		self
	}

	/// Add a candidate that fails to open.
	pub fn insert_unavailable(&mut self, candidate: &str) -> &mut Self {
		self.devices.push((candidate.to_string(), None));
		self
	}

	/// A handle to the transcript shared by every mock of this connector.
	pub fn transcript(&self) -> Transcript {
		self.transcript.clone()
	}

	/// The candidates that were opened, in order, with their line settings.
	pub fn opened(&self) -> &[(String, LinkSettings)] {
		&self.opened
	}
}

#[cfg(any(test, feature = "mock"))]
impl Connector for MockConnector {
	type Backend = Mock;

	fn candidates(&mut self) -> Result<Vec<String>, Error> {
		Ok(self.devices.iter().map(|(name, _)| name.clone()).collect())
	}

	fn open(&mut self, candidate: &str, settings: &LinkSettings) -> Result<Mock, Error> {
		self.opened.push((candidate.to_string(), *settings));
		let mut mock = self
			.devices
			.iter_mut()
			.find(|(name, _)| name == candidate)
			.and_then(|(_, slot)| slot.take())
			.ok_or_else(|| {
				Error::from(sp::Error::new(
					sp::ErrorKind::NoDevice,
					format!("no mock device at '{candidate}'"),
				))
			})?;
		mock.set_read_timeout(settings.timeout)?;
		Ok(mock)
	}
}

mod private {
	pub trait Sealed {}

	impl Sealed for super::Serial {}
	#[cfg(any(test, feature = "mock"))]
	impl Sealed for super::Mock {}
}

#[cfg(test)]
mod test {
	use super::*;
	use std::io::{Read as _, Write as _};

	#[test]
	fn mock_records_frames_and_responds() {
		let mut mock = Mock::with_responder(|body| {
			body.strip_prefix("RDP").map(|axis| format!("C RDP {axis} 42"))
		});
		mock.write_all(b"\x02RDP1").unwrap();
		assert!(mock.transcript().frames().is_empty());
		mock.write_all(b"\r\n").unwrap();
		assert_eq!(mock.transcript().bodies(), ["RDP1"]);

		// The mock reports a timeout once drained, but keeps what was read.
		let mut reply = Vec::new();
		let _ = mock.read_to_end(&mut reply);
		assert_eq!(reply, b"C RDP 1 42\r\n");
	}

	#[test]
	fn mock_times_out_when_empty() {
		let mut mock = Mock::new();
		let err = mock.read(&mut [0; 4]).unwrap_err();
		assert_eq!(err.kind(), io::ErrorKind::TimedOut);
	}

	#[test]
	fn mock_connector_opens_each_mock_once() {
		let settings = LinkSettings {
			baud_rate: 9600,
			parity: Parity::N,
			timeout: None,
		};
		let mut connector = MockConnector::new();
		connector.insert("A", Mock::new()).insert_unavailable("B");
		assert_eq!(connector.candidates().unwrap(), ["A", "B"]);

		let backend = connector.open("A", &settings).unwrap();
		assert_eq!(backend.name().as_deref(), Some("A"));
		assert_eq!(backend.read_timeout().unwrap(), None);
		assert!(connector.open("A", &settings).is_err());
		assert!(matches!(
			connector.open("B", &settings),
			Err(Error::SerialDeviceInUseOrDisconnected(_))
		));
		assert_eq!(connector.opened().len(), 3);
	}

	#[test]
	fn mock_connector_applies_read_timeout() {
		let settings = LinkSettings {
			baud_rate: 9600,
			parity: Parity::N,
			timeout: Some(Duration::from_millis(250)),
		};
		let mut failing = Mock::new();
		failing.set_read_timeout_error(Some(io::Error::new(
			io::ErrorKind::Unsupported,
			"cannot set timeout",
		)));
		let mut connector = MockConnector::new();
		connector.insert("A", Mock::new()).insert("B", failing);

		let backend = connector.open("A", &settings).unwrap();
		assert_eq!(
			backend.read_timeout().unwrap(),
			Some(Duration::from_millis(250))
		);
		assert!(matches!(
			connector.open("B", &settings),
			Err(Error::Io(ref e)) if e.kind() == io::ErrorKind::Unsupported
		));
	}

	#[test]
	fn mock_clear_buffer_discards_unread_data() {
		let mut mock = Mock::new();
		mock.push("C stale");
		assert!(!mock.is_empty());
		mock.clear_buffer();
		assert!(mock.is_empty());
		mock.push("C fresh");
		let mut reply = Vec::new();
		let _ = mock.read_to_end(&mut reply);
		assert_eq!(reply, b"C fresh\r\n");
	}
}
