//! Options for connecting a session.

use super::Session;
use crate::{
    backend::{Connector, LinkSettings, SerialConnector},
    config::{DeviceConfig, Parity, SerialConfig},
    error::Error,
    protocol::Variant,
};
use std::time::Duration;

/// Options for configuring and connecting a [`Session`].
///
/// ## Example
///
/// ```rust
/// # use kzproto::{config::{DeviceConfig, Parity}, session::ConnectOptions};
/// # use std::time::Duration;
/// # fn wrapper(config: &DeviceConfig) -> Result<(), Box<dyn std::error::Error>> {
/// let session = ConnectOptions::new()
///     .timeout(Some(Duration::from_millis(200)))
///     .port("/dev/ttyUSB0")
///     .baud_rate(9600)
///     .parity(Parity::E)
///     .connect(config)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// The protocol variant.
    variant: Variant,
    /// The read timeout.
    timeout: Option<Duration>,
    /// The only candidate to probe, if any.
    port: Option<String>,
    /// A baud rate overriding the configured one.
    baud_rate: Option<u32>,
    /// A parity overriding the configured one.
    parity: Option<Parity>,
    /// Whether `execute` reopens a closed transport.
    auto_reopen: bool,
}

impl ConnectOptions {
    /// The default read timeout: 500 ms.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

    /// Create a blank set of options ready for configuration.
    ///
    /// The default variant is [`Variant::Default`], the read timeout is
    /// 500 ms, every candidate is probed with the configured line settings
    /// and closed transports are reopened automatically.
    ///
    /// Equivalent to [`default`](ConnectOptions::default).
    pub fn new() -> Self {
        ConnectOptions {
            variant: Variant::Default,
            timeout: Some(ConnectOptions::DEFAULT_TIMEOUT),
            port: None,
            baud_rate: None,
            parity: None,
            auto_reopen: true,
        }
    }

    /// Set the protocol variant.
    pub fn variant(&mut self, variant: Variant) -> &mut Self {
        self.variant = variant;
        self
    }

    /// Set a custom read timeout.
    ///
    /// If duration is `None`, reads will block indefinitely. The default is 500 ms.
    pub fn timeout(&mut self, duration: Option<Duration>) -> &mut Self {
        self.timeout = duration;
        self
    }

    /// Only probe the given port instead of every available candidate.
    pub fn port<S: Into<String>>(&mut self, port: S) -> &mut Self {
        self.port = Some(port.into());
        self
    }

    /// Override the configured baud rate.
    pub fn baud_rate(&mut self, baud_rate: u32) -> &mut Self {
        self.baud_rate = Some(baud_rate);
        self
    }

    /// Override the configured parity.
    pub fn parity(&mut self, parity: Parity) -> &mut Self {
        self.parity = Some(parity);
        self
    }

    /// Set whether a closed transport is reopened when a command is executed.
    ///
    /// The default is `true`. When `false`, executing a command on a
    /// disconnected session fails with a
    /// [`TransportNotOpenError`](crate::error::TransportNotOpenError).
    pub fn auto_reopen(&mut self, reopen: bool) -> &mut Self {
        self.auto_reopen = reopen;
        self
    }

    pub(super) fn variant_value(&self) -> Variant {
        self.variant
    }

    pub(super) fn port_value(&self) -> Option<&str> {
        self.port.as_deref()
    }

    pub(super) fn auto_reopen_value(&self) -> bool {
        self.auto_reopen
    }

    /// The line settings to open candidates with, given the configured ones.
    pub(super) fn link_settings(&self, serial: &SerialConfig) -> LinkSettings {
        LinkSettings {
            baud_rate: self.baud_rate.unwrap_or(serial.baudrate),
            parity: self.parity.unwrap_or(serial.parity),
            timeout: self.timeout,
        }
    }

    /// Connect to the configured device on the host's serial ports.
    pub fn connect(&self, config: &DeviceConfig) -> Result<Session<SerialConnector>, Error> {
        self.connect_with(SerialConnector, config)
    }

    /// Connect to the configured device using a custom [`Connector`].
    pub fn connect_with<C: Connector>(
        &self,
        connector: C,
        config: &DeviceConfig,
    ) -> Result<Session<C>, Error> {
        Session::establish(connector, config, self)
    }
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self::new()
    }
}
