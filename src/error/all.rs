//! The error type covering everything this library returns.

use super::*;

error_enum! {
    /// Any error returned by this library.
    #[derive(Debug)]
    #[non_exhaustive]
    pub enum Error {
        SerialDeviceInUseOrDisconnected(SerialDeviceInUseOrDisconnectedError),
        Io(std::io::Error),
        Config(ConfigError),
        UnknownCommand(UnknownCommandError),
        MalformedResponse(MalformedResponseError),
        ResponseLengthMismatch(ResponseLengthMismatchError),
        DeviceCommand(DeviceCommandError),
        UnknownAxis(UnknownAxisError),
        PositionOutOfRange(PositionOutOfRangeError),
        VelocityOutOfRange(VelocityOutOfRangeError),
        AccTimeOutOfRange(AccTimeOutOfRangeError),
        AccTypeInvalid(AccTypeInvalidError),
        DeviceNotFound(DeviceNotFoundError),
        TransportNotOpen(TransportNotOpenError),
        IdleTimeout(IdleTimeoutError),
        Cancelled(CancelledError),
    }

    impl From<CodecError> {
        UnknownCommand => UnknownCommand,
        MalformedResponse => MalformedResponse,
        ResponseLengthMismatch => ResponseLengthMismatch,
        DeviceCommand => DeviceCommand,
    }

    impl From<ValidationError> {
        UnknownAxis => UnknownAxis,
        PositionOutOfRange => PositionOutOfRange,
        VelocityOutOfRange => VelocityOutOfRange,
        AccTimeOutOfRange => AccTimeOutOfRange,
        AccTypeInvalid => AccTypeInvalid,
    }
}

impl Error {
    /// A convenience function for determining if the error is due to the
    /// transport timing out.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == std::io::ErrorKind::TimedOut)
    }

    /// Whether the error was raised while validating caller input, before
    /// anything was written to the device.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::UnknownAxis(_)
                | Error::PositionOutOfRange(_)
                | Error::VelocityOutOfRange(_)
                | Error::AccTimeOutOfRange(_)
                | Error::AccTypeInvalid(_)
        )
    }
}

impl From<serialport::Error> for Error {
    fn from(other: serialport::Error) -> Self {
        use std::io;

        match other.kind() {
            serialport::ErrorKind::NoDevice => Error::SerialDeviceInUseOrDisconnected(
                SerialDeviceInUseOrDisconnectedError(other.description.into_boxed_str()),
            ),
            serialport::ErrorKind::InvalidInput => Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                other.description,
            )),
            serialport::ErrorKind::Unknown => {
                Error::Io(io::Error::new(io::ErrorKind::Other, other.description))
            }
            serialport::ErrorKind::Io(kind) => Error::Io(io::Error::new(kind, other.description)),
        }
    }
}
