//! Error types raised while encoding commands and decoding replies.

use crate::protocol::Variant;

/// The command is not part of the active command table.
///
/// This is a programming error: the command is not supported by the variant
/// the session was created with.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct UnknownCommandError(Box<str>, Variant);

impl UnknownCommandError {
    pub(crate) fn new(command: &str, variant: Variant) -> Self {
        UnknownCommandError(command.into(), variant)
    }

    /// The name of the command.
    pub fn command(&self) -> &str {
        &self.0
    }

    /// The variant whose table was searched.
    pub fn variant(&self) -> Variant {
        self.1
    }
}

impl_error_display! {
    UnknownCommandError,
    self => "unknown command '{}' for the {} variant", self.0, self.1
}

#[derive(Debug, PartialEq, Eq, Hash)]
struct MalformedInner {
    command: String,
    response: String,
    reason: String,
}

/// A reply could not be parsed.
///
/// Either the result prefix was not `C` or `E`, the reply was empty, or a
/// field did not hold the expected kind of value.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct MalformedResponseError(Box<MalformedInner>);

impl MalformedResponseError {
    pub(crate) fn new(command: &str, response: &str, reason: impl Into<String>) -> Self {
        MalformedResponseError(Box::new(MalformedInner {
            command: command.to_string(),
            response: response.to_string(),
            reason: reason.into(),
        }))
    }

    /// The command the reply was decoded for.
    pub fn command(&self) -> &str {
        &self.0.command
    }

    /// The raw reply text.
    pub fn response(&self) -> &str {
        &self.0.response
    }
}

impl_error_display! {
    MalformedResponseError,
    self => "malformed reply to '{}' ({}): {:?}", self.0.command, self.0.reason, self.0.response
}

#[derive(Debug, PartialEq, Eq, Hash)]
struct LengthInner {
    command: String,
    response: String,
    expected: Vec<usize>,
    found: usize,
}

/// A reply had a number of fields that matched none of the command's layouts.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct ResponseLengthMismatchError(Box<LengthInner>);

impl ResponseLengthMismatchError {
    pub(crate) fn new(command: &str, response: &str, expected: Vec<usize>, found: usize) -> Self {
        ResponseLengthMismatchError(Box::new(LengthInner {
            command: command.to_string(),
            response: response.to_string(),
            expected,
            found,
        }))
    }

    /// The command the reply was decoded for.
    pub fn command(&self) -> &str {
        &self.0.command
    }

    /// The raw reply text.
    pub fn response(&self) -> &str {
        &self.0.response
    }

    /// The field counts that would have been accepted, in the order tried.
    pub fn expected(&self) -> &[usize] {
        &self.0.expected
    }

    /// The number of fields in the reply.
    pub fn found(&self) -> usize {
        self.0.found
    }
}

impl_error_display! {
    ResponseLengthMismatchError,
    self => "reply to '{}' has {} fields, expected one of {:?}: {:?}",
        self.0.command, self.0.found, self.0.expected, self.0.response
}

#[derive(Debug, PartialEq, Eq, Hash)]
struct DeviceInner {
    command: String,
    axis: Option<String>,
    code: String,
}

/// The device answered a command with an error (`E`) reply.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct DeviceCommandError(Box<DeviceInner>);

impl DeviceCommandError {
    pub(crate) fn new(command: &str, axis: Option<String>, code: String) -> Self {
        DeviceCommandError(Box::new(DeviceInner {
            command: command.to_string(),
            axis,
            code,
        }))
    }

    /// The command the device rejected.
    pub fn command(&self) -> &str {
        &self.0.command
    }

    /// The axis reported by the device, if the error layout carries one.
    pub fn axis(&self) -> Option<&str> {
        self.0.axis.as_deref()
    }

    /// The device error code.
    pub fn code(&self) -> &str {
        &self.0.code
    }
}

impl std::error::Error for DeviceCommandError {}

impl std::fmt::Display for DeviceCommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0.axis {
            Some(axis) => write!(
                f,
                "device rejected '{}' on axis {} with error {}",
                self.0.command, axis, self.0.code
            ),
            None => write!(
                f,
                "device rejected '{}' with error {}",
                self.0.command, self.0.code
            ),
        }
    }
}

error_enum! {
    /// Errors raised by the command codec.
    #[derive(Debug, PartialEq, Eq, Hash)]
    #[non_exhaustive]
    pub enum CodecError {
        UnknownCommand(UnknownCommandError),
        MalformedResponse(MalformedResponseError),
        ResponseLengthMismatch(ResponseLengthMismatchError),
        DeviceCommand(DeviceCommandError),
    }
}
