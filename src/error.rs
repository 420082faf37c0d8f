//! Error types.
//!
//! Each error is represented by a unique type that implements [`std::error::Error`].
//! However, most APIs return more than one kind of error and so will return one
//! of the higher level [enums](#enums), such as [`CodecError`],
//! [`ValidationError`], or [`Error`]. The error types are convertible to the
//! higher level enums, allowing them to be used with `?`:
//!
//! ```
//! use kzproto::error::{CodecError, Error};
//!
//! fn foo() -> Result<(), CodecError> {
//!     // ...
//! # unimplemented!();
//! }
//!
//! fn bar() -> Result<(), Error> {
//!     foo()?;
//!     // ...
//! # Ok(())
//! }
//! ```
//!
//! Going the other way, [`TryFrom`] recovers the specific error:
//!
//! ```
//! # use kzproto::error::{DeviceCommandError, Error};
//! # fn wrapper(error: Error) {
//! if let Ok(err) = DeviceCommandError::try_from(error) {
//!     println!("device rejected {} with code {}", err.command(), err.code());
//! }
//! # }
//! ```

/// Implement Error and Display traits for the specified type.
///
/// After the type define the format string and any arguments it should
/// reference after `self =>` (to abide by macro hygiene rules).
macro_rules! impl_error_display {
    (
        $name:path,
        $self:ident =>
        $display:literal
        $(,
            $($arg:expr),+
        )?
    ) => {
        impl std::error::Error for $name {}

        impl std::fmt::Display for $name {
            fn fmt(&$self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(
                    f,
                    $display
                    $(,
                        $($arg),+
                    )?
                )
            }
        }
    };
}

/// Define error enums that contain concrete error types (not other error enums).
///
/// From and TryFrom traits will be implemented for the enum and it's underlying
/// errors. The enum's Display implementation will defer to the underlying errors'
/// Display implementations.
///
/// Simple implementations of From and TryFrom with other error enums can be
/// added by appending a succinct impl block, which assumes that:
///   * it is being implemented for this error enum,
///   * each variant has a single tuple value, and can be converted to the value
///     in this enum with its own From implementation.
///
/// ```compile_fail
/// # // This fails to compile because the macro is not exported.
/// error_enum!{
///     // This defines the enum and From/TryFrom between ThisError and A and B.
///     #[non_exhaustive]
///     pub enum ThisError {
///         VariantA(A),
///         VariantB(B),
///         // ...
///     }
///
///     // This implements a simple From/TryFrom between ThisError and OtherType.
///     impl From<OtherType> {
///         FromVariantA => VariantA,
///         // ...
///     }
/// }
/// ```
macro_rules! error_enum {
    (
        $(#[$attr:meta])*
        pub enum $name:ident {
            $(
                $variant:ident($inner:path)
            ),+
            $(,)?
        }
        // Additional information for From/TryFrom impl blocks.
        $(
            impl From<$from_t:ident>
            {
                $($from_variant:ident => $to_variant:ident),+
                $(,)?
            }
        )*
    ) => {
        // Define the error enum itself
        $(
            #[$attr]
        )*
        #[allow(missing_docs)]
        pub enum $name {
            $(
                $variant($inner)
            ),+
        }

        impl std::error::Error for $name {}

        // Defer the display to the inner error type
        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(
                        $name::$variant(e) => e.fmt(f)
                    ),+
                }
            }
        }

        // Conversions with underlying errors
        $(
            impl From<$inner> for $name {
                fn from(other: $inner) -> Self {
                    $name::$variant(other)
                }
            }

            impl TryFrom<$name> for $inner {
                type Error = $name;
                fn try_from(other: $name) -> Result<Self, Self::Error> {
                    match other {
                        $name::$variant(value) => Ok(value),
                        #[allow(unreachable_patterns)]
                        value => Err(value)
                    }
                }
            }
        )+

        // Conversions from other enum errors
        $(
            impl From<$from_t> for $name {
                fn from(other: $from_t) -> Self {
                    match other {
                        $($from_t::$from_variant(e) => $name::$to_variant(From::from(e))),+
                    }
                }
            }

            impl TryFrom<$name> for $from_t {
                type Error = $name;
                fn try_from(other: $name) -> Result<Self, Self::Error> {
                    match other {
                        $(
                            $name::$to_variant(e) => Ok($from_t::$from_variant(From::from(e)))
                        ),+
                        ,
                        _ => Err(other)
                    }
                }
            }
        )*
    };
}

mod codec;
pub use codec::*;

mod validation;
pub use validation::*;

mod all;
pub use all::*;

/// The specified device is either disconnected or already in use by another process.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct SerialDeviceInUseOrDisconnectedError(Box<str>);

impl_error_display! {
    SerialDeviceInUseOrDisconnectedError,
    self =>
    "the specified device is either disconnected or already in use by another process: {}", self.0
}

/// The device configuration is malformed or inconsistent.
///
/// Every problem found while validating the configuration is reported, not
/// just the first.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct ConfigError(Box<[String]>);

impl ConfigError {
    pub(crate) fn new<I, S>(problems: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ConfigError(problems.into_iter().map(Into::into).collect())
    }

    /// The individual problems with the configuration.
    pub fn problems(&self) -> &[String] {
        &self.0
    }
}

impl_error_display! {
    ConfigError,
    self => "invalid device configuration: {}", self.0.join("; ")
}

/// No transport candidate answered `identify` with the expected device name.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct DeviceNotFoundError(Box<(String, Vec<String>)>);

impl DeviceNotFoundError {
    pub(crate) fn new(device: &str, tried: Vec<String>) -> Self {
        DeviceNotFoundError(Box::new((device.to_string(), tried)))
    }

    /// The device name that was expected.
    pub fn device(&self) -> &str {
        &self.0 .0
    }

    /// The transport candidates that were probed, in order.
    pub fn tried(&self) -> &[String] {
        &self.0 .1
    }
}

impl_error_display! {
    DeviceNotFoundError,
    self => "could not connect to device '{}' (tried: [{}])", self.0.0, self.0.1.join(", ")
}

/// An exchange was attempted on a transport that was never opened or has been closed.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct TransportNotOpenError(Box<str>);

impl TransportNotOpenError {
    pub(crate) fn new(name: &str) -> Self {
        TransportNotOpenError(name.into())
    }

    /// The name of the transport.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl_error_display! {
    TransportNotOpenError,
    self => "transport '{}' is not open", self.0
}

/// An axis did not become idle before the deadline or poll budget ran out.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct IdleTimeoutError {
    axis: u32,
    polls: u32,
    elapsed: std::time::Duration,
}

impl IdleTimeoutError {
    pub(crate) fn new(axis: u32, polls: u32, elapsed: std::time::Duration) -> Self {
        IdleTimeoutError {
            axis,
            polls,
            elapsed,
        }
    }

    /// The axis that was being waited on.
    pub fn axis(&self) -> u32 {
        self.axis
    }

    /// The number of status polls performed.
    pub fn polls(&self) -> u32 {
        self.polls
    }
}

impl_error_display! {
    IdleTimeoutError,
    self => "axis {} still busy after {} polls ({:?})", self.axis, self.polls, self.elapsed
}

/// A wait was cancelled through its cancellation token.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct CancelledError(u32);

impl CancelledError {
    pub(crate) fn new(axis: u32) -> Self {
        CancelledError(axis)
    }

    /// The axis that was being waited on.
    pub fn axis(&self) -> u32 {
        self.0
    }
}

impl_error_display! {
    CancelledError,
    self => "wait for axis {} to become idle was cancelled", self.0
}
