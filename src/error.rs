//! Error types.
//!
//! Each error is represented by a unique type that implements [`std::error::Error`].
//! Every fallible operation in the library returns the higher level [`Error`]
//! enum, which each concrete error converts into, allowing them to be used
//! with `?`:
//!
//! ```
//! use newmark::error::{Error, ReadTimeoutError};
//!
//! fn foo() -> Result<(), ReadTimeoutError> {
//!     // ...
//! # unimplemented!();
//! }
//!
//! fn bar() -> Result<(), Error> {
//!     foo()?;
//!     // ...
//! # Ok(())
//! # }
//! ```
//!
//! Every error also maps onto a numeric [`ErrorCode`], which is what the
//! [last error](crate::diagnostics::LastError) record stores alongside the
//! formatted message.

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
/// Simple implementations of From with other error enums can be added by
/// appending a succinct impl block, which assumes that:
///   * it is being implemented for this error enum,
///   * each variant has a single tuple value, and can be converted to the value
///     in this enum with its own From implementation.
macro_rules! error_enum {
    (
        $(#[$attr:meta])*
        pub enum $name:ident {
            $(
                $variant:ident($inner:path)
            ),+
            $(,)?
        }
        $(
            impl From<$from_t:ident>
            {
                $($from_variant:ident => $to_variant:ident),+
                $(,)?
            }
        )*
    ) => {
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
                        $name::$variant(e) => std::fmt::Display::fmt(e, f)
                    ),+
                }
            }
        }

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

        $(
            impl From<$from_t> for $name {
                fn from(other: $from_t) -> Self {
                    match other {
                        $($from_t::$from_variant(e) => $name::$to_variant(From::from(e))),+
                    }
                }
            }
        )*
    };
}

/// The specified device is either disconnected or already in use by another process.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct SerialDeviceInUseOrDisconnectedError(Box<str>);

impl_error_display! {
    SerialDeviceInUseOrDisconnectedError,
    self =>
    "the specified device is either disconnected or already in use by another process: {}", self.0
}

/// The lock guarding a connection was poisoned by a panic in another caller.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct LockPoisonedError;

impl_error_display! {
    LockPoisonedError,
    self => "the connection lock was poisoned by a panicking caller"
}

/// The lock guarding a connection is already held and cannot be acquired
/// without blocking.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct LockUnavailableError;

impl_error_display! {
    LockUnavailableError,
    self => "the connection lock is already held"
}

error_enum! {
    /// Acquiring the lock of a shared connection failed.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    #[non_exhaustive]
    pub enum LockError {
        Poisoned(LockPoisonedError),
        Unavailable(LockUnavailableError),
    }
}

/// An argument was rejected before any communication took place.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct InvalidArgumentError {
    /// What the value was for.
    what: &'static str,
    /// The rejected value.
    value: f64,
}

impl InvalidArgumentError {
    /// Create an instance of the error.
    pub(crate) fn new(what: &'static str, value: f64) -> Self {
        InvalidArgumentError { what, value }
    }

    /// Get the rejected value.
    pub fn value(&self) -> f64 {
        self.value
    }
}

impl_error_display! {
    InvalidArgumentError,
    self => "invalid {}: {}", self.what, self.value
}

/// A reply did not end in a prompt before the read budget was exhausted.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct ReadTimeoutError {
    /// The number of empty reads that were allowed.
    budget: u32,
    /// The bytes received before giving up.
    received: Box<[u8]>,
}

impl ReadTimeoutError {
    /// Create an instance of the error.
    pub(crate) fn new<R: AsRef<[u8]>>(budget: u32, received: R) -> Self {
        ReadTimeoutError {
            budget,
            received: Box::from(received.as_ref()),
        }
    }

    /// Get the number of empty reads that were allowed.
    pub fn budget(&self) -> u32 {
        self.budget
    }

    /// Get the bytes received before the read timed out.
    pub fn as_bytes(&self) -> &[u8] {
        &self.received
    }
}

impl_error_display! {
    ReadTimeoutError,
    self => "timed out waiting for the prompt after {} empty reads (received {:?})",
    self.budget,
    String::from_utf8_lossy(&self.received)
}

/// A reply did not match the grammar expected for the command.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct UnexpectedReplyError(Box<str>);

impl UnexpectedReplyError {
    /// Create an instance of the error.
    pub(crate) fn new<S: AsRef<str>>(reply: S) -> Self {
        UnexpectedReplyError(Box::from(reply.as_ref()))
    }

    /// Get the literal text of the reply.
    pub fn reply(&self) -> &str {
        &self.0
    }
}

impl_error_display! {
    UnexpectedReplyError,
    self => "unexpected reply: {:?}", &*self.0
}

/// The controller still reported an error code after it was asked to reset it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ErrorNotClearedError(i64);

impl ErrorNotClearedError {
    /// Create an instance of the error.
    pub(crate) fn new(code: i64) -> Self {
        ErrorNotClearedError(code)
    }

    /// Get the residual error code.
    pub fn code(&self) -> i64 {
        self.0
    }
}

impl_error_display! {
    ErrorNotClearedError,
    self => "controller error code is {} after reset", self.0
}

/// The controller reported a hardware error while moving.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ControllerFaultError(i64);

impl ControllerFaultError {
    /// Create an instance of the error.
    pub(crate) fn new(code: i64) -> Self {
        ControllerFaultError(code)
    }

    /// Get the error code reported by the controller.
    pub fn code(&self) -> i64 {
        self.0
    }
}

impl_error_display! {
    ControllerFaultError,
    self => "controller reported error code {}", self.0
}

/// The stage stopped moving before it reached the target.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct MoveStalledError {
    /// The target of the move.
    target: f64,
    /// The position the stage stopped at.
    position: f64,
    /// The number of polls performed.
    polls: u32,
}

impl MoveStalledError {
    /// Create an instance of the error.
    pub(crate) fn new(target: f64, position: f64, polls: u32) -> Self {
        MoveStalledError {
            target,
            position,
            polls,
        }
    }

    /// Get the target of the move.
    pub fn target(&self) -> f64 {
        self.target
    }

    /// Get the last position reported before giving up.
    pub fn position(&self) -> f64 {
        self.position
    }

    /// Get the number of position polls performed.
    pub fn polls(&self) -> u32 {
        self.polls
    }
}

impl_error_display! {
    MoveStalledError,
    self => "move to {:.6} timed out: position stuck at {:.6} after {} polls",
    self.target,
    self.position,
    self.polls
}

/// Text was too long to be escaped for display.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct EscapeOverflowError {
    /// The length of the rejected text, in bytes.
    len: usize,
    /// The maximum length accepted.
    limit: usize,
}

impl EscapeOverflowError {
    /// Create an instance of the error.
    pub(crate) fn new(len: usize, limit: usize) -> Self {
        EscapeOverflowError { len, limit }
    }

    /// Get the length of the rejected text, in bytes.
    pub fn text_len(&self) -> usize {
        self.len
    }
}

impl_error_display! {
    EscapeOverflowError,
    self => "text of {} bytes exceeds the {} byte display limit", self.len, self.limit
}

error_enum! {
    /// Any error returned by this library.
    #[derive(Debug)]
    #[non_exhaustive]
    pub enum Error {
        InvalidArgument(InvalidArgumentError),
        SerialDeviceInUseOrDisconnected(SerialDeviceInUseOrDisconnectedError),
        Io(std::io::Error),
        LockPoisoned(LockPoisonedError),
        LockUnavailable(LockUnavailableError),
        ReadTimeout(ReadTimeoutError),
        UnexpectedReply(UnexpectedReplyError),
        ErrorNotCleared(ErrorNotClearedError),
        ControllerFault(ControllerFaultError),
        MoveStalled(MoveStalledError),
    }

    impl From<LockError> {
        Poisoned => LockPoisoned,
        Unavailable => LockUnavailable,
    }
}

/// The numeric code recorded for each class of failure.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(i32)]
pub enum ErrorCode {
    /// An argument was out of range or otherwise invalid.
    InvalidArgument = 1,
    /// The connection or its lock failed.
    Transport = 2,
    /// A reply did not arrive in time.
    ReadTimeout = 3,
    /// A reply did not match the expected grammar.
    UnexpectedReply = 4,
    /// The controller's error code could not be reset.
    ErrorNotCleared = 5,
    /// The controller reported a hardware error.
    ControllerFault = 6,
    /// The stage stopped moving before reaching its target.
    MoveStalled = 7,
}

impl ErrorCode {
    /// Get the raw numeric value of the code.
    pub fn value(self) -> i32 {
        self as i32
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value())
    }
}

impl Error {
    /// Get the numeric code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Error::SerialDeviceInUseOrDisconnected(_)
            | Error::Io(_)
            | Error::LockPoisoned(_)
            | Error::LockUnavailable(_) => ErrorCode::Transport,
            Error::ReadTimeout(_) => ErrorCode::ReadTimeout,
            Error::UnexpectedReply(_) => ErrorCode::UnexpectedReply,
            Error::ErrorNotCleared(_) => ErrorCode::ErrorNotCleared,
            Error::ControllerFault(_) => ErrorCode::ControllerFault,
            Error::MoveStalled(_) => ErrorCode::MoveStalled,
        }
    }

    /// A convenience function for determining if the error is due to a reply
    /// timing out.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::ReadTimeout(_))
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
