//! Error taxonomy for scheduler operations
//!
//! Programmer errors (bad handles, illegal state transitions) surface as
//! [`Error`] values from the fallible operations. The control-loop driver
//! is expected to capture the diagnostic, neutralize outputs, and resume
//! on its next tick. Expected conditions - resource conflicts, duplicate
//! start requests - never surface here; the scheduler drops those
//! requests silently.

use core::fmt;

/// Error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErrorKind {
    /// A handle did not resolve to a live slot, or an argument referenced
    /// the wrong object
    InvalidArgument,
    /// A numeric argument was outside its legal range
    OutOfRange,
    /// The operation is illegal in the object's current state
    InvalidOperation,
    /// A group operation was applied to a non-group command, or a leaf
    /// accessor to a group
    TypeMismatch,
    /// A bounded arena, set, or queue is full
    Capacity,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::InvalidArgument => write!(f, "invalid argument"),
            ErrorKind::OutOfRange => write!(f, "argument out of range"),
            ErrorKind::InvalidOperation => write!(f, "invalid operation"),
            ErrorKind::TypeMismatch => write!(f, "object type mismatch"),
            ErrorKind::Capacity => write!(f, "capacity exceeded"),
        }
    }
}

/// Captured diagnostic for a failed operation
///
/// Carries the classification, the operation that raised it, and an
/// optional static detail message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Error {
    /// Error classification
    pub kind: ErrorKind,
    /// Operation that raised the error
    pub op: &'static str,
    /// Optional detail message
    pub msg: Option<&'static str>,
}

impl Error {
    pub(crate) const fn new(kind: ErrorKind, op: &'static str) -> Self {
        Self {
            kind,
            op,
            msg: None,
        }
    }

    pub(crate) const fn with_msg(kind: ErrorKind, op: &'static str, msg: &'static str) -> Self {
        Self {
            kind,
            op,
            msg: Some(msg),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.msg {
            Some(msg) => write!(f, "{}: {} ({})", self.op, self.kind, msg),
            None => write!(f, "{}: {}", self.op, self.kind),
        }
    }
}

/// Crate-wide result alias
pub type Result<T> = core::result::Result<T, Error>;
