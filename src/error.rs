//! Error taxonomy for the data-path pipeline.
//!
//! Every fallible operation in this crate returns [`PhobosError`]. The
//! variants mirror the kinds of the error design (protocol, allocation,
//! I/O, ...); no variant is swallowed internally, so a caller can always
//! recover `xfer.rc` from the error it was handed.

use std::fmt;

use crate::model::medium::MediumRef;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PhobosError>;

/// A single error produced by the data path.
///
/// `errno` is populated only at the I/O adapter boundary, where a medium
/// backend surfaces an OS-level failure; everything above that boundary
/// carries `None`.
#[derive(Debug, thiserror::Error)]
#[error("{kind}{}", errno_suffix(.errno))]
pub struct PhobosError {
    /// The taxonomy kind.
    pub kind: ErrorKind,
    /// `-errno` style payload from the adapter that raised this, if any.
    pub errno: Option<i32>,
}

fn errno_suffix(errno: &Option<i32>) -> String {
    match errno {
        Some(e) => format!(" (errno {e})"),
        None => String::new(),
    }
}

impl PhobosError {
    /// Build an error with no errno payload.
    pub fn new(kind: ErrorKind) -> Self {
        PhobosError { kind, errno: None }
    }

    /// Build an error carrying an adapter-level errno.
    pub fn with_errno(kind: ErrorKind, errno: i32) -> Self {
        PhobosError {
            kind,
            errno: Some(errno),
        }
    }

    /// True if this error is advisory (the client may retry) rather than
    /// fatal to the transfer.
    pub fn is_advisory(&self) -> bool {
        matches!(self.kind, ErrorKind::TryAgain)
    }
}

/// The taxonomy of §7: kinds, not type names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or unexpected LRS response (wrong kind, wrong media count).
    Protocol(String),
    /// The LRS peer returned an error response to an allocation request.
    AllocationRefused,
    /// A medium referenced by a transfer is not present in the layout, or
    /// the catalog and the transfer disagree about it.
    NoMedium(MediumRef),
    /// An I/O adapter open/read/write/close call failed.
    Io(String),
    /// Hash mismatch while reading an extent.
    Corrupted { extent_uuid: u128 },
    /// Locate found no host able to read every split of the object.
    UnreachableSplit,
    /// Locate's early-locking pass lost a race; the client may retry.
    TryAgain,
    /// The client supplied an invalid file descriptor before any I/O
    /// request was emitted.
    BadFd,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Protocol(msg) => write!(f, "protocol error: {msg}"),
            ErrorKind::AllocationRefused => write!(f, "allocation refused by LRS"),
            ErrorKind::NoMedium(medium) => write!(f, "medium not in layout: {medium:?}"),
            ErrorKind::Io(msg) => write!(f, "I/O error: {msg}"),
            ErrorKind::Corrupted { extent_uuid } => {
                write!(f, "corrupted extent {extent_uuid:#x}: hash mismatch")
            }
            ErrorKind::UnreachableSplit => write!(f, "unreachable split"),
            ErrorKind::TryAgain => write!(f, "try again"),
            ErrorKind::BadFd => write!(f, "bad file descriptor"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_again_is_advisory() {
        let err = PhobosError::new(ErrorKind::TryAgain);
        assert!(err.is_advisory());
    }

    #[test]
    fn io_error_is_not_advisory() {
        let err = PhobosError::with_errno(ErrorKind::Io("write failed".into()), 5);
        assert!(!err.is_advisory());
        assert_eq!(err.errno, Some(5));
    }
}
