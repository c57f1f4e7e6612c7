//! Segment lifecycle errors.

use std::fmt;
use std::io;

/// Errors surfaced by segment construction, opening, and removal.
///
/// OS failures keep the failing operation and the portable name alongside
/// the underlying error, so a diagnostic names everything needed to
/// reproduce the call.
#[derive(Debug)]
pub enum SegmentError {
    /// The name does not have the portable form.
    InvalidName { name: String, reason: &'static str },
    /// A creating mode was given a zero size.
    InvalidSize { name: String },
    /// `create` found the name already present.
    AlreadyExists { name: String },
    /// `open` found no object under the name.
    NotFound { name: String },
    /// The existing object is smaller than the requested size.
    SizeMismatch {
        name: String,
        requested: usize,
        actual: usize,
    },
    /// The object stayed zero-sized through the whole open retry window;
    /// its creator presumably died between creating and sizing it.
    SizeNeverSet { name: String, attempts: u32 },
    /// An OS call failed.
    Os {
        op: &'static str,
        name: String,
        source: io::Error,
    },
}

impl fmt::Display for SegmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentError::InvalidName { name, reason } => {
                write!(f, "invalid segment name {name:?}: {reason}")
            }
            SegmentError::InvalidSize { name } => {
                write!(f, "segment {name}: size must be > 0 to create")
            }
            SegmentError::AlreadyExists { name } => {
                write!(f, "segment {name} already exists")
            }
            SegmentError::NotFound { name } => {
                write!(f, "segment {name} does not exist")
            }
            SegmentError::SizeMismatch {
                name,
                requested,
                actual,
            } => {
                write!(
                    f,
                    "segment {name} holds {actual} bytes, {requested} requested"
                )
            }
            SegmentError::SizeNeverSet { name, attempts } => {
                write!(
                    f,
                    "segment {name} still zero-sized after {attempts} attempts"
                )
            }
            SegmentError::Os { op, name, source } => {
                write!(f, "segment {name}: {op} failed: {source}")
            }
        }
    }
}

impl std::error::Error for SegmentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SegmentError::Os { source, .. } => Some(source),
            _ => None,
        }
    }
}
