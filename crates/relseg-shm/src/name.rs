//! Portable segment names.

use std::fmt;

use crate::error::SegmentError;

/// A validated, portable segment name.
///
/// The portable form is the same on every platform: non-empty, a single
/// leading `/`, at least one character after it, no further `/`, and no NUL
/// bytes (UTF-8 holds by construction from `&str`). How the name maps onto
/// the native namespace — a POSIX shm object, a `Local\` section — is an
/// internal concern of the segment layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SegmentName(String);

impl SegmentName {
    /// Validate `name` into a portable segment name.
    pub fn new(name: &str) -> Result<Self, SegmentError> {
        let reason = if name.is_empty() {
            Some("name is empty")
        } else if !name.starts_with('/') {
            Some("name must start with '/'")
        } else if name.len() < 2 {
            Some("name needs at least one character after '/'")
        } else if name[1..].contains('/') {
            Some("only the leading '/' is allowed")
        } else if name.contains('\0') {
            Some("name must not contain NUL")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(SegmentError::InvalidName {
                name: name.to_owned(),
                reason,
            }),
            None => Ok(Self(name.to_owned())),
        }
    }

    /// The portable form, leading `/` included.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The name without its leading `/`; the part the section namespace
    /// mangles.
    #[cfg(windows)]
    #[inline]
    pub(crate) fn stem(&self) -> &str {
        &self.0[1..]
    }
}

impl fmt::Display for SegmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for SegmentName {
    type Error = SegmentError;

    fn try_from(name: &str) -> Result<Self, Self::Error> {
        Self::new(name)
    }
}
