//! Crate file versioning.
//!
//! History of format changes, newest first:
//!
//! - 0.9.0: TimeCode scalar and array values.
//! - 0.8.0: Payload list-ops and payloads with layer offsets.
//! - 0.7.0: Array element counts written as 64-bit integers.
//! - 0.6.0: Compressed floating point arrays (integral or lookup-table).
//! - 0.5.0: Compressed integer arrays; arrays no longer store a rank word.
//! - 0.4.0: Compressed structural sections.
//! - 0.3.0: Broken, never written.
//! - 0.2.0: Prepended and appended list-op items.
//! - 0.1.0: Fixed path header and spec record padding.
//! - 0.0.1: Initial release.

use std::fmt;
use std::str::FromStr;

use crate::util::{Error, Result};

/// A (major, minor, patch) crate format version.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl Version {
    /// The version this library writes and the newest it can read.
    pub const SOFTWARE: Version = Version::new(0, 9, 0);
    /// Default version for newly created files.
    pub const DEFAULT_NEW_FILE: Version = Version::new(0, 7, 0);

    pub const INITIAL: Version = Version::new(0, 0, 1);
    pub const PATH_HEADER_FIX: Version = Version::new(0, 1, 0);
    pub const LIST_OP_PREPEND_APPEND: Version = Version::new(0, 2, 0);
    pub const COMPRESSED_STRUCTURE: Version = Version::new(0, 4, 0);
    pub const COMPRESSED_INT_ARRAYS: Version = Version::new(0, 5, 0);
    pub const COMPRESSED_FLOAT_ARRAYS: Version = Version::new(0, 6, 0);
    pub const WIDE_ARRAY_COUNTS: Version = Version::new(0, 7, 0);
    pub const PAYLOAD_LAYER_OFFSETS: Version = Version::new(0, 8, 0);
    pub const TIME_CODE: Version = Version::new(0, 9, 0);

    /// Create a version from its components.
    #[inline]
    pub const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self { major, minor, patch }
    }

    /// Build from the 8 version bytes stored in the bootstrap.
    #[inline]
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        Self::new(bytes[0], bytes[1], bytes[2])
    }

    /// Bootstrap encoding: three version bytes, the rest zero.
    #[inline]
    pub const fn to_bytes(self) -> [u8; 8] {
        [self.major, self.minor, self.patch, 0, 0, 0, 0, 0]
    }

    /// A zero version is the "unset" value.
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.major != 0 || self.minor != 0 || self.patch != 0
    }

    /// True if software at this version can read a file at `file`.
    ///
    /// Patch level is ignored: patch changes are always forward compatible.
    #[inline]
    pub const fn can_read(self, file: Version) -> bool {
        self.major == file.major && self.minor >= file.minor
    }

    /// True if software at this version can write a file at `file`.
    #[inline]
    pub const fn can_write(self, file: Version) -> bool {
        self.major == file.major
            && (self.minor > file.minor || (self.minor == file.minor && self.patch >= file.patch))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = Error;

    /// Parse `"major.minor.patch"`; all three components are required.
    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.trim().split('.');
        let mut next = || -> Result<u8> {
            parts
                .next()
                .and_then(|p| p.parse::<u8>().ok())
                .ok_or_else(|| Error::other(format!("invalid version string '{}'", s)))
        };
        let version = Version::new(next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(Error::other(format!("invalid version string '{}'", s)));
        }
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_read_ignores_patch() {
        let sw = Version::new(0, 9, 0);
        assert!(sw.can_read(Version::new(0, 9, 7)));
        assert!(sw.can_read(Version::new(0, 4, 0)));
        assert!(!sw.can_read(Version::new(0, 10, 0)));
        assert!(!sw.can_read(Version::new(1, 0, 0)));
    }

    #[test]
    fn test_can_write() {
        let sw = Version::new(0, 9, 1);
        assert!(sw.can_write(Version::new(0, 7, 0)));
        assert!(sw.can_write(Version::new(0, 9, 1)));
        assert!(!sw.can_write(Version::new(0, 9, 2)));
        assert!(!sw.can_write(Version::new(1, 0, 0)));
    }

    #[test]
    fn test_parse_and_display() {
        let v: Version = "0.7.0".parse().expect("parse");
        assert_eq!(v, Version::new(0, 7, 0));
        assert_eq!(v.to_string(), "0.7.0");
        assert!("0.7".parse::<Version>().is_err());
        assert!("0.7.0.1".parse::<Version>().is_err());
        assert!("a.b.c".parse::<Version>().is_err());
    }

    #[test]
    fn test_ordering_and_bytes() {
        assert!(Version::new(0, 4, 0) < Version::new(0, 5, 0));
        assert!(Version::new(0, 0, 1) < Version::new(0, 1, 0));
        let v = Version::new(0, 8, 0);
        assert_eq!(Version::from_bytes(v.to_bytes()), v);
        assert_eq!(v.to_bytes()[3..], [0u8; 5]);
        assert!(!Version::default().is_valid());
    }
}
