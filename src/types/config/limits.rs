//! Worker thread configuration

use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Number of runtime worker threads
///
/// Configured as a plain integer where `0` means one thread per CPU core.
/// The stored value is always the resolved, non-zero count.
///
/// # Examples
/// ```
/// use subnet_proxy::types::ThreadCount;
///
/// assert_eq!(ThreadCount::new(4).get(), 4);
/// assert!(ThreadCount::new(0).get() >= 1);
/// assert_eq!(ThreadCount::default().get(), 1);
/// ```
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadCount(NonZeroUsize);

impl ThreadCount {
    /// Single-threaded runtime
    pub const SINGLE: Self = Self(NonZeroUsize::MIN);

    /// Create a thread count, resolving `0` to the number of CPU cores
    #[must_use]
    pub fn new(value: usize) -> Self {
        match NonZeroUsize::new(value) {
            Some(nz) => Self(nz),
            None => Self::per_core(),
        }
    }

    /// One thread per available CPU core (1 if unknown)
    #[must_use]
    pub fn per_core() -> Self {
        Self(std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN))
    }

    #[must_use]
    #[inline]
    pub const fn get(&self) -> usize {
        self.0.get()
    }

    /// True when the runtime should run on the current thread only
    #[must_use]
    #[inline]
    pub const fn is_single(&self) -> bool {
        self.0.get() == 1
    }
}

impl Default for ThreadCount {
    fn default() -> Self {
        Self::SINGLE
    }
}

impl fmt::Display for ThreadCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

impl FromStr for ThreadCount {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s.trim().parse::<usize>()?))
    }
}

impl Serialize for ThreadCount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(self.get() as u64)
    }
}

impl<'de> Deserialize<'de> for ThreadCount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Self::new(usize::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_count() {
        let threads = ThreadCount::new(8);
        assert_eq!(threads.get(), 8);
        assert!(!threads.is_single());
    }

    #[test]
    fn test_zero_means_per_core() {
        assert_eq!(ThreadCount::new(0), ThreadCount::per_core());
        assert!(ThreadCount::new(0).get() >= 1);
    }

    #[test]
    fn test_default_single() {
        assert!(ThreadCount::default().is_single());
        assert_eq!(ThreadCount::default().to_string(), "1");
    }

    #[test]
    fn test_from_str() {
        assert_eq!("3".parse::<ThreadCount>().unwrap().get(), 3);
        assert_eq!("0".parse::<ThreadCount>().unwrap(), ThreadCount::per_core());
        assert!("many".parse::<ThreadCount>().is_err());
        assert!("-2".parse::<ThreadCount>().is_err());
    }
}
