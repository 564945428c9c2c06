//! Configuration-related type-safe wrappers
//!
//! Values that would be meaningless as zero wrap `NonZero` integers so invalid
//! settings are rejected while the configuration is being parsed.

pub mod duration;
mod limits;
mod network;

pub use duration::duration_serde;
pub use limits::ThreadCount;
pub use network::Port;
