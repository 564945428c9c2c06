//! Core types shared across the proxy
//!
//! Validated configuration values and per-connection identifiers.

pub mod config;
pub mod validated;

pub use config::{Port, ThreadCount, duration_serde};
pub use validated::{ConfigPath, HostName, ValidationError};

use uuid::Uuid;

/// Unique identifier for client connections
///
/// Tags every log line of one SOCKS session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(Uuid);

impl ClientId {
    /// Generate a new unique client ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_unique() {
        assert_ne!(ClientId::new(), ClientId::new());
        assert_ne!(ClientId::default(), ClientId::default());
    }

    #[test]
    fn test_client_id_is_v4_uuid() {
        let id = ClientId::new();
        assert_eq!(id.as_uuid().get_version(), Some(uuid::Version::Random));
    }

    #[test]
    fn test_client_id_display() {
        let display = ClientId::new().to_string();
        // 8-4-4-4-12 hex characters
        assert_eq!(display.len(), 36);
        assert_eq!(display.chars().filter(|&c| c == '-').count(), 4);
    }
}
