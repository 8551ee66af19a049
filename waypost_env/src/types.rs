//! Common types for the Waypost environment abstraction.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier of a recognised physical anchor.
///
/// The recognition provider hands these out; a later sighting of the same
/// printed image after removal may reuse the identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AnchorId(pub Uuid);

impl AnchorId {
    /// Creates a new random AnchorId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an AnchorId from a UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Creates a deterministic AnchorId from a seed (for simulation).
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&seed.to_le_bytes());
        bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        Self(Uuid::from_bytes(bytes))
    }

    /// Returns the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for AnchorId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AnchorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // First 8 chars are plenty for logs
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_seed_is_deterministic() {
        assert_eq!(AnchorId::from_seed(7), AnchorId::from_seed(7));
        assert_ne!(AnchorId::from_seed(7), AnchorId::from_seed(8));
    }

    #[test]
    fn test_display_is_short() {
        let id = AnchorId::from_seed(1);
        assert_eq!(id.to_string().len(), 8);
    }
}
