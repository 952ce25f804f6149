//! Session endpoint address.

use serde::{Deserialize, Serialize};

/// Device id used for SMS recipients, which only ever have one device.
pub const DEFAULT_DEVICE_ID: u32 = 1;

/// A session endpoint: recipient number plus device index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    name: String,
    device_id: u32,
}

impl Address {
    /// Creates an address for a specific device.
    pub fn new(name: impl Into<String>, device_id: u32) -> Self {
        Address {
            name: name.into(),
            device_id,
        }
    }

    /// Creates an address on the default device.
    pub fn with_default_device(name: impl Into<String>) -> Self {
        Self::new(name, DEFAULT_DEVICE_ID)
    }

    /// Returns the recipient identifier.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the device index.
    pub fn device_id(&self) -> u32 {
        self.device_id
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.name, self.device_id)
    }
}
