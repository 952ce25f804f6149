//! Push service configuration.

use serde::{Deserialize, Serialize};

use super::PushError;

/// Certificates the push connection is pinned to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustStore {
    /// PEM-encoded certificates.
    #[serde(default)]
    pub pinned_certificates: Vec<String>,
}

/// Account credentials on the push service.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushCredentials {
    pub number: String,
    pub password: String,
}

impl std::fmt::Debug for PushCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushCredentials")
            .field("number", &self.number)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Everything needed to build a push sender.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushServiceConfig {
    /// Service base URL.
    pub server_url: String,
    #[serde(default)]
    pub trust_store: TrustStore,
    #[serde(default)]
    pub credentials: PushCredentials,
}

impl PushServiceConfig {
    pub fn new(server_url: &str, number: &str, password: &str) -> Self {
        PushServiceConfig {
            server_url: server_url.to_string(),
            trust_store: TrustStore::default(),
            credentials: PushCredentials {
                number: number.to_string(),
                password: password.to_string(),
            },
        }
    }

    /// Checks the URL scheme and that credentials are present.
    pub fn validate(&self) -> Result<(), PushError> {
        if !(self.server_url.starts_with("https://") || self.server_url.starts_with("http://")) {
            return Err(PushError::InvalidConfig(format!(
                "server url must be http(s): {:?}",
                self.server_url
            )));
        }
        if self.credentials.number.is_empty() || self.credentials.password.is_empty() {
            return Err(PushError::InvalidConfig(
                "credentials are incomplete".to_string(),
            ));
        }
        Ok(())
    }
}
