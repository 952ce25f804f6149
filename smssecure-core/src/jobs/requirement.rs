//! Job requirements.
//!
//! A requirement is a named predicate over the process-wide
//! [`JobEnvironment`]. The scheduler evaluates it every time it looks at a
//! held job, so a job becomes runnable as soon as the environment changes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

/// Process-wide conditions jobs can wait on.
#[derive(Default)]
pub struct JobEnvironment {
    network: AtomicBool,
    service: AtomicBool,
    master_secret: RwLock<Option<[u8; 32]>>,
    changed: Notify,
}

impl std::fmt::Debug for JobEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobEnvironment")
            .field("network", &self.is_network_available())
            .field("service", &self.is_service_available())
            .field("master_secret", &self.has_master_secret())
            .finish()
    }
}

impl JobEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Environment with network, SMS service and master secret all present.
    pub fn ready() -> Self {
        let env = Self::new();
        env.set_network_available(true);
        env.set_service_available(true);
        env.set_master_secret(Some([0u8; 32]));
        env
    }

    pub fn set_network_available(&self, available: bool) {
        self.network.store(available, Ordering::SeqCst);
        self.changed.notify_waiters();
    }

    pub fn set_service_available(&self, available: bool) {
        self.service.store(available, Ordering::SeqCst);
        self.changed.notify_waiters();
    }

    /// Caches the unlocked master secret, or forgets it on lock.
    pub fn set_master_secret(&self, secret: Option<[u8; 32]>) {
        if let Ok(mut guard) = self.master_secret.write() {
            if let Some(old) = guard.as_mut() {
                zeroize::Zeroize::zeroize(old);
            }
            *guard = secret;
        }
        self.changed.notify_waiters();
    }

    pub fn is_network_available(&self) -> bool {
        self.network.load(Ordering::SeqCst)
    }

    pub fn is_service_available(&self) -> bool {
        self.service.load(Ordering::SeqCst)
    }

    pub fn has_master_secret(&self) -> bool {
        self.master_secret
            .read()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    /// Resolves when any condition changes.
    pub async fn changed(&self) {
        self.changed.notified().await
    }
}

type Predicate = Arc<dyn Fn(&JobEnvironment) -> bool + Send + Sync>;

/// A named condition a job waits on.
#[derive(Clone)]
pub struct Requirement {
    name: String,
    predicate: Predicate,
}

impl std::fmt::Debug for Requirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Requirement").field(&self.name).finish()
    }
}

impl Requirement {
    pub fn new<F>(name: &str, predicate: F) -> Self
    where
        F: Fn(&JobEnvironment) -> bool + Send + Sync + 'static,
    {
        Requirement {
            name: name.to_string(),
            predicate: Arc::new(predicate),
        }
    }

    /// Network connectivity.
    pub fn network() -> Self {
        Self::new("network", JobEnvironment::is_network_available)
    }

    /// SMS service (radio) availability.
    pub fn service() -> Self {
        Self::new("service", JobEnvironment::is_service_available)
    }

    /// Unlocked master secret.
    pub fn master_secret() -> Self {
        Self::new("master_secret", JobEnvironment::has_master_secret)
    }

    /// Met when any of `requirements` is met.
    pub fn any_of(name: &str, requirements: Vec<Requirement>) -> Self {
        Self::new(name, move |env| requirements.iter().any(|r| r.is_met(env)))
    }

    /// Delivery can go over the network or over SMS.
    pub fn network_or_service() -> Self {
        Self::any_of(
            "network_or_service",
            vec![Self::network(), Self::service()],
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_met(&self, env: &JobEnvironment) -> bool {
        (self.predicate)(env)
    }
}

/// Serializable names for the built-in requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequirementKind {
    Network,
    Service,
    MasterSecret,
    NetworkOrService,
}

impl RequirementKind {
    pub fn requirement(&self) -> Requirement {
        match self {
            RequirementKind::Network => Requirement::network(),
            RequirementKind::Service => Requirement::service(),
            RequirementKind::MasterSecret => Requirement::master_secret(),
            RequirementKind::NetworkOrService => Requirement::network_or_service(),
        }
    }
}

impl From<RequirementKind> for Requirement {
    fn from(kind: RequirementKind) -> Self {
        kind.requirement()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_or_service_needs_one() {
        let env = JobEnvironment::new();
        let requirement = Requirement::network_or_service();
        assert!(!requirement.is_met(&env));

        env.set_service_available(true);
        assert!(requirement.is_met(&env));

        env.set_service_available(false);
        env.set_network_available(true);
        assert!(requirement.is_met(&env));
    }

    #[test]
    fn test_master_secret_tracks_lock_state() {
        let env = JobEnvironment::new();
        let requirement = RequirementKind::MasterSecret.requirement();
        assert!(!requirement.is_met(&env));
        env.set_master_secret(Some([1u8; 32]));
        assert!(requirement.is_met(&env));
        env.set_master_secret(None);
        assert!(!requirement.is_met(&env));
    }

    #[test]
    fn test_custom_requirement() {
        let env = JobEnvironment::ready();
        let never = Requirement::new("never", |_| false);
        assert_eq!(never.name(), "never");
        assert!(!never.is_met(&env));
        assert!(Requirement::any_of("either", vec![never, Requirement::network()]).is_met(&env));
    }
}
