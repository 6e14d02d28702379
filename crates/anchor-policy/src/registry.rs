//! Per-agent policy versions.
//!
//! The store never owns policy: it asks a [`PolicySource`] for the current
//! compiled policy of an agent on every write. [`PolicyRegistry`] is the
//! in-process source. It keeps every version ever installed and supports
//! rolling back to an earlier one, which installs a copy of it as a new
//! version so that history only grows.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use anchor_core::{AgentId, Clock, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::compiled::CompiledPolicy;
use crate::config::PolicyConfig;
use crate::error::{PolicyError, PolicyResult};

/// Version number of an agent's policy. Starts at 1; 0 means "never set".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyVersion(pub u64);

impl PolicyVersion {
    /// The implicit permissive policy of an agent with no installed policy.
    pub const UNSET: Self = Self(0);

    /// The following version number.
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for PolicyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Supplies the policy currently in force for an agent.
pub trait PolicySource: Send + Sync + fmt::Debug {
    /// The active compiled policy for `agent_id`.
    ///
    /// Agents without a policy get [`CompiledPolicy::permissive`].
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read.
    fn current(&self, agent_id: &AgentId) -> PolicyResult<Arc<CompiledPolicy>>;
}

/// One installed policy version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRecord {
    /// Version number.
    pub version: PolicyVersion,
    /// Configuration as installed.
    pub config: PolicyConfig,
    /// When this version was installed.
    pub created_at: Timestamp,
    /// Set when this version was produced by rolling back to an older one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rolled_back_from: Option<PolicyVersion>,
}

#[derive(Debug, Default)]
struct AgentPolicies {
    history: Vec<PolicyRecord>,
    active: Option<Arc<CompiledPolicy>>,
}

impl AgentPolicies {
    fn current_version(&self) -> PolicyVersion {
        self.history
            .last()
            .map_or(PolicyVersion::UNSET, |record| record.version)
    }

    fn install(
        &mut self,
        compiled: CompiledPolicy,
        created_at: Timestamp,
        rolled_back_from: Option<PolicyVersion>,
    ) -> PolicyVersion {
        let version = self.current_version().next();
        self.history.push(PolicyRecord {
            version,
            config: compiled.config().clone(),
            created_at,
            rolled_back_from,
        });
        self.active = Some(Arc::new(compiled));
        version
    }
}

/// In-process, versioned policy store.
#[derive(Debug)]
pub struct PolicyRegistry {
    agents: RwLock<HashMap<AgentId, AgentPolicies>>,
    clock: Arc<dyn Clock>,
}

impl PolicyRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Validate and install a new policy version for an agent.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Validation`] if the policy is invalid. The
    /// active version is unchanged in that case.
    pub fn update(&self, agent_id: &AgentId, config: PolicyConfig) -> PolicyResult<PolicyVersion> {
        let compiled = CompiledPolicy::compile(config)?;
        let now = self.clock.now();

        let mut agents = self
            .agents
            .write()
            .map_err(|e| PolicyError::Registry(e.to_string()))?;
        let version = agents
            .entry(agent_id.clone())
            .or_default()
            .install(compiled, now, None);

        info!(agent_id = %agent_id, %version, "Policy updated");
        Ok(version)
    }

    /// The active version number, or [`PolicyVersion::UNSET`].
    ///
    /// # Errors
    ///
    /// Returns an error if the registry lock is poisoned.
    pub fn current_version(&self, agent_id: &AgentId) -> PolicyResult<PolicyVersion> {
        let agents = self
            .agents
            .read()
            .map_err(|e| PolicyError::Registry(e.to_string()))?;
        Ok(agents
            .get(agent_id)
            .map_or(PolicyVersion::UNSET, AgentPolicies::current_version))
    }

    /// Every version installed for an agent, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry lock is poisoned.
    pub fn versions(&self, agent_id: &AgentId) -> PolicyResult<Vec<PolicyRecord>> {
        let agents = self
            .agents
            .read()
            .map_err(|e| PolicyError::Registry(e.to_string()))?;
        Ok(agents
            .get(agent_id)
            .map(|policies| policies.history.clone())
            .unwrap_or_default())
    }

    /// A specific installed version.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::VersionNotFound`] if the version does not exist.
    pub fn get(&self, agent_id: &AgentId, version: PolicyVersion) -> PolicyResult<PolicyRecord> {
        let agents = self
            .agents
            .read()
            .map_err(|e| PolicyError::Registry(e.to_string()))?;
        agents
            .get(agent_id)
            .and_then(|policies| policies.history.iter().find(|r| r.version == version))
            .cloned()
            .ok_or_else(|| PolicyError::VersionNotFound {
                agent_id: agent_id.to_string(),
                version: version.0,
            })
    }

    /// Make an earlier version active again.
    ///
    /// The earlier configuration is installed as a new version; the history
    /// is never rewritten.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::VersionNotFound`] if `to` does not exist.
    pub fn rollback(&self, agent_id: &AgentId, to: PolicyVersion) -> PolicyResult<PolicyVersion> {
        let now = self.clock.now();
        let mut agents = self
            .agents
            .write()
            .map_err(|e| PolicyError::Registry(e.to_string()))?;

        let not_found = || PolicyError::VersionNotFound {
            agent_id: agent_id.to_string(),
            version: to.0,
        };
        let policies = agents.get_mut(agent_id).ok_or_else(not_found)?;
        let config = policies
            .history
            .iter()
            .find(|r| r.version == to)
            .map(|r| r.config.clone())
            .ok_or_else(not_found)?;

        let compiled = CompiledPolicy::compile(config)?;
        let version = policies.install(compiled, now, Some(to));

        info!(agent_id = %agent_id, from = %to, %version, "Policy rolled back");
        Ok(version)
    }
}

impl PolicySource for PolicyRegistry {
    fn current(&self, agent_id: &AgentId) -> PolicyResult<Arc<CompiledPolicy>> {
        let agents = self
            .agents
            .read()
            .map_err(|e| PolicyError::Registry(e.to_string()))?;
        Ok(agents
            .get(agent_id)
            .and_then(|policies| policies.active.clone())
            .unwrap_or_else(|| Arc::new(CompiledPolicy::permissive())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CustomPattern;
    use anchor_core::ManualClock;
    use chrono::{Duration, TimeZone, Utc};

    fn registry() -> (PolicyRegistry, ManualClock) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        (PolicyRegistry::new(Arc::new(clock.clone())), clock)
    }

    fn agent() -> AgentId {
        AgentId::new("agent_1").unwrap()
    }

    fn pii() -> PolicyConfig {
        PolicyConfig {
            block_pii: true,
            ..PolicyConfig::default()
        }
    }

    #[test]
    fn test_unknown_agent_is_permissive() {
        let (registry, _) = registry();
        assert_eq!(registry.current_version(&agent()).unwrap(), PolicyVersion::UNSET);
        assert!(registry.current(&agent()).unwrap().config().is_permissive());
        assert!(registry.versions(&agent()).unwrap().is_empty());
    }

    #[test]
    fn test_update_increments_version() {
        let (registry, clock) = registry();
        assert_eq!(registry.update(&agent(), pii()).unwrap(), PolicyVersion(1));
        clock.advance(Duration::minutes(5));
        assert_eq!(
            registry.update(&agent(), PolicyConfig::default()).unwrap(),
            PolicyVersion(2)
        );

        let versions = registry.versions(&agent()).unwrap();
        assert_eq!(versions.len(), 2);
        assert!(versions[0].config.block_pii);
        assert!(versions[1].created_at > versions[0].created_at);
        assert!(!registry.current(&agent()).unwrap().config().block_pii);
    }

    #[test]
    fn test_invalid_update_keeps_active_version() {
        let (registry, _) = registry();
        registry.update(&agent(), pii()).unwrap();

        let bad = PolicyConfig {
            custom_blocked_patterns: vec![CustomPattern::new("bad", "(")],
            ..PolicyConfig::default()
        };
        assert!(matches!(
            registry.update(&agent(), bad),
            Err(PolicyError::Validation { .. })
        ));
        assert_eq!(registry.current_version(&agent()).unwrap(), PolicyVersion(1));
        assert!(registry.current(&agent()).unwrap().config().block_pii);
    }

    #[test]
    fn test_rollback_appends_new_version() {
        let (registry, _) = registry();
        registry.update(&agent(), pii()).unwrap();
        registry.update(&agent(), PolicyConfig::default()).unwrap();

        let version = registry.rollback(&agent(), PolicyVersion(1)).unwrap();
        assert_eq!(version, PolicyVersion(3));
        assert!(registry.current(&agent()).unwrap().config().block_pii);

        let record = registry.get(&agent(), PolicyVersion(3)).unwrap();
        assert_eq!(record.rolled_back_from, Some(PolicyVersion(1)));
        assert_eq!(registry.versions(&agent()).unwrap().len(), 3);
    }

    #[test]
    fn test_rollback_to_missing_version() {
        let (registry, _) = registry();
        registry.update(&agent(), pii()).unwrap();
        assert!(matches!(
            registry.rollback(&agent(), PolicyVersion(7)),
            Err(PolicyError::VersionNotFound { version: 7, .. })
        ));
    }

    #[test]
    fn test_agents_are_independent() {
        let (registry, _) = registry();
        let other = AgentId::new("agent_2").unwrap();
        registry.update(&agent(), pii()).unwrap();
        assert!(registry.current(&other).unwrap().config().is_permissive());
    }

    #[test]
    fn test_version_display() {
        assert_eq!(PolicyVersion(3).to_string(), "v3");
    }
}
