//! Collaborators that own the live state of an environment, and the
//! compliance records produced when reconciling against them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::principal::{GroupId, JitGroupId};
use crate::errors::{JitError, Result};
use crate::policy::tree::{EnvironmentPolicy, JitGroupPolicy, JitGroupRef};

/// Backend that creates and maintains the groups backing JIT groups.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Groups currently provisioned for the environment. This reflects live
    /// state and may include groups that no longer have a policy.
    async fn provisioned_groups(&self) -> Result<Vec<JitGroupId>>;

    /// Id of the backend group that backs a JIT group.
    fn provisioned_group_id(&self, group: &JitGroupId) -> GroupId;

    /// Converge the group's live configuration toward its policy.
    async fn reconcile(&self, group: &JitGroupRef<'_>) -> Result<()>;
}

/// The raw policy document an environment was loaded from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDocument {
    pub environment: String,
    pub text: String,
}

#[async_trait]
pub trait PolicySource: Send + Sync {
    async fn load(&self) -> Result<PolicyDocument>;
}

/// A loaded environment: its policy tree plus the backends that own its
/// live state. Immutable, share it as `Arc<Environment>`.
pub struct Environment {
    policy: EnvironmentPolicy,
    provisioner: Arc<dyn Provisioner>,
    source: Option<Arc<dyn PolicySource>>,
}

impl Environment {
    pub fn new(policy: EnvironmentPolicy, provisioner: Arc<dyn Provisioner>) -> Self {
        Self {
            policy,
            provisioner,
            source: None,
        }
    }

    pub fn with_source(mut self, source: Arc<dyn PolicySource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn name(&self) -> &str {
        self.policy.name()
    }

    pub fn policy(&self) -> &EnvironmentPolicy {
        &self.policy
    }

    pub fn provisioner(&self) -> &dyn Provisioner {
        self.provisioner.as_ref()
    }

    pub fn source(&self) -> Option<&dyn PolicySource> {
        self.source.as_deref()
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("name", &self.name())
            .field("has_source", &self.source.is_some())
            .finish_non_exhaustive()
    }
}

/// Outcome of reconciling one provisioned group.
#[derive(Debug)]
pub struct JitGroupCompliance {
    pub group_id: JitGroupId,
    pub provisioned_group_id: GroupId,
    /// Policy of the group, `None` if the group is orphaned.
    pub policy: Option<Arc<JitGroupPolicy>>,
    pub error: Option<JitError>,
}

impl JitGroupCompliance {
    pub fn is_compliant(&self) -> bool {
        self.policy.is_some() && self.error.is_none()
    }

    /// The group is provisioned, but no policy declares it anymore.
    pub fn is_orphaned(&self) -> bool {
        self.policy.is_none() && self.error.is_none()
    }

    /// Any attached error makes the record errored, with or without a policy.
    pub fn is_errored(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplianceSummary {
    NothingToDo,
    Compliant(usize),
    NeedsAttention { orphaned: usize, errored: usize },
}

impl ComplianceSummary {
    pub fn of(records: &[JitGroupCompliance]) -> Self {
        if records.is_empty() {
            return ComplianceSummary::NothingToDo;
        }
        let orphaned = records.iter().filter(|r| r.is_orphaned()).count();
        let errored = records.iter().filter(|r| r.is_errored()).count();
        if orphaned + errored == 0 {
            ComplianceSummary::Compliant(records.len())
        } else {
            ComplianceSummary::NeedsAttention { orphaned, errored }
        }
    }
}

impl std::fmt::Display for ComplianceSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComplianceSummary::NothingToDo => f.write_str("no groups provisioned"),
            ComplianceSummary::Compliant(n) => write!(f, "{n} groups compliant"),
            ComplianceSummary::NeedsAttention { orphaned, errored } => write!(
                f,
                "{} groups need attention ({orphaned} orphaned, {errored} failed)",
                orphaned + errored
            ),
        }
    }
}
