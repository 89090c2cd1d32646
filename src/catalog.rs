//! A subject's view of an environment.
//!
//! Every operation here is checked against the policy tree on behalf of the
//! subject the context was created for.

use tracing::{debug, info, warn};

use crate::auth::subject::Subject;
use crate::errors::{JitError, Result};
use crate::policy::acl::PolicyPermission;
use crate::policy::tree::{EnvironmentPolicy, JitGroupRef, SystemRef};
use crate::provisioning::{ComplianceSummary, Environment, JitGroupCompliance, PolicyDocument};

pub struct EnvironmentContext<'a> {
    environment: &'a Environment,
    subject: &'a Subject,
}

impl<'a> EnvironmentContext<'a> {
    pub fn new(environment: &'a Environment, subject: &'a Subject) -> Self {
        Self {
            environment,
            subject,
        }
    }

    pub fn policy(&self) -> &'a EnvironmentPolicy {
        self.environment.policy()
    }

    pub fn subject(&self) -> &'a Subject {
        self.subject
    }

    pub fn can_export(&self) -> bool {
        self.policy()
            .is_allowed(self.subject, PolicyPermission::EXPORT)
    }

    pub fn can_reconcile(&self) -> bool {
        self.policy()
            .is_allowed(self.subject, PolicyPermission::RECONCILE)
    }

    /// The document the environment was loaded from, `None` if the
    /// environment has no policy source.
    pub async fn export(&self) -> Result<Option<PolicyDocument>> {
        if !self.can_export() {
            return Err(self.denied(PolicyPermission::EXPORT));
        }
        match self.environment.source() {
            Some(source) => Ok(Some(source.load().await?)),
            None => Ok(None),
        }
    }

    /// Systems the subject is allowed to view.
    pub fn systems(&self) -> Vec<SystemContext<'a>> {
        self.policy()
            .systems()
            .filter(|system| system.is_allowed(self.subject, PolicyPermission::VIEW))
            .map(|system| SystemContext {
                system,
                subject: self.subject,
            })
            .collect()
    }

    /// Lookup a system by name. Systems the subject isn't allowed to view
    /// are reported as missing.
    pub fn system(&self, name: &str) -> Option<SystemContext<'a>> {
        self.policy()
            .system(name)
            .filter(|system| system.is_allowed(self.subject, PolicyPermission::VIEW))
            .map(|system| SystemContext {
                system,
                subject: self.subject,
            })
    }

    /// Reconcile all groups provisioned for the environment, one at a time.
    ///
    /// A failure to reconcile one group is recorded and doesn't stop the
    /// sweep. Only failing to list the provisioned groups fails the call.
    pub async fn reconcile(&self) -> Result<Vec<JitGroupCompliance>> {
        if !self.can_reconcile() {
            return Err(self.denied(PolicyPermission::RECONCILE));
        }

        let provisioner = self.environment.provisioner();
        let mut records = Vec::new();

        for group_id in provisioner.provisioned_groups().await? {
            let provisioned_group_id = provisioner.provisioned_group_id(&group_id);

            let record = match self.policy().group(&group_id) {
                None => {
                    warn!(group = %group_id, "Provisioned group has no policy");
                    JitGroupCompliance {
                        group_id,
                        provisioned_group_id,
                        policy: None,
                        error: None,
                    }
                }
                Some(group) => {
                    let error = provisioner.reconcile(&group).await.err();
                    match &error {
                        Some(e) => warn!(group = %group_id, error = %e, "Reconciling group failed"),
                        None => debug!(group = %group_id, "Reconciled group"),
                    }
                    JitGroupCompliance {
                        group_id,
                        provisioned_group_id,
                        policy: Some(group.policy().clone()),
                        error,
                    }
                }
            };
            records.push(record);
        }

        info!(
            environment = %self.environment.name(),
            user = %self.subject.user(),
            summary = %ComplianceSummary::of(&records),
            "Reconciliation finished"
        );
        Ok(records)
    }

    fn denied(&self, permission: PolicyPermission) -> JitError {
        JitError::AccessDenied(format!(
            "the user `{}` lacks the {} permission on environment `{}`",
            self.subject.user(),
            permission,
            self.environment.name()
        ))
    }
}

pub struct SystemContext<'a> {
    system: SystemRef<'a>,
    subject: &'a Subject,
}

impl<'a> SystemContext<'a> {
    pub fn policy(&self) -> SystemRef<'a> {
        self.system
    }

    /// Groups the subject is allowed to view.
    pub fn groups(&self) -> Vec<JitGroupRef<'a>> {
        self.system
            .groups()
            .filter(|group| group.is_allowed(self.subject, PolicyPermission::VIEW))
            .collect()
    }

    pub fn group(&self, name: &str) -> Option<JitGroupRef<'a>> {
        self.system
            .group(name)
            .filter(|group| group.is_allowed(self.subject, PolicyPermission::VIEW))
    }

    pub fn can_join(&self, group: &JitGroupRef<'_>) -> bool {
        group.is_allowed(self.subject, PolicyPermission::JOIN)
    }
}
