use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::auth::principal::PrincipalId;
use crate::policy::errors::PolicyError;

bitflags! {
    /// Permissions that an ACL entry can allow or deny.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct PolicyPermission: u32 {
        /// See the policy and whether it's possible to join.
        const VIEW           = 0b00_0001;
        /// Join a JIT group, subject to constraints.
        const JOIN           = 0b00_0010;
        /// Approve other users' requests to join.
        const APPROVE_OTHERS = 0b00_0100;
        /// Join without requiring somebody else's approval.
        const APPROVE_SELF   = 0b00_1000;
        /// Retrieve the raw policy document.
        const EXPORT         = 0b01_0000;
        /// Drive provisioned groups into compliance with the policy.
        const RECONCILE      = 0b10_0000;
    }
}

impl PolicyPermission {
    /// Parse a comma-separated list like `"view, join"`.
    pub fn parse(s: &str) -> Result<Self, PolicyError> {
        s.split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .try_fold(PolicyPermission::empty(), |acc, name| {
                PolicyPermission::from_name(&name.to_uppercase())
                    .map(|p| acc | p)
                    .ok_or_else(|| PolicyError::InvalidPermission(name.to_string()))
            })
    }
}

impl fmt::Display for PolicyPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter_names().map(|(name, _)| name).collect();
        f.write_str(&names.join(", "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessControlEntry {
    pub principal: PrincipalId,
    pub effect: Effect,
    pub permissions: PolicyPermission,
}

impl AccessControlEntry {
    pub fn allow(principal: PrincipalId, permissions: PolicyPermission) -> Self {
        Self {
            principal,
            effect: Effect::Allow,
            permissions,
        }
    }

    pub fn deny(principal: PrincipalId, permissions: PolicyPermission) -> Self {
        Self {
            principal,
            effect: Effect::Deny,
            permissions,
        }
    }
}

/// Ordered allow/deny entries of a single policy.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AccessControlList {
    entries: Vec<AccessControlEntry>,
}

impl AccessControlList {
    pub fn new(entries: Vec<AccessControlEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[AccessControlEntry] {
        &self.entries
    }

    /// Decide a single permission for a set of principals using only this
    /// list's entries. A matching deny always wins over a matching allow.
    /// `None` means the list does not decide, and the caller should consult
    /// the parent policy.
    pub fn decide(
        &self,
        principals: &BTreeSet<&PrincipalId>,
        permission: PolicyPermission,
    ) -> Option<Effect> {
        let mut decision = None;
        for entry in self
            .entries
            .iter()
            .filter(|e| e.permissions.contains(permission))
            .filter(|e| principals.contains(&e.principal))
        {
            match entry.effect {
                Effect::Deny => return Some(Effect::Deny),
                Effect::Allow => decision = Some(Effect::Allow),
            }
        }
        decision
    }
}
