use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;

use crate::auth::principal::{EndUserId, GroupId, JitGroupId};
use crate::errors::Result;

/// Opaque identifier of a single group membership.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MembershipId(pub String);

impl fmt::Display for MembershipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A direct membership of a user, as returned by a membership listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipRelation {
    pub group: GroupId,
    pub membership: MembershipId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipRole {
    /// e.g. "MEMBER"
    pub name: String,
    pub expiry: Option<DateTime<Utc>>,
}

/// Full membership details, including role expiries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Membership {
    pub roles: Vec<MembershipRole>,
}

impl Membership {
    /// Earliest expiry among all roles, if any role expires.
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.roles.iter().filter_map(|r| r.expiry).min()
    }
}

/// Client for the directory's group backend.
#[async_trait]
pub trait GroupsClient: Send + Sync {
    /// List the user's direct group memberships.
    ///
    /// Fails with `JitError::NotFound` if the user does not exist. A user
    /// that exists but has no memberships yields an empty list.
    async fn list_memberships_by_user(&self, user: &EndUserId) -> Result<Vec<MembershipRelation>>;

    /// Fetch membership details. Fails with `JitError::NotFound` if the
    /// membership no longer exists.
    async fn get_membership(&self, id: &MembershipId) -> Result<Membership>;
}

/// Naming convention that maps JIT groups to directory groups:
/// `jit.<environment>.<system>.<name>@<domain>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMapping {
    domain: String,
}

impl GroupMapping {
    const PREFIX: &'static str = "jit";

    pub fn new(domain: &str) -> Self {
        Self {
            domain: domain.trim().to_lowercase(),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Check if a group follows the JIT naming convention. Purely local,
    /// never consults a backend.
    pub fn is_jit_group(&self, group: &GroupId) -> bool {
        self.jit_group_from_group(group).is_some()
    }

    pub fn jit_group_from_group(&self, group: &GroupId) -> Option<JitGroupId> {
        let (local, domain) = group.components();
        if domain != self.domain {
            return None;
        }
        let mut parts = local.split('.');
        if parts.next()? != Self::PREFIX {
            return None;
        }
        let (env, sys, name) = (parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() {
            return None;
        }
        JitGroupId::new(env, sys, name)
    }

    pub fn group_from_jit_group(&self, group: &JitGroupId) -> Option<GroupId> {
        GroupId::new(&format!(
            "{}.{}.{}.{}@{}",
            Self::PREFIX,
            group.environment(),
            group.system(),
            group.name(),
            self.domain
        ))
    }
}
