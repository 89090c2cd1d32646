use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jitaccess_core::auth::groups::{
    GroupMapping, GroupsClient, Membership, MembershipId, MembershipRelation, MembershipRole,
};
use jitaccess_core::auth::principal::{EndUserId, GroupId, JitGroupId};
use jitaccess_core::errors::{JitError, Result};
use jitaccess_core::policy::tree::JitGroupRef;
use jitaccess_core::provisioning::{PolicyDocument, PolicySource, Provisioner};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::DOMAIN;

enum MembershipState {
    Present(Membership),
    Vanished,
    Broken,
}

#[derive(Default)]
struct Counters {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    lookups: AtomicUsize,
}

/// Decrements the in-flight count when a lookup completes or is aborted
struct InFlight(Arc<Counters>);

impl InFlight {
    fn enter(counters: &Arc<Counters>) -> Self {
        let now = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        counters.max_in_flight.fetch_max(now, Ordering::SeqCst);
        counters.lookups.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counters))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-memory group backend
#[derive(Default)]
pub struct FakeGroups {
    users: HashMap<String, Vec<MembershipRelation>>,
    memberships: HashMap<String, MembershipState>,
    delay: Option<Duration>,
    counters: Arc<Counters>,
}

impl FakeGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user without any memberships
    pub fn with_user(mut self, user: &str) -> Self {
        self.users.entry(user.to_string()).or_default();
        self
    }

    fn add(mut self, user: &str, group: &str, state: MembershipState) -> Self {
        let id = format!("memberships/{}", self.memberships.len());
        self.users
            .entry(user.to_string())
            .or_default()
            .push(MembershipRelation {
                group: GroupId::new(group).expect("Invalid group email"),
                membership: MembershipId(id.clone()),
            });
        self.memberships.insert(id, state);
        self
    }

    pub fn with_group(self, user: &str, group: &str) -> Self {
        self.add(user, group, MembershipState::Present(Membership::default()))
    }

    /// Add a membership of the group backing `jit_group` ("env.sys.name")
    pub fn with_jit_group(self, user: &str, jit_group: &str, expiry: DateTime<Utc>) -> Self {
        self.with_jit_group_roles(user, jit_group, vec![Some(expiry)])
    }

    pub fn with_jit_group_roles(
        self,
        user: &str,
        jit_group: &str,
        expiries: Vec<Option<DateTime<Utc>>>,
    ) -> Self {
        let roles = expiries
            .into_iter()
            .map(|expiry| MembershipRole {
                name: "MEMBER".to_string(),
                expiry,
            })
            .collect();
        self.add(
            user,
            &jit_group_email(jit_group),
            MembershipState::Present(Membership { roles }),
        )
    }

    /// A JIT membership that is removed before its details are fetched
    pub fn with_vanished_jit_group(self, user: &str, jit_group: &str) -> Self {
        self.add(user, &jit_group_email(jit_group), MembershipState::Vanished)
    }

    /// A JIT membership whose lookup fails with an I/O error
    pub fn with_broken_jit_group(self, user: &str, jit_group: &str) -> Self {
        self.add(user, &jit_group_email(jit_group), MembershipState::Broken)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn in_flight(&self) -> usize {
        self.counters.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.counters.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn lookups(&self) -> usize {
        self.counters.lookups.load(Ordering::SeqCst)
    }
}

pub fn jit_group_email(jit_group: &str) -> String {
    format!("jit.{jit_group}@{DOMAIN}")
}

#[async_trait]
impl GroupsClient for FakeGroups {
    async fn list_memberships_by_user(&self, user: &EndUserId) -> Result<Vec<MembershipRelation>> {
        self.users
            .get(user.email())
            .cloned()
            .ok_or_else(|| JitError::NotFound(user.to_string()))
    }

    async fn get_membership(&self, id: &MembershipId) -> Result<Membership> {
        let _guard = InFlight::enter(&self.counters);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.memberships.get(&id.0) {
            Some(MembershipState::Present(membership)) => Ok(membership.clone()),
            Some(MembershipState::Vanished) | None => Err(JitError::NotFound(id.to_string())),
            Some(MembershipState::Broken) => Err(JitError::Io("backend unavailable".to_string())),
        }
    }
}

/// In-memory provisioning backend that records reconciled groups
#[derive(Default)]
pub struct FakeProvisioner {
    groups: Vec<JitGroupId>,
    failing: HashSet<JitGroupId>,
    unreachable: bool,
    reconciled: Mutex<Vec<JitGroupId>>,
}

impl FakeProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(mut self, id: &str) -> Self {
        self.groups
            .push(JitGroupId::parse(&format!("jitgroup:{id}")).expect("Invalid JIT group id"));
        self
    }

    pub fn with_failing_group(mut self, id: &str) -> Self {
        self = self.with_group(id);
        if let Some(last) = self.groups.last() {
            self.failing.insert(last.clone());
        }
        self
    }

    /// Listing provisioned groups fails
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    pub fn reconciled(&self) -> Vec<JitGroupId> {
        self.reconciled.lock().expect("poisoned").clone()
    }
}

#[async_trait]
impl Provisioner for FakeProvisioner {
    async fn provisioned_groups(&self) -> Result<Vec<JitGroupId>> {
        if self.unreachable {
            return Err(JitError::Io("provisioning backend unreachable".to_string()));
        }
        Ok(self.groups.clone())
    }

    fn provisioned_group_id(&self, group: &JitGroupId) -> GroupId {
        GroupMapping::new(DOMAIN)
            .group_from_jit_group(group)
            .expect("JIT group ids map to valid group emails")
    }

    async fn reconcile(&self, group: &JitGroupRef<'_>) -> Result<()> {
        let id = group.id();
        self.reconciled.lock().expect("poisoned").push(id.clone());
        if self.failing.contains(&id) {
            return Err(JitError::Io(format!("quota exceeded while reconciling {id}")));
        }
        Ok(())
    }
}

/// Policy source that returns a fixed document
pub struct StaticSource(pub PolicyDocument);

#[async_trait]
impl PolicySource for StaticSource {
    async fn load(&self) -> Result<PolicyDocument> {
        Ok(self.0.clone())
    }
}
