//! The Environment → System → JitGroup policy tree.
//!
//! Trees are built bottom-up: groups are handed to their system, systems to
//! their environment. Once built, a tree is immutable and can be shared
//! across threads. Lookups return borrowed views ([`SystemRef`],
//! [`JitGroupRef`]) that know their ancestors, which is what ACL and
//! constraint inheritance walk.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::auth::principal::JitGroupId;
use crate::auth::subject::Subject;
use crate::policy::acl::{AccessControlList, Effect, PolicyPermission};
use crate::policy::constraint::{Constraint, ConstraintClass};
use crate::policy::errors::PolicyError;

/// Attributes shared by all three policy levels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyHeader {
    name: String,
    display_name: String,
    description: String,
    acl: Option<AccessControlList>,
    constraints: BTreeMap<ConstraintClass, Vec<Constraint>>,
}

impl PolicyHeader {
    pub fn new(name: &str, description: &str) -> Result<Self, PolicyError> {
        let display_name = name.trim();
        if display_name.is_empty() {
            return Err(PolicyError::BlankName);
        }
        if display_name.contains(|c: char| c == '.' || c.is_whitespace()) {
            return Err(PolicyError::InvalidName(display_name.to_string()));
        }
        Ok(Self {
            name: display_name.to_lowercase(),
            display_name: display_name.to_string(),
            description: description.to_string(),
            acl: None,
            constraints: BTreeMap::new(),
        })
    }

    pub fn with_acl(mut self, acl: AccessControlList) -> Self {
        self.acl = Some(acl);
        self
    }

    pub fn with_constraints(
        mut self,
        class: ConstraintClass,
        constraints: Vec<Constraint>,
    ) -> Result<Self, PolicyError> {
        let mut names = HashSet::new();
        for constraint in &constraints {
            if !names.insert(constraint.name()) {
                return Err(PolicyError::DuplicateConstraint {
                    policy: self.name.clone(),
                    name: constraint.name().to_string(),
                });
            }
        }
        self.constraints.insert(class, constraints);
        Ok(self)
    }

    /// Lower-cased name, unique among siblings.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn acl(&self) -> Option<&AccessControlList> {
        self.acl.as_ref()
    }

    /// Constraints defined by this policy alone, without inherited ones.
    pub fn constraints(&self, class: ConstraintClass) -> &[Constraint] {
        self.constraints
            .get(&class)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JitGroupPolicy {
    header: PolicyHeader,
}

impl JitGroupPolicy {
    pub fn new(header: PolicyHeader) -> Self {
        Self { header }
    }

    pub fn header(&self) -> &PolicyHeader {
        &self.header
    }

    pub fn name(&self) -> &str {
        self.header.name()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemPolicy {
    header: PolicyHeader,
    groups: BTreeMap<String, Arc<JitGroupPolicy>>,
}

impl SystemPolicy {
    pub fn new(header: PolicyHeader, groups: Vec<JitGroupPolicy>) -> Result<Self, PolicyError> {
        Ok(Self {
            header,
            groups: index_by_name("group", groups, |g| g.name(), Arc::new)?,
        })
    }

    pub fn header(&self) -> &PolicyHeader {
        &self.header
    }

    pub fn name(&self) -> &str {
        self.header.name()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentPolicy {
    header: PolicyHeader,
    systems: BTreeMap<String, SystemPolicy>,
}

fn index_by_name<T, V>(
    level: &'static str,
    items: Vec<T>,
    name: impl Fn(&T) -> &str,
    wrap: impl Fn(T) -> V,
) -> Result<BTreeMap<String, V>, PolicyError> {
    let mut index = BTreeMap::new();
    for item in items {
        let key = name(&item).to_string();
        if index.contains_key(&key) {
            return Err(PolicyError::DuplicateName { level, name: key });
        }
        index.insert(key, wrap(item));
    }
    Ok(index)
}

impl EnvironmentPolicy {
    pub fn new(header: PolicyHeader, systems: Vec<SystemPolicy>) -> Result<Self, PolicyError> {
        Ok(Self {
            header,
            systems: index_by_name("system", systems, |s| s.name(), |s| s)?,
        })
    }

    pub fn header(&self) -> &PolicyHeader {
        &self.header
    }

    pub fn name(&self) -> &str {
        self.header.name()
    }

    pub fn node(&self) -> PolicyNode<'_> {
        PolicyNode::Environment(self)
    }

    /// Lookup a system by name, ignoring case.
    pub fn system(&self, name: &str) -> Option<SystemRef<'_>> {
        self.systems
            .get(&name.trim().to_lowercase())
            .map(|system| SystemRef {
                environment: self,
                system,
            })
    }

    pub fn systems(&self) -> impl Iterator<Item = SystemRef<'_>> {
        self.systems.values().map(move |system| SystemRef {
            environment: self,
            system,
        })
    }

    /// Lookup a group by its id. Ids of other environments never match.
    pub fn group(&self, id: &JitGroupId) -> Option<JitGroupRef<'_>> {
        if id.environment() != self.name() {
            return None;
        }
        self.system(id.system())?.group(id.name())
    }

    pub fn is_allowed(&self, subject: &Subject, required: PolicyPermission) -> bool {
        self.node().is_allowed(subject, required)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SystemRef<'a> {
    environment: &'a EnvironmentPolicy,
    system: &'a SystemPolicy,
}

impl<'a> SystemRef<'a> {
    pub fn policy(&self) -> &'a SystemPolicy {
        self.system
    }

    pub fn environment(&self) -> &'a EnvironmentPolicy {
        self.environment
    }

    pub fn node(&self) -> PolicyNode<'a> {
        PolicyNode::System(*self)
    }

    /// Lookup a group by name, ignoring case.
    pub fn group(&self, name: &str) -> Option<JitGroupRef<'a>> {
        let system = *self;
        self.system
            .groups
            .get(&name.trim().to_lowercase())
            .map(|group| JitGroupRef { system, group })
    }

    pub fn groups(&self) -> impl Iterator<Item = JitGroupRef<'a>> {
        let system = *self;
        self.system
            .groups
            .values()
            .map(move |group| JitGroupRef { system, group })
    }

    pub fn is_allowed(&self, subject: &Subject, required: PolicyPermission) -> bool {
        self.node().is_allowed(subject, required)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct JitGroupRef<'a> {
    system: SystemRef<'a>,
    group: &'a Arc<JitGroupPolicy>,
}

impl<'a> JitGroupRef<'a> {
    pub fn policy(&self) -> &'a Arc<JitGroupPolicy> {
        self.group
    }

    pub fn system(&self) -> SystemRef<'a> {
        self.system
    }

    pub fn node(&self) -> PolicyNode<'a> {
        PolicyNode::JitGroup(*self)
    }

    pub fn id(&self) -> JitGroupId {
        JitGroupId::from_policy_names(
            self.system.environment.name(),
            self.system.system.name(),
            self.group.name(),
        )
    }

    pub fn is_allowed(&self, subject: &Subject, required: PolicyPermission) -> bool {
        self.node().is_allowed(subject, required)
    }

    pub fn constraints(&self, class: ConstraintClass) -> Vec<&'a Constraint> {
        self.node().constraints(class)
    }
}

/// A policy at any of the three levels, together with its ancestors.
#[derive(Debug, Clone, Copy)]
pub enum PolicyNode<'a> {
    Environment(&'a EnvironmentPolicy),
    System(SystemRef<'a>),
    JitGroup(JitGroupRef<'a>),
}

impl<'a> PolicyNode<'a> {
    pub fn header(&self) -> &'a PolicyHeader {
        match self {
            PolicyNode::Environment(env) => &env.header,
            PolicyNode::System(sys) => &sys.system.header,
            PolicyNode::JitGroup(group) => &group.group.header,
        }
    }

    pub fn parent(&self) -> Option<PolicyNode<'a>> {
        match self {
            PolicyNode::Environment(_) => None,
            PolicyNode::System(sys) => Some(PolicyNode::Environment(sys.environment)),
            PolicyNode::JitGroup(group) => Some(PolicyNode::System(group.system)),
        }
    }

    /// This policy, followed by its parent, grandparent, up to the root.
    pub fn ancestry(&self) -> impl Iterator<Item = PolicyNode<'a>> {
        std::iter::successors(Some(*self), PolicyNode::parent)
    }

    /// Check if the subject is granted all `required` permissions.
    ///
    /// Each permission is decided by the closest policy whose ACL has a
    /// matching entry; a deny beats an allow on the same level. Permissions
    /// that no policy decides are denied.
    pub fn is_allowed(&self, subject: &Subject, required: PolicyPermission) -> bool {
        self.is_allowed_at(subject, required, Utc::now())
    }

    pub fn is_allowed_at(
        &self,
        subject: &Subject,
        required: PolicyPermission,
        at: DateTime<Utc>,
    ) -> bool {
        let principals = subject.principal_ids_at(at);
        required.iter().all(|permission| {
            self.ancestry()
                .find_map(|node| node.header().acl()?.decide(&principals, permission))
                == Some(Effect::Allow)
        })
    }

    /// Effective constraints of a class: this policy's own, followed by
    /// inherited ones. A constraint redefined by a descendant replaces the
    /// ancestor's entirely.
    pub fn constraints(&self, class: ConstraintClass) -> Vec<&'a Constraint> {
        let mut seen = HashSet::new();
        let mut effective = Vec::new();
        for node in self.ancestry() {
            for constraint in node.header().constraints(class) {
                if seen.insert(constraint.name()) {
                    effective.push(constraint);
                }
            }
        }
        effective
    }
}

impl<'a> From<SystemRef<'a>> for PolicyNode<'a> {
    fn from(value: SystemRef<'a>) -> Self {
        PolicyNode::System(value)
    }
}

impl<'a> From<JitGroupRef<'a>> for PolicyNode<'a> {
    fn from(value: JitGroupRef<'a>) -> Self {
        PolicyNode::JitGroup(value)
    }
}
