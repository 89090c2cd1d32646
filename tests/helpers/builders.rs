use chrono::{DateTime, Utc};
use jitaccess_core::auth::principal::{
    Directory, EndUserId, GroupId, JitGroupId, Principal, PrincipalId,
};
use jitaccess_core::auth::subject::Subject;
use jitaccess_core::policy::acl::{AccessControlEntry, AccessControlList, PolicyPermission};
use jitaccess_core::policy::constraint::{Constraint, ConstraintClass};
use jitaccess_core::policy::tree::{EnvironmentPolicy, JitGroupPolicy, PolicyHeader, SystemPolicy};

use super::DOMAIN;

fn principal(s: &str) -> PrincipalId {
    s.parse().expect("Invalid principal in test")
}

/// Fields shared by all policy builders
#[derive(Default)]
struct HeaderBuilder {
    entries: Vec<AccessControlEntry>,
    join: Vec<Constraint>,
    approve: Vec<Constraint>,
}

impl HeaderBuilder {
    fn build(self, name: &str) -> PolicyHeader {
        let mut header = PolicyHeader::new(name, &format!("{name} (test)"))
            .expect("Invalid policy name in test");
        if !self.entries.is_empty() {
            header = header.with_acl(AccessControlList::new(self.entries));
        }
        if !self.join.is_empty() {
            header = header
                .with_constraints(ConstraintClass::Join, self.join)
                .expect("Invalid join constraints");
        }
        if !self.approve.is_empty() {
            header = header
                .with_constraints(ConstraintClass::Approve, self.approve)
                .expect("Invalid approve constraints");
        }
        header
    }
}

macro_rules! header_methods {
    () => {
        pub fn allow(mut self, principal_id: &str, permissions: PolicyPermission) -> Self {
            self.header
                .entries
                .push(AccessControlEntry::allow(principal(principal_id), permissions));
            self
        }

        pub fn deny(mut self, principal_id: &str, permissions: PolicyPermission) -> Self {
            self.header
                .entries
                .push(AccessControlEntry::deny(principal(principal_id), permissions));
            self
        }

        pub fn with_join_constraint(mut self, constraint: Constraint) -> Self {
            self.header.join.push(constraint);
            self
        }

        pub fn with_approve_constraint(mut self, constraint: Constraint) -> Self {
            self.header.approve.push(constraint);
            self
        }
    };
}

/// Builder for JIT group policies
pub struct GroupBuilder {
    name: String,
    header: HeaderBuilder,
}

impl GroupBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            header: HeaderBuilder::default(),
        }
    }

    header_methods!();

    pub fn build(self) -> JitGroupPolicy {
        JitGroupPolicy::new(self.header.build(&self.name))
    }
}

/// Builder for system policies
pub struct SystemBuilder {
    name: String,
    header: HeaderBuilder,
    groups: Vec<GroupBuilder>,
}

impl SystemBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            header: HeaderBuilder::default(),
            groups: Vec::new(),
        }
    }

    header_methods!();

    pub fn with_group(mut self, group: GroupBuilder) -> Self {
        self.groups.push(group);
        self
    }

    pub fn build(self) -> SystemPolicy {
        SystemPolicy::new(
            self.header.build(&self.name),
            self.groups.into_iter().map(GroupBuilder::build).collect(),
        )
        .expect("Failed to build system policy")
    }
}

/// Builder for environment policies
pub struct EnvironmentBuilder {
    name: String,
    header: HeaderBuilder,
    systems: Vec<SystemBuilder>,
}

impl EnvironmentBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            header: HeaderBuilder::default(),
            systems: Vec::new(),
        }
    }

    header_methods!();

    pub fn with_system(mut self, system: SystemBuilder) -> Self {
        self.systems.push(system);
        self
    }

    pub fn build(self) -> EnvironmentPolicy {
        EnvironmentPolicy::new(
            self.header.build(&self.name),
            self.systems.into_iter().map(SystemBuilder::build).collect(),
        )
        .expect("Failed to build environment policy")
    }
}

/// Builder for subjects that skips resolution
pub struct SubjectBuilder {
    user: EndUserId,
    directory: Directory,
    principals: Vec<Principal>,
}

impl SubjectBuilder {
    pub fn new(email: &str) -> Self {
        Self {
            user: EndUserId::new(email).expect("Invalid user email"),
            directory: Directory::cloud_identity(DOMAIN).unwrap(),
            principals: Vec::new(),
        }
    }

    pub fn with_directory(mut self, directory: Directory) -> Self {
        self.directory = directory;
        self
    }

    pub fn with_group(mut self, email: &str) -> Self {
        self.principals.push(Principal::permanent(
            GroupId::new(email).expect("Invalid group email"),
        ));
        self
    }

    pub fn with_jit_group(mut self, id: &str, expiry: DateTime<Utc>) -> Self {
        self.principals.push(Principal::temporary(
            JitGroupId::parse(id).expect("Invalid JIT group id"),
            expiry,
        ));
        self
    }

    pub fn build(self) -> Subject {
        Subject::new(
            self.user,
            &self.directory,
            &Directory::cloud_identity(DOMAIN).unwrap(),
            self.principals,
        )
    }
}
