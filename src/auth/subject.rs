use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use crate::auth::principal::{ClassPrincipalSet, Directory, EndUserId, Principal, PrincipalId};

/// The fully resolved set of principals of an authenticated user.
///
/// A subject always contains `class:iapusers`, the user itself, exactly one
/// of `class:internalusers`/`class:externalusers`, and a `domain:` principal
/// iff the user belongs to a managed directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    user: EndUserId,
    principals: BTreeSet<Principal>,
}

impl Subject {
    /// Build a subject from the user's group principals.
    ///
    /// `internal_directory` is the organization's own directory; users from
    /// any other directory are classified as external.
    pub fn new(
        user: EndUserId,
        directory: &Directory,
        internal_directory: &Directory,
        group_principals: impl IntoIterator<Item = Principal>,
    ) -> Self {
        let mut principals: BTreeSet<Principal> = group_principals
            .into_iter()
            .filter(|p| !matches!(p.id(), PrincipalId::Class(_) | PrincipalId::Directory(_)))
            .filter(|p| !matches!(p.id(), PrincipalId::EndUser(_)))
            .collect();

        principals.insert(Principal::permanent(ClassPrincipalSet::IapUsers));
        principals.insert(Principal::permanent(user.clone()));

        let class = if directory.is_managed() && directory == internal_directory {
            ClassPrincipalSet::InternalUsers
        } else {
            ClassPrincipalSet::ExternalUsers
        };
        principals.insert(Principal::permanent(class));

        if let Some(domain) = directory.principal_set() {
            principals.insert(Principal::permanent(domain.clone()));
        }

        Self { user, principals }
    }

    pub fn user(&self) -> &EndUserId {
        &self.user
    }

    pub fn principals(&self) -> &BTreeSet<Principal> {
        &self.principals
    }

    /// Ids of all principals that are still valid at `at`.
    pub fn principal_ids_at(&self, at: DateTime<Utc>) -> BTreeSet<&PrincipalId> {
        self.principals
            .iter()
            .filter(|p| p.is_valid_at(at))
            .map(Principal::id)
            .collect()
    }

    /// Ids of all principals that are valid now.
    pub fn principal_ids(&self) -> BTreeSet<&PrincipalId> {
        self.principal_ids_at(Utc::now())
    }

    pub fn is_internal(&self) -> bool {
        self.principals
            .iter()
            .any(|p| p.id() == &PrincipalId::Class(ClassPrincipalSet::InternalUsers))
    }
}
