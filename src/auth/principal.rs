//! Typed principal identifiers.
//!
//! Every identifier has a canonical text form `type:value` where `value`
//! is lower-cased. Equality and ordering use `(type, value)`.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::policy::errors::PolicyError;

/// Split `type:value`, matching the type case-insensitively.
fn strip_type<'a>(s: &'a str, type_name: &str) -> Option<&'a str> {
    let s = s.trim();
    let (t, value) = s.split_once(':')?;
    if !t.trim().eq_ignore_ascii_case(type_name) {
        return None;
    }
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

/// Canonicalize an email address, rejecting anything without a local part and domain.
fn canonical_email(s: &str) -> Option<String> {
    let (local, domain) = s.trim().rsplit_once('@')?;
    let local = local.trim();
    let domain = domain.trim();
    if local.is_empty() || domain.is_empty() || domain.contains(char::is_whitespace) {
        return None;
    }
    Some(format!("{local}@{domain}").to_lowercase())
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndUserId {
    email: String,
}

impl EndUserId {
    pub const TYPE: &'static str = "user";

    pub fn new(email: &str) -> Option<Self> {
        canonical_email(email).map(|email| Self { email })
    }

    /// Parse `user:email`.
    pub fn parse(s: &str) -> Option<Self> {
        strip_type(s, Self::TYPE).and_then(Self::new)
    }

    pub fn email(&self) -> &str {
        &self.email
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId {
    email: String,
}

impl GroupId {
    pub const TYPE: &'static str = "group";

    pub fn new(email: &str) -> Option<Self> {
        canonical_email(email).map(|email| Self { email })
    }

    /// Parse `group:email`.
    pub fn parse(s: &str) -> Option<Self> {
        strip_type(s, Self::TYPE).and_then(Self::new)
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    /// Local part and domain of the group's email address.
    pub fn components(&self) -> (&str, &str) {
        // The constructor guarantees the `@`.
        self.email.rsplit_once('@').unwrap_or((&self.email, ""))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceAccountId {
    email: String,
}

impl ServiceAccountId {
    pub const TYPE: &'static str = "serviceAccount";

    pub fn new(email: &str) -> Option<Self> {
        canonical_email(email).map(|email| Self { email })
    }

    /// Parse `serviceAccount:email`.
    pub fn parse(s: &str) -> Option<Self> {
        strip_type(s, Self::TYPE).and_then(Self::new)
    }

    pub fn email(&self) -> &str {
        &self.email
    }
}

/// Identifies a JIT group policy: `environment.system.name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JitGroupId {
    environment: String,
    system: String,
    name: String,
}

impl JitGroupId {
    pub const TYPE: &'static str = "jitgroup";

    pub fn new(environment: &str, system: &str, name: &str) -> Option<Self> {
        let parts = [environment, system, name].map(|p| p.trim().to_lowercase());
        if parts.iter().any(|p| p.is_empty() || p.contains('.')) {
            return None;
        }
        let [environment, system, name] = parts;
        Some(Self {
            environment,
            system,
            name,
        })
    }

    /// Build an id from policy names that are already lower-cased and
    /// known to be free of dots.
    pub(crate) fn from_policy_names(environment: &str, system: &str, name: &str) -> Self {
        Self {
            environment: environment.to_string(),
            system: system.to_string(),
            name: name.to_string(),
        }
    }

    /// Parse `jitgroup:environment.system.name`.
    pub fn parse(s: &str) -> Option<Self> {
        let value = strip_type(s, Self::TYPE)?;
        let mut parts = value.split('.');
        let (env, sys, name) = (parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() {
            return None;
        }
        Self::new(env, sys, name)
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn system(&self) -> &str {
        &self.system
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for JitGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.environment, self.system, self.name)
    }
}

/// Synthetic principals that classify users rather than identify them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClassPrincipalSet {
    /// Every user that passed the identity-aware proxy.
    IapUsers,
    /// Users of the organization's own directory.
    InternalUsers,
    /// Everybody else: consumer accounts and other organizations.
    ExternalUsers,
}

impl ClassPrincipalSet {
    pub const TYPE: &'static str = "class";

    fn value(&self) -> &'static str {
        match self {
            ClassPrincipalSet::IapUsers => "iapusers",
            ClassPrincipalSet::InternalUsers => "internalusers",
            ClassPrincipalSet::ExternalUsers => "externalusers",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match strip_type(s, Self::TYPE)?.to_lowercase().as_str() {
            "iapusers" => Some(ClassPrincipalSet::IapUsers),
            "internalusers" => Some(ClassPrincipalSet::InternalUsers),
            "externalusers" => Some(ClassPrincipalSet::ExternalUsers),
            _ => None,
        }
    }
}

/// All users of a managed directory, identified by its primary domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DirectoryPrincipalSet {
    domain: String,
}

impl DirectoryPrincipalSet {
    pub const TYPE: &'static str = "domain";

    pub fn new(domain: &str) -> Option<Self> {
        let domain = domain.trim().to_lowercase();
        (!domain.is_empty() && !domain.contains('@')).then_some(Self { domain })
    }

    pub fn parse(s: &str) -> Option<Self> {
        strip_type(s, Self::TYPE).and_then(Self::new)
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }
}

/// The directory a user account belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Directory {
    /// Consumer accounts (e.g. Gmail).
    Consumer,
    /// Project-scoped accounts such as service accounts.
    Project,
    /// A managed directory, identified by its primary domain. Build it with
    /// [`Directory::cloud_identity`].
    CloudIdentity(DirectoryPrincipalSet),
}

impl Directory {
    /// `None` if the domain is blank or contains `@`.
    pub fn cloud_identity(hosted_domain: &str) -> Option<Self> {
        DirectoryPrincipalSet::new(hosted_domain).map(Directory::CloudIdentity)
    }

    pub fn is_managed(&self) -> bool {
        matches!(self, Directory::CloudIdentity(_))
    }

    pub fn hosted_domain(&self) -> Option<&str> {
        self.principal_set().map(DirectoryPrincipalSet::domain)
    }

    /// The `domain:` principal shared by all users of a managed directory.
    pub fn principal_set(&self) -> Option<&DirectoryPrincipalSet> {
        match self {
            Directory::CloudIdentity(set) => Some(set),
            _ => None,
        }
    }
}

impl fmt::Display for Directory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Directory::Consumer => f.write_str("CONSUMER"),
            Directory::Project => f.write_str("PROJECT"),
            Directory::CloudIdentity(set) => f.write_str(set.domain()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PrincipalId {
    EndUser(EndUserId),
    Group(GroupId),
    ServiceAccount(ServiceAccountId),
    JitGroup(JitGroupId),
    Class(ClassPrincipalSet),
    Directory(DirectoryPrincipalSet),
}

impl PrincipalId {
    pub fn type_name(&self) -> &'static str {
        match self {
            PrincipalId::EndUser(_) => EndUserId::TYPE,
            PrincipalId::Group(_) => GroupId::TYPE,
            PrincipalId::ServiceAccount(_) => ServiceAccountId::TYPE,
            PrincipalId::JitGroup(_) => JitGroupId::TYPE,
            PrincipalId::Class(_) => ClassPrincipalSet::TYPE,
            PrincipalId::Directory(_) => DirectoryPrincipalSet::TYPE,
        }
    }

    pub fn value(&self) -> String {
        match self {
            PrincipalId::EndUser(id) => id.email.clone(),
            PrincipalId::Group(id) => id.email.clone(),
            PrincipalId::ServiceAccount(id) => id.email.clone(),
            PrincipalId::JitGroup(id) => id.to_string(),
            PrincipalId::Class(class) => class.value().to_string(),
            PrincipalId::Directory(dir) => dir.domain.clone(),
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        EndUserId::parse(s)
            .map(PrincipalId::EndUser)
            .or_else(|| GroupId::parse(s).map(PrincipalId::Group))
            .or_else(|| ServiceAccountId::parse(s).map(PrincipalId::ServiceAccount))
            .or_else(|| JitGroupId::parse(s).map(PrincipalId::JitGroup))
            .or_else(|| ClassPrincipalSet::parse(s).map(PrincipalId::Class))
            .or_else(|| DirectoryPrincipalSet::parse(s).map(PrincipalId::Directory))
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.type_name(), self.value())
    }
}

impl FromStr for PrincipalId {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PrincipalId::parse(s).ok_or_else(|| PolicyError::InvalidPrincipal(s.to_string()))
    }
}

impl Ord for PrincipalId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.type_name()
            .cmp(other.type_name())
            .then_with(|| self.value().cmp(&other.value()))
    }
}

impl PartialOrd for PrincipalId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

macro_rules! impl_from_id {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for PrincipalId {
                fn from(value: $ty) -> Self {
                    PrincipalId::$variant(value)
                }
            }
        )*
    };
}

impl_from_id!(
    EndUserId => EndUser,
    GroupId => Group,
    ServiceAccountId => ServiceAccount,
    JitGroupId => JitGroup,
    ClassPrincipalSet => Class,
    DirectoryPrincipalSet => Directory,
);

impl fmt::Display for EndUserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", Self::TYPE, self.email)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", Self::TYPE, self.email)
    }
}

/// A principal held by a subject, optionally only until `expiry`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Principal {
    id: PrincipalId,
    expiry: Option<DateTime<Utc>>,
}

impl Principal {
    pub fn permanent(id: impl Into<PrincipalId>) -> Self {
        Self {
            id: id.into(),
            expiry: None,
        }
    }

    pub fn temporary(id: impl Into<PrincipalId>, expiry: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            expiry: Some(expiry),
        }
    }

    pub fn id(&self) -> &PrincipalId {
        &self.id
    }

    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expiry
    }

    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.expiry.map_or(true, |expiry| expiry > at)
    }
}
