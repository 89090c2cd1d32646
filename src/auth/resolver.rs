//! Expands an authenticated user into a [`Subject`].
//!
//! Direct group memberships are listed with a single call. Memberships of
//! JIT groups additionally need their expiry, which is only available by
//! fetching each membership individually; those lookups fan out over a
//! bounded set of tasks and are joined as one batch.

use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::auth::groups::{GroupMapping, GroupsClient, Membership, MembershipId};
use crate::auth::principal::{Directory, EndUserId, GroupId, Principal};
use crate::auth::subject::Subject;
use crate::errors::{JitError, Result};
use crate::settings::Settings;

/// Something noteworthy that happened during resolution without failing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionDiagnostic {
    /// The membership was removed between listing and lookup.
    MembershipVanished(GroupId),
    /// The group follows the JIT naming convention, but the membership
    /// does not expire. Treated as a naming collision and ignored.
    MissingExpiry(GroupId),
    /// Looking up JIT memberships failed; none of them were included.
    JitResolutionFailed(String),
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub subject: Subject,
    pub diagnostics: Vec<ResolutionDiagnostic>,
}

#[derive(Debug, Clone)]
struct UnresolvedMembership {
    group: GroupId,
    membership: MembershipId,
}

#[derive(Debug)]
enum MembershipLookup {
    Resolved { group: GroupId, details: Membership },
    Vanished(GroupId),
}

pub struct SubjectResolver {
    client: Arc<dyn GroupsClient>,
    mapping: GroupMapping,
    internal_directory: Directory,
    max_concurrency: usize,
}

impl SubjectResolver {
    pub fn new(
        client: Arc<dyn GroupsClient>,
        mapping: GroupMapping,
        internal_directory: Directory,
        max_concurrency: usize,
    ) -> Self {
        Self {
            client,
            mapping,
            internal_directory,
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn from_settings(client: Arc<dyn GroupsClient>, settings: &Settings) -> Result<Self> {
        Ok(Self::new(
            client,
            settings.group_mapping(),
            settings.internal_directory()?,
            settings.resolver.max_concurrency,
        ))
    }

    /// Lookup all of a user's principals: the user itself, its class
    /// principals, JIT group memberships and other group memberships.
    pub async fn resolve_principals(&self, user: &EndUserId, directory: &Directory) -> Result<Subject> {
        Ok(self.resolve(user, directory).await?.subject)
    }

    /// Like [`resolve_principals`](Self::resolve_principals), but also
    /// reports memberships that were skipped.
    pub async fn resolve(&self, user: &EndUserId, directory: &Directory) -> Result<Resolution> {
        let mut diagnostics = Vec::new();
        let groups = self.resolve_group_principals(user, &mut diagnostics).await?;

        let subject = Subject::new(user.clone(), directory, &self.internal_directory, groups);

        Ok(Resolution {
            subject,
            diagnostics,
        })
    }

    async fn resolve_group_principals(
        &self,
        user: &EndUserId,
        diagnostics: &mut Vec<ResolutionDiagnostic>,
    ) -> Result<Vec<Principal>> {
        let memberships = match self.client.list_memberships_by_user(user).await {
            Ok(memberships) => memberships,
            Err(JitError::NotFound(_)) => {
                return Err(JitError::AccessDenied(format!(
                    "resolving group memberships failed because the user `{user}` does not exist"
                )));
            }
            Err(e) => return Err(e),
        };

        let (jit, other): (Vec<_>, Vec<_>) = memberships
            .into_iter()
            .partition(|m| self.mapping.is_jit_group(&m.group));

        let other_principals: Vec<Principal> = other
            .into_iter()
            .map(|m| Principal::permanent(m.group))
            .collect();

        let jit = jit
            .into_iter()
            .map(|m| UnresolvedMembership {
                group: m.group,
                membership: m.membership,
            })
            .collect();
        let jit_principals = self
            .resolve_jit_group_memberships(user, jit, diagnostics)
            .await;

        info!(
            user = %user,
            jit_groups = jit_principals.len(),
            other_groups = other_principals.len(),
            "Resolved group memberships"
        );

        Ok(other_principals.into_iter().chain(jit_principals).collect())
    }

    /// Never fails: if any lookup fails for a reason other than the
    /// membership having vanished, no JIT principals are returned at all.
    async fn resolve_jit_group_memberships(
        &self,
        user: &EndUserId,
        memberships: Vec<UnresolvedMembership>,
        diagnostics: &mut Vec<ResolutionDiagnostic>,
    ) -> Vec<Principal> {
        if memberships.is_empty() {
            return Vec::new();
        }

        let lookups = match self.lookup_memberships(memberships).await {
            Ok(lookups) => lookups,
            Err(e) => {
                error!(
                    user = %user,
                    error = %e,
                    "Resolving JIT group memberships failed"
                );
                diagnostics.push(ResolutionDiagnostic::JitResolutionFailed(e.to_string()));
                return Vec::new();
            }
        };

        let mut principals = Vec::new();
        for lookup in lookups {
            match lookup {
                MembershipLookup::Vanished(group) => {
                    debug!(user = %user, group = %group, "Membership vanished during lookup");
                    diagnostics.push(ResolutionDiagnostic::MembershipVanished(group));
                }
                MembershipLookup::Resolved { group, details } => {
                    // Temporary memberships have no start date, but must have an expiry.
                    let Some(expiry) = details.expiry() else {
                        warn!(
                            group = %group,
                            "The group looks like a JIT group, but lacks an expiry date"
                        );
                        diagnostics.push(ResolutionDiagnostic::MissingExpiry(group));
                        continue;
                    };
                    if let Some(jit_group) = self.mapping.jit_group_from_group(&group) {
                        principals.push(Principal::temporary(jit_group, expiry));
                    }
                }
            }
        }
        principals
    }

    /// Fetch details for all memberships concurrently. Fails as a unit on
    /// the first unexpected error; outstanding lookups are aborted.
    async fn lookup_memberships(
        &self,
        memberships: Vec<UnresolvedMembership>,
    ) -> Result<Vec<MembershipLookup>> {
        let permits = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();

        for membership in memberships {
            let client = Arc::clone(&self.client);
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| JitError::Io(e.to_string()))?;
                match client.get_membership(&membership.membership).await {
                    Ok(details) => Ok(MembershipLookup::Resolved {
                        group: membership.group,
                        details,
                    }),
                    Err(e) if e.is_not_found() => Ok(MembershipLookup::Vanished(membership.group)),
                    Err(e) => Err(e),
                }
            });
        }

        let mut lookups = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(lookup)) => lookups.push(lookup),
                Ok(Err(e)) => {
                    tasks.abort_all();
                    return Err(e);
                }
                Err(e) => {
                    tasks.abort_all();
                    return Err(JitError::Io(format!("membership lookup task failed: {e}")));
                }
            }
        }
        Ok(lookups)
    }
}
