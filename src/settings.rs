use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::auth::groups::GroupMapping;
use crate::auth::principal::Directory;
use crate::errors::Result;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    pub directory: DirectorySettings,
    pub groups: Groups,
    pub resolver: Resolver,
    pub reconciliation: Reconciliation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectorySettings {
    /// Primary domain of the organization's own directory. Users of this
    /// directory are classified as internal.
    pub internal_domain: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Groups {
    /// Domain of the groups that back JIT groups, i.e. the `<domain>` in
    /// `jit.<environment>.<system>.<name>@<domain>`.
    pub domain: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolver {
    /// Maximum number of concurrent membership lookups per resolution.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_max_concurrency() -> usize {
    8
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reconciliation {
    /// Cron expression (with seconds) for scheduled reconciliation.
    #[serde(default = "default_schedule")]
    pub schedule: String,
}

fn default_schedule() -> String {
    "0 0 * * * *".to_string()
}

impl Default for DirectorySettings {
    fn default() -> Self {
        Self {
            internal_domain: "example.com".to_string(),
        }
    }
}

impl Default for Groups {
    fn default() -> Self {
        Self {
            domain: "example.com".to_string(),
        }
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl Default for Reconciliation {
    fn default() -> Self {
        Self {
            schedule: default_schedule(),
        }
    }
}

impl Settings {
    pub fn load(path: &str) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default(
                "directory.internal_domain",
                DirectorySettings::default().internal_domain,
            )?
            .set_default("groups.domain", Groups::default().domain)?
            .set_default(
                "resolver.max_concurrency",
                Resolver::default().max_concurrency as u64,
            )?
            .set_default("reconciliation.schedule", Reconciliation::default().schedule)?;

        // Optional file
        if Path::new(path).exists() {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment overrides: JITACCESS__RESOLVER__MAX_CONCURRENCY=16, etc.
        builder = builder.add_source(
            config::Environment::with_prefix("JITACCESS")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.internal_directory()?;
        Ok(settings)
    }

    pub fn internal_directory(&self) -> Result<Directory> {
        Directory::cloud_identity(&self.directory.internal_domain).ok_or_else(|| {
            config::ConfigError::Message(format!(
                "directory.internal_domain `{}` is not a valid domain",
                self.directory.internal_domain
            ))
            .into()
        })
    }

    pub fn group_mapping(&self) -> GroupMapping {
        GroupMapping::new(&self.groups.domain)
    }
}
