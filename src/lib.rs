//! jitaccess-core - just-in-time access governance
//!
//! This library provides the policy model, subject resolution and
//! reconciliation engines. Backends are plugged in through the
//! [`auth::groups::GroupsClient`], [`provisioning::Provisioner`] and
//! [`provisioning::PolicySource`] traits.

pub mod auth;
pub mod catalog;
pub mod errors;
pub mod jobs;
pub mod policy;
pub mod provisioning;
pub mod settings;
