//! Identities and their resolution into subjects.

pub mod groups;
pub mod principal;
pub mod resolver;
pub mod subject;
