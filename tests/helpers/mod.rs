#![allow(dead_code)]

pub mod builders;
pub mod fakes;

pub use builders::{EnvironmentBuilder, GroupBuilder, SubjectBuilder, SystemBuilder};
pub use fakes::{FakeGroups, FakeProvisioner, StaticSource};

pub const DOMAIN: &str = "example.com";
