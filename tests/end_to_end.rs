mod helpers;

use chrono::{Duration, Utc};
use helpers::{
    EnvironmentBuilder, FakeGroups, FakeProvisioner, GroupBuilder, StaticSource, SubjectBuilder,
    SystemBuilder,
};
use jitaccess_core::auth::principal::{Directory, EndUserId};
use jitaccess_core::auth::resolver::SubjectResolver;
use jitaccess_core::catalog::EnvironmentContext;
use jitaccess_core::policy::acl::PolicyPermission;
use jitaccess_core::policy::constraint::{
    CheckInput, Constraint, ConstraintClass, Property, PropertyType,
};
use jitaccess_core::provisioning::{Environment, PolicyDocument};
use jitaccess_core::settings::Settings;
use std::sync::Arc;
use tempfile::TempDir;

fn prod() -> EnvironmentBuilder {
    EnvironmentBuilder::new("prod")
        .allow("class:internalusers", PolicyPermission::VIEW)
        .with_join_constraint(Constraint::expiry(Duration::hours(1), Duration::hours(8)).unwrap())
        .with_system(
            SystemBuilder::new("network")
                .with_join_constraint(
                    Constraint::expression(
                        "ticket",
                        "Ticket",
                        r#"startsWith(input.ticket, "INC-")"#,
                        vec![Property::new("ticket", "Ticket", PropertyType::String)],
                    )
                    .unwrap(),
                )
                .with_group(GroupBuilder::new("admins").allow(
                    "group:approvers@example.com",
                    PolicyPermission::JOIN | PolicyPermission::RECONCILE,
                ))
                .with_group(GroupBuilder::new("viewers").allow(
                    "jitgroup:prod.network.admins",
                    PolicyPermission::JOIN,
                )),
        )
}

fn settings() -> Settings {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = temp_dir.path().join("jitaccess.toml");
    std::fs::write(
        &config_path,
        r#"
[directory]
internal_domain = "example.com"

[resolver]
max_concurrency = 2
"#,
    )
    .expect("Failed to write config");
    Settings::load(config_path.to_str().unwrap()).expect("Failed to load settings")
}

#[test]
fn test_group_grants_reconcile() {
    let policy = prod().build();
    let admins = policy.system("network").unwrap().group("admins").unwrap();

    let approver = SubjectBuilder::new("alice@example.com")
        .with_group("approvers@example.com")
        .build();
    let other = SubjectBuilder::new("bob@example.com").build();

    assert!(admins.is_allowed(&approver, PolicyPermission::RECONCILE));
    assert!(!admins.is_allowed(&other, PolicyPermission::RECONCILE));
}

#[tokio::test]
async fn test_resolved_subject_is_authorized() {
    let groups = Arc::new(
        FakeGroups::new()
            .with_group("alice@example.com", "approvers@example.com")
            .with_jit_group(
                "alice@example.com",
                "prod.network.admins",
                Utc::now() + Duration::hours(1),
            )
            .with_user("bob@example.com"),
    );
    let settings = settings();
    let resolver = SubjectResolver::from_settings(groups, &settings).unwrap();
    let directory = settings.internal_directory().unwrap();

    let alice = resolver
        .resolve_principals(&EndUserId::new("alice@example.com").unwrap(), &directory)
        .await
        .unwrap();
    let bob = resolver
        .resolve_principals(&EndUserId::new("bob@example.com").unwrap(), &directory)
        .await
        .unwrap();

    let policy = prod().build();
    let network = policy.system("network").unwrap();
    let admins = network.group("admins").unwrap();
    let viewers = network.group("viewers").unwrap();

    assert!(admins.is_allowed(&alice, PolicyPermission::JOIN | PolicyPermission::RECONCILE));
    assert!(!admins.is_allowed(&bob, PolicyPermission::JOIN));

    // Active JIT membership in admins grants joining viewers.
    assert!(viewers.is_allowed(&alice, PolicyPermission::JOIN));
    assert!(!viewers.is_allowed(&bob, PolicyPermission::JOIN));

    // VIEW is inherited from the environment.
    assert!(viewers.is_allowed(&bob, PolicyPermission::VIEW));
}

#[test]
fn test_join_constraints_are_inherited() {
    let policy = prod().build();
    let admins = policy.system("network").unwrap().group("admins").unwrap();
    let subject = SubjectBuilder::new("alice@example.com")
        .with_group("approvers@example.com")
        .build();

    let constraints = admins.constraints(ConstraintClass::Join);
    let names: Vec<_> = constraints.iter().map(|c| c.name()).collect();
    assert_eq!(names, vec!["ticket", Constraint::EXPIRY]);
    assert!(admins.constraints(ConstraintClass::Approve).is_empty());

    let input = CheckInput::new()
        .with_subject(&subject)
        .with_input("ticket", "INC-42")
        .with_input("expiry", 7200);
    for constraint in &constraints {
        assert!(
            constraint.create_check().evaluate(&input).unwrap(),
            "constraint {} should pass",
            constraint.name()
        );
    }

    let too_long = CheckInput::new()
        .with_input("ticket", "INC-42")
        .with_input("expiry", 86400);
    let expiry = constraints
        .iter()
        .find(|c| c.name() == Constraint::EXPIRY)
        .unwrap();
    assert!(!expiry.create_check().evaluate(&too_long).unwrap());
}

#[test]
fn test_catalog_view_of_external_user() {
    let env = Environment::new(prod().build(), Arc::new(FakeProvisioner::new())).with_source(
        Arc::new(StaticSource(PolicyDocument {
            environment: "prod".to_string(),
            text: "environment \"prod\" {}".to_string(),
        })),
    );

    let external = SubjectBuilder::new("mallory@partner.com")
        .with_directory(Directory::cloud_identity("partner.com").unwrap())
        .build();
    let ctx = EnvironmentContext::new(&env, &external);
    assert!(ctx.systems().is_empty());
    assert!(ctx.system("network").is_none());
    assert!(!ctx.can_export());
    assert!(!ctx.can_reconcile());

    let internal = SubjectBuilder::new("bob@example.com").build();
    let ctx = EnvironmentContext::new(&env, &internal);
    let network = ctx.system("network").unwrap();
    let names: Vec<_> = network
        .groups()
        .iter()
        .map(|g| g.policy().name().to_string())
        .collect();
    assert_eq!(names, vec!["admins", "viewers"]);
    assert!(!network.can_join(&network.group("admins").unwrap()));
}
