use miette::Diagnostic;
use thiserror::Error;

/// Raised while building a policy tree. Trees are only ever built from
/// already-parsed documents, so these indicate an inconsistent document.
#[derive(Debug, Error, Diagnostic, PartialEq, Eq)]
pub enum PolicyError {
    #[error("The policy must have a name")]
    #[diagnostic(code(jitaccess::policy::blank_name))]
    BlankName,

    #[error("Invalid policy name `{0}`")]
    #[diagnostic(
        code(jitaccess::policy::invalid_name),
        help("Policy names must not contain dots or whitespace")
    )]
    InvalidName(String),

    #[error("Duplicate {level} policy `{name}`")]
    #[diagnostic(
        code(jitaccess::policy::duplicate_name),
        help("Policy names are case-insensitive and must be unique within their parent")
    )]
    DuplicateName { level: &'static str, name: String },

    #[error("Duplicate constraint `{name}` in policy `{policy}`")]
    #[diagnostic(
        code(jitaccess::policy::duplicate_constraint),
        help("Constraint names must be unique per constraint class within a policy")
    )]
    DuplicateConstraint { policy: String, name: String },

    #[error("Invalid constraint `{name}`: {reason}")]
    #[diagnostic(code(jitaccess::policy::invalid_constraint))]
    InvalidConstraint { name: String, reason: String },

    #[error("Invalid principal `{0}`")]
    #[diagnostic(
        code(jitaccess::policy::invalid_principal),
        help("Principals use the syntax type:value, e.g. user:alice@example.com or group:admins@example.com")
    )]
    InvalidPrincipal(String),

    #[error("Invalid permission `{0}`")]
    #[diagnostic(
        code(jitaccess::policy::invalid_permission),
        help("Supported permissions: VIEW, JOIN, APPROVE_OTHERS, APPROVE_SELF, EXPORT, RECONCILE")
    )]
    InvalidPermission(String),
}

/// Raised when a constraint check cannot be evaluated.
#[derive(Debug, Error, Diagnostic, PartialEq, Eq)]
pub enum EvaluationError {
    #[error("Missing required input `{0}`")]
    #[diagnostic(code(jitaccess::constraint::missing_input))]
    MissingInput(String),

    #[error("Invalid value for input `{name}`: {reason}")]
    #[diagnostic(code(jitaccess::constraint::invalid_input))]
    InvalidInput { name: String, reason: String },

    #[error("Malformed expression: {0}")]
    #[diagnostic(
        code(jitaccess::constraint::malformed),
        help("Supported operators: ==, !=, >, <, >=, <=, &&, ||, !, in. Paths use dot notation (e.g. input.justification)")
    )]
    Malformed(String),

    #[error("Expression must evaluate to a boolean, got {0}")]
    #[diagnostic(code(jitaccess::constraint::not_boolean))]
    NotBoolean(String),
}
