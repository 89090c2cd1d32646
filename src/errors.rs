use miette::Diagnostic;
use thiserror::Error;

use crate::policy::errors::{EvaluationError, PolicyError};

#[derive(Debug, Error, Diagnostic)]
pub enum JitError {
    /// The resource (user, membership, group) does not exist, or no longer exists.
    #[error("Not found: {0}")]
    #[diagnostic(code(jitaccess::not_found))]
    NotFound(String),

    #[error("Access denied: {0}")]
    #[diagnostic(
        code(jitaccess::access_denied),
        help("Check the ACLs of the environment, system and group policies")
    )]
    AccessDenied(String),

    /// Transport or backend failure. Callers may retry the whole operation.
    #[error("Backend I/O error: {0}")]
    #[diagnostic(code(jitaccess::io))]
    Io(String),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error("Config error: {0}")]
    #[diagnostic(code(jitaccess::config))]
    Config(#[from] config::ConfigError),

    #[error("Scheduler error: {0}")]
    #[diagnostic(code(jitaccess::scheduler))]
    Scheduler(String),
}

impl JitError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, JitError::NotFound(_))
    }
}

pub type Result<T, E = JitError> = std::result::Result<T, E>;
