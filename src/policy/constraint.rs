//! Named constraints attached to policies, and the checks that evaluate them.
//!
//! A [`Check`] is created from a constraint and evaluated against a
//! [`CheckInput`]. Checks hold no state of their own, so the same check
//! can be evaluated any number of times, in any order.

use chrono::Duration;
use serde_json::{json, Map, Value};
use std::fmt;

use crate::auth::subject::Subject;
use crate::policy::errors::{EvaluationError, PolicyError};
use crate::policy::expression;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConstraintClass {
    /// Checked when a user joins a group.
    Join,
    /// Checked when a request to join is approved.
    Approve,
}

impl fmt::Display for ConstraintClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintClass::Join => f.write_str("join"),
            ConstraintClass::Approve => f.write_str("approve"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    String,
    Int,
    Bool,
    /// Number of seconds.
    Duration,
}

/// An input that a check requires or accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: String,
    pub display_name: String,
    pub property_type: PropertyType,
    pub required: bool,
    pub min: Option<i64>,
    pub max: Option<i64>,
}

impl Property {
    pub fn new(name: &str, display_name: &str, property_type: PropertyType) -> Self {
        Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
            property_type,
            required: true,
            min: None,
            max: None,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn range(mut self, min: Option<i64>, max: Option<i64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// Ok(false) if the value has the right type but is out of range.
    fn validate(&self, value: &Value) -> Result<bool, EvaluationError> {
        let invalid = |reason: &str| EvaluationError::InvalidInput {
            name: self.name.clone(),
            reason: reason.to_string(),
        };
        match self.property_type {
            PropertyType::String if value.is_string() => Ok(true),
            PropertyType::Bool if value.is_boolean() => Ok(true),
            PropertyType::Int | PropertyType::Duration => {
                let n = value.as_i64().ok_or_else(|| invalid("expected an integer"))?;
                Ok(self.min.map_or(true, |min| n >= min) && self.max.map_or(true, |max| n <= max))
            }
            PropertyType::String => Err(invalid("expected a string")),
            PropertyType::Bool => Err(invalid("expected a boolean")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintKind {
    /// Limits how long a membership may last. If `min == max` the expiry is
    /// fixed, otherwise the user picks one within the range.
    Expiry { min: Duration, max: Duration },
    /// A boolean expression over declared variables.
    Expression {
        expression: String,
        variables: Vec<Property>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    name: String,
    display_name: String,
    kind: ConstraintKind,
}

impl Constraint {
    pub const EXPIRY: &'static str = "expiry";

    pub fn new(name: &str, display_name: &str, kind: ConstraintKind) -> Result<Self, PolicyError> {
        let name = name.trim().to_lowercase();
        if name.is_empty() {
            return Err(PolicyError::InvalidConstraint {
                name,
                reason: "the constraint must have a name".into(),
            });
        }
        if let ConstraintKind::Expiry { min, max } = &kind {
            if *min <= Duration::zero() || min > max {
                return Err(PolicyError::InvalidConstraint {
                    name,
                    reason: "expiry must be positive and min must not exceed max".into(),
                });
            }
        }
        Ok(Self {
            display_name: if display_name.trim().is_empty() {
                name.clone()
            } else {
                display_name.to_string()
            },
            name,
            kind,
        })
    }

    pub fn expiry(min: Duration, max: Duration) -> Result<Self, PolicyError> {
        Self::new(Self::EXPIRY, "Expiry", ConstraintKind::Expiry { min, max })
    }

    pub fn expression(
        name: &str,
        display_name: &str,
        expression: &str,
        variables: Vec<Property>,
    ) -> Result<Self, PolicyError> {
        Self::new(
            name,
            display_name,
            ConstraintKind::Expression {
                expression: expression.to_string(),
                variables,
            },
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn kind(&self) -> &ConstraintKind {
        &self.kind
    }

    pub fn create_check(&self) -> Check<'_> {
        Check { constraint: self }
    }
}

/// Named input values for a check.
///
/// User-provided values are matched against the check's declared
/// [`Property`] list and exposed to expressions as `input.<name>`. Context
/// values (such as `subject`) are exposed at the top level.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckInput {
    inputs: Map<String, Value>,
    context: Map<String, Value>,
}

impl CheckInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.inputs.insert(name.to_string(), value.into());
        self
    }

    pub fn with_context(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.context.insert(name.to_string(), value.into());
        self
    }

    /// Expose the subject as `subject.email` and `subject.principals`.
    pub fn with_subject(self, subject: &Subject) -> Self {
        let principals: Vec<String> = subject
            .principal_ids()
            .iter()
            .map(|id| id.to_string())
            .collect();
        self.with_context(
            "subject",
            json!({
                "email": subject.user().email(),
                "principals": principals,
            }),
        )
    }

    pub fn input(&self, name: &str) -> Option<&Value> {
        self.inputs.get(name)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Check<'a> {
    constraint: &'a Constraint,
}

impl<'a> Check<'a> {
    pub fn constraint(&self) -> &'a Constraint {
        self.constraint
    }

    /// Properties this check takes as input.
    pub fn input(&self) -> Vec<Property> {
        match &self.constraint.kind {
            ConstraintKind::Expiry { min, max } if min == max => vec![],
            ConstraintKind::Expiry { min, max } => vec![Property::new(
                Constraint::EXPIRY,
                "Expiry (seconds)",
                PropertyType::Duration,
            )
            .range(Some(min.num_seconds()), Some(max.num_seconds()))],
            ConstraintKind::Expression { variables, .. } => variables.clone(),
        }
    }

    pub fn evaluate(&self, input: &CheckInput) -> Result<bool, EvaluationError> {
        let mut declared = Map::new();
        let mut in_range = true;
        for property in self.input() {
            match input.input(&property.name) {
                Some(value) => {
                    in_range &= property.validate(value)?;
                    declared.insert(property.name.clone(), value.clone());
                }
                None if property.required => {
                    return Err(EvaluationError::MissingInput(property.name));
                }
                None => {
                    declared.insert(property.name.clone(), Value::Null);
                }
            }
        }
        if !in_range {
            return Ok(false);
        }

        match &self.constraint.kind {
            ConstraintKind::Expiry { .. } => Ok(true),
            ConstraintKind::Expression { expression, .. } => {
                let mut context = input.context.clone();
                context.insert("input".into(), Value::Object(declared));
                expression::evaluate(&expression::parse(expression)?, &Value::Object(context))
            }
        }
    }
}
