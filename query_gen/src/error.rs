//! Error types for query generation.

use std::fmt;

/// Error that can occur while generating or assembling a query.
#[derive(Debug, Clone)]
pub struct GenError {
    pub kind: GenErrorKind,
    pub scope: String,
    pub context: Vec<String>,
}

/// Kind of generation error.
#[derive(Debug, Clone)]
pub enum GenErrorKind {
    /// No valid candidates available (e.g. no tables to select from).
    Exhausted { reason: String },

    /// Schema doesn't have required objects.
    SchemaEmpty { needed: String },

    /// Invalid configuration.
    InvalidConfig { message: String },

    /// An internal contract of the catalog or generator was broken.
    ///
    /// Never recoverable: the check that hit it must be reported as fatal.
    InvariantViolated { message: String },
}

impl GenError {
    /// Create an exhausted error.
    pub fn exhausted(scope: &str, reason: impl Into<String>) -> Self {
        Self {
            kind: GenErrorKind::Exhausted {
                reason: reason.into(),
            },
            scope: scope.to_string(),
            context: vec![],
        }
    }

    /// Create a schema empty error.
    pub fn schema_empty(needed: impl Into<String>) -> Self {
        Self {
            kind: GenErrorKind::SchemaEmpty {
                needed: needed.into(),
            },
            scope: String::new(),
            context: vec![],
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self {
            kind: GenErrorKind::InvalidConfig {
                message: message.into(),
            },
            scope: String::new(),
            context: vec![],
        }
    }

    /// Create an invariant violation.
    pub fn invariant(message: impl Into<String>) -> Self {
        Self {
            kind: GenErrorKind::InvariantViolated {
                message: message.into(),
            },
            scope: String::new(),
            context: vec![],
        }
    }

    /// Whether this error signals a generator or catalog defect.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, GenErrorKind::InvariantViolated { .. })
    }

    /// Add context to the error.
    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context.push(ctx.into());
        self
    }

    /// Set the scope.
    pub fn in_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }
}

impl fmt::Display for GenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            GenErrorKind::Exhausted { reason } => {
                if self.scope.is_empty() {
                    write!(f, "no valid candidates: {reason}")?;
                } else {
                    write!(f, "no valid candidates in scope '{}': {reason}", self.scope)?;
                }
            }
            GenErrorKind::SchemaEmpty { needed } => {
                write!(f, "schema missing required {needed}")?;
            }
            GenErrorKind::InvalidConfig { message } => {
                write!(f, "invalid configuration: {message}")?;
            }
            GenErrorKind::InvariantViolated { message } => {
                write!(f, "invariant violated: {message}")?;
            }
        }

        if !self.context.is_empty() {
            write!(f, "\n  context:")?;
            for c in &self.context {
                write!(f, "\n    - {c}")?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for GenError {}
