use crate::language::span::Location;
use std::error::Error as _;
use thiserror::Error;

pub type EvalResult<T> = Result<T, EvalError>;

/// Assignability failure raised by signature and interface checks.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("{message}")]
pub struct TypeError {
    pub message: String,
    pub location: Option<Location>,
    #[source]
    pub cause: Option<Box<TypeError>>,
}

impl TypeError {
    pub fn new(message: impl Into<String>, location: Option<Location>) -> Self {
        Self {
            message: message.into(),
            location,
            cause: None,
        }
    }

    pub fn wrap(self, message: impl Into<String>, location: Option<Location>) -> Self {
        let location = location.or_else(|| self.location.clone());
        Self {
            message: message.into(),
            location,
            cause: Some(Box::new(self)),
        }
    }
}

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("Could not find name `{name}`")]
    UnknownName {
        name: String,
        location: Option<Location>,
    },
    #[error("Type {type_name} does not have a method named `{method}`")]
    UnknownMethod {
        type_name: String,
        method: String,
        location: Option<Location>,
    },
    #[error("`{name}` is used before its definition")]
    UsedBeforeDefinition {
        name: String,
        location: Option<Location>,
    },
    #[error("Value of `{name}` is not available at this point")]
    ValueUnavailable {
        name: String,
        location: Option<Location>,
    },
    #[error("Compile-time function cannot capture the runtime value `{name}`")]
    CompileTimeCapture {
        name: String,
        location: Option<Location>,
    },
    #[error("{message}")]
    Arithmetic {
        message: String,
        location: Option<Location>,
    },
    #[error("Host call `{member}` failed: {message}")]
    Host {
        member: String,
        message: String,
        location: Option<Location>,
    },
    #[error("Maximum call depth of {limit} exceeded")]
    CallDepthExceeded {
        limit: usize,
        location: Option<Location>,
    },
    #[error("{message}")]
    Invalid {
        message: String,
        location: Option<Location>,
    },
    #[error(transparent)]
    Type(#[from] TypeError),
    #[error("{message}")]
    Wrapped {
        message: String,
        location: Option<Location>,
        #[source]
        source: Box<EvalError>,
    },
}

impl EvalError {
    pub fn invalid(message: impl Into<String>, location: Option<Location>) -> Self {
        EvalError::Invalid {
            message: message.into(),
            location,
        }
    }

    pub fn location(&self) -> Option<&Location> {
        match self {
            EvalError::UnknownName { location, .. }
            | EvalError::UnknownMethod { location, .. }
            | EvalError::UsedBeforeDefinition { location, .. }
            | EvalError::ValueUnavailable { location, .. }
            | EvalError::CompileTimeCapture { location, .. }
            | EvalError::Arithmetic { location, .. }
            | EvalError::Host { location, .. }
            | EvalError::CallDepthExceeded { location, .. }
            | EvalError::Invalid { location, .. }
            | EvalError::Wrapped { location, .. } => location.as_ref(),
            EvalError::Type(error) => error.location.as_ref(),
        }
    }

    /// Fills in the location if the error does not carry one yet.
    pub fn with_location(mut self, location: Option<&Location>) -> Self {
        let Some(location) = location else {
            return self;
        };
        if self.location().is_some() {
            return self;
        }
        match &mut self {
            EvalError::UnknownName { location: slot, .. }
            | EvalError::UnknownMethod { location: slot, .. }
            | EvalError::UsedBeforeDefinition { location: slot, .. }
            | EvalError::ValueUnavailable { location: slot, .. }
            | EvalError::CompileTimeCapture { location: slot, .. }
            | EvalError::Arithmetic { location: slot, .. }
            | EvalError::Host { location: slot, .. }
            | EvalError::CallDepthExceeded { location: slot, .. }
            | EvalError::Invalid { location: slot, .. }
            | EvalError::Wrapped { location: slot, .. } => *slot = Some(location.clone()),
            EvalError::Type(error) => error.location = Some(location.clone()),
        }
        self
    }

    /// Prepends context to the error. Type errors stay type errors.
    pub fn wrap(self, message: impl Into<String>, location: Option<Location>) -> Self {
        match self {
            EvalError::Type(error) => EvalError::Type(error.wrap(message, location)),
            other => {
                let location = location.or_else(|| other.location().cloned());
                EvalError::Wrapped {
                    message: message.into(),
                    location,
                    source: Box::new(other),
                }
            }
        }
    }

    /// Messages of this error followed by every cause.
    pub fn messages(&self) -> Vec<String> {
        let mut messages = vec![self.to_string()];
        let mut source = self.source();
        while let Some(error) = source {
            messages.push(error.to_string());
            source = error.source();
        }
        messages
    }

    /// Location of the innermost error in the cause chain that has one.
    pub fn innermost_location(&self) -> Option<&Location> {
        let inner = match self {
            EvalError::Wrapped { source, .. } => source.innermost_location(),
            EvalError::Type(error) => {
                let mut current = error;
                let mut found = current.location.as_ref();
                while let Some(cause) = &current.cause {
                    current = cause;
                    found = current.location.as_ref().or(found);
                }
                found
            }
            _ => None,
        };
        inner.or_else(|| self.location())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapping_type_errors_keeps_them_typed() {
        let error = EvalError::from(TypeError::new("Cannot assign type Int to String", None))
            .wrap("Incompatible method `age`", None);

        assert!(matches!(error, EvalError::Type(_)));
        assert_eq!(
            error.messages(),
            vec![
                "Incompatible method `age`".to_string(),
                "Cannot assign type Int to String".to_string(),
            ]
        );
    }

    #[test]
    fn wrapping_other_errors_builds_a_chain() {
        let error = EvalError::UnknownName {
            name: "x".into(),
            location: None,
        }
        .wrap("Could not build class A", None);

        assert_eq!(error.to_string(), "Could not build class A");
        assert_eq!(error.messages().len(), 2);
    }
}
