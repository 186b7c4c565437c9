use crate::language::errors::{SyntaxError, SyntaxErrors};
use crate::runtime::{error::EvalError, interpreter::PhotonError};
use miette::{Diagnostic, NamedSource, Report, SourceSpan};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic, Clone)]
#[error("{message}")]
pub struct SyntaxDiagnostic {
    #[source_code]
    src: NamedSource<String>,
    #[label("here")]
    span: SourceSpan,
    #[help]
    help: Option<String>,
    message: String,
}

impl SyntaxDiagnostic {
    pub fn from_error(src: NamedSource<String>, err: &SyntaxError) -> Self {
        Self {
            src,
            span: err.to_source_span(),
            help: err.help.clone(),
            message: err.message.clone(),
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
pub struct EvalDiagnostic {
    #[source_code]
    src: NamedSource<String>,
    #[label("{label}")]
    span: Option<SourceSpan>,
    #[help]
    help: Option<String>,
    message: String,
    label: String,
}

impl EvalDiagnostic {
    /// The label points at the innermost located cause; the remaining
    /// messages of the chain become the help text.
    pub fn from_error(src: NamedSource<String>, err: &EvalError) -> Self {
        let mut messages = err.messages().into_iter();
        let message = messages.next().unwrap_or_default();
        let causes = messages.collect::<Vec<_>>();
        let span = err
            .innermost_location()
            .map(|location| SourceSpan::from((location.span.start, location.span.len())));
        let label = causes.last().cloned().unwrap_or_else(|| message.clone());
        let help = (!causes.is_empty()).then(|| format!("caused by: {}", causes.join(": ")));
        Self {
            src,
            span,
            help,
            message,
            label,
        }
    }
}

pub fn emit_syntax_errors(errors: &SyntaxErrors) {
    let src = NamedSource::new(errors.file.clone(), errors.source.clone());
    for err in &errors.errors {
        let diagnostic = SyntaxDiagnostic::from_error(src.clone(), err);
        eprintln!("{:?}", Report::new(diagnostic));
    }
}

pub fn emit_eval_error(file: &str, source: &str, error: &EvalError) {
    let src = NamedSource::new(file, source.to_string());
    eprintln!("{:?}", Report::new(EvalDiagnostic::from_error(src, error)));
}

pub fn report_error(file: &str, source: &str, error: &PhotonError) {
    match error {
        PhotonError::Syntax(errors) => emit_syntax_errors(errors),
        PhotonError::Eval(error) => emit_eval_error(file, source, error),
    }
}

pub fn report_io_error(path: &Path, error: &std::io::Error) {
    eprintln!("Failed to access {}: {}", path.display(), error);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::span::{LineIndex, Location, Span};
    use crate::runtime::error::TypeError;

    #[test]
    fn eval_label_uses_innermost_location() {
        let source = "val x = 1\nx.foo()";
        let lines = LineIndex::new(source);
        let outer = Location::new("main.ph".into(), Span::new(0, 9), &lines);
        let inner = Location::new("main.ph".into(), Span::new(10, 17), &lines);
        let error = EvalError::from(TypeError::new("Cannot assign type Int to String", Some(inner)))
            .wrap("Incompatible return type", Some(outer));

        let diagnostic = EvalDiagnostic::from_error(NamedSource::new("main.ph", source.to_string()), &error);

        assert_eq!(diagnostic.span, Some(SourceSpan::from((10, 7))));
        assert_eq!(diagnostic.message, "Incompatible return type");
        assert_eq!(diagnostic.label, "Cannot assign type Int to String");
        assert_eq!(
            diagnostic.help.as_deref(),
            Some("caused by: Cannot assign type Int to String")
        );
    }
}
