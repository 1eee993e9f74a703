use crate::{
    language::errors::{SyntaxError, SyntaxErrors},
    lint::{Shadowed, ShadowingHazard},
    runtime::error::RuntimeError,
};
use miette::{Diagnostic, NamedSource, Report, SourceSpan};
use thiserror::Error;

#[derive(Debug, Error, Diagnostic, Clone)]
#[error("{message}")]
#[diagnostic(code(sift::syntax))]
pub struct SyntaxDiagnostic {
    #[source_code]
    src: NamedSource<String>,
    #[label("{label}")]
    span: SourceSpan,
    #[help]
    help: Option<String>,
    message: String,
    label: String,
}

impl SyntaxDiagnostic {
    pub fn from_error(src: NamedSource<String>, err: SyntaxError) -> Self {
        Self {
            src,
            span: err.to_source_span(),
            help: err.help.clone(),
            message: err.message.clone(),
            label: err.label,
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
#[error("parameter `{param}` of `{function}` hides `{param}/0`")]
#[diagnostic(code(sift::lint::shadowing), severity(Warning))]
pub struct ShadowingDiagnostic {
    #[source_code]
    src: NamedSource<String>,
    #[label("references to `{param}` in the body call this argument")]
    span: SourceSpan,
    #[label("hidden definition")]
    hidden: Option<SourceSpan>,
    #[help]
    help: Option<String>,
    function: String,
    param: String,
}

impl ShadowingDiagnostic {
    pub fn from_hazard(src: NamedSource<String>, hazard: &ShadowingHazard) -> Self {
        let (hidden, help) = match hazard.shadowed {
            Shadowed::Builtin => (
                None,
                Some(format!("the builtin `{}` is unreachable inside this body", hazard.param)),
            ),
            Shadowed::Definition(span) | Shadowed::Parameter(span) => (Some(span.into()), None),
        };
        Self {
            src,
            span: hazard.param_span.into(),
            hidden,
            help,
            function: hazard.function.clone(),
            param: hazard.param.clone(),
        }
    }
}

pub fn emit_syntax_errors(name: &str, source: &str, errors: &SyntaxErrors) {
    let src = NamedSource::new(name, source.to_string());
    for err in &errors.errors {
        let diagnostic = SyntaxDiagnostic::from_error(src.clone(), err.clone());
        eprintln!("{:?}", Report::new(diagnostic));
    }
}

pub fn emit_shadowing_hazards(name: &str, source: &str, hazards: &[ShadowingHazard]) {
    let src = NamedSource::new(name, source.to_string());
    for hazard in hazards {
        let diagnostic = ShadowingDiagnostic::from_hazard(src.clone(), hazard);
        eprintln!("{:?}", Report::new(diagnostic));
    }
}

pub fn report_runtime_error(error: &RuntimeError) {
    eprintln!("Runtime error: {}", error);
}
