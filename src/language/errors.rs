use crate::language::span::Span;
use miette::SourceSpan;

#[derive(Clone, Debug)]
pub struct SyntaxError {
    pub message: String,
    pub label: String,
    pub span: Span,
    pub help: Option<String>,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        let message = message.into();
        Self {
            label: message.clone(),
            message,
            span,
            help: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn to_source_span(&self) -> SourceSpan {
        (self.span.start, self.span.len()).into()
    }
}

#[derive(Clone, Debug)]
pub struct SyntaxErrors {
    pub errors: Vec<SyntaxError>,
}

impl SyntaxErrors {
    pub fn new(errors: Vec<SyntaxError>) -> Self {
        Self { errors }
    }

    pub fn first_message(&self) -> &str {
        self.errors
            .first()
            .map(|err| err.message.as_str())
            .unwrap_or("syntax error")
    }
}

impl std::fmt::Display for SyntaxErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (idx, err) in self.errors.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{} at {}..{}", err.message, err.span.start, err.span.end)?;
        }
        Ok(())
    }
}

impl std::error::Error for SyntaxErrors {}
