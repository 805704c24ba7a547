use crate::span::Span;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    /// A construct whose lowering does not exist for the operand combination at hand.
    #[error("Unsupported construct: {msg}")]
    Unsupported { msg: String, span: Span },

    /// The helper catalogue lacks an overload the generator requires.
    #[error("Missing runtime helper `{name}({signature})`")]
    MissingHelper { name: String, signature: String },

    #[error("Invariant violation: {msg}")]
    Invariant { msg: String },

    #[error("Emit error: {msg}")]
    Emit { msg: String },

    #[error("Config error: {msg}")]
    Config { msg: String, path: PathBuf },

    #[error("Input error: {msg}")]
    Input { msg: String },
}

impl CompileError {
    pub fn unsupported(msg: impl Into<String>, span: Span) -> Self {
        Self::Unsupported { msg: msg.into(), span }
    }

    pub fn missing_helper(name: impl Into<String>, signature: impl Into<String>) -> Self {
        Self::MissingHelper { name: name.into(), signature: signature.into() }
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant { msg: msg.into() }
    }

    pub fn emit(msg: impl Into<String>) -> Self {
        Self::Emit { msg: msg.into() }
    }

    pub fn config(msg: impl Into<String>, path: PathBuf) -> Self {
        Self::Config { msg: msg.into(), path }
    }

    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input { msg: msg.into() }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            CompileError::Unsupported { span, .. } if !span.is_dummy() => Some(*span),
            _ => None,
        }
    }
}

/// Render a CompileError with ariadne for nice terminal output.
pub fn render_error(source: &str, filename: &str, err: &CompileError) {
    use ariadne::{Label, Report, ReportKind, Source};

    match (err, err.span()) {
        (CompileError::Unsupported { msg, .. }, Some(span)) => {
            let end = span.end.min(source.len());
            let start = span.start.min(end);
            let printed = Report::build(ReportKind::Error, (), start)
                .with_message("unsupported construct")
                .with_label(Label::new(start..end).with_message(msg))
                .finish()
                .eprint(Source::from(source));
            if printed.is_err() {
                eprintln!("error[{filename}]: {msg}");
            }
        }
        (CompileError::Config { msg, path }, _) => {
            eprintln!("error[config]: {msg}");
            eprintln!("  --> {}", path.display());
        }
        _ => {
            eprintln!("error: {err}");
        }
    }
}
