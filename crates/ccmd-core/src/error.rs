use std::fmt;

use thiserror::Error;

use crate::types::SourceSpan;

#[derive(Debug, Error, Clone, PartialEq)]
#[error("{code}: {message}")]
pub struct TemplateError {
    pub code: String,
    pub message: String,
    pub span: Option<SourceSpan>,
}

impl TemplateError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            span: None,
        }
    }

    pub fn with_span(
        code: impl Into<String>,
        message: impl Into<String>,
        span: SourceSpan,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            span: Some(span),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStage {
    Context,
    Parse,
    Execution,
}

impl fmt::Display for RenderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Context => "context",
            Self::Parse => "parse",
            Self::Execution => "execution",
        };
        f.write_str(name)
    }
}

/// A [`TemplateError`] tagged with the render stage it escaped from.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RenderError {
    #[error("invalid render context: {0}")]
    Context(TemplateError),
    #[error("failed parsing template: {0}")]
    Parse(TemplateError),
    #[error("failed executing template: {0}")]
    Execution(TemplateError),
}

impl RenderError {
    pub fn stage(&self) -> RenderStage {
        match self {
            Self::Context(_) => RenderStage::Context,
            Self::Parse(_) => RenderStage::Parse,
            Self::Execution(_) => RenderStage::Execution,
        }
    }

    pub fn inner(&self) -> &TemplateError {
        match self {
            Self::Context(error) | Self::Parse(error) | Self::Execution(error) => error,
        }
    }

    pub fn code(&self) -> &str {
        &self.inner().code
    }
}
