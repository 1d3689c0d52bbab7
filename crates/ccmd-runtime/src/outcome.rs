use ccmd_core::RenderError;

/// Result of one render.
///
/// A parse or context failure produces nothing worth sending. An execution
/// failure keeps whatever the template printed before it stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutcome {
    Success(String),
    PartialFailure { output: String, error: RenderError },
    Fatal(RenderError),
}

impl RenderOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Sanitized text, empty for fatal outcomes.
    pub fn output(&self) -> &str {
        match self {
            Self::Success(output) | Self::PartialFailure { output, .. } => output,
            Self::Fatal(_) => "",
        }
    }

    pub fn error(&self) -> Option<&RenderError> {
        match self {
            Self::Success(_) => None,
            Self::PartialFailure { error, .. } | Self::Fatal(error) => Some(error),
        }
    }

    pub fn into_parts(self) -> (String, Option<RenderError>) {
        match self {
            Self::Success(output) => (output, None),
            Self::PartialFailure { output, error } => (output, Some(error)),
            Self::Fatal(error) => (String::new(), Some(error)),
        }
    }
}

#[cfg(test)]
mod outcome_tests {
    use super::*;
    use ccmd_core::TemplateError;

    #[test]
    fn accessors_follow_the_variant() {
        let error = RenderError::Execution(TemplateError::new("TEMPLATE_EXEC_ERROR", "boom"));
        let partial = RenderOutcome::PartialFailure {
            output: "a".to_string(),
            error: error.clone(),
        };
        assert_eq!(partial.output(), "a");
        assert_eq!(partial.error().map(RenderError::code), Some("TEMPLATE_EXEC_ERROR"));
        assert!(!partial.is_success());

        let fatal = RenderOutcome::Fatal(error);
        assert_eq!(fatal.output(), "");
        assert_eq!(fatal.into_parts().0, "");

        let ok = RenderOutcome::Success("x".to_string());
        assert!(ok.is_success());
        assert_eq!(ok.into_parts(), ("x".to_string(), None));
    }
}
