//! Error handling for minicc

use std::fmt;

use crate::frontend::token::TokenKind;
use crate::pipeline::Stage;
use crate::utils::Coordinates;
use serde::Serialize;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Compiler error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // ==================== Parser Errors ====================

    #[error("Unexpected token: expected {expected}, got '{found}' ({kind:?})")]
    UnexpectedToken {
        expected: String,
        found: String,
        kind: TokenKind,
        at: Coordinates,
    },

    #[error("Invalid integer literal: {lexeme}")]
    InvalidLiteral { lexeme: String, at: Coordinates },

    // ==================== Semantic Errors ====================

    #[error("Undeclared identifier: {name}")]
    UndeclaredIdentifier { name: String, at: Coordinates },

    #[error("Redefinition of '{name}' in the same scope")]
    Redefinition { name: String, at: Coordinates },

    // ==================== Internal Errors ====================

    #[error("Unsupported operation in {stage}: {detail}")]
    Unsupported { stage: Stage, detail: String },

    #[error("No input for {stage}: an earlier stage has not completed")]
    NoInput { stage: Stage },
}

/// Which part of the pipeline an error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCategory {
    Parse,
    Semantic,
    /// A codegen fault: the input reached a lowering rule that does not cover it
    Internal,
    Pipeline,
}

impl Error {
    /// Get the source location associated with this error
    pub fn coordinates(&self) -> Option<Coordinates> {
        match self {
            Self::UnexpectedToken { at, .. } => Some(*at),
            Self::InvalidLiteral { at, .. } => Some(*at),
            Self::UndeclaredIdentifier { at, .. } => Some(*at),
            Self::Redefinition { at, .. } => Some(*at),
            Self::Unsupported { .. } | Self::NoInput { .. } => None,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnexpectedToken { .. } | Self::InvalidLiteral { .. } => ErrorCategory::Parse,
            Self::UndeclaredIdentifier { .. } | Self::Redefinition { .. } => {
                ErrorCategory::Semantic
            }
            Self::Unsupported { .. } => ErrorCategory::Internal,
            Self::NoInput { .. } => ErrorCategory::Pipeline,
        }
    }

    pub(crate) fn unsupported(stage: Stage, detail: impl Into<String>) -> Self {
        Self::Unsupported {
            stage,
            detail: detail.into(),
        }
    }
}

/// A fatal stage failure together with the source line it points at
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub stage: Stage,
    pub error: Error,
    pub line_text: Option<String>,
}

impl Diagnostic {
    pub fn new(stage: Stage, error: Error, line_text: Option<String>) -> Self {
        Self {
            stage,
            error,
            line_text,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.error.coordinates() {
            Some(at) => write!(f, "{} error at {}: {}", self.stage, at, self.error)?,
            None => write!(f, "{} error: {}", self.stage, self.error)?,
        }
        if let (Some(line), Some(at)) = (&self.line_text, self.error.coordinates()) {
            let marker = " ".repeat(at.column.saturating_sub(1));
            write!(f, "\n  | {}\n  | {}^", line, marker)?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostic {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
