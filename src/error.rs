use crate::source_location::Position;
use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BadError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    LexerError,
    ParserError,
    TypeError,
    CodegenError,
    Io,
}

/// Every failure raised by the compiler. The first one raised aborts the
/// current pass; nothing is retried.
#[derive(Debug, Error)]
pub enum BadError {
    #[error("Lexer error at {position}: {message}")]
    Lexer { position: Position, message: String },

    #[error("Parse error at {position}: {message}")]
    Parser { position: Position, message: String },

    #[error("Type error at {position}: {message}")]
    Type { position: Position, message: String },

    /// Frame bookkeeping went wrong. This is a compiler defect, not a
    /// problem with the program being compiled.
    #[error("Internal code generation error: {message}")]
    Codegen {
        position: Option<Position>,
        message: String,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl BadError {
    pub fn lexer_error(position: Position, message: impl Into<String>) -> Self {
        Self::Lexer {
            position,
            message: message.into(),
        }
    }

    pub fn parser_error(position: Position, message: impl Into<String>) -> Self {
        Self::Parser {
            position,
            message: message.into(),
        }
    }

    pub fn type_error(position: Position, message: impl Into<String>) -> Self {
        Self::Type {
            position,
            message: message.into(),
        }
    }

    pub fn codegen_error(message: impl Into<String>) -> Self {
        Self::Codegen {
            position: None,
            message: message.into(),
        }
    }

    pub fn codegen_error_at(position: Position, message: impl Into<String>) -> Self {
        Self::Codegen {
            position: Some(position),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            BadError::Lexer { .. } => ErrorKind::LexerError,
            BadError::Parser { .. } => ErrorKind::ParserError,
            BadError::Type { .. } => ErrorKind::TypeError,
            BadError::Codegen { .. } => ErrorKind::CodegenError,
            BadError::Io(_) => ErrorKind::Io,
        }
    }

    pub fn position(&self) -> Option<Position> {
        match self {
            BadError::Lexer { position, .. }
            | BadError::Parser { position, .. }
            | BadError::Type { position, .. } => Some(*position),
            BadError::Codegen { position, .. } => *position,
            BadError::Io(_) => None,
        }
    }

    /// The bare message, without the position prefix used by `Display`.
    pub fn message(&self) -> String {
        match self {
            BadError::Lexer { message, .. }
            | BadError::Parser { message, .. }
            | BadError::Type { message, .. }
            | BadError::Codegen { message, .. } => message.clone(),
            BadError::Io(err) => err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_error_display_includes_position() {
        let err = BadError::type_error(Position::new(3, 7), "No main function found");
        assert_eq!(err.kind(), ErrorKind::TypeError);
        assert_eq!(
            err.to_string(),
            "Type error at line 3, column 7: No main function found"
        );
        assert_eq!(err.message(), "No main function found");
    }

    #[test]
    fn test_codegen_error_has_no_position() {
        let err = BadError::codegen_error("temporary stack imbalance");
        assert_eq!(err.kind(), ErrorKind::CodegenError);
        assert!(err.position().is_none());
    }

    #[test]
    fn test_io_error_conversion() {
        let err: BadError = io::Error::new(io::ErrorKind::NotFound, "missing.bad").into();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
