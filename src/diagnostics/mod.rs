use crate::{
    error::{BadError, ErrorKind},
    source_location::Position,
};
use colored::*;
use std::path::Path;

#[derive(Debug)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub message: String,
    pub position: Option<Position>,
    pub hints: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Error,
    /// A compiler defect rather than a problem in the program.
    InternalError,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Error,
            message: message.into(),
            position: None,
            hints: Vec::new(),
        }
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hints.push(hint.into());
        self
    }

    pub fn from_error(err: &BadError) -> Self {
        let mut diagnostic = match err.kind() {
            ErrorKind::CodegenError => Self {
                level: DiagnosticLevel::InternalError,
                ..Self::error(err.message())
            }
            .with_hint("frame bookkeeping failed while lowering valid input"),
            ErrorKind::LexerError => Self::error(format!("lexical error: {}", err.message())),
            ErrorKind::ParserError => Self::error(format!("syntax error: {}", err.message())),
            ErrorKind::TypeError => Self::error(format!("type error: {}", err.message())),
            ErrorKind::Io => Self::error(err.message()),
        };
        if let Some(position) = err.position() {
            diagnostic = diagnostic.with_position(position);
        }
        diagnostic
    }

    /// Renders the diagnostic with the offending source line and a caret
    /// under the reported column.
    pub fn report(&self, file: &Path, source: &str) -> String {
        let mut output = String::new();

        let prefix = match self.level {
            DiagnosticLevel::Error => "error".red().bold(),
            DiagnosticLevel::InternalError => "internal compiler error".red().bold(),
        };
        output.push_str(&format!("{}: {}\n", prefix, self.message));

        if let Some(position) = self.position {
            output.push_str(&format!(
                " --> {}:{}:{}\n",
                file.display(),
                position.line,
                position.column
            ));
            if let Some(line) = source_line(source, position.line) {
                let column = position.column.max(1) as usize;
                output.push_str("    |\n");
                output.push_str(&format!("{:3} | {}\n", position.line, line));
                output.push_str(&format!(
                    "    | {}{}\n",
                    " ".repeat(column - 1),
                    "^".green()
                ));
            }
        }

        for hint in &self.hints {
            output.push_str(&format!("help: {}\n", hint.blue()));
        }

        output
    }
}

fn source_line(source: &str, line: u32) -> Option<&str> {
    let index = (line as usize).checked_sub(1)?;
    source.lines().nth(index).map(str::trim_end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_points_at_column() {
        colored::control::set_override(false);
        let source = "(func main () int\n  (return x))\n";
        let err = BadError::type_error(
            Position::new(2, 11),
            "Identifier x not declared in this scope",
        );
        let report = Diagnostic::from_error(&err).report(Path::new("main.bad"), source);
        assert!(report.starts_with("error: type error: Identifier x not declared"));
        assert!(report.contains(" --> main.bad:2:11\n"));
        assert!(report.contains("  2 |   (return x))\n"));
        assert!(report.contains(&format!("    | {}^\n", " ".repeat(10))));
    }

    #[test]
    fn test_codegen_errors_are_internal() {
        colored::control::set_override(false);
        let err = BadError::codegen_error("pop from an empty temporary area");
        let diagnostic = Diagnostic::from_error(&err);
        assert_eq!(diagnostic.level, DiagnosticLevel::InternalError);
        let report = diagnostic.report(Path::new("x.bad"), "");
        assert!(report.starts_with("internal compiler error: pop from an empty"));
        assert!(!report.contains("-->"));
    }
}
