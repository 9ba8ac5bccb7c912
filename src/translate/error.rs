use serde::Serialize;

use super::position::Position;

/// A recoverable problem found while translating, with its source location.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub message: String,
    pub pos: Position,
    pub kind: DiagnosticKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiagnosticKind {
    Lexical,
    SyntaxToken,
    SyntaxEof,
    UndeclaredIdentifier,
    Redeclaration,
    DimensionMismatch,
    UnsupportedOperator,
    MalformedDeclaration,
    MissingType,
    ArgumentCount,
    MisplacedStatement,
    CapturedLexical,
}

impl DiagnosticKind {
    pub fn label(self) -> &'static str {
        match self {
            DiagnosticKind::Lexical => "lexical",
            DiagnosticKind::SyntaxToken | DiagnosticKind::SyntaxEof => "syntax",
            DiagnosticKind::UndeclaredIdentifier => "undeclared",
            DiagnosticKind::Redeclaration => "redeclaration",
            DiagnosticKind::DimensionMismatch => "dimension",
            DiagnosticKind::UnsupportedOperator => "operator",
            DiagnosticKind::MalformedDeclaration => "declaration",
            DiagnosticKind::MissingType => "type",
            DiagnosticKind::ArgumentCount => "arguments",
            DiagnosticKind::MisplacedStatement => "statement",
            DiagnosticKind::CapturedLexical => "capture",
        }
    }
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>, pos: Position) -> Self {
        Self {
            message: message.into(),
            pos,
            kind,
        }
    }

    pub fn lexical(message: impl Into<String>, pos: Position) -> Self {
        Self::new(DiagnosticKind::Lexical, message, pos)
    }

    /// Unexpected token: names the token kind and its literal value.
    pub fn syntax_token(kind: &str, value: &str, pos: Position) -> Self {
        let message = if value.is_empty() {
            format!("unexpected {kind}")
        } else {
            format!("unexpected {kind} '{value}'")
        };
        Self::new(DiagnosticKind::SyntaxToken, message, pos)
    }

    /// Input ended while a construct was still open.
    pub fn syntax_eof(pos: Position) -> Self {
        Self::new(DiagnosticKind::SyntaxEof, "unexpected end of input", pos)
    }

    /// Format the diagnostic with source context.
    pub fn format_with_source(&self, source: &str) -> String {
        let (line, col) = offset_to_line_col(source, self.pos.offset);
        format!("[{}] line {}:{}: {}", self.kind.label(), line, col, self.message)
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.pos.line, self.message)
    }
}

fn offset_to_line_col(source: &str, offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut col = 1;
    for (i, ch) in source.char_indices() {
        if i >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_line_and_column() {
        let source = "my $x = 1;\nprint $y;\n";
        let d = Diagnostic::new(
            DiagnosticKind::UndeclaredIdentifier,
            "'$y' is not declared",
            Position::new(2, 17, 19),
        );
        assert_eq!(
            d.format_with_source(source),
            "[undeclared] line 2:7: '$y' is not declared"
        );
    }

    #[test]
    fn syntax_token_names_kind_and_value() {
        let d = Diagnostic::syntax_token("operator", "}", Position::default());
        assert_eq!(d.message, "unexpected operator '}'");
        assert_eq!(Diagnostic::syntax_eof(Position::default()).kind, DiagnosticKind::SyntaxEof);
    }
}
