use crate::{source_location::Position, types::Primitive};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    LeftParen,
    RightParen,

    // Type keywords
    Type(Primitive),

    // Reserved words
    VarDec,
    Assign,
    AssignPtr,
    While,
    If,
    Return,
    Block,
    Call,
    Func,
    Extern,
    Index,
    SizeOf,
    Array,
    Cast,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    EqualEqual,
    BangEqual,
    AndAnd,
    OrOr,
    Bang,
    Ampersand,
    At,
    Ellipsis,

    // Literals
    Identifier(String),
    Int(i64),
    Char(u8),
    /// Raw bytes after escape processing.
    Str(Vec<u8>),
    Bool(bool),
    Null,

    EOF,
}

impl TokenKind {
    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            TokenKind::Int(_)
                | TokenKind::Char(_)
                | TokenKind::Str(_)
                | TokenKind::Bool(_)
                | TokenKind::Null
        )
    }

    pub fn from_word(word: &str) -> TokenKind {
        match word {
            "int" => TokenKind::Type(Primitive::Int64),
            "int32" => TokenKind::Type(Primitive::Int32),
            "int16" => TokenKind::Type(Primitive::Int16),
            "uint" => TokenKind::Type(Primitive::UInt64),
            "uint32" => TokenKind::Type(Primitive::UInt32),
            "uint16" => TokenKind::Type(Primitive::UInt16),
            "char" => TokenKind::Type(Primitive::Char),
            "uchar" => TokenKind::Type(Primitive::UChar),
            "bool" => TokenKind::Type(Primitive::Bool),
            "void" => TokenKind::Type(Primitive::Void),
            "vardec" => TokenKind::VarDec,
            "assign" => TokenKind::Assign,
            "assignptr" => TokenKind::AssignPtr,
            "while" => TokenKind::While,
            "if" => TokenKind::If,
            "return" => TokenKind::Return,
            "block" => TokenKind::Block,
            "call" => TokenKind::Call,
            "func" => TokenKind::Func,
            "extern" => TokenKind::Extern,
            "index" => TokenKind::Index,
            "sizeof" => TokenKind::SizeOf,
            "array" => TokenKind::Array,
            "cast" => TokenKind::Cast,
            "true" => TokenKind::Bool(true),
            "false" => TokenKind::Bool(false),
            "null" => TokenKind::Null,
            _ => TokenKind::Identifier(word.to_string()),
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::LeftParen => write!(f, "("),
            TokenKind::RightParen => write!(f, ")"),
            TokenKind::Type(p) => write!(f, "{}", p.keyword()),
            TokenKind::VarDec => write!(f, "vardec"),
            TokenKind::Assign => write!(f, "assign"),
            TokenKind::AssignPtr => write!(f, "assignptr"),
            TokenKind::While => write!(f, "while"),
            TokenKind::If => write!(f, "if"),
            TokenKind::Return => write!(f, "return"),
            TokenKind::Block => write!(f, "block"),
            TokenKind::Call => write!(f, "call"),
            TokenKind::Func => write!(f, "func"),
            TokenKind::Extern => write!(f, "extern"),
            TokenKind::Index => write!(f, "index"),
            TokenKind::SizeOf => write!(f, "sizeof"),
            TokenKind::Array => write!(f, "array"),
            TokenKind::Cast => write!(f, "cast"),
            TokenKind::Plus => write!(f, "+"),
            TokenKind::Minus => write!(f, "-"),
            TokenKind::Star => write!(f, "*"),
            TokenKind::Slash => write!(f, "/"),
            TokenKind::Less => write!(f, "<"),
            TokenKind::Greater => write!(f, ">"),
            TokenKind::LessEqual => write!(f, "<="),
            TokenKind::GreaterEqual => write!(f, ">="),
            TokenKind::EqualEqual => write!(f, "=="),
            TokenKind::BangEqual => write!(f, "!="),
            TokenKind::AndAnd => write!(f, "&&"),
            TokenKind::OrOr => write!(f, "||"),
            TokenKind::Bang => write!(f, "!"),
            TokenKind::Ampersand => write!(f, "&"),
            TokenKind::At => write!(f, "@"),
            TokenKind::Ellipsis => write!(f, "..."),
            TokenKind::Identifier(name) => write!(f, "{}", name),
            TokenKind::Int(value) => write!(f, "{}", value),
            TokenKind::Char(c) => write!(f, "'{}'", escape_byte(*c)),
            TokenKind::Str(bytes) => {
                write!(f, "\"")?;
                for b in bytes {
                    write!(f, "{}", escape_byte(*b))?;
                }
                write!(f, "\"")
            }
            TokenKind::Bool(value) => write!(f, "{}", value),
            TokenKind::Null => write!(f, "null"),
            TokenKind::EOF => write!(f, "end of file"),
        }
    }
}

/// Inverse of the lexer's escape handling.
pub fn escape_byte(byte: u8) -> String {
    match byte {
        b'\n' => "\\n".to_string(),
        b'\t' => "\\t".to_string(),
        b'\r' => "\\r".to_string(),
        0 => "\\0".to_string(),
        b'\'' => "\\'".to_string(),
        b'"' => "\\\"".to_string(),
        b'\\' => "\\\\".to_string(),
        other => (other as char).to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: Position,
}

impl Token {
    pub fn new(kind: TokenKind, position: Position) -> Self {
        Self { kind, position }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_words() {
        assert_eq!(TokenKind::from_word("assignptr"), TokenKind::AssignPtr);
        assert_eq!(
            TokenKind::from_word("uint16"),
            TokenKind::Type(Primitive::UInt16)
        );
        assert_eq!(TokenKind::from_word("null"), TokenKind::Null);
        assert_eq!(
            TokenKind::from_word("blocks"),
            TokenKind::Identifier("blocks".to_string())
        );
    }

    #[test]
    fn test_string_display_escapes() {
        let kind = TokenKind::Str(b"a\"b\n".to_vec());
        assert_eq!(kind.to_string(), "\"a\\\"b\\n\"");
    }
}
