use crate::token::TokenKind;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl ArithOp {
    pub fn from_token(kind: &TokenKind) -> Option<Self> {
        match kind {
            TokenKind::Plus => Some(ArithOp::Add),
            TokenKind::Minus => Some(ArithOp::Subtract),
            TokenKind::Star => Some(ArithOp::Multiply),
            TokenKind::Slash => Some(ArithOp::Divide),
            _ => None,
        }
    }

    /// Compile-time evaluation with 64-bit wraparound. Division truncates
    /// toward zero; division by zero is left for run time.
    pub fn evaluate(self, left: i64, right: i64) -> Option<i64> {
        match self {
            ArithOp::Add => Some(left.wrapping_add(right)),
            ArithOp::Subtract => Some(left.wrapping_sub(right)),
            ArithOp::Multiply => Some(left.wrapping_mul(right)),
            ArithOp::Divide if right != 0 => Some(left.wrapping_div(right)),
            ArithOp::Divide => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Subtract => "-",
            ArithOp::Multiply => "*",
            ArithOp::Divide => "/",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    Equal,
    NotEqual,
}

impl CompareOp {
    pub fn from_token(kind: &TokenKind) -> Option<Self> {
        match kind {
            TokenKind::Less => Some(CompareOp::Less),
            TokenKind::Greater => Some(CompareOp::Greater),
            TokenKind::LessEqual => Some(CompareOp::LessEqual),
            TokenKind::GreaterEqual => Some(CompareOp::GreaterEqual),
            TokenKind::EqualEqual => Some(CompareOp::Equal),
            TokenKind::BangEqual => Some(CompareOp::NotEqual),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Less => "<",
            CompareOp::Greater => ">",
            CompareOp::LessEqual => "<=",
            CompareOp::GreaterEqual => ">=",
            CompareOp::Equal => "==",
            CompareOp::NotEqual => "!=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

impl LogicalOp {
    pub fn from_token(kind: &TokenKind) -> Option<Self> {
        match kind {
            TokenKind::AndAnd => Some(LogicalOp::And),
            TokenKind::OrOr => Some(LogicalOp::Or),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            LogicalOp::And => "&&",
            LogicalOp::Or => "||",
        }
    }
}

impl fmt::Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}
