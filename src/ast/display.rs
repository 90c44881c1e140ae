use super::{Ast, NodeId, NodeKind};
use crate::token::escape_byte;
use std::fmt;

/// Prints a node back as the S-expression it was parsed from. Uses an
/// explicit stack so arbitrarily deep trees print without recursion.
pub struct NodeDisplay<'a> {
    ast: &'a Ast,
    root: NodeId,
}

enum Piece {
    Text(String),
    Node(NodeId),
}

fn text(s: impl Into<String>) -> Piece {
    Piece::Text(s.into())
}

impl<'a> NodeDisplay<'a> {
    pub fn new(ast: &'a Ast, root: NodeId) -> Self {
        Self { ast, root }
    }

    fn pieces(&self, id: NodeId) -> Vec<Piece> {
        match self.ast.kind(id) {
            NodeKind::IntLiteral(value) => vec![text(value.to_string())],
            NodeKind::CharLiteral(c) => vec![text(format!("'{}'", escape_byte(*c)))],
            NodeKind::BoolLiteral(value) => vec![text(value.to_string())],
            NodeKind::StringLiteral(bytes) => {
                let body: String = bytes.iter().map(|b| escape_byte(*b)).collect();
                vec![text(format!("\"{}\"", body))]
            }
            NodeKind::NullLiteral => vec![text("null")],
            NodeKind::Identifier(name) => vec![text(name.clone())],
            NodeKind::AddressOf(name) => vec![text(format!("(& {})", name))],
            NodeKind::Dereference(inner) => vec![text("(@ "), Piece::Node(*inner), text(")")],
            NodeKind::VarDecl { name, ty } => vec![text(format!("(vardec {} {})", ty, name))],
            NodeKind::Assign { name, value } => vec![
                text(format!("(assign {} ", name)),
                Piece::Node(*value),
                text(")"),
            ],
            NodeKind::AssignThroughPointer { pointer, value } => vec![
                text("(assignptr "),
                Piece::Node(*pointer),
                text(" "),
                Piece::Node(*value),
                text(")"),
            ],
            NodeKind::While { condition, body } => vec![
                text("(while "),
                Piece::Node(*condition),
                text(" "),
                Piece::Node(*body),
                text(")"),
            ],
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let mut out = vec![
                    text("(if "),
                    Piece::Node(*condition),
                    text(" "),
                    Piece::Node(*then_branch),
                ];
                if let Some(else_branch) = else_branch {
                    out.push(text(" "));
                    out.push(Piece::Node(*else_branch));
                }
                out.push(text(")"));
                out
            }
            NodeKind::Return(None) => vec![text("(return)")],
            NodeKind::Return(Some(value)) => {
                vec![text("(return "), Piece::Node(*value), text(")")]
            }
            NodeKind::Block(statements) => list("(block", statements),
            NodeKind::FunctionDecl {
                name,
                params,
                return_type,
                body,
            } => {
                let params: Vec<String> = params
                    .iter()
                    .map(|p| format!("({} {})", p.ty, p.name))
                    .collect();
                let head = format!("(func {} ({}) {}", name, params.join(" "), return_type);
                list(&head, body)
            }
            NodeKind::Extern {
                name,
                params,
                return_type,
                library,
                variadic,
            } => {
                let mut types: Vec<String> = params.iter().map(|t| t.to_string()).collect();
                if *variadic {
                    types.push("...".to_string());
                }
                vec![text(format!(
                    "(extern {} ({}) {} \"{}\")",
                    name,
                    types.join(" "),
                    return_type,
                    library
                ))]
            }
            NodeKind::FunctionCall { callee, args } => {
                let mut out = vec![text("(call "), Piece::Node(*callee)];
                for arg in args {
                    out.push(text(" "));
                    out.push(Piece::Node(*arg));
                }
                out.push(text(")"));
                out
            }
            NodeKind::Arithmetic { op, left, right } => binary(op.symbol(), *left, *right),
            NodeKind::Comparison { op, left, right } => binary(op.symbol(), *left, *right),
            NodeKind::Logical { op, left, right } => binary(op.symbol(), *left, *right),
            NodeKind::Not(inner) => vec![text("(! "), Piece::Node(*inner), text(")")],
            NodeKind::Index { array, index } => binary("index", *array, *index),
            NodeKind::SizeOf(ty) => vec![text(format!("(sizeof {})", ty))],
            NodeKind::ArrayLiteral(items) => list("(array", items),
            NodeKind::Cast { ty, value } => vec![
                text(format!("(cast {} ", ty)),
                Piece::Node(*value),
                text(")"),
            ],
        }
    }
}

fn binary(head: &str, left: NodeId, right: NodeId) -> Vec<Piece> {
    vec![
        text(format!("({} ", head)),
        Piece::Node(left),
        text(" "),
        Piece::Node(right),
        text(")"),
    ]
}

fn list(head: &str, items: &[NodeId]) -> Vec<Piece> {
    let mut out = vec![text(head)];
    for item in items {
        out.push(text(" "));
        out.push(Piece::Node(*item));
    }
    out.push(text(")"));
    out
}

impl fmt::Display for NodeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut stack = vec![Piece::Node(self.root)];
        while let Some(piece) = stack.pop() {
            match piece {
                Piece::Text(s) => f.write_str(&s)?,
                Piece::Node(id) => stack.extend(self.pieces(id).into_iter().rev()),
            }
        }
        Ok(())
    }
}
