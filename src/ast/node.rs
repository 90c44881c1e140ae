use super::{ArithOp, CompareOp, LogicalOp};
use crate::{
    source_location::Position,
    types::{FunctionType, Type},
};

/// Index of a node in its `Ast` arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    IntLiteral(i64),
    CharLiteral(u8),
    BoolLiteral(bool),
    StringLiteral(Vec<u8>),
    NullLiteral,
    Identifier(String),
    /// `(& x)`. Only names can have their address taken.
    AddressOf(String),
    Dereference(NodeId),
    VarDecl {
        name: String,
        ty: Type,
    },
    Assign {
        name: String,
        value: NodeId,
    },
    AssignThroughPointer {
        pointer: NodeId,
        value: NodeId,
    },
    While {
        condition: NodeId,
        body: NodeId,
    },
    If {
        condition: NodeId,
        then_branch: NodeId,
        else_branch: Option<NodeId>,
    },
    Return(Option<NodeId>),
    Block(Vec<NodeId>),
    FunctionDecl {
        name: String,
        params: Vec<Param>,
        return_type: Type,
        body: Vec<NodeId>,
    },
    Extern {
        name: String,
        params: Vec<Type>,
        return_type: Type,
        library: String,
        variadic: bool,
    },
    FunctionCall {
        callee: NodeId,
        args: Vec<NodeId>,
    },
    Arithmetic {
        op: ArithOp,
        left: NodeId,
        right: NodeId,
    },
    Comparison {
        op: CompareOp,
        left: NodeId,
        right: NodeId,
    },
    Logical {
        op: LogicalOp,
        left: NodeId,
        right: NodeId,
    },
    Not(NodeId),
    /// Address of element `index` of `array`. The result keeps the pointer
    /// type of `array`; reading the element takes an explicit `(@ ...)`.
    Index {
        array: NodeId,
        index: NodeId,
    },
    SizeOf(Type),
    ArrayLiteral(Vec<NodeId>),
    Cast {
        ty: Type,
        value: NodeId,
    },
}

impl NodeKind {
    /// Ordered child slots for generic walks. `None` marks an absent
    /// optional child (`if` without else, bare `return`).
    pub fn children(&self) -> Vec<Option<NodeId>> {
        match self {
            NodeKind::IntLiteral(_)
            | NodeKind::CharLiteral(_)
            | NodeKind::BoolLiteral(_)
            | NodeKind::StringLiteral(_)
            | NodeKind::NullLiteral
            | NodeKind::Identifier(_)
            | NodeKind::AddressOf(_)
            | NodeKind::VarDecl { .. }
            | NodeKind::Extern { .. }
            | NodeKind::SizeOf(_) => Vec::new(),
            NodeKind::Dereference(inner) | NodeKind::Not(inner) => vec![Some(*inner)],
            NodeKind::Assign { value, .. } | NodeKind::Cast { value, .. } => vec![Some(*value)],
            NodeKind::AssignThroughPointer { pointer, value } => {
                vec![Some(*pointer), Some(*value)]
            }
            NodeKind::While { condition, body } => vec![Some(*condition), Some(*body)],
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            } => vec![Some(*condition), Some(*then_branch), *else_branch],
            NodeKind::Return(value) => vec![*value],
            NodeKind::Block(statements) | NodeKind::ArrayLiteral(statements) => {
                statements.iter().copied().map(Some).collect()
            }
            NodeKind::FunctionDecl { body, .. } => body.iter().copied().map(Some).collect(),
            NodeKind::FunctionCall { callee, args } => std::iter::once(*callee)
                .chain(args.iter().copied())
                .map(Some)
                .collect(),
            NodeKind::Arithmetic { left, right, .. }
            | NodeKind::Comparison { left, right, .. }
            | NodeKind::Logical { left, right, .. } => vec![Some(*left), Some(*right)],
            NodeKind::Index { array, index } => vec![Some(*array), Some(*index)],
        }
    }

    pub fn is_int_literal(&self) -> bool {
        matches!(self, NodeKind::IntLiteral(_))
    }

    pub fn is_top_level(&self) -> bool {
        matches!(self, NodeKind::FunctionDecl { .. } | NodeKind::Extern { .. })
    }

    /// Signature declared by a `func` or `extern` node.
    pub fn signature(&self) -> Option<FunctionType> {
        match self {
            NodeKind::FunctionDecl {
                params,
                return_type,
                ..
            } => Some(FunctionType::new(
                return_type.clone(),
                params.iter().map(|p| p.ty.clone()).collect(),
            )),
            NodeKind::Extern {
                params,
                return_type,
                variadic,
                ..
            } => Some(FunctionType {
                return_type: Box::new(return_type.clone()),
                params: params.clone(),
                variadic: *variadic,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub position: Position,
}

impl Node {
    pub fn new(kind: NodeKind, position: Position) -> Self {
        Self { kind, position }
    }
}
