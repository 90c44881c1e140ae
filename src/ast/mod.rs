mod display;
mod node;
mod operator;

pub use display::NodeDisplay;
pub use node::{Node, NodeId, NodeKind, Param};
pub use operator::{ArithOp, CompareOp, LogicalOp};

use crate::{source_location::Position, types::Type};
use std::collections::HashMap;

/// Arena holding every node of one program plus the ordered list of its
/// top-level declarations.
#[derive(Debug, Clone, Default)]
pub struct Ast {
    nodes: Vec<Node>,
    items: Vec<NodeId>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, kind: NodeKind, position: Position) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(kind, position));
        id
    }

    pub fn push_item(&mut self, id: NodeId) {
        self.items.push(id);
    }

    pub fn items(&self) -> &[NodeId] {
        &self.items
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.index()].kind
    }

    pub fn kind_mut(&mut self, id: NodeId) -> &mut NodeKind {
        &mut self.nodes[id.index()].kind
    }

    pub fn position(&self, id: NodeId) -> Position {
        self.nodes[id.index()].position
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn children(&self, id: NodeId) -> Vec<Option<NodeId>> {
        self.kind(id).children()
    }

    pub fn display(&self, id: NodeId) -> NodeDisplay<'_> {
        NodeDisplay::new(self, id)
    }

    /// Depth-first, left-to-right walk on an explicit stack. `visit`
    /// returns whether to descend into the node's children.
    pub fn walk<F>(&self, root: NodeId, mut visit: F)
    where
        F: FnMut(NodeId, &Node) -> bool,
    {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if visit(id, self.node(id)) {
                for child in self.children(id).into_iter().rev().flatten() {
                    stack.push(child);
                }
            }
        }
    }

    /// Whether any call appears strictly below `id` (callee included).
    pub fn has_sub_call(&self, id: NodeId) -> bool {
        let mut found = false;
        for child in self.children(id).into_iter().flatten() {
            self.walk(child, |_, node| {
                if matches!(node.kind, NodeKind::FunctionCall { .. }) {
                    found = true;
                }
                !found
            });
            if found {
                break;
            }
        }
        found
    }

    /// Temporary bytes needed by the node itself, excluding children.
    pub fn own_temp_size(&self, id: NodeId) -> usize {
        match self.kind(id) {
            NodeKind::AssignThroughPointer { .. }
            | NodeKind::Comparison { .. }
            | NodeKind::Logical { .. }
            | NodeKind::Index { .. } => 8,
            NodeKind::Arithmetic { left, right, .. } => {
                if self.kind(*left).is_int_literal() || self.kind(*right).is_int_literal() {
                    0
                } else {
                    8
                }
            }
            NodeKind::FunctionCall { callee, args } => {
                let spilled_args = if self.has_sub_call(id) {
                    args.len() * 8
                } else {
                    0
                };
                // a computed call target is held aside while arguments load
                let held_callee = match self.kind(*callee) {
                    NodeKind::Identifier(_) => 0,
                    _ => 8,
                };
                spilled_args + held_callee
            }
            _ => 0,
        }
    }

    /// Peak simultaneous temporary bytes needed while evaluating `root`:
    /// the node's own need stacked on top of its hungriest child. A nested
    /// block owns its own frame and contributes nothing.
    pub fn temp_size(&self, root: NodeId) -> usize {
        let mut peaks: HashMap<NodeId, usize> = HashMap::new();
        let mut stack = vec![(root, false)];

        while let Some((id, children_done)) = stack.pop() {
            if matches!(self.kind(id), NodeKind::Block(_)) {
                peaks.insert(id, 0);
                continue;
            }
            if children_done {
                let deepest = self
                    .children(id)
                    .into_iter()
                    .flatten()
                    .map(|child| peaks.get(&child).copied().unwrap_or(0))
                    .max()
                    .unwrap_or(0);
                peaks.insert(id, self.own_temp_size(id) + deepest);
            } else {
                stack.push((id, true));
                for child in self.children(id).into_iter().flatten() {
                    stack.push((child, false));
                }
            }
        }

        peaks.get(&root).copied().unwrap_or(0)
    }

    /// Top-level `func` or `extern` declaring `name`.
    pub fn find_declaration(&self, name: &str) -> Option<NodeId> {
        self.items.iter().copied().find(|id| match self.kind(*id) {
            NodeKind::FunctionDecl { name: n, .. } | NodeKind::Extern { name: n, .. } => n == name,
            _ => false,
        })
    }
}

/// Resolved type of every node, filled by the type checker and read by
/// later passes. Absent entries are nodes with no value (an unresolved
/// identifier in statement position, for instance).
#[derive(Debug, Clone, Default)]
pub struct TypeTable {
    types: Vec<Option<Type>>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(len: usize) -> Self {
        Self {
            types: vec![None; len],
        }
    }

    pub fn get(&self, id: NodeId) -> Option<&Type> {
        self.types.get(id.index()).and_then(|ty| ty.as_ref())
    }

    pub fn set(&mut self, id: NodeId, ty: Option<Type>) {
        if id.index() >= self.types.len() {
            self.types.resize(id.index() + 1, None);
        }
        self.types[id.index()] = ty;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(ast: &mut Ast, value: i64) -> NodeId {
        ast.add(NodeKind::IntLiteral(value), Position::default())
    }

    fn ident(ast: &mut Ast, name: &str) -> NodeId {
        ast.add(NodeKind::Identifier(name.to_string()), Position::default())
    }

    fn binary(ast: &mut Ast, op: ArithOp, left: NodeId, right: NodeId) -> NodeId {
        ast.add(NodeKind::Arithmetic { op, left, right }, Position::default())
    }

    #[test]
    fn test_walk_is_left_to_right() {
        let mut ast = Ast::new();
        let a = ident(&mut ast, "a");
        let b = ident(&mut ast, "b");
        let sum = binary(&mut ast, ArithOp::Add, a, b);

        let mut seen = Vec::new();
        ast.walk(sum, |id, _| {
            seen.push(id);
            true
        });
        assert_eq!(seen, vec![sum, a, b]);
    }

    #[test]
    fn test_temp_size_stacks_nested_spills() {
        let mut ast = Ast::new();
        let a = ident(&mut ast, "a");
        let b = ident(&mut ast, "b");
        let c = ident(&mut ast, "c");
        let inner = binary(&mut ast, ArithOp::Add, a, b);
        let outer = binary(&mut ast, ArithOp::Multiply, inner, c);
        assert_eq!(ast.temp_size(inner), 8);
        assert_eq!(ast.temp_size(outer), 16);

        let one = int(&mut ast, 1);
        let with_literal = binary(&mut ast, ArithOp::Add, inner, one);
        assert_eq!(ast.temp_size(with_literal), 8);
    }

    #[test]
    fn test_block_has_no_temp_size() {
        let mut ast = Ast::new();
        let a = ident(&mut ast, "a");
        let b = ident(&mut ast, "b");
        let sum = binary(&mut ast, ArithOp::Add, a, b);
        let block = ast.add(NodeKind::Block(vec![sum]), Position::default());
        assert_eq!(ast.temp_size(block), 0);
    }

    #[test]
    fn test_sub_call_detection() {
        let mut ast = Ast::new();
        let f = ident(&mut ast, "f");
        let x = ident(&mut ast, "x");
        let direct = ast.add(
            NodeKind::FunctionCall {
                callee: f,
                args: vec![x],
            },
            Position::default(),
        );
        assert!(!ast.has_sub_call(direct));
        assert_eq!(ast.temp_size(direct), 0);

        let g = ident(&mut ast, "g");
        let y = ident(&mut ast, "y");
        let nested = ast.add(
            NodeKind::FunctionCall {
                callee: g,
                args: vec![direct, y],
            },
            Position::default(),
        );
        assert!(ast.has_sub_call(nested));
        assert_eq!(ast.temp_size(nested), 16);

        let computed = ast.add(
            NodeKind::FunctionCall {
                callee: nested,
                args: vec![x],
            },
            Position::default(),
        );
        assert_eq!(ast.own_temp_size(computed), 16);
        assert_eq!(ast.temp_size(computed), 32);
    }

    #[test]
    fn test_type_table_grows_on_demand() {
        let mut types = TypeTable::new();
        types.set(NodeId(4), Some(Type::int()));
        assert_eq!(types.get(NodeId(4)), Some(&Type::int()));
        assert_eq!(types.get(NodeId(2)), None);
        assert_eq!(types.get(NodeId(40)), None);
    }
}
