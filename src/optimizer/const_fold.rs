use crate::{
    ast::{Ast, NodeId, NodeKind, TypeTable},
    types::Type,
};
use log::trace;

/// Value of an integer literal, or of an arithmetic node whose operands are
/// both integer literals. Division by zero is never folded.
pub fn fold_value(ast: &Ast, node: NodeId) -> Option<i64> {
    match ast.kind(node) {
        NodeKind::IntLiteral(value) => Some(*value),
        NodeKind::Arithmetic { op, left, right } => match (ast.kind(*left), ast.kind(*right)) {
            (NodeKind::IntLiteral(l), NodeKind::IntLiteral(r)) => op.evaluate(*l, *r),
            _ => None,
        },
        _ => None,
    }
}

/// Replaces literal-only arithmetic operands with the literal they evaluate
/// to, bottom-up. The outermost arithmetic node of an expression keeps its
/// shape; code generation folds it when emitting.
pub struct ConstantFolder {
    replaced: usize,
}

impl ConstantFolder {
    pub fn new() -> Self {
        Self { replaced: 0 }
    }

    /// Number of operand references rewritten.
    pub fn fold_program(mut self, ast: &mut Ast, types: &mut TypeTable) -> usize {
        let items = ast.items().to_vec();
        for item in items {
            for node in postorder(ast, item) {
                self.fold_operands(ast, types, node);
            }
        }
        self.replaced
    }

    fn fold_operands(&mut self, ast: &mut Ast, types: &mut TypeTable, node: NodeId) {
        let (left, right) = match ast.kind(node) {
            NodeKind::Arithmetic { left, right, .. } => (*left, *right),
            _ => return,
        };

        let new_left = self.fold_operand(ast, types, left);
        let new_right = self.fold_operand(ast, types, right);
        if let NodeKind::Arithmetic { left, right, .. } = ast.kind_mut(node) {
            *left = new_left;
            *right = new_right;
        }
    }

    fn fold_operand(&mut self, ast: &mut Ast, types: &mut TypeTable, operand: NodeId) -> NodeId {
        if ast.kind(operand).is_int_literal() {
            return operand;
        }
        match fold_value(ast, operand) {
            Some(value) => {
                let literal = ast.add(NodeKind::IntLiteral(value), ast.position(operand));
                types.set(literal, Some(Type::int_literal()));
                trace!("folded {} to {}", ast.display(operand), value);
                self.replaced += 1;
                literal
            }
            None => operand,
        }
    }
}

impl Default for ConstantFolder {
    fn default() -> Self {
        Self::new()
    }
}

fn postorder(ast: &Ast, root: NodeId) -> Vec<NodeId> {
    let mut order = Vec::new();
    let mut stack = vec![(root, false)];
    while let Some((id, children_done)) = stack.pop() {
        if children_done {
            order.push(id);
        } else {
            stack.push((id, true));
            for child in ast.children(id).into_iter().rev().flatten() {
                stack.push((child, false));
            }
        }
    }
    order
}
