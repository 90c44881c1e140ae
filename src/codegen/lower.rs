//! Backend-independent lowering of every node kind into [`Generator`]
//! operations. Expressions leave their value in [`Register::Return`].

use super::{Generator, Register};
use crate::{
    ast::{ArithOp, Ast, NodeId, NodeKind},
    error::BadError,
    eval::Deferred,
    optimizer::fold_value,
    types::Type,
    Result,
};

fn step<G, F>(f: F) -> Deferred<G>
where
    G: Generator,
    F: FnOnce(&mut G) + 'static,
{
    Deferred::finalize(move |gen: &mut G| {
        f(gen);
        Ok(())
    })
}

/// Operands that can be materialised straight into any register.
fn load_leaf<G: Generator>(ast: &Ast, reg: Register, node: NodeId) -> Option<Deferred<G>> {
    let value = match ast.kind(node) {
        NodeKind::IntLiteral(value) => *value,
        NodeKind::CharLiteral(byte) => i64::from(*byte),
        NodeKind::BoolLiteral(value) => i64::from(*value),
        NodeKind::NullLiteral => 0,
        NodeKind::SizeOf(ty) => ty.size_of() as i64,
        NodeKind::StringLiteral(bytes) => {
            let bytes = bytes.clone();
            return Some(Deferred::finalize(move |gen: &mut G| {
                gen.load_string(reg, &bytes)
            }));
        }
        NodeKind::Identifier(name) => {
            let name = name.clone();
            return Some(Deferred::finalize(move |gen: &mut G| {
                gen.load_identifier(reg, &name)
            }));
        }
        _ => return None,
    };
    Some(step(move |gen: &mut G| gen.load_immediate(reg, value)))
}

/// Work that leaves the value of `node` in `reg`.
pub fn load<G: Generator>(ast: &Ast, reg: Register, node: NodeId) -> Vec<Deferred<G>> {
    if let Some(leaf) = load_leaf(ast, reg, node) {
        return vec![leaf];
    }
    let mut ops = vec![Deferred::Visit(node)];
    if reg != Register::Return {
        ops.push(step(move |gen: &mut G| {
            gen.load_register(reg, Register::Return)
        }));
    }
    ops
}

fn push_temp<G: Generator>(reg: Register) -> Deferred<G> {
    Deferred::finalize(move |gen: &mut G| gen.push_temp(reg))
}

fn pop_temp<G: Generator>(reg: Register) -> Deferred<G> {
    Deferred::finalize(move |gen: &mut G| gen.pop_temp(reg))
}

fn is_unsigned(ty: &Type) -> bool {
    match ty {
        Type::Pointer(_) => true,
        Type::Primitive(p) => !p.is_signed(),
        _ => false,
    }
}

pub fn expand<G: Generator>(gen: &mut G, node: NodeId) -> Result<Vec<Deferred<G>>> {
    let kind = gen.ast().kind(node).clone();

    let ops = match kind {
        NodeKind::IntLiteral(_)
        | NodeKind::CharLiteral(_)
        | NodeKind::BoolLiteral(_)
        | NodeKind::NullLiteral
        | NodeKind::SizeOf(_)
        | NodeKind::StringLiteral(_)
        | NodeKind::Identifier(_) => load_leaf(gen.ast(), Register::Return, node)
            .into_iter()
            .collect(),

        NodeKind::AddressOf(name) => vec![Deferred::finalize(move |gen: &mut G| {
            gen.load_address(Register::Return, &name)
        })],

        NodeKind::Dereference(pointer) => {
            let ty = gen.type_of(node)?;
            let mut ops = load(gen.ast(), Register::Return, pointer);
            ops.push(Deferred::finalize(move |gen: &mut G| {
                gen.load_indirect(Register::Return, Register::Return, &ty)
            }));
            ops
        }

        NodeKind::VarDecl { name, ty } => vec![Deferred::finalize(move |gen: &mut G| {
            gen.allocate_variable(&name, &ty)
        })],

        NodeKind::Assign { name, value } => {
            let mut ops = load(gen.ast(), Register::Return, value);
            ops.push(Deferred::finalize(move |gen: &mut G| {
                gen.store_variable(&name, Register::Return)
            }));
            ops
        }

        NodeKind::AssignThroughPointer { pointer, value } => {
            let ty = gen.type_of(value)?;
            let ast = gen.ast();
            let mut ops = load(ast, Register::Return, value);
            // the pointer expression may clobber every register
            ops.push(push_temp(Register::Return));
            ops.extend(load(ast, Register::Return, pointer));
            ops.push(pop_temp(Register::Scratch1));
            ops.push(Deferred::finalize(move |gen: &mut G| {
                gen.store_indirect(Register::Return, Register::Scratch1, &ty)
            }));
            ops
        }

        NodeKind::While { condition, body } => {
            let start = gen.unique_label();
            let end = gen.unique_label();
            let mut ops = vec![label(start.clone())];
            ops.extend(load(gen.ast(), Register::Return, condition));
            ops.push(jump_if_zero(end.clone()));
            ops.push(Deferred::Visit(body));
            ops.push(step(move |gen: &mut G| gen.jump(&start)));
            ops.push(label(end));
            ops
        }

        NodeKind::If {
            condition,
            then_branch,
            else_branch,
        } => {
            let otherwise = else_branch.map(|_| gen.unique_label());
            let end = gen.unique_label();
            let mut ops = load(gen.ast(), Register::Return, condition);
            ops.push(jump_if_zero(otherwise.clone().unwrap_or_else(|| end.clone())));
            ops.push(Deferred::Visit(then_branch));
            if let (Some(branch), Some(otherwise)) = (else_branch, otherwise) {
                let skip = end.clone();
                ops.push(step(move |gen: &mut G| gen.jump(&skip)));
                ops.push(label(otherwise));
                ops.push(Deferred::Visit(branch));
            }
            ops.push(label(end));
            ops
        }

        NodeKind::Return(value) => {
            let mut ops = value
                .map(|value| load(gen.ast(), Register::Return, value))
                .unwrap_or_default();
            ops.push(Deferred::finalize(|gen: &mut G| gen.ret()));
            ops
        }

        NodeKind::Block(_) => return gen.block(node),
        NodeKind::FunctionDecl { .. } => return gen.function(node),

        NodeKind::Extern { name, library, .. } => vec![step(move |gen: &mut G| {
            gen.add_extern(&name, &library)
        })],

        NodeKind::FunctionCall { callee, args } => call(gen, node, callee, &args)?,

        NodeKind::Arithmetic { op, left, right } => arithmetic(gen, node, op, left, right)?,

        NodeKind::Comparison { op, left, right } => {
            let left_ty = gen.type_of(left)?;
            let right_ty = gen.type_of(right)?;
            let unsigned = is_unsigned(&left_ty)
                || (left_ty == Type::int_literal() && is_unsigned(&right_ty));
            let mut ops = spill_pair(gen.ast(), left, right);
            ops.push(step(move |gen: &mut G| {
                gen.compare(op, Register::Return, Register::Scratch1, unsigned)
            }));
            ops
        }

        NodeKind::Logical { op, left, right } => {
            let mut ops = spill_pair(gen.ast(), left, right);
            ops.push(step(move |gen: &mut G| {
                gen.logical(op, Register::Return, Register::Scratch1)
            }));
            ops
        }

        NodeKind::Not(operand) => {
            let mut ops = load(gen.ast(), Register::Return, operand);
            ops.push(step(|gen: &mut G| gen.not(Register::Return)));
            ops
        }

        NodeKind::Index { array, index } => {
            let ast = gen.ast();
            let element_size = match gen.type_of(node)? {
                Type::Pointer(element) => element.size_of(),
                other => {
                    return Err(BadError::codegen_error_at(
                        ast.position(node),
                        format!("index yields non-pointer type {}", other),
                    ))
                }
            };
            let mut ops = load(ast, Register::Return, array);
            ops.push(push_temp(Register::Return));
            ops.extend(load(ast, Register::Return, index));
            ops.push(step(move |gen: &mut G| {
                gen.scale(Register::Return, element_size)
            }));
            ops.push(pop_temp(Register::Scratch1));
            ops.push(step(|gen: &mut G| {
                gen.arithmetic(ArithOp::Add, Register::Return, Register::Scratch1, false)
            }));
            ops
        }

        NodeKind::ArrayLiteral(items) => {
            let ty = gen.type_of(node)?;
            let element = match &ty {
                Type::Array { element, .. } => (**element).clone(),
                other => {
                    return Err(BadError::codegen_error_at(
                        gen.ast().position(node),
                        format!("array literal typed as {}", other),
                    ))
                }
            };
            let name = gen.unique_name();
            let ast = gen.ast();
            let mut ops = Vec::with_capacity(items.len() * 2 + 2);
            let storage = name.clone();
            ops.push(Deferred::finalize(move |gen: &mut G| {
                gen.allocate_variable(&storage, &ty)
            }));
            for (i, item) in items.into_iter().enumerate() {
                ops.extend(load(ast, Register::Return, item));
                let storage = name.clone();
                let element = element.clone();
                let offset = i * element.size_of();
                ops.push(Deferred::finalize(move |gen: &mut G| {
                    gen.store_element(&storage, offset, Register::Return, &element)
                }));
            }
            ops.push(Deferred::finalize(move |gen: &mut G| {
                gen.load_address(Register::Return, &name)
            }));
            ops
        }

        NodeKind::Cast { ty, value } => {
            let from = gen.type_of(value)?;
            let mut ops = load(gen.ast(), Register::Return, value);
            ops.push(step(move |gen: &mut G| gen.cast(Register::Return, &from, &ty)));
            ops
        }
    };
    Ok(ops)
}

fn label<G: Generator>(name: String) -> Deferred<G> {
    step(move |gen: &mut G| gen.label(&name))
}

fn jump_if_zero<G: Generator>(target: String) -> Deferred<G> {
    step(move |gen: &mut G| gen.jump_if_zero(Register::Return, &target))
}

/// Left operand in `Return`, right operand in `Scratch1`. The left value
/// waits in a temporary while the right side is evaluated.
fn spill_pair<G: Generator>(ast: &Ast, left: NodeId, right: NodeId) -> Vec<Deferred<G>> {
    let mut ops = load(ast, Register::Return, left);
    ops.push(push_temp(Register::Return));
    ops.extend(load(ast, Register::Scratch1, right));
    ops.push(pop_temp(Register::Return));
    ops
}

fn arithmetic<G: Generator>(
    gen: &G,
    node: NodeId,
    op: ArithOp,
    left: NodeId,
    right: NodeId,
) -> Result<Vec<Deferred<G>>> {
    let ast = gen.ast();
    if gen.options().fold_constants {
        if let Some(value) = fold_value(ast, node) {
            return Ok(vec![step(move |gen: &mut G| {
                gen.load_immediate(Register::Return, value)
            })]);
        }
    }

    let left_ty = gen.type_of(left)?;
    let signed = left_ty.is_signed()
        && !(left_ty == Type::int_literal() && is_unsigned(&gen.type_of(right)?));
    let left_literal = ast.kind(left).is_int_literal();
    let right_literal = ast.kind(right).is_int_literal();

    if !left_literal && !right_literal {
        let mut ops = spill_pair(ast, left, right);
        ops.push(step(move |gen: &mut G| {
            gen.arithmetic(op, Register::Return, Register::Scratch1, signed)
        }));
        return Ok(ops);
    }

    // with a literal operand nothing can clobber the other one, so no
    // temporary is needed
    let (literal, other) = if left_literal {
        (left, right)
    } else {
        (right, left)
    };
    let mut ops = load(ast, Register::Scratch1, other);
    ops.extend(load(ast, Register::Return, literal));
    if left_literal {
        ops.push(step(move |gen: &mut G| {
            gen.arithmetic(op, Register::Return, Register::Scratch1, signed)
        }));
    } else {
        ops.push(step(move |gen: &mut G| {
            gen.arithmetic(op, Register::Scratch1, Register::Return, signed);
            gen.load_register(Register::Return, Register::Scratch1);
        }));
    }
    Ok(ops)
}

/// Marshals arguments per the Win64 convention: the first four in
/// registers, the rest in the outgoing argument area. When any operand
/// contains a call, every argument is computed right to left into a
/// temporary first so a later call cannot clobber an earlier argument.
fn call<G: Generator>(
    gen: &G,
    node: NodeId,
    callee: NodeId,
    args: &[NodeId],
) -> Result<Vec<Deferred<G>>> {
    let ast = gen.ast();
    let target = match ast.kind(callee) {
        NodeKind::Identifier(name) => Some(name.clone()),
        _ => None,
    };

    let mut ops = Vec::new();
    if target.is_none() {
        ops.extend(load(ast, Register::Return, callee));
        ops.push(push_temp(Register::Return));
    }

    if ast.has_sub_call(node) {
        for &arg in args.iter().rev() {
            ops.extend(load(ast, Register::Return, arg));
            ops.push(push_temp(Register::Return));
        }
        for index in 0..args.len() {
            match Register::argument(index) {
                Some(reg) => ops.push(pop_temp(reg)),
                None => {
                    ops.push(pop_temp(Register::Return));
                    ops.push(store_argument(index));
                }
            }
        }
    } else {
        for (index, &arg) in args.iter().enumerate() {
            match Register::argument(index) {
                Some(reg) => ops.extend(load(ast, reg, arg)),
                None => {
                    ops.extend(load(ast, Register::Return, arg));
                    ops.push(store_argument(index));
                }
            }
        }
    }

    match target {
        Some(name) => ops.push(Deferred::finalize(move |gen: &mut G| {
            gen.call(Some(&name))
        })),
        None => {
            ops.push(pop_temp(Register::Scratch2));
            ops.push(Deferred::finalize(|gen: &mut G| gen.call(None)));
        }
    }
    Ok(ops)
}

fn store_argument<G: Generator>(index: usize) -> Deferred<G> {
    Deferred::finalize(move |gen: &mut G| gen.store_argument(index, Register::Return))
}
