use super::{rules, FunctionType, Type};
use crate::{
    ast::{Ast, NodeId, NodeKind, TypeTable},
    error::BadError,
    eval::{evaluate, Deferred, Expand},
    source_location::Position,
    symbol_table::{Symbol, SymbolTable},
    Result,
};
use log::{debug, info};

/// Type checks a whole program and validates its entry point. The returned
/// table holds the resolved type of every node.
pub fn check_program(ast: &Ast, entry_point: &str) -> Result<TypeTable> {
    let mut checker = TypeChecker::new(ast);
    for &item in ast.items() {
        if !ast.kind(item).is_top_level() {
            return Err(BadError::type_error(
                ast.position(item),
                "Only func and extern declarations are allowed at top level",
            ));
        }
        let ops = evaluate(&mut checker, item)?;
        debug!("checked {} in {} operations", describe(ast, item), ops);
    }
    checker.validate_entry_point(entry_point)?;
    info!("type checked {} declarations", ast.items().len());
    Ok(checker.into_types())
}

fn describe(ast: &Ast, item: NodeId) -> String {
    match ast.kind(item) {
        NodeKind::FunctionDecl { name, .. } => format!("func {}", name),
        NodeKind::Extern { name, .. } => format!("extern {}", name),
        _ => format!("{:?}", item),
    }
}

pub struct TypeChecker<'a> {
    ast: &'a Ast,
    types: TypeTable,
    symbols: SymbolTable,
    current_function: Option<FunctionType>,
}

impl<'a> TypeChecker<'a> {
    pub fn new(ast: &'a Ast) -> Self {
        Self {
            ast,
            types: TypeTable::with_capacity(ast.len()),
            symbols: SymbolTable::new(),
            current_function: None,
        }
    }

    pub fn into_types(self) -> TypeTable {
        self.types
    }

    fn set(&mut self, node: NodeId, ty: Type) {
        self.types.set(node, Some(ty));
    }

    /// Type of an already-checked node that a rule needs a value from.
    fn require_type(&self, node: NodeId) -> Result<Type> {
        if let Some(ty) = self.types.get(node) {
            return Ok(ty.clone());
        }
        let message = match self.ast.kind(node) {
            NodeKind::Identifier(name) => format!("Identifier {} not declared in this scope", name),
            _ => "Expression has no type".to_string(),
        };
        Err(BadError::type_error(self.ast.position(node), message))
    }

    fn operand_types(&self, left: NodeId, right: NodeId) -> Result<(Type, Type)> {
        Ok((self.require_type(left)?, self.require_type(right)?))
    }

    pub fn validate_entry_point(&self, name: &str) -> Result<()> {
        let declaration = self.ast.find_declaration(name);
        let position = declaration
            .map(|id| self.ast.position(id))
            .unwrap_or_default();

        match self.symbols.lookup(name) {
            Some(Symbol::Function(signature)) if rules::is_entry_signature(&signature) => Ok(()),
            Some(Symbol::Function(signature)) => Err(BadError::type_error(
                position,
                format!(
                    "Function {} must have signature () -> int or (int, (* (* char))) -> int, found {}",
                    name,
                    Type::Function(signature)
                ),
            )),
            _ => Err(BadError::type_error(
                position,
                format!("No {} function declared", name),
            )),
        }
    }

    fn expand_function(&mut self, node: NodeId, position: Position) -> Result<Vec<Deferred<Self>>> {
        let ast = self.ast;
        let kind = ast.kind(node);
        let (name, params, body) = match kind {
            NodeKind::FunctionDecl {
                name, params, body, ..
            } => (name.clone(), params.clone(), body.clone()),
            _ => return Err(BadError::codegen_error("expand_function on non-function")),
        };
        let signature = kind
            .signature()
            .ok_or_else(|| BadError::codegen_error("function without signature"))?;

        if self.symbols.lookup(&name).is_some() {
            return Err(BadError::type_error(
                position,
                format!("Function {} already declared", name),
            ));
        }
        self.symbols.define_function(name.clone(), signature.clone());

        self.symbols.push_scope();
        for param in &params {
            if self.symbols.current_scope().has_variable(&param.name) {
                return Err(BadError::type_error(
                    position,
                    format!("Parameter {} of {} declared twice", param.name, name),
                ));
            }
            self.symbols.define_variable(param.name.clone(), param.ty.clone());
        }
        self.current_function = Some(signature.clone());

        let mut ops: Vec<Deferred<Self>> = body.into_iter().map(Deferred::Visit).collect();
        ops.push(Deferred::finalize(move |c: &mut TypeChecker<'a>| {
            c.symbols.pop_scope();
            c.current_function = None;
            c.set(node, Type::Function(signature));
            Ok(())
        }));
        Ok(ops)
    }
}

impl<'a> Expand for TypeChecker<'a> {
    fn expand(&mut self, node: NodeId) -> Result<Vec<Deferred<Self>>> {
        let ast = self.ast;
        let position = ast.position(node);

        let ops = match ast.kind(node) {
            NodeKind::IntLiteral(_) => {
                self.set(node, Type::int_literal());
                Vec::new()
            }
            NodeKind::CharLiteral(_) => {
                self.set(node, Type::char());
                Vec::new()
            }
            NodeKind::BoolLiteral(_) => {
                self.set(node, Type::bool());
                Vec::new()
            }
            NodeKind::StringLiteral(_) => {
                self.set(node, Type::pointer_to(Type::char()));
                Vec::new()
            }
            NodeKind::NullLiteral => {
                self.set(node, Type::pointer_to(Type::void()));
                Vec::new()
            }
            NodeKind::SizeOf(_) => {
                self.set(node, Type::int());
                Vec::new()
            }
            NodeKind::Identifier(name) => {
                let ty = self.symbols.lookup(name).map(|symbol| symbol.ty());
                self.types.set(node, ty);
                Vec::new()
            }
            NodeKind::AddressOf(name) => {
                let ty = match self.symbols.lookup(name) {
                    Some(Symbol::Function(signature)) => Type::Function(signature),
                    Some(Symbol::Variable(ty)) => Type::pointer_to(ty),
                    None => {
                        return Err(BadError::type_error(
                            position,
                            format!("Identifier {} not declared in this scope", name),
                        ))
                    }
                };
                self.set(node, ty);
                Vec::new()
            }
            NodeKind::VarDecl { name, ty } => {
                if self.symbols.current_scope().has_variable(name) {
                    return Err(BadError::type_error(
                        position,
                        format!("Variable {} already declared in this scope", name),
                    ));
                }
                self.symbols.define_variable(name.clone(), ty.clone());
                self.set(node, ty.clone());
                Vec::new()
            }
            NodeKind::Extern { name, .. } => {
                let signature = ast
                    .kind(node)
                    .signature()
                    .ok_or_else(|| BadError::codegen_error("extern without signature"))?;
                let scope = self.symbols.current_scope();
                if scope.has_function(name) || scope.has_variable(name) {
                    return Err(BadError::type_error(
                        position,
                        format!("Function {} already declared", name),
                    ));
                }
                self.symbols.define_function(name.clone(), signature.clone());
                self.set(node, Type::Function(signature));
                Vec::new()
            }
            NodeKind::FunctionDecl { .. } => return self.expand_function(node, position),

            NodeKind::Dereference(pointer) => {
                let pointer = *pointer;
                vec![
                    Deferred::Visit(pointer),
                    Deferred::finalize(move |c: &mut TypeChecker<'a>| {
                        let ty = rules::dereference(&c.require_type(pointer)?, position)?;
                        c.set(node, ty);
                        Ok(())
                    }),
                ]
            }
            NodeKind::Assign { name, value } => {
                let (name, value) = (name.clone(), *value);
                vec![
                    Deferred::Visit(value),
                    Deferred::finalize(move |c: &mut TypeChecker<'a>| {
                        let declared = match c.symbols.lookup(&name) {
                            Some(Symbol::Variable(ty)) => ty,
                            Some(Symbol::Function(_)) => {
                                return Err(BadError::type_error(
                                    position,
                                    format!("Cannot assign to function {}", name),
                                ))
                            }
                            None => {
                                return Err(BadError::type_error(
                                    position,
                                    format!("Identifier {} not declared in this scope", name),
                                ))
                            }
                        };
                        let ty = c.require_type(value)?;
                        if !ty.assignable_to(&declared) {
                            return Err(BadError::type_error(
                                position,
                                format!(
                                    "Cannot assign value of type {} to {} of type {}",
                                    ty, name, declared
                                ),
                            ));
                        }
                        c.set(node, ty);
                        Ok(())
                    }),
                ]
            }
            NodeKind::AssignThroughPointer { pointer, value } => {
                let (pointer, value) = (*pointer, *value);
                vec![
                    Deferred::Visit(pointer),
                    Deferred::Visit(value),
                    Deferred::finalize(move |c: &mut TypeChecker<'a>| {
                        let (p, v) = c.operand_types(pointer, value)?;
                        let ty = rules::assign_through_pointer(&p, &v, position)?;
                        c.set(node, ty);
                        Ok(())
                    }),
                ]
            }
            NodeKind::Arithmetic { left, right, .. } => {
                binary(*left, *right, move |c: &mut TypeChecker<'a>, l, r| {
                    let ty = rules::arithmetic(&l, &r, position)?;
                    c.set(node, ty);
                    Ok(())
                })
            }
            NodeKind::Comparison { left, right, .. } => {
                binary(*left, *right, move |c: &mut TypeChecker<'a>, l, r| {
                    let ty = rules::comparison(&l, &r, position)?;
                    c.set(node, ty);
                    Ok(())
                })
            }
            NodeKind::Logical { left, right, .. } => {
                binary(*left, *right, move |c: &mut TypeChecker<'a>, l, r| {
                    let ty = rules::logical(&l, &r, position)?;
                    c.set(node, ty);
                    Ok(())
                })
            }
            NodeKind::Index { array, index } => {
                binary(*array, *index, move |c: &mut TypeChecker<'a>, a, i| {
                    let ty = rules::index(&a, &i, position)?;
                    c.set(node, ty);
                    Ok(())
                })
            }
            NodeKind::Not(operand) => {
                let operand = *operand;
                vec![
                    Deferred::Visit(operand),
                    Deferred::finalize(move |c: &mut TypeChecker<'a>| {
                        let ty = rules::not(&c.require_type(operand)?, position)?;
                        c.set(node, ty);
                        Ok(())
                    }),
                ]
            }
            NodeKind::While { condition, body } => {
                let (condition, body) = (*condition, *body);
                vec![
                    Deferred::Visit(condition),
                    Deferred::finalize(move |c: &mut TypeChecker<'a>| {
                        rules::condition("while", &c.require_type(condition)?, position)
                    }),
                    Deferred::Visit(body),
                    Deferred::finalize(move |c: &mut TypeChecker<'a>| {
                        c.set(node, Type::void());
                        Ok(())
                    }),
                ]
            }
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let (condition, then_branch, else_branch) = (*condition, *then_branch, *else_branch);
                let mut ops = vec![
                    Deferred::Visit(condition),
                    Deferred::finalize(move |c: &mut TypeChecker<'a>| {
                        rules::condition("if", &c.require_type(condition)?, position)
                    }),
                    Deferred::Visit(then_branch),
                ];
                ops.extend(else_branch.map(Deferred::Visit));
                ops.push(Deferred::finalize(move |c: &mut TypeChecker<'a>| {
                    let ty = match else_branch {
                        Some(else_branch) => {
                            let (then_ty, else_ty) = c.operand_types(then_branch, else_branch)?;
                            if then_ty != else_ty {
                                return Err(BadError::type_error(
                                    position,
                                    format!(
                                        "Branches of if have different types: {} and {}",
                                        then_ty, else_ty
                                    ),
                                ));
                            }
                            then_ty
                        }
                        None => Type::void(),
                    };
                    c.set(node, ty);
                    Ok(())
                }));
                ops
            }
            NodeKind::Return(value) => {
                let value = *value;
                let mut ops: Vec<Deferred<Self>> = value.map(Deferred::Visit).into_iter().collect();
                ops.push(Deferred::finalize(move |c: &mut TypeChecker<'a>| {
                    let expected = match &c.current_function {
                        Some(function) => (*function.return_type).clone(),
                        None => {
                            return Err(BadError::type_error(
                                position,
                                "return outside of a function",
                            ))
                        }
                    };
                    if let Some(value) = value {
                        let ty = c.require_type(value)?;
                        if !ty.assignable_to(&expected) {
                            return Err(BadError::type_error(
                                position,
                                format!(
                                    "Cannot return {} from a function returning {}",
                                    ty, expected
                                ),
                            ));
                        }
                    }
                    // Control leaves here, so the statement itself has no value.
                    c.set(node, Type::void());
                    Ok(())
                }));
                ops
            }
            NodeKind::Block(statements) => {
                let last = statements.last().copied();
                let mut ops: Vec<Deferred<Self>> =
                    statements.iter().copied().map(Deferred::Visit).collect();
                ops.push(Deferred::finalize(move |c: &mut TypeChecker<'a>| {
                    let ty = match last {
                        Some(last) => c.types.get(last).cloned(),
                        None => Some(Type::void()),
                    };
                    c.types.set(node, ty);
                    Ok(())
                }));
                ops
            }
            NodeKind::FunctionCall { callee, args } => {
                let (callee, args) = (*callee, args.clone());
                let mut ops = vec![Deferred::Visit(callee)];
                ops.extend(args.iter().copied().map(Deferred::Visit));
                ops.push(Deferred::finalize(move |c: &mut TypeChecker<'a>| {
                    let callee_ty = c.require_type(callee)?;
                    let arg_types = args
                        .iter()
                        .map(|arg| c.require_type(*arg))
                        .collect::<Result<Vec<_>>>()?;
                    let ty = rules::call(&callee_ty, &arg_types, position)?;
                    c.set(node, ty);
                    Ok(())
                }));
                ops
            }
            NodeKind::ArrayLiteral(items) => {
                let items = items.clone();
                let mut ops: Vec<Deferred<Self>> =
                    items.iter().copied().map(Deferred::Visit).collect();
                ops.push(Deferred::finalize(move |c: &mut TypeChecker<'a>| {
                    let item_types = items
                        .iter()
                        .map(|item| c.require_type(*item))
                        .collect::<Result<Vec<_>>>()?;
                    let ty = rules::array_literal(&item_types, position)?;
                    c.set(node, ty);
                    Ok(())
                }));
                ops
            }
            NodeKind::Cast { ty, value } => {
                let (target, value) = (ty.clone(), *value);
                vec![
                    Deferred::Visit(value),
                    Deferred::finalize(move |c: &mut TypeChecker<'a>| {
                        let ty = rules::cast(&c.require_type(value)?, &target, position)?;
                        c.set(node, ty);
                        Ok(())
                    }),
                ]
            }
        };
        Ok(ops)
    }
}

/// Visit both operands, then hand their types to `finish`.
fn binary<'a, F>(left: NodeId, right: NodeId, finish: F) -> Vec<Deferred<TypeChecker<'a>>>
where
    F: FnOnce(&mut TypeChecker<'a>, Type, Type) -> Result<()> + 'static,
{
    vec![
        Deferred::Visit(left),
        Deferred::Visit(right),
        Deferred::finalize(move |c: &mut TypeChecker<'a>| {
            let (l, r) = c.operand_types(left, right)?;
            finish(c, l, r)
        }),
    ]
}
