use crate::types::{FunctionType, Type};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub enum Symbol {
    Variable(Type),
    Function(FunctionType),
}

impl Symbol {
    /// Type an identifier bound to this symbol evaluates to.
    pub fn ty(&self) -> Type {
        match self {
            Symbol::Variable(ty) => ty.clone(),
            Symbol::Function(signature) => Type::Function(signature.clone()),
        }
    }
}

/// One frame of the checker's scope stack. Variables and functions live
/// in separate namespaces.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    variables: HashMap<String, Type>,
    functions: HashMap<String, FunctionType>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, name: &str) -> Option<Symbol> {
        self.variables
            .get(name)
            .map(|ty| Symbol::Variable(ty.clone()))
            .or_else(|| self.functions.get(name).cloned().map(Symbol::Function))
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }
}

/// Stack of scopes; the bottom one is the module scope and is never
/// popped.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::new()],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::new());
    }

    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    fn current(&mut self) -> &mut Scope {
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }

    pub fn current_scope(&self) -> &Scope {
        &self.scopes[self.scopes.len() - 1]
    }

    pub fn define_variable(&mut self, name: impl Into<String>, ty: Type) {
        self.current().variables.insert(name.into(), ty);
    }

    pub fn define_function(&mut self, name: impl Into<String>, signature: FunctionType) {
        self.current().functions.insert(name.into(), signature);
    }

    /// Innermost binding wins; within a frame variables shadow functions.
    pub fn lookup(&self, name: &str) -> Option<Symbol> {
        self.scopes.iter().rev().find_map(|scope| scope.lookup(name))
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}
