pub mod frame;
pub mod lower;
pub mod sections;
pub mod x86_64;

pub use x86_64::X86_64Generator;

use crate::{
    ast::{ArithOp, Ast, CompareOp, LogicalOp, NodeId, TypeTable},
    eval::{Deferred, Expand},
    types::Type,
    Result,
};

/// Architecture-neutral register roles. A backend maps each role to a
/// physical register and picks the alias matching an operand's size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    Return,
    Arg1,
    Arg2,
    Arg3,
    Arg4,
    Scratch1,
    Scratch2,
    Stack,
}

impl Register {
    /// Registers carrying the first call arguments, in order.
    pub const ARGUMENTS: [Register; 4] = [
        Register::Arg1,
        Register::Arg2,
        Register::Arg3,
        Register::Arg4,
    ];

    pub fn argument(index: usize) -> Option<Register> {
        Self::ARGUMENTS.get(index).copied()
    }
}

#[derive(Debug, Clone)]
pub struct CompilerOptions {
    /// Fold literal-only arithmetic before code generation.
    pub fold_constants: bool,
    /// Explain emitted instructions with trailing `;` comments.
    pub annotate: bool,
    /// Function the process entry stub calls.
    pub entry_point: String,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            fold_constants: true,
            annotate: false,
            entry_point: "main".to_string(),
        }
    }
}

/// Instruction-level operations a backend offers to the shared lowering in
/// [`lower`]. Every value flows through a [`Register`] role; operations
/// that touch the frame fail with a codegen error when its bookkeeping is
/// violated.
pub trait Generator: Expand {
    fn ast(&self) -> &Ast;
    fn options(&self) -> &CompilerOptions;

    fn type_of(&self, node: NodeId) -> Result<Type>;

    fn load_immediate(&mut self, reg: Register, value: i64);
    fn load_string(&mut self, reg: Register, bytes: &[u8]) -> Result<()>;
    fn load_register(&mut self, dst: Register, src: Register);
    /// Loads a named value: variable contents (arrays decay to their
    /// address), an import's address or a function's address.
    fn load_identifier(&mut self, reg: Register, name: &str) -> Result<()>;
    fn load_address(&mut self, reg: Register, name: &str) -> Result<()>;
    fn load_indirect(&mut self, reg: Register, pointer: Register, ty: &Type) -> Result<()>;

    fn store_variable(&mut self, name: &str, reg: Register) -> Result<()>;
    fn store_element(&mut self, name: &str, offset: usize, reg: Register, ty: &Type) -> Result<()>;
    fn store_indirect(&mut self, pointer: Register, value: Register, ty: &Type) -> Result<()>;
    fn store_argument(&mut self, index: usize, reg: Register) -> Result<()>;

    fn push_temp(&mut self, reg: Register) -> Result<()>;
    fn pop_temp(&mut self, reg: Register) -> Result<()>;
    fn allocate_variable(&mut self, name: &str, ty: &Type) -> Result<()>;

    fn arithmetic(&mut self, op: ArithOp, left: Register, right: Register, signed: bool);
    fn compare(&mut self, op: CompareOp, left: Register, right: Register, unsigned: bool);
    fn logical(&mut self, op: LogicalOp, left: Register, right: Register);
    fn not(&mut self, reg: Register);
    fn scale(&mut self, reg: Register, factor: usize);
    fn cast(&mut self, reg: Register, from: &Type, to: &Type);

    fn unique_label(&mut self) -> String;
    fn unique_name(&mut self) -> String;
    fn label(&mut self, label: &str);
    fn jump(&mut self, label: &str);
    fn jump_if_zero(&mut self, reg: Register, label: &str);

    /// Emits the call once arguments are in place. `callee` is `None` when
    /// the target address has been left in `Scratch2`.
    fn call(&mut self, callee: Option<&str>) -> Result<()>;
    fn add_extern(&mut self, name: &str, library: &str);
    fn ret(&mut self) -> Result<()>;

    fn function(&mut self, node: NodeId) -> Result<Vec<Deferred<Self>>>;
    fn block(&mut self, node: NodeId) -> Result<Vec<Deferred<Self>>>;
}

/// Lowers a checked program to a complete FASM listing.
pub fn generate(ast: &Ast, types: &TypeTable, options: &CompilerOptions) -> Result<String> {
    X86_64Generator::new(ast, types, options).generate()
}
