//! Compiler for BaD, a small S-expression language, emitting FASM
//! x86-64 assembly for Windows.
//!
//! The pipeline is [`parser::parse`], [`types::checker::check_program`],
//! [`optimizer::optimize`] and [`codegen::generate`]; [`build::compile`]
//! runs all of them.

pub mod ast;
pub mod build;
pub mod codegen;
pub mod diagnostics;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod optimizer;
pub mod parser;
pub mod source_location;
pub mod symbol_table;
pub mod token;
pub mod types;

pub use ast::{Ast, NodeId, NodeKind, TypeTable};
pub use build::compile;
pub use codegen::CompilerOptions;
pub use error::{BadError, ErrorKind, Result};
pub use types::Type;
