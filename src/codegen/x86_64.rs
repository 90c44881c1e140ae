//! FASM x86-64 backend targeting Windows PE64 and the Win64 calling
//! convention.

use super::{
    frame::{Frame, FrameStack},
    lower,
    sections::{self, ImportTable, Listing, StringTable},
    CompilerOptions, Generator, Register,
};
use crate::{
    ast::{ArithOp, Ast, CompareOp, LogicalOp, NodeId, NodeKind, TypeTable},
    error::BadError,
    eval::{evaluate, Deferred, Expand},
    types::Type,
    Result,
};
use log::{debug, info, warn};
use std::collections::HashSet;

/// Physical register for a role, by operand size in bytes.
fn alias(reg: Register, size: usize) -> &'static str {
    let names: [&'static str; 4] = match reg {
        Register::Return => ["rax", "eax", "ax", "al"],
        Register::Arg1 => ["rcx", "ecx", "cx", "cl"],
        Register::Arg2 => ["rdx", "edx", "dx", "dl"],
        Register::Arg3 => ["r8", "r8d", "r8w", "r8b"],
        Register::Arg4 => ["r9", "r9d", "r9w", "r9b"],
        Register::Scratch1 => ["r10", "r10d", "r10w", "r10b"],
        Register::Scratch2 => ["r11", "r11d", "r11w", "r11b"],
        Register::Stack => ["rsp", "esp", "sp", "spl"],
    };
    match size {
        4 => names[1],
        2 => names[2],
        1 => names[3],
        _ => names[0],
    }
}

fn r64(reg: Register) -> &'static str {
    alias(reg, 8)
}

fn width(size: usize) -> &'static str {
    match size {
        4 => "dword",
        2 => "word",
        1 => "byte",
        _ => "qword",
    }
}

fn condition_code(op: CompareOp, unsigned: bool) -> &'static str {
    match (op, unsigned) {
        (CompareOp::Less, false) => "l",
        (CompareOp::Less, true) => "b",
        (CompareOp::LessEqual, false) => "le",
        (CompareOp::LessEqual, true) => "be",
        (CompareOp::Greater, false) => "g",
        (CompareOp::Greater, true) => "a",
        (CompareOp::GreaterEqual, false) => "ge",
        (CompareOp::GreaterEqual, true) => "ae",
        (CompareOp::Equal, _) => "e",
        (CompareOp::NotEqual, _) => "ne",
    }
}

pub struct X86_64Generator<'a> {
    ast: &'a Ast,
    types: &'a TypeTable,
    options: &'a CompilerOptions,
    listing: Listing,
    frames: FrameStack,
    strings: StringTable,
    imports: ImportTable,
    functions: HashSet<String>,
    externs: HashSet<String>,
    labels: usize,
    names: usize,
}

impl<'a> X86_64Generator<'a> {
    pub fn new(ast: &'a Ast, types: &'a TypeTable, options: &'a CompilerOptions) -> Self {
        let mut functions = HashSet::new();
        let mut externs = HashSet::new();
        for &item in ast.items() {
            match ast.kind(item) {
                NodeKind::FunctionDecl { name, .. } => {
                    functions.insert(name.clone());
                }
                NodeKind::Extern { name, .. } => {
                    externs.insert(name.clone());
                }
                _ => {}
            }
        }

        Self {
            ast,
            types,
            options,
            listing: Listing::new(options.annotate),
            frames: FrameStack::new(),
            strings: StringTable::collect(ast),
            imports: ImportTable::new(),
            functions,
            externs,
            labels: 0,
            names: 0,
        }
    }

    /// Produces the complete listing: header, data, code with the entry
    /// stub, then imports.
    pub fn generate(mut self) -> Result<String> {
        let ast = self.ast;
        sections::header(&mut self.listing);
        sections::data_section(&mut self.listing, &self.strings);

        self.listing.raw("section '.text' code readable executable");
        for &item in ast.items() {
            if !ast.kind(item).is_top_level() {
                return Err(BadError::codegen_error_at(
                    ast.position(item),
                    "only func and extern are allowed at top level",
                ));
            }
            evaluate(&mut self, item)?;
        }
        if !self.frames.is_empty() {
            return Err(BadError::codegen_error("frames left open after lowering"));
        }
        sections::entry_stub(&mut self.listing, &self.options.entry_point);
        self.imports.render(&mut self.listing);

        info!(
            "generated {} lines ({} functions, {} strings, {} import libraries)",
            self.listing.lines().len(),
            self.functions.len(),
            self.strings.len(),
            self.imports.libraries().count()
        );
        Ok(self.listing.finish())
    }

    fn emit(&mut self, instruction: impl AsRef<str>) {
        self.listing.emit(instruction);
    }

    fn load_sized(&mut self, reg: Register, address: &str, ty: &Type) -> Result<()> {
        let size = ty.size_of();
        let target = r64(reg);
        let instruction = match size {
            8 => format!("mov {}, [{}]", target, address),
            4 if ty.is_signed() => format!("movsxd {}, dword [{}]", target, address),
            // a 32-bit write clears the upper half
            4 => format!("mov {}, dword [{}]", alias(reg, 4), address),
            2 | 1 if ty.is_signed() => {
                format!("movsx {}, {} [{}]", target, width(size), address)
            }
            2 | 1 => format!("movzx {}, {} [{}]", target, width(size), address),
            _ => {
                return Err(BadError::codegen_error(format!(
                    "cannot load a value of type {}",
                    ty
                )))
            }
        };
        self.emit(instruction);
        Ok(())
    }

    fn stack_slot(offset: usize) -> String {
        format!("rsp+{}", offset)
    }

    /// Re-extends the low `size` bytes of `reg` to 64 bits.
    fn extend(&mut self, reg: Register, size: usize, signed: bool) {
        let target = r64(reg);
        let source = alias(reg, size);
        let instruction = match (size, signed) {
            (8, _) => return,
            (4, true) => format!("movsxd {}, {}", target, source),
            (4, false) => format!("mov {}, {}", source, source),
            (_, true) => format!("movsx {}, {}", target, source),
            (_, false) => format!("movzx {}, {}", target, source),
        };
        self.emit(instruction);
    }

    fn divide(&mut self, left: Register, right: Register, signed: bool) {
        let divisor = r64(Register::Scratch2);
        if right != Register::Scratch2 {
            self.emit(format!("mov {}, {}", divisor, r64(right)));
        }
        if left != Register::Return {
            self.emit(format!("mov rax, {}", r64(left)));
        }
        // rdx may hold the second call argument
        self.emit("mov r10, rdx");
        if signed {
            self.emit("cqo");
            self.emit(format!("idiv {}", divisor));
        } else {
            self.emit("xor edx, edx");
            self.emit(format!("div {}", divisor));
        }
        self.emit("mov rdx, r10");
        if left != Register::Return {
            self.emit(format!("mov {}, rax", r64(left)));
        }
    }

    fn function_parts(&self, node: NodeId) -> Result<(String, Vec<(String, Type)>, Vec<NodeId>)> {
        match self.ast.kind(node) {
            NodeKind::FunctionDecl {
                name, params, body, ..
            } => Ok((
                name.clone(),
                params.iter().map(|p| (p.name.clone(), p.ty.clone())).collect(),
                body.clone(),
            )),
            _ => Err(BadError::codegen_error_at(
                self.ast.position(node),
                "expected a function declaration",
            )),
        }
    }
}

impl<'a> Expand for X86_64Generator<'a> {
    fn expand(&mut self, node: NodeId) -> Result<Vec<Deferred<Self>>> {
        lower::expand(self, node)
    }
}

impl<'a> Generator for X86_64Generator<'a> {
    fn ast(&self) -> &Ast {
        self.ast
    }

    fn options(&self) -> &CompilerOptions {
        self.options
    }

    fn type_of(&self, node: NodeId) -> Result<Type> {
        self.types.get(node).cloned().ok_or_else(|| {
            BadError::codegen_error_at(self.ast.position(node), "Expression has no type")
        })
    }

    fn load_immediate(&mut self, reg: Register, value: i64) {
        self.emit(format!("mov {}, {}", r64(reg), value));
    }

    fn load_string(&mut self, reg: Register, bytes: &[u8]) -> Result<()> {
        let index = self
            .strings
            .index_of(bytes)
            .ok_or_else(|| BadError::codegen_error("string literal missing from the data section"))?;
        self.emit(format!("lea {}, [{}]", r64(reg), StringTable::label(index)));
        Ok(())
    }

    fn load_register(&mut self, dst: Register, src: Register) {
        if dst != src {
            self.emit(format!("mov {}, {}", r64(dst), r64(src)));
        }
    }

    fn load_identifier(&mut self, reg: Register, name: &str) -> Result<()> {
        if self.frames.is_variable(name) {
            let (offset, ty) = self.frames.find_variable(name)?;
            if let Type::Array { .. } = ty {
                self.listing.annotated(
                    format!("lea {}, [{}]", r64(reg), Self::stack_slot(offset)),
                    format!("address of {}", name),
                );
                return Ok(());
            }
            self.listing.comment(format!("load {}", name));
            return self.load_sized(reg, &Self::stack_slot(offset), &ty);
        }
        self.load_address(reg, name)
    }

    fn load_address(&mut self, reg: Register, name: &str) -> Result<()> {
        if self.frames.is_variable(name) {
            let (offset, _) = self.frames.find_variable(name)?;
            self.listing.annotated(
                format!("lea {}, [{}]", r64(reg), Self::stack_slot(offset)),
                format!("address of {}", name),
            );
        } else if self.externs.contains(name) {
            self.emit(format!("mov {}, [{}]", r64(reg), name));
        } else if self.functions.contains(name) {
            self.emit(format!("lea {}, [{}]", r64(reg), name));
        } else {
            return Err(BadError::codegen_error(format!(
                "identifier {} not found",
                name
            )));
        }
        Ok(())
    }

    fn load_indirect(&mut self, reg: Register, pointer: Register, ty: &Type) -> Result<()> {
        if let Type::Array { .. } = ty {
            self.load_register(reg, pointer);
            return Ok(());
        }
        self.load_sized(reg, r64(pointer), ty)
    }

    fn store_variable(&mut self, name: &str, reg: Register) -> Result<()> {
        let (offset, ty) = self.frames.find_variable(name)?;
        let size = ty.size_of();
        if size == 0 || size > 8 || matches!(ty, Type::Array { .. }) {
            return Err(BadError::codegen_error(format!(
                "cannot store a value of type {} into {}",
                ty, name
            )));
        }
        self.listing.annotated(
            format!("mov [{}], {}", Self::stack_slot(offset), alias(reg, size)),
            format!("store {}", name),
        );
        Ok(())
    }

    fn store_element(&mut self, name: &str, offset: usize, reg: Register, ty: &Type) -> Result<()> {
        let (base, _) = self.frames.find_variable(name)?;
        self.emit(format!(
            "mov [{}], {}",
            Self::stack_slot(base + offset),
            alias(reg, ty.size_of())
        ));
        Ok(())
    }

    fn store_indirect(&mut self, pointer: Register, value: Register, ty: &Type) -> Result<()> {
        let size = ty.size_of();
        if size == 0 || size > 8 || matches!(ty, Type::Array { .. }) {
            return Err(BadError::codegen_error(format!(
                "cannot store a value of type {} through a pointer",
                ty
            )));
        }
        self.emit(format!("mov [{}], {}", r64(pointer), alias(value, size)));
        Ok(())
    }

    fn store_argument(&mut self, index: usize, reg: Register) -> Result<()> {
        let offset = self.frames.top()?.child_argument_offset(index)?;
        self.listing.annotated(
            format!("mov [{}], {}", Self::stack_slot(offset), r64(reg)),
            format!("argument {}", index + 1),
        );
        Ok(())
    }

    fn push_temp(&mut self, reg: Register) -> Result<()> {
        let offset = self.frames.top_mut()?.push_temp(8)?;
        self.listing.annotated(
            format!("mov [{}], {}", Self::stack_slot(offset), r64(reg)),
            "spill",
        );
        Ok(())
    }

    fn pop_temp(&mut self, reg: Register) -> Result<()> {
        let offset = self.frames.top_mut()?.pop_temp(8)?;
        self.listing.annotated(
            format!("mov {}, [{}]", r64(reg), Self::stack_slot(offset)),
            "reload",
        );
        Ok(())
    }

    fn allocate_variable(&mut self, name: &str, ty: &Type) -> Result<()> {
        let offset = self.frames.top_mut()?.add_local(name, ty)?;
        self.listing
            .comment(format!("{} {} at [{}]", ty, name, Self::stack_slot(offset)));
        Ok(())
    }

    fn arithmetic(&mut self, op: ArithOp, left: Register, right: Register, signed: bool) {
        let (l, r) = (r64(left), r64(right));
        match op {
            ArithOp::Add => self.emit(format!("add {}, {}", l, r)),
            ArithOp::Subtract => self.emit(format!("sub {}, {}", l, r)),
            ArithOp::Multiply => self.emit(format!("imul {}, {}", l, r)),
            ArithOp::Divide => self.divide(left, right, signed),
        }
    }

    fn compare(&mut self, op: CompareOp, left: Register, right: Register, unsigned: bool) {
        self.emit(format!("cmp {}, {}", r64(left), r64(right)));
        self.emit(format!(
            "set{} {}",
            condition_code(op, unsigned),
            alias(left, 1)
        ));
        self.emit(format!("movzx {}, {}", r64(left), alias(left, 1)));
    }

    fn logical(&mut self, op: LogicalOp, left: Register, right: Register) {
        let mnemonic = match op {
            LogicalOp::And => "and",
            LogicalOp::Or => "or",
        };
        self.emit(format!("{} {}, {}", mnemonic, r64(left), r64(right)));
    }

    fn not(&mut self, reg: Register) {
        self.emit(format!("test {}, {}", r64(reg), r64(reg)));
        self.emit(format!("setz {}", alias(reg, 1)));
        self.emit(format!("movzx {}, {}", r64(reg), alias(reg, 1)));
    }

    fn scale(&mut self, reg: Register, factor: usize) {
        if factor != 1 {
            self.emit(format!("imul {}, {}, {}", r64(reg), r64(reg), factor));
        }
    }

    fn cast(&mut self, reg: Register, from: &Type, to: &Type) {
        let (from_size, to_size) = (from.size_of(), to.size_of());
        if from == to || from_size == 0 || to_size == 0 {
            return;
        }
        if from_size < to_size {
            self.extend(reg, from_size, from.is_signed());
        } else if from_size > to_size || (to_size < 8 && from.is_signed() != to.is_signed()) {
            // keep the low bytes, extended the way the target type reads
            self.extend(reg, to_size, to.is_signed());
        }
    }

    fn unique_label(&mut self) -> String {
        let label = format!("label_{}", self.labels);
        self.labels += 1;
        label
    }

    fn unique_name(&mut self) -> String {
        let name = format!("array_{}", self.names);
        self.names += 1;
        name
    }

    fn label(&mut self, label: &str) {
        self.listing.label(label);
    }

    fn jump(&mut self, label: &str) {
        self.emit(format!("jmp {}", label));
    }

    fn jump_if_zero(&mut self, reg: Register, label: &str) {
        self.emit(format!("test {}, {}", r64(reg), r64(reg)));
        self.emit(format!("jz {}", label));
    }

    fn call(&mut self, callee: Option<&str>) -> Result<()> {
        let name = match callee {
            Some(name) => name,
            None => {
                self.emit(format!("call {}", r64(Register::Scratch2)));
                return Ok(());
            }
        };
        if self.frames.is_variable(name) {
            self.load_identifier(Register::Return, name)?;
            self.emit("call rax");
        } else if self.externs.contains(name) {
            self.emit(format!("call [{}]", name));
        } else if self.functions.contains(name) {
            self.emit(format!("call {}", name));
        } else {
            return Err(BadError::codegen_error(format!(
                "call to unknown function {}",
                name
            )));
        }
        Ok(())
    }

    fn add_extern(&mut self, name: &str, library: &str) {
        self.imports.add(name, library);
    }

    fn ret(&mut self) -> Result<()> {
        let frame = self.frames.top()?;
        if frame.is_block() {
            warn!("return inside a block releases only the block's frame");
        }
        let reserved = frame.reserved();
        self.emit(format!("add rsp, {}", reserved));
        self.emit("ret");
        Ok(())
    }

    fn function(&mut self, node: NodeId) -> Result<Vec<Deferred<Self>>> {
        let (name, params, body) = self.function_parts(node)?;
        debug!("lowering function {}", name);

        self.listing.blank();
        self.listing.label(&name);
        let mut frame = Frame::layout(self.ast, self.types, &body, false);
        for (i, (param, ty)) in params.iter().enumerate() {
            frame.add_parameter(param, i, ty.clone());
        }
        let words = frame.words();
        let homes: Vec<(Register, usize)> = Register::ARGUMENTS
            .iter()
            .copied()
            .zip(params.iter().enumerate().map(|(i, _)| frame.parameter_offset(i)))
            .collect();
        self.frames.push(frame);

        self.listing
            .annotated(format!("sub rsp, {}", words * 8), format!("frame of {}", name));
        for (reg, offset) in homes {
            self.emit(format!("mov [{}], {}", Self::stack_slot(offset), r64(reg)));
        }

        let mut ops: Vec<Deferred<Self>> = body.into_iter().map(Deferred::Visit).collect();
        ops.push(Deferred::finalize(move |gen: &mut Self| {
            gen.frames.pop()?;
            gen.emit(format!("add rsp, {}", words * 8));
            gen.emit("ret");
            Ok(())
        }));
        Ok(ops)
    }

    fn block(&mut self, node: NodeId) -> Result<Vec<Deferred<Self>>> {
        let statements = match self.ast.kind(node) {
            NodeKind::Block(statements) => statements.clone(),
            _ => {
                return Err(BadError::codegen_error_at(
                    self.ast.position(node),
                    "expected a block",
                ))
            }
        };
        let frame = Frame::layout(self.ast, self.types, &statements, true);
        let reserved = frame.reserved();
        self.frames.push(frame);
        self.listing
            .annotated(format!("sub rsp, {}", reserved), "block frame");

        let mut ops: Vec<Deferred<Self>> = statements.into_iter().map(Deferred::Visit).collect();
        ops.push(Deferred::finalize(move |gen: &mut Self| {
            gen.frames.pop()?;
            gen.emit(format!("add rsp, {}", reserved));
            Ok(())
        }));
        Ok(ops)
    }
}
