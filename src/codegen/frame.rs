//! Stack frames of functions and blocks.
//!
//! Every frame is addressed relative to the stack pointer after its own
//! reservation. From low to high addresses it holds the argument area for
//! calls made from the frame (at least four slots of shadow space), the
//! temporary area and the locals:
//!
//! ```text
//! rsp + 0                      outgoing call arguments
//! rsp + max_args*8             alignment pad word, when needed
//! ...                          temporaries, growing down from the locals
//! rsp + words*8 - local_size   locals, allocated downward from the top
//! rsp + words*8                return address, or the block pad word
//! rsp + words*8 + 8            incoming parameters (functions only)
//! ```

use crate::{
    ast::{Ast, NodeId, NodeKind, TypeTable},
    error::BadError,
    types::Type,
    Result,
};
use log::debug;
use std::collections::HashMap;

/// Inclusive byte range inside a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub min: usize,
    pub max: usize,
}

impl Span {
    fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.min && offset <= self.max
    }
}

#[derive(Debug, Clone)]
pub struct Frame {
    words: usize,
    is_block: bool,
    max_args: usize,
    local_size: usize,
    tmp_size: usize,

    arguments: Span,
    temporaries: Span,
    locals: Span,

    variables: HashMap<String, (usize, Type)>,
    local_offset: usize,
    tmp_offset: usize,
    tmp_allocated: usize,
    tmp_sizes: Vec<usize>,
}

impl Frame {
    /// Sizes the frame for the statements directly owned by a function body
    /// or block. Nested blocks get frames of their own and are skipped.
    pub fn layout(ast: &Ast, types: &TypeTable, statements: &[NodeId], is_block: bool) -> Self {
        let mut local_size = 0;
        let mut max_args = 4;
        let mut tmp_size = 0;

        for &statement in statements {
            ast.walk(statement, |id, node| match &node.kind {
                NodeKind::Block(_) => false,
                NodeKind::VarDecl { ty, .. } => {
                    local_size += ty.local_size();
                    true
                }
                NodeKind::ArrayLiteral(_) => {
                    if let Some(ty) = types.get(id) {
                        local_size += ty.local_size();
                    }
                    true
                }
                NodeKind::FunctionCall { args, .. } => {
                    max_args = max_args.max(args.len());
                    true
                }
                _ => true,
            });
            tmp_size = tmp_size.max(ast.temp_size(statement));
        }

        Self::with_sizes(max_args, local_size, tmp_size, is_block)
    }

    pub fn with_sizes(max_args: usize, local_size: usize, tmp_size: usize, is_block: bool) -> Self {
        let mut words = max_args + local_size / 8 + tmp_size / 8;
        // keep rsp 16-byte aligned once the return address (or the block
        // pad word) is counted
        words += (words + 1) % 2;

        let top = words * 8;
        let temps_top = top - local_size;
        let frame = Self {
            words,
            is_block,
            max_args,
            local_size,
            tmp_size,
            arguments: Span::new(0, max_args * 8 - 8),
            temporaries: Span::new(temps_top - tmp_size, temps_top),
            locals: Span::new(temps_top, top),
            variables: HashMap::new(),
            local_offset: top,
            tmp_offset: temps_top,
            tmp_allocated: 0,
            tmp_sizes: Vec::new(),
        };
        debug!(
            "{} frame: {} words (args {}, temps {} bytes, locals {} bytes)",
            if is_block { "block" } else { "function" },
            frame.words,
            frame.max_args,
            frame.tmp_size,
            frame.local_size
        );
        frame
    }

    pub fn words(&self) -> usize {
        self.words
    }

    pub fn is_block(&self) -> bool {
        self.is_block
    }

    pub fn max_args(&self) -> usize {
        self.max_args
    }

    /// Bytes the frame occupies below the next outer frame. A block has no
    /// return address, so it reserves one extra word in its place.
    pub fn reserved(&self) -> usize {
        if self.is_block {
            (self.words + 1) * 8
        } else {
            self.words * 8
        }
    }

    pub fn parameter_offset(&self, index: usize) -> usize {
        (self.words + 1) * 8 + index * 8
    }

    pub fn add_parameter(&mut self, name: &str, index: usize, ty: Type) {
        let offset = self.parameter_offset(index);
        self.variables.insert(name.to_string(), (offset, ty));
    }

    /// Slot where a call made from this frame passes argument `index`.
    pub fn child_argument_offset(&self, index: usize) -> Result<usize> {
        let offset = index * 8;
        if !self.arguments.contains(offset) {
            return Err(BadError::codegen_error(format!(
                "argument {} is outside the argument area (0..={})",
                index, self.arguments.max
            )));
        }
        Ok(offset)
    }

    pub fn add_local(&mut self, name: &str, ty: &Type) -> Result<usize> {
        if name.is_empty() {
            return Err(BadError::codegen_error("local variable without a name"));
        }
        if self.variables.contains_key(name) {
            return Err(BadError::codegen_error(format!(
                "local {} allocated twice in one frame",
                name
            )));
        }
        let size = ty.local_size();
        if self.local_offset % 8 != 0 || self.local_offset < size {
            return Err(BadError::codegen_error(format!(
                "no room for local {} of type {}",
                name, ty
            )));
        }
        self.local_offset -= size;
        if !self.locals.contains(self.local_offset) {
            return Err(BadError::codegen_error(format!(
                "local {} at offset {} is outside the local area ({}..={})",
                name, self.local_offset, self.locals.min, self.locals.max
            )));
        }
        self.variables
            .insert(name.to_string(), (self.local_offset, ty.clone()));
        Ok(self.local_offset)
    }

    /// Reserves a temporary slot and yields its offset.
    pub fn push_temp(&mut self, size: usize) -> Result<usize> {
        if self.tmp_allocated + size > self.tmp_size {
            return Err(BadError::codegen_error(format!(
                "temporary area overflow: {} + {} > {}",
                self.tmp_allocated, size, self.tmp_size
            )));
        }
        if self.tmp_offset % 8 != 0 {
            return Err(BadError::codegen_error("misaligned temporary slot"));
        }
        self.tmp_allocated += size;
        self.tmp_sizes.push(size);
        self.tmp_offset -= size;
        if self.tmp_offset < self.temporaries.min {
            return Err(BadError::codegen_error(format!(
                "temporary at offset {} is below the temporary area ({})",
                self.tmp_offset, self.temporaries.min
            )));
        }
        Ok(self.tmp_offset)
    }

    /// Releases the most recent temporary and yields the offset it had.
    pub fn pop_temp(&mut self, size: usize) -> Result<usize> {
        match self.tmp_sizes.pop() {
            Some(pushed) if pushed == size => {
                let offset = self.tmp_offset;
                self.tmp_offset += size;
                self.tmp_allocated -= size;
                Ok(offset)
            }
            Some(pushed) => Err(BadError::codegen_error(format!(
                "temporary popped as {} bytes but pushed as {}",
                size, pushed
            ))),
            None => Err(BadError::codegen_error("pop from an empty temporary area")),
        }
    }

    pub fn variable(&self, name: &str) -> Option<&(usize, Type)> {
        self.variables.get(name)
    }
}

/// Frames of the function being lowered, innermost last.
#[derive(Debug, Default)]
pub struct FrameStack {
    frames: Vec<Frame>,
}

impl FrameStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Result<Frame> {
        self.frames
            .pop()
            .ok_or_else(|| BadError::codegen_error("frame stack underflow"))
    }

    pub fn top(&self) -> Result<&Frame> {
        self.frames
            .last()
            .ok_or_else(|| BadError::codegen_error("no active frame"))
    }

    pub fn top_mut(&mut self) -> Result<&mut Frame> {
        self.frames
            .last_mut()
            .ok_or_else(|| BadError::codegen_error("no active frame"))
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn is_variable(&self, name: &str) -> bool {
        self.frames.iter().any(|f| f.variable(name).is_some())
    }

    /// Offset of `name` from the current stack pointer. Every frame between
    /// here and the declaring one adds its size plus one word for the
    /// return address or block pad.
    pub fn find_variable(&self, name: &str) -> Result<(usize, Type)> {
        let mut skipped = 0;
        for frame in self.frames.iter().rev() {
            if let Some((offset, ty)) = frame.variable(name) {
                return Ok((skipped + offset, ty.clone()));
            }
            skipped += frame.words * 8 + 8;
        }
        Err(BadError::codegen_error(format!("variable {} not found", name)))
    }
}
