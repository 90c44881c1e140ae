//! Depth-first evaluation of a tree on an explicit work stack.
//!
//! A context never recurses into children. When asked to expand a node it
//! returns the ordered work for that node: children to visit and
//! finalizers that run once the work queued before them has completed.
//! Deep expression trees therefore cost heap, not native stack.

use crate::{ast::NodeId, Result};
use log::trace;

/// Closure run against the context after the work queued before it.
pub type Finalizer<C> = Box<dyn FnOnce(&mut C) -> Result<()>>;

pub enum Deferred<C> {
    /// Fully process this node.
    Visit(NodeId),
    Finalize(Finalizer<C>),
}

impl<C> Deferred<C> {
    pub fn finalize<F>(f: F) -> Self
    where
        F: FnOnce(&mut C) -> Result<()> + 'static,
    {
        Deferred::Finalize(Box::new(f))
    }
}

/// A pass that can be driven by [`evaluate`].
pub trait Expand: Sized {
    fn expand(&mut self, node: NodeId) -> Result<Vec<Deferred<Self>>>;
}

/// LIFO of pending work. Sequences are pushed reversed so that popping
/// yields them in their original order.
pub struct WorkStack<C> {
    pending: Vec<Deferred<C>>,
}

impl<C> WorkStack<C> {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    pub fn push_sequence(&mut self, ops: Vec<Deferred<C>>) {
        self.pending.extend(ops.into_iter().rev());
    }

    pub fn pop(&mut self) -> Option<Deferred<C>> {
        self.pending.pop()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl<C> Default for WorkStack<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs `root` to completion. The first error aborts the walk and is
/// returned as is. Yields the number of operations executed.
pub fn evaluate<C: Expand>(ctx: &mut C, root: NodeId) -> Result<usize> {
    let mut stack = WorkStack::new();
    stack.push_sequence(vec![Deferred::Visit(root)]);

    let mut executed = 0;
    let mut peak = 0;
    while let Some(op) = stack.pop() {
        executed += 1;
        match op {
            Deferred::Visit(node) => {
                let ops = ctx.expand(node)?;
                stack.push_sequence(ops);
                peak = peak.max(stack.len());
            }
            Deferred::Finalize(f) => f(ctx)?,
        }
    }

    trace!(
        "evaluated {:?}: {} operations, peak depth {}",
        root,
        executed,
        peak
    );
    Ok(executed)
}
