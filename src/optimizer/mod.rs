mod const_fold;

pub use const_fold::{fold_value, ConstantFolder};

use crate::ast::{Ast, TypeTable};
use log::info;

/// Runs the tree-level optimizations that follow type checking.
pub fn optimize(ast: &mut Ast, types: &mut TypeTable) -> usize {
    let folded = ConstantFolder::new().fold_program(ast, types);
    info!("constant folding replaced {} operands", folded);
    folded
}
