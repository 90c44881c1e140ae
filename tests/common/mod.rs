#![allow(dead_code)]

use bad_lang::{
    ast::{Ast, NodeId, NodeKind},
    build, parser,
    types::checker::check_program,
    CompilerOptions, TypeTable,
};
use std::path::{Path, PathBuf};

/// Compiles with default options, panicking on any error.
pub fn compile(source: &str) -> String {
    match build::compile(source, &CompilerOptions::default()) {
        Ok(listing) => listing,
        Err(err) => panic!("compilation failed: {}\n{}", err, source),
    }
}

pub fn compile_unfolded(source: &str) -> String {
    let options = CompilerOptions {
        fold_constants: false,
        ..CompilerOptions::default()
    };
    build::compile(source, &options).unwrap()
}

pub fn check(source: &str) -> (Ast, TypeTable) {
    let ast = parser::parse(source).unwrap();
    let types = check_program(&ast, "main").unwrap();
    (ast, types)
}

/// Instructions of `function`, from its label to the next blank line,
/// without indentation.
pub fn function_body(listing: &str, function: &str) -> Vec<String> {
    let label = format!("{}:", function);
    listing
        .lines()
        .skip_while(|line| *line != label)
        .skip(1)
        .take_while(|line| !line.is_empty())
        .map(|line| line.trim().to_string())
        .collect()
}

/// Whether `expected` appears as a contiguous run inside `body`.
pub fn contains_run(body: &[String], expected: &[&str]) -> bool {
    body.windows(expected.len())
        .any(|window| window.iter().zip(expected).all(|(a, b)| a == b))
}

pub fn first_node(ast: &Ast, matches: impl Fn(&NodeKind) -> bool) -> Option<NodeId> {
    let mut found = None;
    for &item in ast.items() {
        ast.walk(item, |id, node| {
            if found.is_none() && matches(&node.kind) {
                found = Some(id);
            }
            found.is_none()
        });
    }
    found
}

pub fn write_source(dir: &Path, name: &str, content: &str) -> std::io::Result<PathBuf> {
    let path = dir.join(name);
    std::fs::write(&path, content)?;
    Ok(path)
}
