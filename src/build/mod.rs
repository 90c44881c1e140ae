//! Source-to-listing pipeline and the file-level build entry point.

use crate::{
    ast::{Ast, NodeKind},
    codegen::{self, CompilerOptions},
    optimizer, parser,
    source_location::Position,
    types::{checker::check_program, Type},
    Result,
};
use log::{debug, info};
use serde::Serialize;
use std::{fs, io, path::PathBuf};

#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub options: CompilerOptions,
}

impl BuildConfig {
    pub fn new(input_path: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            input_path: input_path.into(),
            output_path: output_path.into(),
            options: CompilerOptions::default(),
        }
    }
}

/// Parses, checks, optionally folds and lowers one program.
pub fn compile(source: &str, options: &CompilerOptions) -> Result<String> {
    let mut ast = parser::parse(source)?;
    debug!("parsed {} nodes, {} top-level items", ast.len(), ast.items().len());

    let mut types = check_program(&ast, &options.entry_point)?;
    if options.fold_constants {
        optimizer::optimize(&mut ast, &mut types);
    }
    codegen::generate(&ast, &types, options)
}

/// Reads `input_path`, compiles it and writes the listing to
/// `output_path`.
pub fn build(config: &BuildConfig) -> Result<()> {
    info!("compiling {}", config.input_path.display());
    let source = fs::read_to_string(&config.input_path)?;
    let listing = compile(&source, &config.options)?;

    if let Some(parent) = config.output_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(&config.output_path, listing)?;
    info!("wrote {}", config.output_path.display());
    Ok(())
}

/// A top-level declaration as reported by `badc check --json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signature {
    pub name: String,
    pub kind: &'static str,
    pub signature: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library: Option<String>,
    pub position: Position,
}

/// Type checks a program and lists its declarations.
pub fn check(source: &str, entry_point: &str) -> Result<Vec<Signature>> {
    let ast = parser::parse(source)?;
    check_program(&ast, entry_point)?;
    Ok(signatures(&ast))
}

pub fn signatures(ast: &Ast) -> Vec<Signature> {
    ast.items()
        .iter()
        .filter_map(|&item| {
            let kind = ast.kind(item);
            let signature = Type::Function(kind.signature()?).to_string();
            let (name, kind, library) = match kind {
                NodeKind::FunctionDecl { name, .. } => (name.clone(), "func", None),
                NodeKind::Extern { name, library, .. } => {
                    (name.clone(), "extern", Some(library.clone()))
                }
                _ => return None,
            };
            Some(Signature {
                name,
                kind,
                signature,
                library,
                position: ast.position(item),
            })
        })
        .collect()
}

pub fn signatures_json(signatures: &[Signature]) -> Result<String> {
    Ok(serde_json::to_string_pretty(signatures).map_err(io::Error::from)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const HELLO: &str = r#"
        (extern puts ((* char)) int "msvcrt.dll")
        (func main () int
          (call puts "hello")
          (return 0))
    "#;

    #[test]
    fn test_check_lists_declarations() {
        let signatures = check(HELLO, "main").unwrap();
        assert_eq!(signatures.len(), 2);
        assert_eq!(signatures[0].name, "puts");
        assert_eq!(signatures[0].kind, "extern");
        assert_eq!(signatures[0].library.as_deref(), Some("msvcrt.dll"));
        assert_eq!(signatures[1].signature, "(func () int)");

        let json = signatures_json(&signatures).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[1]["name"], "main");
        assert!(value[1].get("library").is_none());
    }

    #[test]
    fn test_compile_honours_entry_point() {
        let options = CompilerOptions {
            entry_point: "start".to_string(),
            ..CompilerOptions::default()
        };
        let err = compile(HELLO, &options).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeError);

        let listing = compile(&HELLO.replace("main", "start"), &options).unwrap();
        assert!(listing.contains("    call start\n"));
    }

    #[test]
    fn test_build_writes_listing() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("hello.bad");
        let output = dir.path().join("out").join("hello.asm");
        fs::write(&input, HELLO).unwrap();

        build(&BuildConfig::new(&input, &output)).unwrap();
        let listing = fs::read_to_string(&output).unwrap();
        assert!(listing.starts_with("format PE64 console 6.0"));
        assert!(listing.contains("string_0 db \"hello\", 0"));
    }

    #[test]
    fn test_build_reports_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let config = BuildConfig::new(dir.path().join("absent.bad"), dir.path().join("a.asm"));
        assert_eq!(build(&config).unwrap_err().kind(), ErrorKind::Io);
    }
}
