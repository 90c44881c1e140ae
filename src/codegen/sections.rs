//! Assembly text assembled around the lowered functions: the PE header,
//! the data section with interned strings, the process entry stub and the
//! import table.

use crate::ast::{Ast, NodeKind};
use std::collections::HashMap;

/// Growing FASM listing. Instructions are indented, labels are not.
#[derive(Debug, Default)]
pub struct Listing {
    lines: Vec<String>,
    annotate: bool,
}

impl Listing {
    pub fn new(annotate: bool) -> Self {
        Self {
            lines: Vec::new(),
            annotate,
        }
    }

    pub fn emit(&mut self, instruction: impl AsRef<str>) {
        self.lines.push(format!("    {}", instruction.as_ref()));
    }

    /// Emits an instruction with a trailing `;` comment when annotation is
    /// enabled.
    pub fn annotated(&mut self, instruction: impl AsRef<str>, comment: impl AsRef<str>) {
        if self.annotate {
            self.lines.push(format!(
                "    {} ; {}",
                instruction.as_ref(),
                comment.as_ref()
            ));
        } else {
            self.emit(instruction);
        }
    }

    pub fn comment(&mut self, text: impl AsRef<str>) {
        if self.annotate {
            self.lines.push(format!("    ; {}", text.as_ref()));
        }
    }

    pub fn label(&mut self, name: &str) {
        self.lines.push(format!("{}:", name));
    }

    /// Line written verbatim, without indentation.
    pub fn raw(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn blank(&mut self) {
        self.lines.push(String::new());
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn finish(self) -> String {
        let mut text = self.lines.join("\n");
        text.push('\n');
        text
    }
}

pub fn header(listing: &mut Listing) {
    listing.raw("format PE64 console 6.0");
    listing.raw("entry _start");
    listing.raw("include 'win64a.inc'");
    listing.blank();
}

/// Distinct string literals of a program, numbered in order of first
/// appearance.
#[derive(Debug, Default)]
pub struct StringTable {
    strings: Vec<Vec<u8>>,
    index: HashMap<Vec<u8>, usize>,
}

impl StringTable {
    pub fn collect(ast: &Ast) -> Self {
        let mut table = Self::default();
        for &item in ast.items() {
            ast.walk(item, |_, node| {
                if let NodeKind::StringLiteral(bytes) = &node.kind {
                    table.intern(bytes);
                }
                true
            });
        }
        table
    }

    pub fn intern(&mut self, bytes: &[u8]) -> usize {
        if let Some(&i) = self.index.get(bytes) {
            return i;
        }
        let i = self.strings.len();
        self.strings.push(bytes.to_vec());
        self.index.insert(bytes.to_vec(), i);
        i
    }

    pub fn index_of(&self, bytes: &[u8]) -> Option<usize> {
        self.index.get(bytes).copied()
    }

    pub fn label(index: usize) -> String {
        format!("string_{}", index)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn render(&self, listing: &mut Listing) {
        for (i, bytes) in self.strings.iter().enumerate() {
            listing.raw(format!("{} db {}", Self::label(i), render_db(bytes)));
        }
    }
}

/// Operand list of a zero-terminated `db`. Printable ASCII goes in quoted
/// runs; quotes and every other byte are written as numbers, since FASM
/// string literals cannot hold a line break.
pub fn render_db(bytes: &[u8]) -> String {
    let mut parts = Vec::new();
    let mut run = String::new();
    for &byte in bytes {
        if (0x20..=0x7e).contains(&byte) && byte != b'"' {
            run.push(byte as char);
        } else {
            if !run.is_empty() {
                parts.push(format!("\"{}\"", run));
                run.clear();
            }
            parts.push(byte.to_string());
        }
    }
    if !run.is_empty() {
        parts.push(format!("\"{}\"", run));
    }
    parts.push("0".to_string());
    parts.join(", ")
}

pub fn data_section(listing: &mut Listing, strings: &StringTable) {
    listing.raw("section '.data' data readable writeable");
    listing.raw("argc dq ?");
    listing.raw("argv dq ?");
    listing.raw("env dq ?");
    listing.raw("startInfo STARTUPINFO");
    strings.render(listing);
    listing.blank();
}

/// Process entry: fetches the command line through `__getmainargs`,
/// calls `entry_point(argc, argv)` and exits with its result.
pub fn entry_stub(listing: &mut Listing, entry_point: &str) {
    listing.blank();
    listing.label("_start");
    listing.annotated("sub rsp, 40", "shadow space plus the fifth argument");
    listing.emit("lea rcx, [argc]");
    listing.emit("lea rdx, [argv]");
    listing.emit("lea r8, [env]");
    listing.annotated("mov r9, 0", "no wildcard expansion");
    listing.emit("lea r11, [startInfo]");
    listing.emit("mov [rsp+32], r11");
    listing.emit("call [__getmainargs]");
    listing.emit("mov rcx, [argc]");
    listing.emit("mov rdx, [argv]");
    listing.emit(format!("call {}", entry_point));
    listing.annotated("mov rcx, rax", "exit code");
    listing.emit("call [ExitProcess]");
    listing.emit("add rsp, 40");
    listing.emit("ret");
    listing.blank();
}

/// Functions imported per library, in order of first use.
#[derive(Debug)]
pub struct ImportTable {
    libraries: Vec<(String, Vec<String>)>,
}

impl ImportTable {
    /// Starts with the two functions the entry stub needs.
    pub fn new() -> Self {
        let mut table = Self {
            libraries: Vec::new(),
        };
        table.add("ExitProcess", "kernel32.dll");
        table.add("__getmainargs", "msvcrt.dll");
        table
    }

    pub fn add(&mut self, function: &str, library: &str) {
        let library = library.to_lowercase();
        let position = self.libraries.iter().position(|(name, _)| *name == library);
        let functions = match position {
            Some(i) => &mut self.libraries[i].1,
            None => {
                self.libraries.push((library, Vec::new()));
                let last = self.libraries.len() - 1;
                &mut self.libraries[last].1
            }
        };
        if !functions.iter().any(|f| f == function) {
            functions.push(function.to_string());
        }
    }

    pub fn contains(&self, function: &str) -> bool {
        self.libraries
            .iter()
            .any(|(_, functions)| functions.iter().any(|f| f == function))
    }

    pub fn libraries(&self) -> impl Iterator<Item = &str> {
        self.libraries.iter().map(|(name, _)| name.as_str())
    }

    pub fn render(&self, listing: &mut Listing) {
        listing.raw("section '.idata' import data readable writeable");
        for (i, (library, _)) in self.libraries.iter().enumerate() {
            let prefix = if i == 0 { "library " } else { "    " };
            let suffix = if i + 1 < self.libraries.len() { ",\\" } else { "" };
            listing.raw(format!(
                "{}{},'{}'{}",
                prefix,
                library_symbol(library),
                library,
                suffix
            ));
        }
        listing.blank();
        for (library, functions) in &self.libraries {
            listing.raw(format!("import {},\\", library_symbol(library)));
            for (j, function) in functions.iter().enumerate() {
                let suffix = if j + 1 < functions.len() { ",\\" } else { "" };
                listing.raw(format!("    {},'{}'{}", function, function, suffix));
            }
            listing.blank();
        }
    }
}

impl Default for ImportTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Assembler symbol naming a library: `msvcrt.dll` becomes `msvcrt`.
pub fn library_symbol(library: &str) -> String {
    let stem = library.strip_suffix(".dll").unwrap_or(library);
    stem.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn test_render_db() {
        assert_eq!(render_db(b"hello"), "\"hello\", 0");
        assert_eq!(render_db(b"hi\n"), "\"hi\", 10, 0");
        assert_eq!(render_db(b""), "0");
        assert_eq!(render_db(b"say \"x\""), "\"say \", 34, \"x\", 34, 0");
        assert_eq!(render_db(&[0xff, b'a']), "255, \"a\", 0");
    }

    #[test]
    fn test_strings_are_interned_in_first_use_order() {
        let ast = parse(
            r#"(extern puts ((* char)) int "msvcrt.dll")
               (func main () int
                 (call puts "b")
                 (call puts "a")
                 (call puts "b")
                 (return 0))"#,
        )
        .unwrap();
        let strings = StringTable::collect(&ast);
        assert_eq!(strings.len(), 2);
        assert_eq!(strings.index_of(b"b"), Some(0));
        assert_eq!(strings.index_of(b"a"), Some(1));

        let mut listing = Listing::new(false);
        strings.render(&mut listing);
        assert_eq!(listing.lines(), ["string_0 db \"b\", 0", "string_1 db \"a\", 0"]);
    }

    #[test]
    fn test_imports_deduplicate_libraries_and_functions() {
        let mut imports = ImportTable::new();
        imports.add("puts", "MSVCRT.dll");
        imports.add("puts", "msvcrt.dll");
        imports.add("GetTickCount", "kernel32.dll");
        assert_eq!(
            imports.libraries().collect::<Vec<_>>(),
            ["kernel32.dll", "msvcrt.dll"]
        );
        assert!(imports.contains("puts"));
        assert!(!imports.contains("printf"));

        let mut listing = Listing::new(false);
        imports.render(&mut listing);
        let text = listing.finish();
        assert!(text.contains("library kernel32,'kernel32.dll',\\\n    msvcrt,'msvcrt.dll'\n"));
        assert!(text.contains(
            "import kernel32,\\\n    ExitProcess,'ExitProcess',\\\n    GetTickCount,'GetTickCount'\n"
        ));
        assert!(text.contains("import msvcrt,\\\n    __getmainargs,'__getmainargs',\\\n    puts,'puts'\n"));
    }

    #[test]
    fn test_library_symbol() {
        assert_eq!(library_symbol("msvcrt.dll"), "msvcrt");
        assert_eq!(
            library_symbol("api-ms-win-crt-stdio-l1-1-0.dll"),
            "api_ms_win_crt_stdio_l1_1_0"
        );
    }

    #[test]
    fn test_annotations_are_optional() {
        let mut plain = Listing::new(false);
        plain.annotated("ret", "done");
        plain.comment("ignored");
        assert_eq!(plain.lines(), ["    ret"]);

        let mut annotated = Listing::new(true);
        annotated.annotated("ret", "done");
        assert_eq!(annotated.lines(), ["    ret ; done"]);
    }
}
