mod common;

use bad_lang::{
    ast::{ArithOp, Ast, NodeKind},
    build,
    codegen::{self, CompilerOptions},
    source_location::Position,
    types::checker::check_program,
    ErrorKind, Type,
};
use common::{compile, compile_unfolded, contains_run, function_body};

const ADD: &str = "(func add ((int a) (int b)) int (return (+ a b)))";

#[test]
fn test_assign_with_literal_lowers_to_load_add_store() {
    let listing = compile(
        "(func main () int
           (vardec int x)
           (assign x (+ x 1))
           (return x))",
    );
    let body = function_body(&listing, "main");
    assert!(contains_run(
        &body,
        &[
            "mov r10, [rsp+32]",
            "mov rax, 1",
            "add r10, rax",
            "mov rax, r10",
            "mov [rsp+32], rax",
        ]
    ));
}

#[test]
fn test_direct_call_loads_arguments_in_place() {
    let listing = compile(&format!(
        "{} (func main () int (return (call add 1 2)))",
        ADD
    ));
    let body = function_body(&listing, "main");
    assert!(contains_run(&body, &["mov rcx, 1", "mov rdx, 2", "call add"]));
    assert!(!body.iter().any(|line| line.starts_with("mov [rsp+")));
}

#[test]
fn test_nested_call_spills_arguments_through_temporaries() {
    let listing = compile(&format!(
        "{} (func main () int (return (call add (call add 1 2) 3)))",
        ADD
    ));
    let body = function_body(&listing, "main");
    // 4 argument words + 2 temporaries, padded to 7
    assert_eq!(body[0], "sub rsp, 56");
    assert!(contains_run(
        &body,
        &[
            "mov rax, 3",
            "mov [rsp+48], rax",
            "mov rcx, 1",
            "mov rdx, 2",
            "call add",
            "mov [rsp+40], rax",
            "mov rcx, [rsp+40]",
            "mov rdx, [rsp+48]",
            "call add",
        ]
    ));
}

#[test]
fn test_stack_arguments_beyond_the_fourth() {
    let six = "(func six ((int a) (int b) (int c) (int d) (int e) (int f)) int (return f))";
    let listing = compile(&format!(
        "{} (func main () int (return (call six 1 2 3 4 5 6)))",
        six
    ));

    let callee = function_body(&listing, "six");
    assert_eq!(callee[0], "sub rsp, 40");
    assert_eq!(
        callee[1..5],
        [
            "mov [rsp+48], rcx",
            "mov [rsp+56], rdx",
            "mov [rsp+64], r8",
            "mov [rsp+72], r9",
        ]
    );
    assert_eq!(callee[5], "mov rax, [rsp+88]");

    let caller = function_body(&listing, "main");
    assert_eq!(caller[0], "sub rsp, 56");
    assert!(contains_run(
        &caller,
        &[
            "mov r9, 4",
            "mov rax, 5",
            "mov [rsp+32], rax",
            "mov rax, 6",
            "mov [rsp+40], rax",
            "call six",
        ]
    ));
}

#[test]
fn test_spilled_stack_arguments_match_direct_ones() {
    let six = "(func six ((int a) (int b) (int c) (int d) (int e) (int f)) int (return f))";
    let listing = compile(&format!(
        "{} {} (func main () int (return (call six (call add 1 2) 2 3 4 5 6)))",
        ADD, six
    ));
    let caller = function_body(&listing, "main");
    // 6 argument words + 6 spilled arguments, padded to 13
    assert_eq!(caller[0], "sub rsp, 104");
    assert!(contains_run(
        &caller,
        &[
            "mov rcx, [rsp+56]",
            "mov rdx, [rsp+64]",
            "mov r8, [rsp+72]",
            "mov r9, [rsp+80]",
            "mov rax, [rsp+88]",
            "mov [rsp+32], rax",
            "mov rax, [rsp+96]",
            "mov [rsp+40], rax",
            "call six",
        ]
    ));
}

#[test]
fn test_computed_callee_is_called_through_scratch_register() {
    let listing = compile(
        "(func twice ((int x)) int (return (* x 2)))
         (func pick () (func (int) int) (return (& twice)))
         (func main () int (return (call (call pick) 21)))",
    );
    let pick = function_body(&listing, "pick");
    assert!(pick.contains(&"lea rax, [twice]".to_string()));

    let main = function_body(&listing, "main");
    assert!(contains_run(
        &main,
        &[
            "call pick",
            "mov [rsp+48], rax",
            "mov rax, 21",
            "mov [rsp+40], rax",
            "mov rcx, [rsp+40]",
            "mov r11, [rsp+48]",
            "call r11",
        ]
    ));
}

#[test]
fn test_every_frame_keeps_the_stack_aligned() {
    let listing = compile(&format!(
        "{} (func main () int
               (vardec int a)
               (vardec int b)
               (vardec char c)
               (while (< a 10)
                 (block
                   (vardec int d)
                   (assign a (+ a (call add b (call add a 1))))))
               (return a))",
        ADD
    ));
    let mut reservations = 0;
    for line in listing.lines().map(str::trim) {
        if let Some(bytes) = line.strip_prefix("sub rsp, ") {
            let bytes: usize = bytes.parse().unwrap();
            // with the return address or block pad word the total is a
            // multiple of 16
            assert!(bytes % 16 == 8 || bytes % 16 == 0, "{}", line);
            reservations += 1;
        }
    }
    // add, main, the loop body block and the entry stub
    assert_eq!(reservations, 4);
    let main = function_body(&listing, "main");
    // 4 argument words + 3 locals + 1 temporary, padded to 9
    assert_eq!(main[0], "sub rsp, 72");
}

#[test]
fn test_nested_blocks_resolve_outer_variables() {
    let listing = compile(
        "(func main () int
           (vardec int x)
           (block
             (vardec int y)
             (block
               (vardec int z)
               (assign z (+ x y))))
           (return 0))",
    );
    let body = function_body(&listing, "main");
    assert!(contains_run(
        &body,
        &[
            "sub rsp, 40",
            "sub rsp, 48",
            "sub rsp, 64",
            "mov rax, [rsp+144]",
            "mov [rsp+40], rax",
            "mov r10, [rsp+96]",
            "mov rax, [rsp+40]",
            "add rax, r10",
            "mov [rsp+48], rax",
            "add rsp, 64",
            "add rsp, 48",
        ]
    ));
}

#[test]
fn test_return_inside_block_releases_only_the_block() {
    let listing = compile(
        "(func main () int
           (block (return 1))
           (return 0))",
    );
    let body = function_body(&listing, "main");
    assert_eq!(
        body,
        [
            "sub rsp, 40",
            "sub rsp, 48",
            "mov rax, 1",
            "add rsp, 48",
            "ret",
            "add rsp, 48",
            "mov rax, 0",
            "add rsp, 40",
            "ret",
            "add rsp, 40",
            "ret",
        ]
    );
}

#[test]
fn test_array_literal_elements_use_their_own_size() {
    let listing = compile(
        "(func main () int
           (vardec (* char) p)
           (assign p (array 'h' 'i'))
           (return (cast int (@ (index p 1)))))",
    );
    let body = function_body(&listing, "main");
    assert!(contains_run(
        &body,
        &[
            "mov rax, 104",
            "mov [rsp+40], al",
            "mov rax, 105",
            "mov [rsp+41], al",
            "lea rax, [rsp+40]",
            "mov [rsp+48], rax",
        ]
    ));
    assert!(contains_run(
        &body,
        &[
            "mov r10, [rsp+32]",
            "add rax, r10",
            "movsx rax, byte [rax]",
            "movsx rax, al",
        ]
    ));
}

#[test]
fn test_index_scales_by_element_size() {
    let listing = compile(
        "(func main () int
           (vardec (array int 4) values)
           (assignptr (index values 2) (cast int 7))
           (return (@ (index values 2))))",
    );
    let body = function_body(&listing, "main");
    assert_eq!(body[0], "sub rsp, 88");
    assert!(contains_run(
        &body,
        &[
            "mov rax, 7",
            "mov [rsp+48], rax",
            "lea rax, [rsp+56]",
            "mov [rsp+40], rax",
            "mov rax, 2",
            "imul rax, rax, 8",
            "mov r10, [rsp+40]",
            "add rax, r10",
            "mov r10, [rsp+48]",
            "mov [rax], r10",
        ]
    ));
}

#[test]
fn test_strings_are_interned_with_numeric_line_breaks() {
    let listing = compile(
        r#"(extern puts ((* char)) int "MSVCRT.DLL")
           (func main () int
             (call puts "one\n")
             (call puts "two")
             (call puts "one\n")
             (return 0))"#,
    );
    assert!(listing.contains("string_0 db \"one\", 10, 0\n"));
    assert!(listing.contains("string_1 db \"two\", 0\n"));
    assert!(!listing.contains("string_2"));
    assert!(listing.contains("    call [puts]\n"));
    assert!(listing.contains(
        "import msvcrt,\\\n    __getmainargs,'__getmainargs',\\\n    puts,'puts'\n"
    ));
}

#[test]
fn test_listing_sections_and_entry_stub() {
    let listing = compile("(func main ((int argc) ((* (* char)) argv)) int (return argc))");
    let data = listing.find("section '.data'").unwrap();
    let text = listing.find("section '.text'").unwrap();
    let idata = listing.find("section '.idata'").unwrap();
    assert!(data < text && text < idata);

    let stub = function_body(&listing, "_start");
    assert!(contains_run(
        &stub,
        &[
            "call [__getmainargs]",
            "mov rcx, [argc]",
            "mov rdx, [argv]",
            "call main",
            "mov rcx, rax",
            "call [ExitProcess]",
        ]
    ));
    assert!(listing.contains(
        "library kernel32,'kernel32.dll',\\\n    msvcrt,'msvcrt.dll'\n"
    ));
}

#[test]
fn test_folding_can_be_disabled() {
    let source = "(func main () int (return (+ (* 2 3) 1)))";
    let folded = function_body(&compile(source), "main");
    assert_eq!(folded[1], "mov rax, 7");

    let unfolded = function_body(&compile_unfolded(source), "main");
    assert!(contains_run(
        &unfolded,
        &[
            "mov r10, 3",
            "mov rax, 2",
            "imul rax, r10",
            "mov r10, rax",
            "mov rax, 1",
            "add r10, rax",
        ]
    ));
    assert!(!unfolded.contains(&"mov rax, 6".to_string()));
}

#[test]
fn test_literal_dividend_takes_unsigned_divisor() {
    let listing = compile(
        "(func main () int
           (vardec uint u)
           (vardec uint r)
           (assign r (/ 10 u))
           (return 0))",
    );
    let body = function_body(&listing, "main");
    assert!(body.contains(&"div r11".to_string()));
    assert!(!body.contains(&"idiv r11".to_string()));
}

#[test]
fn test_whole_array_assignment_is_rejected() {
    let err = build::compile(
        "(func main () int
           (vardec (array char 4) a)
           (assign a (array 'a' 'b' 'c' 'd'))
           (return 0))",
        &CompilerOptions::default(),
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CodegenError);
    assert!(err.message().contains("cannot store"), "{}", err);
}

#[test]
fn test_division_keeps_the_second_argument_register() {
    let listing = compile(&format!(
        "{} (func main () int (vardec int x) (return (call add 1 (/ x 3))))",
        ADD
    ));
    let body = function_body(&listing, "main");
    assert!(contains_run(
        &body,
        &[
            "mov rcx, 1",
            "mov r10, [rsp+32]",
            "mov rax, 3",
            "mov r11, rax",
            "mov rax, r10",
            "mov r10, rdx",
            "cqo",
            "idiv r11",
            "mov rdx, r10",
            "mov r10, rax",
            "mov rax, r10",
            "mov rdx, rax",
            "call add",
        ]
    ));
}

#[test]
fn test_deep_expression_does_not_exhaust_the_stack() {
    const DEPTH: usize = 50_000;
    let p = Position::default();
    let mut ast = Ast::new();
    let decl = ast.add(
        NodeKind::VarDecl {
            name: "x".to_string(),
            ty: Type::int(),
        },
        p,
    );
    let mut expr = ast.add(NodeKind::Identifier("x".to_string()), p);
    for _ in 0..DEPTH {
        let one = ast.add(NodeKind::IntLiteral(1), p);
        expr = ast.add(
            NodeKind::Arithmetic {
                op: ArithOp::Add,
                left: expr,
                right: one,
            },
            p,
        );
    }
    let assign = ast.add(
        NodeKind::Assign {
            name: "x".to_string(),
            value: expr,
        },
        p,
    );
    let result = ast.add(NodeKind::Identifier("x".to_string()), p);
    let ret = ast.add(NodeKind::Return(Some(result)), p);
    let main = ast.add(
        NodeKind::FunctionDecl {
            name: "main".to_string(),
            params: Vec::new(),
            return_type: Type::int(),
            body: vec![decl, assign, ret],
        },
        p,
    );
    ast.push_item(main);

    let types = check_program(&ast, "main").unwrap();
    let listing = codegen::generate(&ast, &types, &CompilerOptions::default()).unwrap();
    assert_eq!(listing.matches("add r10, rax").count(), DEPTH);
}
