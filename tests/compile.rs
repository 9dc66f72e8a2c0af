//! End-to-end pipeline tests: write a small Cobold program to a temp file,
//! compile it, and check the resulting LLIR module's shape (§8's testable
//! properties, exercised through the public `compiler` entry point rather
//! than by poking at `lower` internals directly).

use std::io::Write;

use cobold::{compile_file, compile_source, Interner};

fn write_temp(contents: &str) -> tempfile::NamedTempFile {
  let mut f = tempfile::Builder::new().suffix(".cb").tempfile().expect("create temp file");
  f.write_all(contents.as_bytes()).expect("write temp file");
  f
}

#[test]
fn main_returning_a_literal_compiles_and_synthesizes_an_entrypoint() {
  let interner = Interner::new();
  let file = write_temp("fn Main() -> i32 { return 17; }");
  let module = compile_file(&interner, file.path()).expect("compiles cleanly");
  assert!(module.find_function("Main").is_some());
  assert!(module.find_function("main").is_some());
}

#[test]
fn add_function_called_from_main_compiles() {
  let interner = Interner::new();
  let source = r"
    fn Add(a: i32, b: i32) -> i32 { return a + b; }
    fn Main() -> i32 { return Add(2, 3); }
  ";
  let module = compile_source(&interner, "add.cb", source).expect("compiles cleanly");
  assert!(module.find_function("Add").is_some());
}

#[test]
fn for_loop_summing_a_range_compiles() {
  let interner = Interner::new();
  let source = r"
    fn Main() -> i32 {
      var total: i32 = 0;
      for i in [1..10] {
        total += i;
      }
      return total;
    }
  ";
  let module = compile_source(&interner, "sum.cb", source).expect("compiles cleanly");
  let main_fn = module.find_function("Main").unwrap();
  assert!(main_fn.body.is_some());
}

#[test]
fn while_loop_counting_to_ten_compiles() {
  let interner = Interner::new();
  let source = r"
    fn Main() -> i32 {
      var i: i32 = 0;
      while (i < 10) {
        i += 1;
      }
      return i;
    }
  ";
  compile_source(&interner, "while.cb", source).expect("compiles cleanly");
}

#[test]
fn widening_and_narrowing_casts_compile() {
  let interner = Interner::new();
  let source = r"
    fn Main() -> i32 {
      let big: i64 = (i64) 5;
      let small: i8 = (i8) big;
      return (i32) small;
    }
  ";
  compile_source(&interner, "casts.cb", source).expect("compiles cleanly");
}

#[test]
fn dash_defaulted_pointer_declaration_compiles() {
  let interner = Interner::new();
  let source = r"
    fn Main() -> i32 {
      let p: i32* = --;
      return 0;
    }
  ";
  compile_source(&interner, "dash_ptr.cb", source).expect("compiles cleanly");
}

#[test]
fn returning_a_string_where_an_int_is_expected_is_a_type_error() {
  let interner = Interner::new();
  let err = compile_source(&interner, "bad_return.cb", "fn Main() -> i32 { return \"s\"; }")
    .expect_err("mismatched return type should fail");
  assert!(matches!(err, cobold::CompileError::Diagnostics(_)));
}

#[test]
fn duplicate_declaration_in_the_same_scope_is_a_type_error() {
  let interner = Interner::new();
  let source = r"
    fn Main() -> i32 {
      let x: i32 = 1;
      let x: i32 = 2;
      return x;
    }
  ";
  let err = compile_source(&interner, "dup.cb", source).expect_err("duplicate declaration should fail");
  let cobold::CompileError::Diagnostics(d) = err else { panic!("expected a diagnostics error") };
  assert!(!d.ok());
}

#[test]
fn a_program_with_no_main_function_reports_an_internal_error() {
  let interner = Interner::new();
  let source = "fn Helper() -> i32 { return 1; }";
  let err = compile_source(&interner, "no_main.cb", source).expect_err("missing Main should fail");
  let cobold::CompileError::Diagnostics(d) = err else { panic!("expected a diagnostics error") };
  assert!(!d.ok());
}

#[test]
fn an_empty_import_path_is_rejected() {
  let interner = Interner::new();
  let source = r#"
    import "";
    fn Main() -> i32 { return 0; }
  "#;
  let err = compile_source(&interner, "empty_import.cb", source).expect_err("empty import path should fail");
  let cobold::CompileError::Diagnostics(d) = err else { panic!("expected a diagnostics error") };
  assert!(!d.ok());
}

#[test]
fn an_empty_extern_symbol_is_rejected() {
  let interner = Interner::new();
  let source = r#"
    fn Helper() #extern("");
    fn Main() -> i32 { return 0; }
  "#;
  let err = compile_source(&interner, "empty_extern.cb", source).expect_err("empty extern symbol should fail");
  let cobold::CompileError::Diagnostics(d) = err else { panic!("expected a diagnostics error") };
  assert!(!d.ok());
}
