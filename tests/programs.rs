use std::io::Write;

use pretty_assertions::assert_eq;
use scry::{Error, read_source, run};

fn run_ok(src: &str) -> String {
    let mut out = Vec::new();
    if let Err(e) = run(src, &mut out) {
        panic!("Script failed: {e}\n{src}");
    }
    String::from_utf8(out).unwrap()
}

/// Runs a program expected to fail, returning the error and whatever it printed first.
fn run_err(src: &str) -> (Error, String) {
    let mut out = Vec::new();
    match run(src, &mut out) {
        Ok(()) => panic!("Script succeeded but was expected to fail:\n{src}"),
        Err(e) => (e, String::from_utf8(out).unwrap()),
    }
}

#[test]
fn add_and_print() {
    assert_eq!(run_ok("push int 3\npush int 4\nadd\nprint\n"), "7\n");
}

#[test]
fn operands_come_off_the_stack_top_first() {
    assert_eq!(run_ok("push int 10\npush int 3\nsub\nprint"), "-7\n");
    assert_eq!(run_ok("push int 2\npush int 8\ndiv\nprint"), "4.0\n");
    assert_eq!(run_ok("push int 3\npush int 2\npow\nprint"), "8\n");
    assert_eq!(run_ok("push int 2\npush int 7\nfdiv\nprint"), "3\n");
}

#[test]
fn mixed_types_fall_back_to_concatenation() {
    assert_eq!(run_ok("push string \"foo\"\npush int 3\nadd\nprint"), "3foo\n");
    assert_eq!(run_ok("push string \"foo\"\npush int 3\nmul\nprint"), "3foo\n");
    assert_eq!(
        run_ok("push string \"world\"\npush string \"hello \"\nadd\nprint"),
        "hello world\n"
    );
}

#[test]
fn undropped_variable_fails() {
    let (err, _) = run_err("var int x");
    let message = err.to_string();
    assert!(message.contains("variables not dropped"), "{message}");
    assert!(message.contains("line 1 -> \"x\""), "{message}");
}

#[test]
fn unknown_variable_fails() {
    let (err, _) = run_err("push y");
    assert!(matches!(err, Error::UnknownVariable { ref name, line: 1, .. } if name == "y"));
}

#[test]
fn full_variable_lifecycle_is_silent() {
    assert_eq!(
        run_ok("var int x\nmove x 5\npush x\npop drop\ndrop x"),
        ""
    );
}

#[test]
fn value_survives_a_round_trip_through_the_stack() {
    let src = r#"
        var float source
        move source -12.75
        var float target
        push source
        pop target
        print target
        drop source
        drop target
    "#;
    assert_eq!(run_ok(src), "-12.75\n");
}

#[test]
fn pushd_hands_the_value_to_the_stack() {
    let src = "var string s\nmove s \"owned\"\npushd s\nprint";
    assert_eq!(run_ok(src), "owned\n");

    let (err, out) = run_err("var string s\nmove s \"gone\"\npushd s\nprint\nprint s");
    assert_eq!(out, "gone\n");
    assert!(matches!(err, Error::UnknownVariable { line: 5, .. }));
}

#[test]
fn interpolation_uses_current_values() {
    let src = r#"
        var string name
        move name "scry"
        var int version
        move version 2
        push string "${name} v${version}"
        print
        move version 3
        push string "${name} v${version}"
        print
        drop name
        drop version
    "#;
    assert_eq!(run_ok(src), "scry v2\nscry v3\n");
}

#[test]
fn output_before_a_failure_is_kept() {
    let (err, out) = run_err("push int 1\nprint\npush bool true\npush int 1\nadd");
    assert_eq!(out, "1\n");
    assert!(matches!(err, Error::TypeMismatch { line: 5, .. }));
}

#[test]
fn leftover_stack_fails_at_eof() {
    let (err, out) = run_err("push int 1\npush int 2\nadd\n\n");
    assert_eq!(out, "");
    assert_eq!(err.line(), Some(4));
    assert!(err.to_string().contains("1 items"));
}

#[test]
fn syntax_errors_stop_before_anything_runs() {
    let (err, out) = run_err("push int 1\nprint\nshout");
    assert_eq!(out, "");
    assert!(matches!(err, Error::Syntax { line: 3, .. }));
    assert_eq!(err.exit_code(), 65);
}

#[test]
fn negative_unsigned_literals_are_rejected() {
    let (err, _) = run_err("push uint -1\npop drop");
    assert!(matches!(err, Error::TypeMismatch { line: 1, .. }));

    let (err, _) = run_err("push ufloat -0.1\npop drop");
    assert!(matches!(err, Error::TypeMismatch { line: 1, .. }));
    assert_eq!(err.exit_code(), 70);
}

#[test]
fn booleans_print_and_drop() {
    assert_eq!(run_ok("push bool TRUE\nprint\npush bool false\nprint"), "True\nFalse\n");
}

#[test]
fn booleans_interpolate_capitalized() {
    let src = "var bool b\nmove b TRUE\npush string \"${b}\"\nprint\ndrop b";
    assert_eq!(run_ok(src), "True\n");
}

#[test]
fn large_floats_print_in_exponent_form() {
    assert_eq!(run_ok("push float 1e20\nprint"), "1e+20\n");
}

#[test]
fn pow_with_unit_base_ignores_exponent_size() {
    assert_eq!(run_ok("push int 5000000000\npush int 1\npow\nprint"), "1\n");
}

#[test]
fn uppercase_pop_drop_is_a_lookup() {
    let (err, _) = run_err("push int 1\npop DROP");
    assert!(matches!(err, Error::UnknownVariable { ref name, line: 2, .. } if name == "DROP"));
}

#[test]
fn dropping_an_unknown_variable_fails() {
    let (err, _) = run_err("var int x\ndrop ghost");
    assert!(matches!(err, Error::UnknownVariable { ref name, line: 2, .. } if name == "ghost"));

    let (err, _) = run_err("pushd ghost");
    assert!(matches!(err, Error::UnknownVariable { ref name, line: 1, .. } if name == "ghost"));
}

#[test]
fn reads_programs_from_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "push int 6").unwrap();
    writeln!(file, "push int 7").unwrap();
    writeln!(file, "mul").unwrap();
    writeln!(file, "print").unwrap();

    let source = read_source(file.path()).unwrap();
    assert_eq!(run_ok(&source), "42\n");
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = read_source(&dir.path().join("missing.scry")).unwrap_err();
    assert!(matches!(err, Error::Io { .. }));
    assert_eq!(err.exit_code(), 66);
}
