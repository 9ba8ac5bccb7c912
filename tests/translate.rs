#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use sigilc::translate::assemble::Translation;
use sigilc::translate::error::DiagnosticKind;
use sigilc::translate::session::Feature;
use sigilc::{translate_source, translate_to_java, Options, TranslateError};

// ── Helpers ──────────────────────────────────────────────────────

fn translate(source: &str) -> Translation {
    translate_source(source, &Options::default()).unwrap()
}

fn kinds(t: &Translation) -> Vec<DiagnosticKind> {
    t.diagnostics.iter().map(|d| d.kind).collect()
}

// ── Scenarios ────────────────────────────────────────────────────

#[test]
fn integer_addition_declares_an_int() {
    let t = translate("my $x = 3 + 4;");
    assert_eq!(t.global_code, "int x = 3 + 4;\n");
    assert!(t.diagnostics.is_empty());
}

#[test]
fn list_literal_sets_the_list_feature() {
    let t = translate("my @a = (1, 2, 3);");
    assert!(t.global_code.contains("new PerlList<>(1, 2, 3)"), "{}", t.global_code);
    assert!(t.features.contains(&Feature::List));
}

#[test]
fn if_chain_keeps_arms_in_order() {
    let t = translate(
        "my $x = 1; my $y = 0;\nif ($x == 1) { $y = 2; } elsif ($x == 2) { $y = 3; } else { $y = 4; }",
    );
    assert!(t.global_code.contains(
        "if (x == 1) {\n    y = 2;\n} else if (x == 2) {\n    y = 3;\n} else {\n    y = 4;\n}\n"
    ));
}

#[test]
fn substitution_calls_the_regex_facility() {
    let t = translate("my $s = 'a foo';\n$s =~ s/foo/bar/;");
    assert!(t.global_code.contains("Regex.subst(s, \"foo\", \"bar\")"));
    assert!(t.features.contains(&Feature::Regex));
}

#[test]
fn loop_variable_is_scoped_to_the_loop() {
    let t = translate("for (my $i = 0; $i < 10; $i++) { print $i; }\nprint $i;");
    assert!(t.global_code.starts_with("for (int i = 0; i < 10; i++) {"));
    assert!(kinds(&t).contains(&DiagnosticKind::UndeclaredIdentifier));
}

#[test]
fn unmatched_brace_reports_once_and_continues() {
    let t = translate("my $x = 1;\n$x = 2; }\nmy $y = 3;");
    assert_eq!(t.diagnostics.len(), 1);
    assert!(matches!(t.diagnostics[0].kind, DiagnosticKind::SyntaxToken | DiagnosticKind::SyntaxEof));
    assert!(t.global_code.contains("int y = 3;"));
}

#[test]
fn shift_or_die_keeps_the_variable_in_scope() {
    let t = translate("my $v = shift or die \"usage\";\nprint $v;");
    assert!(t.global_code.starts_with("String v;\n"), "{}", t.global_code);
    assert!(t.global_code.contains("Pd.toBoolean((v = args[0]))"));
    assert!(!t.global_code.contains("String v ="));
    assert!(t.diagnostics.is_empty(), "{:?}", t.diagnostics);
}

#[test]
fn qualified_calls_keep_their_class() {
    let t = translate("my $r = Util::helper(1);");
    assert!(t.global_code.contains("Util.helper(1)"), "{}", t.global_code);
}

#[test]
fn printed_tests_read_like_perl_truth() {
    let t = translate("my %h = (x => 1);\nprint exists $h{x};");
    assert!(t.global_code.contains("System.out.print(Pd.toStr("), "{}", t.global_code);
}

// ── Properties ───────────────────────────────────────────────────

#[test]
fn block_declarations_are_invisible_outside() {
    let t = translate("{ my $inner = 1; }\nprint $inner;");
    assert!(kinds(&t).contains(&DiagnosticKind::UndeclaredIdentifier));
    let t = translate("my $outer = 0;\n{ my $inner = 1; $outer = $inner; }");
    assert!(t.diagnostics.is_empty());
}

#[test]
fn string_comparisons_test_the_documented_sign() {
    for (op, sign) in [("eq", "== 0"), ("ne", "!= 0"), ("lt", "< 0"), ("le", "<= 0"), ("gt", "> 0"), ("ge", ">= 0")] {
        let t = translate(&format!("my $p = 'a'; my $q = 'b'; my $r = $p {op} $q;"));
        assert!(t.global_code.contains(&format!("Pd.cmp(p, q) {sign}")), "{op}: {}", t.global_code);
    }
}

#[test]
fn features_stay_set_once_required() {
    let t = translate("my %h = (a => 1);\nmy $n = 1;\n$n = $n + 1;");
    assert!(t.features.contains(&Feature::Map));
}

#[test]
fn translation_is_deterministic() {
    let source = "my $x = 2; my $y = $x * 1.5; my $s = $x . 'px';";
    let first = translate(source);
    let second = translate(source);
    assert_eq!(first.global_code, second.global_code);
    assert_eq!(first.features, second.features);
}

#[test]
fn runs_do_not_share_state() {
    translate("our $total = 1;");
    let t = translate("my $total = 2;");
    assert_eq!(t.global_code, "int total = 2;\n");
    assert!(t.fields.is_empty());
}

// ── Whole files ──────────────────────────────────────────────────

#[test]
fn java_output_wraps_everything_in_one_class() {
    let source = "#<args><int><returns><int>\nsub twice { my $n = shift; return $n * 2; }\nprint twice(21), \"\\n\";";
    let output = translate_to_java(source, &Options::default()).unwrap();
    assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
    assert!(output.java.contains("public class Main {"));
    assert!(output.java.contains("    public static int twice(int arg0) {"));
    assert!(output.java.contains("    public static void main(String[] args) {"));
    assert!(output.java.ends_with("}\n"));
}

#[test]
fn subs_that_may_fall_through_end_with_a_default_return() {
    let source = "#<args><int><returns><int>\nsub f { my $n = shift; if ($n) { return 1; } else { $n = 2; } }\n\
                  #<args><int><returns><int>\nsub g { my $n = shift; if ($n) { return 1; } else { return 2; } }";
    let output = translate_to_java(source, &Options::default()).unwrap();
    let f = output.java.find("public static int f(").unwrap();
    let g = output.java.find("public static int g(").unwrap();
    assert_eq!(output.java[f..g].matches("return 0;").count(), 1, "{}", output.java);
    assert_eq!(output.java[g..].matches("return 0;").count(), 0, "{}", output.java);
}

#[test]
fn package_statement_picks_class_and_package() {
    let output = translate_to_java("package Acme::Report;\nmy $x = 1;", &Options::default()).unwrap();
    assert!(output.java.starts_with("package acme;\n\n"));
    assert!(output.java.contains("public class Report {"));

    let options = Options { emit_package: false, ..Options::default() };
    let output = translate_to_java("package Acme::Report;\nmy $x = 1;", &options).unwrap();
    assert!(output.java.starts_with("public class Report {"));
}

#[test]
fn misplaced_package_aborts() {
    let result = translate_source("my $x = 1;\npackage Late;", &Options::default());
    assert!(matches!(result, Err(TranslateError::MalformedPackage { .. })));
}

#[test]
fn passthrough_lines_reach_the_output() {
    let output = translate_to_java("#<import> java.util.Date\n#<java> Date now = new Date();\n", &Options::default())
        .unwrap();
    assert!(output.java.contains("import java.util.Date;"));
    assert!(output.java.contains("        Date now = new Date();\n"));
}

#[test]
fn reading_input_declares_the_reader() {
    let output = translate_to_java("while (my $line = <STDIN>) { print $line; }", &Options::default()).unwrap();
    assert!(output.java.contains("import java.io.*;"));
    assert!(output.java.contains("static BufferedReader STDIN"));
}

#[test]
fn lexical_errors_are_collected() {
    let t = translate("my $s = \"unterminated;\n");
    assert!(kinds(&t).contains(&DiagnosticKind::Lexical));
}
