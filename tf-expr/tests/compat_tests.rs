/// Binary tests: pipe lines through `tfexpr` and compare what it prints.
///
/// Each case is a `(&str script, &[&str] expected_lines)` pair.  The script
/// goes to the binary's stdin with `-f` (no rc file); stdout and stderr are
/// collected and normalised before comparison (see `normalise_output`).

use std::io::Write;
use std::process::{Command, Stdio};

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Path to the `tfexpr` binary built by this Cargo workspace.
fn binary() -> std::path::PathBuf {
    std::path::PathBuf::from(env!("CARGO_BIN_EXE_tfexpr"))
}

/// Run `args` with `script` on stdin; returns stdout, stderr and success.
fn run(args: &[&str], script: &str) -> (String, String, bool) {
    let mut child = Command::new(binary())
        .args(args)
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn tfexpr");
    {
        let stdin = child.stdin.as_mut().expect("stdin not open");
        stdin.write_all(script.as_bytes()).expect("write to stdin");
    }
    let out = child.wait_with_output().expect("wait failed");
    (
        String::from_utf8_lossy(&out.stdout).into_owned(),
        String::from_utf8_lossy(&out.stderr).into_owned(),
        out.status.success(),
    )
}

/// Trim each line and drop empty ones.
fn normalise_output(raw: &str) -> Vec<String> {
    raw.lines()
        .map(|l| l.trim().to_owned())
        .filter(|l| !l.is_empty())
        .collect()
}

/// Run a script and check stdout followed by stderr.
fn check(script: &str, expected: &[&str]) {
    let (stdout, stderr, _) = run(&["-f"], script);
    let got = normalise_output(&format!("{stdout}\n{stderr}"));
    let want: Vec<String> = expected.iter().map(|s| s.to_string()).collect();
    assert_eq!(
        got, want,
        "\n--- output mismatch ---\nScript:\n{script}\nGot:\n{got:#?}\nWant:\n{want:#?}"
    );
}

// ── Cases ─────────────────────────────────────────────────────────────────────

#[test]
fn arithmetic_expression() {
    check("1 + 2 * 3\n", &["7"]);
}

#[test]
fn string_functions() {
    check(
        "strlen(\"hello\")\ntoupper(\"abc\")\nsubstr(\"abcdef\", 2, 3)\n",
        &["5", "ABC", "cde"],
    );
}

#[test]
fn variables_persist_between_lines() {
    check("x := 6\nx * 7\n", &["6", "42"]);
}

#[test]
fn set_directive() {
    check("/set greeting=hi there\nstrcat(greeting, \"!\")\n", &["hi there!"]);
}

#[test]
fn macros_with_parameters() {
    check("/def add = {1} + {2}\nadd(40, 2)\n", &["42"]);
}

#[test]
fn ternary_operator() {
    check("1 ? \"yes\" : \"no\"\n", &["yes"]);
}

#[test]
fn comments_and_blank_lines_are_skipped() {
    check("; a comment\n\n3\n", &["3"]);
}

#[test]
fn errors_go_to_stderr() {
    let (stdout, stderr, ok) = run(&["-f"], "1 / 0\n2\n");
    assert_eq!(normalise_output(&stdout), ["2"]);
    assert_eq!(normalise_output(&stderr), ["% error: division by zero"]);
    assert!(ok);
}

#[test]
fn echo_output_precedes_result() {
    check("echo(\"hi\")\n", &["hi", "1"]);
}

#[test]
fn sigfigs_flag() {
    let (stdout, _, ok) = run(&["-f", "-s3"], "2.0 / 3\n");
    assert!(ok);
    assert_eq!(normalise_output(&stdout), ["0.667"]);
}

#[test]
fn one_shot_expressions() {
    let (stdout, _, ok) = run(&["-f", "-e", "2 + 2", "-e", "strrep(\"ab\", 2)"], "");
    assert!(ok);
    assert_eq!(normalise_output(&stdout), ["4", "abab"]);
}

#[test]
fn one_shot_failure_sets_exit_status() {
    let (_, stderr, ok) = run(&["-f", "-e", "1 +"], "");
    assert!(!ok);
    assert_eq!(
        normalise_output(&stderr),
        ["% error: expression syntax error: expected operand, found end of body."]
    );
}

#[test]
fn disassembly_with_debug_flag() {
    let (stdout, stderr, ok) = run(&["-f", "-O", "-d", "-e", "1 + x"], "");
    assert!(ok);
    assert_eq!(normalise_output(&stdout), ["1"]);
    assert!(stderr.contains("PUSH    id:x"), "{stderr}");
    assert!(stderr.contains("+       2"), "{stderr}");
}

#[test]
fn rc_file_is_loaded() {
    let mut rc = tempfile::NamedTempFile::new().unwrap();
    writeln!(rc, "/set base=100").unwrap();
    writeln!(rc, "/def bump = base + {{1}}").unwrap();
    let path = rc.path().to_str().unwrap().to_owned();
    let (stdout, stderr, ok) = run(&["-f", &path, "-e", "bump(5)"], "");
    assert!(ok, "{stderr}");
    assert_eq!(normalise_output(&stdout), ["105"]);
}

#[test]
fn bad_option_prints_usage() {
    let (_, stderr, ok) = run(&["-z"], "");
    assert!(!ok);
    assert!(stderr.contains("Usage: tfexpr"), "{stderr}");
}
