//! CLI-level acceptance tests (§6), grounded on the teacher's
//! `tests/integration/cli.rs` pattern: drive the built binary with
//! `assert_cmd` and assert on its observable stdout/exit-code behavior
//! rather than reaching into internals.

use std::path::PathBuf;

use assert_cmd::Command;

fn wf_analyzer() -> Command {
    Command::cargo_bin("wf-analyzer").expect("binary should build")
}

fn fixture(name: &str) -> String {
    format!("{}/tests/fixtures/{name}", env!("CARGO_MANIFEST_DIR"))
}

fn stdout_of(mut cmd: Command) -> (bool, String) {
    let output = cmd.output().expect("process should run");
    (output.status.success(), String::from_utf8(output.stdout).unwrap())
}

#[test]
fn renders_mermaid_by_default() {
    let (ok, stdout) = stdout_of({
        let mut c = wf_analyzer();
        c.arg(fixture("checkout.ts"));
        c
    });

    assert!(ok);
    assert!(stdout.contains("flowchart TB"));
    assert!(stdout.contains("reserve-inventory"));
}

#[test]
fn json_format_wraps_file_and_diagnostics() {
    let (ok, stdout) = stdout_of({
        let mut c = wf_analyzer();
        c.args(["--format=json"]).arg(fixture("checkout.ts"));
        c
    });

    assert!(ok);
    assert!(stdout.contains("\"file\""));
    assert!(stdout.contains("\"diagnostics\""));
    assert!(stdout.contains("checkout"));
}

#[test]
fn no_workflows_found_exits_with_failure() {
    let dir = scratch_dir("empty");
    std::fs::write(dir.join("empty.ts"), "export const x = 1;\n").unwrap();

    let status = wf_analyzer().arg(&dir).status().expect("process should run");
    assert_eq!(status.code(), Some(1));
}

#[test]
fn warnings_as_errors_turns_missing_errors_warning_into_failure() {
    let status = wf_analyzer()
        .arg("--warnings-as-errors")
        .arg(fixture("checkout.ts"))
        .status()
        .expect("process should run");

    assert_eq!(status.code(), Some(1));
}

#[test]
fn direction_flag_changes_flowchart_header() {
    let (ok, stdout) = stdout_of({
        let mut c = wf_analyzer();
        c.args(["--direction=LR"]).arg(fixture("checkout.ts"));
        c
    });

    assert!(ok);
    assert!(stdout.contains("flowchart LR"));
}

fn scratch_dir(label: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("wf-analyzer-cli-test-{label}-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
