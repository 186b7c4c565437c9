use std::{
    io::Write,
    process::{Command, Output},
};
use tempfile::{Builder, NamedTempFile};

fn bin_path() -> &'static str {
    env!("CARGO_BIN_EXE_photon")
}

fn program(source: &str) -> NamedTempFile {
    let mut file = Builder::new().suffix(".ph").tempfile().expect("temp program");
    file.write_all(source.as_bytes()).expect("write program");
    file
}

fn photon(args: &[&str]) -> Output {
    Command::new(bin_path())
        .args(args)
        .env_remove("PHOTON_LOG")
        .env_remove("PHOTON_MAX_CALL_DEPTH")
        .env_remove("PHOTON_MAX_SPECIALIZATIONS")
        .output()
        .expect("failed to run photon")
}

#[test]
fn run_prints_the_program_result() {
    let file = program("val add = (a: Int, b: Int) a + b\nadd(40, 2)\n");
    let output = photon(&["run", file.path().to_str().expect("utf-8 path")]);

    assert!(
        output.status.success(),
        "photon run failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "42");
}

#[test]
fn check_reports_specializations() {
    let file = program("val id = (x) x\nid(1)\nid(\"a\")\n");
    let output = photon(&["check", file.path().to_str().expect("utf-8 path")]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("1 templates, 2 specializations"), "unexpected output:\n{stdout}");
}

#[test]
fn failing_programs_exit_with_an_error() {
    let file = program("10 / 0\n");
    let output = photon(&["run", file.path().to_str().expect("utf-8 path")]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Division by zero"), "missing diagnostic:\n{stderr}");
}

#[test]
fn parse_shows_macro_expansion() {
    let file = program("class Person { def age: Int }\nPerson\n");
    let output = photon(&["parse", file.path().to_str().expect("utf-8 path")]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("(recursive-let Person"), "unexpected output:\n{stdout}");
}

#[test]
fn deep_recursion_ends_in_the_call_depth_error() {
    let file = program(
        "interface Stepper {\n    def step(n: Int): Int\n}\nclass Counter {\n    def step(n: Int): Int Stepper.of(self).step(n + 1)\n}\nCounter.new().step(0)\n",
    );
    let output = photon(&["run", file.path().to_str().expect("utf-8 path")]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Maximum call depth of 128 exceeded"),
        "missing diagnostic:\n{stderr}"
    );
}
