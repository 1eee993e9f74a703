use std::{
    env,
    io::Write,
    path::PathBuf,
    process::{Command, Output, Stdio},
};

fn bin_path() -> String {
    if let Some(path) = option_env!("CARGO_BIN_EXE_sift") {
        return path.to_string();
    }
    let mut fallback =
        PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("manifest dir not set by cargo"));
    fallback.push("target");
    fallback.push("debug");
    fallback.push("sift");
    if cfg!(windows) {
        fallback.set_extension("exe");
    }
    fallback.to_string_lossy().into_owned()
}

fn sift(args: &[&str], stdin: &str) -> Output {
    let mut child = Command::new(bin_path())
        .args(args)
        .env_remove("SIFT_MAX_DEPTH")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn sift");
    if let Some(mut input) = child.stdin.take() {
        // The child may exit before reading, e.g. on a syntax error.
        let _ = input.write_all(stdin.as_bytes());
    }
    child.wait_with_output().expect("wait for sift")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn filters_each_input_value() {
    let output = sift(&["-c", ". * 2"], "1 2\n3");
    assert!(output.status.success(), "{output:?}");
    assert_eq!(stdout(&output), "2\n4\n6\n");
}

#[test]
fn user_functions_and_variables() {
    let output = sift(
        &[
            "-c",
            "--arg",
            "who",
            "world",
            "--argjson",
            "n",
            "3",
            "def greet(name): \"hello \" + name; greet($who), [range($n)]",
        ],
        "null",
    );
    assert!(output.status.success(), "{output:?}");
    assert_eq!(stdout(&output), "\"hello world\"\n[0,1,2]\n");
}

#[test]
fn raw_output_and_null_input() {
    let output = sift(&["-n", "-r", "\"plain\""], "");
    assert!(output.status.success(), "{output:?}");
    assert_eq!(stdout(&output), "plain\n");
}

#[test]
fn pretty_output_by_default() {
    let output = sift(&["."], r#"{"a":[1]}"#);
    assert!(output.status.success(), "{output:?}");
    assert_eq!(stdout(&output), "{\n  \"a\": [\n    1\n  ]\n}\n");
}

#[test]
fn reads_filter_and_inputs_from_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let filter = dir.path().join("double.sift");
    let input = dir.path().join("input.json");
    std::fs::write(&filter, "# doubles\ndef double: . * 2;\n.[] | double\n").expect("write filter");
    std::fs::write(&input, "[1, 2]").expect("write input");

    let output = sift(
        &[
            "-c",
            "-f",
            filter.to_str().expect("utf8 path"),
            input.to_str().expect("utf8 path"),
        ],
        "",
    );
    assert!(output.status.success(), "{output:?}");
    assert_eq!(stdout(&output), "2\n4\n");
}

#[test]
fn syntax_errors_exit_with_three() {
    let output = sift(&["def f 1; f"], "null");
    assert_eq!(output.status.code(), Some(3));
    assert!(stdout(&output).is_empty());
}

#[test]
fn runtime_errors_exit_with_five_after_earlier_outputs() {
    let output = sift(&["-c", "1, missing(2), 3"], "null");
    assert_eq!(output.status.code(), Some(5));
    assert_eq!(stdout(&output), "1\n");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("missing/1 is not defined"), "{stderr}");
}

#[test]
fn depth_limit_is_configurable() {
    let program = "def depth: if . == 0 then 0 else (. - 1 | depth) + 1 end; depth";
    let output = sift(&["--max-depth", "10", program], "100");
    assert_eq!(output.status.code(), Some(5));

    let output = sift(&["--max-depth", "10", program], "5");
    assert!(output.status.success(), "{output:?}");
    assert_eq!(stdout(&output), "5\n");
}

#[test]
fn invalid_json_input_is_a_usage_error() {
    let output = sift(&["."], "{not json");
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn inputs_are_evaluated_as_they_are_decoded() {
    let output = sift(&["-c", ". + 1"], "1 2 {not json");
    assert_eq!(output.status.code(), Some(2));
    assert_eq!(stdout(&output), "2\n3\n");
}

#[test]
fn missing_input_file_is_a_usage_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let missing = dir.path().join("absent.json");
    let output = sift(&[".", missing.to_str().expect("utf-8 path")], "");
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to read"), "{stderr}");
}

#[test]
fn lint_reports_shadowing_parameters() {
    let output = sift(
        &["--lint", "def code: 1; def equals($code): code == $code; equals(1)"],
        "",
    );
    assert!(output.status.success(), "{output:?}");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("hides `code/0`"), "{stderr}");
}
