use std::{
    io::Write,
    path::Path,
    process::{Command, Output, Stdio},
};
use tempfile::NamedTempFile;

const BIN: &str = env!("CARGO_BIN_EXE_trisum");

fn input_file(contents: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents).unwrap();
    file.flush().unwrap();
    file
}

fn trisum() -> Command {
    let mut cmd = Command::new(BIN);
    for var in [
        "TRISUM_INPUT",
        "TRISUM_OUTPUT",
        "TRISUM_CHILD_COUNT",
        "TRISUM_BLOCK_SIZE",
        "TRISUM_BACKEND",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

fn run_file(path: &Path, args: &[&str]) -> Output {
    trisum()
        .arg("--input")
        .arg(path)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .unwrap()
}

fn run_stdin(input: &[u8], args: &[&str]) -> Output {
    let mut child = trisum()
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child.stdin.take().unwrap().write_all(input).unwrap();
    child.wait_with_output().unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8(output.stdout.clone()).unwrap()
}

fn stderr(output: &Output) -> String {
    String::from_utf8(output.stderr.clone()).unwrap()
}

/// Report lines with the per-worker lines sorted, since they arrive in any
/// order.
fn normalized(report: &str) -> Vec<String> {
    let mut lines: Vec<String> = report.lines().map(str::to_string).collect();
    let children = lines
        .iter()
        .position(|line| line.starts_with("Child "))
        .unwrap_or(lines.len());
    let finals = lines
        .iter()
        .position(|line| line.starts_with("Final Sum:"))
        .unwrap_or(lines.len());
    lines[children..finals].sort();
    lines
}

#[test]
fn single_worker_over_nine_digits() {
    let file = input_file(b"123456789");
    let output = run_file(file.path(), &[]);

    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(
        stdout(&output),
        "File size: 9\nChild 0 Sum: 1368\nFinal Sum: 1368\n"
    );
}

#[test]
fn three_process_workers() {
    let file = input_file(b"123456789");
    let output = run_file(file.path(), &["--child-count", "3"]);

    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(
        normalized(&stdout(&output)),
        [
            "File size: 9",
            "Child 0 Sum: 123",
            "Child 1 Sum: 456",
            "Child 2 Sum: 789",
            "Final Sum: 1368",
        ]
    );
}

#[test]
fn three_thread_workers_by_block_size() {
    let file = input_file(b"123456789");
    let output = run_file(file.path(), &["--block-size", "3", "--backend", "thread"]);

    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(
        normalized(&stdout(&output)),
        [
            "File size: 9",
            "Child 0 Sum: 123",
            "Child 1 Sum: 456",
            "Child 2 Sum: 789",
            "Final Sum: 1368",
        ]
    );
}

#[test]
fn backends_agree_on_messy_input() {
    let contents = b"12a345\n12345\n  999,001;78\n9x100200300\n".repeat(50);
    let file = input_file(&contents);

    let totals: Vec<String> = [("process", "7"), ("thread", "7"), ("thread", "1")]
        .into_iter()
        .map(|(backend, count)| {
            let output = run_file(file.path(), &["-c", count, "--backend", backend]);
            assert!(output.status.success(), "{}", stderr(&output));
            stdout(&output).lines().last().unwrap().to_string()
        })
        .collect();

    assert!(totals.iter().all(|total| total == &totals[0]), "{totals:?}");
}

#[test]
fn zero_children_is_rejected_without_output() {
    let file = input_file(b"123456789");
    let output = run_file(file.path(), &["-c", "0"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    assert!(stderr(&output).contains("greater than 0"));
}

#[test]
fn child_count_conflicts_with_block_size() {
    let file = input_file(b"123456789");
    let output = run_file(file.path(), &["-c", "2", "--block-size", "3"]);

    assert_eq!(output.status.code(), Some(2));
    assert!(output.stdout.is_empty());
}

#[test]
fn missing_input_fails_before_output() {
    let output = run_file(Path::new("/no/such/trisum-input.dat"), &["-c", "2"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    assert!(stderr(&output).contains("Error checking input file"));
}

#[test]
fn stdin_ignores_child_count() {
    let output = run_stdin(b"123456789", &["-c", "4"]);

    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(stdout(&output), "Child 0 Sum: 1368\nFinal Sum: 1368\n");
    assert!(stderr(&output).contains("Warn: using stdin... ignoring child count 4."));
}

#[test]
fn stdin_ignores_block_size_with_thread_backend() {
    let output = run_stdin(b"100 200", &["--block-size", "2", "--backend", "thread"]);

    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(stdout(&output), "Child 0 Sum: 300\nFinal Sum: 300\n");
    assert!(stderr(&output).contains("Warn: using stdin... ignoring block size 2."));
}

#[test]
fn report_goes_to_output_file() {
    let file = input_file(b"123456789");
    let out = NamedTempFile::new().unwrap();
    let output = run_file(
        file.path(),
        &["-c", "3", "-o", out.path().to_str().unwrap()],
    );

    assert!(output.status.success(), "{}", stderr(&output));
    assert!(output.stdout.is_empty());
    let report = std::fs::read_to_string(out.path()).unwrap();
    assert_eq!(normalized(&report).last().unwrap(), "Final Sum: 1368");
}

#[test]
fn empty_file_sums_to_zero() {
    let file = input_file(b"");
    let output = run_file(file.path(), &["-c", "5"]);

    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(
        stdout(&output),
        "File size: 0\nChild 0 Sum: 0\nFinal Sum: 0\n"
    );
    assert!(stderr(&output).contains("Warn: child count 5 exceeds input size"));
}

#[test]
fn worker_subcommand_writes_one_record() {
    let file = input_file(b"123456789");
    let output = trisum()
        .args(["worker", "--worker-id", "1", "--start", "3", "--end", "5", "--input"])
        .arg(file.path())
        .stdin(Stdio::null())
        .output()
        .unwrap();

    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(output.stdout.len(), 10);
    assert_eq!(&output.stdout[..2], &1_u16.to_le_bytes());
    assert_eq!(&output.stdout[2..], &456_u64.to_le_bytes());
}

#[test]
fn hyphen_leading_input_path() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("-nums.dat"), b"123456789").unwrap();

    for backend in ["process", "thread"] {
        let output = trisum()
            .current_dir(dir.path())
            .args(["--input=-nums.dat", "-c", "3", "--backend", backend])
            .stdin(Stdio::null())
            .output()
            .unwrap();

        assert!(output.status.success(), "{backend}: {}", stderr(&output));
        assert_eq!(
            normalized(&stdout(&output)),
            [
                "File size: 9",
                "Child 0 Sum: 123",
                "Child 1 Sum: 456",
                "Child 2 Sum: 789",
                "Final Sum: 1368",
            ],
            "{backend}"
        );
    }
}

#[test]
fn separate_hyphen_leading_input_value() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("-nums.dat"), b"123456789").unwrap();

    let output = trisum()
        .current_dir(dir.path())
        .args(["-i", "-nums.dat", "-c", "3"])
        .stdin(Stdio::null())
        .output()
        .unwrap();

    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).ends_with("Final Sum: 1368\n"));
}
