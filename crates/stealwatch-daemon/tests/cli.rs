//! Process-level tests for the stealwatchd binary.

use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, Command, Stdio};

const BIN: &str = env!("CARGO_BIN_EXE_stealwatchd");

fn quiet_config() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[realtime]\nset_priority = false\nlock_memory = false").unwrap();
    file
}

fn exit_code(args: &[&str]) -> i32 {
    let config = quiet_config();
    Command::new(BIN)
        .arg("-c")
        .arg(config.path())
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .unwrap()
        .code()
        .unwrap()
}

fn spawn_foreground(config: &tempfile::NamedTempFile) -> Child {
    Command::new(BIN)
        .args(["-f", "-p", "-t", "60", "-c"])
        .arg(config.path())
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap()
}

/// Read stderr until the loop has started; returns the lines read so far.
fn wait_for_loop(reader: &mut impl BufRead) -> String {
    let mut seen = String::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).unwrap() == 0 {
            panic!("stealwatchd exited before entering the loop:\n{seen}");
        }
        seen.push_str(&line);
        if line.contains("Entering main loop") {
            return seen;
        }
    }
}

fn send(child: &Child, signal: libc::c_int) {
    let pid = libc::pid_t::try_from(child.id()).unwrap();
    assert_eq!(unsafe { libc::kill(pid, signal) }, 0);
}

#[test]
fn test_zero_timeout_is_config_error() {
    assert_eq!(exit_code(&["-t", "0"]), 1);
}

#[test]
fn test_oversized_timeout_is_config_error() {
    assert_eq!(exit_code(&["-t", "4000000"]), 1);
}

#[test]
fn test_invalid_threshold_is_config_error() {
    assert_eq!(exit_code(&["-m", "0"]), 1);
}

#[test]
fn test_unknown_flag_is_config_error() {
    assert_eq!(exit_code(&["--bogus"]), 1);
}

#[test]
fn test_help_exits_zero() {
    assert_eq!(exit_code(&["--help"]), 0);
}

#[test]
fn test_sigterm_stops_with_final_report() {
    let config = quiet_config();
    let mut child = spawn_foreground(&config);
    let mut reader = BufReader::new(child.stderr.take().unwrap());
    let mut output = wait_for_loop(&mut reader);

    std::thread::sleep(std::time::Duration::from_millis(150));
    send(&child, libc::SIGTERM);

    reader.read_to_string(&mut output).unwrap();
    let status = child.wait().unwrap();

    assert_eq!(status.code(), Some(0), "{output}");
    assert!(output.contains("Main loop stopped"), "{output}");
    assert_eq!(output.matches("not scheduled on time").count(), 1, "{output}");
}

#[test]
fn test_sigusr1_dumps_interim_report() {
    let config = quiet_config();
    let mut child = spawn_foreground(&config);
    let mut reader = BufReader::new(child.stderr.take().unwrap());
    let mut output = wait_for_loop(&mut reader);

    send(&child, libc::SIGUSR1);
    std::thread::sleep(std::time::Duration::from_millis(200));
    send(&child, libc::SIGINT);

    reader.read_to_string(&mut output).unwrap();
    let status = child.wait().unwrap();

    assert_eq!(status.code(), Some(0), "{output}");
    assert!(output.contains("kind=interim"), "{output}");
    assert_eq!(output.matches("not scheduled on time").count(), 2, "{output}");
}
