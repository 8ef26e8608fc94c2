//! Binary-level checks for the command-line surface.

use assert_cmd::Command;
use predicates::prelude::*;

fn snapdump() -> Command {
    Command::cargo_bin("snapdump").unwrap_or_else(|err| panic!("binary builds: {err}"))
}

#[test]
fn missing_source_instance_prints_usage_and_exits_1() {
    snapdump()
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Usage"))
        .stderr(predicate::str::contains("DB_INSTANCE_NAME"));
}

#[test]
fn help_exits_zero_and_names_the_operands() {
    snapdump()
        .arg("--help")
        .assert()
        .code(0)
        .stdout(predicate::str::contains("DB_INSTANCE_NAME"))
        .stdout(predicate::str::contains("DB_NAME"));
}
