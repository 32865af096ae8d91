//! Smoke tests -- verify the binary runs and key subcommands load.

use assert_cmd::Command;

#[test]
fn test_cli_help() {
    Command::cargo_bin("pagewatch")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains("Scheduled web-page analysis"));
}

#[test]
fn test_cli_version() {
    Command::cargo_bin("pagewatch")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicates::str::contains("pagewatch"));
}

#[test]
fn test_task_list_subcommand_exists() {
    Command::cargo_bin("pagewatch")
        .unwrap()
        .args(["task", "list", "--help"])
        .assert()
        .success();
}

#[test]
fn test_check_robots_subcommand_exists() {
    Command::cargo_bin("pagewatch")
        .unwrap()
        .args(["check-robots", "--help"])
        .assert()
        .success();
}

#[test]
fn test_results_subcommand_exists() {
    Command::cargo_bin("pagewatch")
        .unwrap()
        .args(["results", "--help"])
        .assert()
        .success();
}

#[test]
fn test_task_list_on_fresh_database() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("pagewatch.toml");
    std::fs::write(
        &config,
        format!(
            "[storage]\ndb_path = \"{}\"\n",
            dir.path().join("t.db").display()
        ),
    )
    .unwrap();

    Command::cargo_bin("pagewatch")
        .unwrap()
        .env("PAGEWATCH_CONFIG", &config)
        .args(["task", "list"])
        .assert()
        .success()
        .stdout(predicates::str::contains("No tasks found."));
}
