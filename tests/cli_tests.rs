//! CLI surface tests against the compiled binary.

use assert_cmd::Command;
use predicates::prelude::*;

const DEPLOY_YAML: &str = "\
application: shelr
deploy_to: /var/www/shelr
roles:
  web: [web1]
  app: [app1]
  db:
    - host: db1
      primary: true
";

fn deploy_file() -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("deploy.yml");
    std::fs::write(&path, DEPLOY_YAML).unwrap();
    (dir, path)
}

#[test]
fn list_tasks_shows_the_recipe() {
    Command::cargo_bin("deckhand")
        .unwrap()
        .arg("list-tasks")
        .assert()
        .success()
        .stdout(predicate::str::contains("backup:mirror"))
        .stdout(predicate::str::contains("config:unicorn:apply"))
        .stdout(predicate::str::contains("deploy:restart"));
}

#[test]
fn list_hosts_marks_the_primary() {
    let (_dir, path) = deploy_file();
    Command::cargo_bin("deckhand")
        .unwrap()
        .args(["-c", path.to_str().unwrap(), "list-hosts"])
        .env("NO_COLOR", "1")
        .assert()
        .success()
        .stdout(predicate::str::contains("db1 [primary]"))
        .stdout(predicate::str::contains("web:"));
}

#[test]
fn list_hosts_can_filter_by_role() {
    let (_dir, path) = deploy_file();
    Command::cargo_bin("deckhand")
        .unwrap()
        .args(["-c", path.to_str().unwrap(), "list-hosts", "--role", "db"])
        .env("NO_COLOR", "1")
        .assert()
        .success()
        .stdout(predicate::str::contains("db1"))
        .stdout(predicate::str::contains("web1").not());
}

#[test]
fn unknown_task_exits_with_the_resolution_code() {
    let (_dir, path) = deploy_file();
    Command::cargo_bin("deckhand")
        .unwrap()
        .args(["-c", path.to_str().unwrap(), "run", "deploy:typo"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("deploy:typo"));
}

#[test]
fn malformed_set_override_is_rejected() {
    let (_dir, path) = deploy_file();
    Command::cargo_bin("deckhand")
        .unwrap()
        .args([
            "-c",
            path.to_str().unwrap(),
            "run",
            "backup:create",
            "--set",
            "rails_env",
        ])
        .assert()
        .code(5)
        .stderr(predicate::str::contains("key=value"));
}

#[test]
fn missing_deploy_file_is_a_config_error() {
    Command::cargo_bin("deckhand")
        .unwrap()
        .args(["-c", "/nonexistent/deploy.yml", "run", "backup:create"])
        .assert()
        .code(5);
}
