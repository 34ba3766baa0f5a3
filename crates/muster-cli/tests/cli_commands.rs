//! Drives the `muster` binary against a temporary state directory

use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn muster(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_muster"))
        .arg("--home")
        .arg(home)
        .arg("--config-file")
        .arg(home.join("muster_config.json"))
        .args(args)
        .env_remove("MUSTER_TEAM_NAME")
        .env_remove("MUSTER_AGENT_ID")
        .env_remove("MUSTER_BACKEND")
        .env_remove("MUSTER_SHUTDOWN_SECS")
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run muster")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

#[test]
fn test_team_and_task_round() {
    let temp = TempDir::new().unwrap();
    let home = temp.path();

    let created = muster(home, &["create-team", "t1", "--description", "release crew"]);
    assert!(created.status.success(), "{:?}", created);

    let teams = muster(home, &["--json", "list-teams"]);
    assert!(teams.status.success());
    let teams = stdout_json(&teams);
    assert_eq!(teams[0]["name"], "t1");
    assert_eq!(teams[0]["description"], "release crew");

    let build = muster(home, &["--json", "create-task", "t1", "build"]);
    assert!(build.status.success());
    let build_id = stdout_json(&build)["id"].as_str().unwrap().to_string();

    let deploy = muster(
        home,
        &["--json", "create-task", "t1", "deploy", "--blocked-by", &build_id],
    );
    assert!(deploy.status.success());
    let deploy_id = stdout_json(&deploy)["id"].as_str().unwrap().to_string();

    let blocked = muster(home, &["transition-task", "t1", &deploy_id, "in_progress"]);
    assert_eq!(blocked.status.code(), Some(5));

    let cycle = muster(home, &["add-dependency", "t1", &build_id, &deploy_id]);
    assert_eq!(cycle.status.code(), Some(4));

    let done = muster(home, &["transition-task", "t1", &build_id, "completed"]);
    assert!(done.status.success());
    let started = muster(home, &["transition-task", "t1", &deploy_id, "in_progress"]);
    assert!(started.status.success());

    let deleted = muster(home, &["delete-team", "t1"]);
    assert!(deleted.status.success());
    assert!(!home.join("teams").join("t1").exists());
}

#[test]
fn test_errors_map_to_result_codes() {
    let temp = TempDir::new().unwrap();
    let home = temp.path();

    let missing = muster(home, &["status", "ghost"]);
    assert_eq!(missing.status.code(), Some(2));

    assert!(muster(home, &["create-team", "t1"]).status.success());
    let duplicate = muster(home, &["create-team", "t1"]);
    assert_eq!(duplicate.status.code(), Some(3));

    let stranger = muster(home, &["request-shutdown", "t1", "nobody"]);
    assert_eq!(stranger.status.code(), Some(2));

    let structured = muster(home, &["--json", "status", "ghost"]);
    assert_eq!(structured.status.code(), Some(2));
    let failure = stdout_json(&structured);
    assert_eq!(failure["error"]["code"], "NOT_FOUND");
    assert_eq!(failure["error"]["category"], "precondition");
}

#[test]
fn test_worker_side_messaging() {
    let temp = TempDir::new().unwrap();
    let home = temp.path();
    assert!(muster(home, &["create-team", "t1"]).status.success());

    // The leader mailbox accepts messages addressed to it by id
    let sent = muster(home, &["send-message", "t1", "team-lead", "note to self"]);
    assert!(sent.status.success());

    let inbox = muster(home, &["--json", "receive", "t1"]);
    assert!(inbox.status.success());
    let entries = stdout_json(&inbox);
    assert_eq!(entries.as_array().unwrap().len(), 1);
    assert_eq!(entries[0]["body"], "note to self");

    let again = muster(home, &["--json", "receive", "t1"]);
    assert_eq!(stdout_json(&again).as_array().unwrap().len(), 0);

    let worker = muster(
        home,
        &["worker", "--team", "t1", "--as", "ghost", "send", "team-lead", "hi"],
    );
    assert_eq!(worker.status.code(), Some(2));

    let escape = muster(home, &["worker", "--team", "t1", "--as", "../../x", "inbox"]);
    assert_eq!(escape.status.code(), Some(11));
    assert!(!home.join("x.cursor").exists());
    assert!(!home.join("teams").join("x.cursor").exists());
}

#[test]
fn test_config_init_then_show() {
    let temp = TempDir::new().unwrap();
    let home = temp.path();

    assert!(muster(home, &["config", "init"]).status.success());
    assert!(home.join("muster_config.json").exists());
    assert_eq!(muster(home, &["config", "init"]).status.code(), Some(1));

    let shown = muster(home, &["--json", "config", "show"]);
    assert!(shown.status.success());
    let config = stdout_json(&shown);
    assert_eq!(config["backend"], "tmux");
    assert_eq!(config["timeouts"]["shutdown_secs"], 30);
}
