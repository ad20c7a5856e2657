use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_path(file_name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("taskebb-{nanos}-{file_name}"))
}

fn run(store_path: &Path, args: &[&str]) -> Output {
    let exe = env!("CARGO_BIN_EXE_taskebb");
    Command::new(exe)
        .args(args)
        .env("TASKEBB_STORE_PATH", store_path)
        .env("TASKEBB_CONFIG_PATH", store_path.with_extension("config.json"))
        .env("TASKEBB_DISABLE_NOTIFICATIONS", "1")
        .env_remove("TASKEBB_BOT_TOKEN")
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run taskebb")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

#[test]
fn add_list_and_show_round_through_the_store() {
    let store_path = temp_path("cli-add.json");

    let added = stdout_json(&run(
        &store_path,
        &["add", "Buy milk", "--description", "2 liters", "--json"],
    ));
    let id = added["id"].as_str().expect("id string").to_string();
    assert_eq!(added["title"], "Buy milk");
    assert_eq!(added["type"], "one_time");

    let listed = stdout_json(&run(&store_path, &["list", "--json"]));
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["id"], id.as_str());

    let shown = run(&store_path, &["show", &id]);
    let stdout = String::from_utf8_lossy(&shown.stdout);
    assert!(shown.status.success());
    assert!(stdout.contains("Buy milk"));
    assert!(stdout.contains("2 liters"));

    let stored: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&store_path).unwrap()).unwrap();
    std::fs::remove_file(&store_path).ok();

    assert_eq!(stored["schema_version"], 1);
    assert_eq!(stored["tasks"].as_array().unwrap().len(), 1);
}

#[test]
fn add_rejects_blank_title() {
    let store_path = temp_path("cli-add-blank.json");

    let output = run(&store_path, &["add", "   "]);
    std::fs::remove_file(&store_path).ok();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ERROR: invalid_input - title is required"));
}

#[test]
fn add_with_deadline_and_recurrence() {
    let store_path = temp_path("cli-add-kinds.json");

    let deadline = stdout_json(&run(
        &store_path,
        &["add", "File taxes", "--deadline", "2099-04-30T17:00:00Z", "--json"],
    ));
    let recurring = stdout_json(&run(
        &store_path,
        &["add", "Water plants", "--every-hours", "72", "--json"],
    ));
    let bad = run(&store_path, &["add", "Nope", "--deadline", "tomorrow"]);
    std::fs::remove_file(&store_path).ok();

    assert_eq!(deadline["type"], "deadline");
    assert!(deadline["deadline"].is_string());
    assert_eq!(recurring["type"], "recurring");
    assert_eq!(recurring["interval_hours"], 72);

    assert!(!bad.status.success());
    assert!(String::from_utf8_lossy(&bad.stderr).contains("invalid timestamp"));
}

#[test]
fn done_completes_one_time_but_keeps_recurring_open() {
    let store_path = temp_path("cli-done.json");

    let one_time = stdout_json(&run(&store_path, &["add", "Call mom", "--json"]));
    let recurring = stdout_json(&run(
        &store_path,
        &["add", "Stretch", "--every-hours", "4", "--json"],
    ));

    let done = stdout_json(&run(
        &store_path,
        &["done", one_time["id"].as_str().unwrap(), "--json"],
    ));
    let executed = run(&store_path, &["done", recurring["id"].as_str().unwrap()]);
    std::fs::remove_file(&store_path).ok();

    assert_eq!(done["completed"], true);
    assert!(executed.status.success());
    assert!(String::from_utf8_lossy(&executed.stdout).starts_with("Recorded execution: Stretch"));
}

#[test]
fn edit_and_delete_task() {
    let store_path = temp_path("cli-edit-delete.json");

    let added = stdout_json(&run(&store_path, &["add", "old", "--json"]));
    let id = added["id"].as_str().unwrap().to_string();

    let edited = stdout_json(&run(&store_path, &["edit", &id, "new", "--json"]));
    assert_eq!(edited["title"], "new");

    let deleted = run(&store_path, &["delete", &id]);
    assert!(deleted.status.success());
    assert!(String::from_utf8_lossy(&deleted.stdout).contains("Deleted task: new"));

    let missing = run(&store_path, &["show", &id]);
    let listed = stdout_json(&run(&store_path, &["list", "--json"]));
    std::fs::remove_file(&store_path).ok();

    assert!(!missing.status.success());
    assert!(String::from_utf8_lossy(&missing.stderr).contains("task not found"));
    assert!(listed.as_array().unwrap().is_empty());
}

#[test]
fn log_lists_activity_newest_first() {
    let store_path = temp_path("cli-log.json");

    run(&store_path, &["add", "first"]);
    run(&store_path, &["add", "second"]);
    let log = stdout_json(&run(&store_path, &["log", "--limit", "1", "--json"]));
    std::fs::remove_file(&store_path).ok();

    let entries = log.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["action"], "add");
    assert_eq!(entries[0]["message"], "second");
}

#[test]
fn invalid_config_override_is_rejected() {
    let store_path = temp_path("cli-override.json");

    let output = run(&store_path, &["list", "--config-override", "theme=dark"]);
    std::fs::remove_file(&store_path).ok();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown config field 'theme'"));
}

#[test]
fn malformed_config_falls_back_to_defaults() {
    let store_path = temp_path("cli-bad-config.json");
    let config_path = store_path.with_extension("config.json");
    std::fs::write(&config_path, "{ not json").unwrap();

    let output = run(&store_path, &["list"]);
    std::fs::remove_file(&config_path).ok();
    std::fs::remove_file(&store_path).ok();

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("No tasks."));
}
