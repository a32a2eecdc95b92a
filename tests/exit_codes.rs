use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::atomic::{AtomicU64, Ordering};

fn clouddiet_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_clouddiet"));
    cmd.env("HOME", home);
    cmd.env_remove("RUST_LOG");
    cmd.env_remove("CLOUDDIET_CONFIG");
    cmd.env_remove("CLOUDDIET_API_URL");
    cmd.env_remove("CLOUDDIET_TIMEOUT_SECS");
    cmd.env_remove("CLOUDDIET_PROJECT_ID");
    cmd.env_remove("CLOUDDIET_ZONES");
    cmd.env_remove("CLOUDDIET_UI_COLOR");
    cmd.env_remove("CLOUDDIET_UI_MAX_TABLE_ROWS");
    cmd.env_remove("CLOUDDIET_REMEDIATION_CLI");
    cmd
}

fn run(home: &Path, args: &[&str]) -> Output {
    clouddiet_cmd(home).args(args).output().expect("run clouddiet")
}

fn make_temp_home() -> PathBuf {
    static HOME_SEQ: AtomicU64 = AtomicU64::new(0);
    let seq = HOME_SEQ.fetch_add(1, Ordering::Relaxed);
    let home = std::env::temp_dir().join(format!(
        "clouddiet-exit-test-{}-{seq}",
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&home);
    std::fs::create_dir_all(&home).expect("create home");
    home
}

#[test]
fn completion_unknown_shell_exits_2() {
    let home = make_temp_home();
    let out = run(&home, &["completion", "nope"]);
    assert_eq!(out.status.code(), Some(2));
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn ui_requires_tty_exits_2() {
    let home = make_temp_home();
    let out = run(&home, &["ui"]);
    assert_eq!(out.status.code(), Some(2));
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn empty_zones_flag_exits_2() {
    let home = make_temp_home();
    let out = run(&home, &["--zones", " , ", "command", "--description", "x"]);
    assert_eq!(out.status.code(), Some(2));
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn zero_timeout_exits_2() {
    let home = make_temp_home();
    let out = run(&home, &["--timeout", "0", "projects"]);
    assert_eq!(out.status.code(), Some(2));
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn zero_timeout_from_env_or_file_exits_2() {
    let home = make_temp_home();
    let out = clouddiet_cmd(&home)
        .env("CLOUDDIET_TIMEOUT_SECS", "0")
        .args(["config", "--show"])
        .output()
        .expect("run clouddiet");
    assert_eq!(out.status.code(), Some(2));

    let cfg_dir = home.join(".config/clouddiet");
    std::fs::create_dir_all(&cfg_dir).expect("create config dir");
    std::fs::write(cfg_dir.join("config.toml"), "[backend]\ntimeout_secs = 0\n")
        .expect("write config");
    let out = run(&home, &["config", "--show"]);
    assert_eq!(out.status.code(), Some(2));
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn command_without_target_exits_2() {
    let home = make_temp_home();
    let out = run(&home, &["command"]);
    assert_eq!(out.status.code(), Some(2));
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn broken_config_file_exits_2() {
    let home = make_temp_home();
    let cfg_dir = home.join(".config/clouddiet");
    std::fs::create_dir_all(&cfg_dir).expect("create config dir");
    std::fs::write(cfg_dir.join("config.toml"), "[backend\n").expect("write config");

    let out = run(&home, &["config", "--show"]);
    assert_eq!(out.status.code(), Some(2));
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn unparseable_description_exits_20() {
    let home = make_temp_home();
    let out = run(
        &home,
        &["command", "--description", "Review the idle workloads"],
    );
    assert_eq!(out.status.code(), Some(20));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.starts_with('#'), "stdout={stdout}");
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn missing_snapshot_exits_10_and_writes_log() {
    let home = make_temp_home();
    let empty = home.join("snapshots");
    std::fs::create_dir_all(&empty).expect("create snapshot dir");

    let out = run(
        &home,
        &[
            "--project",
            "demo",
            "--from-dir",
            empty.to_str().expect("utf8 path"),
            "overview",
        ],
    );
    assert_eq!(out.status.code(), Some(10));

    let logs_dir = home.join(".config/clouddiet/logs");
    let entries: Vec<_> = std::fs::read_dir(&logs_dir)
        .expect("logs dir")
        .filter_map(|e| e.ok())
        .collect();
    assert_eq!(entries.len(), 1);
    let v: serde_json::Value =
        serde_json::from_slice(&std::fs::read(entries[0].path()).expect("read log"))
            .expect("parse log");
    assert_eq!(v.get("error_code").and_then(|s| s.as_str()), Some("SNAPSHOT"));
    assert_eq!(v.get("dataset").and_then(|s| s.as_str()), Some("report"));
    assert_eq!(v.get("source").and_then(|s| s.as_str()), Some("~/snapshots"));

    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn report_without_project_exits_10_without_network() {
    let home = make_temp_home();
    let out = run(
        &home,
        &["--api-url", "http://127.0.0.1:9", "recommendations"],
    );
    assert_eq!(out.status.code(), Some(10));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("project_id"), "stderr={stderr}");
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn link_without_project_exits_2() {
    let home = make_temp_home();
    let out = run(&home, &["link", "--type", "disk"]);
    assert_eq!(out.status.code(), Some(2));
    let _ = std::fs::remove_dir_all(&home);
}
