use super::{load_settings_from, normalize_database_url, Settings};

use std::{
    env, fs,
    time::{SystemTime, UNIX_EPOCH},
};

fn temp_dir(label: &str) -> std::path::PathBuf {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let dir = env::temp_dir().join(format!("quiz_server_{label}_{suffix}"));
    fs::create_dir_all(&dir).expect("temp dir");
    dir
}

#[test]
fn normalizes_plain_file_path_to_sqlite_url() {
    assert_eq!(
        normalize_database_url("./data/test.db"),
        "sqlite://./data/test.db"
    );
}

#[test]
fn keeps_memory_and_full_urls() {
    assert_eq!(normalize_database_url("sqlite::memory:"), "sqlite::memory:");
    assert_eq!(
        normalize_database_url("sqlite:///var/lib/quiz.db"),
        "sqlite:///var/lib/quiz.db"
    );
    assert_eq!(
        normalize_database_url("  "),
        Settings::default().database_url
    );
}

#[test]
fn normalizes_windows_plain_path() {
    assert_eq!(
        normalize_database_url("C:\\Users\\alice\\quiz.db"),
        "sqlite://C:/Users/alice/quiz.db"
    );
}

#[test]
fn missing_file_yields_defaults() {
    let dir = temp_dir("defaults");
    let settings = load_settings_from(&dir.join("absent.toml")).expect("settings");

    assert_eq!(settings.bind_addr, Settings::default().bind_addr);
    assert_eq!(settings.engine.host_grace_ms, 30_000);
    assert_eq!(settings.engine.scoring.base_points, 1000);
    fs::remove_dir_all(dir).expect("cleanup");
}

#[test]
fn file_overrides_selected_fields() {
    let dir = temp_dir("file");
    let path = dir.join("server.toml");
    fs::write(
        &path,
        r#"
bind_addr = "0.0.0.0:9000"

[engine]
reveal_interval_ms = 2500
token_secret = "from-file"

[engine.scoring]
min_points = 50
"#,
    )
    .expect("write config");

    let settings = load_settings_from(&path).expect("settings");
    assert_eq!(settings.bind_addr, "0.0.0.0:9000");
    assert_eq!(settings.engine.reveal_interval_ms, 2500);
    assert_eq!(settings.engine.token_secret.as_deref(), Some("from-file"));
    assert_eq!(settings.engine.scoring.min_points, 50);
    assert_eq!(settings.engine.scoring.base_points, 1000);
    assert_eq!(settings.engine.host_grace_ms, 30_000);
    fs::remove_dir_all(dir).expect("cleanup");
}

#[test]
fn inconsistent_scoring_is_rejected() {
    let dir = temp_dir("invalid");
    let path = dir.join("server.toml");
    fs::write(
        &path,
        "[engine.scoring]\nbase_points = 100\nmin_points = 500\n",
    )
    .expect("write config");

    assert!(load_settings_from(&path).is_err());
    fs::remove_dir_all(dir).expect("cleanup");
}
