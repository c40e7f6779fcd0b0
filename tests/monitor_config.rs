use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use busguard::config::MonitorConfig;
use busguard::{Task, TrackerKind};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "BUSGUARD_CONFIG",
        "BUSGUARD_TASK",
        "BUSGUARD_RECIPIENT",
        "BUSGUARD_RESIZE_WIDTH",
        "BUSGUARD_BACKEND",
        "BUSGUARD_FONT_PATH",
        "BUSGUARD_OUTPUT_DIR",
        "BUSGUARD_SMTP_HOST",
        "BUSGUARD_SMTP_PORT",
        "BUSGUARD_SMTP_USERNAME",
        "BUSGUARD_SMTP_PASSWORD",
        "BUSGUARD_SENDER",
        "BUSGUARD_READ_TIMEOUT_SECS",
        "BUSGUARD_CONFIDENCE",
        "BUSGUARD_MODEL_PATH",
        "BUSGUARD_TRACKER",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"
        task = "violence"
        recipient = "depot@example.com"
        resize_width = 640
        backend = "stub"

        [smtp]
        host = "mail.example.com"
        port = 2525
        username = "monitor@example.com"
        timeout_secs = 5

        [ingest]
        read_timeout_secs = 4

        [tasks.violence]
        confidence = 0.7
        videos = { depot = "clips/depot.mp4" }
        "#,
    );

    std::env::set_var("BUSGUARD_CONFIG", file.path());
    std::env::set_var("BUSGUARD_RECIPIENT", "night-shift@example.com");
    std::env::set_var("BUSGUARD_CONFIDENCE", "0.75");
    std::env::set_var("BUSGUARD_SMTP_PASSWORD", "from-env");

    let cfg = MonitorConfig::load().expect("load config");
    clear_env();

    assert_eq!(cfg.task, Task::Violence);
    assert_eq!(cfg.recipient, "night-shift@example.com");
    assert_eq!(cfg.resize_width, 640);
    assert_eq!(cfg.backend, "stub");
    assert_eq!(cfg.smtp.host, "mail.example.com");
    assert_eq!(cfg.smtp.port, 2525);
    assert_eq!(cfg.smtp.sender, "monitor@example.com");
    assert_eq!(cfg.smtp.password.as_deref(), Some("from-env"));
    assert_eq!(cfg.smtp.timeout, Duration::from_secs(5));
    assert_eq!(cfg.ingest.read_timeout, Duration::from_secs(4));
    assert_eq!(cfg.active().confidence, 0.75);
    assert_eq!(cfg.active().video("depot").unwrap(), "clips/depot.mp4");
    assert!(cfg.active().stop_on_alert);
    // untouched task keeps its preset
    assert_eq!(cfg.student.confidence, 0.2);
}

#[test]
fn env_only_config_uses_presets() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("BUSGUARD_RECIPIENT", "ops@example.com");
    std::env::set_var("BUSGUARD_TASK", "student");
    let cfg = MonitorConfig::load().expect("load config");
    clear_env();

    assert_eq!(cfg.task, Task::Student);
    assert_eq!(cfg.active().confidence, 0.2);
    assert_eq!(cfg.active().target_labels, vec!["student".to_string()]);
    assert!(!cfg.active().stop_on_alert);
    assert_eq!(cfg.smtp.host, "smtp.gmail.com");
    assert_eq!(cfg.smtp.port, 587);
    assert!(cfg.smtp.password.is_none());
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("BUSGUARD_RECIPIENT", "ops@example.com");
    std::env::set_var("BUSGUARD_CONFIDENCE", "1.2");
    assert!(MonitorConfig::load().is_err());

    std::env::set_var("BUSGUARD_CONFIDENCE", "high");
    assert!(MonitorConfig::load().is_err());
    std::env::remove_var("BUSGUARD_CONFIDENCE");

    std::env::set_var("BUSGUARD_RESIZE_WIDTH", "0");
    assert!(MonitorConfig::load().is_err());
    std::env::set_var("BUSGUARD_RESIZE_WIDTH", "8");
    let err = MonitorConfig::load().unwrap_err();
    assert!(err.to_string().contains("at least 16"));
    std::env::remove_var("BUSGUARD_RESIZE_WIDTH");

    std::env::set_var("BUSGUARD_TRACKER", "botsort");
    assert!(MonitorConfig::load().is_err());
    std::env::remove_var("BUSGUARD_TRACKER");

    std::env::set_var("BUSGUARD_TASK", "traffic");
    assert!(MonitorConfig::load().is_err());
    clear_env();

    let err = MonitorConfig::load().unwrap_err();
    assert!(err.to_string().contains("recipient"));
}

#[test]
fn password_is_not_read_from_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"
        recipient = "ops@example.com"

        [smtp]
        password = "hunter2"
        "#,
    );
    std::env::set_var("BUSGUARD_CONFIG", file.path());
    let err = MonitorConfig::load().unwrap_err();
    clear_env();

    assert!(err.to_string().contains("invalid config file"));
}

#[test]
fn overrides_apply_before_validation() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = MonitorConfig::load_with(Some(Task::Violence), |cfg| {
        cfg.recipient = "cli@example.com".into();
        cfg.task_settings_mut(Task::Violence).confidence = 0.9;
        Ok(())
    })
    .expect("load config");

    assert_eq!(cfg.recipient, "cli@example.com");
    assert_eq!(cfg.active().confidence, 0.9);
}

#[test]
fn task_scoped_env_follows_selected_task() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("BUSGUARD_RECIPIENT", "ops@example.com");
    std::env::set_var("BUSGUARD_CONFIDENCE", "0.9");
    std::env::set_var("BUSGUARD_MODEL_PATH", "models/depot.onnx");
    let cfg = MonitorConfig::load_with(Some(Task::Violence), |_| Ok(())).expect("load config");
    clear_env();

    assert_eq!(cfg.task, Task::Violence);
    assert_eq!(cfg.active().confidence, 0.9);
    assert_eq!(cfg.active().model_path.to_str(), Some("models/depot.onnx"));
    // the default task was never selected, so its preset stands
    assert_eq!(cfg.student.confidence, 0.2);
    assert_ne!(cfg.student.model_path.to_str(), Some("models/depot.onnx"));
}

#[test]
fn explicit_task_beats_env_task() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("BUSGUARD_RECIPIENT", "ops@example.com");
    std::env::set_var("BUSGUARD_TASK", "student");
    std::env::set_var("BUSGUARD_CONFIDENCE", "0.45");
    let cfg = MonitorConfig::load_with(Some(Task::Violence), |cfg| {
        cfg.task_settings_mut(Task::Violence).confidence = 0.8;
        Ok(())
    })
    .expect("load config");
    clear_env();

    assert_eq!(cfg.task, Task::Violence);
    // the closure runs after the environment
    assert_eq!(cfg.active().confidence, 0.8);
    assert_eq!(cfg.student.confidence, 0.2);
}

#[test]
fn tracker_selected_from_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("BUSGUARD_RECIPIENT", "ops@example.com");
    let cfg = MonitorConfig::load().expect("load config");
    assert_eq!(cfg.tracker, TrackerKind::None);

    std::env::set_var("BUSGUARD_TRACKER", "bytetrack");
    let cfg = MonitorConfig::load().expect("load config");
    clear_env();

    assert_eq!(cfg.tracker, TrackerKind::ByteTrack);
}
