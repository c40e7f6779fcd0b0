use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::frame::{DEFAULT_RESIZE_WIDTH, MIN_RESIZE_WIDTH};
use crate::ingest::{
    IngestSettings, DEFAULT_READ_TIMEOUT_SECS, DEFAULT_TARGET_FPS, DEFAULT_WEBCAM_WARMUP_FRAMES,
};
use crate::task::Task;
use crate::track::TrackerKind;

const DEFAULT_BACKEND: &str = "tract";
const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_SMTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SENDER: &str = "busguard@localhost";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct MonitorConfigFile {
    task: Option<Task>,
    recipient: Option<String>,
    resize_width: Option<u32>,
    backend: Option<String>,
    font_path: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    tracker: Option<TrackerKind>,
    smtp: Option<SmtpConfigFile>,
    ingest: Option<IngestConfigFile>,
    tasks: Option<TasksConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SmtpConfigFile {
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    sender: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct IngestConfigFile {
    read_timeout_secs: Option<u64>,
    target_fps: Option<u32>,
    webcam_warmup_frames: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TasksConfigFile {
    violence: Option<TaskConfigFile>,
    student: Option<TaskConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TaskConfigFile {
    model_path: Option<PathBuf>,
    confidence: Option<f32>,
    labels: Option<Vec<String>>,
    target_labels: Option<Vec<String>>,
    stop_on_alert: Option<bool>,
    videos: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub task: Task,
    pub recipient: String,
    pub resize_width: u32,
    pub backend: String,
    pub font_path: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    /// Applies to stored video and RTSP sources.
    pub tracker: TrackerKind,
    pub smtp: SmtpSettings,
    pub ingest: IngestSettings,
    pub violence: TaskSettings,
    pub student: TaskSettings,
}

#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    /// Only ever read from `BUSGUARD_SMTP_PASSWORD`.
    pub password: Option<String>,
    pub sender: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct TaskSettings {
    pub model_path: PathBuf,
    pub confidence: f32,
    pub labels: Vec<String>,
    pub target_labels: Vec<String>,
    pub stop_on_alert: bool,
    pub videos: BTreeMap<String, String>,
}

impl TaskSettings {
    fn from_file(task: Task, file: Option<TaskConfigFile>) -> Self {
        let file = file.unwrap_or_default();
        Self {
            model_path: file
                .model_path
                .unwrap_or_else(|| PathBuf::from(task.default_model_path())),
            confidence: file.confidence.unwrap_or(task.default_confidence()),
            labels: file.labels.unwrap_or_else(|| task.default_labels()),
            target_labels: file
                .target_labels
                .unwrap_or_else(|| task.default_target_labels()),
            stop_on_alert: file
                .stop_on_alert
                .unwrap_or(task.default_stop_on_alert()),
            videos: file
                .videos
                .unwrap_or_else(|| task.default_videos().into_iter().collect()),
        }
    }

    /// Path of a catalogued video by name.
    pub fn video(&self, name: &str) -> Result<&str> {
        self.videos.get(name).map(String::as_str).ok_or_else(|| {
            anyhow!(
                "unknown video '{}'; available: {}",
                name,
                self.videos.keys().cloned().collect::<Vec<_>>().join(", ")
            )
        })
    }

    fn validate(&self, task: Task) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(anyhow!(
                "{} confidence must be within [0, 1], got {}",
                task,
                self.confidence
            ));
        }
        if self.labels.is_empty() {
            return Err(anyhow!("{} needs at least one class label", task));
        }
        if self.target_labels.iter().all(|label| label.trim().is_empty()) {
            return Err(anyhow!("{} needs at least one target label", task));
        }
        Ok(())
    }
}

impl MonitorConfig {
    /// Config file named by `BUSGUARD_CONFIG` (optional), then environment
    /// overrides, then validation.
    pub fn load() -> Result<Self> {
        Self::load_with(None, |_| Ok(()))
    }

    /// Like [`MonitorConfig::load`] for a caller that may pick the task
    /// itself. The task is settled first (file, `BUSGUARD_TASK`, then
    /// `task`) so task-scoped variables such as `BUSGUARD_CONFIDENCE` land
    /// on the task that will run. `overrides` runs last, before validation.
    pub fn load_with<F>(task: Option<Task>, overrides: F) -> Result<Self>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        let config_path = std::env::var("BUSGUARD_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        if let Some(task) = task {
            cfg.task = task;
        }
        cfg.apply_task_env()?;
        overrides(&mut cfg)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: MonitorConfigFile) -> Self {
        let smtp_file = file.smtp.unwrap_or_default();
        let username = smtp_file.username;
        let smtp = SmtpSettings {
            host: smtp_file
                .host
                .unwrap_or_else(|| DEFAULT_SMTP_HOST.to_string()),
            port: smtp_file.port.unwrap_or(DEFAULT_SMTP_PORT),
            sender: smtp_file
                .sender
                .or_else(|| username.clone())
                .unwrap_or_else(|| DEFAULT_SENDER.to_string()),
            username,
            password: None,
            timeout: Duration::from_secs(
                smtp_file.timeout_secs.unwrap_or(DEFAULT_SMTP_TIMEOUT_SECS),
            ),
        };
        let ingest_file = file.ingest.unwrap_or_default();
        let ingest = IngestSettings {
            read_timeout: Duration::from_secs(
                ingest_file
                    .read_timeout_secs
                    .unwrap_or(DEFAULT_READ_TIMEOUT_SECS),
            ),
            target_fps: ingest_file.target_fps.unwrap_or(DEFAULT_TARGET_FPS),
            webcam_warmup_frames: ingest_file
                .webcam_warmup_frames
                .unwrap_or(DEFAULT_WEBCAM_WARMUP_FRAMES),
        };
        let tasks = file.tasks.unwrap_or_default();
        Self {
            task: file.task.unwrap_or(Task::Student),
            recipient: file.recipient.unwrap_or_default(),
            resize_width: file.resize_width.unwrap_or(DEFAULT_RESIZE_WIDTH),
            backend: file
                .backend
                .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
            font_path: file.font_path,
            output_dir: file.output_dir,
            tracker: file.tracker.unwrap_or_default(),
            smtp,
            ingest,
            violence: TaskSettings::from_file(Task::Violence, tasks.violence),
            student: TaskSettings::from_file(Task::Student, tasks.student),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(task) = env_value("BUSGUARD_TASK") {
            self.task = task.parse()?;
        }
        if let Some(recipient) = env_value("BUSGUARD_RECIPIENT") {
            self.recipient = recipient;
        }
        if let Some(width) = env_value("BUSGUARD_RESIZE_WIDTH") {
            self.resize_width = width
                .parse()
                .map_err(|_| anyhow!("BUSGUARD_RESIZE_WIDTH must be an integer pixel width"))?;
        }
        if let Some(backend) = env_value("BUSGUARD_BACKEND") {
            self.backend = backend;
        }
        if let Some(path) = env_value("BUSGUARD_FONT_PATH") {
            self.font_path = Some(PathBuf::from(path));
        }
        if let Some(path) = env_value("BUSGUARD_OUTPUT_DIR") {
            self.output_dir = Some(PathBuf::from(path));
        }
        if let Some(tracker) = env_value("BUSGUARD_TRACKER") {
            self.tracker = tracker.parse()?;
        }
        if let Some(host) = env_value("BUSGUARD_SMTP_HOST") {
            self.smtp.host = host;
        }
        if let Some(port) = env_value("BUSGUARD_SMTP_PORT") {
            self.smtp.port = port
                .parse()
                .map_err(|_| anyhow!("BUSGUARD_SMTP_PORT must be a port number"))?;
        }
        if let Some(username) = env_value("BUSGUARD_SMTP_USERNAME") {
            self.smtp.username = Some(username);
        }
        if let Some(sender) = env_value("BUSGUARD_SENDER") {
            self.smtp.sender = sender;
        }
        if let Some(password) = env_value("BUSGUARD_SMTP_PASSWORD") {
            self.smtp.password = Some(password);
        }
        if let Some(timeout) = env_value("BUSGUARD_READ_TIMEOUT_SECS") {
            let seconds: u64 = timeout.parse().map_err(|_| {
                anyhow!("BUSGUARD_READ_TIMEOUT_SECS must be an integer number of seconds")
            })?;
            self.ingest.read_timeout = Duration::from_secs(seconds);
        }
        Ok(())
    }

    /// Variables that apply to the selected task only.
    fn apply_task_env(&mut self) -> Result<()> {
        let task = self.task;
        if let Some(confidence) = env_value("BUSGUARD_CONFIDENCE") {
            self.task_settings_mut(task).confidence = confidence
                .parse()
                .map_err(|_| anyhow!("BUSGUARD_CONFIDENCE must be a number"))?;
        }
        if let Some(path) = env_value("BUSGUARD_MODEL_PATH") {
            self.task_settings_mut(task).model_path = PathBuf::from(path);
        }
        Ok(())
    }

    /// Check ranges. Call again after applying command-line overrides.
    pub fn validate(&self) -> Result<()> {
        if self.recipient.trim().is_empty() {
            return Err(anyhow!(
                "alert recipient must be set (recipient in config or BUSGUARD_RECIPIENT)"
            ));
        }
        if self.resize_width < MIN_RESIZE_WIDTH {
            return Err(anyhow!(
                "resize_width must be at least {} pixels, got {}",
                MIN_RESIZE_WIDTH,
                self.resize_width
            ));
        }
        if self.ingest.read_timeout.is_zero() {
            return Err(anyhow!("read timeout must be greater than zero"));
        }
        for task in Task::ALL {
            self.task_settings(task).validate(task)?;
        }
        Ok(())
    }

    pub fn task_settings(&self, task: Task) -> &TaskSettings {
        match task {
            Task::Violence => &self.violence,
            Task::Student => &self.student,
        }
    }

    pub fn task_settings_mut(&mut self, task: Task) -> &mut TaskSettings {
        match task {
            Task::Violence => &mut self.violence,
            Task::Student => &mut self.student,
        }
    }

    /// Settings of the selected task.
    pub fn active(&self) -> &TaskSettings {
        self.task_settings(self.task)
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<MonitorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
