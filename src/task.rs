//! Detection task presets.
//!
//! A task decides which model runs, how confident it must be, which class
//! counts as alert-worthy, how boxes are coloured, and what the alert e-mail
//! says.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use image::Rgb;
use serde::Deserialize;

use crate::annotate::Palette;
use crate::notify::AlertMessage;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    Violence,
    Student,
}

impl Task {
    pub const ALL: [Task; 2] = [Task::Violence, Task::Student];

    pub fn as_str(&self) -> &'static str {
        match self {
            Task::Violence => "violence",
            Task::Student => "student",
        }
    }

    pub fn default_model_path(&self) -> &'static str {
        match self {
            Task::Violence => "weights/yolov8n.onnx",
            Task::Student => "weights/student_detection.onnx",
        }
    }

    pub fn default_confidence(&self) -> f32 {
        match self {
            Task::Violence => 0.6,
            Task::Student => 0.2,
        }
    }

    /// Class names of the shipped model, indexed by class id.
    pub fn default_labels(&self) -> Vec<String> {
        match self {
            Task::Violence => vec!["NonViolence".to_string(), "Violence".to_string()],
            Task::Student => vec!["student".to_string()],
        }
    }

    pub fn default_target_labels(&self) -> Vec<String> {
        vec![self.as_str().to_string()]
    }

    /// Stored-video playback ends once the alert has fired.
    pub fn default_stop_on_alert(&self) -> bool {
        matches!(self, Task::Violence)
    }

    pub fn palette(&self) -> Palette {
        match self {
            Task::Violence => Palette {
                target: Rgb([255, 0, 0]),
                other: Rgb([0, 255, 0]),
            },
            Task::Student => Palette {
                target: Rgb([100, 200, 255]),
                other: Rgb([0, 0, 128]),
            },
        }
    }

    /// Catalogue of bundled demo clips, as (name, path).
    pub fn default_videos(&self) -> Vec<(String, String)> {
        let entries: &[(&str, &str)] = match self {
            Task::Violence => &[
                ("video_1", "videos/video_1.mp4"),
                ("video_2", "videos/video_2.mp4"),
                ("video_3", "videos/video_3.mp4"),
                ("video_5", "videos/video_5.mp4"),
            ],
            Task::Student => &[
                ("video_1", "student_videos/video_one.mp4"),
                ("video_2", "student_videos/video_two.mp4"),
                ("video_3", "student_videos/video_three.mp4"),
                ("video_4", "student_videos/video_four.mp4"),
            ],
        };
        entries
            .iter()
            .map(|(name, path)| (name.to_string(), path.to_string()))
            .collect()
    }

    pub fn alert_message(&self) -> AlertMessage {
        match self {
            Task::Violence => AlertMessage {
                subject: "🚨 Urgent Security Alert: Violence Detected".to_string(),
                body: "Dear User,\n\n\
                       Attention! A potential act of violence has been detected by the security monitoring system.\n\n\
                       ⚠️ Immediate review of the situation is strongly recommended.\n\n\
                       Stay safe,\n\
                       Your Security Monitoring System\n"
                    .to_string(),
            },
            Task::Student => AlertMessage {
                subject: "🚸 Student Detected in the Bus".to_string(),
                body: "Dear User,\n\n\
                       Attention! A student has been detected in the bus.\n\n\
                       Please review the situation promptly.\n\n\
                       Stay safe,\n\
                       Your Security Monitoring System\n"
                    .to_string(),
            },
        }
    }

    /// Operator-facing alarm line, logged once per episode.
    pub fn alarm_banner(&self) -> &'static str {
        match self {
            Task::Violence => "🚨 Violence detected! 🚨",
            Task::Student => "🚸 Student detected in the bus",
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Task {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "violence" | "violence-detection" => Ok(Task::Violence),
            "student" | "student-detection" => Ok(Task::Student),
            other => Err(anyhow!(
                "unknown task '{}'; expected violence or student",
                other
            )),
        }
    }
}
