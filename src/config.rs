use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::storage::Format;

const DEFAULT_START_URL: &str = "https://www.examprepper.co/exam/5/1";

/// Environment-driven settings shared by every subcommand. Keys match the
/// upper-case variable names (`START_URL`, `QUESTION_RANGE_END`, ...).
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_start_url")]
    pub start_url: String,
    pub question_range_start: Option<u64>,
    pub question_range_end: Option<u64>,
    #[serde(default = "default_format")]
    pub output_format: String,
    pub exam_name: Option<String>,
    pub output_file: Option<PathBuf>,
    #[serde(default)]
    pub headless: bool,
    #[serde(default = "default_load_timeout")]
    pub page_load_timeout_secs: u64,
    #[serde(default = "default_page_delay")]
    pub page_delay_secs: u64,

    #[serde(default = "default_questions_file")]
    pub exam_questions_file: PathBuf,
    #[serde(default = "default_max_questions")]
    pub exam_max_questions: usize,
    #[serde(default = "default_timer_minutes")]
    pub exam_timer_minutes: u64,
    #[serde(default = "default_reports_dir")]
    pub reports_dir: PathBuf,
    #[serde(default = "default_export_file")]
    pub export_file: PathBuf,
    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,
}

fn default_start_url() -> String {
    DEFAULT_START_URL.to_string()
}
fn default_format() -> String {
    "json".to_string()
}
fn default_load_timeout() -> u64 {
    30
}
fn default_page_delay() -> u64 {
    2
}
fn default_questions_file() -> PathBuf {
    PathBuf::from("output/exam_results.json")
}
fn default_max_questions() -> usize {
    10
}
fn default_timer_minutes() -> u64 {
    15
}
fn default_reports_dir() -> PathBuf {
    PathBuf::from("reports")
}
fn default_export_file() -> PathBuf {
    PathBuf::from("exam_export.md")
}
fn default_logs_dir() -> PathBuf {
    PathBuf::from("logs")
}

impl Settings {
    /// Load `.env` (if present) and then the process environment.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let source = config::Environment::default()
            .try_parsing(true)
            .ignore_empty(true);
        Self::from_source(source)
    }

    pub fn from_source(source: config::Environment) -> Result<Self> {
        config::Config::builder()
            .add_source(source)
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// Parsed output format; an unknown name is a configuration error.
    pub fn format(&self) -> Result<Format> {
        Ok(self.output_format.parse()?)
    }

    pub fn exam_slug(&self) -> String {
        self.exam_name
            .as_deref()
            .map(|n| n.trim().replace(' ', "_").to_lowercase())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "exam_results".to_string())
    }

    /// Dataset path: `OUTPUT_FILE` when set, else `output/<exam>.<format>`.
    pub fn output_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.output_file {
            return Ok(path.clone());
        }
        Ok(PathBuf::from("output").join(format!("{}.{}", self.exam_slug(), self.format()?)))
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.page_load_timeout_secs)
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_secs(self.page_delay_secs)
    }

    pub fn quiz_time_limit(&self) -> Duration {
        Duration::from_secs(self.exam_timer_minutes * 60)
    }
}

/// DOM selectors and markers for one target site.
#[derive(Debug, Clone)]
pub struct SiteProfile {
    /// Present once the question list has rendered.
    pub content_ready: String,
    pub container: String,
    pub container_title: String,
    pub panel: String,
    pub question_text: String,
    pub options_list: String,
    pub option_label: String,
    pub option_text: String,
    pub correct_class: String,
    pub correct_colors: Vec<String>,
    pub reveal_button_text: String,
    pub next_button_text: String,
    pub checkpoint_title: String,
}

impl Default for SiteProfile {
    fn default() -> Self {
        SiteProfile {
            content_ready: ".chakra-accordion".into(),
            container: ".chakra-accordion__item".into(),
            container_title: ".chakra-accordion__button".into(),
            panel: ".chakra-accordion__panel".into(),
            question_text: "div[class*='css-naa3lg']".into(),
            options_list: "div[class*='css-j7qwjs']".into(),
            option_label: "p[class*='css-xakj1w']".into(),
            option_text: "div[class*='css-cba290']".into(),
            correct_class: "css-jjzrip".into(),
            correct_colors: vec!["rgb(56, 161, 105)".into(), "rgb(72, 187, 120)".into()],
            reveal_button_text: "Show Answer".into(),
            next_button_text: "Next".into(),
            checkpoint_title: "Security Checkpoint".into(),
        }
    }
}
