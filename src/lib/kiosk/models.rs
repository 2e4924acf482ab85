use std::path::PathBuf;

use clap::{command, Parser};
use serde::Deserialize;

use doctor_model::{DoctorRecord, Snapshot};
use settings_model::SettingsPatch;

pub mod doctor_model;
pub mod settings_model;

/// A model for describing ARGS of the tool.
/// Consists of:
/// 1. Path to config.json, that tells where the portal lives and where the rendered page goes.
/// 2. Path to bootstrap.json, the snapshot the portal embeds into the patient page at load time.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[arg(long, value_name = "FILE", default_value = "config.json")]
    pub config_json_path: PathBuf,
    #[arg(long, value_name = "FILE", default_value = "bootstrap.json")]
    pub bootstrap_json_path: PathBuf,
}

/// A model for describing configuration of the tool.
/// Only `server_url` and `output_html_path` are required, the rest have kiosk defaults.
#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    pub server_url: String,
    pub output_html_path: PathBuf,
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_push_debounce_ms")]
    pub push_debounce_ms: u64,
    #[serde(default = "default_transition_exit_ms")]
    pub transition_exit_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_sse_initial_retry_ms")]
    pub sse_initial_retry_ms: u64,
    #[serde(default = "default_sse_max_retry_ms")]
    pub sse_max_retry_ms: u64,
    #[serde(default = "default_sse_max_retries")]
    pub sse_max_retries: u32,
    /// Statuses that may appear on screen, empty shows everyone.
    #[serde(default)]
    pub visible_statuses: Vec<String>,
    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,
    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,
    #[serde(default = "default_true")]
    pub discard_stale_fetches: bool,
}

fn default_refresh_interval_secs() -> u64 {
    120
}

fn default_push_debounce_ms() -> u64 {
    200
}

fn default_transition_exit_ms() -> u64 {
    650
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_sse_initial_retry_ms() -> u64 {
    1000
}

fn default_sse_max_retry_ms() -> u64 {
    30000
}

fn default_sse_max_retries() -> u32 {
    20
}

fn default_viewport_width() -> u32 {
    1920
}

fn default_viewport_height() -> u32 {
    1080
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Config with every optional field at its default.
    pub fn with_defaults(server_url: &str, output_html_path: PathBuf) -> Self {
        Self {
            server_url: server_url.to_owned(),
            output_html_path,
            refresh_interval_secs: default_refresh_interval_secs(),
            push_debounce_ms: default_push_debounce_ms(),
            transition_exit_ms: default_transition_exit_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            sse_initial_retry_ms: default_sse_initial_retry_ms(),
            sse_max_retry_ms: default_sse_max_retry_ms(),
            sse_max_retries: default_sse_max_retries(),
            visible_statuses: Vec::new(),
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
            discard_stale_fetches: true,
        }
    }
}

/// Snapshot the portal renders into the patient page, plus settings and the server's date.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct Bootstrap {
    #[serde(default)]
    pub specialty_order: Vec<String>,
    #[serde(default)]
    pub doctors: Vec<DoctorRecord>,
    #[serde(default)]
    pub patient_display: SettingsPatch,
    #[serde(default)]
    pub today_iso: Option<String>,
}

impl Bootstrap {
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            specialty_order: self.specialty_order.clone(),
            doctors: self.doctors.clone(),
        }
    }
}
