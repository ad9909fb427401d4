//! Portal configuration: where things are on the page and how long to wait for them.
//!
//! Every field has a built-in default matching the production portal, so a
//! config file only needs to name what differs. Files are YAML (`.yaml`,
//! `.yml`) or JSON (`.json`); durations are milliseconds.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::mapper::FieldCodeTable;
use crate::selector::Selector;

pub const DEFAULT_LOGIN_URL: &str = "https://cando.hoseo.ac.kr/Office/Home.aspx";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported config extension for {0} (expected .yaml, .yml or .json)")]
    UnsupportedFormat(PathBuf),

    #[error("Invalid selector for `{field}`: {reason}")]
    InvalidSelector { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PortalConfig {
    pub login_url: String,
    pub selectors: PortalSelectors,
    pub timeouts: Timeouts,
    pub codes: FieldCodeTable,
    pub browser: BrowserOptions,
    pub output: OutputOptions,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            login_url: DEFAULT_LOGIN_URL.to_string(),
            selectors: PortalSelectors::default(),
            timeouts: Timeouts::default(),
            codes: FieldCodeTable::default(),
            browser: BrowserOptions::default(),
            output: OutputOptions::default(),
        }
    }
}

impl PortalConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);
        let config: PortalConfig = match extension.as_deref() {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            Some("json") => serde_json::from_str(&content)?,
            _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        };
        config.selectors.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Selector strings in [`Selector`] syntax.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PortalSelectors {
    /// Visible only after a successful login
    pub login_marker: String,
    pub search_box: String,
    pub search_button: String,
    /// One entry of the student result list; narrowed by student id at runtime
    pub student_item: String,
    /// The embedded frame holding an opened profile
    pub profile_frame: String,
    /// Opens the entry form inside the profile frame
    pub entry_button: String,
    /// The control whose presence defines "the entry form is open"
    pub form_marker: String,
    pub date_input: String,
    pub hour_input: String,
    pub minute_input: String,
    pub category_select: String,
    pub title_input: String,
    pub content_input: String,
    /// Radio label template; `{name}` and `{value}` are substituted
    pub choice_template: String,
    pub privacy_toggle: String,
    pub save_button: String,
    /// Key that dismisses the opened profile
    pub dismiss_key: String,
}

impl Default for PortalSelectors {
    fn default() -> Self {
        Self {
            login_marker: "text:내 지도학생".to_string(),
            search_box: "role:textbox|name:이름/학번".to_string(),
            search_button: "text=조회".to_string(),
            student_item: "role:listitem".to_string(),
            profile_frame: "css:iframe".to_string(),
            entry_button: "css:div[onclick=\"goCounsel()\"]".to_string(),
            form_marker: "#Pdate".to_string(),
            date_input: "#Pdate".to_string(),
            hour_input: "css:input[name='Hour']".to_string(),
            minute_input: "css:input[name='Min']".to_string(),
            category_select: "#Cntype".to_string(),
            title_input: "#Title".to_string(),
            content_input: "#Content".to_string(),
            choice_template: "css:label:has(input[name='{name}'][value='{value}'])".to_string(),
            privacy_toggle: "css:input[type='checkbox'] >> nth:0".to_string(),
            save_button: "#CounselInputBtn".to_string(),
            dismiss_key: "Escape".to_string(),
        }
    }
}

impl PortalSelectors {
    /// Radio label for control `name` set to `value`.
    pub fn choice(&self, name: &str, value: &str) -> Selector {
        Selector::from(
            self.choice_template
                .replace("{name}", name)
                .replace("{value}", value),
        )
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields: [(&'static str, &str); 15] = [
            ("login_marker", &self.login_marker),
            ("search_box", &self.search_box),
            ("search_button", &self.search_button),
            ("student_item", &self.student_item),
            ("profile_frame", &self.profile_frame),
            ("entry_button", &self.entry_button),
            ("form_marker", &self.form_marker),
            ("date_input", &self.date_input),
            ("hour_input", &self.hour_input),
            ("minute_input", &self.minute_input),
            ("category_select", &self.category_select),
            ("title_input", &self.title_input),
            ("content_input", &self.content_input),
            ("privacy_toggle", &self.privacy_toggle),
            ("save_button", &self.save_button),
        ];
        for (field, raw) in fields {
            Selector::from(raw)
                .validate()
                .map_err(|reason| ConfigError::InvalidSelector { field, reason })?;
        }
        self.choice("P", "1")
            .validate()
            .map_err(|reason| ConfigError::InvalidSelector {
                field: "choice_template",
                reason,
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Timeouts {
    pub login_confirm_ms: u64,
    /// Default bound for locating a control before acting on it
    pub action_ms: u64,
    pub search_settle_ms: u64,
    pub profile_settle_ms: u64,
    pub profile_open_ms: u64,
    pub form_open_ms: u64,
    pub save_fast_confirm_ms: u64,
    pub save_settle_ms: u64,
    pub close_settle_ms: u64,
    pub between_records_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            login_confirm_ms: 10_000,
            action_ms: 5_000,
            search_settle_ms: 2_000,
            profile_settle_ms: 3_000,
            profile_open_ms: 10_000,
            form_open_ms: 10_000,
            save_fast_confirm_ms: 3_000,
            save_settle_ms: 2_500,
            close_settle_ms: 1_000,
            between_records_ms: 2_000,
        }
    }
}

impl Timeouts {
    /// Near-zero settle delays and short waits, for dry runs against the
    /// scripted driver.
    pub fn fast() -> Self {
        Self {
            login_confirm_ms: 200,
            action_ms: 200,
            search_settle_ms: 0,
            profile_settle_ms: 0,
            profile_open_ms: 200,
            form_open_ms: 200,
            save_fast_confirm_ms: 100,
            save_settle_ms: 20,
            close_settle_ms: 0,
            between_records_ms: 0,
        }
    }

    pub fn login_confirm(&self) -> Duration {
        Duration::from_millis(self.login_confirm_ms)
    }

    pub fn action(&self) -> Duration {
        Duration::from_millis(self.action_ms)
    }

    pub fn search_settle(&self) -> Duration {
        Duration::from_millis(self.search_settle_ms)
    }

    pub fn profile_settle(&self) -> Duration {
        Duration::from_millis(self.profile_settle_ms)
    }

    pub fn profile_open(&self) -> Duration {
        Duration::from_millis(self.profile_open_ms)
    }

    pub fn form_open(&self) -> Duration {
        Duration::from_millis(self.form_open_ms)
    }

    pub fn save_fast_confirm(&self) -> Duration {
        Duration::from_millis(self.save_fast_confirm_ms)
    }

    pub fn save_settle(&self) -> Duration {
        Duration::from_millis(self.save_settle_ms)
    }

    pub fn close_settle(&self) -> Duration {
        Duration::from_millis(self.close_settle_ms)
    }

    pub fn between_records(&self) -> Duration {
        Duration::from_millis(self.between_records_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BrowserOptions {
    pub headless: bool,
    /// Explicit Chrome/Chromium binary; auto-detected when unset
    pub executable: Option<PathBuf>,
    pub window_width: u32,
    pub window_height: u32,
    pub user_agent: Option<String>,
    pub extra_args: Vec<String>,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: false,
            executable: None,
            window_width: 1920,
            window_height: 1080,
            user_agent: Some(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                    .to_string(),
            ),
            extra_args: vec![
                "--start-maximized".to_string(),
                "--disable-blink-features=AutomationControlled".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputOptions {
    pub report_dir: PathBuf,
    /// Where failure snapshots go
    pub snapshot_dir: PathBuf,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            report_dir: PathBuf::from("."),
            snapshot_dir: PathBuf::from("."),
        }
    }
}
