//! Typed settings with documented defaults, persisted as JSON under
//! `~/.agent-deck/config.json`. Every field has a serde default so a partial
//! or missing file loads cleanly; values are validated once at load time.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub capture: CaptureSettings,
    #[serde(default)]
    pub kanban: KanbanSettings,
    #[serde(default)]
    pub launch: LaunchSettings,
}

/// Worker sync loop pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Milliseconds between sync ticks. Default: 1000.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Minimum seconds between forced tab switches per worker. Default: 5.
    #[serde(default = "default_switch_cooldown_secs")]
    pub switch_cooldown_secs: u64,
    /// Milliseconds to let the OS settle after a focus change before typing.
    /// Default: 50.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

/// Window discovery and buffer capture tuning. The string lists are
/// deliberately data, not code: extend them in the config file when a new
/// terminal host or transcript format shows up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureSettings {
    /// Window classes recognized as terminal hosts.
    #[serde(default = "default_terminal_classes")]
    pub terminal_classes: Vec<String>,
    /// Depth limit for the tab-item tree walk. Default: 12.
    #[serde(default = "default_tab_walk_depth")]
    pub tab_walk_depth: u32,
    /// Control-name fragments that mark a text control as the terminal
    /// buffer (checked case-insensitively).
    #[serde(default = "default_terminal_controls")]
    pub terminal_controls: Vec<String>,
    /// Candidates with text at or below this length are ignored. Default: 10.
    #[serde(default = "default_min_text_len")]
    pub min_text_len: usize,
    /// Transcript lines containing any of these substrings are dropped.
    #[serde(default = "default_transcript_denylist")]
    pub transcript_denylist: Vec<String>,
    /// How many bytes to read from the end of a transcript log. Default: 64 KiB.
    #[serde(default = "default_tail_bytes")]
    pub tail_bytes: u64,
    /// How many transcript lines to keep, emulating a terminal screen.
    /// Default: 200.
    #[serde(default = "default_viewport_lines")]
    pub viewport_lines: usize,
}

/// Task-board REST API endpoint and polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KanbanSettings {
    /// Whether to poll the task board at all. Default: false.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_kanban_host")]
    pub host: String,
    #[serde(default = "default_kanban_port")]
    pub port: u16,
    /// Milliseconds between task polls. Default: 3000.
    #[serde(default = "default_kanban_poll_ms")]
    pub poll_ms: u64,
    /// Project to watch, by name or id.
    #[serde(default)]
    pub project: Option<String>,
}

/// How new workers are spawned into terminal tabs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchSettings {
    /// Agent CLI invoked inside the new tab.
    #[serde(default = "default_agent_command")]
    pub agent_command: String,
    /// Project directory new workers start in.
    #[serde(default)]
    pub project_path: Option<PathBuf>,
    /// Project name used in worker titles.
    #[serde(default = "default_project_name")]
    pub project_name: String,
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_switch_cooldown_secs() -> u64 {
    5
}

fn default_settle_ms() -> u64 {
    50
}

fn default_terminal_classes() -> Vec<String> {
    // Windows Terminal and the classic console host.
    vec![
        "CASCADIA_HOSTING_WINDOW_CLASS".to_string(),
        "ConsoleWindowClass".to_string(),
    ]
}

fn default_tab_walk_depth() -> u32 {
    12
}

fn default_terminal_controls() -> Vec<String> {
    vec![
        "PowerShell".to_string(),
        "Command Prompt".to_string(),
        "Terminal".to_string(),
        "Console".to_string(),
        "Text Area".to_string(),
    ]
}

fn default_min_text_len() -> usize {
    10
}

fn default_transcript_denylist() -> Vec<String> {
    // PowerShell Start-Transcript header/footer boilerplate.
    [
        "**********************",
        "Windows PowerShell transcript start",
        "Windows PowerShell transcript end",
        "Username:",
        "RunAs User:",
        "Configuration Name:",
        "Machine:",
        "Host Application:",
        "Process ID:",
        "PSVersion:",
        "PSEdition:",
        "OS:",
        "CLRVersion:",
        "BuildVersion:",
        "Start time:",
        "End time:",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_tail_bytes() -> u64 {
    64 * 1024
}

fn default_viewport_lines() -> usize {
    200
}

fn default_kanban_host() -> String {
    "127.0.0.1".to_string()
}

fn default_kanban_port() -> u16 {
    3000
}

fn default_kanban_poll_ms() -> u64 {
    3000
}

fn default_agent_command() -> String {
    "gemini".to_string()
}

fn default_project_name() -> String {
    "project".to_string()
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            switch_cooldown_secs: default_switch_cooldown_secs(),
            settle_ms: default_settle_ms(),
        }
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            terminal_classes: default_terminal_classes(),
            tab_walk_depth: default_tab_walk_depth(),
            terminal_controls: default_terminal_controls(),
            min_text_len: default_min_text_len(),
            transcript_denylist: default_transcript_denylist(),
            tail_bytes: default_tail_bytes(),
            viewport_lines: default_viewport_lines(),
        }
    }
}

impl Default for KanbanSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_kanban_host(),
            port: default_kanban_port(),
            poll_ms: default_kanban_poll_ms(),
            project: None,
        }
    }
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            agent_command: default_agent_command(),
            project_path: None,
            project_name: default_project_name(),
        }
    }
}

impl KanbanSettings {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}/api", self.host, self.port)
    }
}

impl Settings {
    pub fn config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("cannot determine home directory")?;
        Ok(home.join(".agent-deck"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load settings, falling back to defaults when no file exists. A file
    /// that exists but does not parse is an error: silently reverting a
    /// user's config to defaults hides typos.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let settings: Settings = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save(&self) -> Result<()> {
        let dir = Self::config_dir()?;
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        let path = Self::config_path()?;
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, raw).with_context(|| format!("failed to write {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.sync.interval_ms == 0 {
            bail!("sync.interval_ms must be at least 1");
        }
        if self.capture.viewport_lines == 0 {
            bail!("capture.viewport_lines must be at least 1");
        }
        if self.capture.tab_walk_depth == 0 {
            bail!("capture.tab_walk_depth must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_loads_all_defaults() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.sync.interval_ms, 1000);
        assert_eq!(settings.sync.switch_cooldown_secs, 5);
        assert_eq!(settings.capture.viewport_lines, 200);
        assert!(!settings.kanban.enabled);
    }

    #[test]
    fn partial_section_keeps_sibling_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"sync": {"interval_ms": 250}}"#).unwrap();
        assert_eq!(settings.sync.interval_ms, 250);
        assert_eq!(settings.sync.switch_cooldown_secs, 5);
    }

    #[test]
    fn zero_interval_rejected() {
        let settings: Settings =
            serde_json::from_str(r#"{"sync": {"interval_ms": 0}}"#).unwrap();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn kanban_base_url() {
        let settings = KanbanSettings::default();
        assert_eq!(settings.base_url(), "http://127.0.0.1:3000/api");
    }
}
