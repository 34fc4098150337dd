//! Worker launcher: spawns the agent CLI in a fresh terminal tab whose title
//! follows the `Agent_{project}_{role}` convention the resolver searches for.

use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};

use crate::config::LaunchSettings;

pub fn worker_title(project: &str, role: &str) -> String {
    format!("Agent_{project}_{role}")
}

/// Open a new Windows Terminal tab running the agent CLI and return the title
/// the tab was given. Falls back to a plain console window when `wt` is not
/// on the PATH.
pub fn launch_worker(settings: &LaunchSettings, role: &str) -> Result<String> {
    let title = worker_title(&settings.project_name, role);
    let dir = settings
        .project_path
        .clone()
        .unwrap_or_else(|| Path::new(".").to_path_buf());

    let wt = Command::new("wt")
        .arg("-d")
        .arg(&dir)
        .args(["new-tab", "--title"])
        .arg(&title)
        .args(["cmd", "/k"])
        .arg(&settings.agent_command)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();

    if wt.is_err() {
        Command::new("cmd")
            .args(["/c", "start"])
            .arg(&title)
            .arg("/D")
            .arg(&dir)
            .args(["cmd", "/k"])
            .arg(&settings.agent_command)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .context("failed to launch a terminal for the worker")?;
    }

    tracing::info!(%title, "launched worker terminal");
    Ok(title)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn titles_follow_the_agent_convention() {
        assert_eq!(worker_title("demo", "coder"), "Agent_demo_coder");
    }
}
