//! Task-board REST client. Display enrichment only: the board tells us which
//! worker a task is assigned to (via the `Recipient:` convention in task
//! descriptions) so the dashboard can highlight it. Every failure here
//! degrades to "no data"; the mirroring core never depends on the board.

use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::KanbanSettings;

/// Response envelope used by the board API: `{ "success": bool, "data": ... }`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    data: Option<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: String,
}

/// An in-progress task addressed to a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub task_id: String,
    pub title: String,
    pub recipient: String,
}

impl Assignment {
    pub fn is_for(&self, label: &str) -> bool {
        !label.is_empty()
            && self
                .recipient
                .to_lowercase()
                .contains(&label.to_lowercase())
    }
}

pub struct KanbanClient {
    http: reqwest::Client,
    base: String,
}

impl KanbanClient {
    pub fn new(settings: &KanbanSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: settings.base_url(),
        }
    }

    async fn get<T: DeserializeOwned + Default>(&self, path: &str) -> Result<T> {
        let url = format!("{}/{}", self.base, path.trim_start_matches('/'));
        let envelope: Envelope<T> = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?
            .error_for_status()
            .with_context(|| format!("request to {url} rejected"))?
            .json()
            .await
            .context("task board sent malformed JSON")?;
        if !envelope.success {
            bail!("task board reported failure for {url}");
        }
        envelope.data.context("task board returned no data")
    }

    pub async fn projects(&self) -> Result<Vec<Project>> {
        self.get("projects").await
    }

    /// Resolve a project name or id to its id.
    pub async fn resolve_project_id(&self, name_or_id: &str) -> Result<Option<String>> {
        let projects = self.projects().await?;
        Ok(projects
            .into_iter()
            .find(|p| p.name == name_or_id || p.id == name_or_id)
            .map(|p| p.id))
    }

    pub async fn tasks(&self, project_id: &str) -> Result<Vec<Task>> {
        self.get(&format!("tasks?project_id={project_id}")).await
    }
}

static RE_RECIPIENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^(?:[-*]\s*)?rec[ei]pient:\s*(.+)$").unwrap());

/// Pull the addressed worker out of a task description. Tolerates list
/// markers, any case, and the common "Recepient" misspelling.
pub fn extract_recipient(text: &str) -> Option<&str> {
    RE_RECIPIENT
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
}

/// All in-progress tasks that name a recipient.
pub fn assignments(tasks: &[Task]) -> Vec<Assignment> {
    tasks
        .iter()
        .filter(|task| task.status == "inprogress")
        .filter_map(|task| {
            extract_recipient(&task.description).map(|recipient| Assignment {
                task_id: task.id.clone(),
                title: task.title.clone(),
                recipient: recipient.to_string(),
            })
        })
        .collect()
}

/// Assignments present now that were absent in the previous poll.
pub fn new_assignments<'a>(
    previous: &[Assignment],
    current: &'a [Assignment],
) -> Vec<&'a Assignment> {
    current
        .iter()
        .filter(|a| !previous.iter().any(|p| p.task_id == a.task_id))
        .collect()
}
